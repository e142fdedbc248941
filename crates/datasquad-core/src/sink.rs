//! On-disk run artifacts.
//!
//! [`write_run_artifacts`] lays out `<dir>/<request_id>/`:
//!
//! - `pipeline.py`: approved logic with a review-status header
//! - `infra_<target>.txt`: one per successful translation
//! - `transcript.txt`: the full conversation, labelled per role
//! - `run.json` + `run.digest`: the run record and its SHA-256
//!
//! [`read_run_record`] re-reads `run.json` and verifies the digest.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::audit::AuditTrail;
use crate::domain::{Artifact, Result, SquadError, TargetPlatform, Turn};
use crate::gate::ValidationVerdict;
use crate::orchestration::PipelineOutcome;

/// Per-target line in the run record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub target: TargetPlatform,
    pub succeeded: bool,
    pub artifact_id: Option<Uuid>,
    /// Relative to the run directory.
    pub file: Option<String>,
    pub failure: Option<String>,
}

/// Serializable summary of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub request_id: String,
    pub task: String,
    pub attempts: u32,
    pub logic_artifact_id: Uuid,
    pub logic_digest: String,
    pub verdicts: Vec<ValidationVerdict>,
    pub targets: Vec<TargetRecord>,
    pub tokens_charged: u64,
    pub audit: AuditTrail,
    pub written_at: DateTime<Utc>,
}

/// SHA-256 hex digest of `bytes`.
pub fn content_digest(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Write every artifact of `outcome` under `<dir>/<request_id>/` and return
/// the run directory.
pub fn write_run_artifacts(outcome: &PipelineOutcome, dir: &Path) -> Result<PathBuf> {
    let run_dir = dir.join(&outcome.request_id);
    std::fs::create_dir_all(&run_dir)?;

    let logic = outcome.logic.artifact();
    let header = format!(
        "# Review status: APPROVED by validation gate ({})\n# Request: {}\n# Attempts: {}\n\n",
        outcome.logic.verdict().message,
        outcome.request_id,
        outcome.attempts,
    );
    std::fs::write(
        run_dir.join("pipeline.py"),
        format!("{header}{}\n", logic.content),
    )?;

    let mut targets = Vec::with_capacity(outcome.translations.len());
    for translation in &outcome.translations {
        let record = match &translation.result {
            Ok(artifact) => {
                let file = format!("infra_{}.txt", translation.target);
                std::fs::write(run_dir.join(&file), format!("{}\n", artifact.content))?;
                TargetRecord {
                    target: translation.target,
                    succeeded: true,
                    artifact_id: Some(artifact.id),
                    file: Some(file),
                    failure: None,
                }
            }
            Err(failure) => TargetRecord {
                target: translation.target,
                succeeded: false,
                artifact_id: None,
                file: None,
                failure: Some(failure.reason.clone()),
            },
        };
        targets.push(record);
    }

    std::fs::write(
        run_dir.join("transcript.txt"),
        render_transcript(&outcome.transcript),
    )?;

    let record = RunRecord {
        request_id: outcome.request_id.clone(),
        task: outcome.spec.task.clone(),
        attempts: outcome.attempts,
        logic_artifact_id: logic.id,
        logic_digest: content_digest(logic.content.as_bytes()),
        verdicts: outcome.verdicts.clone(),
        targets,
        tokens_charged: outcome.tokens_charged,
        audit: outcome.audit.clone(),
        written_at: Utc::now(),
    };
    let json = serde_json::to_vec_pretty(&record)?;
    std::fs::write(run_dir.join("run.json"), &json)?;
    std::fs::write(run_dir.join("run.digest"), content_digest(&json))?;

    Ok(run_dir)
}

/// Read and verify `<dir>/<request_id>/run.json`.
pub fn read_run_record(request_id: &str, dir: &Path) -> Result<RunRecord> {
    let run_dir = dir.join(request_id);
    let json = std::fs::read(run_dir.join("run.json"))?;
    let expected = std::fs::read_to_string(run_dir.join("run.digest"))?;
    let actual = content_digest(&json);
    if expected.trim() != actual {
        return Err(SquadError::DigestMismatch {
            expected: expected.trim().to_string(),
            actual,
        });
    }
    Ok(serde_json::from_slice(&json)?)
}

/// Persist a candidate that exhausted its attempts so a human can review it.
pub fn write_rejected_candidate(
    request_id: &str,
    candidate: &Artifact,
    verdict: &ValidationVerdict,
    dir: &Path,
) -> Result<PathBuf> {
    let run_dir = dir.join(request_id);
    std::fs::create_dir_all(&run_dir)?;

    let mut text = format!(
        "# Review status: REJECTED, needs human review ({})\n",
        verdict.message
    );
    for finding in &verdict.findings {
        text.push_str(&format!("# {}\n", finding.reason));
    }
    text.push('\n');
    text.push_str(&candidate.content);
    text.push('\n');

    let path = run_dir.join("rejected_pipeline.py");
    std::fs::write(&path, text)?;
    Ok(path)
}

/// Render turns as a plain-text transcript.
pub fn render_transcript(turns: &[Turn]) -> String {
    let mut out = String::new();
    for (i, turn) in turns.iter().enumerate() {
        out.push_str(&format!(
            "=== #{} {} ({} tokens, {}) ===\n{}\n\n",
            i + 1,
            turn.role(),
            turn.token_count(),
            turn.timestamp().to_rfc3339(),
            turn.content().trim_end(),
        ));
    }
    out
}
