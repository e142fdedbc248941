//! Deterministic validation gate.
//!
//! Evaluates a candidate [`Artifact`] against a compiled [`RuleSet`] to produce
//! a [`ValidationVerdict`]. Every rule is evaluated on every call, so one
//! verdict names all violations. The gate performs no I/O, holds no mutable
//! state, and can be cloned freely across concurrent requests.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::{ApprovedLogic, Artifact, ArtifactKind};
use crate::metrics::METRICS;
use crate::rules::{RuleFinding, RuleId, RuleSet};

// ---------------------------------------------------------------------------
// Verdict
// ---------------------------------------------------------------------------

/// The outcome of checking one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationVerdict {
    pub passed: bool,
    pub violated_rules: BTreeSet<RuleId>,
    pub message: String,
    /// One entry per violated rule, in rule-set order.
    pub findings: Vec<RuleFinding>,
}

impl ValidationVerdict {
    fn from_findings(findings: Vec<RuleFinding>, total_rules: usize) -> Self {
        let violated_rules: BTreeSet<RuleId> = findings.iter().map(|f| f.rule).collect();
        let message = if findings.is_empty() {
            format!("all {total_rules} rules passed")
        } else {
            let names: Vec<String> = violated_rules.iter().map(ToString::to_string).collect();
            format!(
                "{} of {} rules violated: {}",
                violated_rules.len(),
                total_rules,
                names.join(", ")
            )
        };
        Self {
            passed: findings.is_empty(),
            violated_rules,
            message,
            findings,
        }
    }

    /// Render the verdict as instructions for the next Architect turn.
    pub fn feedback_text(&self) -> String {
        if self.passed {
            return format!("Validation passed: {}.", self.message);
        }
        let lines: Vec<&str> = self.findings.iter().map(|f| f.reason.as_str()).collect();
        format!(
            "Validation failed: {}.\nFix these specific issues:\n\n{}\n\nOutput the complete fixed script in ONE ```python ... ``` block.",
            self.message,
            lines.join("\n"),
        )
    }
}

/// Malformed gate input. Rule failures are verdicts, never errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("candidate content is empty")]
    EmptyCandidate,

    #[error("gate only accepts pipeline logic, got {kind}")]
    WrongKind { kind: ArtifactKind },
}

/// Gate decision carrying either the approval or the rejected candidate.
#[derive(Debug, Clone)]
pub enum Approval {
    Approved(ApprovedLogic),
    Rejected {
        candidate: Artifact,
        verdict: ValidationVerdict,
    },
}

// ---------------------------------------------------------------------------
// Gate
// ---------------------------------------------------------------------------

/// Rule-based checker over pipeline-logic candidates.
#[derive(Debug, Clone)]
pub struct ValidationGate {
    rules: Arc<RuleSet>,
}

impl ValidationGate {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules: Arc::new(rules),
        }
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Check a candidate artifact.
    pub fn check(&self, candidate: &Artifact) -> Result<ValidationVerdict, GateError> {
        if candidate.kind != ArtifactKind::PipelineLogic {
            return Err(GateError::WrongKind {
                kind: candidate.kind,
            });
        }
        self.check_source(&candidate.content)
    }

    /// Check raw source text.
    pub fn check_source(&self, code: &str) -> Result<ValidationVerdict, GateError> {
        if code.trim().is_empty() {
            return Err(GateError::EmptyCandidate);
        }
        let findings: Vec<RuleFinding> = self
            .rules
            .rules()
            .iter()
            .filter_map(|rule| rule.evaluate(code))
            .collect();

        let verdict = ValidationVerdict::from_findings(findings, self.rules.len());
        METRICS.inc_gate_evaluations();
        if !verdict.passed {
            METRICS.inc_gate_rejections();
        }
        Ok(verdict)
    }

    /// Check a candidate and, if it passes, wrap it as [`ApprovedLogic`].
    pub fn approve(&self, candidate: Artifact) -> Result<Approval, GateError> {
        let verdict = self.check(&candidate)?;
        if verdict.passed {
            Ok(Approval::Approved(ApprovedLogic::new(candidate, verdict)))
        } else {
            Ok(Approval::Rejected { candidate, verdict })
        }
    }

    /// Like [`approve`](Self::approve), but a blank pipeline-logic candidate
    /// is rejected with every rule violated instead of being an error.
    pub fn review(&self, candidate: Artifact) -> Result<Approval, GateError> {
        if candidate.kind == ArtifactKind::PipelineLogic && candidate.content.trim().is_empty() {
            return Ok(Approval::Rejected {
                verdict: self.empty_verdict(),
                candidate,
            });
        }
        self.approve(candidate)
    }

    fn empty_verdict(&self) -> ValidationVerdict {
        let findings = self
            .rules
            .rules()
            .iter()
            .map(|rule| RuleFinding {
                rule: rule.id(),
                reason: format!("[{}] FAIL: empty reply, nothing to check.", rule.id()),
            })
            .collect();
        let mut verdict = ValidationVerdict::from_findings(findings, self.rules.len());
        verdict.passed = false;
        verdict.message = format!("empty reply, output the full script; {}", verdict.message);
        METRICS.inc_gate_evaluations();
        METRICS.inc_gate_rejections();
        verdict
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const GOOD: &str = r#"
schema = StructType([StructField("event_timestamp", TimestampType(), True)])
df = spark.read.schema(schema).json(src)
df = df.withColumn("event_date", to_date(col("event_timestamp")))
df.write.partitionBy("event_date").parquet(dst)
"#;

    fn gate() -> ValidationGate {
        ValidationGate::new(RuleSet::standard().unwrap())
    }

    #[test]
    fn test_clean_candidate_passes_with_no_violations() {
        let verdict = gate().check_source(GOOD).unwrap();
        assert!(verdict.passed);
        assert!(verdict.violated_rules.is_empty());
        assert!(verdict.findings.is_empty());
    }

    #[test]
    fn test_all_violations_are_reported_not_just_first() {
        let verdict = gate().check_source("df = spark.read.json(src)").unwrap();
        assert!(!verdict.passed);
        assert_eq!(verdict.violated_rules.len(), 3);
        assert_eq!(verdict.findings.len(), 3);
        assert!(verdict.message.starts_with("3 of 3 rules violated"));
    }

    #[test]
    fn test_check_is_deterministic() {
        let g = gate();
        let code = "df.write.partitionBy('d').parquet(p)";
        assert_eq!(g.check_source(code).unwrap(), g.check_source(code).unwrap());
    }

    #[test]
    fn test_empty_candidate_is_an_error() {
        assert_eq!(gate().check_source("  \n"), Err(GateError::EmptyCandidate));
    }

    #[test]
    fn test_cloud_iac_is_rejected_as_wrong_kind() {
        let iac = Artifact::cloud_iac(
            "resource {}",
            Uuid::new_v4(),
            crate::domain::TargetPlatform::AwsGlue,
        );
        assert_eq!(
            gate().check(&iac),
            Err(GateError::WrongKind {
                kind: ArtifactKind::CloudIac
            })
        );
    }

    #[test]
    fn test_approve_wraps_passing_candidate() {
        let candidate = Artifact::pipeline_logic(GOOD, Uuid::new_v4());
        let id = candidate.id;
        match gate().approve(candidate).unwrap() {
            Approval::Approved(logic) => {
                assert_eq!(logic.artifact().id, id);
                assert!(logic.verdict().passed);
            }
            Approval::Rejected { verdict, .. } => panic!("unexpected rejection: {verdict:?}"),
        }
    }

    #[test]
    fn test_feedback_text_lists_every_finding() {
        let verdict = gate().check_source("df = spark.read.json(src)").unwrap();
        let text = verdict.feedback_text();
        assert!(text.contains("[partitioning_present]"));
        assert!(text.contains("[explicit_schema]"));
        assert!(text.contains("[date_derivation]"));
    }

    #[test]
    fn test_review_rejects_blank_candidate_on_every_rule() {
        let candidate = Artifact::pipeline_logic("  \n", Uuid::new_v4());
        assert_eq!(gate().approve(candidate.clone()).err(), Some(GateError::EmptyCandidate));

        match gate().review(candidate).unwrap() {
            Approval::Rejected { verdict, .. } => {
                assert!(!verdict.passed);
                assert_eq!(verdict.violated_rules.len(), 3);
                assert!(verdict.feedback_text().contains("empty reply, output the full script"));
            }
            Approval::Approved(_) => panic!("blank candidate approved"),
        }
    }
}
