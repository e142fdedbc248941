//! Generated artifacts and the approval wrapper that gates translation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::gate::ValidationVerdict;

/// What an artifact contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    PipelineLogic,
    CloudIac,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ArtifactKind::PipelineLogic => "pipeline_logic",
            ArtifactKind::CloudIac => "cloud_iac",
        };
        write!(f, "{s}")
    }
}

/// Deployment platform a CloudArchitect translation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetPlatform {
    AwsGlue,
    AzureDatabricks,
}

impl TargetPlatform {
    /// Every supported target, in translation order.
    pub fn all() -> Vec<TargetPlatform> {
        vec![TargetPlatform::AwsGlue, TargetPlatform::AzureDatabricks]
    }

    /// Heading used in prompts and transcripts.
    pub fn label(self) -> &'static str {
        match self {
            TargetPlatform::AwsGlue => "AWS Glue (Terraform)",
            TargetPlatform::AzureDatabricks => "Azure Databricks (YAML Pipeline)",
        }
    }

    /// Infrastructure requirements handed to the CloudArchitect for this target.
    pub fn deployment_brief(self) -> &'static str {
        match self {
            TargetPlatform::AwsGlue => {
                "- aws_iam_role with a glue.amazonaws.com trust policy\n\
                 - aws_glue_job: worker_type G.2X, number_of_workers 10, glue_version 4.0"
            }
            TargetPlatform::AzureDatabricks => {
                "- Azure DevOps pipeline triggering on the main branch\n\
                 - Cluster: Standard_DS3_v2, spark_version 13.3.x-scala2.12, num_workers 8"
            }
        }
    }
}

impl std::fmt::Display for TargetPlatform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TargetPlatform::AwsGlue => "aws_glue",
            TargetPlatform::AzureDatabricks => "azure_databricks",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TargetPlatform {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "aws_glue" | "aws" => Ok(TargetPlatform::AwsGlue),
            "azure_databricks" | "azure" => Ok(TargetPlatform::AzureDatabricks),
            other => Err(format!("unknown target platform: {other}")),
        }
    }
}

/// A generated payload with a kind tag and a link to the turn that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub kind: ArtifactKind,
    pub content: String,
    /// Id of the `Turn` whose model reply this artifact was extracted from.
    pub source_turn: Uuid,
    /// Set only for `CloudIac` artifacts.
    pub target: Option<TargetPlatform>,
    pub created_at: DateTime<Utc>,
}

impl Artifact {
    /// A pipeline-logic candidate. Candidates carry no approval until gated.
    pub fn pipeline_logic(content: impl Into<String>, source_turn: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ArtifactKind::PipelineLogic,
            content: content.into(),
            source_turn,
            target: None,
            created_at: Utc::now(),
        }
    }

    /// Only reachable through a CloudArchitect translation of [`ApprovedLogic`].
    pub(crate) fn cloud_iac(
        content: impl Into<String>,
        source_turn: Uuid,
        target: TargetPlatform,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: ArtifactKind::CloudIac,
            content: content.into(),
            source_turn,
            target: Some(target),
            created_at: Utc::now(),
        }
    }
}

/// Pipeline logic that passed the validation gate.
///
/// Constructed only by [`crate::gate::ValidationGate::approve`], so holding one
/// proves the wrapped artifact's verdict passed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApprovedLogic {
    artifact: Artifact,
    verdict: ValidationVerdict,
}

impl ApprovedLogic {
    pub(crate) fn new(artifact: Artifact, verdict: ValidationVerdict) -> Self {
        debug_assert!(verdict.passed);
        debug_assert_eq!(artifact.kind, ArtifactKind::PipelineLogic);
        Self { artifact, verdict }
    }

    pub fn artifact(&self) -> &Artifact {
        &self.artifact
    }

    pub fn verdict(&self) -> &ValidationVerdict {
        &self.verdict
    }

    pub fn into_artifact(self) -> Artifact {
        self.artifact
    }
}
