//! Role-bound agents.
//!
//! An [`Agent`] pairs a [`ModelClient`] with a [`RoleTemplate`]. Roles are a
//! tagged enum: adding a role means adding an [`AgentRole`] variant, a
//! template and an [`AgentInput`] variant, not new control flow.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::cancel::CancellationHandle;
use crate::domain::{
    ApprovedLogic, Artifact, ArtifactKind, PipelineSpec, TargetPlatform, Turn, TurnRole,
};
use crate::gate::ValidationVerdict;
use crate::model::retry::{complete_with_retry, CallFailure, RetryConfig};
use crate::model::{ModelClient, ModelError, ModelRequest};

/// The agent roles in the squad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Architect,
    CloudArchitect,
}

impl AgentRole {
    pub fn turn_role(self) -> TurnRole {
        match self {
            AgentRole::Architect => TurnRole::Architect,
            AgentRole::CloudArchitect => TurnRole::CloudArchitect,
        }
    }

    pub fn artifact_kind(self) -> ArtifactKind {
        match self {
            AgentRole::Architect => ArtifactKind::PipelineLogic,
            AgentRole::CloudArchitect => ArtifactKind::CloudIac,
        }
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AgentRole::Architect => "architect",
            AgentRole::CloudArchitect => "cloud_architect",
        };
        write!(f, "{s}")
    }
}

/// Role-specific instructions. Templates are static definitions; they do not execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTemplate {
    pub role: AgentRole,
    pub instructions: String,
    /// Human-readable description (used in logs and CLI output).
    pub description: &'static str,
}

impl RoleTemplate {
    pub fn architect() -> Self {
        Self {
            role: AgentRole::Architect,
            instructions: "You are a Senior Data Engineer.\n\n\
                Every script you write MUST contain ALL THREE of the following:\n\
                [partitioning_present] .write.partitionBy('<partition column>') when saving output\n\
                [date_derivation] to_date(col('<timestamp column>')) to derive the partition column\n\
                [explicit_schema] StructType and StructField for an explicit read schema; never inferSchema\n\n\
                Output the COMPLETE script inside ONE single ```python ... ``` block."
                .to_string(),
            description: "Writes PySpark pipeline logic and repairs it from validator feedback",
        }
    }

    pub fn cloud_architect() -> Self {
        Self {
            role: AgentRole::CloudArchitect,
            instructions: "You are a Senior Cloud Architect for AWS and Azure.\n\n\
                Given an approved PySpark script and ONE deployment target, output the complete \
                infrastructure configuration for that target only, in a single clearly labelled section."
                .to_string(),
            description: "Translates approved pipeline logic into deployment configuration",
        }
    }

    pub fn for_role(role: AgentRole) -> Self {
        match role {
            AgentRole::Architect => Self::architect(),
            AgentRole::CloudArchitect => Self::cloud_architect(),
        }
    }
}

/// What an agent is asked to produce.
#[derive(Debug, Clone, Copy)]
pub enum AgentInput<'a> {
    /// Architect: generate (or regenerate) pipeline logic.
    Pipeline {
        spec: &'a PipelineSpec,
        feedback: Option<&'a ValidationVerdict>,
    },
    /// CloudArchitect: translate approved logic for one target.
    Translation {
        logic: &'a ApprovedLogic,
        target: TargetPlatform,
    },
}

impl AgentInput<'_> {
    fn accepted_by(&self) -> AgentRole {
        match self {
            AgentInput::Pipeline { .. } => AgentRole::Architect,
            AgentInput::Translation { .. } => AgentRole::CloudArchitect,
        }
    }
}

/// Per-call execution policy supplied by the orchestrator.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub retry: &'a RetryConfig,
    pub cancel: &'a CancellationHandle,
}

/// One model invocation's results.
#[derive(Debug, Clone, PartialEq)]
pub struct Generation {
    /// The reply as a conversation turn.
    pub turn: Turn,
    pub artifact: Artifact,
    pub prompt_tokens: u64,
    /// Calls made, including the successful one.
    pub attempts: u32,
    pub transient_failures: Vec<ModelError>,
}

impl Generation {
    /// Prompt plus completion tokens.
    pub fn tokens_consumed(&self) -> u64 {
        self.prompt_tokens + self.turn.token_count()
    }
}

/// Errors produced by an agent.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    #[error(transparent)]
    Call(#[from] CallFailure),

    #[error("{role} agent cannot handle input meant for {expected}")]
    RoleMismatch { role: AgentRole, expected: AgentRole },
}

/// A model client bound to a role template.
#[derive(Clone)]
pub struct Agent {
    template: RoleTemplate,
    client: Arc<dyn ModelClient>,
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("role", &self.template.role)
            .field("backend", &self.client.name())
            .finish()
    }
}

impl Agent {
    pub fn new(template: RoleTemplate, client: Arc<dyn ModelClient>) -> Self {
        Self { template, client }
    }

    pub fn architect(client: Arc<dyn ModelClient>) -> Self {
        Self::new(RoleTemplate::architect(), client)
    }

    pub fn cloud_architect(client: Arc<dyn ModelClient>) -> Self {
        Self::new(RoleTemplate::cloud_architect(), client)
    }

    /// Replace the role instructions, keeping the role.
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.template.instructions = instructions.into();
        self
    }

    pub fn role(&self) -> AgentRole {
        self.template.role
    }

    pub fn template(&self) -> &RoleTemplate {
        &self.template
    }

    pub fn backend(&self) -> &str {
        self.client.name()
    }

    /// Build the backend-agnostic request for `input`.
    pub fn request(&self, input: AgentInput<'_>, context: &[Turn]) -> ModelRequest {
        let task = match input {
            AgentInput::Pipeline { spec, feedback } => {
                let mut task = spec.render();
                match feedback.filter(|v| !v.passed) {
                    Some(verdict) => {
                        task.push('\n');
                        task.push_str(&verdict.feedback_text());
                    }
                    None => task.push_str(
                        "\nOutput the COMPLETE script inside ONE single ```python ... ``` block.",
                    ),
                }
                task
            }
            AgentInput::Translation { logic, target } => format!(
                "Deployment target: {}\nRequirements:\n{}\n\nApproved script:\n```python\n{}\n```",
                target.label(),
                target.deployment_brief(),
                logic.artifact().content,
            ),
        };

        ModelRequest {
            system: self.template.instructions.clone(),
            context: context.to_vec(),
            task,
        }
    }

    /// Invoke the model once (with retries) and turn the reply into an artifact.
    pub async fn generate(
        &self,
        input: AgentInput<'_>,
        context: &[Turn],
        invocation: Invocation<'_>,
    ) -> Result<Generation, AgentError> {
        let expected = input.accepted_by();
        if expected != self.role() {
            return Err(AgentError::RoleMismatch {
                role: self.role(),
                expected,
            });
        }

        let request = self.request(input, context);
        let role = self.role().to_string();
        let retried = complete_with_retry(
            self.client.as_ref(),
            &request,
            invocation.retry,
            invocation.cancel,
            &role,
        )
        .await?;

        let completion = retried.completion;
        let turn = Turn::new(
            self.role().turn_role(),
            completion.text.as_str(),
            completion.token_count,
        );
        let artifact = match input {
            AgentInput::Pipeline { .. } => {
                Artifact::pipeline_logic(extract_code_blocks(&completion.text), turn.id())
            }
            AgentInput::Translation { target, .. } => {
                Artifact::cloud_iac(completion.text.trim(), turn.id(), target)
            }
        };

        Ok(Generation {
            turn,
            artifact,
            prompt_tokens: request.prompt_tokens(),
            attempts: retried.attempts,
            transient_failures: retried.failures,
        })
    }
}

/// Fenced code block with an optional `python`/`pyspark` tag.
#[allow(clippy::expect_used)]
static FENCED_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:python|pyspark)?\s*\n?(.*?)```").expect("valid regex")
});

/// Extract the code from a model reply.
///
/// Joins every closed fenced block, each trimmed, or returns the trimmed reply
/// if it has none. A reply holding only empty fences yields an empty string.
pub fn extract_code_blocks(reply: &str) -> String {
    let blocks: Vec<&str> = FENCED_BLOCK_RE
        .captures_iter(reply)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .collect();

    if blocks.is_empty() {
        reply.trim().to_string()
    } else {
        blocks.join("\n\n")
    }
}
