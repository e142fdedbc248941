//! Pipeline generation request.

use serde::{Deserialize, Serialize};

/// Rough data volume the generated job must handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleTier {
    Small,
    #[default]
    Medium,
    Large,
}

impl ScaleTier {
    fn describe(self) -> &'static str {
        match self {
            ScaleTier::Small => "small (under 50GB, single-node friendly)",
            ScaleTier::Medium => "medium (50GB to 1TB, distributed)",
            ScaleTier::Large => "large (over 1TB, heavily partitioned)",
        }
    }
}

impl std::str::FromStr for ScaleTier {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "small" => Ok(ScaleTier::Small),
            "medium" => Ok(ScaleTier::Medium),
            "large" => Ok(ScaleTier::Large),
            other => Err(format!("unknown scale tier: {other}")),
        }
    }
}

/// One column of the source schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    pub data_type: String,
}

impl SchemaField {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Structured description of the pipeline to generate.
///
/// Opaque to the orchestrator: only the Architect reads it, through
/// [`PipelineSpec::render`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    pub task: String,
    #[serde(default)]
    pub source_fields: Vec<SchemaField>,
    pub partition_column: String,
    pub timestamp_column: String,
    #[serde(default)]
    pub scale_tier: ScaleTier,
}

impl PipelineSpec {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            source_fields: Vec::new(),
            partition_column: "event_date".to_string(),
            timestamp_column: "event_timestamp".to_string(),
            scale_tier: ScaleTier::default(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, data_type: impl Into<String>) -> Self {
        self.source_fields.push(SchemaField::new(name, data_type));
        self
    }

    pub fn with_partition_column(mut self, column: impl Into<String>) -> Self {
        self.partition_column = column.into();
        self
    }

    pub fn with_timestamp_column(mut self, column: impl Into<String>) -> Self {
        self.timestamp_column = column.into();
        self
    }

    pub fn with_scale_tier(mut self, tier: ScaleTier) -> Self {
        self.scale_tier = tier;
        self
    }

    /// Render the request as prompt text.
    pub fn render(&self) -> String {
        let mut out = format!(
            "Task: {}\nScale tier: {}\nPartition column: {} (derived from {})\n",
            self.task,
            self.scale_tier.describe(),
            self.partition_column,
            self.timestamp_column,
        );
        if !self.source_fields.is_empty() {
            out.push_str("Source schema:\n");
            for field in &self.source_fields {
                out.push_str(&format!("- {}: {}\n", field.name, field.data_type));
            }
        }
        out
    }
}
