//! Static rule configuration for the validation gate.
//!
//! A [`RuleConfig`] is the serializable form (TOML on disk, or
//! [`RuleConfig::standard`]). [`RuleSet::compile`] turns it into an immutable,
//! regex-backed rule set that is loaded once per process.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::domain::{Result, SquadError};

/// Identifies one rule category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleId {
    PartitioningPresent,
    ExplicitSchema,
    DateDerivation,
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RuleId::PartitioningPresent => "partitioning_present",
            RuleId::ExplicitSchema => "explicit_schema",
            RuleId::DateDerivation => "date_derivation",
        };
        write!(f, "{s}")
    }
}

/// A marker searched for in candidate code.
///
/// In TOML a bare string is a literal; `{ regex = "..." }` is a pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Marker {
    Literal(String),
    Pattern { regex: String },
}

impl Marker {
    fn compile(&self) -> std::result::Result<Regex, regex::Error> {
        match self {
            Marker::Literal(text) => Regex::new(&regex::escape(text)),
            Marker::Pattern { regex } => Regex::new(regex),
        }
    }

    fn display(&self) -> &str {
        match self {
            Marker::Literal(text) => text,
            Marker::Pattern { regex } => regex,
        }
    }
}

/// Serializable definition of one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: RuleId,
    pub description: String,
    /// At least one of these must appear.
    #[serde(default)]
    pub require_any: Vec<Marker>,
    /// None of these may appear.
    #[serde(default)]
    pub forbid: Vec<Marker>,
    /// Instruction appended to the finding so the Architect knows how to fix it.
    pub remedy: String,
}

/// Serializable rule configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub rules: Vec<RuleDefinition>,
}

impl RuleConfig {
    /// The three built-in PySpark rules.
    pub fn standard() -> Self {
        Self {
            rules: vec![
                RuleDefinition {
                    id: RuleId::PartitioningPresent,
                    description: "explicit partitioning directive for output writes".to_string(),
                    require_any: vec![Marker::Literal("partitionBy".to_string())],
                    forbid: vec![],
                    remedy: "Add .write.partitionBy('event_date') when saving output".to_string(),
                },
                RuleDefinition {
                    id: RuleId::ExplicitSchema,
                    description: "explicit schema declaration for all reads".to_string(),
                    require_any: vec![
                        Marker::Literal("StructType".to_string()),
                        Marker::Literal("StructField".to_string()),
                    ],
                    forbid: vec![Marker::Pattern {
                        regex: r#"(?i)inferSchema['"]?\s*(=|,)\s*['"]?true"#.to_string(),
                    }],
                    remedy: "Define the read schema with StructType/StructField and pass it via .schema(...); do not infer it".to_string(),
                },
                RuleDefinition {
                    id: RuleId::DateDerivation,
                    description: "named derivation step for the date partition column"
                        .to_string(),
                    require_any: vec![Marker::Literal("to_date(".to_string())],
                    forbid: vec![],
                    remedy: "Derive event_date using to_date(col('event_timestamp'))".to_string(),
                },
            ],
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

// ---------------------------------------------------------------------------
// Compiled rules
// ---------------------------------------------------------------------------

/// Why a single rule rejected a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFinding {
    pub rule: RuleId,
    pub reason: String,
}

/// A compiled rule: definition plus its matchers.
#[derive(Debug, Clone)]
pub struct Rule {
    definition: RuleDefinition,
    required: Vec<Regex>,
    forbidden: Vec<(Regex, String)>,
}

impl Rule {
    fn compile(definition: RuleDefinition) -> Result<Self> {
        if definition.require_any.is_empty() && definition.forbid.is_empty() {
            return Err(SquadError::InvalidRule {
                rule: definition.id.to_string(),
                reason: "rule declares no markers".to_string(),
            });
        }
        let invalid = |e: regex::Error| SquadError::InvalidRule {
            rule: definition.id.to_string(),
            reason: e.to_string(),
        };
        let required = definition
            .require_any
            .iter()
            .map(|m| m.compile().map_err(invalid))
            .collect::<Result<Vec<_>>>()?;
        let forbidden = definition
            .forbid
            .iter()
            .map(|m| Ok((m.compile().map_err(invalid)?, m.display().to_string())))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            definition,
            required,
            forbidden,
        })
    }

    pub fn id(&self) -> RuleId {
        self.definition.id
    }

    pub fn description(&self) -> &str {
        &self.definition.description
    }

    pub fn definition(&self) -> &RuleDefinition {
        &self.definition
    }

    /// Evaluate the predicate. `None` means the rule is satisfied.
    pub fn evaluate(&self, code: &str) -> Option<RuleFinding> {
        if !self.required.is_empty() && !self.required.iter().any(|re| re.is_match(code)) {
            let expected: Vec<&str> = self
                .definition
                .require_any
                .iter()
                .map(Marker::display)
                .collect();
            return Some(RuleFinding {
                rule: self.id(),
                reason: format!(
                    "[{}] FAIL: missing {} (expected one of: {}). {}",
                    self.id(),
                    self.definition.description,
                    expected.join(", "),
                    self.definition.remedy,
                ),
            });
        }

        if let Some((_, marker)) = self.forbidden.iter().find(|(re, _)| re.is_match(code)) {
            return Some(RuleFinding {
                rule: self.id(),
                reason: format!(
                    "[{}] FAIL: forbidden construct matched `{}`. {}",
                    self.id(),
                    marker,
                    self.definition.remedy,
                ),
            });
        }

        None
    }
}

/// Immutable, compiled rule set. Evaluation order is configuration order.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn compile(config: RuleConfig) -> Result<Self> {
        if config.rules.is_empty() {
            return Err(SquadError::InvalidConfig(
                "rule set must contain at least one rule".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for def in &config.rules {
            if !seen.insert(def.id) {
                return Err(SquadError::InvalidRule {
                    rule: def.id.to_string(),
                    reason: "duplicate rule id".to_string(),
                });
            }
        }
        let rules = config
            .rules
            .into_iter()
            .map(Rule::compile)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn standard() -> Result<Self> {
        Self::compile(RuleConfig::standard())
    }

    pub fn load(path: &Path) -> Result<Self> {
        Self::compile(RuleConfig::load(path)?)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
