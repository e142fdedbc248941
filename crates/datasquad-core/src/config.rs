//! Squad configuration.
//!
//! Loaded from an optional TOML file, then overridden by environment
//! variables. A missing file yields defaults.
//!
//! ```toml
//! targets = ["aws_glue", "azure_databricks"]
//! rules_path = "rules.toml"
//!
//! [budget]
//! per_call_token_budget = 4000
//! daily_token_limit = 200000
//! max_validation_attempts = 4
//!
//! [retry]
//! max_retries = 3
//! base_delay_ms = 1000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::{Result, SquadError, TargetPlatform};
use crate::model::retry::RetryConfig;
use crate::rules::RuleSet;

pub const ENV_DAILY_TOKEN_LIMIT: &str = "DATASQUAD_DAILY_TOKEN_LIMIT";
pub const ENV_MAX_ATTEMPTS: &str = "DATASQUAD_MAX_ATTEMPTS";

/// Token and attempt limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Ceiling on the context sent with a single model call.
    pub per_call_token_budget: u64,
    /// Ceiling on tokens consumed across all requests since the last reset.
    pub daily_token_limit: u64,
    /// Default bound on Architect generations per request.
    pub max_validation_attempts: u32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            per_call_token_budget: 4_000,
            daily_token_limit: 200_000,
            max_validation_attempts: 4,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SquadConfig {
    pub budget: BudgetConfig,
    pub retry: RetryConfig,
    /// Translation targets, in order.
    pub targets: Vec<TargetPlatform>,
    /// Rule definitions; the built-in set when absent.
    pub rules_path: Option<PathBuf>,
}

impl Default for SquadConfig {
    fn default() -> Self {
        Self {
            budget: BudgetConfig::default(),
            retry: RetryConfig::default(),
            targets: TargetPlatform::all(),
            rules_path: None,
        }
    }
}

impl SquadConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given and present, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) if p.exists() => {
                let text = std::fs::read_to_string(p)?;
                let mut config = Self::from_toml_str(&text)?;
                // Relative rule paths resolve against the config file.
                if let (Some(rules), Some(parent)) = (config.rules_path.as_mut(), p.parent()) {
                    if rules.is_relative() {
                        *rules = parent.join(&*rules);
                    }
                }
                config
            }
            _ => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_DAILY_TOKEN_LIMIT) {
            self.budget.daily_token_limit = parse_override(ENV_DAILY_TOKEN_LIMIT, &raw)?;
        }
        if let Some(raw) = lookup(ENV_MAX_ATTEMPTS) {
            self.budget.max_validation_attempts = parse_override(ENV_MAX_ATTEMPTS, &raw)?;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<()> {
        if self.budget.max_validation_attempts == 0 {
            return Err(SquadError::InvalidConfig(
                "budget.max_validation_attempts must be >= 1".to_string(),
            ));
        }
        if self.budget.per_call_token_budget == 0 {
            return Err(SquadError::InvalidConfig(
                "budget.per_call_token_budget must be >= 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.retry.jitter_factor) {
            return Err(SquadError::InvalidConfig(
                "retry.jitter_factor must be within 0.0..=1.0".to_string(),
            ));
        }
        if self.retry.call_timeout_ms == 0 {
            return Err(SquadError::InvalidConfig(
                "retry.call_timeout_ms must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Compile the configured rule set.
    pub fn rule_set(&self) -> Result<RuleSet> {
        match &self.rules_path {
            Some(path) => RuleSet::load(path),
            None => RuleSet::standard(),
        }
    }
}

fn parse_override<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| SquadError::InvalidConfig(format!("{key}={raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_both_targets() {
        let config = SquadConfig::default();
        assert_eq!(config.targets, TargetPlatform::all());
        assert_eq!(config.budget.max_validation_attempts, 4);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = SquadConfig::from_toml_str(
            r#"
targets = ["aws_glue"]

[budget]
daily_token_limit = 500
"#,
        )
        .unwrap();
        assert_eq!(config.targets, vec![TargetPlatform::AwsGlue]);
        assert_eq!(config.budget.daily_token_limit, 500);
        assert_eq!(config.budget.per_call_token_budget, 4_000);
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_overrides_replace_file_values() {
        let mut config = SquadConfig::default();
        config
            .apply_overrides(|key| match key {
                ENV_DAILY_TOKEN_LIMIT => Some("1234".to_string()),
                ENV_MAX_ATTEMPTS => Some(" 2 ".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.budget.daily_token_limit, 1234);
        assert_eq!(config.budget.max_validation_attempts, 2);
    }

    #[test]
    fn test_bad_override_is_reported() {
        let mut config = SquadConfig::default();
        let err = config
            .apply_overrides(|key| (key == ENV_MAX_ATTEMPTS).then(|| "many".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_ATTEMPTS));
    }

    #[test]
    fn test_zero_attempts_is_invalid() {
        let err = SquadConfig::from_toml_str("[budget]\nmax_validation_attempts = 0\n");
        assert!(matches!(err, Err(SquadError::InvalidConfig(_))));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SquadConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.targets, TargetPlatform::all());
    }

    #[test]
    fn test_relative_rules_path_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("squad.toml");
        std::fs::write(&path, "rules_path = \"rules.toml\"\n").unwrap();

        let config = SquadConfig::load(Some(&path)).unwrap();
        assert_eq!(config.rules_path, Some(dir.path().join("rules.toml")));
    }
}
