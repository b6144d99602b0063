//! Compiled, validated gate policy.

use crate::config::{Config, GateModes};
use crate::core::detect::{BashClassifier, RestrictedSubagents};
use crate::core::taxonomy::ToolTaxonomy;
use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Everything the gates need from configuration, checked once at startup.
#[derive(Debug, Clone)]
pub struct Policy {
    pub taxonomy: ToolTaxonomy,
    pub bash: BashClassifier,
    pub restricted: RestrictedSubagents,
    pub compliance_threshold: u32,
    pub workflow_thresholds: BTreeMap<String, u32>,
    pub safe_temp_prefixes: Vec<PathBuf>,
    pub bypass_prefix: String,
    pub modes: GateModes,
    pub hydration_dir: PathBuf,
    pub hydration_file_prefix: String,
    pub max_events: usize,
}

impl Policy {
    /// Compile and validate configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Configuration` for an invalid tool taxonomy, a
    /// threshold of zero, an empty bypass prefix or hydration file prefix,
    /// or an uncompilable pattern.
    pub fn from_config(config: &Config) -> Result<Self> {
        let gates = &config.gates;
        if gates.compliance_threshold == 0 {
            return Err(Error::Configuration(
                "gates.compliance_threshold must be at least 1".to_string(),
            ));
        }
        if let Some((workflow, _)) = gates.workflow_thresholds.iter().find(|(_, t)| **t == 0) {
            return Err(Error::Configuration(format!(
                "gates.workflow_thresholds.{workflow} must be at least 1"
            )));
        }
        if gates.bypass_prefix.trim().is_empty() {
            return Err(Error::Configuration(
                "gates.bypass_prefix must not be empty".to_string(),
            ));
        }
        if config.hydration.file_prefix.is_empty() {
            return Err(Error::Configuration(
                "hydration.file_prefix must not be empty".to_string(),
            ));
        }

        Ok(Self {
            taxonomy: ToolTaxonomy::from_config(&config.tools)?,
            bash: BashClassifier::from_config(&config.bash)?,
            restricted: RestrictedSubagents::new(&config.subagents.restricted)?,
            compliance_threshold: gates.compliance_threshold,
            workflow_thresholds: gates.workflow_thresholds.clone(),
            safe_temp_prefixes: gates.safe_temp_prefixes.clone(),
            bypass_prefix: gates.bypass_prefix.clone(),
            modes: gates.modes,
            hydration_dir: config.hydration.temp_dir.clone(),
            hydration_file_prefix: config.hydration.file_prefix.clone(),
            max_events: config.trace.max_events,
        })
    }

    /// Compliance threshold for the active workflow.
    #[must_use]
    pub fn threshold_for(&self, workflow: Option<&str>) -> u32 {
        workflow
            .and_then(|w| self.workflow_thresholds.get(w))
            .copied()
            .unwrap_or(self.compliance_threshold)
    }

    /// Whether a prompt opts out of hydration and task binding.
    #[must_use]
    pub fn is_bypass_prompt(&self, prompt: &str) -> bool {
        prompt.trim_start().starts_with(&self.bypass_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_compiles() {
        let policy = Policy::from_config(&Config::default()).unwrap();
        assert_eq!(policy.compliance_threshold, 7);
        assert_eq!(policy.threshold_for(None), 7);
        assert_eq!(policy.threshold_for(Some("simple-question")), 15);
        assert_eq!(policy.threshold_for(Some("unknown-workflow")), 7);
    }

    #[test]
    fn zero_threshold_rejected() {
        let mut config = Config::default();
        config.gates.compliance_threshold = 0;
        assert!(matches!(
            Policy::from_config(&config),
            Err(Error::Configuration(_))
        ));

        let mut config = Config::default();
        config
            .gates
            .workflow_thresholds
            .insert("bulk".to_string(), 0);
        assert!(Policy::from_config(&config).is_err());
    }

    #[test]
    fn taxonomy_errors_surface() {
        let mut config = Config::default();
        config.tools.spawn.push("Write".to_string());
        let err = Policy::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("Write"));
    }

    #[test]
    fn bypass_prompt() {
        let policy = Policy::from_config(&Config::default()).unwrap();
        assert!(policy.is_bypass_prompt(".fix typo in README"));
        assert!(policy.is_bypass_prompt("  . quick one"));
        assert!(!policy.is_bypass_prompt("fix typo."));
    }
}
