//! Pipeline Configuration and YAML Loading
//!
//! Policy knobs are defined in YAML and loaded at startup; every field has
//! a serde default so a partial file (or no file at all) yields a working
//! configuration.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::model::{Outcome, RiskGrade, RuleHint};

/// Complete pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Judge confidence below this triggers rework
    #[serde(default = "default_judge_threshold")]
    pub judge_confidence_threshold: f64,

    /// How many times extraction may be re-run after an insufficient judgment
    #[serde(default = "default_max_rework")]
    pub max_rework: u32,

    /// How many times the gateway retries a transient tool failure
    #[serde(default = "default_tool_retries")]
    pub tool_retries: u32,

    /// Per-tool call timeouts, in seconds
    #[serde(default)]
    pub tool_timeouts: ToolTimeouts,

    /// Watchlist similarity thresholds for grading
    #[serde(default)]
    pub risk_thresholds: RiskThresholds,

    /// Tie-break outcomes for rule-hint/risk-grade combinations outside the
    /// mandatory overrides
    #[serde(default)]
    pub decision_policy: DecisionPolicy,

    /// Document types accepted at the trigger boundary
    #[serde(default = "default_doc_types")]
    pub recognized_doc_types: Vec<String>,

    /// Upper bound on query page size
    #[serde(default = "default_max_page_size")]
    pub max_page_size: usize,

    /// Page size applied when the caller does not pass one
    #[serde(default = "default_page_size")]
    pub default_page_size: usize,
}

fn default_judge_threshold() -> f64 {
    0.75
}

fn default_max_rework() -> u32 {
    1
}

fn default_tool_retries() -> u32 {
    2
}

fn default_doc_types() -> Vec<String> {
    vec![
        "KYC".to_string(),
        "ID_CARD".to_string(),
        "PASSPORT".to_string(),
    ]
}

fn default_max_page_size() -> usize {
    200
}

fn default_page_size() -> usize {
    50
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            judge_confidence_threshold: default_judge_threshold(),
            max_rework: default_max_rework(),
            tool_retries: default_tool_retries(),
            tool_timeouts: ToolTimeouts::default(),
            risk_thresholds: RiskThresholds::default(),
            decision_policy: DecisionPolicy::default(),
            recognized_doc_types: default_doc_types(),
            max_page_size: default_max_page_size(),
            default_page_size: default_page_size(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse configuration from a YAML string
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(raw).map_err(ConfigError::Parse)
    }

    /// Whether the given doc_type is accepted at the trigger boundary
    pub fn recognizes_doc_type(&self, doc_type: &str) -> bool {
        self.recognized_doc_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(doc_type))
    }
}

/// Per-tool call timeouts, in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolTimeouts {
    #[serde(default = "default_tool_timeout")]
    pub ocr_secs: u64,
    #[serde(default = "default_tool_timeout")]
    pub rules_secs: u64,
    #[serde(default = "default_tool_timeout")]
    pub watchlist_secs: u64,
    #[serde(default = "default_tool_timeout")]
    pub notify_secs: u64,
    #[serde(default = "default_tool_timeout")]
    pub decide_secs: u64,
    #[serde(default = "default_tool_timeout")]
    pub persist_secs: u64,
}

fn default_tool_timeout() -> u64 {
    30
}

impl Default for ToolTimeouts {
    fn default() -> Self {
        Self {
            ocr_secs: default_tool_timeout(),
            rules_secs: default_tool_timeout(),
            watchlist_secs: default_tool_timeout(),
            notify_secs: default_tool_timeout(),
            decide_secs: default_tool_timeout(),
            persist_secs: default_tool_timeout(),
        }
    }
}

impl ToolTimeouts {
    pub fn ocr(&self) -> Duration {
        Duration::from_secs(self.ocr_secs)
    }
    pub fn rules(&self) -> Duration {
        Duration::from_secs(self.rules_secs)
    }
    pub fn watchlist(&self) -> Duration {
        Duration::from_secs(self.watchlist_secs)
    }
    pub fn notify(&self) -> Duration {
        Duration::from_secs(self.notify_secs)
    }
    pub fn decide(&self) -> Duration {
        Duration::from_secs(self.decide_secs)
    }
    pub fn persist(&self) -> Duration {
        Duration::from_secs(self.persist_secs)
    }
}

/// Similarity thresholds for translating a top watchlist score into a grade
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskThresholds {
    #[serde(default = "default_high_sim")]
    pub high: f64,
    #[serde(default = "default_medium_sim")]
    pub medium: f64,
}

fn default_high_sim() -> f64 {
    0.92
}

fn default_medium_sim() -> f64 {
    0.85
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            high: default_high_sim(),
            medium: default_medium_sim(),
        }
    }
}

impl RiskThresholds {
    /// Grade a top similarity score
    pub fn grade(&self, top_score: f64) -> RiskGrade {
        if top_score >= self.high {
            RiskGrade::High
        } else if top_score >= self.medium {
            RiskGrade::Med
        } else {
            RiskGrade::Low
        }
    }
}

/// One configured tie-break entry: when the rules stage hinted `hint` and the
/// risk stage graded `grade`, the decision is `outcome`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyOverride {
    pub hint: RuleHint,
    pub grade: RiskGrade,
    pub outcome: Outcome,
}

/// Decision tie-break policy.
///
/// The mandatory overrides (rule REJECT, risk HIGH) are hard-coded in the
/// decision stage; everything else consults this table first and falls back
/// to the judge verdict for unlisted combinations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionPolicy {
    #[serde(default = "default_overrides")]
    pub overrides: Vec<PolicyOverride>,
}

fn default_overrides() -> Vec<PolicyOverride> {
    vec![
        PolicyOverride {
            hint: RuleHint::Review,
            grade: RiskGrade::Low,
            outcome: Outcome::Review,
        },
        PolicyOverride {
            hint: RuleHint::Review,
            grade: RiskGrade::Med,
            outcome: Outcome::Review,
        },
        PolicyOverride {
            hint: RuleHint::Accept,
            grade: RiskGrade::Med,
            outcome: Outcome::Review,
        },
    ]
}

impl Default for DecisionPolicy {
    fn default() -> Self {
        Self {
            overrides: default_overrides(),
        }
    }
}

impl DecisionPolicy {
    /// Look up a configured outcome for the given combination
    pub fn lookup(&self, hint: RuleHint, grade: RiskGrade) -> Option<Outcome> {
        self.overrides
            .iter()
            .find(|o| o.hint == hint && o.grade == grade)
            .map(|o| o.outcome)
    }
}

/// Errors raised while loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse config YAML: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.judge_confidence_threshold, 0.75);
        assert_eq!(config.max_rework, 1);
        assert_eq!(config.max_page_size, 200);
        assert!(config.recognizes_doc_type("kyc"));
        assert!(!config.recognizes_doc_type("UTILITY_BILL"));
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = PipelineConfig::from_yaml("judge_confidence_threshold: 0.9\n").unwrap();
        assert_eq!(config.judge_confidence_threshold, 0.9);
        assert_eq!(config.max_rework, 1);
        assert_eq!(config.tool_timeouts.ocr_secs, 30);
    }

    #[test]
    fn test_risk_grading() {
        let thresholds = RiskThresholds::default();
        assert_eq!(thresholds.grade(0.95), RiskGrade::High);
        assert_eq!(thresholds.grade(0.92), RiskGrade::High);
        assert_eq!(thresholds.grade(0.88), RiskGrade::Med);
        assert_eq!(thresholds.grade(0.5), RiskGrade::Low);
    }

    #[test]
    fn test_policy_lookup() {
        let policy = DecisionPolicy::default();
        assert_eq!(
            policy.lookup(RuleHint::Accept, RiskGrade::Med),
            Some(Outcome::Review)
        );
        assert_eq!(policy.lookup(RuleHint::Accept, RiskGrade::Low), None);
    }
}
