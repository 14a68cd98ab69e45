//! Business-Rule Capability
//!
//! Org policy is a YAML-defined rule set; evaluation walks the extracted
//! fields against the policy knobs and emits cited violations. Optional
//! fields are validate-if-present: when supplied they must still be valid.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::ToolError;
use crate::model::{ExtractedFields, RuleEvaluation, RuleHint, RuleViolation};

/// Policy knobs for one document type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default = "default_min_age")]
    pub min_age: u32,
    /// 0 disables the ceiling
    #[serde(default = "default_max_age")]
    pub max_age: u32,

    #[serde(default = "default_true")]
    pub require_name: bool,
    #[serde(default = "default_name_min_len")]
    pub name_min_len: usize,
    #[serde(default = "default_name_max_len")]
    pub name_max_len: usize,
    /// Empty disables the check
    #[serde(default = "default_name_regex")]
    pub name_allow_regex: String,

    #[serde(default = "default_true")]
    pub require_dob: bool,

    #[serde(default = "default_true")]
    pub require_id_number: bool,
    #[serde(default = "default_id_regex")]
    pub id_allow_regex: String,
    /// 0 disables
    #[serde(default = "default_id_min_len")]
    pub id_min_len: usize,
    /// 0 disables
    #[serde(default = "default_id_max_len")]
    pub id_max_len: usize,

    #[serde(default = "default_true")]
    pub require_address: bool,
    #[serde(default = "default_address_min_len")]
    pub address_min_len: usize,
    #[serde(default = "default_address_min_words")]
    pub address_min_words: usize,

    /// Violation codes that downgrade the hint to REVIEW instead of REJECT
    /// when they are the only ones present
    #[serde(default)]
    pub review_only_codes: Vec<String>,
}

fn default_min_age() -> u32 {
    18
}
fn default_max_age() -> u32 {
    120
}
fn default_true() -> bool {
    true
}
fn default_name_min_len() -> usize {
    2
}
fn default_name_max_len() -> usize {
    80
}
fn default_name_regex() -> String {
    r"^[A-Za-z][A-Za-z\s\-\.'`]+$".to_string()
}
fn default_id_regex() -> String {
    r"^[A-Za-z0-9-]+$".to_string()
}
fn default_id_min_len() -> usize {
    8
}
fn default_id_max_len() -> usize {
    12
}
fn default_address_min_len() -> usize {
    10
}
fn default_address_min_words() -> usize {
    2
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            min_age: default_min_age(),
            max_age: default_max_age(),
            require_name: true,
            name_min_len: default_name_min_len(),
            name_max_len: default_name_max_len(),
            name_allow_regex: default_name_regex(),
            require_dob: true,
            require_id_number: true,
            id_allow_regex: default_id_regex(),
            id_min_len: default_id_min_len(),
            id_max_len: default_id_max_len(),
            require_address: true,
            address_min_len: default_address_min_len(),
            address_min_words: default_address_min_words(),
            review_only_codes: Vec::new(),
        }
    }
}

impl RuleSet {
    /// Evaluate extracted fields against this policy
    pub fn evaluate(&self, fields: &ExtractedFields) -> RuleEvaluation {
        let mut violations = Vec::new();

        // NAME
        match fields.name.as_deref() {
            None => {
                if self.require_name {
                    add(&mut violations, "NAME_MISSING", "Name is required", "require_name");
                }
            }
            Some(name) => {
                if name.chars().count() < self.name_min_len {
                    add(
                        &mut violations,
                        "NAME_TOO_SHORT",
                        format!("Name shorter than {}", self.name_min_len),
                        "name_min_len",
                    );
                }
                if name.chars().count() > self.name_max_len {
                    add(
                        &mut violations,
                        "NAME_TOO_LONG",
                        format!("Name longer than {}", self.name_max_len),
                        "name_max_len",
                    );
                }
                if regex_rejects(&self.name_allow_regex, name) {
                    add(
                        &mut violations,
                        "NAME_INVALID_CHARS",
                        "Invalid characters in name",
                        "name_allow_regex",
                    );
                }
            }
        }

        // DOB / AGE
        match fields.dob.as_deref() {
            None => {
                if self.require_dob {
                    add(
                        &mut violations,
                        "DOB_MISSING",
                        "DOB is required (YYYY-MM-DD)",
                        "require_dob",
                    );
                }
            }
            Some(dob) => match age_in_years(dob) {
                None => add(
                    &mut violations,
                    "DOB_INVALID",
                    "DOB must be a real past date in YYYY-MM-DD",
                    "require_dob",
                ),
                Some(age) => {
                    if age < self.min_age {
                        add(
                            &mut violations,
                            "AGE_TOO_LOW",
                            format!("Age {} < min {}", age, self.min_age),
                            "min_age",
                        );
                    }
                    if self.max_age > 0 && age > self.max_age {
                        add(
                            &mut violations,
                            "AGE_TOO_HIGH",
                            format!("Age {} > max {}", age, self.max_age),
                            "max_age",
                        );
                    }
                }
            },
        }

        // ID NUMBER
        match fields.id_number.as_deref() {
            None => {
                if self.require_id_number {
                    add(&mut violations, "ID_MISSING", "ID number is required", "require_id_number");
                }
            }
            Some(id) => {
                if self.id_min_len > 0 && id.chars().count() < self.id_min_len {
                    add(
                        &mut violations,
                        "ID_TOO_SHORT",
                        format!("ID shorter than {}", self.id_min_len),
                        "id_min_len",
                    );
                }
                if self.id_max_len > 0 && id.chars().count() > self.id_max_len {
                    add(
                        &mut violations,
                        "ID_TOO_LONG",
                        format!("ID longer than {}", self.id_max_len),
                        "id_max_len",
                    );
                }
                if regex_rejects(&self.id_allow_regex, id) {
                    add(
                        &mut violations,
                        "ID_INVALID_CHARS",
                        "Invalid characters/format in ID",
                        "id_allow_regex",
                    );
                }
            }
        }

        // ADDRESS
        match fields.address.as_deref() {
            None => {
                if self.require_address {
                    add(&mut violations, "ADDR_MISSING", "Address is required", "require_address");
                }
            }
            Some(addr) => {
                if self.address_min_len > 0 && addr.chars().count() < self.address_min_len {
                    add(
                        &mut violations,
                        "ADDR_TOO_SHORT",
                        format!("Address shorter than {} characters", self.address_min_len),
                        "address_min_len",
                    );
                }
                if self.address_min_words > 0 && word_count(addr) < self.address_min_words {
                    add(
                        &mut violations,
                        "ADDR_TOO_FEW_WORDS",
                        format!("Address has fewer than {} words", self.address_min_words),
                        "address_min_words",
                    );
                }
            }
        }

        let hint = if violations.is_empty() {
            RuleHint::Accept
        } else if violations
            .iter()
            .all(|v| self.review_only_codes.iter().any(|c| c == &v.rule_id))
        {
            RuleHint::Review
        } else {
            RuleHint::Reject
        };

        RuleEvaluation { violations, hint }
    }
}

fn add(
    violations: &mut Vec<RuleViolation>,
    rule_id: &str,
    description: impl Into<String>,
    citation: &str,
) {
    violations.push(RuleViolation {
        rule_id: rule_id.to_string(),
        description: description.into(),
        citation: citation.to_string(),
    });
}

/// True when the pattern is enabled, valid, and the value does not match
fn regex_rejects(pattern: &str, value: &str) -> bool {
    if pattern.trim().is_empty() {
        return false;
    }
    regex::Regex::new(pattern)
        .map(|re| !re.is_match(value))
        .unwrap_or(false)
}

/// Age in full years from a YYYY-MM-DD date; None for unparseable or future dates
fn age_in_years(dob: &str) -> Option<u32> {
    let dob = NaiveDate::parse_from_str(dob, "%Y-%m-%d").ok()?;
    Utc::now().date_naive().years_since(dob)
}

fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Rule-set lookup by document type
#[async_trait]
pub trait RuleSource: Send + Sync {
    async fn fetch_rules(&self, doc_type: &str) -> Result<RuleSet, ToolError>;
}

/// A fixed rule set served for every document type
#[derive(Debug, Clone, Default)]
pub struct StaticRules {
    rules: RuleSet,
}

impl StaticRules {
    pub fn new(rules: RuleSet) -> Self {
        Self { rules }
    }
}

#[async_trait]
impl RuleSource for StaticRules {
    async fn fetch_rules(&self, _doc_type: &str) -> Result<RuleSet, ToolError> {
        Ok(self.rules.clone())
    }
}

/// Rule sets loaded from `<dir>/<doc_type>.yaml`
#[derive(Debug, Clone)]
pub struct YamlRuleSource {
    dir: PathBuf,
}

impl YamlRuleSource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

#[async_trait]
impl RuleSource for YamlRuleSource {
    async fn fetch_rules(&self, doc_type: &str) -> Result<RuleSet, ToolError> {
        let path = self.dir.join(format!("{}.yaml", doc_type.to_ascii_uppercase()));
        let raw = tokio::fs::read_to_string(&path).await.map_err(|e| {
            ToolError::Permanent(format!("rules file not found at {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&raw)
            .map_err(|e| ToolError::Permanent(format!("invalid rules YAML {}: {e}", path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clean_fields() -> ExtractedFields {
        ExtractedFields {
            name: Some("Ada Lovelace".to_string()),
            dob: Some("1990-04-12".to_string()),
            address: Some("10 Bayes Rd, Cambridge".to_string()),
            id_number: Some("SG1234567".to_string()),
            email: Some("ada@example.com".to_string()),
            has_face_photo: Some(true),
        }
    }

    #[test]
    fn test_clean_profile_accepts() {
        let eval = RuleSet::default().evaluate(&clean_fields());
        assert!(eval.violations.is_empty(), "{:?}", eval.violations);
        assert_eq!(eval.hint, RuleHint::Accept);
    }

    #[test]
    fn test_minor_is_rejected_with_citation() {
        let mut fields = clean_fields();
        fields.dob = Some("2015-06-01".to_string());
        let eval = RuleSet::default().evaluate(&fields);
        assert_eq!(eval.hint, RuleHint::Reject);
        let v = &eval.violations[0];
        assert_eq!(v.rule_id, "AGE_TOO_LOW");
        assert_eq!(v.citation, "min_age");
    }

    #[test]
    fn test_missing_fields_each_cited() {
        let eval = RuleSet::default().evaluate(&ExtractedFields::default());
        let codes: Vec<&str> = eval.violations.iter().map(|v| v.rule_id.as_str()).collect();
        assert_eq!(
            codes,
            vec!["NAME_MISSING", "DOB_MISSING", "ID_MISSING", "ADDR_MISSING"]
        );
        assert_eq!(eval.hint, RuleHint::Reject);
    }

    #[test]
    fn test_id_length_bounds() {
        let mut fields = clean_fields();
        fields.id_number = Some("AB12".to_string());
        let eval = RuleSet::default().evaluate(&fields);
        assert!(eval.violations.iter().any(|v| v.rule_id == "ID_TOO_SHORT"));

        fields.id_number = Some("ABCDEFGHIJKLMNOP".to_string());
        let eval = RuleSet::default().evaluate(&fields);
        assert!(eval.violations.iter().any(|v| v.rule_id == "ID_TOO_LONG"));
    }

    #[test]
    fn test_address_quality() {
        let mut fields = clean_fields();
        fields.address = Some("Singapore".to_string());
        let eval = RuleSet::default().evaluate(&fields);
        let codes: Vec<&str> = eval.violations.iter().map(|v| v.rule_id.as_str()).collect();
        assert!(codes.contains(&"ADDR_TOO_SHORT"));
        assert!(codes.contains(&"ADDR_TOO_FEW_WORDS"));
    }

    #[test]
    fn test_review_only_codes_downgrade_hint() {
        let mut rules = RuleSet::default();
        rules.review_only_codes = vec!["ADDR_TOO_FEW_WORDS".to_string()];
        let mut fields = clean_fields();
        fields.address = Some("TanjongPagarRoad".to_string());
        let eval = rules.evaluate(&fields);
        assert_eq!(
            eval.violations
                .iter()
                .map(|v| v.rule_id.as_str())
                .collect::<Vec<_>>(),
            vec!["ADDR_TOO_FEW_WORDS"]
        );
        assert_eq!(eval.hint, RuleHint::Review);
    }

    #[test]
    fn test_invalid_dob_flagged() {
        let mut fields = clean_fields();
        fields.dob = Some("12/04/1990".to_string());
        let eval = RuleSet::default().evaluate(&fields);
        assert!(eval.violations.iter().any(|v| v.rule_id == "DOB_INVALID"));
    }
}
