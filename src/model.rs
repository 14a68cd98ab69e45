//! Run Data Model
//!
//! The typed results each stage produces, and the `RunRecord` snapshot the
//! orchestrator persists when a run reaches a terminal state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::FailureKind;

/// Immutable reference to the document under review, supplied at trigger time
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Caller-assigned document identifier (e.g., "KYC-2025-0001")
    pub doc_id: String,
    /// Location of the document image (s3:// URI or local path)
    pub s3_uri: String,
    /// Document type (e.g., "KYC", "ID_CARD", "PASSPORT")
    pub doc_type: String,
}

/// Identity fields recognized from the document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExtractedFields {
    pub name: Option<String>,
    pub dob: Option<String>,
    pub address: Option<String>,
    pub id_number: Option<String>,
    pub email: Option<String>,
    pub has_face_photo: Option<bool>,
}

impl ExtractedFields {
    /// Names of the core fields the judge expects to be present
    pub const CORE_FIELDS: [&'static str; 4] = ["name", "dob", "address", "id_number"];

    /// Fraction of core fields that were recognized, in [0,1]
    pub fn core_coverage(&self) -> f64 {
        let present = [
            self.name.is_some(),
            self.dob.is_some(),
            self.address.is_some(),
            self.id_number.is_some(),
        ]
        .iter()
        .filter(|p| **p)
        .count();
        present as f64 / Self::CORE_FIELDS.len() as f64
    }

    /// Core fields that were not recognized
    pub fn missing_core_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.is_none() {
            missing.push("name");
        }
        if self.dob.is_none() {
            missing.push("dob");
        }
        if self.address.is_none() {
            missing.push("address");
        }
        if self.id_number.is_none() {
            missing.push("id_number");
        }
        missing
    }
}

/// One extraction pass over the document.
///
/// Rework produces a new attempt; prior attempts are retained for audit and
/// never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionAttempt {
    /// 1-based attempt number within the run
    pub attempt: u32,
    pub fields: ExtractedFields,
    /// Raw recognized text as returned by the OCR engine
    pub raw_text: String,
    /// Per-field confidence in [0,1]
    pub field_confidence: HashMap<String, f64>,
    /// Overall extraction confidence in [0,1]
    pub confidence: f64,
    pub extracted_at: DateTime<Utc>,
}

/// Outcome of the completeness judgment over one extraction attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    Fail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeVerdict {
    pub verdict: Verdict,
    pub rationale: String,
    /// Judge confidence in [0,1]; below the configured threshold triggers rework
    pub confidence: f64,
    /// Guidance carried into the next extraction attempt, if any
    pub rework_notes: Option<String>,
}

/// Business-rule decision hint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleHint {
    Accept,
    Reject,
    Review,
}

/// A single policy violation with its citation into the rule set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleViolation {
    /// Stable violation code (e.g., "AGE_TOO_LOW")
    pub rule_id: String,
    pub description: String,
    /// Policy knob the violation cites (e.g., "min_age")
    pub citation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleEvaluation {
    pub violations: Vec<RuleViolation>,
    pub hint: RuleHint,
}

/// Watchlist risk grade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskGrade {
    Low,
    Med,
    High,
}

impl RiskGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskGrade::Low => "LOW",
            RiskGrade::Med => "MED",
            RiskGrade::High => "HIGH",
        }
    }
}

/// One watchlist candidate, ordered by descending score
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchlistMatch {
    /// Candidate entity name as listed
    pub candidate: String,
    /// Similarity score in [0,1]
    pub score: f64,
    /// Watchlist the candidate came from
    pub source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub grade: RiskGrade,
    pub matches: Vec<WatchlistMatch>,
    pub explanation: String,
}

/// Delivery channel for the decision message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Channel {
    Email,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Sent,
    Failed,
    Skipped,
}

/// The composed decision notification and its delivery status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionMessage {
    pub draft: String,
    pub channel: Channel,
    pub status: DeliveryStatus,
}

/// The substantive decision reached for the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Accept,
    Reject,
    Review,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Accept => "ACCEPT",
            Outcome::Reject => "REJECT",
            Outcome::Review => "REVIEW",
        }
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACCEPT" => Ok(Outcome::Accept),
            "REJECT" => Ok(Outcome::Reject),
            "REVIEW" => Ok(Outcome::Review),
            other => Err(format!("unknown outcome '{other}'")),
        }
    }
}

/// Run completion status as persisted on the record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Processed,
    Failed,
    Inprocess,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Processed => "PROCESSED",
            RunStatus::Failed => "FAILED",
            RunStatus::Inprocess => "INPROCESS",
        }
    }

    /// Terminal statuses are never mutated once written
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Inprocess)
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PROCESSED" => Ok(RunStatus::Processed),
            "FAILED" => Ok(RunStatus::Failed),
            "INPROCESS" => Ok(RunStatus::Inprocess),
            other => Err(format!("unknown run status '{other}'")),
        }
    }
}

/// One provenance entry: which stage ran and what it concluded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceEntry {
    pub stage: String,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
}

/// Everything the stages produced during the run, kept on the record for audit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageOutputs {
    pub extraction_attempts: Vec<ExtractionAttempt>,
    pub judge: Option<JudgeVerdict>,
    pub rules: Option<RuleEvaluation>,
    pub risk: Option<RiskAssessment>,
    pub message: Option<DecisionMessage>,
    pub provenance: Vec<ProvenanceEntry>,
}

/// Structured description of a terminal failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFailure {
    pub kind: FailureKind,
    pub detail: String,
}

/// Immutable snapshot persisted when a run completes (or fails).
///
/// Exactly one record exists per `doc_id` per run attempt; `attempt_no`
/// distinguishes legitimate resubmissions of the same document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub doc_id: String,
    /// 1-based run ordinal for this doc_id
    pub attempt_no: u32,
    pub customer_name: Option<String>,
    pub identification_no: Option<String>,
    pub final_decision: RunStatus,
    /// Substantive decision; present only when the pipeline completed
    pub outcome: Option<Outcome>,
    /// Failure description; present only when `final_decision` is FAILED
    pub failure: Option<RunFailure>,
    pub created_at: DateTime<Utc>,
    pub stage_outputs: StageOutputs,
    pub rework_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_core_coverage() {
        let mut fields = ExtractedFields::default();
        assert_eq!(fields.core_coverage(), 0.0);
        assert_eq!(fields.missing_core_fields().len(), 4);

        fields.name = Some("Ada Lovelace".to_string());
        fields.dob = Some("1990-04-12".to_string());
        assert_eq!(fields.core_coverage(), 0.5);

        fields.address = Some("10 Bayes Rd, Cambridge".to_string());
        fields.id_number = Some("SG1234567".to_string());
        assert_eq!(fields.core_coverage(), 1.0);
        assert!(fields.missing_core_fields().is_empty());
    }

    #[test]
    fn test_run_status_parse_and_terminal() {
        assert_eq!("processed".parse::<RunStatus>(), Ok(RunStatus::Processed));
        assert_eq!("FAILED".parse::<RunStatus>(), Ok(RunStatus::Failed));
        assert!("DONE".parse::<RunStatus>().is_err());

        assert!(RunStatus::Processed.is_terminal());
        assert!(RunStatus::Failed.is_terminal());
        assert!(!RunStatus::Inprocess.is_terminal());
    }
}
