//! Run Context
//!
//! The mutable, append-only bag of stage outputs for one document's run.
//! Exclusively owned by one orchestrator invocation; stages read prior
//! results from it and append their own. Nothing is ever deleted from it:
//! rework appends a fresh extraction attempt and keeps the old one for
//! audit.

use chrono::Utc;

use crate::model::{
    DecisionMessage, DocumentRef, ExtractionAttempt, JudgeVerdict, Outcome, ProvenanceEntry,
    RiskAssessment, RuleEvaluation, StageOutputs,
};

#[derive(Debug, Clone)]
pub struct RunContext {
    pub doc: DocumentRef,
    pub to_email: String,

    /// Ordered log of extraction attempts; the last one is live
    pub extraction_attempts: Vec<ExtractionAttempt>,
    pub judge: Option<JudgeVerdict>,
    pub rules: Option<RuleEvaluation>,
    pub risk: Option<RiskAssessment>,
    pub message: Option<DecisionMessage>,
    pub outcome: Option<Outcome>,

    /// How many times extraction was re-run after an insufficient judgment
    pub rework_count: u32,
    /// Ordered log of which stage ran and what it concluded
    pub provenance: Vec<ProvenanceEntry>,
}

impl RunContext {
    pub fn new(doc: DocumentRef, to_email: impl Into<String>) -> Self {
        Self {
            doc,
            to_email: to_email.into(),
            extraction_attempts: Vec::new(),
            judge: None,
            rules: None,
            risk: None,
            message: None,
            outcome: None,
            rework_count: 0,
            provenance: Vec::new(),
        }
    }

    /// The live extraction attempt, if any
    pub fn latest_extraction(&self) -> Option<&ExtractionAttempt> {
        self.extraction_attempts.last()
    }

    /// 1-based number the next extraction attempt will carry
    pub fn next_extraction_attempt(&self) -> u32 {
        self.extraction_attempts.len() as u32 + 1
    }

    /// Append a provenance entry for the given stage
    pub fn record_provenance(&mut self, stage: &str, summary: impl Into<String>) {
        self.provenance.push(ProvenanceEntry {
            stage: stage.to_string(),
            timestamp: Utc::now(),
            summary: summary.into(),
        });
    }

    /// Human-readable reasons supporting the decision, for the notification
    pub fn decision_reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if let Some(rules) = &self.rules {
            for v in &rules.violations {
                reasons.push(format!("{}: {}", v.rule_id, v.description));
            }
        }
        if let Some(risk) = &self.risk {
            reasons.push(format!("Watchlist grade {}", risk.grade.as_str()));
        }
        reasons
    }

    /// Snapshot everything the stages produced, for the run record
    pub fn snapshot_outputs(&self) -> StageOutputs {
        StageOutputs {
            extraction_attempts: self.extraction_attempts.clone(),
            judge: self.judge.clone(),
            rules: self.rules.clone(),
            risk: self.risk.clone(),
            message: self.message.clone(),
            provenance: self.provenance.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> DocumentRef {
        DocumentRef {
            doc_id: "KYC-1".to_string(),
            s3_uri: "s3://bucket/a.jpg".to_string(),
            doc_type: "KYC".to_string(),
        }
    }

    #[test]
    fn test_provenance_preserves_order() {
        let mut ctx = RunContext::new(doc(), "u@x.com");
        ctx.record_provenance("planning", "trigger validated");
        ctx.record_provenance("extract", "6/6 fields recognized");

        let stages: Vec<&str> = ctx.provenance.iter().map(|p| p.stage.as_str()).collect();
        assert_eq!(stages, vec!["planning", "extract"]);
    }

    #[test]
    fn test_attempt_numbering() {
        let ctx = RunContext::new(doc(), "u@x.com");
        assert!(ctx.latest_extraction().is_none());
        assert_eq!(ctx.next_extraction_attempt(), 1);
    }
}
