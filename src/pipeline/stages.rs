//! Stage Implementations
//!
//! Logic shells for the five stages. Each consumes the run context, calls
//! the tool gateway, and appends one typed result. The heavy lifting (OCR,
//! rule lookup, screening, judgment, delivery) lives behind the gateway.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;

use super::context::RunContext;
use super::stage::{Stage, StageKind, StageReport};
use crate::config::{DecisionPolicy, RiskThresholds};
use crate::error::PipelineError;
use crate::model::{
    Channel, DecisionMessage, DeliveryStatus, ExtractedFields, ExtractionAttempt, JudgeVerdict,
    Outcome, RiskAssessment, RiskGrade, RuleEvaluation, RuleHint, Verdict,
};
use crate::tools::{compose_decision_email, IdentityQuery, JudgeInput, ToolGateway};

/// Nominal confidence assigned to a field the recognizer labeled cleanly.
/// The OCR contract returns raw text only, so per-field scores are assigned
/// at parse time.
const RECOGNIZED_FIELD_CONFIDENCE: f64 = 0.95;

const FIELD_COUNT: usize = 6;

fn missing_prior(stage: &str, needs: &str) -> PipelineError {
    PipelineError::ToolPermanent {
        tool: "pipeline".to_string(),
        message: format!("{stage} stage requires a prior {needs}"),
    }
}

// ─────────────────────────── Extraction ───────────────────────────

/// Runs OCR over the document and parses labeled fields out of the raw text
pub struct ExtractionStage;

impl ExtractionStage {
    /// Parse `Label: value` lines out of recognized text
    fn parse_fields(raw_text: &str) -> (ExtractedFields, HashMap<String, f64>) {
        let mut fields = ExtractedFields::default();
        let mut confidence = HashMap::new();

        let mut capture = |label: &str, key: &str| -> Option<String> {
            let pattern = format!(r"(?im)^\s*{label}\s*[:=]\s*(.+?)\s*$");
            let value = regex::Regex::new(&pattern)
                .ok()?
                .captures(raw_text)?
                .get(1)?
                .as_str()
                .trim()
                .to_string();
            if value.is_empty() {
                None
            } else {
                confidence.insert(key.to_string(), RECOGNIZED_FIELD_CONFIDENCE);
                Some(value)
            }
        };

        fields.name = capture("Name", "name");
        fields.dob = capture("DOB", "dob");
        fields.address = capture("Address", "address");
        fields.id_number = capture("ID", "id_number");
        fields.email = capture("Email", "email");
        fields.has_face_photo = capture("Face", "face_photo")
            .map(|v| matches!(v.to_ascii_uppercase().as_str(), "YES" | "TRUE" | "Y"));

        (fields, confidence)
    }
}

#[async_trait]
impl Stage for ExtractionStage {
    fn kind(&self) -> StageKind {
        StageKind::Extract
    }

    async fn execute(
        &self,
        ctx: &mut RunContext,
        tools: &ToolGateway,
    ) -> Result<StageReport, PipelineError> {
        let raw_text = tools.extract(&ctx.doc.s3_uri).await?;
        let (fields, field_confidence) = Self::parse_fields(&raw_text);

        let recognized = field_confidence.len();
        let confidence = field_confidence.values().sum::<f64>() / FIELD_COUNT as f64;

        let attempt = ExtractionAttempt {
            attempt: ctx.next_extraction_attempt(),
            fields,
            raw_text,
            field_confidence,
            confidence,
            extracted_at: Utc::now(),
        };
        let summary = format!(
            "attempt {}: recognized {recognized}/{FIELD_COUNT} fields, confidence {confidence:.2}",
            attempt.attempt
        );
        ctx.extraction_attempts.push(attempt);

        Ok(StageReport::new(summary).with_confidence(confidence))
    }
}

// ─────────────────────────── Judgment ───────────────────────────

/// Asks the decision provider whether the live extraction is good enough
pub struct JudgmentStage;

#[async_trait]
impl Stage for JudgmentStage {
    fn kind(&self) -> StageKind {
        StageKind::Judge
    }

    async fn execute(
        &self,
        ctx: &mut RunContext,
        tools: &ToolGateway,
    ) -> Result<StageReport, PipelineError> {
        let attempt = ctx
            .latest_extraction()
            .ok_or_else(|| missing_prior("judgment", "extraction attempt"))?;
        let input = JudgeInput::from_attempt(&ctx.doc.doc_type, attempt);

        let decision = tools.decide(&input).await?;
        let summary = format!(
            "verdict {:?} at confidence {:.2} ({})",
            decision.verdict,
            decision.confidence,
            tools.decider_name()
        );

        let rework_notes = match decision.verdict {
            Verdict::Fail => Some(decision.rationale.clone()),
            Verdict::Pass => None,
        };
        ctx.judge = Some(JudgeVerdict {
            verdict: decision.verdict,
            rationale: decision.rationale,
            confidence: decision.confidence,
            rework_notes,
        });

        Ok(StageReport::new(summary).with_confidence(decision.confidence))
    }
}

// ─────────────────────────── Business Rules ───────────────────────────

/// Fetches the org's rule set and evaluates the live extraction against it
pub struct BusinessRuleStage;

#[async_trait]
impl Stage for BusinessRuleStage {
    fn kind(&self) -> StageKind {
        StageKind::Rules
    }

    async fn execute(
        &self,
        ctx: &mut RunContext,
        tools: &ToolGateway,
    ) -> Result<StageReport, PipelineError> {
        let fields = ctx
            .latest_extraction()
            .ok_or_else(|| missing_prior("business-rule", "extraction attempt"))?
            .fields
            .clone();

        let rule_set = tools.fetch_rules(&ctx.doc.doc_type).await?;
        let evaluation = rule_set.evaluate(&fields);

        let summary = format!(
            "hint {:?} with {} violation(s)",
            evaluation.hint,
            evaluation.violations.len()
        );
        ctx.rules = Some(evaluation);

        Ok(StageReport::new(summary))
    }
}

// ─────────────────────────── Risk ───────────────────────────

/// Screens the extracted identity against the watchlist and grades the result
pub struct RiskStage {
    thresholds: RiskThresholds,
}

impl RiskStage {
    pub fn new(thresholds: RiskThresholds) -> Self {
        Self { thresholds }
    }
}

#[async_trait]
impl Stage for RiskStage {
    fn kind(&self) -> StageKind {
        StageKind::Risk
    }

    async fn execute(
        &self,
        ctx: &mut RunContext,
        tools: &ToolGateway,
    ) -> Result<StageReport, PipelineError> {
        let fields = ctx
            .latest_extraction()
            .ok_or_else(|| missing_prior("risk", "extraction attempt"))?
            .fields
            .clone();

        let matches = tools
            .search_watchlist(&IdentityQuery::from_fields(&fields))
            .await?;
        let top_score = matches.first().map(|m| m.score).unwrap_or(0.0);
        let grade = self.thresholds.grade(top_score);

        let explanation = format!(
            "top similarity {top_score:.4} against {} candidate(s); thresholds HIGH>={:.2} MED>={:.2}",
            matches.len(),
            self.thresholds.high,
            self.thresholds.medium
        );
        let summary = format!("grade {} with top score {top_score:.4}", grade.as_str());
        ctx.risk = Some(RiskAssessment {
            grade,
            matches,
            explanation,
        });

        Ok(StageReport::new(summary).with_confidence(top_score))
    }
}

// ─────────────────────────── Decision ───────────────────────────

/// Composes the final outcome from the accumulated context and notifies
pub struct DecisionStage {
    policy: DecisionPolicy,
}

impl DecisionStage {
    pub fn new(policy: DecisionPolicy) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl Stage for DecisionStage {
    fn kind(&self) -> StageKind {
        StageKind::Decision
    }

    async fn execute(
        &self,
        ctx: &mut RunContext,
        tools: &ToolGateway,
    ) -> Result<StageReport, PipelineError> {
        let outcome = compose_outcome(
            ctx.judge.as_ref(),
            ctx.rules.as_ref(),
            ctx.risk.as_ref(),
            &self.policy,
        );
        let reasons = ctx.decision_reasons();
        let (subject, body) = compose_decision_email(&ctx.doc.doc_id, outcome, &reasons);

        // Delivery failure never fails the run; it is recorded on the message.
        let status = match tools.notify(&ctx.to_email, &subject, &body).await {
            Ok(message_id) => {
                tracing::debug!(message_id = %message_id, "decision notification delivered");
                DeliveryStatus::Sent
            }
            Err(err) => {
                tracing::warn!(error = %err, "decision notification failed");
                DeliveryStatus::Failed
            }
        };

        ctx.outcome = Some(outcome);
        ctx.message = Some(DecisionMessage {
            draft: body,
            channel: Channel::Email,
            status,
        });

        Ok(StageReport::new(format!(
            "outcome {} ({} reason(s)), notification {:?}",
            outcome.as_str(),
            reasons.len(),
            status
        )))
    }
}

/// Deterministic decision composition.
///
/// A rule rejection or a HIGH risk grade forces REJECT; escalation overrides
/// acceptance, never the reverse. Remaining hint/grade combinations consult
/// the configured policy table, and anything unlisted falls back to the
/// judge verdict.
pub fn compose_outcome(
    judge: Option<&JudgeVerdict>,
    rules: Option<&RuleEvaluation>,
    risk: Option<&RiskAssessment>,
    policy: &DecisionPolicy,
) -> Outcome {
    if let Some(rules) = rules {
        if rules.hint == RuleHint::Reject {
            return Outcome::Reject;
        }
    }
    if let Some(risk) = risk {
        if risk.grade == RiskGrade::High {
            return Outcome::Reject;
        }
    }
    if let (Some(rules), Some(risk)) = (rules, risk) {
        if let Some(outcome) = policy.lookup(rules.hint, risk.grade) {
            return outcome;
        }
    }
    match judge.map(|j| j.verdict) {
        Some(Verdict::Pass) => Outcome::Accept,
        _ => Outcome::Review,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RuleViolation;

    fn judge(verdict: Verdict) -> JudgeVerdict {
        JudgeVerdict {
            verdict,
            rationale: String::new(),
            confidence: 0.9,
            rework_notes: None,
        }
    }

    fn rules(hint: RuleHint, violation_count: usize) -> RuleEvaluation {
        RuleEvaluation {
            violations: (0..violation_count)
                .map(|i| RuleViolation {
                    rule_id: format!("V{i}"),
                    description: String::new(),
                    citation: String::new(),
                })
                .collect(),
            hint,
        }
    }

    fn risk(grade: RiskGrade) -> RiskAssessment {
        RiskAssessment {
            grade,
            matches: vec![],
            explanation: String::new(),
        }
    }

    #[test]
    fn test_rule_reject_wins_even_at_low_risk() {
        let outcome = compose_outcome(
            Some(&judge(Verdict::Pass)),
            Some(&rules(RuleHint::Reject, 1)),
            Some(&risk(RiskGrade::Low)),
            &DecisionPolicy::default(),
        );
        assert_eq!(outcome, Outcome::Reject);
    }

    #[test]
    fn test_rule_reject_wins_without_risk_output() {
        let outcome = compose_outcome(
            Some(&judge(Verdict::Pass)),
            Some(&rules(RuleHint::Reject, 2)),
            None,
            &DecisionPolicy::default(),
        );
        assert_eq!(outcome, Outcome::Reject);
    }

    #[test]
    fn test_high_risk_overrides_accept_hint() {
        let outcome = compose_outcome(
            Some(&judge(Verdict::Pass)),
            Some(&rules(RuleHint::Accept, 0)),
            Some(&risk(RiskGrade::High)),
            &DecisionPolicy::default(),
        );
        assert_eq!(outcome, Outcome::Reject);
    }

    #[test]
    fn test_clean_run_accepts_on_judge_pass() {
        let outcome = compose_outcome(
            Some(&judge(Verdict::Pass)),
            Some(&rules(RuleHint::Accept, 0)),
            Some(&risk(RiskGrade::Low)),
            &DecisionPolicy::default(),
        );
        assert_eq!(outcome, Outcome::Accept);
    }

    #[test]
    fn test_medium_risk_defaults_to_review() {
        let outcome = compose_outcome(
            Some(&judge(Verdict::Pass)),
            Some(&rules(RuleHint::Accept, 0)),
            Some(&risk(RiskGrade::Med)),
            &DecisionPolicy::default(),
        );
        assert_eq!(outcome, Outcome::Review);
    }

    #[test]
    fn test_review_hint_defaults_to_review() {
        let outcome = compose_outcome(
            Some(&judge(Verdict::Pass)),
            Some(&rules(RuleHint::Review, 1)),
            Some(&risk(RiskGrade::Low)),
            &DecisionPolicy::default(),
        );
        assert_eq!(outcome, Outcome::Review);
    }

    #[test]
    fn test_field_parsing_from_labeled_text() {
        let (fields, confidence) = ExtractionStage::parse_fields(
            "Name: Ada Lovelace\nDOB: 1990-04-12\nAddress: 10 Bayes Rd, Cambridge\nID: SG1234567\nEmail: ada@example.com\nFace: YES",
        );
        assert_eq!(fields.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(fields.dob.as_deref(), Some("1990-04-12"));
        assert_eq!(fields.id_number.as_deref(), Some("SG1234567"));
        assert_eq!(fields.has_face_photo, Some(true));
        assert_eq!(confidence.len(), 6);
    }

    #[test]
    fn test_unlabeled_text_parses_to_nothing() {
        let (fields, confidence) = ExtractionStage::parse_fields("%% unreadable scan %%");
        assert!(fields.name.is_none());
        assert!(fields.id_number.is_none());
        assert!(confidence.is_empty());
    }
}
