//! Notification Capability
//!
//! Composes the decision email and hands it to a delivery provider. The
//! pipeline records delivery status but never fails a run on it.

use async_trait::async_trait;
use uuid::Uuid;

use super::ToolError;
use crate::model::Outcome;

/// Message delivery provider
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Send a message; returns the provider's message id
    async fn send(&self, to_email: &str, subject: &str, body: &str) -> Result<String, ToolError>;
}

/// Delivery provider that logs instead of sending.
///
/// Stands in for SES/Mailgun in demos and tests.
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send(&self, to_email: &str, subject: &str, body: &str) -> Result<String, ToolError> {
        let message_id = format!("msg-{}", Uuid::new_v4().simple());
        tracing::info!(
            to_email,
            subject,
            body_bytes = body.len(),
            message_id = %message_id,
            "decision email dispatched"
        );
        Ok(message_id)
    }
}

/// Compose the decision email for a document
pub fn compose_decision_email(doc_id: &str, outcome: Outcome, reasons: &[String]) -> (String, String) {
    let (verb, lead) = match outcome {
        Outcome::Accept => ("approved", "Your KYC application has been approved."),
        Outcome::Reject => ("rejected", "Your KYC application could not be approved."),
        Outcome::Review => (
            "held for review",
            "Your KYC application requires manual review.",
        ),
    };
    let subject = format!("KYC decision for {doc_id}: {verb}");

    let mut body = format!("{lead}\n\nDocument: {doc_id}\n");
    if !reasons.is_empty() {
        body.push_str("\nReasons:\n");
        for reason in reasons {
            body.push_str(&format!("- {reason}\n"));
        }
    }
    (subject, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejection_email_lists_reasons() {
        let reasons = vec![
            "AGE_TOO_LOW: Age 9 < min 18".to_string(),
            "Watchlist grade HIGH".to_string(),
        ];
        let (subject, body) = compose_decision_email("KYC-7", Outcome::Reject, &reasons);
        assert!(subject.contains("rejected"));
        assert!(body.contains("- AGE_TOO_LOW"));
        assert!(body.contains("- Watchlist grade HIGH"));
    }

    #[test]
    fn test_accept_email_has_no_reasons_block() {
        let (_, body) = compose_decision_email("KYC-7", Outcome::Accept, &[]);
        assert!(!body.contains("Reasons:"));
    }
}
