//! Constrained Decision Provider
//!
//! The judgment stage's "is this extraction good enough" check as a narrow
//! capability: structured input in, verdict plus confidence out. The stage
//! never depends on a particular provider's protocol.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::ToolError;
use crate::model::{ExtractedFields, ExtractionAttempt, Verdict};

/// Structured input to a completeness judgment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeInput {
    pub doc_type: String,
    /// 1-based extraction attempt the judgment refers to
    pub attempt: u32,
    pub fields: ExtractedFields,
    pub field_confidence: HashMap<String, f64>,
    pub extraction_confidence: f64,
}

impl JudgeInput {
    pub fn from_attempt(doc_type: &str, attempt: &ExtractionAttempt) -> Self {
        Self {
            doc_type: doc_type.to_string(),
            attempt: attempt.attempt,
            fields: attempt.fields.clone(),
            field_confidence: attempt.field_confidence.clone(),
            extraction_confidence: attempt.confidence,
        }
    }
}

/// Structured judgment result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JudgeDecision {
    pub verdict: Verdict,
    pub confidence: f64,
    pub rationale: String,
}

/// Pluggable judgment capability
#[async_trait]
pub trait DecisionProvider: Send + Sync {
    async fn decide(&self, input: &JudgeInput) -> Result<JudgeDecision, ToolError>;

    /// Provider name for logging
    fn provider_name(&self) -> &str;
}

/// Deterministic field-coverage judge.
///
/// Confidence is the extraction confidence scaled by core-field coverage,
/// so a sparse read can never judge higher than the OCR pass it came from.
#[derive(Debug, Clone, Default)]
pub struct CoverageDecider;

#[async_trait]
impl DecisionProvider for CoverageDecider {
    async fn decide(&self, input: &JudgeInput) -> Result<JudgeDecision, ToolError> {
        let coverage = input.fields.core_coverage();
        let confidence = (input.extraction_confidence * coverage).clamp(0.0, 1.0);
        let missing = input.fields.missing_core_fields();

        let (verdict, rationale) = if missing.is_empty() {
            (
                Verdict::Pass,
                format!(
                    "All core fields recognized on attempt {} with extraction confidence {:.2}",
                    input.attempt, input.extraction_confidence
                ),
            )
        } else {
            (
                Verdict::Fail,
                format!("Missing core fields: {}", missing.join(", ")),
            )
        };

        Ok(JudgeDecision {
            verdict,
            confidence,
            rationale,
        })
    }

    fn provider_name(&self) -> &str {
        "coverage-heuristic"
    }
}

/// Remote judgment service client.
///
/// Posts the structured input as JSON and expects a `JudgeDecision` back.
/// Network and 5xx failures are transient (the gateway retries them);
/// anything else is permanent.
#[derive(Clone)]
pub struct RemoteDecider {
    endpoint: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl RemoteDecider {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        let endpoint = std::env::var("KYC_DECIDER_URL")
            .map_err(|_| anyhow!("KYC_DECIDER_URL environment variable not set"))?;
        let mut decider = Self::new(endpoint);
        if let Ok(api_key) = std::env::var("KYC_DECIDER_API_KEY") {
            decider = decider.with_api_key(api_key);
        }
        Ok(decider)
    }
}

#[async_trait]
impl DecisionProvider for RemoteDecider {
    async fn decide(&self, input: &JudgeInput) -> Result<JudgeDecision, ToolError> {
        let mut request = self.client.post(&self.endpoint).json(input);
        if let Some(api_key) = &self.api_key {
            request = request.header("x-api-key", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ToolError::Transient(format!("decision service unreachable: {e}")))?;

        let status = response.status();
        if status.is_server_error() || status.as_u16() == 429 {
            return Err(ToolError::Transient(format!(
                "decision service returned {status}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ToolError::Permanent(format!(
                "decision service rejected the request ({status}): {body}"
            )));
        }

        let mut decision: JudgeDecision = response
            .json()
            .await
            .map_err(|e| ToolError::Permanent(format!("malformed decision response: {e}")))?;
        decision.confidence = decision.confidence.clamp(0.0, 1.0);
        Ok(decision)
    }

    fn provider_name(&self) -> &str {
        "remote"
    }
}
