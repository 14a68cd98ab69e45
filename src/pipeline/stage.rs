//! Stage Contract
//!
//! The uniform interface every processing stage implements. A stage reads
//! prior results and the document reference from the run context, calls the
//! tool gateway, and appends exactly one typed result. Stages never call
//! each other; sequencing belongs to the orchestrator. Tool side effects
//! must be safe to re-run, since rework re-invokes a stage that may have
//! already executed once.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::context::RunContext;
use crate::error::PipelineError;
use crate::tools::ToolGateway;

/// The fixed stage sequence, as a closed set of tagged variants.
///
/// The sequence is fixed by policy, not discovered at runtime, so there is
/// no open-ended registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageKind {
    Extract,
    Judge,
    Rules,
    Risk,
    Decision,
}

impl StageKind {
    /// Processing order
    pub const SEQUENCE: [StageKind; 5] = [
        StageKind::Extract,
        StageKind::Judge,
        StageKind::Rules,
        StageKind::Risk,
        StageKind::Decision,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Extract => "extract",
            StageKind::Judge => "judge",
            StageKind::Rules => "rules",
            StageKind::Risk => "risk",
            StageKind::Decision => "decision",
        }
    }

    /// Position in [`Self::SEQUENCE`]
    pub fn index(&self) -> usize {
        match self {
            StageKind::Extract => 0,
            StageKind::Judge => 1,
            StageKind::Rules => 2,
            StageKind::Risk => 3,
            StageKind::Decision => 4,
        }
    }
}

/// What a stage reports back to the orchestrator after appending its result
#[derive(Debug, Clone)]
pub struct StageReport {
    /// One-line summary for the provenance log
    pub summary: String,
    /// Confidence score, where the stage produces one
    pub confidence: Option<f64>,
}

impl StageReport {
    pub fn new(summary: impl Into<String>) -> Self {
        Self {
            summary: summary.into(),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// One unit of the fixed processing sequence
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    /// Execute against the run context, appending one typed result
    async fn execute(
        &self,
        ctx: &mut RunContext,
        tools: &ToolGateway,
    ) -> Result<StageReport, PipelineError>;
}
