//! Run Orchestrator
//!
//! Drives the fixed stage sequence for one document, applies the bounded
//! rework policy, and finalizes the run record. Each run is one sequential
//! state-machine traversal; rework is an explicit counted loop, never
//! recursion, so the bound stays auditable.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use url::Url;
use uuid::Uuid;

use super::context::RunContext;
use super::stage::{Stage, StageKind};
use super::stages::{
    BusinessRuleStage, DecisionStage, ExtractionStage, JudgmentStage, RiskStage,
};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::model::{
    DocumentRef, Outcome, RunFailure, RunRecord, RunStatus, StageOutputs, Verdict,
};
use crate::store::RunStore;
use crate::tools::ToolGateway;

/// Trigger payload that starts a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    pub doc_id: String,
    pub s3_uri: String,
    pub doc_type: String,
    pub to_email: String,
}

/// What the trigger call gets back: the terminal record plus whether it
/// actually reached durable storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub record: RunRecord,
    pub persisted: bool,
    /// Present when the store rejected the write; the record above was
    /// still computed.
    pub store_error: Option<String>,
}

/// Orchestrator states. PLANNING validates the trigger; FAILED is reachable
/// from any state on unrecoverable errors.
enum RunState {
    Planning,
    Extracting,
    Judging,
    Rules,
    Risk,
    Decision,
    Done,
    Failed(PipelineError),
}

/// Sequences stages over one run context and finalizes the record
pub struct Orchestrator {
    config: PipelineConfig,
    tools: Arc<ToolGateway>,
    store: Arc<dyn RunStore>,
    /// Fixed dispatch table, one implementation per [`StageKind`], in
    /// [`StageKind::SEQUENCE`] order
    stages: Vec<Box<dyn Stage>>,
}

impl Orchestrator {
    pub fn new(config: PipelineConfig, tools: Arc<ToolGateway>, store: Arc<dyn RunStore>) -> Self {
        let stages: Vec<Box<dyn Stage>> = vec![
            Box::new(ExtractionStage),
            Box::new(JudgmentStage),
            Box::new(BusinessRuleStage),
            Box::new(RiskStage::new(config.risk_thresholds.clone())),
            Box::new(DecisionStage::new(config.decision_policy.clone())),
        ];
        Self {
            config,
            tools,
            store,
            stages,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn stage(&self, kind: StageKind) -> &dyn Stage {
        self.stages[kind.index()].as_ref()
    }

    /// Process one document end to end.
    ///
    /// Never panics and never surfaces a stage error as-is: the caller
    /// always gets a terminal record, with failures described on it.
    pub async fn run(&self, trigger: Trigger) -> RunReport {
        let run_id = Uuid::new_v4();
        let doc_id = trigger.doc_id.clone();
        tracing::info!(%run_id, doc_id = %doc_id, "run started");

        let doc = DocumentRef {
            doc_id: trigger.doc_id,
            s3_uri: trigger.s3_uri,
            doc_type: trigger.doc_type,
        };
        let mut ctx = RunContext::new(doc, trigger.to_email);

        let attempt_no = match self.store.next_ordinal(&ctx.doc.doc_id).await {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(doc_id = %ctx.doc.doc_id, error = %e, "ordinal lookup failed, assuming first attempt");
                1
            }
        };

        let mut state = RunState::Planning;
        let failure = loop {
            match state {
                RunState::Done => break None,
                RunState::Failed(err) => break Some(err),
                current => {
                    state = self.step(current, &mut ctx, run_id, attempt_no).await;
                }
            }
        };

        let record = self.compose_record(run_id, attempt_no, &ctx, failure.as_ref());
        match failure {
            None => tracing::info!(
                %run_id,
                doc_id = %record.doc_id,
                outcome = ?record.outcome,
                rework_count = record.rework_count,
                "run processed"
            ),
            Some(ref err) => tracing::warn!(
                %run_id,
                doc_id = %record.doc_id,
                kind = err.kind().as_str(),
                error = %err,
                "run failed"
            ),
        }

        match self.tools.persist(&record).await {
            Ok(()) => RunReport {
                record,
                persisted: true,
                store_error: None,
            },
            Err(err) => RunReport {
                record,
                persisted: false,
                store_error: Some(err.to_string()),
            },
        }
    }

    /// One state-machine transition
    async fn step(
        &self,
        state: RunState,
        ctx: &mut RunContext,
        run_id: Uuid,
        attempt_no: u32,
    ) -> RunState {
        match state {
            RunState::Planning => {
                if let Err(err) = self.validate_trigger(ctx) {
                    return RunState::Failed(err);
                }
                ctx.record_provenance("planning", "trigger validated");
                // Mark the run in-flight; this record is upserted in place
                // until the terminal write replaces it.
                let inprocess = self.inprocess_record(run_id, attempt_no, ctx);
                if let Err(e) = self.tools.persist(&inprocess).await {
                    tracing::warn!(doc_id = %ctx.doc.doc_id, error = %e, "in-process record write failed");
                }
                RunState::Extracting
            }

            RunState::Extracting => match self.run_stage(StageKind::Extract, ctx).await {
                Ok(()) => RunState::Judging,
                Err(err) => RunState::Failed(err),
            },

            RunState::Judging => match self.run_stage(StageKind::Judge, ctx).await {
                Ok(()) => {
                    let (passed, confidence) = match &ctx.judge {
                        Some(j) => (j.verdict == Verdict::Pass, j.confidence),
                        None => (false, 0.0),
                    };
                    if passed && confidence >= self.config.judge_confidence_threshold {
                        RunState::Rules
                    } else if ctx.rework_count < self.config.max_rework {
                        ctx.rework_count += 1;
                        ctx.record_provenance(
                            "judge",
                            format!(
                                "insufficient judgment (confidence {confidence:.2}, threshold {:.2}); rework {} of {}",
                                self.config.judge_confidence_threshold,
                                ctx.rework_count,
                                self.config.max_rework
                            ),
                        );
                        RunState::Extracting
                    } else {
                        RunState::Failed(PipelineError::LowConfidenceExceeded {
                            attempts: ctx.extraction_attempts.len() as u32,
                        })
                    }
                }
                Err(err) => RunState::Failed(err),
            },

            RunState::Rules => match self.run_stage(StageKind::Rules, ctx).await {
                Ok(()) => {
                    let definitive_reject = ctx
                        .rules
                        .as_ref()
                        .map(|r| r.hint == crate::model::RuleHint::Reject && !r.violations.is_empty())
                        .unwrap_or(false);
                    if definitive_reject {
                        // Rule rejection is definitive and cheaper than a
                        // watchlist search; the skip is recorded so the
                        // behavior stays deterministic.
                        ctx.record_provenance("risk", "skipped: rule rejection is definitive");
                        RunState::Decision
                    } else {
                        RunState::Risk
                    }
                }
                Err(err) => RunState::Failed(err),
            },

            RunState::Risk => match self.run_stage(StageKind::Risk, ctx).await {
                Ok(()) => RunState::Decision,
                Err(err) => RunState::Failed(err),
            },

            RunState::Decision => match self.run_stage(StageKind::Decision, ctx).await {
                Ok(()) => RunState::Done,
                Err(err) => RunState::Failed(err),
            },

            // Terminal states never reach step()
            RunState::Done => RunState::Done,
            RunState::Failed(err) => RunState::Failed(err),
        }
    }

    async fn run_stage(&self, kind: StageKind, ctx: &mut RunContext) -> Result<(), PipelineError> {
        tracing::debug!(stage = kind.as_str(), doc_id = %ctx.doc.doc_id, "stage starting");
        let report = self.stage(kind).execute(ctx, &self.tools).await?;
        tracing::info!(stage = kind.as_str(), doc_id = %ctx.doc.doc_id, summary = %report.summary, "stage complete");
        ctx.record_provenance(kind.as_str(), report.summary);
        Ok(())
    }

    /// PLANNING-stage validation of the trigger payload
    fn validate_trigger(&self, ctx: &RunContext) -> Result<(), PipelineError> {
        if ctx.doc.doc_id.trim().is_empty() {
            return Err(PipelineError::InvalidInput("doc_id is required".to_string()));
        }
        let uri = ctx.doc.s3_uri.trim();
        if uri.is_empty() {
            return Err(PipelineError::InvalidInput("s3_uri is required".to_string()));
        }
        // Accept any parseable URI (s3://, file://, https://) or an
        // absolute local path, the way the original intake did.
        if Url::parse(uri).is_err() && !Path::new(uri).is_absolute() {
            return Err(PipelineError::InvalidInput(format!(
                "s3_uri '{uri}' is not a dereferenceable location"
            )));
        }
        if !self.config.recognizes_doc_type(&ctx.doc.doc_type) {
            return Err(PipelineError::InvalidInput(format!(
                "unrecognized doc_type '{}'",
                ctx.doc.doc_type
            )));
        }
        if ctx.to_email.trim().is_empty() || !ctx.to_email.contains('@') {
            return Err(PipelineError::InvalidInput(format!(
                "to_email '{}' is not deliverable",
                ctx.to_email
            )));
        }
        Ok(())
    }

    fn inprocess_record(&self, run_id: Uuid, attempt_no: u32, ctx: &RunContext) -> RunRecord {
        RunRecord {
            run_id,
            doc_id: ctx.doc.doc_id.clone(),
            attempt_no,
            customer_name: None,
            identification_no: None,
            final_decision: RunStatus::Inprocess,
            outcome: None,
            failure: None,
            created_at: Utc::now(),
            stage_outputs: StageOutputs::default(),
            rework_count: 0,
        }
    }

    fn compose_record(
        &self,
        run_id: Uuid,
        attempt_no: u32,
        ctx: &RunContext,
        failure: Option<&PipelineError>,
    ) -> RunRecord {
        let fields = ctx.latest_extraction().map(|a| &a.fields);
        let (final_decision, outcome): (RunStatus, Option<Outcome>) = match failure {
            None => (RunStatus::Processed, ctx.outcome),
            Some(_) => (RunStatus::Failed, None),
        };
        RunRecord {
            run_id,
            doc_id: ctx.doc.doc_id.clone(),
            attempt_no,
            customer_name: fields.and_then(|f| f.name.clone()),
            identification_no: fields.and_then(|f| f.id_number.clone()),
            final_decision,
            outcome,
            failure: failure.map(|e| RunFailure {
                kind: e.kind(),
                detail: e.to_string(),
            }),
            created_at: Utc::now(),
            stage_outputs: ctx.snapshot_outputs(),
            rework_count: ctx.rework_count,
        }
    }
}
