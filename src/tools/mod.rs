//! Tool Gateway
//!
//! Thin façade over the external capabilities the stages need: OCR, rule
//! lookup, watchlist screening, judgment, notification, and persistence.
//! Stages call the gateway, never a raw service. Every call runs under a
//! per-tool timeout; transient failures are retried here (bounded) so the
//! orchestrator never has to.

pub mod audit;
pub mod decide;
pub mod notify;
pub mod ocr;
pub mod rules;
pub mod watchlist;

pub use audit::AuditLog;
pub use decide::{CoverageDecider, DecisionProvider, JudgeDecision, JudgeInput, RemoteDecider};
pub use notify::{compose_decision_email, LoggingNotifier, Notifier};
pub use ocr::{FixtureOcr, OcrEngine};
pub use rules::{RuleSet, RuleSource, StaticRules, YamlRuleSource};
pub use watchlist::{IdentityQuery, SeededWatchlist, WatchlistEntry, WatchlistIndex};

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::ToolTimeouts;
use crate::error::{PipelineError, StoreError};
use crate::model::{RunRecord, WatchlistMatch};
use crate::store::RunStore;

/// Error reported by a tool implementation.
///
/// The transient/permanent split decides retry behavior at the gateway.
#[derive(Error, Debug)]
pub enum ToolError {
    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    Permanent(String),
}

/// Façade over all external capabilities
pub struct ToolGateway {
    ocr: Arc<dyn OcrEngine>,
    rules: Arc<dyn RuleSource>,
    watchlist: Arc<dyn WatchlistIndex>,
    notifier: Arc<dyn Notifier>,
    decider: Arc<dyn DecisionProvider>,
    store: Arc<dyn RunStore>,
    audit: Option<AuditLog>,
    timeouts: ToolTimeouts,
    retries: u32,
}

impl ToolGateway {
    /// Start building a gateway around the given run store.
    ///
    /// All other capabilities default to the local demo implementations.
    pub fn builder(store: Arc<dyn RunStore>) -> ToolGatewayBuilder {
        ToolGatewayBuilder {
            ocr: Arc::new(FixtureOcr::new()),
            rules: Arc::new(StaticRules::default()),
            watchlist: Arc::new(SeededWatchlist::demo()),
            notifier: Arc::new(LoggingNotifier),
            decider: Arc::new(CoverageDecider),
            store,
            audit: None,
            timeouts: ToolTimeouts::default(),
            retries: 2,
        }
    }

    /// Extract raw text from the document at `s3_uri`
    pub async fn extract(&self, s3_uri: &str) -> Result<String, PipelineError> {
        self.with_retry("ocr", self.timeouts.ocr(), || self.ocr.extract(s3_uri))
            .await
    }

    /// Fetch the rule set for a document type
    pub async fn fetch_rules(&self, doc_type: &str) -> Result<RuleSet, PipelineError> {
        self.with_retry("rules", self.timeouts.rules(), || {
            self.rules.fetch_rules(doc_type)
        })
        .await
    }

    /// Screen identity fields against the watchlist
    pub async fn search_watchlist(
        &self,
        query: &IdentityQuery,
    ) -> Result<Vec<WatchlistMatch>, PipelineError> {
        self.with_retry("watchlist", self.timeouts.watchlist(), || {
            self.watchlist.search(query)
        })
        .await
    }

    /// Ask the decision provider for a completeness judgment
    pub async fn decide(&self, input: &JudgeInput) -> Result<JudgeDecision, PipelineError> {
        self.with_retry("decide", self.timeouts.decide(), || {
            self.decider.decide(input)
        })
        .await
    }

    /// Provider name, for provenance summaries
    pub fn decider_name(&self) -> &str {
        self.decider.provider_name()
    }

    /// Deliver a notification; returns the provider's message id
    pub async fn notify(
        &self,
        to_email: &str,
        subject: &str,
        body: &str,
    ) -> Result<String, PipelineError> {
        self.with_retry("notify", self.timeouts.notify(), || {
            self.notifier.send(to_email, subject, body)
        })
        .await
    }

    /// Persist a run record to the store, then mirror terminal records into
    /// the audit sink.
    ///
    /// A store failure here is a silent-data-loss risk (the run result was
    /// computed but not durably stored), so it is logged at ERROR before
    /// being surfaced.
    pub async fn persist(&self, record: &RunRecord) -> Result<(), PipelineError> {
        let put = self
            .with_retry("persist", self.timeouts.persist(), || async {
                self.store.put(record).await.map_err(|e| match e {
                    StoreError::Unavailable(message) => ToolError::Transient(message),
                    other => ToolError::Permanent(other.to_string()),
                })
            })
            .await;

        if let Err(err) = put {
            let message = err.to_string();
            tracing::error!(
                doc_id = %record.doc_id,
                attempt_no = record.attempt_no,
                error = %message,
                "run record write failed; computed result is not durably stored"
            );
            return Err(PipelineError::StoreWriteFailure {
                doc_id: record.doc_id.clone(),
                message,
            });
        }

        if record.final_decision.is_terminal() {
            if let Some(audit) = &self.audit {
                if let Err(e) = audit.append_decision(record) {
                    tracing::error!(doc_id = %record.doc_id, error = %e, "audit append failed");
                }
                if let Err(e) = audit.write_latest(record) {
                    tracing::warn!(doc_id = %record.doc_id, error = %e, "latest-run write failed");
                }
            }
        }
        Ok(())
    }

    /// Run one tool call under a timeout, retrying transient failures up to
    /// the configured bound.
    async fn with_retry<T, F, Fut>(
        &self,
        tool: &'static str,
        timeout: Duration,
        mut op: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ToolError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            let message = match tokio::time::timeout(timeout, op()).await {
                Ok(Ok(value)) => return Ok(value),
                Ok(Err(ToolError::Permanent(message))) => {
                    return Err(PipelineError::ToolPermanent {
                        tool: tool.to_string(),
                        message,
                    })
                }
                Ok(Err(ToolError::Transient(message))) => message,
                Err(_) => format!("call timed out after {}s", timeout.as_secs()),
            };
            if attempt >= self.retries {
                return Err(PipelineError::ToolTransient {
                    tool: tool.to_string(),
                    message,
                });
            }
            attempt += 1;
            tracing::warn!(tool, attempt, error = %message, "transient tool failure, retrying");
        }
    }
}

/// Builder for [`ToolGateway`]
pub struct ToolGatewayBuilder {
    ocr: Arc<dyn OcrEngine>,
    rules: Arc<dyn RuleSource>,
    watchlist: Arc<dyn WatchlistIndex>,
    notifier: Arc<dyn Notifier>,
    decider: Arc<dyn DecisionProvider>,
    store: Arc<dyn RunStore>,
    audit: Option<AuditLog>,
    timeouts: ToolTimeouts,
    retries: u32,
}

impl ToolGatewayBuilder {
    pub fn ocr(mut self, ocr: impl OcrEngine + 'static) -> Self {
        self.ocr = Arc::new(ocr);
        self
    }

    pub fn rules(mut self, rules: impl RuleSource + 'static) -> Self {
        self.rules = Arc::new(rules);
        self
    }

    pub fn watchlist(mut self, watchlist: impl WatchlistIndex + 'static) -> Self {
        self.watchlist = Arc::new(watchlist);
        self
    }

    pub fn notifier(mut self, notifier: impl Notifier + 'static) -> Self {
        self.notifier = Arc::new(notifier);
        self
    }

    pub fn decider(mut self, decider: impl DecisionProvider + 'static) -> Self {
        self.decider = Arc::new(decider);
        self
    }

    pub fn audit(mut self, audit: AuditLog) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn timeouts(mut self, timeouts: ToolTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn build(self) -> ToolGateway {
        ToolGateway {
            ocr: self.ocr,
            rules: self.rules,
            watchlist: self.watchlist,
            notifier: self.notifier,
            decider: self.decider,
            store: self.store,
            audit: self.audit,
            timeouts: self.timeouts,
            retries: self.retries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRunStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// OCR engine that fails transiently for the first `fail_first` calls
    struct CountingOcr {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl OcrEngine for CountingOcr {
        async fn extract(&self, _s3_uri: &str) -> Result<String, ToolError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(ToolError::Transient("connection reset".to_string()))
            } else {
                Ok("recovered".to_string())
            }
        }
    }

    fn gateway_with(ocr: impl OcrEngine + 'static, retries: u32) -> ToolGateway {
        ToolGateway::builder(Arc::new(MemoryRunStore::new()))
            .ocr(ocr)
            .retries(retries)
            .build()
    }

    #[tokio::test]
    async fn test_transient_failure_recovers_within_budget() {
        let gateway = gateway_with(
            CountingOcr {
                calls: AtomicU32::new(0),
                fail_first: 2,
            },
            2,
        );
        let text = gateway.extract("s3://bucket/doc.jpg").await.unwrap();
        assert_eq!(text, "recovered");
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let ocr = CountingOcr {
            calls: AtomicU32::new(0),
            fail_first: u32::MAX,
        };
        let gateway = gateway_with(ocr, 2);
        let err = gateway.extract("s3://bucket/doc.jpg").await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolTransient { .. }));
    }

    #[tokio::test]
    async fn test_permanent_failure_is_not_retried() {
        struct Broken {
            calls: AtomicU32,
        }

        #[async_trait]
        impl OcrEngine for Broken {
            async fn extract(&self, _s3_uri: &str) -> Result<String, ToolError> {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Err(ToolError::Permanent("unsupported media type".to_string()))
            }
        }

        let broken = Arc::new(Broken {
            calls: AtomicU32::new(0),
        });
        let gateway = ToolGateway::builder(Arc::new(MemoryRunStore::new()))
            .ocr(SharedOcr(broken.clone()))
            .retries(3)
            .build();

        let err = gateway.extract("s3://bucket/doc.jpg").await.unwrap_err();
        assert!(matches!(err, PipelineError::ToolPermanent { .. }));
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
    }

    /// Adapter so a shared Arc can be handed to the builder
    struct SharedOcr(Arc<dyn OcrEngine>);

    #[async_trait]
    impl OcrEngine for SharedOcr {
        async fn extract(&self, s3_uri: &str) -> Result<String, ToolError> {
            self.0.extract(s3_uri).await
        }
    }
}
