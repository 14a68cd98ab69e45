//! Run Store
//!
//! Durable collection of run records, keyed by `doc_id` plus run attempt
//! ordinal. Supports concurrent upserts and filtered, paginated retrieval;
//! a put is atomic with respect to readers. Terminal records are immutable
//! once written.

pub mod memory;
#[cfg(feature = "database")]
pub mod pg;
pub mod query;

pub use memory::MemoryRunStore;
#[cfg(feature = "database")]
pub use pg::PgRunStore;
pub use query::{QueryService, RecordPage};

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::StoreError;
use crate::model::{RunRecord, RunStatus};

/// AND-combined record filters
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    /// Exact match on final decision
    pub final_decision: Option<RunStatus>,
    /// Case-insensitive substring match on customer name
    pub customer_name: Option<String>,
    /// Exact match on identification number
    pub identification_no: Option<String>,
    /// Inclusive lower bound on created_at's calendar date
    pub from_date: Option<NaiveDate>,
    /// Inclusive upper bound on created_at's calendar date
    pub to_date: Option<NaiveDate>,
}

impl RecordFilter {
    /// Whether a record passes every set filter
    pub fn matches(&self, record: &RunRecord) -> bool {
        if let Some(decision) = self.final_decision {
            if record.final_decision != decision {
                return false;
            }
        }
        if let Some(name) = &self.customer_name {
            let matched = record
                .customer_name
                .as_deref()
                .map(|n| n.to_lowercase().contains(&name.to_lowercase()))
                .unwrap_or(false);
            if !matched {
                return false;
            }
        }
        if let Some(id) = &self.identification_no {
            if record.identification_no.as_deref() != Some(id.as_str()) {
                return false;
            }
        }
        let date = record.created_at.date_naive();
        if let Some(from) = self.from_date {
            if date < from {
                return false;
            }
        }
        if let Some(to) = self.to_date {
            if date > to {
                return false;
            }
        }
        true
    }
}

/// Page bounds; `limit` is validated and capped upstream by the query service
#[derive(Debug, Clone, Copy)]
pub struct Page {
    pub limit: usize,
    pub offset: usize,
}

/// One page of matching records plus the total match count
#[derive(Debug, Clone)]
pub struct QueryPage {
    pub records: Vec<RunRecord>,
    pub total_count: usize,
}

/// Storage contract for run records
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert or update the record at (doc_id, attempt_no).
    ///
    /// Overwriting a record whose persisted decision is already terminal is
    /// rejected.
    async fn put(&self, record: &RunRecord) -> Result<(), StoreError>;

    /// Latest record for a document, across run attempts
    async fn get(&self, doc_id: &str) -> Result<Option<RunRecord>, StoreError>;

    /// 1-based ordinal the next run for this document should use
    async fn next_ordinal(&self, doc_id: &str) -> Result<u32, StoreError>;

    /// Matching records ordered by created_at descending
    async fn query(&self, filter: &RecordFilter, page: Page) -> Result<QueryPage, StoreError>;
}
