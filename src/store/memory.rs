//! In-Memory Run Store
//!
//! Default store for demos and tests. A `tokio::sync::RwLock` over the
//! record map makes each put atomic with respect to readers; a reader sees
//! either the fully-old or fully-new record, never a partial write.

use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{Page, QueryPage, RecordFilter, RunStore};
use crate::error::StoreError;
use crate::model::RunRecord;

#[derive(Debug, Default)]
pub struct MemoryRunStore {
    /// doc_id -> records ordered by attempt_no ascending
    runs: RwLock<HashMap<String, Vec<RunRecord>>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn put(&self, record: &RunRecord) -> Result<(), StoreError> {
        let mut runs = self.runs.write().await;
        let records = runs.entry(record.doc_id.clone()).or_default();

        match records
            .iter_mut()
            .find(|r| r.attempt_no == record.attempt_no)
        {
            Some(existing) => {
                if existing.final_decision.is_terminal() {
                    return Err(StoreError::Write(format!(
                        "record for doc '{}' attempt {} is terminal ({}) and immutable",
                        record.doc_id,
                        record.attempt_no,
                        existing.final_decision.as_str()
                    )));
                }
                *existing = record.clone();
            }
            None => {
                records.push(record.clone());
                records.sort_by_key(|r| r.attempt_no);
            }
        }
        Ok(())
    }

    async fn get(&self, doc_id: &str) -> Result<Option<RunRecord>, StoreError> {
        let runs = self.runs.read().await;
        Ok(runs.get(doc_id).and_then(|records| records.last().cloned()))
    }

    async fn next_ordinal(&self, doc_id: &str) -> Result<u32, StoreError> {
        let runs = self.runs.read().await;
        Ok(runs
            .get(doc_id)
            .and_then(|records| records.last())
            .map(|r| r.attempt_no + 1)
            .unwrap_or(1))
    }

    async fn query(&self, filter: &RecordFilter, page: Page) -> Result<QueryPage, StoreError> {
        let runs = self.runs.read().await;
        let mut matching: Vec<&RunRecord> = runs
            .values()
            .flatten()
            .filter(|r| filter.matches(r))
            .collect();

        // created_at descending; doc_id/attempt_no break ties so pagination
        // stays stable across calls
        matching.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.doc_id.cmp(&b.doc_id))
                .then_with(|| b.attempt_no.cmp(&a.attempt_no))
        });

        let total_count = matching.len();
        let records = matching
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .cloned()
            .collect();

        Ok(QueryPage {
            records,
            total_count,
        })
    }
}
