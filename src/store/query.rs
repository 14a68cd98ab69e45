//! Query Service
//!
//! Stateless translator from raw query parameters to store lookups.
//! Validates and normalizes every parameter up front; an unrecognized key
//! is rejected as BAD_QUERY rather than silently ignored, so a caller's
//! typo can never invisibly skip a filter. Queries that match nothing
//! return empty pages, not errors.

use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Page, RecordFilter, RunStore};
use crate::error::QueryError;
use crate::model::{RunRecord, RunStatus};

const KNOWN_PARAMS: [&str; 7] = [
    "final_decision",
    "customer_name",
    "identification_no",
    "from_date",
    "to_date",
    "limit",
    "offset",
];

/// One page of records plus pagination metadata
#[derive(Debug, Clone, serde::Serialize)]
pub struct RecordPage {
    pub records: Vec<RunRecord>,
    pub returned_count: usize,
    pub total_count: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Validates query parameters and delegates to the run store
pub struct QueryService {
    store: Arc<dyn RunStore>,
    default_limit: usize,
    max_limit: usize,
}

impl QueryService {
    pub fn new(store: Arc<dyn RunStore>, default_limit: usize, max_limit: usize) -> Self {
        Self {
            store,
            default_limit,
            max_limit,
        }
    }

    /// Run a query from raw string parameters
    pub async fn query(&self, params: &HashMap<String, String>) -> Result<RecordPage, QueryError> {
        let (filter, page) = self.parse_params(params)?;
        let result = self.store.query(&filter, page).await?;
        Ok(RecordPage {
            returned_count: result.records.len(),
            total_count: result.total_count,
            offset: page.offset,
            limit: page.limit,
            records: result.records,
        })
    }

    /// Validate and normalize raw parameters into a filter and page bounds
    fn parse_params(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<(RecordFilter, Page), QueryError> {
        for key in params.keys() {
            if !KNOWN_PARAMS.contains(&key.as_str()) {
                return Err(QueryError::UnknownParameter(key.clone()));
            }
        }

        let mut filter = RecordFilter::default();

        if let Some(raw) = params.get("final_decision") {
            let decision: RunStatus = raw.parse().map_err(|message| QueryError::InvalidValue {
                param: "final_decision".to_string(),
                message,
            })?;
            filter.final_decision = Some(decision);
        }
        if let Some(name) = params.get("customer_name") {
            if !name.trim().is_empty() {
                filter.customer_name = Some(name.trim().to_string());
            }
        }
        if let Some(id) = params.get("identification_no") {
            if !id.trim().is_empty() {
                filter.identification_no = Some(id.trim().to_string());
            }
        }
        filter.from_date = parse_date(params, "from_date")?;
        filter.to_date = parse_date(params, "to_date")?;

        let limit = match params.get("limit") {
            None => self.default_limit,
            Some(raw) => {
                let limit: usize = raw.parse().map_err(|_| QueryError::InvalidValue {
                    param: "limit".to_string(),
                    message: format!("'{raw}' is not a non-negative integer"),
                })?;
                if limit == 0 {
                    return Err(QueryError::InvalidValue {
                        param: "limit".to_string(),
                        message: "limit must be positive".to_string(),
                    });
                }
                limit.min(self.max_limit)
            }
        };
        let offset = match params.get("offset") {
            None => 0,
            Some(raw) => raw.parse().map_err(|_| QueryError::InvalidValue {
                param: "offset".to_string(),
                message: format!("'{raw}' is not a non-negative integer"),
            })?,
        };

        Ok((filter, Page { limit, offset }))
    }
}

fn parse_date(
    params: &HashMap<String, String>,
    key: &str,
) -> Result<Option<NaiveDate>, QueryError> {
    match params.get(key) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .map(Some)
            .map_err(|_| QueryError::InvalidValue {
                param: key.to_string(),
                message: format!("'{raw}' is not a YYYY-MM-DD date"),
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{RunStatus, StageOutputs};
    use crate::store::MemoryRunStore;
    use chrono::Utc;
    use uuid::Uuid;

    fn params(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    async fn service_with_records(count: usize) -> QueryService {
        let store = Arc::new(MemoryRunStore::new());
        for i in 0..count {
            let record = RunRecord {
                run_id: Uuid::new_v4(),
                doc_id: format!("KYC-{i}"),
                attempt_no: 1,
                customer_name: Some(format!("Customer {i}")),
                identification_no: Some(format!("ID-{i}")),
                final_decision: RunStatus::Processed,
                outcome: None,
                failure: None,
                created_at: Utc::now(),
                stage_outputs: StageOutputs::default(),
                rework_count: 0,
            };
            store.put(&record).await.unwrap();
        }
        QueryService::new(store, 50, 200)
    }

    #[tokio::test]
    async fn test_unknown_parameter_is_rejected() {
        let service = service_with_records(1).await;
        let err = service
            .query(&params(&[("final_descision", "PROCESSED")]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BAD_QUERY");
        assert!(matches!(err, QueryError::UnknownParameter(_)));
    }

    #[tokio::test]
    async fn test_invalid_decision_value_is_rejected() {
        let service = service_with_records(1).await;
        let err = service
            .query(&params(&[("final_decision", "DONE")]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BAD_QUERY");
    }

    #[tokio::test]
    async fn test_zero_limit_is_rejected() {
        let service = service_with_records(1).await;
        let err = service.query(&params(&[("limit", "0")])).await.unwrap_err();
        assert_eq!(err.code(), "BAD_QUERY");
    }

    #[tokio::test]
    async fn test_limit_is_capped() {
        let service = service_with_records(3).await;
        let page = service.query(&params(&[("limit", "9999")])).await.unwrap();
        assert_eq!(page.limit, 200);
        assert_eq!(page.returned_count, 3);
    }

    #[tokio::test]
    async fn test_malformed_date_is_rejected() {
        let service = service_with_records(1).await;
        let err = service
            .query(&params(&[("from_date", "05/08/2026")]))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "BAD_QUERY");
    }

    #[tokio::test]
    async fn test_empty_match_is_not_an_error() {
        let service = service_with_records(2).await;
        let page = service
            .query(&params(&[("customer_name", "Nobody")]))
            .await
            .unwrap();
        assert_eq!(page.total_count, 0);
        assert_eq!(page.returned_count, 0);
        assert!(page.records.is_empty());
    }

    #[tokio::test]
    async fn test_pagination_metadata() {
        let service = service_with_records(7).await;
        let page = service
            .query(&params(&[("limit", "3"), ("offset", "6")]))
            .await
            .unwrap();
        assert_eq!(page.total_count, 7);
        assert_eq!(page.returned_count, 1);
        assert_eq!(page.offset, 6);
        assert_eq!(page.limit, 3);
    }
}
