//! Postgres Run Store
//!
//! Database-backed store for deployments that need run records to survive
//! the process. Same semantics as the in-memory store: upsert keyed by
//! (doc_id, attempt_no), terminal records immutable, filtered queries
//! ordered by created_at descending.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

use super::{Page, QueryPage, RecordFilter, RunStore};
use crate::error::StoreError;
use crate::model::{RunFailure, RunRecord, RunStatus, StageOutputs};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS kyc_runs (
    run_id            UUID NOT NULL,
    doc_id            TEXT NOT NULL,
    attempt_no        INT  NOT NULL,
    customer_name     TEXT,
    identification_no TEXT,
    final_decision    TEXT NOT NULL,
    outcome           TEXT,
    failure           JSONB,
    created_at        TIMESTAMPTZ NOT NULL,
    stage_outputs     JSONB NOT NULL,
    rework_count      INT NOT NULL,
    PRIMARY KEY (doc_id, attempt_no)
)
"#;

pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the backing table when it does not exist yet
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .map_err(write_err)?;
        Ok(())
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn put(&self, record: &RunRecord) -> Result<(), StoreError> {
        let stage_outputs = serde_json::to_value(&record.stage_outputs)
            .map_err(|e| StoreError::Write(format!("stage outputs not serializable: {e}")))?;
        let failure = record
            .failure
            .as_ref()
            .map(serde_json::to_value)
            .transpose()
            .map_err(|e| StoreError::Write(format!("failure not serializable: {e}")))?;

        let result = sqlx::query(
            r#"
            INSERT INTO kyc_runs
              (run_id, doc_id, attempt_no, customer_name, identification_no,
               final_decision, outcome, failure, created_at, stage_outputs, rework_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (doc_id, attempt_no) DO UPDATE SET
                run_id = EXCLUDED.run_id,
                customer_name = EXCLUDED.customer_name,
                identification_no = EXCLUDED.identification_no,
                final_decision = EXCLUDED.final_decision,
                outcome = EXCLUDED.outcome,
                failure = EXCLUDED.failure,
                created_at = EXCLUDED.created_at,
                stage_outputs = EXCLUDED.stage_outputs,
                rework_count = EXCLUDED.rework_count
            WHERE kyc_runs.final_decision = 'INPROCESS'
            "#,
        )
        .bind(record.run_id)
        .bind(&record.doc_id)
        .bind(record.attempt_no as i32)
        .bind(&record.customer_name)
        .bind(&record.identification_no)
        .bind(record.final_decision.as_str())
        .bind(record.outcome.map(|o| o.as_str()))
        .bind(failure)
        .bind(record.created_at)
        .bind(stage_outputs)
        .bind(record.rework_count as i32)
        .execute(&self.pool)
        .await
        .map_err(write_err)?;

        // The conflict guard leaves terminal rows untouched
        if result.rows_affected() == 0 {
            return Err(StoreError::Write(format!(
                "record for doc '{}' attempt {} is terminal and immutable",
                record.doc_id, record.attempt_no
            )));
        }
        Ok(())
    }

    async fn get(&self, doc_id: &str) -> Result<Option<RunRecord>, StoreError> {
        let row = sqlx::query_as::<_, RunRow>(
            r#"
            SELECT run_id, doc_id, attempt_no, customer_name, identification_no,
                   final_decision, outcome, failure, created_at, stage_outputs, rework_count
            FROM kyc_runs
            WHERE doc_id = $1
            ORDER BY attempt_no DESC
            LIMIT 1
            "#,
        )
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_err)?;

        row.map(RunRecord::try_from).transpose()
    }

    async fn next_ordinal(&self, doc_id: &str) -> Result<u32, StoreError> {
        let row = sqlx::query(
            "SELECT COALESCE(MAX(attempt_no), 0) + 1 AS next FROM kyc_runs WHERE doc_id = $1",
        )
        .bind(doc_id)
        .fetch_one(&self.pool)
        .await
        .map_err(read_err)?;
        let next: i32 = row.try_get("next").map_err(read_err)?;
        Ok(next as u32)
    }

    async fn query(&self, filter: &RecordFilter, page: Page) -> Result<QueryPage, StoreError> {
        let mut count_builder = QueryBuilder::new("SELECT COUNT(*) FROM kyc_runs WHERE 1=1");
        push_filters(&mut count_builder, filter);
        let total_count: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await
            .map_err(read_err)?;

        let mut builder = QueryBuilder::new(
            "SELECT run_id, doc_id, attempt_no, customer_name, identification_no, \
             final_decision, outcome, failure, created_at, stage_outputs, rework_count \
             FROM kyc_runs WHERE 1=1",
        );
        push_filters(&mut builder, filter);
        builder.push(" ORDER BY created_at DESC, doc_id ASC, attempt_no DESC");
        builder.push(" LIMIT ");
        builder.push_bind(page.limit as i64);
        builder.push(" OFFSET ");
        builder.push_bind(page.offset as i64);

        let rows: Vec<RunRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(read_err)?;

        let records = rows
            .into_iter()
            .map(RunRecord::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(QueryPage {
            records,
            total_count: total_count as usize,
        })
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &RecordFilter) {
    if let Some(decision) = filter.final_decision {
        builder.push(" AND final_decision = ");
        builder.push_bind(decision.as_str());
    }
    if let Some(name) = &filter.customer_name {
        builder.push(" AND customer_name ILIKE ");
        builder.push_bind(format!("%{name}%"));
    }
    if let Some(id) = &filter.identification_no {
        builder.push(" AND identification_no = ");
        builder.push_bind(id.clone());
    }
    if let Some(from) = filter.from_date {
        builder.push(" AND created_at::date >= ");
        builder.push_bind(from);
    }
    if let Some(to) = filter.to_date {
        builder.push(" AND created_at::date <= ");
        builder.push_bind(to);
    }
}

fn write_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => StoreError::Unavailable(e.to_string()),
        other => StoreError::Write(other.to_string()),
    }
}

fn read_err(e: sqlx::Error) -> StoreError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut => StoreError::Unavailable(e.to_string()),
        other => StoreError::Read(other.to_string()),
    }
}

#[derive(sqlx::FromRow)]
struct RunRow {
    run_id: Uuid,
    doc_id: String,
    attempt_no: i32,
    customer_name: Option<String>,
    identification_no: Option<String>,
    final_decision: String,
    outcome: Option<String>,
    failure: Option<serde_json::Value>,
    created_at: DateTime<Utc>,
    stage_outputs: serde_json::Value,
    rework_count: i32,
}

impl TryFrom<RunRow> for RunRecord {
    type Error = StoreError;

    fn try_from(row: RunRow) -> Result<Self, StoreError> {
        let final_decision: RunStatus = row
            .final_decision
            .parse()
            .map_err(|e: String| StoreError::Read(e))?;
        let outcome = row
            .outcome
            .map(|o| o.parse())
            .transpose()
            .map_err(|e: String| StoreError::Read(e))?;
        let failure: Option<RunFailure> = row
            .failure
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| StoreError::Read(format!("malformed failure payload: {e}")))?;
        let stage_outputs: StageOutputs = serde_json::from_value(row.stage_outputs)
            .map_err(|e| StoreError::Read(format!("malformed stage outputs: {e}")))?;

        Ok(RunRecord {
            run_id: row.run_id,
            doc_id: row.doc_id,
            attempt_no: row.attempt_no as u32,
            customer_name: row.customer_name,
            identification_no: row.identification_no,
            final_decision,
            outcome,
            failure,
            created_at: row.created_at,
            stage_outputs,
            rework_count: row.rework_count as u32,
        })
    }
}
