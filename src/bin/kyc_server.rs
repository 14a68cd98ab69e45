//! KYC Pipeline REST API Server
//!
//! ## Usage
//!
//! ```bash
//! # Start with the in-memory store and demo tools
//! cargo run --bin kyc_server --features server
//!
//! # Trigger a run
//! curl -X POST http://localhost:3000/api/kyc/run \
//!   -H "Content-Type: application/json" \
//!   -d '{"doc_id": "KYC-1", "s3_uri": "s3://incoming/a.jpg", "doc_type": "KYC", "to_email": "u@x.com"}'
//!
//! # Query records
//! curl 'http://localhost:3000/api/kyc/records?final_decision=PROCESSED&limit=20'
//! curl http://localhost:3000/api/kyc/records/KYC-1
//! curl http://localhost:3000/api/health
//! ```
//!
//! Environment:
//! - `KYC_PIPELINE_CONFIG` — path to the pipeline policy YAML
//! - `KYC_RULES_DIR` — directory of per-doc-type rule YAML files
//! - `KYC_AUDIT_DIR` — decision audit directory (default `runlogs`)
//! - `KYC_DECIDER_URL` / `KYC_DECIDER_API_KEY` — remote judgment service
//! - `KYC_BIND` — listen address (default `0.0.0.0:3000`)
//! - `DATABASE_URL` — Postgres store (requires the `database` feature)

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use kyc_pipeline::api::{create_router, ApiState};
use kyc_pipeline::store::MemoryRunStore;
use kyc_pipeline::tools::{AuditLog, RemoteDecider, ToolGateway, YamlRuleSource};
use kyc_pipeline::{Orchestrator, PipelineConfig, QueryService, RunStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match std::env::var("KYC_PIPELINE_CONFIG") {
        Ok(path) => {
            tracing::info!(path = %path, "loading pipeline config");
            PipelineConfig::from_yaml_file(path)?
        }
        Err(_) => PipelineConfig::default(),
    };

    let store = build_store().await?;

    let audit_dir = std::env::var("KYC_AUDIT_DIR").unwrap_or_else(|_| "runlogs".to_string());
    let mut gateway = ToolGateway::builder(store.clone())
        .timeouts(config.tool_timeouts.clone())
        .retries(config.tool_retries)
        .audit(AuditLog::new(audit_dir));

    if let Ok(rules_dir) = std::env::var("KYC_RULES_DIR") {
        tracing::info!(dir = %rules_dir, "using YAML rule sets");
        gateway = gateway.rules(YamlRuleSource::new(rules_dir));
    }
    if std::env::var("KYC_DECIDER_URL").is_ok() {
        tracing::info!("using remote decision provider");
        gateway = gateway.decider(RemoteDecider::from_env()?);
    }

    let orchestrator = Arc::new(Orchestrator::new(
        config.clone(),
        Arc::new(gateway.build()),
        store.clone(),
    ));
    let queries = Arc::new(QueryService::new(
        store.clone(),
        config.default_page_size,
        config.max_page_size,
    ));

    let app = create_router(ApiState {
        orchestrator,
        queries,
        store,
    });

    let addr: SocketAddr = std::env::var("KYC_BIND")
        .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        .parse()?;
    tracing::info!(%addr, "kyc pipeline server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[cfg(feature = "database")]
async fn build_store() -> Result<Arc<dyn RunStore>> {
    use kyc_pipeline::store::PgRunStore;
    use sqlx::postgres::PgPoolOptions;

    match std::env::var("DATABASE_URL") {
        Ok(url) => {
            tracing::info!("connecting to Postgres run store");
            let pool = PgPoolOptions::new().max_connections(10).connect(&url).await?;
            let store = PgRunStore::new(pool);
            store.ensure_schema().await.map_err(anyhow::Error::from)?;
            Ok(Arc::new(store))
        }
        Err(_) => Ok(Arc::new(MemoryRunStore::new())),
    }
}

#[cfg(not(feature = "database"))]
async fn build_store() -> Result<Arc<dyn RunStore>> {
    Ok(Arc::new(MemoryRunStore::new()))
}
