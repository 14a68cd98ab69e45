//! Error types for the KYC pipeline
//!
//! Layered thiserror enums: `PipelineError` for run execution,
//! `StoreError` for the run store, `QueryError` for the query surface.
//! Every pipeline error maps onto one `FailureKind`, which is what gets
//! written into a failed run record.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of a terminal run failure, persisted on the run record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    /// Malformed trigger payload; never retried
    InvalidInput,
    /// Network/timeout failure that exhausted the gateway's retry budget
    ToolTransient,
    /// Tool reported a definitive failure; never retried
    ToolPermanent,
    /// Judgment confidence stayed below threshold after all rework attempts
    LowConfidenceExceeded,
    /// Persistence layer rejected the write; the run result was still computed
    StoreWriteFailure,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::InvalidInput => "INVALID_INPUT",
            FailureKind::ToolTransient => "TOOL_TRANSIENT",
            FailureKind::ToolPermanent => "TOOL_PERMANENT",
            FailureKind::LowConfidenceExceeded => "LOW_CONFIDENCE_EXCEEDED",
            FailureKind::StoreWriteFailure => "STORE_WRITE_FAILURE",
        }
    }
}

/// Errors raised while driving a run through the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid trigger input: {0}")]
    InvalidInput(String),

    #[error("tool '{tool}' failed transiently after retries: {message}")]
    ToolTransient { tool: String, message: String },

    #[error("tool '{tool}' failed permanently: {message}")]
    ToolPermanent { tool: String, message: String },

    #[error("judgment confidence below threshold after {attempts} extraction attempts")]
    LowConfidenceExceeded { attempts: u32 },

    #[error("run store rejected write for doc '{doc_id}': {message}")]
    StoreWriteFailure { doc_id: String, message: String },
}

impl PipelineError {
    /// The failure kind recorded on the terminal run record
    pub fn kind(&self) -> FailureKind {
        match self {
            PipelineError::InvalidInput(_) => FailureKind::InvalidInput,
            PipelineError::ToolTransient { .. } => FailureKind::ToolTransient,
            PipelineError::ToolPermanent { .. } => FailureKind::ToolPermanent,
            PipelineError::LowConfidenceExceeded { .. } => FailureKind::LowConfidenceExceeded,
            PipelineError::StoreWriteFailure { .. } => FailureKind::StoreWriteFailure,
        }
    }
}

/// Errors raised by a run store implementation
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store write failed: {0}")]
    Write(String),

    #[error("store read failed: {0}")]
    Read(String),

    /// Backend temporarily unreachable; the gateway may retry these
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised at the query-service boundary.
///
/// All variants surface to callers as `BAD_QUERY`; the store is never
/// touched when one is raised.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("unknown query parameter '{0}'")]
    UnknownParameter(String),

    #[error("invalid value for '{param}': {message}")]
    InvalidValue { param: String, message: String },

    #[error("store read failed during query: {0}")]
    Store(#[from] StoreError),
}

impl QueryError {
    /// Stable error code for the API surface
    pub fn code(&self) -> &'static str {
        match self {
            QueryError::UnknownParameter(_) | QueryError::InvalidValue { .. } => "BAD_QUERY",
            QueryError::Store(_) => "STORE_READ_FAILURE",
        }
    }
}
