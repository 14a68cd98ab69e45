//! Pipeline Orchestration
//!
//! The stage contract, the per-run context, the five stage implementations,
//! and the orchestrator that sequences them.

pub mod context;
pub mod orchestrator;
pub mod stage;
pub mod stages;

pub use context::RunContext;
pub use orchestrator::{Orchestrator, RunReport, Trigger};
pub use stage::{Stage, StageKind, StageReport};
pub use stages::compose_outcome;
