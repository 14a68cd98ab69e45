//! Decision Audit Sink
//!
//! Two files under one directory: `decisions.jsonl` gets one appended line
//! per terminal record, `latest_run.json` is overwritten with the most
//! recent record for quick inspection. Failures here are logged loudly by
//! the gateway but never crash a computed run.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::model::RunRecord;

const DECISIONS_FILE: &str = "decisions.jsonl";
const LATEST_FILE: &str = "latest_run.json";

/// File-based audit log for terminal run records
#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Append the record as one JSONL line
    pub fn append_decision(&self, record: &RunRecord) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(DECISIONS_FILE);
        let line = serde_json::to_string(record)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        writeln!(file, "{line}")?;
        Ok(path)
    }

    /// Overwrite the latest-run file with this record
    pub fn write_latest(&self, record: &RunRecord) -> std::io::Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(LATEST_FILE);
        let pretty = serde_json::to_string_pretty(record)?;
        std::fs::write(&path, pretty)?;
        Ok(path)
    }
}
