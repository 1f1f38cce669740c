//! The envelope an orchestrator hands to a worker process.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::Role;

/// Everything a worker needs to run one role of one case.
///
/// Written as a single JSON document to the worker's stdin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerRequest {
    /// Case identifier.
    pub case: String,
    /// Role to run.
    pub role: Role,
    /// Suffix appended to federation job ids (shared by every role of a case).
    pub job_suffix: String,
    /// Protocol input, verbatim from the case definition.
    pub input: Value,
    /// Row cap for dataset loading.
    pub max_rows: usize,
}

/// Job-id suffix for an orchestrated case run: `-<case>-<unix millis>`.
///
/// The timestamp keeps repeated runs of the same case from meeting each
/// other's leftover federation state.
pub fn job_suffix(case: &str, at: SystemTime) -> String {
    let millis = at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("-{}-{}", case, millis)
}

/// Job-id suffix for manual single-role runs.
///
/// Separate terminals cannot share a timestamp, so the suffix is the case
/// name plus an optional operator-chosen session tag.
pub fn manual_job_suffix(case: &str, session: Option<&str>) -> String {
    match session {
        Some(tag) => format!("-{}-{}", case, tag),
        None => format!("-{}", case),
    }
}
