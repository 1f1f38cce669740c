//! Results reported by role workers.
//!
//! A [`RunResult`] is the single message a worker sends back to the
//! orchestrator. It travels as one JSON line on the worker's stdout.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::{Role, Table};

/// The one result a role worker produces for a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    /// Which role produced this result.
    pub role: Role,
    /// Output or failure.
    pub outcome: RoleOutcome,
}

/// Success with an output, or failure with a cause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RoleOutcome {
    /// The role ran to completion.
    Success {
        /// Produced output.
        output: RoleOutput,
    },
    /// The protocol library raised inside the role.
    Failure {
        /// Human-readable cause.
        cause: String,
    },
}

/// Protocol-specific output value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoleOutput {
    /// Aligned identifier columns.
    Aligned {
        /// One vector per identifier column, rows in matching positions.
        columns: Vec<Vec<String>>,
    },
    /// Feature-selection output and the reloaded model's prediction.
    Selected {
        /// Prediction produced by the freshly trained model.
        trained: Table,
        /// Prediction produced by the persisted-then-reloaded model.
        reloaded: Table,
    },
    /// The role took part but produces no comparable value.
    Acknowledged,
}

impl RunResult {
    /// A successful result.
    pub fn success(role: Role, output: RoleOutput) -> Self {
        Self {
            role,
            outcome: RoleOutcome::Success { output },
        }
    }

    /// A failed result.
    pub fn failure(role: Role, cause: impl Into<String>) -> Self {
        Self {
            role,
            outcome: RoleOutcome::Failure {
                cause: cause.into(),
            },
        }
    }

    /// The output, if the role succeeded.
    pub fn output(&self) -> Option<&RoleOutput> {
        match &self.outcome {
            RoleOutcome::Success { output } => Some(output),
            RoleOutcome::Failure { .. } => None,
        }
    }

    /// The failure cause, if the role failed.
    pub fn failure_cause(&self) -> Option<&str> {
        match &self.outcome {
            RoleOutcome::Failure { cause } => Some(cause),
            RoleOutcome::Success { .. } => None,
        }
    }

    /// Serialize to a single JSON line (no trailing newline).
    pub fn to_json_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a JSON line produced by [`RunResult::to_json_line`].
    pub fn from_json_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }
}

impl RoleOutput {
    /// Domain equality between two outputs.
    ///
    /// Aligned outputs compare as multisets of row tuples, so two parties that
    /// report the same intersection in a different order still agree. Tables
    /// compare exactly and element-wise. Ragged aligned output (columns of
    /// different lengths) is malformed and agrees with nothing.
    pub fn agrees_with(&self, other: &RoleOutput) -> bool {
        match (self, other) {
            (RoleOutput::Aligned { columns: a }, RoleOutput::Aligned { columns: b }) => {
                a.len() == b.len()
                    && is_rectangular(a)
                    && is_rectangular(b)
                    && row_multiset(a) == row_multiset(b)
            }
            (
                RoleOutput::Selected {
                    trained: ta,
                    reloaded: ra,
                },
                RoleOutput::Selected {
                    trained: tb,
                    reloaded: rb,
                },
            ) => ta == tb && ra == rb,
            (RoleOutput::Acknowledged, RoleOutput::Acknowledged) => true,
            _ => false,
        }
    }

    /// Short name of the output kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            RoleOutput::Aligned { .. } => "aligned",
            RoleOutput::Selected { .. } => "selected",
            RoleOutput::Acknowledged => "acknowledged",
        }
    }
}

/// Count row tuples across parallel columns of equal length.
fn row_multiset(columns: &[Vec<String>]) -> BTreeMap<Vec<&str>, usize> {
    let rows = columns.first().map(Vec::len).unwrap_or(0);
    let mut counts = BTreeMap::new();
    for i in 0..rows {
        let key: Vec<&str> = columns.iter().map(|c| c[i].as_str()).collect();
        *counts.entry(key).or_insert(0) += 1;
    }
    counts
}

fn is_rectangular(columns: &[Vec<String>]) -> bool {
    columns.windows(2).all(|pair| pair[0].len() == pair[1].len())
}

impl fmt::Display for RoleOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleOutput::Aligned { columns } => write!(f, "aligned {:?}", columns),
            RoleOutput::Selected { trained, reloaded } => {
                write!(f, "selected trained={} reloaded={}", trained, reloaded)
            }
            RoleOutput::Acknowledged => write!(f, "acknowledged"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aligned(cols: &[&[&str]]) -> RoleOutput {
        RoleOutput::Aligned {
            columns: cols
                .iter()
                .map(|c| c.iter().map(|s| s.to_string()).collect())
                .collect(),
        }
    }

    #[test]
    fn aligned_agreement_ignores_row_order() {
        let a = aligned(&[&["1", "333"]]);
        let b = aligned(&[&["333", "1"]]);
        assert!(a.agrees_with(&b));
    }

    #[test]
    fn aligned_agreement_keeps_row_pairing() {
        let a = aligned(&[&["1", "2"], &["x", "y"]]);
        let b = aligned(&[&["1", "2"], &["y", "x"]]);
        assert!(!a.agrees_with(&b));
    }

    #[test]
    fn aligned_disagreement_on_content() {
        let a = aligned(&[&["1", "333"]]);
        let b = aligned(&[&["1", "22"]]);
        assert!(!a.agrees_with(&b));
        assert!(!a.agrees_with(&aligned(&[&["1", "333"], &["1", "333"]])));
    }

    #[test]
    fn ragged_columns_never_agree_with_rectangular() {
        let ragged = aligned(&[&["1", "2"], &["1"]]);
        let square = aligned(&[&["1"], &["1"]]);
        assert!(!ragged.agrees_with(&square));
    }

    #[test]
    fn kinds_never_cross_agree() {
        assert!(!RoleOutput::Acknowledged.agrees_with(&aligned(&[])));
        assert!(RoleOutput::Acknowledged.agrees_with(&RoleOutput::Acknowledged));
    }

    #[test]
    fn json_line_shape() {
        let result = RunResult::success(Role::Guest, aligned(&[&["1", "333"]]));
        let line = result.to_json_line().unwrap();
        assert_eq!(
            line,
            r#"{"role":"guest","outcome":{"status":"success","output":{"kind":"aligned","columns":[["1","333"]]}}}"#
        );
        assert_eq!(RunResult::from_json_line(&line).unwrap(), result);
    }

    #[test]
    fn failure_result_accessors() {
        let result = RunResult::failure(Role::Host, "peer vanished");
        assert_eq!(result.failure_cause(), Some("peer vanished"));
        assert!(result.output().is_none());

        let parsed = RunResult::from_json_line(
            r#" {"role":"host","outcome":{"status":"failure","cause":"peer vanished"}} "#,
        )
        .unwrap();
        assert_eq!(parsed, result);
    }
}
