//! Suite file loading.
//!
//! The suite is a TOML file (default: `fedtest.toml`) with a `[suite]`
//! table of harness settings and a `[cases.<name>.<role>]` table per role.
//! Case and role order follow the file.

use fedtest_types::{Role, RoleOutput, RoleSpec, TestCase};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::orchestrator::OrchestratorSettings;

/// Root of a suite file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Harness settings.
    #[serde(default)]
    pub suite: SuiteSettings,
    /// Cases by name, each a table keyed by role name.
    ///
    /// Role names are parsed by [`Config::test_cases`], so two spellings of
    /// one role (`host1`, `host-1`) are caught instead of merged.
    #[serde(default)]
    pub cases: IndexMap<String, IndexMap<String, RoleEntry>>,
}

/// `[suite]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SuiteSettings {
    /// Timeout in seconds for roles without their own (default: 60).
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Row cap for dataset loading (default: 200000).
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    /// Seconds to wait for a worker's output after it is gone (default: 5).
    #[serde(default = "default_termination_grace_secs")]
    pub termination_grace_secs: u64,
}

/// `[cases.<name>.<role>]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleEntry {
    /// Protocol input, handed to the worker untouched.
    pub input: serde_json::Value,
    /// Per-role timeout in seconds.
    pub timeout: Option<u64>,
    /// Known-good output.
    pub expect: Option<RoleOutput>,
}

fn default_timeout_secs() -> u64 {
    60
}

fn default_max_rows() -> usize {
    200_000
}

fn default_termination_grace_secs() -> u64 {
    5
}

impl Default for SuiteSettings {
    fn default() -> Self {
        Self {
            default_timeout_secs: default_timeout_secs(),
            max_rows: default_max_rows(),
            termination_grace_secs: default_termination_grace_secs(),
        }
    }
}

impl Config {
    /// Load a suite from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Orchestrator settings from the `[suite]` table.
    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            default_timeout: Duration::from_secs(self.suite.default_timeout_secs),
            max_rows: self.suite.max_rows,
            termination_grace: Duration::from_secs(self.suite.termination_grace_secs),
        }
    }

    /// Build the validated case list, in file order.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a case with no roles, an unknown
    /// or repeated role, a role whose input is not a table, or a zero timeout.
    pub fn test_cases(&self) -> Result<Vec<TestCase>, ConfigError> {
        if self.suite.default_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                case: "suite".to_string(),
                reason: "default_timeout_secs must be positive".to_string(),
            });
        }

        self.cases
            .iter()
            .map(|(name, roles)| {
                let invalid = |reason: String| ConfigError::Invalid {
                    case: name.clone(),
                    reason,
                };
                if roles.is_empty() {
                    return Err(invalid("case defines no roles".to_string()));
                }

                let mut case = TestCase::new(name.clone());
                for (key, entry) in roles {
                    let role: Role = key
                        .parse()
                        .map_err(|e: fedtest_types::TypesError| invalid(e.to_string()))?;
                    if case.role(role).is_some() {
                        return Err(invalid(format!("role {} is defined more than once", role)));
                    }
                    if !entry.input.is_object() {
                        return Err(invalid(format!("{} input must be a table", role)));
                    }
                    let mut spec = RoleSpec::new(role, entry.input.clone());
                    match entry.timeout {
                        Some(0) => {
                            return Err(invalid(format!("{} timeout must be positive", role)))
                        }
                        Some(secs) => spec = spec.with_timeout(Duration::from_secs(secs)),
                        None => {}
                    }
                    if let Some(expect) = &entry.expect {
                        spec = spec.with_expectation(expect.clone());
                    }
                    case = case.with_role(spec);
                }
                Ok(case)
            })
            .collect()
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the suite file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the suite file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse the suite file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the suite file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// The suite parsed but describes an unusable case.
    #[error("invalid case {case}: {reason}")]
    Invalid {
        /// Offending case name.
        case: String,
        /// What is wrong with it.
        reason: String,
    },
}
