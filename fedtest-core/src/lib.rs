//! # fedtest-core
//!
//! Orchestration for multi-party protocol test cases.
//!
//! Every role of a case runs as a supervised child process. The orchestrator
//! starts them all, bounds the whole case with one [`DeadlineGuard`],
//! collects their [`RunResult`](fedtest_types::RunResult)s over a
//! [`ResultChannel`] and judges the case:
//!
//! ```text
//! CaseSuiteRunner ──► CaseOrchestrator ──► RoleWorker (per role) ──► child process
//!                          │                    │
//!                          │◄── ResultChannel ◄─┘  (one JSON line per role)
//!                          └── DeadlineGuard ──► teardown token ──► kill all
//! ```
//!
//! Precedence of outcomes: operator interrupt, timeout, incomplete, role
//! failure, mismatch, pass.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agreement;
pub mod channel;
pub mod config;
pub mod deadline;
pub mod orchestrator;
pub mod suite;
pub mod worker;

#[cfg(test)]
mod test_support;

pub use agreement::{Mismatch, MismatchKind};
pub use channel::{ResultChannel, ResultSender};
pub use config::{Config, ConfigError, RoleEntry, SuiteSettings};
pub use deadline::{DeadlineError, DeadlineGuard, Disarm};
pub use orchestrator::{CaseOrchestrator, CaseOutcome, CaseReport, OrchestratorSettings};
pub use suite::{CaseSuiteRunner, SuiteOptions, SuiteReport};
pub use worker::{ExecLauncher, RoleWorker, WorkerError, WorkerExit, WorkerLauncher, WorkerReport};
