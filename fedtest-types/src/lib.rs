//! # fedtest-types
//!
//! Shared data types for the fedtest multi-party protocol harness.
//!
//! This crate provides the foundational types used across all fedtest crates:
//! - [`Role`] - Participant names (guest, host, host-N, coordinator)
//! - [`TestCase`], [`RoleSpec`] - Case definitions handed to the orchestrator
//! - [`RunResult`], [`RoleOutput`] - What a role worker reports back
//! - [`Table`] - Tabular protocol outputs with exact element-wise equality
//! - [`WorkerRequest`] - Envelope written to a worker's stdin
//! - [`TypesError`] - Error types

#![warn(missing_docs)]
#![warn(clippy::all)]

mod case;
mod error;
mod request;
mod result;
mod role;
mod table;

pub use case::{RoleSpec, TestCase};
pub use error::TypesError;
pub use request::{job_suffix, manual_job_suffix, WorkerRequest};
pub use result::{RoleOutcome, RoleOutput, RunResult};
pub use role::Role;
pub use table::Table;
