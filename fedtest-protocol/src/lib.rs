//! # fedtest-protocol
//!
//! The protocol side of a role worker.
//!
//! - [`contract`] - collaborator traits ([`Aligner`], [`Selector`],
//!   [`ModelStore`], [`DatasetLoader`], [`ProtocolBackend`])
//! - [`LocalBackend`] - the reference backend: file federation,
//!   `sha256_sal` alignment, `variance` selection
//! - [`remove_case_artifacts`] - clears the job directories and models of
//!   one run
//! - [`run_role`] - turns a [`WorkerRequest`](fedtest_types::WorkerRequest)
//!   into exactly one [`RunResult`](fedtest_types::RunResult)
//!
//! Role logic only talks to the traits, so another backend can be swapped in
//! without touching the worker.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod align;
pub mod artifacts;
pub mod backend;
pub mod contract;
pub mod dataset;
pub mod error;
pub mod federation;
pub mod input;
pub mod model;
pub mod runner;
pub mod select;

pub use artifacts::{case_artifacts, remove_case_artifacts};
pub use backend::LocalBackend;
pub use contract::{
    Aligner, Dataset, DatasetLoader, ModelInfo, ModelStore, ProtocolBackend, SelectionModel,
    Selector, TrainMeta,
};
pub use error::ProtocolError;
pub use federation::{FederationConf, FileFederation, SessionConf};
pub use input::{check_case, ProtocolInput};
pub use runner::run_role;
