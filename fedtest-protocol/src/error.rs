//! Errors raised by protocol collaborators inside a role worker.

use fedtest_types::{Role, TypesError};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Any failure inside a role's protocol logic.
///
/// The worker converts every variant into a failure result carrying the
/// rendered message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The role input does not describe a runnable protocol.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unknown alignment method or security scheme.
    #[error("unsupported method: {0}")]
    UnsupportedMethod(String),

    /// Unknown selector name.
    #[error("unsupported selector: {0}")]
    UnsupportedSelector(String),

    /// Reading or writing a federation message failed.
    #[error("federation i/o at {path}: {source}")]
    Federation {
        /// Message file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A federation message could not be decoded.
    #[error("malformed message at {path}: {source}")]
    Message {
        /// Message file.
        path: PathBuf,
        /// Underlying decode error.
        source: serde_json::Error,
    },

    /// A peer never published the awaited message.
    #[error("timed out after {waited:?} waiting for {tag} from {party}")]
    PeerTimeout {
        /// Message tag.
        tag: String,
        /// Party that did not publish.
        party: Role,
        /// How long the role waited.
        waited: Duration,
    },

    /// A dataset could not be loaded.
    #[error("dataset {path}: {reason}")]
    Dataset {
        /// Dataset file.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// A model could not be saved or loaded.
    #[error("model {model_id}: {reason}")]
    ModelStore {
        /// Model identifier.
        model_id: String,
        /// What went wrong.
        reason: String,
    },

    /// Table construction or projection failed.
    #[error(transparent)]
    Table(#[from] TypesError),
}
