//! Error types for fedtest data types.

use thiserror::Error;

/// Errors raised while constructing or parsing fedtest types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypesError {
    /// A role name that is not guest, host, host-N or coordinator.
    #[error("invalid role name: {0:?}")]
    InvalidRole(String),

    /// A table row whose width does not match the header.
    #[error("row {row} has {found} cells, expected {expected}")]
    RaggedRow {
        /// Zero-based row index.
        row: usize,
        /// Number of columns in the header.
        expected: usize,
        /// Number of cells found in the row.
        found: usize,
    },

    /// Identifier count does not match row count.
    #[error("table has {ids} identifiers for {rows} rows")]
    IdCountMismatch {
        /// Number of identifiers.
        ids: usize,
        /// Number of rows.
        rows: usize,
    },

    /// A projection referenced a column the table does not have.
    #[error("missing column: {0}")]
    MissingColumn(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TypesError::InvalidRole("observer".into());
        assert_eq!(err.to_string(), "invalid role name: \"observer\"");

        let err = TypesError::RaggedRow {
            row: 2,
            expected: 3,
            found: 1,
        };
        assert_eq!(err.to_string(), "row 2 has 1 cells, expected 3");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypesError>();
    }
}
