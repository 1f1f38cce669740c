//! Tabular data exchanged with the selection protocol.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::TypesError;

/// A small numeric table keyed by sample identifier.
///
/// Equality is exact and element-wise over identifiers, column names and
/// cells, which is what the reload-consistency check relies on.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Table {
    /// Sample identifiers, one per row.
    pub ids: Vec<String>,
    /// Column names, one per cell in each row.
    pub columns: Vec<String>,
    /// Row-major cells.
    pub rows: Vec<Vec<f64>>,
}

impl Table {
    /// Build a table, checking that every row matches the header width.
    pub fn new(
        ids: Vec<String>,
        columns: Vec<String>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self, TypesError> {
        if ids.len() != rows.len() {
            return Err(TypesError::IdCountMismatch {
                ids: ids.len(),
                rows: rows.len(),
            });
        }
        for (row, cells) in rows.iter().enumerate() {
            if cells.len() != columns.len() {
                return Err(TypesError::RaggedRow {
                    row,
                    expected: columns.len(),
                    found: cells.len(),
                });
            }
        }
        Ok(Self { ids, columns, rows })
    }

    /// An empty table (used for roles that load no data).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column by name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Copy out a single column.
    pub fn column(&self, name: &str) -> Option<Vec<f64>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[idx]).collect())
    }

    /// Project the table onto the given columns, in the given order.
    pub fn select(&self, names: &[String]) -> Result<Table, TypesError> {
        let indices = names
            .iter()
            .map(|name| {
                self.column_index(name)
                    .ok_or_else(|| TypesError::MissingColumn(name.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i]).collect())
            .collect();

        Ok(Table {
            ids: self.ids.clone(),
            columns: names.to_vec(),
            rows,
        })
    }

    /// Keep at most `max_rows` rows.
    pub fn truncate(&mut self, max_rows: usize) {
        self.ids.truncate(max_rows);
        self.rows.truncate(max_rows);
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Table({} rows x [{}])", self.len(), self.columns.join(", "))?;
        for (id, row) in self.ids.iter().zip(&self.rows).take(5) {
            write!(f, " {}={:?}", id, row)?;
        }
        if self.len() > 5 {
            write!(f, " ...")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(
            vec!["a".into(), "b".into()],
            vec!["x".into(), "y".into(), "z".into()],
            vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]],
        )
        .unwrap()
    }

    #[test]
    fn new_rejects_ragged_rows() {
        let err = Table::new(
            vec!["a".into(), "b".into()],
            vec!["x".into(), "y".into()],
            vec![vec![1.0, 2.0], vec![3.0]],
        )
        .unwrap_err();
        assert_eq!(
            err,
            TypesError::RaggedRow {
                row: 1,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn new_rejects_id_count_mismatch() {
        let err = Table::new(vec!["a".into()], vec!["x".into()], vec![]).unwrap_err();
        assert_eq!(err, TypesError::IdCountMismatch { ids: 1, rows: 0 });
    }

    #[test]
    fn select_projects_in_requested_order() {
        let t = sample();
        let projected = t.select(&["z".into(), "x".into()]).unwrap();
        assert_eq!(projected.columns, vec!["z", "x"]);
        assert_eq!(projected.rows, vec![vec![3.0, 1.0], vec![6.0, 4.0]]);
        assert_eq!(projected.ids, t.ids);
    }

    #[test]
    fn select_missing_column_fails() {
        let err = sample().select(&["w".into()]).unwrap_err();
        assert_eq!(err, TypesError::MissingColumn("w".into()));
    }

    #[test]
    fn column_extracts_values() {
        assert_eq!(sample().column("y"), Some(vec![2.0, 5.0]));
        assert_eq!(sample().column("w"), None);
    }

    #[test]
    fn equality_is_element_wise() {
        let a = sample();
        let mut b = sample();
        assert_eq!(a, b);
        b.rows[1][2] = 6.5;
        assert_ne!(a, b);
    }

    #[test]
    fn truncate_caps_rows() {
        let mut t = sample();
        t.truncate(1);
        assert_eq!(t.len(), 1);
        assert_eq!(t.ids, vec!["a"]);
    }
}
