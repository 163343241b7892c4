//! Link-level tables.
//!
//! A [`LinkTable`] is a row-oriented numeric table indexed by link id. Every
//! row describes one vehicle pass over a road link; every column holds one
//! named `f64` quantity (speed, grade, distance, energy, ...).
//!
//! `NaN` marks a missing value. Tables are plain values: every operation that
//! derives a new table (filtering, row selection, adding columns to a clone)
//! leaves the source untouched.
//!
//! # Example
//!
//! ```rust
//! use powertrain::dataset::LinkTable;
//!
//! let links = LinkTable::from_columns(vec![
//!     ("speed", vec![30.0, 65.0]),
//!     ("miles", vec![0.5, 1.2]),
//! ])
//! .unwrap();
//!
//! assert_eq!(links.n_rows(), 2);
//! assert_eq!(links.column("miles"), Some(&[0.5, 1.2][..]));
//! ```

use crate::error::{PowertrainError, Result};
use ndarray::Array2;

pub mod csv_io;

/// Numeric table indexed by link id.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkTable {
    index: Vec<String>,
    names: Vec<String>,
    columns: Vec<Vec<f64>>,
}

impl LinkTable {
    /// Creates a table with the given link ids and no columns.
    pub fn new(index: Vec<String>) -> Self {
        Self {
            index,
            names: Vec::new(),
            columns: Vec::new(),
        }
    }

    /// Creates a table from named columns, indexed `"0"`, `"1"`, ...
    ///
    /// # Errors
    /// [`PowertrainError::InvalidInput`] if the columns differ in length or a
    /// name repeats.
    pub fn from_columns<S: Into<String>>(columns: Vec<(S, Vec<f64>)>) -> Result<Self> {
        let n_rows = columns.first().map(|(_, values)| values.len()).unwrap_or(0);
        let mut table = Self::new((0..n_rows).map(|i| i.to_string()).collect());
        for (name, values) in columns {
            let name = name.into();
            if table.column(&name).is_some() {
                return Err(PowertrainError::InvalidInput(format!(
                    "column '{name}' given more than once"
                )));
            }
            table.insert_column(name, values)?;
        }
        Ok(table)
    }

    /// Replaces the link-id index.
    pub fn with_index(mut self, index: Vec<String>) -> Result<Self> {
        if index.len() != self.n_rows() {
            return Err(PowertrainError::InvalidInput(format!(
                "index has {} entries but the table has {} rows",
                index.len(),
                self.n_rows()
            )));
        }
        self.index = index;
        Ok(self)
    }

    /// Adds a column, replacing any existing column of the same name.
    pub fn insert_column(&mut self, name: impl Into<String>, values: Vec<f64>) -> Result<()> {
        let name = name.into();
        if values.len() != self.n_rows() {
            return Err(PowertrainError::InvalidInput(format!(
                "column '{}' has {} values but the table has {} rows",
                name,
                values.len(),
                self.n_rows()
            )));
        }
        match self.position(&name) {
            Some(pos) => self.columns[pos] = values,
            None => {
                self.names.push(name);
                self.columns.push(values);
            }
        }
        Ok(())
    }

    pub fn n_rows(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<&[f64]> {
        self.position(name).map(|pos| self.columns[pos].as_slice())
    }

    /// Like [`Self::column`] but fails with [`PowertrainError::MissingColumn`].
    pub fn require_column(&self, name: &str) -> Result<&[f64]> {
        self.column(name)
            .ok_or_else(|| PowertrainError::MissingColumn {
                columns: vec![name.to_string()],
            })
    }

    /// Names from `names` that are not columns of this table, in order.
    pub fn missing_columns(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|name| self.position(name).is_none())
            .cloned()
            .collect()
    }

    /// Names from `names` whose column contains at least one missing value.
    /// Absent columns are ignored.
    pub fn null_columns(&self, names: &[String]) -> Vec<String> {
        names
            .iter()
            .filter(|name| {
                self.column(name)
                    .map(|values| values.iter().any(|v| v.is_nan()))
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    /// Copies the named columns into a `(n_rows, names.len())` matrix.
    ///
    /// # Errors
    /// [`PowertrainError::MissingColumn`] listing every absent column.
    pub fn select(&self, names: &[String]) -> Result<Array2<f64>> {
        let missing = self.missing_columns(names);
        if !missing.is_empty() {
            return Err(PowertrainError::MissingColumn { columns: missing });
        }

        let selected: Vec<&[f64]> = names.iter().filter_map(|n| self.column(n)).collect();
        Ok(Array2::from_shape_fn((self.n_rows(), names.len()), |(row, col)| {
            selected[col][row]
        }))
    }

    /// New table with the rows at `rows`, in that order.
    ///
    /// # Errors
    /// [`PowertrainError::InvalidInput`] if a row is out of range.
    pub fn take_rows(&self, rows: &[usize]) -> Result<LinkTable> {
        if let Some(&bad) = rows.iter().find(|&&r| r >= self.n_rows()) {
            return Err(PowertrainError::InvalidInput(format!(
                "row {bad} is out of range for a table of {} rows",
                self.n_rows()
            )));
        }
        Ok(LinkTable {
            index: rows.iter().map(|&r| self.index[r].clone()).collect(),
            names: self.names.clone(),
            columns: self
                .columns
                .iter()
                .map(|values| rows.iter().map(|&r| values[r]).collect())
                .collect(),
        })
    }

    /// New table with the rows whose `mask` entry is `true`.
    ///
    /// # Errors
    /// [`PowertrainError::InvalidInput`] unless `mask` has one entry per row.
    pub fn filter(&self, mask: &[bool]) -> Result<LinkTable> {
        if mask.len() != self.n_rows() {
            return Err(PowertrainError::InvalidInput(format!(
                "mask has {} entries but the table has {} rows",
                mask.len(),
                self.n_rows()
            )));
        }
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(row, &keep)| keep.then_some(row))
            .collect();
        self.take_rows(&rows)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn links() -> LinkTable {
        LinkTable::from_columns(vec![
            ("speed", vec![10.0, 20.0, 30.0]),
            ("grade", vec![0.0, f64::NAN, 0.02]),
            ("miles", vec![0.1, 0.2, 0.3]),
        ])
        .unwrap()
    }

    #[test]
    fn test_from_columns_default_index() {
        let table = links();
        assert_eq!(table.n_rows(), 3);
        assert_eq!(table.index(), &["0", "1", "2"]);
        assert_eq!(table.column_names(), &["speed", "grade", "miles"]);
    }

    #[test]
    fn test_from_columns_rejects_ragged_columns() {
        let result = LinkTable::from_columns(vec![("a", vec![1.0, 2.0]), ("b", vec![1.0])]);
        assert!(matches!(result, Err(PowertrainError::InvalidInput(_))));
    }

    #[test]
    fn test_from_columns_rejects_duplicates() {
        let result = LinkTable::from_columns(vec![("a", vec![1.0]), ("a", vec![2.0])]);
        assert!(result.is_err());
    }

    #[test]
    fn test_with_index_checks_length() {
        let table = links();
        assert!(table.clone().with_index(vec!["a".into()]).is_err());
        let relabeled = table
            .with_index(vec!["x".into(), "y".into(), "z".into()])
            .unwrap();
        assert_eq!(relabeled.index()[2], "z");
    }

    #[test]
    fn test_insert_column_replaces_existing() {
        let mut table = links();
        table.insert_column("speed", vec![1.0, 2.0, 3.0]).unwrap();
        assert_eq!(table.column("speed"), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(table.column_names().len(), 3);
    }

    #[test]
    fn test_select_collects_all_missing_columns() {
        let table = links();
        let names = vec![
            "speed".to_string(),
            "elevation".to_string(),
            "lanes".to_string(),
        ];
        match table.select(&names) {
            Err(PowertrainError::MissingColumn { columns }) => {
                assert_eq!(columns, vec!["elevation", "lanes"]);
            }
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_select_orders_columns() {
        let table = links();
        let m = table
            .select(&["miles".to_string(), "speed".to_string()])
            .unwrap();
        assert_eq!(m.shape(), &[3, 2]);
        assert_eq!(m[[1, 0]], 0.2);
        assert_eq!(m[[1, 1]], 20.0);
    }

    #[test]
    fn test_null_columns() {
        let table = links();
        let names = vec!["speed".to_string(), "grade".to_string()];
        assert_eq!(table.null_columns(&names), vec!["grade"]);
    }

    #[test]
    fn test_filter_and_take_rows_leave_source_untouched() {
        let table = links();
        let filtered = table.filter(&[true, false, true]).unwrap();
        assert_eq!(filtered.index(), &["0", "2"]);
        assert_eq!(filtered.column("speed"), Some(&[10.0, 30.0][..]));

        let taken = table.take_rows(&[2, 0]).unwrap();
        assert_eq!(taken.index(), &["2", "0"]);
        assert_eq!(taken.column("miles"), Some(&[0.3, 0.1][..]));

        assert_eq!(table.n_rows(), 3);
    }

    #[test]
    fn test_filter_and_take_rows_check_bounds() {
        let table = links();
        assert!(matches!(
            table.filter(&[true, true, true, true]),
            Err(PowertrainError::InvalidInput(_))
        ));
        assert!(table.filter(&[true]).is_err());
        assert!(matches!(
            table.take_rows(&[0, 3]),
            Err(PowertrainError::InvalidInput(_))
        ));
        assert_eq!(table.take_rows(&[]).unwrap().n_rows(), 0);
    }

    #[test]
    fn test_require_column() {
        let table = links();
        assert!(table.require_column("speed").is_ok());
        assert!(matches!(
            table.require_column("kwh"),
            Err(PowertrainError::MissingColumn { columns }) if columns == vec!["kwh"]
        ));
    }
}
