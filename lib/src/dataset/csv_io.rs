//! CSV loading and writing for [`LinkTable`].
//!
//! Every column other than the index column must be numeric. Empty cells are
//! read as missing values (`NaN`).

use super::LinkTable;
use crate::error::{PowertrainError, Result};
use csv::{ReaderBuilder, WriterBuilder};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

impl LinkTable {
    /// Reads a table from CSV with a header row.
    ///
    /// If `index_column` is given, that column supplies the link ids;
    /// otherwise rows are indexed `"0"`, `"1"`, ...
    pub fn from_csv_reader<R: Read>(reader: R, index_column: Option<&str>) -> Result<Self> {
        let mut rdr = ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        for (pos, name) in headers.iter().enumerate() {
            if headers[..pos].contains(name) {
                return Err(PowertrainError::InvalidInput(format!(
                    "column '{name}' appears more than once in the CSV header"
                )));
            }
        }

        let index_pos = match index_column {
            Some(name) => Some(headers.iter().position(|h| h == name).ok_or_else(|| {
                PowertrainError::MissingColumn {
                    columns: vec![name.to_string()],
                }
            })?),
            None => None,
        };

        let mut index = Vec::new();
        let mut columns: Vec<Vec<f64>> = vec![Vec::new(); headers.len()];

        for (row, record) in rdr.records().enumerate() {
            let record = record?;
            for (col, cell) in record.iter().enumerate() {
                if Some(col) == index_pos {
                    index.push(cell.to_string());
                    continue;
                }
                let value = if cell.is_empty() {
                    f64::NAN
                } else {
                    cell.parse::<f64>().map_err(|_| {
                        PowertrainError::InvalidInput(format!(
                            "row {row}, column '{}': '{cell}' is not a number",
                            headers[col]
                        ))
                    })?
                };
                columns[col].push(value);
            }
            if index_pos.is_none() {
                index.push(row.to_string());
            }
        }

        let mut table = LinkTable::new(index);
        for (col, (name, values)) in headers.into_iter().zip(columns).enumerate() {
            if Some(col) != index_pos {
                table.insert_column(name, values)?;
            }
        }
        Ok(table)
    }

    /// Reads a table from a CSV file. See [`Self::from_csv_reader`].
    pub fn from_csv_path<P: AsRef<Path>>(path: P, index_column: Option<&str>) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_csv_reader(BufReader::new(file), index_column)
    }

    /// Writes the table as CSV, with the link ids in a leading `index_name`
    /// column. Missing values are written as empty cells.
    pub fn write_csv<W: Write>(&self, writer: W, index_name: &str) -> Result<()> {
        let mut wtr = WriterBuilder::new().from_writer(writer);

        let mut header = vec![index_name.to_string()];
        header.extend(self.names.iter().cloned());
        wtr.write_record(&header)?;

        for (row, link_id) in self.index.iter().enumerate() {
            let mut record = vec![link_id.clone()];
            record.extend(self.columns.iter().map(|values| {
                let v = values[row];
                if v.is_nan() {
                    String::new()
                } else {
                    v.to_string()
                }
            }));
            wtr.write_record(&record)?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINKS_CSV: &str = "\
link_id,speed,grade,miles
a,30,0.0,0.5
b,65,,1.2
";

    #[test]
    fn test_read_with_index_column() {
        let table = LinkTable::from_csv_reader(LINKS_CSV.as_bytes(), Some("link_id")).unwrap();

        assert_eq!(table.index(), &["a", "b"]);
        assert_eq!(table.column_names(), &["speed", "grade", "miles"]);
        assert_eq!(table.column("speed"), Some(&[30.0, 65.0][..]));
        assert!(table.column("grade").unwrap()[1].is_nan());
    }

    #[test]
    fn test_read_missing_index_column() {
        let result = LinkTable::from_csv_reader(LINKS_CSV.as_bytes(), Some("trip"));
        assert!(matches!(result, Err(PowertrainError::MissingColumn { .. })));
    }

    #[test]
    fn test_read_rejects_non_numeric_cell() {
        let csv = "speed,miles\nfast,1.0\n";
        let result = LinkTable::from_csv_reader(csv.as_bytes(), None);
        assert!(matches!(result, Err(PowertrainError::InvalidInput(_))));
    }

    #[test]
    fn test_read_rejects_duplicate_header() {
        let csv = "speed,miles,speed\n30,0.5,40\n";
        match LinkTable::from_csv_reader(csv.as_bytes(), None) {
            Err(PowertrainError::InvalidInput(msg)) => assert!(msg.contains("speed")),
            other => panic!("expected InvalidInput, got {other:?}"),
        }
    }

    #[test]
    fn test_write_then_read() {
        let table = LinkTable::from_csv_reader(LINKS_CSV.as_bytes(), Some("link_id")).unwrap();

        let mut buffer = Vec::new();
        table.write_csv(&mut buffer, "link_id").unwrap();
        let reread = LinkTable::from_csv_reader(buffer.as_slice(), Some("link_id")).unwrap();

        assert_eq!(reread.index(), table.index());
        assert_eq!(reread.column("miles"), table.column("miles"));
        assert!(reread.column("grade").unwrap()[1].is_nan());
    }

    #[test]
    fn test_read_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.csv");
        std::fs::write(&path, LINKS_CSV).unwrap();

        let table = LinkTable::from_csv_path(&path, Some("link_id")).unwrap();
        assert_eq!(table.n_rows(), 2);
    }
}
