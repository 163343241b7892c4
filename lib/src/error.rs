//! Error types for training, prediction and persistence.

use std::fmt;
use thiserror::Error;

/// Which side of a training sample contained missing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullKind {
    /// One of the input feature columns.
    Feature,
    /// One of the energy (or energy rate) target columns.
    Target,
}

impl fmt::Display for NullKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NullKind::Feature => write!(f, "features"),
            NullKind::Target => write!(f, "target"),
        }
    }
}

/// Error type for every operation of the crate.
#[derive(Error, Debug)]
pub enum PowertrainError {
    /// Shape mismatch or otherwise unusable input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// One or more required columns are absent from a table.
    #[error("Missing columns: {}", .columns.join(", "))]
    MissingColumn { columns: Vec<String> },

    /// Missing (NaN) values in training features or targets.
    #[error("{kind} contain null values in columns: {}", .columns.join(", "))]
    NullValue { kind: NullKind, columns: Vec<String> },

    /// A predict method name that no estimator understands.
    #[error("Predict method '{0}' is not supported")]
    UnsupportedPredictMethod(String),

    /// A valid configuration that the chosen backend cannot handle.
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Construction-time validation of a feature pack or model config failed.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A model or estimator could not be encoded for persistence.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A persisted document or blob could not be decoded.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// A persisted document does not match the schema this crate expects.
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// The estimator tag of a persisted document is not registered.
    #[error("Unknown estimator type '{0}'")]
    UnknownEstimatorType(String),

    /// Energy rates cannot be derived because some distances are zero.
    #[error("{count} rows have zero distance (first at link '{link_id}')")]
    DivisionHazard { count: usize, link_id: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<serde_json::Error> for PowertrainError {
    fn from(err: serde_json::Error) -> Self {
        PowertrainError::Deserialization(err.to_string())
    }
}

impl From<bincode::Error> for PowertrainError {
    fn from(err: bincode::Error) -> Self {
        PowertrainError::Deserialization(err.to_string())
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, PowertrainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_column_lists_every_column() {
        let err = PowertrainError::MissingColumn {
            columns: vec!["speed".to_string(), "grade".to_string()],
        };
        assert_eq!(err.to_string(), "Missing columns: speed, grade");
    }

    #[test]
    fn test_null_value_distinguishes_sides() {
        let feature = PowertrainError::NullValue {
            kind: NullKind::Feature,
            columns: vec!["speed".to_string()],
        };
        let target = PowertrainError::NullValue {
            kind: NullKind::Target,
            columns: vec!["kwh_rate".to_string()],
        };
        assert!(feature.to_string().starts_with("features"));
        assert!(target.to_string().starts_with("target"));
    }

    #[test]
    fn test_division_hazard_display() {
        let err = PowertrainError::DivisionHazard {
            count: 3,
            link_id: "17".to_string(),
        };
        assert!(err.to_string().contains("3 rows"));
        assert!(err.to_string().contains("'17'"));
    }

    #[test]
    fn test_error_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: PowertrainError = io_err.into();
        assert!(matches!(err, PowertrainError::Io(_)));
    }

    #[test]
    fn test_error_from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: PowertrainError = json_err.into();
        assert!(matches!(err, PowertrainError::Deserialization(_)));
    }

    #[test]
    fn test_error_from_bincode_error() {
        let bad_bytes: &[u8] = &[0xff, 0xff, 0xff, 0xff];
        let bincode_result: std::result::Result<String, bincode::Error> =
            bincode::deserialize(bad_bytes);
        if let Err(e) = bincode_result {
            let err: PowertrainError = e.into();
            assert!(matches!(err, PowertrainError::Deserialization(_)));
        }
    }

    #[test]
    fn test_serialization_and_deserialization_are_distinct() {
        let write = PowertrainError::Serialization("key must be a string".to_string());
        let read = PowertrainError::Deserialization("key must be a string".to_string());
        assert!(write.to_string().starts_with("Serialization error"));
        assert!(read.to_string().starts_with("Deserialization error"));
    }

    #[test]
    fn test_error_is_std_error() {
        let err = PowertrainError::InvalidInput("test".to_string());
        let _: &dyn std::error::Error = &err;
    }
}
