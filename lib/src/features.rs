//! Declarative description of model inputs and targets.
//!
//! A [`FeaturePack`] names the feature columns a model reads, the distance
//! column used to turn energy into energy rates, and the energy target columns
//! together with the range of energy rates considered physically plausible.

use crate::error::{PowertrainError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Suffix appended to a target name to form its derived energy-rate column.
pub const RATE_SUFFIX: &str = "_rate";

/// Half-open interval `[lower, upper)` of accepted values.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RangeRepr", into = "RangeRepr")]
pub struct FeatureRange {
    lower: f64,
    upper: f64,
}

/// Persisted form of a range; an unbounded upper limit is stored as `null`.
#[derive(Serialize, Deserialize)]
struct RangeRepr {
    lower: f64,
    upper: Option<f64>,
}

impl FeatureRange {
    /// Creates a range, rejecting empty or non-numeric bounds.
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        if lower.is_nan() || upper.is_nan() || !lower.is_finite() {
            return Err(PowertrainError::InvalidConfig(format!(
                "range bounds must be numeric with a finite lower limit, got [{lower}, {upper})"
            )));
        }
        if lower >= upper {
            return Err(PowertrainError::InvalidConfig(format!(
                "range lower limit {lower} must be less than upper limit {upper}"
            )));
        }
        Ok(Self { lower, upper })
    }

    pub fn lower(&self) -> f64 {
        self.lower
    }

    pub fn upper(&self) -> f64 {
        self.upper
    }

    /// Whether `value` lies in `[lower, upper)`. NaN is never contained.
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value < self.upper
    }
}

impl TryFrom<RangeRepr> for FeatureRange {
    type Error = PowertrainError;

    fn try_from(repr: RangeRepr) -> Result<Self> {
        FeatureRange::new(repr.lower, repr.upper.unwrap_or(f64::INFINITY))
    }
}

impl From<FeatureRange> for RangeRepr {
    fn from(range: FeatureRange) -> Self {
        Self {
            lower: range.lower,
            upper: range.upper.is_finite().then_some(range.upper),
        }
    }
}

/// A named column with units and an optional valid range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataColumn {
    pub name: String,
    pub units: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_range: Option<FeatureRange>,
}

impl DataColumn {
    pub fn new(name: impl Into<String>, units: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            units: units.into(),
            feature_range: None,
        }
    }

    /// Attaches a valid range to the column.
    pub fn with_range(mut self, range: FeatureRange) -> Self {
        self.feature_range = Some(range);
        self
    }
}

/// Feature columns, distance column and energy targets of a model.
///
/// Invariants (checked by [`FeaturePack::new`] and on deserialization):
/// - at least one feature and one energy target;
/// - column names are unique;
/// - no column is named like a derived rate column (`<target>_rate`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FeaturePackRepr")]
pub struct FeaturePack {
    features: Vec<DataColumn>,
    distance: DataColumn,
    energy: Vec<DataColumn>,
}

#[derive(Deserialize)]
struct FeaturePackRepr {
    features: Vec<DataColumn>,
    distance: DataColumn,
    energy: Vec<DataColumn>,
}

impl TryFrom<FeaturePackRepr> for FeaturePack {
    type Error = PowertrainError;

    fn try_from(repr: FeaturePackRepr) -> Result<Self> {
        FeaturePack::new(repr.features, repr.distance, repr.energy)
    }
}

impl FeaturePack {
    /// Builds a validated feature pack.
    pub fn new(
        features: Vec<DataColumn>,
        distance: DataColumn,
        energy: Vec<DataColumn>,
    ) -> Result<Self> {
        if features.is_empty() {
            return Err(PowertrainError::InvalidConfig(
                "feature pack needs at least one feature".to_string(),
            ));
        }
        if energy.is_empty() {
            return Err(PowertrainError::InvalidConfig(
                "feature pack needs at least one energy target".to_string(),
            ));
        }

        let reserved: HashSet<String> = energy.iter().map(|e| rate_name(&e.name)).collect();
        let mut seen = HashSet::new();
        for column in features.iter().chain(Some(&distance)).chain(energy.iter()) {
            if column.name.is_empty() {
                return Err(PowertrainError::InvalidConfig(
                    "column names must not be empty".to_string(),
                ));
            }
            if reserved.contains(&column.name) {
                return Err(PowertrainError::InvalidConfig(format!(
                    "column name '{}' is reserved for a derived energy rate",
                    column.name
                )));
            }
            if !seen.insert(column.name.as_str()) {
                return Err(PowertrainError::InvalidConfig(format!(
                    "column name '{}' is used more than once",
                    column.name
                )));
            }
        }

        Ok(Self {
            features,
            distance,
            energy,
        })
    }

    pub fn features(&self) -> &[DataColumn] {
        &self.features
    }

    pub fn distance(&self) -> &DataColumn {
        &self.distance
    }

    pub fn energy(&self) -> &[DataColumn] {
        &self.energy
    }

    /// Feature column names in model input order.
    pub fn feature_name_list(&self) -> Vec<String> {
        self.features.iter().map(|f| f.name.clone()).collect()
    }

    pub fn energy_name_list(&self) -> Vec<String> {
        self.energy.iter().map(|e| e.name.clone()).collect()
    }

    /// Derived rate column names, one per energy target.
    pub fn energy_rate_name_list(&self) -> Vec<String> {
        self.energy.iter().map(|e| rate_name(&e.name)).collect()
    }
}

/// Name of the derived energy-rate column for a target.
pub fn rate_name(target: &str) -> String {
    format!("{target}{RATE_SUFFIX}")
}
