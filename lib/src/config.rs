//! Model configuration.
//!
//! [`ModelConfig`] is built once, either through [`ModelConfigBuilder`] or from
//! a plain JSON mapping, and is immutable afterwards. Enumerated fields are
//! resolved from their string names at construction time.

use crate::error::{PowertrainError, Result};
use crate::features::{FeaturePack, FeatureRange};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Powertrain architecture of the modeled vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PowertrainType {
    /// Internal combustion engine (conventional).
    Ice,
    /// Hybrid electric.
    Hev,
    /// Plug-in hybrid electric.
    Phev,
    /// Battery electric.
    Bev,
}

impl PowertrainType {
    pub fn name(&self) -> &'static str {
        match self {
            PowertrainType::Ice => "ICE",
            PowertrainType::Hev => "HEV",
            PowertrainType::Phev => "PHEV",
            PowertrainType::Bev => "BEV",
        }
    }
}

impl fmt::Display for PowertrainType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PowertrainType {
    type Err = PowertrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ice" | "conventional" => Ok(PowertrainType::Ice),
            "hev" | "hybrid" => Ok(PowertrainType::Hev),
            "phev" | "plug_in_hybrid" => Ok(PowertrainType::Phev),
            "bev" | "electric" => Ok(PowertrainType::Bev),
            other => Err(PowertrainError::InvalidConfig(format!(
                "unknown powertrain type '{other}'"
            ))),
        }
    }
}

/// How an estimator's output relates to absolute energy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PredictMethod {
    /// The estimator predicts energy per distance; predictions are
    /// multiplied by the distance column.
    #[default]
    Rate,
    /// Distance is one of the estimator inputs and it predicts absolute
    /// energy directly.
    Raw,
}

impl PredictMethod {
    pub fn name(&self) -> &'static str {
        match self {
            PredictMethod::Rate => "rate",
            PredictMethod::Raw => "raw",
        }
    }
}

impl fmt::Display for PredictMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PredictMethod {
    type Err = PowertrainError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rate" => Ok(PredictMethod::Rate),
            "raw" => Ok(PredictMethod::Raw),
            _ => Err(PowertrainError::UnsupportedPredictMethod(s.to_string())),
        }
    }
}

/// Numeric precision feature values are rounded through before fit and predict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureDtype {
    #[default]
    Float32,
    Float64,
}

impl FeatureDtype {
    /// Rounds every value of `matrix` to this precision.
    pub fn cast(&self, matrix: &mut Array2<f64>) {
        if let FeatureDtype::Float32 = self {
            matrix.mapv_inplace(|v| v as f32 as f64);
        }
    }
}

/// Immutable description of how a vehicle model is trained and applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelConfig {
    vehicle_description: String,
    powertrain_type: PowertrainType,
    feature_pack: FeaturePack,
    energy_rate_range: FeatureRange,
    feature_dtype: FeatureDtype,
    input_name: String,
    test_size: f64,
    random_seed: u64,
    trip_column: String,
    predict_method: PredictMethod,
}

impl ModelConfig {
    /// Starts a builder with every optional field at its default.
    pub fn builder(
        vehicle_description: impl Into<String>,
        powertrain_type: PowertrainType,
        feature_pack: FeaturePack,
    ) -> ModelConfigBuilder {
        ModelConfigBuilder::new(vehicle_description, powertrain_type, feature_pack)
    }

    pub fn vehicle_description(&self) -> &str {
        &self.vehicle_description
    }

    pub fn powertrain_type(&self) -> PowertrainType {
        self.powertrain_type
    }

    pub fn feature_pack(&self) -> &FeaturePack {
        &self.feature_pack
    }

    pub fn energy_rate_low_limit(&self) -> f64 {
        self.energy_rate_range.lower()
    }

    pub fn energy_rate_high_limit(&self) -> f64 {
        self.energy_rate_range.upper()
    }

    pub fn feature_dtype(&self) -> FeatureDtype {
        self.feature_dtype
    }

    pub fn input_name(&self) -> &str {
        &self.input_name
    }

    pub fn test_size(&self) -> f64 {
        self.test_size
    }

    pub fn random_seed(&self) -> u64 {
        self.random_seed
    }

    pub fn trip_column(&self) -> &str {
        &self.trip_column
    }

    pub fn predict_method(&self) -> PredictMethod {
        self.predict_method
    }

    /// Accepted energy-rate range for the target at `index`: the target's own
    /// range if it has one, otherwise the config-wide limits.
    pub fn target_range(&self, index: usize) -> FeatureRange {
        self.feature_pack
            .energy()
            .get(index)
            .and_then(|target| target.feature_range)
            .unwrap_or(self.energy_rate_range)
    }

    /// Rebuilds a config from a plain mapping.
    ///
    /// Structural problems (missing or unknown fields, wrong types) fail with
    /// [`PowertrainError::SchemaMismatch`]; field values are validated as in
    /// [`ModelConfigBuilder::build`].
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let repr: ModelConfigRepr = serde_json::from_value(value)
            .map_err(|e| PowertrainError::SchemaMismatch(format!("model config: {e}")))?;
        repr.try_into()
    }

    /// Converts the config to a plain mapping. Enumerated fields are stored as
    /// their names and an unbounded high limit as `null`.
    pub fn to_value(&self) -> serde_json::Value {
        let repr = ModelConfigRepr::from(self);
        // Every field of the repr is a plain JSON type.
        serde_json::to_value(repr).unwrap_or(serde_json::Value::Null)
    }

    /// Reads a config from a JSON file.
    pub fn from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        Self::from_value(value)
    }
}

/// Fluent builder for [`ModelConfig`].
///
/// Defaults:
/// - `energy_rate_low_limit`: 0.0
/// - `energy_rate_high_limit`: +inf
/// - `feature_dtype`: float32
/// - `input_name`: "input"
/// - `test_size`: 0.2
/// - `random_seed`: 42
/// - `trip_column`: "trip_id"
/// - `predict_method`: rate
pub struct ModelConfigBuilder {
    vehicle_description: String,
    powertrain_type: PowertrainType,
    feature_pack: FeaturePack,
    energy_rate_low_limit: f64,
    energy_rate_high_limit: f64,
    feature_dtype: FeatureDtype,
    input_name: String,
    test_size: f64,
    random_seed: u64,
    trip_column: String,
    predict_method: PredictMethod,
}

impl ModelConfigBuilder {
    pub fn new(
        vehicle_description: impl Into<String>,
        powertrain_type: PowertrainType,
        feature_pack: FeaturePack,
    ) -> Self {
        Self {
            vehicle_description: vehicle_description.into(),
            powertrain_type,
            feature_pack,
            energy_rate_low_limit: 0.0,
            energy_rate_high_limit: f64::INFINITY,
            feature_dtype: FeatureDtype::Float32,
            input_name: "input".to_string(),
            test_size: 0.2,
            random_seed: 42,
            trip_column: "trip_id".to_string(),
            predict_method: PredictMethod::Rate,
        }
    }

    pub fn energy_rate_limits(mut self, low: f64, high: f64) -> Self {
        self.energy_rate_low_limit = low;
        self.energy_rate_high_limit = high;
        self
    }

    pub fn feature_dtype(mut self, dtype: FeatureDtype) -> Self {
        self.feature_dtype = dtype;
        self
    }

    pub fn input_name(mut self, name: impl Into<String>) -> Self {
        self.input_name = name.into();
        self
    }

    pub fn test_size(mut self, test_size: f64) -> Self {
        self.test_size = test_size;
        self
    }

    pub fn random_seed(mut self, seed: u64) -> Self {
        self.random_seed = seed;
        self
    }

    pub fn trip_column(mut self, column: impl Into<String>) -> Self {
        self.trip_column = column.into();
        self
    }

    pub fn predict_method(mut self, method: PredictMethod) -> Self {
        self.predict_method = method;
        self
    }

    /// Validates the fields and produces the config.
    ///
    /// # Errors
    /// [`PowertrainError::InvalidConfig`] if the energy-rate low limit is not
    /// below the high limit, `test_size` is outside `(0, 1)`, or `input_name`
    /// is empty.
    pub fn build(self) -> Result<ModelConfig> {
        if !(self.energy_rate_low_limit < self.energy_rate_high_limit) {
            return Err(PowertrainError::InvalidConfig(format!(
                "energy_rate_low_limit ({}) must be less than energy_rate_high_limit ({})",
                self.energy_rate_low_limit, self.energy_rate_high_limit
            )));
        }
        let energy_rate_range =
            FeatureRange::new(self.energy_rate_low_limit, self.energy_rate_high_limit)?;

        if !(self.test_size > 0.0 && self.test_size < 1.0) {
            return Err(PowertrainError::InvalidConfig(format!(
                "test_size must be in (0, 1), got {}",
                self.test_size
            )));
        }
        if self.input_name.is_empty() {
            return Err(PowertrainError::InvalidConfig(
                "input_name must not be empty".to_string(),
            ));
        }

        Ok(ModelConfig {
            vehicle_description: self.vehicle_description,
            powertrain_type: self.powertrain_type,
            feature_pack: self.feature_pack,
            energy_rate_range,
            feature_dtype: self.feature_dtype,
            input_name: self.input_name,
            test_size: self.test_size,
            random_seed: self.random_seed,
            trip_column: self.trip_column,
            predict_method: self.predict_method,
        })
    }
}

/// Persisted shape of a [`ModelConfig`].
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ModelConfigRepr {
    vehicle_description: String,
    powertrain_type: String,
    feature_pack: FeaturePack,
    #[serde(default)]
    energy_rate_low_limit: Option<f64>,
    #[serde(default)]
    energy_rate_high_limit: Option<f64>,
    #[serde(default)]
    feature_dtype: FeatureDtype,
    #[serde(default = "default_input_name")]
    input_name: String,
    #[serde(default = "default_test_size")]
    test_size: f64,
    #[serde(default = "default_random_seed")]
    random_seed: u64,
    #[serde(default = "default_trip_column")]
    trip_column: String,
    #[serde(default = "default_predict_method")]
    predict_method: String,
}

fn default_input_name() -> String {
    "input".to_string()
}

fn default_test_size() -> f64 {
    0.2
}

fn default_random_seed() -> u64 {
    42
}

fn default_trip_column() -> String {
    "trip_id".to_string()
}

fn default_predict_method() -> String {
    PredictMethod::Rate.name().to_string()
}

impl From<&ModelConfig> for ModelConfigRepr {
    fn from(config: &ModelConfig) -> Self {
        let high = config.energy_rate_high_limit();
        Self {
            vehicle_description: config.vehicle_description.clone(),
            powertrain_type: config.powertrain_type.name().to_string(),
            feature_pack: config.feature_pack.clone(),
            energy_rate_low_limit: Some(config.energy_rate_low_limit()),
            energy_rate_high_limit: high.is_finite().then_some(high),
            feature_dtype: config.feature_dtype,
            input_name: config.input_name.clone(),
            test_size: config.test_size,
            random_seed: config.random_seed,
            trip_column: config.trip_column.clone(),
            predict_method: config.predict_method.name().to_string(),
        }
    }
}

impl TryFrom<ModelConfigRepr> for ModelConfig {
    type Error = PowertrainError;

    fn try_from(repr: ModelConfigRepr) -> Result<Self> {
        let powertrain_type: PowertrainType = repr.powertrain_type.parse()?;
        let predict_method: PredictMethod = repr.predict_method.parse()?;

        ModelConfigBuilder::new(repr.vehicle_description, powertrain_type, repr.feature_pack)
            .energy_rate_limits(
                repr.energy_rate_low_limit.unwrap_or(0.0),
                repr.energy_rate_high_limit.unwrap_or(f64::INFINITY),
            )
            .feature_dtype(repr.feature_dtype)
            .input_name(repr.input_name)
            .test_size(repr.test_size)
            .random_seed(repr.random_seed)
            .trip_column(repr.trip_column)
            .predict_method(predict_method)
            .build()
    }
}
