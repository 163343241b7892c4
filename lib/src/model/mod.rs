//! Trained vehicle models and their persisted form.
//!
//! A [`Model`] owns the configuration it was trained with, exactly one fitted
//! estimator and, once validated, the held-out error metrics. It is an
//! immutable value: [`Model::set_errors`] returns a new model.
//!
//! The persisted document is a single JSON object:
//!
//! ```json
//! {
//!   "schema_version": 1,
//!   "metadata": { "config": { ... }, "estimator_type": "ngboost", "version": "...", "trained_at": "..." },
//!   "estimator": { "estimator_type": "ngboost", "model": "<base64>" },
//!   "errors": { "kwh": { "link_mean_absolute_error": 0.01, ... } }
//! }
//! ```

use crate::config::ModelConfig;
use crate::dataset::LinkTable;
use crate::error::{PowertrainError, Result};
use crate::estimator::{input_names, FittedEstimator};
use crate::serialization::{to_json_string_pretty, to_json_value};
use crate::validation::ModelErrors;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Version of the persisted model document.
pub const SCHEMA_VERSION: u64 = 1;

/// Provenance of a trained model.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub config: ModelConfig,
    /// Tag of the fitted estimator, set by [`Model::build`].
    pub estimator_type: String,
    /// Version of this crate that trained the model.
    pub version: String,
    pub trained_at: DateTime<Utc>,
}

impl Metadata {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            estimator_type: String::new(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            trained_at: Utc::now(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct MetadataRepr {
    config: Value,
    estimator_type: String,
    version: String,
    trained_at: DateTime<Utc>,
}

/// A trained model.
#[derive(Debug, Clone, PartialEq)]
pub struct Model {
    metadata: Metadata,
    estimator: FittedEstimator,
    errors: Option<ModelErrors>,
}

impl Model {
    /// Pairs a fitted estimator with the metadata it was trained under.
    ///
    /// # Errors
    /// [`PowertrainError::InvalidInput`] if the estimator's input or output
    /// width does not match the config's feature pack and predict method.
    pub fn build(estimator: FittedEstimator, mut metadata: Metadata) -> Result<Self> {
        check_compatible(&estimator, &metadata.config).map_err(PowertrainError::InvalidInput)?;
        metadata.estimator_type = estimator.tag().to_string();
        Ok(Self {
            metadata,
            estimator,
            errors: None,
        })
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn config(&self) -> &ModelConfig {
        &self.metadata.config
    }

    pub fn estimator(&self) -> &FittedEstimator {
        &self.estimator
    }

    /// Per-input importance, in model input order, for backends that learn
    /// one.
    pub fn feature_importance(&self) -> Option<&[f64]> {
        self.estimator.feature_importance()
    }

    /// Held-out error metrics, if the model has been validated.
    pub fn errors(&self) -> Option<&ModelErrors> {
        self.errors.as_ref()
    }

    pub fn is_validated(&self) -> bool {
        self.errors.is_some()
    }

    /// Returns this model with `errors` attached, replacing any earlier ones.
    pub fn set_errors(self, errors: ModelErrors) -> Self {
        Self {
            errors: Some(errors),
            ..self
        }
    }

    /// Predicts energy for every link of `links`.
    ///
    /// The result keeps the link index of `links` and has one column per
    /// energy target.
    ///
    /// # Errors
    /// [`PowertrainError::MissingColumn`] listing every absent feature and
    /// distance column; [`PowertrainError::NullValue`] for missing values in
    /// them.
    pub fn predict(&self, links: &LinkTable) -> Result<LinkTable> {
        let config = self.config();
        self.estimator.predict(
            links,
            config.feature_pack(),
            config.predict_method(),
            config.feature_dtype(),
        )
    }

    pub fn to_value(&self) -> Result<Value> {
        let metadata = MetadataRepr {
            config: self.metadata.config.to_value(),
            estimator_type: self.metadata.estimator_type.clone(),
            version: self.metadata.version.clone(),
            trained_at: self.metadata.trained_at,
        };
        Ok(serde_json::json!({
            "schema_version": SCHEMA_VERSION,
            "metadata": to_json_value(&metadata)?,
            "estimator": self.estimator.to_value()?,
            "errors": to_json_value(&self.errors)?,
        }))
    }

    /// Rebuilds a model from its document.
    ///
    /// The schema version and the config are checked before the estimator is
    /// decoded.
    ///
    /// # Errors
    /// - [`PowertrainError::SchemaMismatch`] for a missing or unknown schema
    ///   version, malformed metadata, an invalid config, an estimator whose
    ///   width does not fit the config, or an estimator whose tag differs from
    ///   the one recorded in the metadata;
    /// - [`PowertrainError::UnknownEstimatorType`] or
    ///   [`PowertrainError::Deserialization`] for a bad estimator entry.
    pub fn from_value(value: Value) -> Result<Self> {
        let version = value.get("schema_version").and_then(Value::as_u64);
        if version != Some(SCHEMA_VERSION) {
            return Err(PowertrainError::SchemaMismatch(format!(
                "expected schema_version {SCHEMA_VERSION}, found {}",
                value.get("schema_version").unwrap_or(&Value::Null)
            )));
        }

        let metadata_value = value.get("metadata").cloned().ok_or_else(|| {
            PowertrainError::SchemaMismatch("document has no metadata".to_string())
        })?;
        let repr: MetadataRepr = serde_json::from_value(metadata_value)
            .map_err(|e| PowertrainError::SchemaMismatch(format!("model metadata: {e}")))?;
        let config = ModelConfig::from_value(repr.config).map_err(|e| match e {
            PowertrainError::InvalidConfig(msg) => PowertrainError::SchemaMismatch(msg),
            other => other,
        })?;

        let estimator_value = value.get("estimator").cloned().ok_or_else(|| {
            PowertrainError::Deserialization("document has no estimator".to_string())
        })?;
        let estimator = FittedEstimator::from_value(estimator_value)?;
        if estimator.tag() != repr.estimator_type {
            return Err(PowertrainError::SchemaMismatch(format!(
                "metadata names estimator '{}' but the document holds '{}'",
                repr.estimator_type,
                estimator.tag()
            )));
        }
        check_compatible(&estimator, &config).map_err(PowertrainError::SchemaMismatch)?;

        let errors: Option<ModelErrors> = match value.get("errors") {
            Some(errors) => serde_json::from_value(errors.clone())?,
            None => None,
        };

        Ok(Self {
            metadata: Metadata {
                config,
                estimator_type: repr.estimator_type,
                version: repr.version,
                trained_at: repr.trained_at,
            },
            estimator,
            errors,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        to_json_string_pretty(&self.to_value()?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_value(serde_json::from_str(json)?)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}

/// Checks that `estimator` consumes the inputs and produces the targets
/// `config` describes.
fn check_compatible(
    estimator: &FittedEstimator,
    config: &ModelConfig,
) -> std::result::Result<(), String> {
    let pack = config.feature_pack();
    let inputs = input_names(pack, config.predict_method());
    if estimator.n_features_in() != inputs.len() {
        return Err(format!(
            "{} estimator takes {} inputs but the config lists {} ({})",
            estimator.tag(),
            estimator.n_features_in(),
            inputs.len(),
            inputs.join(", ")
        ));
    }
    if estimator.n_targets() != pack.energy().len() {
        return Err(format!(
            "{} estimator predicts {} targets but the config lists {}",
            estimator.tag(),
            estimator.n_targets(),
            pack.energy().len()
        ));
    }
    Ok(())
}
