//! Estimator backends and the contract they share.
//!
//! An estimator comes in two states:
//!
//! - **Unfitted**: a [`Regressor`] holding only constructor parameters. Its
//!   [`Regressor::fit`] consumes feature and target matrices and returns the
//!   fitted state.
//! - **Fitted**: an [`InferenceModel`] that maps feature rows to target rows.
//!   Every fitted backend converts into [`FittedEstimator`], the closed set of
//!   backends a persisted model can hold.
//!
//! [`FittedEstimator`] adds the link-table layer on top of raw matrices: column
//! selection per [`PredictMethod`], scaling rates by distance, and the tagged
//! document `{ "estimator_type": ..., "model": <base64> }` used for
//! persistence.

use crate::config::{FeatureDtype, PredictMethod};
use crate::dataset::LinkTable;
use crate::error::{NullKind, PowertrainError, Result};
use crate::features::FeaturePack;
use crate::serialization::{decode_blob, encode_blob, to_json_value, SerializableParams};
use ndarray::{Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

pub mod explicit_bin;
pub mod ngboost;
pub mod random_forest;
pub(crate) mod tree;

pub use explicit_bin::{BinStrategy, ExplicitBin, FittedExplicitBin};
pub use ngboost::{Distribution, FittedNGBoost, NGBoost, PredictedDistribution};
pub use random_forest::{FittedRandomForest, RandomForest};

/// Untrained estimator backend.
pub trait Regressor {
    /// Fitted state produced by [`Regressor::fit`].
    type Fitted: InferenceModel + Into<FittedEstimator>;

    /// Fits on `features` (`n_rows x n_inputs`) against `target`
    /// (`n_rows x n_targets`).
    ///
    /// # Errors
    /// [`PowertrainError::InvalidInput`] if the row counts differ, either
    /// matrix is empty or holds a missing value.
    fn fit(&self, features: ArrayView2<f64>, target: ArrayView2<f64>) -> Result<Self::Fitted>;
}

/// Prediction side of a fitted backend.
pub trait InferenceModel {
    /// Number of input columns seen at fit time.
    fn n_features_in(&self) -> usize;

    /// Number of target columns produced per row.
    fn n_targets(&self) -> usize;

    /// Predicts one output row per input row.
    fn predict_batch(&self, features: ArrayView2<f64>) -> Result<Array2<f64>>;
}

/// Shared precondition of every [`Regressor::fit`].
pub(crate) fn check_fit_inputs(features: ArrayView2<f64>, target: ArrayView2<f64>) -> Result<()> {
    if features.nrows() != target.nrows() {
        return Err(PowertrainError::InvalidInput(format!(
            "features have {} rows but target has {}",
            features.nrows(),
            target.nrows()
        )));
    }
    if features.nrows() == 0 || features.ncols() == 0 || target.ncols() == 0 {
        return Err(PowertrainError::InvalidInput(
            "cannot fit on an empty matrix".to_string(),
        ));
    }
    if features.iter().chain(target.iter()).any(|v| v.is_nan()) {
        return Err(PowertrainError::InvalidInput(
            "fit inputs contain missing values".to_string(),
        ));
    }
    Ok(())
}

/// Tag and blob of a persisted estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorDocument {
    pub estimator_type: String,
    pub model: String,
}

/// Fitted state of any registered backend.
#[derive(Debug, Clone, PartialEq)]
pub enum FittedEstimator {
    ExplicitBin(FittedExplicitBin),
    NGBoost(FittedNGBoost),
    RandomForest(FittedRandomForest),
}

impl FittedEstimator {
    /// Stable tag identifying the backend in persisted documents.
    pub fn tag(&self) -> &'static str {
        match self {
            FittedEstimator::ExplicitBin(_) => "explicit_bin",
            FittedEstimator::NGBoost(_) => "ngboost",
            FittedEstimator::RandomForest(_) => "random_forest",
        }
    }

    fn inner(&self) -> &dyn InferenceModel {
        match self {
            FittedEstimator::ExplicitBin(m) => m,
            FittedEstimator::NGBoost(m) => m,
            FittedEstimator::RandomForest(m) => m,
        }
    }

    fn single_target_only(&self) -> bool {
        matches!(self, FittedEstimator::NGBoost(_))
    }

    pub fn n_features_in(&self) -> usize {
        self.inner().n_features_in()
    }

    pub fn n_targets(&self) -> usize {
        self.inner().n_targets()
    }

    /// Per-input importance, for backends that learn one.
    pub fn feature_importance(&self) -> Option<&[f64]> {
        match self {
            FittedEstimator::RandomForest(m) => Some(m.feature_importance()),
            _ => None,
        }
    }

    /// Raw backend output for an already assembled input matrix.
    pub fn predict_batch(&self, features: ArrayView2<f64>) -> Result<Array2<f64>> {
        if features.ncols() != self.n_features_in() {
            return Err(PowertrainError::InvalidInput(format!(
                "estimator was fit on {} inputs but got {}",
                self.n_features_in(),
                features.ncols()
            )));
        }
        self.inner().predict_batch(features)
    }

    /// Predicts energy per link.
    ///
    /// In [`PredictMethod::Rate`] mode the inputs are the pack's features and
    /// the output is multiplied by the distance column. In
    /// [`PredictMethod::Raw`] mode distance is appended to the inputs and the
    /// output is used as is. The result carries the index of `links` and one
    /// column per energy target.
    pub fn predict(
        &self,
        links: &LinkTable,
        feature_pack: &FeaturePack,
        predict_method: PredictMethod,
        feature_dtype: FeatureDtype,
    ) -> Result<LinkTable> {
        let targets = feature_pack.energy_name_list();
        if self.single_target_only() && targets.len() != 1 {
            return Err(PowertrainError::UnsupportedConfiguration(format!(
                "{} supports exactly one energy target, the feature pack has {}",
                self.tag(),
                targets.len()
            )));
        }
        if targets.len() != self.n_targets() {
            return Err(PowertrainError::InvalidInput(format!(
                "estimator predicts {} targets but the feature pack has {}",
                self.n_targets(),
                targets.len()
            )));
        }

        let distance_name = feature_pack.distance().name.clone();
        let inputs = input_names(feature_pack, predict_method);

        let mut required = inputs.clone();
        if !required.contains(&distance_name) {
            required.push(distance_name.clone());
        }
        let missing = links.missing_columns(&required);
        if !missing.is_empty() {
            return Err(PowertrainError::MissingColumn { columns: missing });
        }
        let nulls = links.null_columns(&required);
        if !nulls.is_empty() {
            return Err(PowertrainError::NullValue {
                kind: NullKind::Feature,
                columns: nulls,
            });
        }

        let mut x = links.select(&inputs)?;
        feature_dtype.cast(&mut x);
        let mut y = self.predict_batch(x.view())?;

        if predict_method == PredictMethod::Rate {
            let distance = links.require_column(&distance_name)?;
            for (mut row, d) in y.axis_iter_mut(Axis(0)).zip(distance) {
                row.mapv_inplace(|rate| rate * d);
            }
        }

        let mut out = LinkTable::new(links.index().to_vec());
        for (name, column) in targets.into_iter().zip(y.columns()) {
            out.insert_column(name, column.to_vec())?;
        }
        Ok(out)
    }

    /// Wraps the fitted state in a tagged document.
    pub fn to_document(&self) -> Result<EstimatorDocument> {
        let model = match self {
            FittedEstimator::ExplicitBin(m) => encode_blob(m)?,
            FittedEstimator::NGBoost(m) => encode_blob(m)?,
            FittedEstimator::RandomForest(m) => encode_blob(m)?,
        };
        Ok(EstimatorDocument {
            estimator_type: self.tag().to_string(),
            model,
        })
    }

    /// Restores the fitted state from a tagged document.
    ///
    /// # Errors
    /// [`PowertrainError::UnknownEstimatorType`] for an unregistered tag,
    /// [`PowertrainError::Deserialization`] if the blob does not decode to a
    /// consistent fitted state.
    pub fn from_document(doc: &EstimatorDocument) -> Result<Self> {
        match doc.estimator_type.as_str() {
            "explicit_bin" => {
                let fitted: FittedExplicitBin = decode_blob(&doc.model)?;
                fitted.validate()?;
                Ok(FittedEstimator::ExplicitBin(fitted))
            }
            "ngboost" => {
                let fitted: FittedNGBoost = decode_blob(&doc.model)?;
                fitted.validate()?;
                Ok(FittedEstimator::NGBoost(fitted))
            }
            "random_forest" => {
                let fitted: FittedRandomForest = decode_blob(&doc.model)?;
                fitted.validate()?;
                Ok(FittedEstimator::RandomForest(fitted))
            }
            other => Err(PowertrainError::UnknownEstimatorType(other.to_string())),
        }
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        to_json_value(&self.to_document()?)
    }

    /// Missing or mistyped document fields fail with
    /// [`PowertrainError::Deserialization`].
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let doc: EstimatorDocument = serde_json::from_value(value)?;
        Self::from_document(&doc)
    }

    /// Binary form of [`Self::to_document`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.to_document()?.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::from_document(&EstimatorDocument::from_bytes(bytes)?)
    }
}

/// Estimator input columns for a pack, in model input order.
pub fn input_names(feature_pack: &FeaturePack, predict_method: PredictMethod) -> Vec<String> {
    let mut names = feature_pack.feature_name_list();
    if predict_method == PredictMethod::Raw {
        names.push(feature_pack.distance().name.clone());
    }
    names
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::DataColumn;
    use ndarray::array;

    fn pack(targets: &[&str]) -> FeaturePack {
        FeaturePack::new(
            vec![DataColumn::new("speed", "mph")],
            DataColumn::new("miles", "miles"),
            targets.iter().map(|t| DataColumn::new(*t, "kwh")).collect(),
        )
        .unwrap()
    }

    /// Input 0 splits at 50, any further input at 1. Row 0 lands in bins
    /// `[0, 1, ..]`, row 1 in `[1, 0, ..]`.
    fn fitted_bin(n_inputs: usize, n_targets: usize) -> FittedEstimator {
        let mut edges = vec![vec![50.0]];
        edges.resize(n_inputs, vec![1.0]);
        let eb = ExplicitBin::with_edges(edges).unwrap();
        let x = Array2::from_shape_fn((2, n_inputs), |(r, c)| match (r, c) {
            (0, 0) => 10.0,
            (1, 0) => 90.0,
            (0, _) => 5.0,
            _ => 0.0,
        });
        let y = Array2::from_shape_fn((2, n_targets), |(r, c)| (r + 1) as f64 * (c + 1) as f64);
        eb.fit(x.view(), y.view()).unwrap().into()
    }

    fn links() -> LinkTable {
        LinkTable::from_columns(vec![("speed", vec![10.0, 90.0]), ("miles", vec![2.0, 0.5])])
            .unwrap()
    }

    #[test]
    fn test_check_fit_inputs() {
        let x = array![[1.0], [2.0]];
        assert!(check_fit_inputs(x.view(), array![[1.0], [2.0]].view()).is_ok());
        assert!(check_fit_inputs(x.view(), array![[1.0]].view()).is_err());
        assert!(check_fit_inputs(x.view(), array![[1.0], [f64::NAN]].view()).is_err());
        let empty = Array2::<f64>::zeros((0, 1));
        assert!(check_fit_inputs(empty.view(), empty.view()).is_err());
    }

    #[test]
    fn test_rate_prediction_scales_by_distance() {
        let est = fitted_bin(1, 1);
        let out = est
            .predict(&links(), &pack(&["kwh"]), PredictMethod::Rate, FeatureDtype::Float64)
            .unwrap();

        assert_eq!(out.index(), links().index());
        assert_eq!(out.column("kwh"), Some(&[2.0, 1.0][..]));
    }

    #[test]
    fn test_raw_prediction_appends_distance() {
        let est = fitted_bin(2, 1);
        let out = est
            .predict(&links(), &pack(&["kwh"]), PredictMethod::Raw, FeatureDtype::Float64)
            .unwrap();

        assert_eq!(out.column("kwh"), Some(&[1.0, 2.0][..]));
    }

    #[test]
    fn test_predict_width_mismatch() {
        let est = fitted_bin(1, 1);
        let result = est.predict(&links(), &pack(&["kwh"]), PredictMethod::Raw, FeatureDtype::Float64);
        assert!(matches!(result, Err(PowertrainError::InvalidInput(_))));
    }

    #[test]
    fn test_predict_reports_every_missing_column() {
        let est = fitted_bin(1, 1);
        let table = LinkTable::from_columns(vec![("grade", vec![0.0])]).unwrap();
        match est.predict(&table, &pack(&["kwh"]), PredictMethod::Rate, FeatureDtype::Float32) {
            Err(PowertrainError::MissingColumn { columns }) => {
                assert_eq!(columns, vec!["speed", "miles"]);
            }
            other => panic!("expected MissingColumn, got {other:?}"),
        }
    }

    #[test]
    fn test_predict_multi_target_columns() {
        let est = fitted_bin(1, 2);
        let out = est
            .predict(&links(), &pack(&["kwh", "gge"]), PredictMethod::Rate, FeatureDtype::Float64)
            .unwrap();
        assert_eq!(out.column_names(), &["kwh", "gge"]);
        assert_eq!(out.column("gge"), Some(&[4.0, 2.0][..]));
    }

    #[test]
    fn test_document_round_trip() {
        let est = fitted_bin(1, 1);
        let doc = est.to_document().unwrap();
        assert_eq!(doc.estimator_type, "explicit_bin");

        let restored = FittedEstimator::from_document(&doc).unwrap();
        assert_eq!(restored, est);

        let bytes = est.to_bytes().unwrap();
        assert_eq!(FittedEstimator::from_bytes(&bytes).unwrap(), est);
    }

    #[test]
    fn test_unknown_estimator_type() {
        let doc = EstimatorDocument {
            estimator_type: "lightgbm".to_string(),
            model: String::new(),
        };
        assert!(matches!(
            FittedEstimator::from_document(&doc),
            Err(PowertrainError::UnknownEstimatorType(tag)) if tag == "lightgbm"
        ));
    }

    #[test]
    fn test_random_forest_document_round_trip() {
        let x = Array2::from_shape_fn((12, 1), |(i, _)| i as f64);
        let y = Array2::from_shape_fn((12, 1), |(i, _)| if i < 6 { 0.1 } else { 0.3 });
        let est: FittedEstimator = RandomForest::new()
            .n_estimators(5)
            .fit(x.view(), y.view())
            .unwrap()
            .into();

        let doc = est.to_document().unwrap();
        assert_eq!(doc.estimator_type, "random_forest");
        let restored = FittedEstimator::from_document(&doc).unwrap();
        assert_eq!(restored.predict_batch(x.view()).unwrap(), est.predict_batch(x.view()).unwrap());
        assert_eq!(restored.feature_importance(), Some(&[1.0][..]));
        assert_eq!(fitted_bin(1, 1).feature_importance(), None);
    }

    #[test]
    fn test_non_finite_explicit_bin_blob_rejected() {
        let mut table = std::collections::BTreeMap::new();
        table.insert(vec![0u32], vec![f64::NAN]);
        // Same field layout as the fitted explicit-bin state.
        #[derive(Serialize, Deserialize)]
        struct Raw {
            edges: Vec<Vec<f64>>,
            table: std::collections::BTreeMap<Vec<u32>, Vec<f64>>,
            fallback: Vec<f64>,
        }
        let raw = Raw {
            edges: vec![vec![f64::NAN, -1.0]],
            table,
            fallback: vec![f64::NAN],
        };
        let doc = EstimatorDocument {
            estimator_type: "explicit_bin".to_string(),
            model: encode_blob(&raw).unwrap(),
        };
        assert!(matches!(
            FittedEstimator::from_document(&doc),
            Err(PowertrainError::Deserialization(_))
        ));
    }

    #[test]
    fn test_from_value_missing_blob() {
        let value = serde_json::json!({ "estimator_type": "ngboost" });
        assert!(matches!(
            FittedEstimator::from_value(value),
            Err(PowertrainError::Deserialization(_))
        ));
    }

    #[test]
    fn test_corrupt_blob() {
        let doc = EstimatorDocument {
            estimator_type: "explicit_bin".to_string(),
            model: "AAAA".to_string(),
        };
        assert!(matches!(
            FittedEstimator::from_document(&doc),
            Err(PowertrainError::Deserialization(_))
        ));
    }
}
