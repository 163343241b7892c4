//! Accuracy metrics of a model on held-out links.

use crate::dataset::LinkTable;
use crate::error::{PowertrainError, Result};
use crate::model::Model;
use std::collections::BTreeMap;

/// Metric name to value, per energy target.
pub type ModelErrors = BTreeMap<String, BTreeMap<String, f64>>;

/// Link-level error metrics between true and predicted energy.
pub struct Metrics;

impl Metrics {
    /// Mean absolute error.
    ///
    /// MAE = mean(|y_true - y_pred|)
    pub fn mae(y_true: &[f64], y_pred: &[f64]) -> f64 {
        mean(y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()))
    }

    /// Root mean squared error.
    ///
    /// RMSE = sqrt(mean((y_true - y_pred)^2))
    pub fn rmse(y_true: &[f64], y_pred: &[f64]) -> f64 {
        mean(y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2))).sqrt()
    }

    /// RMSE divided by the magnitude of the mean true value.
    pub fn norm_rmse(y_true: &[f64], y_pred: &[f64]) -> f64 {
        Self::rmse(y_true, y_pred) / mean(y_true.iter().copied()).abs()
    }

    /// Mean of `|y_true - y_pred| / |y_true|` over links with nonzero true
    /// energy.
    pub fn mape(y_true: &[f64], y_pred: &[f64]) -> f64 {
        mean(
            y_true
                .iter()
                .zip(y_pred)
                .filter(|(t, _)| **t != 0.0)
                .map(|(t, p)| ((t - p) / t).abs()),
        )
    }

    /// Relative percent difference `2|t - p| / (|t| + |p|)` averaged with
    /// the true energy as weight.
    pub fn weighted_rpd(y_true: &[f64], y_pred: &[f64]) -> f64 {
        let (weighted, weight) = y_true
            .iter()
            .zip(y_pred)
            .filter(|(t, p)| t.abs() + p.abs() > 0.0)
            .fold((0.0, 0.0), |(acc, w), (t, p)| {
                let rpd = 2.0 * (t - p).abs() / (t.abs() + p.abs());
                (acc + t.abs() * rpd, w + t.abs())
            });
        weighted / weight
    }

    /// Relative error of the total: `|sum(y_pred) - sum(y_true)| / |sum(y_true)|`.
    pub fn net_error(y_true: &[f64], y_pred: &[f64]) -> f64 {
        let actual: f64 = y_true.iter().sum();
        let predicted: f64 = y_pred.iter().sum();
        (predicted - actual).abs() / actual.abs()
    }

    /// Total distance per unit of total energy magnitude.
    pub fn dist_per_energy(distance: &[f64], energy: &[f64]) -> f64 {
        distance.iter().sum::<f64>() / energy.iter().sum::<f64>().abs()
    }
}

/// Mean of an iterator, `NaN` if it is empty.
fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        f64::NAN
    } else {
        sum / n as f64
    }
}

/// Predicts `test` with `model` and scores it against the true energies.
///
/// Metrics that are not finite (e.g. a percentage error when every true
/// energy is zero) are left out, so every stored value is a plain number.
///
/// # Errors
/// [`PowertrainError::InvalidInput`] if `test` has no rows; any error of
/// [`Model::predict`]; [`PowertrainError::MissingColumn`] if a true energy
/// column is absent.
pub fn compute_errors(test: &LinkTable, model: &Model) -> Result<ModelErrors> {
    if test.is_empty() {
        return Err(PowertrainError::InvalidInput(
            "cannot compute errors on an empty test table".to_string(),
        ));
    }

    let pack = model.config().feature_pack();
    let predictions = model.predict(test)?;
    let distance = test.require_column(&pack.distance().name)?;

    let mut errors = ModelErrors::new();
    for target in pack.energy_name_list() {
        let actual = test.require_column(&target)?;
        let predicted = predictions.require_column(&target)?;

        let metrics = [
            ("link_mean_absolute_error", Metrics::mae(actual, predicted)),
            ("link_root_mean_squared_error", Metrics::rmse(actual, predicted)),
            (
                "link_norm_root_mean_squared_error",
                Metrics::norm_rmse(actual, predicted),
            ),
            (
                "link_mean_absolute_percentage_error",
                Metrics::mape(actual, predicted),
            ),
            (
                "link_weighted_relative_percent_difference",
                Metrics::weighted_rpd(actual, predicted),
            ),
            ("net_error", Metrics::net_error(actual, predicted)),
            (
                "actual_dist_per_energy",
                Metrics::dist_per_energy(distance, actual),
            ),
            (
                "pred_dist_per_energy",
                Metrics::dist_per_energy(distance, predicted),
            ),
        ];

        let values = metrics
            .into_iter()
            .filter(|(_, v)| v.is_finite())
            .map(|(name, v)| (name.to_string(), v))
            .collect();
        errors.insert(target, values);
    }
    Ok(errors)
}
