//! Explicit binning estimator.
//!
//! Every input column is discretized into bins; the fitted state is a lookup
//! table from the combination of bin indices to the mean target of the
//! training rows that fell into it. Combinations never seen during training
//! predict the global mean. Supports any number of targets.

use super::{check_fit_inputs, FittedEstimator, InferenceModel, Regressor};
use crate::error::{PowertrainError, Result};
use ndarray::{Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// How bin edges are chosen.
#[derive(Debug, Clone, PartialEq)]
pub enum BinStrategy {
    /// Equal-frequency bins learned from the training data, this many per
    /// input column.
    Quantile(usize),
    /// Interior cut points per input column, in input order. `k` cut points
    /// make `k + 1` bins; values beyond the outer cut points fall into the
    /// outer bins.
    Explicit(Vec<Vec<f64>>),
}

/// Unfitted explicit binning estimator.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplicitBin {
    strategy: BinStrategy,
}

impl Default for ExplicitBin {
    fn default() -> Self {
        Self {
            strategy: BinStrategy::Quantile(10),
        }
    }
}

impl ExplicitBin {
    /// Ten equal-frequency bins per input column.
    pub fn new() -> Self {
        Self::default()
    }

    /// `n_bins` equal-frequency bins per input column.
    pub fn quantile(n_bins: usize) -> Result<Self> {
        if n_bins == 0 {
            return Err(PowertrainError::InvalidConfig(
                "explicit bin needs at least one bin per column".to_string(),
            ));
        }
        Ok(Self {
            strategy: BinStrategy::Quantile(n_bins),
        })
    }

    /// Fixed cut points per input column. Each list must be strictly
    /// increasing and finite.
    pub fn with_edges(edges: Vec<Vec<f64>>) -> Result<Self> {
        if let Some(col) = first_bad_column(&edges) {
            return Err(PowertrainError::InvalidConfig(format!(
                "bin edges for input column {col} must be finite and strictly increasing"
            )));
        }
        Ok(Self {
            strategy: BinStrategy::Explicit(edges),
        })
    }

    pub fn strategy(&self) -> &BinStrategy {
        &self.strategy
    }
}

/// First input column whose cut points are not finite and strictly
/// increasing.
fn first_bad_column(edges: &[Vec<f64>]) -> Option<usize> {
    edges.iter().position(|cuts| {
        cuts.iter().any(|c| !c.is_finite()) || cuts.windows(2).any(|w| w[0] >= w[1])
    })
}

/// Cut points splitting `values` into `n_bins` groups of roughly equal size.
fn quantile_edges(values: ArrayView1<f64>, n_bins: usize) -> Vec<f64> {
    let mut sorted: Vec<f64> = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = sorted.len();

    let mut cuts: Vec<f64> = (1..n_bins)
        .map(|k| sorted[(k * n / n_bins).min(n - 1)])
        .collect();
    cuts.dedup();
    // A cut at the minimum would leave the first bin empty.
    cuts.retain(|&c| c > sorted[0]);
    cuts
}

/// Index of the bin `value` falls in.
fn bin_index(cuts: &[f64], value: f64) -> u32 {
    cuts.partition_point(|&c| c <= value) as u32
}

impl Regressor for ExplicitBin {
    type Fitted = FittedExplicitBin;

    fn fit(&self, features: ArrayView2<f64>, target: ArrayView2<f64>) -> Result<Self::Fitted> {
        check_fit_inputs(features, target)?;
        let n_features = features.ncols();
        let n_targets = target.ncols();

        let edges = match &self.strategy {
            BinStrategy::Quantile(n_bins) => features
                .columns()
                .into_iter()
                .map(|col| quantile_edges(col, *n_bins))
                .collect(),
            BinStrategy::Explicit(edges) => {
                if edges.len() != n_features {
                    return Err(PowertrainError::InvalidInput(format!(
                        "explicit bin has edges for {} columns but the features have {}",
                        edges.len(),
                        n_features
                    )));
                }
                edges.clone()
            }
        };

        let mut sums: BTreeMap<Vec<u32>, (Vec<f64>, usize)> = BTreeMap::new();
        for (row, y) in features.rows().into_iter().zip(target.rows()) {
            let key = bin_key(&edges, row);
            let entry = sums
                .entry(key)
                .or_insert_with(|| (vec![0.0; n_targets], 0));
            for (acc, v) in entry.0.iter_mut().zip(y.iter()) {
                *acc += v;
            }
            entry.1 += 1;
        }

        let table = sums
            .into_iter()
            .map(|(key, (sum, count))| {
                let means = sum.into_iter().map(|s| s / count as f64).collect();
                (key, means)
            })
            .collect();

        let fallback = target
            .columns()
            .into_iter()
            .map(|col| col.sum() / col.len() as f64)
            .collect();

        Ok(FittedExplicitBin {
            edges,
            table,
            fallback,
        })
    }
}

fn bin_key(edges: &[Vec<f64>], row: ArrayView1<f64>) -> Vec<u32> {
    edges
        .iter()
        .zip(row.iter())
        .map(|(cuts, &v)| bin_index(cuts, v))
        .collect()
}

/// Fitted lookup table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedExplicitBin {
    edges: Vec<Vec<f64>>,
    table: BTreeMap<Vec<u32>, Vec<f64>>,
    fallback: Vec<f64>,
}

impl FittedExplicitBin {
    /// Cut points learned (or given) per input column.
    pub fn edges(&self) -> &[Vec<f64>] {
        &self.edges
    }

    /// Number of occupied bin combinations.
    pub fn n_cells(&self) -> usize {
        self.table.len()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(col) = first_bad_column(&self.edges) {
            return Err(PowertrainError::Deserialization(format!(
                "explicit bin edges for input column {col} are not finite and strictly increasing"
            )));
        }
        let n_features = self.edges.len();
        let n_targets = self.fallback.len();
        let consistent = n_features > 0
            && n_targets > 0
            && self
                .table
                .iter()
                .all(|(key, means)| key.len() == n_features && means.len() == n_targets);
        if !consistent {
            return Err(PowertrainError::Deserialization(
                "explicit bin table is inconsistent with its bin edges".to_string(),
            ));
        }
        let finite = self
            .table
            .values()
            .flatten()
            .chain(&self.fallback)
            .all(|v| v.is_finite());
        if !finite {
            return Err(PowertrainError::Deserialization(
                "explicit bin table holds non-finite means".to_string(),
            ));
        }
        Ok(())
    }
}

impl InferenceModel for FittedExplicitBin {
    fn n_features_in(&self) -> usize {
        self.edges.len()
    }

    fn n_targets(&self) -> usize {
        self.fallback.len()
    }

    fn predict_batch(&self, features: ArrayView2<f64>) -> Result<Array2<f64>> {
        let n_targets = self.n_targets();
        let mut out = Array2::zeros((features.nrows(), n_targets));
        for (mut out_row, row) in out.rows_mut().into_iter().zip(features.rows()) {
            let key = bin_key(&self.edges, row);
            let means = self.table.get(&key).unwrap_or(&self.fallback);
            for (o, m) in out_row.iter_mut().zip(means) {
                *o = *m;
            }
        }
        Ok(out)
    }
}

impl From<FittedExplicitBin> for FittedEstimator {
    fn from(fitted: FittedExplicitBin) -> Self {
        FittedEstimator::ExplicitBin(fitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_quantile_zero_bins_rejected() {
        assert!(ExplicitBin::quantile(0).is_err());
    }

    #[test]
    fn test_with_edges_requires_increasing() {
        assert!(ExplicitBin::with_edges(vec![vec![1.0, 1.0]]).is_err());
        assert!(ExplicitBin::with_edges(vec![vec![2.0, 1.0]]).is_err());
        assert!(ExplicitBin::with_edges(vec![vec![f64::INFINITY]]).is_err());
        assert!(ExplicitBin::with_edges(vec![vec![1.0, 2.0], vec![]]).is_ok());
    }

    #[test]
    fn test_bin_index_clamps_to_outer_bins() {
        let cuts = [10.0, 20.0];
        assert_eq!(bin_index(&cuts, -5.0), 0);
        assert_eq!(bin_index(&cuts, 10.0), 1);
        assert_eq!(bin_index(&cuts, 19.9), 1);
        assert_eq!(bin_index(&cuts, 500.0), 2);
    }

    #[test]
    fn test_quantile_edges_split_evenly() {
        let values = array![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0];
        let cuts = quantile_edges(values.view(), 4);
        assert_eq!(cuts, vec![3.0, 5.0, 7.0]);
    }

    #[test]
    fn test_quantile_edges_constant_column() {
        let values = array![2.0, 2.0, 2.0];
        assert!(quantile_edges(values.view(), 5).is_empty());
    }

    #[test]
    fn test_fit_predict_lookup() {
        let eb = ExplicitBin::with_edges(vec![vec![50.0]]).unwrap();
        let x = array![[10.0], [20.0], [60.0], [70.0]];
        let y = array![[1.0], [3.0], [10.0], [20.0]];

        let fitted = eb.fit(x.view(), y.view()).unwrap();
        let preds = fitted.predict_batch(array![[0.0], [99.0]].view()).unwrap();

        assert_eq!(preds[[0, 0]], 2.0);
        assert_eq!(preds[[1, 0]], 15.0);
        assert_eq!(fitted.n_cells(), 2);
    }

    #[test]
    fn test_unseen_combination_uses_global_mean() {
        let eb = ExplicitBin::with_edges(vec![vec![0.5], vec![0.5]]).unwrap();
        let x = array![[0.0, 0.0], [1.0, 1.0]];
        let y = array![[2.0], [4.0]];

        let fitted = eb.fit(x.view(), y.view()).unwrap();
        let preds = fitted.predict_batch(array![[0.0, 1.0]].view()).unwrap();

        assert_eq!(preds[[0, 0]], 3.0);
    }

    #[test]
    fn test_multi_target() {
        let eb = ExplicitBin::quantile(2).unwrap();
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![[1.0, 10.0], [1.0, 10.0], [2.0, 20.0], [2.0, 20.0]];

        let fitted = eb.fit(x.view(), y.view()).unwrap();
        assert_eq!(fitted.n_targets(), 2);

        let preds = fitted.predict_batch(array![[4.0]].view()).unwrap();
        assert_eq!(preds.row(0).to_vec(), vec![2.0, 20.0]);
    }

    #[test]
    fn test_explicit_edges_must_match_width() {
        let eb = ExplicitBin::with_edges(vec![vec![1.0]]).unwrap();
        let x = array![[1.0, 2.0]];
        let y = array![[1.0]];
        assert!(matches!(
            eb.fit(x.view(), y.view()),
            Err(PowertrainError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_validate_detects_inconsistent_table() {
        let mut table = BTreeMap::new();
        table.insert(vec![0, 1], vec![1.0]);
        let fitted = FittedExplicitBin {
            edges: vec![vec![]],
            table,
            fallback: vec![1.0],
        };
        assert!(fitted.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_edges_and_means() {
        let eb = ExplicitBin::with_edges(vec![vec![50.0]]).unwrap();
        let fitted = eb
            .fit(array![[10.0], [90.0]].view(), array![[1.0], [2.0]].view())
            .unwrap();
        assert!(fitted.validate().is_ok());

        let mut unsorted = fitted.clone();
        unsorted.edges = vec![vec![f64::NAN, -1.0]];
        assert!(matches!(
            unsorted.validate(),
            Err(PowertrainError::Deserialization(_))
        ));

        let mut descending = fitted.clone();
        descending.edges = vec![vec![60.0, 40.0]];
        assert!(descending.validate().is_err());

        let mut nan_mean = fitted.clone();
        nan_mean.table.insert(vec![0], vec![f64::NAN]);
        assert!(nan_mean.validate().is_err());

        let mut inf_fallback = fitted;
        inf_fallback.fallback = vec![f64::INFINITY];
        assert!(inf_fallback.validate().is_err());
    }
}
