//! Natural gradient boosting of a parametric distribution.
//!
//! The per-row distribution parameters start at the marginal maximum
//! likelihood estimate of the training target. Each stage fits one
//! regression tree per parameter to the natural gradient of the negative
//! log-likelihood, picks a step scale by halving line search and moves the
//! parameters by `learning_rate * scale` times the tree output.
//!
//! Parameters are kept on an unconstrained scale: `[loc, ln(scale)]` for
//! [`Distribution::Normal`], `[ln(scale)]` for [`Distribution::Exponential`].

use super::tree::{RegressionTree, TreeParams};
use super::{check_fit_inputs, FittedEstimator, InferenceModel, Regressor};
use crate::error::{PowertrainError, Result};
use log::{debug, info};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Bound on log-scale parameters, keeps `exp` finite.
const LOG_SCALE_BOUND: f64 = 20.0;
const MAX_LINE_SEARCH_HALVINGS: usize = 50;

/// Predictive distribution family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Distribution {
    #[default]
    Normal,
    /// Requires strictly positive targets.
    Exponential,
}

impl Distribution {
    fn n_params(&self) -> usize {
        match self {
            Distribution::Normal => 2,
            Distribution::Exponential => 1,
        }
    }

    /// Marginal maximum likelihood parameters of `y`.
    fn fit_marginal(&self, y: &[f64]) -> Vec<f64> {
        let n = y.len() as f64;
        let mean = y.iter().sum::<f64>() / n;
        match self {
            Distribution::Normal => {
                let var = y.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                vec![mean, clamp_log(var.sqrt().max(1e-6).ln())]
            }
            Distribution::Exponential => vec![clamp_log(mean.ln())],
        }
    }

    fn nll(&self, params: &[f64], y: f64) -> f64 {
        match self {
            Distribution::Normal => {
                let (loc, log_scale) = (params[0], params[1]);
                let z = (y - loc) * (-log_scale).exp();
                log_scale + 0.5 * (2.0 * PI).ln() + 0.5 * z * z
            }
            Distribution::Exponential => params[0] + y * (-params[0]).exp(),
        }
    }

    /// Gradient of the negative log-likelihood premultiplied by the inverse
    /// Fisher information.
    fn natural_gradient(&self, params: &[f64], y: f64) -> Vec<f64> {
        match self {
            Distribution::Normal => {
                let (loc, log_scale) = (params[0], params[1]);
                let r = y - loc;
                let var = (2.0 * log_scale).exp();
                vec![-r, 0.5 * (1.0 - r * r / var)]
            }
            Distribution::Exponential => vec![1.0 - y * (-params[0]).exp()],
        }
    }

    fn mean(&self, params: &[f64]) -> f64 {
        match self {
            Distribution::Normal => params[0],
            Distribution::Exponential => params[0].exp(),
        }
    }

    fn clamp(&self, params: &mut [f64]) {
        match self {
            Distribution::Normal => params[1] = clamp_log(params[1]),
            Distribution::Exponential => params[0] = clamp_log(params[0]),
        }
    }

    fn to_predicted(&self, params: &[f64]) -> PredictedDistribution {
        match self {
            Distribution::Normal => PredictedDistribution::Normal {
                loc: params[0],
                scale: params[1].exp(),
            },
            Distribution::Exponential => PredictedDistribution::Exponential {
                scale: params[0].exp(),
            },
        }
    }
}

fn clamp_log(v: f64) -> f64 {
    v.clamp(-LOG_SCALE_BOUND, LOG_SCALE_BOUND)
}

/// Predicted distribution of one row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PredictedDistribution {
    Normal { loc: f64, scale: f64 },
    Exponential { scale: f64 },
}

impl PredictedDistribution {
    pub fn mean(&self) -> f64 {
        match self {
            PredictedDistribution::Normal { loc, .. } => *loc,
            PredictedDistribution::Exponential { scale } => *scale,
        }
    }
}

/// Unfitted NGBoost regressor.
///
/// Defaults:
/// - `n_estimators`: 100
/// - `learning_rate`: 0.01
/// - `max_depth`: 3
/// - `minibatch_frac`: 1.0
/// - `random_state`: 52
/// - `dist`: normal
/// - `verbose`: true, logging every `verbose_eval` = 20 stages at debug level
#[derive(Debug, Clone, PartialEq)]
pub struct NGBoost {
    n_estimators: usize,
    learning_rate: f64,
    max_depth: usize,
    minibatch_frac: f64,
    random_state: u64,
    dist: Distribution,
    verbose: bool,
    verbose_eval: usize,
}

impl Default for NGBoost {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.01,
            max_depth: 3,
            minibatch_frac: 1.0,
            random_state: 52,
            dist: Distribution::Normal,
            verbose: true,
            verbose_eval: 20,
        }
    }
}

impl NGBoost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    pub fn learning_rate(mut self, learning_rate: f64) -> Self {
        self.learning_rate = learning_rate;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Fraction of rows sampled (without replacement) for each stage.
    pub fn minibatch_frac(mut self, minibatch_frac: f64) -> Self {
        self.minibatch_frac = minibatch_frac;
        self
    }

    pub fn random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    pub fn dist(mut self, dist: Distribution) -> Self {
        self.dist = dist;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn verbose_eval(mut self, verbose_eval: usize) -> Self {
        self.verbose_eval = verbose_eval;
        self
    }

    fn check_hyperparameters(&self) -> Result<()> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(PowertrainError::InvalidConfig(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(self.minibatch_frac > 0.0 && self.minibatch_frac <= 1.0) {
            return Err(PowertrainError::InvalidConfig(format!(
                "minibatch_frac must be in (0, 1], got {}",
                self.minibatch_frac
            )));
        }
        Ok(())
    }

    fn sample_rows(&self, rng: &mut StdRng, n: usize) -> Vec<usize> {
        let mut rows: Vec<usize> = (0..n).collect();
        if self.minibatch_frac < 1.0 {
            let size = ((n as f64 * self.minibatch_frac).ceil() as usize).clamp(1, n);
            rows.shuffle(rng);
            rows.truncate(size);
            rows.sort_unstable();
        }
        rows
    }
}

/// One boosting stage: a tree per distribution parameter and the step scale
/// found by line search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Stage {
    trees: Vec<RegressionTree>,
    scale: f64,
}

impl Stage {
    fn apply(&self, learning_rate: f64, sample: ArrayView1<f64>, params: &mut [f64]) {
        for (p, tree) in params.iter_mut().zip(&self.trees) {
            *p -= learning_rate * self.scale * tree.predict(sample);
        }
    }
}

impl Regressor for NGBoost {
    type Fitted = FittedNGBoost;

    fn fit(&self, features: ArrayView2<f64>, target: ArrayView2<f64>) -> Result<Self::Fitted> {
        if target.ncols() != 1 {
            return Err(PowertrainError::UnsupportedConfiguration(format!(
                "ngboost supports exactly one target, got {}",
                target.ncols()
            )));
        }
        check_fit_inputs(features, target)?;
        self.check_hyperparameters()?;

        let y: Vec<f64> = target.column(0).to_vec();
        if self.dist == Distribution::Exponential && y.iter().any(|&v| v <= 0.0) {
            return Err(PowertrainError::InvalidInput(
                "exponential distribution needs strictly positive targets".to_string(),
            ));
        }

        let n = y.len();
        let n_params = self.dist.n_params();
        let tree_params = TreeParams {
            max_depth: self.max_depth,
            min_samples_leaf: 1,
        };
        let init = self.dist.fit_marginal(&y);
        let mut params: Vec<Vec<f64>> = vec![init.clone(); n];
        let mut rng = StdRng::seed_from_u64(self.random_state);
        let mut stages = Vec::with_capacity(self.n_estimators);

        info!(
            "fitting ngboost ({:?}) with {} stages on {} rows",
            self.dist, self.n_estimators, n
        );

        for iter in 0..self.n_estimators {
            let rows = self.sample_rows(&mut rng, n);

            // Tree targets are indexed by row of `features`; unsampled rows
            // are never read.
            let mut grads = vec![vec![0.0; n]; n_params];
            for &i in &rows {
                for (p, g) in self.dist.natural_gradient(&params[i], y[i]).into_iter().enumerate() {
                    grads[p][i] = g;
                }
            }
            let trees: Vec<RegressionTree> = grads
                .iter()
                .map(|g| RegressionTree::fit(features, g, &rows, tree_params))
                .collect();

            let mut stage = Stage { trees, scale: 1.0 };
            let loss_init = self.mean_nll(&params, &y, &rows);
            let mut loss = loss_init;
            for _ in 0..MAX_LINE_SEARCH_HALVINGS {
                loss = self.mean_nll_after(&stage, features, &params, &y, &rows);
                if loss.is_finite() && loss <= loss_init {
                    break;
                }
                stage.scale /= 2.0;
            }

            for (i, p) in params.iter_mut().enumerate() {
                stage.apply(self.learning_rate, features.row(i), p);
                self.dist.clamp(p);
            }
            stages.push(stage);

            if self.verbose && self.verbose_eval > 0 && iter % self.verbose_eval == 0 {
                debug!(
                    "[iter {}] loss={:.4} scale={:.4}",
                    iter,
                    loss,
                    stages.last().map(|s| s.scale).unwrap_or(0.0)
                );
            }
        }

        Ok(FittedNGBoost {
            dist: self.dist,
            init,
            learning_rate: self.learning_rate,
            stages,
            n_features: features.ncols(),
        })
    }
}

impl NGBoost {
    fn mean_nll(&self, params: &[Vec<f64>], y: &[f64], rows: &[usize]) -> f64 {
        rows.iter()
            .map(|&i| self.dist.nll(&params[i], y[i]))
            .sum::<f64>()
            / rows.len() as f64
    }

    fn mean_nll_after(
        &self,
        stage: &Stage,
        features: ArrayView2<f64>,
        params: &[Vec<f64>],
        y: &[f64],
        rows: &[usize],
    ) -> f64 {
        rows.iter()
            .map(|&i| {
                let mut p = params[i].clone();
                stage.apply(self.learning_rate, features.row(i), &mut p);
                self.dist.clamp(&mut p);
                self.dist.nll(&p, y[i])
            })
            .sum::<f64>()
            / rows.len() as f64
    }
}

/// Fitted NGBoost ensemble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedNGBoost {
    dist: Distribution,
    init: Vec<f64>,
    learning_rate: f64,
    stages: Vec<Stage>,
    n_features: usize,
}

impl FittedNGBoost {
    pub fn dist(&self) -> Distribution {
        self.dist
    }

    pub fn n_stages(&self) -> usize {
        self.stages.len()
    }

    fn row_params(&self, sample: ArrayView1<f64>) -> Vec<f64> {
        let mut params = self.init.clone();
        for stage in &self.stages {
            stage.apply(self.learning_rate, sample, &mut params);
            self.dist.clamp(&mut params);
        }
        params
    }

    fn check_width(&self, features: ArrayView2<f64>) -> Result<()> {
        if features.ncols() != self.n_features {
            return Err(PowertrainError::InvalidInput(format!(
                "ngboost was fit on {} inputs but got {}",
                self.n_features,
                features.ncols()
            )));
        }
        Ok(())
    }

    /// Distribution parameters per row.
    pub fn predict_distribution(
        &self,
        features: ArrayView2<f64>,
    ) -> Result<Vec<PredictedDistribution>> {
        self.check_width(features)?;
        Ok(features
            .rows()
            .into_iter()
            .map(|row| self.dist.to_predicted(&self.row_params(row)))
            .collect())
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let n_params = self.dist.n_params();
        let consistent = self.n_features > 0
            && self.init.len() == n_params
            && self.init.iter().all(|v| v.is_finite())
            && self.learning_rate.is_finite()
            && self.stages.iter().all(|stage| {
                stage.scale.is_finite()
                    && stage.trees.len() == n_params
                    && stage
                        .trees
                        .iter()
                        .all(|tree| tree.is_well_formed(self.n_features))
            });
        if consistent {
            Ok(())
        } else {
            Err(PowertrainError::Deserialization(
                "ngboost ensemble is structurally inconsistent".to_string(),
            ))
        }
    }
}

impl InferenceModel for FittedNGBoost {
    fn n_features_in(&self) -> usize {
        self.n_features
    }

    fn n_targets(&self) -> usize {
        1
    }

    fn predict_batch(&self, features: ArrayView2<f64>) -> Result<Array2<f64>> {
        self.check_width(features)?;
        let means: Vec<f64> = features
            .rows()
            .into_iter()
            .map(|row| self.dist.mean(&self.row_params(row)))
            .collect();
        Array2::from_shape_vec((means.len(), 1), means)
            .map_err(|e| PowertrainError::InvalidInput(e.to_string()))
    }
}

impl From<FittedNGBoost> for FittedEstimator {
    fn from(fitted: FittedNGBoost) -> Self {
        FittedEstimator::NGBoost(fitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    fn linear_data() -> (Array2<f64>, Array2<f64>) {
        let x = Array2::from_shape_fn((50, 1), |(i, _)| i as f64);
        let y = Array2::from_shape_fn((50, 1), |(i, _)| 2.0 * i as f64);
        (x, y)
    }

    #[test]
    fn test_rejects_multi_target() {
        let x = array![[1.0], [2.0]];
        let y = array![[1.0, 2.0], [3.0, 4.0]];
        assert!(matches!(
            NGBoost::new().fit(x.view(), y.view()),
            Err(PowertrainError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn test_rejects_bad_hyperparameters() {
        let (x, y) = linear_data();
        let result = NGBoost::new().minibatch_frac(0.0).fit(x.view(), y.view());
        assert!(matches!(result, Err(PowertrainError::InvalidConfig(_))));
        let result = NGBoost::new().learning_rate(-1.0).fit(x.view(), y.view());
        assert!(matches!(result, Err(PowertrainError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_stages_predicts_marginal_mean() {
        let x = array![[0.0], [1.0], [2.0]];
        let y = array![[1.0], [2.0], [3.0]];
        let fitted = NGBoost::new().n_estimators(0).fit(x.view(), y.view()).unwrap();

        let preds = fitted.predict_batch(array![[10.0]].view()).unwrap();
        assert_eq!(preds[[0, 0]], 2.0);
    }

    #[test]
    fn test_boosting_moves_towards_target() {
        let (x, y) = linear_data();
        let fitted = NGBoost::new()
            .n_estimators(200)
            .learning_rate(0.1)
            .verbose(false)
            .fit(x.view(), y.view())
            .unwrap();

        assert_eq!(fitted.n_stages(), 200);
        let preds = fitted.predict_batch(array![[5.0], [45.0]].view()).unwrap();
        assert!(preds[[0, 0]] < 30.0, "got {}", preds[[0, 0]]);
        assert!(preds[[1, 0]] > 70.0, "got {}", preds[[1, 0]]);
    }

    #[test]
    fn test_fit_is_deterministic_with_minibatches() {
        let (x, y) = linear_data();
        let model = NGBoost::new()
            .n_estimators(20)
            .minibatch_frac(0.5)
            .random_state(7);
        let a = model.fit(x.view(), y.view()).unwrap();
        let b = model.fit(x.view(), y.view()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_exponential_requires_positive_target() {
        let x = array![[1.0], [2.0]];
        let y = array![[1.0], [0.0]];
        let result = NGBoost::new()
            .dist(Distribution::Exponential)
            .fit(x.view(), y.view());
        assert!(matches!(result, Err(PowertrainError::InvalidInput(_))));
    }

    #[test]
    fn test_exponential_predictions_are_positive() {
        let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let y = Array2::from_shape_fn((20, 1), |(i, _)| 1.0 + i as f64);
        let fitted = NGBoost::new()
            .dist(Distribution::Exponential)
            .n_estimators(30)
            .fit(x.view(), y.view())
            .unwrap();

        let dists = fitted.predict_distribution(x.view()).unwrap();
        assert!(dists
            .iter()
            .all(|d| matches!(d, PredictedDistribution::Exponential { scale } if *scale > 0.0)));
    }

    #[test]
    fn test_predict_distribution_mean_matches_predict() {
        let (x, y) = linear_data();
        let fitted = NGBoost::new().n_estimators(10).fit(x.view(), y.view()).unwrap();

        let dists = fitted.predict_distribution(x.view()).unwrap();
        let preds = fitted.predict_batch(x.view()).unwrap();
        for (d, p) in dists.iter().zip(preds.column(0)) {
            assert_eq!(d.mean(), *p);
            assert!(matches!(d, PredictedDistribution::Normal { scale, .. } if *scale > 0.0));
        }
    }

    #[test]
    fn test_width_mismatch() {
        let (x, y) = linear_data();
        let fitted = NGBoost::new().n_estimators(1).fit(x.view(), y.view()).unwrap();
        assert!(fitted.predict_batch(array![[1.0, 2.0]].view()).is_err());
    }

    #[test]
    fn test_validate_rejects_wrong_param_count() {
        let (x, y) = linear_data();
        let mut fitted = NGBoost::new().n_estimators(2).fit(x.view(), y.view()).unwrap();
        assert!(fitted.validate().is_ok());
        fitted.init.push(0.0);
        assert!(fitted.validate().is_err());
    }
}
