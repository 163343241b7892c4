//! Random forest of regression trees.
//!
//! Every tree is grown on a bootstrap sample of the training rows; the forest
//! predicts the mean of its trees. Multi-target fits grow one tree per target
//! on the same sample, so all targets of a row share its bootstrap draws.

use super::tree::{RegressionTree, TreeParams};
use super::{check_fit_inputs, FittedEstimator, InferenceModel, Regressor};
use crate::error::{PowertrainError, Result};
use log::info;
use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Unfitted random forest regressor.
///
/// Defaults:
/// - `n_estimators`: 100
/// - `max_depth`: 10
/// - `min_samples_leaf`: 1
/// - `bootstrap`: true
/// - `random_state`: 52
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    n_estimators: usize,
    max_depth: usize,
    min_samples_leaf: usize,
    bootstrap: bool,
    random_state: u64,
}

impl Default for RandomForest {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 10,
            min_samples_leaf: 1,
            bootstrap: true,
            random_state: 52,
        }
    }
}

impl RandomForest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_estimators(mut self, n_estimators: usize) -> Self {
        self.n_estimators = n_estimators;
        self
    }

    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn min_samples_leaf(mut self, min_samples_leaf: usize) -> Self {
        self.min_samples_leaf = min_samples_leaf;
        self
    }

    /// Grow each tree on `n` rows drawn with replacement. Without bootstrap
    /// every tree sees all rows and the trees are identical.
    pub fn bootstrap(mut self, bootstrap: bool) -> Self {
        self.bootstrap = bootstrap;
        self
    }

    pub fn random_state(mut self, random_state: u64) -> Self {
        self.random_state = random_state;
        self
    }

    fn check_hyperparameters(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(PowertrainError::InvalidConfig(
                "random forest needs at least one tree".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(PowertrainError::InvalidConfig(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn sample_rows(&self, rng: &mut StdRng, n: usize) -> Vec<usize> {
        if self.bootstrap {
            (0..n).map(|_| rng.gen_range(0..n)).collect()
        } else {
            (0..n).collect()
        }
    }
}

impl Regressor for RandomForest {
    type Fitted = FittedRandomForest;

    fn fit(&self, features: ArrayView2<f64>, target: ArrayView2<f64>) -> Result<Self::Fitted> {
        check_fit_inputs(features, target)?;
        self.check_hyperparameters()?;

        let n = features.nrows();
        let n_features = features.ncols();
        let tree_params = TreeParams {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
        };
        let targets: Vec<Vec<f64>> = target.columns().into_iter().map(|c| c.to_vec()).collect();

        info!(
            "fitting random forest with {} trees on {} rows",
            self.n_estimators, n
        );

        let mut rng = StdRng::seed_from_u64(self.random_state);
        let mut forests: Vec<Vec<RegressionTree>> =
            vec![Vec::with_capacity(self.n_estimators); targets.len()];
        let mut gains = vec![0.0; n_features];

        for _ in 0..self.n_estimators {
            let rows = self.sample_rows(&mut rng, n);
            for (forest, y) in forests.iter_mut().zip(&targets) {
                let (tree, tree_gains) = RegressionTree::fit_with_gains(features, y, &rows, tree_params);
                for (g, t) in gains.iter_mut().zip(tree_gains) {
                    *g += t;
                }
                forest.push(tree);
            }
        }

        Ok(FittedRandomForest {
            forests,
            n_features,
            feature_importance: normalize(gains),
        })
    }
}

/// Scales `gains` to sum to one; all zeros if no split reduced the error.
fn normalize(gains: Vec<f64>) -> Vec<f64> {
    let total: f64 = gains.iter().sum();
    if total > 0.0 {
        gains.into_iter().map(|g| g / total).collect()
    } else {
        vec![0.0; gains.len()]
    }
}

/// Fitted random forest: one list of trees per target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedRandomForest {
    forests: Vec<Vec<RegressionTree>>,
    n_features: usize,
    feature_importance: Vec<f64>,
}

impl FittedRandomForest {
    /// Share of the total squared-error reduction contributed by each input
    /// column, in input order. Sums to one unless no tree ever split.
    pub fn feature_importance(&self) -> &[f64] {
        &self.feature_importance
    }

    pub fn n_trees(&self) -> usize {
        self.forests.first().map(Vec::len).unwrap_or(0)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        let n_trees = self.n_trees();
        let consistent = self.n_features > 0
            && n_trees > 0
            && self.feature_importance.len() == self.n_features
            && self
                .feature_importance
                .iter()
                .all(|v| v.is_finite() && *v >= 0.0)
            && self.forests.iter().all(|forest| {
                forest.len() == n_trees
                    && forest
                        .iter()
                        .all(|tree| tree.is_well_formed(self.n_features))
            });
        if consistent {
            Ok(())
        } else {
            Err(PowertrainError::Deserialization(
                "random forest is structurally inconsistent".to_string(),
            ))
        }
    }
}

impl InferenceModel for FittedRandomForest {
    fn n_features_in(&self) -> usize {
        self.n_features
    }

    fn n_targets(&self) -> usize {
        self.forests.len()
    }

    fn predict_batch(&self, features: ArrayView2<f64>) -> Result<Array2<f64>> {
        if features.ncols() != self.n_features {
            return Err(PowertrainError::InvalidInput(format!(
                "random forest was fit on {} inputs but got {}",
                self.n_features,
                features.ncols()
            )));
        }
        let mut out = Array2::zeros((features.nrows(), self.n_targets()));
        for (mut out_row, row) in out.rows_mut().into_iter().zip(features.rows()) {
            for (o, forest) in out_row.iter_mut().zip(&self.forests) {
                *o = forest.iter().map(|tree| tree.predict(row)).sum::<f64>() / forest.len() as f64;
            }
        }
        Ok(out)
    }
}

impl From<FittedRandomForest> for FittedEstimator {
    fn from(fitted: FittedRandomForest) -> Self {
        FittedEstimator::RandomForest(fitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Energy rate driven by column 0 only; column 1 is constant.
    fn step_data() -> (Array2<f64>, Array2<f64>) {
        let x = Array2::from_shape_fn((40, 2), |(i, c)| if c == 0 { i as f64 } else { 1.0 });
        let y = Array2::from_shape_fn((40, 1), |(i, _)| if i < 20 { 1.0 } else { 3.0 });
        (x, y)
    }

    #[test]
    fn test_rejects_zero_trees() {
        let (x, y) = step_data();
        assert!(matches!(
            RandomForest::new().n_estimators(0).fit(x.view(), y.view()),
            Err(PowertrainError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_fits_step_function() {
        let (x, y) = step_data();
        let fitted = RandomForest::new()
            .n_estimators(20)
            .fit(x.view(), y.view())
            .unwrap();

        assert_eq!(fitted.n_trees(), 20);
        let preds = fitted.predict_batch(array![[2.0, 1.0], [37.0, 1.0]].view()).unwrap();
        assert!(preds[[0, 0]] < 1.5, "got {}", preds[[0, 0]]);
        assert!(preds[[1, 0]] > 2.5, "got {}", preds[[1, 0]]);
    }

    #[test]
    fn test_feature_importance_favors_informative_column() {
        let (x, y) = step_data();
        let fitted = RandomForest::new()
            .n_estimators(10)
            .fit(x.view(), y.view())
            .unwrap();

        let importance = fitted.feature_importance();
        assert_eq!(importance.len(), 2);
        assert_eq!(importance[1], 0.0);
        assert!((importance.iter().sum::<f64>() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_without_bootstrap_trees_agree() {
        let (x, y) = step_data();
        let fitted = RandomForest::new()
            .n_estimators(3)
            .bootstrap(false)
            .fit(x.view(), y.view())
            .unwrap();
        assert_eq!(fitted.forests[0][0], fitted.forests[0][2]);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let (x, y) = step_data();
        let model = RandomForest::new().n_estimators(5).random_state(3);
        assert_eq!(
            model.fit(x.view(), y.view()).unwrap(),
            model.fit(x.view(), y.view()).unwrap()
        );
    }

    #[test]
    fn test_multi_target() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![[1.0, 10.0], [1.0, 10.0], [2.0, 20.0], [2.0, 20.0]];
        let fitted = RandomForest::new()
            .n_estimators(4)
            .bootstrap(false)
            .fit(x.view(), y.view())
            .unwrap();

        assert_eq!(fitted.n_targets(), 2);
        let preds = fitted.predict_batch(array![[4.0]].view()).unwrap();
        assert_eq!(preds.row(0).to_vec(), vec![2.0, 20.0]);
    }

    #[test]
    fn test_validate_rejects_bad_importance() {
        let (x, y) = step_data();
        let mut fitted = RandomForest::new()
            .n_estimators(2)
            .fit(x.view(), y.view())
            .unwrap();
        assert!(fitted.validate().is_ok());
        fitted.feature_importance = vec![f64::NAN, 0.0];
        assert!(fitted.validate().is_err());
    }
}
