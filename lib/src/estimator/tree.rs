//! Depth-limited regression tree used as a boosting base learner.
//!
//! Splits minimize the weighted within-node variance of the target; leaves
//! predict the mean target of their samples.

use ndarray::{ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RegressionTree {
    nodes: Vec<TreeNode>,
}

/// Growth limits of a tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

impl RegressionTree {
    /// Fits a tree on the rows of `data` listed in `rows`.
    pub fn fit(data: ArrayView2<f64>, targets: &[f64], rows: &[usize], params: TreeParams) -> Self {
        Self::fit_with_gains(data, targets, rows, params).0
    }

    /// Like [`Self::fit`], also returning the squared-error reduction credited
    /// to each feature by the splits of the tree.
    pub fn fit_with_gains(
        data: ArrayView2<f64>,
        targets: &[f64],
        rows: &[usize],
        params: TreeParams,
    ) -> (Self, Vec<f64>) {
        let mut nodes = Vec::new();
        let mut gains = vec![0.0; data.ncols()];
        build(data, targets, rows, params, 0, &mut nodes, &mut gains);
        (Self { nodes }, gains)
    }

    pub fn predict(&self, sample: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                TreeNode::Leaf { value } => return *value,
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if sample[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    /// Structural check for trees restored from untrusted bytes: every child
    /// index points forward inside the node list and every split feature
    /// exists, so [`Self::predict`] terminates without panicking.
    pub fn is_well_formed(&self, n_features: usize) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(idx, node)| match node {
                TreeNode::Leaf { value } => value.is_finite(),
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    *feature < n_features
                        && !threshold.is_nan()
                        && *left > idx
                        && *right > idx
                        && *left < self.nodes.len()
                        && *right < self.nodes.len()
                }
            })
    }
}

fn mean(targets: &[f64], rows: &[usize]) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().map(|&i| targets[i]).sum::<f64>() / rows.len() as f64
}

fn build(
    data: ArrayView2<f64>,
    targets: &[f64],
    rows: &[usize],
    params: TreeParams,
    depth: usize,
    nodes: &mut Vec<TreeNode>,
    gains: &mut [f64],
) -> usize {
    let leaf = TreeNode::Leaf {
        value: mean(targets, rows),
    };

    if depth >= params.max_depth || rows.len() < 2 * params.min_samples_leaf.max(1) {
        nodes.push(leaf);
        return nodes.len() - 1;
    }

    let Some((feature, threshold, gain)) =
        best_split(data, targets, rows, params.min_samples_leaf)
    else {
        nodes.push(leaf);
        return nodes.len() - 1;
    };

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
        .iter()
        .partition(|&&i| data[[i, feature]] <= threshold);

    gains[feature] += gain;
    let node_idx = nodes.len();
    nodes.push(TreeNode::Leaf { value: 0.0 }); // placeholder
    let left = build(data, targets, &left_rows, params, depth + 1, nodes, gains);
    let right = build(data, targets, &right_rows, params, depth + 1, nodes, gains);
    nodes[node_idx] = TreeNode::Split {
        feature,
        threshold,
        left,
        right,
    };
    node_idx
}

/// Best `(feature, threshold, gain)` by reduction of the summed squared
/// error, or `None` if no split improves on the parent.
fn best_split(
    data: ArrayView2<f64>,
    targets: &[f64],
    rows: &[usize],
    min_samples_leaf: usize,
) -> Option<(usize, f64, f64)> {
    let n = rows.len();
    let min_leaf = min_samples_leaf.max(1);
    let total_sum: f64 = rows.iter().map(|&i| targets[i]).sum();
    let total_sq: f64 = rows.iter().map(|&i| targets[i] * targets[i]).sum();
    let parent_sse = total_sq - total_sum * total_sum / n as f64;

    let mut best: Option<(usize, f64, f64)> = None;
    let mut best_gain = 1e-12 * parent_sse.abs().max(1.0);

    for feature in 0..data.ncols() {
        let mut pairs: Vec<(f64, f64)> = rows
            .iter()
            .map(|&i| (data[[i, feature]], targets[i]))
            .collect();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));

        let mut left_sum = 0.0;
        let mut left_sq = 0.0;
        for split in 0..n - 1 {
            let (x, y) = pairs[split];
            left_sum += y;
            left_sq += y * y;

            let left_n = split + 1;
            let right_n = n - left_n;
            if left_n < min_leaf || right_n < min_leaf || x == pairs[split + 1].0 {
                continue;
            }

            let right_sum = total_sum - left_sum;
            let right_sq = total_sq - left_sq;
            let sse = (left_sq - left_sum * left_sum / left_n as f64)
                + (right_sq - right_sum * right_sum / right_n as f64);
            let gain = parent_sse - sse;

            if gain > best_gain {
                best_gain = gain;
                best = Some((feature, (x + pairs[split + 1].0) / 2.0, gain));
            }
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    const PARAMS: TreeParams = TreeParams {
        max_depth: 3,
        min_samples_leaf: 1,
    };

    #[test]
    fn test_fits_step_function() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = vec![1.0, 1.0, 1.0, 5.0, 5.0, 5.0];
        let rows: Vec<usize> = (0..6).collect();

        let tree = RegressionTree::fit(x.view(), &y, &rows, PARAMS);

        assert_eq!(tree.predict(array![2.5].view()), 1.0);
        assert_eq!(tree.predict(array![11.5].view()), 5.0);
        assert!(tree.is_well_formed(1));
    }

    #[test]
    fn test_constant_target_is_single_leaf() {
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let y = vec![2.0, 2.0, 2.0];
        let tree = RegressionTree::fit(x.view(), &y, &[0, 1, 2], PARAMS);

        assert_eq!(tree.nodes.len(), 1);
        assert_eq!(tree.predict(array![100.0, -1.0].view()), 2.0);
    }

    #[test]
    fn test_depth_zero_predicts_mean_of_rows() {
        let x = Array2::from_shape_vec((4, 1), vec![0.0, 1.0, 2.0, 3.0]).unwrap();
        let y = vec![0.0, 2.0, 4.0, 100.0];
        let params = TreeParams {
            max_depth: 0,
            min_samples_leaf: 1,
        };
        // Row 3 is excluded from fitting.
        let tree = RegressionTree::fit(x.view(), &y, &[0, 1, 2], params);
        assert_eq!(tree.predict(array![3.0].view()), 2.0);
    }

    #[test]
    fn test_gains_credit_the_splitting_feature() {
        // Column 1 is noise that never separates the two groups.
        let x = array![[1.0, 0.0], [2.0, 1.0], [10.0, 0.0], [11.0, 1.0]];
        let y = vec![0.0, 0.0, 4.0, 4.0];
        let (tree, gains) = RegressionTree::fit_with_gains(x.view(), &y, &[0, 1, 2, 3], PARAMS);

        assert_eq!(tree.predict(array![10.5, 0.0].view()), 4.0);
        assert!((gains[0] - 16.0).abs() < 1e-12);
        assert_eq!(gains[1], 0.0);
    }

    #[test]
    fn test_malformed_tree_detected() {
        let tree = RegressionTree {
            nodes: vec![TreeNode::Split {
                feature: 0,
                threshold: 0.0,
                left: 0,
                right: 7,
            }],
        };
        assert!(!tree.is_well_formed(1));

        let bad_feature = RegressionTree {
            nodes: vec![
                TreeNode::Split {
                    feature: 3,
                    threshold: 0.0,
                    left: 1,
                    right: 2,
                },
                TreeNode::Leaf { value: 0.0 },
                TreeNode::Leaf { value: 1.0 },
            ],
        };
        assert!(!bad_feature.is_well_formed(2));
        assert!(bad_feature.is_well_formed(4));
    }
}
