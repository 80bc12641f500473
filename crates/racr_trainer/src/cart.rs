//! Regression tree builder
//!
//! Second-order exact-greedy construction: for every candidate feature the
//! rows are sorted once and every boundary between distinct values is
//! scored. Rows with a missing value always follow the right branch, both
//! here and at prediction time.

use racr_core::gbdt::{Node, Tree};

/// Training parameters for a single tree
#[derive(Clone, Debug)]
pub struct TreeConfig {
    pub max_depth: usize,
    /// Minimum hessian sum on each side of a split
    pub min_child_weight: f64,
    /// L2 penalty on leaf weights
    pub reg_lambda: f64,
    /// L1 penalty on leaf weights
    pub reg_alpha: f64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 3,
            min_child_weight: 1.0,
            reg_lambda: 1.0,
            reg_alpha: 0.0,
        }
    }
}

/// Best split found for one node
#[derive(Debug, Clone, PartialEq)]
struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

/// Gradient and hessian sums
#[derive(Debug, Clone, Copy, Default)]
struct GradStats {
    g: f64,
    h: f64,
}

impl GradStats {
    fn add(&mut self, g: f64, h: f64) {
        self.g += g;
        self.h += h;
    }

    fn minus(self, other: GradStats) -> GradStats {
        GradStats {
            g: self.g - other.g,
            h: self.h - other.h,
        }
    }
}

/// Build one regression tree from gradients and hessians
pub struct CartBuilder<'a> {
    config: TreeConfig,
    features: &'a [Vec<f64>],
    gradients: &'a [f64],
    hessians: &'a [f64],
    columns: Vec<usize>,
}

impl<'a> CartBuilder<'a> {
    /// `columns` restricts the features considered for splits
    pub fn new(
        features: &'a [Vec<f64>],
        gradients: &'a [f64],
        hessians: &'a [f64],
        columns: Vec<usize>,
        config: TreeConfig,
    ) -> Self {
        assert_eq!(features.len(), gradients.len());
        assert_eq!(features.len(), hessians.len());

        Self {
            config,
            features,
            gradients,
            hessians,
            columns,
        }
    }

    /// Build a tree over the rows in `rows`; leaf values are unshrunk
    pub fn build(&self, rows: &[usize]) -> Tree {
        let mut nodes = Vec::new();
        self.build_node(rows, 0, &mut nodes);
        Tree::new(nodes, 1.0)
    }

    fn build_node(&self, rows: &[usize], depth: usize, nodes: &mut Vec<Node>) -> i32 {
        let current_idx = nodes.len() as i32;
        let stats = self.sum(rows);

        let split = if depth < self.config.max_depth {
            self.find_best_split(rows, stats)
        } else {
            None
        };

        let Some(split) = split else {
            nodes.push(Node::leaf(current_idx, self.leaf_weight(stats)).with_stats(0.0, stats.h));
            return current_idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .copied()
            .partition(|&i| self.features[i][split.feature_idx] <= split.threshold);

        // reserve the slot; children are patched in once built
        nodes.push(
            Node::internal(current_idx, split.feature_idx as i32, split.threshold, -1, -1)
                .with_stats(split.gain, stats.h),
        );
        let left = self.build_node(&left_rows, depth + 1, nodes);
        let right = self.build_node(&right_rows, depth + 1, nodes);
        nodes[current_idx as usize].left = left;
        nodes[current_idx as usize].right = right;

        current_idx
    }

    fn find_best_split(&self, rows: &[usize], parent: GradStats) -> Option<SplitCandidate> {
        let parent_score = self.score(parent);
        let mut best: Option<SplitCandidate> = None;

        for &feature_idx in &self.columns {
            let mut present: Vec<(f64, usize)> = rows
                .iter()
                .map(|&i| (self.features[i][feature_idx], i))
                .filter(|(v, _)| !v.is_nan())
                .collect();
            if present.len() < 2 {
                continue;
            }
            present.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

            // missing rows stay in `right` for every threshold
            let mut left = GradStats::default();
            for pair in present.windows(2) {
                let (value, i) = pair[0];
                let next = pair[1].0;
                left.add(self.gradients[i], self.hessians[i]);
                if value == next {
                    continue;
                }

                let right = parent.minus(left);
                if left.h < self.config.min_child_weight || right.h < self.config.min_child_weight {
                    continue;
                }

                let gain = 0.5 * (self.score(left) + self.score(right) - parent_score);
                if gain <= 0.0 {
                    continue;
                }

                // first candidate wins ties
                if best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature_idx,
                        threshold: midpoint(value, next),
                        gain,
                    });
                }
            }
        }

        best
    }

    fn sum(&self, rows: &[usize]) -> GradStats {
        let mut stats = GradStats::default();
        for &i in rows {
            stats.add(self.gradients[i], self.hessians[i]);
        }
        stats
    }

    /// Soft-thresholded gradient for L1 regularization
    fn threshold_l1(&self, g: f64) -> f64 {
        let alpha = self.config.reg_alpha;
        if g > alpha {
            g - alpha
        } else if g < -alpha {
            g + alpha
        } else {
            0.0
        }
    }

    fn score(&self, stats: GradStats) -> f64 {
        let t = self.threshold_l1(stats.g);
        t * t / (stats.h + self.config.reg_lambda)
    }

    /// Optimal leaf weight: -T(G) / (H + lambda)
    fn leaf_weight(&self, stats: GradStats) -> f64 {
        let denom = stats.h + self.config.reg_lambda;
        if denom <= 0.0 {
            return 0.0;
        }
        -self.threshold_l1(stats.g) / denom
    }
}

/// Split point strictly below `hi` so that `lo <= t < hi`
fn midpoint(lo: f64, hi: f64) -> f64 {
    let mid = lo + (hi - lo) / 2.0;
    if mid < hi {
        mid
    } else {
        lo
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> TreeConfig {
        TreeConfig {
            max_depth: 2,
            min_child_weight: 1.0,
            reg_lambda: 0.0,
            reg_alpha: 0.0,
        }
    }

    #[test]
    fn test_simple_split() {
        let features = vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]];
        // gradient = prediction - target: rows 0-1 under-predicted
        let gradients = vec![-2.0, -2.0, 2.0, 2.0];
        let hessians = vec![1.0; 4];

        let builder = CartBuilder::new(&features, &gradients, &hessians, vec![0], config());
        let tree = builder.build(&[0, 1, 2, 3]);

        let root = tree.root().unwrap();
        assert_eq!(root.feature_idx, 0);
        assert_eq!(root.threshold, 2.5);
        assert_eq!(tree.leaf_for(&[1.0]), 2.0);
        assert_eq!(tree.leaf_for(&[4.0]), -2.0);
        assert!(tree.validate(1).is_ok());
    }

    #[test]
    fn test_leaf_only_tree() {
        let features = vec![vec![1.0]];
        let builder = CartBuilder::new(&features, &[-3.0], &[1.0], vec![0], TreeConfig::default());
        let tree = builder.build(&[0]);

        assert_eq!(tree.nodes.len(), 1);
        // -(-3) / (1 + 1)
        assert_eq!(tree.nodes[0].leaf, Some(1.5));
    }

    #[test]
    fn test_min_child_weight_blocks_split() {
        let features = vec![vec![1.0], vec![2.0], vec![3.0]];
        let mut cfg = config();
        cfg.min_child_weight = 2.0;
        let builder = CartBuilder::new(&features, &[-1.0, 1.0, 1.0], &[1.0; 3], vec![0], cfg);
        let tree = builder.build(&[0, 1, 2]);
        assert_eq!(tree.nodes.len(), 1);
    }

    #[test]
    fn test_missing_values_go_right() {
        let features = vec![vec![1.0], vec![1.0], vec![f64::NAN], vec![9.0]];
        let gradients = vec![-1.0, -1.0, 1.0, 1.0];
        let builder = CartBuilder::new(&features, &gradients, &[1.0; 4], vec![0], config());
        let tree = builder.build(&[0, 1, 2, 3]);

        assert_eq!(tree.root().unwrap().threshold, 5.0);
        assert_eq!(tree.leaf_for(&[f64::NAN]), tree.leaf_for(&[9.0]));
        assert_eq!(tree.nodes[2].cover, 2.0);
    }

    #[test]
    fn test_l1_shrinks_leaves() {
        let features = vec![vec![1.0]];
        let cfg = TreeConfig {
            max_depth: 0,
            min_child_weight: 0.0,
            reg_lambda: 0.0,
            reg_alpha: 5.0,
        };
        let builder = CartBuilder::new(&features, &[-3.0], &[1.0], vec![0], cfg);
        assert_eq!(builder.build(&[0]).nodes[0].leaf, Some(0.0));
    }

    #[test]
    fn test_column_restriction() {
        let features = vec![vec![1.0, 5.0], vec![2.0, 5.0], vec![3.0, 6.0], vec![4.0, 6.0]];
        let gradients = vec![-2.0, -2.0, 2.0, 2.0];
        let builder = CartBuilder::new(&features, &gradients, &[1.0; 4], vec![1], config());
        let tree = builder.build(&[0, 1, 2, 3]);
        assert_eq!(tree.root().unwrap().feature_idx, 1);
        assert_eq!(tree.root().unwrap().threshold, 5.5);
    }
}
