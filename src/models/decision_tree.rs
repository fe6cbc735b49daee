use std::cmp::Ordering;

use ndarray::{Array2, ArrayView2};
use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{MetaFeatError, Result};
use crate::models::base_model::{check_training_input, Classifier};

// Tree node structure
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        distribution: Vec<f64>,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

/// CART classification tree with Gini impurity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    root: Option<Node>,
    max_depth: Option<usize>,
    min_samples_leaf: usize,
    /// Features examined per split; `None` means all of them.
    max_features: Option<usize>,
    seed: u64,
    n_classes: usize,
    n_features: usize,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DecisionTree {
    pub fn new() -> Self {
        DecisionTree {
            root: None,
            max_depth: None,
            min_samples_leaf: 2,
            max_features: None,
            seed: 1,
            n_classes: 0,
            n_features: 0,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn with_min_samples_leaf(mut self, n: usize) -> Self {
        self.min_samples_leaf = n.max(1);
        self
    }

    pub fn with_max_features(mut self, n: usize) -> Self {
        self.max_features = Some(n.max(1));
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn is_fitted(&self) -> bool {
        self.root.is_some()
    }

    /// Fit on a subset of rows (bootstrap samples may repeat rows).
    pub(crate) fn fit_rows(&mut self, x: ArrayView2<f64>, y: &[usize], rows: &[usize], n_classes: usize) -> Result<()> {
        if rows.is_empty() {
            return Err(MetaFeatError::training("J48", "no rows to fit"));
        }
        self.n_classes = n_classes;
        self.n_features = x.ncols();
        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut rows = rows.to_vec();
        self.root = Some(self.build_tree(&x, y, &mut rows, 0, &mut rng));
        Ok(())
    }

    fn distribution(&self, y: &[usize], rows: &[usize]) -> Vec<f64> {
        let mut counts = vec![0.0; self.n_classes];
        for &r in rows {
            counts[y[r]] += 1.0;
        }
        let total = rows.len() as f64;
        counts.iter_mut().for_each(|c| *c /= total);
        counts
    }

    fn build_tree(&self, x: &ArrayView2<f64>, y: &[usize], rows: &mut [usize], depth: usize, rng: &mut StdRng) -> Node {
        let distribution = self.distribution(y, rows);

        // Stop criteria
        let pure = distribution.iter().any(|&p| p >= 1.0);
        let depth_reached = self.max_depth.map_or(false, |d| depth >= d);
        if pure || depth_reached || rows.len() < 2 * self.min_samples_leaf {
            return Node::Leaf { distribution };
        }

        let split = match self.best_split(x, y, rows, rng) {
            Some(split) => split,
            None => return Node::Leaf { distribution },
        };

        // Partition rows in place: left block holds values <= threshold,
        // missing values go right
        let mut boundary = 0;
        for i in 0..rows.len() {
            if x[[rows[i], split.feature]] <= split.threshold {
                rows.swap(i, boundary);
                boundary += 1;
            }
        }
        if boundary == 0 || boundary == rows.len() {
            return Node::Leaf { distribution };
        }
        let (left_rows, right_rows) = rows.split_at_mut(boundary);

        Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left: Box::new(self.build_tree(x, y, left_rows, depth + 1, rng)),
            right: Box::new(self.build_tree(x, y, right_rows, depth + 1, rng)),
        }
    }

    fn best_split(&self, x: &ArrayView2<f64>, y: &[usize], rows: &[usize], rng: &mut StdRng) -> Option<BestSplit> {
        let mut features: Vec<usize> = (0..x.ncols()).collect();
        if let Some(k) = self.max_features {
            features.shuffle(rng);
            features.truncate(k.min(features.len()));
        }

        let n = rows.len();
        let parent = gini(&self.distribution(y, rows));
        let mut best: Option<BestSplit> = None;
        let mut sorted = rows.to_vec();

        for &feature in &features {
            sorted.sort_by(|&a, &b| missing_last(x[[a, feature]], x[[b, feature]]));

            let mut left = vec![0usize; self.n_classes];
            let mut right = vec![0usize; self.n_classes];
            for &r in &sorted {
                right[y[r]] += 1;
            }

            for i in 0..n - 1 {
                let cls = y[sorted[i]];
                left[cls] += 1;
                right[cls] -= 1;

                let n_left = i + 1;
                let n_right = n - n_left;
                if n_left < self.min_samples_leaf || n_right < self.min_samples_leaf {
                    continue;
                }
                let here = x[[sorted[i], feature]];
                let next = x[[sorted[i + 1], feature]];
                if !here.is_finite() || !next.is_finite() || (next - here).abs() < 1e-12 {
                    continue;
                }

                let impurity = (n_left as f64 * gini_counts(&left, n_left)
                    + n_right as f64 * gini_counts(&right, n_right))
                    / n as f64;
                if impurity + 1e-12 < best.as_ref().map_or(parent, |b| b.impurity) {
                    best = Some(BestSplit {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        impurity,
                    });
                }
            }
        }
        best
    }

    fn leaf_for<'a>(node: &'a Node, sample: &[f64]) -> &'a [f64] {
        match node {
            Node::Leaf { distribution } => distribution,
            Node::Split { feature, threshold, left, right } => {
                if sample[*feature] <= *threshold {
                    Self::leaf_for(left, sample)
                } else {
                    Self::leaf_for(right, sample)
                }
            }
        }
    }
}

/// NaN sorts after every number regardless of sign bit.
fn missing_last(a: f64, b: f64) -> Ordering {
    a.is_nan().cmp(&b.is_nan()).then_with(|| a.total_cmp(&b))
}

fn gini(distribution: &[f64]) -> f64 {
    1.0 - distribution.iter().map(|p| p * p).sum::<f64>()
}

fn gini_counts(counts: &[usize], total: usize) -> f64 {
    let total = total as f64;
    1.0 - counts.iter().map(|&c| (c as f64 / total).powi(2)).sum::<f64>()
}

impl Classifier for DecisionTree {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        check_training_input("J48", &x, y, n_classes)?;
        let rows: Vec<usize> = (0..y.len()).collect();
        self.fit_rows(x, y, &rows, n_classes)
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        let root = self.root.as_ref().ok_or(MetaFeatError::ModelNotFitted)?;
        if x.ncols() != self.n_features {
            return Err(MetaFeatError::training(
                "J48",
                format!("expected {} features, got {}", self.n_features, x.ncols()),
            ));
        }
        let mut proba = Array2::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            let sample = row.to_vec();
            for (c, p) in Self::leaf_for(root, &sample).iter().enumerate() {
                proba[[i, c]] = *p;
            }
        }
        Ok(proba)
    }
}
