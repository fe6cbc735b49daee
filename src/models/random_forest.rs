use std::sync::Arc;

use ndarray::{Array2, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::ThreadPool;
use serde::{Deserialize, Serialize};

use crate::error::{MetaFeatError, Result};
use crate::models::base_model::{check_training_input, Classifier};
use crate::models::decision_tree::DecisionTree;

/// Bagged ensemble of randomized CART trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForest {
    n_trees: usize,
    max_depth: Option<usize>,
    /// Worker threads used while growing trees; 0 lets rayon decide.
    num_threads: usize,
    seed: u64,
    n_classes: usize,
    trees: Vec<DecisionTree>,
    /// Pool shared with other forests; when absent `fit` builds its own.
    #[serde(skip)]
    pool: Option<Arc<ThreadPool>>,
}

impl RandomForest {
    pub fn new(n_trees: usize) -> Self {
        RandomForest {
            n_trees: n_trees.max(1),
            max_depth: None,
            num_threads: 0,
            seed: 1,
            n_classes: 0,
            trees: Vec::new(),
            pool: None,
        }
    }

    /// Grow trees on `pool` instead of a pool built per fit.
    pub fn with_pool(mut self, pool: Arc<ThreadPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_num_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = num_threads;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    /// log2(n_features) + 1 features per split.
    fn features_per_split(n_features: usize) -> usize {
        if n_features <= 1 {
            return 1;
        }
        ((n_features as f64).log2() as usize + 1).min(n_features)
    }
}

impl Classifier for RandomForest {
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
        check_training_input("RandomForest", &x, y, n_classes)?;
        let n_samples = y.len();
        let max_features = Self::features_per_split(x.ncols());

        // Generate a new random seed for each tree
        let mut rng = StdRng::seed_from_u64(self.seed);
        let seeds: Vec<u64> = (0..self.n_trees).map(|_| rng.gen::<u64>()).collect();

        let pool = match &self.pool {
            Some(shared) => Arc::clone(shared),
            None => Arc::new(rayon::ThreadPoolBuilder::new().num_threads(self.num_threads).build()?),
        };
        let max_depth = self.max_depth;
        let trees = pool.install(|| {
            seeds
                .par_iter()
                .map(|&seed| -> Result<DecisionTree> {
                    let mut tree_rng = StdRng::seed_from_u64(seed);
                    let bootstrap: Vec<usize> = (0..n_samples).map(|_| tree_rng.gen_range(0..n_samples)).collect();
                    let mut tree = DecisionTree::new()
                        .with_min_samples_leaf(1)
                        .with_max_features(max_features)
                        .with_seed(seed);
                    if let Some(d) = max_depth {
                        tree = tree.with_max_depth(d);
                    }
                    tree.fit_rows(x, y, &bootstrap, n_classes)?;
                    Ok(tree)
                })
                .collect::<Result<Vec<_>>>()
        })?;

        self.n_classes = n_classes;
        self.trees = trees;
        Ok(())
    }

    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(MetaFeatError::ModelNotFitted);
        }
        let mut total = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for tree in &self.trees {
            total += &tree.predict_proba(x)?;
        }
        Ok(total / self.trees.len() as f64)
    }
}
