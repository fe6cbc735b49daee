use ndarray::{Array2, ArrayView2};
use rayon::ThreadPool;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::data::dataset::LabeledSet;
use crate::error::{MetaFeatError, Result};
use crate::models::decision_tree::DecisionTree;
use crate::models::random_forest::RandomForest;
use crate::models::svm::LinearSvm;
use crate::utils::evaluation::{argmax, ClassEvaluation};

/// A common Rust trait for the classifiers used to label candidates.
pub trait Classifier: Send + Sync {
    /// Train on `x` with class codes `y` in `[0, n_classes)`.
    fn fit(&mut self, x: ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<()>;

    /// One row per sample, one column per class.
    fn predict_proba(&self, x: ArrayView2<f64>) -> Result<Array2<f64>>;

    /// Default: most probable class per row.
    fn predict(&self, x: ArrayView2<f64>) -> Result<Vec<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba
            .rows()
            .into_iter()
            .map(|r| argmax(r.iter().copied()).unwrap_or(0))
            .collect())
    }

    /// Default: train on `train`, then score `test`.
    fn fit_evaluate(&mut self, train: &LabeledSet, test: &LabeledSet) -> Result<ClassEvaluation> {
        self.fit(train.x.view(), &train.y, train.n_classes)?;
        let proba = self.predict_proba(test.x.view())?;
        Ok(ClassEvaluation::from_probabilities(&test.y, proba.view(), test.n_classes))
    }
}

pub(crate) fn check_training_input(name: &str, x: &ArrayView2<f64>, y: &[usize], n_classes: usize) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(MetaFeatError::training(
            name,
            format!("{} rows but {} labels", x.nrows(), y.len()),
        ));
    }
    if y.is_empty() {
        return Err(MetaFeatError::training(name, "empty training set"));
    }
    if let Some(bad) = y.iter().find(|&&c| c >= n_classes) {
        return Err(MetaFeatError::training(
            name,
            format!("label {} outside [0, {})", bad, n_classes),
        ));
    }
    Ok(())
}

/// Knobs shared by every classifier variant.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierParams {
    /// Internal parallelism of ensembles; 0 lets rayon decide.
    pub num_threads: usize,
    pub n_trees: usize,
    pub seed: u64,
}

impl Default for ClassifierParams {
    fn default() -> Self {
        Self {
            num_threads: 0,
            n_trees: 100,
            seed: 1,
        }
    }
}

/// The fixed set of classifiers candidates can be evaluated with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierKind {
    J48,
    Svm,
    RandomForest,
}

impl ClassifierKind {
    /// Number of known classifiers; cardinality of the classifier attribute.
    pub const CARDINALITY: usize = 3;

    /// Code written into the classifier meta-feature.
    pub fn index(self) -> usize {
        match self {
            ClassifierKind::J48 => 0,
            ClassifierKind::Svm => 1,
            ClassifierKind::RandomForest => 2,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ClassifierKind::J48 => "J48",
            ClassifierKind::Svm => "SVM",
            ClassifierKind::RandomForest => "RandomForest",
        }
    }

    pub fn build(self, params: &ClassifierParams) -> Box<dyn Classifier> {
        self.build_with_pool(params, None)
    }

    /// Like [`build`](Self::build); ensembles grow on `pool` when given.
    pub fn build_with_pool(self, params: &ClassifierParams, pool: Option<Arc<ThreadPool>>) -> Box<dyn Classifier> {
        match self {
            ClassifierKind::J48 => Box::new(DecisionTree::new().with_seed(params.seed)),
            ClassifierKind::Svm => Box::new(LinearSvm::new().with_seed(params.seed)),
            ClassifierKind::RandomForest => {
                let forest = RandomForest::new(params.n_trees)
                    .with_num_threads(params.num_threads)
                    .with_seed(params.seed);
                match pool {
                    Some(pool) => Box::new(forest.with_pool(pool)),
                    None => Box::new(forest),
                }
            }
        }
    }

    /// Parse a comma separated list such as `J48,RandomForest`.
    pub fn parse_list(list: &str) -> Result<Vec<Self>> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::parse)
            .collect()
    }
}

impl FromStr for ClassifierKind {
    type Err = MetaFeatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "J48" | "decision-tree" => Ok(ClassifierKind::J48),
            "SVM" | "support-vector-machine" => Ok(ClassifierKind::Svm),
            "RandomForest" | "random-forest" => Ok(ClassifierKind::RandomForest),
            other => Err(MetaFeatError::Configuration(format!("Unidentified classifier: {}", other))),
        }
    }
}

impl fmt::Display for ClassifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(ClassifierKind::J48.index(), 0);
        assert_eq!(ClassifierKind::Svm.index(), 1);
        assert_eq!(ClassifierKind::RandomForest.index(), 2);
    }

    #[test]
    fn parses_names_and_rejects_unknown() {
        let kinds = ClassifierKind::parse_list("J48, RandomForest,SVM").unwrap();
        assert_eq!(
            kinds,
            vec![ClassifierKind::J48, ClassifierKind::RandomForest, ClassifierKind::Svm]
        );
        let err = ClassifierKind::parse_list("J48,NaiveBayes").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn input_checks() {
        let x = Array2::<f64>::zeros((2, 1));
        assert!(check_training_input("t", &x.view(), &[0, 1], 2).is_ok());
        assert!(check_training_input("t", &x.view(), &[0], 2).is_err());
        assert!(check_training_input("t", &x.view(), &[0, 2], 2).is_err());
    }
}
