//! Seams between candidate evaluation and the rest of the feature
//! engineering system: operator catalogue, descriptor extractors and the
//! train/test evaluation of a classifier.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use rayon::ThreadPool;

use crate::data::attributes::AttributeRow;
use crate::data::dataset::{Column, Dataset, LabeledSet};
use crate::error::{MetaFeatError, Result};
use crate::models::base_model::{ClassifierKind, ClassifierParams};
use crate::utils::evaluation::ClassEvaluation;

/// An operator bound to its concrete source columns.
///
/// Sources are owned so an assignment enumerated against an augmented
/// replica can still be generated against a plain copy of the dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct OperatorAssignment {
    operator: String,
    sources: Vec<Column>,
}

impl OperatorAssignment {
    pub fn new(operator: impl Into<String>, sources: Vec<Column>) -> Self {
        Self {
            operator: operator.into(),
            sources,
        }
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn sources(&self) -> &[Column] {
        &self.sources
    }

    pub fn arity(&self) -> usize {
        self.sources.len()
    }

    /// `Operator(src1,src2)`
    pub fn name(&self) -> String {
        let sources: Vec<&str> = self.sources.iter().map(|c| c.name()).collect();
        format!("{}({})", self.operator, sources.join(","))
    }
}

impl fmt::Display for OperatorAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

pub trait OperatorCatalogue<D: Dataset>: Send + Sync {
    /// Single-source assignments (discretizers and the like).
    fn unary_assignments(&self, dataset: &D, max_source_atts: usize) -> Result<Vec<OperatorAssignment>>;

    fn non_unary_assignments(&self, dataset: &D, max_source_atts: usize) -> Result<Vec<OperatorAssignment>>;

    /// Produce the derived column. With `materialize` the values are
    /// computed eagerly.
    fn generate_column(&self, dataset: &D, assignment: &OperatorAssignment, materialize: bool) -> Result<Column>;
}

pub trait DatasetFeatureExtractor<D: Dataset>: Send + Sync {
    fn dataset_features(&self, dataset: &D, classifier: ClassifierKind) -> Result<AttributeRow>;
}

pub trait CandidateFeatureExtractor<D: Dataset>: Send + Sync {
    fn candidate_features(&self, dataset: &D, assignment: &OperatorAssignment, column: &Column) -> Result<AttributeRow>;
}

/// Train on one partition, score the other.
pub trait ModelEvaluator: Send + Sync {
    fn evaluate(&self, classifier: ClassifierKind, train: &LabeledSet, test: &LabeledSet) -> Result<ClassEvaluation>;
}

/// Builds a fresh classifier per call from [`ClassifierParams`].
/// Random forests share one tree-growing pool across calls.
#[derive(Debug, Default)]
pub struct TrainTestEvaluator {
    params: ClassifierParams,
    forest_pool: Mutex<Option<Arc<ThreadPool>>>,
}

impl TrainTestEvaluator {
    pub fn new(params: ClassifierParams) -> Self {
        Self {
            params,
            forest_pool: Mutex::new(None),
        }
    }

    /// Pool sized by `num_threads`, built on first use.
    fn forest_pool(&self) -> Result<Arc<ThreadPool>> {
        let mut slot = self.forest_pool.lock();
        if let Some(pool) = slot.as_ref() {
            return Ok(Arc::clone(pool));
        }
        let pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(self.params.num_threads)
                .build()?,
        );
        *slot = Some(Arc::clone(&pool));
        Ok(pool)
    }
}

impl ModelEvaluator for TrainTestEvaluator {
    fn evaluate(&self, classifier: ClassifierKind, train: &LabeledSet, test: &LabeledSet) -> Result<ClassEvaluation> {
        let pool = match classifier {
            ClassifierKind::RandomForest => Some(
                self.forest_pool()
                    .map_err(|e| MetaFeatError::training(classifier, e))?,
            ),
            _ => None,
        };
        let mut model = classifier.build_with_pool(&self.params, pool);
        model.fit_evaluate(train, test).map_err(|e| match e {
            MetaFeatError::ClassifierTraining { .. } => e,
            other => MetaFeatError::training(classifier, other),
        })
    }
}

/// Mean one-vs-rest AUC of `classifier` on the dataset's own split.
pub fn dataset_auc<D: Dataset>(evaluator: &dyn ModelEvaluator, classifier: ClassifierKind, dataset: &D) -> Result<f64> {
    let train = dataset.generate_set(true)?;
    let test = dataset.generate_set(false)?;
    let evaluation = evaluator.evaluate(classifier, &train, &test)?;
    Ok(evaluation.mean_auc(dataset.num_classes()))
}

/// Everything assembly needs besides the dataset and configuration.
pub struct Collaborators<'a, D: Dataset> {
    pub catalogue: &'a dyn OperatorCatalogue<D>,
    pub dataset_features: &'a dyn DatasetFeatureExtractor<D>,
    pub candidate_features: &'a dyn CandidateFeatureExtractor<D>,
    pub evaluator: &'a dyn ModelEvaluator,
}

impl<'a, D: Dataset> Clone for Collaborators<'a, D> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<'a, D: Dataset> Copy for Collaborators<'a, D> {}
