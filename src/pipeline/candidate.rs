//! Evaluation of a single candidate attribute: generate it on a private
//! replica, describe it, measure the AUC it yields and label the row.

use tracing::{debug, info};

use crate::data::attributes::{extend_row, push_attribute, AttributeInfo, AttributeRow};
use crate::data::dataset::Dataset;
use crate::error::{MetaFeatError, Result};
use crate::models::base_model::ClassifierKind;
use crate::pipeline::collaborators::{
    dataset_auc, CandidateFeatureExtractor, ModelEvaluator, OperatorAssignment, OperatorCatalogue,
};

/// Minimum AUC gain for a candidate to be labeled useful.
pub const IMPROVEMENT_THRESHOLD: f64 = 0.01;

/// Absorbs representation error so a gain of exactly the threshold
/// (e.g. `0.71 - 0.70`) is not counted as an improvement.
const AUC_TOLERANCE: f64 = 1e-9;

pub const LABEL_ATTRIBUTE: &str = "classAttribute";
pub const CLASSIFIER_ATTRIBUTE: &str = "Classifier";

/// 1 when `delta` strictly exceeds [`IMPROVEMENT_THRESHOLD`], else 0.
pub fn label_for_delta(delta: f64) -> usize {
    usize::from(delta > IMPROVEMENT_THRESHOLD + AUC_TOLERANCE)
}

pub fn label_for_aucs(candidate_auc: f64, baseline_auc: f64) -> usize {
    label_for_delta(candidate_auc - baseline_auc)
}

pub fn label_attribute(label: usize) -> Result<AttributeInfo> {
    AttributeInfo::discrete(LABEL_ATTRIBUTE, label, 2)
}

pub fn classifier_attribute(classifier: ClassifierKind) -> Result<AttributeInfo> {
    AttributeInfo::discrete(CLASSIFIER_ATTRIBUTE, classifier.index(), ClassifierKind::CARDINALITY)
}

/// Bounded retry around an operation that may fail transiently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 2 }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run `op` until it succeeds, fails fatally or attempts run out.
    /// `op` receives the 1-based attempt number.
    pub fn run<T>(&self, what: &str, mut op: impl FnMut(usize) -> Result<T>) -> Result<T> {
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if e.is_fatal() || attempt >= self.max_attempts => return Err(e),
                Err(e) => {
                    debug!(what, attempt, error = %e, "retrying");
                    attempt += 1;
                }
            }
        }
    }
}

/// Per (dataset, classifier) state shared read-only by every candidate.
#[derive(Debug, Clone)]
pub struct Baseline {
    pub classifier: ClassifierKind,
    pub auc: f64,
    /// Dataset descriptors followed by the classifier attribute.
    pub dataset_features: AttributeRow,
}

#[derive(Debug, Clone)]
pub struct EvaluatedCandidate {
    /// Candidate descriptors, then dataset descriptors, then the label.
    pub row: AttributeRow,
    pub label: usize,
    pub auc: f64,
    pub delta: f64,
}

pub struct CandidateEvaluator<'a, D: Dataset> {
    catalogue: &'a dyn OperatorCatalogue<D>,
    extractor: &'a dyn CandidateFeatureExtractor<D>,
    evaluator: &'a dyn ModelEvaluator,
    retry: RetryPolicy,
}

impl<'a, D: Dataset> CandidateEvaluator<'a, D> {
    pub fn new(
        catalogue: &'a dyn OperatorCatalogue<D>,
        extractor: &'a dyn CandidateFeatureExtractor<D>,
        evaluator: &'a dyn ModelEvaluator,
    ) -> Self {
        Self {
            catalogue,
            extractor,
            evaluator,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn evaluate(&self, dataset: &D, baseline: &Baseline, assignment: &OperatorAssignment) -> Result<EvaluatedCandidate> {
        let name = assignment.name();
        let mut replica = dataset.replicate();

        let column = self
            .retry
            .run(&name, |_| self.catalogue.generate_column(&replica, assignment, true))
            .map_err(|e| match e {
                MetaFeatError::CandidateGeneration { .. } => e,
                e if e.is_fatal() => e,
                other => MetaFeatError::CandidateGeneration {
                    assignment: name.clone(),
                    reason: other.to_string(),
                },
            })?;

        let mut row = self.extractor.candidate_features(dataset, assignment, &column)?;

        replica.add_column(column)?;
        let auc = dataset_auc(self.evaluator, baseline.classifier, &replica)?;
        let delta = auc - baseline.auc;
        let label = label_for_delta(delta);
        if label == 1 {
            info!(dataset = dataset.name(), classifier = %baseline.classifier, assignment = %name, delta, "found positive match");
        }

        extend_row(&mut row, &baseline.dataset_features);
        push_attribute(&mut row, label_attribute(label)?);

        Ok(EvaluatedCandidate { row, label, auc, delta })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn labeling_is_strict() {
        assert_eq!(label_for_aucs(0.715, 0.70), 1);
        assert_eq!(label_for_aucs(0.705, 0.70), 0);
        assert_eq!(label_for_aucs(0.71, 0.70), 0);
        assert_eq!(label_for_aucs(0.60, 0.70), 0);
        assert_eq!(label_for_delta(0.0101), 1);
    }

    #[test]
    fn label_and_classifier_attributes_are_discrete() {
        assert_eq!(label_attribute(1).unwrap().cardinality(), 2);
        assert!(label_attribute(2).is_err());
        let attr = classifier_attribute(ClassifierKind::RandomForest).unwrap();
        assert_eq!(attr.cardinality(), 3);
        assert_eq!(attr.value().as_f64(), Some(2.0));
    }

    #[test]
    fn retry_gives_up_after_max_attempts() {
        let calls = Cell::new(0);
        let result: Result<()> = RetryPolicy::default().run("gen", |_| {
            calls.set(calls.get() + 1);
            Err(MetaFeatError::Dataset("flaky".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn retry_recovers_on_second_attempt() {
        let value = RetryPolicy::default()
            .run("gen", |attempt| {
                if attempt == 1 {
                    Err(MetaFeatError::Dataset("flaky".into()))
                } else {
                    Ok(attempt)
                }
            })
            .unwrap();
        assert_eq!(value, 2);
    }

    #[test]
    fn retry_does_not_repeat_fatal_errors() {
        let calls = Cell::new(0);
        let _ = RetryPolicy::new(5).run("gen", |_| -> Result<()> {
            calls.set(calls.get() + 1);
            Err(MetaFeatError::Configuration("bad".into()))
        });
        assert_eq!(calls.get(), 1);
    }
}
