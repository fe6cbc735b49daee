//! Fans candidate evaluation out over a worker pool and collects the
//! labeled rows of one dataset into a single matrix.

use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MetaFeatConfig;
use crate::data::attributes::{push_attribute, AttributeRow};
use crate::data::dataset::Dataset;
use crate::data::matrix::{FeatureMatrix, FeatureMatrixBuilder};
use crate::error::Result;
use crate::models::base_model::ClassifierKind;
use crate::pipeline::candidate::{classifier_attribute, Baseline, CandidateEvaluator, RetryPolicy};
use crate::pipeline::collaborators::{dataset_auc, Collaborators, OperatorAssignment};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateFailure {
    pub classifier: String,
    pub assignment: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifierFailure {
    pub classifier: String,
    pub reason: String,
}

/// What went wrong (and right) while assembling one dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FailureSummary {
    pub evaluated: usize,
    pub positive: usize,
    pub failed_candidates: Vec<CandidateFailure>,
    /// Classifiers whose baseline or dataset descriptors failed.
    pub skipped_classifiers: Vec<ClassifierFailure>,
    /// Unary assignments that could not be folded into the replica.
    pub skipped_unary_columns: Vec<String>,
    pub coercion_failures: usize,
}

impl FailureSummary {
    pub fn is_clean(&self) -> bool {
        self.failed_candidates.is_empty()
            && self.skipped_classifiers.is_empty()
            && self.skipped_unary_columns.is_empty()
            && self.coercion_failures == 0
    }
}

#[derive(Debug, Clone)]
pub struct AssembledTrainingSet {
    pub matrix: FeatureMatrix,
    pub summary: FailureSummary,
}

pub struct TrainingSetAssembler<'a, D: Dataset> {
    config: &'a MetaFeatConfig,
    collaborators: Collaborators<'a, D>,
}

impl<'a, D: Dataset> TrainingSetAssembler<'a, D> {
    pub fn new(config: &'a MetaFeatConfig, collaborators: Collaborators<'a, D>) -> Self {
        Self { config, collaborators }
    }

    pub fn assemble(&self, dataset: &D) -> Result<AssembledTrainingSet> {
        let mut summary = FailureSummary::default();
        let assignments = self.candidate_universe(dataset, &mut summary)?;
        info!(dataset = dataset.name(), candidates = assignments.len(), "assembling candidate training set");

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.evaluation_parallelism())
            .build()?;
        let evaluator = CandidateEvaluator::new(
            self.collaborators.catalogue,
            self.collaborators.candidate_features,
            self.collaborators.evaluator,
        )
        .with_retry(RetryPolicy::new(self.config.generation_attempts));

        let rows: Mutex<Vec<AttributeRow>> = Mutex::new(Vec::new());
        let failures: Mutex<Vec<CandidateFailure>> = Mutex::new(Vec::new());
        let mut positive = 0usize;

        for &classifier in &self.config.classifiers {
            let baseline = match self.baseline(dataset, classifier) {
                Ok(baseline) => baseline,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(dataset = dataset.name(), %classifier, error = %e, "baseline failed, skipping classifier");
                    summary.skipped_classifiers.push(ClassifierFailure {
                        classifier: classifier.to_string(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let hits: usize = pool.install(|| {
                assignments
                    .par_iter()
                    .map(|oa| match evaluator.evaluate(dataset, &baseline, oa) {
                        Ok(candidate) => {
                            rows.lock().push(candidate.row);
                            candidate.label
                        }
                        Err(e) => {
                            warn!(dataset = dataset.name(), %classifier, assignment = %oa, error = %e, "error in candidate feature generation");
                            failures.lock().push(CandidateFailure {
                                classifier: classifier.to_string(),
                                assignment: oa.name(),
                                reason: e.to_string(),
                            });
                            0
                        }
                    })
                    .sum()
            });
            positive += hits;
        }

        let rows = rows.into_inner();
        summary.failed_candidates = failures.into_inner();
        summary.evaluated = rows.len();
        summary.positive = positive;

        let matrix = FeatureMatrixBuilder::default().build(&rows)?;
        summary.coercion_failures = matrix.coercion_failures();
        info!(
            dataset = dataset.name(),
            rows = summary.evaluated,
            positive = summary.positive,
            failed = summary.failed_candidates.len(),
            "candidate training set assembled"
        );
        Ok(AssembledTrainingSet { matrix, summary })
    }

    /// Baseline AUC and dataset descriptors for one classifier.
    pub fn baseline(&self, dataset: &D, classifier: ClassifierKind) -> Result<Baseline> {
        let auc = dataset_auc(self.collaborators.evaluator, classifier, dataset)?;
        let mut dataset_features = self.collaborators.dataset_features.dataset_features(dataset, classifier)?;
        push_attribute(&mut dataset_features, classifier_attribute(classifier)?);
        Ok(Baseline {
            classifier,
            auc,
            dataset_features,
        })
    }

    /// Non-unary assignments enumerated on a replica augmented with every
    /// unary output, followed by the unary assignments themselves.
    pub fn candidate_universe(&self, dataset: &D, summary: &mut FailureSummary) -> Result<Vec<OperatorAssignment>> {
        let catalogue = self.collaborators.catalogue;
        let max_sources = self.config.max_operator_source_atts;

        let unary = catalogue.unary_assignments(dataset, max_sources)?;
        let mut replica = dataset.replicate();
        for oa in &unary {
            let added = catalogue
                .generate_column(&replica, oa, true)
                .and_then(|column| replica.add_column(column));
            if let Err(e) = added {
                warn!(dataset = dataset.name(), assignment = %oa, error = %e, "unary column left out of replica");
                summary.skipped_unary_columns.push(oa.name());
            }
        }

        let mut assignments = catalogue.non_unary_assignments(&replica, max_sources)?;
        assignments.extend(unary);
        Ok(assignments)
    }
}
