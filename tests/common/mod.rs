#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;

use metafeat_rust::data::attributes::{push_attribute, AttributeInfo, AttributeRow};
use metafeat_rust::data::dataset::{Column, Dataset, LabeledSet, TabularDataset};
use metafeat_rust::data::matrix::FeatureMatrix;
use metafeat_rust::error::{MetaFeatError, Result};
use metafeat_rust::models::ClassifierKind;
use metafeat_rust::pipeline::collaborators::{
    CandidateFeatureExtractor, Collaborators, DatasetFeatureExtractor, ModelEvaluator, OperatorAssignment,
    OperatorCatalogue,
};
use metafeat_rust::pipeline::manager::{MatrixStore, StoreOutcome};
use metafeat_rust::utils::evaluation::ClassEvaluation;

/// Dataset with `n_cols` numeric columns `c0..` and a binary target.
pub fn toy_dataset(name: &str, n_cols: usize) -> TabularDataset {
    let n_rows = 30;
    let columns = (0..n_cols)
        .map(|c| {
            Column::numeric(
                format!("c{}", c),
                (0..n_rows).map(|r| ((r * (c + 3)) % 11) as f64).collect(),
            )
        })
        .collect();
    let target = (0..n_rows).map(|r| usize::from(r % 3 == 0)).collect();
    TabularDataset::new(name, columns, target, 2).unwrap()
}

/// Applies every unary operator to each column and every binary operator
/// to each column pair. Operators named `Fail*` never produce a column;
/// `Flaky*` fail on the first attempt only; `Ratio*` divide the first
/// source by the second, so 0/0 rows are NaN.
#[derive(Default)]
pub struct StubCatalogue {
    pub unary_ops: Vec<String>,
    pub binary_ops: Vec<String>,
    flaky_seen: Mutex<HashSet<String>>,
    pub generated: AtomicUsize,
}

impl StubCatalogue {
    pub fn new(unary_ops: &[&str], binary_ops: &[&str]) -> Self {
        Self {
            unary_ops: unary_ops.iter().map(|s| s.to_string()).collect(),
            binary_ops: binary_ops.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }
}

impl OperatorCatalogue<TabularDataset> for StubCatalogue {
    fn unary_assignments(&self, dataset: &TabularDataset, _max: usize) -> Result<Vec<OperatorAssignment>> {
        Ok(self
            .unary_ops
            .iter()
            .flat_map(move |op| {
                dataset
                    .columns()
                    .iter()
                    .map(move |c| OperatorAssignment::new(op.clone(), vec![c.clone()]))
            })
            .collect())
    }

    fn non_unary_assignments(&self, dataset: &TabularDataset, max: usize) -> Result<Vec<OperatorAssignment>> {
        if max < 2 {
            return Ok(Vec::new());
        }
        let cols = dataset.columns();
        let mut out = Vec::new();
        for op in &self.binary_ops {
            for i in 0..cols.len() {
                for j in i + 1..cols.len() {
                    out.push(OperatorAssignment::new(op.clone(), vec![cols[i].clone(), cols[j].clone()]));
                }
            }
        }
        Ok(out)
    }

    fn generate_column(&self, _dataset: &TabularDataset, oa: &OperatorAssignment, _materialize: bool) -> Result<Column> {
        self.generated.fetch_add(1, Ordering::SeqCst);
        let name = oa.name();
        let op = oa.operator();
        if op.starts_with("Fail") {
            return Err(MetaFeatError::CandidateGeneration {
                assignment: name,
                reason: "operator always fails".into(),
            });
        }
        if op.starts_with("Flaky") && self.flaky_seen.lock().insert(name.clone()) {
            return Err(MetaFeatError::Dataset("transient".into()));
        }
        let n = oa.sources()[0].len();
        if op.starts_with("Ratio") {
            let (a, b) = (&oa.sources()[0], &oa.sources()[oa.arity() - 1]);
            return Ok(Column::numeric(name, (0..n).map(|r| a.value_at(r) / b.value_at(r)).collect()));
        }
        let sums: Vec<f64> = (0..n).map(|r| oa.sources().iter().map(|c| c.value_at(r)).sum()).collect();
        if op.starts_with("Discretize") {
            let codes = sums.iter().map(|&v| usize::from(v > 5.0)).collect();
            return Column::discrete(name, codes, 2);
        }
        Ok(Column::numeric(name, sums))
    }
}

pub struct StubDatasetFeatures;

impl DatasetFeatureExtractor<TabularDataset> for StubDatasetFeatures {
    fn dataset_features(&self, dataset: &TabularDataset, _classifier: ClassifierKind) -> Result<AttributeRow> {
        let mut row = AttributeRow::new();
        push_attribute(&mut row, AttributeInfo::numeric_int("numOfInstances", dataset.n_rows() as i64));
        push_attribute(&mut row, AttributeInfo::numeric("numOfColumns", dataset.columns().len() as f64));
        Ok(row)
    }
}

pub struct StubCandidateFeatures;

impl CandidateFeatureExtractor<TabularDataset> for StubCandidateFeatures {
    fn candidate_features(&self, _dataset: &TabularDataset, oa: &OperatorAssignment, column: &Column) -> Result<AttributeRow> {
        let mut row = AttributeRow::new();
        push_attribute(&mut row, AttributeInfo::numeric_int("arity", oa.arity() as i64));
        push_attribute(&mut row, AttributeInfo::discrete("isDiscrete", usize::from(column.is_discrete()), 2)?);
        push_attribute(&mut row, AttributeInfo::string("operator", oa.operator()));
        Ok(row)
    }
}

/// Returns a fixed AUC per operator of the last feature column; columns
/// not produced by an operator score the baseline.
pub struct ScriptedEvaluator {
    pub baseline: f64,
    pub by_operator: HashMap<String, f64>,
    pub failing: Vec<ClassifierKind>,
    pub calls: AtomicUsize,
    /// Size of the rayon pool each call ran on.
    pub pool_sizes: Mutex<HashSet<usize>>,
}

impl ScriptedEvaluator {
    pub fn new(baseline: f64, by_operator: &[(&str, f64)]) -> Self {
        Self {
            baseline,
            by_operator: by_operator.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            failing: Vec::new(),
            calls: AtomicUsize::new(0),
            pool_sizes: Mutex::new(HashSet::new()),
        }
    }

    pub fn failing_for(mut self, classifier: ClassifierKind) -> Self {
        self.failing.push(classifier);
        self
    }
}

impl ModelEvaluator for ScriptedEvaluator {
    fn evaluate(&self, classifier: ClassifierKind, train: &LabeledSet, test: &LabeledSet) -> Result<ClassEvaluation> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pool_sizes.lock().insert(rayon::current_num_threads());
        if self.failing.contains(&classifier) {
            return Err(MetaFeatError::ClassifierTraining {
                classifier: classifier.to_string(),
                reason: "scripted failure".into(),
            });
        }
        let last = train.feature_names.last().cloned().unwrap_or_default();
        let op = last.split('(').next().unwrap_or_default();
        let auc = self.by_operator.get(op).copied().unwrap_or(self.baseline);
        Ok(ClassEvaluation::from_class_aucs(vec![auc; test.n_classes]))
    }
}

pub fn collaborators<'a>(
    catalogue: &'a StubCatalogue,
    evaluator: &'a dyn ModelEvaluator,
) -> Collaborators<'a, TabularDataset> {
    Collaborators {
        catalogue,
        dataset_features: &StubDatasetFeatures,
        candidate_features: &StubCandidateFeatures,
        evaluator,
    }
}

/// In-memory store that counts calls.
#[derive(Default)]
pub struct CountingStore {
    matrices: Mutex<HashMap<String, FeatureMatrix>>,
    pub loads: AtomicUsize,
    pub stores: AtomicUsize,
}

impl MatrixStore for CountingStore {
    fn load(&self, dataset: &str) -> Result<Option<FeatureMatrix>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(self.matrices.lock().get(dataset).cloned())
    }

    fn store(&self, dataset: &str, matrix: &FeatureMatrix) -> Result<StoreOutcome> {
        self.stores.fetch_add(1, Ordering::SeqCst);
        self.matrices.lock().insert(dataset.to_string(), matrix.clone());
        Ok(StoreOutcome::Written)
    }
}
