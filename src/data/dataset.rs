//! Dataset collaborator used by candidate evaluation.
//!
//! The trait is the seam the pipeline is written against. `TabularDataset`
//! is an in-memory implementation whose columns are owned vectors, so a
//! replica never aliases the original.

use ndarray::Array2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{MetaFeatError, Result};

pub const DEFAULT_TEST_FRACTION: f64 = 1.0 / 3.0;
pub const DEFAULT_SPLIT_SEED: u64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnValues {
    Numeric(Vec<f64>),
    Discrete { codes: Vec<usize>, cardinality: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    name: String,
    values: ColumnValues,
}

impl Column {
    pub fn numeric(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Numeric(values),
        }
    }

    pub fn discrete(name: impl Into<String>, codes: Vec<usize>, cardinality: usize) -> Result<Self> {
        let name = name.into();
        if let Some(bad) = codes.iter().find(|&&c| c >= cardinality) {
            return Err(MetaFeatError::Dataset(format!(
                "column {} has code {} but cardinality {}",
                name, bad, cardinality
            )));
        }
        Ok(Self {
            name,
            values: ColumnValues::Discrete { codes, cardinality },
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &ColumnValues {
        &self.values
    }

    pub fn len(&self) -> usize {
        match &self.values {
            ColumnValues::Numeric(v) => v.len(),
            ColumnValues::Discrete { codes, .. } => codes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_discrete(&self) -> bool {
        matches!(self.values, ColumnValues::Discrete { .. })
    }

    /// Numeric view of row `i`; discrete columns yield their code.
    pub fn value_at(&self, i: usize) -> f64 {
        match &self.values {
            ColumnValues::Numeric(v) => v[i],
            ColumnValues::Discrete { codes, .. } => codes[i] as f64,
        }
    }
}

/// Training or test partition ready for a classifier.
#[derive(Debug, Clone)]
pub struct LabeledSet {
    pub feature_names: Vec<String>,
    pub x: Array2<f64>,
    pub y: Vec<usize>,
    pub n_classes: usize,
}

impl LabeledSet {
    pub fn n_samples(&self) -> usize {
        self.y.len()
    }
}

pub trait Dataset: Send + Sync + Sized {
    fn name(&self) -> &str;

    /// Deep, independent copy. Columns added to the copy must never be
    /// visible through the original or through any other copy.
    fn replicate(&self) -> Self;

    fn add_column(&mut self, column: Column) -> Result<()>;

    fn columns(&self) -> &[Column];

    /// Materialize the train (`true`) or test (`false`) partition.
    fn generate_set(&self, is_train: bool) -> Result<LabeledSet>;

    fn num_classes(&self) -> usize;
}

#[derive(Debug, Clone, PartialEq)]
pub struct TabularDataset {
    name: String,
    columns: Vec<Column>,
    target: Vec<usize>,
    n_classes: usize,
    train_rows: Vec<usize>,
    test_rows: Vec<usize>,
}

impl TabularDataset {
    /// Creates a dataset with a seeded holdout split of
    /// [`DEFAULT_TEST_FRACTION`].
    pub fn new(name: impl Into<String>, columns: Vec<Column>, target: Vec<usize>, n_classes: usize) -> Result<Self> {
        let n_rows = target.len();
        if let Some(bad) = columns.iter().find(|c| c.len() != n_rows) {
            return Err(MetaFeatError::Dataset(format!(
                "column {} has {} rows, target has {}",
                bad.name(),
                bad.len(),
                n_rows
            )));
        }
        if let Some(bad) = target.iter().find(|&&t| t >= n_classes) {
            return Err(MetaFeatError::Dataset(format!(
                "target class {} outside [0, {})",
                bad, n_classes
            )));
        }
        let ds = Self {
            name: name.into(),
            columns,
            target,
            n_classes,
            train_rows: Vec::new(),
            test_rows: Vec::new(),
        };
        ds.with_holdout(DEFAULT_TEST_FRACTION, DEFAULT_SPLIT_SEED)
    }

    /// Re-split rows into train/test with a shuffled holdout.
    pub fn with_holdout(mut self, test_fraction: f64, seed: u64) -> Result<Self> {
        if !(0.0..1.0).contains(&test_fraction) {
            return Err(MetaFeatError::Dataset(format!(
                "test fraction {} outside [0, 1)",
                test_fraction
            )));
        }
        let mut rows: Vec<usize> = (0..self.target.len()).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        rows.shuffle(&mut rng);
        let n_test = (rows.len() as f64 * test_fraction).round() as usize;
        self.test_rows = rows[..n_test].to_vec();
        self.train_rows = rows[n_test..].to_vec();
        self.train_rows.sort_unstable();
        self.test_rows.sort_unstable();
        Ok(self)
    }

    /// Use an explicit partition.
    pub fn with_partition(mut self, train_rows: Vec<usize>, test_rows: Vec<usize>) -> Result<Self> {
        let n = self.target.len();
        if train_rows.iter().chain(test_rows.iter()).any(|&r| r >= n) {
            return Err(MetaFeatError::Dataset("partition references a missing row".to_string()));
        }
        self.train_rows = train_rows;
        self.test_rows = test_rows;
        Ok(self)
    }

    pub fn n_rows(&self) -> usize {
        self.target.len()
    }

    pub fn target(&self) -> &[usize] {
        &self.target
    }

    fn materialize(&self, rows: &[usize]) -> LabeledSet {
        let mut x = Array2::<f64>::zeros((rows.len(), self.columns.len()));
        for (c, column) in self.columns.iter().enumerate() {
            for (r, &row) in rows.iter().enumerate() {
                x[[r, c]] = column.value_at(row);
            }
        }
        LabeledSet {
            feature_names: self.columns.iter().map(|c| c.name().to_string()).collect(),
            x,
            y: rows.iter().map(|&r| self.target[r]).collect(),
            n_classes: self.n_classes,
        }
    }
}

impl Dataset for TabularDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn replicate(&self) -> Self {
        self.clone()
    }

    fn add_column(&mut self, column: Column) -> Result<()> {
        if column.len() != self.target.len() {
            return Err(MetaFeatError::Dataset(format!(
                "column {} has {} rows, dataset {} has {}",
                column.name(),
                column.len(),
                self.name,
                self.target.len()
            )));
        }
        self.columns.push(column);
        Ok(())
    }

    fn columns(&self) -> &[Column] {
        &self.columns
    }

    fn generate_set(&self, is_train: bool) -> Result<LabeledSet> {
        let rows = if is_train { &self.train_rows } else { &self.test_rows };
        if rows.is_empty() {
            return Err(MetaFeatError::Dataset(format!(
                "{} partition of {} is empty",
                if is_train { "train" } else { "test" },
                self.name
            )));
        }
        Ok(self.materialize(rows))
    }

    fn num_classes(&self) -> usize {
        self.n_classes
    }
}
