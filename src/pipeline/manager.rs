use tracing::{debug, info};

use crate::config::MetaFeatConfig;
use crate::data::dataset::Dataset;
use crate::data::matrix::FeatureMatrix;
use crate::error::Result;
use crate::pipeline::assembler::{AssembledTrainingSet, TrainingSetAssembler};
use crate::pipeline::collaborators::Collaborators;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOutcome {
    Written,
    /// A binary artifact already existed and was left untouched.
    AlreadyPresent,
}

/// Persistence of per-dataset matrices.
pub trait MatrixStore: Send + Sync {
    /// `Ok(None)` on a miss, including an unreadable artifact.
    fn load(&self, dataset: &str) -> Result<Option<FeatureMatrix>>;

    fn store(&self, dataset: &str, matrix: &FeatureMatrix) -> Result<StoreOutcome>;
}

/// Where a dataset's matrix came from.
#[derive(Debug, Clone)]
pub enum DatasetInstances {
    Cached(FeatureMatrix),
    Generated(AssembledTrainingSet),
}

impl DatasetInstances {
    pub fn matrix(&self) -> &FeatureMatrix {
        match self {
            DatasetInstances::Cached(m) => m,
            DatasetInstances::Generated(set) => &set.matrix,
        }
    }

    pub fn into_matrix(self) -> FeatureMatrix {
        match self {
            DatasetInstances::Cached(m) => m,
            DatasetInstances::Generated(set) => set.matrix,
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self, DatasetInstances::Cached(_))
    }
}

/// Load-or-generate front of the candidate attribute pipeline.
pub struct CandidateAttributeManager<'a, D: Dataset, S: MatrixStore> {
    config: &'a MetaFeatConfig,
    collaborators: Collaborators<'a, D>,
    store: &'a S,
}

impl<'a, D: Dataset, S: MatrixStore> CandidateAttributeManager<'a, D, S> {
    pub fn new(config: &'a MetaFeatConfig, collaborators: Collaborators<'a, D>, store: &'a S) -> Self {
        Self {
            config,
            collaborators,
            store,
        }
    }

    /// Cached matrix for `dataset`, generating and storing it on a miss.
    pub fn dataset_instances(&self, dataset: &D) -> Result<FeatureMatrix> {
        self.load_or_generate(dataset).map(DatasetInstances::into_matrix)
    }

    pub fn load_or_generate(&self, dataset: &D) -> Result<DatasetInstances> {
        if let Some(matrix) = self.store.load(dataset.name())? {
            debug!(dataset = dataset.name(), rows = matrix.n_rows(), "using cached candidate matrix");
            return Ok(DatasetInstances::Cached(matrix));
        }

        let assembled = TrainingSetAssembler::new(self.config, self.collaborators).assemble(dataset)?;
        let outcome = self.store.store(dataset.name(), &assembled.matrix)?;
        info!(dataset = dataset.name(), ?outcome, "candidate matrix generated");
        Ok(DatasetInstances::Generated(assembled))
    }
}
