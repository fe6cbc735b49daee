//! Attribute-selection meta learning for automated feature engineering.
//!
//! Candidate attributes of a dataset are evaluated against a baseline
//! classifier, described by meta-features and labeled by whether they
//! improve AUC. The labeled rows are cached per dataset and pooled across
//! datasets into a background model that scores new candidates.

pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod storage;
pub mod utils;

#[cfg(feature = "python")]
mod python;

pub use config::{ExclusionPolicy, MetaFeatConfig};
pub use data::{AttributeInfo, AttributeRow, ColumnType, Dataset, FeatureMatrix, FeatureMatrixBuilder, TabularDataset};
pub use error::{MetaFeatError, Result};
pub use models::{Classifier, ClassifierKind};
pub use pipeline::{
    CandidateAttributeManager, CandidateEvaluator, Collaborators, FailureSummary, MatrixStore, TrainingSetAssembler,
};
pub use storage::{BackgroundModel, BackgroundModelBuilder, InstanceMatrixCache};
