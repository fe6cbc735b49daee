pub mod assembler;
pub mod candidate;
pub mod collaborators;
pub mod manager;

pub use assembler::{AssembledTrainingSet, FailureSummary, TrainingSetAssembler};
pub use candidate::{label_for_aucs, label_for_delta, CandidateEvaluator, RetryPolicy, IMPROVEMENT_THRESHOLD};
pub use collaborators::{
    CandidateFeatureExtractor, Collaborators, DatasetFeatureExtractor, ModelEvaluator, OperatorAssignment,
    OperatorCatalogue, TrainTestEvaluator,
};
pub use manager::{CandidateAttributeManager, DatasetInstances, MatrixStore, StoreOutcome};
