pub mod base_model;
pub mod decision_tree;
pub mod random_forest;
pub mod svm;

pub use base_model::{Classifier, ClassifierKind, ClassifierParams};
pub use decision_tree::DecisionTree;
pub use random_forest::RandomForest;
pub use svm::LinearSvm;
