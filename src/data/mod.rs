pub mod attributes;
pub mod dataset;
pub mod matrix;

pub use attributes::{push_attribute, AttributeInfo, AttributeRow, AttributeValue, ColumnType};
pub use dataset::{Column, ColumnValues, Dataset, LabeledSet, TabularDataset};
pub use matrix::{build_matrix, ColumnDescriptor, ColumnKind, FeatureMatrix, FeatureMatrixBuilder};
