//! Turns candidate feature rows into a rectangular numeric/categorical matrix.

use ndarray::{s, Array2, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::data::attributes::{AttributeInfo, AttributeRow, AttributeValue, ColumnType};
use crate::error::{MetaFeatError, Result};

pub const DEFAULT_RELATION: &str = "trainingSet";

/// Encoding of one matrix column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnKind {
    Real,
    /// Values are stored as level indices.
    Categorical { levels: Vec<String> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,
    pub kind: ColumnKind,
}

impl ColumnDescriptor {
    pub fn real(name: impl Into<String>) -> Self {
        Self { name: name.into(), kind: ColumnKind::Real }
    }

    pub fn categorical(name: impl Into<String>, cardinality: usize) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Categorical {
                levels: (0..cardinality).map(|j| j.to_string()).collect(),
            },
        }
    }

    pub fn cardinality(&self) -> Option<usize> {
        match &self.kind {
            ColumnKind::Real => None,
            ColumnKind::Categorical { levels } => Some(levels.len()),
        }
    }
}

/// Homogeneous training matrix. The last column is the label when the
/// matrix was produced by the assembler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    relation: String,
    columns: Vec<ColumnDescriptor>,
    data: Array2<f64>,
    #[serde(default)]
    coercion_failures: usize,
}

impl FeatureMatrix {
    pub fn new(relation: impl Into<String>, columns: Vec<ColumnDescriptor>, data: Array2<f64>) -> Result<Self> {
        if data.ncols() != columns.len() {
            return Err(MetaFeatError::Dataset(format!(
                "matrix has {} columns but schema declares {}",
                data.ncols(),
                columns.len()
            )));
        }
        Ok(Self {
            relation: relation.into(),
            columns,
            data,
            coercion_failures: 0,
        })
    }

    pub fn empty() -> Self {
        Self {
            relation: DEFAULT_RELATION.to_string(),
            columns: Vec::new(),
            data: Array2::zeros((0, 0)),
            coercion_failures: 0,
        }
    }

    pub fn relation(&self) -> &str {
        &self.relation
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    pub fn n_rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.data.row(i)
    }

    /// Cells that could not be coerced and were left at zero.
    pub fn coercion_failures(&self) -> usize {
        self.coercion_failures
    }

    /// All columns except the last one.
    pub fn features(&self) -> ArrayView2<'_, f64> {
        let end = self.columns.len().saturating_sub(1);
        self.data.slice(s![.., ..end])
    }

    /// Last column read as class codes.
    pub fn label_codes(&self) -> Vec<usize> {
        match self.columns.len() {
            0 => Vec::new(),
            n => self.data.column(n - 1).iter().map(|v| v.max(0.0) as usize).collect(),
        }
    }

    /// Number of label levels, or 0 when the last column is not categorical.
    pub fn label_cardinality(&self) -> usize {
        self.columns.last().and_then(|c| c.cardinality()).unwrap_or(0)
    }
}

/// Why a single cell fell back to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoercionFailure {
    /// The cell's kind differs from the column kind fixed by row 0.
    TypeMismatch,
    NonNumeric,
    OutOfRange,
}

/// Schema entry: which row index feeds which matrix column.
struct SchemaColumn {
    source_index: usize,
    descriptor: ColumnDescriptor,
}

#[derive(Debug, Clone)]
pub struct FeatureMatrixBuilder {
    relation: String,
}

impl Default for FeatureMatrixBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_RELATION)
    }
}

impl FeatureMatrixBuilder {
    pub fn new(relation: impl Into<String>) -> Self {
        Self { relation: relation.into() }
    }

    /// Single-sample overload of [`FeatureMatrixBuilder::build`].
    pub fn build_single(&self, row: &AttributeRow) -> Result<FeatureMatrix> {
        self.build(std::slice::from_ref(row))
    }

    pub fn build(&self, rows: &[AttributeRow]) -> Result<FeatureMatrix> {
        let first = match rows.first() {
            Some(first) => first,
            None => {
                let mut empty = FeatureMatrix::empty();
                empty.relation = self.relation.clone();
                return Ok(empty);
            }
        };
        let schema = infer_schema(first)?;

        let mut data = Array2::<f64>::zeros((rows.len(), schema.len()));
        let mut failures = 0usize;
        for (r, row) in rows.iter().enumerate() {
            for (c, column) in schema.iter().enumerate() {
                let Some(cell) = row.get(&column.source_index) else {
                    continue;
                };
                match coerce(cell, &column.descriptor.kind) {
                    Ok(v) => data[[r, c]] = v,
                    Err(reason) => {
                        failures += 1;
                        debug!(row = r, column = %column.descriptor.name, attribute = cell.name(), ?reason, "cell coercion failed");
                    }
                }
            }
        }
        if failures > 0 {
            warn!(failures, rows = rows.len(), "zero-filled cells that could not be coerced");
        }

        Ok(FeatureMatrix {
            relation: self.relation.clone(),
            columns: schema.into_iter().map(|c| c.descriptor).collect(),
            data,
            coercion_failures: failures,
        })
    }
}

/// Build a matrix with the default relation name.
pub fn build_matrix(rows: &[AttributeRow]) -> Result<FeatureMatrix> {
    FeatureMatrixBuilder::default().build(rows)
}

fn infer_schema(first: &AttributeRow) -> Result<Vec<SchemaColumn>> {
    let mut schema = Vec::with_capacity(first.len());
    for (&index, info) in first {
        let descriptor = match info.column_type() {
            ColumnType::Numeric => ColumnDescriptor::real(index.to_string()),
            ColumnType::Discrete => {
                if info.cardinality() == 0 {
                    return Err(MetaFeatError::UnsupportedColumnType(format!(
                        "discrete attribute {} declares no levels",
                        info.name()
                    )));
                }
                ColumnDescriptor::categorical(index.to_string(), info.cardinality())
            }
            // No encoding for raw strings or dates; they are left out.
            ColumnType::String | ColumnType::Date => continue,
        };
        schema.push(SchemaColumn { source_index: index, descriptor });
    }
    Ok(schema)
}

fn coerce(cell: &AttributeInfo, kind: &ColumnKind) -> std::result::Result<f64, CoercionFailure> {
    match kind {
        ColumnKind::Real => {
            if cell.column_type() != ColumnType::Numeric {
                return Err(CoercionFailure::TypeMismatch);
            }
            cell.value().as_f64().ok_or(CoercionFailure::NonNumeric)
        }
        ColumnKind::Categorical { levels } => match cell.value() {
            AttributeValue::Integer(code) if *code >= 0 && (*code as usize) < levels.len() => Ok(*code as f64),
            AttributeValue::Integer(_) => Err(CoercionFailure::OutOfRange),
            _ => Err(CoercionFailure::NonNumeric),
        },
    }
}
