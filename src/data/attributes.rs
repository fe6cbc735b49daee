use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{MetaFeatError, Result};

/// Column kind of a single meta-feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Numeric,
    Discrete,
    String,
    Date,
}

impl FromStr for ColumnType {
    type Err = MetaFeatError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "numeric" | "real" | "integer" => Ok(ColumnType::Numeric),
            "discrete" | "nominal" => Ok(ColumnType::Discrete),
            "string" => Ok(ColumnType::String),
            "date" => Ok(ColumnType::Date),
            other => Err(MetaFeatError::UnsupportedColumnType(other.to_string())),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Numeric => "numeric",
            ColumnType::Discrete => "discrete",
            ColumnType::String => "string",
            ColumnType::Date => "date",
        };
        f.write_str(name)
    }
}

/// Raw stored value of an attribute. Numeric attributes may hold either
/// integer or real storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AttributeValue {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            AttributeValue::Integer(v) => Some(*v as f64),
            AttributeValue::Real(v) => Some(*v),
            AttributeValue::Text(_) => None,
        }
    }
}

/// One cell of a candidate feature row. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeInfo {
    name: String,
    column_type: ColumnType,
    value: AttributeValue,
    cardinality: usize,
}

impl AttributeInfo {
    pub fn numeric(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Numeric,
            value: AttributeValue::Real(value),
            cardinality: 0,
        }
    }

    pub fn numeric_int(name: impl Into<String>, value: i64) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Numeric,
            value: AttributeValue::Integer(value),
            cardinality: 0,
        }
    }

    /// Discrete attribute; `value` must lie in `[0, cardinality)`.
    pub fn discrete(name: impl Into<String>, value: usize, cardinality: usize) -> Result<Self> {
        let name = name.into();
        if value >= cardinality {
            return Err(MetaFeatError::InvalidAttribute {
                name,
                reason: format!("value {} outside [0, {})", value, cardinality),
            });
        }
        Ok(Self {
            name,
            column_type: ColumnType::Discrete,
            value: AttributeValue::Integer(value as i64),
            cardinality,
        })
    }

    pub fn string(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::String,
            value: AttributeValue::Text(value.into()),
            cardinality: 0,
        }
    }

    pub fn date(name: impl Into<String>, epoch_millis: i64) -> Self {
        Self {
            name: name.into(),
            column_type: ColumnType::Date,
            value: AttributeValue::Integer(epoch_millis),
            cardinality: 0,
        }
    }

    /// Escape hatch for extractors that assemble cells from untyped sources.
    /// No range check is applied; the matrix builder counts bad cells.
    pub fn raw(
        name: impl Into<String>,
        column_type: ColumnType,
        value: AttributeValue,
        cardinality: usize,
    ) -> Self {
        Self {
            name: name.into(),
            column_type,
            value,
            cardinality,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    pub fn value(&self) -> &AttributeValue {
        &self.value
    }

    pub fn cardinality(&self) -> usize {
        self.cardinality
    }
}

/// Candidate feature row: dense positional index -> cell.
pub type AttributeRow = BTreeMap<usize, AttributeInfo>;

/// Append `info` at the next free index of `row`.
pub fn push_attribute(row: &mut AttributeRow, info: AttributeInfo) {
    let next = row.len();
    row.insert(next, info);
}

/// Append every cell of `tail`, in index order, after the cells of `row`.
pub fn extend_row(row: &mut AttributeRow, tail: &AttributeRow) {
    for info in tail.values() {
        push_attribute(row, info.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discrete_rejects_out_of_range_values() {
        assert!(AttributeInfo::discrete("cls", 0, 2).is_ok());
        assert!(AttributeInfo::discrete("cls", 1, 2).is_ok());
        let err = AttributeInfo::discrete("cls", 2, 2).unwrap_err();
        assert!(matches!(err, MetaFeatError::InvalidAttribute { .. }));
        assert!(AttributeInfo::discrete("empty", 0, 0).is_err());
    }

    #[test]
    fn column_type_parsing() {
        assert_eq!("REAL".parse::<ColumnType>().unwrap(), ColumnType::Numeric);
        assert_eq!("date".parse::<ColumnType>().unwrap(), ColumnType::Date);
        assert!(matches!(
            "relational".parse::<ColumnType>(),
            Err(MetaFeatError::UnsupportedColumnType(_))
        ));
    }

    #[test]
    fn push_and_extend_keep_indices_dense() {
        let mut row = AttributeRow::new();
        push_attribute(&mut row, AttributeInfo::numeric("a", 1.0));
        let mut tail = AttributeRow::new();
        push_attribute(&mut tail, AttributeInfo::numeric_int("b", 3));
        push_attribute(&mut tail, AttributeInfo::string("c", "x"));
        extend_row(&mut row, &tail);

        let keys: Vec<usize> = row.keys().copied().collect();
        assert_eq!(keys, vec![0, 1, 2]);
        assert_eq!(row[&2].name(), "c");
    }
}
