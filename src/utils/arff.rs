//! Plain-text ARFF form of a [`FeatureMatrix`].
//!
//! Only the subset the pipeline writes is supported: numeric and nominal
//! attributes, dense `@data` rows, `?` for missing values.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::Array2;

use crate::data::matrix::{ColumnDescriptor, ColumnKind, FeatureMatrix};
use crate::error::{MetaFeatError, Result};

const MISSING: &str = "?";

pub fn write_arff<W: Write>(matrix: &FeatureMatrix, out: &mut W) -> Result<()> {
    writeln!(out, "@relation {}", matrix.relation())?;
    writeln!(out)?;
    for column in matrix.columns() {
        match &column.kind {
            ColumnKind::Real => writeln!(out, "@attribute {} numeric", column.name)?,
            ColumnKind::Categorical { levels } => {
                writeln!(out, "@attribute {} {{{}}}", column.name, levels.join(","))?
            }
        }
    }
    writeln!(out)?;
    writeln!(out, "@data")?;

    for row in matrix.data().rows() {
        let cells: Vec<String> = row
            .iter()
            .zip(matrix.columns())
            .map(|(&v, column)| format_cell(v, &column.kind))
            .collect();
        writeln!(out, "{}", cells.join(","))?;
    }
    Ok(())
}

pub fn write_arff_file(matrix: &FeatureMatrix, path: impl AsRef<Path>) -> Result<()> {
    let mut out = BufWriter::new(File::create(path)?);
    write_arff(matrix, &mut out)?;
    out.flush()?;
    Ok(())
}

fn format_cell(value: f64, kind: &ColumnKind) -> String {
    if value.is_nan() {
        return MISSING.to_string();
    }
    match kind {
        ColumnKind::Real => value.to_string(),
        ColumnKind::Categorical { levels } => levels
            .get(value as usize)
            .cloned()
            .unwrap_or_else(|| MISSING.to_string()),
    }
}

pub fn read_arff(text: &str) -> Result<FeatureMatrix> {
    let mut relation = String::new();
    let mut columns: Vec<ColumnDescriptor> = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    let mut in_data = false;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('%') {
            continue;
        }

        if in_data {
            rows.push(parse_row(line, &columns, line_no)?);
            continue;
        }

        let lower = line.to_ascii_lowercase();
        if lower.starts_with("@relation") {
            relation = line["@relation".len()..].trim().to_string();
        } else if lower.starts_with("@attribute") {
            columns.push(parse_attribute(&line["@attribute".len()..], line_no)?);
        } else if lower.starts_with("@data") {
            in_data = true;
        } else {
            return Err(MetaFeatError::ArffParse {
                line: line_no,
                reason: format!("unexpected header line: {}", line),
            });
        }
    }

    if !in_data {
        return Err(MetaFeatError::ArffParse {
            line: text.lines().count(),
            reason: "missing @data section".to_string(),
        });
    }

    let n_cols = columns.len();
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    let data = Array2::from_shape_vec((flat.len() / n_cols.max(1), n_cols), flat)
        .map_err(|e| MetaFeatError::Dataset(e.to_string()))?;
    FeatureMatrix::new(relation, columns, data)
}

pub fn read_arff_file(path: impl AsRef<Path>) -> Result<FeatureMatrix> {
    let text = std::fs::read_to_string(path)?;
    read_arff(&text)
}

fn parse_attribute(rest: &str, line: usize) -> Result<ColumnDescriptor> {
    let rest = rest.trim();
    let split = rest.find(char::is_whitespace).ok_or_else(|| MetaFeatError::ArffParse {
        line,
        reason: "attribute without a type".to_string(),
    })?;
    let (name, kind) = rest.split_at(split);
    let kind = kind.trim();

    if kind.starts_with('{') && kind.ends_with('}') {
        let levels = kind[1..kind.len() - 1]
            .split(',')
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();
        return Ok(ColumnDescriptor {
            name: name.to_string(),
            kind: ColumnKind::Categorical { levels },
        });
    }
    match kind.to_ascii_lowercase().as_str() {
        "numeric" | "real" | "integer" => Ok(ColumnDescriptor::real(name)),
        other => Err(MetaFeatError::UnsupportedColumnType(format!(
            "attribute {} has type {}",
            name, other
        ))),
    }
}

fn parse_row(line: &str, columns: &[ColumnDescriptor], line_no: usize) -> Result<Vec<f64>> {
    let cells: Vec<&str> = line.split(',').map(str::trim).collect();
    if cells.len() != columns.len() {
        return Err(MetaFeatError::ArffParse {
            line: line_no,
            reason: format!("expected {} values, found {}", columns.len(), cells.len()),
        });
    }
    cells
        .iter()
        .zip(columns)
        .map(|(&cell, column)| {
            if cell == MISSING {
                return Ok(f64::NAN);
            }
            match &column.kind {
                ColumnKind::Real => cell.parse::<f64>().map_err(|_| MetaFeatError::ArffParse {
                    line: line_no,
                    reason: format!("{} is not numeric", cell),
                }),
                ColumnKind::Categorical { levels } => levels
                    .iter()
                    .position(|l| l == cell)
                    .map(|p| p as f64)
                    .ok_or_else(|| MetaFeatError::ArffParse {
                        line: line_no,
                        reason: format!("{} is not a level of {}", cell, column.name),
                    }),
            }
        })
        .collect()
}

/// Attribute and data-row counts of an ARFF file, read without parsing values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArffShape {
    pub attributes: usize,
    pub rows: usize,
}

impl ArffShape {
    pub fn is_empty(&self) -> bool {
        self.attributes == 0 || self.rows == 0
    }
}

pub fn arff_shape(source: impl AsRef<Path>) -> Result<ArffShape> {
    let reader = BufReader::new(File::open(source)?);
    let mut shape = ArffShape { attributes: 0, rows: 0 };
    let mut in_data = false;
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() || line.starts_with('%') {
            continue;
        }
        if in_data {
            shape.rows += 1;
        } else if line.to_ascii_lowercase().starts_with("@attribute") {
            shape.attributes += 1;
        } else if line.eq_ignore_ascii_case("@data") {
            in_data = true;
        }
    }
    Ok(shape)
}

/// Append `source` to `target`. With `include_header` the whole file is
/// copied; otherwise only the lines after `@data`.
pub fn append_arff<W: Write>(target: &mut W, source: impl AsRef<Path>, include_header: bool) -> Result<()> {
    let reader = BufReader::new(File::open(source)?);
    let mut past_header = include_header;
    for line in reader.lines() {
        let line = line?;
        if past_header {
            if !line.trim().is_empty() {
                writeln!(target, "{}", line)?;
            }
        } else if line.trim().eq_ignore_ascii_case("@data") {
            past_header = true;
        }
    }
    Ok(())
}
