use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Dense numeric matrix with labelled rows and columns.
///
/// Used for loadings (variable × factor), cluster means (variable × cluster)
/// and factor correlations (factor × factor). All values are finite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawLabeledMatrix")]
pub struct LabeledMatrix {
    rows: Vec<String>,
    cols: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl LabeledMatrix {
    /// Build a matrix, checking shape, label uniqueness and finiteness.
    ///
    /// The error string names the offending row or label.
    pub fn new(
        rows: Vec<String>,
        cols: Vec<String>,
        values: Vec<Vec<f64>>,
    ) -> Result<Self, String> {
        if rows.is_empty() || cols.is_empty() {
            return Err("matrix must have at least one row and one column".to_string());
        }
        if values.len() != rows.len() {
            return Err(format!(
                "matrix has {} rows of values but {} row labels",
                values.len(),
                rows.len()
            ));
        }
        for (label, row) in rows.iter().zip(&values) {
            if row.len() != cols.len() {
                return Err(format!(
                    "row '{label}' has {} values, expected {}",
                    row.len(),
                    cols.len()
                ));
            }
            if let Some(bad) = row.iter().find(|v| !v.is_finite()) {
                return Err(format!("row '{label}' contains a non-finite value ({bad})"));
            }
        }
        if let Some(dup) = first_duplicate(&rows) {
            return Err(format!("row label '{dup}' appears more than once"));
        }
        if let Some(dup) = first_duplicate(&cols) {
            return Err(format!("column label '{dup}' appears more than once"));
        }

        Ok(Self { rows, cols, values })
    }

    pub fn row_labels(&self) -> &[String] {
        &self.rows
    }

    pub fn col_labels(&self) -> &[String] {
        &self.cols
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.cols.len()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.values[row][col]
    }

    pub fn row(&self, row: usize) -> &[f64] {
        &self.values[row]
    }

    pub fn column(&self, col: usize) -> Vec<f64> {
        self.values.iter().map(|r| r[col]).collect()
    }

    pub fn col_index(&self, label: &str) -> Option<usize> {
        self.cols.iter().position(|c| c == label)
    }

    pub fn row_index(&self, label: &str) -> Option<usize> {
        self.rows.iter().position(|r| r == label)
    }

    pub fn is_square(&self) -> bool {
        self.rows.len() == self.cols.len()
    }
}

/// Serialized form; deserialization goes through [`LabeledMatrix::new`].
#[derive(Deserialize)]
struct RawLabeledMatrix {
    rows: Vec<String>,
    cols: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl TryFrom<RawLabeledMatrix> for LabeledMatrix {
    type Error = String;

    fn try_from(raw: RawLabeledMatrix) -> Result<Self, Self::Error> {
        Self::new(raw.rows, raw.cols, raw.values)
    }
}

fn first_duplicate(labels: &[String]) -> Option<&str> {
    let mut seen = HashSet::new();
    labels
        .iter()
        .find(|l| !seen.insert(l.as_str()))
        .map(String::as_str)
}
