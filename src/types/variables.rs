use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ValidationError;

/// One row of the variable metadata table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableInfo {
    /// Variable identifier as it appears in the model
    pub variable: String,
    /// Human-readable description shown to the LLM
    pub description: String,
}

impl VariableInfo {
    pub fn new(variable: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            variable: variable.into(),
            description: description.into(),
        }
    }
}

/// Variable → description lookup supplied by the caller.
///
/// Construction rejects empty tables, blank names or descriptions, and
/// duplicate variable names. Row order is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<VariableInfo>", into = "Vec<VariableInfo>")]
pub struct VariableMetadata {
    rows: Vec<VariableInfo>,
}

impl VariableMetadata {
    pub fn new(rows: Vec<VariableInfo>) -> Result<Self, ValidationError> {
        if rows.is_empty() {
            return Err(ValidationError::invalid(
                "variable_metadata",
                "must contain at least one row with 'variable' and 'description'",
            ));
        }

        let mut seen = HashSet::new();
        for (i, row) in rows.iter().enumerate() {
            if row.variable.trim().is_empty() {
                return Err(ValidationError::invalid(
                    "variable_metadata",
                    format!("row {} has an empty 'variable' name", i + 1),
                ));
            }
            if row.description.trim().is_empty() {
                return Err(ValidationError::invalid(
                    "variable_metadata",
                    format!("variable '{}' has an empty 'description'", row.variable),
                ));
            }
            if !seen.insert(row.variable.as_str()) {
                return Err(ValidationError::invalid(
                    "variable_metadata",
                    format!("variable '{}' appears more than once", row.variable),
                ));
            }
        }

        Ok(Self { rows })
    }

    /// Build from `(variable, description)` pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| VariableInfo::new(k, v))
                .collect(),
        )
    }

    pub fn description(&self, variable: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.variable == variable)
            .map(|r| r.description.as_str())
    }

    pub fn contains(&self, variable: &str) -> bool {
        self.rows.iter().any(|r| r.variable == variable)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|r| r.variable.as_str())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, VariableInfo> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl TryFrom<Vec<VariableInfo>> for VariableMetadata {
    type Error = ValidationError;

    fn try_from(rows: Vec<VariableInfo>) -> Result<Self, Self::Error> {
        Self::new(rows)
    }
}

impl From<VariableMetadata> for Vec<VariableInfo> {
    fn from(meta: VariableMetadata) -> Self {
        meta.rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_preserves_order() {
        let meta = VariableMetadata::from_pairs([("b", "Second"), ("a", "First")]).unwrap();
        assert_eq!(meta.names().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(meta.description("a"), Some("First"));
        assert_eq!(meta.description("z"), None);
    }

    #[test]
    fn test_rejects_duplicates_and_blanks() {
        assert!(VariableMetadata::from_pairs([("a", "x"), ("a", "y")]).is_err());
        assert!(VariableMetadata::from_pairs([("a", "  ")]).is_err());
        assert!(VariableMetadata::from_pairs(Vec::<(String, String)>::new()).is_err());
    }

    #[test]
    fn test_deserialize_requires_columns() {
        let ok: Result<VariableMetadata, _> =
            serde_json::from_str(r#"[{"variable": "v1", "description": "Enjoys parties"}]"#);
        assert!(ok.is_ok());

        let missing: Result<VariableMetadata, _> =
            serde_json::from_str(r#"[{"variable": "v1"}]"#);
        assert!(missing.is_err());
    }
}
