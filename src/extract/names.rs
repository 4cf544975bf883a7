//! Strict reconciliation of model variable names against the metadata table.

use std::collections::HashSet;

use crate::error::{InterpretError, Result};
use crate::types::VariableMetadata;

/// Check that the model's variables and the metadata describe the same set.
///
/// Any leftover on either side fails with both lists in model / metadata
/// order; nothing is silently dropped.
pub fn reconcile(model_vars: &[String], metadata: &VariableMetadata) -> Result<()> {
    let model_set: HashSet<&str> = model_vars.iter().map(String::as_str).collect();

    let model_only: Vec<String> = model_vars
        .iter()
        .filter(|v| !metadata.contains(v))
        .cloned()
        .collect();
    let metadata_only: Vec<String> = metadata
        .names()
        .filter(|v| !model_set.contains(v))
        .map(str::to_string)
        .collect();

    if model_only.is_empty() && metadata_only.is_empty() {
        return Ok(());
    }

    Err(InterpretError::VariableMismatch {
        model_only,
        metadata_only,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(xs: &[&str]) -> Vec<String> {
        xs.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_exact_match_passes() {
        let meta = VariableMetadata::from_pairs([("A", "a"), ("B", "b")]).unwrap();
        assert!(reconcile(&vars(&["B", "A"]), &meta).is_ok());
    }

    #[test]
    fn test_partial_mismatch_names_both_sides() {
        let meta =
            VariableMetadata::from_pairs([("B", "b"), ("C", "c"), ("D", "d")]).unwrap();
        let err = reconcile(&vars(&["A", "B", "C"]), &meta).unwrap_err();
        match err {
            InterpretError::VariableMismatch {
                model_only,
                metadata_only,
            } => {
                assert_eq!(model_only, vec!["A"]);
                assert_eq!(metadata_only, vec!["D"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_disjoint_sets_fail() {
        let meta = VariableMetadata::from_pairs([("X", "x")]).unwrap();
        assert!(reconcile(&vars(&["A"]), &meta).is_err());
    }
}
