//! Error types shared across the interpretation pipeline.
//!
//! Validation and extraction problems abort a call with a message that names
//! the offending parameter or variables. Provider errors are carried through
//! untouched. Malformed LLM output is never an error: the response parser
//! degrades to placeholder text instead.

use std::path::PathBuf;
use thiserror::Error;

use crate::llm::LlmError;
use crate::types::ModelType;

/// Crate-wide result alias.
pub type Result<T, E = InterpretError> = std::result::Result<T, E>;

/// A parameter or input field that failed validation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Value has the wrong type for the parameter
    #[error("parameter '{name}' must be {expected}, got {got}")]
    Type {
        name: String,
        expected: &'static str,
        got: String,
    },

    /// Numeric value outside the registered range
    #[error("parameter '{name}' = {value} is out of range (must be {constraint})")]
    Range {
        name: String,
        value: String,
        constraint: String,
    },

    /// Character value not in the allowed set
    #[error("parameter '{name}' = '{value}' is not allowed (expected one of: {allowed})")]
    NotAllowed {
        name: String,
        value: String,
        allowed: String,
    },

    /// Required parameter absent or null
    #[error("required parameter '{name}' is missing")]
    Missing { name: String },

    /// Model-specific parameter supplied for another model type
    #[error("parameter '{name}' does not apply to {model_type} interpretations")]
    NotApplicable { name: String, model_type: ModelType },

    /// Any other field-level problem (metadata tables, input records)
    #[error("{field}: {message}")]
    Invalid { field: String, message: String },
}

impl ValidationError {
    /// Name of the parameter or field this error is about.
    pub fn field(&self) -> &str {
        match self {
            Self::Type { name, .. }
            | Self::Range { name, .. }
            | Self::NotAllowed { name, .. }
            | Self::Missing { name }
            | Self::NotApplicable { name, .. } => name,
            Self::Invalid { field, .. } => field,
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors returned by extraction, configuration, orchestration and export.
#[derive(Error, Debug)]
pub enum InterpretError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Model variables and metadata variables do not line up
    #[error("{}", mismatch_message(.model_only, .metadata_only))]
    VariableMismatch {
        model_only: Vec<String>,
        metadata_only: Vec<String>,
    },

    /// Model object or structured input is missing expected structure
    #[error("extraction failed: {0}")]
    Extraction(String),

    /// Neither a model input nor pre-extracted analysis data was supplied
    #[error("no model input or analysis data supplied: pass a fitted model, a loading matrix, a structured bundle or pre-built analysis data")]
    MissingInput,

    #[error("model type conflict: {0}")]
    ModelTypeConflict(String),

    #[error("{0} interpretation is not yet implemented")]
    NotImplemented(ModelType),

    /// Provider / transport failure, passed through unmodified
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error("export failed: {0}")]
    Export(String),

    #[error("I/O error ({}): {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn mismatch_message(model_only: &[String], metadata_only: &[String]) -> String {
    let mut parts = Vec::new();
    if !model_only.is_empty() {
        parts.push(format!(
            "variables in the model but missing from the metadata: {}",
            model_only.join(", ")
        ));
    }
    if !metadata_only.is_empty() {
        parts.push(format!(
            "variables in the metadata but missing from the model: {}",
            metadata_only.join(", ")
        ));
    }
    if parts.is_empty() {
        return "no variable names match between the model and the metadata".to_string();
    }
    format!("variable names do not match; {}", parts.join("; "))
}
