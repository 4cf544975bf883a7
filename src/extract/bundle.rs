//! Structured key/value input (JSON object) for callers that do not have a
//! typed fitted-model record.

use serde::de::DeserializeOwned;
use serde_json::Value;

use super::fa::FactorSolution;
use super::gm::MixtureFit;
use crate::error::{InterpretError, Result};
use crate::types::ModelType;

pub const FA_KEYS: &[&str] = &[
    "variables",
    "factors",
    "loadings",
    "factor_correlations",
    "Phi",
    "phi",
    "rotation",
];

pub const GM_KEYS: &[&str] = &[
    "variables",
    "cluster_names",
    "means",
    "covariances",
    "proportions",
    "log_likelihood",
    "n_obs",
    "n_parameters",
    "posterior",
    "converged",
    "covariance_model",
];

/// Model type implied by the bundle's keys: `loadings` ⇒ FA, `means` ⇒ GM.
pub fn detect_model_type(bundle: &Value) -> Option<ModelType> {
    let obj = bundle.as_object()?;
    match (obj.contains_key("loadings"), obj.contains_key("means")) {
        (true, false) => Some(ModelType::Fa),
        (false, true) => Some(ModelType::Gm),
        _ => None,
    }
}

pub fn to_factor_solution(bundle: &Value, warnings: &mut Vec<String>) -> Result<FactorSolution> {
    decode(bundle, FA_KEYS, ModelType::Fa, warnings)
}

pub fn to_mixture_fit(bundle: &Value, warnings: &mut Vec<String>) -> Result<MixtureFit> {
    decode(bundle, GM_KEYS, ModelType::Gm, warnings)
}

fn decode<T: DeserializeOwned>(
    bundle: &Value,
    known: &[&str],
    model_type: ModelType,
    warnings: &mut Vec<String>,
) -> Result<T> {
    let obj = bundle.as_object().ok_or_else(|| {
        InterpretError::Extraction("structured input must be a JSON object".to_string())
    })?;

    let unknown: Vec<&str> = obj
        .keys()
        .map(String::as_str)
        .filter(|k| !known.contains(k))
        .collect();
    if !unknown.is_empty() {
        let msg = format!(
            "Ignoring unrecognized {} input keys: {}",
            model_type.as_str().to_uppercase(),
            unknown.join(", ")
        );
        warnings.push(msg);
    }

    serde_json::from_value(bundle.clone()).map_err(|e| {
        InterpretError::Extraction(format!(
            "structured {} input is malformed: {e}",
            model_type.as_str().to_uppercase()
        ))
    })
}
