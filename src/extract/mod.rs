//! Analysis-data extraction
//!
//! Adapters that pull the numeric structures out of a fitted model record,
//! a bare loading matrix or a structured bundle, and check them against
//! the variable metadata:
//!
//! - [`fa`]: loadings, factor correlations, emergency rule, cross-loadings
//! - [`gm`]: means, covariances, proportions, fit statistics
//! - [`bundle`]: key/value input with model-type detection
//! - [`names`]: strict variable-name reconciliation

pub mod bundle;
pub mod fa;
pub mod gm;
pub mod names;

pub use fa::{CrossLoading, FaAnalysisData, FactorSolution, FactorSummary, FactorVariable};
pub use gm::{
    ClusterSeparation, CovarianceModel, DistinguishingVariable, FitStatistics, GmAnalysisData,
    MixtureFit,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::InterpretationArgs;
use crate::error::{InterpretError, Result};
use crate::types::{LabeledMatrix, ModelType, VariableMetadata};

// ============================================================================
// Inputs
// ============================================================================

/// Anything extraction can read a model from.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelInput {
    FactorSolution(FactorSolution),
    /// Variable × factor loadings without rotation details
    LoadingMatrix(LabeledMatrix),
    MixtureFit(MixtureFit),
    /// JSON object keyed like [`FactorSolution`] or [`MixtureFit`]
    Bundle(serde_json::Value),
}

impl ModelInput {
    /// Model type implied by the input's shape, if unambiguous.
    pub fn detect_model_type(&self) -> Option<ModelType> {
        match self {
            Self::FactorSolution(_) | Self::LoadingMatrix(_) => Some(ModelType::Fa),
            Self::MixtureFit(_) => Some(ModelType::Gm),
            Self::Bundle(v) => bundle::detect_model_type(v),
        }
    }
}

impl From<FactorSolution> for ModelInput {
    fn from(s: FactorSolution) -> Self {
        Self::FactorSolution(s)
    }
}

impl From<MixtureFit> for ModelInput {
    fn from(f: MixtureFit) -> Self {
        Self::MixtureFit(f)
    }
}

impl From<LabeledMatrix> for ModelInput {
    fn from(m: LabeledMatrix) -> Self {
        Self::LoadingMatrix(m)
    }
}

// ============================================================================
// Analysis data
// ============================================================================

/// Model-specific numeric record the prompt is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "analysis_type", rename_all = "lowercase")]
pub enum AnalysisData {
    Fa(FaAnalysisData),
    Gm(GmAnalysisData),
}

impl AnalysisData {
    pub fn model_type(&self) -> ModelType {
        match self {
            Self::Fa(_) => ModelType::Fa,
            Self::Gm(_) => ModelType::Gm,
        }
    }

    /// Factor or cluster names in canonical order.
    pub fn component_names(&self) -> Vec<String> {
        match self {
            Self::Fa(d) => d.factor_names(),
            Self::Gm(d) => d.cluster_names(),
        }
    }

    pub fn variable_names(&self) -> &[String] {
        match self {
            Self::Fa(d) => d.variables(),
            Self::Gm(d) => d.variables(),
        }
    }

    pub fn as_fa(&self) -> Option<&FaAnalysisData> {
        match self {
            Self::Fa(d) => Some(d),
            Self::Gm(_) => None,
        }
    }

    pub fn as_gm(&self) -> Option<&GmAnalysisData> {
        match self {
            Self::Gm(d) => Some(d),
            Self::Fa(_) => None,
        }
    }

    /// Check pre-built analysis data against the metadata.
    pub fn reconcile(&self, metadata: &VariableMetadata) -> Result<()> {
        names::reconcile(self.variable_names(), metadata)
    }

    /// Per-component records must line up with the matrix columns.
    ///
    /// Extracted data always does; saved data read back from disk may not.
    pub fn check_consistency(&self) -> Result<()> {
        let mismatch = |what: &str, found: usize, expected: usize| {
            InterpretError::Extraction(format!(
                "analysis data has {found} {what} but {expected} components"
            ))
        };

        match self {
            Self::Fa(d) => {
                let k = d.loadings.n_cols();
                if d.factors.len() != k {
                    return Err(mismatch("factor summaries", d.factors.len(), k));
                }
                if let Some(bad) = d
                    .factors
                    .iter()
                    .zip(d.loadings.col_labels())
                    .find(|(summary, label)| &summary.factor != *label)
                {
                    return Err(InterpretError::Extraction(format!(
                        "factor summary '{}' does not match loading column '{}'",
                        bad.0.factor, bad.1
                    )));
                }
                if let Some(phi) = &d.factor_correlations {
                    if !phi.is_square() || phi.n_rows() != k {
                        return Err(mismatch("factor correlation rows", phi.n_rows(), k));
                    }
                }
            }
            Self::Gm(d) => {
                let k = d.n_clusters();
                if d.proportions.len() != k {
                    return Err(mismatch("proportions", d.proportions.len(), k));
                }
                if let Some(sizes) = &d.cluster_sizes {
                    if sizes.len() != k {
                        return Err(mismatch("cluster sizes", sizes.len(), k));
                    }
                }
                if let Some(cov) = &d.covariances {
                    let p = d.variables().len();
                    if cov.len() != k {
                        return Err(mismatch("covariance matrices", cov.len(), k));
                    }
                    if cov.iter().flatten().count() != k * p
                        || cov.iter().flatten().any(|row| row.len() != p)
                    {
                        return Err(InterpretError::Extraction(format!(
                            "covariance matrices must be {p}x{p}"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Extracted data plus the non-fatal findings collected on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractOutcome {
    pub analysis: AnalysisData,
    pub warnings: Vec<String>,
}

// ============================================================================
// Entry point
// ============================================================================

/// Extract analysis data for `model_type` from `input`.
pub fn extract(
    model_type: ModelType,
    input: &ModelInput,
    metadata: &VariableMetadata,
    args: &InterpretationArgs,
) -> Result<ExtractOutcome> {
    if !model_type.is_implemented() {
        return Err(InterpretError::NotImplemented(model_type));
    }
    if args.model_type() != model_type {
        return Err(InterpretError::ModelTypeConflict(format!(
            "interpretation args are for {} but the model type is {}",
            args.model_type(),
            model_type
        )));
    }
    if let Some(detected) = input.detect_model_type() {
        if detected != model_type {
            return Err(InterpretError::ModelTypeConflict(format!(
                "input looks like a {detected} model but {model_type} was requested"
            )));
        }
    }

    let mut warnings = Vec::new();
    let analysis = match (args, input) {
        (InterpretationArgs::Fa(a), ModelInput::FactorSolution(s)) => {
            AnalysisData::Fa(fa::extract(s, metadata, a, &mut warnings)?)
        }
        (InterpretationArgs::Fa(a), ModelInput::LoadingMatrix(m)) => AnalysisData::Fa(
            fa::extract(&FactorSolution::from_matrix(m), metadata, a, &mut warnings)?,
        ),
        (InterpretationArgs::Fa(a), ModelInput::Bundle(v)) => {
            let s = bundle::to_factor_solution(v, &mut warnings)?;
            AnalysisData::Fa(fa::extract(&s, metadata, a, &mut warnings)?)
        }
        (InterpretationArgs::Gm(a), ModelInput::MixtureFit(f)) => {
            AnalysisData::Gm(gm::extract(f, metadata, a, &mut warnings)?)
        }
        (InterpretationArgs::Gm(a), ModelInput::Bundle(v)) => {
            let f = bundle::to_mixture_fit(v, &mut warnings)?;
            AnalysisData::Gm(gm::extract(&f, metadata, a, &mut warnings)?)
        }
        (_, other) => {
            return Err(InterpretError::Extraction(format!(
                "{} input cannot be read as a {model_type} model",
                input_kind(other)
            )))
        }
    };

    debug!(
        model_type = %model_type,
        components = analysis.component_names().len(),
        variables = analysis.variable_names().len(),
        "Extracted analysis data"
    );

    Ok(ExtractOutcome { analysis, warnings })
}

fn input_kind(input: &ModelInput) -> &'static str {
    match input {
        ModelInput::FactorSolution(_) => "factor solution",
        ModelInput::LoadingMatrix(_) => "loading matrix",
        ModelInput::MixtureFit(_) => "mixture fit",
        ModelInput::Bundle(_) => "structured",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta() -> VariableMetadata {
        VariableMetadata::from_pairs([("a", "Item A"), ("b", "Item B")]).unwrap()
    }

    #[test]
    fn test_bundle_fa() {
        let input = ModelInput::Bundle(json!({
            "variables": ["a", "b"],
            "factors": ["MR1"],
            "loadings": [[0.7], [0.5]]
        }));
        assert_eq!(input.detect_model_type(), Some(ModelType::Fa));
        let args = InterpretationArgs::defaults(ModelType::Fa).unwrap();
        let out = extract(ModelType::Fa, &input, &meta(), &args).unwrap();
        assert_eq!(out.analysis.component_names(), vec!["MR1"]);
        assert_eq!(out.analysis.model_type(), ModelType::Fa);
    }

    #[test]
    fn test_consistency_of_saved_mixture() {
        let input = ModelInput::Bundle(json!({
            "variables": ["a", "b"],
            "means": [[0.0, 1.0], [0.5, -0.5]],
            "proportions": [0.5, 0.5],
            "n_obs": 20
        }));
        let args = InterpretationArgs::defaults(ModelType::Gm).unwrap();
        let mut analysis = extract(ModelType::Gm, &input, &meta(), &args).unwrap().analysis;
        assert!(analysis.check_consistency().is_ok());

        if let AnalysisData::Gm(d) = &mut analysis {
            d.cluster_sizes = Some(vec![10]);
        }
        let err = analysis.check_consistency().unwrap_err();
        assert!(err.to_string().contains("cluster sizes"));
    }

    #[test]
    fn test_loading_matrix_input() {
        let m = LabeledMatrix::new(
            vec!["a".into(), "b".into()],
            vec!["F1".into()],
            vec![vec![0.7], vec![0.5]],
        )
        .unwrap();
        let args = InterpretationArgs::defaults(ModelType::Fa).unwrap();
        let out = extract(ModelType::Fa, &m.into(), &meta(), &args).unwrap();
        assert!(out.analysis.as_fa().is_some());
    }

    #[test]
    fn test_shape_conflicts_with_requested_type() {
        let input = ModelInput::Bundle(json!({"variables": ["a"], "means": [[0.0]]}));
        let args = InterpretationArgs::defaults(ModelType::Fa).unwrap();
        let err = extract(ModelType::Fa, &input, &meta(), &args).unwrap_err();
        assert!(matches!(err, InterpretError::ModelTypeConflict(_)));
    }

    #[test]
    fn test_unimplemented_model_types() {
        let input = ModelInput::Bundle(json!({}));
        let args = InterpretationArgs::defaults(ModelType::Fa).unwrap();
        for mt in [ModelType::Irt, ModelType::Cdm] {
            let err = extract(mt, &input, &meta(), &args).unwrap_err();
            assert!(matches!(err, InterpretError::NotImplemented(_)));
        }
    }

    #[test]
    fn test_analysis_data_serde_tag() {
        let m = LabeledMatrix::new(vec!["a".into(), "b".into()], vec!["F1".into()], vec![
            vec![0.7],
            vec![0.5],
        ])
        .unwrap();
        let args = InterpretationArgs::defaults(ModelType::Fa).unwrap();
        let out = extract(ModelType::Fa, &m.into(), &meta(), &args).unwrap();
        let json = serde_json::to_value(&out.analysis).unwrap();
        assert_eq!(json["analysis_type"], "fa");
        let back: AnalysisData = serde_json::from_value(json).unwrap();
        assert_eq!(back, out.analysis);
    }
}
