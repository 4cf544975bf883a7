//! Interpretation result types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::report::build_report;
use crate::config::OutputArgs;
use crate::extract::{
    AnalysisData, ClusterSeparation, CovarianceModel, CrossLoading, DistinguishingVariable,
    FactorSummary, FitStatistics,
};
use crate::parsing::{ComponentInterpretation, ParseTier};
use crate::prompt::PromptPair;
use crate::types::{LabeledMatrix, ModelType};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.input_tokens.saturating_add(self.output_tokens)
    }
}

/// FA diagnostics carried into the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaDetails {
    pub cutoff: f64,
    pub n_emergency: usize,
    pub factors: Vec<FactorSummary>,
    pub cross_loadings: Vec<CrossLoading>,
    pub orphans: Vec<String>,
    pub factor_correlations: Option<LabeledMatrix>,
}

/// GM fit statistics and diagnostics carried into the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmDetails {
    pub covariance_model: CovarianceModel,
    pub fit: FitStatistics,
    pub proportions: Vec<f64>,
    pub cluster_sizes: Option<Vec<usize>>,
    pub small_clusters: Vec<String>,
    pub low_separation: Vec<ClusterSeparation>,
    pub distinguishing_variables: Vec<DistinguishingVariable>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "analysis_type", rename_all = "snake_case")]
pub enum ResultDetails {
    #[serde(rename = "fa_interpretation")]
    Fa(FaDetails),
    #[serde(rename = "gm_interpretation")]
    Gm(GmDetails),
}

impl From<&AnalysisData> for ResultDetails {
    fn from(analysis: &AnalysisData) -> Self {
        match analysis {
            AnalysisData::Fa(d) => Self::Fa(FaDetails {
                cutoff: d.cutoff,
                n_emergency: d.n_emergency,
                factors: d.factors.clone(),
                cross_loadings: d.cross_loadings.clone(),
                orphans: d.orphans.clone(),
                factor_correlations: d.factor_correlations.clone(),
            }),
            AnalysisData::Gm(d) => Self::Gm(GmDetails {
                covariance_model: d.covariance_model,
                fit: d.fit.clone(),
                proportions: d.proportions.clone(),
                cluster_sizes: d.cluster_sizes.clone(),
                small_clusters: d.small_clusters.clone(),
                low_separation: d.low_separation.clone(),
                distinguishing_variables: d.distinguishing_variables.clone(),
            }),
        }
    }
}

/// Everything one interpretation call produced. Immutable once returned;
/// [`with_output_args`](Self::with_output_args) re-renders a copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpretationResult {
    pub model_type: ModelType,
    /// One entry per component, in canonical order
    pub components: Vec<ComponentInterpretation>,
    pub details: ResultDetails,
    pub parse_tier: ParseTier,
    pub token_usage: TokenUsage,
    pub elapsed_secs: f64,
    pub provider: String,
    pub model: Option<String>,
    pub session_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub prompts: PromptPair,
    pub raw_response: String,
    /// Non-fatal findings from input resolution, extraction and parsing
    pub warnings: Vec<String>,
    pub output_args: OutputArgs,
    pub report: String,
}

impl InterpretationResult {
    pub fn component(&self, name: &str) -> Option<&ComponentInterpretation> {
        self.components.iter().find(|c| c.component == name)
    }

    /// `(component, suggested name)` pairs in canonical order.
    pub fn suggested_names(&self) -> Vec<(&str, &str)> {
        self.components
            .iter()
            .map(|c| (c.component.as_str(), c.name.as_str()))
            .collect()
    }

    /// Copy with the report rendered for `output_args`.
    pub fn with_output_args(&self, output_args: OutputArgs) -> Self {
        let mut copy = Self {
            output_args,
            ..self.clone()
        };
        copy.report = build_report(&copy, &copy.output_args);
        copy
    }
}
