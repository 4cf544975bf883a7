//! Factor analysis extraction
//!
//! Turns a loading matrix (plus optional factor correlations) into the
//! per-factor summaries the prompt and the response rules rely on:
//! significant variables, emergency-rule substitutes, undefined factors,
//! cross-loadings and orphan variables.

use serde::{Deserialize, Serialize};

use super::names::reconcile;
use crate::config::FaInterpretationArgs;
use crate::error::{InterpretError, Result};
use crate::types::{LabeledMatrix, VariableMetadata};

/// Rotations that force uncorrelated factors.
const ORTHOGONAL_ROTATIONS: &[&str] = &[
    "none", "varimax", "quartimax", "equamax", "varimin", "bentlert", "geomint",
];

// ============================================================================
// Input
// ============================================================================

/// A fitted factor solution as produced by an external FA routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorSolution {
    /// Row labels of `loadings`
    pub variables: Vec<String>,
    /// Column labels of `loadings`; `F1..Fk` when absent
    #[serde(default)]
    pub factors: Option<Vec<String>>,
    /// Variable × factor loadings
    pub loadings: Vec<Vec<f64>>,
    /// Factor × factor correlations from an oblique rotation
    #[serde(default, alias = "Phi", alias = "phi")]
    pub factor_correlations: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub rotation: Option<String>,
}

impl FactorSolution {
    /// Wrap a bare loading matrix (no correlations, unknown rotation).
    pub fn from_matrix(loadings: &LabeledMatrix) -> Self {
        Self {
            variables: loadings.row_labels().to_vec(),
            factors: Some(loadings.col_labels().to_vec()),
            loadings: (0..loadings.n_rows())
                .map(|i| loadings.row(i).to_vec())
                .collect(),
            factor_correlations: None,
            rotation: None,
        }
    }

    fn factor_names(&self) -> Vec<String> {
        self.factors.clone().unwrap_or_else(|| {
            let k = self.loadings.first().map_or(0, Vec::len);
            (1..=k).map(|i| format!("F{i}")).collect()
        })
    }

    pub fn loading_matrix(&self) -> Result<LabeledMatrix> {
        LabeledMatrix::new(self.variables.clone(), self.factor_names(), self.loadings.clone())
            .map_err(|e| InterpretError::Extraction(format!("loadings: {e}")))
    }

    pub fn is_orthogonal(&self) -> bool {
        self.rotation
            .as_deref()
            .is_some_and(|r| ORTHOGONAL_ROTATIONS.contains(&r.to_lowercase().as_str()))
    }
}

// ============================================================================
// Analysis data
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorVariable {
    pub variable: String,
    pub loading: f64,
}

/// Everything known about one factor before the LLM sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorSummary {
    pub factor: String,
    /// Significant variables, or the emergency-rule substitutes
    pub variables: Vec<FactorVariable>,
    /// No loading reached the cutoff and the top-N rule supplied `variables`
    pub emergency: bool,
    /// No loading reached the cutoff and the emergency rule is disabled
    pub undefined: bool,
    /// Sum of squared loadings divided by the number of variables
    pub variance_explained: f64,
}

/// A variable significant on more than one factor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossLoading {
    pub variable: String,
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaAnalysisData {
    pub loadings: LabeledMatrix,
    pub factor_correlations: Option<LabeledMatrix>,
    pub rotation: Option<String>,
    pub cutoff: f64,
    pub n_emergency: usize,
    pub hide_low_loadings: bool,
    pub sort_loadings: bool,
    pub factors: Vec<FactorSummary>,
    pub cross_loadings: Vec<CrossLoading>,
    /// Variables with no significant loading on any factor
    pub orphans: Vec<String>,
}

impl FaAnalysisData {
    /// Derive per-factor summaries and diagnostics.
    pub fn build(
        loadings: LabeledMatrix,
        factor_correlations: Option<LabeledMatrix>,
        rotation: Option<String>,
        args: &FaInterpretationArgs,
    ) -> Result<Self> {
        if let Some(phi) = &factor_correlations {
            if !phi.is_square() || phi.n_rows() != loadings.n_cols() {
                return Err(InterpretError::Extraction(format!(
                    "factor correlation matrix is {}x{} but there are {} factors",
                    phi.n_rows(),
                    phi.n_cols(),
                    loadings.n_cols()
                )));
            }
        }

        let cutoff = args.cutoff;
        let significant = |v: f64| v.abs() >= cutoff;
        #[allow(clippy::cast_precision_loss)]
        let n_vars = loadings.n_rows() as f64;

        let factors = loadings
            .col_labels()
            .iter()
            .enumerate()
            .map(|(j, factor)| {
                let column = loadings.column(j);
                let mut sig: Vec<FactorVariable> = loadings
                    .row_labels()
                    .iter()
                    .zip(&column)
                    .filter(|(_, &l)| significant(l))
                    .map(|(v, &l)| FactorVariable {
                        variable: v.clone(),
                        loading: l,
                    })
                    .collect();
                if args.sort_loadings {
                    sort_by_magnitude(&mut sig);
                }

                let (variables, emergency, undefined) = if !sig.is_empty() {
                    (sig, false, false)
                } else if args.n_emergency > 0 {
                    let mut all: Vec<FactorVariable> = loadings
                        .row_labels()
                        .iter()
                        .zip(&column)
                        .map(|(v, &l)| FactorVariable {
                            variable: v.clone(),
                            loading: l,
                        })
                        .collect();
                    sort_by_magnitude(&mut all);
                    all.truncate(args.n_emergency);
                    (all, true, false)
                } else {
                    (Vec::new(), false, true)
                };

                FactorSummary {
                    factor: factor.clone(),
                    variables,
                    emergency,
                    undefined,
                    variance_explained: column.iter().map(|l| l * l).sum::<f64>() / n_vars,
                }
            })
            .collect();

        let mut cross_loadings = Vec::new();
        let mut orphans = Vec::new();
        for (i, variable) in loadings.row_labels().iter().enumerate() {
            let hits: Vec<String> = loadings
                .row(i)
                .iter()
                .zip(loadings.col_labels())
                .filter(|(&l, _)| significant(l))
                .map(|(_, f)| f.clone())
                .collect();
            match hits.len() {
                0 => orphans.push(variable.clone()),
                1 => {}
                _ => cross_loadings.push(CrossLoading {
                    variable: variable.clone(),
                    factors: hits,
                }),
            }
        }

        Ok(Self {
            loadings,
            factor_correlations,
            rotation,
            cutoff,
            n_emergency: args.n_emergency,
            hide_low_loadings: args.hide_low_loadings,
            sort_loadings: args.sort_loadings,
            factors,
            cross_loadings,
            orphans,
        })
    }

    pub fn factor_names(&self) -> Vec<String> {
        self.loadings.col_labels().to_vec()
    }

    pub fn variables(&self) -> &[String] {
        self.loadings.row_labels()
    }

    pub fn factor(&self, name: &str) -> Option<&FactorSummary> {
        self.factors.iter().find(|f| f.factor == name)
    }

    pub fn undefined_factors(&self) -> Vec<&str> {
        self.factors
            .iter()
            .filter(|f| f.undefined)
            .map(|f| f.factor.as_str())
            .collect()
    }

    pub fn emergency_factors(&self) -> Vec<&str> {
        self.factors
            .iter()
            .filter(|f| f.emergency)
            .map(|f| f.factor.as_str())
            .collect()
    }
}

fn sort_by_magnitude(vars: &mut [FactorVariable]) {
    vars.sort_by(|a, b| b.loading.abs().total_cmp(&a.loading.abs()));
}

// ============================================================================
// Extraction
// ============================================================================

/// Extract FA analysis data from a fitted solution.
pub(crate) fn extract(
    solution: &FactorSolution,
    metadata: &VariableMetadata,
    args: &FaInterpretationArgs,
    warnings: &mut Vec<String>,
) -> Result<FaAnalysisData> {
    let loadings = solution.loading_matrix()?;
    reconcile(loadings.row_labels(), metadata)?;

    let heywood: Vec<&str> = loadings
        .row_labels()
        .iter()
        .enumerate()
        .filter(|(i, _)| loadings.row(*i).iter().any(|l| l.abs() > 1.0))
        .map(|(_, v)| v.as_str())
        .collect();
    if !heywood.is_empty() {
        warnings.push(format!(
            "Loadings above 1 in absolute value (possible Heywood case): {}",
            heywood.join(", ")
        ));
    }

    let factor_correlations = match &solution.factor_correlations {
        Some(_) if solution.is_orthogonal() => {
            warnings.push(format!(
                "Factor correlations ignored: rotation '{}' is orthogonal",
                solution.rotation.as_deref().unwrap_or_default()
            ));
            None
        }
        Some(phi) => {
            let names = loadings.col_labels().to_vec();
            Some(
                LabeledMatrix::new(names.clone(), names, phi.clone())
                    .map_err(|e| InterpretError::Extraction(format!("factor correlations: {e}")))?,
            )
        }
        None => None,
    };

    FaAnalysisData::build(loadings, factor_correlations, solution.rotation.clone(), args)
}
