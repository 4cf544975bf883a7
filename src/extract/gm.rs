//! Gaussian mixture extraction
//!
//! Validates a fitted mixture record and derives the fit statistics and
//! cluster diagnostics shown to the LLM.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use super::names::reconcile;
use crate::config::GmInterpretationArgs;
use crate::error::{InterpretError, Result};
use crate::types::{LabeledMatrix, VariableMetadata};

/// Allowed deviation of the mixing proportions' sum from 1.
pub const PROPORTION_TOLERANCE: f64 = 1e-3;

// ============================================================================
// Input
// ============================================================================

/// Covariance parameterization of the fitted mixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CovarianceModel {
    #[default]
    Full,
    Diagonal,
    Spherical,
    Tied,
}

impl CovarianceModel {
    /// Free parameters of a `k`-cluster mixture over `d` variables.
    pub fn n_parameters(self, d: usize, k: usize) -> usize {
        let means = k * d;
        let weights = k.saturating_sub(1);
        let cov = match self {
            Self::Full => k * d * (d + 1) / 2,
            Self::Diagonal => k * d,
            Self::Spherical => k,
            Self::Tied => d * (d + 1) / 2,
        };
        means + weights + cov
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Diagonal => "diagonal",
            Self::Spherical => "spherical",
            Self::Tied => "tied",
        }
    }
}

/// A fitted Gaussian mixture as produced by an external clustering routine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MixtureFit {
    /// Row labels of `means`
    pub variables: Vec<String>,
    /// `Cluster 1..K` when absent
    #[serde(default)]
    pub cluster_names: Option<Vec<String>>,
    /// Variable × cluster means
    pub means: Vec<Vec<f64>>,
    /// Cluster × variable × variable covariances
    #[serde(default)]
    pub covariances: Option<Vec<Vec<Vec<f64>>>>,
    pub proportions: Vec<f64>,
    #[serde(default)]
    pub log_likelihood: Option<f64>,
    #[serde(default)]
    pub n_obs: Option<usize>,
    /// Overrides the count derived from `covariance_model`
    #[serde(default)]
    pub n_parameters: Option<usize>,
    /// Observation × cluster membership probabilities
    #[serde(default)]
    pub posterior: Option<Vec<Vec<f64>>>,
    #[serde(default)]
    pub converged: Option<bool>,
    #[serde(default)]
    pub covariance_model: Option<CovarianceModel>,
}

impl MixtureFit {
    fn n_clusters(&self) -> usize {
        self.means.first().map_or(0, Vec::len)
    }

    fn cluster_names(&self) -> Vec<String> {
        self.cluster_names
            .clone()
            .unwrap_or_else(|| (1..=self.n_clusters()).map(|i| format!("Cluster {i}")).collect())
    }

    pub fn means_matrix(&self) -> Result<LabeledMatrix> {
        LabeledMatrix::new(self.variables.clone(), self.cluster_names(), self.means.clone())
            .map_err(|e| InterpretError::Extraction(format!("means: {e}")))
    }
}

// ============================================================================
// Analysis data
// ============================================================================

/// Information criteria and classification quality. Entries whose inputs
/// were not supplied stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitStatistics {
    pub log_likelihood: Option<f64>,
    pub n_parameters: Option<usize>,
    pub n_obs: Option<usize>,
    pub aic: Option<f64>,
    pub bic: Option<f64>,
    pub icl: Option<f64>,
    pub entropy: Option<f64>,
    /// Entropy divided by `n ln K`; 0 for a single cluster
    pub normalized_entropy: Option<f64>,
    pub converged: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSeparation {
    pub first: String,
    pub second: String,
    /// Mean standardized absolute difference of cluster means
    pub separation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DistinguishingVariable {
    pub variable: String,
    /// Standard deviation of the variable's means across clusters
    pub spread: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmAnalysisData {
    pub means: LabeledMatrix,
    pub covariances: Option<Vec<Vec<Vec<f64>>>>,
    pub proportions: Vec<f64>,
    pub cluster_sizes: Option<Vec<usize>>,
    pub covariance_model: CovarianceModel,
    pub fit: FitStatistics,
    pub min_cluster_size: usize,
    pub separation_threshold: f64,
    pub n_distinguishing: usize,
    /// Clusters with fewer than `min_cluster_size` members
    pub small_clusters: Vec<String>,
    /// Cluster pairs whose separation falls below the threshold
    pub low_separation: Vec<ClusterSeparation>,
    pub distinguishing_variables: Vec<DistinguishingVariable>,
}

impl GmAnalysisData {
    pub fn cluster_names(&self) -> Vec<String> {
        self.means.col_labels().to_vec()
    }

    pub fn variables(&self) -> &[String] {
        self.means.row_labels()
    }

    pub fn n_clusters(&self) -> usize {
        self.means.n_cols()
    }

    pub fn cluster_index(&self, name: &str) -> Option<usize> {
        self.means.col_index(name)
    }
}

// ============================================================================
// Extraction
// ============================================================================

/// Extract GM analysis data from a fitted mixture.
pub(crate) fn extract(
    fit: &MixtureFit,
    metadata: &VariableMetadata,
    args: &GmInterpretationArgs,
    warnings: &mut Vec<String>,
) -> Result<GmAnalysisData> {
    let means = fit.means_matrix()?;
    reconcile(means.row_labels(), metadata)?;

    let d = means.n_rows();
    let k = means.n_cols();

    check_proportions(&fit.proportions, k)?;
    if let Some(cov) = &fit.covariances {
        check_covariances(cov, d, k)?;
    }
    if let Some(z) = &fit.posterior {
        check_posterior(z, k, fit.n_obs)?;
    }

    let covariance_model = fit.covariance_model.unwrap_or_default();
    let stats = fit_statistics(fit, covariance_model, d, k);
    if stats.converged == Some(false) {
        warnings.push("The mixture model did not converge; interpret with caution".to_string());
    }

    let cluster_sizes = cluster_sizes(fit.posterior.as_deref(), &fit.proportions, stats.n_obs, k);
    let small_clusters = cluster_sizes
        .as_ref()
        .map(|sizes| {
            sizes
                .iter()
                .zip(means.col_labels())
                .filter(|(&n, _)| n < args.min_cluster_size)
                .map(|(_, name)| name.clone())
                .collect()
        })
        .unwrap_or_default();

    let low_separation = pairwise_separation(&means, fit.covariances.as_deref())
        .into_iter()
        .filter(|s| s.separation < args.separation_threshold)
        .collect();

    let distinguishing_variables = distinguishing_variables(&means, args.n_distinguishing);

    Ok(GmAnalysisData {
        means,
        covariances: fit.covariances.clone(),
        proportions: fit.proportions.clone(),
        cluster_sizes,
        covariance_model,
        fit: stats,
        min_cluster_size: args.min_cluster_size,
        separation_threshold: args.separation_threshold,
        n_distinguishing: args.n_distinguishing,
        small_clusters,
        low_separation,
        distinguishing_variables,
    })
}

fn check_proportions(proportions: &[f64], k: usize) -> Result<()> {
    if proportions.len() != k {
        return Err(InterpretError::Extraction(format!(
            "{} mixing proportions for {k} clusters",
            proportions.len()
        )));
    }
    if let Some(bad) = proportions
        .iter()
        .find(|p| !p.is_finite() || **p < 0.0 || **p > 1.0)
    {
        return Err(InterpretError::Extraction(format!(
            "mixing proportion {bad} is outside [0, 1]"
        )));
    }
    let total: f64 = proportions.iter().sum();
    if (total - 1.0).abs() > PROPORTION_TOLERANCE {
        return Err(InterpretError::Extraction(format!(
            "mixing proportions sum to {total:.4}, expected 1"
        )));
    }
    Ok(())
}

fn check_covariances(cov: &[Vec<Vec<f64>>], d: usize, k: usize) -> Result<()> {
    if cov.len() != k {
        return Err(InterpretError::Extraction(format!(
            "{} covariance matrices for {k} clusters",
            cov.len()
        )));
    }
    for (c, m) in cov.iter().enumerate() {
        let ok = m.len() == d
            && m.iter().all(|row| row.len() == d && row.iter().all(|v| v.is_finite()));
        if !ok {
            return Err(InterpretError::Extraction(format!(
                "covariance matrix of cluster {} is not a finite {d}x{d} matrix",
                c + 1
            )));
        }
    }
    Ok(())
}

fn check_posterior(z: &[Vec<f64>], k: usize, n_obs: Option<usize>) -> Result<()> {
    if let Some(n) = n_obs {
        if z.len() != n {
            return Err(InterpretError::Extraction(format!(
                "posterior has {} rows but n_obs is {n}",
                z.len()
            )));
        }
    }
    if let Some(i) = z
        .iter()
        .position(|row| row.len() != k || row.iter().any(|p| !p.is_finite() || *p < 0.0))
    {
        return Err(InterpretError::Extraction(format!(
            "posterior row {} is not {k} non-negative probabilities",
            i + 1
        )));
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn fit_statistics(fit: &MixtureFit, model: CovarianceModel, d: usize, k: usize) -> FitStatistics {
    let n_obs = fit.n_obs.or_else(|| fit.posterior.as_ref().map(Vec::len));
    let n_parameters = Some(fit.n_parameters.unwrap_or_else(|| model.n_parameters(d, k)));
    let ll = fit.log_likelihood;

    let aic = ll.zip(n_parameters).map(|(l, p)| 2.0 * p as f64 - 2.0 * l);
    let bic = ll
        .zip(n_parameters)
        .zip(n_obs)
        .map(|((l, p), n)| p as f64 * (n as f64).ln() - 2.0 * l);

    let entropy = fit.posterior.as_ref().map(|z| {
        -z.iter()
            .flatten()
            .filter(|&&p| p > 0.0)
            .map(|&p| p * p.ln())
            .sum::<f64>()
    });
    let icl = bic.zip(entropy).map(|(b, e)| b + 2.0 * e);
    let normalized_entropy = entropy.zip(n_obs).map(|(e, n)| {
        if k <= 1 || n == 0 {
            0.0
        } else {
            e / (n as f64 * (k as f64).ln())
        }
    });

    FitStatistics {
        log_likelihood: ll,
        n_parameters,
        n_obs,
        aic,
        bic,
        icl,
        entropy,
        normalized_entropy,
        converged: fit.converged,
    }
}

/// Hard-assignment counts from the posterior, else proportion × n.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn cluster_sizes(
    posterior: Option<&[Vec<f64>]>,
    proportions: &[f64],
    n_obs: Option<usize>,
    k: usize,
) -> Option<Vec<usize>> {
    if let Some(z) = posterior {
        let mut counts = vec![0usize; k];
        for row in z {
            let best = row
                .iter()
                .enumerate()
                .max_by(|a, b| a.1.total_cmp(b.1))
                .map(|(i, _)| i);
            if let Some(i) = best {
                counts[i] += 1;
            }
        }
        return Some(counts);
    }
    n_obs.map(|n| {
        proportions
            .iter()
            .map(|p| (p * n as f64).round() as usize)
            .collect()
    })
}

/// Separation for every cluster pair. Differences are scaled by the pooled
/// within-cluster standard deviation when covariances are known.
fn pairwise_separation(
    means: &LabeledMatrix,
    covariances: Option<&[Vec<Vec<f64>>]>,
) -> Vec<ClusterSeparation> {
    let names = means.col_labels();
    let mut out = Vec::new();
    for a in 0..names.len() {
        for b in (a + 1)..names.len() {
            let diffs: Vec<f64> = (0..means.n_rows())
                .map(|v| {
                    let diff = (means.get(v, a) - means.get(v, b)).abs();
                    let scale = covariances
                        .map(|cov| ((cov[a][v][v] + cov[b][v][v]) / 2.0).sqrt())
                        .filter(|s| s.is_finite() && *s > 0.0)
                        .unwrap_or(1.0);
                    diff / scale
                })
                .collect();
            out.push(ClusterSeparation {
                first: names[a].clone(),
                second: names[b].clone(),
                separation: diffs.mean(),
            });
        }
    }
    out
}

/// Variables whose cluster means vary the most, largest spread first.
fn distinguishing_variables(means: &LabeledMatrix, n: usize) -> Vec<DistinguishingVariable> {
    if means.n_cols() < 2 {
        return Vec::new();
    }
    let mut vars: Vec<DistinguishingVariable> = means
        .row_labels()
        .iter()
        .enumerate()
        .map(|(i, v)| DistinguishingVariable {
            variable: v.clone(),
            spread: means.row(i).std_dev(),
        })
        .collect();
    vars.sort_by(|a, b| b.spread.total_cmp(&a.spread));
    vars.truncate(n);
    vars
}
