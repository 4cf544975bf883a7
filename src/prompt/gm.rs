//! Gaussian mixture prompts.

use super::format::{format_percent, format_stat};
use crate::extract::GmAnalysisData;
use crate::types::VariableMetadata;

pub const GM_SYSTEM_PROMPT: &str = r#"You are an expert in latent profile analysis interpreting the results of a Gaussian mixture model.

### YOUR TASK
Give every cluster a short, meaningful name and a plain-language description of the profile it represents.

### RULES
1. Describe each cluster by the variables on which it is clearly high or low compared with the other clusters.
2. Names are 2 to 4 words and describe the profile, not a single variable.
3. Take cluster size into account. Very small clusters may be unstable.
4. Do not invent variables or values that are not listed.
{word_limit_rule}5. Reply with ONLY the JSON object requested at the end of the task. No preamble. No markdown."#;

/// Main prompt body for a mixture fit.
pub(crate) fn main_prompt(data: &GmAnalysisData, metadata: &VariableMetadata) -> String {
    let mut out = String::new();
    let k = data.n_clusters();
    let n = data.variables().len();

    out.push_str("# GAUSSIAN MIXTURE INTERPRETATION\n\n");
    out.push_str(&format!(
        "Name and interpret each of the {k} cluster{} found by a Gaussian mixture model over {n} variables.\n",
        if k == 1 { "" } else { "s" }
    ));

    out.push_str("\n### VARIABLES\n");
    for v in data.variables() {
        out.push_str(&format!("- {v}: {}\n", metadata.description(v).unwrap_or("")));
    }

    out.push_str("\n### CLUSTER PROFILES\n");
    for (c, cluster) in data.means.col_labels().iter().enumerate() {
        let size = data
            .cluster_sizes
            .as_ref()
            .and_then(|s| s.get(c))
            .map(|n| format!(", n = {n}"))
            .unwrap_or_default();
        out.push_str(&format!(
            "\n#### {cluster} (proportion {}{size})\n",
            format_percent(data.proportions.get(c).copied().unwrap_or_default())
        ));
        for (v, variable) in data.variables().iter().enumerate() {
            let sd = data
                .covariances
                .as_ref()
                .and_then(|cov| cov.get(c)?.get(v)?.get(v).copied())
                .map(|var| format!(" (SD {:.2})", var.max(0.0).sqrt()))
                .unwrap_or_default();
            out.push_str(&format!("- {variable}: mean {:.2}{sd}\n", data.means.get(v, c)));
        }
    }

    let fit = &data.fit;
    out.push_str("\n### MODEL FIT\n");
    out.push_str(&format!(
        "Covariance model: {}\n",
        data.covariance_model.as_str()
    ));
    out.push_str(&format!(
        "Log-likelihood: {} | AIC: {} | BIC: {} | ICL: {}\n",
        format_stat(fit.log_likelihood, 2),
        format_stat(fit.aic, 2),
        format_stat(fit.bic, 2),
        format_stat(fit.icl, 2)
    ));
    out.push_str(&format!(
        "Entropy: {} | Normalized entropy: {}\n",
        format_stat(fit.entropy, 3),
        format_stat(fit.normalized_entropy, 3)
    ));
    if let Some(converged) = fit.converged {
        out.push_str(&format!("Converged: {}\n", if converged { "yes" } else { "no" }));
    }

    out.push_str("\n### DIAGNOSTICS\n");
    if !data.distinguishing_variables.is_empty() {
        let items: Vec<String> = data
            .distinguishing_variables
            .iter()
            .map(|d| format!("{} (spread {:.2})", d.variable, d.spread))
            .collect();
        out.push_str(&format!(
            "Most distinguishing variables: {}\n",
            items.join(", ")
        ));
    }
    if !data.small_clusters.is_empty() {
        out.push_str(&format!(
            "Clusters smaller than {} members: {}\n",
            data.min_cluster_size,
            data.small_clusters.join(", ")
        ));
    }
    if !data.low_separation.is_empty() {
        let pairs: Vec<String> = data
            .low_separation
            .iter()
            .map(|s| format!("{} / {} ({:.2})", s.first, s.second, s.separation))
            .collect();
        out.push_str(&format!(
            "Poorly separated cluster pairs (below {:.2}): {}\n",
            data.separation_threshold,
            pairs.join("; ")
        ));
    }

    out
}
