//! Factor analysis prompts.

use super::format::{format_loading, format_percent};
use crate::extract::FaAnalysisData;
use crate::types::VariableMetadata;

pub const FA_SYSTEM_PROMPT: &str = r#"You are an expert psychometrician interpreting the results of an exploratory factor analysis.

### YOUR TASK
Give every factor a short, meaningful name and a plain-language interpretation that a researcher could put in a results section.

### RULES
1. Base each interpretation on the variables that load on the factor and on the sign of their loadings. A negative loading reverses the meaning of the variable.
2. Names are 2 to 4 words and describe the shared construct, not a single item.
3. Factors marked (n.s.) have no loading above the cutoff. Interpret them cautiously and say that the evidence is weak.
4. Do not invent variables or loadings that are not listed.
{word_limit_rule}5. Reply with ONLY the JSON object requested at the end of the task. No preamble. No markdown."#;

/// Main prompt body for a factor solution.
pub(crate) fn main_prompt(data: &FaAnalysisData, metadata: &VariableMetadata) -> String {
    let mut out = String::new();
    let k = data.factors.len();
    let n = data.variables().len();

    out.push_str("# FACTOR ANALYSIS INTERPRETATION\n\n");
    out.push_str(&format!(
        "Name and interpret each of the {k} factor{} extracted from {n} variables.\n",
        if k == 1 { "" } else { "s" }
    ));
    if let Some(rotation) = &data.rotation {
        out.push_str(&format!("Rotation: {rotation}\n"));
    }

    out.push_str("\n### VARIABLES\n");
    for v in data.variables() {
        out.push_str(&format!("- {v}: {}\n", metadata.description(v).unwrap_or("")));
    }

    out.push_str("\n### LOADINGS\n");
    out.push_str(&format!(
        "Significance cutoff: |loading| >= {}\n",
        format_loading(data.cutoff)
    ));
    if data.n_emergency > 0 {
        out.push_str(&format!(
            "Emergency rule: {} (a factor with no significant loading shows its {} strongest variables, marked n.s.)\n",
            data.n_emergency, data.n_emergency
        ));
    } else {
        out.push_str("Emergency rule: 0 (a factor with no significant loading is undefined)\n");
    }

    for factor in &data.factors {
        out.push_str(&format!(
            "\n#### {} (variance explained: {})\n",
            factor.factor,
            format_percent(factor.variance_explained)
        ));

        if factor.undefined {
            out.push_str("No variable reaches the cutoff. This factor is undefined.\n");
            continue;
        }

        let listed = factor
            .variables
            .iter()
            .map(|v| format!("{} ({})", v.variable, format_loading(v.loading)))
            .collect::<Vec<_>>()
            .join(", ");
        if factor.emergency {
            out.push_str(&format!("Below cutoff, strongest variables (n.s.): {listed}\n"));
        } else {
            out.push_str(&format!("Significant: {listed}\n"));
        }

        if !data.hide_low_loadings {
            let Some(j) = data.loadings.col_index(&factor.factor) else {
                continue;
            };
            let others: Vec<String> = data
                .variables()
                .iter()
                .enumerate()
                .filter(|(_, v)| !factor.variables.iter().any(|fv| &fv.variable == *v))
                .map(|(i, v)| format!("{v} ({})", format_loading(data.loadings.get(i, j))))
                .collect();
            if !others.is_empty() {
                out.push_str(&format!("Other loadings: {}\n", others.join(", ")));
            }
        }
    }

    if let Some(phi) = &data.factor_correlations {
        out.push_str("\n### FACTOR CORRELATIONS\n");
        for (i, row_label) in phi.row_labels().iter().enumerate() {
            let cells: Vec<String> = phi
                .col_labels()
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(j, col)| format!("{col} {}", format_loading(phi.get(i, j))))
                .collect();
            if !cells.is_empty() {
                out.push_str(&format!("{row_label}: {}\n", cells.join(", ")));
            }
        }
    }

    if !data.cross_loadings.is_empty() || !data.orphans.is_empty() {
        out.push_str("\n### DIAGNOSTICS\n");
        if !data.cross_loadings.is_empty() {
            let items: Vec<String> = data
                .cross_loadings
                .iter()
                .map(|c| format!("{} ({})", c.variable, c.factors.join(", ")))
                .collect();
            out.push_str(&format!("Cross-loading variables: {}\n", items.join("; ")));
        }
        if !data.orphans.is_empty() {
            out.push_str(&format!(
                "Variables without a significant loading: {}\n",
                data.orphans.join(", ")
            ));
        }
    }

    out
}
