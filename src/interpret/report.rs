//! Report rendering for the terminal (plain text) and markdown.

use super::result::{FaDetails, GmDetails, InterpretationResult, ResultDetails};
use crate::config::{OutputArgs, OutputFormat};
use crate::prompt::format::{format_loading, format_percent, format_stat};

/// Render the report for `args.format`.
///
/// Component headings are never wrapped, so every suggested name appears
/// verbatim in the output.
pub fn build_report(result: &InterpretationResult, args: &OutputArgs) -> String {
    let md = args.format == OutputFormat::Markdown;
    let mut out = String::new();

    if !args.suppress_heading {
        let title = format!("{} Interpretation", result.model_type.display_name());
        out.push_str(&heading(&title, args.heading_level, md));
    }

    for c in &result.components {
        let title = format!("{}: {}", c.component, c.name);
        out.push_str(&heading(&title, sub_level(args.heading_level), md));
        if let ResultDetails::Fa(fa) = &result.details {
            if let Some(line) = factor_variables_line(fa, &c.component) {
                out.push_str(&paragraph(&line, args, md));
            }
        }
        out.push_str(&paragraph(&c.interpretation, args, md));
    }

    let diagnostics = match &result.details {
        ResultDetails::Fa(fa) => fa_diagnostics(fa),
        ResultDetails::Gm(gm) => gm_diagnostics(gm),
    };
    if !diagnostics.is_empty() {
        out.push_str(&heading("Diagnostics", sub_level(args.heading_level), md));
        for line in &diagnostics {
            out.push_str(&bullet(line, args, md));
        }
        out.push('\n');
    }

    if !result.warnings.is_empty() {
        out.push_str(&heading("Warnings", sub_level(args.heading_level), md));
        for w in &result.warnings {
            out.push_str(&bullet(w, args, md));
        }
        out.push('\n');
    }

    let model = result
        .model
        .as_deref()
        .map(|m| format!(" ({m})"))
        .unwrap_or_default();
    let footer = format!(
        "Tokens: {} in / {} out | Elapsed: {:.2} s | Provider: {}{model}",
        result.token_usage.input_tokens,
        result.token_usage.output_tokens,
        result.elapsed_secs,
        result.provider
    );
    if md {
        out.push_str(&format!("*{footer}*\n"));
    } else {
        out.push_str(&wrap_text(&footer, args.max_line_length));
        out.push('\n');
    }

    out
}

fn sub_level(level: u8) -> u8 {
    (level + 1).min(6)
}

fn heading(title: &str, level: u8, md: bool) -> String {
    if md {
        format!("{} {title}\n\n", "#".repeat(usize::from(level.clamp(1, 6))))
    } else {
        let rule = if level <= 1 { '=' } else { '-' };
        format!("{title}\n{}\n\n", rule.to_string().repeat(title.chars().count()))
    }
}

fn paragraph(text: &str, args: &OutputArgs, md: bool) -> String {
    if md {
        format!("{text}\n\n")
    } else {
        format!("{}\n\n", wrap_text(text, args.max_line_length))
    }
}

fn bullet(text: &str, args: &OutputArgs, md: bool) -> String {
    if md {
        format!("- {text}\n")
    } else {
        let wrapped = wrap_text(text, args.max_line_length.saturating_sub(2).max(1));
        let mut lines = wrapped.lines();
        let mut out = String::new();
        if let Some(first) = lines.next() {
            out.push_str(&format!("- {first}\n"));
        }
        for line in lines {
            out.push_str(&format!("  {line}\n"));
        }
        out
    }
}

/// Greedy word wrap at `width` characters. Longer words get a line of
/// their own.
pub fn wrap_text(text: &str, width: usize) -> String {
    let mut lines: Vec<String> = Vec::new();
    for source_line in text.lines() {
        let mut current = String::new();
        let mut current_len = 0usize;
        for word in source_line.split_whitespace() {
            let len = word.chars().count();
            if current_len > 0 && current_len + 1 + len > width {
                lines.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push(' ');
                current_len += 1;
            }
            current.push_str(word);
            current_len += len;
        }
        lines.push(current);
    }
    lines.join("\n")
}

fn factor_variables_line(fa: &FaDetails, component: &str) -> Option<String> {
    let factor = fa.factors.iter().find(|f| f.factor == component)?;
    if factor.undefined {
        return Some("Variables: none above the cutoff".to_string());
    }
    let vars: Vec<String> = factor
        .variables
        .iter()
        .map(|v| format!("{} ({})", v.variable, format_loading(v.loading)))
        .collect();
    let label = if factor.emergency {
        "Variables (n.s.)"
    } else {
        "Variables"
    };
    Some(format!("{label}: {}", vars.join(", ")))
}

fn fa_diagnostics(fa: &FaDetails) -> Vec<String> {
    let mut lines = vec![format!(
        "Cutoff {} with emergency rule {}",
        format_loading(fa.cutoff),
        fa.n_emergency
    )];
    if !fa.cross_loadings.is_empty() {
        let items: Vec<String> = fa
            .cross_loadings
            .iter()
            .map(|c| format!("{} ({})", c.variable, c.factors.join(", ")))
            .collect();
        lines.push(format!("Cross-loadings: {}", items.join("; ")));
    }
    if !fa.orphans.is_empty() {
        lines.push(format!("Orphan variables: {}", fa.orphans.join(", ")));
    }
    if let Some(phi) = &fa.factor_correlations {
        let mut pairs = Vec::new();
        for i in 0..phi.n_rows() {
            for j in (i + 1)..phi.n_cols() {
                pairs.push(format!(
                    "{}-{} {}",
                    phi.row_labels()[i],
                    phi.col_labels()[j],
                    format_loading(phi.get(i, j))
                ));
            }
        }
        if !pairs.is_empty() {
            lines.push(format!("Factor correlations: {}", pairs.join(", ")));
        }
    }
    lines
}

fn gm_diagnostics(gm: &GmDetails) -> Vec<String> {
    let fit = &gm.fit;
    let mut lines = vec![
        format!(
            "Covariance model: {} | Proportions: {}",
            gm.covariance_model.as_str(),
            gm.proportions
                .iter()
                .map(|p| format_percent(*p))
                .collect::<Vec<_>>()
                .join(", ")
        ),
        format!(
            "Log-likelihood {} | AIC {} | BIC {} | ICL {}",
            format_stat(fit.log_likelihood, 2),
            format_stat(fit.aic, 2),
            format_stat(fit.bic, 2),
            format_stat(fit.icl, 2)
        ),
        format!(
            "Entropy {} | Normalized entropy {}",
            format_stat(fit.entropy, 3),
            format_stat(fit.normalized_entropy, 3)
        ),
    ];
    if let Some(sizes) = &gm.cluster_sizes {
        lines.push(format!(
            "Cluster sizes: {}",
            sizes
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ));
    }
    if fit.converged == Some(false) {
        lines.push("The model did not converge".to_string());
    }
    if !gm.small_clusters.is_empty() {
        lines.push(format!("Small clusters: {}", gm.small_clusters.join(", ")));
    }
    if !gm.low_separation.is_empty() {
        let pairs: Vec<String> = gm
            .low_separation
            .iter()
            .map(|s| format!("{} / {} ({:.2})", s.first, s.second, s.separation))
            .collect();
        lines.push(format!("Poorly separated: {}", pairs.join("; ")));
    }
    if !gm.distinguishing_variables.is_empty() {
        let vars: Vec<&str> = gm
            .distinguishing_variables
            .iter()
            .map(|d| d.variable.as_str())
            .collect();
        lines.push(format!("Most distinguishing variables: {}", vars.join(", ")));
    }
    lines
}
