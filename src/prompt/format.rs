//! Number formatting shared by the prompt builders and the report.

/// Loading with two decimals and no leading zero: `.80`, `-.15`, `1.02`.
pub fn format_loading(value: f64) -> String {
    let s = format!("{value:.2}");
    if let Some(rest) = s.strip_prefix("0.") {
        format!(".{rest}")
    } else if let Some(rest) = s.strip_prefix("-0.") {
        if rest.chars().all(|c| c == '0') {
            format!(".{rest}")
        } else {
            format!("-.{rest}")
        }
    } else {
        s
    }
}

/// Proportion as a percentage with one decimal.
pub fn format_percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Optional statistic with `digits` decimals, `n/a` when absent.
pub fn format_stat(value: Option<f64>, digits: usize) -> String {
    value.map_or_else(|| "n/a".to_string(), |v| format!("{v:.digits$}"))
}
