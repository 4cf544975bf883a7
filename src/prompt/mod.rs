//! Prompt construction
//!
//! Pure functions from analysis data and configuration to the
//! `(system, main)` prompt pair. Identical inputs give byte-identical
//! prompts: nothing here reads the clock, the environment or a RNG, and
//! every collection is rendered in the analysis data's own order.

pub mod fa;
pub mod format;
pub mod gm;

use serde::{Deserialize, Serialize};

use crate::config::LlmArgs;
use crate::error::{InterpretError, Result};
use crate::extract::AnalysisData;
use crate::types::{ModelType, VariableMetadata};

/// System and user prompt for a single interpretation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptPair {
    pub system_prompt: String,
    pub main_prompt: String,
}

/// Built-in system prompt for `model_type`.
///
/// With a word limit the prompt carries an extra length rule; without one
/// the text is identical for every call.
pub fn build_system_prompt(model_type: ModelType, word_limit: Option<usize>) -> Result<String> {
    let template = match model_type {
        ModelType::Fa => fa::FA_SYSTEM_PROMPT,
        ModelType::Gm => gm::GM_SYSTEM_PROMPT,
        other => return Err(InterpretError::NotImplemented(other)),
    };
    let rule = word_limit
        .map(|n| format!("   Keep every interpretation under {n} words.\n"))
        .unwrap_or_default();
    Ok(template.replace("{word_limit_rule}", &rule))
}

/// Main (user) prompt: components, variable descriptions, diagnostics,
/// optional context and the JSON reply contract.
pub fn build_main_prompt(
    analysis: &AnalysisData,
    metadata: &VariableMetadata,
    word_limit: usize,
    additional_info: Option<&str>,
) -> String {
    let mut out = match analysis {
        AnalysisData::Fa(d) => fa::main_prompt(d, metadata),
        AnalysisData::Gm(d) => gm::main_prompt(d, metadata),
    };

    if let Some(info) = additional_info.filter(|s| !s.trim().is_empty()) {
        out.push_str("\n### ADDITIONAL CONTEXT\n");
        out.push_str(info);
        out.push('\n');
    }

    out.push_str(&json_contract(
        analysis.model_type(),
        &analysis.component_names(),
        word_limit,
    ));
    out
}

/// Both prompts for one call. A custom `system_prompt` replaces the
/// built-in one verbatim.
pub fn build_prompts(
    analysis: &AnalysisData,
    metadata: &VariableMetadata,
    llm: &LlmArgs,
) -> Result<PromptPair> {
    let system_prompt = match llm.system_prompt.as_deref() {
        Some(custom) if !custom.trim().is_empty() => custom.to_string(),
        _ => build_system_prompt(analysis.model_type(), Some(llm.word_limit))?,
    };
    let main_prompt = build_main_prompt(
        analysis,
        metadata,
        llm.word_limit,
        llm.additional_info.as_deref(),
    );
    Ok(PromptPair {
        system_prompt,
        main_prompt,
    })
}

fn json_contract(model_type: ModelType, components: &[String], word_limit: usize) -> String {
    let label = model_type.component_label().to_lowercase();
    let mut out = String::from("\n### OUTPUT FORMAT\n");
    out.push_str(&format!(
        "Reply with ONLY a JSON object with one key per {label}, using exactly these keys: {}.\n",
        components
            .iter()
            .map(|c| format!("\"{c}\""))
            .collect::<Vec<_>>()
            .join(", ")
    ));
    out.push_str(&format!(
        "Each value is an object with a \"name\" (2 to 4 words) and an \"interpretation\" (at most {word_limit} words).\n\n"
    ));
    out.push_str("{\n");
    for (i, c) in components.iter().enumerate() {
        let comma = if i + 1 < components.len() { "," } else { "" };
        out.push_str(&format!(
            "  \"{}\": {{\"name\": \"...\", \"interpretation\": \"...\"}}{comma}\n",
            escape_json(c)
        ));
    }
    out.push_str("}\n");
    out
}

fn escape_json(s: &str) -> String {
    serde_json::to_string(s)
        .map(|quoted| quoted.trim_matches('"').to_string())
        .unwrap_or_else(|_| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InterpretationArgs;
    use crate::extract::{extract, FactorSolution, ModelInput};

    fn fixture() -> (AnalysisData, VariableMetadata) {
        let meta = VariableMetadata::from_pairs([
            ("var1", "I enjoy parties"),
            ("var2", "I talk to many people"),
            ("var3", "I worry about things"),
        ])
        .unwrap();
        let input = ModelInput::FactorSolution(FactorSolution {
            variables: vec!["var1".into(), "var2".into(), "var3".into()],
            factors: Some(vec!["MR1".into(), "MR2".into()]),
            loadings: vec![vec![0.8, 0.1], vec![0.7, 0.15], vec![0.1, 0.9]],
            factor_correlations: Some(vec![vec![1.0, 0.25], vec![0.25, 1.0]]),
            rotation: Some("oblimin".into()),
        });
        let args = InterpretationArgs::defaults(ModelType::Fa).unwrap();
        let out = extract(ModelType::Fa, &input, &meta, &args).unwrap();
        (out.analysis, meta)
    }

    #[test]
    fn test_main_prompt_is_deterministic() {
        let (analysis, meta) = fixture();
        let a = build_main_prompt(&analysis, &meta, 150, Some("Adolescent sample"));
        let b = build_main_prompt(&analysis, &meta, 150, Some("Adolescent sample"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_additional_info_lengthens_prompt() {
        let (analysis, meta) = fixture();
        let base = build_main_prompt(&analysis, &meta, 150, None);
        let short = build_main_prompt(&analysis, &meta, 150, Some("x"));
        let long = build_main_prompt(&analysis, &meta, 150, Some("xx"));
        assert!(short.len() > base.len());
        assert!(long.len() > short.len());
    }

    #[test]
    fn test_main_prompt_renders_everything() {
        let (analysis, meta) = fixture();
        let p = build_main_prompt(&analysis, &meta, 150, None);
        for needle in [
            "MR1",
            "MR2",
            "I enjoy parties",
            "I worry about things",
            "|loading| >= .30",
            "Emergency rule: 2",
            "FACTOR CORRELATIONS",
            "MR2 .25",
            "\"name\"",
            "\"interpretation\"",
        ] {
            assert!(p.contains(needle), "missing {needle}");
        }
    }

    #[test]
    fn test_system_prompt_word_limit() {
        let with = build_system_prompt(ModelType::Fa, Some(120)).unwrap();
        let without = build_system_prompt(ModelType::Fa, None).unwrap();
        assert!(with.contains("120 words"));
        assert!(!without.contains("{word_limit_rule}"));
        assert!(build_system_prompt(ModelType::Irt, None).is_err());
    }

    #[test]
    fn test_custom_system_prompt_replaces_builtin() {
        let (analysis, meta) = fixture();
        let llm = LlmArgs::new("ollama")
            .unwrap()
            .with_param("system_prompt", "Be brief.")
            .unwrap();
        let pair = build_prompts(&analysis, &meta, &llm).unwrap();
        assert_eq!(pair.system_prompt, "Be brief.");
    }
}
