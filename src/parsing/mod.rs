//! LLM response parsing
//!
//! `parse_llm_response` never fails. It walks four tiers and stops at the
//! first that yields at least one expected component:
//!
//! 1. **Strict**: the whole response is a JSON object
//! 2. **Cleaned**: `<think>` blocks, markdown fences, surrounding prose and
//!    trailing commas removed, then parsed as JSON
//! 3. **Pattern**: each component key located and its value recovered on
//!    its own, down to field-level string recovery for truncated output
//! 4. **Default**: every component gets the LLM-error placeholder
//!
//! A field whose value is an array or object fails the strict and cleaned
//! tiers; the pattern tier reports it as unparseable instead.
//!
//! The result always has exactly the expected components, in the expected
//! order. Placeholder text tells "not found", "unable to parse" and
//! "unable to generate" apart.

pub mod cleanup;
pub mod recovery;
pub mod rules;

pub use rules::apply_analysis_rules;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::types::ModelType;
use recovery::Recovered;

/// Which tier produced a parse result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseTier {
    Strict,
    Cleaned,
    Pattern,
    Default,
}

impl std::fmt::Display for ParseTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Strict => "strict",
            Self::Cleaned => "cleaned",
            Self::Pattern => "pattern",
            Self::Default => "default",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentStatus {
    /// Name and interpretation read from the response
    Parsed,
    /// The response never mentions the component
    NotFound,
    /// The component is there but its value could not be read
    Unparseable,
    /// The interpretation is present but empty
    Empty,
    /// Nothing usable came back at all
    LlmError,
    /// Forced by the analysis (FA factor without variables)
    Undefined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentInterpretation {
    /// Factor or cluster key as used in the analysis data
    pub component: String,
    /// Suggested name
    pub name: String,
    pub interpretation: String,
    pub status: ComponentStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedResult {
    pub model_type: ModelType,
    pub tier: ParseTier,
    pub components: Vec<ComponentInterpretation>,
}

impl ParsedResult {
    pub fn get(&self, component: &str) -> Option<&ComponentInterpretation> {
        self.components.iter().find(|c| c.component == component)
    }

    pub fn component_names(&self) -> Vec<&str> {
        self.components.iter().map(|c| c.component.as_str()).collect()
    }

    /// Number of components whose interpretation came from the response.
    pub fn n_parsed(&self) -> usize {
        self.components
            .iter()
            .filter(|c| c.status == ComponentStatus::Parsed)
            .count()
    }
}

/// Parse a raw LLM reply into one interpretation per expected component.
pub fn parse_llm_response(raw: &str, model_type: ModelType, expected: &[String]) -> ParsedResult {
    let defaults: Vec<String> = expected
        .iter()
        .enumerate()
        .map(|(i, c)| rules::default_label(model_type, i, c))
        .collect();

    let attempt = parse_json_tier(raw.trim(), expected, &defaults)
        .map(|c| (ParseTier::Strict, c))
        .or_else(|| {
            cleanup::clean_json(raw)
                .and_then(|cleaned| parse_json_tier(&cleaned, expected, &defaults))
                .map(|c| (ParseTier::Cleaned, c))
        })
        .or_else(|| parse_pattern_tier(raw, expected, &defaults).map(|c| (ParseTier::Pattern, c)));

    let (tier, components) = attempt.unwrap_or_else(|| {
        let components = expected
            .iter()
            .zip(&defaults)
            .map(|(c, d)| rules::placeholder(c, d, ComponentStatus::LlmError))
            .collect();
        (ParseTier::Default, components)
    });

    debug!(
        model_type = %model_type,
        tier = %tier,
        expected = expected.len(),
        "Parsed LLM response"
    );

    ParsedResult {
        model_type,
        tier,
        components,
    }
}

// ============================================================================
// Tiers
// ============================================================================

fn parse_json_tier(
    text: &str,
    expected: &[String],
    defaults: &[String],
) -> Option<Vec<ComponentInterpretation>> {
    let value: Value = serde_json::from_str(text).ok()?;
    let obj = locate_components(&value, expected)?;

    let mut out = Vec::with_capacity(expected.len());
    for (component, default) in expected.iter().zip(defaults) {
        match lookup(obj, component) {
            Some(v) => out.push(rules::component_from_value(v, component, default).ok()?),
            None => out.push(rules::placeholder(component, default, ComponentStatus::NotFound)),
        }
    }
    Some(out)
}

fn parse_pattern_tier(
    raw: &str,
    expected: &[String],
    defaults: &[String],
) -> Option<Vec<ComponentInterpretation>> {
    let text = cleanup::strip_think_tags(raw);
    let mut found_any = false;

    let out = expected
        .iter()
        .zip(defaults)
        .map(|(component, default)| match recovery::find_component(&text, component) {
            None => rules::placeholder(component, default, ComponentStatus::NotFound),
            Some(found) => {
                found_any = true;
                match found {
                    Recovered::Value(v) => rules::component_from_value(&v, component, default)
                        .unwrap_or_else(|_| {
                            rules::placeholder(component, default, ComponentStatus::Unparseable)
                        }),
                    Recovered::Fields {
                        name,
                        interpretation,
                    } => rules::component_from_fields(
                        name.as_deref(),
                        interpretation.as_deref(),
                        component,
                        default,
                    ),
                }
            }
        })
        .collect();

    found_any.then_some(out)
}

/// The object holding the component keys: the top level, or one level down
/// when the reply wraps them (`{"factors": {...}}`).
fn locate_components<'a>(value: &'a Value, expected: &[String]) -> Option<&'a Map<String, Value>> {
    let obj = value.as_object()?;
    let has_any = |o: &Map<String, Value>| expected.iter().any(|c| lookup(o, c).is_some());
    if has_any(obj) {
        return Some(obj);
    }
    obj.values()
        .filter_map(Value::as_object)
        .find(|inner| has_any(inner))
}

/// Exact key first, then a case- and whitespace-insensitive match.
fn lookup<'a>(obj: &'a Map<String, Value>, component: &str) -> Option<&'a Value> {
    obj.get(component).or_else(|| {
        let wanted = component.trim().to_lowercase();
        obj.iter()
            .find(|(k, _)| k.trim().to_lowercase() == wanted)
            .map(|(_, v)| v)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rules::{EMPTY, LLM_ERROR, NOT_FOUND, UNPARSEABLE};

    fn expected() -> Vec<String> {
        vec!["F1".to_string(), "F2".to_string()]
    }

    #[test]
    fn test_strict_tier() {
        let raw = r#"{"F1": {"name": "Sociability", "interpretation": "Enjoys company"},
                      "F2": {"name": "Worry", "interpretation": "Anxious affect"}}"#;
        let r = parse_llm_response(raw, ModelType::Fa, &expected());
        assert_eq!(r.tier, ParseTier::Strict);
        assert_eq!(r.get("F1").unwrap().name, "Sociability");
        assert_eq!(r.n_parsed(), 2);
    }

    #[test]
    fn test_cleaned_tier() {
        let raw = "Here is the result:\n```json\n{\"F1\": {\"name\": \"A\", \"interpretation\": \"B\"},}\n```";
        let r = parse_llm_response(raw, ModelType::Fa, &expected());
        assert_eq!(r.tier, ParseTier::Cleaned);
        assert_eq!(r.get("F1").unwrap().status, ComponentStatus::Parsed);
        assert_eq!(r.get("F2").unwrap().interpretation, NOT_FOUND);
        assert_eq!(r.get("F2").unwrap().name, "Factor 2");
    }

    #[test]
    fn test_array_field_falls_through_to_pattern() {
        let raw = r#"{"F1": {"name": ["A", "B"], "interpretation": "x"},
                      "F2": {"name": "C", "interpretation": "y"}}"#;
        let r = parse_llm_response(raw, ModelType::Fa, &expected());
        assert_eq!(r.tier, ParseTier::Pattern);
        assert_eq!(r.get("F1").unwrap().interpretation, UNPARSEABLE);
        assert_eq!(r.get("F2").unwrap().name, "C");
    }

    #[test]
    fn test_truncated_json_pattern_tier() {
        let raw = r#"{"F1": {"name": "A", "interpretation": "Full text"}, "F2": {"name": "B", "interpretation": "Cut o"#;
        let r = parse_llm_response(raw, ModelType::Fa, &expected());
        assert_eq!(r.tier, ParseTier::Pattern);
        assert_eq!(r.get("F1").unwrap().interpretation, "Full text");
        assert_eq!(r.get("F2").unwrap().interpretation, "Cut o");
    }

    #[test]
    fn test_default_tier() {
        for raw in ["", "I cannot help with that.", "{\"unrelated\": 1}"] {
            let r = parse_llm_response(raw, ModelType::Gm, &expected());
            assert_eq!(r.tier, ParseTier::Default);
            assert_eq!(r.component_names(), vec!["F1", "F2"]);
            assert!(r.components.iter().all(|c| c.interpretation == LLM_ERROR));
        }
    }

    #[test]
    fn test_placeholders_distinguish_cases() {
        let raw = r#"{"F1": {"name": "A", "interpretation": ""}, "F2": null}"#;
        let r = parse_llm_response(raw, ModelType::Fa, &expected());
        assert_eq!(r.get("F1").unwrap().interpretation, EMPTY);
        assert_eq!(r.get("F2").unwrap().interpretation, UNPARSEABLE);
    }

    #[test]
    fn test_wrapped_and_case_insensitive_keys() {
        let raw = r#"{"factors": {"f1": {"name": "A", "interpretation": "B"}}}"#;
        let r = parse_llm_response(raw, ModelType::Fa, &expected());
        assert_eq!(r.tier, ParseTier::Strict);
        assert_eq!(r.get("F1").unwrap().name, "A");
    }

    #[test]
    fn test_canonical_order() {
        let raw = r#"{"F2": {"name": "B", "interpretation": "b"}, "F1": {"name": "A", "interpretation": "a"}}"#;
        let r = parse_llm_response(raw, ModelType::Fa, &expected());
        assert_eq!(r.component_names(), vec!["F1", "F2"]);
    }
}
