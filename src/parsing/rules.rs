//! Field normalization and the analysis rules applied after parsing.

use serde_json::{Map, Value};

use super::{ComponentInterpretation, ComponentStatus, ParsedResult};
use crate::extract::AnalysisData;
use crate::types::ModelType;

pub const NOT_FOUND: &str = "Interpretation not found in response";
pub const UNPARSEABLE: &str = "Unable to parse interpretation";
pub const EMPTY: &str = "Unable to generate interpretation";
pub const LLM_ERROR: &str = "Unable to generate interpretation due to LLM error";

/// Name forced onto factors with neither significant nor emergency variables.
pub const UNDEFINED_NAME: &str = "undefined";
pub const UNDEFINED_INTERPRETATION: &str =
    "No variable loads at or above the cutoff, so this factor is undefined.";
/// Appended to names of factors described by emergency-rule variables.
pub const NOT_SIGNIFICANT_SUFFIX: &str = " (n.s.)";

/// A field had a shape no rule can turn into text (an array or object).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldFailure;

/// Fallback name: `Factor N` for FA, the component's own name otherwise.
pub fn default_label(model_type: ModelType, index: usize, component: &str) -> String {
    match model_type {
        ModelType::Fa => format!("Factor {}", index + 1),
        _ => component.to_string(),
    }
}

pub fn normalize_name(value: Option<&Value>, default: &str) -> Result<String, FieldFailure> {
    match value {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(s)) => {
            let t = s.trim();
            if t.is_empty() || t.eq_ignore_ascii_case("na") || t.eq_ignore_ascii_case("null") {
                Ok(default.to_string())
            } else {
                Ok(t.to_string())
            }
        }
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Bool(b)) => Ok(b.to_string()),
        Some(Value::Array(_) | Value::Object(_)) => Err(FieldFailure),
    }
}

pub fn normalize_interpretation(
    value: Option<&Value>,
) -> Result<(String, ComponentStatus), FieldFailure> {
    match value {
        None | Some(Value::Null) => Ok((UNPARSEABLE.to_string(), ComponentStatus::Unparseable)),
        Some(Value::String(s)) => Ok(text_status(s)),
        Some(Value::Number(n)) => Ok((n.to_string(), ComponentStatus::Parsed)),
        Some(Value::Bool(b)) => Ok((b.to_string(), ComponentStatus::Parsed)),
        Some(Value::Array(_) | Value::Object(_)) => Err(FieldFailure),
    }
}

fn text_status(s: &str) -> (String, ComponentStatus) {
    let t = s.trim();
    if t.is_empty() {
        (EMPTY.to_string(), ComponentStatus::Empty)
    } else {
        (t.to_string(), ComponentStatus::Parsed)
    }
}

pub fn component_from_object(
    obj: &Map<String, Value>,
    component: &str,
    default: &str,
) -> Result<ComponentInterpretation, FieldFailure> {
    let name = normalize_name(obj.get("name"), default)?;
    let (interpretation, status) = normalize_interpretation(obj.get("interpretation"))?;
    Ok(ComponentInterpretation {
        component: component.to_string(),
        name,
        interpretation,
        status,
    })
}

/// Component from whatever JSON value sat under its key. A bare string is
/// taken as the interpretation.
pub fn component_from_value(
    value: &Value,
    component: &str,
    default: &str,
) -> Result<ComponentInterpretation, FieldFailure> {
    match value {
        Value::Object(obj) => component_from_object(obj, component, default),
        Value::Array(_) => Err(FieldFailure),
        other => {
            let (interpretation, status) = normalize_interpretation(Some(other))?;
            Ok(ComponentInterpretation {
                component: component.to_string(),
                name: default.to_string(),
                interpretation,
                status,
            })
        }
    }
}

/// Component from fields read out of a broken object.
pub fn component_from_fields(
    name: Option<&str>,
    interpretation: Option<&str>,
    component: &str,
    default: &str,
) -> ComponentInterpretation {
    let name = normalize_name(name.map(|n| Value::String(n.to_string())).as_ref(), default)
        .unwrap_or_else(|_| default.to_string());
    let (interpretation, status) = match interpretation {
        Some(text) => text_status(text),
        None => (UNPARSEABLE.to_string(), ComponentStatus::Unparseable),
    };
    ComponentInterpretation {
        component: component.to_string(),
        name,
        interpretation,
        status,
    }
}

pub fn placeholder(component: &str, default: &str, status: ComponentStatus) -> ComponentInterpretation {
    let text = match status {
        ComponentStatus::NotFound => NOT_FOUND,
        ComponentStatus::Empty => EMPTY,
        ComponentStatus::LlmError => LLM_ERROR,
        ComponentStatus::Undefined => UNDEFINED_INTERPRETATION,
        ComponentStatus::Unparseable | ComponentStatus::Parsed => UNPARSEABLE,
    };
    ComponentInterpretation {
        component: component.to_string(),
        name: default.to_string(),
        interpretation: text.to_string(),
        status,
    }
}

/// Enforce what the analysis data already decided, whatever the LLM said.
///
/// FA undefined factors are renamed `undefined`; factors described by
/// emergency-rule variables get the ` (n.s.)` suffix.
pub fn apply_analysis_rules(mut parsed: ParsedResult, analysis: &AnalysisData) -> ParsedResult {
    let AnalysisData::Fa(fa) = analysis else {
        return parsed;
    };

    for c in &mut parsed.components {
        let Some(factor) = fa.factor(&c.component) else {
            continue;
        };
        if factor.undefined {
            c.name = UNDEFINED_NAME.to_string();
            c.interpretation = UNDEFINED_INTERPRETATION.to_string();
            c.status = ComponentStatus::Undefined;
        } else if factor.emergency && !c.name.ends_with(NOT_SIGNIFICANT_SUFFIX) {
            c.name.push_str(NOT_SIGNIFICANT_SUFFIX);
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_name_defaults() {
        for v in [json!(""), json!("  "), json!("NA"), json!("null"), Value::Null] {
            assert_eq!(normalize_name(Some(&v), "Factor 1").unwrap(), "Factor 1");
        }
        assert_eq!(normalize_name(None, "Factor 2").unwrap(), "Factor 2");
        assert_eq!(normalize_name(Some(&json!(42)), "F").unwrap(), "42");
        assert_eq!(normalize_name(Some(&json!(["a"])), "F"), Err(FieldFailure));
    }

    #[test]
    fn test_interpretation_statuses() {
        let (text, status) = normalize_interpretation(Some(&json!("  "))).unwrap();
        assert_eq!(text, EMPTY);
        assert_eq!(status, ComponentStatus::Empty);

        let (text, status) = normalize_interpretation(Some(&Value::Null)).unwrap();
        assert_eq!(text, UNPARSEABLE);
        assert_eq!(status, ComponentStatus::Unparseable);

        let (text, _) = normalize_interpretation(Some(&json!(3.5))).unwrap();
        assert_eq!(text, "3.5");

        assert!(normalize_interpretation(Some(&json!({"a": 1}))).is_err());
    }

    #[test]
    fn test_bare_string_value() {
        let c = component_from_value(&json!("Worry and tension"), "F2", "Factor 2").unwrap();
        assert_eq!(c.name, "Factor 2");
        assert_eq!(c.interpretation, "Worry and tension");
        assert_eq!(c.status, ComponentStatus::Parsed);
    }

    #[test]
    fn test_default_labels() {
        assert_eq!(default_label(ModelType::Fa, 0, "MR1"), "Factor 1");
        assert_eq!(default_label(ModelType::Gm, 2, "Cluster 3"), "Cluster 3");
    }
}
