//! Parameter registry: the single source of truth for every tunable
//! parameter, its default, type, constraints and owning config group.
//!
//! The registry is built once on first access and is read-only afterwards.
//! Config builders, the settings-file loader and the CLI all validate
//! through it.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;
use tracing::warn;

use crate::error::ValidationError;
use crate::types::ModelType;

// ============================================================================
// Values
// ============================================================================

/// A dynamically typed parameter value as supplied by a caller or config file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Null,
    Bool(bool),
    Int(i64),
    Num(f64),
    Str(String),
}

/// Parameter name → value.
pub type ParamMap = BTreeMap<String, ParamValue>;

impl ParamValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Num(v) => Some(*v),
            #[allow(clippy::cast_precision_loss)]
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) => Some(v),
            _ => None,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "logical",
            Self::Int(_) => "integer",
            Self::Num(_) => "numeric",
            Self::Str(_) => "character",
        }
    }

    /// Convert a TOML value; arrays, tables and datetimes are rejected.
    pub fn from_toml(name: &str, value: &toml::Value) -> Result<Self, ValidationError> {
        match value {
            toml::Value::Boolean(b) => Ok(Self::Bool(*b)),
            toml::Value::Integer(i) => Ok(Self::Int(*i)),
            toml::Value::Float(f) => Ok(Self::Num(*f)),
            toml::Value::String(s) => Ok(Self::Str(s.clone())),
            other => Err(ValidationError::Type {
                name: name.to_string(),
                expected: "a scalar value",
                got: other.type_str().to_string(),
            }),
        }
    }

    /// Convert a JSON value; arrays and objects are rejected.
    pub fn from_json(name: &str, value: &serde_json::Value) -> Result<Self, ValidationError> {
        match value {
            serde_json::Value::Null => Ok(Self::Null),
            serde_json::Value::Bool(b) => Ok(Self::Bool(*b)),
            serde_json::Value::Number(n) => Ok(n
                .as_i64()
                .map_or_else(|| Self::Num(n.as_f64().unwrap_or(f64::NAN)), Self::Int)),
            serde_json::Value::String(s) => Ok(Self::Str(s.clone())),
            serde_json::Value::Array(_) | serde_json::Value::Object(_) => {
                Err(ValidationError::Type {
                    name: name.to_string(),
                    expected: "a scalar value",
                    got: "a JSON array or object".to_string(),
                })
            }
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Num(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "\"{s}\""),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        Self::Num(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

// ============================================================================
// Specs
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    Numeric,
    Integer,
    Character,
    Logical,
}

impl ParamType {
    fn expected(self) -> &'static str {
        match self {
            Self::Numeric => "a number",
            Self::Integer => "an integer",
            Self::Character => "a string",
            Self::Logical => "true or false",
        }
    }
}

/// Which config object a parameter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigGroup {
    Llm,
    Output,
    Interpretation,
}

impl ConfigGroup {
    pub const ALL: [Self; 3] = [Self::Llm, Self::Output, Self::Interpretation];

    /// Section name in the settings file.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Llm => "llm",
            Self::Output => "output",
            Self::Interpretation => "interpretation",
        }
    }
}

impl fmt::Display for ConfigGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validation function attached to a spec. Returns the normalized value.
pub type Validator = fn(&ParameterSpec, &ParamValue) -> Result<ParamValue, ValidationError>;

/// Definition of one parameter.
#[derive(Debug, Clone)]
pub struct ParameterSpec {
    pub name: &'static str,
    /// `ParamValue::Null` means "no default"
    pub default: ParamValue,
    pub param_type: ParamType,
    /// Inclusive `(min, max)`; infinite bounds are open-ended
    pub range: Option<(f64, f64)>,
    pub allowed_values: &'static [&'static str],
    pub config_group: ConfigGroup,
    /// `None` applies to every model type
    pub model_specific: Option<ModelType>,
    pub required: bool,
    pub validator: Validator,
    pub description: &'static str,
}

impl ParameterSpec {
    pub fn validate(&self, value: &ParamValue) -> Result<ParamValue, ValidationError> {
        (self.validator)(self, value)
    }

    pub fn applies_to(&self, model_type: ModelType) -> bool {
        self.model_specific.map_or(true, |m| m == model_type)
    }

    /// Human-readable constraint, e.g. "between 20 and 500".
    pub fn constraint(&self) -> Option<String> {
        if let Some((min, max)) = self.range {
            return Some(match (min.is_finite(), max.is_finite()) {
                (true, true) => format!("between {min} and {max}"),
                (true, false) => format!(">= {min}"),
                (false, true) => format!("<= {max}"),
                (false, false) => return None,
            });
        }
        if !self.allowed_values.is_empty() {
            return Some(format!("one of: {}", self.allowed_values.join(", ")));
        }
        None
    }
}

/// Type, range and allowed-set checks shared by every parameter.
pub fn validate_standard(
    spec: &ParameterSpec,
    value: &ParamValue,
) -> Result<ParamValue, ValidationError> {
    let name = spec.name.to_string();

    if value.is_null() {
        if spec.required {
            return Err(ValidationError::Missing { name });
        }
        if spec.default.is_null() {
            return Ok(ParamValue::Null);
        }
        return Err(ValidationError::Type {
            name,
            expected: spec.param_type.expected(),
            got: "null".to_string(),
        });
    }

    let type_error = || ValidationError::Type {
        name: spec.name.to_string(),
        expected: spec.param_type.expected(),
        got: format!("{} {value}", value.kind()),
    };

    let normalized = match (spec.param_type, value) {
        (ParamType::Numeric, ParamValue::Num(v)) if v.is_finite() => ParamValue::Num(*v),
        (ParamType::Numeric, ParamValue::Int(_)) => {
            ParamValue::Num(value.as_f64().ok_or_else(type_error)?)
        }
        (ParamType::Integer, ParamValue::Int(v)) => ParamValue::Int(*v),
        #[allow(clippy::cast_possible_truncation)]
        (ParamType::Integer, ParamValue::Num(v)) if v.is_finite() && v.fract() == 0.0 => {
            ParamValue::Int(*v as i64)
        }
        (ParamType::Logical, ParamValue::Bool(v)) => ParamValue::Bool(*v),
        (ParamType::Character, ParamValue::Str(s)) => {
            let trimmed = s.trim();
            if spec.required && trimmed.is_empty() {
                return Err(ValidationError::Missing { name });
            }
            ParamValue::Str(if spec.allowed_values.is_empty() {
                s.clone()
            } else {
                trimmed.to_string()
            })
        }
        _ => return Err(type_error()),
    };

    if let (Some((min, max)), Some(v)) = (spec.range, normalized.as_f64()) {
        if v < min || v > max {
            return Err(ValidationError::Range {
                name,
                value: normalized.to_string(),
                constraint: spec.constraint().unwrap_or_default(),
            });
        }
    }

    if !spec.allowed_values.is_empty() {
        if let Some(s) = normalized.as_str() {
            if !spec.allowed_values.contains(&s) {
                return Err(ValidationError::NotAllowed {
                    name,
                    value: s.to_string(),
                    allowed: spec.allowed_values.join(", "),
                });
            }
        }
    }

    Ok(normalized)
}

/// `silent` also accepts booleans: `false → 0`, `true → 2`.
fn validate_silent(spec: &ParameterSpec, value: &ParamValue) -> Result<ParamValue, ValidationError> {
    match value {
        ParamValue::Bool(false) => Ok(ParamValue::Int(0)),
        ParamValue::Bool(true) => Ok(ParamValue::Int(2)),
        other => validate_standard(spec, other),
    }
}

// ============================================================================
// Registry
// ============================================================================

/// Immutable table of every known parameter, keyed by name.
#[derive(Debug)]
pub struct ParameterRegistry {
    specs: Vec<ParameterSpec>,
    index: HashMap<&'static str, usize>,
}

impl ParameterRegistry {
    fn new(specs: Vec<ParameterSpec>) -> Self {
        let index = specs.iter().enumerate().map(|(i, s)| (s.name, i)).collect();
        Self { specs, index }
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.index.get(name).map(|&i| &self.specs[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Specs in definition order.
    pub fn iter(&self) -> std::slice::Iter<'_, ParameterSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Specs of one group; the model-type filter only narrows the
    /// interpretation group.
    pub fn by_group(&self, group: ConfigGroup, model_type: Option<ModelType>) -> Vec<&ParameterSpec> {
        if model_type.is_some() && group != ConfigGroup::Interpretation {
            warn!(
                group = %group,
                "model_type filter only applies to interpretation parameters; ignoring it"
            );
        }
        self.specs
            .iter()
            .filter(|s| s.config_group == group)
            .filter(|s| match (group, model_type) {
                (ConfigGroup::Interpretation, Some(m)) => s.applies_to(m),
                _ => true,
            })
            .collect()
    }
}

static REGISTRY: OnceLock<ParameterRegistry> = OnceLock::new();

/// The process-wide parameter registry.
pub fn registry() -> &'static ParameterRegistry {
    REGISTRY.get_or_init(|| ParameterRegistry::new(builtin_specs()))
}

const UNBOUNDED: f64 = f64::INFINITY;

#[allow(clippy::too_many_lines)]
fn builtin_specs() -> Vec<ParameterSpec> {
    let spec = |name: &'static str,
                group: ConfigGroup,
                param_type: ParamType,
                default: ParamValue,
                description: &'static str| ParameterSpec {
        name,
        default,
        param_type,
        range: None,
        allowed_values: &[],
        config_group: group,
        model_specific: None,
        required: false,
        validator: validate_standard,
        description,
    };

    use ConfigGroup::{Interpretation, Llm, Output};
    use ParamType::{Character, Integer, Logical, Numeric};

    vec![
        // [llm]
        ParameterSpec {
            required: true,
            ..spec("llm_provider", Llm, Character, ParamValue::Null,
                "LLM provider (openai, ollama, lmstudio, openrouter, or any OpenAI-compatible endpoint)")
        },
        spec("llm_model", Llm, Character, ParamValue::Null,
            "Model identifier; provider default when unset"),
        spec("base_url", Llm, Character, ParamValue::Null,
            "Override of the provider's chat-completions base URL"),
        ParameterSpec {
            range: Some((20.0, 500.0)),
            ..spec("word_limit", Llm, Integer, ParamValue::Int(150),
                "Target word count for each component interpretation")
        },
        spec("system_prompt", Llm, Character, ParamValue::Null,
            "Custom system prompt replacing the built-in one"),
        spec("additional_info", Llm, Character, ParamValue::Null,
            "Free-text study context appended to the main prompt"),
        ParameterSpec {
            allowed_values: &["none", "output", "all"],
            ..spec("echo", Llm, Character, ParamValue::from("none"),
                "Log LLM traffic: none, the response only, or prompts and response")
        },
        ParameterSpec {
            range: Some((0.0, 2.0)),
            ..spec("temperature", Llm, Numeric, ParamValue::Null,
                "Sampling temperature passed to the provider")
        },
        // [output]
        ParameterSpec {
            allowed_values: &["cli", "markdown"],
            ..spec("format", Output, Character, ParamValue::from("cli"),
                "Report format")
        },
        ParameterSpec {
            range: Some((1.0, 6.0)),
            ..spec("heading_level", Output, Integer, ParamValue::Int(1),
                "Markdown heading level of the report title")
        },
        spec("suppress_heading", Output, Logical, ParamValue::Bool(false),
            "Omit the report title"),
        ParameterSpec {
            range: Some((40.0, 300.0)),
            ..spec("max_line_length", Output, Integer, ParamValue::Int(80),
                "Wrap width for CLI reports")
        },
        ParameterSpec {
            range: Some((0.0, 2.0)),
            validator: validate_silent,
            ..spec("silent", Output, Integer, ParamValue::Int(0),
                "0 = report and messages, 1 = messages only, 2 = nothing; booleans accepted")
        },
        // [interpretation] factor analysis
        ParameterSpec {
            range: Some((0.0, 1.0)),
            model_specific: Some(ModelType::Fa),
            ..spec("cutoff", Interpretation, Numeric, ParamValue::Num(0.3),
                "Minimum absolute loading treated as significant")
        },
        ParameterSpec {
            range: Some((0.0, UNBOUNDED)),
            model_specific: Some(ModelType::Fa),
            ..spec("n_emergency", Interpretation, Integer, ParamValue::Int(2),
                "Top loadings used for a factor with no significant loading; 0 marks it undefined")
        },
        ParameterSpec {
            model_specific: Some(ModelType::Fa),
            ..spec("hide_low_loadings", Interpretation, Logical, ParamValue::Bool(false),
                "Blank out loadings below the cutoff in the prompt table")
        },
        ParameterSpec {
            model_specific: Some(ModelType::Fa),
            ..spec("sort_loadings", Interpretation, Logical, ParamValue::Bool(true),
                "Order each factor's variables by absolute loading")
        },
        // [interpretation] gaussian mixture
        ParameterSpec {
            range: Some((1.0, UNBOUNDED)),
            model_specific: Some(ModelType::Gm),
            ..spec("min_cluster_size", Interpretation, Integer, ParamValue::Int(5),
                "Clusters with fewer assigned observations are flagged as small")
        },
        ParameterSpec {
            range: Some((0.0, 1.0)),
            model_specific: Some(ModelType::Gm),
            ..spec("separation_threshold", Interpretation, Numeric, ParamValue::Num(0.3),
                "Standardized mean distance below which two clusters are flagged as overlapping")
        },
        ParameterSpec {
            range: Some((0.0, UNBOUNDED)),
            model_specific: Some(ModelType::Gm),
            ..spec("n_distinguishing", Interpretation, Integer, ParamValue::Int(5),
                "Number of most distinguishing variables listed in the prompt")
        },
    ]
}

// ============================================================================
// Validation entry points
// ============================================================================

/// Validate one value against the registry.
///
/// Names the registry does not know pass through unchanged.
pub fn validate_param(name: &str, value: &ParamValue) -> Result<ParamValue, ValidationError> {
    match registry().get(name) {
        Some(spec) => spec.validate(value),
        None => Ok(value.clone()),
    }
}

/// Validate every entry, stopping at the first failure.
pub fn validate_params(params: &ParamMap) -> Result<ParamMap, ValidationError> {
    params
        .iter()
        .map(|(k, v)| validate_param(k, v).map(|nv| (k.clone(), nv)))
        .collect()
}

/// Per-key outcome of validating a whole map.
#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub entries: BTreeMap<String, Result<ParamValue, ValidationError>>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.entries.values().all(Result::is_ok)
    }

    pub fn failures(&self) -> Vec<&ValidationError> {
        self.entries.values().filter_map(|r| r.as_ref().err()).collect()
    }

    /// Normalized map, or every failure.
    pub fn into_params(self) -> Result<ParamMap, Vec<ValidationError>> {
        let mut params = ParamMap::new();
        let mut errors = Vec::new();
        for (k, r) in self.entries {
            match r {
                Ok(v) => {
                    params.insert(k, v);
                }
                Err(e) => errors.push(e),
            }
        }
        if errors.is_empty() {
            Ok(params)
        } else {
            Err(errors)
        }
    }
}

/// Validate every entry without failing, collecting pass/fail per key.
pub fn validate_params_report(params: &ParamMap) -> ValidationReport {
    ValidationReport {
        entries: params
            .iter()
            .map(|(k, v)| (k.clone(), validate_param(k, v)))
            .collect(),
    }
}

/// Registry specs for one config group, optionally narrowed by model type.
pub fn get_params_by_group(
    group: ConfigGroup,
    model_type: Option<ModelType>,
) -> Vec<&'static ParameterSpec> {
    registry().by_group(group, model_type)
}
