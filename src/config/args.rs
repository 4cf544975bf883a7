//! Typed configuration objects built from registry defaults plus
//! caller-supplied values.
//!
//! Each object is validated once at construction and never mutated
//! afterwards; the `with_*` helpers return a freshly validated copy.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::registry::{registry, ConfigGroup, ParamMap, ParamValue};
use crate::error::{InterpretError, Result, ValidationError};
use crate::types::ModelType;

// ============================================================================
// Group resolution
// ============================================================================

/// Resolve every parameter of `group` (narrowed to `model_type` for the
/// interpretation group) to a validated value: the caller's if present,
/// otherwise the registry default.
///
/// Keys belonging to other groups are ignored so one merged map can feed
/// all three builders. Interpretation keys registered for a different model
/// type are rejected.
fn resolve_group(
    group: ConfigGroup,
    model_type: Option<ModelType>,
    params: &ParamMap,
) -> Result<ParamMap> {
    let reg = registry();

    if let (ConfigGroup::Interpretation, Some(mt)) = (group, model_type) {
        for key in params.keys() {
            if let Some(spec) = reg.get(key) {
                if spec.config_group == ConfigGroup::Interpretation && !spec.applies_to(mt) {
                    return Err(ValidationError::NotApplicable {
                        name: key.clone(),
                        model_type: mt,
                    }
                    .into());
                }
            } else {
                debug!(param = %key, "Unregistered parameter passed through");
            }
        }
    }

    let mut resolved = ParamMap::new();
    for spec in reg.iter().filter(|s| s.config_group == group) {
        if let (ConfigGroup::Interpretation, Some(mt)) = (group, model_type) {
            if !spec.applies_to(mt) {
                continue;
            }
        }
        let value = match params.get(spec.name) {
            Some(v) => spec.validate(v)?,
            None if spec.required => {
                return Err(ValidationError::Missing {
                    name: spec.name.to_string(),
                }
                .into())
            }
            None => spec.default.clone(),
        };
        resolved.insert(spec.name.to_string(), value);
    }
    Ok(resolved)
}

fn internal_type_error(name: &str, expected: &'static str, got: Option<&ParamValue>) -> InterpretError {
    ValidationError::Type {
        name: name.to_string(),
        expected,
        got: got.map_or_else(|| "nothing".to_string(), ToString::to_string),
    }
    .into()
}

fn get_f64(map: &ParamMap, name: &str) -> Result<f64> {
    let v = map.get(name);
    v.and_then(ParamValue::as_f64)
        .ok_or_else(|| internal_type_error(name, "a number", v))
}

fn get_opt_f64(map: &ParamMap, name: &str) -> Result<Option<f64>> {
    match map.get(name) {
        None | Some(ParamValue::Null) => Ok(None),
        Some(_) => get_f64(map, name).map(Some),
    }
}

fn get_usize(map: &ParamMap, name: &str) -> Result<usize> {
    let v = map.get(name);
    v.and_then(ParamValue::as_i64)
        .and_then(|i| usize::try_from(i).ok())
        .ok_or_else(|| internal_type_error(name, "a non-negative integer", v))
}

fn get_bool(map: &ParamMap, name: &str) -> Result<bool> {
    let v = map.get(name);
    v.and_then(ParamValue::as_bool)
        .ok_or_else(|| internal_type_error(name, "true or false", v))
}

fn get_string(map: &ParamMap, name: &str) -> Result<String> {
    let v = map.get(name);
    v.and_then(ParamValue::as_str)
        .map(str::to_string)
        .ok_or_else(|| internal_type_error(name, "a string", v))
}

fn get_opt_string(map: &ParamMap, name: &str) -> Result<Option<String>> {
    match map.get(name) {
        None | Some(ParamValue::Null) => Ok(None),
        Some(_) => get_string(map, name).map(Some),
    }
}

// ============================================================================
// Interpretation args
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaInterpretationArgs {
    pub cutoff: f64,
    pub n_emergency: usize,
    pub hide_low_loadings: bool,
    pub sort_loadings: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GmInterpretationArgs {
    pub min_cluster_size: usize,
    pub separation_threshold: f64,
    pub n_distinguishing: usize,
}

/// Model-specific interpretation settings, tagged with the model type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "analysis_type", rename_all = "lowercase")]
pub enum InterpretationArgs {
    Fa(FaInterpretationArgs),
    Gm(GmInterpretationArgs),
}

impl InterpretationArgs {
    pub fn from_params(model_type: ModelType, params: &ParamMap) -> Result<Self> {
        if !model_type.is_implemented() {
            return Err(InterpretError::NotImplemented(model_type));
        }
        let r = resolve_group(ConfigGroup::Interpretation, Some(model_type), params)?;
        Ok(match model_type {
            ModelType::Fa => Self::Fa(FaInterpretationArgs {
                cutoff: get_f64(&r, "cutoff")?,
                n_emergency: get_usize(&r, "n_emergency")?,
                hide_low_loadings: get_bool(&r, "hide_low_loadings")?,
                sort_loadings: get_bool(&r, "sort_loadings")?,
            }),
            ModelType::Gm => Self::Gm(GmInterpretationArgs {
                min_cluster_size: get_usize(&r, "min_cluster_size")?,
                separation_threshold: get_f64(&r, "separation_threshold")?,
                n_distinguishing: get_usize(&r, "n_distinguishing")?,
            }),
            other => return Err(InterpretError::NotImplemented(other)),
        })
    }

    /// Registry defaults for `model_type`.
    pub fn defaults(model_type: ModelType) -> Result<Self> {
        Self::from_params(model_type, &ParamMap::new())
    }

    pub fn model_type(&self) -> ModelType {
        match self {
            Self::Fa(_) => ModelType::Fa,
            Self::Gm(_) => ModelType::Gm,
        }
    }

    /// Current values as a parameter map (for rebuilding with overrides).
    pub fn to_params(&self) -> ParamMap {
        let mut m = ParamMap::new();
        match self {
            Self::Fa(a) => {
                m.insert("cutoff".into(), a.cutoff.into());
                m.insert("n_emergency".into(), usize_param(a.n_emergency));
                m.insert("hide_low_loadings".into(), a.hide_low_loadings.into());
                m.insert("sort_loadings".into(), a.sort_loadings.into());
            }
            Self::Gm(a) => {
                m.insert("min_cluster_size".into(), usize_param(a.min_cluster_size));
                m.insert("separation_threshold".into(), a.separation_threshold.into());
                m.insert("n_distinguishing".into(), usize_param(a.n_distinguishing));
            }
        }
        m
    }

    /// New validated object with one parameter replaced.
    pub fn with_param(&self, name: &str, value: impl Into<ParamValue>) -> Result<Self> {
        let mut params = self.to_params();
        params.insert(name.to_string(), value.into());
        Self::from_params(self.model_type(), &params)
    }

    pub fn as_fa(&self) -> Option<&FaInterpretationArgs> {
        match self {
            Self::Fa(a) => Some(a),
            Self::Gm(_) => None,
        }
    }

    pub fn as_gm(&self) -> Option<&GmInterpretationArgs> {
        match self {
            Self::Gm(a) => Some(a),
            Self::Fa(_) => None,
        }
    }
}

fn usize_param(v: usize) -> ParamValue {
    ParamValue::Int(i64::try_from(v).unwrap_or(i64::MAX))
}

// ============================================================================
// LLM args
// ============================================================================

/// How much LLM traffic is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EchoLevel {
    None,
    Output,
    All,
}

impl EchoLevel {
    fn parse(s: &str) -> Self {
        match s {
            "output" => Self::Output,
            "all" => Self::All,
            _ => Self::None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmArgs {
    pub provider: String,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub word_limit: usize,
    pub system_prompt: Option<String>,
    pub additional_info: Option<String>,
    pub echo: EchoLevel,
    pub temperature: Option<f64>,
}

impl LlmArgs {
    pub fn from_params(params: &ParamMap) -> Result<Self> {
        let r = resolve_group(ConfigGroup::Llm, None, params)?;
        Ok(Self {
            provider: get_string(&r, "llm_provider")?.trim().to_string(),
            model: get_opt_string(&r, "llm_model")?,
            base_url: get_opt_string(&r, "base_url")?,
            word_limit: get_usize(&r, "word_limit")?,
            system_prompt: get_opt_string(&r, "system_prompt")?,
            additional_info: get_opt_string(&r, "additional_info")?,
            echo: EchoLevel::parse(&get_string(&r, "echo")?),
            temperature: get_opt_f64(&r, "temperature")?,
        })
    }

    /// Defaults for everything but the provider.
    pub fn new(provider: &str) -> Result<Self> {
        let mut params = ParamMap::new();
        params.insert("llm_provider".into(), provider.into());
        Self::from_params(&params)
    }

    pub fn to_params(&self) -> ParamMap {
        let opt = |v: &Option<String>| v.clone().map_or(ParamValue::Null, ParamValue::Str);
        let mut m = ParamMap::new();
        m.insert("llm_provider".into(), self.provider.clone().into());
        m.insert("llm_model".into(), opt(&self.model));
        m.insert("base_url".into(), opt(&self.base_url));
        m.insert("word_limit".into(), usize_param(self.word_limit));
        m.insert("system_prompt".into(), opt(&self.system_prompt));
        m.insert("additional_info".into(), opt(&self.additional_info));
        let echo = match self.echo {
            EchoLevel::None => "none",
            EchoLevel::Output => "output",
            EchoLevel::All => "all",
        };
        m.insert("echo".into(), echo.into());
        m.insert(
            "temperature".into(),
            self.temperature.map_or(ParamValue::Null, ParamValue::Num),
        );
        m
    }

    /// New validated object with one parameter replaced.
    pub fn with_param(&self, name: &str, value: impl Into<ParamValue>) -> Result<Self> {
        let mut params = self.to_params();
        params.insert(name.to_string(), value.into());
        Self::from_params(&params)
    }

    pub fn with_model(&self, model: &str) -> Result<Self> {
        self.with_param("llm_model", model)
    }

    pub fn with_additional_info(&self, info: &str) -> Result<Self> {
        self.with_param("additional_info", info)
    }

    pub fn with_word_limit(&self, word_limit: i64) -> Result<Self> {
        self.with_param("word_limit", word_limit)
    }
}

// ============================================================================
// Output args
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Cli,
    Markdown,
}

impl OutputFormat {
    /// File extension used by the exporter.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Cli => "txt",
            Self::Markdown => "md",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Cli => "cli",
            Self::Markdown => "markdown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputArgs {
    pub format: OutputFormat,
    pub heading_level: u8,
    pub suppress_heading: bool,
    pub max_line_length: usize,
    /// 0 = report and messages, 1 = messages only, 2 = nothing
    pub silent: u8,
}

impl OutputArgs {
    pub fn from_params(params: &ParamMap) -> Result<Self> {
        let r = resolve_group(ConfigGroup::Output, None, params)?;
        let format = match get_string(&r, "format")?.as_str() {
            "markdown" => OutputFormat::Markdown,
            _ => OutputFormat::Cli,
        };
        Ok(Self {
            format,
            heading_level: u8::try_from(get_usize(&r, "heading_level")?).unwrap_or(1),
            suppress_heading: get_bool(&r, "suppress_heading")?,
            max_line_length: get_usize(&r, "max_line_length")?,
            silent: u8::try_from(get_usize(&r, "silent")?).unwrap_or(2),
        })
    }

    /// Whether the caller should print the report.
    pub fn shows_report(&self) -> bool {
        self.silent == 0
    }

    /// Whether warnings and progress messages are logged.
    pub fn shows_messages(&self) -> bool {
        self.silent < 2
    }

    pub fn with_format(&self, format: OutputFormat) -> Self {
        Self {
            format,
            ..self.clone()
        }
    }
}

impl Default for OutputArgs {
    fn default() -> Self {
        Self {
            format: OutputFormat::Cli,
            heading_level: 1,
            suppress_heading: false,
            max_line_length: 80,
            silent: 0,
        }
    }
}
