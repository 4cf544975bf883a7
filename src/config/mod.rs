//! Configuration
//!
//! Parameters are defined once in the [`registry`] and materialize as three
//! typed objects per call: [`InterpretationArgs`], [`LlmArgs`] and
//! [`OutputArgs`]. Defaults can be overridden from a settings file.
//!
//! ## Loading Order
//!
//! 1. `PSYCHINTERPRETER_CONFIG` environment variable (path to TOML file)
//! 2. `psychinterpreter.toml` in the current working directory
//! 3. Registry defaults
//!
//! ## File Layout
//!
//! ```toml
//! [llm]
//! llm_provider = "ollama"
//! llm_model = "llama3.1"
//! word_limit = 120
//!
//! [output]
//! format = "markdown"
//!
//! [interpretation]
//! cutoff = 0.35
//! ```

pub mod args;
pub mod registry;
pub mod validation;

pub use args::{
    EchoLevel, FaInterpretationArgs, GmInterpretationArgs, InterpretationArgs, LlmArgs,
    OutputArgs, OutputFormat,
};
pub use registry::{
    get_params_by_group, registry, validate_param, validate_params, validate_params_report,
    ConfigGroup, ParamMap, ParamType, ParamValue, ParameterRegistry, ParameterSpec,
    ValidationReport,
};

use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::Result;
use crate::types::ModelType;

/// Environment variable naming a settings file.
pub const CONFIG_ENV_VAR: &str = "PSYCHINTERPRETER_CONFIG";

/// Settings file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "psychinterpreter.toml";

// ============================================================================
// Settings
// ============================================================================

/// Parameter values read from a settings file, one map per config group.
///
/// Values are validated when loaded; they still go through the typed
/// builders so call-site overrides are checked the same way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Settings {
    pub llm: ParamMap,
    pub output: ParamMap,
    pub interpretation: ParamMap,
}

impl Settings {
    /// Load settings using the standard search order, falling back to
    /// defaults when no file is found or the file is invalid.
    pub fn load() -> Self {
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(settings) => {
                        info!(path = %p.display(), "Loaded settings from {CONFIG_ENV_VAR}");
                        return settings;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load settings, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{CONFIG_ENV_VAR} points to a non-existent file, falling back");
            }
        }

        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(settings) => {
                    info!("Loaded settings from ./{LOCAL_CONFIG_FILE}");
                    return settings;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{LOCAL_CONFIG_FILE}, using defaults");
                }
            }
        }

        info!("No settings file found, using registry defaults");
        Self::default()
    }

    /// Load from a specific TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents).map_err(|e| match e {
            ConfigError::Parse(None, inner) => ConfigError::Parse(Some(path.to_path_buf()), inner),
            other => other,
        })
    }

    /// Parse a settings document. Unknown keys warn; invalid values fail.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let value: toml::Value = contents
            .parse()
            .map_err(|e| ConfigError::Parse(None, e))?;

        for w in validation::validate_unknown_keys(contents) {
            warn!("{}", w);
        }

        let errors = validation::validate_values(&value);
        if !errors.is_empty() {
            return Err(ConfigError::Validation(errors));
        }

        let section = |group: ConfigGroup| -> ParamMap {
            value
                .get(group.as_str())
                .and_then(toml::Value::as_table)
                .map(|table| {
                    table
                        .iter()
                        .filter(|(name, _)| {
                            registry()
                                .get(name)
                                .map_or(true, |spec| spec.config_group == group)
                        })
                        .filter_map(|(name, v)| {
                            ParamValue::from_toml(name, v)
                                .ok()
                                .map(|pv| (name.clone(), pv))
                        })
                        .collect()
                })
                .unwrap_or_default()
        };

        Ok(Self {
            llm: section(ConfigGroup::Llm),
            output: section(ConfigGroup::Output),
            interpretation: section(ConfigGroup::Interpretation),
        })
    }

    /// All settings flattened into one map with `overrides` taking precedence.
    pub fn merged(&self, overrides: &ParamMap) -> ParamMap {
        let mut params = ParamMap::new();
        for map in [&self.llm, &self.output, &self.interpretation] {
            params.extend(map.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        params.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        params
    }

    pub fn llm_args(&self, overrides: &ParamMap) -> Result<LlmArgs> {
        LlmArgs::from_params(&self.merged(overrides))
    }

    pub fn output_args(&self, overrides: &ParamMap) -> Result<OutputArgs> {
        OutputArgs::from_params(&self.merged(overrides))
    }

    /// Interpretation args for `model_type`. Settings-file keys that belong
    /// to another model type are dropped; overrides are not.
    pub fn interpretation_args(
        &self,
        model_type: ModelType,
        overrides: &ParamMap,
    ) -> Result<InterpretationArgs> {
        let mut params: ParamMap = self
            .interpretation
            .iter()
            .filter(|(name, _)| registry().get(name).map_or(true, |s| s.applies_to(model_type)))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        params.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
        InterpretationArgs::from_params(model_type, &params)
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug)]
pub enum ConfigError {
    Io(PathBuf, std::io::Error),
    Parse(Option<PathBuf>, toml::de::Error),
    Validation(Vec<String>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(path, e) => write!(f, "Settings I/O error ({}): {}", path.display(), e),
            ConfigError::Parse(Some(path), e) => {
                write!(f, "Settings parse error ({}): {}", path.display(), e)
            }
            ConfigError::Parse(None, e) => write!(f, "Settings parse error: {}", e),
            ConfigError::Validation(errors) => {
                writeln!(f, "Settings validation failed:")?;
                for e in errors {
                    writeln!(f, "  - {}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_toml_str_sections() {
        let settings = Settings::from_toml_str(
            r#"
[llm]
llm_provider = "ollama"
word_limit = 100

[output]
format = "markdown"
silent = true

[interpretation]
cutoff = 0.4
min_cluster_size = 10
"#,
        )
        .unwrap();

        assert_eq!(settings.llm.len(), 2);
        assert_eq!(settings.output["silent"], ParamValue::Bool(true));

        let fa = settings
            .interpretation_args(ModelType::Fa, &ParamMap::new())
            .unwrap();
        assert!((fa.as_fa().unwrap().cutoff - 0.4).abs() < 1e-12);

        let gm = settings
            .interpretation_args(ModelType::Gm, &ParamMap::new())
            .unwrap();
        assert_eq!(gm.as_gm().unwrap().min_cluster_size, 10);

        let out = settings.output_args(&ParamMap::new()).unwrap();
        assert_eq!(out.silent, 2);
    }

    #[test]
    fn test_invalid_value_is_fatal() {
        let err = Settings::from_toml_str("[llm]\nword_limit = 5\n").unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
        assert!(err.to_string().contains("word_limit"));
    }

    #[test]
    fn test_unknown_key_is_not_fatal() {
        let settings = Settings::from_toml_str("[llm]\nword_limt = 100\n").unwrap();
        assert!(settings.llm.contains_key("word_limt"));
    }

    #[test]
    fn test_overrides_win() {
        let settings = Settings::from_toml_str("[llm]\nllm_provider = \"ollama\"\n").unwrap();
        let mut overrides = ParamMap::new();
        overrides.insert("llm_provider".into(), "openai".into());
        assert_eq!(settings.llm_args(&overrides).unwrap().provider, "openai");
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = Settings::load_from_file(Path::new("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }
}
