use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Statistical model families the pipeline knows about.
///
/// IRT and CDM are recognised so callers get a clear "not yet implemented"
/// error instead of an unknown-type failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    /// Exploratory factor analysis
    Fa,
    /// Gaussian mixture / latent profile analysis
    Gm,
    /// Item response theory
    Irt,
    /// Cognitive diagnosis model
    Cdm,
}

impl ModelType {
    pub const ALL: [Self; 4] = [Self::Fa, Self::Gm, Self::Irt, Self::Cdm];

    /// Short tag used in config files and the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Fa => "fa",
            Self::Gm => "gm",
            Self::Irt => "irt",
            Self::Cdm => "cdm",
        }
    }

    /// Human-readable name used in prompts and report headings.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Fa => "Factor Analysis",
            Self::Gm => "Gaussian Mixture",
            Self::Irt => "Item Response Theory",
            Self::Cdm => "Cognitive Diagnosis",
        }
    }

    /// Word used for a single model component ("Factor 2", "Cluster 3").
    pub fn component_label(self) -> &'static str {
        match self {
            Self::Fa => "Factor",
            Self::Gm => "Cluster",
            Self::Irt => "Item",
            Self::Cdm => "Attribute",
        }
    }

    pub fn is_implemented(self) -> bool {
        matches!(self, Self::Fa | Self::Gm)
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "fa" | "efa" | "factor" | "factor_analysis" => Ok(Self::Fa),
            "gm" | "gmm" | "lpa" | "mclust" | "gaussian_mixture" => Ok(Self::Gm),
            "irt" => Ok(Self::Irt),
            "cdm" => Ok(Self::Cdm),
            other => Err(ValidationError::NotAllowed {
                name: "model_type".to_string(),
                value: other.to_string(),
                allowed: "fa, gm, irt, cdm".to_string(),
            }),
        }
    }
}
