//! psychinterpreter: LLM-assisted interpretation of psychometric models
//!
//! Turns fitted factor analyses and Gaussian mixtures into named,
//! described components by prompting a chat LLM and parsing its reply.
//!
//! ## Architecture
//!
//! - **Config**: parameter registry, typed argument objects, settings file
//! - **Extract**: loadings / cluster profiles plus diagnostics, checked
//!   against the variable metadata
//! - **Prompt**: deterministic system and main prompts per model type
//! - **Parsing**: four-tier response parser that never fails
//! - **LLM**: chat backend trait, OpenAI-compatible HTTP backend, sessions
//! - **Interpret**: the orchestrator, reports and export

pub mod config;
pub mod error;
pub mod extract;
pub mod interpret;
pub mod llm;
pub mod parsing;
pub mod prompt;
pub mod types;

// Re-export configuration
pub use config::{
    InterpretationArgs, LlmArgs, OutputArgs, OutputFormat, ParamMap, ParamValue, Settings,
};

// Re-export errors
pub use error::{InterpretError, Result, ValidationError};

// Re-export commonly used types
pub use extract::{extract, AnalysisData, FactorSolution, MixtureFit, ModelInput};
pub use types::{LabeledMatrix, ModelType, VariableInfo, VariableMetadata};

// Re-export the pipeline
pub use interpret::{
    build_report, export_interpretation, interpret, interpret_with_session, InterpretRequest,
    InterpretationResult,
};
pub use llm::{create_backend, ChatSession, LlmBackend, LlmError};
pub use parsing::{parse_llm_response, ParsedResult};
pub use prompt::{build_main_prompt, build_prompts, build_system_prompt, PromptPair};
