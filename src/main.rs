//! psychinterpreter - interpret factor analyses and Gaussian mixtures with an LLM
//!
//! # Usage
//!
//! ```bash
//! # Factor solution against a local Ollama model
//! psychinterpreter --input efa.json --metadata items.json --provider ollama --model llama3.1
//!
//! # Gaussian mixture, markdown report written to disk
//! psychinterpreter --input lpa.json --metadata items.json --format markdown --output report.md
//!
//! # Re-parse a saved reply without calling a provider
//! psychinterpreter --input efa.json --metadata items.json --response-file reply.txt
//! ```
//!
//! `--input` takes a JSON object keyed like a factor solution (`loadings`)
//! or a mixture fit (`means`), or saved analysis data (`analysis_type`).
//! `--metadata` takes a JSON array of `{variable, description}` records or
//! a `{variable: description}` object.
//!
//! # Environment Variables
//!
//! - `PSYCHINTERPRETER_CONFIG`: settings file (default: ./psychinterpreter.toml)
//! - `PSYCHINTERPRETER_API_KEY` / `OPENAI_API_KEY`: provider API key
//! - `RUST_LOG`: logging level (default: info)

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use psychinterpreter::config::{ParamMap, ParamValue, Settings};
use psychinterpreter::llm::{create_backend, LlmBackend, ScriptedBackend};
use psychinterpreter::{
    export_interpretation, interpret, AnalysisData, InterpretRequest, ModelInput, ModelType,
    VariableInfo, VariableMetadata,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "psychinterpreter")]
#[command(about = "LLM-assisted interpretation of factor analyses and Gaussian mixtures")]
#[command(version)]
struct CliArgs {
    /// Model input (JSON)
    #[arg(long, value_name = "FILE")]
    input: PathBuf,

    /// Variable descriptions (JSON)
    #[arg(long, value_name = "FILE")]
    metadata: PathBuf,

    /// Model type; detected from the input when omitted
    #[arg(long, value_name = "fa|gm")]
    model_type: Option<String>,

    /// LLM provider (openai, openrouter, ollama, lmstudio or any name with --base-url)
    #[arg(long)]
    provider: Option<String>,

    /// Model name passed to the provider
    #[arg(long)]
    model: Option<String>,

    /// API root of an OpenAI-compatible endpoint
    #[arg(long)]
    base_url: Option<String>,

    /// Settings file; overrides PSYCHINTERPRETER_CONFIG and the local file
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Report format
    #[arg(long, value_name = "cli|markdown")]
    format: Option<String>,

    #[arg(long)]
    word_limit: Option<i64>,

    /// Significance cutoff for loadings (FA)
    #[arg(long)]
    cutoff: Option<f64>,

    /// Variables kept for factors without significant loadings (FA)
    #[arg(long)]
    n_emergency: Option<i64>,

    /// Extra study context appended to the prompt
    #[arg(long)]
    additional_info: Option<String>,

    #[arg(long)]
    temperature: Option<f64>,

    /// Write the report here (.txt for cli, .md for markdown)
    #[arg(long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// 0 = report and messages, 1 = messages only, 2 = nothing
    #[arg(long)]
    silent: Option<i64>,

    /// Use a saved LLM reply instead of calling the provider
    #[arg(long, value_name = "FILE")]
    response_file: Option<PathBuf>,
}

impl CliArgs {
    /// Flags as registry parameters; validated by the config builders.
    fn overrides(&self) -> ParamMap {
        let mut p = ParamMap::new();
        let mut put = |name: &str, value: Option<ParamValue>| {
            if let Some(v) = value {
                p.insert(name.to_string(), v);
            }
        };
        put("llm_provider", self.provider.clone().map(ParamValue::Str));
        put("llm_model", self.model.clone().map(ParamValue::Str));
        put("base_url", self.base_url.clone().map(ParamValue::Str));
        put("format", self.format.clone().map(ParamValue::Str));
        put("word_limit", self.word_limit.map(ParamValue::Int));
        put("cutoff", self.cutoff.map(ParamValue::Num));
        put("n_emergency", self.n_emergency.map(ParamValue::Int));
        put("additional_info", self.additional_info.clone().map(ParamValue::Str));
        put("temperature", self.temperature.map(ParamValue::Num));
        put("silent", self.silent.map(ParamValue::Int));
        p
    }
}

// ============================================================================
// Input loading
// ============================================================================

fn read_json(path: &Path) -> Result<serde_json::Value> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("{} is not valid JSON", path.display()))
}

fn load_metadata(path: &Path) -> Result<VariableMetadata> {
    let metadata = match read_json(path)? {
        serde_json::Value::Object(map) => VariableMetadata::from_pairs(
            map.into_iter().map(|(k, v)| {
                let description = v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string());
                (k, description)
            }),
        )?,
        value => {
            let rows: Vec<VariableInfo> = serde_json::from_value(value)
                .context("metadata must be an array of {variable, description} records")?;
            VariableMetadata::new(rows)?
        }
    };
    Ok(metadata)
}

/// Saved analysis data carries an `analysis_type` tag; anything else is a
/// structured bundle.
fn load_input(path: &Path, request: InterpretRequest) -> Result<InterpretRequest> {
    let value = read_json(path)?;
    if value.get("analysis_type").is_some() {
        let analysis: AnalysisData =
            serde_json::from_value(value).context("saved analysis data is malformed")?;
        Ok(request.with_analysis(analysis))
    } else {
        Ok(request.with_input(ModelInput::Bundle(value)))
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Logs go to stderr so the report on stdout stays clean
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = CliArgs::parse();

    let settings = match &args.config {
        Some(path) => Settings::load_from_file(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::load(),
    };

    let overrides = args.overrides();
    let mut params = settings.merged(&overrides);
    let output = settings.output_args(&overrides)?;

    let metadata = load_metadata(&args.metadata)?;
    info!(variables = metadata.len(), "Loaded variable metadata");

    let mut request = load_input(&args.input, InterpretRequest::new(metadata))?;
    if let Some(mt) = &args.model_type {
        let model_type: ModelType = mt.parse()?;
        request = request.with_model_type(model_type);
    }

    // Interpretation keys from the settings file only apply to their own
    // model type; drop the others once the type is known.
    let model_type = request
        .model_type
        .or_else(|| request.input.as_ref().and_then(ModelInput::detect_model_type))
        .or_else(|| request.analysis.as_ref().map(AnalysisData::model_type));
    if let Some(mt) = model_type {
        let interpretation = settings.interpretation_args(mt, &overrides)?;
        params.retain(|name, _| !settings.interpretation.contains_key(name));
        request = request.with_interpretation_args(interpretation);
    }

    let backend: Arc<dyn LlmBackend> = match &args.response_file {
        Some(path) => {
            let reply = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            Arc::new(ScriptedBackend::always(reply))
        }
        None => {
            let llm = settings.llm_args(&overrides)?;
            create_backend(&llm)?
        }
    };

    request.params = params;
    request = request.with_output_args(output.clone());

    let result = interpret(request, backend).await?;

    if output.shows_report() {
        println!("{}", result.report);
    }

    if let Some(path) = &args.output {
        let written = export_interpretation(&result, path, output.format)?;
        info!(path = %written.display(), "Report written");
    }

    Ok(())
}
