//! Interpretation orchestrator
//!
//! One call runs: validate inputs → resolve the model type → build or reuse
//! a [`ChatSession`] → extract analysis data → build prompts → chat → parse
//! → assemble an [`InterpretationResult`].
//!
//! Everything before the chat call is synchronous and fails fast. The
//! chat call is the only await point; provider errors come back unchanged
//! and are never retried.

pub mod export;
pub mod report;
pub mod result;

pub use export::export_interpretation;
pub use report::{build_report, wrap_text};
pub use result::{FaDetails, GmDetails, InterpretationResult, ResultDetails, TokenUsage};

use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use crate::config::{
    EchoLevel, InterpretationArgs, LlmArgs, OutputArgs, ParamMap, ParamValue,
};
use crate::error::{InterpretError, Result};
use crate::extract::{extract, AnalysisData, ModelInput};
use crate::llm::{ChatSession, GenerationOptions, LlmBackend};
use crate::parsing::{apply_analysis_rules, parse_llm_response, ParseTier};
use crate::prompt::{build_prompts, PromptPair};
use crate::types::{ModelType, VariableMetadata};

// ============================================================================
// Request
// ============================================================================

/// Inputs of one interpretation call.
///
/// Supply either a model `input` or pre-built `analysis` data. Config
/// objects that are not given are built from `params` (flat, any group)
/// and the registry defaults; given objects get `params` applied on top.
#[derive(Debug, Clone)]
pub struct InterpretRequest {
    pub metadata: VariableMetadata,
    pub input: Option<ModelInput>,
    pub analysis: Option<AnalysisData>,
    pub model_type: Option<ModelType>,
    pub interpretation: Option<InterpretationArgs>,
    pub llm: Option<LlmArgs>,
    pub output: Option<OutputArgs>,
    pub params: ParamMap,
    /// Use a reused session's model type when it conflicts with `model_type`
    pub prefer_session_model_type: bool,
}

impl InterpretRequest {
    pub fn new(metadata: VariableMetadata) -> Self {
        Self {
            metadata,
            input: None,
            analysis: None,
            model_type: None,
            interpretation: None,
            llm: None,
            output: None,
            params: ParamMap::new(),
            prefer_session_model_type: false,
        }
    }

    pub fn with_input(mut self, input: impl Into<ModelInput>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn with_analysis(mut self, analysis: AnalysisData) -> Self {
        self.analysis = Some(analysis);
        self
    }

    pub fn with_model_type(mut self, model_type: ModelType) -> Self {
        self.model_type = Some(model_type);
        self
    }

    pub fn with_interpretation_args(mut self, args: InterpretationArgs) -> Self {
        self.interpretation = Some(args);
        self
    }

    pub fn with_llm_args(mut self, args: LlmArgs) -> Self {
        self.llm = Some(args);
        self
    }

    pub fn with_output_args(mut self, args: OutputArgs) -> Self {
        self.output = Some(args);
        self
    }

    pub fn with_param(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.to_string(), value.into());
        self
    }

    pub fn prefer_session_model_type(mut self, prefer: bool) -> Self {
        self.prefer_session_model_type = prefer;
        self
    }
}

// ============================================================================
// Entry points
// ============================================================================

/// Interpret with a temporary session that is dropped afterwards.
pub async fn interpret(
    request: InterpretRequest,
    backend: Arc<dyn LlmBackend>,
) -> Result<InterpretationResult> {
    let prepared = prepare(request, None, backend.backend_name())?;
    let mut session = ChatSession::new(
        prepared.model_type,
        backend,
        prepared.prompts.system_prompt.clone(),
    );
    run(prepared, &mut session).await
}

/// Interpret inside a caller-owned session. On success the session's token
/// counters and interpretation count are updated in place.
pub async fn interpret_with_session(
    request: InterpretRequest,
    session: &mut ChatSession,
) -> Result<InterpretationResult> {
    let backend_name = session.backend().backend_name().to_string();
    let prepared = prepare(request, Some(session.model_type()), &backend_name)?;
    run(prepared, session).await
}

// ============================================================================
// Steps
// ============================================================================

struct Prepared {
    model_type: ModelType,
    analysis: AnalysisData,
    prompts: PromptPair,
    llm: LlmArgs,
    output: OutputArgs,
    warnings: Vec<String>,
    started: Instant,
}

fn prepare(
    request: InterpretRequest,
    session_type: Option<ModelType>,
    backend_name: &str,
) -> Result<Prepared> {
    let started = Instant::now();
    let mut warnings = Vec::new();

    if request.input.is_none() && request.analysis.is_none() {
        return Err(InterpretError::MissingInput);
    }

    let output = match &request.output {
        Some(o) => o.clone(),
        None => OutputArgs::from_params(&request.params)?,
    };
    let llm = resolve_llm_args(request.llm.as_ref(), &request.params, backend_name)?;

    let model_type = resolve_model_type(&request, session_type, &mut warnings)?;
    if !model_type.is_implemented() {
        return Err(InterpretError::NotImplemented(model_type));
    }

    let analysis = match (&request.input, request.analysis) {
        (Some(input), analysis) => {
            if analysis.is_some() {
                warnings.push(
                    "Both a model input and pre-built analysis data were supplied; using the model input"
                        .to_string(),
                );
            }
            let args = resolve_interpretation_args(
                request.interpretation.as_ref(),
                &request.params,
                model_type,
            )?;
            let outcome = extract(model_type, input, &request.metadata, &args)?;
            warnings.extend(outcome.warnings);
            outcome.analysis
        }
        (None, Some(analysis)) => {
            if analysis.model_type() != model_type {
                return Err(InterpretError::ModelTypeConflict(format!(
                    "analysis data is {} but the model type is {model_type}",
                    analysis.model_type()
                )));
            }
            analysis.check_consistency()?;
            analysis.reconcile(&request.metadata)?;
            analysis
        }
        (None, None) => return Err(InterpretError::MissingInput),
    };

    let prompts = build_prompts(&analysis, &request.metadata, &llm)?;

    Ok(Prepared {
        model_type,
        analysis,
        prompts,
        llm,
        output,
        warnings,
        started,
    })
}

async fn run(prepared: Prepared, session: &mut ChatSession) -> Result<InterpretationResult> {
    let Prepared {
        model_type,
        analysis,
        prompts,
        llm,
        output,
        mut warnings,
        started,
    } = prepared;
    let components = analysis.component_names();

    info!(
        model_type = %model_type,
        components = components.len(),
        provider = %llm.provider,
        session_id = %session.id(),
        "Requesting interpretation"
    );
    if llm.echo == EchoLevel::All {
        info!("System prompt:\n{}", prompts.system_prompt);
        info!("Main prompt:\n{}", prompts.main_prompt);
    }

    if session.replace_system_prompt(&prompts.system_prompt) {
        warnings.push(
            "This call's system prompt overrides the one stored in the session".to_string(),
        );
    }
    let response = session
        .chat(&prompts.main_prompt, &GenerationOptions::from(&llm))
        .await?;

    if llm.echo != EchoLevel::None {
        info!("LLM response:\n{}", response.content);
    }

    let parsed = parse_llm_response(&response.content, model_type, &components);
    let parsed = apply_analysis_rules(parsed, &analysis);
    match parsed.tier {
        ParseTier::Strict | ParseTier::Cleaned => {}
        ParseTier::Pattern => warnings.push(
            "LLM response was not valid JSON; interpretations were recovered by pattern matching"
                .to_string(),
        ),
        ParseTier::Default => warnings.push(
            "No interpretation could be recovered from the LLM response".to_string(),
        ),
    }

    session.record_interpretation(response.input_tokens, response.output_tokens);

    if output.shows_messages() {
        for w in &warnings {
            warn!("{}", w);
        }
    }

    let mut result = InterpretationResult {
        model_type,
        components: parsed.components,
        details: (&analysis).into(),
        parse_tier: parsed.tier,
        token_usage: TokenUsage {
            input_tokens: response.input_tokens,
            output_tokens: response.output_tokens,
        },
        elapsed_secs: started.elapsed().as_secs_f64(),
        provider: llm.provider.clone(),
        model: response.model.or_else(|| llm.model.clone()),
        session_id: session.id(),
        created_at: Utc::now(),
        prompts,
        raw_response: response.content,
        warnings,
        output_args: output,
        report: String::new(),
    };
    result.report = build_report(&result, &result.output_args);

    info!(
        model_type = %model_type,
        tier = %result.parse_tier,
        input_tokens = result.token_usage.input_tokens,
        output_tokens = result.token_usage.output_tokens,
        elapsed_secs = result.elapsed_secs,
        "Interpretation complete"
    );

    Ok(result)
}

// ============================================================================
// Resolution helpers
// ============================================================================

fn resolve_model_type(
    request: &InterpretRequest,
    session_type: Option<ModelType>,
    warnings: &mut Vec<String>,
) -> Result<ModelType> {
    let detected = match (&request.input, &request.analysis) {
        (Some(input), _) => input.detect_model_type(),
        (None, Some(analysis)) => Some(analysis.model_type()),
        (None, None) => None,
    };

    if let (Some(explicit), Some(found)) = (request.model_type, detected) {
        if explicit != found {
            return Err(InterpretError::ModelTypeConflict(format!(
                "model_type is {explicit} but the input is a {found} model"
            )));
        }
    }

    let requested = request
        .model_type
        .or(detected)
        .or_else(|| request.interpretation.as_ref().map(InterpretationArgs::model_type));

    match (requested, session_type) {
        (Some(req), Some(sess)) if req != sess => {
            if request.prefer_session_model_type {
                warnings.push(format!(
                    "Requested model type {req} conflicts with the session's {sess}; using {sess}"
                ));
                Ok(sess)
            } else {
                Err(InterpretError::ModelTypeConflict(format!(
                    "session was created for {sess} but {req} was requested"
                )))
            }
        }
        (Some(req), _) => Ok(req),
        (None, Some(sess)) => Ok(sess),
        (None, None) => Err(InterpretError::ModelTypeConflict(
            "could not determine the model type; pass it explicitly".to_string(),
        )),
    }
}

fn overlay(mut base: ParamMap, overrides: &ParamMap) -> ParamMap {
    base.extend(overrides.iter().map(|(k, v)| (k.clone(), v.clone())));
    base
}

fn resolve_llm_args(
    given: Option<&LlmArgs>,
    params: &ParamMap,
    backend_name: &str,
) -> Result<LlmArgs> {
    match given {
        Some(args) => LlmArgs::from_params(&overlay(args.to_params(), params)),
        None => {
            let mut p = params.clone();
            p.entry("llm_provider".to_string())
                .or_insert_with(|| backend_name.into());
            LlmArgs::from_params(&p)
        }
    }
}

fn resolve_interpretation_args(
    given: Option<&InterpretationArgs>,
    params: &ParamMap,
    model_type: ModelType,
) -> Result<InterpretationArgs> {
    match given {
        Some(args) if args.model_type() != model_type => Err(InterpretError::ModelTypeConflict(
            format!(
                "interpretation args are for {} but the model type is {model_type}",
                args.model_type()
            ),
        )),
        Some(args) => InterpretationArgs::from_params(model_type, &overlay(args.to_params(), params)),
        None => InterpretationArgs::from_params(model_type, params),
    }
}
