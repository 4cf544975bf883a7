//! Interpretation Integration Tests
//!
//! The full call path (extraction, prompts, chat, parsing, report, export)
//! against a scripted backend. No network access.

use std::sync::Arc;

use psychinterpreter::interpret::ResultDetails;
use psychinterpreter::llm::{Role, ScriptedBackend};
use psychinterpreter::parsing::{ComponentStatus, ParseTier};
use psychinterpreter::{
    build_main_prompt, AnalysisData, export_interpretation, interpret, interpret_with_session, ChatSession,
    FactorSolution, InterpretError, InterpretRequest, LlmError, ModelType, OutputArgs,
    OutputFormat, VariableMetadata,
};
use serde_json::json;

// ============================================================================
// Fixtures
// ============================================================================

fn metadata() -> VariableMetadata {
    VariableMetadata::from_pairs([
        ("talk", "I talk to a lot of different people at parties"),
        ("party", "I enjoy large social gatherings"),
        ("worry", "I worry about things"),
        ("calm", "I stay calm under pressure"),
    ])
    .unwrap()
}

/// `F2` has no loading at or above .30.
fn solution() -> FactorSolution {
    FactorSolution {
        variables: vec!["talk".into(), "party".into(), "worry".into(), "calm".into()],
        factors: Some(vec!["F1".into(), "F2".into()]),
        loadings: vec![
            vec![0.81, 0.05],
            vec![0.74, 0.12],
            vec![0.32, 0.22],
            vec![0.45, -0.18],
        ],
        factor_correlations: None,
        rotation: Some("varimax".into()),
    }
}

const REPLY: &str = r#"{
  "F1": {"name": "Sociability", "interpretation": "Seeking out and enjoying company."},
  "F2": {"name": "Emotional Stability", "interpretation": "Staying calm."}
}"#;

fn request() -> InterpretRequest {
    InterpretRequest::new(metadata())
        .with_input(solution())
        .with_param("llm_provider", "scripted")
}

// ============================================================================
// Full call
// ============================================================================

#[tokio::test]
async fn interprets_factor_solution() {
    let backend = Arc::new(ScriptedBackend::always(REPLY));
    let result = interpret(request(), backend.clone()).await.unwrap();

    assert_eq!(result.model_type, ModelType::Fa);
    assert_eq!(result.parse_tier, ParseTier::Strict);
    assert_eq!(
        result.suggested_names(),
        vec![("F1", "Sociability"), ("F2", "Emotional Stability (n.s.)")]
    );
    assert!(result.token_usage.total() > 0);
    assert!(result.report.contains("Sociability"));

    let calls = backend.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 2);
    assert_eq!(calls[0][0].role, Role::System);
    assert_eq!(calls[0][1].role, Role::User);
    assert_eq!(calls[0][1].content, result.prompts.main_prompt);
}

#[tokio::test]
async fn undefined_factor_ignores_llm_name() {
    let backend = Arc::new(ScriptedBackend::always(REPLY));
    let req = request().with_param("n_emergency", 0_i64);
    let result = interpret(req, backend).await.unwrap();

    let f2 = result.component("F2").unwrap();
    assert_eq!(f2.name, "undefined");
    assert_eq!(f2.status, ComponentStatus::Undefined);

    let ResultDetails::Fa(fa) = &result.details else {
        panic!("expected FA details");
    };
    let summary = fa.factors.iter().find(|f| f.factor == "F2").unwrap();
    assert!(summary.variables.is_empty());
}

#[tokio::test]
async fn missing_input_is_an_error() {
    let backend = Arc::new(ScriptedBackend::always(REPLY));
    let err = interpret(InterpretRequest::new(metadata()), backend.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, InterpretError::MissingInput));
    assert_eq!(backend.n_calls(), 0);
}

#[tokio::test]
async fn metadata_mismatch_stops_before_the_llm() {
    let backend = Arc::new(ScriptedBackend::always(REPLY));
    let meta = VariableMetadata::from_pairs([("talk", "a"), ("party", "b"), ("worry", "c")]).unwrap();
    let req = InterpretRequest::new(meta).with_input(solution());
    let err = interpret(req, backend.clone()).await.unwrap_err();
    assert!(matches!(err, InterpretError::VariableMismatch { .. }));
    assert_eq!(backend.n_calls(), 0);
}

#[tokio::test]
async fn both_inputs_prefer_the_model() {
    let backend = Arc::new(ScriptedBackend::always(REPLY));
    let prebuilt = psychinterpreter::extract(
        ModelType::Fa,
        &solution().into(),
        &metadata(),
        &psychinterpreter::InterpretationArgs::defaults(ModelType::Fa).unwrap(),
    )
    .unwrap()
    .analysis;

    let req = request().with_analysis(prebuilt);
    let result = interpret(req, backend).await.unwrap();
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("Both a model input")));
}

#[test]
fn ragged_saved_analysis_is_rejected() {
    let saved = json!({
        "analysis_type": "fa",
        "loadings": {"rows": ["talk", "party"], "cols": ["F1", "F2"], "values": [[0.7, 0.1], [0.6]]},
        "factor_correlations": null,
        "rotation": null,
        "cutoff": 0.3,
        "n_emergency": 2,
        "hide_low_loadings": false,
        "sort_loadings": true,
        "factors": [],
        "cross_loadings": [],
        "orphans": []
    });
    let err = serde_json::from_value::<AnalysisData>(saved).unwrap_err();
    assert!(err.to_string().contains("row 'party'"), "{err}");
}

#[tokio::test]
async fn saved_analysis_with_missing_factor_fails_before_the_llm() {
    let backend = Arc::new(ScriptedBackend::always(REPLY));
    let extracted = psychinterpreter::extract(
        ModelType::Fa,
        &solution().into(),
        &metadata(),
        &psychinterpreter::InterpretationArgs::defaults(ModelType::Fa).unwrap(),
    )
    .unwrap()
    .analysis;

    let mut saved = serde_json::to_value(&extracted).unwrap();
    saved["factors"].as_array_mut().unwrap().pop();
    let analysis: AnalysisData = serde_json::from_value(saved).unwrap();

    let req = InterpretRequest::new(metadata())
        .with_analysis(analysis)
        .with_param("llm_provider", "scripted");
    let err = interpret(req, backend.clone()).await.unwrap_err();
    assert!(matches!(err, InterpretError::Extraction(_)));
    assert_eq!(backend.n_calls(), 0);
}

#[tokio::test]
async fn unparseable_reply_still_completes() {
    let backend = Arc::new(ScriptedBackend::always("Sorry, I can't do that."));
    let result = interpret(request(), backend).await.unwrap();
    assert_eq!(result.parse_tier, ParseTier::Default);
    assert_eq!(result.components.len(), 2);
    assert!(!result.warnings.is_empty());
}

#[tokio::test]
async fn provider_error_passes_through() {
    let backend = Arc::new(ScriptedBackend::new().with_error(LlmError::RateLimited));
    let mut session = ChatSession::new(ModelType::Fa, backend, "");
    let err = interpret_with_session(request(), &mut session)
        .await
        .unwrap_err();
    assert!(matches!(err, InterpretError::Llm(LlmError::RateLimited)));
    assert_eq!(session.n_interpretations(), 0);
    assert_eq!(session.input_tokens(), 0);
}

#[tokio::test]
async fn gaussian_mixture_bundle() {
    let meta = VariableMetadata::from_pairs([("anx", "Anxiety"), ("dep", "Depression")]).unwrap();
    let bundle = json!({
        "variables": ["anx", "dep"],
        "means": [[-0.8, 1.1], [-0.6, 0.9]],
        "proportions": [0.7, 0.3],
        "log_likelihood": -250.0,
        "n_obs": 120
    });
    let reply = r#"{"Cluster 1": {"name": "Well-adjusted", "interpretation": "Low distress."},
                    "Cluster 2": {"name": "Distressed", "interpretation": "High distress."}}"#;
    let backend = Arc::new(ScriptedBackend::always(reply));

    let req = InterpretRequest::new(meta)
        .with_input(psychinterpreter::ModelInput::Bundle(bundle))
        .with_param("llm_provider", "scripted");
    let result = interpret(req, backend).await.unwrap();

    assert_eq!(result.model_type, ModelType::Gm);
    assert_eq!(result.component("Cluster 2").unwrap().name, "Distressed");
    assert!(matches!(result.details, ResultDetails::Gm(_)));
    assert!(result.report.contains("BIC"));
}

// ============================================================================
// Sessions
// ============================================================================

#[tokio::test]
async fn session_accumulates_and_resets() {
    let backend = Arc::new(ScriptedBackend::always(REPLY));
    let mut session = ChatSession::new(ModelType::Fa, backend, "");
    let id = session.id();

    let a = interpret_with_session(request(), &mut session).await.unwrap();
    let b = interpret_with_session(request(), &mut session).await.unwrap();

    assert_eq!(session.n_interpretations(), 2);
    assert_eq!(
        session.input_tokens(),
        a.token_usage.input_tokens + b.token_usage.input_tokens
    );
    assert_eq!(
        session.output_tokens(),
        a.token_usage.output_tokens + b.token_usage.output_tokens
    );
    assert_eq!(a.session_id, id);
    assert_eq!(session.history().len(), 4);
    // an empty session prompt is adopted, not overridden
    assert!(!a.warnings.iter().chain(&b.warnings).any(|w| w.contains("session")));

    session.reset();
    assert_eq!(session.n_interpretations(), 0);
    assert_eq!(session.input_tokens(), 0);
    assert!(session.history().is_empty());
    assert_eq!(session.id(), id);
    assert_eq!(session.model_type(), ModelType::Fa);
}

#[tokio::test]
async fn custom_system_prompt_replaces_session_prompt() {
    let backend = Arc::new(ScriptedBackend::always(REPLY));
    let mut session = ChatSession::new(ModelType::Fa, backend.clone(), "old prompt");
    let req = request().with_param("system_prompt", "You are a terse psychometrician.");
    let result = interpret_with_session(req, &mut session).await.unwrap();

    assert_eq!(session.system_prompt(), "You are a terse psychometrician.");
    assert_eq!(backend.calls()[0][0].content, "You are a terse psychometrician.");
    assert!(result
        .warnings
        .iter()
        .any(|w| w.contains("overrides the one stored in the session")));
}

#[tokio::test]
async fn session_model_type_conflict() {
    let backend = Arc::new(ScriptedBackend::always(REPLY));
    let mut session = ChatSession::new(ModelType::Gm, backend.clone(), "");
    let err = interpret_with_session(request(), &mut session)
        .await
        .unwrap_err();
    assert!(matches!(err, InterpretError::ModelTypeConflict(_)));
    assert_eq!(backend.n_calls(), 0);
}

#[tokio::test]
async fn session_model_type_can_win() {
    // carries both shapes, so only the caller and the session name a type
    let bundle = json!({
        "variables": ["talk", "party", "worry", "calm"],
        "loadings": [[0.81, 0.05], [0.74, 0.12], [0.32, 0.22], [0.45, -0.18]],
        "means": [[0.0], [0.0], [0.0], [0.0]]
    });
    let backend = Arc::new(ScriptedBackend::always(REPLY));
    let mut session = ChatSession::new(ModelType::Fa, backend, "");

    let req = InterpretRequest::new(metadata())
        .with_input(psychinterpreter::ModelInput::Bundle(bundle))
        .with_model_type(ModelType::Gm)
        .with_param("llm_provider", "scripted");

    let err = interpret_with_session(req.clone(), &mut session)
        .await
        .unwrap_err();
    assert!(matches!(err, InterpretError::ModelTypeConflict(_)));

    let result = interpret_with_session(req.prefer_session_model_type(true), &mut session)
        .await
        .unwrap();
    assert_eq!(result.model_type, ModelType::Fa);
    assert!(result.warnings.iter().any(|w| w.contains("session")));
}

// ============================================================================
// Prompts
// ============================================================================

#[test]
fn main_prompt_is_deterministic_and_grows_with_context() {
    let analysis = psychinterpreter::extract(
        ModelType::Fa,
        &solution().into(),
        &metadata(),
        &psychinterpreter::InterpretationArgs::defaults(ModelType::Fa).unwrap(),
    )
    .unwrap()
    .analysis;

    let a = build_main_prompt(&analysis, &metadata(), 150, None);
    let b = build_main_prompt(&analysis, &metadata(), 150, None);
    assert_eq!(a, b);

    let with_info = build_main_prompt(
        &analysis,
        &metadata(),
        150,
        Some("Sample of 412 first-year students."),
    );
    assert!(with_info.len() > a.len());
    assert_eq!(build_main_prompt(&analysis, &metadata(), 150, Some("   ")), a);
}

// ============================================================================
// Reports and export
// ============================================================================

#[tokio::test]
async fn markdown_rerender() {
    let backend = Arc::new(ScriptedBackend::always(REPLY));
    let result = interpret(request(), backend).await.unwrap();
    assert!(!result.report.starts_with('#'));

    let md = result.with_output_args(OutputArgs::default().with_format(OutputFormat::Markdown));
    assert!(md.report.starts_with("# Factor Analysis Interpretation"));
    assert_eq!(md.components, result.components);
}

#[tokio::test]
async fn export_round_trip() {
    let backend = Arc::new(ScriptedBackend::always(REPLY));
    let result = interpret(request(), backend).await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    for (format, ext) in [(OutputFormat::Cli, "txt"), (OutputFormat::Markdown, "md")] {
        let written = export_interpretation(&result, dir.path().join("report.json"), format).unwrap();
        assert_eq!(written.extension().unwrap(), ext);

        let content = std::fs::read_to_string(&written).unwrap();
        assert!(!content.is_empty());
        for (_, name) in result.suggested_names() {
            assert!(content.contains(name), "{name} missing from {ext} export");
        }
    }
}

#[tokio::test]
async fn export_into_missing_directory_fails() {
    let backend = Arc::new(ScriptedBackend::always(REPLY));
    let result = interpret(request(), backend).await.unwrap();
    let dir = tempfile::tempdir().unwrap();

    let err = export_interpretation(
        &result,
        dir.path().join("nope").join("report"),
        OutputFormat::Cli,
    )
    .unwrap_err();
    assert!(matches!(err, InterpretError::Export(_)));
}
