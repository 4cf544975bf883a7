//! Extraction Tests
//!
//! Factor solutions and mixture fits through `extract`, including the
//! structured-bundle path and name reconciliation against the metadata.

use psychinterpreter::config::InterpretationArgs;
use psychinterpreter::extract::{CovarianceModel, MixtureFit};
use psychinterpreter::{
    extract, AnalysisData, FactorSolution, InterpretError, LabeledMatrix, ModelInput, ModelType,
    ParamMap, ParamValue, VariableMetadata,
};
use serde_json::json;

fn fa_args(cutoff: f64, n_emergency: i64) -> InterpretationArgs {
    let mut p = ParamMap::new();
    p.insert("cutoff".into(), ParamValue::Num(cutoff));
    p.insert("n_emergency".into(), ParamValue::Int(n_emergency));
    InterpretationArgs::from_params(ModelType::Fa, &p).unwrap()
}

fn gm_args() -> InterpretationArgs {
    InterpretationArgs::defaults(ModelType::Gm).unwrap()
}

fn metadata(names: &[&str]) -> VariableMetadata {
    VariableMetadata::from_pairs(names.iter().map(|n| (*n, format!("Description of {n}")))).unwrap()
}

fn three_variable_solution() -> FactorSolution {
    FactorSolution {
        variables: vec!["var1".into(), "var2".into(), "var3".into()],
        factors: Some(vec!["F1".into(), "F2".into()]),
        loadings: vec![vec![0.8, 0.1], vec![0.7, 0.15], vec![0.1, 0.9]],
        factor_correlations: None,
        rotation: Some("oblimin".into()),
    }
}

fn significant(analysis: &AnalysisData, factor: &str) -> Vec<String> {
    let fa = analysis.as_fa().unwrap();
    let mut vars: Vec<String> = fa
        .factor(factor)
        .unwrap()
        .variables
        .iter()
        .map(|v| v.variable.clone())
        .collect();
    vars.sort();
    vars
}

// ============================================================================
// Factor analysis
// ============================================================================

#[test]
fn three_variable_two_factor_solution() {
    let outcome = extract(
        ModelType::Fa,
        &three_variable_solution().into(),
        &metadata(&["var1", "var2", "var3"]),
        &fa_args(0.3, 2),
    )
    .unwrap();

    assert_eq!(significant(&outcome.analysis, "F1"), vec!["var1", "var2"]);
    assert_eq!(significant(&outcome.analysis, "F2"), vec!["var3"]);

    let fa = outcome.analysis.as_fa().unwrap();
    assert!(fa.cross_loadings.is_empty());
    assert!(fa.orphans.is_empty());
    assert!(fa.emergency_factors().is_empty());
    assert!(outcome.warnings.is_empty());
}

#[test]
fn name_mismatch_names_both_sides() {
    let matrix = LabeledMatrix::new(
        vec!["A".into(), "B".into(), "C".into()],
        vec!["F1".into()],
        vec![vec![0.5], vec![0.6], vec![0.7]],
    )
    .unwrap();

    let err = extract(
        ModelType::Fa,
        &ModelInput::from(matrix),
        &metadata(&["B", "C", "D"]),
        &fa_args(0.3, 2),
    )
    .unwrap_err();

    match &err {
        InterpretError::VariableMismatch {
            model_only,
            metadata_only,
        } => {
            assert_eq!(model_only, &vec!["A".to_string()]);
            assert_eq!(metadata_only, &vec!["D".to_string()]);
        }
        other => panic!("expected a variable mismatch, got {other:?}"),
    }
    let msg = err.to_string();
    assert!(msg.contains('A') && msg.contains('D'), "message: {msg}");
}

#[test]
fn metadata_order_does_not_matter() {
    let outcome = extract(
        ModelType::Fa,
        &three_variable_solution().into(),
        &metadata(&["var3", "var1", "var2"]),
        &fa_args(0.3, 2),
    );
    assert!(outcome.is_ok());
}

#[test]
fn emergency_rule_and_undefined_factor() {
    let solution = FactorSolution {
        variables: vec!["a".into(), "b".into(), "c".into()],
        factors: None,
        loadings: vec![vec![0.7, 0.2], vec![0.6, -0.25], vec![0.5, 0.05]],
        factor_correlations: None,
        rotation: None,
    };
    let meta = metadata(&["a", "b", "c"]);

    let with_rule = extract(ModelType::Fa, &solution.clone().into(), &meta, &fa_args(0.3, 2)).unwrap();
    let fa = with_rule.analysis.as_fa().unwrap();
    let f2 = fa.factor("F2").unwrap();
    assert!(f2.emergency);
    assert_eq!(f2.variables.len(), 2);
    assert_eq!(f2.variables[0].variable, "b");

    let without = extract(ModelType::Fa, &solution.into(), &meta, &fa_args(0.3, 0)).unwrap();
    let fa = without.analysis.as_fa().unwrap();
    let f2 = fa.factor("F2").unwrap();
    assert!(f2.undefined);
    assert!(f2.variables.is_empty());
    assert_eq!(fa.undefined_factors(), vec!["F2"]);
}

#[test]
fn loading_exactly_at_cutoff_is_significant() {
    let solution = FactorSolution {
        variables: vec!["a".into(), "b".into()],
        factors: None,
        loadings: vec![vec![0.3], vec![-0.3]],
        factor_correlations: None,
        rotation: None,
    };
    let outcome = extract(ModelType::Fa, &solution.into(), &metadata(&["a", "b"]), &fa_args(0.3, 2))
        .unwrap();
    assert_eq!(significant(&outcome.analysis, "F1"), vec!["a", "b"]);
}

#[test]
fn bundle_with_phi_and_unknown_key() {
    let bundle = json!({
        "variables": ["var1", "var2", "var3"],
        "loadings": [[0.8, 0.1], [0.7, 0.15], [0.1, 0.9]],
        "Phi": [[1.0, 0.35], [0.35, 1.0]],
        "rotation": "promax",
        "communalities": [0.6, 0.5, 0.8]
    });
    let input = ModelInput::Bundle(bundle);
    assert_eq!(input.detect_model_type(), Some(ModelType::Fa));

    let outcome = extract(
        ModelType::Fa,
        &input,
        &metadata(&["var1", "var2", "var3"]),
        &fa_args(0.3, 2),
    )
    .unwrap();

    let fa = outcome.analysis.as_fa().unwrap();
    let phi = fa.factor_correlations.as_ref().unwrap();
    assert!((phi.get(0, 1) - 0.35).abs() < 1e-12);
    assert!(outcome.warnings.iter().any(|w| w.contains("communalities")));
}

#[test]
fn model_type_conflict_with_input_shape() {
    let err = extract(
        ModelType::Gm,
        &three_variable_solution().into(),
        &metadata(&["var1", "var2", "var3"]),
        &gm_args(),
    )
    .unwrap_err();
    assert!(matches!(err, InterpretError::ModelTypeConflict(_)));
}

#[test]
fn unimplemented_model_types() {
    for model_type in [ModelType::Irt, ModelType::Cdm] {
        let err = extract(
            model_type,
            &three_variable_solution().into(),
            &metadata(&["var1", "var2", "var3"]),
            &fa_args(0.3, 2),
        )
        .unwrap_err();
        assert!(matches!(err, InterpretError::NotImplemented(m) if m == model_type));
    }
}

// ============================================================================
// Gaussian mixtures
// ============================================================================

fn two_cluster_fit() -> MixtureFit {
    MixtureFit {
        variables: vec!["a".into(), "b".into()],
        cluster_names: None,
        means: vec![vec![0.0, 2.0], vec![1.0, 1.1]],
        covariances: None,
        proportions: vec![0.6, 0.4],
        log_likelihood: Some(-100.0),
        n_obs: Some(10),
        n_parameters: None,
        posterior: None,
        converged: Some(true),
        covariance_model: None,
    }
}

#[test]
fn mixture_fit_statistics() {
    let outcome = extract(
        ModelType::Gm,
        &two_cluster_fit().into(),
        &metadata(&["a", "b"]),
        &gm_args(),
    )
    .unwrap();
    let gm = outcome.analysis.as_gm().unwrap();

    assert_eq!(gm.cluster_names(), vec!["Cluster 1", "Cluster 2"]);
    assert_eq!(gm.covariance_model, CovarianceModel::Full);
    // 4 means + 1 weight + 2 × 3 covariance terms
    assert_eq!(gm.fit.n_parameters, Some(11));
    assert!((gm.fit.aic.unwrap() - 222.0).abs() < 1e-9);
    let bic = 11.0 * 10f64.ln() + 200.0;
    assert!((gm.fit.bic.unwrap() - bic).abs() < 1e-9);
    assert!(gm.fit.entropy.is_none());
    assert!(gm.fit.icl.is_none());
}

#[test]
fn mixture_diagnostics() {
    let outcome = extract(
        ModelType::Gm,
        &two_cluster_fit().into(),
        &metadata(&["a", "b"]),
        &gm_args(),
    )
    .unwrap();
    let gm = outcome.analysis.as_gm().unwrap();

    assert_eq!(gm.cluster_sizes, Some(vec![6, 4]));
    assert_eq!(gm.small_clusters, vec!["Cluster 2"]);
    assert!(gm.low_separation.is_empty());
    assert_eq!(gm.distinguishing_variables[0].variable, "a");
    assert!(gm.distinguishing_variables[0].spread > gm.distinguishing_variables[1].spread);
}

#[test]
fn posterior_drives_sizes_and_entropy() {
    let mut fit = two_cluster_fit();
    fit.n_obs = None;
    fit.posterior = Some(vec![
        vec![1.0, 0.0],
        vec![0.9, 0.1],
        vec![0.2, 0.8],
        vec![0.0, 1.0],
    ]);

    let outcome = extract(ModelType::Gm, &fit.into(), &metadata(&["a", "b"]), &gm_args()).unwrap();
    let gm = outcome.analysis.as_gm().unwrap();

    assert_eq!(gm.cluster_sizes, Some(vec![2, 2]));
    assert_eq!(gm.fit.n_obs, Some(4));
    let e = gm.fit.entropy.unwrap();
    assert!(e > 0.0);
    let ne = gm.fit.normalized_entropy.unwrap();
    assert!((ne - e / (4.0 * 2f64.ln())).abs() < 1e-12);
    assert!((gm.fit.icl.unwrap() - (gm.fit.bic.unwrap() + 2.0 * e)).abs() < 1e-9);
}

#[test]
fn proportions_must_sum_to_one() {
    let mut fit = two_cluster_fit();
    fit.proportions = vec![0.6, 0.3];
    let err = extract(ModelType::Gm, &fit.into(), &metadata(&["a", "b"]), &gm_args()).unwrap_err();
    assert!(matches!(err, InterpretError::Extraction(_)));
}

#[test]
fn non_convergence_warns() {
    let mut fit = two_cluster_fit();
    fit.converged = Some(false);
    let outcome = extract(ModelType::Gm, &fit.into(), &metadata(&["a", "b"]), &gm_args()).unwrap();
    assert!(outcome.warnings.iter().any(|w| w.contains("converge")));
}

#[test]
fn mixture_bundle() {
    let bundle = json!({
        "variables": ["a", "b"],
        "cluster_names": ["Low", "High"],
        "means": [[0.0, 2.0], [1.0, 1.1]],
        "proportions": [0.5, 0.5],
        "covariance_model": "diagonal"
    });
    let input = ModelInput::Bundle(bundle);
    assert_eq!(input.detect_model_type(), Some(ModelType::Gm));

    let outcome = extract(ModelType::Gm, &input, &metadata(&["a", "b"]), &gm_args()).unwrap();
    let gm = outcome.analysis.as_gm().unwrap();
    assert_eq!(gm.cluster_names(), vec!["Low", "High"]);
    assert_eq!(gm.covariance_model, CovarianceModel::Diagonal);
    assert_eq!(gm.fit.n_parameters, Some(9));
    assert!(gm.cluster_sizes.is_none());
}
