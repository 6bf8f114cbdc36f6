//! Tests for execution plans and the execution context.

use super::*;
use mockall::Sequence;
use rstest::{fixture, rstest};

mockall::mock! {
    Engine {}

    impl BuildEngine for Engine {
        fn invoke(
            &self,
            invocation: &Invocation,
            properties: &Properties,
            listeners: &Listeners,
        ) -> std::result::Result<(), EngineError>;
    }
}

#[fixture]
fn config() -> ActionConfig {
    let mut config = ActionConfig::new();
    config.set_build_file(Some(Utf8PathBuf::from("/opt/app/build.xml")));
    config.set_targets(vec!["init".to_owned(), "compile".to_owned(), "deploy".to_owned()]);
    config.add_uninstall_target("clean");
    config
}

fn context_with(config: &ActionConfig, phase: Phase) -> ExecutionContext {
    let plan = ExecutionPlan::for_phase(config, phase).expect("plan with build file");
    let mut context = ExecutionContext::new(CONTEXT_NAME);
    context.add_target(plan.into_target(CALL_TARGET));
    context
}

#[test]
fn plan_requires_build_file() {
    let err = ExecutionPlan::for_phase(&ActionConfig::new(), Phase::Install)
        .expect_err("missing build file");
    assert!(matches!(err, ActionError::Configuration { .. }), "{err:?}");
}

#[rstest]
#[case::install(Phase::Install, &["init", "compile", "deploy"])]
#[case::uninstall(Phase::Uninstall, &["clean"])]
fn plan_selects_targets_by_phase(
    config: ActionConfig,
    #[case] phase: Phase,
    #[case] expected: &[&str],
) {
    let plan = ExecutionPlan::for_phase(&config, phase).expect("plan");
    let targets: Vec<&str> = plan.invocations().iter().map(Invocation::target).collect();
    assert_eq!(targets, expected);
    assert_eq!(plan.phase(), phase);
}

#[rstest]
fn plan_carries_build_dir(mut config: ActionConfig) {
    config.set_build_dir(Some(Utf8PathBuf::from("/opt/app/work")));
    let plan = ExecutionPlan::for_phase(&config, Phase::Uninstall).expect("plan");
    let invocation = plan.invocations().first().expect("one invocation");
    assert_eq!(invocation.build_dir(), Some(Utf8Path::new("/opt/app/work")));
    assert_eq!(invocation.build_file(), Utf8Path::new("/opt/app/build.xml"));
}

#[test]
fn plan_resolves_relative_build_file() {
    let mut config = ActionConfig::new();
    config.set_build_file(Some(Utf8PathBuf::from("build.xml")));
    config.add_target("init");

    let plan = ExecutionPlan::for_phase(&config, Phase::Install).expect("plan");
    let build_file = plan.invocations().first().expect("invocation").build_file();
    assert!(build_file.is_absolute());
    assert!(build_file.ends_with("build.xml"));
}

#[rstest]
fn empty_selection_is_an_empty_plan(mut config: ActionConfig) {
    config.set_uninstall_targets(Vec::new());
    let plan = ExecutionPlan::for_phase(&config, Phase::Uninstall).expect("plan");
    assert!(plan.is_empty());
}

#[rstest]
fn executes_invocations_in_order(config: ActionConfig) {
    let context = context_with(&config, Phase::Install);
    let mut engine = MockEngine::new();
    let mut seq = Sequence::new();
    for name in ["init", "compile", "deploy"] {
        engine
            .expect_invoke()
            .withf(move |invocation, _, _| invocation.target() == name)
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
    }

    context
        .execute_target(CALL_TARGET, &engine)
        .expect("all targets succeed");
}

#[rstest]
fn stops_at_first_failure(config: ActionConfig) {
    let context = context_with(&config, Phase::Install);
    let mut engine = MockEngine::new();
    engine
        .expect_invoke()
        .withf(|invocation, _, _| invocation.target() == "init")
        .times(1)
        .returning(|_, _, _| Ok(()));
    engine
        .expect_invoke()
        .withf(|invocation, _, _| invocation.target() == "compile")
        .times(1)
        .returning(|invocation, _, _| {
            Err(EngineError::BuildFailed {
                target: invocation.target().to_owned(),
                status: Some(1),
                message: "compile error".to_owned(),
            })
        });
    engine
        .expect_invoke()
        .withf(|invocation, _, _| invocation.target() == "deploy")
        .never();

    let err = context
        .execute_target(CALL_TARGET, &engine)
        .expect_err("compile fails");
    assert!(matches!(err, EngineError::BuildFailed { ref target, .. } if target == "compile"));
}

#[rstest]
fn engine_sees_context_properties(config: ActionConfig) {
    let mut context = context_with(&config, Phase::Uninstall);
    context.set_property("env", "prod");
    let mut engine = MockEngine::new();
    engine
        .expect_invoke()
        .withf(|_, properties, _| properties.get("env") == Some("prod"))
        .times(1)
        .returning(|_, _, _| Ok(()));

    context
        .execute_target(CALL_TARGET, &engine)
        .expect("clean succeeds");
}

#[test]
fn empty_target_runs_without_engine_calls() {
    let mut context = ExecutionContext::new(CONTEXT_NAME);
    context.add_target(CompositeTarget::new(CALL_TARGET));
    let mut engine = MockEngine::new();
    engine.expect_invoke().never();

    context
        .execute_target(CALL_TARGET, &engine)
        .expect("empty target succeeds");
}

#[test]
fn unknown_target_is_reported() {
    let context = ExecutionContext::new(CONTEXT_NAME);
    let engine = MockEngine::new();
    let err = context
        .execute_target("nothing", &engine)
        .expect_err("no such target");
    assert!(matches!(err, EngineError::TargetNotFound { ref target } if target == "nothing"));
}

#[test]
fn later_property_assignments_win() {
    let mut context = ExecutionContext::new(CONTEXT_NAME);
    context.set_property("env", "dev");
    context.set_properties(&[("env", "prod"), ("region", "eu")].into_iter().collect());
    assert_eq!(context.property("env"), Some("prod"));
    assert_eq!(context.property("region"), Some("eu"));
    assert_eq!(context.name(), CONTEXT_NAME);
}

#[test]
fn add_target_replaces_same_name() {
    let mut context = ExecutionContext::new(CONTEXT_NAME);
    let mut first = CompositeTarget::new(CALL_TARGET);
    first.add_invocation(Invocation::new("/b.xml", None, "one"));
    context.add_target(first);
    context.add_target(CompositeTarget::new(CALL_TARGET));

    let target = context.target(CALL_TARGET).expect("target present");
    assert!(target.invocations().is_empty());
}
