//! Tests for the build action execution driver.

use super::*;
use crate::engine::Invocation;
use crate::logger::Listeners;
use crate::properties::Properties;
use crate::test_utils::RecordingEngine;
use camino::Utf8PathBuf;
use mockall::Sequence;
use rstest::{fixture, rstest};
use tempfile::TempDir;

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

const BUILD_FILE: &str = "/opt/app/build.xml";

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn path(&self, name: &str) -> Utf8PathBuf {
        Utf8PathBuf::try_from(self.dir.path().join(name)).expect("temp path is UTF-8")
    }

    fn write(&self, name: &str, contents: &str) -> Utf8PathBuf {
        let path = self.path(name);
        std::fs::write(&path, contents).expect("write fixture file");
        path
    }

    fn log_file(&self) -> Utf8PathBuf {
        self.path("build.log")
    }

    fn log(&self) -> String {
        std::fs::read_to_string(self.log_file()).expect("read build log")
    }

    fn action(&self, targets: &[&str]) -> BuildAction {
        let mut config = ActionConfig::new();
        config.set_build_file(Some(Utf8PathBuf::from(BUILD_FILE)));
        config.set_log_file(Some(self.log_file()));
        for target in targets {
            config.add_target(*target);
        }
        BuildAction::new(config)
    }
}

#[fixture]
fn workspace() -> Workspace {
    Workspace {
        dir: TempDir::new().expect("temp dir"),
    }
}

#[rstest]
fn runs_targets_in_declared_order(workspace: Workspace) {
    let action = workspace.action(&["init", "compile", "deploy"]);
    let mut engine = MockEngine::new();
    let mut seq = Sequence::new();
    for expected in ["init", "compile", "deploy"] {
        engine
            .expect_invoke()
            .withf(move |invocation, _, _| {
                invocation.target() == expected
                    && invocation.build_file().as_str() == BUILD_FILE
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
    }

    action
        .perform_action_with(Phase::Install, &engine)
        .expect("build succeeds");
}

#[rstest]
fn missing_build_file_fails_before_any_side_effect(workspace: Workspace) {
    let mut action = workspace.action(&["init"]);
    action.config_mut().set_build_file(None);
    let mut engine = MockEngine::new();
    engine.expect_invoke().never();

    let err = action
        .perform_action_with(Phase::Install, &engine)
        .expect_err("no build file");

    assert!(matches!(err, ActionError::Configuration { .. }), "{err:?}");
    assert!(!workspace.log_file().exists(), "no log sink is opened");
}

#[rstest]
fn missing_property_file_aborts_before_any_target(workspace: Workspace) {
    let mut action = workspace.action(&["init"]);
    let missing = workspace.path("missing.properties");
    action.config_mut().add_property_file(missing.clone());
    let mut engine = MockEngine::new();
    engine.expect_invoke().never();

    let err = action
        .perform_action_with(Phase::Install, &engine)
        .expect_err("missing property file");

    match err {
        ActionError::PropertyFileMissing { path } => assert_eq!(path, missing),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[rstest]
fn later_sources_override_earlier_ones(workspace: Workspace) {
    let mut action = workspace.action(&["init"]);
    let first = workspace.write("first.properties", "shared=first\nonly.first=1\n");
    let second = workspace.write("second.properties", "shared=second\n");
    let config = action.config_mut();
    config.set_property("os.name", "explicit");
    config.set_property("shared", "explicit");
    config.set_property("only.explicit", "yes");
    config.add_property_file(first);
    config.add_property_file(second);
    let engine = RecordingEngine::new();

    action
        .perform_action_with(Phase::Install, &engine)
        .expect("build succeeds");

    let calls = engine.calls();
    let [call] = calls.as_slice() else {
        panic!("expected one call, got {calls:?}");
    };
    let properties = &call.properties;
    assert_eq!(properties.get("os.name"), Some("explicit"));
    assert_eq!(properties.get("shared"), Some("second"));
    assert_eq!(properties.get("only.first"), Some("1"));
    assert_eq!(properties.get("only.explicit"), Some("yes"));
    assert!(properties.contains("user.dir"), "host properties are injected");
}

#[rstest]
fn repeated_runs_are_independent(workspace: Workspace) {
    let mut action = workspace.action(&["init", "deploy"]);
    action.config_mut().set_property("env", "prod");
    let engine = RecordingEngine::new();

    action
        .perform_action_with(Phase::Install, &engine)
        .expect("first run");
    action
        .perform_action_with(Phase::Install, &engine)
        .expect("second run");

    let calls = engine.calls();
    assert_eq!(engine.targets(), ["init", "deploy", "init", "deploy"]);
    assert!(
        calls.iter().all(|call| call.properties.get("env") == Some("prod")),
        "every run sees the same properties"
    );
}

#[rstest]
fn empty_selection_succeeds_without_engine_calls(workspace: Workspace) {
    let action = workspace.action(&[]);
    let mut engine = MockEngine::new();
    engine.expect_invoke().never();

    action
        .perform_action_with(Phase::Install, &engine)
        .expect("empty build succeeds");

    assert!(workspace.log().contains("BUILD SUCCESSFUL"));
}

#[rstest]
fn uninstall_runs_uninstall_targets(workspace: Workspace) {
    let mut action = workspace.action(&["init"]);
    action.config_mut().add_uninstall_target("clean");
    action.config_mut().add_uninstall_target("remove");
    let engine = RecordingEngine::new();

    action
        .perform_action_with(Phase::Uninstall, &engine)
        .expect("uninstall succeeds");

    assert_eq!(engine.targets(), ["clean", "remove"]);
}

#[rstest]
fn engine_failure_is_an_execution_error(workspace: Workspace) {
    let action = workspace.action(&["init", "deploy"]);
    let engine = RecordingEngine::new().failing("init");

    let err = action
        .perform_action_with(Phase::Install, &engine)
        .expect_err("init fails");

    assert!(
        matches!(
            &err,
            ActionError::Execution {
                source: EngineError::BuildFailed { target, .. }
            } if target == "init"
        ),
        "{err:?}"
    );
    assert_eq!(engine.targets(), ["init"], "deploy never runs");
    let log = workspace.log();
    assert!(log.contains("BUILD FAILED"), "{log}");
    assert!(log.contains("target init failed"), "{log}");
}

#[rstest]
fn unknown_target_is_reported(workspace: Workspace) {
    let action = workspace.action(&["nosuch"]);
    let engine = RecordingEngine::new().missing("nosuch");

    let err = action
        .perform_action_with(Phase::Install, &engine)
        .expect_err("unknown target");

    assert!(
        matches!(
            err,
            ActionError::Execution {
                source: EngineError::TargetNotFound { .. }
            }
        ),
        "{err:?}"
    );
}

#[rstest]
fn build_output_reaches_the_log_file(workspace: Workspace) {
    let action = workspace.action(&["init", "deploy"]);
    let engine = RecordingEngine::new();

    action
        .perform_action_with(Phase::Install, &engine)
        .expect("build succeeds");

    let log = workspace.log();
    assert!(log.contains("\ncalltarget:\n"), "{log}");
    assert!(log.contains("[init] running init"), "{log}");
    assert!(log.contains("[deploy] running deploy"), "{log}");
    assert!(log.contains("BUILD SUCCESSFUL"), "{log}");
    assert!(!log.contains("Setting project property"), "debug output is filtered");
}

#[rstest]
#[case::build_dir(Some("/opt/app/work"), "in directory /opt/app/work")]
#[case::default_dir(None, "in default base directory")]
fn verbose_announces_the_build_file(
    workspace: Workspace,
    #[case] build_dir: Option<&str>,
    #[case] expected: &str,
) {
    let mut action = workspace.action(&["init"]);
    action.config_mut().set_verbose(true);
    action
        .config_mut()
        .set_build_dir(build_dir.map(Utf8PathBuf::from));
    let engine = RecordingEngine::new();

    action
        .perform_action_with(Phase::Install, &engine)
        .expect("build succeeds");

    let log = workspace.log();
    assert!(
        log.contains(&format!("Calling Ant with buildfile: {BUILD_FILE} {expected}")),
        "{log}"
    );
    assert!(log.contains("calling target init in"), "{log}");
}

#[rstest]
fn quiet_suppresses_informational_output(workspace: Workspace) {
    let mut action = workspace.action(&["init"]);
    action.config_mut().set_quiet(true);
    let engine = RecordingEngine::new();

    action
        .perform_action_with(Phase::Install, &engine)
        .expect("build succeeds");

    let log = workspace.log();
    assert!(!log.contains("running init"), "{log}");
    assert!(!log.contains("BUILD SUCCESSFUL"), "{log}");
}

#[rstest]
fn init_and_deploy_run_with_explicit_property(workspace: Workspace) {
    let mut action = workspace.action(&["init", "deploy"]);
    action.config_mut().set_property("env", "prod");
    let mut engine = MockEngine::new();
    let mut seq = Sequence::new();
    for expected in ["init", "deploy"] {
        engine
            .expect_invoke()
            .withf(move |invocation, properties, _| {
                invocation.target() == expected && properties.get("env") == Some("prod")
            })
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_, _, _| Ok(()));
    }

    action
        .perform_action_with(Phase::Install, &engine)
        .expect("build succeeds");
}

#[test]
fn from_config_wraps_configuration() {
    let mut config = ActionConfig::new();
    config.add_target("init");
    let action = BuildAction::from(config.clone());
    assert_eq!(action.config(), &config);
}
