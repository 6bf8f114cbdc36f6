//! Tests for the command-line Ant engine.

use super::*;
use crate::test_utils::CollectingListener;
use rstest::rstest;
use std::sync::Arc;

fn invocation(target: &str) -> Invocation {
    Invocation::new("/opt/app/build.xml", None, target)
}

#[rstest]
#[case::info(LogLevel::Info, None)]
#[case::quiet(LogLevel::Warning, Some("-quiet"))]
#[case::errors_only(LogLevel::Error, Some("-quiet"))]
#[case::verbose(LogLevel::Verbose, Some("-verbose"))]
#[case::debug(LogLevel::Debug, Some("-debug"))]
fn level_flags_follow_ant_options(#[case] level: LogLevel, #[case] expected: Option<&str>) {
    assert_eq!(level_flag(level), expected);
}

#[test]
fn arguments_name_build_file_property_file_and_target() {
    let engine = AntEngine::new("ant");
    let args = engine.arguments(&invocation("deploy"), Path::new("/tmp/p.properties"));
    let expected: Vec<OsString> = [
        "-noinput",
        "-buildfile",
        "/opt/app/build.xml",
        "-propertyfile",
        "/tmp/p.properties",
        "deploy",
    ]
    .into_iter()
    .map(OsString::from)
    .collect();
    assert_eq!(args, expected);
}

#[test]
fn arguments_set_basedir_and_keep_leading_args() {
    let engine = AntEngine::new("sh")
        .with_arg("wrapper.sh")
        .with_log_level(LogLevel::Verbose);
    let call = Invocation::new(
        "/opt/app/build.xml",
        Some(Utf8PathBuf::from("/opt/app/work")),
        "init",
    );
    let args = engine.arguments(&call, Path::new("/tmp/p.properties"));

    assert_eq!(args.first(), Some(&OsString::from("wrapper.sh")));
    assert!(args.contains(&OsString::from("-verbose")));
    assert!(args.contains(&OsString::from("-Dbasedir=/opt/app/work")));
    assert_eq!(args.last(), Some(&OsString::from("init")));
}

#[test]
fn from_env_prefers_ant_home() {
    temp_env::with_var("ANT_HOME", Some("/opt/ant"), || {
        let engine = AntEngine::from_env();
        assert_eq!(engine.program(), Path::new("/opt/ant").join("bin").join("ant"));
    });
}

#[test]
fn from_env_falls_back_to_path_lookup() {
    temp_env::with_var_unset("ANT_HOME", || {
        let engine = AntEngine::from_env();
        assert!(engine.program().ends_with("ant") || engine.program().ends_with("ant.bat"));
    });
}

#[test]
fn classifies_unknown_target_from_ant_output() {
    let errors: VecDeque<String> = [
        "BUILD FAILED".to_owned(),
        "Target \"deploy\" does not exist in the project \"app\".".to_owned(),
    ]
    .into();
    let err = classify_failure("deploy", Some(1), &VecDeque::new(), &errors);
    assert!(matches!(err, EngineError::TargetNotFound { ref target } if target == "deploy"));
}

#[test]
fn build_failure_message_uses_error_output() {
    let errors: VecDeque<String> = ["BUILD FAILED".to_owned(), "/opt/build.xml:12: boom".to_owned()].into();
    let err = classify_failure("deploy", Some(1), &VecDeque::new(), &errors);
    assert!(
        matches!(
            err,
            EngineError::BuildFailed { ref message, status: Some(1), .. } if message == "/opt/build.xml:12: boom"
        ),
        "unexpected error: {err:?}"
    );
}

#[test]
fn build_failure_without_output_reports_status() {
    let err = classify_failure("deploy", Some(3), &VecDeque::new(), &VecDeque::new());
    assert!(err.to_string().contains("exit status 3"));
}

#[test]
fn spawn_failure_names_the_program() {
    let engine = AntEngine::new("/nonexistent/buildcall/ant");
    let listeners = Listeners::default();
    let err = engine
        .invoke(&invocation("init"), &Properties::new(), &listeners)
        .expect_err("missing program should fail");
    assert!(
        matches!(err, EngineError::Spawn { ref program, .. } if program.contains("nonexistent")),
        "unexpected error: {err:?}"
    );
}

#[cfg(unix)]
mod process {
    //! Runs the engine against a shell script standing in for Ant.

    use super::*;
    use tempfile::TempDir;

    // Positional parameters: $5 is the property file, the last one the target.
    const FAKE_ANT: &str = r#"
for arg; do target="$arg"; done
case "$target" in
  missing) echo "BUILD FAILED" >&2; echo "Target \"missing\" does not exist in the project \"demo\"." >&2; exit 1 ;;
  broken) echo "compiling"; echo "BUILD FAILED" >&2; echo "build.xml:3: boom" >&2; exit 1 ;;
esac
echo "calling $target"
cat "$5"
pwd
"#;

    fn fake_ant() -> AntEngine {
        AntEngine::new("/bin/sh").with_arg("-c").with_arg(FAKE_ANT).with_arg("ant")
    }

    fn collect() -> (Arc<CollectingListener>, Listeners) {
        let collector = Arc::new(CollectingListener::new());
        let mut listeners = Listeners::default();
        listeners.add(collector.clone());
        (collector, listeners)
    }

    #[test]
    fn streams_output_and_passes_properties() {
        let (collector, listeners) = collect();
        let props: Properties = [("env", "prod")].into_iter().collect();

        fake_ant()
            .invoke(&invocation("init"), &props, &listeners)
            .expect("fake build succeeds");

        let messages: Vec<String> = collector.messages().into_iter().map(|(_, m)| m).collect();
        assert!(messages.contains(&"calling init".to_owned()), "{messages:?}");
        assert!(messages.contains(&"env=prod".to_owned()), "{messages:?}");
    }

    #[test]
    fn runs_in_build_directory() {
        let dir = TempDir::new().expect("temp dir");
        let build_dir = Utf8PathBuf::try_from(dir.path().to_path_buf()).expect("UTF-8 temp dir");
        let dir_name = build_dir.file_name().expect("temp dir has a name").to_owned();
        let (collector, listeners) = collect();
        let call = Invocation::new("/opt/app/build.xml", Some(build_dir), "init");

        fake_ant()
            .invoke(&call, &Properties::new(), &listeners)
            .expect("fake build succeeds");

        assert!(
            collector
                .messages()
                .iter()
                .any(|(_, m)| m.ends_with(&dir_name)),
            "working directory not reported: {:?}",
            collector.messages()
        );
    }

    #[test]
    fn reports_missing_target() {
        let (collector, listeners) = collect();
        let err = fake_ant()
            .invoke(&invocation("missing"), &Properties::new(), &listeners)
            .expect_err("missing target fails");

        assert!(matches!(err, EngineError::TargetNotFound { .. }), "{err:?}");
        assert!(
            collector
                .messages()
                .iter()
                .any(|(level, m)| *level == LogLevel::Error && m == "BUILD FAILED")
        );
    }

    #[test]
    fn reports_build_failure_with_error_output() {
        let (_collector, listeners) = collect();
        let err = fake_ant()
            .invoke(&invocation("broken"), &Properties::new(), &listeners)
            .expect_err("broken target fails");

        assert!(
            matches!(
                err,
                EngineError::BuildFailed { ref message, status: Some(1), .. } if message == "build.xml:3: boom"
            ),
            "{err:?}"
        );
    }
}
