use super::{Step, Stream};
use crate::annotation::AnnotationError;
use crate::config::RecipeConfig;
use crate::metadata::StepMetadata;
use crate::prompt::{Reply, ScriptedPrompt};
use std::path::PathBuf;
use std::time::{Duration, Instant};

fn find_in_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

fn sh_config() -> Option<RecipeConfig> {
    find_in_path("sh")?;
    Some(RecipeConfig {
        shell: vec!["sh".to_string(), "-c".to_string()],
        terminate_grace: Duration::from_millis(100),
        ..RecipeConfig::default()
    })
}

fn step(yaml: &str, config: &RecipeConfig, blocks: &[&str]) -> Step {
    let metadata = StepMetadata::parse(yaml).expect("metadata");
    let mut step = Step::from_metadata(metadata, config).expect("step");
    for block in blocks {
        step.add_command_block(block);
    }
    step
}

#[test]
fn unknown_match_settings_are_rejected() {
    let config = RecipeConfig::default();
    let metadata = StepMetadata::parse("output_match_mode: regex").expect("metadata");
    let err = Step::from_metadata(metadata, &config).expect_err("invalid mode");
    assert_eq!(
        err,
        AnnotationError::InvalidMatchMode {
            value: "regex".to_string(),
            valid: "exact, substring".to_string(),
        }
    );

    let metadata = StepMetadata::parse("match_order: shuffled").expect("metadata");
    let err = Step::from_metadata(metadata, &config).expect_err("invalid order");
    assert!(matches!(err, AnnotationError::InvalidMatchOrder { .. }));
}

#[test]
fn env_overrides_merge_over_snapshot() {
    let mut config = RecipeConfig::default();
    config.environment.insert("KEEP".to_string(), "base".to_string());
    config.environment.insert("OVERRIDE".to_string(), "base".to_string());
    let step = step("env:\n  OVERRIDE: step\n  ADDED: 1\n", &config, &[]);
    assert_eq!(step.env()["KEEP"], "base");
    assert_eq!(step.env()["OVERRIDE"], "step");
    assert_eq!(step.env()["ADDED"], "1");
}

#[test]
fn working_dir_resolves_against_base() {
    let config = RecipeConfig {
        working_dir: PathBuf::from("/base"),
        ..RecipeConfig::default()
    };
    let relative = step("working_dir: sub", &config, &[]);
    assert_eq!(relative.working_dir(), PathBuf::from("/base/sub"));
    let absolute = step("working_dir: /elsewhere", &config, &[]);
    assert_eq!(absolute.working_dir(), PathBuf::from("/elsewhere"));
    let default = step("", &config, &[]);
    assert_eq!(default.working_dir(), PathBuf::from("/base"));
}

#[test]
fn tag_filter_selection() {
    let config = RecipeConfig::default();
    let untagged = step("", &config, &[]);
    let tagged = step("tags:\n  - foo\n", &config, &[]);
    let no_filter: Vec<String> = Vec::new();
    let blag = vec!["blag".to_string()];
    let foo = vec!["foo".to_string()];

    assert!(untagged.selected_by(&no_filter));
    assert!(untagged.selected_by(&blag));
    assert!(tagged.selected_by(&no_filter));
    assert!(tagged.selected_by(&foo));
    assert!(!tagged.selected_by(&blag));
}

#[test]
fn foreground_failure_stops_remaining_commands() {
    let Some(config) = sh_config() else {
        return;
    };
    let mut step = step("", &config, &["exit 2", "echo never"]);
    let mut prompt = ScriptedPrompt::default();
    assert!(!step.run_all_commands(false, &mut prompt));
    assert!(step.commands()[0].finished());
    assert_eq!(step.commands()[0].return_code(), 2);
    assert!(!step.commands()[1].started());

    let (valid, report) = step.validate_and_report();
    assert!(valid);
    assert!(report.contains("exit 2"));
    assert!(!report.contains("echo never"));
}

#[test]
fn unchecked_return_code_never_fails() {
    let Some(config) = sh_config() else {
        return;
    };
    let mut step = step("expected_return_code:\n", &config, &["exit 7", "echo next"]);
    assert_eq!(step.expected_return_code(), None);
    let mut prompt = ScriptedPrompt::default();
    assert!(step.run_all_commands(false, &mut prompt));
    assert!(step.wait_for_all_background_commands());
    assert_eq!(step.commands()[1].stdout(), "next\n");
}

#[test]
fn background_commands_do_not_block() {
    let Some(config) = sh_config() else {
        return;
    };
    let mut step = step(
        "background: true\nexpected_stdout_lines:\n  - slow\n",
        &config,
        &["sleep 1; echo slow; exit 5"],
    );
    let mut prompt = ScriptedPrompt::default();
    let before = Instant::now();
    assert!(step.run_all_commands(false, &mut prompt));
    assert!(before.elapsed() < Duration::from_millis(900));

    assert!(!step.wait_for_all_background_commands());
    assert_eq!(step.commands()[0].return_code(), 5);
    let (valid, _) = step.validate_and_report();
    assert!(valid);
}

#[test]
fn joining_a_step_that_never_ran_is_a_noop() {
    let config = RecipeConfig::default();
    let mut step = step("background: true\n", &config, &["sleep 5"]);
    assert!(step.wait_for_all_background_commands());
    assert!(!step.commands()[0].started());
}

#[test]
fn output_is_concatenated_across_commands() {
    let Some(config) = sh_config() else {
        return;
    };
    let yaml = "\
expected_stdout_lines:
  - first
  - second
expected_stderr_lines:
  - warned
";
    let mut step = step(yaml, &config, &["echo first", "echo second; echo warned 1>&2"]);
    let mut prompt = ScriptedPrompt::default();
    assert!(step.run_all_commands(false, &mut prompt));

    let (actual, outcome) = step.match_stream(Stream::Stdout);
    assert_eq!(actual, ["first", "", "second", ""]);
    assert!(outcome.success());
    let (valid, _) = step.validate_and_report();
    assert!(valid);
}

#[test]
fn stderr_is_checked_even_when_stdout_fails() {
    let Some(config) = sh_config() else {
        return;
    };
    let yaml = "\
expected_stdout_lines:
  - missing
expected_stderr_lines:
  - also missing
";
    let mut step = step(yaml, &config, &["echo present"]);
    let mut prompt = ScriptedPrompt::default();
    assert!(step.run_all_commands(false, &mut prompt));
    colored::control::set_override(false);
    let (valid, report) = step.validate_and_report();
    assert!(!valid);
    assert!(report.contains("\t\tmissing\n"));
    assert!(report.contains("\t\talso missing\n"));
}

#[test]
fn sleep_applies_after_each_command() {
    let Some(config) = sh_config() else {
        return;
    };
    let mut step = step("sleep: 0.2\n", &config, &["true", "true"]);
    let mut prompt = ScriptedPrompt::default();
    let before = Instant::now();
    assert!(step.run_all_commands(false, &mut prompt));
    assert!(before.elapsed() >= Duration::from_millis(400));
}

#[test]
fn manual_pause_only_in_manual_mode() {
    let Some(config) = sh_config() else {
        return;
    };
    let yaml = "manual_pause_message: Check the dashboard\n";

    let mut quiet = step(yaml, &config, &["true"]);
    let mut prompt = ScriptedPrompt::default();
    assert!(quiet.run_all_commands(false, &mut prompt));
    assert!(prompt.asked.is_empty());

    let mut manual = step(yaml, &config, &["true"]);
    let mut prompt = ScriptedPrompt::new([Reply::Line("x".to_string())]);
    assert!(manual.run_all_commands(true, &mut prompt));
    assert_eq!(prompt.asked, ["Check the dashboard\nType 'x' to exit\n"]);
}

#[test]
fn timeout_marks_command_as_failed() {
    let Some(config) = sh_config() else {
        return;
    };
    let mut step = step("timeout_seconds: 0.2\n", &config, &["exec sleep 30"]);
    let mut prompt = ScriptedPrompt::default();
    let before = Instant::now();
    assert!(!step.run_all_commands(false, &mut prompt));
    assert!(before.elapsed() < Duration::from_secs(10));
    assert!(step.commands()[0].timed_out());
    assert_eq!(step.timeout(), Duration::from_millis(200));
}

#[test]
fn dry_run_describes_without_running() {
    let config = RecipeConfig::default();
    let yaml = "\
name: build
expected_stdout_lines:
  - ok
expected_return_code:
";
    let step = step(yaml, &config, &["make all"]);
    assert_eq!(
        step.dry_run(),
        "Step: build\n\
         \tcommands to run with 'bash -c':\n\
         \t\t`make all`\n\
         \tExpected stdout:\n\
         \t\tok\n\
         \tExpected stderr:\n\
         \tExpected return code: unchecked\n\n"
    );
    assert!(!step.commands()[0].started());
}
