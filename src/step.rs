//! A `STEP` block: its commands plus the expectations they are checked against.
use crate::annotation::AnnotationError;
use crate::command::{Command, Launch, WaitPolicy};
use crate::config::{RecipeConfig, DEFAULT_TIMEOUT_SECONDS};
use crate::matcher::{match_lines, MatchMode, MatchOrder, MatchOutcome};
use crate::metadata::StepMetadata;
use crate::prompt::{self, Prompt};
use crate::report;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;

/// Which captured stream an expectation applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    pub const ALL: [Stream; 2] = [Stream::Stdout, Stream::Stderr];

    pub fn label(self) -> &'static str {
        match self {
            Self::Stdout => "stdout",
            Self::Stderr => "stderr",
        }
    }
}

#[derive(Debug)]
pub struct Step {
    name: String,
    commands: Vec<Command>,
    background: bool,
    sleep: Duration,
    working_dir: PathBuf,
    timeout: Duration,
    env: BTreeMap<String, String>,
    expected_return_code: Option<i32>,
    expected_stdout: Vec<String>,
    expected_stderr: Vec<String>,
    match_mode: MatchMode,
    match_order: MatchOrder,
    tags: BTreeSet<String>,
    pause_message: Option<String>,
    shell: Vec<String>,
    terminate_grace: Duration,
}

impl Step {
    /// Build a step from parsed metadata, rejecting unknown match settings.
    pub fn from_metadata(
        metadata: StepMetadata,
        config: &RecipeConfig,
    ) -> Result<Self, AnnotationError> {
        let match_mode = match metadata.output_match_mode.as_deref() {
            None => MatchMode::default(),
            Some(raw) => MatchMode::parse(raw).ok_or_else(|| AnnotationError::InvalidMatchMode {
                value: raw.to_string(),
                valid: MatchMode::VALID.join(", "),
            })?,
        };
        let match_order = match metadata.match_order.as_deref() {
            None => MatchOrder::default(),
            Some(raw) => MatchOrder::parse(raw).ok_or_else(|| AnnotationError::InvalidMatchOrder {
                value: raw.to_string(),
                valid: MatchOrder::VALID.join(", "),
            })?,
        };

        let working_dir = match metadata.working_dir.as_deref() {
            Some(dir) => config.working_dir.join(dir),
            None => config.working_dir.clone(),
        };
        let mut env = config.environment.clone();
        env.extend(metadata.env);

        Ok(Self {
            name: metadata.name,
            commands: Vec::new(),
            background: metadata.background,
            sleep: seconds(metadata.sleep),
            working_dir,
            timeout: seconds(metadata.timeout_seconds.unwrap_or(DEFAULT_TIMEOUT_SECONDS)),
            env,
            expected_return_code: metadata.expected_return_code,
            expected_stdout: metadata.expected_stdout_lines,
            expected_stderr: metadata.expected_stderr_lines,
            match_mode,
            match_order,
            tags: metadata.tags.into_iter().collect(),
            pause_message: metadata.manual_pause_message,
            shell: config.shell.clone(),
            terminate_grace: config.terminate_grace,
        })
    }

    pub fn add_command_block(&mut self, block: &str) {
        self.commands.push(Command::new(block));
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn background(&self) -> bool {
        self.background
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn working_dir(&self) -> &std::path::Path {
        &self.working_dir
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn expected_return_code(&self) -> Option<i32> {
        self.expected_return_code
    }

    pub fn expected_lines(&self, stream: Stream) -> &[String] {
        match stream {
            Stream::Stdout => &self.expected_stdout,
            Stream::Stderr => &self.expected_stderr,
        }
    }

    pub fn match_mode(&self) -> MatchMode {
        self.match_mode
    }

    pub fn match_order(&self) -> MatchOrder {
        self.match_order
    }

    /// Whether this step runs under the given tag filter.
    ///
    /// Untagged steps, and any step when no filter is given, always run.
    pub fn selected_by(&self, filter: &[String]) -> bool {
        self.tags.is_empty()
            || filter.is_empty()
            || filter.iter().any(|tag| self.tags.contains(tag))
    }

    fn wait_policy(&self) -> WaitPolicy {
        WaitPolicy {
            timeout: self.timeout,
            terminate_grace: self.terminate_grace,
        }
    }

    /// Start every command in order.
    ///
    /// Foreground commands are waited on one at a time and the step stops at
    /// the first unexpected return code. Background commands are started and
    /// left running. Returns false only on a foreground return-code mismatch.
    pub fn run_all_commands(&mut self, manual: bool, prompt: &mut dyn Prompt) -> bool {
        if manual {
            if let Some(message) = self.pause_message.as_deref() {
                prompt::pause(prompt, message);
            }
        }

        let policy = self.wait_policy();
        let launch = Launch {
            shell: &self.shell,
            working_dir: &self.working_dir,
            env: &self.env,
        };
        for command in &mut self.commands {
            command.start(&launch);
            if self.background {
                command.detach(policy);
            } else {
                command.wait(policy);
                if !return_code_ok(self.expected_return_code, command) {
                    tracing::warn!(
                        step = %self.name,
                        return_code = command.return_code(),
                        expected = ?self.expected_return_code,
                        "unexpected return code; stopping"
                    );
                    return false;
                }
            }
            if !self.sleep.is_zero() {
                std::thread::sleep(self.sleep);
            }
        }
        true
    }

    /// Join every background command that was started.
    ///
    /// Safe on steps that never ran: unstarted commands are skipped.
    pub fn wait_for_all_background_commands(&mut self) -> bool {
        if !self.background {
            return true;
        }
        let policy = self.wait_policy();
        let mut success = true;
        for command in &mut self.commands {
            command.wait(policy);
            if command.started() && !return_code_ok(self.expected_return_code, command) {
                success = false;
            }
        }
        success
    }

    /// Check captured output against the expected lines of one stream.
    pub fn match_stream(&self, stream: Stream) -> (Vec<String>, MatchOutcome) {
        let actual = self.actual_lines(stream);
        let outcome = match_lines(
            self.expected_lines(stream),
            &actual,
            self.match_mode,
            self.match_order,
        );
        (actual, outcome)
    }

    /// Output of every started command, split on newlines, in declaration order.
    fn actual_lines(&self, stream: Stream) -> Vec<String> {
        self.commands
            .iter()
            .filter(|command| command.started())
            .flat_map(|command| {
                let text = match stream {
                    Stream::Stdout => command.stdout(),
                    Stream::Stderr => command.stderr(),
                };
                text.split('\n').map(str::to_string).collect::<Vec<_>>()
            })
            .collect()
    }

    /// Validate both streams and render this step's report section.
    ///
    /// A stdout mismatch never suppresses stderr validation.
    pub fn validate_and_report(&self) -> (bool, String) {
        let mut success = true;
        let mut out = report::step_header(&self.name);
        for command in self.commands.iter().filter(|command| command.started()) {
            out.push_str(&report::command_line(command, self.expected_return_code));
        }
        for stream in Stream::ALL {
            let (actual, outcome) = self.match_stream(stream);
            if !outcome.success() {
                success = false;
            }
            out.push_str(&report::stream_section(
                stream.label(),
                self.expected_lines(stream),
                &actual,
                &outcome,
                self.match_mode,
                self.match_order,
            ));
        }
        (success, out)
    }

    /// Describe what running this step would do, without running anything.
    pub fn dry_run(&self) -> String {
        let mut out = format!("Step: {}\n", self.name);
        out.push_str(&format!("\tcommands to run with '{}':\n", self.shell.join(" ")));
        for command in &self.commands {
            out.push_str(&format!("\t\t`{}`\n", command.text()));
        }
        for stream in Stream::ALL {
            out.push_str(&format!("\tExpected {}:\n", stream.label()));
            for expected in self.expected_lines(stream) {
                out.push_str(&format!("\t\t{expected}\n"));
            }
        }
        let expected_code = match self.expected_return_code {
            Some(code) => code.to_string(),
            None => "unchecked".to_string(),
        };
        out.push_str(&format!("\tExpected return code: {expected_code}\n\n"));
        out
    }
}

fn return_code_ok(expected: Option<i32>, command: &Command) -> bool {
    match expected {
        None => true,
        Some(code) => command.return_code_matches(code),
    }
}

/// Clamp absurd metadata values instead of overflowing deadline arithmetic.
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::from_secs(u64::from(u32::MAX)))
}

#[cfg(test)]
#[path = "step_tests.rs"]
mod tests;
