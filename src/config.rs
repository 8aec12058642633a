//! Runtime configuration shared by parsing and execution.
use anyhow::{anyhow, Context, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Shell used when none is configured.
pub const DEFAULT_SHELL: &str = "bash -c";

/// Per-command timeout applied when a step omits `timeout_seconds`.
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 300.0;

/// Pause between the terminate signal and the forced kill of a timed-out command.
pub const DEFAULT_TERMINATE_GRACE: Duration = Duration::from_secs(10);

/// Pause between failed link validation attempts.
pub const DEFAULT_LINK_BACKOFF: Duration = Duration::from_millis(500);

/// Upper bound on a single link validation request.
pub const DEFAULT_LINK_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Link validation attempts when the caller does not choose a count.
pub const DEFAULT_LINK_RETRIES: u32 = 3;

/// Settings fixed when a recipe is parsed.
///
/// The environment and working directory are snapshots taken once, so steps
/// never read ambient process state at execution time.
#[derive(Debug, Clone)]
pub struct RecipeConfig {
    /// Shell argv prefix; the command text is appended as the final argument.
    pub shell: Vec<String>,
    pub environment: BTreeMap<String, String>,
    /// Base directory that step `working_dir` values resolve against.
    pub working_dir: PathBuf,
    pub terminate_grace: Duration,
    pub link_backoff: Duration,
    pub link_request_timeout: Duration,
}

impl Default for RecipeConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            environment: capture_environment(),
            working_dir: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            terminate_grace: DEFAULT_TERMINATE_GRACE,
            link_backoff: DEFAULT_LINK_BACKOFF,
            link_request_timeout: DEFAULT_LINK_REQUEST_TIMEOUT,
        }
    }
}

impl RecipeConfig {
    /// Replace the shell with a whitespace-separated command such as `cmd /c`.
    pub fn with_shell_command(mut self, raw: &str) -> Result<Self> {
        self.shell = parse_shell(raw)?;
        Ok(self)
    }

    /// Human-readable form of the configured shell.
    pub fn shell_display(&self) -> String {
        self.shell.join(" ")
    }
}

/// Options for a single recipe execution.
#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    /// Honor `manual_pause_message` by waiting for interactive confirmation.
    pub manual: bool,
    /// Only run tagged steps that share one of these tags; empty runs everything.
    pub tags: Vec<String>,
    pub validate_links: bool,
    pub link_retries: u32,
}

impl Default for ExecuteOptions {
    fn default() -> Self {
        Self {
            manual: false,
            tags: Vec::new(),
            validate_links: false,
            link_retries: DEFAULT_LINK_RETRIES,
        }
    }
}

/// Snapshot the current process environment.
///
/// Non-UTF-8 variables are carried over lossily.
pub fn capture_environment() -> BTreeMap<String, String> {
    std::env::vars_os()
        .map(|(key, value)| {
            (
                key.to_string_lossy().into_owned(),
                value.to_string_lossy().into_owned(),
            )
        })
        .collect()
}

/// Split a shell command line into an argv prefix.
pub fn parse_shell(raw: &str) -> Result<Vec<String>> {
    let argv = shell_words::split(raw).with_context(|| format!("parse shell {raw:?}"))?;
    if argv.is_empty() {
        return Err(anyhow!("shell command is empty"));
    }
    Ok(argv)
}

fn default_shell() -> Vec<String> {
    DEFAULT_SHELL.split_whitespace().map(str::to_string).collect()
}
