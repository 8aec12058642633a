//! One shell command extracted from a fenced block, and its process lifecycle.
//!
//! Lifecycle: pending -> running -> finished. A running command can be handed
//! to a dedicated thread (background steps) and joined later; waiting on a
//! command that never started is a no-op.
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use wait_timeout::ChildExt;

/// Return code reported before the process has been reaped, or when it never was.
pub const UNKNOWN_RETURN_CODE: i32 = -1;

/// Where and how a command's process is spawned.
pub(crate) struct Launch<'a> {
    pub(crate) shell: &'a [String],
    pub(crate) working_dir: &'a Path,
    pub(crate) env: &'a BTreeMap<String, String>,
}

/// Bounds applied while waiting on a running command.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WaitPolicy {
    pub(crate) timeout: Duration,
    pub(crate) terminate_grace: Duration,
}

#[derive(Debug)]
pub struct Command {
    text: String,
    state: State,
    return_code: Option<i32>,
    stdout: String,
    stderr: String,
    started_at: Option<Instant>,
    duration: Option<Duration>,
    timed_out: bool,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Pending,
    Running(Box<Running>),
    Detached(JoinHandle<Completion>),
    Finished,
}

#[derive(Debug)]
struct Running {
    child: Child,
    stdout: Capture,
    stderr: Capture,
    started_at: Instant,
}

#[derive(Debug)]
struct Completion {
    return_code: Option<i32>,
    stdout: String,
    stderr: String,
    timed_out: bool,
    finished_at: Instant,
}

impl Command {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.trim().to_string(),
            state: State::Pending,
            return_code: None,
            stdout: String::new(),
            stderr: String::new(),
            started_at: None,
            duration: None,
            timed_out: false,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Observed return code, or [`UNKNOWN_RETURN_CODE`] until known.
    pub fn return_code(&self) -> i32 {
        self.return_code.unwrap_or(UNKNOWN_RETURN_CODE)
    }

    /// Whether the observed code equals `expected`. An unknown code never matches.
    pub fn return_code_matches(&self, expected: i32) -> bool {
        self.return_code == Some(expected)
    }

    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    pub fn started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn finished(&self) -> bool {
        matches!(self.state, State::Finished)
    }

    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Time from start until the return code was known.
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Spawn the process. Output is captured, not streamed.
    ///
    /// A spawn failure finishes the command immediately with an unknown return
    /// code and the error text as its stderr.
    pub(crate) fn start(&mut self, launch: &Launch<'_>) {
        if !matches!(self.state, State::Pending) {
            return;
        }
        let started_at = Instant::now();
        self.started_at = Some(started_at);
        tracing::info!(
            shell = %launch.shell.join(" "),
            cwd = %launch.working_dir.display(),
            command = %self.text,
            "running command"
        );
        match spawn(&self.text, launch) {
            Ok(mut child) => {
                let stdout = Capture::spawn(child.stdout.take());
                let stderr = Capture::spawn(child.stderr.take());
                self.state = State::Running(Box::new(Running {
                    child,
                    stdout,
                    stderr,
                    started_at,
                }));
            }
            Err(err) => {
                tracing::warn!(command = %self.text, error = %err, "failed to spawn command");
                self.apply(Completion {
                    return_code: None,
                    stdout: String::new(),
                    stderr: format!("failed to spawn {:?}: {err}", launch.shell.join(" ")),
                    timed_out: false,
                    finished_at: Instant::now(),
                });
            }
        }
    }

    /// Move a running command onto its own thread so the caller does not block.
    pub(crate) fn detach(&mut self, policy: WaitPolicy) {
        match std::mem::take(&mut self.state) {
            State::Running(running) => {
                let handle = thread::spawn(move || running.finish(policy));
                self.state = State::Detached(handle);
            }
            other => self.state = other,
        }
    }

    /// Block until the command finishes or its timeout handling completes.
    pub(crate) fn wait(&mut self, policy: WaitPolicy) {
        match std::mem::take(&mut self.state) {
            other @ (State::Pending | State::Finished) => self.state = other,
            State::Running(running) => {
                let completion = running.finish(policy);
                self.apply(completion);
            }
            State::Detached(handle) => {
                let completion = handle.join().unwrap_or_else(|_| Completion {
                    return_code: None,
                    stdout: String::new(),
                    stderr: "command wait thread panicked".to_string(),
                    timed_out: false,
                    finished_at: Instant::now(),
                });
                self.apply(completion);
            }
        }
    }

    fn apply(&mut self, completion: Completion) {
        self.return_code = completion.return_code;
        self.stdout = completion.stdout;
        self.stderr = completion.stderr;
        self.timed_out = completion.timed_out;
        self.duration = self
            .started_at
            .map(|started| completion.finished_at.saturating_duration_since(started));
        self.state = State::Finished;
        tracing::info!(
            command = %self.text,
            return_code = self.return_code(),
            timed_out = self.timed_out,
            "command finished"
        );
    }
}

fn spawn(text: &str, launch: &Launch<'_>) -> std::io::Result<Child> {
    let (program, args) = launch.shell.split_first().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "shell command is empty")
    })?;
    std::process::Command::new(program)
        .args(args)
        .arg(text)
        .current_dir(launch.working_dir)
        .env_clear()
        .envs(launch.env)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
}

impl Running {
    /// Wait with timeout; on expiry terminate, pause for the grace period,
    /// kill, and make one more bounded attempt to reap.
    fn finish(mut self, policy: WaitPolicy) -> Completion {
        let mut timed_out = false;
        let status = match self.child.wait_timeout(policy.timeout) {
            Ok(Some(status)) => Some(status),
            Ok(None) => {
                timed_out = true;
                tracing::warn!(
                    timeout_secs = policy.timeout.as_secs_f64(),
                    "command timed out; terminating"
                );
                terminate(&mut self.child);
                thread::sleep(policy.terminate_grace);
                if let Err(err) = self.child.kill() {
                    tracing::debug!(error = %err, "kill after terminate failed");
                }
                match self.child.wait_timeout(policy.timeout) {
                    Ok(status) => status,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to reap killed command");
                        None
                    }
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to wait on command");
                None
            }
        };
        let finished_at = Instant::now();

        // Grandchildren may still hold the pipes; both share one deadline.
        let deadline = Instant::now() + policy.timeout;
        let stdout = self.stdout.collect(deadline);
        let stderr = self.stderr.collect(deadline);

        tracing::debug!(
            elapsed_secs = finished_at.duration_since(self.started_at).as_secs_f64(),
            "command reaped"
        );
        Completion {
            return_code: status.and_then(return_code),
            stdout,
            stderr,
            timed_out,
            finished_at,
        }
    }
}

#[cfg(unix)]
fn terminate(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(child.id()) else {
        return;
    };
    if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
        tracing::debug!(pid = raw, error = %err, "SIGTERM delivery failed");
    }
}

#[cfg(not(unix))]
fn terminate(child: &mut Child) {
    if let Err(err) = child.kill() {
        tracing::debug!(error = %err, "terminate failed");
    }
}

#[cfg(unix)]
fn return_code(status: ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.code().or_else(|| status.signal().map(|signal| -signal))
}

#[cfg(not(unix))]
fn return_code(status: ExitStatus) -> Option<i32> {
    status.code()
}

/// Drains one pipe on a helper thread so a chatty process never blocks on a full pipe.
#[derive(Debug)]
struct Capture {
    buffer: Arc<Mutex<Vec<u8>>>,
    done: Receiver<()>,
}

impl Capture {
    fn spawn<R: Read + Send + 'static>(source: Option<R>) -> Self {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let (tx, done) = mpsc::channel();
        let sink = Arc::clone(&buffer);
        thread::spawn(move || {
            if let Some(mut source) = source {
                let mut chunk = [0u8; 8192];
                loop {
                    match source.read(&mut chunk) {
                        Ok(0) => break,
                        Ok(read) => match sink.lock() {
                            Ok(mut buffer) => buffer.extend_from_slice(&chunk[..read]),
                            Err(_) => break,
                        },
                        Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                        Err(_) => break,
                    }
                }
            }
            let _ = tx.send(());
        });
        Self { buffer, done }
    }

    /// Whatever was read once the pipe closes, or so far if `deadline` passes first.
    fn collect(self, deadline: Instant) -> String {
        let limit = deadline.saturating_duration_since(Instant::now());
        match self.done.recv_timeout(limit) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!("output pipe still open after timeout; keeping partial output");
            }
        }
        match self.buffer.lock() {
            Ok(buffer) => String::from_utf8_lossy(&buffer).into_owned(),
            Err(_) => String::new(),
        }
    }
}

#[cfg(test)]
#[path = "command_tests.rs"]
mod tests;
