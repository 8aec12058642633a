//! Interactive confirmation for manual steps.
//!
//! A pause ends when the user types the exit sentinel, when stdin closes, or
//! when an interrupt arrives. An interrupt resolves the pause as confirmed
//! instead of aborting the run.
use std::io::{BufRead, Write};
use std::sync::atomic::AtomicBool;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

/// Input that ends a manual pause.
pub const EXIT_SENTINEL: &str = "x";

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// What came back from one prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Line(String),
    Interrupted,
    Closed,
}

/// Source of answers for manual pauses.
pub trait Prompt {
    fn ask(&mut self, message: &str) -> Reply;
}

/// Block until the user confirms `message`.
pub fn pause(prompt: &mut dyn Prompt, message: &str) {
    let text = format!("{message}\nType '{EXIT_SENTINEL}' to exit\n");
    loop {
        match prompt.ask(&text) {
            Reply::Line(line) if line.trim() == EXIT_SENTINEL => return,
            Reply::Line(_) => continue,
            Reply::Interrupted => {
                tracing::debug!("manual pause interrupted; continuing");
                return;
            }
            Reply::Closed => {
                tracing::debug!("stdin closed during manual pause; continuing");
                return;
            }
        }
    }
}

/// Prompts on stdout and reads answers from stdin.
#[derive(Debug, Default)]
pub struct TerminalPrompt;

impl Prompt for TerminalPrompt {
    fn ask(&mut self, message: &str) -> Reply {
        let mut stdout = std::io::stdout();
        let _ = stdout.write_all(message.as_bytes());
        let _ = stdout.flush();

        let _guard = interrupt::Guard::install();
        let Ok(lines) = stdin_lines().lock() else {
            return Reply::Closed;
        };
        loop {
            if interrupt::take() {
                return Reply::Interrupted;
            }
            match lines.recv_timeout(POLL_INTERVAL) {
                Ok(Some(line)) => return Reply::Line(line),
                Ok(None) | Err(RecvTimeoutError::Disconnected) => return Reply::Closed,
                Err(RecvTimeoutError::Timeout) => {}
            }
        }
    }
}

/// Answers from a fixed script; `Closed` once exhausted.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    replies: std::collections::VecDeque<Reply>,
    pub asked: Vec<String>,
}

impl ScriptedPrompt {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Self {
        Self {
            replies: replies.into_iter().collect(),
            asked: Vec::new(),
        }
    }
}

impl Prompt for ScriptedPrompt {
    fn ask(&mut self, message: &str) -> Reply {
        self.asked.push(message.to_string());
        self.replies.pop_front().unwrap_or(Reply::Closed)
    }
}

/// One reader thread owns stdin for the life of the process so an abandoned
/// pause never leaves a second reader competing for input.
fn stdin_lines() -> &'static Mutex<Receiver<Option<String>>> {
    static LINES: OnceLock<Mutex<Receiver<Option<String>>>> = OnceLock::new();
    LINES.get_or_init(|| {
        let (tx, rx) = mpsc::channel();
        std::thread::spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.send(Some(line)).is_err() {
                            return;
                        }
                    }
                    Err(_) => break,
                }
            }
            let _ = tx.send(None);
        });
        Mutex::new(rx)
    })
}

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

#[cfg(unix)]
mod interrupt {
    use super::INTERRUPTED;
    use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
    use std::sync::atomic::Ordering;

    extern "C" fn on_interrupt(_signal: nix::libc::c_int) {
        INTERRUPTED.store(true, Ordering::SeqCst);
    }

    /// SIGINT handler installed for the duration of one prompt.
    pub(super) struct Guard {
        previous: SigAction,
    }

    impl Guard {
        pub(super) fn install() -> Option<Self> {
            INTERRUPTED.store(false, Ordering::SeqCst);
            let action = SigAction::new(
                SigHandler::Handler(on_interrupt),
                SaFlags::empty(),
                SigSet::empty(),
            );
            // SAFETY: the handler only stores to an atomic, which is async-signal-safe.
            let previous = unsafe { signal::sigaction(Signal::SIGINT, &action) }.ok()?;
            Some(Self { previous })
        }
    }

    impl Drop for Guard {
        fn drop(&mut self) {
            // SAFETY: restores the disposition captured in `install`.
            if let Err(err) = unsafe { signal::sigaction(Signal::SIGINT, &self.previous) } {
                tracing::debug!(error = %err, "failed to restore SIGINT handler");
            }
        }
    }

    pub(super) fn take() -> bool {
        INTERRUPTED.swap(false, Ordering::SeqCst)
    }
}

#[cfg(not(unix))]
mod interrupt {
    use super::INTERRUPTED;
    use std::sync::atomic::Ordering;

    pub(super) struct Guard;

    impl Guard {
        pub(super) fn install() -> Option<Self> {
            None
        }
    }

    pub(super) fn take() -> bool {
        INTERRUPTED.swap(false, Ordering::SeqCst)
    }
}
