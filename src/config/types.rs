/// Core types shared by the parent and child sides of a forked run
use nix::errno::Errno;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Exit status the watchdog uses when the timeout elapses.
///
/// Never produced by a normal test completion, which only exits 0 or 1.
pub const EXIT_TIMEOUT: i32 = 64;

/// Exit status for child-side plumbing failures (redirection, message write).
pub const EXIT_CHILD_FAILURE: i32 = 128;

/// Exit status of a child whose test passed.
pub const EXIT_PASSED: i32 = 0;

/// Exit status of a child whose test failed.
pub const EXIT_FAILED: i32 = 1;

/// Outcome of a single test run
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Whether the test passed
    pub passed: bool,
    /// Diagnostic message (may be empty)
    pub message: String,
}

impl TestResult {
    pub fn new(passed: bool, message: impl Into<String>) -> Self {
        Self {
            passed,
            message: message.into(),
        }
    }

    pub fn pass(message: impl Into<String>) -> Self {
        Self::new(true, message)
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self::new(false, message)
    }

    /// Exit status the child reports this result with.
    pub fn exit_code(&self) -> i32 {
        if self.passed {
            EXIT_PASSED
        } else {
            EXIT_FAILED
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verdict = if self.passed { "passed" } else { "failed" };
        if self.message.is_empty() {
            write!(f, "{}", verdict)
        } else {
            write!(f, "{}: {}", verdict, self.message)
        }
    }
}

/// Captured standard streams of one run, owned and appended to by the parent
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutput {
    pub stdout: String,
    pub stderr: String,
}

impl TestOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.stdout.is_empty() && self.stderr.is_empty()
    }

    /// Accumulator for the given captured stream.
    pub fn stream_mut(&mut self, stream: Stream) -> &mut String {
        match stream {
            Stream::Stdout => &mut self.stdout,
            Stream::Stderr => &mut self.stderr,
        }
    }
}

/// Captured standard stream identifier
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stream {
    Stdout,
    Stderr,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stream::Stdout => write!(f, "stdout"),
            Stream::Stderr => write!(f, "stderr"),
        }
    }
}

/// Stage of the parent-side state machine, used to tag failures in logs
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParentStage {
    Setup,
    CollectingOutput,
    CollectingMessage,
    Reaping,
}

impl fmt::Display for ParentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParentStage::Setup => write!(f, "setup"),
            ParentStage::CollectingOutput => write!(f, "collecting_output"),
            ParentStage::CollectingMessage => write!(f, "collecting_message"),
            ParentStage::Reaping => write!(f, "reaping"),
        }
    }
}

/// How the direct child terminated
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChildExit {
    /// Normal exit with the given status
    Exited(i32),
    /// Killed by the given signal number
    Signaled(i32),
}

/// Error types for forkbox
#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{call} failed: {errno}")]
    Sys { call: &'static str, errno: Errno },
}

impl RunnerError {
    pub fn sys(call: &'static str, errno: Errno) -> Self {
        RunnerError::Sys { call, errno }
    }

    /// OS-level description of the failure, as reported in a `TestResult`.
    pub fn description(&self) -> String {
        match self {
            RunnerError::Sys { errno, .. } => errno.desc().to_string(),
            RunnerError::Io(e) => match e.raw_os_error() {
                Some(code) => Errno::from_i32(code).desc().to_string(),
                None => e.to_string(),
            },
            RunnerError::Config(msg) => msg.clone(),
        }
    }
}

/// Result type for forkbox operations
pub type Result<T> = std::result::Result<T, RunnerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_statuses_do_not_collide_with_verdicts() {
        for reserved in [EXIT_TIMEOUT, EXIT_CHILD_FAILURE] {
            assert_ne!(reserved, EXIT_PASSED);
            assert_ne!(reserved, EXIT_FAILED);
        }
        assert_ne!(EXIT_TIMEOUT, EXIT_CHILD_FAILURE);
    }

    #[test]
    fn exit_code_follows_verdict() {
        assert_eq!(TestResult::pass("ok").exit_code(), 0);
        assert_eq!(TestResult::fail("nope").exit_code(), 1);
    }

    #[test]
    fn sys_error_description_is_bare_os_text() {
        let err = RunnerError::sys("pipe", Errno::EMFILE);
        assert_eq!(err.description(), Errno::EMFILE.desc());
        assert!(err.to_string().starts_with("pipe failed"));
    }

    #[test]
    fn io_error_description_uses_errno_text() {
        let err = RunnerError::from(std::io::Error::from_raw_os_error(libc::EBADF));
        assert_eq!(err.description(), Errno::EBADF.desc());
    }

    #[test]
    fn display_includes_message_when_present() {
        assert_eq!(TestResult::pass("").to_string(), "passed");
        assert_eq!(TestResult::fail("boom").to_string(), "failed: boom");
    }

    #[test]
    fn stream_mut_selects_accumulator() {
        let mut output = TestOutput::new();
        output.stream_mut(Stream::Stdout).push_str("out");
        output.stream_mut(Stream::Stderr).push_str("err");
        assert_eq!(output.stdout, "out");
        assert_eq!(output.stderr, "err");
        assert!(!output.is_empty());
    }
}
