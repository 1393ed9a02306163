//! Isolated Runner: one test per forked child
//!
//! Parent stages: setup (pipes, fork) -> collecting output -> collecting
//! message -> reaping -> reconciled. Any primitive failure on the way is
//! turned into a failed `TestResult` carrying the OS error description.

use crate::config::runner::RunnerConfig;
use crate::config::types::{
    ChildExit, ParentStage, Result, RunnerError, TestOutput, TestResult, EXIT_CHILD_FAILURE,
    EXIT_TIMEOUT,
};
use crate::exec::child::{run_child, ChildPipes};
use crate::exec::collect::OutputCollector;
use crate::kernel::fork::{exit_immediately, spawn_context, Context};
use crate::kernel::pipe::ScopedPipe;
use crate::kernel::signal::describe_signal;
use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::Pid;
use std::os::fd::BorrowedFd;
use std::time::Duration;
use uuid::Uuid;

/// Runs a Test Function and reports what happened.
///
/// Implementations never propagate a failure: every outcome, including
/// their own errors, comes back as a `TestResult`.
pub trait TestRunner: Send + Sync {
    fn run(&self, test: &dyn Fn() -> TestResult, output: &mut TestOutput) -> TestResult;
}

/// Failure tagged with the parent stage it happened in
#[derive(Debug)]
struct StageError {
    stage: ParentStage,
    error: RunnerError,
}

fn at(stage: ParentStage) -> impl FnOnce(RunnerError) -> StageError {
    move |error| StageError { stage, error }
}

/// Runner that forks a child per test
#[derive(Debug, Clone, Default)]
pub struct ForkedRunner {
    config: RunnerConfig,
}

impl ForkedRunner {
    /// Runner with the given timeout and default settings otherwise
    pub fn new(timeout: Option<Duration>) -> Self {
        ForkedRunner {
            config: RunnerConfig::with_timeout(timeout),
        }
    }

    /// Runner from a full configuration, validated first
    pub fn with_config(config: RunnerConfig) -> Result<Self> {
        config.validate()?;
        Ok(ForkedRunner { config })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Run `test` in a forked child, appending its captured streams to `output`
    pub fn run_test<F>(&self, test: F, output: &mut TestOutput) -> TestResult
    where
        F: FnOnce() -> TestResult,
    {
        let run_id = Uuid::new_v4();
        match self.execute(test, output, run_id) {
            Ok(result) => {
                log::debug!("[{}] reconciled: {}", run_id, result);
                result
            }
            Err(StageError { stage, error }) => {
                log::warn!("[{}] run failed during {}: {}", run_id, stage, error);
                TestResult::fail(error.description())
            }
        }
    }

    fn execute<F>(
        &self,
        test: F,
        output: &mut TestOutput,
        run_id: Uuid,
    ) -> std::result::Result<TestResult, StageError>
    where
        F: FnOnce() -> TestResult,
    {
        let timeout = self.config.timeout();
        let mut pipes = ChildPipes::open().map_err(at(ParentStage::Setup))?;

        let pid = match spawn_context().map_err(at(ParentStage::Setup))? {
            Context::Child => child_main(pipes, test, timeout, self.config.close_inherited_fds),
            Context::Parent(pid) => pid,
        };
        log::debug!("[{}] forked child {} (timeout: {:?})", run_id, pid, timeout);

        // Our own write ends would keep the reads below from ever seeing EOF.
        pipes.stdout.close_write().map_err(at(ParentStage::Setup))?;
        pipes.stderr.close_write().map_err(at(ParentStage::Setup))?;
        pipes.log.close_write().map_err(at(ParentStage::Setup))?;

        let collector = OutputCollector::new(self.config.read_chunk_size);

        log::debug!("[{}] stage {}", run_id, ParentStage::CollectingOutput);
        let stdout = read_end(&pipes.stdout).map_err(at(ParentStage::CollectingOutput))?;
        let stderr = read_end(&pipes.stderr).map_err(at(ParentStage::CollectingOutput))?;
        collector
            .collect_streams(stdout, stderr, output)
            .map_err(at(ParentStage::CollectingOutput))?;

        log::debug!("[{}] stage {}", run_id, ParentStage::CollectingMessage);
        let message = read_end(&pipes.log)
            .and_then(|fd| collector.read_message(fd))
            .map_err(at(ParentStage::CollectingMessage))?;

        log::debug!("[{}] stage {}", run_id, ParentStage::Reaping);
        let exit = reap(pid).map_err(at(ParentStage::Reaping))?;
        log::debug!("[{}] child {} terminated: {:?}", run_id, pid, exit);

        if exit == ChildExit::Exited(EXIT_CHILD_FAILURE) {
            log::warn!(
                "[{}] child {} reported a plumbing failure (status {})",
                run_id,
                pid,
                EXIT_CHILD_FAILURE
            );
        }

        Ok(reconcile(exit, message, timeout))
    }
}

impl TestRunner for ForkedRunner {
    fn run(&self, test: &dyn Fn() -> TestResult, output: &mut TestOutput) -> TestResult {
        self.run_test(test, output)
    }
}

fn read_end(pipe: &ScopedPipe) -> Result<BorrowedFd<'_>> {
    pipe.read_end().ok_or(RunnerError::sys("read", Errno::EBADF))
}

/// Child entry point: never returns to the caller's code
fn child_main<F>(pipes: ChildPipes, test: F, timeout: Option<Duration>, close_fds: bool) -> !
where
    F: FnOnce() -> TestResult,
{
    let code = run_child(pipes, test, timeout, close_fds).unwrap_or(EXIT_CHILD_FAILURE);
    exit_immediately(code)
}

/// Block until the child terminates; interrupted waits are restarted
fn reap(pid: Pid) -> Result<ChildExit> {
    loop {
        match waitpid(pid, None) {
            Ok(WaitStatus::Exited(_, code)) => return Ok(ChildExit::Exited(code)),
            Ok(WaitStatus::Signaled(_, sig, _)) => return Ok(ChildExit::Signaled(sig as i32)),
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(e) => return Err(RunnerError::sys("waitpid", e)),
        }
    }
}

/// Map how the child terminated onto a `TestResult`.
///
/// The timeout status only means a timeout when a timeout was configured;
/// otherwise it is an ordinary failing exit.
pub fn reconcile(exit: ChildExit, message: String, timeout: Option<Duration>) -> TestResult {
    match (exit, timeout) {
        (ChildExit::Exited(EXIT_TIMEOUT), Some(timeout)) => {
            TestResult::fail(format!("Timed out after {} ms", timeout.as_millis()))
        }
        (ChildExit::Exited(code), _) => TestResult::new(code == 0, message),
        (ChildExit::Signaled(signo), _) => TestResult::fail(describe_signal(signo)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_zero_passes_with_message() {
        let result = reconcile(ChildExit::Exited(0), "all good".into(), None);
        assert_eq!(result, TestResult::pass("all good"));
    }

    #[test]
    fn nonzero_exit_fails_with_message() {
        let result = reconcile(ChildExit::Exited(1), "expected 2".into(), None);
        assert_eq!(result, TestResult::fail("expected 2"));
    }

    #[test]
    fn timeout_status_discards_message() {
        let result = reconcile(
            ChildExit::Exited(EXIT_TIMEOUT),
            "partial".into(),
            Some(Duration::from_millis(250)),
        );
        assert_eq!(result, TestResult::fail("Timed out after 250 ms"));
    }

    #[test]
    fn timeout_status_without_timeout_is_plain_failure() {
        let result = reconcile(ChildExit::Exited(EXIT_TIMEOUT), "odd exit".into(), None);
        assert_eq!(result, TestResult::fail("odd exit"));
    }

    #[test]
    fn plumbing_failure_reads_as_failure() {
        let result = reconcile(ChildExit::Exited(EXIT_CHILD_FAILURE), String::new(), None);
        assert!(!result.passed);
        assert!(result.message.is_empty());
    }

    #[test]
    fn signal_death_uses_signal_description() {
        let result = reconcile(
            ChildExit::Signaled(libc::SIGKILL),
            "ignored".into(),
            Some(Duration::from_secs(1)),
        );
        assert_eq!(result, TestResult::fail(describe_signal(libc::SIGKILL)));
        assert_eq!(result.message, "Killed");
    }

    #[test]
    fn with_config_rejects_zero_chunk() {
        let config = RunnerConfig {
            read_chunk_size: 0,
            ..RunnerConfig::default()
        };
        assert!(matches!(
            ForkedRunner::with_config(config),
            Err(RunnerError::Config(_))
        ));
    }

    #[test]
    fn new_carries_timeout_in_milliseconds() {
        let runner = ForkedRunner::new(Some(Duration::from_millis(1200)));
        assert_eq!(runner.config().timeout_ms, Some(1200));
        assert!(ForkedRunner::default().config().timeout_ms.is_none());
    }
}
