//! Child-side sequence of a forked run
//!
//! The sequence is FIXED:
//! 1. new process group, watchdog monitor (with a deadline when a timeout is set)
//! 2. close read ends, move stdout/stderr write ends onto fds 1 and 2
//! 3. run the test function
//! 4. write the message to the private pipe, flush standard streams
//! 5. leave the group, SIGKILL whatever is left in it, exit 0/1
//!
//! Each step consumes the prior state, so the test function cannot run
//! before redirection and the exit status cannot be produced before the
//! message is reported.
//!
//! ```compile_fail
//! use forkbox::exec::child::{ChildPipes, ChildProcess, Fresh};
//! use forkbox::TestResult;
//!
//! let pipes = ChildPipes::open().unwrap();
//! // Running before isolation/redirection does not compile.
//! let _ = ChildProcess::<Fresh>::new(pipes).run(|| TestResult::pass(""));
//! ```
//!
//! ```compile_fail
//! use forkbox::exec::child::{ChildPipes, ChildProcess, Fresh};
//!
//! let pipes = ChildPipes::open().unwrap();
//! let child = ChildProcess::<Fresh>::new(pipes);
//! let _isolated = child.isolate(None);
//! // `child` was consumed by the transition above.
//! let _again = child.isolate(None);
//! ```

use crate::config::types::{Result, RunnerError, TestResult, EXIT_CHILD_FAILURE};
use crate::exec::watchdog;
use crate::kernel::pipe::ScopedPipe;
use crate::kernel::process_group::ProcessGroupScope;
use crate::utils::fd_closure::close_inherited_fds;
use nix::errno::Errno;
use nix::unistd::write;
use std::io::Write as _;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

/// Type-state marker: freshly forked, nothing set up
pub struct Fresh;

/// Type-state marker: in its own process group, watched by the monitor
pub struct Isolated;

/// Type-state marker: standard streams redirected into the pipes
pub struct Redirected;

/// Type-state marker: test function has returned
pub struct Ran;

/// Type-state marker: message written and streams flushed
pub struct Reported;

/// The three pipes of one run: captured stdout, captured stderr, private message
#[derive(Debug)]
pub struct ChildPipes {
    pub stdout: ScopedPipe,
    pub stderr: ScopedPipe,
    pub log: ScopedPipe,
}

impl ChildPipes {
    /// Open all three pipes; the message pipe is close-on-exec
    pub fn open() -> Result<Self> {
        Ok(Self {
            stdout: ScopedPipe::open()?,
            stderr: ScopedPipe::open()?,
            log: ScopedPipe::open_cloexec()?,
        })
    }
}

/// Forked child with type-state tracking
pub struct ChildProcess<S> {
    pipes: ChildPipes,
    group: Option<ProcessGroupScope>,
    result: Option<TestResult>,
    _state: PhantomData<S>,
}

impl<S> ChildProcess<S> {
    fn into_state<T>(self) -> ChildProcess<T> {
        ChildProcess {
            pipes: self.pipes,
            group: self.group,
            result: self.result,
            _state: PhantomData,
        }
    }
}

impl ChildProcess<Fresh> {
    pub fn new(pipes: ChildPipes) -> Self {
        Self {
            pipes,
            group: None,
            result: None,
            _state: PhantomData,
        }
    }

    /// Enter a new process group and arm the watchdog.
    ///
    /// The monitor cleans up the group even when the test dies from a signal;
    /// `timeout` only adds a deadline.
    pub fn isolate(mut self, timeout: Option<Duration>) -> Result<ChildProcess<Isolated>> {
        let mut scope = ProcessGroupScope::enter()?;
        watchdog::arm(timeout, &mut scope)?;
        self.group = Some(scope);
        Ok(self.into_state())
    }
}

impl ChildProcess<Isolated> {
    /// Close read ends and move the stream write ends onto stdout/stderr.
    ///
    /// With `close_inherited`, every other descriptor above stderr except the
    /// message pipe is closed as well.
    pub fn redirect(mut self, close_inherited: bool) -> Result<ChildProcess<Redirected>> {
        self.pipes.stdout.close_read()?;
        self.pipes.stderr.close_read()?;
        self.pipes.log.close_read()?;

        self.pipes.stdout.move_write(libc::STDOUT_FILENO)?;
        self.pipes.stderr.move_write(libc::STDERR_FILENO)?;

        if close_inherited {
            let log_fd = self
                .pipes
                .log
                .write_fd()
                .ok_or(RunnerError::sys("close_range", Errno::EBADF))?;
            close_inherited_fds(&[log_fd])?;
        }

        Ok(self.into_state())
    }
}

impl ChildProcess<Redirected> {
    /// Invoke the test function.
    ///
    /// A panic is not reported as a result: the group is cleaned up and the
    /// process aborts, so the parent sees a signal death.
    pub fn run<F>(mut self, test: F) -> ChildProcess<Ran>
    where
        F: FnOnce() -> TestResult,
    {
        match panic::catch_unwind(AssertUnwindSafe(test)) {
            Ok(result) => {
                self.result = Some(result);
                self.into_state()
            }
            Err(_) => {
                let _ = std::io::stdout().flush();
                if let Some(scope) = self.group.take() {
                    let _ = scope.release();
                }
                std::process::abort()
            }
        }
    }
}

impl ChildProcess<Ran> {
    pub fn result(&self) -> Option<&TestResult> {
        self.result.as_ref()
    }

    /// Write the message to the private pipe and flush standard streams
    pub fn report(self) -> Result<ChildProcess<Reported>> {
        let message = self
            .result
            .as_ref()
            .map(|r| r.message.as_bytes())
            .unwrap_or_default();
        let fd = self
            .pipes
            .log
            .write_fd()
            .ok_or(RunnerError::sys("write", Errno::EBADF))?;
        write_all(fd, message)?;

        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
        Ok(self.into_state())
    }
}

impl ChildProcess<Reported> {
    /// Leave the group, kill what the test left behind, and return the exit
    /// status for this run (0 passed, 1 failed)
    pub fn finish(mut self) -> i32 {
        if let Some(scope) = self.group.take() {
            let _ = scope.release();
        }
        self.result
            .as_ref()
            .map(TestResult::exit_code)
            .unwrap_or(EXIT_CHILD_FAILURE)
    }
}

fn write_all(fd: std::os::fd::RawFd, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        match write(fd, buf) {
            Ok(0) => return Err(RunnerError::sys("write", Errno::EPIPE)),
            Ok(n) => buf = &buf[n..],
            Err(Errno::EINTR) => continue,
            Err(e) => return Err(RunnerError::sys("write", e)),
        }
    }
    Ok(())
}

/// Run the whole child sequence and return the exit status to use
pub fn run_child<F>(
    pipes: ChildPipes,
    test: F,
    timeout: Option<Duration>,
    close_inherited: bool,
) -> Result<i32>
where
    F: FnOnce() -> TestResult,
{
    let child = ChildProcess::new(pipes).isolate(timeout)?;
    let child = child.redirect(close_inherited)?;
    let child = child.run(test).report()?;
    Ok(child.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipes_open_with_private_log_channel() {
        let pipes = ChildPipes::open().unwrap();
        let log_fd = pipes.log.write_fd().unwrap();
        assert!(crate::kernel::pipe::is_cloexec(log_fd).unwrap());
        assert!(!crate::kernel::pipe::is_cloexec(pipes.stdout.write_fd().unwrap()).unwrap());
    }

    #[test]
    fn report_writes_message_to_log_pipe() {
        let mut pipes = ChildPipes::open().unwrap();
        let log_read = pipes.log.take_read().unwrap();

        // Build a Ran state directly; isolation and redirection would touch
        // the harness's own process group and streams.
        let ran: ChildProcess<Ran> = ChildProcess {
            pipes,
            group: None,
            result: Some(TestResult::fail("line one\nline | two")),
            _state: PhantomData,
        };
        assert_eq!(ran.result().map(|r| r.passed), Some(false));

        let reported = ran.report().unwrap();
        assert_eq!(reported.finish(), 1);

        let mut file = std::fs::File::from(log_read);
        let mut message = String::new();
        std::io::Read::read_to_string(&mut file, &mut message).unwrap();
        assert_eq!(message, "line one\nline | two");
    }

    #[test]
    fn finish_without_result_reports_plumbing_failure() {
        let reported: ChildProcess<Reported> = ChildProcess {
            pipes: ChildPipes::open().unwrap(),
            group: None,
            result: None,
            _state: PhantomData,
        };
        assert_eq!(reported.finish(), EXIT_CHILD_FAILURE);
    }
}
