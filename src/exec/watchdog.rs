//! Watchdog monitor: outlives the test to clean up after it, and turns an
//! elapsed time budget into a reserved exit status.
//!
//! Arming forks the caller. The new process returns from [`arm`] and goes on
//! to run the test inside a fresh process group of its own. The original
//! process stays behind as the monitor: it remains the runner's direct child,
//! waits for the test process, and exits on its behalf:
//!
//! - test exited with `c` -> monitor exits with `c`
//! - test died from signal `s` -> monitor kills the test's group, dies from `s`
//! - deadline passed -> monitor kills the test's group, exits [`EXIT_TIMEOUT`]
//!
//! Without a deadline the monitor simply blocks until the test terminates.
//!
//! The monitor never shares a process group with the test, so the test's own
//! group-kill on completion cannot take the monitor down with it.

use crate::config::types::{Result, EXIT_CHILD_FAILURE, EXIT_TIMEOUT};
use crate::kernel::fork::{exit_immediately, spawn_context, Context};
use crate::kernel::process_group::{kill_group, ProcessGroupScope};
use crate::kernel::signal::reraise;
use crate::utils::fd_closure::close_inherited_fds;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use std::time::{Duration, Instant};

/// How often the monitor checks on the test process
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Arm the watchdog, with a deadline when `timeout` is set.
///
/// Returns in the test process, whose `scope` has been moved to a new group.
/// Never returns in the monitor process.
pub fn arm(timeout: Option<Duration>, scope: &mut ProcessGroupScope) -> Result<()> {
    match spawn_context()? {
        Context::Child => scope.renew(),
        Context::Parent(test_pid) => monitor(test_pid, timeout),
    }
}

fn monitor(test_pid: Pid, timeout: Option<Duration>) -> ! {
    // Drop every pipe end so the runner sees EOF as soon as the test's side closes.
    let _ = close_inherited_fds(&[]);

    // A deadline too far out to represent is no deadline at all.
    let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
    let flags = deadline.map(|_| WaitPidFlag::WNOHANG);
    loop {
        match waitpid(test_pid, flags) {
            Ok(WaitStatus::StillAlive) => {
                if deadline.is_some_and(|d| Instant::now() >= d) {
                    break;
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Ok(WaitStatus::Exited(_, code)) => {
                // The test's group is already empty unless it bypassed cleanup.
                let _ = kill_group(test_pid);
                exit_immediately(code);
            }
            Ok(WaitStatus::Signaled(_, sig, _)) => {
                let _ = kill_group(test_pid);
                reraise(sig as i32);
                exit_immediately(EXIT_CHILD_FAILURE);
            }
            Ok(_) => continue,
            Err(Errno::EINTR) => continue,
            Err(_) => {
                let _ = kill(test_pid, Signal::SIGKILL);
                let _ = kill_group(test_pid);
                exit_immediately(EXIT_CHILD_FAILURE);
            }
        }
    }

    // The test may not have moved into its own group yet; hit it directly too.
    let _ = kill(test_pid, Signal::SIGKILL);
    let _ = kill_group(test_pid);
    loop {
        match waitpid(test_pid, None) {
            Ok(WaitStatus::Exited(..)) | Ok(WaitStatus::Signaled(..)) => break,
            Ok(_) | Err(Errno::EINTR) => continue,
            Err(_) => break,
        }
    }
    exit_immediately(EXIT_TIMEOUT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::fork::{spawn_context, Context};
    use nix::sys::wait::{waitpid, WaitStatus};

    /// Fork a child that enters a group scope, arms the watchdog, then runs `body`
    /// and exits with its return value.
    fn run_armed(timeout: Option<Duration>, body: fn() -> i32) -> WaitStatus {
        match spawn_context().unwrap() {
            Context::Child => {
                let code = match ProcessGroupScope::enter() {
                    Ok(mut scope) => match arm(timeout, &mut scope) {
                        Ok(()) => {
                            let code = body();
                            let _ = scope.release();
                            code
                        }
                        Err(_) => EXIT_CHILD_FAILURE,
                    },
                    Err(_) => EXIT_CHILD_FAILURE,
                };
                exit_immediately(code)
            }
            Context::Parent(pid) => waitpid(pid, None).unwrap(),
        }
    }

    #[test]
    fn fast_test_passes_its_exit_code_through() {
        let status = run_armed(Some(Duration::from_secs(5)), || 1);
        assert!(matches!(status, WaitStatus::Exited(_, 1)));
    }

    #[test]
    fn without_deadline_exit_code_passes_through() {
        let status = run_armed(None, || 7);
        assert!(matches!(status, WaitStatus::Exited(_, 7)));
    }

    #[test]
    fn slow_test_yields_timeout_status() {
        let status = run_armed(Some(Duration::from_millis(50)), || {
            std::thread::sleep(Duration::from_secs(5));
            0
        });
        assert!(matches!(status, WaitStatus::Exited(_, EXIT_TIMEOUT)));
    }

    #[test]
    fn signal_death_is_reproduced_by_monitor() {
        let status = run_armed(Some(Duration::from_secs(5)), || {
            let _ = nix::sys::signal::raise(Signal::SIGTERM);
            0
        });
        assert!(matches!(status, WaitStatus::Signaled(_, Signal::SIGTERM, _)));
    }

    #[test]
    fn without_deadline_signal_death_is_reproduced() {
        let status = run_armed(None, || {
            let _ = nix::sys::signal::raise(Signal::SIGTERM);
            0
        });
        assert!(matches!(status, WaitStatus::Signaled(_, Signal::SIGTERM, _)));
    }

    #[test]
    fn without_deadline_slow_test_is_awaited() {
        let status = run_armed(None, || {
            std::thread::sleep(Duration::from_millis(100));
            3
        });
        assert!(matches!(status, WaitStatus::Exited(_, 3)));
    }
}
