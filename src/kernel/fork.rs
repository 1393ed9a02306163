/// Isolated execution contexts built on fork(2)
///
/// The rest of the crate only sees `spawn_context`: the parent receives a
/// handle to the child, the child receives control and must finish through
/// [`exit_immediately`] rather than returning into the caller's stack.
use crate::config::types::{Result, RunnerError};
use nix::unistd::{fork, ForkResult, Pid};
use std::io::Write;

/// Which side of the split the caller is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    /// Original process; holds the child's pid
    Parent(Pid),
    /// Fresh single-threaded copy of the caller
    Child,
}

/// Flush buffered standard output so it is not duplicated into the child
pub fn flush_std_streams() {
    let _ = std::io::stdout().flush();
    let _ = std::io::stderr().flush();
}

/// Duplicate the calling process.
///
/// Buffered standard output is flushed first. Only async-signal-safe work is
/// guaranteed to be sound in the child when the parent has other threads.
pub fn spawn_context() -> Result<Context> {
    flush_std_streams();

    // SAFETY: the child side never returns into arbitrary caller frames;
    // every user of `Context::Child` terminates through `exit_immediately`.
    match unsafe { fork() } {
        Ok(ForkResult::Parent { child }) => Ok(Context::Parent(child)),
        Ok(ForkResult::Child) => Ok(Context::Child),
        Err(e) => Err(RunnerError::sys("fork", e)),
    }
}

/// Terminate the current process without running atexit handlers or
/// destructors inherited from the parent image
pub fn exit_immediately(code: i32) -> ! {
    // SAFETY: _exit is async-signal-safe and never returns.
    unsafe { libc::_exit(code) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::wait::{waitpid, WaitStatus};

    #[test]
    fn child_exit_code_reaches_parent() {
        match spawn_context().unwrap() {
            Context::Child => exit_immediately(42),
            Context::Parent(pid) => {
                assert_eq!(waitpid(pid, None).unwrap(), WaitStatus::Exited(pid, 42));
            }
        }
    }
}
