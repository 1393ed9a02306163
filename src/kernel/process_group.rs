/// Process-group scope for the forked test process
///
/// `enter()` makes the calling process the leader of a fresh group; every
/// process it spawns afterwards lands in that group unless it moves itself.
/// `release()` steps back into the previous group and SIGKILLs whatever is
/// left in the scope's group. Dropping an unreleased scope releases it, so
/// error paths that unwind through `?` still clean up.
use crate::config::types::{Result, RunnerError};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::{getpgid, setpgid, Pid};

/// Summary of a scope release
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupKill {
    /// Whether the group still had members when the SIGKILL was sent
    pub had_members: bool,
}

/// A process group owned by the current process
#[derive(Debug)]
pub struct ProcessGroupScope {
    previous: Pid,
    group: Pid,
    released: bool,
}

impl ProcessGroupScope {
    /// Move the calling process into a new process group it leads
    pub fn enter() -> Result<Self> {
        let previous = getpgid(None).map_err(|e| RunnerError::sys("getpgid", e))?;
        setpgid(Pid::from_raw(0), Pid::from_raw(0)).map_err(|e| RunnerError::sys("setpgid", e))?;
        let group = getpgid(None).map_err(|e| RunnerError::sys("getpgid", e))?;

        Ok(Self {
            previous,
            group,
            released: false,
        })
    }

    /// Group the calling process belonged to before `enter()`
    pub fn previous(&self) -> Pid {
        self.previous
    }

    /// Group created by `enter()`
    pub fn group(&self) -> Pid {
        self.group
    }

    /// Move the caller into another fresh group it leads, leaving the old
    /// group to whoever remains in it. Used after the watchdog splits off
    /// the test process, so the monitor is never inside the test's group.
    pub fn renew(&mut self) -> Result<()> {
        setpgid(Pid::from_raw(0), Pid::from_raw(0)).map_err(|e| RunnerError::sys("setpgid", e))?;
        self.group = getpgid(None).map_err(|e| RunnerError::sys("getpgid", e))?;
        Ok(())
    }

    /// Leave the group and kill everything still in it. Victims are not reaped.
    pub fn release(mut self) -> Result<GroupKill> {
        self.released = true;
        leave_and_kill(self.previous, self.group)
    }
}

impl Drop for ProcessGroupScope {
    fn drop(&mut self) {
        if !self.released {
            let _ = leave_and_kill(self.previous, self.group);
        }
    }
}

/// Move the calling process into `previous` (if it is still in `group`) and
/// SIGKILL `group`.
pub fn leave_and_kill(previous: Pid, group: Pid) -> Result<GroupKill> {
    let current = getpgid(None).map_err(|e| RunnerError::sys("getpgid", e))?;
    if current == group {
        setpgid(Pid::from_raw(0), previous).map_err(|e| RunnerError::sys("setpgid", e))?;
    }
    kill_group(group)
}

/// SIGKILL every member of `group`; an already empty group is not an error
pub fn kill_group(group: Pid) -> Result<GroupKill> {
    match killpg(group, Signal::SIGKILL) {
        Ok(()) => Ok(GroupKill { had_members: true }),
        Err(Errno::ESRCH) => Ok(GroupKill { had_members: false }),
        Err(e) => Err(RunnerError::sys("killpg", e)),
    }
}
