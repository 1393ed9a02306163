/// Scoped unidirectional pipes with explicit per-end close and descriptor migration
///
/// Each end is an owned descriptor: dropping the pipe closes whatever is still
/// open, so no exit path leaks an end that would keep the other side blocked.
use crate::config::types::{Result, RunnerError};
use nix::fcntl::OFlag;
use nix::unistd::{close, dup2, pipe2};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};

/// A pipe owning up to two descriptors (read end, write end)
#[derive(Debug)]
pub struct ScopedPipe {
    read: Option<OwnedFd>,
    write: Option<OwnedFd>,
}

impl ScopedPipe {
    /// Open a pipe whose ends are inherited across exec
    pub fn open() -> Result<Self> {
        Self::open_with(OFlag::empty())
    }

    /// Open a pipe whose ends are closed on exec, so processes the test
    /// spawns never hold them
    pub fn open_cloexec() -> Result<Self> {
        Self::open_with(OFlag::O_CLOEXEC)
    }

    fn open_with(flags: OFlag) -> Result<Self> {
        let (read_fd, write_fd) = pipe2(flags).map_err(|e| RunnerError::sys("pipe", e))?;
        // SAFETY: pipe2 just returned these descriptors; nothing else owns them.
        let (read, write) = unsafe { (OwnedFd::from_raw_fd(read_fd), OwnedFd::from_raw_fd(write_fd)) };
        Ok(Self {
            read: Some(read),
            write: Some(write),
        })
    }

    pub fn read_fd(&self) -> Option<RawFd> {
        self.read.as_ref().map(|fd| fd.as_raw_fd())
    }

    pub fn write_fd(&self) -> Option<RawFd> {
        self.write.as_ref().map(|fd| fd.as_raw_fd())
    }

    /// Borrow the read end while the pipe still owns it
    pub fn read_end(&self) -> Option<BorrowedFd<'_>> {
        self.read.as_ref().map(|fd| fd.as_fd())
    }

    /// Borrow the write end while the pipe still owns it
    pub fn write_end(&self) -> Option<BorrowedFd<'_>> {
        self.write.as_ref().map(|fd| fd.as_fd())
    }

    /// Close the read end. Closing an already closed end is a no-op.
    pub fn close_read(&mut self) -> Result<()> {
        close_end(self.read.take())
    }

    /// Close the write end. Closing an already closed end is a no-op.
    pub fn close_write(&mut self) -> Result<()> {
        close_end(self.write.take())
    }

    /// Move the write end onto `target` (e.g. STDOUT_FILENO).
    ///
    /// The original descriptor is consumed; afterwards the pipe no longer
    /// owns a write end and `target` refers to the pipe.
    pub fn move_write(&mut self, target: RawFd) -> Result<()> {
        let fd = self
            .write
            .take()
            .ok_or(RunnerError::sys("dup2", nix::errno::Errno::EBADF))?;

        if fd.as_raw_fd() == target {
            // Already in place; hand ownership over to the target slot.
            let _ = fd.into_raw_fd();
            return Ok(());
        }

        dup2(fd.as_raw_fd(), target).map_err(|e| RunnerError::sys("dup2", e))?;
        close_end(Some(fd))
    }

    /// Take ownership of the read end away from the pipe
    pub fn take_read(&mut self) -> Option<OwnedFd> {
        self.read.take()
    }

    /// Take ownership of the write end away from the pipe
    pub fn take_write(&mut self) -> Option<OwnedFd> {
        self.write.take()
    }
}

fn close_end(fd: Option<OwnedFd>) -> Result<()> {
    match fd {
        Some(fd) => close(fd.into_raw_fd()).map_err(|e| RunnerError::sys("close", e)),
        None => Ok(()),
    }
}

/// Whether `fd` carries the close-on-exec flag
pub fn is_cloexec(fd: RawFd) -> Result<bool> {
    use nix::fcntl::{fcntl, FcntlArg, FdFlag};

    let bits = fcntl(fd, FcntlArg::F_GETFD).map_err(|e| RunnerError::sys("fcntl", e))?;
    Ok(FdFlag::from_bits_truncate(bits).contains(FdFlag::FD_CLOEXEC))
}
