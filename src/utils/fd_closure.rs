/// File descriptor closure for forked children
///
/// - Prefer close_range over the gaps between kept descriptors
/// - Fallback to iterating /proc/self/fd
/// - stdin, stdout and stderr are always kept
///
/// Runs in the child after its standard streams are redirected, so it never logs.
use crate::config::types::{Result, RunnerError};
use nix::errno::Errno;
use nix::unistd::close;
use std::fs;
use std::os::fd::RawFd;

const FIRST_NON_STD_FD: RawFd = 3;

/// Close every descriptor above stderr except those in `keep`.
/// Returns the number of descriptors closed when it is known.
pub fn close_inherited_fds(keep: &[RawFd]) -> Result<Option<usize>> {
    let mut keep: Vec<RawFd> = keep
        .iter()
        .copied()
        .filter(|&fd| fd >= FIRST_NON_STD_FD)
        .collect();
    keep.sort_unstable();
    keep.dedup();

    #[cfg(target_os = "linux")]
    {
        if try_close_range(&keep) {
            return Ok(None);
        }
    }

    close_fds_via_proc(&keep).map(Some)
}

/// Close the gaps between kept descriptors with close_range (Linux 5.9+)
#[cfg(target_os = "linux")]
fn try_close_range(keep: &[RawFd]) -> bool {
    // close_range shares one syscall number across architectures
    const SYS_CLOSE_RANGE: libc::c_long = 436;

    let mut start = FIRST_NON_STD_FD as libc::c_uint;
    let mut ranges: Vec<(libc::c_uint, libc::c_uint)> = Vec::with_capacity(keep.len() + 1);
    for &fd in keep {
        let fd = fd as libc::c_uint;
        if fd > start {
            ranges.push((start, fd - 1));
        }
        start = fd + 1;
    }
    ranges.push((start, libc::c_uint::MAX));

    for (first, last) in ranges {
        // SAFETY: close_range only closes descriptors; none of the closed
        // ranges contains a descriptor the caller asked to keep.
        let rc = unsafe { libc::syscall(SYS_CLOSE_RANGE, first, last, 0 as libc::c_uint) };
        if rc != 0 {
            return false;
        }
    }
    true
}

/// Close descriptors found in /proc/self/fd
fn close_fds_via_proc(keep: &[RawFd]) -> Result<usize> {
    // Collect first: the directory stream holds a descriptor of its own.
    let fds = get_open_fds()?;

    let mut closed_count = 0;
    for fd in fds {
        if fd < FIRST_NON_STD_FD || keep.binary_search(&fd).is_ok() {
            continue;
        }
        match close(fd) {
            Ok(()) => closed_count += 1,
            // The directory stream's own descriptor is already gone.
            Err(Errno::EBADF) => {}
            Err(e) => return Err(RunnerError::sys("close", e)),
        }
    }

    Ok(closed_count)
}

/// Get list of open file descriptors
pub fn get_open_fds() -> Result<Vec<RawFd>> {
    let fd_dir = "/proc/self/fd";

    let entries = fs::read_dir(fd_dir)
        .map_err(|e| RunnerError::Config(format!("Failed to read {}: {}", fd_dir, e)))?;

    let mut fds = Vec::new();

    for entry in entries.flatten() {
        if let Ok(file_name) = entry.file_name().into_string() {
            if let Ok(fd) = file_name.parse::<RawFd>() {
                fds.push(fd);
            }
        }
    }

    fds.sort();
    Ok(fds)
}
