//! Signal helpers for reporting and propagating signal deaths

use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, SigmaskHow, Signal};
use std::ffi::CStr;

/// Human-readable description of a signal number, as the platform's
/// `strsignal` reports it ("Illegal instruction", "Killed", ...)
pub fn describe_signal(signo: i32) -> String {
    if signo <= 0 {
        return format!("Unknown signal {}", signo);
    }

    // SAFETY: strsignal returns a pointer to a static or thread-local string
    // that stays valid until the next strsignal call on this thread; it is
    // copied out immediately.
    let ptr = unsafe { libc::strsignal(signo) };
    if ptr.is_null() {
        return format!("Unknown signal {}", signo);
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Restore the default disposition for `sig` and make sure it is not blocked
pub fn reset_default(sig: Signal) -> nix::Result<()> {
    let default = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
    // SAFETY: installing SIG_DFL does not run any Rust code in signal context.
    unsafe { signal::sigaction(sig, &default) }?;

    let mut mask = SigSet::empty();
    mask.add(sig);
    signal::sigprocmask(SigmaskHow::SIG_UNBLOCK, Some(&mask), None)
}

/// Terminate the calling process with the same signal a child died from, so
/// its own parent observes an identical signal death.
///
/// Returns only if the signal did not terminate the process (unknown number,
/// or a signal whose default action is not fatal).
pub fn reraise(signo: i32) {
    let Ok(sig) = Signal::try_from(signo) else {
        return;
    };
    // SIGKILL and SIGSTOP cannot be reset, but are fatal regardless.
    let _ = reset_default(sig);
    let _ = signal::raise(sig);
}
