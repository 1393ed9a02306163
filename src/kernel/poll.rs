/// Readiness multiplexing over a fixed set of read descriptors
use crate::config::types::{Result, RunnerError};
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags};
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

/// Readiness of one slot after a wait
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Readiness {
    /// Data (or end-of-file) can be read without blocking
    pub readable: bool,
    /// The writer side has gone away, or the descriptor is in error
    pub hangup: bool,
}

/// A poll(2) set whose slots can be retired independently
#[derive(Debug)]
pub struct ReadinessSet<'fd> {
    slots: Vec<Option<BorrowedFd<'fd>>>,
    revents: Vec<PollFlags>,
}

impl<'fd> ReadinessSet<'fd> {
    pub fn new(fds: &[BorrowedFd<'fd>]) -> Self {
        Self {
            slots: fds.iter().copied().map(Some).collect(),
            revents: vec![PollFlags::empty(); fds.len()],
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of slots not yet retired
    pub fn open_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Descriptor of a live slot, `None` once retired
    pub fn fd(&self, slot: usize) -> Option<RawFd> {
        self.slots[slot].as_ref().map(|fd| fd.as_raw_fd())
    }

    /// Block with no timeout until at least one live slot is ready.
    /// Interrupted waits are restarted.
    pub fn wait(&mut self) -> Result<usize> {
        let live: Vec<usize> = (0..self.slots.len())
            .filter(|&i| self.slots[i].is_some())
            .collect();

        loop {
            let mut pollfds: Vec<PollFd<'_>> = live
                .iter()
                .filter_map(|&i| self.slots[i].as_ref())
                .map(|fd| PollFd::new(fd, PollFlags::POLLIN))
                .collect();

            match poll(&mut pollfds, -1) {
                Ok(ready) => {
                    self.revents.fill(PollFlags::empty());
                    for (&slot, pfd) in live.iter().zip(pollfds) {
                        self.revents[slot] = pfd.revents().unwrap_or(PollFlags::POLLERR);
                    }
                    return Ok(ready as usize);
                }
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(RunnerError::sys("poll", e)),
            }
        }
    }

    pub fn readiness(&self, slot: usize) -> Readiness {
        if self.slots[slot].is_none() {
            return Readiness::default();
        }
        let revents = self.revents[slot];
        Readiness {
            readable: revents.contains(PollFlags::POLLIN),
            hangup: revents
                .intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL),
        }
    }

    /// Remove a slot from the wait set without affecting the others
    pub fn retire(&mut self, slot: usize) {
        self.slots[slot] = None;
        self.revents[slot] = PollFlags::empty();
    }
}
