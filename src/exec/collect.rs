/// Parent-side collection of captured streams and the private message
///
/// Streams are multiplexed with poll(2). A slot is retired only when `read`
/// returns end-of-file, so bytes written just before the writer closed are
/// drained even when readable and hang-up are reported together.
use crate::config::types::{Result, RunnerError, Stream, TestOutput};
use crate::kernel::poll::ReadinessSet;
use nix::errno::Errno;
use nix::unistd::read;
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

/// Outcome of one read attempt on a ready descriptor
enum Chunk {
    Data(usize),
    Eof,
    Retry,
}

fn read_chunk(fd: RawFd, buf: &mut [u8]) -> Result<Chunk> {
    match read(fd, buf) {
        Ok(0) => Ok(Chunk::Eof),
        Ok(n) => Ok(Chunk::Data(n)),
        Err(Errno::EINTR) | Err(Errno::EAGAIN) => Ok(Chunk::Retry),
        Err(e) => Err(RunnerError::sys("read", e)),
    }
}

/// Pipe reader with a fixed buffer size
pub struct OutputCollector {
    chunk_size: usize,
}

impl OutputCollector {
    pub fn new(chunk_size: usize) -> Self {
        OutputCollector {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Read `stdout` and `stderr` until both reach end-of-file,
    /// appending to `output`.
    ///
    /// Bytes received before a failure are still appended.
    pub fn collect_streams(
        &self,
        stdout: BorrowedFd<'_>,
        stderr: BorrowedFd<'_>,
        output: &mut TestOutput,
    ) -> Result<()> {
        let streams = [Stream::Stdout, Stream::Stderr];
        let mut pending: [Vec<u8>; 2] = [Vec::new(), Vec::new()];

        let outcome = self.drain(&[stdout, stderr], &mut pending);

        for (stream, bytes) in streams.iter().zip(pending.iter()) {
            if !bytes.is_empty() {
                output
                    .stream_mut(*stream)
                    .push_str(&String::from_utf8_lossy(bytes));
            }
        }
        outcome
    }

    fn drain(&self, fds: &[BorrowedFd<'_>], pending: &mut [Vec<u8>]) -> Result<()> {
        let mut set = ReadinessSet::new(fds);
        let mut buf = vec![0u8; self.chunk_size];

        while set.open_count() > 0 {
            set.wait()?;
            for slot in 0..set.len() {
                let Some(fd) = set.fd(slot) else { continue };
                let ready = set.readiness(slot);
                if !ready.readable && !ready.hangup {
                    continue;
                }
                match read_chunk(fd, &mut buf)? {
                    Chunk::Data(n) => pending[slot].extend_from_slice(&buf[..n]),
                    Chunk::Eof => set.retire(slot),
                    Chunk::Retry => {}
                }
            }
        }
        Ok(())
    }

    /// Read the private message pipe to end-of-file
    pub fn read_message(&self, fd: BorrowedFd<'_>) -> Result<String> {
        let fd = fd.as_raw_fd();
        let mut message = Vec::new();
        let mut buf = vec![0u8; self.chunk_size];
        loop {
            match read_chunk(fd, &mut buf)? {
                Chunk::Data(n) => message.extend_from_slice(&buf[..n]),
                Chunk::Eof => break,
                Chunk::Retry => {}
            }
        }
        Ok(String::from_utf8_lossy(&message).into_owned())
    }
}
