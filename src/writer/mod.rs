//! RF and audio writer threads (C7/C8/C9): each owns one sink exclusively
//! and drains its ring on a 10 ms poll, mirroring §5's shared-resource
//! policy ("sinks: each is owned exclusively by one writer").

pub mod audio;
pub mod flac;
pub mod raw;

use std::io::{Seek, SeekFrom, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use misrc::ring::RingBuffer;

use crate::errors::{FileError, WriterError};

/// Polymorphic output sink: a file or stdout, opened once per writer. The
/// `--overwrite`/`--non-interactive` prompt contract (SPEC_FULL's
/// supplemented feature) is resolved before this is constructed.
pub enum Sink {
    File(std::fs::File),
    Stdout(std::io::Stdout),
}

impl Sink {
    pub fn open(path: &std::path::Path, overwrite: bool, non_interactive: bool) -> Result<Self, FileError> {
        if path.as_os_str() == "-" {
            return Ok(Sink::Stdout(std::io::stdout()));
        }

        if path.exists() && !overwrite {
            if non_interactive {
                return Err(FileError::Exists(path.to_path_buf()));
            }
            eprint!("{} already exists, overwrite? [y/N] ", path.display());
            std::io::stderr().flush().ok();
            let mut answer = String::new();
            std::io::stdin().read_line(&mut answer).map_err(|e| FileError::Io { path: path.to_path_buf(), source: e })?;
            if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
                return Err(FileError::UserAborted(path.to_path_buf()));
            }
        }

        let file = std::fs::File::create(path).map_err(|e| FileError::Io { path: path.to_path_buf(), source: e })?;
        Ok(Sink::File(file))
    }
}

impl Write for Sink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            Sink::File(f) => f.write(buf),
            Sink::Stdout(s) => s.write(buf),
        }
    }
    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            Sink::File(f) => f.flush(),
            Sink::Stdout(s) => s.flush(),
        }
    }
}

impl Seek for Sink {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        match self {
            Sink::File(f) => f.seek(pos),
            Sink::Stdout(_) => Err(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "stdout is not seekable; audio sinks require a regular file",
            )),
        }
    }
}

/// Blocks the caller thread, draining `ring` in `chunk_bytes`-sized pieces
/// and handing each to `on_chunk`, until `stop` is observed AND the ring
/// has been drained once more (§5: "writers drain remaining bytes with
/// one last read"). Uses `read_wrapped` rather than the raw `read_ptr`
/// pair: on the non-Linux/fallback ring backend a chunk can straddle the
/// buffer's wrap point, and only `read_wrapped` copy-handles that split
/// correctly on every backend.
pub fn drain_loop(
    ring: &RingBuffer,
    stop: &Arc<AtomicBool>,
    chunk_bytes: usize,
    mut on_chunk: impl FnMut(&[u8]) -> Result<(), WriterError>,
) -> Result<(), WriterError> {
    let mut buf = vec![0u8; chunk_bytes];
    loop {
        if ring.read_wrapped(&mut buf) {
            on_chunk(&buf)?;
            continue;
        }
        if stop.load(Ordering::Acquire) {
            let remaining = ring.len();
            if remaining == 0 {
                return Ok(());
            }
            let mut tail = vec![0u8; remaining];
            if ring.read_wrapped(&mut tail) {
                on_chunk(&tail)?;
            }
            return Ok(());
        }
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
}
