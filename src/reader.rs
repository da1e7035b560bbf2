//! The read half of a tail cycle: size checks and chunked reads at the cursor.

use std::io::{self, SeekFrom};
use std::path::Path;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

/// Result of stat-ing the tailed path before a read.
#[derive(Debug)]
pub(crate) enum SizeCheck {
    Size(u64),
    /// Nothing exists at the path any more.
    Missing,
    Failed(io::Error),
}

/// Result of a single read at the cursor.
#[derive(Debug)]
pub(crate) enum ReadOutcome {
    Chunk(Vec<u8>),
    Eof,
    Failed(io::Error),
}

/// Owns the read buffer. One read is in flight at a time since the engine
/// awaits each call before issuing the next.
#[derive(Debug)]
pub(crate) struct ReadLoop {
    buffer: Vec<u8>,
}

impl ReadLoop {
    pub(crate) fn new(buffer_size: usize) -> Self {
        Self {
            buffer: vec![0; buffer_size.max(1)],
        }
    }

    /// Stats `path` for truncation detection.
    pub(crate) async fn check_size(path: &Path) -> SizeCheck {
        match tokio::fs::metadata(path).await {
            Ok(metadata) => SizeCheck::Size(metadata.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => SizeCheck::Missing,
            Err(e) => SizeCheck::Failed(e),
        }
    }

    /// Reads up to one buffer's worth starting at `offset`.
    pub(crate) async fn read_at(&mut self, file: &mut File, offset: u64) -> ReadOutcome {
        match self.try_read_at(file, offset).await {
            Ok(0) => ReadOutcome::Eof,
            Ok(n) => ReadOutcome::Chunk(self.buffer[..n].to_vec()),
            Err(e) => ReadOutcome::Failed(e),
        }
    }

    async fn try_read_at(&mut self, file: &mut File, offset: u64) -> io::Result<usize> {
        file.seek(SeekFrom::Start(offset)).await?;
        file.read(&mut self.buffer).await
    }
}

/// Detect if the file was truncated by comparing current size with last observed size
pub(crate) fn detect_file_truncation(current_size: u64, last_size: u64) -> bool {
    current_size < last_size
}
