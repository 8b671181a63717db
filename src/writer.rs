//! Bounded concurrency block writer.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::block::{Block, BLOCK_SIZE};
use crate::io::BlockFile;
use crate::sort::SortError;

/// Default number of writes allowed to be in flight at once.
pub const DEFAULT_WRITE_CONCURRENCY: usize = 10;

/// Default number of bytes written between two flushes (16 MiB).
pub const DEFAULT_FLUSH_INTERVAL: u64 = (BLOCK_SIZE * BLOCK_SIZE) as u64;

/// Output writer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    /// Maximum number of in-flight writes.
    pub concurrency: usize,
    /// Number of bytes written between two flushes.
    pub flush_interval: u64,
}

impl Default for WriterOptions {
    fn default() -> Self {
        WriterOptions {
            concurrency: DEFAULT_WRITE_CONCURRENCY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

/// Output writer.
///
/// Each block write is issued as a separate task once a permit is acquired, and the permit is
/// released when the write completes, so at most [`WriterOptions::concurrency`] writes are in
/// flight at once. Writes complete in any order; every block targets its own offset.
/// Every [`WriterOptions::flush_interval`] bytes the writer waits for the in-flight writes
/// and flushes the file.
pub struct OutputWriter<F: BlockFile> {
    file: F,
    path: PathBuf,
    permits: Arc<Semaphore>,
    concurrency: usize,
    in_flight: JoinSet<Result<usize, SortError>>,
    flush_interval_blocks: u64,
    next_block: u64,
    submitted: u64,
    bytes_written: u64,
    flushes: u64,
}

impl<F: BlockFile> OutputWriter<F> {
    /// Creates a writer over an already opened file.
    pub fn new(file: F, path: &Path, options: WriterOptions) -> Self {
        let concurrency = options.concurrency.max(1);
        let flush_interval_blocks = (options.flush_interval / BLOCK_SIZE as u64).max(1);

        OutputWriter {
            file,
            path: path.to_path_buf(),
            permits: Arc::new(Semaphore::new(concurrency)),
            concurrency,
            in_flight: JoinSet::new(),
            flush_interval_blocks,
            next_block: 0,
            submitted: 0,
            bytes_written: 0,
            flushes: 0,
        }
    }

    /// Appends a block after the last appended one.
    pub async fn append(&mut self, block: Block) -> Result<(), SortError> {
        let block_index = self.next_block;
        self.next_block += 1;
        self.write_at(block_index, block).await
    }

    /// Writes a block at `block_index`.
    ///
    /// Callers mixing this with [`OutputWriter::append`] must keep block indices distinct.
    pub async fn write_at(&mut self, block_index: u64, block: Block) -> Result<(), SortError> {
        self.reap_completed()?;

        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .expect("writer semaphore is never closed");

        let file = self.file.clone();
        let path = self.path.clone();
        self.in_flight.spawn(async move {
            let result = file.write_block(block_index, block).await;
            drop(permit);

            match result {
                Ok(written) if written < BLOCK_SIZE => Err(SortError::ShortWrite {
                    path,
                    block_index,
                    written,
                }),
                result => result,
            }
        });

        self.submitted += 1;
        if self.submitted % self.flush_interval_blocks == 0 {
            self.flush().await?;
            log::info!(
                "{} Mbytes has been written -- write n.{}",
                self.bytes_written / 1024 / 1024,
                self.submitted
            );
        }

        return Ok(());
    }

    /// Waits for the in-flight writes and flushes the file.
    pub async fn flush(&mut self) -> Result<(), SortError> {
        while let Some(result) = self.in_flight.join_next().await {
            let written = result.map_err(SortError::Task)??;
            self.bytes_written += written as u64;
        }

        self.file.flush().await?;
        self.flushes += 1;

        return Ok(());
    }

    /// Flushes and closes the file. Returns the number of bytes written.
    pub async fn finish(mut self) -> Result<u64, SortError> {
        self.flush().await?;
        log::debug!("flush and close {}", self.path.display());
        self.file.close().await?;

        return Ok(self.bytes_written);
    }

    /// Number of writes currently in flight.
    pub fn in_flight(&self) -> usize {
        self.concurrency - self.permits.available_permits()
    }

    /// Number of bytes written by completed writes.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Number of flushes performed so far.
    pub fn flushes(&self) -> u64 {
        self.flushes
    }

    fn reap_completed(&mut self) -> Result<(), SortError> {
        while let Some(result) = self.in_flight.try_join_next() {
            let written = result.map_err(SortError::Task)??;
            self.bytes_written += written as u64;
        }

        return Ok(());
    }
}
