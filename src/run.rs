//! Sorted runs stored on disk.

use std::path::{Path, PathBuf};

use log;

use crate::block::Block;
use crate::io::{block_count, read_full_block, BlockFile, BlockStorage, OpenMode};
use crate::sort::SortError;
use crate::writer::{OutputWriter, WriterOptions};

/// Persists sorted blocks as a run file. The file is flushed before returning.
/// Returns the number of blocks written.
pub async fn write_run<S, I>(storage: &S, path: &Path, blocks: I, options: WriterOptions) -> Result<u64, SortError>
where
    S: BlockStorage,
    I: IntoIterator<Item = Block>,
{
    let file = storage.open(path, OpenMode::Create).await?;
    let mut writer = OutputWriter::new(file, path, options);

    let mut count = 0;
    for block in blocks {
        writer.append(block).await?;
        count += 1;
    }
    writer.finish().await?;

    return Ok(count);
}

/// Run reader. A cursor over a run file with a one block read-ahead cache.
pub struct RunReader<F: BlockFile> {
    file: F,
    path: PathBuf,
    run_index: usize,
    file_size: u64,
    next_block: u64,
    total_blocks: u64,
    cached_block: Option<Block>,
}

impl<F: BlockFile> RunReader<F> {
    /// Opens the run file `path` identified by `run_index`.
    pub async fn open<S>(storage: &S, path: &Path, run_index: usize) -> Result<Self, SortError>
    where
        S: BlockStorage<File = F>,
    {
        let file = storage.open(path, OpenMode::Read).await?;
        let file_size = file.size().await?;
        let total_blocks = block_count(file_size);

        log::debug!(
            "run {} opened: {} ({} blocks)",
            run_index,
            path.display(),
            total_blocks
        );

        return Ok(RunReader {
            file,
            path: path.to_path_buf(),
            run_index,
            file_size,
            next_block: 0,
            total_blocks,
            cached_block: None,
        });
    }

    pub fn run_index(&self) -> usize {
        self.run_index
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Position of the next block to be consumed.
    pub fn position(&self) -> u64 {
        self.next_block
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    /// Checks if every block of the run has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.next_block == self.total_blocks
    }

    /// Reads the block at the current position into the cache unless a block is already cached
    /// or the run is exhausted.
    pub async fn ensure_cached(&mut self) -> Result<(), SortError> {
        if self.cached_block.is_some() || self.is_exhausted() {
            return Ok(());
        }

        let block = read_full_block(&self.file, &self.path, self.next_block, self.file_size).await?;
        self.cached_block = Some(block);

        return Ok(());
    }

    /// Returns the cached block.
    pub fn cached_block(&self) -> Option<&Block> {
        self.cached_block.as_ref()
    }

    /// Hands the cached block over to the caller.
    pub fn take_cached(&mut self) -> Option<Block> {
        self.cached_block.take()
    }

    /// Moves past the current block and drops the cache.
    /// Must be called only once the current block has been consumed.
    pub fn advance_and_release(&mut self) {
        debug_assert!(!self.is_exhausted(), "advancing an exhausted run");
        self.next_block += 1;
        self.cached_block = None;
    }

    /// Closes the run file.
    pub async fn close(self) -> Result<(), SortError> {
        self.file.close().await
    }
}
