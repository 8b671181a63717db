//! K-way merge of sorted runs.

use std::cmp::Ordering;
use std::path::Path;

use log;

use crate::block::compare;
use crate::io::{run_path, BlockFile, BlockStorage};
use crate::run::RunReader;
use crate::sort::SortError;
use crate::writer::OutputWriter;

/// Merge step state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MergeState {
    /// Filling the reader caches and looking for the minimal cached block.
    Scanning,
    /// The reader at the position holds the minimal block.
    Selected(usize),
    /// The minimal block is being handed over to the output.
    Writing(usize),
    /// The reader at the position moves to its next block.
    Advancing(usize),
    /// Every run is exhausted.
    Done,
}

/// Merge coordinator.
/// Merges multiple sorted runs into a single sorted output one block at a time.
///
/// Every step fills the cache of every non-exhausted run, scans the cached blocks in run order
/// selecting the minimal one, writes it to the output and advances its run. On equal blocks
/// the run with the lowest index wins. A linear scan is used instead of a heap: the number of
/// runs is small and the merge is dominated by I/O.
pub struct MergeCoordinator<F: BlockFile> {
    readers: Vec<RunReader<F>>,
    current_minimum: Option<usize>,
}

impl<F: BlockFile> MergeCoordinator<F> {
    /// Creates a merge coordinator over run readers ordered by run index.
    pub fn new(readers: Vec<RunReader<F>>) -> Self {
        MergeCoordinator {
            readers,
            current_minimum: None,
        }
    }

    /// Opens runs `<base>.1` to `<base>.<run_count>`.
    pub async fn open<S>(storage: &S, base: &Path, run_count: usize) -> Result<Self, SortError>
    where
        S: BlockStorage<File = F>,
    {
        let mut readers = Vec::with_capacity(run_count);
        for run_index in 1..=run_count {
            readers.push(RunReader::open(storage, &run_path(base, run_index), run_index).await?);
        }

        return Ok(MergeCoordinator::new(readers));
    }

    /// Checks if every run is exhausted.
    pub fn is_done(&self) -> bool {
        self.readers.iter().all(|reader| reader.is_exhausted())
    }

    /// Total number of blocks in all runs.
    pub fn total_blocks(&self) -> u64 {
        self.readers.iter().map(|reader| reader.total_blocks()).sum()
    }

    /// Merges the runs writing blocks to `output`. Returns the number of merged blocks.
    pub async fn merge_into(&mut self, output: &mut OutputWriter<F>) -> Result<u64, SortError> {
        let mut merged = 0;
        let mut state = MergeState::Scanning;

        loop {
            state = match state {
                MergeState::Scanning => {
                    self.fill_caches().await?;
                    match self.select_minimum() {
                        Some(position) => MergeState::Selected(position),
                        None => MergeState::Done,
                    }
                }
                MergeState::Selected(position) => {
                    log::trace!(
                        "block {} selected from run {}",
                        merged,
                        self.readers[position].run_index()
                    );
                    MergeState::Writing(position)
                }
                MergeState::Writing(position) => {
                    match self.readers[position].take_cached() {
                        Some(block) => output.append(block).await?,
                        None => unreachable!("selected run has no cached block"),
                    }
                    merged += 1;
                    MergeState::Advancing(position)
                }
                MergeState::Advancing(position) => {
                    self.readers[position].advance_and_release();
                    self.current_minimum = None;
                    MergeState::Scanning
                }
                MergeState::Done => break,
            };
        }

        debug_assert!(self.is_done());
        log::debug!("{} runs merged ({} blocks)", self.readers.len(), merged);

        return Ok(merged);
    }

    /// Closes all run files.
    pub async fn close(self) -> Result<(), SortError> {
        for reader in self.readers {
            reader.close().await?;
        }

        return Ok(());
    }

    async fn fill_caches(&mut self) -> Result<(), SortError> {
        for reader in self.readers.iter_mut() {
            reader.ensure_cached().await?;
        }

        return Ok(());
    }

    /// Selects the reader holding the minimal cached block among non-exhausted readers.
    /// Expects every non-exhausted reader to have a cached block.
    ///
    /// The minimum is replaced only by a strictly smaller block, not by an equal one, so
    /// the first run in scan order holding the minimal block is selected. Equal blocks are
    /// byte-identical, so the output content is the same either way.
    fn select_minimum(&mut self) -> Option<usize> {
        self.current_minimum = None;

        for (position, reader) in self.readers.iter().enumerate() {
            if reader.is_exhausted() {
                continue;
            }
            let candidate = match reader.cached_block() {
                Some(block) => block,
                None => continue,
            };

            let replace = match self.current_minimum.and_then(|m| self.readers[m].cached_block()) {
                Some(minimum) => compare(candidate, minimum) == Ordering::Less,
                None => true,
            };
            if replace {
                self.current_minimum = Some(position);
            }
        }

        return self.current_minimum;
    }
}
