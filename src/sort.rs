//! External sorter.

use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log;
use rayon::slice::ParallelSliceMut;

use crate::block::sort_blocks;
use crate::buffer::{BlockBuffer, MemoryBudget};
use crate::io::{run_path, sorted_path, BlockReader, BlockStorage, DiskStorage, OpenMode};
use crate::merger::MergeCoordinator;
use crate::run::write_run;
use crate::writer::{OutputWriter, WriterOptions};

/// Sorting error.
#[derive(Debug)]
pub enum SortError {
    /// File opening error.
    Open(PathBuf, io::Error),
    /// File size query error.
    SizeQuery(PathBuf, io::Error),
    /// Block read error.
    Read(PathBuf, io::Error),
    /// Fewer bytes than expected were read from a block.
    ShortRead {
        path: PathBuf,
        block_index: u64,
        read: usize,
    },
    /// Block write or flush error.
    Write(PathBuf, io::Error),
    /// Fewer bytes than a block were written.
    ShortWrite {
        path: PathBuf,
        block_index: u64,
        written: usize,
    },
    /// File removal error.
    Remove(PathBuf, io::Error),
    /// Workers thread pool initialization error.
    ThreadPoolBuildError(rayon::ThreadPoolBuildError),
    /// Background I/O task failure.
    Task(tokio::task::JoinError),
}

impl Error for SortError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self {
            SortError::Open(_, err) => Some(err),
            SortError::SizeQuery(_, err) => Some(err),
            SortError::Read(_, err) => Some(err),
            SortError::Write(_, err) => Some(err),
            SortError::Remove(_, err) => Some(err),
            SortError::ThreadPoolBuildError(err) => Some(err),
            SortError::Task(err) => Some(err),
            SortError::ShortRead { .. } | SortError::ShortWrite { .. } => None,
        }
    }
}

impl Display for SortError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self {
            SortError::Open(path, err) => write!(f, "{} opening failed: {}", path.display(), err),
            SortError::SizeQuery(path, err) => write!(f, "{} size query failed: {}", path.display(), err),
            SortError::Read(path, err) => write!(f, "{} read failed: {}", path.display(), err),
            SortError::ShortRead {
                path,
                block_index,
                read,
            } => write!(
                f,
                "{} short read of block {}: {} bytes read",
                path.display(),
                block_index,
                read
            ),
            SortError::Write(path, err) => write!(f, "{} write failed: {}", path.display(), err),
            SortError::ShortWrite {
                path,
                block_index,
                written,
            } => write!(
                f,
                "{} short write of block {}: {} bytes written",
                path.display(),
                block_index,
                written
            ),
            SortError::Remove(path, err) => write!(f, "{} removal failed: {}", path.display(), err),
            SortError::ThreadPoolBuildError(err) => write!(f, "thread pool initialization failed: {}", err),
            SortError::Task(err) => write!(f, "I/O task failed: {}", err),
        }
    }
}

/// Sorting summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortReport {
    /// Number of runs produced by the internal sort.
    pub runs: usize,
    /// Number of sorted blocks.
    pub blocks: u64,
    /// Internal sort (run production) duration.
    pub internal_sort: Duration,
    /// External sort (runs merge) duration.
    pub external_merge: Duration,
    /// Sorted file path.
    pub output: PathBuf,
}

/// External sorter builder. Provides methods for [`ExternalSorter`] initialization.
#[derive(Clone)]
pub struct ExternalSorterBuilder<S: BlockStorage = DiskStorage> {
    /// Number of threads to be used to sort data in parallel.
    threads_number: Option<usize>,
    /// Memory limit for the internal sort.
    memory_limit: Option<u64>,
    /// Run and output files write options.
    writer_options: WriterOptions,
    /// Keep run files after the merge.
    keep_runs: bool,
    /// Block storage.
    storage: S,
}

impl ExternalSorterBuilder<DiskStorage> {
    /// Creates an instance of a builder with default parameters.
    pub fn new() -> Self {
        ExternalSorterBuilder::default()
    }
}

impl<S: BlockStorage> ExternalSorterBuilder<S> {
    /// Builds an [`ExternalSorter`] instance using provided configuration.
    pub fn build(self) -> Result<ExternalSorter<S>, SortError> {
        ExternalSorter::new(
            self.storage,
            self.threads_number,
            MemoryBudget::detect(self.memory_limit),
            self.writer_options,
            self.keep_runs,
        )
    }

    /// Sets number of threads to be used to sort data in parallel.
    pub fn with_threads_number(mut self, threads_number: usize) -> ExternalSorterBuilder<S> {
        self.threads_number = Some(threads_number);
        return self;
    }

    /// Sets the memory limit for the internal sort. The effective budget is the lower of
    /// the limit and the memory available on the system.
    pub fn with_memory_limit(mut self, bytes: u64) -> ExternalSorterBuilder<S> {
        self.memory_limit = Some(bytes);
        return self;
    }

    /// Sets the maximum number of in-flight block writes.
    pub fn with_write_concurrency(mut self, concurrency: usize) -> ExternalSorterBuilder<S> {
        self.writer_options.concurrency = concurrency;
        return self;
    }

    /// Sets the number of bytes written between two flushes.
    pub fn with_flush_interval(mut self, bytes: u64) -> ExternalSorterBuilder<S> {
        self.writer_options.flush_interval = bytes;
        return self;
    }

    /// Sets whether run files are kept after the merge.
    pub fn with_keep_runs(mut self, keep_runs: bool) -> ExternalSorterBuilder<S> {
        self.keep_runs = keep_runs;
        return self;
    }

    /// Sets block storage.
    pub fn with_storage<T: BlockStorage>(self, storage: T) -> ExternalSorterBuilder<T> {
        ExternalSorterBuilder {
            threads_number: self.threads_number,
            memory_limit: self.memory_limit,
            writer_options: self.writer_options,
            keep_runs: self.keep_runs,
            storage,
        }
    }
}

impl<S: BlockStorage + Default> Default for ExternalSorterBuilder<S> {
    fn default() -> Self {
        ExternalSorterBuilder {
            threads_number: None,
            memory_limit: None,
            writer_options: WriterOptions::default(),
            keep_runs: true,
            storage: S::default(),
        }
    }
}

/// External sorter.
///
/// Sorting is performed in two phases. The internal sort reads the input block by block,
/// sorts every memory budget worth of blocks and stores them as run files `<input>.1`,
/// `<input>.2`, ... The external sort merges the runs into `<input>.sorted`.
pub struct ExternalSorter<S: BlockStorage = DiskStorage> {
    /// Block storage.
    storage: S,
    /// Sorting thread pool.
    thread_pool: rayon::ThreadPool,
    /// Memory available for the internal sort.
    budget: MemoryBudget,
    /// Run and output files write options.
    writer_options: WriterOptions,
    /// Keep run files after the merge.
    keep_runs: bool,
}

impl<S: BlockStorage> ExternalSorter<S> {
    /// Creates a new external sorter instance.
    ///
    /// # Arguments
    /// * `storage` - Block storage files are accessed through.
    /// * `threads_number` - Number of threads to be used to sort data in parallel. If the parameter is [`None`]
    ///   threads number will be selected based on available CPU core number.
    /// * `budget` - Memory available for the internal sort.
    /// * `writer_options` - Run and output files write options.
    /// * `keep_runs` - Keep run files after the merge.
    pub fn new(
        storage: S,
        threads_number: Option<usize>,
        budget: MemoryBudget,
        writer_options: WriterOptions,
        keep_runs: bool,
    ) -> Result<Self, SortError> {
        return Ok(ExternalSorter {
            storage,
            thread_pool: Self::init_thread_pool(threads_number)?,
            budget,
            writer_options,
            keep_runs,
        });
    }

    fn init_thread_pool(threads_number: Option<usize>) -> Result<rayon::ThreadPool, SortError> {
        let mut thread_pool_builder = rayon::ThreadPoolBuilder::new();

        if let Some(threads_number) = threads_number {
            log::info!("initializing thread-pool (threads: {})", threads_number);
            thread_pool_builder = thread_pool_builder.num_threads(threads_number);
        } else {
            log::info!("initializing thread-pool (threads: default)");
        }
        let thread_pool = thread_pool_builder
            .build()
            .map_err(|err| SortError::ThreadPoolBuildError(err))?;

        return Ok(thread_pool);
    }

    pub fn budget(&self) -> MemoryBudget {
        self.budget
    }

    /// Sorts the blocks of `input` into `<input>.sorted`.
    pub async fn sort(&self, input: &Path) -> Result<SortReport, SortError> {
        log::info!(
            "lexicographic sort of {} bytes blocks: {} (memory budget: {} blocks)",
            crate::BLOCK_SIZE,
            input.display(),
            self.budget.blocks()
        );

        let start_time = Instant::now();
        let runs = self.produce_runs(input).await?;
        let internal_sort = start_time.elapsed();
        log::info!("internal sort done in {}ms", internal_sort.as_millis());

        let start_time = Instant::now();
        let blocks = self.merge_runs(input, runs.len()).await?;
        let external_merge = start_time.elapsed();
        log::info!("external sort done in {}ms", external_merge.as_millis());

        if !self.keep_runs {
            for run in runs.iter() {
                self.storage.remove(run).await?;
            }
            log::debug!("{} run files removed", runs.len());
        }

        return Ok(SortReport {
            runs: runs.len(),
            blocks,
            internal_sort,
            external_merge,
            output: sorted_path(input),
        });
    }

    /// Splits `input` into sorted runs fitting the memory budget.
    /// Returns run file paths in run index order.
    pub async fn produce_runs(&self, input: &Path) -> Result<Vec<PathBuf>, SortError> {
        let mut reader = BlockReader::open(&self.storage, input).await?;
        log::info!("{}: {} blocks", input.display(), reader.total_blocks());

        let mut buffer = BlockBuffer::new(self.budget);
        let mut runs = Vec::new();

        while let Some((block, position, total_blocks)) = reader.next().await? {
            buffer.push(block);

            if buffer.is_full() || position + 1 == total_blocks {
                let path = run_path(input, runs.len() + 1);
                self.create_run(&path, buffer).await?;
                runs.push(path);
                buffer = BlockBuffer::new(self.budget);
            }
        }
        reader.close().await?;

        log::debug!("external sort preparation done ({} runs)", runs.len());

        return Ok(runs);
    }

    /// Merges runs `<base>.1` to `<base>.<run_count>` into `<base>.sorted`.
    /// Returns the number of merged blocks.
    pub async fn merge_runs(&self, base: &Path, run_count: usize) -> Result<u64, SortError> {
        let output_path = sorted_path(base);
        let output = self.storage.open(&output_path, OpenMode::Create).await?;
        let mut writer = OutputWriter::new(output, &output_path, self.writer_options);

        let mut coordinator = MergeCoordinator::open(&self.storage, base, run_count).await?;
        log::info!(
            "merging {} runs ({} blocks) into {}",
            run_count,
            coordinator.total_blocks(),
            output_path.display()
        );

        let merged = coordinator.merge_into(&mut writer).await?;
        coordinator.close().await?;
        writer.finish().await?;

        return Ok(merged);
    }

    async fn create_run(&self, path: &Path, mut buffer: BlockBuffer) -> Result<(), SortError> {
        log::debug!("sorting run data ...");
        self.thread_pool.install(|| {
            sort_blocks(buffer.as_parallel_slice_mut());
        });

        let count = buffer.len();
        write_run(&self.storage, path, buffer, self.writer_options).await?;
        log::info!("write {} blocks on disk -- file {}", count, path.display());

        return Ok(());
    }
}
