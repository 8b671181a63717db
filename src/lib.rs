//! `bigsort` is an external sort of fixed-size 4K blocks.
//!
//! External sorting is a class of sorting algorithms that can handle massive amounts of data. External sorting
//! is required when the data being sorted do not fit into the main memory (RAM) of a computer and instead must be
//! resided in slower external memory, usually a hard disk drive. Sorting is achieved in two passes. During the
//! first pass it sorts chunks of data that each fit in RAM, during the second pass it merges the sorted chunks
//! together. For more information see [External Sorting](https://en.wikipedia.org/wiki/External_sorting).
//!
//! # Overview
//!
//! `bigsort` treats a file as a sequence of [`BLOCK_SIZE`] bytes blocks and sorts them in lexicographic byte order:
//!
//! * **Internal sort:**
//!   the input is read block by block; every memory budget worth of blocks is sorted in parallel
//!   and persisted as a run file `<input>.1`, `<input>.2`, ...
//! * **External sort:**
//!   the runs are merged into `<input>.sorted` keeping a single cached block per run in memory.
//! * **Asynchronous I/O:**
//!   block reads and writes are asynchronous, output writes are overlapped with the merge and bounded
//!   by a configurable number of in-flight writes.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use bigsort::{ExternalSorter, ExternalSorterBuilder};
//!
//! fn main() {
//!     let sorter: ExternalSorter = ExternalSorterBuilder::new()
//!         .with_memory_limit(50 * 1024 * 1024)
//!         .build()
//!         .unwrap();
//!
//!     let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
//!     let report = runtime.block_on(sorter.sort(Path::new("input.bin"))).unwrap();
//!
//!     println!("{} blocks sorted into {}", report.blocks, report.output.display());
//! }
//! ```

pub mod block;
pub mod buffer;
pub mod io;
pub mod merger;
pub mod pattern;
pub mod run;
pub mod sort;
pub mod writer;

#[cfg(test)]
mod testing;

pub use block::{compare, Block, BLOCK_SIZE};
pub use buffer::{BlockBuffer, MemoryBudget};
pub use io::{BlockFile, BlockStorage, DiskFile, DiskStorage, OpenMode};
pub use merger::MergeCoordinator;
pub use run::RunReader;
pub use sort::{ExternalSorter, ExternalSorterBuilder, SortError, SortReport};
pub use writer::{OutputWriter, WriterOptions};
