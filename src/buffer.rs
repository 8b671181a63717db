//! Memory limited block buffer.

use log;
use rayon;
use sysinfo;

use crate::block::{Block, BLOCK_SIZE};

/// Memory available for the internal sort, in bytes.
///
/// Always a non-zero multiple of [`BLOCK_SIZE`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryBudget {
    bytes: u64,
}

impl MemoryBudget {
    /// Creates a budget of `bytes` rounded down to a multiple of [`BLOCK_SIZE`].
    /// A budget is never smaller than one block.
    pub fn new(bytes: u64) -> Self {
        let block_size = BLOCK_SIZE as u64;
        MemoryBudget {
            bytes: (bytes / block_size).max(1) * block_size,
        }
    }

    /// Creates a budget bounded by the memory currently available on the system
    /// and by an optional user defined limit.
    pub fn detect(limit: Option<u64>) -> Self {
        let available = available_memory();
        let bytes = match (available, limit) {
            (0, Some(limit)) => limit,
            (0, None) => u64::MAX,
            (available, Some(limit)) => available.min(limit),
            (available, None) => available,
        };

        let budget = MemoryBudget::new(bytes);
        log::info!(
            "memory budget: {} MiB (available: {} MiB)",
            budget.bytes / 1024 / 1024,
            available / 1024 / 1024
        );

        return budget;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Returns the number of blocks fitting the budget.
    pub fn blocks(&self) -> u64 {
        self.bytes / BLOCK_SIZE as u64
    }
}

fn available_memory() -> u64 {
    let mut system = sysinfo::System::new();
    system.refresh_memory();
    system.available_memory()
}

/// Buffer of blocks limited by consumed memory.
pub struct BlockBuffer {
    limit: u64,
    current_size: u64,
    inner: Vec<Block>,
}

impl BlockBuffer {
    pub fn new(budget: MemoryBudget) -> Self {
        BlockBuffer {
            limit: budget.bytes(),
            current_size: 0,
            inner: Vec::new(),
        }
    }

    /// Adds a new block to the buffer.
    pub fn push(&mut self, block: Block) {
        debug_assert!(!self.is_full(), "block pushed to a full buffer");
        self.current_size += BLOCK_SIZE as u64;
        self.inner.push(block);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Checks if the buffer reached the memory limit.
    pub fn is_full(&self) -> bool {
        self.current_size >= self.limit
    }

    /// Memory consumed by buffered blocks.
    pub fn mem_size(&self) -> u64 {
        self.current_size
    }
}

impl IntoIterator for BlockBuffer {
    type Item = Block;
    type IntoIter = <Vec<Block> as IntoIterator>::IntoIter;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

impl rayon::slice::ParallelSliceMut<Block> for BlockBuffer {
    fn as_parallel_slice_mut(&mut self) -> &mut [Block] {
        self.inner.as_mut_slice()
    }
}
