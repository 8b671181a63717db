//! Fixed-size data blocks and their ordering.

use std::cmp::Ordering;
use std::fmt;

use rayon::slice::ParallelSliceMut;

/// Block size in bytes. A block is both the I/O unit and the sort unit.
pub const BLOCK_SIZE: usize = 4096;

#[repr(C, align(4096))]
struct AlignedBytes([u8; BLOCK_SIZE]);

/// Fixed-size block-aligned byte buffer.
///
/// Blocks are move-only: a block is owned by exactly one stage at a time (producer buffer,
/// run reader cache or an in-flight write) and is handed over, never shared.
pub struct Block {
    data: Box<AlignedBytes>,
}

impl Block {
    /// Creates a zero-filled block.
    pub fn zeroed() -> Self {
        Block {
            data: Box::new(AlignedBytes([0; BLOCK_SIZE])),
        }
    }

    /// Creates a block starting with `prefix` and zero-padded up to [`BLOCK_SIZE`].
    ///
    /// # Panics
    /// Panics if `prefix` is longer than [`BLOCK_SIZE`].
    pub fn from_prefix(prefix: &[u8]) -> Self {
        assert!(
            prefix.len() <= BLOCK_SIZE,
            "block prefix too long: {} > {}",
            prefix.len(),
            BLOCK_SIZE
        );

        let mut block = Block::zeroed();
        block.as_mut_bytes()[..prefix.len()].copy_from_slice(prefix);
        return block;
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data.0
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data.0
    }

    /// Returns block content up to the first zero byte.
    pub fn trimmed(&self) -> &[u8] {
        let end = self.data.0.iter().position(|b| *b == 0).unwrap_or(BLOCK_SIZE);
        &self.data.0[..end]
    }
}

impl Default for Block {
    fn default() -> Self {
        Block::zeroed()
    }
}

impl PartialEq for Block {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Block {}

impl PartialOrd for Block {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Block {
    fn cmp(&self, other: &Self) -> Ordering {
        compare(self, other)
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let head = self.trimmed();
        let head = &head[..head.len().min(32)];
        f.debug_tuple("Block").field(&String::from_utf8_lossy(head)).finish()
    }
}

/// Compares two blocks byte by byte over the whole [`BLOCK_SIZE`] bytes.
///
/// The content is not interpreted in any way: zero bytes are ordinary bytes, so a zero-padded
/// tail sorts before any non-zero content at the same offset.
pub fn compare(a: &Block, b: &Block) -> Ordering {
    a.as_bytes().cmp(b.as_bytes())
}

/// Sorts blocks in ascending order. The sort is stable.
///
/// Runs on the current rayon thread pool, see [`rayon::ThreadPool::install`].
pub fn sort_blocks(blocks: &mut [Block]) {
    blocks.par_sort_by(compare);
}
