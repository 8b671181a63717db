//! Test helpers.

use std::fs;
use std::future::Future;
use std::path::Path;

use async_trait::async_trait;

use crate::block::{Block, BLOCK_SIZE};
use crate::io::{BlockFile, BlockStorage, OpenMode};
use crate::sort::SortError;

pub const TEST_PATTERN_UNSORTED: [&str; 11] = [
    "External sorting is a class of sorting algorithms",
    "25",
    "123456789",
    "12345678",
    "Is required when the data being sorted do not fit into the main memory of a computing device",
    "External sorting is a class of sorting algorithms that can handle massive amounts of data.",
    "not fit into the main memory",
    " (usually RAM) and instead they must reside in the slower external memory",
    "slower external memory, usually a hard disk drive",
    "Thus, external sorting algorithms are external mem algorithms",
    "algorithms and thus applicable in the external mem",
];

pub const TEST_PATTERN_SORTED: [&str; 11] = [
    " (usually RAM) and instead they must reside in the slower external memory",
    "12345678",
    "123456789",
    "25",
    "External sorting is a class of sorting algorithms",
    "External sorting is a class of sorting algorithms that can handle massive amounts of data.",
    "Is required when the data being sorted do not fit into the main memory of a computing device",
    "Thus, external sorting algorithms are external mem algorithms",
    "algorithms and thus applicable in the external mem",
    "not fit into the main memory",
    "slower external memory, usually a hard disk drive",
];

/// Three sorted sets of 4, 4 and 3 blocks.
pub const TEST_PATTERN_SORTED_SET: [&str; 11] = [
    "12345678",
    "123456789",
    "25",
    "External sorting is a class of sorting algorithms",
    " (usually RAM) and instead they must reside in the slower external memory",
    "External sorting is a class of sorting algorithms that can handle massive amounts of data.",
    "Is required when the data being sorted do not fit into the main memory of a computing device",
    "not fit into the main memory",
    "Thus, external sorting algorithms are external mem algorithms",
    "algorithms and thus applicable in the external mem",
    "slower external memory, usually a hard disk drive",
];

/// Runs a future to completion on a current thread runtime.
pub fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

/// Writes one zero-padded block per string.
pub fn write_pattern(path: &Path, pattern: &[&str]) {
    let mut content = Vec::with_capacity(pattern.len() * BLOCK_SIZE);
    for item in pattern {
        content.extend_from_slice(Block::from_prefix(item.as_bytes()).as_bytes());
    }
    fs::write(path, content).unwrap();
}

/// Reads a file of zero-padded string blocks.
pub fn read_pattern(path: &Path) -> Vec<String> {
    let content = fs::read(path).unwrap();
    assert_eq!(content.len() % BLOCK_SIZE, 0, "{} is not block aligned", path.display());

    content
        .chunks(BLOCK_SIZE)
        .map(|chunk| {
            let end = chunk.iter().position(|b| *b == 0).unwrap_or(chunk.len());
            String::from_utf8(chunk[..end].to_vec()).unwrap()
        })
        .collect()
}

/// Storage whose files claim `blocks` whole blocks but return only `read` bytes per block read.
/// Writes are accepted and discarded.
#[derive(Debug, Clone, Copy)]
pub struct ShortReadStorage {
    pub blocks: u64,
    pub read: usize,
}

#[async_trait]
impl BlockStorage for ShortReadStorage {
    type File = ShortReadFile;

    async fn open(&self, _path: &Path, _mode: OpenMode) -> Result<ShortReadFile, SortError> {
        Ok(ShortReadFile {
            blocks: self.blocks,
            read: self.read,
        })
    }

    async fn remove(&self, _path: &Path) -> Result<(), SortError> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ShortReadFile {
    blocks: u64,
    read: usize,
}

#[async_trait]
impl BlockFile for ShortReadFile {
    async fn size(&self) -> Result<u64, SortError> {
        Ok(self.blocks * BLOCK_SIZE as u64)
    }

    async fn read_block(&self, _block_index: u64) -> Result<(Block, usize), SortError> {
        Ok((Block::from_prefix(&vec![b'r'; self.read]), self.read))
    }

    async fn write_block(&self, _block_index: u64, _block: Block) -> Result<usize, SortError> {
        Ok(BLOCK_SIZE)
    }

    async fn flush(&self) -> Result<(), SortError> {
        Ok(())
    }

    async fn close(self) -> Result<(), SortError> {
        Ok(())
    }
}
