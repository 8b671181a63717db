//! Test pattern files generation.

use std::path::{Path, PathBuf};

use log;

use crate::block::{Block, BLOCK_SIZE};
use crate::io::{sorted_path, BlockStorage, OpenMode};
use crate::sort::SortError;
use crate::writer::{OutputWriter, WriterOptions};

/// Largest number of blocks a pattern file is allowed to hold.
pub const MAX_PATTERN_BLOCKS: u64 = (BLOCK_SIZE * BLOCK_SIZE) as u64;

/// Returns a block holding `number` written in binary with ASCII `0`/`1` digits over the whole
/// block, most significant digit first. Lexicographic block order matches numeric order.
pub fn pattern_block(number: u64) -> Block {
    let mut block = Block::zeroed();
    for (position, byte) in block.as_mut_bytes().iter_mut().enumerate() {
        let bit = BLOCK_SIZE - 1 - position;
        *byte = if bit < 64 && (number >> bit) & 1 == 1 { b'1' } else { b'0' };
    }

    return block;
}

/// Returns the path of the unsorted pattern file: `<base>.unsorted`.
pub fn unsorted_path(base: &Path) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".unsorted");
    PathBuf::from(name)
}

/// Generates two pattern files of `count` blocks: `<base>.sorted` holding the blocks in
/// ascending order and `<base>.unsorted` holding them in descending order.
pub async fn generate<S: BlockStorage>(
    storage: &S,
    base: &Path,
    count: u64,
    options: WriterOptions,
) -> Result<(), SortError> {
    let sorted = sorted_path(base);
    let unsorted = unsorted_path(base);
    log::info!(
        "generating {} and {} ({} blocks)",
        sorted.display(),
        unsorted.display(),
        count
    );

    let mut sorted_writer = OutputWriter::new(storage.open(&sorted, OpenMode::Create).await?, &sorted, options);
    let mut unsorted_writer = OutputWriter::new(storage.open(&unsorted, OpenMode::Create).await?, &unsorted, options);

    for number in 0..count {
        sorted_writer.write_at(number, pattern_block(number)).await?;
        unsorted_writer.write_at(count - 1 - number, pattern_block(number)).await?;
    }

    sorted_writer.finish().await?;
    unsorted_writer.finish().await?;

    return Ok(());
}

#[cfg(test)]
mod test {
    use std::fs;

    use rstest::*;

    use super::{generate, pattern_block, unsorted_path};
    use crate::block::BLOCK_SIZE;
    use crate::io::{sorted_path, DiskStorage};
    use crate::sort::ExternalSorterBuilder;
    use crate::testing::block_on;
    use crate::writer::WriterOptions;

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    #[test]
    fn test_pattern_block() {
        let block = pattern_block(5);
        assert!(block.as_bytes()[..BLOCK_SIZE - 3].iter().all(|b| *b == b'0'));
        assert_eq!(&block.as_bytes()[BLOCK_SIZE - 3..], b"101");

        for number in [0u64, 1, 2, 255, 256, 1 << 40] {
            assert!(pattern_block(number) < pattern_block(number + 1));
        }
    }

    #[rstest]
    fn test_generate_and_sort(tmp_dir: tempfile::TempDir) {
        let base = tmp_dir.path().join("test_pattern.big");
        let options = WriterOptions {
            concurrency: 4,
            flush_interval: 8 * BLOCK_SIZE as u64,
        };

        block_on(generate(&DiskStorage, &base, 45, options)).unwrap();

        let sorted = fs::read(sorted_path(&base)).unwrap();
        let unsorted = fs::read(unsorted_path(&base)).unwrap();
        assert_eq!(sorted.len(), 45 * BLOCK_SIZE);
        assert_eq!(&unsorted[..BLOCK_SIZE], pattern_block(44).as_bytes());
        assert_eq!(&sorted[..BLOCK_SIZE], pattern_block(0).as_bytes());

        let sorter = ExternalSorterBuilder::new()
            .with_memory_limit(10 * BLOCK_SIZE as u64)
            .build()
            .unwrap();
        let report = block_on(sorter.sort(&unsorted_path(&base))).unwrap();

        assert_eq!(report.runs, 5);
        assert_eq!(fs::read(&report.output).unwrap(), sorted);
    }
}
