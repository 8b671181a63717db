//! Asynchronous block I/O.
//!
//! The sorting engine never touches files directly: it opens files through a [`BlockStorage`]
//! and performs positional block reads and writes through the resulting [`BlockFile`] handles.
//! [`DiskStorage`] is the file system implementation: each operation is executed on the tokio
//! blocking pool, so the engine task is suspended while the operation is in progress.

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log;

use crate::block::{Block, BLOCK_SIZE};
use crate::sort::SortError;

/// File opening mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Opens an existing file for reading.
    Read,
    /// Creates a file for reading and writing, truncating it if it exists.
    Create,
}

/// Block storage interface. Opens and removes block files.
#[async_trait]
pub trait BlockStorage: Send + Sync {
    type File: BlockFile;

    /// Opens a file in the provided mode.
    async fn open(&self, path: &Path, mode: OpenMode) -> Result<Self::File, SortError>;

    /// Removes a file.
    async fn remove(&self, path: &Path) -> Result<(), SortError>;
}

/// Block file interface.
///
/// Handles are cheap to clone; all clones refer to the same open file, so several
/// operations can be in flight for one file at once as long as they target distinct blocks.
#[async_trait]
pub trait BlockFile: Clone + Send + Sync + 'static {
    /// Returns the file size in bytes.
    async fn size(&self) -> Result<u64, SortError>;

    /// Reads the block at `block_index`.
    ///
    /// Returns the block along with the number of bytes actually read. Bytes after the
    /// read ones are zero.
    async fn read_block(&self, block_index: u64) -> Result<(Block, usize), SortError>;

    /// Writes a block at `block_index`. Returns the number of bytes written.
    async fn write_block(&self, block_index: u64, block: Block) -> Result<usize, SortError>;

    /// Flushes written data to the device.
    async fn flush(&self) -> Result<(), SortError>;

    /// Closes the handle.
    async fn close(self) -> Result<(), SortError>;
}

/// File system block storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskStorage;

#[async_trait]
impl BlockStorage for DiskStorage {
    type File = DiskFile;

    async fn open(&self, path: &Path, mode: OpenMode) -> Result<DiskFile, SortError> {
        let path = path.to_path_buf();
        blocking(move || {
            let mut options = fs::OpenOptions::new();
            match mode {
                OpenMode::Read => options.read(true),
                OpenMode::Create => options.read(true).write(true).create(true).truncate(true),
            };

            match options.open(&path) {
                Ok(file) => Ok(DiskFile {
                    path: path.into(),
                    file: Arc::new(file),
                }),
                Err(err) => Err(SortError::Open(path, err)),
            }
        })
        .await
    }

    async fn remove(&self, path: &Path) -> Result<(), SortError> {
        let path = path.to_path_buf();
        blocking(move || fs::remove_file(&path).map_err(|err| SortError::Remove(path, err))).await
    }
}

/// File system block file.
#[derive(Debug, Clone)]
pub struct DiskFile {
    path: Arc<Path>,
    file: Arc<fs::File>,
}

impl DiskFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl BlockFile for DiskFile {
    async fn size(&self) -> Result<u64, SortError> {
        let this = self.clone();
        blocking(move || match this.file.metadata() {
            Ok(metadata) => Ok(metadata.len()),
            Err(err) => Err(SortError::SizeQuery(this.path.to_path_buf(), err)),
        })
        .await
    }

    async fn read_block(&self, block_index: u64) -> Result<(Block, usize), SortError> {
        let this = self.clone();
        blocking(move || {
            let mut block = Block::zeroed();
            let offset = block_index * BLOCK_SIZE as u64;
            let mut filled = 0;

            while filled < BLOCK_SIZE {
                match read_at(&this.file, &mut block.as_mut_bytes()[filled..], offset + filled as u64) {
                    Ok(0) => break,
                    Ok(read) => filled += read,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(SortError::Read(this.path.to_path_buf(), err)),
                }
            }

            Ok((block, filled))
        })
        .await
    }

    async fn write_block(&self, block_index: u64, block: Block) -> Result<usize, SortError> {
        let this = self.clone();
        blocking(move || {
            let offset = block_index * BLOCK_SIZE as u64;
            let mut written = 0;

            while written < BLOCK_SIZE {
                match write_at(&this.file, &block.as_bytes()[written..], offset + written as u64) {
                    Ok(0) => break,
                    Ok(count) => written += count,
                    Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(SortError::Write(this.path.to_path_buf(), err)),
                }
            }

            Ok(written)
        })
        .await
    }

    async fn flush(&self) -> Result<(), SortError> {
        let this = self.clone();
        blocking(move || {
            this.file
                .sync_data()
                .map_err(|err| SortError::Write(this.path.to_path_buf(), err))
        })
        .await
    }

    async fn close(self) -> Result<(), SortError> {
        log::trace!("closing {}", self.path.display());
        Ok(())
    }
}

async fn blocking<T, F>(operation: F) -> Result<T, SortError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SortError> + Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(SortError::Task)?
}

#[cfg(unix)]
fn read_at(file: &fs::File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(unix)]
fn write_at(file: &fs::File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, buf, offset)
}

#[cfg(windows)]
fn read_at(file: &fs::File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

#[cfg(windows)]
fn write_at(file: &fs::File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, buf, offset)
}

/// Returns the number of blocks a file of `file_size` bytes consists of.
/// A trailing partial block counts as a whole one.
pub fn block_count(file_size: u64) -> u64 {
    let block_size = BLOCK_SIZE as u64;
    (file_size + block_size - 1) / block_size
}

/// Returns the path of the run file number `run_index`: `<base>.<run_index>`.
pub fn run_path(base: &Path, run_index: usize) -> PathBuf {
    with_suffix(base, &run_index.to_string())
}

/// Returns the path of the merged output file: `<base>.sorted`.
pub fn sorted_path(base: &Path) -> PathBuf {
    with_suffix(base, "sorted")
}

fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(base.as_os_str());
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

/// Reads the block at `block_index` of a file of `file_size` bytes.
///
/// The last block of a file whose size is not a multiple of [`BLOCK_SIZE`] is partial:
/// its missing tail is zero-filled and the block is compared as a whole one. Any other
/// block returning fewer than [`BLOCK_SIZE`] bytes is an error.
pub async fn read_full_block<F: BlockFile>(
    file: &F,
    path: &Path,
    block_index: u64,
    file_size: u64,
) -> Result<Block, SortError> {
    let offset = block_index * BLOCK_SIZE as u64;
    let expected = file_size.saturating_sub(offset).min(BLOCK_SIZE as u64) as usize;

    let (mut block, read) = file.read_block(block_index).await?;
    if read < expected {
        return Err(SortError::ShortRead {
            path: path.to_path_buf(),
            block_index,
            read,
        });
    }

    if expected < BLOCK_SIZE {
        log::warn!(
            "{}: partial block {} ({} bytes), padding with zeros",
            path.display(),
            block_index,
            expected
        );
        block.as_mut_bytes()[expected..].fill(0);
    }

    return Ok(block);
}

/// Sequential block reader. Yields the blocks of a file in order along with their position
/// and the total number of blocks.
pub struct BlockReader<F: BlockFile> {
    file: F,
    path: PathBuf,
    file_size: u64,
    position: u64,
    total_blocks: u64,
}

impl<F: BlockFile> BlockReader<F> {
    /// Opens a file for sequential reading.
    pub async fn open<S>(storage: &S, path: &Path) -> Result<Self, SortError>
    where
        S: BlockStorage<File = F>,
    {
        let file = storage.open(path, OpenMode::Read).await?;
        let file_size = file.size().await?;

        return Ok(BlockReader {
            file,
            path: path.to_path_buf(),
            file_size,
            position: 0,
            total_blocks: block_count(file_size),
        });
    }

    pub fn total_blocks(&self) -> u64 {
        self.total_blocks
    }

    /// Returns the next `(block, position, total_blocks)` triple or [`None`] at the end of file.
    pub async fn next(&mut self) -> Result<Option<(Block, u64, u64)>, SortError> {
        if self.position == self.total_blocks {
            return Ok(None);
        }

        let position = self.position;
        let block = read_full_block(&self.file, &self.path, position, self.file_size).await?;
        self.position += 1;

        return Ok(Some((block, position, self.total_blocks)));
    }

    /// Closes the underlying file.
    pub async fn close(self) -> Result<(), SortError> {
        self.file.close().await
    }
}

#[cfg(test)]
mod test {
    use std::fs;
    use std::path::Path;

    use async_trait::async_trait;
    use rstest::*;

    use super::{
        block_count, read_full_block, run_path, sorted_path, BlockFile, BlockReader, BlockStorage, DiskStorage,
        OpenMode,
    };
    use crate::block::{Block, BLOCK_SIZE};
    use crate::sort::SortError;
    use crate::testing::{block_on, write_pattern};

    #[fixture]
    fn tmp_dir() -> tempfile::TempDir {
        tempfile::tempdir_in("./").unwrap()
    }

    #[rstest]
    #[case(0, 0)]
    #[case(1, 1)]
    #[case(4095, 1)]
    #[case(4096, 1)]
    #[case(4097, 2)]
    #[case(11 * 4096, 11)]
    fn test_block_count(#[case] file_size: u64, #[case] expected: u64) {
        assert_eq!(block_count(file_size), expected);
    }

    #[test]
    fn test_file_names() {
        let base = Path::new("/data/input.bin");
        assert_eq!(run_path(base, 1), Path::new("/data/input.bin.1"));
        assert_eq!(run_path(base, 12), Path::new("/data/input.bin.12"));
        assert_eq!(sorted_path(base), Path::new("/data/input.bin.sorted"));
    }

    #[rstest]
    fn test_open_missing_file(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("missing");
        let result = block_on(DiskStorage.open(&path, OpenMode::Read));
        assert!(matches!(result, Err(SortError::Open(p, _)) if p == path));
    }

    #[rstest]
    fn test_write_read_block(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("blocks");

        block_on(async {
            let file = DiskStorage.open(&path, OpenMode::Create).await.unwrap();
            assert_eq!(file.path(), path.as_path());
            // written out of order on purpose
            assert_eq!(file.write_block(1, Block::from_prefix(b"second")).await.unwrap(), BLOCK_SIZE);
            assert_eq!(file.write_block(0, Block::from_prefix(b"first")).await.unwrap(), BLOCK_SIZE);
            file.flush().await.unwrap();
            assert_eq!(file.size().await.unwrap(), 2 * BLOCK_SIZE as u64);

            let (block, read) = file.read_block(0).await.unwrap();
            assert_eq!((block.trimmed(), read), (&b"first"[..], BLOCK_SIZE));
            let (block, read) = file.read_block(1).await.unwrap();
            assert_eq!((block.trimmed(), read), (&b"second"[..], BLOCK_SIZE));
            let (_, read) = file.read_block(2).await.unwrap();
            assert_eq!(read, 0);

            file.close().await.unwrap();
        });
    }

    #[rstest]
    fn test_block_reader_partial_block(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("partial");
        let mut content = vec![b'a'; BLOCK_SIZE];
        content.extend_from_slice(b"tail");
        fs::write(&path, content).unwrap();

        block_on(async {
            let mut reader = BlockReader::open(&DiskStorage, &path).await.unwrap();
            assert_eq!(reader.total_blocks(), 2);

            let (block, position, total) = reader.next().await.unwrap().unwrap();
            assert_eq!((position, total), (0, 2));
            assert!(block.as_bytes().iter().all(|b| *b == b'a'));

            let (block, position, _) = reader.next().await.unwrap().unwrap();
            assert_eq!(position, 1);
            assert_eq!(block.trimmed(), b"tail");
            assert!(block.as_bytes()[4..].iter().all(|b| *b == 0));

            assert!(reader.next().await.unwrap().is_none());
        });
    }

    #[rstest]
    fn test_block_reader_pattern(tmp_dir: tempfile::TempDir) {
        let path = tmp_dir.path().join("pattern");
        write_pattern(&path, &["25", "123456789", "12345678"]);

        let actual = block_on(async {
            let mut reader = BlockReader::open(&DiskStorage, &path).await.unwrap();
            let mut actual = Vec::new();
            while let Some((block, _, _)) = reader.next().await.unwrap() {
                actual.push(String::from_utf8(block.trimmed().to_vec()).unwrap());
            }
            actual
        });

        assert_eq!(actual, vec!["25", "123456789", "12345678"]);
    }

    /// File returning at most `limit` bytes per read.
    #[derive(Clone)]
    struct ShortFile {
        limit: usize,
    }

    #[async_trait]
    impl BlockFile for ShortFile {
        async fn size(&self) -> Result<u64, SortError> {
            Ok(3 * BLOCK_SIZE as u64)
        }

        async fn read_block(&self, _block_index: u64) -> Result<(Block, usize), SortError> {
            Ok((Block::from_prefix(&vec![b'x'; self.limit]), self.limit))
        }

        async fn write_block(&self, _block_index: u64, _block: Block) -> Result<usize, SortError> {
            Ok(self.limit)
        }

        async fn flush(&self) -> Result<(), SortError> {
            Ok(())
        }

        async fn close(self) -> Result<(), SortError> {
            Ok(())
        }
    }

    #[test]
    fn test_short_read_is_an_error() {
        let file = ShortFile { limit: 100 };
        let result = block_on(read_full_block(&file, Path::new("short"), 1, 3 * BLOCK_SIZE as u64));

        assert!(matches!(
            result,
            Err(SortError::ShortRead {
                block_index: 1,
                read: 100,
                ..
            })
        ));
    }

    #[test]
    fn test_partial_last_block_is_padded() {
        let file = ShortFile { limit: 100 };
        let file_size = 2 * BLOCK_SIZE as u64 + 100;
        let block = block_on(read_full_block(&file, Path::new("short"), 2, file_size)).unwrap();

        assert_eq!(block.trimmed(), &[b'x'; 100][..]);
    }
}
