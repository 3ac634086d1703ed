//! File collaborator abstractions.
//!
//! The builder writes through [`WritableFile`] (append-only) and the
//! reader pulls byte ranges through [`RandomAccessFile`]. Both are
//! narrow seams: the table layer never clones, locks, or retries the
//! underlying file, it only appends or reads exactly what it is told.

use crate::error::{Error, Result};
use bytes::Bytes;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Append-only sink used by the table builder.
pub trait WritableFile {
    /// Appends `data` at the current end of the file.
    fn append(&mut self, data: &[u8]) -> Result<()>;

    /// Flushes buffered data to the operating system.
    fn flush(&mut self) -> Result<()>;

    /// Forces written data to stable storage.
    fn sync(&mut self) -> Result<()>;
}

/// Positional read source used by the table reader.
///
/// Implementations must be safe to share across threads; the reader
/// issues reads from concurrent iterators against the same instance.
pub trait RandomAccessFile: Send + Sync {
    /// Reads exactly `len` bytes starting at `offset`.
    fn read(&self, offset: u64, len: usize) -> Result<Bytes>;
}

/// [`WritableFile`] backed by a buffered `std::fs::File`.
pub struct FsWritableFile {
    writer: BufWriter<File>,
}

impl FsWritableFile {
    /// Creates (truncating) a file at `path` for writing.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self { writer: BufWriter::new(file) })
    }
}

impl WritableFile for FsWritableFile {
    fn append(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }
}

/// [`RandomAccessFile`] backed by a `std::fs::File`.
///
/// Each read clones the descriptor so concurrent reads do not race on
/// the shared file cursor.
pub struct FsRandomAccessFile {
    file: File,
}

impl FsRandomAccessFile {
    /// Opens the file at `path` for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self { file })
    }

    /// Returns the current length of the file.
    pub fn len(&self) -> Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

impl RandomAccessFile for FsRandomAccessFile {
    fn read(&self, offset: u64, len: usize) -> Result<Bytes> {
        let mut file = self.file.try_clone().map_err(Error::Io)?;
        file.seek(SeekFrom::Start(offset))?;

        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(Bytes::from(buffer))
    }
}
