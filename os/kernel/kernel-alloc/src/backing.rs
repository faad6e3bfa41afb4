//! File backing for demand-paged regions.
//!
//! The filesystem is a collaborator: a file-backed [`Region`](crate::region::Region)
//! only stores an opaque [`FileHandle`] plus where its bytes live on disk, and
//! the fault handler pulls one page at a time through [`FileSystem`].

use core::fmt;

/// Opaque reference to an open file, interpreted by the [`FileSystem`].
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct FileHandle(u32);

impl FileHandle {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn id(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fd{}", self.0)
    }
}

/// Where a file-backed region's initial contents come from.
///
/// Region byte `x` is file byte `offset + x` while `x < disk_len`; bytes past
/// `disk_len` read as zero (e.g. an ELF segment's `.bss` tail).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Backing {
    pub file: FileHandle,
    /// Byte offset of the region's first byte within the file.
    pub offset: u32,
    /// Number of bytes present on disk.
    pub disk_len: u32,
}

impl Backing {
    #[must_use]
    pub const fn new(file: FileHandle, offset: u32, disk_len: u32) -> Self {
        Self {
            file,
            offset,
            disk_len,
        }
    }
}

/// Seek origin.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Whence {
    /// From the start of the file.
    Set,
    /// From the current position.
    Current,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum BackingError {
    #[error("{0} is not an open file")]
    BadHandle(FileHandle),
    #[error("cannot seek {file} to {offset:#x}")]
    Seek { file: FileHandle, offset: u32 },
    #[error("read from {0} failed")]
    Read(FileHandle),
}

/// The two filesystem calls demand paging needs.
pub trait FileSystem {
    /// Move the file position.
    ///
    /// # Errors
    /// Unknown handle or an unreachable position.
    fn seek(&mut self, file: FileHandle, offset: u32, whence: Whence) -> Result<(), BackingError>;

    /// Read up to `buf.len()` bytes at the current position, returning how many
    /// were read. A short read is not an error.
    ///
    /// # Errors
    /// Unknown handle or a device failure.
    fn read(&mut self, file: FileHandle, buf: &mut [u8]) -> Result<usize, BackingError>;
}

impl<T: FileSystem + ?Sized> FileSystem for &mut T {
    fn seek(&mut self, file: FileHandle, offset: u32, whence: Whence) -> Result<(), BackingError> {
        (**self).seek(file, offset, whence)
    }

    fn read(&mut self, file: FileHandle, buf: &mut [u8]) -> Result<usize, BackingError> {
        (**self).read(file, buf)
    }
}

/// A filesystem without files, for address spaces with only anonymous regions.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoFiles;

impl FileSystem for NoFiles {
    fn seek(&mut self, file: FileHandle, _: u32, _: Whence) -> Result<(), BackingError> {
        Err(BackingError::BadHandle(file))
    }

    fn read(&mut self, file: FileHandle, _: &mut [u8]) -> Result<usize, BackingError> {
        Err(BackingError::BadHandle(file))
    }
}
