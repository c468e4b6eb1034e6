//! Backing storage for executable images.
//!
//! [`ImageFile`] is the narrow file interface the loader needs: an
//! absolute seek and a read that may return short. [`IoFile`] adapts any
//! [`hadris_io::Read`] + [`hadris_io::Seek`] source (a filesystem node, a
//! block device adapter, an in-memory [`hadris_io::Cursor`]).

use hadris_io::{Read, Seek, SeekFrom};
use kestrel_core::errno::Errno;

/// An open executable image.
pub trait ImageFile {
    /// Moves the file position to `pos` bytes from the start and returns
    /// the resulting position.
    ///
    /// # Errors
    ///
    /// The errno reported by the underlying storage.
    fn seek(&mut self, pos: u64) -> Result<u64, Errno>;

    /// Reads up to `buf.len()` bytes at the current position. `Ok(0)` means
    /// end of file.
    ///
    /// # Errors
    ///
    /// The errno reported by the underlying storage; [`Errno::EINTR`] if
    /// the read was interrupted before any data was transferred.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Errno>;
}

impl<T: ImageFile + ?Sized> ImageFile for &mut T {
    fn seek(&mut self, pos: u64) -> Result<u64, Errno> {
        (**self).seek(pos)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Errno> {
        (**self).read(buf)
    }
}

/// [`ImageFile`] over a `hadris_io` stream.
pub struct IoFile<T> {
    inner: T,
}

impl<T: Read + Seek> IoFile<T> {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: T) -> Self {
        Self { inner }
    }

    /// Unwraps the stream.
    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read + Seek> ImageFile for IoFile<T> {
    fn seek(&mut self, pos: u64) -> Result<u64, Errno> {
        self.inner
            .seek(SeekFrom::Start(pos))
            .map_err(|_| Errno::ESPIPE)
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Errno> {
        self.inner.read(buf).map_err(|_| Errno::EIO)
    }
}
