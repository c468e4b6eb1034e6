//! Compressed image support.
//!
//! The loader does not know any codec. A compressed image comes with a
//! [`Decompressor`] that maps positions in the uncompressed image onto the
//! compressed file and inflates the bytes on request.

use kestrel_core::errno::Errno;

use crate::file::ImageFile;

/// Random-access reader over a compressed image.
pub trait Decompressor {
    /// Fills `buf` with uncompressed image bytes starting at `pos`.
    ///
    /// `pos` is relative to the start of the image; `base` is where the
    /// image begins inside `file`. Returns the number of bytes produced,
    /// which may be less than requested, and `Ok(0)` past the end of the
    /// image.
    ///
    /// # Errors
    ///
    /// Storage errors from `file`, or [`Errno::EIO`] for corrupt input.
    /// [`Errno::EINTR`] makes the loader retry the same request.
    fn read(
        &mut self,
        file: &mut dyn ImageFile,
        base: u64,
        buf: &mut [u8],
        pos: u64,
    ) -> Result<usize, Errno>;
}
