//! Executable image loading for the Kestrel kernel.
//!
//! [`LoadInfo::read_at`] streams a byte range of an image into memory,
//! hiding how the bytes are obtained: straight from the file, through a
//! [`Decompressor`](compress::Decompressor) for compressed images, or from
//! a [`BlockCache`](cache::BlockCache) for small reads. Which backends are
//! available is chosen with the `cache-read` and `compressed` features.

#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]

extern crate alloc;

#[cfg(feature = "cache-read")]
pub mod cache;
#[cfg(feature = "compressed")]
pub mod compress;
#[cfg(feature = "dump-readdata")]
mod dump;
pub mod file;
mod read;

pub use file::{ImageFile, IoFile};
pub use read::LoadInfo;
