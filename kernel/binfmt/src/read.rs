//! Loader context and the segmented image read.

#[cfg(feature = "compressed")]
use alloc::boxed::Box;

use kestrel_core::errno::Errno;
use kestrel_core::{kerr, ktrace};

#[cfg(feature = "cache-read")]
use crate::cache::BlockCache;
#[cfg(feature = "compressed")]
use crate::compress::Decompressor;
use crate::file::ImageFile;

/// State of one image load.
pub struct LoadInfo<F: ImageFile> {
    file: F,
    offset: u64,
    cached_read: bool,
    #[cfg(feature = "cache-read")]
    cache: Option<BlockCache>,
    #[cfg(feature = "compressed")]
    decompressor: Option<Box<dyn Decompressor>>,
}

impl<F: ImageFile> LoadInfo<F> {
    /// Starts a load of the image in `file`, beginning at byte 0, reading
    /// raw file data.
    #[must_use]
    pub fn new(file: F) -> Self {
        Self {
            file,
            offset: 0,
            cached_read: false,
            #[cfg(feature = "cache-read")]
            cache: None,
            #[cfg(feature = "compressed")]
            decompressor: None,
        }
    }

    /// Skips a header of `offset` bytes in front of the image. Every read
    /// position is relative to the end of the header.
    #[must_use]
    pub fn with_offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Attaches a block cache and turns cached reads on.
    ///
    /// # Errors
    ///
    /// [`Errno::EINVAL`] for an unusable cache geometry.
    #[cfg(feature = "cache-read")]
    pub fn with_cache(mut self, block_size: usize, blocks: usize) -> Result<Self, Errno> {
        self.cache = Some(BlockCache::new(block_size, blocks)?);
        self.cached_read = true;
        Ok(self)
    }

    /// Marks the image as compressed and reads it through `decompressor`.
    #[cfg(feature = "compressed")]
    #[must_use]
    pub fn with_decompressor(mut self, decompressor: Box<dyn Decompressor>) -> Self {
        self.decompressor = Some(decompressor);
        self
    }

    /// Header size in front of the image.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether small reads currently go through the cache.
    #[must_use]
    pub fn cached_read(&self) -> bool {
        self.cached_read
    }

    /// Turns cached reads on or off. Has no effect without a cache.
    pub fn set_cached_read(&mut self, enabled: bool) {
        self.cached_read = enabled;
    }

    /// The attached cache, if any.
    #[cfg(feature = "cache-read")]
    #[must_use]
    pub fn cache(&self) -> Option<&BlockCache> {
        self.cache.as_ref()
    }

    /// The image file.
    #[must_use]
    pub fn file(&self) -> &F {
        &self.file
    }

    /// Ends the load and returns the image file.
    pub fn into_file(self) -> F {
        self.file
    }

    /// Reads `buffer.len()` bytes of the image at `offset` into `buffer`.
    ///
    /// Each chunk comes from the block cache when cached reads are on and
    /// the rest of the request fits in one block, otherwise from the
    /// decompressor for a compressed image, otherwise straight from the
    /// file. Interrupted chunks are retried; short chunks advance the
    /// request.
    ///
    /// # Errors
    ///
    /// [`Errno::ENODATA`] if the image ends before the request is
    /// satisfied, [`Errno::ESPIPE`] if the file cannot be positioned, and
    /// any other errno from the backend. The buffer contents are
    /// unspecified on error.
    pub fn read_at(&mut self, buffer: &mut [u8], offset: u64) -> Result<(), Errno> {
        let base = self.offset;
        let mut pos = offset;
        let mut done = 0;

        while done < buffer.len() {
            let chunk = &mut buffer[done..];
            let result = self.read_chunk(chunk, base, pos);

            match result {
                Err(Errno::EINTR) => {
                    ktrace!("binfmt: read at {} interrupted, retrying", base + pos);
                }
                Err(err) => {
                    kerr!("binfmt: read from offset {} failed: {}", base + pos, err);
                    return Err(err);
                }
                Ok(0) => {
                    kerr!("binfmt: unexpected end of file at offset {}", base + pos);
                    return Err(Errno::ENODATA);
                }
                Ok(n) => {
                    done += n;
                    pos += n as u64;
                }
            }
        }

        #[cfg(feature = "dump-readdata")]
        crate::dump::dump_readdata(buffer);

        Ok(())
    }

    /// One backend call for the remainder of a request. `pos` is relative
    /// to the image start.
    fn read_chunk(&mut self, chunk: &mut [u8], base: u64, pos: u64) -> Result<usize, Errno> {
        #[cfg(feature = "cache-read")]
        if self.use_cache(chunk.len()) {
            return self.read_cached(chunk, base, pos);
        }

        #[cfg(feature = "compressed")]
        if let Some(decompressor) = self.decompressor.as_mut() {
            return decompressor.read(&mut self.file, base, chunk, pos);
        }

        raw_read(&mut self.file, base, chunk, pos)
    }

    /// Cached reads are limited to requests that fit in one block.
    #[cfg(feature = "cache-read")]
    fn use_cache(&self, len: usize) -> bool {
        self.cached_read
            && self
                .cache
                .as_ref()
                .is_some_and(|cache| len <= cache.block_size())
    }

    #[cfg(feature = "cache-read")]
    fn read_cached(&mut self, chunk: &mut [u8], base: u64, pos: u64) -> Result<usize, Errno> {
        let file = &mut self.file;
        #[cfg(feature = "compressed")]
        let decompressor = &mut self.decompressor;

        match self.cache.as_mut() {
            Some(cache) => cache.read(chunk, pos, |dst, at| {
                #[cfg(feature = "compressed")]
                if let Some(decompressor) = decompressor.as_mut() {
                    return decompressor.read(&mut *file, base, dst, at);
                }
                raw_read(&mut *file, base, dst, at)
            }),
            None => raw_read(file, base, chunk, pos),
        }
    }
}

/// Positions `file` at `base + pos` and reads once.
fn raw_read<F: ImageFile + ?Sized>(
    file: &mut F,
    base: u64,
    buf: &mut [u8],
    pos: u64,
) -> Result<usize, Errno> {
    let target = base + pos;
    let rpos = file.seek(target)?;
    if rpos != target {
        kerr!("binfmt: failed to seek to position {target}, got {rpos}");
        return Err(Errno::ESPIPE);
    }
    file.read(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::IoFile;
    use hadris_io::Cursor;

    fn image(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    /// In-memory file with injectable failures and short reads.
    struct ScriptedFile {
        data: Vec<u8>,
        pos: u64,
        interrupts: u32,
        max_chunk: usize,
        fail_with: Option<Errno>,
        seek_skew: u64,
        reads: u32,
    }

    impl ScriptedFile {
        fn new(data: Vec<u8>) -> Self {
            Self {
                data,
                pos: 0,
                interrupts: 0,
                max_chunk: usize::MAX,
                fail_with: None,
                seek_skew: 0,
                reads: 0,
            }
        }
    }

    impl ImageFile for ScriptedFile {
        fn seek(&mut self, pos: u64) -> Result<u64, Errno> {
            self.pos = pos + self.seek_skew;
            Ok(self.pos)
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, Errno> {
            self.reads += 1;
            if let Some(err) = self.fail_with {
                return Err(err);
            }
            if self.interrupts > 0 {
                self.interrupts -= 1;
                return Err(Errno::EINTR);
            }
            let start = usize::try_from(self.pos).unwrap().min(self.data.len());
            let n = buf.len().min(self.max_chunk).min(self.data.len() - start);
            buf[..n].copy_from_slice(&self.data[start..start + n]);
            self.pos += n as u64;
            Ok(n)
        }
    }

    /// Toy codec: the stored image is the plain image with every byte
    /// XORed with a key.
    #[cfg(feature = "compressed")]
    struct XorCodec {
        key: u8,
    }

    #[cfg(feature = "compressed")]
    impl Decompressor for XorCodec {
        fn read(
            &mut self,
            file: &mut dyn ImageFile,
            base: u64,
            buf: &mut [u8],
            pos: u64,
        ) -> Result<usize, Errno> {
            let n = raw_read(file, base, buf, pos)?;
            for byte in &mut buf[..n] {
                *byte ^= self.key;
            }
            Ok(n)
        }
    }

    #[test]
    fn reads_raw_range() {
        let data = image(300);
        let mut info = LoadInfo::new(IoFile::new(Cursor::new(data.as_slice())));
        let mut buf = [0u8; 100];
        info.read_at(&mut buf, 50).unwrap();
        assert_eq!(buf[..], data[50..150]);
    }

    #[test]
    fn header_offset_is_added() {
        let data = image(64);
        let mut info = LoadInfo::new(IoFile::new(Cursor::new(data.as_slice()))).with_offset(16);
        assert_eq!(info.offset(), 16);
        let mut buf = [0u8; 8];
        info.read_at(&mut buf, 4).unwrap();
        assert_eq!(buf[..], data[20..28]);
    }

    #[test]
    fn empty_request_touches_nothing() {
        let mut info = LoadInfo::new(ScriptedFile::new(image(4)));
        info.read_at(&mut [], 1000).unwrap();
        assert_eq!(info.file().reads, 0);
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let data = image(64);
        let mut file = ScriptedFile::new(data.clone());
        file.interrupts = 2;
        let mut info = LoadInfo::new(file);

        let mut buf = [0u8; 32];
        info.read_at(&mut buf, 8).unwrap();

        assert_eq!(buf[..], data[8..40]);
        assert_eq!(info.file().reads, 3);
    }

    #[test]
    fn short_reads_advance() {
        let data = image(64);
        let mut file = ScriptedFile::new(data.clone());
        file.max_chunk = 5;
        let mut info = LoadInfo::new(file);

        let mut buf = [0u8; 23];
        info.read_at(&mut buf, 1).unwrap();

        assert_eq!(buf[..], data[1..24]);
        assert_eq!(info.into_file().reads, 5);
    }

    #[test]
    fn end_of_file_is_enodata() {
        let mut info = LoadInfo::new(ScriptedFile::new(image(10)));
        let mut buf = [0u8; 20];
        assert_eq!(info.read_at(&mut buf, 0), Err(Errno::ENODATA));
        assert_eq!(Errno::ENODATA.as_neg(), -61);
    }

    #[test]
    fn zero_byte_read_is_enodata() {
        let mut info = LoadInfo::new(ScriptedFile::new(image(10)));
        let mut buf = [0u8; 1];
        assert_eq!(info.read_at(&mut buf, 10), Err(Errno::ENODATA));
        assert_eq!(info.file().reads, 1);
    }

    #[test]
    fn other_errors_propagate_without_retry() {
        let mut file = ScriptedFile::new(image(10));
        file.fail_with = Some(Errno::EIO);
        let mut info = LoadInfo::new(file);
        let mut buf = [0u8; 4];
        assert_eq!(info.read_at(&mut buf, 0), Err(Errno::EIO));
        assert_eq!(info.file().reads, 1);
    }

    #[test]
    fn misplaced_seek_is_espipe() {
        let mut file = ScriptedFile::new(image(10));
        file.seek_skew = 1;
        let mut info = LoadInfo::new(file);
        let mut buf = [0u8; 4];
        assert_eq!(info.read_at(&mut buf, 0), Err(Errno::ESPIPE));
        assert_eq!(info.file().reads, 0);
    }

    #[cfg(feature = "cache-read")]
    #[test]
    fn small_reads_hit_the_cache() {
        let data = image(256);
        let mut info = LoadInfo::new(ScriptedFile::new(data.clone()))
            .with_cache(64, 2)
            .unwrap();
        assert!(info.cached_read());

        let mut buf = [0u8; 8];
        info.read_at(&mut buf, 3).unwrap();
        assert_eq!(buf[..], data[3..11]);
        info.read_at(&mut buf, 40).unwrap();
        assert_eq!(buf[..], data[40..48]);

        let stats = info.cache().unwrap().stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(info.file().reads, 1);
    }

    #[cfg(feature = "cache-read")]
    #[test]
    fn cached_read_straddles_blocks() {
        let data = image(256);
        let mut info = LoadInfo::new(ScriptedFile::new(data.clone()))
            .with_offset(4)
            .with_cache(16, 2)
            .unwrap();

        let mut buf = [0u8; 10];
        info.read_at(&mut buf, 12).unwrap();

        assert_eq!(buf[..], data[16..26]);
        assert_eq!(info.cache().unwrap().stats().misses, 2);
    }

    #[cfg(feature = "cache-read")]
    #[test]
    fn large_reads_bypass_the_cache() {
        let data = image(256);
        let mut info = LoadInfo::new(ScriptedFile::new(data.clone()))
            .with_cache(16, 2)
            .unwrap();

        let mut buf = [0u8; 40];
        info.read_at(&mut buf, 0).unwrap();
        assert_eq!(buf[..], data[..40]);

        // One raw read satisfied the whole request.
        let stats = info.cache().unwrap().stats();
        assert_eq!(stats.hits + stats.misses, 0);

        info.set_cached_read(false);
        let mut small = [0u8; 4];
        info.read_at(&mut small, 100).unwrap();
        assert_eq!(info.cache().unwrap().stats().misses, 0);
    }

    #[cfg(feature = "cache-read")]
    #[test]
    fn interrupted_cache_fill_is_retried() {
        let data = image(64);
        let mut file = ScriptedFile::new(data.clone());
        file.interrupts = 1;
        let mut info = LoadInfo::new(file).with_cache(32, 1).unwrap();

        let mut buf = [0u8; 6];
        info.read_at(&mut buf, 2).unwrap();
        assert_eq!(buf[..], data[2..8]);
    }

    #[cfg(feature = "compressed")]
    #[test]
    fn compressed_image_goes_through_decompressor() {
        let plain = image(128);
        let stored: Vec<u8> = plain.iter().map(|b| b ^ 0x5a).collect();
        let mut info = LoadInfo::new(ScriptedFile::new(stored))
            .with_decompressor(Box::new(XorCodec { key: 0x5a }));

        let mut buf = [0u8; 64];
        info.read_at(&mut buf, 32).unwrap();
        assert_eq!(buf[..], plain[32..96]);
    }

    #[cfg(all(feature = "compressed", feature = "cache-read"))]
    #[test]
    fn cache_fills_through_decompressor() {
        let plain = image(128);
        let stored: Vec<u8> = plain.iter().map(|b| b ^ 0x33).collect();
        let mut info = LoadInfo::new(ScriptedFile::new(stored))
            .with_cache(32, 2)
            .unwrap()
            .with_decompressor(Box::new(XorCodec { key: 0x33 }));

        let mut buf = [0u8; 8];
        info.read_at(&mut buf, 40).unwrap();
        assert_eq!(buf[..], plain[40..48]);
        info.read_at(&mut buf, 48).unwrap();
        assert_eq!(buf[..], plain[48..56]);
        assert_eq!(info.cache().unwrap().stats().hits, 1);
    }
}
