//! Block cache for small image reads.
//!
//! Loading an ELF image issues many small reads (headers, section and
//! program header tables, symbol entries) clustered in a few regions of
//! the file. The cache keeps a handful of block-aligned chunks of the
//! image and serves those reads from memory. Blocks are replaced
//! round-robin.

use alloc::vec;
use alloc::vec::Vec;

use kestrel_core::config::MAX_CACHE_BLOCKS;
use kestrel_core::errno::Errno;
use kestrel_core::ktrace;
use planck_noalloc::vec::ArrayVec;

struct Slot {
    /// Block index held, `None` while the slot is being (re)filled.
    block: Option<u64>,
    /// Valid bytes; short only for the last block of the image.
    len: usize,
    data: Vec<u8>,
}

/// Hit and miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from a resident block.
    pub hits: u32,
    /// Reads that loaded a block first.
    pub misses: u32,
}

/// A fixed set of image blocks.
pub struct BlockCache {
    block_size: usize,
    capacity: usize,
    slots: ArrayVec<Slot, MAX_CACHE_BLOCKS>,
    next_victim: usize,
    stats: CacheStats,
}

impl BlockCache {
    /// Creates an empty cache of `blocks` blocks of `block_size` bytes.
    /// Block memory is allocated on first use.
    ///
    /// # Errors
    ///
    /// [`Errno::EINVAL`] for a zero block size, zero blocks, or more than
    /// [`MAX_CACHE_BLOCKS`] blocks.
    pub fn new(block_size: usize, blocks: usize) -> Result<Self, Errno> {
        if block_size == 0 || blocks == 0 || blocks > MAX_CACHE_BLOCKS {
            return Err(Errno::EINVAL);
        }
        Ok(Self {
            block_size,
            capacity: blocks,
            slots: ArrayVec::new(),
            next_victim: 0,
            stats: CacheStats::default(),
        })
    }

    /// Size of one block in bytes.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Hit and miss counts since creation.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Forgets every resident block.
    pub fn invalidate(&mut self) {
        for slot in self.slots.iter_mut() {
            slot.block = None;
            slot.len = 0;
        }
    }

    /// Copies image bytes starting at `pos` into `buf`, never crossing the
    /// end of the block that contains `pos`.
    ///
    /// `fill(dst, at)` reads image bytes at position `at`; it is called
    /// until a missing block is complete or it returns `Ok(0)`. Returns the
    /// number of bytes copied, `Ok(0)` at end of image.
    ///
    /// # Errors
    ///
    /// Whatever `fill` reports. The slot being filled is left empty.
    pub fn read<F>(&mut self, buf: &mut [u8], pos: u64, mut fill: F) -> Result<usize, Errno>
    where
        F: FnMut(&mut [u8], u64) -> Result<usize, Errno>,
    {
        let bs = self.block_size as u64;
        let block = pos / bs;
        // Bounded by block_size, which is a usize.
        #[allow(clippy::cast_possible_truncation)]
        let offset = (pos % bs) as usize;

        let index = if let Some(index) = self.lookup(block) {
            self.stats.hits += 1;
            index
        } else {
            self.stats.misses += 1;
            let index = self.claim_slot();
            let slot = &mut self.slots.as_mut_slice()[index];
            slot.block = None;
            slot.len = 0;

            let start = block * bs;
            let mut filled = 0;
            while filled < slot.data.len() {
                let n = fill(&mut slot.data[filled..], start + filled as u64)?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
            slot.block = Some(block);
            slot.len = filled;
            ktrace!("binfmt: cache block {block} loaded, {filled} bytes");
            index
        };

        let slot = &self.slots.as_slice()[index];
        if offset >= slot.len {
            return Ok(0);
        }
        let n = buf.len().min(slot.len - offset);
        buf[..n].copy_from_slice(&slot.data[offset..offset + n]);
        Ok(n)
    }

    fn lookup(&self, block: u64) -> Option<usize> {
        self.slots.iter().position(|s| s.block == Some(block))
    }

    fn claim_slot(&mut self) -> usize {
        if let Some(index) = self.slots.iter().position(|s| s.block.is_none()) {
            return index;
        }
        if self.slots.len() < self.capacity {
            self.slots.push(Slot {
                block: None,
                len: 0,
                data: vec![0; self.block_size],
            });
            return self.slots.len() - 1;
        }
        let victim = self.next_victim;
        self.next_victim = (victim + 1) % self.capacity;
        victim
    }
}
