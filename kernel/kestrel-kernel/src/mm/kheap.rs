//! Kernel heap placement.
//!
//! The idle task's stack sits at the bottom of the primary RAM region,
//! right after `.data` and `.bss`. The kernel heap takes the rest of the
//! region above the stack top. Extra RAM regions either seed an empty heap
//! or are appended to one that already exists.

use kestrel_core::errno::Errno;
use kestrel_core::fatal::FatalError;
use kestrel_core::{kinfo, kwarn};

/// Stack tops are rounded down to this alignment.
const STACK_ALIGN_MASK: usize = !0x7;

/// A half-open address range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemRegion {
    /// First byte.
    pub start: usize,
    /// One past the last byte.
    pub end: usize,
}

impl MemRegion {
    /// Region of `size` bytes at `start`.
    #[must_use]
    pub const fn new(start: usize, size: usize) -> Self {
        Self {
            start,
            end: start + size,
        }
    }

    /// Whether `addr` lies inside the region.
    #[must_use]
    pub const fn contains(&self, addr: usize) -> bool {
        addr >= self.start && addr < self.end
    }
}

/// Memory handed to a heap allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapRegion {
    /// First usable byte.
    pub start: usize,
    /// Usable bytes.
    pub size: usize,
}

/// An extra RAM region and the heap it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KRegion {
    /// Index of the target heap.
    pub heap: usize,
    /// The memory.
    pub region: MemRegion,
}

/// The kernel heap allocators, addressed by index.
pub trait KernelHeaps {
    /// Bytes currently managed by heap `index`; zero if uninitialized.
    fn heap_size(&self, index: usize) -> usize;

    /// Sets up heap `index` over `heap`.
    ///
    /// # Errors
    ///
    /// Whatever the allocator reports, typically [`Errno::EINVAL`] for a
    /// region too small to hold its bookkeeping.
    fn initialize(&mut self, index: usize, heap: HeapRegion) -> Result<(), Errno>;

    /// Adds `heap` to the already initialized heap `index`.
    fn add_region(&mut self, index: usize, heap: HeapRegion);
}

/// Places the kernel heap inside `region`.
///
/// `sdata` is the start of the data section, `idle_topstack` the top of
/// the idle task stack.
///
/// # Errors
///
/// [`FatalError::KernelHeapOverlap`] when the data section starts inside or
/// below the region and the idle stack reaches its end, leaving no room for
/// a heap.
pub fn allocate_kheap(
    region: MemRegion,
    sdata: usize,
    idle_topstack: usize,
) -> Result<HeapRegion, FatalError> {
    let stack_end = idle_topstack & STACK_ALIGN_MASK;

    if sdata <= region.end && stack_end >= region.end {
        return Err(FatalError::KernelHeapOverlap {
            sdata,
            stack_end,
            region_end: region.end,
        });
    }

    let start = if region.contains(stack_end) {
        stack_end
    } else {
        region.start
    };
    let heap = HeapRegion {
        start,
        size: region.end - start,
    };
    kinfo!("kheap: start = {:#x} size = {}", heap.start, heap.size);
    Ok(heap)
}

/// Attaches the extra kernel RAM regions to their heaps.
///
/// An uninitialized target heap is set up over the whole region; a failed
/// setup stops the walk without error. Otherwise the region is placed with
/// [`allocate_kheap`] and appended.
///
/// # Errors
///
/// Propagates [`FatalError::KernelHeapOverlap`].
pub fn add_kregions<H: KernelHeaps + ?Sized>(
    heaps: &mut H,
    regions: &[KRegion],
    sdata: usize,
    idle_topstack: usize,
) -> Result<(), FatalError> {
    for kregion in regions {
        let region = kregion.region;

        if heaps.heap_size(kregion.heap) == 0 {
            let whole = HeapRegion {
                start: region.start,
                size: region.end - region.start,
            };
            kinfo!(
                "kheap: heap {} start = {:#x} size = {}",
                kregion.heap,
                whole.start,
                whole.size
            );
            if let Err(err) = heaps.initialize(kregion.heap, whole) {
                kwarn!("kheap: heap {} setup failed: {}", kregion.heap, err);
                return Ok(());
            }
            continue;
        }

        let heap = allocate_kheap(region, sdata, idle_topstack)?;
        heaps.add_region(kregion.heap, heap);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Heaps {
        sizes: [usize; 3],
        added: Vec<(usize, HeapRegion)>,
        fail_init: bool,
    }

    impl KernelHeaps for Heaps {
        fn heap_size(&self, index: usize) -> usize {
            self.sizes[index]
        }

        fn initialize(&mut self, index: usize, heap: HeapRegion) -> Result<(), Errno> {
            if self.fail_init {
                return Err(Errno::EINVAL);
            }
            self.sizes[index] = heap.size;
            Ok(())
        }

        fn add_region(&mut self, index: usize, heap: HeapRegion) {
            self.sizes[index] += heap.size;
            self.added.push((index, heap));
        }
    }

    const RAM: MemRegion = MemRegion::new(0x1000_0000, 0x10_0000);

    #[test]
    fn heap_starts_above_idle_stack() {
        let heap = allocate_kheap(RAM, 0x1000_0000, 0x1000_4003).unwrap();
        assert_eq!(heap.start, 0x1000_4000);
        assert_eq!(heap.size, 0x10_0000 - 0x4000);
    }

    #[test]
    fn stack_outside_region_uses_whole_region() {
        // Stack lives in another bank below this region.
        let heap = allocate_kheap(RAM, 0x2000_0000, 0x0200_0000).unwrap();
        assert_eq!(
            heap,
            HeapRegion {
                start: RAM.start,
                size: 0x10_0000
            }
        );
    }

    #[test]
    fn stack_at_region_end_is_fatal() {
        let err = allocate_kheap(RAM, RAM.start, RAM.end + 4).unwrap_err();
        assert_eq!(
            err,
            FatalError::KernelHeapOverlap {
                sdata: RAM.start,
                stack_end: RAM.end,
                region_end: RAM.end,
            }
        );
    }

    #[test]
    fn data_above_region_is_not_an_overlap() {
        // Data and stack both sit above the region.
        let heap = allocate_kheap(RAM, 0x3000_0000, 0x3000_8000).unwrap();
        assert_eq!(heap.start, RAM.start);
    }

    #[test]
    fn empty_heap_takes_whole_region() {
        let mut heaps = Heaps {
            sizes: [0x1000, 0, 0],
            ..Heaps::default()
        };
        let extra = KRegion {
            heap: 1,
            region: MemRegion::new(0x6000_0000, 0x8000),
        };
        add_kregions(&mut heaps, &[extra], 0x1000_0000, 0x1000_4000).unwrap();
        assert_eq!(heaps.sizes[1], 0x8000);
        assert!(heaps.added.is_empty());
    }

    #[test]
    fn existing_heap_gets_carved_region() {
        let mut heaps = Heaps {
            sizes: [0x1000, 0, 0],
            ..Heaps::default()
        };
        let extra = KRegion {
            heap: 0,
            region: RAM,
        };
        add_kregions(&mut heaps, &[extra], RAM.start, 0x1000_2000).unwrap();
        assert_eq!(
            heaps.added,
            [(
                0,
                HeapRegion {
                    start: 0x1000_2000,
                    size: 0x10_0000 - 0x2000
                }
            )]
        );
    }

    #[test]
    fn failed_setup_stops_quietly() {
        let mut heaps = Heaps {
            fail_init: true,
            ..Heaps::default()
        };
        let regions = [
            KRegion {
                heap: 1,
                region: MemRegion::new(0x6000_0000, 0x10),
            },
            KRegion {
                heap: 0,
                region: RAM,
            },
        ];
        // Heap 0 is empty too, but the walk never reaches it.
        assert!(add_kregions(&mut heaps, &regions, 0, 0).is_ok());
        assert_eq!(heaps.sizes, [0, 0, 0]);
    }

    #[test]
    fn overlap_in_extra_region_propagates() {
        let mut heaps = Heaps {
            sizes: [1, 1, 1],
            ..Heaps::default()
        };
        let extra = KRegion {
            heap: 2,
            region: RAM,
        };
        assert!(matches!(
            add_kregions(&mut heaps, &[extra], RAM.start, RAM.end),
            Err(FatalError::KernelHeapOverlap { .. })
        ));
    }
}
