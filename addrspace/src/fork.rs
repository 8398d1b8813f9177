// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Fork / Copy-on-Write orchestration (`§4.4`), the hardest sub-protocol
//! in the design: preallocate the destination's leaf tables (where
//! allocation is legal), walk every section's PTEs read-only into both
//! spaces, then issue one deferred shootdown covering everything
//! touched.
//!
//! Steps 1 and 5 — acquiring and releasing the per-section locks that
//! make the walk below safe to run concurrently with faults elsewhere —
//! belong to the image-section manager, a layer above this crate; this
//! module implements steps 2 through 4 and assumes the caller already
//! holds those locks over every region it passes in.

extern crate alloc;

use mm_types::{MmError, PhysFrameAllocator, PhysFrameDeallocator, VirtAddr};
use pagetable::{CowStats, FlushRange};

use crate::space::AddressSpace;
use crate::walk;

/// A VA range within a section being cloned, already locked by the
/// caller for the duration of the fork.
///
#[derive(Debug, Clone, Copy)]
pub struct CowRegion {
    pub start: VirtAddr,
    pub size: u64,
}

/// Runs steps 2 through 4 of the fork protocol: preallocates `dst`'s
/// leaf tables over `src`'s user half, copies every region read-only
/// into both spaces, and issues the single deferred shootdown covering
/// every source range that lost its writable bit.
///
/// A failure preallocating tables aborts before touching any PTE, and
/// `dst` is left exactly as it was passed in (`§4.4` step 2). A failure
/// partway through copying a region is logged and does not stop the
/// remaining regions from being processed, nor the shootdown from being
/// issued afterward: `§4.4` makes steps 3 and 4 unconditional once
/// entered, since by then some source PTEs may already have lost their
/// writable bit and both parent and child need the shootdown regardless
/// of whether every region copied cleanly. The first such failure, if
/// any, is still returned to the caller once the shootdown has gone out.
///
pub fn fork_copy_on_write(
    src: &AddressSpace,
    dst: &AddressSpace,
    regions: &[CowRegion],
    allocator: &mut dyn PhysFrameAllocator,
    deallocator: &mut dyn PhysFrameDeallocator,
    initiator_cpu: usize,
) -> Result<CowStats, MmError> {
    walk::preallocate_tables(src.root(), dst.root(), allocator, deallocator)?;

    let mut total = CowStats::default();
    let mut flush = FlushRange::none();
    let mut first_error = None;

    for region in regions {
        match pagetable::copy_on_write_range(src.root(), dst.root(), region.start, region.size) {
            Ok((stats, region_flush)) => {
                total.resident_set_delta += stats.resident_set_delta;
                flush = flush.merge(region_flush);
            }
            Err(err) => {
                serial::println!(
                    "addrspace: copy-on-write failed for region {}..+{} (space {} -> {}): {}",
                    region.start,
                    region.size,
                    src.id(),
                    dst.id(),
                    err
                );
                first_error.get_or_insert(err);
            }
        }
    }

    tlb::shootdown(src.participants(), initiator_cpu, src.id(), flush);

    match first_error {
        Some(err) => Err(err),
        None => Ok(total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::vec::Vec;
    use mm_types::{PageTableFlags, PhysAddr, PhysFrame, PhysFrameSize};
    use pagetable::PageTable;

    #[repr(align(4096))]
    struct AlignedFrame([u8; 4096]);

    struct PoolAllocator {
        frames: Vec<Box<AlignedFrame>>,
        next: usize,
    }

    impl PoolAllocator {
        fn new(capacity: usize) -> Self {
            let mut frames = Vec::with_capacity(capacity);
            for _ in 0..capacity {
                frames.push(Box::new(AlignedFrame([0u8; 4096])));
            }
            PoolAllocator { frames, next: 0 }
        }

        fn take(&mut self) -> PhysAddr {
            let addr = PhysAddr::new(self.frames[self.next].0.as_ptr() as u64);
            self.next += 1;
            addr
        }
    }

    unsafe impl PhysFrameAllocator for PoolAllocator {
        fn allocate_phys_frame(&mut self) -> Option<PhysFrame> {
            if self.next >= self.frames.len() {
                return None;
            }
            let addr = self.take();
            Some(PhysFrame::from_start_address(addr, PhysFrameSize::Size4KiB).unwrap())
        }
    }

    struct NullDeallocator;
    impl PhysFrameDeallocator for NullDeallocator {
        unsafe fn deallocate_phys_frame(&mut self, _frame: PhysFrame) {}
    }

    fn setup() {
        PageTable::set_test_offset(0);
    }

    /// Idempotent across the test binary: only the first call's root
    /// becomes the kernel directory, which is fine here since this
    /// module's tests only ever inspect user VAs. Leaks a frame rather
    /// than drawing one from `pool`, since whichever call wins the race
    /// must outlive that caller's own pool.
    fn ensure_kernel_directory() {
        let leaked: &'static mut AlignedFrame = Box::leak(Box::new(AlignedFrame([0u8; 4096])));
        let candidate = PhysAddr::new(leaked.0.as_ptr() as u64);
        unsafe { PageTable::at(candidate) }.zero();
        pagetable::init_kernel_directory(candidate);
    }

    #[test]
    fn fork_copies_user_regions_and_shoots_down() {
        setup();
        let mut pool = PoolAllocator::new(32);
        ensure_kernel_directory();
        let src = AddressSpace::create(&mut pool).unwrap();
        let dst = AddressSpace::create(&mut pool).unwrap();

        let first = VirtAddr::new(0x20_0000);
        let second = VirtAddr::new(0x40_0000);
        for virt in [first, second] {
            let target = pool.take();
            unsafe {
                pagetable::map(
                    src.root(),
                    virt,
                    target,
                    PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE,
                    &mut pool,
                )
            }
            .unwrap();
        }

        src.participants().add(0);

        let regions = [
            CowRegion { start: first, size: mm_types::PAGE_SIZE },
            CowRegion { start: second, size: mm_types::PAGE_SIZE },
        ];
        let stats = fork_copy_on_write(&src, &dst, &regions, &mut pool, &mut NullDeallocator, 0).unwrap();
        assert_eq!(stats.resident_set_delta, 2);

        for virt in [first, second] {
            let (_, src_flags) = pagetable::translate(src.root(), virt).unwrap();
            assert!(!src_flags.contains(PageTableFlags::WRITABLE));
            let (dst_addr, dst_flags) = pagetable::translate(dst.root(), virt).unwrap();
            let (src_addr, _) = pagetable::translate(src.root(), virt).unwrap();
            assert_eq!(dst_addr, src_addr);
            assert!(!dst_flags.contains(PageTableFlags::WRITABLE));
        }
    }
}
