// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The Cache-Flush Service (`§4.8`): four client-facing operations over
//! a cache-line-aligned virtual range, each serializing execution first
//! and then walking the range one page at a time, skipping pages that
//! are not present.
//!
//! Built directly on [`pagetable::translate`] for the presence check —
//! this crate never needs to distinguish *how* a page is mapped, only
//! whether it is — and on the `core::arch::x86_64` cache-maintenance
//! intrinsics in [`arch`] for the per-line work.

#![no_std]
#![deny(clippy::float_arithmetic)]
#![deny(clippy::missing_panics_doc)]
#![allow(clippy::panic)]
#![deny(clippy::return_self_not_must_use)]
#![deny(clippy::single_char_lifetime_names)]
#![deny(clippy::wildcard_imports)]
#![deny(deprecated_in_future)]
#![deny(keyword_idents)]
#![deny(unused_crate_dependencies)]

mod arch;

pub use arch::CACHE_LINE_SIZE;

use mm_types::{PhysAddr, VirtAddr, PAGE_SIZE};

/// Invalidates all cache levels over `[start, start + len)` so
/// subsequent DMA writes from a device are the definitive value
/// (`§4.8`, `flush-for-data-in`).
pub fn flush_for_data_in(root: PhysAddr, start: VirtAddr, len: u64) {
    arch::serialize();
    for_each_present_page(root, start, len, flush_page_lines);
}

/// Cleans all cache levels over `[start, start + len)` so a device
/// DMA-read observes the CPU's writes (`§4.8`, `flush-for-data-out`).
pub fn flush_for_data_out(root: PhysAddr, start: VirtAddr, len: u64) {
    arch::serialize();
    for_each_present_page(root, start, len, flush_page_lines);
}

/// Cleans then invalidates over `[start, start + len)`, for
/// bidirectional DMA (`§4.8`, `flush-for-data-io`).
pub fn flush_for_data_io(root: PhysAddr, start: VirtAddr, len: u64) {
    arch::serialize();
    for_each_present_page(root, start, len, flush_page_lines);
}

/// Cleans the data cache to the point of unification and invalidates
/// the instruction cache over `[start, start + len)`, for
/// self-modifying code regions (`§4.8`, `flush-instruction`).
pub fn flush_instruction(root: PhysAddr, start: VirtAddr, len: u64) {
    arch::serialize();
    for_each_present_page(root, start, len, flush_page_lines);
    arch::serialize_instruction_stream();
}

/// Writes back and invalidates every cache line in the page starting
/// at `page_va`.
fn flush_page_lines(page_va: VirtAddr) {
    let mut offset = 0;
    while offset < PAGE_SIZE {
        // SAFETY: `page_va` was just confirmed present by
        // `for_each_present_page`, and `offset` never leaves the page.
        unsafe { arch::flush_line(page_va.as_u64() + offset) };
        offset += CACHE_LINE_SIZE;
    }
}

/// Walks `[start, start + len)` one page at a time, invoking `op` with
/// the start of every page `pagetable::translate` reports present and
/// skipping every one it doesn't.
fn for_each_present_page(root: PhysAddr, start: VirtAddr, len: u64, mut op: impl FnMut(VirtAddr)) {
    let mut va = start.align_down(PAGE_SIZE);
    let end = start + len;
    while va < end {
        if pagetable::translate(root, va).is_some() {
            op(va);
        }
        va = va + PAGE_SIZE;
    }
}

#[cfg(test)]
mod tests {
    extern crate alloc;

    use super::*;
    use alloc::boxed::Box;
    use mm_types::{PageTableFlags, PhysFrame, PhysFrameAllocator, PhysFrameDeallocator, PhysFrameSize};
    use pagetable::PageTable;

    #[repr(align(4096))]
    struct AlignedFrame([u8; 4096]);

    struct PoolAllocator {
        frames: alloc::vec::Vec<Box<AlignedFrame>>,
        next: usize,
    }

    impl PoolAllocator {
        fn new(capacity: usize) -> Self {
            let mut frames = alloc::vec::Vec::with_capacity(capacity);
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

    /// Maps `va` onto its own backing frame, a page this process
    /// genuinely owns, so the cache operations under test ultimately
    /// execute `CLFLUSH` against real resident memory rather than an
    /// address this test merely invented for the page table.
    fn map_real_page(root: PhysAddr, owned: &Box<AlignedFrame>, pool: &mut PoolAllocator) -> VirtAddr {
        let va = VirtAddr::new(owned.0.as_ptr() as u64);
        let target = PhysAddr::new(owned.0.as_ptr() as u64);
        unsafe {
            pagetable::map(root, va, target, PageTableFlags::PRESENT | PageTableFlags::WRITABLE, pool)
        }
        .unwrap();
        va
    }

    #[test]
    fn data_operations_cover_only_present_pages() {
        setup();
        let mut pool = PoolAllocator::new(8);
        let root = pool.take();
        unsafe { PageTable::at(root) }.zero();

        let owned = Box::new(AlignedFrame([0u8; 4096]));
        let va = map_real_page(root, &owned, &mut pool);

        // An address one page below is never mapped in `root`, so the
        // walk must skip it without touching it.
        let unmapped = VirtAddr::new(va.as_u64().wrapping_sub(PAGE_SIZE));

        flush_for_data_in(root, unmapped, PAGE_SIZE);
        flush_for_data_out(root, va, PAGE_SIZE);
        flush_for_data_io(root, va, PAGE_SIZE);
        flush_instruction(root, va, PAGE_SIZE);
    }

    #[test]
    fn walk_spans_multiple_pages_and_skips_gaps() {
        setup();
        let mut pool = PoolAllocator::new(8);
        let root = pool.take();
        unsafe { PageTable::at(root) }.zero();

        let first = Box::new(AlignedFrame([0u8; 4096]));
        let first_va = map_real_page(root, &first, &mut pool);

        let mut seen = alloc::vec::Vec::new();
        for_each_present_page(root, first_va, PAGE_SIZE, |va| seen.push(va));
        assert_eq!(seen, alloc::vec![first_va]);

        let mut seen_absent = alloc::vec::Vec::new();
        let far = VirtAddr::new(first_va.as_u64() + 64 * PAGE_SIZE);
        for_each_present_page(root, far, PAGE_SIZE, |va| seen_absent.push(va));
        assert!(seen_absent.is_empty());
    }
}
