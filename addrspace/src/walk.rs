// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Directory-subtree walks over an address space's user half: counting
//! leaf tables, enumerating the VA each one covers, and freeing the
//! whole subtree. Shared by [`crate::space`]'s `destroy`/`teardown` and
//! [`crate::fork`]'s `preallocate_tables`.
//!
//! The page-table engine exposes `map`/`unmap`/`translate` at PTE
//! granularity; nothing in that contract needs to walk whole
//! directories, so this crate grounds its own walk on the same
//! index-by-index style `pagetable::engine` uses internally, reading
//! tables through [`pagetable::PageTable::at`].

extern crate alloc;

use alloc::vec::Vec;
use mm_types::{MmError, PhysAddr, PhysFrame, PhysFrameAllocator, PhysFrameDeallocator, PhysFrameSize, VirtAddr};
use pagetable::{PageTable, ENTRIES};

/// The number of top-level (PML4) entries given to user space on a
/// canonical 48-bit split: indices below this are `USERSPACE`, at or
/// above it are `KERNELSPACE` (`memlayout`).
///
const USER_PML4_COUNT: u16 = 256;

/// The top-level index range [`crate::space::AddressSpace::create`]
/// copies from the kernel directory.
///
pub const KERNEL_PML4_RANGE: core::ops::Range<u16> = USER_PML4_COUNT..(ENTRIES as u16);

/// The span of virtual address one leaf (L1) table covers: 2 MiB.
///
fn leaf_span() -> u64 {
    mm_types::PAGE_SIZE << 9
}

/// Returns the number of present leaf tables reachable from `root`'s
/// user half, for `destroy`'s "leaf-table count is zero" assertion.
///
pub fn count_user_leaf_tables(root: PhysAddr) -> usize {
    let mut count = 0;
    for_each_leaf_table(root, |_va| count += 1);
    count
}

/// Returns the starting VA of every present leaf table reachable from
/// `root`'s user half.
///
fn leaf_table_spans(root: PhysAddr) -> Vec<VirtAddr> {
    let mut spans = Vec::new();
    for_each_leaf_table(root, |va| spans.push(va));
    spans
}

/// Walks every present L1 (leaf) table pointer under `root`'s user half,
/// invoking `f` with the VA it starts at.
///
fn for_each_leaf_table(root: PhysAddr, mut f: impl FnMut(VirtAddr)) {
    let l4 = unsafe { PageTable::at(root) };
    for i4 in 0..USER_PML4_COUNT {
        let e4 = l4[i4];
        if !e4.is_present() {
            continue;
        }
        let l3 = unsafe { PageTable::at(e4.addr()) };
        for i3 in 0..ENTRIES as u16 {
            let e3 = l3[i3];
            if !e3.is_present() {
                continue;
            }
            let l2 = unsafe { PageTable::at(e3.addr()) };
            for i2 in 0..ENTRIES as u16 {
                if l2[i2].is_present() {
                    let addr = (u64::from(i4) << 39) | (u64::from(i3) << 30) | (u64::from(i2) << 21);
                    f(VirtAddr::new(addr));
                }
            }
        }
    }
}

fn free_table_frame(addr: PhysAddr, deallocator: &mut dyn PhysFrameDeallocator) {
    if let Ok(frame) = PhysFrame::from_start_address(addr, PhysFrameSize::Size4KiB) {
        unsafe { deallocator.deallocate_phys_frame(frame) };
    }
}

/// Frees every table in `root`'s user-half subtree — leaf tables, their
/// parent L2 and L3 directories — and zeros the top-level entry that
/// pointed at each freed subtree. The kernel half is untouched.
///
/// This frees table frames only; it does not free the physical pages a
/// leaf entry happens to point at, which remain the section/image
/// owner's responsibility to reclaim before calling this.
///
pub fn free_user_tables(root: PhysAddr, deallocator: &mut dyn PhysFrameDeallocator) {
    let l4 = unsafe { PageTable::at(root) };
    for i4 in 0..USER_PML4_COUNT {
        let e4 = l4[i4];
        if !e4.is_present() {
            continue;
        }
        let l3_addr = e4.addr();
        let l3 = unsafe { PageTable::at(l3_addr) };
        for i3 in 0..ENTRIES as u16 {
            let e3 = l3[i3];
            if !e3.is_present() {
                continue;
            }
            let l2_addr = e3.addr();
            let l2 = unsafe { PageTable::at(l2_addr) };
            for i2 in 0..ENTRIES as u16 {
                let e2 = l2[i2];
                if e2.is_present() {
                    free_table_frame(e2.addr(), deallocator);
                }
            }
            free_table_frame(l2_addr, deallocator);
        }
        free_table_frame(l3_addr, deallocator);
        l4[i4].clear();
    }
}

/// Pre-allocates one leaf table in `dst_root` for every leaf table
/// present in `src_root`'s user half (`§4.3`, `preallocate_tables`).
///
/// Must succeed in full or fully roll back: `dst_root` is assumed to be
/// a freshly created space whose user half `preallocate_tables` is the
/// first thing to populate, so on failure every table this call
/// installed is simply the whole of `dst_root`'s user half, and rolling
/// back means freeing all of it.
///
pub fn preallocate_tables(
    src_root: PhysAddr,
    dst_root: PhysAddr,
    allocator: &mut dyn PhysFrameAllocator,
    deallocator: &mut dyn PhysFrameDeallocator,
) -> Result<(), MmError> {
    for va in leaf_table_spans(src_root) {
        if let Err(err) = pagetable::ensure_tables(dst_root, va, leaf_span(), allocator) {
            free_user_tables(dst_root, deallocator);
            return Err(err);
        }
    }
    Ok(())
}
