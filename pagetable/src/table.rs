// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! A page table: 512 entries, reached through the all-physical-memory
//! mapping rather than a self-map slot (`§9`, "Self-map vs explicit
//! walk"). Every level of the hierarchy — directory and leaf alike —
//! uses this same layout: a 4-level hierarchy reduces to the same
//! invariants as a two-level one once the top two levels are treated as
//! one directory region.

use core::ops::{Index, IndexMut};
use memlayout::phys_to_virt_addr;
use mm_types::PhysAddr;

use crate::pte::Pte;

/// The number of entries in one page table, fixed by the architecture.
///
pub const ENTRIES: usize = 512;

/// One level of the page-table hierarchy.
///
#[repr(align(4096))]
pub struct PageTable {
    entries: [Pte; ENTRIES],
}

#[cfg(any(test, feature = "test-util"))]
use core::sync::atomic::{AtomicU64, Ordering};

/// Test-only override for the offset [`PageTable::at`] adds to a
/// physical address. Unset (`u64::MAX`) means "use the real
/// all-physical-memory mapping"; tests that back tables with ordinary
/// heap allocations set this to `0` so `at` resolves straight to the
/// allocation instead of requiring that mapping to be live.
///
#[cfg(any(test, feature = "test-util"))]
static TEST_OFFSET: AtomicU64 = AtomicU64::new(u64::MAX);

impl PageTable {
    /// Returns the table stored at `phys`, reached through the
    /// all-physical-memory mapping.
    ///
    /// # Safety
    ///
    /// `phys` must be the frame-aligned physical address of a table that
    /// is live for the duration the returned reference is used, and no
    /// other reference to the same table may be held concurrently in a
    /// way that violates aliasing rules.
    ///
    pub unsafe fn at(phys: PhysAddr) -> &'static mut PageTable {
        let virt = Self::resolve_virt(phys);
        &mut *(virt.as_usize() as *mut PageTable)
    }

    #[cfg(not(any(test, feature = "test-util")))]
    fn resolve_virt(phys: PhysAddr) -> mm_types::VirtAddr {
        phys_to_virt_addr(phys)
    }

    #[cfg(any(test, feature = "test-util"))]
    fn resolve_virt(phys: PhysAddr) -> mm_types::VirtAddr {
        match TEST_OFFSET.load(Ordering::Relaxed) {
            u64::MAX => phys_to_virt_addr(phys),
            offset => mm_types::VirtAddr::new(offset.wrapping_add(phys.as_u64())),
        }
    }

    /// Sets the offset [`at`](Self::at) uses for the remainder of this
    /// test binary's run. Idempotent across tests that all pass the same
    /// value, which is the only way this crate's tests use it.
    ///
    #[cfg(any(test, feature = "test-util"))]
    pub fn set_test_offset(offset: u64) {
        TEST_OFFSET.store(offset, Ordering::Relaxed);
    }

    /// Clears every entry in the table.
    ///
    pub fn zero(&mut self) {
        for entry in self.entries.iter_mut() {
            entry.clear();
        }
    }

    /// Iterates over the table's entries, in index order.
    ///
    pub fn iter(&self) -> impl Iterator<Item = &Pte> {
        self.entries.iter()
    }
}

impl Index<u16> for PageTable {
    type Output = Pte;

    fn index(&self, index: u16) -> &Pte {
        &self.entries[index as usize]
    }
}

impl IndexMut<u16> for PageTable {
    fn index_mut(&mut self, index: u16) -> &mut Pte {
        &mut self.entries[index as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[repr(align(4096))]
    struct AlignedBacking([u8; 4096]);

    #[test]
    fn zero_clears_every_entry() {
        let mut backing = AlignedBacking([0u8; 4096]);
        let table = unsafe { &mut *(backing.0.as_mut_ptr() as *mut PageTable) };
        table[3].set(PhysAddr::new(0x1000), mm_types::PageTableFlags::PRESENT);
        assert!(table[3].is_present());
        table.zero();
        for entry in table.iter() {
            assert!(!entry.is_present());
        }
    }
}
