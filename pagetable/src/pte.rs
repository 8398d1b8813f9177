// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! A single page-table entry: a physical frame address plus the flags
//! from `§6`'s PTE bit layout, packed the way the x86-64 ABI this port
//! targets requires.

use mm_types::{PageTableFlags, PhysAddr, PhysFrame, PhysFrameSize};

/// Masks out the reserved bit 51 and every bit outside the supported
/// physical address width, leaving only the frame-aligned address bits.
///
const ADDR_MASK: u64 = 0x000f_ffff_ffff_f000;

/// One entry in a [`crate::table::PageTable`].
///
#[derive(Clone, Copy)]
#[repr(transparent)]
pub struct Pte(u64);

impl Pte {
    /// Returns a new, empty (not-present) entry.
    ///
    pub const fn empty() -> Self {
        Pte(0)
    }

    /// Clears the entry.
    ///
    pub fn clear(&mut self) {
        self.0 = 0;
    }

    /// Returns whether the entry is marked present.
    ///
    pub fn is_present(self) -> bool {
        self.flags().contains(PageTableFlags::PRESENT)
    }

    /// Returns the entry's flags.
    ///
    pub fn flags(self) -> PageTableFlags {
        PageTableFlags::from_bits_truncate(self.0)
    }

    /// Returns the physical address carried by this entry. The low 12
    /// bits are always zero.
    ///
    pub fn addr(self) -> PhysAddr {
        PhysAddr::new(self.0 & ADDR_MASK)
    }

    /// Returns the frame this entry points at, if it is present and its
    /// address is aligned to `size`.
    ///
    pub fn frame(self, size: PhysFrameSize) -> Option<PhysFrame> {
        if !self.is_present() {
            return None;
        }
        PhysFrame::from_start_address(self.addr(), size).ok()
    }

    /// Installs `addr` and `flags` together, replacing whatever the
    /// entry previously held.
    ///
    /// # Panics
    ///
    /// Panics (in debug builds) if `flags` carries the rejected
    /// `CACHE_DISABLED | WRITE_THROUGH` combination (`§4.2`).
    ///
    pub fn set(&mut self, addr: PhysAddr, flags: PageTableFlags) {
        debug_assert!(flags.is_valid_combination(), "rejected cache-disabled+write-through combination");
        self.0 = (addr.as_u64() & ADDR_MASK) | flags.bits();
    }

    /// Replaces the entry's flags, keeping its current address.
    ///
    pub fn set_flags(&mut self, flags: PageTableFlags) {
        self.0 = (self.0 & ADDR_MASK) | flags.bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_address_and_flags() {
        let mut entry = Pte::empty();
        assert!(!entry.is_present());

        let addr = PhysAddr::new(0x1234_5000);
        let flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE;
        entry.set(addr, flags);
        assert!(entry.is_present());
        assert_eq!(entry.addr(), addr);
        assert_eq!(entry.flags(), flags);
    }

    #[test]
    fn set_flags_preserves_address() {
        let mut entry = Pte::empty();
        let addr = PhysAddr::new(0x9000);
        entry.set(addr, PageTableFlags::PRESENT | PageTableFlags::WRITABLE);
        entry.set_flags(PageTableFlags::PRESENT);
        assert_eq!(entry.addr(), addr);
        assert!(!entry.flags().contains(PageTableFlags::WRITABLE));
    }

    #[test]
    fn clear_removes_presence() {
        let mut entry = Pte::empty();
        entry.set(PhysAddr::new(0x4000), PageTableFlags::PRESENT);
        entry.clear();
        assert!(!entry.is_present());
        assert_eq!(entry.addr(), PhysAddr::zero());
    }
}
