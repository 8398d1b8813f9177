// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Page-table-entry flags.
//!
//! Bit positions follow the x86-64 PTE layout, the concrete encoding
//! every target this design is grounded on uses.

use bitflags::bitflags;

bitflags! {
    /// Flags carried by a page-table entry.
    ///
    /// `CACHE_DISABLED` and `WRITE_THROUGH` together are a rejected
    /// combination on every operation that installs or changes flags;
    /// see [`PageTableFlags::is_valid_combination`].
    ///
    pub struct PageTableFlags: u64 {
        /// The entry is present; the frame index field is meaningful.
        const PRESENT        = 1 << 0;
        /// Writes through this mapping are permitted.
        const WRITABLE        = 1 << 1;
        /// User-mode accesses through this mapping are permitted.
        const USER_ACCESSIBLE = 1 << 2;
        /// Writes bypass the cache and go straight to memory.
        const WRITE_THROUGH   = 1 << 3;
        /// The mapping is not cached.
        const CACHE_DISABLED  = 1 << 4;
        /// Set by hardware when the page is read or written.
        const ACCESSED        = 1 << 5;
        /// Set by hardware when the page is written.
        const DIRTY           = 1 << 6;
        /// The entry maps a large page rather than pointing at the next
        /// table level.
        const HUGE_PAGE       = 1 << 7;
        /// The mapping is not flushed from the TLB on an address-space
        /// switch. Only valid for kernel mappings.
        const GLOBAL          = 1 << 8;
        /// The mapping may not be fetched as an instruction.
        const NO_EXECUTE      = 1 << 63;
    }
}

impl PageTableFlags {
    /// Flags for a present, writable, kernel-global, non-executable
    /// mapping: the common case for kernel heap and stack pages.
    ///
    pub fn kernel_data() -> Self {
        PageTableFlags::PRESENT
            | PageTableFlags::WRITABLE
            | PageTableFlags::GLOBAL
            | PageTableFlags::NO_EXECUTE
    }

    /// Flags for a present, executable, kernel-global, read-only
    /// mapping: the common case for kernel code pages.
    ///
    pub fn kernel_code() -> Self {
        PageTableFlags::PRESENT | PageTableFlags::GLOBAL
    }

    /// Flags for a present, writable, user-accessible, non-executable
    /// mapping: the common case for anonymous user memory.
    ///
    pub fn user_data() -> Self {
        PageTableFlags::PRESENT
            | PageTableFlags::WRITABLE
            | PageTableFlags::USER_ACCESSIBLE
            | PageTableFlags::NO_EXECUTE
    }

    /// Returns whether this flag combination is acceptable to install.
    ///
    /// `CACHE_DISABLED | WRITE_THROUGH` is rejected: the two specify
    /// contradictory caching policies for the same mapping.
    ///
    pub fn is_valid_combination(self) -> bool {
        !(self.contains(PageTableFlags::CACHE_DISABLED)
            && self.contains(PageTableFlags::WRITE_THROUGH))
    }

    /// Returns whether a transition from `self` (old flags) to `new`
    /// reduces the mapping's reach in a way that requires a TLB
    /// invalidation: present-to-absent, or writable-to-read-only.
    ///
    /// Transitions that only extend reach (absent-to-present,
    /// read-only-to-writable) never need one (`§4.5`).
    ///
    pub fn requires_invalidate(self, new: PageTableFlags) -> bool {
        let was_present = self.contains(PageTableFlags::PRESENT);
        let now_present = new.contains(PageTableFlags::PRESENT);
        if was_present && !now_present {
            return true;
        }
        if !was_present {
            return false;
        }
        let was_writable = self.contains(PageTableFlags::WRITABLE);
        let now_writable = new.contains(PageTableFlags::WRITABLE);
        was_writable && !now_writable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_cache_disabled_and_write_through() {
        let flags = PageTableFlags::CACHE_DISABLED | PageTableFlags::WRITE_THROUGH;
        assert!(!flags.is_valid_combination());
    }

    #[test]
    fn invalidate_only_on_reach_reduction() {
        let rw = PageTableFlags::PRESENT | PageTableFlags::WRITABLE;
        let ro = PageTableFlags::PRESENT;
        let absent = PageTableFlags::empty();

        assert!(rw.requires_invalidate(ro));
        assert!(rw.requires_invalidate(absent));
        assert!(!ro.requires_invalidate(rw));
        assert!(!absent.requires_invalidate(rw));
    }
}
