// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Physical and virtual address wrapper types.

use core::fmt;
use core::ops::{Add, Sub};

/// The width of the canonical address hole on a 4-level x86-64 page
/// table: bits 48 through 63 of a virtual address must all equal bit 47.
const SIGN_EXTEND_BIT: u64 = 47;

/// Returned when a raw integer does not encode a valid address for its
/// type (a non-canonical virtual address, or a physical address with
/// reserved high bits set).
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidAddress(pub u64);

/// A physical memory address.
///
/// Physical addresses are not necessarily canonical the way virtual
/// addresses are; the only constraint enforced here is that they fit in
/// the architecture's physical address width, which this port fixes at
/// 52 bits (the widest used by the x86-64 PTE format this design is
/// grounded on).
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct PhysAddr(u64);

const PHYS_ADDR_MASK: u64 = 0x000f_ffff_ffff_ffff;

impl PhysAddr {
    /// Wraps `addr`, truncating any bits beyond the architecture's
    /// physical address width.
    ///
    /// # Panics
    ///
    /// Panics if `addr` has bits set beyond the supported physical
    /// address width.
    ///
    pub fn new(addr: u64) -> Self {
        assert_eq!(
            addr & !PHYS_ADDR_MASK,
            0,
            "physical address {:#x} has bits set beyond the supported width",
            addr
        );
        PhysAddr(addr)
    }

    /// The null physical address.
    ///
    pub const fn zero() -> Self {
        PhysAddr(0)
    }

    /// Returns the address as a `u64`.
    ///
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns whether the address is aligned to `align`, which must be
    /// a power of two.
    ///
    pub fn is_aligned(self, align: u64) -> bool {
        align::is_aligned_usize(self.0 as usize, align as usize)
    }

    /// Rounds the address down to the nearest multiple of `align`.
    ///
    pub fn align_down(self, align: u64) -> Self {
        PhysAddr(align::align_down_u64(self.0, align))
    }

    /// Rounds the address up to the nearest multiple of `align`.
    ///
    pub fn align_up(self, align: u64) -> Self {
        PhysAddr(align::align_up_u64(self.0, align))
    }
}

impl fmt::Display for PhysAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl Add<u64> for PhysAddr {
    type Output = PhysAddr;
    fn add(self, rhs: u64) -> PhysAddr {
        PhysAddr::new(self.0 + rhs)
    }
}

impl Sub<u64> for PhysAddr {
    type Output = PhysAddr;
    fn sub(self, rhs: u64) -> PhysAddr {
        PhysAddr::new(self.0 - rhs)
    }
}

impl Sub<PhysAddr> for PhysAddr {
    type Output = u64;
    fn sub(self, rhs: PhysAddr) -> u64 {
        self.0 - rhs.0
    }
}

/// A virtual memory address.
///
/// Virtual addresses on a 4-level x86-64 page table must be canonical:
/// bits 48-63 are a sign extension of bit 47. [`VirtAddr::try_new`]
/// enforces this; [`VirtAddr::new`] panics on violation.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct VirtAddr(u64);

impl VirtAddr {
    /// Wraps `addr` if it is canonical, or returns [`InvalidAddress`].
    ///
    pub fn try_new(addr: u64) -> Result<Self, InvalidAddress> {
        let top = addr >> SIGN_EXTEND_BIT;
        if top == 0 || top == (u64::MAX >> SIGN_EXTEND_BIT) {
            Ok(VirtAddr(addr))
        } else {
            Err(InvalidAddress(addr))
        }
    }

    /// Wraps `addr`, which must be canonical.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not a canonical virtual address.
    ///
    pub fn new(addr: u64) -> Self {
        Self::try_new(addr).expect("non-canonical virtual address")
    }

    /// The null virtual address.
    ///
    pub const fn zero() -> Self {
        VirtAddr(0)
    }

    /// Wraps `addr` without checking canonicality, for use in `const`
    /// contexts such as layout constants where the literal's
    /// canonicality is checked separately by a unit test.
    ///
    /// # Safety
    ///
    /// `addr` must be a canonical virtual address.
    ///
    pub const unsafe fn new_unchecked(addr: u64) -> Self {
        VirtAddr(addr)
    }

    /// Returns the address as a `u64`.
    ///
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the address as a `usize`.
    ///
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Returns whether the address is aligned to `align`, which must be
    /// a power of two.
    ///
    pub fn is_aligned(self, align: u64) -> bool {
        align::is_aligned_usize(self.0 as usize, align as usize)
    }

    /// Rounds the address down to the nearest multiple of `align`.
    ///
    pub fn align_down(self, align: u64) -> Self {
        VirtAddr(align::align_down_u64(self.0, align))
    }

    /// Rounds the address up to the nearest multiple of `align`.
    ///
    pub fn align_up(self, align: u64) -> Self {
        VirtAddr::new(align::align_up_u64(self.0, align))
    }

    /// Returns the 9-bit index into the page table at `level`, where
    /// level 4 is the top of the hierarchy (PML4) and level 1 is the
    /// leaf table.
    ///
    /// # Panics
    ///
    /// Panics if `level` is not in `1..=4`.
    ///
    pub fn page_table_index(self, level: u8) -> u16 {
        assert!((1..=4).contains(&level), "page table level out of range");
        ((self.0 >> (12 + (u64::from(level) - 1) * 9)) & 0o777) as u16
    }

    /// Returns the byte offset within the containing 4 KiB page.
    ///
    pub fn page_offset(self) -> u64 {
        self.0 & 0xfff
    }
}

impl fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

impl Add<u64> for VirtAddr {
    type Output = VirtAddr;
    fn add(self, rhs: u64) -> VirtAddr {
        VirtAddr::new(self.0.wrapping_add(rhs))
    }
}

impl Sub<u64> for VirtAddr {
    type Output = VirtAddr;
    fn sub(self, rhs: u64) -> VirtAddr {
        VirtAddr::new(self.0.wrapping_sub(rhs))
    }
}

impl Sub<VirtAddr> for VirtAddr {
    type Output = u64;
    fn sub(self, rhs: VirtAddr) -> u64 {
        self.0 - rhs.0
    }
}
