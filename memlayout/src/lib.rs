// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Constants describing the virtual memory layout.
//!
//! Each constant describes a [region of virtual memory](VirtAddrRange)
//! reserved for a prescribed purpose:
//!
//! - [`NULL_PAGE`]: reserved so null-pointer dereferences fault.
//! - [`USERSPACE`]: the lower half, private per address space.
//! - [`KERNELSPACE`]: the upper half, identical across every address
//!   space (invariant 4, `§3`).
//! - [`SELF_MAP`]: the directory slot that maps every page table at a
//!   fixed kernel VA (`§4.2`'s "self-map").
//! - [`PHYSICAL_MEMORY`]: all physical memory, mapped at one offset.
//!
//! | Region              |           Start address |            Last address |
//! | -------------------- | ----------------------: | ----------------------: |
//! | [`NULL_PAGE`]        |                   `0x0` |             `0x1f_ffff` |
//! | [`USERSPACE`]        |             `0x20_0000` |      `0x7fff_ffff_ffff` |
//! | [`KERNELSPACE`]      | `0xffff_8000_0000_0000` | `0xffff_ffff_ffff_ffff` |
//! | [`SELF_MAP`]         | `0xffff_ff80_0000_0000` | `0xffff_ff80_bfff_ffff` |
//! | [`PHYSICAL_MEMORY`]  | `0xffff_8000_8000_0000` | `0xffff_ffff_ffff_ffff` |

#![no_std]
#![deny(unused_crate_dependencies)]

mod addr_range;

pub use addr_range::VirtAddrRange;
use mm_types::{PhysAddr, VirtAddr};

/// The first virtual page, reserved so null-pointer dereferences fault.
///
pub const NULL_PAGE: VirtAddrRange = VirtAddrRange::new(VirtAddr::zero(), const_virt_addr(0x1f_ffff));

/// The lower half of virtual memory: private per address space.
///
pub const USERSPACE: VirtAddrRange =
    VirtAddrRange::new(const_virt_addr(0x20_0000), const_virt_addr(0x7fff_ffff_ffff));

/// The upper half of virtual memory: globally identical across every
/// address space (invariant 4, `§3`).
///
pub const KERNELSPACE: VirtAddrRange = VirtAddrRange::new(
    const_virt_addr(0xffff_8000_0000_0000),
    const_virt_addr(0xffff_ffff_ffff_ffff),
);

/// The kernel binary's mapping.
///
pub const KERNEL_BINARY: VirtAddrRange = VirtAddrRange::new(
    const_virt_addr(0xffff_8000_0000_0000),
    const_virt_addr(0xffff_8000_3fff_ffff),
);

/// The kernel heap.
///
pub const KERNEL_HEAP: VirtAddrRange = VirtAddrRange::new(
    const_virt_addr(0xffff_8000_4444_0000),
    const_virt_addr(0xffff_8000_444b_ffff),
);

/// The region used to map memory-mapped I/O device memory.
///
pub const MMIO_SPACE: VirtAddrRange = VirtAddrRange::new(
    const_virt_addr(0xffff_8000_6666_0000),
    const_virt_addr(0xffff_8000_6675_ffff),
);

/// The self-map region: one PML4 slot whose entries expose every page
/// table in the currently active address space at a fixed kernel VA.
/// The slot index is a compile-time constant, as required by `§4.2`.
///
pub const SELF_MAP_PML4_INDEX: u16 = 510;

/// The virtual address range covered by the self-map slot.
///
pub const SELF_MAP: VirtAddrRange = VirtAddrRange::new(
    const_virt_addr(0xffff_ff00_0000_0000),
    const_virt_addr(0xffff_ff7f_ffff_ffff),
);

/// All physical memory, mapped starting at [`PHYSICAL_MEMORY_OFFSET`].
///
pub const PHYSICAL_MEMORY: VirtAddrRange =
    VirtAddrRange::new(PHYSICAL_MEMORY_OFFSET, const_virt_addr(0xffff_ffff_ffff_ffff));

/// The offset at which all physical memory is mapped.
///
/// For any valid physical address, that address is reachable at the
/// same virtual address plus `PHYSICAL_MEMORY_OFFSET`.
///
pub const PHYSICAL_MEMORY_OFFSET: VirtAddr = const_virt_addr(0xffff_8000_8000_0000);

/// Returns the virtual address mapped to the given physical address via
/// the all-physical-memory mapping.
///
pub fn phys_to_virt_addr(phys: PhysAddr) -> VirtAddr {
    PHYSICAL_MEMORY_OFFSET + phys.as_u64()
}

/// A `const fn` wrapper around [`VirtAddr::new`] for use in constants.
///
/// `VirtAddr::new` cannot be `const` itself because it asserts
/// canonicality at runtime; every literal here is canonical by
/// construction, so the assertion is re-checked in a unit test instead.
///
const fn const_virt_addr(addr: u64) -> VirtAddr {
    // SAFETY: every caller in this module passes a canonical literal;
    // `test_layout_is_canonical` below checks this mechanically.
    unsafe { VirtAddr::new_unchecked(addr) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_is_canonical() {
        for region in [
            NULL_PAGE,
            USERSPACE,
            KERNELSPACE,
            KERNEL_BINARY,
            KERNEL_HEAP,
            MMIO_SPACE,
            SELF_MAP,
            PHYSICAL_MEMORY,
        ] {
            assert!(VirtAddr::try_new(region.start().as_u64()).is_ok());
            assert!(VirtAddr::try_new(region.end().as_u64()).is_ok());
        }
    }

    #[test]
    fn test_no_overlap() {
        let regions = [
            NULL_PAGE,
            USERSPACE,
            KERNEL_BINARY,
            KERNEL_HEAP,
            MMIO_SPACE,
            SELF_MAP,
        ];

        for (i, a) in regions.iter().enumerate() {
            for (j, b) in regions.iter().enumerate() {
                if i != j {
                    assert!(!a.overlaps(b), "{:?} overlaps {:?}", a, b);
                }
            }
        }
    }

    #[test]
    fn test_userspace_kernelspace_boundary() {
        assert!(USERSPACE.end().as_u64() < KERNELSPACE.start().as_u64());
    }

    #[test]
    fn test_phys_to_virt() {
        let virt = phys_to_virt_addr(PhysAddr::zero());
        assert_eq!(virt, PHYSICAL_MEMORY_OFFSET);
    }
}
