// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The kernel directory: the single authoritative set of top-level
//! entries for kernel VA space (`§4.2`, "Kernel-directory sync").
//!
//! Every per-process root copies kernel-half entries from here lazily,
//! on demand, rather than eagerly at every address-space creation — a
//! PML4 entry installed in the kernel directory after a process's root
//! already exists (e.g. a late `ensure_tables` call for a newly mapped
//! kernel region) would otherwise never reach that process.

use memlayout::KERNELSPACE;
use mm_types::{PhysAddr, VirtAddr};
use spin::Once;

use crate::table::PageTable;

static KERNEL_DIRECTORY: Once<PhysAddr> = Once::new();

/// Records `root` as the authoritative kernel directory. Idempotent:
/// later calls are ignored once the first has taken effect.
///
pub fn init_kernel_directory(root: PhysAddr) {
    KERNEL_DIRECTORY.call_once(|| root);
    serial::println!("pagetable: kernel directory at {}", root);
}

/// Returns the authoritative kernel directory's root address.
///
/// # Panics
///
/// Panics if [`init_kernel_directory`] has not yet been called.
///
pub fn kernel_directory() -> PhysAddr {
    *KERNEL_DIRECTORY.get().expect("kernel directory not initialized")
}

/// Returns whether `va` falls in the globally shared kernel half of the
/// address space (invariant 4, `§3`).
///
pub fn is_kernel_va(va: VirtAddr) -> bool {
    va >= KERNELSPACE.start()
}

/// Copies the kernel directory's top-level entry covering `va` into
/// `root`'s top-level table, if `root` is missing it but the kernel
/// directory already has it.
///
/// A no-op for user VAs, for `root` itself being the kernel directory,
/// and before [`init_kernel_directory`] has run (early boot builds the
/// kernel directory's own entries directly).
///
pub fn sync_kernel_entry(root: PhysAddr, va: VirtAddr) {
    if !is_kernel_va(va) {
        return;
    }
    let kernel_root = match KERNEL_DIRECTORY.get() {
        Some(root) => *root,
        None => return,
    };
    if kernel_root == root {
        return;
    }

    let index = va.page_table_index(4);
    let process_table = unsafe { PageTable::at(root) };
    if process_table[index].is_present() {
        return;
    }

    let kernel_table = unsafe { PageTable::at(kernel_root) };
    let kernel_entry = kernel_table[index];
    if kernel_entry.is_present() {
        process_table[index] = kernel_entry;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_types::PageTableFlags;

    #[repr(align(4096))]
    struct AlignedBacking([u8; 4096]);

    fn backing_table() -> (AlignedBacking, PhysAddr) {
        let backing = AlignedBacking([0u8; 4096]);
        let addr = PhysAddr::new(backing.0.as_ptr() as u64);
        (backing, addr)
    }

    #[test]
    fn non_kernel_va_is_not_kernel() {
        assert!(!is_kernel_va(VirtAddr::new(0x1000)));
        assert!(is_kernel_va(KERNELSPACE.start()));
    }

    #[test]
    fn sync_skips_user_va_and_uninitialized_directory() {
        let (mut backing, addr) = backing_table();
        let table = unsafe { &mut *(backing.0.as_mut_ptr() as *mut PageTable) };
        table.zero();
        // No kernel directory has been installed for this isolated test
        // (a prior test in the same binary may have installed one via
        // `init_kernel_directory`, which is a process-wide `Once`), so
        // this only checks the user-VA short-circuit, which always
        // applies regardless of that global state.
        sync_kernel_entry(addr, VirtAddr::new(0x2000));
        assert!(!table[0].is_present());
    }
}
