// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The memory manager's boot entry point: wires together every
//! subsystem crate in this workspace once the platform has handed off
//! a boot memory map and a kernel page-table root.
//!
//! - [`physmem`] — the Frame Database and physical allocator
//! - [`pressure`] — the allocation-pressure monitor `physmem` drives
//! - [`pagetable`] — the page-table engine and kernel-directory sync
//! - [`tlb`] — cross-processor TLB shootdown
//! - [`addrspace`] — per-process address spaces and fork/copy-on-write
//! - [`pager`] — the pager coordinator that backs pressure relief
//! - [`cacheflush`] — the cache-maintenance service for DMA and
//!   self-modifying code
//!
//! `physmem` and `tlb` reach the page-table engine and pager only
//! through the trait seams in [`physmem::hooks`] and [`tlb::hooks`], to
//! avoid a dependency cycle; this crate is where those seams are
//! finally closed, once every crate they'd otherwise depend on is
//! linked in.
//!
//! Wiring the interrupt controller's [`tlb::IpiSender`] is left to the
//! embedding kernel: it needs a driver this workspace does not own.
//! Until it is registered, [`tlb::shootdown`] still invalidates the
//! initiating CPU's own TLB and logs that no remote delivery happened.

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

mod crash;
mod probe;

pub use crash::crash;
pub use mm_types::{CrashCode, MmError};

// Re-exported so an embedding kernel can depend on this crate alone for
// the operations that sit above a single subsystem: forking an address
// space, flushing caches around DMA, and shooting down remote TLBs all
// need the hooks `init` just registered to behave correctly.
pub use addrspace::{fork_copy_on_write, AddressSpace, CowRegion};
pub use cacheflush::{flush_for_data_in, flush_for_data_io, flush_for_data_out, flush_instruction};
pub use tlb::{shootdown, ParticipationSet};

use mm_types::PhysAddr;
use physmem::{BootLimits, BootMemoryRegion};
use probe::KernelIdentityProbe;

static IDENTITY_PROBE: KernelIdentityProbe = KernelIdentityProbe;
static PAGER: pager::Coordinator = pager::Coordinator::new();

/// Brings up the Frame Database, the kernel directory, and every
/// cross-crate hook seam, in the order each one's own preconditions
/// require.
///
/// `kernel_root` is the page-table root the bootloader already built
/// for the kernel half of address space; `regions` and `limits` are the
/// platform's boot memory map (`§6` "Boot memory map"). Returns the
/// pager coordinator so the embedding kernel's scheduler can spawn a
/// thread that loops on [`pager::Coordinator::wait_for_request`] and
/// [`pager::Coordinator::run_cycle`].
///
/// # Panics
///
/// Panics if called more than once (propagated from
/// [`physmem::init`] and [`pagetable::init_kernel_directory`]).
///
pub fn init(kernel_root: PhysAddr, regions: &[BootMemoryRegion], limits: BootLimits) -> &'static pager::Coordinator {
    pagetable::init_kernel_directory(kernel_root);
    physmem::init(regions, limits);
    physmem::register_identity_probe(&IDENTITY_PROBE);
    physmem::register_pager_wait_handle(&PAGER);
    serial::println!("mm: frame database, kernel directory, and pager hooks are live");
    &PAGER
}

/// Returns the pager coordinator [`init`] registered, for callers that
/// dropped the return value (e.g. re-fetching it in a different module
/// of the embedding kernel).
///
pub fn pager_coordinator() -> &'static pager::Coordinator {
    &PAGER
}
