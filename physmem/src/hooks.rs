// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Callback seams the allocator invokes without depending on the crates
//! that implement them.
//!
//! `allocate_identity` (`§4.1`) needs to know whether a kernel virtual
//! address is currently unmapped, which is a page-table-engine concern.
//! Blocking `allocate` on pressure (`§4.1` "Failure semantics") needs to
//! wake the pager and wait for its progress event, which is a pager
//! concern. Both `pagetable` and `pager` naturally want to depend on
//! `physmem` for frame allocation, so `physmem` cannot depend back on
//! them without a cycle. These traits let the top-level boot entry wire
//! concrete implementations in after every crate is linked.

/// Probes whether a kernel virtual address is free for an identity
/// mapping, for `allocate_identity`'s "Identity-mappable" search kind.
///
pub trait IdentityMapProbe: Sync {
    /// Returns whether the virtual address numerically equal to `phys`
    /// is currently unmapped in kernel space.
    fn kernel_va_unmapped(&self, phys: u64) -> bool;
}

/// The pager's wait/wake surface, as seen by the allocator.
///
/// `allocate` raises its free-frame target and signals the request side
/// when it observes pressure, then waits on the progress side; the
/// pager coordinator signals progress after every batch of freed frames
/// (`§4.6`).
///
pub trait PagerWaitHandle: Sync {
    /// Raises the pager's free-frame target and wakes it if asleep.
    fn request_frames(&self, target: usize);

    /// Blocks the caller until the pager reports progress or `timeout`
    /// expires, whichever comes first. Returns whether progress was
    /// observed.
    fn wait_for_progress(&self, timeout_ms: u64) -> bool;
}

/// A probe that always reports unmapped, for hosts with no page-table
/// engine wired in yet (early boot, unit tests).
///
pub struct AlwaysUnmapped;

impl IdentityMapProbe for AlwaysUnmapped {
    fn kernel_va_unmapped(&self, _phys: u64) -> bool {
        true
    }
}

/// A wait handle that reports immediate progress, for hosts with no
/// pager wired in yet (early boot, unit tests). Never blocks, so a
/// caller relying on it to actually wait will busy-loop until its own
/// timeout; production boot wires in the real pager before lifting this
/// restriction.
///
pub struct NoPager;

impl PagerWaitHandle for NoPager {
    fn request_frames(&self, _target: usize) {}

    fn wait_for_progress(&self, _timeout_ms: u64) -> bool {
        false
    }
}
