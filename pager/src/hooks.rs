// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The backing-store delivery seam (`§4.6`).
//!
//! Writing a frame's contents out to disk (or wherever a section's
//! backing store lives) is an I/O-subsystem concern this crate has no
//! driver for; the top-level boot entry wires a concrete
//! [`BackingStore`] in once that subsystem is up, the same way
//! `physmem`'s [`physmem::IdentityMapProbe`] and
//! [`physmem::PagerWaitHandle`] are wired in.

use mm_types::{MmError, PhysAddr};

/// Writes one frame's contents to the backing store a paged section
/// uses.
///
pub trait BackingStore: Sync {
    /// Writes the frame at `frame` to `section_id` at `offset_in_section`.
    ///
    /// Blocks the calling (pager) thread until the write completes or
    /// fails; `§5` "Suspension points" documents this as the pager's one
    /// blocking I/O call.
    ///
    /// # Errors
    ///
    /// Any error the backing store reports. The pager retries the frame
    /// on its next selection pass rather than treating a single failure
    /// as fatal.
    fn write_page(&self, section_id: u64, offset_in_section: u64, frame: PhysAddr) -> Result<(), MmError>;
}

/// A backing store that always fails, for hosts with no I/O subsystem
/// wired in yet (early boot, unit tests).
///
pub struct NoBackingStore;

impl BackingStore for NoBackingStore {
    fn write_page(&self, _section_id: u64, _offset_in_section: u64, _frame: PhysAddr) -> Result<(), MmError> {
        Err(MmError::PreconditionFailed)
    }
}
