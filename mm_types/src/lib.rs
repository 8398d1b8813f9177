// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Defines the core address, frame, and page types shared by every memory
//! manager component, plus the page-table-entry flag set and the error
//! taxonomy.
//!
//! None of the types here know how to allocate, map, or evict anything;
//! they exist so that [`physmem`](../physmem/index.html),
//! [`pagetable`](../pagetable/index.html), [`addrspace`](../addrspace/index.html),
//! and the rest of the stack speak the same vocabulary.

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

extern crate alloc;

mod addr;
mod error;
mod flags;
mod frame;
mod page;
mod state;
mod traits;

pub use addr::{InvalidAddress, PhysAddr, VirtAddr};
pub use error::{CrashCode, MmError};
pub use flags::PageTableFlags;
pub use frame::{PhysFrame, PhysFrameRange, PhysFrameSize};
pub use page::{VirtPage, VirtPageRange, VirtPageSize};
pub use state::{Frame, FrameState, PageCacheRef, PagingDescriptor, MAX_LOCK_COUNT};
pub use traits::{PhysFrameAllocator, PhysFrameDeallocator};

/// The page size used throughout the memory manager, in bytes.
///
/// This port fixes the base page size at 4 KiB, matching every concrete
/// x86-64 target this design is grounded on.
///
pub const PAGE_SIZE: u64 = 4096;

/// The base-2 logarithm of [`PAGE_SIZE`].
///
pub const PAGE_SHIFT: u32 = 12;

/// A physical address that is withheld from the general allocator pool.
///
/// The boot-time initializer reserves physical page zero so that a
/// frame index of zero can never be confused with "no frame" by a caller
/// that forgot to check an `Option`.
///
pub const RESERVED_ZERO_FRAME: u64 = 0;
