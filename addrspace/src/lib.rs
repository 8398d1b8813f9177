// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The Address-Space Manager and Fork/Copy-on-Write protocol (`§4.3`,
//! `§4.4`): owns one process's root page table, publishes it to a CPU's
//! translation base register, and orchestrates cloning a parent's user
//! mappings into a child read-only.
//!
//! Built on [`pagetable`] for the per-PTE mechanism and [`tlb`] for the
//! cross-processor shootdown that must follow a fork; this crate adds
//! only the directory-subtree bookkeeping (counting and freeing whole
//! leaf-table subtrees) that neither of those lower layers needs for
//! their own contracts.

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

mod fork;
mod space;
mod walk;

pub use fork::{fork_copy_on_write, CowRegion};
pub use space::AddressSpace;
pub use walk::{count_user_leaf_tables, preallocate_tables};
