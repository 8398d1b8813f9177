// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The Page-Table Engine (`§4.2`): installs, walks, and tears down the
//! virtual-to-physical mappings of a single address space's 4-level
//! hierarchy, plus the kernel-directory lazy-sync mechanism that keeps
//! every process's top-level table current with the shared kernel half
//! (`§3`, invariant 4).
//!
//! Tables are reached through the all-physical-memory mapping
//! [`memlayout::phys_to_virt_addr`] provides rather than a self-map or a
//! per-CPU scratch mapping (`§9`, "Self-map vs explicit walk"); a
//! self-map slot is still installed by [`install_self_map`] so the
//! layout [`memlayout`] documents is a real, observable mapping for any
//! collaborator built against it.
//!
//! This crate never depends on [`physmem`](../physmem/index.html)
//! directly: frame allocation and freeing go through
//! [`mm_types::PhysFrameAllocator`]/[`mm_types::PhysFrameDeallocator`],
//! which `physmem`'s allocator types implement.

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

mod engine;
pub mod kernel_dir;
mod pte;
mod table;

pub use engine::{
    change_access, copy_on_write_range, ensure_tables, install_self_map, map, translate,
    translate_foreign, unmap, CowStats, FlushRange, UnmapOptions, UnmapOutcome,
};
pub use kernel_dir::{init_kernel_directory, is_kernel_va, kernel_directory, sync_kernel_entry};
pub use pte::Pte;
pub use table::{PageTable, ENTRIES};
