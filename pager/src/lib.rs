// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The Pager Coordinator (`§4.6`): selects victim frames via
//! [`physmem::select_pageable`]'s round-robin search, writes them out
//! through a [`BackingStore`], and frees them on success. Registers
//! itself as [`physmem`]'s [`physmem::PagerWaitHandle`] so
//! [`physmem::allocate`] can raise a target and block on progress.
//!
//! Descriptor migration (`§4.6`, "Descriptor migration") lives entirely
//! in [`physmem::migrate_section`]; it is serialized against selection
//! by the same physical lock both operations take, so this crate has
//! nothing further to add for it.

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

mod coordinator;
mod hooks;

pub use coordinator::{Coordinator, CycleReport, MAX_CONSECUTIVE_FAILURES, PROGRESS_BATCH};
pub use hooks::{BackingStore, NoBackingStore};
