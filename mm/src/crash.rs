// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Delivers a [`CrashCode`] (`§6`): logs it, then halts this CPU.
//!
//! Every crate in this workspace only ever *produces* a [`CrashCode`]
//! or the [`MmError`] variants that are documented to escalate to one
//! (`§7`); calling this is the embedding kernel's job once it has
//! decided a condition is truly unrecoverable, typically after
//! [`physmem::allocate`] times out or a page-table invariant check
//! fails on a non-fault path.

use mm_types::CrashCode;

/// Logs `code` and halts this CPU forever.
///
/// Never returns. A multiprocessor kernel embedding this crate should
/// also notify its other CPUs before calling this, which is outside
/// this function's scope.
///
pub fn crash(code: CrashCode) -> ! {
    serial::println!("mm: fatal: {code}");
    loop {
        x86_64::instructions::hlt();
    }
}
