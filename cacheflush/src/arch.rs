// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The per-line and serializing primitives `§4.8`'s four operations are
//! built from.
//!
//! x86-64 has one cache-maintenance instruction usable without a
//! runtime feature probe — `CLFLUSH`, which writes back a dirty line
//! and invalidates it in the same step — so "clean" and "invalidate"
//! are the same primitive here; there is no architectural instruction
//! cache line invalidate at all, so [`flush_instruction`]'s icache step
//! is the serializing instruction the Intel SDM (`§8.1.3`) documents as
//! sufficient for self-modifying code to become visible to fetch.

use core::arch::x86_64::{__cpuid_count, _mm_clflush, _mm_mfence};

/// The width of one cache line on every x86-64 implementation this
/// port targets.
pub const CACHE_LINE_SIZE: u64 = 64;

/// Orders this CPU's prior stores and cache operations before whatever
/// follows — the "serializes execution" step every `§4.8` operation
/// starts with.
pub fn serialize() {
    // SAFETY: MFENCE takes no arguments and has no preconditions.
    unsafe { _mm_mfence() };
}

/// Writes back and invalidates the cache line containing `va`.
///
/// # Safety
///
/// `va` must be a valid linear address; the line need not be resident,
/// in which case this is a no-op.
pub unsafe fn flush_line(va: u64) {
    _mm_clflush(va as *const u8);
}

/// A fully serializing instruction, for flushing the instruction
/// pipeline after code has changed underfoot (`§4.8`,
/// `flush-instruction`'s "invalidate the instruction cache" step).
pub fn serialize_instruction_stream() {
    // SAFETY: CPUID leaf 0 always exists and has no preconditions; the
    // result is discarded, only the serializing side effect matters.
    unsafe {
        __cpuid_count(0, 0);
    }
}
