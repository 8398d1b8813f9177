// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The pager coordinator's state and its one cycle of work (`§4.6`).
//!
//! This crate has no thread of its own to dedicate — spawning and
//! parking a kernel thread is the scheduler's concern, outside this
//! pack — so the "dedicated thread that sleeps on a request event" is
//! split in two: [`Coordinator`] is the event/target bookkeeping
//! [`physmem::PagerWaitHandle`] needs, callable from any context; the
//! host that does own a real thread calls [`Coordinator::run_cycle`] in
//! a loop, parking between cycles on [`Coordinator::wait_for_request`]
//! the same way the request side of `§4.6` describes.

use core::hint;
use core::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use physmem::PagerWaitHandle;

use crate::hooks::BackingStore;

/// How many frames the pager frees before signaling progress (`§4.6`).
pub const PROGRESS_BATCH: usize = 16;

/// How many consecutive backing-store write failures the pager
/// tolerates before giving up on the current cycle and signaling
/// progress anyway (`§4.6`, "Gives up after a bounded number of
/// consecutive I/O failures").
pub const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Spin iterations [`Coordinator::wait_for_progress`] treats as roughly
/// one millisecond. This crate has no clock source of its own; a host
/// with a real timer should prefer driving `run_cycle` directly over
/// leaning on this approximation for anything latency-sensitive.
const SPINS_PER_MS: u64 = 2_000;

/// Summarizes what one call to [`Coordinator::run_cycle`] did, mostly
/// for logging and tests.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    pub freed: usize,
    pub failed: usize,
    pub gave_up: bool,
}

/// The coordinator's event/target state: a generation counter bumped on
/// every request and every progress signal, plus the outstanding free
/// target a request raised.
///
pub struct Coordinator {
    target: AtomicUsize,
    request_generation: AtomicU64,
    progress_generation: AtomicU64,
}

impl Coordinator {
    pub const fn new() -> Self {
        Coordinator {
            target: AtomicUsize::new(0),
            request_generation: AtomicU64::new(0),
            progress_generation: AtomicU64::new(0),
        }
    }

    /// Returns the request generation, for a host thread's sleep loop:
    /// block until this changes, then call [`Self::run_cycle`].
    pub fn request_generation(&self) -> u64 {
        self.request_generation.load(Ordering::Acquire)
    }

    /// Busy-waits until the request generation advances past `since` or
    /// `max_spins` elapses, for hosts with no real parking primitive
    /// wired in yet. Returns whether a request was observed.
    pub fn wait_for_request(&self, since: u64, max_spins: u64) -> bool {
        for _ in 0..max_spins {
            if self.request_generation() != since {
                return true;
            }
            hint::spin_loop();
        }
        false
    }

    fn signal_progress(&self) {
        self.progress_generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Runs one selection-and-writeback pass: repeatedly selects a
    /// pageable frame, writes it out, and frees it on success, until the
    /// outstanding target is met, no frame remains eligible, or
    /// [`MAX_CONSECUTIVE_FAILURES`] writes fail in a row.
    ///
    /// Signals progress after every [`PROGRESS_BATCH`] frames freed and,
    /// unconditionally, when the cycle gives up on failures — so a
    /// blocked allocator always eventually re-checks rather than
    /// hanging on a cycle that stalled.
    pub fn run_cycle(&self, store: &dyn BackingStore) -> CycleReport {
        let target = self.target.swap(0, Ordering::AcqRel);
        let mut report = CycleReport::default();
        let mut consecutive_failures = 0u32;

        while report.freed < target {
            let (addr, descriptor) = match physmem::select_pageable() {
                Some(selected) => selected,
                None => break,
            };

            match store.write_page(descriptor.section_id, descriptor.offset_in_section, addr) {
                Ok(()) => {
                    let _ = physmem::complete_pageout(addr, true);
                    report.freed += 1;
                    consecutive_failures = 0;
                    if report.freed % PROGRESS_BATCH == 0 {
                        self.signal_progress();
                    }
                }
                Err(err) => {
                    let _ = physmem::complete_pageout(addr, false);
                    report.failed += 1;
                    consecutive_failures += 1;
                    serial::println!(
                        "pager: write-back for section {} offset {} failed: {}",
                        descriptor.section_id,
                        descriptor.offset_in_section,
                        err
                    );
                    if consecutive_failures >= MAX_CONSECUTIVE_FAILURES {
                        report.gave_up = true;
                        break;
                    }
                }
            }
        }

        if report.gave_up {
            self.signal_progress();
        }
        report
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl PagerWaitHandle for Coordinator {
    fn request_frames(&self, target: usize) {
        self.target.fetch_max(target, Ordering::AcqRel);
        self.request_generation.fetch_add(1, Ordering::AcqRel);
    }

    fn wait_for_progress(&self, timeout_ms: u64) -> bool {
        let since = self.progress_generation.load(Ordering::Acquire);
        let max_spins = timeout_ms.saturating_mul(SPINS_PER_MS).max(1);
        for _ in 0..max_spins {
            if self.progress_generation.load(Ordering::Acquire) != since {
                return true;
            }
            hint::spin_loop();
        }
        false
    }
}
