// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The Pressure Monitor (`§4.7`).
//!
//! Tracks the fraction of physical frames allocated and signals
//! subscribers whenever that fraction crosses a hysteresis threshold.
//! The allocator ([`physmem`](../physmem/index.html)) calls
//! [`PressureMonitor::record`] on a sampled subset of its
//! allocate/free operations; the pager
//! ([`pager`](../pager/index.html)) and any other subscriber call
//! [`PressureMonitor::level`] or wait on a generation change.

#![no_std]
#![deny(clippy::float_arithmetic)]
#![deny(unused_crate_dependencies)]

use core::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use spin::Mutex;

/// The pressure level, with amber and red thresholds (`§4.7`).
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PressureLevel {
    /// Fewer than 87% of frames allocated (or falling back below it
    /// having been above).
    None = 0,
    /// Between the level-2 entry (90%) and exit (87%) thresholds, or
    /// between level-1's exit and level-2's entry on the way down.
    Level2 = 1,
    /// At or above the level-1 entry threshold (97%).
    Level1 = 2,
}

impl PressureLevel {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => PressureLevel::None,
            1 => PressureLevel::Level2,
            _ => PressureLevel::Level1,
        }
    }
}

/// Entry/exit thresholds as percentages of total frames, expressed as
/// (numerator, denominator) to avoid floating point (`clippy::float_arithmetic`
/// is denied throughout this codebase).
///
const LEVEL2_ENTRY_PCT: u64 = 90;
const LEVEL2_EXIT_PCT: u64 = 87;
const LEVEL1_ENTRY_PCT: u64 = 97;
const LEVEL1_EXIT_PCT: u64 = 95;

/// Tracks allocation pressure across the whole frame pool and exposes a
/// broadcast-style generation counter subscribers can poll.
///
pub struct PressureMonitor {
    total_frames: AtomicU64,
    level: AtomicU8,
    generation: AtomicU64,
    /// Sampling mask: checks only run every `sample_mask + 1` calls to
    /// [`record`](PressureMonitor::record), where `sample_mask + 1` is
    /// one percent of `total_frames` rounded down to a power of two.
    /// This keeps the common allocate/free path cheap.
    sample_mask: AtomicU64,
    operations: AtomicU64,
    inner: Mutex<()>,
}

impl PressureMonitor {
    /// Creates a monitor with no total configured. Call
    /// [`PressureMonitor::configure`] once the Frame Database knows the
    /// total frame count at boot.
    ///
    pub const fn new() -> Self {
        PressureMonitor {
            total_frames: AtomicU64::new(0),
            level: AtomicU8::new(PressureLevel::None as u8),
            generation: AtomicU64::new(0),
            sample_mask: AtomicU64::new(0),
            operations: AtomicU64::new(0),
            inner: Mutex::new(()),
        }
    }

    /// Configures the monitor with the total frame count, computing the
    /// sampling mask as one percent of the total rounded down to a
    /// power of two (minimum of 1, so a system with too few frames to
    /// sample still checks on every call).
    ///
    pub fn configure(&self, total_frames: u64) {
        self.total_frames.store(total_frames, Ordering::SeqCst);
        let one_percent = (total_frames / 100).max(1);
        let pow2 = prev_power_of_two(one_percent);
        self.sample_mask.store(pow2 - 1, Ordering::SeqCst);
    }

    /// Returns the current pressure level.
    ///
    pub fn level(&self) -> PressureLevel {
        PressureLevel::from_u8(self.level.load(Ordering::SeqCst))
    }

    /// Returns the current generation counter, which increments on every
    /// level transition. Subscribers can compare a previously observed
    /// value against this one to detect a transition without missing
    /// one, even if they were not polling at the exact moment it fired.
    ///
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Records an allocate or free operation against `allocated_frames`
    /// out of the configured total. The hysteresis check only actually
    /// runs once every `sample_mask + 1` calls; every call still
    /// increments the operation counter so the sampling stays uniform.
    ///
    /// Returns the level transition, if one occurred on this call.
    ///
    pub fn record(&self, allocated_frames: u64) -> Option<PressureLevel> {
        let n = self.operations.fetch_add(1, Ordering::Relaxed);
        if n & self.sample_mask.load(Ordering::Relaxed) != 0 {
            return None;
        }

        self.check(allocated_frames)
    }

    /// Forces a hysteresis check regardless of the sampling mask. Used
    /// right after a pager free, where a transition must be observed
    /// promptly.
    ///
    pub fn check(&self, allocated_frames: u64) -> Option<PressureLevel> {
        let _guard = self.inner.lock();
        let total = self.total_frames.load(Ordering::SeqCst);
        if total == 0 {
            return None;
        }

        let current = self.level();
        let next = match current {
            PressureLevel::None => {
                if crosses_up(allocated_frames, total, LEVEL2_ENTRY_PCT) {
                    PressureLevel::Level2
                } else {
                    PressureLevel::None
                }
            }
            PressureLevel::Level2 => {
                if crosses_up(allocated_frames, total, LEVEL1_ENTRY_PCT) {
                    PressureLevel::Level1
                } else if !crosses_up(allocated_frames, total, LEVEL2_EXIT_PCT) {
                    PressureLevel::None
                } else {
                    PressureLevel::Level2
                }
            }
            PressureLevel::Level1 => {
                if !crosses_up(allocated_frames, total, LEVEL1_EXIT_PCT) {
                    if !crosses_up(allocated_frames, total, LEVEL2_EXIT_PCT) {
                        PressureLevel::None
                    } else {
                        PressureLevel::Level2
                    }
                } else {
                    PressureLevel::Level1
                }
            }
        };

        if next != current {
            self.level.store(next as u8, Ordering::SeqCst);
            self.generation.fetch_add(1, Ordering::SeqCst);
            serial::println!(
                "pressure: {:?} -> {:?} ({}/{} frames allocated)",
                current,
                next,
                allocated_frames,
                total
            );
            Some(next)
        } else {
            None
        }
    }
}

impl Default for PressureMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Returns whether `allocated / total * 100 >= pct`, without floating
/// point.
///
fn crosses_up(allocated: u64, total: u64, pct: u64) -> bool {
    allocated.saturating_mul(100) >= total.saturating_mul(pct)
}

/// Returns the largest power of two no greater than `value`. `value`
/// must be at least 1.
///
fn prev_power_of_two(value: u64) -> u64 {
    debug_assert!(value >= 1);
    1u64 << (63 - value.leading_zeros())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sampling_mask_is_one_percent_rounded_down() {
        let monitor = PressureMonitor::new();
        monitor.configure(1024);
        // 1% of 1024 is 10.24 -> floor to 10, rounded down to a power of
        // two is 8, so the mask should be 7 (skip 7 out of every 8 calls).
        assert_eq!(monitor.sample_mask.load(Ordering::SeqCst), 7);
    }

    #[test]
    fn hysteresis_transitions() {
        let monitor = PressureMonitor::new();
        monitor.configure(1000);

        assert_eq!(monitor.level(), PressureLevel::None);
        assert_eq!(monitor.check(899), None);
        assert_eq!(monitor.check(900), Some(PressureLevel::Level2));
        assert_eq!(monitor.level(), PressureLevel::Level2);

        // Dropping below entry (90%) but above exit (87%) stays at Level2.
        assert_eq!(monitor.check(880), None);
        assert_eq!(monitor.level(), PressureLevel::Level2);

        // Dropping below exit threshold returns to None.
        assert_eq!(monitor.check(860), Some(PressureLevel::None));

        // Rising straight past both thresholds goes to Level1.
        assert_eq!(monitor.check(970), Some(PressureLevel::Level2));
        assert_eq!(monitor.check(980), Some(PressureLevel::Level1));

        // Falling below Level1's exit but still above Level2's exit
        // settles at Level2, not None.
        assert_eq!(monitor.check(960), Some(PressureLevel::Level2));
    }

    #[test]
    fn generation_increments_only_on_transition() {
        let monitor = PressureMonitor::new();
        monitor.configure(1000);
        let g0 = monitor.generation();
        monitor.check(500);
        assert_eq!(monitor.generation(), g0);
        monitor.check(950);
        assert_eq!(monitor.generation(), g0 + 1);
    }
}
