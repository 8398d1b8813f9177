// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The per-address-space participation set (`§4.5`, "Cross-processor
//! shootdown"): the CPUs that currently have an address space's root
//! loaded in their control register, and so are the only CPUs a
//! shootdown for that space needs to reach.

use alloc::vec::Vec;
use bitmap_index::Bitmap;
use spin::Mutex;

/// The largest CPU index this port tracks participation for.
///
pub const MAX_CPUS: usize = 64;

/// A per-address-space set of participating CPUs.
///
pub struct ParticipationSet {
    bits: Mutex<Bitmap>,
}

impl ParticipationSet {
    /// Returns an empty set.
    ///
    pub fn new() -> Self {
        ParticipationSet {
            bits: Mutex::new(Bitmap::new_unset(MAX_CPUS)),
        }
    }

    /// Records that `cpu` has loaded this address space's root.
    ///
    /// # Panics
    ///
    /// Panics if `cpu >= MAX_CPUS`.
    ///
    pub fn add(&self, cpu: usize) {
        self.bits.lock().set(cpu);
    }

    /// Records that `cpu` no longer has this address space loaded.
    ///
    /// # Panics
    ///
    /// Panics if `cpu >= MAX_CPUS`.
    ///
    pub fn remove(&self, cpu: usize) {
        self.bits.lock().unset(cpu);
    }

    /// Returns whether `cpu` is currently a participant.
    ///
    pub fn contains(&self, cpu: usize) -> bool {
        self.bits.lock().get(cpu)
    }

    /// Returns the number of participating CPUs.
    ///
    pub fn count(&self) -> usize {
        self.bits.lock().num_set()
    }

    /// Returns every participating CPU other than `cpu`, the ordering
    /// used to address the shootdown IPI.
    ///
    pub fn excluding(&self, cpu: usize) -> Vec<usize> {
        let bits = self.bits.lock();
        (0..MAX_CPUS).filter(|&n| n != cpu && bits.get(n)).collect()
    }
}

impl Default for ParticipationSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_membership() {
        let set = ParticipationSet::new();
        assert_eq!(set.count(), 0);
        set.add(2);
        set.add(5);
        assert!(set.contains(2));
        assert!(!set.contains(3));
        assert_eq!(set.count(), 2);
        set.remove(2);
        assert!(!set.contains(2));
        assert_eq!(set.count(), 1);
    }

    #[test]
    fn excluding_omits_only_the_given_cpu() {
        let set = ParticipationSet::new();
        set.add(1);
        set.add(2);
        set.add(3);
        assert_eq!(set.excluding(2), alloc::vec![1, 3]);
    }
}
