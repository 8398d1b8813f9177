// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The cross-processor delivery seam (`§4.5`, "Cross-processor
//! shootdown").
//!
//! Enqueuing an inter-processor interrupt and waiting for every
//! recipient's acknowledgement is an APIC/interrupt-controller concern
//! this crate has no driver for; the top-level boot entry wires a
//! concrete [`IpiSender`] in once the interrupt subsystem is up, the
//! same way `physmem`'s [`physmem::IdentityMapProbe`] and
//! [`physmem::PagerWaitHandle`] are wired in.

/// Delivers a TLB shootdown to a set of remote CPUs and blocks until
/// every one of them has acknowledged invalidating the range.
///
pub trait IpiSender: Sync {
    /// Sends the shootdown and waits for all of `targets` to acknowledge.
    ///
    /// `targets` never includes the initiating CPU: the initiator
    /// invalidates its own TLB directly instead of round-tripping
    /// through itself.
    fn shootdown_and_wait(&self, targets: &[usize], address_space_id: u64, start: u64, end: u64);
}
