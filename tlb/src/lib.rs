// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! TLB Coherence (`§4.5`): local invalidation is
//! [`pagetable::FlushRange`]'s job; this crate adds the
//! per-address-space participation set and the cross-processor
//! shootdown protocol built on top of it, including the single-threaded
//! shortcut that skips the IPI round trip entirely when it cannot matter.

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

mod hooks;
mod participation;

pub use hooks::IpiSender;
pub use participation::{ParticipationSet, MAX_CPUS};

use pagetable::FlushRange;
use spin::Once;

static IPI_SENDER: Once<&'static (dyn IpiSender + Sync)> = Once::new();

/// Registers the interrupt subsystem's shootdown delivery.
///
/// Idempotent: only the first registration takes effect.
///
pub fn register_ipi_sender(sender: &'static (dyn IpiSender + Sync)) {
    IPI_SENDER.call_once(|| sender);
}

/// Resolves `range` against `participants`: invalidates the initiating
/// CPU's own TLB, then — unless the single-threaded shortcut applies —
/// sends a shootdown to every other participant and blocks until they
/// all acknowledge.
///
/// A range with nothing to flush (see
/// [`FlushRange::needs_flush`](pagetable::FlushRange::needs_flush)) is a
/// no-op, matching `§4.5`'s "transitions that only extend reach do not
/// need invalidation".
///
pub fn shootdown(
    participants: &ParticipationSet,
    initiator_cpu: usize,
    address_space_id: u64,
    range: FlushRange,
) {
    if !range.needs_flush() {
        range.ignore();
        return;
    }

    let (start, end) = range.range();
    let skip_remote = should_skip_remote(participants.count(), is_user_only(start, end));

    range.flush_local();

    if skip_remote {
        return;
    }

    let targets = participants.excluding(initiator_cpu);
    if targets.is_empty() {
        return;
    }

    match IPI_SENDER.get() {
        Some(sender) => {
            sender.shootdown_and_wait(&targets, address_space_id, start.as_u64(), end.as_u64());
        }
        None => {
            serial::println!(
                "tlb: shootdown requested for address space {} but no IPI sender is registered; \
                 only the initiating CPU's TLB was invalidated",
                address_space_id
            );
        }
    }
}

/// Whether a range touching only user space on a zero- or one-thread
/// address space can skip the remote shootdown entirely (`§4.5`,
/// "Single-threaded shortcut").
///
fn should_skip_remote(participant_count: usize, user_only: bool) -> bool {
    participant_count <= 1 && user_only
}

/// Whether `[start, end)` lies entirely outside the kernel half of the
/// address space.
///
fn is_user_only(start: mm_types::VirtAddr, end: mm_types::VirtAddr) -> bool {
    !pagetable::is_kernel_va(start) && !pagetable::is_kernel_va(end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_types::VirtAddr;

    struct NullDeallocator;
    impl mm_types::PhysFrameDeallocator for NullDeallocator {
        unsafe fn deallocate_phys_frame(&mut self, _frame: mm_types::PhysFrame) {}
    }

    #[test]
    fn flushless_range_is_a_no_op() {
        // A zero-length unmap's `FlushRange` always has `needs_flush() ==
        // false` without ever dereferencing `root`, so this is safe to
        // construct with a `root` that isn't backed by a real table.
        let outcome = unsafe {
            pagetable::unmap(
                mm_types::PhysAddr::new(0x1000),
                VirtAddr::new(0x20_0000),
                0,
                pagetable::UnmapOptions::default(),
                &mut NullDeallocator,
            )
        }
        .unwrap();

        let participants = ParticipationSet::new();
        participants.add(0);
        participants.add(1);
        shootdown(&participants, 0, 42, outcome.flush);
    }

    #[test]
    fn single_threaded_user_range_skips_remote_shootdown() {
        let user_start = VirtAddr::new(0x20_0000);
        let user_end = VirtAddr::new(0x21_000);
        assert!(is_user_only(user_start, user_end));
        assert!(should_skip_remote(1, is_user_only(user_start, user_end)));
        assert!(should_skip_remote(0, is_user_only(user_start, user_end)));
    }

    #[test]
    fn multi_threaded_or_kernel_range_never_skips() {
        let user_start = VirtAddr::new(0x20_0000);
        let user_end = VirtAddr::new(0x21_000);
        assert!(!should_skip_remote(2, is_user_only(user_start, user_end)));

        let kernel_start = memlayout::KERNELSPACE.start();
        assert!(!is_user_only(kernel_start, user_end));
        assert!(!should_skip_remote(1, is_user_only(kernel_start, user_end)));
    }

}
