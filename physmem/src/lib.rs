// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The Frame Database and Physical Allocator (`§4.1`).
//!
//! Boots from a platform memory map into a list of
//! [`FrameSegment`]s, then serves `allocate`/`free`/`mark_pageable`/
//! `lock_pages`/`unlock_pages`/`get_page_cache`/`set_page_cache`
//! against a single global [`frame_database::FrameDatabase`] behind one
//! coarse spinlock, mirroring `§5`'s "physical lock" held briefly and
//! never across I/O.
//!
//! This crate never depends on the page-table engine or the pager
//! directly; `allocate_identity` and the pressure-triggered block in
//! `allocate` reach them through the [`hooks`] trait seams instead,
//! wired up by the top-level boot entry once every crate is linked.

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

mod bootmap;
mod frame_database;
mod hooks;
mod segment;

pub use bootmap::{BootLimits, BootMemoryRegion, BootRegionKind, ValidatedRange};
pub use frame_database::FrameDatabase;
pub use hooks::{AlwaysUnmapped, IdentityMapProbe, NoPager, PagerWaitHandle};
pub use segment::FrameSegment;

use alloc::vec::Vec;
use lazy_static::lazy_static;
use mm_types::{
    Frame, FrameState, MmError, PageCacheRef, PagingDescriptor, PhysAddr, PhysFrame, PhysFrameAllocator,
    PhysFrameDeallocator, PhysFrameSize, PAGE_SIZE, RESERVED_ZERO_FRAME,
};
use pressure::PressureMonitor;
use spin::{Mutex, Once};

/// Default bound on how long [`allocate`] waits for the pager to make
/// forward progress before escalating to [`MmError::OutOfMemory`]
/// (`§4.1` "Failure semantics"). Expressed in milliseconds because this
/// crate has no clock of its own; the registered
/// [`PagerWaitHandle::wait_for_progress`] implementation owns the
/// actual timer.
///
pub const DEFAULT_OOM_TIMEOUT_MS: u64 = 180_000;

static IDENTITY_PROBE: Once<&'static (dyn IdentityMapProbe + Sync)> = Once::new();
static PAGER_WAIT: Once<&'static (dyn PagerWaitHandle + Sync)> = Once::new();

lazy_static! {
    static ref DATABASE: Mutex<Option<FrameDatabase>> = Mutex::new(None);
    static ref PRESSURE: PressureMonitor = PressureMonitor::new();
}

/// Registers the page-table engine's identity-mapping probe.
///
/// Idempotent: only the first registration takes effect, matching the
/// boot-once nature of every singleton in this crate.
///
pub fn register_identity_probe(probe: &'static (dyn IdentityMapProbe + Sync)) {
    IDENTITY_PROBE.call_once(|| probe);
}

/// Registers the pager coordinator's wait/wake handle.
///
pub fn register_pager_wait_handle(handle: &'static (dyn PagerWaitHandle + Sync)) {
    PAGER_WAIT.call_once(|| handle);
}

/// Returns a handle to the pressure monitor, for subscribers such as
/// the pager coordinator that poll [`pressure::PressureMonitor::level`]
/// directly.
///
pub fn pressure_monitor() -> &'static PressureMonitor {
    &PRESSURE
}

/// Boot-initializes the Frame Database from the platform's boot memory
/// map (`§4.1` "Boot initialization", `§6` "Boot memory map").
///
/// Validates and aligns every descriptor, reserves physical page zero
/// out of the general pool (`§9` design note: the source special-cases
/// it; this port withholds it unconditionally), builds one segment per
/// surviving range, and configures the pressure monitor's sampling mask
/// from the resulting total.
///
/// # Panics
///
/// Panics if called more than once, or if a descriptor is misaligned
/// (propagated from [`bootmap::validate_regions`]).
///
pub fn init(regions: &[BootMemoryRegion], limits: BootLimits) {
    let validated = bootmap::validate_regions(regions, limits);
    let mut segments: Vec<FrameSegment> = Vec::with_capacity(validated.len());

    for range in &validated {
        let initial = if range.free { Frame::free() } else { Frame::reserved() };
        segments.push(FrameSegment::new(range.start, range.end, initial));
    }

    let zero = PhysAddr::new(RESERVED_ZERO_FRAME);
    if let Some(segment) = segments.iter_mut().find(|s| s.contains(zero)) {
        let index = segment.index_of(zero);
        if segment.frame(index).state().is_free() {
            segment.set_state(index, FrameState::NonPaged(None));
        }
    }

    let segment_count = segments.len();
    let database = FrameDatabase::new(segments);
    let total = database.total_frames();
    PRESSURE.configure(total as u64);

    serial::println!(
        "physmem: {} across {} frame(s) in {} segment(s)",
        pretty::Bytes::from_u64(total as u64 * PAGE_SIZE),
        total,
        segment_count
    );

    let mut guard = DATABASE.lock();
    assert!(guard.is_none(), "physmem::init called more than once");
    *guard = Some(database);
}

fn with_database<R>(f: impl FnOnce(&mut FrameDatabase) -> R) -> R {
    let mut guard = DATABASE.lock();
    let database = guard.as_mut().expect("physmem::init must run before use");
    f(database)
}

/// Reserves a contiguous run of `count` frames aligned to `alignment`
/// bytes, blocking on pager progress under pressure and escalating to
/// [`MmError::OutOfMemory`] after [`DEFAULT_OOM_TIMEOUT_MS`] of no
/// forward progress (`§4.1` "Contract", "Failure semantics").
///
/// # Errors
///
/// [`MmError::OutOfMemory`] if no run becomes available before the
/// timeout elapses.
///
pub fn allocate(count: usize, alignment: u64) -> Result<PhysAddr, MmError> {
    allocate_with_timeout(count, alignment, DEFAULT_OOM_TIMEOUT_MS)
}

/// As [`allocate`], with an explicit timeout — primarily for tests that
/// cannot wait the production default.
///
/// # Errors
///
/// [`MmError::OutOfMemory`] if no run becomes available before the
/// timeout elapses.
///
pub fn allocate_with_timeout(count: usize, alignment: u64, timeout_ms: u64) -> Result<PhysAddr, MmError> {
    loop {
        let outcome = with_database(|database| match database.try_allocate(count, alignment) {
            Some(addr) => {
                PRESSURE.record(database.allocated_frames() as u64);
                Some(addr)
            }
            None => {
                PRESSURE.check(database.allocated_frames() as u64);
                None
            }
        });

        if let Some(addr) = outcome {
            return Ok(addr);
        }

        match PAGER_WAIT.get() {
            Some(pager) => {
                pager.request_frames(count);
                if !pager.wait_for_progress(timeout_ms) {
                    return Err(MmError::OutOfMemory { count, alignment });
                }
            }
            None => return Err(MmError::OutOfMemory { count, alignment }),
        }
    }
}

/// Reserves frames whose identity virtual mapping (VA numerically equal
/// to PA) is currently unmapped in kernel space, for controlled
/// early-boot and cross-processor bring-up paths. Never blocks
/// (`§4.1` "Contract").
///
/// # Errors
///
/// [`MmError::OutOfMemory`] if no eligible run exists, or if no
/// [`IdentityMapProbe`] has been registered yet.
///
pub fn allocate_identity(count: usize, alignment: u64) -> Result<PhysAddr, MmError> {
    let probe = IDENTITY_PROBE.get().ok_or(MmError::OutOfMemory { count, alignment })?;
    with_database(|database| {
        database
            .try_allocate_identity(count, alignment, *probe)
            .ok_or(MmError::OutOfMemory { count, alignment })
    })
}

/// Releases `count` frames starting at `addr` back to the Frame
/// Database (`§4.1` "Contract").
///
/// # Errors
///
/// [`MmError::NotFound`] if `addr` is not a recognized allocation.
///
pub fn free(addr: PhysAddr, count: usize) -> Result<(), MmError> {
    with_database(|database| {
        database.free(addr, count)?;
        PRESSURE.check(database.allocated_frames() as u64);
        Ok(())
    })
}

/// Transitions `count` non-paged frames starting at `addr` to paged,
/// installing `descriptors` (`§4.1` "Contract").
///
/// # Errors
///
/// See [`frame_database::FrameDatabase::mark_pageable`].
///
pub fn mark_pageable(
    addr: PhysAddr,
    count: usize,
    descriptors: &[PagingDescriptor],
    lock_initially: bool,
) -> Result<(), MmError> {
    with_database(|database| database.mark_pageable(addr, count, descriptors, lock_initially))
}

/// Increments the paging descriptor's lock count at `addr`.
///
/// # Errors
///
/// [`MmError::ResourceInUse`] at the documented maximum lock count.
///
pub fn lock_pages(addr: PhysAddr) -> Result<(), MmError> {
    with_database(|database| database.lock_pages(addr))
}

/// Decrements the paging descriptor's lock count at `addr`.
///
/// # Errors
///
/// [`MmError::NotFound`] if `addr` is not a paged frame.
///
pub fn unlock_pages(addr: PhysAddr) -> Result<(), MmError> {
    with_database(|database| database.unlock_pages(addr))
}

/// Returns the page-cache back-reference for the non-paged frame at
/// `addr`.
///
/// # Errors
///
/// [`MmError::NotFound`] if `addr` is not a non-paged frame.
///
pub fn get_page_cache(addr: PhysAddr) -> Result<Option<PageCacheRef>, MmError> {
    with_database(|database| database.get_page_cache(addr))
}

/// Sets the page-cache back-reference for the non-paged frame at
/// `addr`.
///
/// # Errors
///
/// [`MmError::NotFound`] if `addr` is not a non-paged frame.
///
pub fn set_page_cache(addr: PhysAddr, entry: Option<PageCacheRef>) -> Result<(), MmError> {
    with_database(|database| database.set_page_cache(addr, entry))
}

/// Selects and marks in-flight the next pageable frame, for the pager
/// coordinator (`§4.6`).
///
pub fn select_pageable() -> Option<(PhysAddr, PagingDescriptor)> {
    with_database(FrameDatabase::select_pageable)
}

/// Completes a pager write for the frame at `addr` selected by a prior
/// [`select_pageable`] call, freeing it if `evict` is set.
///
/// # Errors
///
/// [`MmError::NotFound`] if `addr` is not mid-pageout.
///
pub fn complete_pageout(addr: PhysAddr, evict: bool) -> Result<(), MmError> {
    with_database(|database| {
        database.complete_pageout(addr, evict)?;
        if evict {
            PRESSURE.check(database.allocated_frames() as u64);
        }
        Ok(())
    })
}

/// Reassigns every paged frame's section back-pointer from
/// `old_section_id` to `new_section_id` (`§4.6` "Descriptor migration").
///
pub fn migrate_section(old_section_id: u64, new_section_id: u64) {
    with_database(|database| database.migrate_section(old_section_id, new_section_id));
}

/// Returns the total and allocated frame counts, for diagnostics and
/// the pressure monitor's own subscribers.
///
pub fn frame_counts() -> (usize, usize) {
    with_database(|database| (database.total_frames(), database.allocated_frames()))
}

/// A [`PhysFrameAllocator`]/[`PhysFrameDeallocator`] adapter over the
/// global allocator, for the page-table engine's leaf-table allocation
/// (`§4.2`).
///
#[derive(Debug, Default, Clone, Copy)]
pub struct GlobalFrameAllocator;

// SAFETY: every frame returned by `allocate` is freshly transitioned to
// the non-paged state under the physical lock before being handed out,
// so it cannot be concurrently in use elsewhere.
unsafe impl PhysFrameAllocator for GlobalFrameAllocator {
    fn allocate_phys_frame(&mut self) -> Option<PhysFrame> {
        let addr = allocate(1, PAGE_SIZE).ok()?;
        PhysFrame::from_start_address(addr, PhysFrameSize::Size4KiB).ok()
    }
}

impl PhysFrameDeallocator for GlobalFrameAllocator {
    unsafe fn deallocate_phys_frame(&mut self, frame: PhysFrame) {
        let _ = free(frame.start_address(), 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::sync::atomic::{AtomicUsize, Ordering};

    // `DATABASE` is one process-wide singleton; the default test runner
    // executes `#[test]` functions on multiple threads, so every test
    // in this module must hold this lock for its whole body or two
    // tests resetting the database concurrently would corrupt each
    // other's state.
    static TEST_SERIAL: Mutex<()> = Mutex::new(());

    fn reset_and_init(total_pages: u64) {
        let mut guard = DATABASE.lock();
        *guard = None;
        drop(guard);

        let regions = [BootMemoryRegion {
            base: 0,
            length: total_pages * PAGE_SIZE,
            kind: BootRegionKind::Free,
        }];
        init(&regions, BootLimits::default());
    }

    // `IDENTITY_PROBE` and `PAGER_WAIT` are `spin::Once` globals shared
    // by the whole test binary, so every scenario that touches them
    // runs from a single test function: splitting across `#[test]`
    // functions would make the outcome depend on which one the runner
    // happens to execute (and register the singleton) first.
    #[test]
    fn allocator_lifecycle() {
        let _serial = TEST_SERIAL.lock();
        reset_and_init(8);

        // Page zero is withheld, so the database reports it allocated
        // even though nothing has called `allocate` yet.
        let (total, allocated) = frame_counts();
        assert_eq!(total, 8);
        assert_eq!(allocated, 1);

        // Round-trip a run through allocate/free.
        let addr = allocate(4, 2 * PAGE_SIZE).expect("allocation should succeed");
        assert_eq!(addr.as_u64() % (2 * PAGE_SIZE), 0);
        let (_, allocated_after) = frame_counts();
        assert_eq!(allocated_after, allocated + 4);
        free(addr, 4).unwrap();
        let (_, allocated_restored) = frame_counts();
        assert_eq!(allocated_restored, allocated);

        // `allocate_identity` fails cleanly with no probe registered.
        assert!(allocate_identity(1, PAGE_SIZE).is_err());
        register_identity_probe(&AlwaysUnmapped);
        let identity_addr = allocate_identity(1, PAGE_SIZE).expect("identity allocation should succeed");
        free(identity_addr, 1).unwrap();

        // With no pager registered, a request that can never be
        // satisfied fails immediately rather than looping.
        reset_and_init(2);
        let oversized = allocate_with_timeout(2, PAGE_SIZE, 0);
        assert_eq!(oversized, Err(MmError::OutOfMemory { count: 2, alignment: PAGE_SIZE }));

        // A pager that reports progress exactly once lets the retry
        // loop run one extra iteration before giving up for good.
        struct OneShotPager {
            calls: AtomicUsize,
        }
        impl PagerWaitHandle for OneShotPager {
            fn request_frames(&self, _target: usize) {}
            fn wait_for_progress(&self, _timeout_ms: u64) -> bool {
                self.calls.fetch_add(1, Ordering::SeqCst) == 0
            }
        }
        static PAGER: OneShotPager = OneShotPager { calls: AtomicUsize::new(0) };
        register_pager_wait_handle(&PAGER);

        let still_oversized = allocate_with_timeout(2, PAGE_SIZE, 0);
        assert_eq!(still_oversized, Err(MmError::OutOfMemory { count: 2, alignment: PAGE_SIZE }));
        assert_eq!(PAGER.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn mark_pageable_lock_and_pager_selection() {
        let _serial = TEST_SERIAL.lock();
        reset_and_init(8);
        let addr = allocate(1, PAGE_SIZE).unwrap();
        let descriptors = [PagingDescriptor::new(42, 0, false)];
        mark_pageable(addr, 1, &descriptors, false).unwrap();

        for _ in 0..mm_types::MAX_LOCK_COUNT {
            lock_pages(addr).unwrap();
        }
        assert_eq!(lock_pages(addr), Err(MmError::ResourceInUse));
        assert!(select_pageable().is_none(), "locked frame must not be pager-selected");

        for _ in 0..mm_types::MAX_LOCK_COUNT {
            unlock_pages(addr).unwrap();
        }
        let (selected, descriptor) = select_pageable().expect("frame should now be eligible");
        assert_eq!(selected, addr);
        assert_eq!(descriptor.section_id, 42);

        complete_pageout(addr, true).unwrap();
    }

    #[test]
    fn page_cache_round_trip() {
        let _serial = TEST_SERIAL.lock();
        reset_and_init(4);
        let addr = allocate(1, PAGE_SIZE).unwrap();
        assert_eq!(get_page_cache(addr).unwrap(), None);
        set_page_cache(addr, Some(PageCacheRef(7))).unwrap();
        assert_eq!(get_page_cache(addr).unwrap(), Some(PageCacheRef(7)));
        free(addr, 1).unwrap();
    }
}
