// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The Frame Database: the segment list plus the rotating-cursor search
//! algorithm shared by the three search kinds (`§4.1`).

extern crate alloc;

use crate::hooks::IdentityMapProbe;
use crate::segment::FrameSegment;
use alloc::vec::Vec;
use mm_types::{FrameState, MmError, PageCacheRef, PagingDescriptor, PhysAddr, PAGE_SIZE};

/// The segment list, free/allocated totals, and the two rotating
/// cursors the search algorithm advances on every call.
///
/// There is one cursor for the *Free* and *Identity-mappable* kinds
/// (they search the same way, just with an extra probe) and a separate
/// one for *Pageable*, since the two searches are driven by unrelated
/// clients (allocators vs. the pager) and must not perturb each other's
/// sweep of the segment list.
///
pub struct FrameDatabase {
    segments: Vec<FrameSegment>,
    total_frames: usize,
    allocated_frames: usize,
    cursor_free: usize,
    cursor_pageable: usize,
}

impl FrameDatabase {
    /// Builds a frame database from the segments discovered at boot.
    ///
    pub fn new(segments: Vec<FrameSegment>) -> Self {
        let total_frames = segments.iter().map(FrameSegment::num_frames).sum();
        let free_frames: usize = segments.iter().map(FrameSegment::free_count).sum();

        FrameDatabase {
            segments,
            total_frames,
            allocated_frames: total_frames - free_frames,
            cursor_free: 0,
            cursor_pageable: 0,
        }
    }

    /// Returns the total number of frames across every segment.
    pub fn total_frames(&self) -> usize {
        self.total_frames
    }

    /// Returns the number of currently allocated frames.
    pub fn allocated_frames(&self) -> usize {
        self.allocated_frames
    }

    /// Returns the number of currently free frames (invariant 1, `§3`).
    pub fn free_frames(&self) -> usize {
        self.total_frames - self.allocated_frames
    }

    fn segment_index_for(&self, addr: PhysAddr) -> Option<usize> {
        self.segments.iter().position(|s| s.contains(addr))
    }

    /// Frame-count form of an `allocate` alignment in bytes. A zero
    /// alignment is treated as one page (`§8` boundary behavior).
    fn alignment_frames(alignment: u64) -> u64 {
        if alignment <= PAGE_SIZE {
            1
        } else {
            alignment / PAGE_SIZE
        }
    }

    /// Finds `count` contiguous free frames aligned to `alignment`
    /// bytes, without installing any state (read-only probe used by
    /// both the plain and identity search kinds).
    ///
    /// Returns the segment index and the starting frame index within
    /// it.
    fn search_free_run(
        &self,
        count: usize,
        alignment: u64,
        start_cursor: usize,
        probe: Option<&dyn IdentityMapProbe>,
    ) -> Option<(usize, usize)> {
        let n = self.segments.len();
        if n == 0 || count == 0 {
            return None;
        }
        let align_frames = Self::alignment_frames(alignment) as usize;

        for step in 0..n {
            let seg_idx = (start_cursor + step) % n;
            let segment = &self.segments[seg_idx];
            if segment.free_count() < count {
                continue;
            }

            let start_frame = segment.start().as_u64() / PAGE_SIZE;
            let phase = {
                let rem = (start_frame as usize) % align_frames;
                if rem == 0 {
                    0
                } else {
                    align_frames - rem
                }
            };

            let mut candidate = phase;
            while candidate + count <= segment.num_frames() {
                let run_free = (candidate..candidate + count).all(|i| !segment.is_allocated(i));
                let identity_ok = probe.map_or(true, |p| {
                    let addr = segment.addr_of(candidate).as_u64();
                    (0..count as u64).all(|i| p.kernel_va_unmapped(addr + i * PAGE_SIZE))
                });
                if run_free && identity_ok {
                    return Some((seg_idx, candidate));
                }
                candidate += align_frames;
            }
        }
        None
    }

    /// Reserves `count` contiguous free frames aligned to `alignment`
    /// bytes, transitioning them to non-paged. Returns the starting
    /// address, or `None` if no run exists anywhere in the segment list
    /// (the caller is responsible for the pager-wait/timeout/crash
    /// escalation described in `§4.1` "Failure semantics").
    ///
    pub fn try_allocate(&mut self, count: usize, alignment: u64) -> Option<PhysAddr> {
        let (seg_idx, index) = self.search_free_run(count, alignment, self.cursor_free, None)?;
        self.reserve_run(seg_idx, index, count);
        self.cursor_free = (seg_idx + 1) % self.segments.len();
        Some(self.segments[seg_idx].addr_of(index))
    }

    /// As [`Self::try_allocate`], but every candidate run must also have
    /// its identity virtual mapping unmapped in kernel space.
    ///
    pub fn try_allocate_identity(
        &mut self,
        count: usize,
        alignment: u64,
        probe: &dyn IdentityMapProbe,
    ) -> Option<PhysAddr> {
        let (seg_idx, index) = self.search_free_run(count, alignment, self.cursor_free, Some(probe))?;
        self.reserve_run(seg_idx, index, count);
        self.cursor_free = (seg_idx + 1) % self.segments.len();
        Some(self.segments[seg_idx].addr_of(index))
    }

    fn reserve_run(&mut self, seg_idx: usize, index: usize, count: usize) {
        let segment = &mut self.segments[seg_idx];
        for i in index..index + count {
            segment.set_state(i, FrameState::NonPaged(None));
        }
        self.allocated_frames += count;
    }

    /// Releases `count` frames starting at `addr`.
    ///
    /// Frames whose paging-out flag is set keep their allocated state;
    /// ownership of the eventual free has already transferred to the
    /// pager (invariant 6, `§3`; `§4.1` "Contract").
    ///
    /// # Errors
    ///
    /// Returns [`MmError::NotFound`] if `addr` does not fall within any
    /// segment.
    ///
    pub fn free(&mut self, addr: PhysAddr, count: usize) -> Result<(), MmError> {
        let seg_idx = self.segment_index_for(addr).ok_or(MmError::NotFound)?;
        let index = self.segments[seg_idx].index_of(addr);
        let mut freed = 0usize;

        for i in index..index + count {
            let retained = matches!(
                self.segments[seg_idx].frame(i).state(),
                FrameState::Paged(d) if d.paging_out()
            );
            if !retained {
                self.segments[seg_idx].set_state(i, FrameState::Free);
                freed += 1;
            }
        }

        self.allocated_frames -= freed;
        Ok(())
    }

    /// Transitions `count` non-paged frames starting at `addr` to
    /// paged, installing one descriptor per frame from `descriptors`.
    ///
    /// # Errors
    ///
    /// Returns [`MmError::NotFound`] if the range is outside the
    /// segment, or [`MmError::PreconditionFailed`] if `descriptors` has
    /// the wrong length or any frame is not currently non-paged.
    ///
    pub fn mark_pageable(
        &mut self,
        addr: PhysAddr,
        count: usize,
        descriptors: &[PagingDescriptor],
        lock_initially: bool,
    ) -> Result<(), MmError> {
        if descriptors.len() != count {
            return Err(MmError::PreconditionFailed);
        }
        let seg_idx = self.segment_index_for(addr).ok_or(MmError::NotFound)?;
        let index = self.segments[seg_idx].index_of(addr);

        for i in 0..count {
            if !self.segments[seg_idx].frame(index + i).state().is_non_paged() {
                return Err(MmError::PreconditionFailed);
            }
        }

        for (i, descriptor) in descriptors.iter().enumerate() {
            let mut descriptor = *descriptor;
            if lock_initially {
                let _ = descriptor.lock();
            }
            self.segments[seg_idx].set_state(index + i, FrameState::Paged(descriptor));
        }
        Ok(())
    }

    fn with_descriptor_mut<R>(
        &mut self,
        addr: PhysAddr,
        f: impl FnOnce(&mut PagingDescriptor) -> R,
    ) -> Result<R, MmError> {
        let seg_idx = self.segment_index_for(addr).ok_or(MmError::NotFound)?;
        let index = self.segments[seg_idx].index_of(addr);
        let descriptor = self.segments[seg_idx]
            .frame_mut(index)
            .state_mut()
            .paging_descriptor_mut()
            .ok_or(MmError::NotFound)?;
        Ok(f(descriptor))
    }

    /// Increments the paging descriptor's lock count at `addr`.
    ///
    /// # Errors
    ///
    /// [`MmError::ResourceInUse`] if the lock count is already at the
    /// documented maximum; [`MmError::NotFound`] if `addr` is not a
    /// paged frame.
    ///
    pub fn lock_pages(&mut self, addr: PhysAddr) -> Result<(), MmError> {
        let locked = self.with_descriptor_mut(addr, PagingDescriptor::lock)?;
        if locked {
            Ok(())
        } else {
            Err(MmError::ResourceInUse)
        }
    }

    /// Decrements the paging descriptor's lock count at `addr`.
    ///
    /// # Errors
    ///
    /// [`MmError::NotFound`] if `addr` is not a paged frame.
    ///
    pub fn unlock_pages(&mut self, addr: PhysAddr) -> Result<(), MmError> {
        self.with_descriptor_mut(addr, PagingDescriptor::unlock)
    }

    /// Returns the page-cache back-reference for the non-paged frame at
    /// `addr`, or `None` if it carries none.
    ///
    /// # Errors
    ///
    /// [`MmError::NotFound`] if `addr` is not a non-paged frame.
    ///
    pub fn get_page_cache(&self, addr: PhysAddr) -> Result<Option<PageCacheRef>, MmError> {
        let seg_idx = self.segment_index_for(addr).ok_or(MmError::NotFound)?;
        let index = self.segments[seg_idx].index_of(addr);
        match self.segments[seg_idx].frame(index).state() {
            FrameState::NonPaged(entry) => Ok(*entry),
            _ => Err(MmError::NotFound),
        }
    }

    /// Sets the page-cache back-reference for the non-paged frame at
    /// `addr`.
    ///
    /// # Errors
    ///
    /// [`MmError::NotFound`] if `addr` is not a non-paged frame.
    ///
    pub fn set_page_cache(&mut self, addr: PhysAddr, entry: Option<PageCacheRef>) -> Result<(), MmError> {
        let seg_idx = self.segment_index_for(addr).ok_or(MmError::NotFound)?;
        let index = self.segments[seg_idx].index_of(addr);
        if !self.segments[seg_idx].frame(index).state().is_non_paged() {
            return Err(MmError::NotFound);
        }
        self.segments[seg_idx].set_state(index, FrameState::NonPaged(entry));
        Ok(())
    }

    /// Selects the next pageable frame using the pager's round-robin
    /// cursor and marks it as having its write in flight.
    ///
    /// Returns the frame's address and a snapshot of its descriptor
    /// (taken before `begin_paging_out`, so `paging_out` reads `false`
    /// in the snapshot), or `None` if no segment holds an eligible
    /// frame.
    ///
    pub fn select_pageable(&mut self) -> Option<(PhysAddr, PagingDescriptor)> {
        let n = self.segments.len();
        if n == 0 {
            return None;
        }

        for step in 0..n {
            let seg_idx = (self.cursor_pageable + step) % n;
            let found = {
                let segment = &self.segments[seg_idx];
                segment.iter_states().find_map(|(i, state)| match state {
                    FrameState::Paged(d) if d.is_pager_eligible() => Some((i, *d)),
                    _ => None,
                })
            };
            if let Some((index, descriptor)) = found {
                self.cursor_pageable = (seg_idx + 1) % n;
                let segment = &mut self.segments[seg_idx];
                let mut updated = descriptor;
                updated.begin_paging_out();
                segment.set_state(index, FrameState::Paged(updated));
                return Some((segment.addr_of(index), descriptor));
            }
        }
        None
    }

    /// Completes a pager write for the frame at `addr`, selected by a
    /// prior [`Self::select_pageable`] call.
    ///
    /// If `evict` is set, the frame is freed into the general pool;
    /// otherwise the paging-out flag is cleared and the frame remains
    /// paged (a failed write that the pager chose to retry later).
    ///
    /// # Errors
    ///
    /// [`MmError::NotFound`] if `addr` is not currently a paged frame
    /// with its paging-out flag set.
    ///
    pub fn complete_pageout(&mut self, addr: PhysAddr, evict: bool) -> Result<(), MmError> {
        let seg_idx = self.segment_index_for(addr).ok_or(MmError::NotFound)?;
        let index = self.segments[seg_idx].index_of(addr);
        let was_paging_out = matches!(
            self.segments[seg_idx].frame(index).state(),
            FrameState::Paged(d) if d.paging_out()
        );
        if !was_paging_out {
            return Err(MmError::NotFound);
        }

        if evict {
            self.segments[seg_idx].set_state(index, FrameState::Free);
            self.allocated_frames -= 1;
        } else {
            let mut descriptor = *self.segments[seg_idx]
                .frame(index)
                .state()
                .paging_descriptor()
                .expect("checked above");
            descriptor.end_paging_out();
            self.segments[seg_idx].set_state(index, FrameState::Paged(descriptor));
        }
        Ok(())
    }

    /// Reassigns the owning section of every paged frame's descriptor
    /// currently pointing at `old_section_id`, for descriptor migration
    /// (`§4.6`).
    ///
    pub fn migrate_section(&mut self, old_section_id: u64, new_section_id: u64) {
        for segment in &mut self.segments {
            for index in 0..segment.num_frames() {
                if let FrameState::Paged(descriptor) = segment.frame(index).state() {
                    if descriptor.section_id == old_section_id {
                        let mut updated = *descriptor;
                        updated.migrate(new_section_id, updated.offset_in_section);
                        segment.set_state(index, FrameState::Paged(updated));
                    }
                }
            }
        }
    }

    #[cfg(test)]
    fn check_invariants(&self) {
        let sum: usize = self.segments.iter().map(FrameSegment::free_count).sum();
        assert_eq!(sum, self.total_frames - self.allocated_frames);
        for segment in &self.segments {
            let actual = segment
                .iter_states()
                .filter(|(_, s)| s.is_free())
                .count();
            assert_eq!(actual, segment.free_count());
        }
    }
}
