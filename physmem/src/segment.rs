// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! A Frame Segment: a contiguous physical range discovered at boot,
//! with an inline array of per-frame state (`§3`).

extern crate alloc;

use alloc::vec::Vec;
use bitmap_index::Bitmap;
use mm_types::{Frame, FrameState, PhysAddr, PAGE_SIZE};

/// A contiguous physical memory range, fixed for the life of the system.
///
/// Segments are discovered at boot from the platform memory map and
/// never change their bounds afterwards; only the state of the frames
/// within them changes. The set of segments is searched linearly, which
/// is fine because there are typically only 1-8 of them.
///
pub struct FrameSegment {
    start: PhysAddr,
    /// Exclusive end, page-aligned.
    end: PhysAddr,
    frames: Vec<Frame>,
    /// One bit per frame, set when the frame is allocated (not free).
    /// Kept in lockstep with `frames` so the allocator's free-run
    /// search can use [`Bitmap::next_n_unset_from`] instead of walking
    /// the richer per-frame state for every candidate offset.
    allocated_bitmap: Bitmap,
    free_count: usize,
}

impl FrameSegment {
    /// Creates a segment covering `[start, end)`, with every frame
    /// initialized to `initial`.
    ///
    /// # Panics
    ///
    /// Panics if `start` or `end` is not page-aligned, or if `end` is
    /// not after `start`.
    ///
    pub fn new(start: PhysAddr, end: PhysAddr, initial: Frame) -> Self {
        assert!(start.is_aligned(PAGE_SIZE), "segment start must be page-aligned");
        assert!(end.is_aligned(PAGE_SIZE), "segment end must be page-aligned");
        assert!(end > start, "segment end must be after start");

        let num_frames = ((end.as_u64() - start.as_u64()) / PAGE_SIZE) as usize;
        let initially_free = initial.state().is_free();
        let free_count = if initially_free { num_frames } else { 0 };
        let allocated_bitmap = if initially_free {
            Bitmap::new_unset(num_frames)
        } else {
            Bitmap::new_set(num_frames)
        };

        FrameSegment {
            start,
            end,
            frames: alloc::vec![initial; num_frames],
            allocated_bitmap,
            free_count,
        }
    }

    /// Returns the segment's start address.
    pub fn start(&self) -> PhysAddr {
        self.start
    }

    /// Returns the segment's exclusive end address.
    pub fn end(&self) -> PhysAddr {
        self.end
    }

    /// Returns the number of frames the segment spans.
    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    /// Returns the number of free frames in the segment.
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Returns whether `addr` falls within this segment.
    pub fn contains(&self, addr: PhysAddr) -> bool {
        addr >= self.start && addr < self.end
    }

    /// Returns the index of the frame containing `addr` within this
    /// segment's array.
    ///
    /// # Panics
    ///
    /// Panics if `addr` is not in this segment.
    ///
    pub fn index_of(&self, addr: PhysAddr) -> usize {
        assert!(self.contains(addr), "address not in segment");
        ((addr.as_u64() - self.start.as_u64()) / PAGE_SIZE) as usize
    }

    /// Returns the start address of the frame at `index`.
    pub fn addr_of(&self, index: usize) -> PhysAddr {
        self.start + (index as u64) * PAGE_SIZE
    }

    /// Returns a reference to the frame at `index`.
    pub fn frame(&self, index: usize) -> &Frame {
        &self.frames[index]
    }

    /// Transitions the frame at `index` to `new_state`, updating the
    /// free count and the allocated bitmap together.
    ///
    pub fn set_state(&mut self, index: usize, new_state: FrameState) {
        let was_free = self.frames[index].state().is_free();
        let becomes_free = new_state.is_free();
        self.frames[index].set_state(new_state);

        if was_free && !becomes_free {
            self.free_count -= 1;
            self.allocated_bitmap.set(index);
        } else if !was_free && becomes_free {
            self.free_count += 1;
            self.allocated_bitmap.unset(index);
        }
    }

    /// Searches for `count` contiguous free frames starting at or after
    /// `from`, aligned to `alignment` frames, wrapping once around the
    /// segment.
    ///
    /// Returns the starting index of the run, or `None` if no run of
    /// that size and alignment exists anywhere in the segment.
    ///
    pub fn find_free_run(&self, count: usize, alignment: usize, from: usize) -> Option<usize> {
        self.allocated_bitmap.next_n_unset_from(count, from, alignment)
    }

    /// Returns whether the frame at `index` is currently allocated.
    ///
    pub fn is_allocated(&self, index: usize) -> bool {
        self.allocated_bitmap.get(index)
    }

    /// Returns a mutable reference to the frame at `index`, for
    /// in-place paging-descriptor mutation that does not itself change
    /// the free/allocated boundary (lock/unlock, paging-out toggling).
    ///
    pub fn frame_mut(&mut self, index: usize) -> &mut Frame {
        &mut self.frames[index]
    }

    /// Returns an iterator over every frame index and its current
    /// state, for the pager's round-robin scan.
    ///
    pub fn iter_states(&self) -> impl Iterator<Item = (usize, &FrameState)> {
        self.frames.iter().enumerate().map(|(i, f)| (i, f.state()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_segment_all_free() {
        let segment = FrameSegment::new(PhysAddr::new(0), PhysAddr::new(4 * PAGE_SIZE), Frame::free());
        assert_eq!(segment.num_frames(), 4);
        assert_eq!(segment.free_count(), 4);
        assert_eq!(segment.allocated_bitmap.num_set(), 0);
    }

    #[test]
    fn set_state_updates_free_count_and_bitmap() {
        let mut segment = FrameSegment::new(PhysAddr::new(0), PhysAddr::new(4 * PAGE_SIZE), Frame::free());
        segment.set_state(0, FrameState::NonPaged(None));
        assert_eq!(segment.free_count(), 3);
        assert!(segment.allocated_bitmap.get(0));
        segment.set_state(0, FrameState::Free);
        assert_eq!(segment.free_count(), 4);
        assert!(!segment.allocated_bitmap.get(0));
    }

    #[test]
    fn find_free_run_skips_allocated_frames() {
        let mut segment = FrameSegment::new(PhysAddr::new(0), PhysAddr::new(4 * PAGE_SIZE), Frame::free());
        segment.set_state(0, FrameState::NonPaged(None));
        assert_eq!(segment.find_free_run(2, 1, 0), Some(1));
    }

    #[test]
    fn find_free_run_fails_when_too_large() {
        let segment = FrameSegment::new(PhysAddr::new(0), PhysAddr::new(4 * PAGE_SIZE), Frame::free());
        assert_eq!(segment.find_free_run(5, 1, 0), None);
    }
}
