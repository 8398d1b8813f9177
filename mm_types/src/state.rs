// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Per-frame state: the tagged union the Frame Database tracks for every
//! physical frame.
//!
//! The C implementation this design is grounded on encodes frame state
//! as a union with a low-bit pointer tag. This port uses an explicit sum
//! type over free/non-paged/paged instead, with the discriminant as a
//! plain enum tag rather than a pointer bit — see `DESIGN.md`.

/// The maximum number of outstanding locks a single paging descriptor
/// may carry. A sixteenth `lock_pages` call on an already-saturated
/// frame returns [`crate::MmError::ResourceInUse`].
///
pub const MAX_LOCK_COUNT: u8 = 15;

/// Per-frame metadata that makes a paged frame eligible for eviction.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingDescriptor {
    /// Opaque identifier of the owning section (region of VA space).
    /// The memory manager never dereferences this; it is a back-pointer
    /// for the pager to report against when it writes the frame out.
    pub section_id: u64,
    /// Byte offset within the owning section.
    pub offset_in_section: u64,
    /// Number of outstanding locks. A lock count of zero or more
    /// inhibits pager selection only via `paging_out`; see
    /// [`PagingDescriptor::is_lockable`].
    lock_count: u8,
    /// Set when the pager has selected this frame and is in the middle
    /// of writing it to the backing store. A frame with this flag set
    /// is not re-allocated until the pager clears it and frees the
    /// frame (invariant 6, `§3`).
    paging_out: bool,
}

impl PagingDescriptor {
    /// Creates a new descriptor for a page becoming pageable, optionally
    /// locked once immediately (the `lock_initially` option on
    /// `mark_pageable`, `§4.1`).
    ///
    pub fn new(section_id: u64, offset_in_section: u64, lock_initially: bool) -> Self {
        PagingDescriptor {
            section_id,
            offset_in_section,
            lock_count: u8::from(lock_initially),
            paging_out: false,
        }
    }

    /// Returns the current lock count.
    ///
    pub fn lock_count(&self) -> u8 {
        self.lock_count
    }

    /// Returns whether the paging-out flag is set.
    ///
    pub fn paging_out(&self) -> bool {
        self.paging_out
    }

    /// Increments the lock count.
    ///
    /// Returns `false` (and leaves the count unchanged) if it is already
    /// at [`MAX_LOCK_COUNT`].
    ///
    #[must_use]
    pub fn lock(&mut self) -> bool {
        if self.lock_count >= MAX_LOCK_COUNT {
            return false;
        }
        self.lock_count += 1;
        true
    }

    /// Decrements the lock count.
    ///
    /// # Panics
    ///
    /// Panics if the lock count is already zero: an unbalanced
    /// `unlock_pages` call is a caller bug, not a recoverable condition.
    ///
    pub fn unlock(&mut self) {
        assert!(self.lock_count > 0, "unbalanced unlock on paging descriptor");
        self.lock_count -= 1;
    }

    /// Returns whether the pager may select this frame: not already
    /// being paged out, and not locked.
    ///
    pub fn is_pager_eligible(&self) -> bool {
        !self.paging_out && self.lock_count == 0
    }

    /// Marks the frame as having its paging-out write in flight.
    ///
    /// # Panics
    ///
    /// Panics if the frame is not eligible for selection (already being
    /// paged out, or locked) — the physical lock must be held across
    /// the eligibility check and this call so the two never race.
    ///
    pub fn begin_paging_out(&mut self) {
        assert!(self.is_pager_eligible(), "frame selected while ineligible");
        self.paging_out = true;
    }

    /// Clears the paging-out flag once the pager's write has completed
    /// (successfully or not) and the frame is about to be freed or
    /// retained.
    ///
    pub fn end_paging_out(&mut self) {
        self.paging_out = false;
    }

    /// Reassigns the owning section, for descriptor migration when a
    /// section's frames move to another section (`§4.6`).
    ///
    pub fn migrate(&mut self, new_section_id: u64, new_offset: u64) {
        self.section_id = new_section_id;
        self.offset_in_section = new_offset;
    }
}

/// A back-reference from a non-paged frame to the page-cache entry that
/// owns it, used only for frames caching disk blocks.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCacheRef(pub u64);

/// The state of one physical frame. Exactly one variant is valid at a
/// time; readers must not interpret fields from a previous state
/// (invariant 2, `§3`).
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// The frame is unallocated and available to the physical allocator.
    Free,
    /// The frame is allocated and pinned: never selected by the pager.
    /// Optionally bears a back-reference to a page-cache entry.
    NonPaged(Option<PageCacheRef>),
    /// The frame is allocated and eligible for eviction, described by a
    /// paging descriptor.
    Paged(PagingDescriptor),
}

impl FrameState {
    /// Returns whether the frame is free.
    ///
    pub fn is_free(&self) -> bool {
        matches!(self, FrameState::Free)
    }

    /// Returns whether the frame is non-paged (kernel-pinned).
    ///
    pub fn is_non_paged(&self) -> bool {
        matches!(self, FrameState::NonPaged(_))
    }

    /// Returns the paging descriptor, if the frame is in the paged
    /// state.
    ///
    pub fn paging_descriptor(&self) -> Option<&PagingDescriptor> {
        match self {
            FrameState::Paged(descriptor) => Some(descriptor),
            _ => None,
        }
    }

    /// Returns a mutable reference to the paging descriptor, if the
    /// frame is in the paged state.
    ///
    pub fn paging_descriptor_mut(&mut self) -> Option<&mut PagingDescriptor> {
        match self {
            FrameState::Paged(descriptor) => Some(descriptor),
            _ => None,
        }
    }
}

/// Per-physical-frame record tracked by the Frame Database.
///
/// The segment's inline array of these, indexed by
/// `(addr - segment.start) / PAGE_SIZE`, is the authoritative record of
/// every frame's state (`§3`).
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    state: FrameState,
}

impl Frame {
    /// Returns a new free frame.
    ///
    pub const fn free() -> Self {
        Frame {
            state: FrameState::Free,
        }
    }

    /// Returns a new non-paged frame reserved at boot (e.g. firmware or
    /// loader memory), never entering the general pool.
    ///
    pub const fn reserved() -> Self {
        Frame {
            state: FrameState::NonPaged(None),
        }
    }

    /// Returns the frame's current state.
    ///
    pub fn state(&self) -> &FrameState {
        &self.state
    }

    /// Returns a mutable reference to the frame's current state.
    ///
    pub fn state_mut(&mut self) -> &mut FrameState {
        &mut self.state
    }

    /// Transitions the frame to a new state, discarding whatever arm was
    /// previously valid.
    ///
    pub fn set_state(&mut self, state: FrameState) {
        self.state = state;
    }
}
