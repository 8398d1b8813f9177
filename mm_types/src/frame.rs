// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Physical frame types.

use crate::addr::{InvalidAddress, PhysAddr};
use crate::PAGE_SIZE;
use core::fmt;

/// The size of a physical frame.
///
/// This port supports the three frame sizes addressable on x86-64 so
/// that huge-page leaf tables (`§4.2`) have somewhere to point.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PhysFrameSize {
    Size4KiB,
    Size2MiB,
    Size1GiB,
}

impl PhysFrameSize {
    /// Returns the size in bytes.
    ///
    pub const fn bytes(self) -> u64 {
        match self {
            PhysFrameSize::Size4KiB => PAGE_SIZE,
            PhysFrameSize::Size2MiB => PAGE_SIZE * 512,
            PhysFrameSize::Size1GiB => PAGE_SIZE * 512 * 512,
        }
    }

    /// Returns the number of 4 KiB frames this size spans.
    ///
    pub const fn num_pages(self) -> u64 {
        self.bytes() / PAGE_SIZE
    }
}

impl fmt::Display for PhysFrameSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PhysFrameSize::Size4KiB => write!(f, "4KiB"),
            PhysFrameSize::Size2MiB => write!(f, "2MiB"),
            PhysFrameSize::Size1GiB => write!(f, "1GiB"),
        }
    }
}

/// A physical memory frame: a page-aligned, page-sized region of
/// physical memory.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhysFrame {
    start: PhysAddr,
    size: PhysFrameSize,
}

impl PhysFrame {
    /// Returns the frame of the given size starting at `addr`.
    ///
    /// Returns [`InvalidAddress`] if `addr` is not aligned to `size`.
    ///
    pub fn from_start_address(addr: PhysAddr, size: PhysFrameSize) -> Result<Self, InvalidAddress> {
        if !addr.is_aligned(size.bytes()) {
            return Err(InvalidAddress(addr.as_u64()));
        }

        Ok(PhysFrame { start: addr, size })
    }

    /// Returns the frame of the given size containing `addr`.
    ///
    pub fn containing_address(addr: PhysAddr, size: PhysFrameSize) -> Self {
        PhysFrame {
            start: addr.align_down(size.bytes()),
            size,
        }
    }

    /// Returns the frame's start address.
    ///
    pub const fn start_address(self) -> PhysAddr {
        self.start
    }

    /// Returns the address immediately after the end of the frame.
    ///
    pub fn end_address(self) -> PhysAddr {
        self.start + self.size.bytes()
    }

    /// Returns the frame's size.
    ///
    pub const fn size(self) -> PhysFrameSize {
        self.size
    }

    /// Returns the zero-based index of this frame among all 4 KiB frames
    /// in physical memory: `addr / PAGE_SIZE`.
    ///
    /// This is the index used by the Frame Database's per-segment arrays
    /// (`§3`).
    ///
    pub fn frame_number(self) -> u64 {
        self.start.as_u64() / PAGE_SIZE
    }
}

impl fmt::Display for PhysFrame {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "PhysFrame[{}]({})", self.size, self.start)
    }
}

/// An inclusive-exclusive range of contiguous 4 KiB physical frames:
/// `[start, end)`.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysFrameRange {
    pub start: PhysFrame,
    pub end: PhysFrame,
}

impl PhysFrameRange {
    /// Returns the range `[start, end)`. Both frames must share a size.
    ///
    pub fn new(start: PhysFrame, end: PhysFrame) -> Self {
        assert_eq!(start.size(), end.size(), "range frames must share a size");
        PhysFrameRange { start, end }
    }

    /// Returns the number of frames in the range.
    ///
    pub fn len(self) -> u64 {
        if self.end.frame_number() <= self.start.frame_number() {
            0
        } else {
            self.end.frame_number() - self.start.frame_number()
        }
    }

    /// Returns whether the range contains no frames.
    ///
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

impl Iterator for PhysFrameRange {
    type Item = PhysFrame;

    fn next(&mut self) -> Option<PhysFrame> {
        if self.start.frame_number() >= self.end.frame_number() {
            return None;
        }

        let frame = self.start;
        self.start = PhysFrame::from_start_address(
            self.start.start_address() + self.start.size().bytes(),
            self.start.size(),
        )
        .expect("frame arithmetic overflowed");
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_alignment() {
        let addr = PhysAddr::new(0x1000);
        assert!(PhysFrame::from_start_address(addr, PhysFrameSize::Size4KiB).is_ok());

        let unaligned = PhysAddr::new(0x1001);
        assert!(PhysFrame::from_start_address(unaligned, PhysFrameSize::Size4KiB).is_err());
    }

    #[test]
    fn range_iteration() {
        let start = PhysFrame::from_start_address(PhysAddr::new(0), PhysFrameSize::Size4KiB).unwrap();
        let end = PhysFrame::from_start_address(PhysAddr::new(4 * PAGE_SIZE), PhysFrameSize::Size4KiB)
            .unwrap();
        let range = PhysFrameRange::new(start, end);
        assert_eq!(range.len(), 4);
        assert_eq!(range.collect::<alloc::vec::Vec<_>>().len(), 4);
    }
}
