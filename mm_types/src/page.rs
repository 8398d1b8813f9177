// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Virtual page types, mirroring [`crate::frame`] on the virtual side of
//! a mapping.

use crate::addr::{InvalidAddress, VirtAddr};
use crate::frame::PhysFrameSize;
use crate::PAGE_SIZE;
use core::fmt;

/// The size of a virtual page, matching [`PhysFrameSize`] one-to-one: a
/// mapping's page and frame sizes must agree (`§4.2`'s `map` asserts
/// this).
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum VirtPageSize {
    Size4KiB,
    Size2MiB,
    Size1GiB,
}

impl VirtPageSize {
    /// Returns the size in bytes.
    ///
    pub const fn bytes(self) -> u64 {
        match self {
            VirtPageSize::Size4KiB => PAGE_SIZE,
            VirtPageSize::Size2MiB => PAGE_SIZE * 512,
            VirtPageSize::Size1GiB => PAGE_SIZE * 512 * 512,
        }
    }

    /// Returns the matching [`PhysFrameSize`].
    ///
    pub const fn matching_frame_size(self) -> PhysFrameSize {
        match self {
            VirtPageSize::Size4KiB => PhysFrameSize::Size4KiB,
            VirtPageSize::Size2MiB => PhysFrameSize::Size2MiB,
            VirtPageSize::Size1GiB => PhysFrameSize::Size1GiB,
        }
    }
}

impl fmt::Display for VirtPageSize {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VirtPageSize::Size4KiB => write!(f, "4KiB"),
            VirtPageSize::Size2MiB => write!(f, "2MiB"),
            VirtPageSize::Size1GiB => write!(f, "1GiB"),
        }
    }
}

/// A page-aligned, page-sized region of virtual memory.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VirtPage {
    start: VirtAddr,
    size: VirtPageSize,
}

impl VirtPage {
    /// Returns the page of the given size starting at `addr`.
    ///
    /// Returns [`InvalidAddress`] if `addr` is not aligned to `size`.
    ///
    pub fn from_start_address(addr: VirtAddr, size: VirtPageSize) -> Result<Self, InvalidAddress> {
        if !addr.is_aligned(size.bytes()) {
            return Err(InvalidAddress(addr.as_u64()));
        }

        Ok(VirtPage { start: addr, size })
    }

    /// Returns the page of the given size containing `addr`.
    ///
    pub fn containing_address(addr: VirtAddr, size: VirtPageSize) -> Self {
        VirtPage {
            start: addr.align_down(size.bytes()),
            size,
        }
    }

    /// Returns the page's start address.
    ///
    pub const fn start_address(self) -> VirtAddr {
        self.start
    }

    /// Returns the address immediately after the end of the page.
    ///
    pub fn end_address(self) -> VirtAddr {
        self.start + self.size.bytes()
    }

    /// Returns the page's size.
    ///
    pub const fn size(self) -> VirtPageSize {
        self.size
    }
}

impl fmt::Display for VirtPage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "VirtPage[{}]({})", self.size, self.start)
    }
}

/// An inclusive-exclusive range of contiguous virtual pages: `[start, end)`.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtPageRange {
    pub start: VirtPage,
    pub end: VirtPage,
}

impl VirtPageRange {
    /// Returns the range `[start, end)`. Both pages must share a size.
    ///
    pub fn new(start: VirtPage, end: VirtPage) -> Self {
        assert_eq!(start.size(), end.size(), "range pages must share a size");
        VirtPageRange { start, end }
    }

    /// Returns the number of pages in the range.
    ///
    pub fn len(self) -> u64 {
        let step = self.start.size().bytes();
        let start = self.start.start_address().as_u64();
        let end = self.end.start_address().as_u64();
        if end <= start {
            0
        } else {
            (end - start) / step
        }
    }

    /// Returns whether the range contains no pages.
    ///
    pub fn is_empty(self) -> bool {
        self.len() == 0
    }
}

impl Iterator for VirtPageRange {
    type Item = VirtPage;

    fn next(&mut self) -> Option<VirtPage> {
        if self.start.start_address() >= self.end.start_address() {
            return None;
        }

        let page = self.start;
        self.start =
            VirtPage::from_start_address(self.start.start_address() + self.start.size().bytes(), self.start.size())
                .expect("page arithmetic overflowed");
        Some(page)
    }
}
