// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! Closes [`physmem::IdentityMapProbe`] over [`pagetable::translate`],
//! the only seam `physmem` needs from the page-table engine.

use mm_types::VirtAddr;
use physmem::IdentityMapProbe;

pub struct KernelIdentityProbe;

impl IdentityMapProbe for KernelIdentityProbe {
    fn kernel_va_unmapped(&self, phys: u64) -> bool {
        let root = pagetable::kernel_directory();
        pagetable::translate(root, VirtAddr::new(phys)).is_none()
    }
}
