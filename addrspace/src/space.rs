// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The Address-Space Manager's contract (`§4.3`): `create`, `destroy`,
//! `switch_to`, and `teardown`. `preallocate_tables` lives in
//! [`crate::walk`], shared with the fork protocol it also serves.

use core::sync::atomic::{AtomicU64, Ordering};

use mm_types::{MmError, PhysAddr, PhysFrame, PhysFrameAllocator, PhysFrameDeallocator, PAGE_SIZE};
use pagetable::{PageTable, ENTRIES};
use tlb::ParticipationSet;
use x86_64::registers::control::{Cr3, Cr3Flags};
use x86_64::structures::paging::{PhysFrame as HwPhysFrame, Size4KiB};
use x86_64::PhysAddr as HwPhysAddr;

use crate::walk;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// One address space: a root page table plus the bookkeeping the TLB
/// coherence layer needs to know who has it loaded.
///
pub struct AddressSpace {
    root: PhysAddr,
    id: u64,
    participants: ParticipationSet,
}

impl AddressSpace {
    /// Allocates and zeros a new root table, copies the kernel half from
    /// the kernel directory, and installs the self-map (`§4.3`,
    /// `create`).
    ///
    /// # Panics
    ///
    /// Panics if [`pagetable::init_kernel_directory`] has not yet run;
    /// there is no well-formed kernel half to copy before then.
    ///
    pub fn create(allocator: &mut dyn PhysFrameAllocator) -> Result<Self, MmError> {
        let frame = allocator
            .allocate_phys_frame()
            .ok_or(MmError::OutOfMemory { count: 1, alignment: PAGE_SIZE })?;
        let root = frame.start_address();
        let table = unsafe { PageTable::at(root) };
        table.zero();

        let kernel_root = pagetable::kernel_directory();
        let kernel_table = unsafe { PageTable::at(kernel_root) };
        for index in walk::KERNEL_PML4_RANGE {
            let entry = kernel_table[index];
            if entry.is_present() {
                table[index] = entry;
            }
        }

        pagetable::install_self_map(root);

        Ok(AddressSpace {
            root,
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            participants: ParticipationSet::new(),
        })
    }

    /// Returns the physical address of the root table, for callers that
    /// must drive [`pagetable`] operations directly (`map`, `unmap`,
    /// `translate`, and the fork protocol in [`crate::fork`]).
    ///
    pub fn root(&self) -> PhysAddr {
        self.root
    }

    /// Returns the identifier used to address this space in shootdown
    /// requests and crash records.
    ///
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Returns the set of CPUs that currently have this space loaded.
    ///
    pub fn participants(&self) -> &ParticipationSet {
        &self.participants
    }

    /// Publishes this space's root to `cpu`'s translation base register
    /// (`§4.3`, `switch_to`).
    ///
    /// `before_publish` runs first, so a caller that owns a hardware
    /// task-save area (e.g. a TSS `RSP0` field) can update it before the
    /// root changes; `§4.3` requires that ordering so a non-maskable
    /// interrupt arriving mid-switch never observes a root and a
    /// task-save area that disagree about which space is current.
    ///
    pub fn switch_to(&self, cpu: usize, before_publish: impl FnOnce()) {
        before_publish();

        let hw_frame = HwPhysFrame::<Size4KiB>::from_start_address(HwPhysAddr::new(self.root.as_u64()))
            .expect("address space root is not frame-aligned");
        unsafe { Cr3::write(hw_frame, Cr3Flags::empty()) };

        self.participants.add(cpu);
    }

    /// Tears down the user half of this space. When `terminated`, every
    /// leaf table (and its parent directories) the user half points to
    /// is freed and the top-level entries are zeroed; the kernel half is
    /// untouched either way (`§4.3`, `teardown`).
    ///
    /// Leaves `terminated = false` as a no-op: nothing in `§4.3`
    /// describes a non-terminal teardown, but the flag is kept so a
    /// caller's intent is explicit at the call site rather than implied
    /// by which function it chose to call.
    ///
    pub fn teardown(&self, terminated: bool, deallocator: &mut dyn PhysFrameDeallocator) {
        if terminated {
            walk::free_user_tables(self.root, deallocator);
        }
    }

    /// Frees the root table. Called once the last thread has exited and
    /// [`teardown`](Self::teardown) has already torn down every user
    /// mapping (`§4.3`, `destroy`).
    ///
    /// # Panics
    ///
    /// Panics if any leaf table is still reachable from the user half,
    /// per `§4.3`'s "asserts the leaf-table count is zero".
    ///
    pub fn destroy(self, deallocator: &mut dyn PhysFrameDeallocator) {
        assert_eq!(
            walk::count_user_leaf_tables(self.root),
            0,
            "address space {} destroyed with user mappings still live",
            self.id
        );

        if let Ok(frame) = PhysFrame::from_start_address(self.root, mm_types::PhysFrameSize::Size4KiB) {
            unsafe { deallocator.deallocate_phys_frame(frame) };
        }
    }
}

const _: () = assert!(ENTRIES == 512, "PML4 kernel/user split assumes 512 entries per table");

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::boxed::Box;
    use alloc::vec::Vec;
    use mm_types::{PageTableFlags, PhysFrameSize};

    #[repr(align(4096))]
    struct AlignedFrame([u8; 4096]);

    struct PoolAllocator {
        frames: Vec<Box<AlignedFrame>>,
        next: usize,
    }

    impl PoolAllocator {
        fn new(capacity: usize) -> Self {
            let mut frames = Vec::with_capacity(capacity);
            for _ in 0..capacity {
                frames.push(Box::new(AlignedFrame([0u8; 4096])));
            }
            PoolAllocator { frames, next: 0 }
        }

        fn take(&mut self) -> PhysAddr {
            let addr = PhysAddr::new(self.frames[self.next].0.as_ptr() as u64);
            self.next += 1;
            addr
        }
    }

    unsafe impl PhysFrameAllocator for PoolAllocator {
        fn allocate_phys_frame(&mut self) -> Option<PhysFrame> {
            if self.next >= self.frames.len() {
                return None;
            }
            let addr = self.take();
            Some(PhysFrame::from_start_address(addr, PhysFrameSize::Size4KiB).unwrap())
        }
    }

    struct NullDeallocator;
    impl PhysFrameDeallocator for NullDeallocator {
        unsafe fn deallocate_phys_frame(&mut self, _frame: PhysFrame) {}
    }

    fn setup() {
        PageTable::set_test_offset(0);
    }

    /// Leaks a frame rather than taking one from the caller's pool: the
    /// kernel directory is a process-wide `Once`, so whichever test
    /// first calls `init_kernel_directory` wins for the rest of the test
    /// binary, and its backing frame must outlive that test's own pool.
    ///
    fn leaked_frame() -> PhysAddr {
        let leaked: &'static mut AlignedFrame = Box::leak(Box::new(AlignedFrame([0u8; 4096])));
        PhysAddr::new(leaked.0.as_ptr() as u64)
    }

    /// Returns the authoritative kernel directory, initializing it with
    /// a leaked frame if no earlier test in this binary already has.
    ///
    fn ensure_test_kernel_directory() -> PhysAddr {
        let candidate = leaked_frame();
        unsafe { PageTable::at(candidate) }.zero();
        pagetable::init_kernel_directory(candidate);
        pagetable::kernel_directory()
    }

    #[test]
    fn create_copies_kernel_half_and_installs_self_map() {
        setup();
        let mut pool = PoolAllocator::new(8);
        let kernel_root = ensure_test_kernel_directory();

        let kernel_va = memlayout::KERNELSPACE.start();
        let kernel_target = pool.take();
        unsafe {
            pagetable::map(
                kernel_root,
                kernel_va,
                kernel_target,
                PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
                &mut pool,
            )
        }
        .unwrap();

        let space = AddressSpace::create(&mut pool).unwrap();
        assert_eq!(pagetable::translate(space.root(), kernel_va), pagetable::translate(kernel_root, kernel_va));

        let table = unsafe { PageTable::at(space.root()) };
        assert!(table[memlayout::SELF_MAP_PML4_INDEX].is_present());
    }

    #[test]
    #[should_panic(expected = "user mappings still live")]
    fn destroy_panics_if_user_mappings_remain() {
        setup();
        let mut pool = PoolAllocator::new(8);
        ensure_test_kernel_directory();
        let space = AddressSpace::create(&mut pool).unwrap();

        let target = pool.take();
        unsafe {
            pagetable::map(
                space.root(),
                memlayout::USERSPACE.start(),
                target,
                PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE,
                &mut pool,
            )
        }
        .unwrap();

        space.destroy(&mut NullDeallocator);
    }

    #[test]
    fn teardown_then_destroy_frees_every_user_table() {
        setup();
        let mut pool = PoolAllocator::new(16);
        ensure_test_kernel_directory();
        let space = AddressSpace::create(&mut pool).unwrap();

        let target = pool.take();
        unsafe {
            pagetable::map(
                space.root(),
                memlayout::USERSPACE.start(),
                target,
                PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE,
                &mut pool,
            )
        }
        .unwrap();

        space.teardown(true, &mut NullDeallocator);
        space.destroy(&mut NullDeallocator);
    }
}
