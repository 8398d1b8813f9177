// Copyright 2026 The Memory Manager Authors.
//
// Use of this source code is governed by a BSD 3-clause
// license that can be found in the LICENSE file.

//! The page-table engine's contract (`§4.2`): `map`, `unmap`,
//! `translate`, `translate_foreign`, `change_access`,
//! `copy_on_write_range`, and `ensure_tables`, plus the self-map
//! installer the Address-Space Manager calls from `create` (`§4.3`).

extern crate alloc;

use alloc::vec::Vec;
use memlayout::SELF_MAP_PML4_INDEX;
use mm_types::{
    MmError, PageTableFlags, PhysAddr, PhysFrame, PhysFrameAllocator, PhysFrameDeallocator,
    PhysFrameSize, VirtAddr, PAGE_SIZE,
};
use x86_64::instructions::tlb;
use x86_64::VirtAddr as HwVirtAddr;

use crate::kernel_dir;
use crate::pte::Pte;
use crate::table::PageTable;

const PAGE_TABLE_BITS: u64 = 9;

fn parent_flags() -> PageTableFlags {
    PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE
}

/// Returns the child table an entry points at, allocating and zeroing a
/// fresh frame for it first if the entry is not yet present.
///
fn ensure_child(
    entry: &mut Pte,
    flags: PageTableFlags,
    allocator: &mut dyn PhysFrameAllocator,
) -> Result<&'static mut PageTable, MmError> {
    if entry.is_present() {
        let current = entry.flags();
        if !flags.is_empty() && !current.contains(flags) {
            entry.set_flags(current | flags);
        }
        return Ok(unsafe { PageTable::at(entry.addr()) });
    }

    let frame = allocator.allocate_phys_frame().ok_or(MmError::OutOfMemory {
        count: 1,
        alignment: PAGE_SIZE,
    })?;
    entry.set(frame.start_address(), flags | PageTableFlags::PRESENT);

    let table = unsafe { PageTable::at(frame.start_address()) };
    table.zero();
    Ok(table)
}

/// Walks to the leaf entry covering `va` without allocating. Returns
/// `None` if any directory on the way is absent or is a huge-page leaf
/// at a higher level than the one requested.
///
unsafe fn leaf_entry_mut(root: PhysAddr, va: VirtAddr) -> Option<&'static mut Pte> {
    let l4 = PageTable::at(root);
    let e4 = l4[va.page_table_index(4)];
    if !e4.is_present() {
        return None;
    }

    let l3 = PageTable::at(e4.addr());
    let e3 = l3[va.page_table_index(3)];
    if !e3.is_present() || e3.flags().contains(PageTableFlags::HUGE_PAGE) {
        return None;
    }

    let l2 = PageTable::at(e3.addr());
    let e2 = l2[va.page_table_index(2)];
    if !e2.is_present() || e2.flags().contains(PageTableFlags::HUGE_PAGE) {
        return None;
    }

    let l1 = PageTable::at(e2.addr());
    Some(&mut l1[va.page_table_index(1)])
}

/// Installs a PTE at `va` pointing to `pa`, allocating any missing
/// parent tables from `allocator` on the way.
///
/// # Safety
///
/// The caller must ensure no other live reference to `pa` is used in a
/// way that conflicts with this mapping, and that `root` is a live PML4.
///
pub unsafe fn map(
    root: PhysAddr,
    va: VirtAddr,
    pa: PhysAddr,
    flags: PageTableFlags,
    allocator: &mut dyn PhysFrameAllocator,
) -> Result<(), MmError> {
    if !flags.is_valid_combination() {
        return Err(MmError::PreconditionFailed);
    }

    let l4 = PageTable::at(root);
    let l3 = ensure_child(&mut l4[va.page_table_index(4)], parent_flags(), allocator)?;
    let l2 = ensure_child(&mut l3[va.page_table_index(3)], parent_flags(), allocator)?;
    let l1 = ensure_child(&mut l2[va.page_table_index(2)], parent_flags(), allocator)?;

    let entry = &mut l1[va.page_table_index(1)];
    if entry.is_present() {
        return Err(MmError::PreconditionFailed);
    }
    entry.set(pa, flags | PageTableFlags::PRESENT);

    kernel_dir::sync_kernel_entry(root, va);

    Ok(())
}

/// Options controlling [`unmap`]'s behaviour, matching `§4.2`'s three
/// independent flags.
///
#[derive(Debug, Clone, Copy, Default)]
pub struct UnmapOptions {
    pub free_physical: bool,
    pub send_invalidate_ipi: bool,
    pub report_dirty: bool,
}

/// The result of an [`unmap`] call.
///
#[derive(Debug)]
pub struct UnmapOutcome {
    /// Whether any unmapped PTE had the dirty bit set, when
    /// `report_dirty` was requested.
    pub any_dirty: bool,
    /// The flush a caller must resolve before relying on the range
    /// being unobservable on any CPU.
    pub flush: FlushRange,
}

/// A pending TLB invalidation for a virtual address range, produced by
/// an operation that reduced a mapping's reach.
///
/// Mirrors the deferred-shootdown optimization of `§4.4`: the caller
/// decides when (or whether) to pay the cost of flushing, rather than
/// the engine doing it inline on every PTE write.
///
#[must_use = "a page mapping change must be flushed locally, handed to the TLB coherence \
              service for cross-processor shootdown, or explicitly ignored"]
#[derive(Debug)]
pub struct FlushRange {
    start: VirtAddr,
    end: VirtAddr,
    needs_flush: bool,
}

impl FlushRange {
    /// A flush with nothing to do: the result of an operation that
    /// touched no PTE whose reach shrank.
    ///
    pub fn none() -> Self {
        FlushRange {
            start: VirtAddr::zero(),
            end: VirtAddr::zero(),
            needs_flush: false,
        }
    }

    /// Combines two flushes into the one a caller would need to resolve
    /// both: the union of their ranges, needing a flush if either did.
    ///
    /// Used to fold several operations' flushes (e.g. one per section in
    /// a fork) into the single deferred shootdown `§4.4` calls for.
    ///
    pub fn merge(self, other: Self) -> Self {
        if !self.needs_flush {
            return other;
        }
        if !other.needs_flush {
            return self;
        }
        FlushRange {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            needs_flush: true,
        }
    }

    /// Returns whether any PTE in the range actually lost reach; a
    /// caller may use this to skip a shootdown entirely.
    ///
    pub fn needs_flush(&self) -> bool {
        self.needs_flush
    }

    /// Returns the covered virtual address range.
    ///
    pub fn range(&self) -> (VirtAddr, VirtAddr) {
        (self.start, self.end)
    }

    /// Invalidates the range in this CPU's local TLB, one page at a
    /// time. Use this when the caller has already established (via the
    /// single-threaded shortcut, `§4.5`) that no other CPU can hold a
    /// stale translation.
    ///
    pub fn flush_local(self) {
        if !self.needs_flush {
            return;
        }
        let mut va = self.start;
        while va < self.end {
            tlb::flush(HwVirtAddr::new(va.as_u64()));
            va = va + PAGE_SIZE;
        }
    }

    /// Discards the pending flush without invalidating anything.
    ///
    pub fn ignore(self) {}
}

/// Clears PTEs covering `count` pages starting at `start`, per `§4.2`'s
/// two-pass (now three-step) contract: present bits are cleared before
/// the caller is handed the flush, and only after that is resolved
/// should physical frames be freed.
///
/// # Safety
///
/// The caller must ensure the unmapped range is not concurrently in use
/// for any purpose that depends on the mapping's continued presence.
///
pub unsafe fn unmap(
    root: PhysAddr,
    start: VirtAddr,
    count: usize,
    options: UnmapOptions,
    deallocator: &mut dyn PhysFrameDeallocator,
) -> Result<UnmapOutcome, MmError> {
    if count == 0 {
        return Ok(UnmapOutcome {
            any_dirty: false,
            flush: FlushRange::none(),
        });
    }

    let mut cleared: Vec<(PhysAddr, bool)> = Vec::new();
    let mut va = start;
    for _ in 0..count {
        if let Some(entry) = leaf_entry_mut(root, va) {
            if entry.is_present() {
                let addr = entry.addr();
                let dirty = entry.flags().contains(PageTableFlags::DIRTY);
                entry.clear();
                cleared.push((addr, dirty));
            }
        }
        va = va + PAGE_SIZE;
    }

    let flush = if options.send_invalidate_ipi && !cleared.is_empty() {
        FlushRange {
            start,
            end: va,
            needs_flush: true,
        }
    } else {
        FlushRange::none()
    };

    let mut any_dirty = false;
    for (addr, dirty) in cleared {
        if options.report_dirty {
            any_dirty |= dirty;
        }
        if options.free_physical {
            if let Ok(frame) = PhysFrame::from_start_address(addr, PhysFrameSize::Size4KiB) {
                deallocator.deallocate_phys_frame(frame);
            }
        }
    }

    Ok(UnmapOutcome { any_dirty, flush })
}

/// Translates `va` to its physical address and the flags that governed
/// the translation, walking `root` directly.
///
/// Reads the table through the all-physical-memory mapping rather than
/// the currently active root, so this never needs the caller to switch
/// address spaces first; [`translate_foreign`] is the same walk under a
/// different name for callers that want to be explicit about walking a
/// non-active space (the priority-raise `§4.2` requires is the caller's
/// responsibility, since this crate has no notion of dispatch levels).
///
pub fn translate(root: PhysAddr, va: VirtAddr) -> Option<(PhysAddr, PageTableFlags)> {
    let l4 = unsafe { PageTable::at(root) };
    let e4 = l4[va.page_table_index(4)];
    if !e4.is_present() {
        return None;
    }

    let l3 = unsafe { PageTable::at(e4.addr()) };
    let e3 = l3[va.page_table_index(3)];
    if !e3.is_present() {
        return None;
    }
    if e3.flags().contains(PageTableFlags::HUGE_PAGE) {
        let frame = e3.frame(PhysFrameSize::Size1GiB)?;
        let offset = va.as_u64() & (PhysFrameSize::Size1GiB.bytes() - 1);
        return Some((frame.start_address() + offset, e3.flags()));
    }

    let l2 = unsafe { PageTable::at(e3.addr()) };
    let e2 = l2[va.page_table_index(2)];
    if !e2.is_present() {
        return None;
    }
    if e2.flags().contains(PageTableFlags::HUGE_PAGE) {
        let frame = e2.frame(PhysFrameSize::Size2MiB)?;
        let offset = va.as_u64() & (PhysFrameSize::Size2MiB.bytes() - 1);
        return Some((frame.start_address() + offset, e2.flags()));
    }

    let l1 = unsafe { PageTable::at(e2.addr()) };
    let e1 = l1[va.page_table_index(1)];
    if !e1.is_present() {
        return None;
    }
    let frame = e1.frame(PhysFrameSize::Size4KiB)?;
    let offset = va.as_u64() & (PhysFrameSize::Size4KiB.bytes() - 1);
    Some((frame.start_address() + offset, e1.flags()))
}

/// Walks a (possibly inactive) address space's tables without switching
/// to it. See [`translate`] for why this crate needs no separate
/// scratch-mapping implementation to do so.
///
pub fn translate_foreign(root: PhysAddr, va: VirtAddr) -> Option<(PhysAddr, PageTableFlags)> {
    translate(root, va)
}

/// Bulk-changes the flags selected by `mask` on `count` present PTEs
/// starting at `start`, leaving unselected bits untouched. Pages that
/// are not currently mapped are skipped.
///
/// Returns the flush a caller must resolve; per `§4.5`, only a
/// present-to-absent or writable-to-read-only transition sets it.
///
pub fn change_access(
    root: PhysAddr,
    start: VirtAddr,
    count: usize,
    new_flags: PageTableFlags,
    mask: PageTableFlags,
) -> FlushRange {
    let mut va = start;
    let mut needs_flush = false;
    for _ in 0..count {
        if let Some(entry) = unsafe { leaf_entry_mut(root, va) } {
            if entry.is_present() {
                let old = entry.flags();
                let updated = (old & !mask) | (new_flags & mask);
                if old.requires_invalidate(updated) {
                    needs_flush = true;
                }
                entry.set_flags(updated);
            }
        }
        va = va + PAGE_SIZE;
    }

    FlushRange {
        start,
        end: va,
        needs_flush,
    }
}

/// The outcome of a [`copy_on_write_range`] call.
///
#[derive(Debug, Clone, Copy, Default)]
pub struct CowStats {
    /// The net change in resident-set count the destination space
    /// should apply (`§3`, invariant 5): one per PTE copied.
    pub resident_set_delta: u64,
}

/// Sets every present, writable, user-accessible PTE in
/// `[start, start + size)` of `src_root` to read-only, and copies the
/// resulting PTE into the matching position of `dst_root` with the
/// dirty bit cleared.
///
/// Does not allocate: the destination's leaf tables must already exist
/// (from [`ensure_tables`]), or this returns
/// [`MmError::PreconditionFailed`] without touching the source further.
/// Already-read-only source PTEs are left untouched and skipped, making
/// repeated calls over overlapping ranges idempotent.
///
/// The returned [`FlushRange`] covers `[start, start + size)` and needs
/// a flush whenever at least one PTE actually lost its writable bit;
/// `§4.4` defers issuing it until every section in a fork has been
/// processed, so this never flushes on the caller's behalf.
///
pub fn copy_on_write_range(
    src_root: PhysAddr,
    dst_root: PhysAddr,
    start: VirtAddr,
    size: u64,
) -> Result<(CowStats, FlushRange), MmError> {
    let count = size / PAGE_SIZE;
    let mut stats = CowStats::default();
    let mut touched = false;
    let mut va = start;

    for _ in 0..count {
        let src_entry = match unsafe { leaf_entry_mut(src_root, va) } {
            Some(entry) => entry,
            None => {
                va = va + PAGE_SIZE;
                continue;
            }
        };

        let flags = src_entry.flags();
        let cow_eligible = flags.contains(PageTableFlags::PRESENT)
            && flags.contains(PageTableFlags::WRITABLE)
            && flags.contains(PageTableFlags::USER_ACCESSIBLE);

        if cow_eligible {
            // Resolve the destination before mutating anything in the
            // source, so a missing destination leaf table leaves the
            // source untouched.
            let dst_entry =
                unsafe { leaf_entry_mut(dst_root, va) }.ok_or(MmError::PreconditionFailed)?;

            let read_only = flags - PageTableFlags::WRITABLE;
            let addr = src_entry.addr();
            src_entry.set_flags(read_only);
            dst_entry.set(addr, read_only - PageTableFlags::DIRTY);
            stats.resident_set_delta += 1;
            touched = true;
        }

        va = va + PAGE_SIZE;
    }

    let flush = if touched {
        FlushRange { start, end: va, needs_flush: true }
    } else {
        FlushRange::none()
    };

    Ok((stats, flush))
}

/// Pre-installs any directory and leaf tables missing over
/// `[start, start + size)`, allocating from `allocator`.
///
pub fn ensure_tables(
    root: PhysAddr,
    start: VirtAddr,
    size: u64,
    allocator: &mut dyn PhysFrameAllocator,
) -> Result<(), MmError> {
    let end = start + size;
    let span = PAGE_SIZE << PAGE_TABLE_BITS; // bytes covered by one leaf table (2 MiB)
    let l4 = unsafe { PageTable::at(root) };

    let mut va = start.align_down(span);
    while va < end {
        let l3 = ensure_child(&mut l4[va.page_table_index(4)], parent_flags(), allocator)?;
        let l2 = ensure_child(&mut l3[va.page_table_index(3)], parent_flags(), allocator)?;
        let _l1 = ensure_child(&mut l2[va.page_table_index(2)], parent_flags(), allocator)?;

        kernel_dir::sync_kernel_entry(root, va);

        match va.as_u64().checked_add(span) {
            Some(next) if VirtAddr::try_new(next).is_ok() => va = VirtAddr::new(next),
            _ => break,
        }
    }

    Ok(())
}

/// Installs the self-map slot in `root`: the PML4 entry at
/// [`SELF_MAP_PML4_INDEX`] that points back at `root` itself, exposing
/// every table in this address space at a fixed kernel VA (`§4.2`,
/// "Self-map"). Not used by this crate's own walks (see [`translate`]),
/// but kept so the layout documented in `memlayout` is a real,
/// observable mapping for any other collaborator that relies on it.
///
pub fn install_self_map(root: PhysAddr) {
    let table = unsafe { PageTable::at(root) };
    table[SELF_MAP_PML4_INDEX].set(root, PageTableFlags::PRESENT | PageTableFlags::WRITABLE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use mm_types::{PhysFrame, PhysFrameSize};

    #[repr(align(4096))]
    struct AlignedFrame([u8; 4096]);

    /// A bump allocator over a fixed pool of aligned frames, standing in
    /// for `physmem::GlobalFrameAllocator` in these unit tests.
    ///
    struct PoolAllocator {
        frames: Vec<alloc::boxed::Box<AlignedFrame>>,
        next: usize,
    }

    impl PoolAllocator {
        fn new(capacity: usize) -> Self {
            let mut frames = Vec::with_capacity(capacity);
            for _ in 0..capacity {
                frames.push(alloc::boxed::Box::new(AlignedFrame([0u8; 4096])));
            }
            PoolAllocator { frames, next: 0 }
        }

        fn root(&mut self) -> PhysAddr {
            self.take()
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

    /// Every test treats heap-allocated frames as physical addresses
    /// directly: `PageTable::set_test_offset(0)` makes `PageTable::at`
    /// resolve a "physical" address straight to that same address
    /// instead of adding the real all-physical-memory offset, which
    /// has nothing live behind it in a unit test process.
    fn setup() {
        PageTable::set_test_offset(0);
    }

    fn va(v: u64) -> VirtAddr {
        VirtAddr::new(v)
    }

    #[test]
    fn map_then_translate_round_trips() {
        setup();
        let mut pool = PoolAllocator::new(8);
        let root = pool.root();
        unsafe { PageTable::at(root) }.zero();

        let target = pool.take();
        let virt = va(0x4444_0000);
        let flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE;

        unsafe { map(root, virt, target, flags, &mut pool) }.unwrap();

        let (resolved, resolved_flags) = translate(root, virt).unwrap();
        assert_eq!(resolved, target);
        assert!(resolved_flags.contains(PageTableFlags::WRITABLE));
    }

    #[test]
    fn translate_foreign_matches_translate() {
        setup();
        let mut pool = PoolAllocator::new(8);
        let root = pool.root();
        unsafe { PageTable::at(root) }.zero();
        let target = pool.take();
        let virt = va(0x20_0000);

        unsafe { map(root, virt, target, PageTableFlags::PRESENT, &mut pool) }.unwrap();
        assert_eq!(translate(root, virt), translate_foreign(root, virt));
    }

    #[test]
    fn map_twice_is_rejected() {
        setup();
        let mut pool = PoolAllocator::new(8);
        let root = pool.root();
        unsafe { PageTable::at(root) }.zero();
        let target = pool.take();
        let virt = va(0x20_0000);

        unsafe { map(root, virt, target, PageTableFlags::PRESENT, &mut pool) }.unwrap();
        let second = unsafe { map(root, virt, target, PageTableFlags::PRESENT, &mut pool) };
        assert_eq!(second, Err(MmError::PreconditionFailed));
    }

    #[test]
    fn rejects_cache_disabled_and_write_through() {
        setup();
        let mut pool = PoolAllocator::new(8);
        let root = pool.root();
        unsafe { PageTable::at(root) }.zero();
        let target = pool.take();
        let flags =
            PageTableFlags::PRESENT | PageTableFlags::CACHE_DISABLED | PageTableFlags::WRITE_THROUGH;

        let result = unsafe { map(root, va(0x20_0000), target, flags, &mut pool) };
        assert_eq!(result, Err(MmError::PreconditionFailed));
    }

    #[test]
    fn unmap_clears_entry_and_reports_dirty() {
        setup();
        let mut pool = PoolAllocator::new(8);
        let root = pool.root();
        unsafe { PageTable::at(root) }.zero();
        let target = pool.take();
        let virt = va(0x20_0000);

        let flags = PageTableFlags::PRESENT | PageTableFlags::DIRTY;
        unsafe { map(root, virt, target, flags, &mut pool) }.unwrap();

        let options = UnmapOptions {
            free_physical: false,
            send_invalidate_ipi: true,
            report_dirty: true,
        };
        let outcome = unsafe { unmap(root, virt, 1, options, &mut NullDeallocator) }.unwrap();
        assert!(outcome.any_dirty);
        assert!(outcome.flush.needs_flush());
        outcome.flush.ignore();

        assert_eq!(translate(root, virt), None);
    }

    #[test]
    fn zero_length_unmap_is_a_no_op() {
        setup();
        let mut pool = PoolAllocator::new(4);
        let root = pool.root();
        unsafe { PageTable::at(root) }.zero();
        let outcome = unsafe {
            unmap(root, va(0x20_0000), 0, UnmapOptions::default(), &mut NullDeallocator)
        }
        .unwrap();
        assert!(!outcome.any_dirty);
        assert!(!outcome.flush.needs_flush());
    }

    #[test]
    fn change_access_flips_writable_and_flags_invalidate() {
        setup();
        let mut pool = PoolAllocator::new(8);
        let root = pool.root();
        unsafe { PageTable::at(root) }.zero();
        let target = pool.take();
        let virt = va(0x20_0000);
        unsafe {
            map(
                root,
                virt,
                target,
                PageTableFlags::PRESENT | PageTableFlags::WRITABLE,
                &mut pool,
            )
        }
        .unwrap();

        let flush = change_access(
            root,
            virt,
            1,
            PageTableFlags::empty(),
            PageTableFlags::WRITABLE,
        );
        assert!(flush.needs_flush());
        flush.ignore();

        let (_, flags) = translate(root, virt).unwrap();
        assert!(!flags.contains(PageTableFlags::WRITABLE));
    }

    #[test]
    fn copy_on_write_requires_preallocated_destination() {
        setup();
        let mut pool = PoolAllocator::new(8);
        let src_root = pool.root();
        unsafe { PageTable::at(src_root) }.zero();
        let dst_root = pool.root();
        unsafe { PageTable::at(dst_root) }.zero();

        let target = pool.take();
        let virt = va(0x20_0000);
        let flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE;
        unsafe { map(src_root, virt, target, flags, &mut pool) }.unwrap();

        let result = copy_on_write_range(src_root, dst_root, virt, PAGE_SIZE);
        assert_eq!(result.unwrap_err(), MmError::PreconditionFailed);

        // Source stayed writable: the failed call made no partial change.
        let (_, src_flags) = translate(src_root, virt).unwrap();
        assert!(src_flags.contains(PageTableFlags::WRITABLE));
    }

    #[test]
    fn copy_on_write_clears_writable_and_is_idempotent() {
        setup();
        let mut pool = PoolAllocator::new(16);
        let src_root = pool.root();
        unsafe { PageTable::at(src_root) }.zero();
        let dst_root = pool.root();
        unsafe { PageTable::at(dst_root) }.zero();

        let target = pool.take();
        let virt = va(0x20_0000);
        let flags = PageTableFlags::PRESENT | PageTableFlags::WRITABLE | PageTableFlags::USER_ACCESSIBLE;
        unsafe { map(src_root, virt, target, flags, &mut pool) }.unwrap();
        ensure_tables(dst_root, virt, PAGE_SIZE, &mut pool).unwrap();

        let (first, first_flush) = copy_on_write_range(src_root, dst_root, virt, PAGE_SIZE).unwrap();
        assert_eq!(first.resident_set_delta, 1);
        assert!(first_flush.needs_flush());
        first_flush.ignore();

        let (_, src_flags) = translate(src_root, virt).unwrap();
        assert!(!src_flags.contains(PageTableFlags::WRITABLE));
        let (dst_addr, dst_flags) = translate(dst_root, virt).unwrap();
        assert_eq!(dst_addr, target);
        assert!(!dst_flags.contains(PageTableFlags::WRITABLE));
        assert!(!dst_flags.contains(PageTableFlags::DIRTY));

        let (second, second_flush) = copy_on_write_range(src_root, dst_root, virt, PAGE_SIZE).unwrap();
        assert_eq!(second.resident_set_delta, 0);
        assert!(!second_flush.needs_flush());
        second_flush.ignore();
    }

    #[test]
    fn ensure_tables_allocates_leaf_table_once() {
        setup();
        let mut pool = PoolAllocator::new(8);
        let root = pool.root();
        unsafe { PageTable::at(root) }.zero();

        ensure_tables(root, va(0x20_0000), PAGE_SIZE, &mut pool).unwrap();
        let used_after_first = pool.next;
        ensure_tables(root, va(0x20_0000), PAGE_SIZE, &mut pool).unwrap();
        assert_eq!(pool.next, used_after_first, "second call must not allocate again");
    }

    #[test]
    fn self_map_exposes_root_at_its_own_slot() {
        setup();
        let mut pool = PoolAllocator::new(4);
        let root = pool.root();
        unsafe { PageTable::at(root) }.zero();

        install_self_map(root);
        let table = unsafe { PageTable::at(root) };
        assert_eq!(table[SELF_MAP_PML4_INDEX].addr(), root);
        assert!(table[SELF_MAP_PML4_INDEX].is_present());
    }
}
