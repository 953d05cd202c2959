//! Virtual-memory manager: page-directory construction, mapping,
//! eager-copy fork, teardown, and `sbrk`. Grounded on
//! `original_source/source/kernel/core/memory.c`.

use super::frame_alloc::FRAME_ALLOCATOR;
use super::page_table::{page_align_up, pd_index, pt_index, Entry, Perm, Table};
use crate::config::{PAGE_SIZE, TASK_BASE};
use crate::error::{KResult, KernelError};

/// Physical address of the kernel master page directory, whose lower-half
/// PDEs every user directory copies at creation time.
static mut KERNEL_DIR_PHYS: u32 = 0;

/// Describes one identity-mapped region installed by [`VmManager::create_kernel_map`].
pub struct KernelRegion {
    pub start: u32,
    pub end: u32,
    pub perm: Perm,
}

pub struct VmManager;

impl VmManager {
    /// Establish identity mappings for the kernel's lower half: text
    /// (split read-only/writable at the link-reported boundary), data up
    /// to the console MMIO window, the console window itself, and all of
    /// physical RAM from 1 MiB up to the detected top. Kernel PDEs carry
    /// the user-accessible bit so that per-process PTEs can still restrict
    /// user access; actual ring-3 access is denied at the PTE level.
    pub fn create_kernel_map(regions: &[KernelRegion]) -> KResult<u32> {
        let dir_phys = FRAME_ALLOCATOR.alloc_zeroed()?;
        // Safety: `dir_phys` was just allocated and zeroed by the frame
        // allocator and is not yet visible to any other task.
        let dir = unsafe { Table::at_mut(dir_phys) };

        for region in regions {
            let mut vaddr = page_align_up(region.start).min(region.start);
            while vaddr < region.end {
                Self::map_one(dir, vaddr, vaddr, region.perm)?;
                vaddr += PAGE_SIZE as u32;
            }
        }

        // Safety: single-threaded boot-time initialization, before any
        // other task exists to race on this static.
        unsafe {
            KERNEL_DIR_PHYS = dir_phys;
        }
        Ok(dir_phys)
    }

    /// Allocate a fresh user address space: a zeroed directory whose
    /// lower-half PDEs are copied from the kernel master directory,
    /// leaving the upper half entirely absent.
    pub fn create_user_space() -> KResult<u32> {
        let dir_phys = FRAME_ALLOCATOR.alloc_zeroed()?;
        // Safety: same reasoning as in `create_kernel_map`: freshly
        // allocated, not yet shared.
        let dir = unsafe { Table::at_mut(dir_phys) };
        // Safety: `KERNEL_DIR_PHYS` was initialized once at boot before any
        // user space could be created.
        let kernel_dir = unsafe { Table::at_mut(KERNEL_DIR_PHYS) };

        let split = pd_index(TASK_BASE);
        dir.entries[..split].copy_from_slice(&kernel_dir.entries[..split]);
        Ok(dir_phys)
    }

    fn map_one(dir: &mut Table, vaddr: u32, paddr: u32, perm: Perm) -> KResult<()> {
        let pde_idx = pd_index(vaddr);
        let pte_idx = pt_index(vaddr);

        if !dir.entries[pde_idx].is_present() {
            let table_phys = FRAME_ALLOCATOR.alloc_zeroed()?;
            dir.entries[pde_idx].set_table(table_phys);
        }

        // Safety: the PDE above was just verified/made present and refers
        // to a zeroed, exclusively-owned page-table frame.
        let table = unsafe { Table::at_mut(dir.entries[pde_idx].phys_addr()) };
        debug_assert!(
            !table.entries[pte_idx].is_present(),
            "remapping an already-present page"
        );
        table.entries[pte_idx].set(paddr, perm);
        Ok(())
    }

    /// Map `count` pages starting at `vstart` in `dir` to the physical
    /// pages starting at `pstart`, materializing any absent page-table
    /// frame along the way.
    pub fn map(dir_phys: u32, vstart: u32, pstart: u32, count: usize, perm: Perm) -> KResult<()> {
        // Safety: caller guarantees `dir_phys` names a live directory.
        let dir = unsafe { Table::at_mut(dir_phys) };
        for i in 0..count {
            Self::map_one(
                dir,
                vstart + (i * PAGE_SIZE) as u32,
                pstart + (i * PAGE_SIZE) as u32,
                perm,
            )?;
        }
        Ok(())
    }

    /// Allocate `count` physical frames (not necessarily contiguous) and
    /// map them starting at `vstart`. Frees everything allocated so far on
    /// failure, so no partial mapping is ever left leaked.
    pub fn alloc_pages_for_task(
        dir_phys: u32,
        vstart: u32,
        count: usize,
        perm: Perm,
    ) -> KResult<()> {
        let dir = unsafe { Table::at_mut(dir_phys) };
        let mut allocated: heapless_small_vec::SmallVec = heapless_small_vec::SmallVec::new();
        for i in 0..count {
            match FRAME_ALLOCATOR.alloc_zeroed() {
                Ok(frame) => {
                    let vaddr = vstart + (i * PAGE_SIZE) as u32;
                    if let Err(e) = Self::map_one(dir, vaddr, frame, perm) {
                        FRAME_ALLOCATOR.free(frame, 1);
                        for &f in allocated.iter() {
                            FRAME_ALLOCATOR.free(f, 1);
                        }
                        return Err(e);
                    }
                    allocated.push(frame);
                }
                Err(e) => {
                    for &f in allocated.iter() {
                        FRAME_ALLOCATOR.free(f, 1);
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Translate a virtual address in `dir` to its physical address, or
    /// `None` if any level of the walk is absent.
    #[must_use]
    pub fn vaddr_to_paddr(dir_phys: u32, vaddr: u32) -> Option<u32> {
        // Safety: caller guarantees `dir_phys` is a live directory.
        let dir = unsafe { Table::at_mut(dir_phys) };
        let pde = dir.entries[pd_index(vaddr)];
        if !pde.is_present() {
            return None;
        }
        // Safety: PDE just verified present, points at a valid table.
        let table = unsafe { Table::at_mut(pde.phys_addr()) };
        let pte = table.entries[pt_index(vaddr)];
        if !pte.is_present() {
            return None;
        }
        Some(pte.phys_addr() | (vaddr & (PAGE_SIZE as u32 - 1)))
    }

    /// Copy bytes into `dir`'s address space at `to_v`, translating one
    /// page at a time; the source lives in the *current* address space
    /// (typically the kernel), since a freshly-built directory is not yet
    /// the active one.
    pub fn copy_into_user_space(dir_phys: u32, to_v: u32, from: &[u8]) -> KResult<()> {
        let mut remaining = from;
        let mut v = to_v;
        while !remaining.is_empty() {
            let page_off = (v % PAGE_SIZE as u32) as usize;
            let chunk = (PAGE_SIZE - page_off).min(remaining.len());
            let paddr =
                Self::vaddr_to_paddr(dir_phys, v).ok_or(KernelError::InvalidArgument)?;
            // Safety: `paddr` is a present, owned frame in `dir_phys`'s
            // address space, reachable through the kernel's identity map.
            unsafe {
                core::ptr::copy_nonoverlapping(
                    remaining.as_ptr(),
                    paddr as *mut u8,
                    chunk,
                );
            }
            remaining = &remaining[chunk..];
            v += chunk as u32;
        }
        Ok(())
    }

    /// Eager-copy fork: allocate a fresh user space, then for every
    /// present user-range PTE in `src_dir`, allocate a new frame, copy its
    /// contents, and install it with identical permission bits.
    pub fn copy_address_space(src_dir_phys: u32) -> KResult<u32> {
        let new_dir_phys = Self::create_user_space()?;
        let split = pd_index(TASK_BASE);

        // Safety: caller guarantees `src_dir_phys` is a live directory.
        let src_dir = unsafe { Table::at_mut(src_dir_phys) };

        for pde_idx in split..1024 {
            if !src_dir.entries[pde_idx].is_present() {
                continue;
            }
            // Safety: PDE verified present.
            let src_table = unsafe { Table::at_mut(src_dir.entries[pde_idx].phys_addr()) };
            for pte_idx in 0..1024 {
                let src_pte = src_table.entries[pte_idx];
                if !src_pte.is_present() {
                    continue;
                }
                let vaddr = ((pde_idx as u32) << 22) | ((pte_idx as u32) << 12);
                let perm = Perm {
                    writable: bitflags_writable(src_pte),
                    user: true,
                };
                let new_frame = match FRAME_ALLOCATOR.alloc_zeroed() {
                    Ok(f) => f,
                    Err(e) => {
                        Self::destroy_address_space(new_dir_phys);
                        return Err(e);
                    }
                };
                // Safety: both `src_pte.phys_addr()` and `new_frame` are
                // identity-mapped, page-sized, non-overlapping frames.
                unsafe {
                    core::ptr::copy_nonoverlapping(
                        src_pte.phys_addr() as *const u8,
                        new_frame as *mut u8,
                        PAGE_SIZE,
                    );
                }
                let new_dir = unsafe { Table::at_mut(new_dir_phys) };
                if let Err(e) = Self::map_one(new_dir, vaddr, new_frame, perm) {
                    FRAME_ALLOCATOR.free(new_frame, 1);
                    Self::destroy_address_space(new_dir_phys);
                    return Err(e);
                }
            }
        }

        Ok(new_dir_phys)
    }

    /// Walk every present user-range PDE/PTE, freeing data frames and
    /// page-table frames, then free the directory itself. Idempotent for
    /// `dir_phys == 0`.
    pub fn destroy_address_space(dir_phys: u32) {
        if dir_phys == 0 {
            return;
        }
        let split = pd_index(TASK_BASE);
        // Safety: caller guarantees `dir_phys` is a live, exclusively-owned
        // directory about to be torn down.
        let dir = unsafe { Table::at_mut(dir_phys) };
        for pde_idx in split..1024 {
            if !dir.entries[pde_idx].is_present() {
                continue;
            }
            let table_phys = dir.entries[pde_idx].phys_addr();
            let table = unsafe { Table::at_mut(table_phys) };
            for pte in table.entries.iter() {
                if pte.is_present() {
                    FRAME_ALLOCATOR.free(pte.phys_addr(), 1);
                }
            }
            FRAME_ALLOCATOR.free(table_phys, 1);
        }
        FRAME_ALLOCATOR.free(dir_phys, 1);
    }

    /// Grow the calling task's heap by `incr` bytes, allocating pages
    /// lazily only when the new end crosses a page boundary. Returns the
    /// *previous* end. Negative `incr` is rejected, returning the current
    /// end unchanged (this is the only user-visible program-break growth
    /// mechanism).
    pub fn sys_sbrk(incr: i32) -> KResult<u32> {
        let id = crate::task::current_id().ok_or(KernelError::InvalidArgument)?;
        let mut table = crate::task::TASK_TABLE.lock();
        let task = table.get_mut(id);
        let old_end = task.heap_end;

        if incr < 0 {
            return Ok(old_end);
        }
        if incr == 0 {
            return Ok(old_end);
        }

        let new_end = old_end + incr as u32;
        let old_top = page_align_up(old_end);
        let new_top = page_align_up(new_end);

        if new_top > old_top {
            let grow_pages = ((new_top - old_top) / PAGE_SIZE as u32) as usize;
            Self::alloc_pages_for_task(task.page_dir_phys, old_top, grow_pages, Perm::USER_RW)?;
        }

        task.heap_end = new_end;
        Ok(old_end)
    }
}

fn bitflags_writable(entry: Entry) -> bool {
    use super::page_table::EntryFlags;
    EntryFlags::from_bits_truncate(entry.0).contains(EntryFlags::WRITABLE)
}

/// A tiny growable buffer of physical frame addresses used only by
/// [`VmManager::alloc_pages_for_task`]'s rollback path, sized for the
/// largest single allocation request this kernel ever issues (the user
/// stack, `STACK_PAGES`).
mod heapless_small_vec {
    use crate::config::STACK_PAGES;

    pub struct SmallVec {
        buf: [u32; STACK_PAGES],
        len: usize,
    }

    impl SmallVec {
        pub const fn new() -> Self {
            Self {
                buf: [0; STACK_PAGES],
                len: 0,
            }
        }

        pub fn push(&mut self, value: u32) {
            if self.len < self.buf.len() {
                self.buf[self.len] = value;
                self.len += 1;
            }
        }

        pub fn iter(&self) -> core::slice::Iter<'_, u32> {
            self.buf[..self.len].iter()
        }
    }
}
