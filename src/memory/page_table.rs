//! Two-level 32-bit page table types: 1024-entry directories and tables,
//! 4 KiB pages. Grounded on the PDE/PTE layout implied throughout
//! `original_source/source/kernel/core/memory.c`.

use crate::config::PAGE_SIZE;
use bitflags::bitflags;

bitflags! {
    /// Flag bits shared by page-directory and page-table entries.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct EntryFlags: u32 {
        const PRESENT  = 1 << 0;
        const WRITABLE = 1 << 1;
        const USER     = 1 << 2;
        const ACCESSED = 1 << 5;
        const DIRTY    = 1 << 6;
    }
}

/// Permission bits exposed to callers of [`super::vm::VmManager::map`],
/// translated into [`EntryFlags`] internally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Perm {
    pub writable: bool,
    pub user: bool,
}

impl Perm {
    pub const KERNEL_RW: Self = Self {
        writable: true,
        user: false,
    };
    pub const KERNEL_RO: Self = Self {
        writable: false,
        user: false,
    };
    pub const USER_RW: Self = Self {
        writable: true,
        user: true,
    };
    pub const USER_RO: Self = Self {
        writable: false,
        user: true,
    };

    fn to_flags(self) -> EntryFlags {
        let mut flags = EntryFlags::PRESENT;
        if self.writable {
            flags |= EntryFlags::WRITABLE;
        }
        if self.user {
            flags |= EntryFlags::USER;
        }
        flags
    }
}

/// A raw 32-bit entry: 20 bits of physical frame number, 12 bits of flags.
#[derive(Clone, Copy, Debug, Default)]
#[repr(transparent)]
pub struct Entry(pub u32);

const ADDR_MASK: u32 = 0xFFFF_F000;

impl Entry {
    #[must_use]
    pub const fn empty() -> Self {
        Self(0)
    }

    #[must_use]
    pub fn is_present(self) -> bool {
        EntryFlags::from_bits_truncate(self.0).contains(EntryFlags::PRESENT)
    }

    #[must_use]
    pub fn phys_addr(self) -> u32 {
        self.0 & ADDR_MASK
    }

    pub fn set(&mut self, phys: u32, perm: Perm) {
        debug_assert_eq!(phys & !ADDR_MASK, 0, "frame address must be page-aligned");
        self.0 = (phys & ADDR_MASK) | perm.to_flags().bits();
    }

    /// PDE-specific constructor: page-table frames are always present,
    /// writable, and user-accessible at the PDE level so that per-process
    /// pages can refine access at the PTE level, per specification §4.1.
    pub fn set_table(&mut self, table_phys: u32) {
        self.set(
            table_phys,
            Perm {
                writable: true,
                user: true,
            },
        );
    }
}

/// A 1024-entry page table or page directory, exactly one physical page.
#[repr(C, align(4096))]
pub struct Table {
    pub entries: [Entry; 1024],
}

impl Table {
    /// View the physical page at `phys` as a `Table`, through its identity
    /// mapping in the kernel's lower half.
    ///
    /// # Safety
    /// `phys` must be the address of a frame the caller owns as a page
    /// table or directory, and must remain identity-mapped and exclusively
    /// owned by the VM manager for the lifetime of the returned reference.
    #[must_use]
    pub unsafe fn at_mut<'a>(phys: u32) -> &'a mut Table {
        unsafe { &mut *(phys as *mut Table) }
    }

    pub fn zero(&mut self) {
        for e in self.entries.iter_mut() {
            *e = Entry::empty();
        }
    }
}

#[must_use]
pub const fn pd_index(vaddr: u32) -> usize {
    (vaddr >> 22) as usize
}

#[must_use]
pub const fn pt_index(vaddr: u32) -> usize {
    ((vaddr >> 12) & 0x3FF) as usize
}

#[must_use]
pub const fn page_align_down(addr: u32) -> u32 {
    addr & !(PAGE_SIZE as u32 - 1)
}

#[must_use]
pub const fn page_align_up(addr: u32) -> u32 {
    page_align_down(addr + PAGE_SIZE as u32 - 1)
}
