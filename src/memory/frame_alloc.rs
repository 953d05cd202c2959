//! Physical page-frame allocator: a single bitmap over every 4 KiB frame
//! from 1 MiB up to the top of detected RAM, rounded down to page size.
//! Its metadata sits just above the kernel image, as in the original.

use crate::collections::Bitmap;
use crate::config::PAGE_SIZE;
use crate::error::{KResult, KernelError};
use spin::Mutex;

/// Backing storage for the bitmap, sized for up to 512 MiB of tracked RAM
/// (`512 MiB / 4 KiB / 8 bits-per-byte`). Generous for a small kernel;
/// `FrameAllocator::init` only uses the prefix the detected RAM needs.
const BITMAP_BYTES: usize = (512 * 1024 * 1024 / PAGE_SIZE) / 8;

struct FrameAllocatorInner {
    storage: [u8; BITMAP_BYTES],
    base_frame: u32,
    frame_count: usize,
    initialized: bool,
}

/// Guards the frame bitmap, mirroring the original's dedicated allocator
/// mutex shared between process creation and the `sbrk` path.
pub struct FrameAllocator {
    inner: Mutex<FrameAllocatorInner>,
}

impl FrameAllocator {
    const fn new() -> Self {
        Self {
            inner: Mutex::new(FrameAllocatorInner {
                storage: [0u8; BITMAP_BYTES],
                base_frame: 0,
                frame_count: 0,
                initialized: false,
            }),
        }
    }

    /// Initialize tracking over `[base, base + len)`, physical addresses,
    /// rounding `len` down to whole pages. Called once at boot with the
    /// region above 1 MiB reported by the loader's memory map.
    pub fn init(&self, base: u32, len: u32) {
        let mut inner = self.inner.lock();
        inner.base_frame = base / PAGE_SIZE as u32;
        inner.frame_count = (len / PAGE_SIZE as u32) as usize;
        inner.initialized = true;
    }

    /// Allocate `count` contiguous physical frames; returns the physical
    /// address of the first one.
    pub fn alloc_contiguous(&self, count: usize) -> KResult<u32> {
        let mut inner = self.inner.lock();
        let frame_count = inner.frame_count;
        let base_frame = inner.base_frame;
        let mut bitmap = Bitmap::new(&mut inner.storage, frame_count);
        let start = bitmap
            .alloc_contiguous(count)
            .ok_or(KernelError::NoFreeFrame)?;
        Ok((base_frame + start as u32) * PAGE_SIZE as u32)
    }

    /// Allocate and zero a single physical frame, returning its address.
    /// Page-table and page-directory frames must start zeroed so unused
    /// slots read as not-present.
    pub fn alloc_zeroed(&self) -> KResult<u32> {
        let phys = self.alloc_contiguous(1)?;
        // Safety: `phys` was just reserved in the bitmap and is mapped
        // identically in the kernel's lower half, so writing through its
        // own address is valid until it is returned to the allocator.
        unsafe {
            core::ptr::write_bytes(phys as *mut u8, 0, PAGE_SIZE);
        }
        Ok(phys)
    }

    /// Free `count` contiguous frames starting at physical address `start`.
    pub fn free(&self, start: u32, count: usize) {
        let mut inner = self.inner.lock();
        let base_frame = inner.base_frame;
        let frame_count = inner.frame_count;
        let first = (start / PAGE_SIZE as u32).saturating_sub(base_frame) as usize;
        let mut bitmap = Bitmap::new(&mut inner.storage, frame_count);
        bitmap.free(first, count);
    }

    /// Count of frames currently marked allocated; used by the tested
    /// "no leak" invariant (specification §8, invariant 1).
    #[must_use]
    pub fn allocated_count(&self) -> usize {
        let mut inner = self.inner.lock();
        let frame_count = inner.frame_count;
        let bitmap = Bitmap::new(&mut inner.storage, frame_count);
        bitmap.count_set()
    }
}

pub static FRAME_ALLOCATOR: FrameAllocator = FrameAllocator::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn alloc_free_accounting() {
        let alloc = FrameAllocator::new();
        alloc.init(0x10_0000, 16 * PAGE_SIZE as u32);
        let a = alloc.alloc_contiguous(2).expect("alloc");
        assert_eq!(alloc.allocated_count(), 2);
        alloc.free(a, 2);
        assert_eq!(alloc.allocated_count(), 0);
    }
}
