//! Kernel heap, backed by `linked_list_allocator` as in the teacher crate.
//!
//! The teacher mapped a fresh virtual range and backed it with frames from
//! its own allocator before handing it to `linked_list_allocator`. This
//! kernel's [`crate::memory::vm::VmManager::create_kernel_map`] already
//! identity-maps all of physical RAM from 1 MiB up through the detected
//! top with write permission, so the heap can simply live in a statically
//! reserved region of the kernel image itself -- no extra page-table work
//! needed, matching how `gdt::Tss` and the original's double-fault stack
//! both reserve backing storage as a plain `static`.

use linked_list_allocator::LockedHeap;

/// Size of the kernel heap, in bytes.
pub const HEAP_SIZE: usize = 1024 * 1024;

/// Backing storage for the heap. Lives in `.bss`, inside the kernel's
/// already-identity-mapped lower half.
static mut HEAP: [u8; HEAP_SIZE] = [0; HEAP_SIZE];

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Hand the reserved `HEAP` region to the global allocator. Must be called
/// exactly once, after paging is enabled, before any `alloc` use.
///
/// # Safety
/// Must run before the first allocation and only once; `HEAP` must not be
/// referenced any other way afterwards.
pub unsafe fn init_heap() {
    let start = &raw mut HEAP as *mut u8;
    unsafe {
        ALLOCATOR.lock().init(start, HEAP_SIZE);
    }
}
