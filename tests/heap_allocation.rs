//! Tests for heap allocation in a `no_std` environment using the kernel's
//! own `linked_list_allocator`-backed heap.
#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(protean_os::test_runner)]
#![reexport_test_harness_main = "test_main"]
#![allow(missing_docs)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_assert_message)]
extern crate alloc;

#[path = "boot_shim.rs"]
mod boot_shim;

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::panic::PanicInfo;
use protean_os::allocator::{self, HEAP_SIZE};

/// Entry point for the test, called by `boot_shim`'s Multiboot2
/// trampoline. The heap's backing storage is a statically-reserved
/// region inside the kernel image, already covered by the loader's
/// identity map, so no paging setup is needed before [`allocator::init_heap`].
#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    // Safety: the first and only call to `init_heap`, before any `alloc`
    // use in this binary.
    unsafe {
        allocator::init_heap();
    }

    test_main();
    protean_os::arch::x86::hlt_loop();
}

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    protean_os::test_panic_handler(info)
}

#[test_case]
fn when_creating_simple_allocation_then_memory_is_allocated() {
    let heap_value_1 = Box::new(41);
    let heap_value_2 = Box::new(42);

    assert_eq!(*heap_value_1, 41);
    assert_eq!(*heap_value_2, 42);
}

#[test_case]
fn when_creating_large_vec_then_memory_is_allocated() {
    let mut vec = Vec::new();
    for i in 0..1000 {
        vec.push(i);
    }
    assert_eq!(vec.iter().sum::<u64>(), (0..1000).sum());
}

#[test_case]
fn when_many_boxes_are_allocated_then_memory_is_allocated() {
    for i in 0..HEAP_SIZE {
        let x = Box::new(i);
        assert_eq!(*x, i);
    }
}
