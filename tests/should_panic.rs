//! Test that a failing assertion is reported as expected: the harness
//! treats a panic in the test body as success and a return without
//! panicking as failure.

#![no_std]
#![no_main]
#![feature(custom_test_frameworks)]
#![test_runner(test_runner)]
#![reexport_test_harness_main = "test_main"]

#[path = "boot_shim.rs"]
mod boot_shim;

use core::panic::PanicInfo;
use protean_os::{exit_qemu, serial_println, QemuExitCode};

/// Entry point for the test, called by `boot_shim`'s Multiboot2 trampoline.
#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    test_main();
    protean_os::arch::x86::hlt_loop();
}

/// Test runner for this test file: a test that returns without panicking
/// is itself a failure, since every `#[test_case]` here is expected to
/// panic.
pub fn test_runner(tests: &[&dyn Fn()]) {
    serial_println!("Running {} tests", tests.len());
    for test in tests {
        test();
        serial_println!("[test did not panic]");
        exit_qemu(QemuExitCode::Failure);
    }
    exit_qemu(QemuExitCode::Success);
}

#[panic_handler]
fn panic(_info: &PanicInfo) -> ! {
    serial_println!("[ok]");
    exit_qemu(QemuExitCode::Success);
    protean_os::arch::x86::hlt_loop();
}

/// Test that should panic.
/// # Panics
/// Fails if the test does not panic.
#[test_case]
fn should_fail() {
    serial_println!("should_panic::should_fail...\t");
    assert_eq!(0, 1, "This test should panic.");
}
