//! Preemptive 32-bit x86 kernel: a bitmap-backed VM manager, a
//! round-robin preemptive scheduler, fork/exec/wait process lifecycle,
//! syscall dispatch through a call gate, a FAT16-on-ATA filesystem, and a
//! multi-console TTY layer.
//!
//! Boot order (see [`kernel_main`]): GDT, IDT, kernel address space, heap,
//! console, devices, filesystems, the syscall call gate, then the idle and
//! main tasks, before handing off to the scheduler.

#![no_std]
#![cfg_attr(test, no_main)]
#![feature(custom_test_frameworks)]
#![test_runner(crate::test_runner)]
#![reexport_test_harness_main = "test_main"]

extern crate alloc;

use core::panic::PanicInfo;

pub mod allocator;
pub mod arch;
pub mod boot;
pub mod collections;
pub mod config;
pub mod console;
pub mod device;
pub mod error;
pub mod fs;
pub mod gdt;
pub mod idt;
pub mod memory;
pub mod serial;
pub mod sync;
pub mod syscall;
pub mod task;

use memory::page_table::Perm;
use memory::vm::KernelRegion;
use memory::VmManager;

const QEMU_EXIT_PORT: u16 = 0xf4;

/// Test entry point for cargo test.
#[cfg(test)]
#[unsafe(no_mangle)]
pub extern "C" fn _start() -> ! {
    test_main();
    arch::x86::hlt_loop();
}

/// Define possible exit code for qemu.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum QemuExitCode {
    /// Define a successfull exit status
    Success = 0x10,
    /// Define a failure exit status
    Failure = 0x11,
}

/// Exit qemu with a specific exit code, via the isa-debug-exit device.
/// Configuration for the exit port is in `.cargo/config.toml`'s runner.
pub fn exit_qemu(exit_code: QemuExitCode) {
    // Safety: the isa-debug-exit device only exists under the test runner
    // configuration's QEMU invocation; writing its one-byte status port is
    // always valid there.
    unsafe {
        arch::x86::outb(QEMU_EXIT_PORT, exit_code as u32 as u8);
    }
}

/// Panic handler for external (functional) tests.
pub fn test_panic_handler(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("Error: {}\n", info);
    exit_qemu(QemuExitCode::Failure);
    arch::x86::hlt_loop();
}

/// Custom test runner for `no_std` testing.
pub fn test_runner(tests: &[&dyn Testable]) {
    println!("Running {} tests", tests.len());
    for test in tests {
        test.run();
    }

    exit_qemu(QemuExitCode::Success);
}

/// Panic handler for unit tests.
#[cfg(test)]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    serial_println!("[failed]\n");
    serial_println!("Error: {}\n", info);
    exit_qemu(QemuExitCode::Failure);
    arch::x86::hlt_loop();
}

/// Trait to generalize tests cases.
/// Encapsulate the prints
pub trait Testable {
    /// Function that encapsulate the test run function.
    fn run(&self);
}

impl<T> Testable for T
where
    T: Fn(),
{
    fn run(&self) {
        use core::any::type_name;

        serial_print!("{}...\t", type_name::<T>());
        self();
        serial_println!("[ok]");
    }
}

extern "C" {
    /// Defined by `linker.ld`, just past `.boot`; the start of the
    /// identity-mapped read-only kernel text/rodata region.
    static __kernel_start: u8;
    /// Defined by `linker.ld`; the end of the kernel image, rounded up to
    /// a page. Everything from here to the top of detected RAM is mapped
    /// read-write for the heap, task tables, and frame bitmap.
    static __kernel_end: u8;
}

/// One MiB: where the kernel is linked to run, and the low boundary of
/// the "all of RAM" identity map (below it sits real-mode memory and
/// memory-mapped device windows this kernel does not touch directly
/// except through the VGA text window, mapped separately).
const RAM_MAP_START: u32 = 0x0010_0000;

/// VGA text-mode plane: `CONSOLE_NUM * CONSOLE_ROW * CONSOLE_COL` cells,
/// comfortably inside the legacy 32 KiB window at `0xB8000`.
const VGA_MMIO_START: u32 = 0x000B_8000;
const VGA_MMIO_END: u32 = 0x000C_0000;

/// Boot glue, called once by the Multiboot2 entry trampoline in
/// `entry_point.rs` with the loader-provided info pointer. Never returns:
/// the last step hands off to the preemptive scheduler.
///
/// # Safety
/// Must be called exactly once, with paging already enabled and `ebx`'s
/// original value (the multiboot info pointer) passed through unmodified,
/// per the boot contract `entry_point.rs`'s trampoline establishes.
pub unsafe fn kernel_main(multiboot_info: *const u8) -> ! {
    gdt::init();
    idt::init();

    // Safety: `multiboot_info` is the pointer the loader handed to the
    // trampoline, unmodified, per this function's own contract.
    let ram_region = unsafe { boot::largest_available_region(multiboot_info) };
    let (ram_base, ram_len) = ram_region.map_or((RAM_MAP_START, 0), |r| {
        (r.base.max(u64::from(RAM_MAP_START)) as u32, r.length as u32)
    });
    let ram_top = ram_base.saturating_add(ram_len).max(RAM_MAP_START);

    // Safety: `__kernel_start`/`__kernel_end` are `linker.ld`-defined
    // addresses, not objects; only their addresses are ever taken.
    let kernel_start = unsafe { core::ptr::addr_of!(__kernel_start) as u32 };
    let kernel_end = unsafe { core::ptr::addr_of!(__kernel_end) as u32 };

    let regions = [
        KernelRegion { start: kernel_start, end: kernel_end, perm: Perm::KERNEL_RW },
        KernelRegion { start: VGA_MMIO_START, end: VGA_MMIO_END, perm: Perm::KERNEL_RW },
        KernelRegion { start: RAM_MAP_START, end: ram_top, perm: Perm::KERNEL_RW },
    ];
    if VmManager::create_kernel_map(&regions).is_err() {
        boot_fail("failed to establish the kernel address space");
    }

    memory::frame_alloc::FRAME_ALLOCATOR.init(RAM_MAP_START, ram_top - RAM_MAP_START);

    // Safety: the kernel map above identity-maps the heap's backing
    // storage, and this is the only call to `init_heap` in the boot path.
    unsafe {
        allocator::init_heap();
    }

    console::select(0);
    println!("protean_os booting...");

    device::init();
    fs::init();
    syscall::entry::install();

    if task::process::bootstrap(task::IDLE_TASK_ID, "idle", task::process::idle_task_entry).is_err()
    {
        boot_fail("failed to create the idle task");
    }
    if task::process::bootstrap(task::MAIN_TASK_ID, "main", task::process::main_task_entry)
        .is_err()
    {
        boot_fail("failed to create the main task");
    }
    task::process::start(task::MAIN_TASK_ID);

    task::scheduler::dispatch();
    arch::x86::hlt_loop();
}

/// Log a boot-time fatal error to both the active console and the serial
/// log, then halt. Distinct from `idt`'s exception `fatal` handler, which
/// reports a trap frame rather than a one-line message.
fn boot_fail(message: &str) -> ! {
    println!("FATAL: {message}");
    log_println!("FATAL: {message}");
    arch::x86::hlt_loop();
}
