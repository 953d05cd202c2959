//! Hand-rolled 32-bit IDT: exception handlers that dump registers and halt,
//! and the two legacy-PIC IRQ handlers (timer tick, keyboard) this kernel
//! actually runs on. The disk driver installs its own IRQ14 handler through
//! [`register_irq_handler`] rather than hard-coding it here, matching the
//! original's per-device `register_irq_handler` call in `dev_init`.
//!
//! Grounded on `original_source/source/kernel/core/irq.c` (vector layout,
//! PIC remap range) and the teacher's `src/interrupts.rs` for the overall
//! shape (a lazily-built table, a breakpoint/double-fault/timer/keyboard
//! handler set), rewritten against hand-rolled 32-bit gate descriptors and
//! `naked_asm!` stubs instead of the `x86_64` crate's `extern "x86-interrupt"`
//! ABI, which this 32-bit kernel cannot use.

use crate::config::IDT_TABLE_SIZE;
use crate::gdt::KERNEL_CODE_SELECTOR;
use crate::{arch::x86, device, println, task::scheduler};
use core::arch::naked_asm;
use spin::Mutex;

/// PIC1 is remapped to start at vector 32, clear of the CPU's reserved
/// 0..=31 exception range.
pub const PIC_1_OFFSET: u8 = 32;
/// PIC2 follows immediately after PIC1's eight lines.
pub const PIC_2_OFFSET: u8 = PIC_1_OFFSET + 8;

pub static PICS: Mutex<pic8259::ChainedPics> =
    Mutex::new(unsafe { pic8259::ChainedPics::new(PIC_1_OFFSET, PIC_2_OFFSET) });

const TIMER_VECTOR: u8 = PIC_1_OFFSET;
const KEYBOARD_VECTOR: u8 = PIC_1_OFFSET + 1;
/// IRQ14 (primary ATA channel), the only line [`device::disk`] registers a
/// handler for.
pub const DISK_VECTOR: u8 = PIC_1_OFFSET + 14;

static IDT: Mutex<[u64; IDT_TABLE_SIZE]> = Mutex::new([0; IDT_TABLE_SIZE]);

/// Optional handlers hardware-IRQ vectors dispatch to beyond the two fixed
/// ones below, installed at runtime by the device that owns the line.
static IRQ_HANDLERS: Mutex<[Option<fn()>; IDT_TABLE_SIZE]> = Mutex::new([None; IDT_TABLE_SIZE]);

#[repr(C, packed)]
struct IdtPointer {
    limit: u16,
    base: u32,
}

/// Registers pushed by a stub (in push order, so popped in reverse), plus
/// the vector/error-code pair the stub pushes before them and the CPU's own
/// `eip`/`cs`/`eflags`.
#[repr(C)]
struct TrapFrame {
    edi: u32,
    esi: u32,
    ebp: u32,
    ebx: u32,
    edx: u32,
    ecx: u32,
    eax: u32,
    vector: u32,
    error_code: u32,
    eip: u32,
    cs: u32,
    eflags: u32,
}

fn encode_interrupt_gate(offset: u32) -> u64 {
    let access: u64 = 0x8E; // present, DPL 0, type 1110 (32-bit interrupt gate)
    u64::from(offset & 0xFFFF)
        | u64::from(KERNEL_CODE_SELECTOR) << 16
        | access << 40
        | u64::from(offset >> 16) << 48
}

fn install(vector: u8, handler: unsafe extern "C" fn()) {
    IDT.lock()[vector as usize] = encode_interrupt_gate(handler as u32);
}

/// Register a handler for a hardware IRQ vector beyond timer/keyboard;
/// called by [`device::disk::init`] for IRQ14.
pub fn register_irq_handler(vector: u8, handler: fn()) {
    IRQ_HANDLERS.lock()[vector as usize] = Some(handler);
}

/// Build the IDT, load it, and remap + unmask the PIC lines this kernel
/// uses. Called once during boot glue, after [`crate::gdt::init`].
pub fn init() {
    install(0, divide_error_stub);
    install(3, breakpoint_stub);
    install(8, double_fault_stub);
    install(13, general_protection_stub);
    install(14, page_fault_stub);
    install(TIMER_VECTOR, timer_stub);
    install(KEYBOARD_VECTOR, keyboard_stub);
    install(DISK_VECTOR, generic_irq_stub);

    let gdt_len = core::mem::size_of::<[u64; IDT_TABLE_SIZE]>();
    let base = IDT.lock().as_ptr() as u32;
    let pointer = IdtPointer {
        limit: (gdt_len - 1) as u16,
        base,
    };

    // SAFETY: `pointer` describes the just-initialized static IDT.
    unsafe {
        core::arch::asm!("lidt [{0}]", in(reg) &raw const pointer, options(nostack));
    }

    // SAFETY: the PIC ports are only ever touched here and in the EOI calls
    // below, both under the PICS lock.
    unsafe {
        PICS.lock().initialize();
    }
}

fn end_of_interrupt(vector: u8) {
    // SAFETY: `vector` was a vector this handler was actually invoked for.
    unsafe {
        PICS.lock().notify_end_of_interrupt(vector);
    }
}

extern "C" fn common_handler(frame: *mut TrapFrame) {
    // Safety: `frame` points at the TrapFrame a stub just built on the
    // current stack; it is valid for the duration of this call.
    let frame = unsafe { &*frame };
    match frame.vector {
        0 => fatal("DIVIDE ERROR", frame),
        3 => println!("EXCEPTION: BREAKPOINT at {:#x}", frame.eip),
        8 => fatal("DOUBLE FAULT", frame),
        13 => fatal("GENERAL PROTECTION FAULT", frame),
        14 => {
            let fault_addr = unsafe { x86::read_cr3() };
            println!(
                "EXCEPTION: PAGE FAULT accessing around cr3={:#010x} error={:#x}",
                fault_addr, frame.error_code
            );
            fatal("PAGE FAULT", frame);
        }
        v if v == u32::from(TIMER_VECTOR) => {
            end_of_interrupt(TIMER_VECTOR);
            scheduler::time_tick();
        }
        v if v == u32::from(KEYBOARD_VECTOR) => {
            device::keyboard::on_irq();
            end_of_interrupt(KEYBOARD_VECTOR);
        }
        v => {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "vector is always < IDT_TABLE_SIZE (256)"
            )]
            let handler = IRQ_HANDLERS.lock()[v as usize];
            if let Some(handler) = handler {
                handler();
            }
            #[expect(
                clippy::cast_possible_truncation,
                reason = "vector is always < IDT_TABLE_SIZE (256)"
            )]
            end_of_interrupt(v as u8);
        }
    }
}

fn fatal(name: &str, frame: &TrapFrame) -> ! {
    println!(
        "FATAL: {name} eip={:#010x} cs={:#06x} eflags={:#010x} error={:#010x}",
        frame.eip, frame.cs, frame.eflags, frame.error_code,
    );
    x86::hlt_loop();
}

macro_rules! trap_stub_no_error {
    ($name:ident, $vector:expr) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            naked_asm!("push 0", "push {v}", "jmp {common}", v = const $vector, common = sym common_entry);
        }
    };
}

macro_rules! trap_stub_with_error {
    ($name:ident, $vector:expr) => {
        #[unsafe(naked)]
        unsafe extern "C" fn $name() {
            naked_asm!("push {v}", "jmp {common}", v = const $vector, common = sym common_entry);
        }
    };
}

trap_stub_no_error!(divide_error_stub, 0u32);
trap_stub_no_error!(breakpoint_stub, 3u32);
trap_stub_with_error!(double_fault_stub, 8u32);
trap_stub_with_error!(general_protection_stub, 13u32);
trap_stub_with_error!(page_fault_stub, 14u32);
trap_stub_no_error!(timer_stub, u32::from(TIMER_VECTOR));
trap_stub_no_error!(keyboard_stub, u32::from(KEYBOARD_VECTOR));
trap_stub_no_error!(generic_irq_stub, u32::from(DISK_VECTOR));

/// Shared tail every stub above jumps into once `vector`/`error_code` are on
/// the stack: save the general-purpose registers, call [`common_handler`]
/// with a pointer to the resulting [`TrapFrame`], restore them, and drop the
/// vector/error-code pair before `iretd`.
#[unsafe(naked)]
unsafe extern "C" fn common_entry() {
    naked_asm!(
        "push eax",
        "push ecx",
        "push edx",
        "push ebx",
        "push ebp",
        "push esi",
        "push edi",
        "push esp",
        "call {handler}",
        "add esp, 4",
        "pop edi",
        "pop esi",
        "pop ebp",
        "pop ebx",
        "pop edx",
        "pop ecx",
        "pop eax",
        "add esp, 8",
        "iretd",
        handler = sym common_handler,
    );
}
