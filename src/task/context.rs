//! Software context switch: save the outgoing task's callee-saved
//! registers on its own kernel stack, swap `esp`, load the incoming task's
//! `CR3`, and restore its callee-saved registers. Chosen over the
//! original's hardware TSS far-jump switch per the specification's §9
//! allowance ("the modern choice"). The calling convention mirrors the
//! register-save layout documented in the teacher's
//! `userspace/syscall.rs` syscall entry stub.

use core::arch::naked_asm;

/// Switch from the current stack to `next_esp`, loading `next_cr3` first.
/// If `prev_esp_ptr` is non-null, the current `esp` (after pushing
/// callee-saved registers) is written there before the switch, so the
/// outgoing task resumes exactly here the next time it is dispatched.
///
/// # Safety
/// `next_esp` must be a valid kernel-stack pointer previously produced by
/// this same function (or by initial task setup in
/// `crate::task::process::bootstrap`/`sys_fork`) for the task owning
/// `next_cr3`, and `prev_esp_ptr`, if non-null, must point at a live `u32`
/// that the scheduler will later read back in to resume this call's caller.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_to(prev_esp_ptr: *mut u32, next_esp: u32, next_cr3: u32) {
    naked_asm!(
        "push ebx",
        "push esi",
        "push edi",
        "push ebp",
        "mov eax, [esp + 20]", // prev_esp_ptr
        "test eax, eax",
        "jz 2f",
        "mov [eax], esp",
        "2:",
        "mov eax, [esp + 28]", // next_cr3
        "mov cr3, eax",
        "mov esp, [esp + 24]", // next_esp
        "pop ebp",
        "pop edi",
        "pop esi",
        "pop ebx",
        "ret",
    );
}

/// Initial layout a freshly-created task's kernel stack must have so that
/// the very first `switch_to` into it "returns" into a chosen entry
/// function instead of unwinding a real call. Used by `process::bootstrap`
/// for the idle/main tasks and by `process::sys_fork` (whose entry is a
/// trampoline that `iretd`s into the child's copied syscall frame) rather
/// than jumping to user code directly.
pub struct InitialFrame {
    pub ebp: u32,
    pub edi: u32,
    pub esi: u32,
    pub ebx: u32,
    pub return_eip: u32,
}

impl InitialFrame {
    #[must_use]
    pub const fn new(entry: u32) -> Self {
        Self {
            ebp: 0,
            edi: 0,
            esi: 0,
            ebx: 0,
            return_eip: entry,
        }
    }
}
