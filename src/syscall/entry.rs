//! Ring-3 -> ring-0 call-gate trampoline. Grounded on the naked-asm entry
//! stub in the teacher's `src/userspace/syscall.rs`, generalized from a
//! one-shot two-syscall demo into the full dispatch table in
//! [`super::handlers`].

use super::handlers::dispatch;
use super::SyscallFrame;
use crate::config::SYS_GATE_INDEX;
use crate::gdt;
use core::arch::naked_asm;

/// Installed at `SYS_GATE_INDEX` in the GDT as a call gate with DPL=3, so
/// user code can `lcall` into it from ring 3. Saves every general-purpose
/// register the calling convention doesn't already preserve, builds a
/// [`SyscallFrame`] on the kernel stack, and calls [`dispatch`].
///
/// # Safety
/// Must only ever be reached through the call gate; it assumes the call
/// gate has already switched to the current task's ring-0 stack (per the
/// shared TSS's `esp0`, kept current by the scheduler's dispatch path) and
/// pushed the user `ss`/`esp`/`eflags`/`cs`/`eip` words below it.
#[unsafe(naked)]
pub unsafe extern "C" fn syscall_entry() {
    naked_asm!(
        "push eax",
        "push ecx",
        "push edx",
        "push ebx",
        "push ebp",
        "push esi",
        "push edi",
        "push esp", // &SyscallFrame
        "call {dispatch_trampoline}",
        "add esp, 4",
        "pop edi",
        "pop esi",
        "pop ebp",
        "pop ebx",
        "pop edx",
        "pop ecx",
        "pop eax",
        "iretd",
        dispatch_trampoline = sym dispatch_trampoline,
    );
}

/// Ordinary (non-naked) shim so [`dispatch`] can be written in plain Rust
/// with a typed `&mut SyscallFrame` instead of raw offsets.
extern "C" fn dispatch_trampoline(frame_ptr: *mut SyscallFrame) {
    // Safety: `frame_ptr` points at the register layout `syscall_entry`
    // just built on the kernel stack, matching `SyscallFrame`'s field
    // order exactly.
    let frame = unsafe { &mut *frame_ptr };
    let result = dispatch(frame.id(), frame.args());
    frame.eax = result as u32;
}

/// Register the call gate and load it into the IDT/GDT as appropriate for
/// this architecture. Called once during boot glue.
pub fn install() {
    gdt::install_call_gate(SYS_GATE_INDEX, syscall_entry as u32);
}
