//! Shared Multiboot2 header + entry trampoline for integration test
//! binaries. Each `tests/*.rs` file is its own freestanding binary linked
//! against `linker.ld`, which requires a `multiboot_entry` symbol exactly
//! like the real kernel binary's in `src/entry_point.rs`; this module is
//! pulled in with `#[path = "boot_shim.rs"] mod boot_shim;` so every
//! integration test gets the same trampoline without duplicating the
//! assembly by hand.

use core::arch::global_asm;

const BOOT_STACK_SIZE: usize = 16 * 1024;

global_asm!(
    r#"
.code32
.section .boot.header, "a"
.align 8
header:
    .long 0xe85250d6
    .long 0
    .long (header_end - header)
    .long -(0xe85250d6 + (header_end - header))

.align 8
entry_address_tag:
    .short 3
    .short 0
    .long (entry_address_tag_end - entry_address_tag)
    .long multiboot_entry
entry_address_tag_end:

.align 8
    .short 0
    .short 0
    .long 8
header_end:
"#
);

global_asm!(
    r#"
.section .boot.stack, "aw", @nobits
.align 16
boot_stack_bottom:
    .skip {BOOT_STACK_SIZE}
boot_stack_top:
"#,
    BOOT_STACK_SIZE = const BOOT_STACK_SIZE,
);

global_asm!(
    r#"
.section .boot.text, "ax"
.global multiboot_entry
multiboot_entry:
    mov esp, offset boot_stack_top
    xor ebp, ebp
    call _start
    ud2
"#
);
