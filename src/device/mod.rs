//! Device drivers: PS/2 keyboard, ATA PIO disks, and the TTY line
//! discipline sitting between them and [`crate::fs::devfs`]. Grounded on
//! `original_source/source/kernel/dev/{dev.c,tty.c,disk.c}`.

pub mod disk;
pub mod keyboard;
pub mod tty;

/// Initialize every device this kernel drives, in the original's boot
/// order: disks first (so partition tables are known before FAT16 mounts),
/// then the TTYs, then the keyboard's IRQ registration.
pub fn init() {
    disk::init();
    tty::init();
    keyboard::init();
}
