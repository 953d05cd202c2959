//! Compile-time kernel parameters, the equivalent of the original `os_cfg.h`.

/// Maximum number of simultaneously-alive tasks (including the idle and main tasks' slots).
pub const TASK_NUM: usize = 128;

/// Number of GDT descriptors, one TSS per task plus a handful of fixed entries.
pub const GDT_TABLE_SIZE: usize = 256;

/// Number of IDT vectors programmed at boot.
pub const IDT_TABLE_SIZE: usize = 128;

/// Scheduler tick period, in milliseconds.
pub const OS_TICK_MS: u32 = 10;

/// Time-slice length, in ticks, granted to a task each time it is dispatched.
pub const TASK_TIME_SLICE_TICKS: u32 = 10;

/// Size of a page, and the granularity of all VM-manager operations.
pub const PAGE_SIZE: usize = 4096;

/// First virtual address of the per-process upper half; identical across all tasks.
pub const TASK_BASE: u32 = 0x8000_0000;

/// Size, in pages, of a task's ring-0 kernel stack.
pub const KERNEL_STACK_PAGES: usize = 1;

/// Top of the user stack (exclusive), common to every process.
pub const STACK_TOP: u32 = 0xE000_0000;

/// Size, in pages, of the user stack.
pub const STACK_PAGES: usize = 500;

/// Size, in pages, of the argv scratch page mapped just below the stack.
pub const ARG_PAGES: usize = 4;

/// Size in bytes of the argv/task_args descriptor area (one page).
pub const ARG_SIZE: usize = PAGE_SIZE;

/// Call-gate GDT index the syscall trampoline is installed at.
pub const SYS_GATE_INDEX: u16 = 32;

/// Physical sector size for all block devices.
pub const SECTOR_SIZE: usize = 512;

/// Number of global open-file slots.
pub const FILE_TABLE_SIZE: usize = 128;

/// Number of mount-table entries.
pub const FS_TABLE_SIZE: usize = 10;

/// Number of fds a single task may hold open at once.
pub const TASK_OFILE_NUM: usize = 16;

/// Number of virtual consoles (and TTYs); bounded by VGA's 32 KiB text plane.
pub const CONSOLE_NUM: usize = 8;

/// Rows per console.
pub const CONSOLE_ROW: usize = 25;

/// Columns per console.
pub const CONSOLE_COL: usize = 80;

/// Size of a TTY's input FIFO, in bytes.
pub const TTY_IBUF_SIZE: usize = 512;

/// Size of a TTY's output FIFO, in bytes.
pub const TTY_OBUF_SIZE: usize = 512;

/// Number of physical disks probed on the primary ATA channel.
pub const DISK_NUM: usize = 2;

/// Primary partitions tracked per disk, plus slot 0 for the whole disk.
pub const DISK_PRIM_PART_NUM: usize = 5;
