//! System-call ids, the register frame the entry stub builds, and the
//! dispatch table. Grounded on the teacher's `src/userspace/syscall.rs`
//! (naked-asm entry shape, dispatch-by-match, `#[test_case]` unit-test
//! style) and on `original_source/source/kernel/core/task.c`'s `sys_*`
//! functions for semantics.

pub mod entry;
pub mod handlers;

/// Stable numeric ids, grouped as in the specification §4.4/§6: process
/// (0-6, 100), I/O (50-59), directory (60-63).
#[repr(u32)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyscallId {
    Msleep = 0,
    Getpid = 1,
    Fork = 2,
    Execve = 3,
    Yield = 4,
    Exit = 5,
    Wait = 6,
    Open = 50,
    Read = 51,
    Write = 52,
    Close = 53,
    Lseek = 54,
    Isatty = 55,
    Sbrk = 56,
    Fstat = 57,
    Dup = 58,
    Ioctl = 59,
    Opendir = 60,
    Readdir = 61,
    Closedir = 62,
    Unlink = 63,
    PrintMsg = 100,
}

impl SyscallId {
    #[must_use]
    pub fn from_raw(id: u32) -> Option<Self> {
        Some(match id {
            0 => Self::Msleep,
            1 => Self::Getpid,
            2 => Self::Fork,
            3 => Self::Execve,
            4 => Self::Yield,
            5 => Self::Exit,
            6 => Self::Wait,
            50 => Self::Open,
            51 => Self::Read,
            52 => Self::Write,
            53 => Self::Close,
            54 => Self::Lseek,
            55 => Self::Isatty,
            56 => Self::Sbrk,
            57 => Self::Fstat,
            58 => Self::Dup,
            59 => Self::Ioctl,
            60 => Self::Opendir,
            61 => Self::Readdir,
            62 => Self::Closedir,
            63 => Self::Unlink,
            100 => Self::PrintMsg,
            _ => return None,
        })
    }
}

/// The register snapshot the entry stub pushes onto the caller's kernel
/// stack before invoking [`handlers::dispatch`]. Offsets here must match
/// the push order in `entry::syscall_entry`. `fork` reads this frame
/// directly (via a raw pointer into the parent's kernel stack) to recover
/// the user context the child should resume in, exactly as the original
/// pulls the syscall frame off the top of the kernel stack.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct SyscallFrame {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub user_esp: u32,
    pub user_ss: u32,
}

impl SyscallFrame {
    /// The five 32-bit words (id, arg0..arg3) the call gate copies from the
    /// user stack, read back out once the frame is on the kernel stack.
    #[must_use]
    pub const fn args(&self) -> (u32, u32, u32, u32) {
        (self.ebx, self.ecx, self.edx, self.esi)
    }

    #[must_use]
    pub const fn id(&self) -> u32 {
        self.eax
    }
}
