//! Kernel-internal error taxonomy and its mapping onto the raw syscall ABI.
//!
//! Internal code stays in idiomatic `Result`-returning Rust; only the
//! syscall dispatcher boundary (`crate::syscall::handlers`) converts a
//! [`KernelError`] into the POSIX-shaped negative-`isize` convention user
//! space observes.

/// Errors a kernel operation can fail with, grouped the way the error
/// taxonomy in the specification groups them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelError {
    /// No free physical frame in the bitmap allocator.
    NoFreeFrame,
    /// No free slot in the task table.
    NoFreeTask,
    /// No free slot in the global file table.
    NoFreeFile,
    /// No free fd in the calling task's open-file table.
    NoFreeFd,
    /// No free GDT descriptor for a new TSS.
    NoFreeGdtDesc,
    /// fd does not name an open file for this task.
    BadFd,
    /// A required pointer argument was null or otherwise invalid.
    InvalidArgument,
    /// A path did not resolve to any mounted filesystem.
    NoMount,
    /// `lseek` with a non-zero `whence`.
    UnsupportedWhence,
    /// Open without `O_CREAT` on a missing entry, or `unlink`/`readdir` past end.
    NotFound,
    /// Read on a write-only file, or write on a read-only file.
    ModeMismatch,
    /// ELF magic mismatch, bad FAT16 superblock, or FAT count != 2.
    BadFormat,
    /// ATA status register reported the ERR bit.
    HardwareError,
    /// The FAT has no free cluster left to allocate.
    FatFull,
}

impl KernelError {
    /// The stable negative return value this error surfaces as at the
    /// syscall boundary. Callers never match on the magnitude; only `< 0`
    /// is part of the external contract, per the specification's error
    /// handling design.
    #[must_use]
    pub const fn to_raw(self) -> isize {
        -1
    }
}

/// Convenience alias used throughout kernel-internal code.
pub type KResult<T> = Result<T, KernelError>;
