//! The syscall handler table: converts `Result<_, KernelError>` into the
//! raw negative-`isize` ABI user space observes. Unknown ids return -1,
//! per the specification §4.4.

use super::SyscallId;
use crate::error::KernelError;
use crate::fs;
use crate::task::{process, scheduler};

/// Dispatch one syscall by numeric id, returning the raw value to place in
/// the frame's `eax` on return to ring 3.
pub fn dispatch(id: u32, args: (u32, u32, u32, u32)) -> isize {
    let (a0, a1, a2, a3) = args;
    let Some(id) = SyscallId::from_raw(id) else {
        return -1;
    };

    match id {
        SyscallId::Msleep => {
            scheduler::msleep(a0);
            0
        }
        SyscallId::Getpid => scheduler::current_pid() as isize,
        SyscallId::Fork => ok_or_raw(process::sys_fork().map(|pid| pid as isize)),
        SyscallId::Execve => ok_or_raw(
            process::sys_execve(a0 as *const u8, a1 as *const *const u8, a2 as *const *const u8)
                .map(|()| 0),
        ),
        SyscallId::Yield => {
            scheduler::r#yield();
            0
        }
        SyscallId::Exit => {
            process::sys_exit(a0 as i32);
            0
        }
        SyscallId::Wait => ok_or_raw(process::sys_wait(a0 as *mut i32).map(|pid| pid as isize)),
        SyscallId::Open => ok_or_raw(
            fs::sys_open(a0 as *const u8, a1 as u32).map(|fd| fd as isize),
        ),
        SyscallId::Read => {
            ok_or_raw(fs::sys_read(a0 as i32, a1 as *mut u8, a2 as usize).map(|n| n as isize))
        }
        SyscallId::Write => {
            ok_or_raw(fs::sys_write(a0 as i32, a1 as *const u8, a2 as usize).map(|n| n as isize))
        }
        SyscallId::Close => ok_or_raw(fs::sys_close(a0 as i32).map(|()| 0)),
        SyscallId::Lseek => {
            ok_or_raw(fs::sys_lseek(a0 as i32, a1 as i32, a2 as i32).map(|p| p as isize))
        }
        SyscallId::Isatty => ok_or_raw(fs::sys_isatty(a0 as i32).map(|b| i32::from(b) as isize)),
        SyscallId::Sbrk => ok_or_raw(
            crate::memory::VmManager::sys_sbrk(a0 as i32).map(|prev| prev as isize),
        ),
        SyscallId::Fstat => ok_or_raw(fs::sys_fstat(a0 as i32, a1 as *mut u8).map(|()| 0)),
        SyscallId::Dup => ok_or_raw(fs::sys_dup(a0 as i32).map(|fd| fd as isize)),
        SyscallId::Ioctl => {
            ok_or_raw(fs::sys_ioctl(a0 as i32, a1 as i32, a2 as i32, a3 as i32).map(|()| 0))
        }
        SyscallId::Opendir => ok_or_raw(fs::sys_opendir(a0 as *const u8).map(|fd| fd as isize)),
        SyscallId::Readdir => {
            ok_or_raw(fs::sys_readdir(a0 as i32, a1 as *mut u8).map(|n| n as isize))
        }
        SyscallId::Closedir => ok_or_raw(fs::sys_closedir(a0 as i32).map(|()| 0)),
        SyscallId::Unlink => ok_or_raw(fs::sys_unlink(a0 as *const u8).map(|()| 0)),
        SyscallId::PrintMsg => {
            crate::log_println!("[user] {}", read_c_str(a0 as *const u8));
            0
        }
    }
}

fn ok_or_raw(result: Result<isize, KernelError>) -> isize {
    match result {
        Ok(v) => v,
        Err(e) => e.to_raw(),
    }
}

fn read_c_str(ptr: *const u8) -> &'static str {
    if ptr.is_null() {
        return "";
    }
    // Safety: best-effort debug passthrough; a malformed pointer from user
    // space here only corrupts the kernel log, never kernel state.
    unsafe {
        let mut len = 0usize;
        while *ptr.add(len) != 0 && len < 256 {
            len += 1;
        }
        let slice = core::slice::from_raw_parts(ptr, len);
        core::str::from_utf8(slice).unwrap_or("<invalid utf8>")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn unknown_id_returns_minus_one() {
        assert_eq!(dispatch(9999, (0, 0, 0, 0)), -1);
    }

    #[test_case]
    fn getpid_with_no_current_task_is_zero() {
        assert_eq!(dispatch(1, (0, 0, 0, 0)), 0);
    }
}
