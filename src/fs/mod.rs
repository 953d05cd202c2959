//! VFS: mount table, global file table dispatch, and the `sys_*` I/O
//! syscalls. Grounded on `original_source/source/kernel/fs/fs.c`.

pub mod devfs;
pub mod fat16;
pub mod file_table;

use crate::config::{FS_TABLE_SIZE, TASK_OFILE_NUM};
use crate::error::{KResult, KernelError};
use crate::task::{current_id, TASK_TABLE};
use alloc::vec::Vec;
use file_table::{FileHandle, FileObject, FileType, MountId};
use spin::Mutex;

bitflags::bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const RDONLY = 0;
        const WRONLY = 1 << 0;
        const RDWR   = 1 << 1;
        const CREAT  = 1 << 2;
        const TRUNC  = 1 << 3;
    }
}

/// The operations a mounted filesystem (or device-fs) must provide.
/// Implemented by [`devfs::DevFs`] and [`fat16::Fat16`]; stored as a
/// `&'static dyn` in the mount table since both implementations are
/// process-wide singletons initialized once at boot.
pub trait FsOps: Sync {
    fn open(&self, path: &str, flags: OpenFlags, file: &mut FileObject) -> KResult<()>;
    fn read(&self, file: &mut FileObject, buf: &mut [u8]) -> KResult<usize>;
    fn write(&self, file: &mut FileObject, buf: &[u8]) -> KResult<usize>;
    fn lseek(&self, file: &mut FileObject, offset: i32, whence: i32) -> KResult<u32>;
    fn close(&self, file: &FileObject) -> KResult<()>;
    fn ioctl(&self, file: &FileObject, cmd: i32, arg0: i32, arg1: i32) -> KResult<()>;
    fn stat(&self, _file: &FileObject, _out: *mut u8) -> KResult<()> {
        Ok(())
    }
    fn opendir(&self, _path: &str, _file: &mut FileObject) -> KResult<()> {
        Err(KernelError::NotFound)
    }
    fn readdir(&self, _file: &mut FileObject, _out: *mut u8) -> KResult<usize> {
        Err(KernelError::NotFound)
    }
    fn unlink(&self, _path: &str) -> KResult<()> {
        Err(KernelError::NotFound)
    }
}

/// Wire layout `sys_readdir` writes one entry of at a time through its
/// `out` pointer.
#[repr(C)]
pub struct DirEntry {
    pub index: u32,
    pub file_type: u32,
    pub size: u32,
    pub name: [u8; 12],
}

pub struct Mount {
    pub prefix: &'static str,
    pub ops: &'static dyn FsOps,
}

struct MountTableInner {
    mounts: [Option<Mount>; FS_TABLE_SIZE],
    count: usize,
}

pub static MOUNT_TABLE: Mutex<MountTableInner> = Mutex::new(MountTableInner {
    mounts: [const { None }; FS_TABLE_SIZE],
    count: 0,
});

impl MountTableInner {
    pub fn register(&mut self, prefix: &'static str, ops: &'static dyn FsOps) {
        self.mounts[self.count] = Some(Mount { prefix, ops });
        self.count += 1;
    }

    /// Longest-prefix match; falls back to whichever mount has prefix "/"
    /// (the FAT16 root per the specification's mount order).
    fn resolve(&self, path: &str) -> Option<(MountId, &'static str, &'static dyn FsOps)> {
        let mut best: Option<(usize, MountId, &'static str, &'static dyn FsOps)> = None;
        for (i, m) in self.mounts.iter().enumerate().take(self.count) {
            let Some(m) = m else { continue };
            if path.starts_with(m.prefix)
                && best.as_ref().is_none_or(|(len, ..)| m.prefix.len() > *len)
            {
                best = Some((m.prefix.len(), i as MountId, m.prefix, m.ops));
            }
        }
        best.map(|(_, id, prefix, ops)| (id, prefix, ops))
    }
}

/// Register the devfs and FAT16 mounts in the same order the original
/// boots them: `/dev` first, then `/home` as the FAT16 root. Mounting the
/// partition itself happens after registration so a failed mount still
/// leaves `/dev` usable.
pub fn init() {
    let mut table = MOUNT_TABLE.lock();
    table.register("/dev", &devfs::DEVFS);
    table.register("/home", &fat16::FAT16);
    drop(table);
    fat16::init();
}

fn mount_for(path: &str) -> KResult<(MountId, &'static str, &'static dyn FsOps)> {
    MOUNT_TABLE.lock().resolve(path).ok_or(KernelError::NoMount)
}

pub fn close_on_mount(mount: MountId, handle: FileHandle, _file_type: FileType) -> KResult<()> {
    let ops = {
        let table = MOUNT_TABLE.lock();
        table.mounts[mount as usize].as_ref().map(|m| m.ops)
    };
    let Some(ops) = ops else { return Ok(()) };
    file_table::with(handle, |f| ops.close(f))
}

fn alloc_fd(task_id: u16, handle: FileHandle) -> KResult<i32> {
    let mut table = TASK_TABLE.lock();
    let ofile = &mut table.get_mut(task_id).ofile;
    for (i, slot) in ofile.iter_mut().enumerate() {
        if slot.is_none() {
            *slot = Some(handle);
            return Ok(i as i32);
        }
    }
    Err(KernelError::NoFreeFd)
}

fn fd_handle(task_id: u16, fd: i32) -> KResult<FileHandle> {
    if fd < 0 || fd as usize >= TASK_OFILE_NUM {
        return Err(KernelError::BadFd);
    }
    let table = TASK_TABLE.lock();
    table.get(task_id).ofile[fd as usize].ok_or(KernelError::BadFd)
}

/// `sys_open`: allocate a file object and fd, resolve the mount, and
/// dispatch to its `open`, unwinding both allocations on failure.
pub fn sys_open(path: *const u8, flags: u32) -> KResult<i32> {
    let task_id = current_id().ok_or(KernelError::InvalidArgument)?;
    let path = read_c_str(path)?;
    let flags = OpenFlags::from_bits_truncate(flags);

    let (mount_id, prefix, ops) = mount_for(path)?;
    let sub_path = &path[prefix.len()..];

    let handle = file_table::alloc()?;
    file_table::with_mut(handle, |f| f.mount = mount_id);

    let open_result = file_table::with_mut(handle, |f| ops.open(sub_path, flags, f));
    if let Err(e) = open_result {
        file_table::dec_ref(handle);
        return Err(e);
    }

    match alloc_fd(task_id, handle) {
        Ok(fd) => Ok(fd),
        Err(e) => {
            let _ = file_table::with(handle, |f| ops.close(f));
            file_table::dec_ref(handle);
            Err(e)
        }
    }
}

pub fn sys_read(fd: i32, buf: *mut u8, size: usize) -> KResult<usize> {
    let task_id = current_id().ok_or(KernelError::InvalidArgument)?;
    let handle = fd_handle(task_id, fd)?;
    let mode = file_table::with(handle, |f| f.mode);
    if OpenFlags::from_bits_truncate(mode).contains(OpenFlags::WRONLY) {
        return Err(KernelError::ModeMismatch);
    }
    if buf.is_null() {
        return Err(KernelError::InvalidArgument);
    }
    // Safety: trusts the user-supplied buffer pointer/length, as the
    // original does; a real implementation additionally validates the
    // range lies in the calling task's mapped address space.
    let slice = unsafe { core::slice::from_raw_parts_mut(buf, size) };
    let mount = file_table::with(handle, |f| f.mount);
    let ops = mount_ops(mount)?;
    file_table::with_mut(handle, |f| ops.read(f, slice))
}

pub fn sys_write(fd: i32, buf: *const u8, size: usize) -> KResult<usize> {
    let task_id = current_id().ok_or(KernelError::InvalidArgument)?;
    let handle = fd_handle(task_id, fd)?;
    let mode = file_table::with(handle, |f| f.mode);
    let flags = OpenFlags::from_bits_truncate(mode);
    if !flags.contains(OpenFlags::WRONLY) && !flags.contains(OpenFlags::RDWR) {
        return Err(KernelError::ModeMismatch);
    }
    if buf.is_null() {
        return Err(KernelError::InvalidArgument);
    }
    let slice = unsafe { core::slice::from_raw_parts(buf, size) };
    let mount = file_table::with(handle, |f| f.mount);
    let ops = mount_ops(mount)?;
    file_table::with_mut(handle, |f| ops.write(f, slice))
}

pub fn sys_close(fd: i32) -> KResult<()> {
    let task_id = current_id().ok_or(KernelError::InvalidArgument)?;
    let handle = fd_handle(task_id, fd)?;
    file_table::close_ref(handle);
    let mut table = TASK_TABLE.lock();
    table.get_mut(task_id).ofile[fd as usize] = None;
    Ok(())
}

pub fn sys_lseek(fd: i32, offset: i32, whence: i32) -> KResult<u32> {
    if whence != 0 {
        return Err(KernelError::UnsupportedWhence);
    }
    let task_id = current_id().ok_or(KernelError::InvalidArgument)?;
    let handle = fd_handle(task_id, fd)?;
    let mount = file_table::with(handle, |f| f.mount);
    let ops = mount_ops(mount)?;
    file_table::with_mut(handle, |f| ops.lseek(f, offset, whence))
}

pub fn sys_isatty(fd: i32) -> KResult<bool> {
    let task_id = current_id().ok_or(KernelError::InvalidArgument)?;
    let handle = fd_handle(task_id, fd)?;
    Ok(file_table::with(handle, |f| f.file_type == FileType::Tty))
}

pub fn sys_fstat(fd: i32, out: *mut u8) -> KResult<()> {
    let task_id = current_id().ok_or(KernelError::InvalidArgument)?;
    let handle = fd_handle(task_id, fd)?;
    let mount = file_table::with(handle, |f| f.mount);
    let ops = mount_ops(mount)?;
    file_table::with(handle, |f| ops.stat(f, out))
}

pub fn sys_dup(fd: i32) -> KResult<i32> {
    let task_id = current_id().ok_or(KernelError::InvalidArgument)?;
    let handle = fd_handle(task_id, fd)?;
    file_table::inc_ref(handle);
    match alloc_fd(task_id, handle) {
        Ok(new_fd) => Ok(new_fd),
        Err(e) => {
            file_table::dec_ref(handle);
            Err(e)
        }
    }
}

pub fn sys_ioctl(fd: i32, cmd: i32, arg0: i32, arg1: i32) -> KResult<()> {
    let task_id = current_id().ok_or(KernelError::InvalidArgument)?;
    let handle = fd_handle(task_id, fd)?;
    let mount = file_table::with(handle, |f| f.mount);
    let ops = mount_ops(mount)?;
    file_table::with(handle, |f| ops.ioctl(f, cmd, arg0, arg1))
}

pub fn sys_opendir(path: *const u8) -> KResult<i32> {
    let task_id = current_id().ok_or(KernelError::InvalidArgument)?;
    let path = read_c_str(path)?;
    let (mount_id, prefix, ops) = mount_for(path)?;
    let sub_path = &path[prefix.len()..];

    let handle = file_table::alloc()?;
    file_table::with_mut(handle, |f| f.mount = mount_id);
    let result = file_table::with_mut(handle, |f| ops.opendir(sub_path, f));
    if let Err(e) = result {
        file_table::dec_ref(handle);
        return Err(e);
    }
    match alloc_fd(task_id, handle) {
        Ok(fd) => Ok(fd),
        Err(e) => {
            file_table::dec_ref(handle);
            Err(e)
        }
    }
}

pub fn sys_readdir(fd: i32, out: *mut u8) -> KResult<usize> {
    let task_id = current_id().ok_or(KernelError::InvalidArgument)?;
    let handle = fd_handle(task_id, fd)?;
    let mount = file_table::with(handle, |f| f.mount);
    let ops = mount_ops(mount)?;
    file_table::with_mut(handle, |f| ops.readdir(f, out))
}

pub fn sys_closedir(fd: i32) -> KResult<()> {
    sys_close(fd)
}

pub fn sys_unlink(path: *const u8) -> KResult<()> {
    let path = read_c_str(path)?;
    let (_id, prefix, ops) = mount_for(path)?;
    ops.unlink(&path[prefix.len()..])
}

fn mount_ops(mount: MountId) -> KResult<&'static dyn FsOps> {
    MOUNT_TABLE
        .lock()
        .mounts
        .get(mount as usize)
        .and_then(|m| m.as_ref())
        .map(|m| m.ops)
        .ok_or(KernelError::NoMount)
}

fn read_c_str(ptr: *const u8) -> KResult<&'static str> {
    if ptr.is_null() {
        return Err(KernelError::InvalidArgument);
    }
    // Safety: trusts the caller-supplied pointer, as the original does.
    unsafe {
        let mut len = 0usize;
        while *ptr.add(len) != 0 && len < 256 {
            len += 1;
        }
        let slice = core::slice::from_raw_parts(ptr, len);
        core::str::from_utf8(slice).map_err(|_| KernelError::InvalidArgument)
    }
}

/// Read an entire file into a kernel-owned buffer, used by `execve` to
/// pull an ELF image in before constructing the new address space.
pub fn read_whole_file(path: &str) -> KResult<Vec<u8>> {
    let (_mount_id, prefix, ops) = mount_for(path)?;
    let sub_path = &path[prefix.len()..];
    let mut file = FileObject {
        ref_count: 1,
        file_type: FileType::Unknown,
        mode: OpenFlags::RDONLY.bits(),
        pos: 0,
        size: 0,
        start_cluster: 0,
        curr_cluster: 0,
        mount: 0,
        device_minor: 0,
        parent_entry_index: 0,
        name: [0; 12],
    };
    ops.open(sub_path, OpenFlags::RDONLY, &mut file)?;
    let mut out = alloc::vec![0u8; file.size as usize];
    let mut total = 0usize;
    while total < out.len() {
        let n = ops.read(&mut file, &mut out[total..])?;
        if n == 0 {
            break;
        }
        total += n;
    }
    out.truncate(total);
    let _ = ops.close(&file);
    Ok(out)
}
