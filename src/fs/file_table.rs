//! Global open-file table: reference-counted records shared by every
//! task's per-fd table. Grounded on `original_source/source/kernel/fs/file.c`.

use crate::config::FILE_TABLE_SIZE;
use crate::error::{KResult, KernelError};
use spin::Mutex;

/// What kind of thing a file object refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Unknown,
    Normal,
    Dir,
    Tty,
}

/// Which mount backs a file object, by index into
/// [`crate::fs::MOUNT_TABLE`].
pub type MountId = u8;

/// An open-file object: refcounted, shared by every fd/dup pointing at it.
#[derive(Clone, Copy)]
pub struct FileObject {
    pub ref_count: u32,
    pub file_type: FileType,
    pub mode: u32,
    pub pos: u32,
    pub size: u32,
    pub start_cluster: u16,
    pub curr_cluster: u16,
    pub mount: MountId,
    pub device_minor: u16,
    pub parent_entry_index: u16,
    pub name: [u8; 12],
}

impl FileObject {
    const fn empty() -> Self {
        Self {
            ref_count: 0,
            file_type: FileType::Unknown,
            mode: 0,
            pos: 0,
            size: 0,
            start_cluster: 0,
            curr_cluster: 0,
            mount: 0,
            device_minor: 0,
            parent_entry_index: 0,
            name: [0; 12],
        }
    }
}

/// Index into the global file table; what a task's fd table stores.
pub type FileHandle = u16;

struct FileTable {
    files: [FileObject; FILE_TABLE_SIZE],
}

static FILE_TABLE: Mutex<FileTable> = Mutex::new(FileTable {
    files: [FileObject::empty(); FILE_TABLE_SIZE],
});

/// Find a `ref == 0` slot, zero it, and set `ref = 1`.
pub fn alloc() -> KResult<FileHandle> {
    let mut table = FILE_TABLE.lock();
    for (i, f) in table.files.iter_mut().enumerate() {
        if f.ref_count == 0 {
            *f = FileObject::empty();
            f.ref_count = 1;
            return Ok(i as FileHandle);
        }
    }
    Err(KernelError::NoFreeFile)
}

pub fn inc_ref(handle: FileHandle) {
    FILE_TABLE.lock().files[handle as usize].ref_count += 1;
}

/// Decrement the refcount; return `true` if this was the final reference
/// (the caller should then invoke the mount's `close`).
pub fn dec_ref(handle: FileHandle) -> bool {
    let mut table = FILE_TABLE.lock();
    let f = &mut table.files[handle as usize];
    if f.ref_count > 0 {
        f.ref_count -= 1;
    }
    f.ref_count == 0
}

/// `dup`/`fork`-time fd close: decrement, and on reaching zero forward to
/// the mount's `close` before the slot is considered free again.
pub fn close_ref(handle: FileHandle) {
    if dec_ref(handle) {
        let info = with(handle, |f| (f.mount, f.file_type));
        let (mount, file_type) = info;
        let _ = crate::fs::close_on_mount(mount, handle, file_type);
    }
}

pub fn with<R>(handle: FileHandle, f: impl FnOnce(&FileObject) -> R) -> R {
    let table = FILE_TABLE.lock();
    f(&table.files[handle as usize])
}

pub fn with_mut<R>(handle: FileHandle, f: impl FnOnce(&mut FileObject) -> R) -> R {
    let mut table = FILE_TABLE.lock();
    f(&mut table.files[handle as usize])
}
