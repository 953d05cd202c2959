//! FAT16-on-ATA filesystem mounted at `/home`. Grounded on
//! `original_source/source/kernel/fs/fatfs/fatfs.c` and
//! `fs/fatfs/fatfs.h`.
//!
//! The on-disk layout is read straight out of the partition's boot
//! sector (DBR) at mount time; nothing about geometry is hardcoded
//! beyond the disk minor this mount reads through.

pub mod cluster;
pub mod dir;
pub mod io;

use super::file_table::{FileObject, FileType};
use super::{DirEntry, FsOps, OpenFlags};
use crate::config::SECTOR_SIZE;
use crate::device::disk;
use crate::error::{KResult, KernelError};
use spin::Mutex;

/// `(drive << 4) | partition`: first primary partition of the primary
/// channel's first drive, the conventional FAT16 data partition.
const FAT16_MINOR: u16 = 0x01;

/// Superblock-equivalent geometry derived from the DBR, plus the one
/// sector-sized scratch buffer every FAT/directory access reads through.
pub struct FatState {
    bytes_per_sec: u32,
    tbl_start: u32,
    tbl_sectors: u32,
    root_ent_cnt: u32,
    sec_per_cluster: u32,
    root_start: u32,
    data_start: u32,
    cluster_byte_size: u32,
    buffer: [u8; SECTOR_SIZE],
}

pub struct Fat16 {
    state: Mutex<Option<FatState>>,
}

impl Fat16 {
    const fn new() -> Self {
        Self {
            state: Mutex::new(None),
        }
    }

    /// Parse the DBR at sector 0 of the partition and record its geometry.
    /// Mirrors `fatfs_mount`.
    pub fn mount(&self) -> KResult<()> {
        let mut sector = [0u8; SECTOR_SIZE];
        disk::read_sector(FAT16_MINOR, 0, &mut sector)?;

        let bytes_per_sec = u32::from(u16::from_le_bytes([sector[11], sector[12]]));
        let sec_per_cluster = u32::from(sector[13]);
        let tbl_start = u32::from(u16::from_le_bytes([sector[14], sector[15]]));
        let tbl_cnt = u32::from(sector[16]);
        let root_ent_cnt = u32::from(u16::from_le_bytes([sector[17], sector[18]]));
        let tbl_sectors = u32::from(u16::from_le_bytes([sector[22], sector[23]]));
        let fs_type = &sector[54..54 + 5];

        if bytes_per_sec as usize != SECTOR_SIZE || tbl_cnt != 2 || fs_type != b"FAT16" {
            return Err(KernelError::BadFormat);
        }

        let root_start = tbl_start + tbl_sectors * tbl_cnt;
        let root_dir_sectors = (root_ent_cnt * dir::DIRITEM_SIZE as u32).div_ceil(bytes_per_sec);
        let data_start = root_start + root_dir_sectors;
        let cluster_byte_size = bytes_per_sec * sec_per_cluster;
        if cluster_byte_size as usize > io::MAX_CLUSTER_SIZE {
            return Err(KernelError::BadFormat);
        }

        *self.state.lock() = Some(FatState {
            bytes_per_sec,
            tbl_start,
            tbl_sectors,
            root_ent_cnt,
            sec_per_cluster,
            root_start,
            data_start,
            cluster_byte_size,
            buffer: [0u8; SECTOR_SIZE],
        });
        Ok(())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut FatState) -> KResult<R>) -> KResult<R> {
        let mut guard = self.state.lock();
        let state = guard.as_mut().ok_or(KernelError::NoMount)?;
        f(state)
    }

    /// Linear scan of the root directory for `path`, also reporting the
    /// first free (end-of-directory or tombstoned) slot seen along the
    /// way so `open(..., CREAT)` doesn't need a second pass.
    fn lookup(state: &mut FatState, path: &str) -> KResult<(Option<(u32, dir::DirItem)>, Option<u32>)> {
        let mut free_index = None;
        for i in 0..state.root_ent_cnt {
            let item = dir::read_entry(state, FAT16_MINOR, i)?;
            if item.name[0] == dir::DIRITEM_NAME_END {
                if free_index.is_none() {
                    free_index = Some(i);
                }
                break;
            }
            if item.name[0] == dir::DIRITEM_NAME_FREE {
                if free_index.is_none() {
                    free_index = Some(i);
                }
                continue;
            }
            if dir::name_matches(path, &item) {
                return Ok((Some((i, item)), free_index));
            }
        }
        Ok((None, free_index))
    }
}

pub static FAT16: Fat16 = Fat16::new();

impl FsOps for Fat16 {
    /// Mirrors `fatfs_open`: find-or-create a root-directory entry, apply
    /// `O_TRUNC` by freeing the existing chain, and populate `file` with
    /// enough of the entry to drive `read`/`write`/`close`.
    fn open(&self, path: &str, flags: OpenFlags, file: &mut FileObject) -> KResult<()> {
        let path = path.trim_start_matches('/');
        self.with_state(|state| {
            let (found, free_index) = Self::lookup(state, path)?;

            if let Some((index, item)) = found {
                file.file_type = item.kind();
                file.size = item.size;
                file.pos = 0;
                file.parent_entry_index = u16::try_from(index).unwrap_or(u16::MAX);
                file.start_cluster = item.first_cluster;
                file.curr_cluster = item.first_cluster;
                file.mode = flags.bits();
                if flags.contains(OpenFlags::TRUNC) {
                    cluster::free_chain(state, FAT16_MINOR, file.start_cluster)?;
                    file.start_cluster = cluster::FAT_CLUSTER_INVALID;
                    file.curr_cluster = cluster::FAT_CLUSTER_INVALID;
                    file.size = 0;
                    let mut updated = item;
                    updated.size = 0;
                    updated.first_cluster = cluster::FAT_CLUSTER_INVALID;
                    dir::write_entry(state, FAT16_MINOR, index, updated)?;
                }
                return Ok(());
            }

            if !flags.contains(OpenFlags::CREAT) {
                return Err(KernelError::NotFound);
            }
            let index = free_index.ok_or(KernelError::NoFreeFile)?;
            let item = dir::new_item(path);
            dir::write_entry(state, FAT16_MINOR, index, item)?;
            file.file_type = FileType::Normal;
            file.size = 0;
            file.pos = 0;
            file.parent_entry_index = u16::try_from(index).unwrap_or(u16::MAX);
            file.start_cluster = cluster::FAT_CLUSTER_INVALID;
            file.curr_cluster = cluster::FAT_CLUSTER_INVALID;
            file.mode = flags.bits();
            Ok(())
        })
    }

    fn read(&self, file: &mut FileObject, buf: &mut [u8]) -> KResult<usize> {
        self.with_state(|state| io::read(state, FAT16_MINOR, file, buf))
    }

    fn write(&self, file: &mut FileObject, buf: &[u8]) -> KResult<usize> {
        self.with_state(|state| io::write(state, FAT16_MINOR, file, buf))
    }

    fn lseek(&self, file: &mut FileObject, offset: i32, whence: i32) -> KResult<u32> {
        if whence != 0 || offset < 0 {
            return Err(KernelError::UnsupportedWhence);
        }
        if file.file_type == FileType::Dir {
            return Err(KernelError::UnsupportedWhence);
        }
        let target = offset as u32;
        self.with_state(|state| io::seek(state, FAT16_MINOR, file, target))
    }

    /// Mirrors `fatfs_close`: write back size and start cluster unless the
    /// file was opened read-only, in which case nothing changed on disk.
    fn close(&self, file: &FileObject) -> KResult<()> {
        if OpenFlags::from_bits_truncate(file.mode) == OpenFlags::RDONLY {
            return Ok(());
        }
        self.with_state(|state| {
            let mut item = dir::read_entry(state, FAT16_MINOR, u32::from(file.parent_entry_index))?;
            item.size = file.size;
            item.first_cluster = file.start_cluster;
            dir::write_entry(state, FAT16_MINOR, u32::from(file.parent_entry_index), item)
        })
    }

    fn ioctl(&self, _file: &FileObject, _cmd: i32, _arg0: i32, _arg1: i32) -> KResult<()> {
        Err(KernelError::UnsupportedWhence)
    }

    /// Real stub matching the original's `fatfs_stat`, which always
    /// returns `-1`.
    fn stat(&self, _file: &FileObject, _out: *mut u8) -> KResult<()> {
        Err(KernelError::UnsupportedWhence)
    }

    fn opendir(&self, path: &str, file: &mut FileObject) -> KResult<()> {
        if !path.trim_start_matches('/').is_empty() {
            return Err(KernelError::NotFound);
        }
        file.pos = 0;
        file.file_type = FileType::Dir;
        Ok(())
    }

    /// One call returns one entry, matching `fatfs_readdir`'s interface;
    /// skips free/tombstoned/hidden-system-volume entries.
    fn readdir(&self, file: &mut FileObject, out: *mut u8) -> KResult<usize> {
        if out.is_null() {
            return Err(KernelError::InvalidArgument);
        }
        self.with_state(|state| {
            while file.pos < state.root_ent_cnt {
                let item = dir::read_entry(state, FAT16_MINOR, file.pos)?;
                if item.name[0] == dir::DIRITEM_NAME_END {
                    break;
                }
                let index = file.pos;
                file.pos += 1;
                if item.name[0] == dir::DIRITEM_NAME_FREE {
                    continue;
                }
                let kind = item.kind();
                if kind != FileType::Dir && kind != FileType::Normal {
                    continue;
                }
                let entry = DirEntry {
                    index,
                    file_type: kind as u32,
                    size: item.size,
                    name: dir::to_display_name(&item),
                };
                // Safety: `out` is sized for one `DirEntry`, the
                // documented wire shape `sys_readdir` writes through.
                unsafe {
                    core::ptr::write(out.cast::<DirEntry>(), entry);
                }
                return Ok(1);
            }
            Ok(0)
        })
    }

    /// Mirrors `fatfs_unlink`: find the entry by name, free its cluster
    /// chain, and tombstone the slot.
    fn unlink(&self, path: &str) -> KResult<()> {
        let path = path.trim_start_matches('/');
        self.with_state(|state| {
            let (found, _) = Self::lookup(state, path)?;
            let (index, item) = found.ok_or(KernelError::NotFound)?;
            cluster::free_chain(state, FAT16_MINOR, item.first_cluster)?;
            dir::mark_free(state, FAT16_MINOR, index)
        })
    }
}

/// Mount the partition, logging (rather than panicking) on failure so a
/// disk-less boot environment can still bring up `/dev`.
pub fn init() {
    if FAT16.mount().is_err() {
        crate::println!("fat16: mount failed, /home unavailable");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn unmounted_operations_report_no_mount() {
        let mut file = FileObject {
            ref_count: 1,
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
        };
        let fresh = Fat16::new();
        assert!(fresh.open("anything.txt", OpenFlags::RDONLY, &mut file).is_err());
    }
}
