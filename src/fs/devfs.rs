//! Device filesystem: maps `ttyN` path suffixes onto the TTY device
//! layer. Grounded on `original_source/source/kernel/fs/devfs/devfs.c`.

use super::file_table::{FileObject, FileType};
use super::{FsOps, OpenFlags};
use crate::device::tty;
use crate::error::{KResult, KernelError};

/// Parse a decimal minor number from the path suffix following `tty`,
/// mirroring `path_to_num`.
fn parse_minor(rest: &str) -> KResult<u16> {
    if rest.is_empty() {
        return Err(KernelError::NotFound);
    }
    rest.parse::<u16>().map_err(|_| KernelError::NotFound)
}

pub struct DevFs;

impl FsOps for DevFs {
    fn open(&self, path: &str, flags: OpenFlags, file: &mut FileObject) -> KResult<()> {
        let path = path.trim_start_matches('/');
        let rest = path.strip_prefix("tty").ok_or(KernelError::NotFound)?;
        let minor = parse_minor(rest)?;
        tty::open(minor)?;
        file.device_minor = minor;
        file.file_type = FileType::Tty;
        file.mode = flags.bits();
        Ok(())
    }

    fn read(&self, file: &mut FileObject, buf: &mut [u8]) -> KResult<usize> {
        tty::read(file.device_minor, buf)
    }

    fn write(&self, file: &mut FileObject, buf: &[u8]) -> KResult<usize> {
        tty::write(file.device_minor, buf)
    }

    fn lseek(&self, _file: &mut FileObject, _offset: i32, _whence: i32) -> KResult<u32> {
        Err(KernelError::UnsupportedWhence)
    }

    fn close(&self, file: &FileObject) -> KResult<()> {
        tty::close(file.device_minor)
    }

    fn ioctl(&self, file: &FileObject, cmd: i32, arg0: i32, _arg1: i32) -> KResult<()> {
        tty::control(file.device_minor, cmd, arg0)
    }

    fn stat(&self, _file: &FileObject, _out: *mut u8) -> KResult<()> {
        Err(KernelError::UnsupportedWhence)
    }
}

pub static DEVFS: DevFs = DevFs;

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn opens_tty_by_decimal_minor() {
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
        DEVFS.open("tty2", OpenFlags::RDWR, &mut file).expect("open");
        assert_eq!(file.device_minor, 2);
        assert_eq!(file.file_type, FileType::Tty);
    }

    #[test_case]
    fn rejects_unknown_device_name() {
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
        assert!(DEVFS.open("com0", OpenFlags::RDWR, &mut file).is_err());
    }
}
