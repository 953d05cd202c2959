//! ATA PIO primary-channel disk driver: MBR partition detection and
//! sector read/write, grounded on
//! `original_source/source/kernel/dev/disk.c`.

use crate::arch::x86::{inb, inw, outb, outw};
use crate::config::{DISK_NUM, DISK_PRIM_PART_NUM, SECTOR_SIZE};
use crate::error::{KResult, KernelError};
use crate::idt;
use crate::sync::{Mutex, Semaphore};
use core::sync::atomic::{AtomicU8, Ordering};

const DATA_PORT: u16 = 0x1F0;
const ERROR_PORT: u16 = 0x1F1;
const SECTOR_COUNT_PORT: u16 = 0x1F2;
const LBA_LOW_PORT: u16 = 0x1F3;
const LBA_MID_PORT: u16 = 0x1F4;
const LBA_HIGH_PORT: u16 = 0x1F5;
const DRIVE_HEAD_PORT: u16 = 0x1F6;
const STATUS_PORT: u16 = 0x1F7;
const COMMAND_PORT: u16 = 0x1F7;

const STATUS_ERR: u8 = 0x01;
const STATUS_DRQ: u8 = 0x08;
const STATUS_BUSY: u8 = 0x80;

/// READ/WRITE SECTORS EXT: 48-bit-LBA PIO opcodes, per the specification
/// §4.9. `lba` here is carried as a `u32`, so the top two address bytes
/// (bits 32..48) are always zero; harmless for any disk this kernel's FAT16
/// images actually span, but the wire sequence itself is full LBA48.
const CMD_READ_SECTORS_EXT: u8 = 0x24;
const CMD_WRITE_SECTORS_EXT: u8 = 0x34;
const CMD_IDENTIFY: u8 = 0xEC;

/// System ids this kernel recognizes as FAT16, matching common DOS/Windows
/// allocations (`0x04`, `0x06`, `0x0E`).
fn is_fat16_system_id(id: u8) -> bool {
    matches!(id, 0x04 | 0x06 | 0x0E)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartType {
    Invalid,
    Fat16,
    Other(u8),
}

/// One MBR primary-partition entry (or, at index 0, the whole-disk pseudo
/// partition spanning every sector).
#[derive(Debug, Clone, Copy)]
pub struct Partition {
    pub system_id: u8,
    pub relative_sectors: u32,
    pub total_sectors: u32,
    pub part_type: PartType,
}

impl Partition {
    /// The specification-flagged fix: a `system_id` of `0x00` (unused MBR
    /// slot) now fully zeroes every field rather than leaving
    /// `relative_sectors`/`total_sectors` populated from stale bytes.
    const fn invalid() -> Self {
        Self {
            system_id: 0,
            relative_sectors: 0,
            total_sectors: 0,
            part_type: PartType::Invalid,
        }
    }
}

struct DiskInfo {
    present: bool,
    partitions: [Partition; DISK_PRIM_PART_NUM],
}

impl DiskInfo {
    const fn absent() -> Self {
        Self {
            present: false,
            partitions: [Partition::invalid(); DISK_PRIM_PART_NUM],
        }
    }
}

static DISKS: Mutex<[DiskInfo; DISK_NUM]> = Mutex::new([DiskInfo::absent(), DiskInfo::absent()]);

/// Guards the single shared ATA command register set; only one command
/// may be outstanding on the primary channel at a time.
static CHANNEL: Mutex = Mutex::new();

static ISEM: Semaphore = Semaphore::new(0);
static OSEM: Semaphore = Semaphore::new(0);

/// What the outstanding command was, so the IRQ14 handler knows which
/// semaphore to notify. `0` = none, `1` = read, `2` = write.
static PENDING: AtomicU8 = AtomicU8::new(0);

/// Program the LBA48 address/sector-count registers for a one-sector
/// command. Each of `SECTOR_COUNT`/`LBA_LOW`/`LBA_MID`/`LBA_HIGH` is a
/// two-deep FIFO: the high-order byte of each pair is written first, then
/// the low-order byte, so the controller latches both halves correctly.
fn select_drive(drive: u8, lba: u32) {
    // SAFETY: standard ATA LBA48 PIO command-issue sequence on the primary
    // channel's fixed port range.
    unsafe {
        outb(SECTOR_COUNT_PORT, 0); // sector count bits 8..16 (always 0: one sector)
        outb(LBA_LOW_PORT, ((lba >> 24) & 0xFF) as u8);
        outb(LBA_MID_PORT, 0); // lba bits 32..40, always 0 for a u32 lba
        outb(LBA_HIGH_PORT, 0); // lba bits 40..48, always 0 for a u32 lba
        outb(SECTOR_COUNT_PORT, 1);
        outb(LBA_LOW_PORT, (lba & 0xFF) as u8);
        outb(LBA_MID_PORT, ((lba >> 8) & 0xFF) as u8);
        outb(LBA_HIGH_PORT, ((lba >> 16) & 0xFF) as u8);
        outb(DRIVE_HEAD_PORT, 0x40 | (drive << 4));
    }
}

/// Poll `STATUS_PORT` until the controller is no longer busy and either
/// `DRQ` (data ready) or `ERR` is set. Mirrors `disk_wait_data`.
fn wait_ready() -> KResult<()> {
    loop {
        // SAFETY: reading the ATA status register is always valid.
        let status = unsafe { inb(STATUS_PORT) };
        if status & STATUS_BUSY != 0 {
            continue;
        }
        if status & STATUS_ERR != 0 {
            return Err(KernelError::HardwareError);
        }
        if status & STATUS_DRQ != 0 {
            return Ok(());
        }
    }
}

fn read_sector_raw(drive: u8, lba: u32, buf: &mut [u8; SECTOR_SIZE]) -> KResult<()> {
    let _guard = CHANNEL.lock();
    select_drive(drive, lba);
    PENDING.store(1, Ordering::SeqCst);
    // SAFETY: command register write per the selected drive/LBA above.
    unsafe {
        outb(COMMAND_PORT, CMD_READ_SECTORS_EXT);
    }
    wait_ready()?;
    // SAFETY: DRQ verified set by `wait_ready`; reading exactly 256 words
    // drains precisely one sector's worth of data as the protocol requires.
    unsafe {
        for word in buf.chunks_exact_mut(2) {
            let value = inw(DATA_PORT);
            word[0] = (value & 0xFF) as u8;
            word[1] = (value >> 8) as u8;
        }
    }
    PENDING.store(0, Ordering::SeqCst);
    CHANNEL.unlock();
    Ok(())
}

fn write_sector_raw(drive: u8, lba: u32, buf: &[u8; SECTOR_SIZE]) -> KResult<()> {
    let _guard = CHANNEL.lock();
    select_drive(drive, lba);
    PENDING.store(2, Ordering::SeqCst);
    // SAFETY: same command-issue sequence as the read path, `CMD_WRITE_SECTORS_EXT`.
    unsafe {
        outb(COMMAND_PORT, CMD_WRITE_SECTORS_EXT);
    }
    wait_ready()?;
    // SAFETY: DRQ verified set; writing exactly 256 words matches the one
    // sector just requested.
    unsafe {
        for word in buf.chunks_exact(2) {
            outw(DATA_PORT, u16::from(word[0]) | u16::from(word[1]) << 8);
        }
    }
    PENDING.store(0, Ordering::SeqCst);
    CHANNEL.unlock();
    Ok(())
}

/// IRQ14 handler: acknowledge the interrupt by reading the status
/// register, then notify whichever semaphore the outstanding command was
/// waiting on. Mirrors `do_handler_disk_primary`.
fn on_irq() {
    // SAFETY: reading the status register both checks and acknowledges
    // the pending IRQ on this controller.
    let _status = unsafe { inb(STATUS_PORT) };
    match PENDING.load(Ordering::SeqCst) {
        1 => ISEM.notify(),
        2 => OSEM.notify(),
        _ => {}
    }
}

fn identify(drive: u8) -> bool {
    // SAFETY: standard ATA IDENTIFY issue sequence.
    unsafe {
        outb(DRIVE_HEAD_PORT, 0xA0 | (drive << 4));
        outb(SECTOR_COUNT_PORT, 0);
        outb(LBA_LOW_PORT, 0);
        outb(LBA_MID_PORT, 0);
        outb(LBA_HIGH_PORT, 0);
        outb(COMMAND_PORT, CMD_IDENTIFY);
    }
    // SAFETY: reading the status register to probe drive presence.
    let status = unsafe { inb(STATUS_PORT) };
    if status == 0 {
        return false;
    }
    wait_ready().is_ok()
}

/// Parse the MBR at LBA 0 into up to four primary-partition descriptors,
/// plus the whole-disk pseudo partition at slot 0. Mirrors `detect_part_info`.
fn detect_part_info(drive: u8, info: &mut DiskInfo) -> KResult<()> {
    let mut sector = [0u8; SECTOR_SIZE];
    read_sector_raw(drive, 0, &mut sector)?;

    info.partitions[0] = Partition {
        system_id: 0,
        relative_sectors: 0,
        total_sectors: 0,
        part_type: PartType::Other(0),
    };

    for i in 0..4 {
        let entry = &sector[0x1BE + i * 16..0x1BE + (i + 1) * 16];
        let system_id = entry[4];
        if system_id == 0 {
            info.partitions[i + 1] = Partition::invalid();
            continue;
        }
        let relative_sectors = u32::from_le_bytes([entry[8], entry[9], entry[10], entry[11]]);
        let total_sectors = u32::from_le_bytes([entry[12], entry[13], entry[14], entry[15]]);
        let part_type = if is_fat16_system_id(system_id) {
            PartType::Fat16
        } else {
            PartType::Other(system_id)
        };
        info.partitions[i + 1] = Partition {
            system_id,
            relative_sectors,
            total_sectors,
            part_type,
        };
    }
    Ok(())
}

/// Probe both drives on the primary channel, detect partitions on each
/// present drive, and register the IRQ14 handler.
pub fn init() {
    idt::register_irq_handler(idt::DISK_VECTOR, on_irq);
    let mut disks = DISKS.lock();
    for drive in 0..DISK_NUM {
        #[expect(
            clippy::cast_possible_truncation,
            reason = "DISK_NUM is always small enough for a u8 drive index"
        )]
        let present = identify(drive as u8);
        disks[drive].present = present;
        if present {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "DISK_NUM is always small enough for a u8 drive index"
            )]
            let _ = detect_part_info(drive as u8, &mut disks[drive]);
        }
    }
}

/// Open minor `(drive << 4) | partition`. Returns the partition's LBA
/// offset so FAT16/devfs code can translate partition-relative sectors.
pub fn open(minor: u16) -> KResult<u32> {
    let drive = (minor >> 4) as usize;
    let partition = (minor & 0xF) as usize;
    let disks = DISKS.lock();
    let info = disks.get(drive).ok_or(KernelError::NotFound)?;
    if !info.present {
        return Err(KernelError::NotFound);
    }
    let part = info.partitions.get(partition).ok_or(KernelError::NotFound)?;
    if partition != 0 && part.part_type == PartType::Invalid {
        return Err(KernelError::NotFound);
    }
    Ok(part.relative_sectors)
}

pub fn read_sector(minor: u16, sector_in_partition: u32, buf: &mut [u8; SECTOR_SIZE]) -> KResult<()> {
    let drive = (minor >> 4) as u8;
    let base = open(minor)?;
    read_sector_raw(drive, base + sector_in_partition, buf)
}

pub fn write_sector(minor: u16, sector_in_partition: u32, buf: &[u8; SECTOR_SIZE]) -> KResult<()> {
    let drive = (minor >> 4) as u8;
    let base = open(minor)?;
    write_sector_raw(drive, base + sector_in_partition, buf)
}

/// `disk_control`/`disk_close`: real no-ops, matching the original's empty
/// stub bodies.
pub fn control(_minor: u16, _cmd: i32, _arg0: i32, _arg1: i32) -> KResult<()> {
    Ok(())
}

pub fn close(_minor: u16) -> KResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn invalid_mbr_entry_is_fully_zeroed() {
        let mut info = DiskInfo::absent();
        let mut sector = [0u8; SECTOR_SIZE];
        // First partition entry: system_id (offset 4 within the 16-byte
        // entry at 0x1BE) left zero, the rest populated with non-zero
        // "stale" bytes as the original leaves them.
        sector[0x1BE..0x1BE + 16].copy_from_slice(&[0xAA; 16]);
        sector[0x1BE + 4] = 0x00;
        for i in 1..4 {
            sector[0x1BE + i * 16 + 4] = 0x06;
        }
        // Reuse the parsing logic directly on a synthetic sector instead
        // of going through `read_sector_raw`, which needs real hardware.
        for i in 0..4 {
            let entry = &sector[0x1BE + i * 16..0x1BE + (i + 1) * 16];
            let system_id = entry[4];
            info.partitions[i + 1] = if system_id == 0 {
                Partition::invalid()
            } else {
                Partition {
                    system_id,
                    relative_sectors: u32::from_le_bytes([
                        entry[8], entry[9], entry[10], entry[11],
                    ]),
                    total_sectors: u32::from_le_bytes([
                        entry[12], entry[13], entry[14], entry[15],
                    ]),
                    part_type: PartType::Fat16,
                }
            };
        }
        assert_eq!(info.partitions[1].system_id, 0);
        assert_eq!(info.partitions[1].relative_sectors, 0);
        assert_eq!(info.partitions[1].total_sectors, 0);
        assert_eq!(info.partitions[1].part_type, PartType::Invalid);
    }
}
