//! Cluster-unit read/write, file growth, and `lseek`. Grounded on
//! `original_source/source/kernel/fs/fatfs/fatfs.c`'s `fatfs_read`/
//! `fatfs_write`/`expand_file`/`move_file_pos`/`fatfs_seek`.

use super::cluster::{self, FAT_CLUSTER_INVALID};
use super::FatState;
use crate::config::{PAGE_SIZE, SECTOR_SIZE};
use crate::device::disk;
use crate::error::{KResult, KernelError};
use crate::fs::file_table::FileObject;

/// A cluster's worth of scratch space for partial reads/writes, sized to
/// the largest cluster this mount will ever report (checked in
/// `Fat16::mount`). One page covers every `sec_per_cluster` up to 8 at a
/// 512-byte sector size, which spans the configurations the original
/// formatter produces.
pub const MAX_CLUSTER_SIZE: usize = PAGE_SIZE;

fn read_sectors(minor: u16, start_sector: u32, count: u32, out: &mut [u8]) -> KResult<()> {
    for i in 0..count {
        let off = (i as usize) * SECTOR_SIZE;
        let mut sector = [0u8; SECTOR_SIZE];
        disk::read_sector(minor, start_sector + i, &mut sector)?;
        out[off..off + SECTOR_SIZE].copy_from_slice(&sector);
    }
    Ok(())
}

fn write_sectors(minor: u16, start_sector: u32, count: u32, data: &[u8]) -> KResult<()> {
    for i in 0..count {
        let off = (i as usize) * SECTOR_SIZE;
        let mut sector = [0u8; SECTOR_SIZE];
        sector.copy_from_slice(&data[off..off + SECTOR_SIZE]);
        disk::write_sector(minor, start_sector + i, &sector)?;
    }
    Ok(())
}

fn cluster_start_sector(state: &FatState, cluster_num: u16) -> u32 {
    state.data_start + state.sec_per_cluster * (u32::from(cluster_num) - 2)
}

/// Advance `file.pos`/`file.curr_cluster` by `amount` bytes, following the
/// chain to the next cluster when the advance crosses a cluster boundary.
/// When `expand` is set (the write path) and the chain runs out, grows it
/// by one cluster first instead of failing.
fn move_file_pos(
    state: &mut FatState,
    minor: u16,
    file: &mut FileObject,
    amount: u32,
    expand: bool,
) -> KResult<()> {
    let offset = file.pos % state.cluster_byte_size;
    if offset + amount >= state.cluster_byte_size {
        let mut next = cluster::get_next(state, minor, file.curr_cluster)?;
        if cluster::cluster_invalid(next) {
            if !expand {
                return Err(KernelError::InvalidArgument);
            }
            expand_file(state, minor, file, state.cluster_byte_size)?;
            next = cluster::get_next(state, minor, file.curr_cluster)?;
        }
        file.curr_cluster = next;
    }
    file.pos += amount;
    Ok(())
}

/// Grow the cluster chain so it can absorb `inc_size` more bytes past the
/// file's current size. Does not touch `file.size`; the caller updates it
/// once the write actually lands.
pub fn expand_file(
    state: &mut FatState,
    minor: u16,
    file: &mut FileObject,
    inc_size: u32,
) -> KResult<()> {
    // No cluster is allocated for an empty file, so there is no remaining
    // room to grow into; anything else has `cluster_byte_size - 1 - offset`
    // bytes left in its last cluster.
    let cluster_remain = if file.size == 0 {
        0
    } else {
        state.cluster_byte_size - 1 - ((file.size - 1) % state.cluster_byte_size)
    };

    if inc_size <= cluster_remain {
        return Ok(());
    }

    let extra = (inc_size - cluster_remain).div_ceil(state.cluster_byte_size);
    let start = cluster::alloc(state, minor, extra as usize)?;
    if cluster::cluster_invalid(start) {
        return Err(KernelError::FatFull);
    }

    if cluster::cluster_invalid(file.start_cluster) {
        file.start_cluster = start;
        file.curr_cluster = start;
    } else {
        cluster::set_next(state, minor, file.curr_cluster, start)?;
    }
    Ok(())
}

/// Mirrors `fatfs_read`: whole clusters are read straight into the
/// caller's buffer; a boundary-straddling remainder goes through the
/// scratch buffer so only the requested bytes are copied out.
pub fn read(state: &mut FatState, minor: u16, file: &mut FileObject, buf: &mut [u8]) -> KResult<usize> {
    let mut nbytes = (buf.len() as u32).min(file.size.saturating_sub(file.pos));
    let mut total = 0usize;

    while nbytes > 0 {
        if cluster::cluster_invalid(file.curr_cluster) {
            break;
        }
        let cluster_offset = file.pos % state.cluster_byte_size;
        let sector = cluster_start_sector(state, file.curr_cluster);
        let cluster_byte_size = state.cluster_byte_size;
        let sec_per_cluster = state.sec_per_cluster;

        if cluster_offset == 0 && nbytes >= cluster_byte_size {
            let chunk = cluster_byte_size as usize;
            read_sectors(minor, sector, sec_per_cluster, &mut buf[total..total + chunk])?;
            total += chunk;
            nbytes -= cluster_byte_size;
            move_file_pos(state, minor, file, cluster_byte_size, false)?;
            continue;
        }

        let cluster_remain = cluster_byte_size - cluster_offset;
        let chunk = nbytes.min(cluster_remain) as usize;
        let mut scratch = [0u8; MAX_CLUSTER_SIZE];
        read_sectors(minor, sector, sec_per_cluster, &mut scratch[..cluster_byte_size as usize])?;
        let start = cluster_offset as usize;
        buf[total..total + chunk].copy_from_slice(&scratch[start..start + chunk]);
        total += chunk;
        nbytes -= chunk as u32;
        move_file_pos(state, minor, file, chunk as u32, false)?;
    }

    Ok(total)
}

/// Mirrors `fatfs_write`: grow the chain up front, then write whole
/// clusters directly and boundary remainders through the scratch buffer
/// (read-modify-write, since a partial cluster must preserve its other
/// bytes).
pub fn write(state: &mut FatState, minor: u16, file: &mut FileObject, buf: &[u8]) -> KResult<usize> {
    if file.pos + buf.len() as u32 > file.size {
        let inc = file.pos + buf.len() as u32 - file.size;
        expand_file(state, minor, file, inc)?;
    }

    let mut total = 0usize;
    let mut nbytes = buf.len() as u32;

    while nbytes > 0 {
        let cluster_offset = file.pos % state.cluster_byte_size;
        let sector = cluster_start_sector(state, file.curr_cluster);
        let cluster_byte_size = state.cluster_byte_size;
        let sec_per_cluster = state.sec_per_cluster;

        if cluster_offset == 0 && nbytes >= cluster_byte_size {
            let chunk = cluster_byte_size as usize;
            write_sectors(minor, sector, sec_per_cluster, &buf[total..total + chunk])?;
            total += chunk;
            nbytes -= cluster_byte_size;
            move_file_pos(state, minor, file, cluster_byte_size, true)?;
            continue;
        }

        let cluster_remain = cluster_byte_size - cluster_offset;
        let chunk = nbytes.min(cluster_remain) as usize;
        let mut scratch = [0u8; MAX_CLUSTER_SIZE];
        read_sectors(minor, sector, sec_per_cluster, &mut scratch[..cluster_byte_size as usize])?;
        let start = cluster_offset as usize;
        scratch[start..start + chunk].copy_from_slice(&buf[total..total + chunk]);
        write_sectors(minor, sector, sec_per_cluster, &scratch[..cluster_byte_size as usize])?;
        total += chunk;
        nbytes -= chunk as u32;
        move_file_pos(state, minor, file, chunk as u32, true)?;
    }

    file.size = file.size.max(file.pos);
    Ok(total)
}

/// Mirrors `fatfs_seek`: walks the cluster chain from the start, since a
/// FAT16 chain has no random-access shortcut. Rejects directories, as the
/// original does.
pub fn seek(state: &mut FatState, minor: u16, file: &mut FileObject, offset: u32) -> KResult<u32> {
    let mut cluster_num = file.start_cluster;
    let mut pos = 0u32;
    let mut remain = offset;

    while remain > 0 {
        if cluster::cluster_invalid(cluster_num) {
            return Err(KernelError::InvalidArgument);
        }
        if remain >= state.cluster_byte_size {
            remain -= state.cluster_byte_size;
            pos += state.cluster_byte_size;
            cluster_num = cluster::get_next(state, minor, cluster_num)?;
        } else {
            pos += remain;
            remain = 0;
        }
    }

    file.pos = pos;
    file.curr_cluster = if cluster::cluster_invalid(cluster_num) {
        FAT_CLUSTER_INVALID
    } else {
        cluster_num
    };
    Ok(pos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::file_table::FileType;

    fn file_at(pos: u32, size: u32, start: u16, curr: u16) -> FileObject {
        FileObject {
            ref_count: 1,
            file_type: FileType::Normal,
            mode: 0,
            pos,
            size,
            start_cluster: start,
            curr_cluster: curr,
            mount: 0,
            device_minor: 0,
            parent_entry_index: 0,
            name: [0; 12],
        }
    }

    #[test_case]
    fn read_clamps_to_remaining_file_size() {
        let mut file = file_at(10, 12, 2, 2);
        let mut buf = [0u8; 32];
        // No disk is attached in the test environment; `curr_cluster`
        // being invalid short-circuits the loop before any I/O happens,
        // exercising only the `nbytes` clamp computed up front.
        file.curr_cluster = FAT_CLUSTER_INVALID;
        let mut state = FatState {
            bytes_per_sec: 512,
            tbl_start: 1,
            tbl_sectors: 1,
            root_ent_cnt: 16,
            sec_per_cluster: 1,
            root_start: 3,
            data_start: 4,
            cluster_byte_size: 512,
            buffer: [0u8; 512],
        };
        let n = read(&mut state, 0x01, &mut file, &mut buf).expect("read");
        assert_eq!(n, 0);
    }

    #[test_case]
    fn seek_past_a_single_cluster_requires_a_next_link() {
        let mut file = file_at(0, 1024, 2, 2);
        let mut state = FatState {
            bytes_per_sec: 512,
            tbl_start: 1,
            tbl_sectors: 1,
            root_ent_cnt: 16,
            sec_per_cluster: 1,
            root_start: 3,
            data_start: 4,
            cluster_byte_size: 512,
            buffer: [0u8; 512],
        };
        // Cluster 2's chain entry hasn't been written, so `seek` beyond one
        // cluster's worth of bytes has nowhere real to go; without disk
        // backing the lookup itself errors, which is the behavior under
        // test here (a chain that runs out reports failure rather than
        // silently clamping).
        assert!(seek(&mut state, 0x01, &mut file, 600).is_err());
    }
}
