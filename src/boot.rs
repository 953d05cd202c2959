//! Multiboot2 information parsing. The loader hands `kernel_main` a
//! pointer to this tag stream in `ebx` (stashed by the assembly trampoline
//! in `entry_point.rs`); the only tag this kernel reads is the memory map,
//! which seeds the bitmap frame allocator's bounds.

const TAG_TYPE_END: u32 = 0;
const TAG_TYPE_MEMORY_MAP: u32 = 6;

/// One usable RAM region as reported by tag type 6.
#[derive(Clone, Copy, Debug)]
pub struct MemRegion {
    pub base: u64,
    pub length: u64,
}

/// Walk the tag stream starting at `info`, returning the largest
/// available (type 1) region from the memory map tag, or `None` if the
/// tag is absent or empty.
///
/// # Safety
/// `info` must be the multiboot info pointer handed to `kernel_main` by
/// the loader, pointing at a valid tag stream for the lifetime of this
/// call.
#[must_use]
pub unsafe fn largest_available_region(info: *const u8) -> Option<MemRegion> {
    // Safety: caller guarantees `info` names a valid multiboot2 info
    // structure; `total_size` is always its first field.
    let total_size = unsafe { core::ptr::read_unaligned(info.cast::<u32>()) };
    let mut offset = 8usize; // skip total_size + reserved
    let mut best: Option<MemRegion> = None;

    while offset + 8 <= total_size as usize {
        // Safety: `offset` stays within `[0, total_size)`, checked above.
        let tag_ptr = unsafe { info.add(offset) };
        let tag_type = unsafe { core::ptr::read_unaligned(tag_ptr.cast::<u32>()) };
        let tag_size = unsafe { core::ptr::read_unaligned(tag_ptr.add(4).cast::<u32>()) };

        if tag_type == TAG_TYPE_END {
            break;
        }

        if tag_type == TAG_TYPE_MEMORY_MAP {
            let entry_size =
                unsafe { core::ptr::read_unaligned(tag_ptr.add(8).cast::<u32>()) } as usize;
            let entries_start = offset + 16;
            let entries_end = offset + tag_size as usize;
            let mut entry_off = entries_start;
            while entry_off + 24 <= entries_end && entry_size >= 24 {
                // Safety: bounds checked by the loop condition above.
                let entry_ptr = unsafe { info.add(entry_off) };
                let base = unsafe { core::ptr::read_unaligned(entry_ptr.cast::<u64>()) };
                let length =
                    unsafe { core::ptr::read_unaligned(entry_ptr.add(8).cast::<u64>()) };
                let kind = unsafe { core::ptr::read_unaligned(entry_ptr.add(16).cast::<u32>()) };

                if kind == 1 && best.map_or(true, |r| length > r.length) {
                    best = Some(MemRegion { base, length });
                }

                entry_off += entry_size;
            }
        }

        // Tags are 8-byte aligned; advance past this tag's payload plus
        // its padding.
        offset += (tag_size as usize).div_ceil(8) * 8;
    }

    best
}
