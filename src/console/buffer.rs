//! The shared VGA text-mode MMIO region backing every console. Grounded on
//! the teacher's `vga_buffer/buffer.rs`, widened from one screen's worth of
//! rows to `CONSOLE_NUM * CONSOLE_ROW` rows: all consoles' characters live
//! in this one contiguous plane (`dev/console.c: console_select`), and the
//! CRTC start-address register picks which `CONSOLE_ROW`-row window the
//! display currently shows.

use crate::config::{CONSOLE_COL, CONSOLE_NUM, CONSOLE_ROW};
use crate::console::colors::ColorCode;
use volatile::Volatile;

/// Physical/linear address of the VGA text-mode plane.
const VGA_BUFFER_ADDR: usize = 0xb_8000;

/// Total rows across every console, back to back in the same MMIO plane.
pub const TOTAL_ROWS: usize = CONSOLE_NUM * CONSOLE_ROW;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct ScreenChar {
    pub ascii_character: u8,
    pub color_code: ColorCode,
}

impl ScreenChar {
    #[must_use]
    pub const fn blank(color_code: ColorCode) -> Self {
        Self {
            ascii_character: b' ',
            color_code,
        }
    }
}

#[repr(C)]
pub struct Buffer {
    pub chars: [[Volatile<ScreenChar>; CONSOLE_COL]; TOTAL_ROWS],
}

impl Buffer {
    /// # Safety
    /// Must only be called once; aliases the real VGA MMIO window.
    #[must_use]
    pub unsafe fn at_mmio() -> &'static mut Self {
        unsafe { &mut *(VGA_BUFFER_ADDR as *mut Self) }
    }

    /// The first absolute row a given console's window starts at.
    #[must_use]
    pub const fn console_row_base(console_id: usize) -> usize {
        console_id * CONSOLE_ROW
    }
}
