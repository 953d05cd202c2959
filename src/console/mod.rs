//! Multi-console VGA text output: `CONSOLE_NUM` independent consoles
//! sharing one contiguous hardware text-mode plane, each with its own
//! cursor, SGR color state, and ANSI escape parser. Grounded on
//! `original_source/source/kernel/dev/console.c`, superseding the teacher's
//! single-screen `vga_buffer` module.
//!
//! Console 0 backs the kernel's own `print!`/`println!` macros (the
//! teacher's boot banner output); consoles are otherwise driven by
//! [`crate::device::tty`] writes and switched with [`select`].

pub mod ansi;
pub mod buffer;
pub mod colors;

use crate::config::{CONSOLE_COL, CONSOLE_NUM, CONSOLE_ROW};
use crate::arch::x86::{inb, outb};
use buffer::{Buffer, ScreenChar};
use colors::{Color, ColorCode};
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};
use lazy_static::lazy_static;
use spin::Mutex;

/// CRTC index register port.
const CRTC_INDEX_PORT: u16 = 0x3D4;
/// CRTC data register port.
const CRTC_DATA_PORT: u16 = 0x3D5;
/// CRTC "start address high" register index.
const CRTC_START_HIGH: u8 = 0x0C;
/// CRTC "start address low" register index.
const CRTC_START_LOW: u8 = 0x0D;

lazy_static! {
    static ref BUFFER: Mutex<&'static mut Buffer> = {
        // SAFETY: called exactly once, here, before any console is used.
        Mutex::new(unsafe { Buffer::at_mmio() })
    };
}

/// Index of the console currently shown on the physical display. Writes to
/// any console's buffer window land regardless of which one is selected;
/// this only governs the CRTC start address.
static ACTIVE: AtomicUsize = AtomicUsize::new(0);

pub struct Console {
    id: usize,
    cursor_row: usize,
    cursor_col: usize,
    saved_cursor: Option<(usize, usize)>,
    color: ColorCode,
    parser: ansi::Parser,
}

impl Console {
    const fn new(id: usize) -> Self {
        Self {
            id,
            cursor_row: 0,
            cursor_col: 0,
            saved_cursor: None,
            color: ColorCode::default_code(),
            parser: ansi::Parser::new(),
        }
    }

    fn row_base(&self) -> usize {
        Buffer::console_row_base(self.id)
    }

    /// Feed one byte through the ANSI state machine.
    pub fn write_byte(&mut self, byte: u8) {
        ansi::feed(self, byte);
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.write_byte(b);
        }
    }

    fn show_char(&mut self, ch: u8) {
        if self.cursor_col >= CONSOLE_COL {
            self.move_to_next_row();
        }
        let row = self.row_base() + self.cursor_row;
        let color = self.color;
        BUFFER.lock().chars[row][self.cursor_col].write(ScreenChar {
            ascii_character: ch,
            color_code: color,
        });
        self.cursor_col += 1;
    }

    fn move_to_col0(&mut self) {
        self.cursor_col = 0;
    }

    /// Line feed. Corrected predicate (specification-flagged bug fix): the
    /// original compared `cursor_row >= cursor_row - 1`, a tautology that
    /// always scrolled; this compares against the window's last row.
    fn move_to_next_row(&mut self) {
        self.cursor_col = 0;
        if self.cursor_row >= CONSOLE_ROW - 1 {
            self.scroll_up();
        } else {
            self.cursor_row += 1;
        }
    }

    fn scroll_up(&mut self) {
        let base = self.row_base();
        let mut buf = BUFFER.lock();
        for row in 1..CONSOLE_ROW {
            for col in 0..CONSOLE_COL {
                let c = buf.chars[base + row][col].read();
                buf.chars[base + row - 1][col].write(c);
            }
        }
        let blank = ScreenChar::blank(self.color);
        for col in 0..CONSOLE_COL {
            buf.chars[base + CONSOLE_ROW - 1][col].write(blank);
        }
    }

    /// `\x7f` (DEL): move back one column and blank the vacated cell.
    /// Plain `\x08` (BS) only moves the cursor, handled directly by
    /// [`ansi::feed`] via [`Self::move_left`].
    fn erase_one_char(&mut self) {
        if self.cursor_col == 0 {
            return;
        }
        self.cursor_col -= 1;
        let row = self.row_base() + self.cursor_row;
        let blank = ScreenChar::blank(self.color);
        BUFFER.lock().chars[row][self.cursor_col].write(blank);
    }

    fn move_left(&mut self, n: usize) {
        self.cursor_col = self.cursor_col.saturating_sub(n);
    }

    fn move_right(&mut self, n: usize) {
        self.cursor_col = (self.cursor_col + n).min(CONSOLE_COL - 1);
    }

    fn move_cursor(&mut self, row: usize, col: usize) {
        self.cursor_row = row.min(CONSOLE_ROW - 1);
        self.cursor_col = col.min(CONSOLE_COL - 1);
    }

    /// `ESC [ n J`: `0` clears cursor-to-end, `1` clears start-to-cursor,
    /// `2` clears the whole window, per `erase_in_display`.
    fn erase_in_display(&mut self, mode: u32) {
        let base = self.row_base();
        let mut buf = BUFFER.lock();
        let blank = ScreenChar::blank(self.color);
        let (from, to) = match mode {
            1 => (0, self.cursor_row),
            2 => (0, CONSOLE_ROW - 1),
            _ => (self.cursor_row, CONSOLE_ROW - 1),
        };
        for row in from..=to {
            for col in 0..CONSOLE_COL {
                buf.chars[base + row][col].write(blank);
            }
        }
    }

    fn save_cursor(&mut self) {
        self.saved_cursor = Some((self.cursor_row, self.cursor_col));
    }

    fn restore_cursor(&mut self) {
        if let Some((row, col)) = self.saved_cursor {
            self.cursor_row = row;
            self.cursor_col = col;
        }
    }

    fn reset_color(&mut self) {
        self.color = ColorCode::reset();
    }

    fn reset_foreground(&mut self) {
        self.color = self.color.with_foreground(Color::White);
    }

    fn reset_background(&mut self) {
        self.color = self.color.with_background(Color::Black);
    }

    fn set_foreground(&mut self, color: Color) {
        self.color = self.color.with_foreground(color);
    }

    fn set_background(&mut self, color: Color) {
        self.color = self.color.with_background(color);
    }
}

impl fmt::Write for Console {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.write_bytes(s.as_bytes());
        Ok(())
    }
}

lazy_static! {
    pub static ref CONSOLES: [Mutex<Console>; CONSOLE_NUM] =
        core::array::from_fn(|i| Mutex::new(Console::new(i)));
}

/// Program the CRTC start-address register pair to display `id`'s window
/// and record it as the active console. Mirrors `dev/console.c:
/// console_select` exactly: hardware paging, not a software blit.
pub fn select(id: usize) {
    let start = (Buffer::console_row_base(id) * CONSOLE_COL) as u16;
    // SAFETY: writes to the CRTC index/data ports are only ever issued
    // here, and `start` addresses a row range within the real text plane.
    unsafe {
        outb(CRTC_INDEX_PORT, CRTC_START_HIGH);
        outb(CRTC_DATA_PORT, (start >> 8) as u8);
        outb(CRTC_INDEX_PORT, CRTC_START_LOW);
        outb(CRTC_DATA_PORT, (start & 0xFF) as u8);
    }
    ACTIVE.store(id, Ordering::SeqCst);
}

#[must_use]
pub fn active() -> usize {
    ACTIVE.load(Ordering::SeqCst)
}

/// Read back the currently-programmed CRTC start address, for tests that
/// want to confirm [`select`] actually reprogrammed the hardware without
/// guessing at port side effects.
#[must_use]
pub fn read_crtc_start() -> u16 {
    // SAFETY: reads of the CRTC index/data port pair are always valid.
    unsafe {
        outb(CRTC_INDEX_PORT, CRTC_START_HIGH);
        let high = inb(CRTC_DATA_PORT);
        outb(CRTC_INDEX_PORT, CRTC_START_LOW);
        let low = inb(CRTC_DATA_PORT);
        u16::from(high) << 8 | u16::from(low)
    }
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    use core::fmt::Write as _;
    #[expect(
        clippy::unwrap_used,
        reason = "Writing through the VGA console buffer cannot fail."
    )]
    CONSOLES[0].lock().write_fmt(args).unwrap();
}

/// Copy of the std `print!` macro, routed to console 0's buffer.
#[macro_export]
macro_rules! print {
    ($($arg:tt)*) => ($crate::console::_print(format_args!($($arg)*)));
}

/// Copy of the std `println!` macro, routed to console 0's buffer.
#[macro_export]
macro_rules! println {
    () => ($crate::print!("\n"));
    ($($arg:tt)*) => ($crate::print!("{}\n", format_args!($($arg)*)));
}
