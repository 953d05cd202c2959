//! VGA text-mode attribute byte, grounded on the teacher's
//! `vga_buffer/colors.rs` but driven by ANSI SGR codes rather than a
//! caller-chosen enum: [`super::ansi`] maps SGR parameters 30-37/40-47/39/49
//! onto this table exactly as `dev/console.c: set_font_style`'s
//! `color_table` does.

/// One of the eight ANSI colors VGA text mode can express per nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0,
    Red = 4,
    Green = 2,
    Yellow = 6,
    Blue = 1,
    Magenta = 5,
    Cyan = 3,
    White = 7,
}

/// Map an ANSI color index (0-7, the low three bits of an SGR 3x/4x code)
/// to this table, reproducing `dev/console.c`'s `color_table` ordering
/// (ANSI green/yellow and blue/cyan swap relative to VGA's native nibble
/// order).
#[must_use]
pub const fn from_ansi_index(index: u8) -> Color {
    match index & 0x7 {
        0 => Color::Black,
        1 => Color::Red,
        2 => Color::Green,
        3 => Color::Yellow,
        4 => Color::Blue,
        5 => Color::Magenta,
        6 => Color::Cyan,
        _ => Color::White,
    }
}

/// A VGA attribute byte: background nibble, foreground nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct ColorCode(u8);

impl ColorCode {
    #[must_use]
    pub const fn new(foreground: Color, background: Color) -> Self {
        Self((background as u8) << 4 | (foreground as u8))
    }

    #[must_use]
    pub const fn default_code() -> Self {
        Self::new(Color::White, Color::Black)
    }

    #[must_use]
    pub const fn with_foreground(self, fg: Color) -> Self {
        Self((self.0 & 0xF0) | fg as u8)
    }

    #[must_use]
    pub const fn with_background(self, bg: Color) -> Self {
        Self((self.0 & 0x0F) | (bg as u8) << 4)
    }

    #[must_use]
    pub const fn reset() -> Self {
        Self::default_code()
    }

    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }
}

impl Default for ColorCode {
    fn default() -> Self {
        Self::default_code()
    }
}
