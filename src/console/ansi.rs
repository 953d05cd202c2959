//! The escape-sequence state machine driving each console's cursor and
//! SGR color state. Grounded on `dev/console.c`'s `write_normal_state`,
//! `write_esc_state`, and `write_esc_seq`.

use super::colors::from_ansi_index;
use super::Console;

/// Where a console's byte-feed loop currently is in an escape sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Ordinary text; control characters (`\n`, `\r`, `\x08`, `\x7f`) are
    /// handled directly, anything else is a printable character.
    Normal,
    /// Just consumed `ESC` (`0x1b`); next byte must be `[` to enter `Seq`.
    Esc,
    /// Inside `ESC [ ... <final>`, accumulating `;`-separated decimal
    /// parameters until a final (non-digit, non-`;`) byte arrives.
    Seq,
}

/// Maximum number of `;`-separated parameters an escape sequence may carry;
/// extras are silently dropped, matching the original's fixed-size
/// `esc_param` array.
const MAX_PARAMS: usize = 4;

pub struct Parser {
    pub state: State,
    params: [u32; MAX_PARAMS],
    param_count: usize,
}

impl Parser {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: State::Normal,
            params: [0; MAX_PARAMS],
            param_count: 0,
        }
    }

    fn clear_params(&mut self) {
        self.params = [0; MAX_PARAMS];
        self.param_count = 0;
    }

    fn param(&self, index: usize, default: u32) -> u32 {
        if index >= self.param_count {
            return default;
        }
        match self.params.get(index) {
            Some(&0) => default,
            Some(&v) => v,
            None => default,
        }
    }
}

impl Default for Parser {
    fn default() -> Self {
        Self::new()
    }
}

/// Feed one byte through `console`'s escape-sequence state machine,
/// mutating its cursor/color state and the shared display buffer as the
/// original's three `write_*_state` functions do.
pub fn feed(console: &mut Console, byte: u8) {
    match console.parser.state {
        State::Normal => write_normal_state(console, byte),
        State::Esc => write_esc_state(console, byte),
        State::Seq => write_seq_state(console, byte),
    }
}

fn write_normal_state(console: &mut Console, byte: u8) {
    match byte {
        0x1b => console.parser.state = State::Esc,
        b'\n' => console.move_to_next_row(),
        b'\r' => console.move_to_col0(),
        0x08 => console.move_left(1),
        0x7f => console.erase_one_char(),
        printable => console.show_char(printable),
    }
}

fn write_esc_state(console: &mut Console, byte: u8) {
    if byte == b'[' {
        console.parser.clear_params();
        console.parser.state = State::Seq;
    } else {
        // Malformed sequence; drop back to normal text handling.
        console.parser.state = State::Normal;
        write_normal_state(console, byte);
    }
}

fn write_seq_state(console: &mut Console, byte: u8) {
    match byte {
        b'0'..=b'9' => {
            let digit = u32::from(byte - b'0');
            if console.parser.param_count == 0 {
                console.parser.param_count = 1;
            }
            let idx = console.parser.param_count - 1;
            if let Some(slot) = console.parser.params.get_mut(idx) {
                *slot = *slot * 10 + digit;
            }
        }
        b';' => {
            if console.parser.param_count < MAX_PARAMS {
                console.parser.param_count += 1;
            }
        }
        final_byte => {
            dispatch_final(console, final_byte);
            console.parser.state = State::Normal;
        }
    }
}

fn dispatch_final(console: &mut Console, final_byte: u8) {
    match final_byte {
        b'm' => set_font_style(console),
        b'D' => console.move_left(console.parser.param(0, 1) as usize),
        b'C' => console.move_right(console.parser.param(0, 1) as usize),
        b'H' | b'f' => {
            let row = console.parser.param(0, 1).saturating_sub(1) as usize;
            let col = console.parser.param(1, 1).saturating_sub(1) as usize;
            console.move_cursor(row, col);
        }
        b'J' => console.erase_in_display(console.parser.param(0, 0)),
        b's' => console.save_cursor(),
        b'u' => console.restore_cursor(),
        _ => {}
    }
}

/// `ESC [ <params> m`: interpret every parameter as an SGR code, matching
/// `set_font_style`'s `color_table` lookup for `30-37`/`40-47`, plus `0`
/// (reset), `39` (default foreground), and `49` (default background).
fn set_font_style(console: &mut Console) {
    let count = console.parser.param_count.max(1);
    for i in 0..count {
        match console.parser.param(i, 0) {
            0 => console.reset_color(),
            39 => console.reset_foreground(),
            49 => console.reset_background(),
            code @ 30..=37 => console.set_foreground(from_ansi_index((code - 30) as u8)),
            code @ 40..=47 => console.set_background(from_ansi_index((code - 40) as u8)),
            _ => {}
        }
    }
}
