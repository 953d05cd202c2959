//! PS/2 keyboard scancode decoding, grounded in shape on the teacher's
//! `interrupts.rs` keyboard handler (which used the same `pc_keyboard`
//! crate), now feeding [`super::tty::feed_input`] for whichever console
//! currently has keyboard focus instead of a raw scancode queue.

use super::tty;
use crate::arch::x86::inb;
use crate::console;
use lazy_static::lazy_static;
use pc_keyboard::{layouts, DecodedKey, HandleControl, Keyboard, ScancodeSet1};
use spin::Mutex;

/// The PS/2 controller's data port.
const KEYBOARD_DATA_PORT: u16 = 0x60;

lazy_static! {
    static ref KEYBOARD: Mutex<Keyboard<layouts::Us104Key, ScancodeSet1>> = Mutex::new(
        Keyboard::new(ScancodeSet1::new(), layouts::Us104Key, HandleControl::Ignore)
    );
}

/// Nothing to eagerly set up beyond the lazily-built decoder; kept for
/// symmetry with `disk::init`/`tty::init` and to force its first touch
/// before interrupts are unmasked.
pub fn init() {
    let _ = &*KEYBOARD;
}

/// Called from the IDT's keyboard-vector stub. Reads one scancode byte,
/// runs it through the decoder, and forwards any resulting character to
/// the TTY backing the currently-displayed console.
pub fn on_irq() {
    // SAFETY: port 0x60 is the PS/2 controller's data register; reading it
    // here is the standard keyboard-IRQ acknowledgement sequence.
    let scancode = unsafe { inb(KEYBOARD_DATA_PORT) };
    let mut keyboard = KEYBOARD.lock();
    let Ok(Some(event)) = keyboard.add_byte(scancode) else {
        return;
    };
    let Some(key) = keyboard.process_keyevent(event) else {
        return;
    };
    if let DecodedKey::Unicode(c) = key {
        if c.is_ascii() {
            #[expect(
                clippy::cast_possible_truncation,
                reason = "checked is_ascii() above"
            )]
            tty::feed_input(console::active() as u16, c as u8);
        }
    }
}
