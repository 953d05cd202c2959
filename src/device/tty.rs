//! Line-discipline TTYs, one per console. Grounded on
//! `original_source/source/kernel/dev/tty.c`.
//!
//! Input bytes are produced by [`super::keyboard::on_irq`] calling
//! [`feed_input`]; [`read`] applies the line discipline (backspace erases
//! the pending line, newline terminates it, each consumed byte is echoed
//! to the owning console if echo is enabled) exactly as `tty_read` does.
//! [`write`] applies `tty_write`'s CRLF translation.

use crate::config::{CONSOLE_NUM, TTY_IBUF_SIZE};
use crate::console::CONSOLES;
use crate::error::{KResult, KernelError};
use crate::sync::Semaphore;
use core::sync::atomic::{AtomicBool, Ordering};
use lazy_static::lazy_static;
use spin::Mutex;

/// `ioctl` command enabling/disabling input echo, matching `TTY_CMD_ECHO`.
pub const TTY_CMD_ECHO: i32 = 0;

struct TtyState {
    ibuf: [u8; TTY_IBUF_SIZE],
    iread: usize,
    iwrite: usize,
    icount: usize,
}

impl TtyState {
    const fn new() -> Self {
        Self {
            ibuf: [0; TTY_IBUF_SIZE],
            iread: 0,
            iwrite: 0,
            icount: 0,
        }
    }

    fn put(&mut self, byte: u8) -> bool {
        if self.icount == self.ibuf.len() {
            return false;
        }
        self.ibuf[self.iwrite] = byte;
        self.iwrite = (self.iwrite + 1) % self.ibuf.len();
        self.icount += 1;
        true
    }

    fn get(&mut self) -> Option<u8> {
        if self.icount == 0 {
            return None;
        }
        let byte = self.ibuf[self.iread];
        self.iread = (self.iread + 1) % self.ibuf.len();
        self.icount -= 1;
        Some(byte)
    }
}

pub struct Tty {
    console_id: usize,
    state: Mutex<TtyState>,
    /// Counts bytes available to read; the producer (keyboard IRQ or
    /// [`feed_input`]) notifies it once per queued byte.
    isem: Semaphore,
    echo: AtomicBool,
}

impl Tty {
    const fn new(console_id: usize) -> Self {
        Self {
            console_id,
            state: Mutex::new(TtyState::new()),
            isem: Semaphore::new(0),
            echo: AtomicBool::new(true),
        }
    }
}

lazy_static! {
    static ref TTYS: [Tty; CONSOLE_NUM] = core::array::from_fn(Tty::new);
}

pub fn init() {
    // Nothing to eagerly initialize beyond the static table itself; kept
    // as a symmetric entry point alongside `disk::init`/`keyboard::init`.
    let _ = &*TTYS;
}

fn get(minor: u16) -> KResult<&'static Tty> {
    TTYS.get(minor as usize).ok_or(KernelError::NotFound)
}

/// Called by the keyboard driver with one decoded input byte, targeting
/// whichever TTY's console currently has keyboard focus.
pub fn feed_input(minor: u16, byte: u8) {
    let Ok(tty) = get(minor) else { return };
    let queued = tty.state.lock().put(byte);
    if queued {
        tty.isem.notify();
    }
}

/// `tty_open`: stateless beyond validating the minor number exists.
pub fn open(minor: u16) -> KResult<()> {
    get(minor).map(|_| ())
}

/// `tty_read`: consume bytes one at a time, honoring backspace/delete and
/// newline termination, echoing each effective edit if echo is enabled.
pub fn read(minor: u16, buf: &mut [u8]) -> KResult<usize> {
    let tty = get(minor)?;
    let echo = tty.echo.load(Ordering::Relaxed);
    let mut len = 0usize;
    while len < buf.len() {
        tty.isem.wait();
        let Some(byte) = tty.state.lock().get() else {
            continue;
        };
        match byte {
            0x08 | 0x7f if len > 0 => {
                len -= 1;
                if echo {
                    CONSOLES[tty.console_id].lock().write_bytes(b"\x08 \x08");
                }
            }
            0x08 | 0x7f => {}
            b'\n' | b'\r' => {
                buf[len] = b'\n';
                len += 1;
                if echo {
                    CONSOLES[tty.console_id].lock().write_bytes(b"\r\n");
                }
                break;
            }
            other => {
                buf[len] = other;
                len += 1;
                if echo {
                    CONSOLES[tty.console_id].lock().write_bytes(&[other]);
                }
            }
        }
    }
    Ok(len)
}

/// `tty_write`: translate `\n` to `\r\n` as a real terminal line discipline
/// does, writing straight through to the owning console.
pub fn write(minor: u16, buf: &[u8]) -> KResult<usize> {
    let tty = get(minor)?;
    let mut console = CONSOLES[tty.console_id].lock();
    for &byte in buf {
        if byte == b'\n' {
            console.write_bytes(b"\r\n");
        } else {
            console.write_bytes(&[byte]);
        }
    }
    Ok(buf.len())
}

/// `tty_control`: only `TTY_CMD_ECHO` is implemented, matching the
/// original's single supported command.
pub fn control(minor: u16, cmd: i32, arg0: i32) -> KResult<()> {
    let tty = get(minor)?;
    if cmd == TTY_CMD_ECHO {
        tty.echo.store(arg0 != 0, Ordering::Relaxed);
    }
    Ok(())
}

/// `tty_close`: real no-op, matching the original's empty stub body.
pub fn close(_minor: u16) -> KResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn echo_off_suppresses_console_write_but_not_line_assembly() {
        control(0, TTY_CMD_ECHO, 0).expect("control");
        feed_input(0, b'h');
        feed_input(0, b'i');
        feed_input(0, b'\n');
        let mut buf = [0u8; 8];
        let n = read(0, &mut buf).expect("read");
        assert_eq!(&buf[..n], b"hi\n");
        control(0, TTY_CMD_ECHO, 1).expect("control");
    }

    #[test_case]
    fn backspace_removes_the_previous_character() {
        feed_input(1, b'h');
        feed_input(1, b'x');
        feed_input(1, 0x08);
        feed_input(1, b'i');
        feed_input(1, b'\n');
        let mut buf = [0u8; 8];
        let n = read(1, &mut buf).expect("read");
        assert_eq!(&buf[..n], b"hi\n");
    }
}
