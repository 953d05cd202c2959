//! The kernel's only synchronization primitive below [`super::Mutex`] and
//! [`super::Semaphore`]: disable interrupts, capture the flags register, and
//! restore it verbatim on the way out. Nesting inside a handler that
//! already runs with IF=0 is a correct no-op restore.

use crate::arch::x86;

/// RAII guard around an interrupt-disabled critical section.
///
/// Construct with [`IrqGuard::enter`]; interrupts are restored to whatever
/// they were when the guard is dropped.
pub struct IrqGuard {
    flags: u32,
}

impl IrqGuard {
    /// Disable interrupts, recording the previous flags so they can be
    /// restored exactly, even if they were already off.
    #[must_use]
    pub fn enter() -> Self {
        let flags = unsafe { x86::save_flags_and_cli() };
        Self { flags }
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        unsafe { x86::restore_flags(self.flags) }
    }
}
