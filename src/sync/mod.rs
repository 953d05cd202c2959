//! Blocking IPC primitives layered directly on the scheduler's task-state
//! transitions, plus the interrupt-disable critical section they and the
//! scheduler itself are built from.

pub mod irq;
pub mod mutex;
pub mod semaphore;

pub use irq::IrqGuard;
pub use mutex::Mutex;
pub use semaphore::Semaphore;
