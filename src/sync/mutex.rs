//! Blocking, FIFO-fair, recursive mutex layered on the scheduler's
//! task-state transitions. Grounded on
//! `original_source/source/kernel/ipc/mutex.c`.

use super::irq::IrqGuard;
use crate::collections::list::IndexList;
use crate::task::{current_id, scheduler, TaskState, WaitArena, TASK_TABLE};
use spin::Mutex as SpinMutex;

struct Inner {
    owner: Option<u16>,
    locked_count: u32,
    wait_list: IndexList,
}

/// A mutex whose *contention path* blocks the calling task (scheduler-level
/// sleep, not a spin loop), FIFO-ordering waiters, and allowing the current
/// owner to re-acquire recursively.
pub struct Mutex {
    inner: SpinMutex<Inner>,
}

impl Mutex {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            inner: SpinMutex::new(Inner {
                owner: None,
                locked_count: 0,
                wait_list: IndexList::new(),
            }),
        }
    }

    /// Acquire the lock, blocking the caller if another task holds it.
    pub fn lock(&self) {
        let _guard = IrqGuard::enter();
        let Some(curr) = current_id() else {
            // Before the scheduler exists (early boot), there is no
            // contention to speak of.
            return;
        };

        loop {
            let mut inner = self.inner.lock();
            match inner.owner {
                None => {
                    inner.owner = Some(curr);
                    inner.locked_count = 1;
                    return;
                }
                Some(owner) if owner == curr => {
                    inner.locked_count += 1;
                    return;
                }
                Some(_) => {
                    scheduler::set_unready(curr);
                    {
                        let mut table = TASK_TABLE.lock();
                        table.get_mut(curr).state = TaskState::Waiting;
                        inner.wait_list.push_back(&mut WaitArena(&mut table), curr);
                    }
                    drop(inner);
                    scheduler::dispatch();
                    // Resumed because we were handed ownership directly by
                    // `unlock`; loop back to record it.
                }
            }
        }
    }

    /// Release the lock. If the recursive count drops to zero and a waiter
    /// is queued, ownership transfers directly to the FIFO head, which is
    /// made ready without re-contending.
    pub fn unlock(&self) {
        let _guard = IrqGuard::enter();
        let Some(curr) = current_id() else { return };
        let mut inner = self.inner.lock();
        if inner.owner != Some(curr) {
            return;
        }
        inner.locked_count -= 1;
        if inner.locked_count != 0 {
            return;
        }
        inner.owner = None;
        let mut table = TASK_TABLE.lock();
        if let Some(next) = inner.wait_list.pop_front(&mut WaitArena(&mut table)) {
            inner.locked_count = 1;
            inner.owner = Some(next);
            drop(inner);
            drop(table);
            scheduler::set_ready(next);
        }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
