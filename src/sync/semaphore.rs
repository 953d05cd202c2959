//! Counting semaphore, FIFO-fair over its wait list. Grounded on
//! `original_source/source/kernel/ipc/sem.c`.

use super::irq::IrqGuard;
use crate::collections::list::IndexList;
use crate::task::{current_id, scheduler, TaskState, WaitArena, TASK_TABLE};
use spin::Mutex as SpinMutex;

struct Inner {
    count: i32,
    wait_list: IndexList,
}

pub struct Semaphore {
    inner: SpinMutex<Inner>,
}

impl Semaphore {
    #[must_use]
    pub const fn new(initial: i32) -> Self {
        Self {
            inner: SpinMutex::new(Inner {
                count: initial,
                wait_list: IndexList::new(),
            }),
        }
    }

    /// `sem_wait`: decrement if positive, otherwise block the caller until
    /// `notify` hands it the count directly.
    pub fn wait(&self) {
        let _guard = IrqGuard::enter();
        let mut inner = self.inner.lock();
        if inner.count > 0 {
            inner.count -= 1;
            return;
        }
        let Some(curr) = current_id() else { return };
        scheduler::set_unready(curr);
        {
            let mut table = TASK_TABLE.lock();
            table.get_mut(curr).state = TaskState::Waiting;
            inner.wait_list.push_back(&mut WaitArena(&mut table), curr);
        }
        drop(inner);
        scheduler::dispatch();
    }

    /// `sem_notify`: wake the FIFO head if one is waiting, else increment
    /// the count for a future `wait`.
    pub fn notify(&self) {
        let _guard = IrqGuard::enter();
        let mut inner = self.inner.lock();
        let mut table = TASK_TABLE.lock();
        if let Some(next) = inner.wait_list.pop_front(&mut WaitArena(&mut table)) {
            drop(inner);
            drop(table);
            scheduler::set_ready(next);
        } else {
            inner.count += 1;
        }
    }

    #[must_use]
    pub fn count(&self) -> i32 {
        self.inner.lock().count
    }
}
