//! Ready/sleep queues, preemptive dispatch, and time-slice accounting.
//! Grounded on `task_set_ready`/`task_set_unready`/`task_dispatch`/
//! `task_next_run`/`task_time_tick`/`sys_yield`/`sys_msleep` in
//! `original_source/source/kernel/core/task.c`.

use super::context::switch_to;
use super::{current_id, set_current, Pid, TaskState, IDLE_TASK_ID, TASK_TABLE};
use crate::config::{OS_TICK_MS, TASK_TIME_SLICE_TICKS};
use crate::sync::irq::IrqGuard;
use spin::Mutex;

use crate::collections::list::IndexList;

static READY: Mutex<IndexList> = Mutex::new(IndexList::new());
static SLEEP: Mutex<IndexList> = Mutex::new(IndexList::new());

/// Insert `id` into the ready list and mark it `Ready`. No-op if it is
/// already the running task (callers are expected to check).
pub fn set_ready(id: u16) {
    let _guard = IrqGuard::enter();
    let mut table = TASK_TABLE.lock();
    table.get_mut(id).state = TaskState::Ready;
    READY.lock().push_back(&mut *table, id);
}

/// Remove `id` from the ready list. Used before moving a task to Sleep,
/// Waiting, or Zombie.
pub fn set_unready(id: u16) {
    let _guard = IrqGuard::enter();
    let mut table = TASK_TABLE.lock();
    READY.lock().remove(&mut *table, id);
}

/// Pick the next task to run: the ready list's head, or the idle task if
/// the ready list is empty. The idle task is never itself enqueued.
fn next_run() -> u16 {
    READY.lock().front().unwrap_or(IDLE_TASK_ID)
}

/// Switch away from the currently-running task to the head of the ready
/// list (or idle). Must be called with interrupts effectively disabled by
/// the caller's critical section; re-enables them naturally on return via
/// the restored EFLAGS of the resumed task.
pub fn dispatch() {
    let _guard = IrqGuard::enter();
    let prev = current_id();
    let next = next_run();

    if Some(next) == prev {
        return;
    }

    {
        let mut table = TASK_TABLE.lock();
        if next != IDLE_TASK_ID {
            READY.lock().remove(&mut *table, next);
        }
        table.get_mut(next).state = TaskState::Running;
        table.get_mut(next).slice_remaining = TASK_TIME_SLICE_TICKS;
    }

    set_current(Some(next));

    let (prev_esp_ptr, next_esp, next_cr3, next_stack_top): (*mut u32, u32, u32, u32);
    {
        let mut table = TASK_TABLE.lock();
        let next_task = table.get(next);
        next_esp = next_task.kernel_esp;
        next_cr3 = next_task.page_dir_phys;
        next_stack_top = next_task.kernel_stack_top;
        prev_esp_ptr = match prev {
            Some(p) => core::ptr::addr_of_mut!(table.get_mut(p).kernel_esp),
            None => core::ptr::null_mut(),
        };
    }

    crate::gdt::set_kernel_stack(next_stack_top);

    // Safety: `prev_esp_ptr` is either null (first dispatch, nothing to
    // save) or points at a live `Task::kernel_esp` field that outlives this
    // call; `next_esp`/`next_cr3` were read from a task whose kernel stack
    // and page directory are fully constructed before it is ever enqueued.
    unsafe {
        switch_to(prev_esp_ptr, next_esp, next_cr3);
    }
}

/// `sys_yield`: push the caller back onto the tail of ready and dispatch.
/// No-op (but interrupt state is still correctly restored on every path,
/// fixing the specification-flagged leak in the original) if there is no
/// other ready task, since the caller was already removed from `READY` by
/// `dispatch` on the way in and is not itself a member to rotate.
pub fn r#yield() {
    let _guard = IrqGuard::enter();
    if let Some(id) = current_id() {
        let mut table = TASK_TABLE.lock();
        // The running task is not a member of READY (dispatch removed it on
        // the way in), so it must be pushed back, not rotated: rotate_to_back
        // calls remove on a non-member and corrupts the list.
        if READY.lock().len() >= 1 {
            table.get_mut(id).state = TaskState::Ready;
            READY.lock().push_back(&mut *table, id);
        }
    }
    dispatch();
}

/// `sys_msleep`: convert milliseconds to ticks (ceiling division), move the
/// caller from ready to sleep, and dispatch.
pub fn msleep(ms: u32) {
    let _guard = IrqGuard::enter();
    let Some(id) = current_id() else { return };
    let ticks = ms.div_ceil(OS_TICK_MS).max(1);
    {
        let mut table = TASK_TABLE.lock();
        READY.lock().remove(&mut *table, id);
        table.get_mut(id).state = TaskState::Sleep;
        table.get_mut(id).sleep_ticks = ticks;
        SLEEP.lock().push_back(&mut *table, id);
    }
    dispatch();
}

/// Timer-tick handler: decrement the current task's slice (rotating and
/// redispatching on expiry if contested), then age the sleep list.
pub fn time_tick() {
    let _guard = IrqGuard::enter();
    if let Some(id) = current_id() {
        let mut table = TASK_TABLE.lock();
        let slice = &mut table.get_mut(id).slice_remaining;
        if *slice > 0 {
            *slice -= 1;
        }
        let expired = table.get(id).slice_remaining == 0;
        if expired && READY.lock().len() >= 1 {
            table.get_mut(id).state = TaskState::Ready;
            READY.lock().push_back(&mut *table, id);
            drop(table);
            dispatch();
        }
    }

    let mut woken: [Option<u16>; 8] = [None; 8];
    let mut woken_count = 0usize;
    {
        let mut table = TASK_TABLE.lock();
        let mut cursor = SLEEP.lock().front();
        while let Some(id) = cursor {
            let task = table.get_mut(id);
            cursor = task.link.next;
            if task.sleep_ticks > 0 {
                task.sleep_ticks -= 1;
            }
            if task.sleep_ticks == 0 && woken_count < woken.len() {
                woken[woken_count] = Some(id);
                woken_count += 1;
            }
        }
        for slot in woken.iter().take(woken_count).flatten() {
            SLEEP.lock().remove(&mut *table, *slot);
            table.get_mut(*slot).state = TaskState::Ready;
            READY.lock().push_back(&mut *table, *slot);
        }
    }
    dispatch();
}

/// Number of tasks currently in the ready list (used by the testable
/// preemption-ordering scenario).
#[must_use]
pub fn ready_len() -> usize {
    READY.lock().len()
}

#[must_use]
pub fn current_pid() -> Pid {
    current_id()
        .map(|id| TASK_TABLE.lock().get(id).pid)
        .unwrap_or(0)
}
