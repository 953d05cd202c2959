//! Task records, the task table, and the state machine the scheduler and
//! process lifecycle operate on. Grounded on
//! `original_source/source/kernel/core/task.c`.

pub mod context;
pub mod elf;
pub mod process;
pub mod scheduler;

use crate::collections::list::{Link, LinkArena};
use crate::config::{TASK_NUM, TASK_OFILE_NUM};
use crate::sync::irq::IrqGuard;
use spin::Mutex;

/// A task's position in the lifecycle state machine (specification §4.2).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TaskState {
    /// Slot is unused.
    Unused,
    /// Record initialized but not yet inserted into the ready list.
    Created,
    /// In the ready list, eligible for dispatch.
    Ready,
    /// Currently on the CPU.
    Running,
    /// On the sleep list, counting down `sleep_ticks`.
    Sleep,
    /// Blocked on a semaphore, mutex, or child exit.
    Waiting,
    /// Exited; resources pending reap by `wait()`.
    Zombie,
}

/// Stable, non-zero task identifier.
pub type Pid = u32;

/// A fixed-size array of open-file-table indices, one task's worth of fds.
/// Boxed as a plain array of optional raw indices to avoid a dependency
/// cycle with `crate::fs`; the file-table module interprets the `u16`.
pub type OfileTable = [Option<u16>; TASK_OFILE_NUM];

/// Per-task record. Reused in place across the task's whole lifetime
/// (`Unused` -> `Created` -> ... -> `Zombie` -> `Unused`); never reallocated.
pub struct Task {
    pub state: TaskState,
    pub pid: Pid,
    pub name: [u8; 32],
    pub name_len: u8,
    pub exit_status: i32,
    /// Saved kernel stack pointer when not the running task (software
    /// context switch, per the specification's §9 allowance).
    pub kernel_esp: u32,
    /// Top of this task's ring-0 stack; written into the shared TSS's
    /// `esp0` field immediately before dispatch so ring-3 -> ring-0
    /// transitions land on the right stack.
    pub kernel_stack_top: u32,
    /// Physical frame backing the kernel stack, freed by `wait()`.
    pub kernel_stack_phys: u32,
    /// Physical address of this task's page directory.
    pub page_dir_phys: u32,
    pub slice_remaining: u32,
    pub sleep_ticks: u32,
    pub parent: Option<u16>,
    pub heap_start: u32,
    pub heap_end: u32,
    pub ofile: OfileTable,
    /// Membership in the ready or sleep list (mutually exclusive, shared
    /// node per the specification's "single run_node per task").
    pub link: Link,
    /// Membership in a semaphore/mutex wait list; a separate node, since
    /// the ready/sleep node and the wait node are never live at once but
    /// are kept distinct so the invariant is trivially checkable.
    pub wait_link: Link,
}

impl Task {
    const fn empty() -> Self {
        Self {
            state: TaskState::Unused,
            pid: 0,
            name: [0; 32],
            name_len: 0,
            exit_status: 0,
            kernel_esp: 0,
            kernel_stack_top: 0,
            kernel_stack_phys: 0,
            page_dir_phys: 0,
            slice_remaining: 0,
            sleep_ticks: 0,
            parent: None,
            heap_start: 0,
            heap_end: 0,
            ofile: [None; TASK_OFILE_NUM],
            link: Link { prev: None, next: None },
            wait_link: Link { prev: None, next: None },
        }
    }

    #[must_use]
    pub fn name_str(&self) -> &str {
        core::str::from_utf8(&self.name[..self.name_len as usize]).unwrap_or("?")
    }

    pub fn set_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(self.name.len());
        self.name[..len].copy_from_slice(&bytes[..len]);
        self.name_len = len as u8;
    }
}

/// The fixed-size collection of task records. Slot `0` is reserved for the
/// "main" task and slot `1` for the idle task, both reachable through named
/// constants rather than ordinary allocation -- matching the
/// specification's framing of main/idle as separately-named fields rather
/// than regular table entries.
pub struct TaskTable {
    pub tasks: [Task; TASK_NUM],
}

pub const MAIN_TASK_ID: u16 = 0;
pub const IDLE_TASK_ID: u16 = 1;

impl TaskTable {
    const fn new() -> Self {
        const EMPTY: Task = Task::empty();
        Self {
            tasks: [EMPTY; TASK_NUM],
        }
    }

    /// Scan for a free slot (`state == Unused`), excluding the reserved
    /// main/idle slots, and reserve it with `pid`.
    pub fn alloc(&mut self, pid: Pid) -> Option<u16> {
        for (i, t) in self.tasks.iter_mut().enumerate().skip(2) {
            if t.state == TaskState::Unused {
                *t = Task::empty();
                t.state = TaskState::Created;
                t.pid = pid;
                return Some(i as u16);
            }
        }
        None
    }

    /// Release a slot back to `Unused`, zeroing its record.
    pub fn free(&mut self, id: u16) {
        self.tasks[id as usize] = Task::empty();
    }

    #[must_use]
    pub fn get(&self, id: u16) -> &Task {
        &self.tasks[id as usize]
    }

    pub fn get_mut(&mut self, id: u16) -> &mut Task {
        &mut self.tasks[id as usize]
    }

    #[must_use]
    pub fn find_by_pid(&self, pid: Pid) -> Option<u16> {
        self.tasks
            .iter()
            .position(|t| t.state != TaskState::Unused && t.pid == pid)
            .map(|i| i as u16)
    }
}

impl LinkArena for TaskTable {
    fn link_mut(&mut self, id: u16) -> &mut Link {
        &mut self.tasks[id as usize].link
    }
}

/// A second [`LinkArena`] view over the same table, addressing the
/// wait-list node instead of the run-list node, so semaphore/mutex code
/// can reuse [`crate::collections::list::IndexList`] without aliasing the
/// ready/sleep list's storage.
pub struct WaitArena<'a>(pub &'a mut TaskTable);

impl LinkArena for WaitArena<'_> {
    fn link_mut(&mut self, id: u16) -> &mut Link {
        &mut self.0.tasks[id as usize].wait_link
    }
}

pub static TASK_TABLE: Mutex<TaskTable> = Mutex::new(TaskTable::new());

/// The currently-running task's table index. Updated only by the scheduler
/// dispatch path, under an [`IrqGuard`].
static CURRENT: Mutex<Option<u16>> = Mutex::new(None);

#[must_use]
pub fn current_id() -> Option<u16> {
    let _guard = IrqGuard::enter();
    *CURRENT.lock()
}

pub(crate) fn set_current(id: Option<u16>) {
    *CURRENT.lock() = id;
}

/// Allocate a fresh, process-unique pid. Pids are never reused while the
/// issuing counter has not wrapped, matching the original's reliance on a
/// task record's address as a naturally-unique identifier.
pub fn next_pid() -> Pid {
    static NEXT: Mutex<Pid> = Mutex::new(1);
    let mut next = NEXT.lock();
    let pid = *next;
    *next += 1;
    pid
}
