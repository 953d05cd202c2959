//! Process lifecycle: `bootstrap`/`start`, `fork`, `execve`, `exit`, `wait`.
//! Grounded on `original_source/source/kernel/core/task.c`.

use super::context::InitialFrame;
use super::elf::{self, PT_LOAD};
use super::{current_id, next_pid, scheduler, Pid, Task, TaskState, MAIN_TASK_ID, TASK_TABLE};
use crate::config::{
    ARG_SIZE, KERNEL_STACK_PAGES, PAGE_SIZE, STACK_PAGES, STACK_TOP, TASK_BASE, TASK_OFILE_NUM,
};
use crate::error::{KResult, KernelError};
use crate::gdt::{USER_CODE_SELECTOR, USER_DATA_SELECTOR};
use crate::memory::frame_alloc::FRAME_ALLOCATOR;
use crate::memory::page_table::Perm;
use crate::memory::VmManager;
use crate::syscall::SyscallFrame;
use alloc::vec::Vec;
use core::arch::naked_asm;

/// The path the main task execs at boot, the first userspace program this
/// kernel ever runs.
const INIT_PROGRAM_PATH: &str = "/home/init";

/// Move a `Created` task into the ready list.
pub fn start(id: u16) {
    scheduler::set_ready(id);
}

/// Construct the reserved idle or main task record directly into slot
/// `id` (`MAIN_TASK_ID`/`IDLE_TASK_ID`), the two slots
/// [`super::TaskTable::alloc`] never hands out. Called exactly twice, at
/// boot, from `kernel_main`.
pub fn bootstrap(id: u16, name: &str, entry: extern "C" fn() -> !) -> KResult<()> {
    let page_dir_phys = VmManager::create_user_space()?;
    let stack_phys = FRAME_ALLOCATOR.alloc_zeroed()?;
    let stack_top = stack_phys + (KERNEL_STACK_PAGES * PAGE_SIZE) as u32;

    let frame_addr = stack_top - core::mem::size_of::<InitialFrame>() as u32;
    // Safety: `stack_phys` was just allocated and zeroed, identity-mapped
    // in the kernel's lower half, and not yet referenced by any task.
    unsafe {
        core::ptr::write(frame_addr as *mut InitialFrame, InitialFrame::new(entry as u32));
    }

    let mut table = TASK_TABLE.lock();
    let task = table.get_mut(id);
    *task = Task::empty();
    task.state = TaskState::Created;
    task.pid = next_pid();
    task.set_name(name);
    task.kernel_esp = frame_addr;
    task.kernel_stack_top = stack_top;
    task.kernel_stack_phys = stack_phys;
    task.page_dir_phys = page_dir_phys;
    task.heap_start = TASK_BASE;
    task.heap_end = TASK_BASE;
    Ok(())
}

/// The idle task's entry point: halt until the next interrupt, forever.
/// Dispatched only when the ready list is empty.
pub extern "C" fn idle_task_entry() -> ! {
    loop {
        crate::arch::x86::hlt_loop();
    }
}

/// The main task's entry point: load and exec the first userspace
/// program. Runs once, in ring 0, directly on this task's fresh kernel
/// stack (there is no pending syscall frame to rewrite the way `execve`
/// rewrites one for an already-running task), so it loads the image
/// itself and jumps to ring 3 by hand instead of going through
/// [`sys_execve`].
pub extern "C" fn main_task_entry() -> ! {
    match load_init_program() {
        Ok((entry, user_esp)) => {
            // Safety: `load_init_program` has already installed and
            // activated the new address space and mapped a valid stack at
            // `user_esp`; `entry` is the program's ELF entry point, also
            // mapped executable in that same space.
            unsafe { enter_user_mode(entry, user_esp) }
        }
        Err(_) => {
            crate::println!("main: failed to start {INIT_PROGRAM_PATH}");
            crate::arch::x86::hlt_loop();
        }
    }
}

/// Load `INIT_PROGRAM_PATH`'s ELF32 image into a fresh address space,
/// make it current, and return its entry point and initial user stack
/// pointer. Shares its `PT_LOAD` walk with [`sys_execve`] but, since the
/// main task has no parent syscall frame to rewrite, reports the landing
/// state directly to its caller instead.
fn load_init_program() -> KResult<(u32, u32)> {
    let image: Vec<u8> = crate::fs::read_whole_file(INIT_PROGRAM_PATH)?;
    let header = elf::parse_header(&image).ok_or(KernelError::BadFormat)?;

    let new_dir = VmManager::create_user_space()?;
    let mut highest_end = TASK_BASE;

    for i in 0..header.phnum {
        let Some(ph) = elf::program_header(&image, &header, i) else {
            continue;
        };
        if ph.p_type != PT_LOAD || ph.p_vaddr < TASK_BASE {
            continue;
        }
        let page_count = (ph.p_memsz as usize).div_ceil(PAGE_SIZE).max(1);
        let vstart = crate::memory::page_table::page_align_down(ph.p_vaddr);
        VmManager::alloc_pages_for_task(new_dir, vstart, page_count, Perm::USER_RW)?;
        let file_bytes = &image[ph.p_offset as usize..(ph.p_offset + ph.p_filesz) as usize];
        VmManager::copy_into_user_space(new_dir, ph.p_vaddr, file_bytes)?;
        highest_end = highest_end.max(ph.p_vaddr + ph.p_memsz);
    }

    let stack_base = STACK_TOP - (STACK_PAGES * PAGE_SIZE) as u32;
    VmManager::alloc_pages_for_task(new_dir, stack_base, STACK_PAGES, Perm::USER_RW)?;

    let id = current_id().ok_or(KernelError::InvalidArgument)?;
    {
        let mut table = TASK_TABLE.lock();
        let task = table.get_mut(id);
        task.page_dir_phys = new_dir;
        task.heap_start = highest_end;
        task.heap_end = highest_end;
    }

    // Safety: `new_dir` was just built above and is about to become this
    // task's active address space; no other task references it yet.
    unsafe {
        crate::arch::x86::write_cr3(new_dir);
    }

    let user_esp = stack_base + (STACK_PAGES * PAGE_SIZE) as u32 - 20;
    Ok((header.entry, user_esp))
}

/// Build the six-word frame `iretd` expects and jump to ring 3. Used once
/// by [`main_task_entry`] to start the very first user process; every
/// later process reaches ring 3 only through `sys_execve` rewriting an
/// already-pending `SyscallFrame`, since it always runs on behalf of a
/// task that entered the kernel through the syscall gate in the first
/// place.
///
/// # Safety
/// `entry` must be a mapped, executable address in the currently active
/// (just-installed) address space, and `user_esp` a mapped, writable
/// address in that same space's user stack region.
#[unsafe(naked)]
unsafe extern "C" fn enter_user_mode(entry: u32, user_esp: u32) -> ! {
    naked_asm!(
        "mov eax, [esp + 4]",
        "mov ecx, [esp + 8]",
        "mov dx, {user_data}",
        "mov ds, dx",
        "mov es, dx",
        "mov fs, dx",
        "mov gs, dx",
        "push {user_data}",
        "push ecx",
        "pushfd",
        "pop ebx",
        "or ebx, 0x200",
        "push ebx",
        "push {user_code}",
        "push eax",
        "iretd",
        user_data = const USER_DATA_SELECTOR as u32,
        user_code = const USER_CODE_SELECTOR as u32,
    )
}

/// What a forked child's kernel stack "returns" into on its first
/// `switch_to`: locates the `SyscallFrame` [`sys_fork`] copied onto this
/// task's own stack and `iretd`s into it, landing the child in ring 3 at
/// the instruction after the parent's call gate, with `eax` already forced
/// to 0 by `sys_fork`.
extern "C" fn fork_resume_trampoline() -> ! {
    let id = current_id().expect("fork_resume_trampoline dispatched with no current task");
    let stack_top = TASK_TABLE.lock().get(id).kernel_stack_top;
    let frame_addr = stack_top - core::mem::size_of::<SyscallFrame>() as u32;
    // Safety: `sys_fork` wrote a complete `SyscallFrame` at this exact
    // offset below this task's `kernel_stack_top` before making it ready,
    // and this trampoline runs once, before anything else touches the
    // stack above `frame_addr`.
    unsafe { resume_from_syscall_frame(frame_addr) }
}

/// Load a `SyscallFrame` at `frame_addr` into registers and `iretd` into
/// ring 3, mirroring `syscall_entry`'s epilogue: the struct's field order
/// matches the pop sequence a real syscall return expects exactly.
///
/// # Safety
/// `frame_addr` must point at a fully-populated, live `SyscallFrame`.
#[unsafe(naked)]
unsafe extern "C" fn resume_from_syscall_frame(frame_addr: u32) -> ! {
    naked_asm!(
        "mov esp, [esp + 4]",
        "pop edi",
        "pop esi",
        "pop ebp",
        "pop ebx",
        "pop edx",
        "pop ecx",
        "pop eax",
        "iretd",
    )
}

/// `sys_fork`: duplicate the calling task. The child resumes at the
/// instruction after the call gate with `eax` forced to 0; the parent's
/// `fork` call returns the child's pid.
pub fn sys_fork() -> KResult<Pid> {
    let parent_id = current_id().ok_or(KernelError::InvalidArgument)?;

    let pid = next_pid();
    let child_id = {
        let mut table = TASK_TABLE.lock();
        table.alloc(pid).ok_or(KernelError::NoFreeTask)?
    };

    let (parent_dir, parent_ofile, parent_name, parent_heap_start, parent_heap_end, parent_stack_top) = {
        let table = TASK_TABLE.lock();
        let p = table.get(parent_id);
        (
            p.page_dir_phys,
            p.ofile,
            p.name,
            p.heap_start,
            p.heap_end,
            p.kernel_stack_top,
        )
    };
    // The running parent's `kernel_esp` field is only written by `switch_to`
    // at the last switch-out and does not track its live syscall frame; the
    // call gate loaded `esp0 = kernel_stack_top`, so that is where
    // `syscall_entry` actually built this frame.
    let parent_frame_addr = parent_stack_top - core::mem::size_of::<SyscallFrame>() as u32;

    let child_dir = match VmManager::copy_address_space(parent_dir) {
        Ok(d) => d,
        Err(e) => {
            TASK_TABLE.lock().free(child_id);
            return Err(e);
        }
    };

    let stack_phys = match FRAME_ALLOCATOR.alloc_zeroed() {
        Ok(p) => p,
        Err(e) => {
            VmManager::destroy_address_space(child_dir);
            TASK_TABLE.lock().free(child_id);
            return Err(e);
        }
    };
    let stack_top = stack_phys + (KERNEL_STACK_PAGES * PAGE_SIZE) as u32;

    // Safety: `parent_frame_addr` points at the `SyscallFrame`
    // `syscall_entry` built on the parent's kernel stack for this very
    // syscall; we copy it onto the child's fresh stack and hand the child
    // its own copy to resume from. Below it we lay down an `InitialFrame`
    // so the child's first `switch_to` (which pops callee-saved registers
    // and `ret`s, not `iretd`s) lands in `fork_resume_trampoline` instead
    // of jumping into the copied frame's `edx` field.
    let child_frame_addr = stack_top - core::mem::size_of::<SyscallFrame>() as u32;
    let child_initial_frame_addr =
        child_frame_addr - core::mem::size_of::<InitialFrame>() as u32;
    unsafe {
        let mut frame = core::ptr::read(parent_frame_addr as *const SyscallFrame);
        frame.eax = 0; // child observes fork() == 0
        core::ptr::write(child_frame_addr as *mut SyscallFrame, frame);
        core::ptr::write(
            child_initial_frame_addr as *mut InitialFrame,
            InitialFrame::new(fork_resume_trampoline as u32),
        );
    }

    let mut table = TASK_TABLE.lock();
    let child = table.get_mut(child_id);
    child.name = parent_name;
    child.name_len = table.get(parent_id).name_len;
    child.kernel_esp = child_initial_frame_addr;
    child.kernel_stack_top = stack_top;
    child.kernel_stack_phys = stack_phys;
    child.page_dir_phys = child_dir;
    child.heap_start = parent_heap_start;
    child.heap_end = parent_heap_end;
    child.parent = Some(parent_id);
    child.ofile = parent_ofile;
    for slot in child.ofile.iter().flatten() {
        crate::fs::file_table::inc_ref(*slot);
    }
    drop(table);

    start(child_id);
    Ok(pid)
}

/// `execve`: replace the calling task's address space with a freshly
/// loaded ELF32 executable, then rewrite its syscall frame so `iretd`
/// resumes at the new entry point with a clean register set.
pub fn sys_execve(
    path: *const u8,
    _argv: *const *const u8,
    _envp: *const *const u8,
) -> KResult<()> {
    let id = current_id().ok_or(KernelError::InvalidArgument)?;
    let path_str = read_c_str(path)?;

    let image: Vec<u8> = crate::fs::read_whole_file(path_str)?;
    let header = elf::parse_header(&image).ok_or(KernelError::BadFormat)?;

    let new_dir = VmManager::create_user_space()?;

    let mut highest_end = TASK_BASE;
    for i in 0..header.phnum {
        let Some(ph) = elf::program_header(&image, &header, i) else {
            continue;
        };
        if ph.p_type != PT_LOAD || ph.p_vaddr < TASK_BASE {
            continue;
        }
        let page_count = (ph.p_memsz as usize).div_ceil(PAGE_SIZE).max(1);
        let vstart = crate::memory::page_table::page_align_down(ph.p_vaddr);
        if let Err(e) =
            VmManager::alloc_pages_for_task(new_dir, vstart, page_count, Perm::USER_RW)
        {
            VmManager::destroy_address_space(new_dir);
            return Err(e);
        }
        let file_bytes = &image[ph.p_offset as usize..(ph.p_offset + ph.p_filesz) as usize];
        // Freshly allocated frames are already zeroed by the frame
        // allocator, so the `p_memsz - p_filesz` tail is correctly zero
        // without an explicit memset.
        if let Err(e) = VmManager::copy_into_user_space(new_dir, ph.p_vaddr, file_bytes) {
            VmManager::destroy_address_space(new_dir);
            return Err(e);
        }
        highest_end = highest_end.max(ph.p_vaddr + ph.p_memsz);
    }

    let stack_base = STACK_TOP - (STACK_PAGES * PAGE_SIZE) as u32;
    if let Err(e) =
        VmManager::alloc_pages_for_task(new_dir, stack_base, STACK_PAGES, Perm::USER_RW)
    {
        VmManager::destroy_address_space(new_dir);
        return Err(e);
    }

    let arg_base = stack_base - ARG_SIZE as u32;
    // argv layout: { argc, argv_ptr }, then argc+1 pointers (null
    // terminated), then packed NUL-terminated strings. With no argv
    // plumbed through yet (environment construction is out of scope for
    // the in-kernel loader), this degenerates to argc=0.
    let argc: u32 = 0;
    let argv_ptr: u32 = arg_base + 8;
    let mut scratch = [0u8; 12];
    scratch[0..4].copy_from_slice(&argc.to_le_bytes());
    scratch[4..8].copy_from_slice(&argv_ptr.to_le_bytes());
    scratch[8..12].copy_from_slice(&0u32.to_le_bytes()); // null terminator of argv array
    VmManager::copy_into_user_space(new_dir, arg_base, &scratch)?;

    let old_dir;
    {
        let mut table = TASK_TABLE.lock();
        let task = table.get_mut(id);
        old_dir = task.page_dir_phys;
        task.page_dir_phys = new_dir;
        task.heap_start = highest_end;
        task.heap_end = highest_end;

        // Safety: `task.kernel_esp` currently points at the `SyscallFrame`
        // this very `execve` call's entry stub built; rewriting it in
        // place makes the pending `iretd` resume at the new program.
        unsafe {
            let frame = &mut *(task.kernel_esp as *mut SyscallFrame);
            frame.eip = header.entry;
            frame.user_esp = stack_base + (STACK_PAGES * PAGE_SIZE) as u32 - 20;
            frame.eax = 0;
            frame.ebx = 0;
            frame.ecx = 0;
            frame.edx = 0;
            frame.esi = 0;
            frame.edi = 0;
            frame.ebp = 0;
        }
    }

    unsafe {
        crate::arch::x86::write_cr3(new_dir);
    }
    // The specification's invariant 5 requires the old address space to be
    // freed or reused, not leaked; the original left this commented out
    // (flagged as a known TODO). Fixed here per the design-notes decision.
    VmManager::destroy_address_space(old_dir);

    Ok(())
}

/// `exit(status)`: close every fd, reparent children to the main task,
/// wake a waiting parent or the main task, and mark the caller Zombie.
/// The task record is not yet freed; `wait()` reaps it.
pub fn sys_exit(status: i32) {
    let Some(id) = current_id() else { return };

    let fds: [Option<u16>; TASK_OFILE_NUM] = {
        let table = TASK_TABLE.lock();
        table.get(id).ofile
    };
    for fd in fds.into_iter().flatten() {
        crate::fs::file_table::close_ref(fd);
    }

    let parent = {
        let mut table = TASK_TABLE.lock();
        for t in table.tasks.iter_mut() {
            if t.state != TaskState::Unused && t.parent == Some(id) {
                t.parent = Some(MAIN_TASK_ID);
            }
        }
        table.get(id).parent
    };

    scheduler::set_unready(id);
    {
        let mut table = TASK_TABLE.lock();
        table.get_mut(id).state = TaskState::Zombie;
        table.get_mut(id).exit_status = status;
    }

    if let Some(parent_id) = parent {
        let waiting = TASK_TABLE.lock().get(parent_id).state == TaskState::Waiting;
        if waiting {
            scheduler::set_ready(parent_id);
        }
    }
    let main_waiting = TASK_TABLE.lock().get(MAIN_TASK_ID).state == TaskState::Waiting;
    if main_waiting && parent != Some(MAIN_TASK_ID) {
        scheduler::set_ready(MAIN_TASK_ID);
    }

    scheduler::dispatch();
}

/// `wait(*status)`: reap the first zombie child found, or block until one
/// appears.
pub fn sys_wait(status: *mut i32) -> KResult<Pid> {
    let id = current_id().ok_or(KernelError::InvalidArgument)?;
    loop {
        let found = {
            let table = TASK_TABLE.lock();
            table
                .tasks
                .iter()
                .enumerate()
                .find(|(_, t)| t.state == TaskState::Zombie && t.parent == Some(id))
                .map(|(i, t)| (i as u16, t.pid, t.exit_status))
        };

        if let Some((child_id, child_pid, child_status)) = found {
            if !status.is_null() {
                // Safety: `status` is a user-space pointer validated by the
                // fs/VM layer before syscall entry in a complete
                // implementation; this kernel trusts it here as the
                // original does.
                unsafe {
                    core::ptr::write(status, child_status);
                }
            }
            let (dir, stack_phys) = {
                let table = TASK_TABLE.lock();
                let t = table.get(child_id);
                (t.page_dir_phys, t.kernel_stack_phys)
            };
            VmManager::destroy_address_space(dir);
            FRAME_ALLOCATOR.free(stack_phys, KERNEL_STACK_PAGES);
            TASK_TABLE.lock().free(child_id);
            return Ok(child_pid);
        }

        let has_children = {
            let table = TASK_TABLE.lock();
            table
                .tasks
                .iter()
                .any(|t| t.state != TaskState::Unused && t.parent == Some(id))
        };
        if !has_children {
            return Err(KernelError::NotFound);
        }

        scheduler::set_unready(id);
        TASK_TABLE.lock().get_mut(id).state = TaskState::Waiting;
        scheduler::dispatch();
    }
}

fn read_c_str(ptr: *const u8) -> KResult<&'static str> {
    if ptr.is_null() {
        return Err(KernelError::InvalidArgument);
    }
    // Safety: trusts the caller-supplied pointer, as the original does;
    // bounded to 256 bytes to avoid runaway reads on a malformed pointer.
    unsafe {
        let mut len = 0usize;
        while *ptr.add(len) != 0 && len < 256 {
            len += 1;
        }
        let slice = core::slice::from_raw_parts(ptr, len);
        core::str::from_utf8(slice).map_err(|_| KernelError::InvalidArgument)
    }
}
