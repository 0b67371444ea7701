// src/kernel/syscall/mod.rs
//! System call implementation module
//!
//! Kernel side of the user-program system call interface.
//!
//! # System Call Mechanism
//!
//! A user program pushes its arguments, then the call number, and traps.
//! The trap entry stub saves the user registers in an [`IntrFrame`] and calls
//! [`dispatch`], which:
//!
//! 1. reads the call number at `esp` and arguments at `esp + 4`, `+ 8`,
//!    `+ 12` (see [`ArgSlot`])
//! 2. runs the handler
//! 3. stores the result in `eax`
//! 4. tells the stub whether to resume the program, terminate it, or stop
//!    the machine ([`Trap`])
//!
//! # Security Model
//!
//! Every word and string read from user memory goes through
//! [`crate::kernel::security`]. A pointer that is null, points into the
//! kernel, or is not mapped terminates the caller with exit code -1.
//! Unknown call numbers do the same.

use alloc::string::String;

use log::{debug, warn};
use userprog_abi::{ArgSlot, PID_ERROR, Pid, SyscallNumber};

use crate::errors::UserMemoryError;
use crate::kernel::process;
use crate::kernel::security::{read_user_cstr, read_user_u32};
use crate::kernel::task::ThreadContext;


/// Registers saved on a trap from user mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IntrFrame {
    /// User instruction pointer
    pub eip: u32,
    /// User stack pointer
    pub esp: u32,
    /// Return value register
    pub eax: u32,
}

impl IntrFrame {
    /// Frame that starts user code at `eip` with stack pointer `esp`
    #[must_use]
    pub const fn new(eip: u32, esp: u32) -> Self {
        Self { eip, esp, eax: 0 }
    }
}

/// What the trap stub does after a system call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trap {
    /// Return to user mode with `eax` set
    Resume,
    /// The process is finished; leave user mode and call
    /// [`process::exit`] with the thread's exit code
    Exit,
    /// The machine was powered off
    Halt,
}

/// Code reported for a process killed by the kernel
pub const KILLED: i32 = -1;

/// Handle the system call trapped in `frame` on behalf of `thread`
pub fn dispatch(thread: &mut ThreadContext, frame: &mut IntrFrame) -> Trap {
    match handle(thread, frame) {
        Ok(trap) => trap,
        Err(fault) => {
            warn!("[SYSCALL] {}: bad user memory: {fault}", thread.name());
            kill(thread)
        }
    }
}

fn kill(thread: &mut ThreadContext) -> Trap {
    thread.set_exit_code(KILLED);
    Trap::Exit
}

fn arg(thread: &ThreadContext, frame: &IntrFrame, slot: ArgSlot) -> Result<u32, UserMemoryError> {
    let addr = frame
        .esp
        .checked_add(slot.offset())
        .ok_or(UserMemoryError::KernelAddress(frame.esp))?;
    read_user_u32(thread, addr)
}

fn handle(thread: &mut ThreadContext, frame: &mut IntrFrame) -> Result<Trap, UserMemoryError> {
    let raw = arg(thread, frame, ArgSlot::Number)?;
    let Some(number) = SyscallNumber::from_u32(raw) else {
        warn!("[SYSCALL] {}: unknown system call {raw}", thread.name());
        return Ok(kill(thread));
    };

    #[cfg(feature = "syscall_trace")]
    log::trace!("[SYSCALL] {} -> {:?}", thread.name(), number);

    let trap = match number {
        SyscallNumber::Halt => {
            sys_halt(thread);
            Trap::Halt
        }
        SyscallNumber::Exit => {
            let status = arg(thread, frame, ArgSlot::Arg0)? as i32;
            sys_exit(thread, status);
            Trap::Exit
        }
        SyscallNumber::Exec => {
            let cmd = arg(thread, frame, ArgSlot::Arg0)?;
            frame.eax = sys_exec(thread, cmd)? as u32;
            Trap::Resume
        }
        SyscallNumber::Wait => {
            let pid = arg(thread, frame, ArgSlot::Arg0)? as Pid;
            frame.eax = sys_wait(thread, pid) as u32;
            Trap::Resume
        }
        SyscallNumber::Create => {
            let name = arg(thread, frame, ArgSlot::Arg0)?;
            let size = arg(thread, frame, ArgSlot::Arg1)?;
            frame.eax = u32::from(sys_create(thread, name, size)?);
            Trap::Resume
        }
        SyscallNumber::Remove => {
            let name = arg(thread, frame, ArgSlot::Arg0)?;
            frame.eax = u32::from(sys_remove(thread, name)?);
            Trap::Resume
        }
        unsupported => {
            warn!(
                "[SYSCALL] {}: {:?} ({:?}) is not supported",
                thread.name(),
                unsupported,
                unsupported.category()
            );
            kill(thread)
        }
    };
    Ok(trap)
}

/// Read a user string argument, or `None` if it has no terminator within
/// the configured limit.
fn user_string(thread: &ThreadContext, ptr: u32) -> Result<Option<String>, UserMemoryError> {
    let max = thread.kernel().config().max_string_bytes();
    match read_user_cstr(thread, ptr, max) {
        Ok(bytes) => Ok(String::from_utf8(bytes).ok()),
        Err(UserMemoryError::Unterminated(_)) => Ok(None),
        Err(fault) => Err(fault),
    }
}

/// sys_halt - Power the machine off
pub fn sys_halt(thread: &ThreadContext) {
    debug!("[SYSCALL] {}: halt", thread.name());
    thread.kernel().platform().power_off();
}

/// sys_exit - Record `status` as the caller's exit code
///
/// The caller leaves user mode afterwards and runs [`process::exit`].
pub fn sys_exit(thread: &mut ThreadContext, status: i32) {
    thread.set_exit_code(status);
}

/// sys_exec - Start the program described by the command line at `cmd`
///
/// Returns the new pid, or [`PID_ERROR`] if the command is unusable or the
/// program could not be loaded.
///
/// # Errors
///
/// A fault in `cmd`, which kills the caller.
pub fn sys_exec(thread: &mut ThreadContext, cmd: u32) -> Result<Pid, UserMemoryError> {
    let Some(command) = user_string(thread, cmd)? else {
        return Ok(PID_ERROR);
    };
    Ok(process::spawn(thread, &command).unwrap_or_else(|err| {
        debug!("[SYSCALL] {}: exec \"{command}\": {err}", thread.name());
        PID_ERROR
    }))
}

/// sys_wait - Reap the child `pid`
///
/// Returns its exit code, or -1 if `pid` is not a child that can be waited
/// for.
pub fn sys_wait(thread: &mut ThreadContext, pid: Pid) -> i32 {
    process::wait(thread, pid).unwrap_or(-1)
}

/// sys_create - Create a file of `initial_size` bytes named by the string at
/// `name`
///
/// # Errors
///
/// A fault in `name`, which kills the caller.
pub fn sys_create(thread: &ThreadContext, name: u32, initial_size: u32) -> Result<bool, UserMemoryError> {
    let Some(name) = user_string(thread, name)? else {
        return Ok(false);
    };
    let kernel = thread.kernel();
    let _gate = kernel.fs_gate().lock();
    Ok(kernel.file_system().create(&name, initial_size))
}

/// sys_remove - Delete the file named by the string at `name`
///
/// # Errors
///
/// A fault in `name`, which kills the caller.
pub fn sys_remove(thread: &ThreadContext, name: u32) -> Result<bool, UserMemoryError> {
    let Some(name) = user_string(thread, name)? else {
        return Ok(false);
    };
    let kernel = thread.kernel();
    let _gate = kernel.fs_gate().lock();
    Ok(kernel.file_system().remove(&name))
}
