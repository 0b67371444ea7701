// src/kernel/process/lifecycle.rs
//! Process lifecycle management
//!
//! `spawn` starts a child and blocks until it has loaded, `wait` blocks
//! until a child has exited and collects its code, `exit` tears a process
//! down and reports its code.

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;

use log::{debug, warn};
use userprog_abi::Pid;

use super::{LoadStatus, Process};
use crate::errors::{SpawnError, WaitError};
use crate::kernel::Kernel;
use crate::kernel::core::ThreadId;
use crate::kernel::loader;
use crate::kernel::mm::user_paging::release_address_space;
use crate::kernel::syscall::{IntrFrame, Trap};
use crate::kernel::task::ThreadContext;

/// Longest prefix of `s` of at most `max` bytes ending on a char boundary
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Start a new user process running `command` as a child of `thread`.
///
/// Blocks until the child has either loaded its executable or given up.
///
/// # Errors
///
/// `EmptyCommand` if `command` has no program name, `ThreadCreation` if the
/// scheduler refuses, `LoadFailed` if the child could not load. In every
/// error case the child is gone from `thread`'s children.
pub fn spawn(thread: &mut ThreadContext, command: &str) -> Result<Pid, SpawnError> {
    let kernel = Arc::clone(thread.kernel());
    let command = truncate(command, kernel.config().max_string_bytes());
    let name = command
        .split_ascii_whitespace()
        .next()
        .ok_or(SpawnError::EmptyCommand)?;

    let process = Arc::new(Process::new(
        thread.tid(),
        String::from(name),
        String::from(command),
    ));
    let child = Arc::clone(&process);
    let child_kernel = Arc::clone(&kernel);
    let tid = kernel
        .scheduler()
        .spawn(name, Box::new(move |tid| start_process(child_kernel, child, tid)))
        .ok_or(SpawnError::ThreadCreation)?;

    let pid = tid.as_pid();
    process.set_pid(pid);
    thread.children_mut().push(Arc::clone(&process));
    debug!("[PROCESS] {}: spawned {name} as pid {pid}", thread.name());

    match process.wait_loaded(kernel.scheduler(), thread.tid()) {
        LoadStatus::Loaded => Ok(pid),
        LoadStatus::Failed => {
            thread.children_mut().retain(|c| !Arc::ptr_eq(c, &process));
            Err(SpawnError::LoadFailed)
        }
        // finish_load never publishes Pending
        LoadStatus::Pending => unreachable!("load gate raised while pending"),
    }
}

/// Body of a freshly spawned process thread
fn start_process(kernel: Arc<Kernel>, process: Arc<Process>, tid: ThreadId) {
    let mut thread = ThreadContext::new(
        Arc::clone(&kernel),
        tid,
        String::from(process.name()),
        Some(Arc::clone(&process)),
    );
    let command = process.take_cmdline().unwrap_or_default();

    let trap = match loader::load(&mut thread, &command) {
        Ok(program) => {
            drop(command);
            process.finish_load(LoadStatus::Loaded, kernel.scheduler());
            let frame = IntrFrame::new(program.entry, program.stack_pointer);
            kernel.user_mode().enter(&mut thread, frame)
        }
        Err(_) => {
            thread.set_exit_code(-1);
            process.finish_load(LoadStatus::Failed, kernel.scheduler());
            Trap::Exit
        }
    };
    match trap {
        Trap::Halt => halted(thread),
        Trap::Exit | Trap::Resume => exit(thread),
    }
}

/// Block until the child `pid` of `thread` exits and return its exit code.
///
/// # Errors
///
/// `NoSuchChild` if `pid` is not an unreaped child of `thread`,
/// `AlreadyWaiting` if another wait on it is in progress.
pub fn wait(thread: &mut ThreadContext, pid: Pid) -> Result<i32, WaitError> {
    let index = thread
        .children()
        .iter()
        .position(|c| c.pid() == Some(pid))
        .ok_or(WaitError::NoSuchChild)?;
    let child = Arc::clone(&thread.children()[index]);
    if !child.begin_wait() {
        return Err(WaitError::AlreadyWaiting);
    }

    let code = child.wait_exited(thread.kernel().scheduler(), thread.tid());
    // Only this thread mutates its children, so `index` is still valid.
    thread.children_mut().remove(index);
    debug!("[PROCESS] {}: reaped pid {pid} with code {code}", thread.name());
    Ok(code)
}

/// Terminate the process run by `thread`.
///
/// Releases the address space, publishes the exit code to the parent and
/// prints the termination record. Children that were never reaped are
/// dropped with the context; they finish on their own.
pub fn exit(thread: ThreadContext) {
    finish(thread, true);
}

/// Wind down a thread whose program powered the machine off.
///
/// On hardware `power_off` does not come back. Where it does, the thread
/// still releases its pages and wakes a waiting parent, but a halt is not a
/// process termination and prints no record.
fn halted(thread: ThreadContext) {
    debug!("[PROCESS] {}: halted", thread.name());
    finish(thread, false);
}

fn finish(mut thread: ThreadContext, report: bool) {
    release_address_space(&mut thread);

    let code = thread.exit_code();
    if let Some(process) = thread.process() {
        if report {
            thread
                .kernel()
                .console()
                .write_str(&format!("{}: exit({code})\n", thread.name()));
        }
        if !process.finish_exit(code, thread.kernel().scheduler()) {
            warn!("[PROCESS] {}: exit code already recorded", thread.name());
        }
    }
    debug!(
        "[PROCESS] {} exits, {} children unreaped",
        thread.name(),
        thread.children().len()
    );
}

/// Look up the unreaped child `pid` of `thread`
#[must_use]
pub fn get_child(thread: &ThreadContext, pid: Pid) -> Option<&Arc<Process>> {
    thread.children().iter().find(|c| c.pid() == Some(pid))
}
