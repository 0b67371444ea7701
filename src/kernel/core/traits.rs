// src/kernel/core/traits.rs
//! Kernel collaborator traits
//!
//! The process subsystem owns none of the machinery it runs on. Threads,
//! page tables, physical frames, files, the console and the power switch are
//! all provided by the rest of the kernel through these traits.

use alloc::boxed::Box;
use alloc::vec::Vec;

use super::types::ThreadId;
use crate::kernel::mm::{AllocFlags, Frame, VirtAddr};
use crate::kernel::syscall::{IntrFrame, Trap};
use crate::kernel::task::ThreadContext;

/// An open file. Closing is dropping.
pub trait File: Send {
    /// Read from the current position into `buf`, returning the byte count.
    /// Fewer bytes than requested means end of file.
    fn read(&mut self, buf: &mut [u8]) -> usize;

    /// Move the current position to `pos`
    fn seek(&mut self, pos: u32);

    /// File length in bytes
    fn length(&self) -> u32;
}

/// Flat-namespace file system
pub trait FileSystem: Send + Sync {
    /// Open `name`, or `None` if there is no such file
    fn open(&self, name: &str) -> Option<Box<dyn File>>;

    /// Create `name` with `initial_size` zero bytes
    fn create(&self, name: &str, initial_size: u32) -> bool;

    /// Delete `name`
    fn remove(&self, name: &str) -> bool;
}

/// Physical page allocator
pub trait FrameAllocator: Send + Sync {
    /// Allocate one page
    fn allocate_frame(&self, flags: AllocFlags) -> Option<Frame>;

    /// Give a page back
    fn deallocate_frame(&self, frame: Frame);
}

/// One user address space
pub trait PageDirectory: Send {
    /// Value loaded into the page-directory base register on activation
    fn base(&self) -> usize;

    /// Frame mapped at page-aligned `upage`
    fn get_page(&self, upage: VirtAddr) -> Option<&Frame>;

    /// Mutable access to the frame mapped at `upage`
    fn get_page_mut(&mut self, upage: VirtAddr) -> Option<&mut Frame>;

    /// Whether the mapping at `upage` allows user writes
    fn is_writable(&self, upage: VirtAddr) -> bool;

    /// Map `frame` at `upage`.
    ///
    /// # Errors
    ///
    /// Hands `frame` back if the page tables cannot be extended.
    fn set_page(&mut self, upage: VirtAddr, frame: Frame, writable: bool) -> Result<(), Frame>;

    /// Remove every mapping, returning the frames that were mapped
    fn clear_all(&mut self) -> Vec<Frame>;
}

/// Page-directory factory and the MMU switch
pub trait AddressSpaces: Send + Sync {
    /// Fresh address space with only the kernel mapped
    fn create(&self) -> Option<Box<dyn PageDirectory>>;

    /// Switch the running CPU to `pagedir`, or to the kernel-only tables
    fn activate(&self, pagedir: Option<&dyn PageDirectory>);
}

/// Body of a kernel thread, given the thread's own id
pub type ThreadEntry = Box<dyn FnOnce(ThreadId) + Send + 'static>;

/// Thread scheduler
pub trait Scheduler: Send + Sync {
    /// Start a kernel thread named `name` running `entry`
    fn spawn(&self, name: &str, entry: ThreadEntry) -> Option<ThreadId>;

    /// Take the calling thread `tid` off the ready queue until
    /// [`unblock`](Self::unblock) is called for it.
    ///
    /// A wakeup delivered before the thread blocks is kept, and the next
    /// `block_current` returns at once. Callers re-check their condition
    /// after waking.
    fn block_current(&self, tid: ThreadId);

    /// Make the blocked thread `tid` ready again
    fn unblock(&self, tid: ThreadId);
}

/// Transfer into user mode.
///
/// Implementations run user code starting from `frame` and route each trap
/// to [`crate::kernel::syscall::dispatch`]. `enter` returns once the thread
/// has left user mode for good, with the trap that ended it
/// ([`Trap::Exit`] or [`Trap::Halt`]).
pub trait UserMode: Send + Sync {
    /// Run `thread` in user mode from `frame`
    fn enter(&self, thread: &mut ThreadContext, frame: IntrFrame) -> Trap;
}

/// Kernel console
pub trait Console: Send + Sync {
    /// Write `s` verbatim
    fn write_str(&self, s: &str);
}

/// Machine control
pub trait Platform: Send + Sync {
    /// Power the machine off. May return on hosts that cannot.
    fn power_off(&self);
}
