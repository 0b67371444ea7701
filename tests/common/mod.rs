// tests/common/mod.rs
//! Host doubles for the kernel collaborators
//!
//! Threads are std threads, frames are leaked boxes with leak accounting,
//! page directories are ordered maps, and user programs are Rust closures
//! run by a scripted CPU that performs real system calls through the
//! user stack.

#![allow(dead_code)]

pub mod elf;

use std::cell::Cell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;

use userprog::kernel::core::{
    AddressSpaces, Console, File, FileSystem, FrameAllocator, PageDirectory, Platform, Scheduler,
    ThreadEntry, ThreadId, UserMode,
};
use userprog::kernel::mm::{AllocFlags, Frame, VirtAddr};
use userprog::kernel::security::copy_to_user;
use userprog::kernel::syscall::{IntrFrame, Trap, dispatch};
use userprog::{Kernel, KernelConfig, Services, ThreadContext};
use userprog_abi::layout::STACK_PAGE_BASE;
use userprog_abi::{InitialStack, PAGE_SIZE, SyscallNumber};

/// Upper bound for anything a test waits on
pub const TIMEOUT: Duration = Duration::from_secs(10);

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Frame allocator with an optional capacity and leak accounting
#[derive(Default)]
pub struct CountingFrames {
    outstanding: AtomicUsize,
    allocated: AtomicUsize,
    capacity: Mutex<Option<usize>>,
}

impl CountingFrames {
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    /// Fail allocations once `limit` frames are outstanding
    pub fn set_capacity(&self, limit: Option<usize>) {
        *self.capacity.lock().unwrap() = limit;
    }
}

impl FrameAllocator for CountingFrames {
    fn allocate_frame(&self, flags: AllocFlags) -> Option<Frame> {
        if let Some(limit) = *self.capacity.lock().unwrap() {
            if self.outstanding() >= limit {
                return None;
            }
        }
        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.allocated.fetch_add(1, Ordering::SeqCst);
        // Fresh pages are filled with junk unless ZERO is asked for.
        let fill = if flags.contains(AllocFlags::ZERO) { 0 } else { 0xCC };
        let page = Box::leak(Box::new([fill; PAGE_SIZE]));
        // SAFETY: the page was just leaked and is owned by the frame
        Some(unsafe { Frame::from_raw(NonNull::from(page)) })
    }

    fn deallocate_frame(&self, frame: Frame) {
        self.outstanding.fetch_sub(1, Ordering::SeqCst);
        // SAFETY: every frame comes from Box::leak in allocate_frame
        drop(unsafe { Box::from_raw(frame.into_raw().as_ptr()) });
    }
}

// ---------------------------------------------------------------------------
// Address spaces
// ---------------------------------------------------------------------------

thread_local! {
    /// Page directory loaded on this host thread's "CPU"; 0 for none
    static ACTIVE: Cell<usize> = const { Cell::new(0) };
}

/// Page directory loaded on the calling host thread
pub fn active_base() -> usize {
    ACTIVE.with(Cell::get)
}

pub struct MapDirectory {
    id: usize,
    pages: BTreeMap<u32, (Frame, bool)>,
    stats: Arc<SpaceStats>,
}

#[derive(Default)]
pub struct SpaceStats {
    pub created: AtomicUsize,
    pub destroyed_while_active: AtomicUsize,
    pub live: AtomicUsize,
}

impl PageDirectory for MapDirectory {
    fn base(&self) -> usize {
        self.id
    }

    fn get_page(&self, upage: VirtAddr) -> Option<&Frame> {
        self.pages.get(&upage.as_u32()).map(|(frame, _)| frame)
    }

    fn get_page_mut(&mut self, upage: VirtAddr) -> Option<&mut Frame> {
        self.pages.get_mut(&upage.as_u32()).map(|(frame, _)| frame)
    }

    fn is_writable(&self, upage: VirtAddr) -> bool {
        self.pages.get(&upage.as_u32()).is_some_and(|(_, w)| *w)
    }

    fn set_page(&mut self, upage: VirtAddr, frame: Frame, writable: bool) -> Result<(), Frame> {
        assert!(upage.is_page_aligned() && upage.is_user(), "bad upage {upage}");
        assert!(!self.pages.contains_key(&upage.as_u32()), "double map at {upage}");
        self.pages.insert(upage.as_u32(), (frame, writable));
        Ok(())
    }

    fn clear_all(&mut self) -> Vec<Frame> {
        if active_base() == self.id {
            self.stats.destroyed_while_active.fetch_add(1, Ordering::SeqCst);
        }
        std::mem::take(&mut self.pages)
            .into_values()
            .map(|(frame, _)| frame)
            .collect()
    }
}

impl Drop for MapDirectory {
    fn drop(&mut self) {
        self.stats.live.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct MapSpaces {
    next: AtomicUsize,
    pub stats: Arc<SpaceStats>,
    pub refuse: AtomicBool,
}

impl AddressSpaces for MapSpaces {
    fn create(&self) -> Option<Box<dyn PageDirectory>> {
        if self.refuse.load(Ordering::SeqCst) {
            return None;
        }
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        self.stats.live.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(MapDirectory {
            id: self.next.fetch_add(1, Ordering::SeqCst) + 1,
            pages: BTreeMap::new(),
            stats: Arc::clone(&self.stats),
        }))
    }

    fn activate(&self, pagedir: Option<&dyn PageDirectory>) {
        ACTIVE.with(|active| active.set(pagedir.map_or(0, |pd| pd.base())));
    }
}

// ---------------------------------------------------------------------------
// File system
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct MemFs {
    files: Mutex<HashMap<String, Arc<Vec<u8>>>>,
    open_handles: Arc<AtomicUsize>,
}

struct MemFile {
    data: Arc<Vec<u8>>,
    pos: usize,
    open_handles: Arc<AtomicUsize>,
}

impl File for MemFile {
    fn read(&mut self, buf: &mut [u8]) -> usize {
        let start = self.pos.min(self.data.len());
        let n = buf.len().min(self.data.len() - start);
        buf[..n].copy_from_slice(&self.data[start..start + n]);
        self.pos = start + n;
        n
    }

    fn seek(&mut self, pos: u32) {
        self.pos = pos as usize;
    }

    fn length(&self) -> u32 {
        self.data.len() as u32
    }
}

impl Drop for MemFile {
    fn drop(&mut self) {
        self.open_handles.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemFs {
    pub fn install(&self, name: &str, data: Vec<u8>) {
        self.files.lock().unwrap().insert(name.to_owned(), Arc::new(data));
    }

    pub fn contents(&self, name: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(name).map(|d| d.as_ref().clone())
    }

    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }
}

impl FileSystem for MemFs {
    fn open(&self, name: &str) -> Option<Box<dyn File>> {
        let data = Arc::clone(self.files.lock().unwrap().get(name)?);
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        Some(Box::new(MemFile {
            data,
            pos: 0,
            open_handles: Arc::clone(&self.open_handles),
        }))
    }

    fn create(&self, name: &str, initial_size: u32) -> bool {
        let mut files = self.files.lock().unwrap();
        if name.is_empty() || files.contains_key(name) {
            return false;
        }
        files.insert(name.to_owned(), Arc::new(vec![0; initial_size as usize]));
        true
    }

    fn remove(&self, name: &str) -> bool {
        self.files.lock().unwrap().remove(name).is_some()
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Kernel threads on host threads. A blocked thread sleeps on a condition
/// variable until its wakeup token arrives.
pub struct HostThreads {
    next: AtomicI32,
    pub refuse: AtomicBool,
    pub spawned: AtomicUsize,
    /// Times any thread went to sleep in `block_current`
    pub blocks: AtomicUsize,
    tokens: Mutex<HashSet<ThreadId>>,
    ready: Condvar,
}

impl Default for HostThreads {
    fn default() -> Self {
        Self {
            // tid 1 is the main thread
            next: AtomicI32::new(2),
            refuse: AtomicBool::new(false),
            spawned: AtomicUsize::new(0),
            blocks: AtomicUsize::new(0),
            tokens: Mutex::new(HashSet::new()),
            ready: Condvar::new(),
        }
    }
}

impl Scheduler for HostThreads {
    fn spawn(&self, name: &str, entry: ThreadEntry) -> Option<ThreadId> {
        if self.refuse.load(Ordering::SeqCst) {
            return None;
        }
        let tid = ThreadId(self.next.fetch_add(1, Ordering::SeqCst));
        thread::Builder::new()
            .name(name.to_owned())
            .spawn(move || entry(tid))
            .ok()?;
        self.spawned.fetch_add(1, Ordering::SeqCst);
        Some(tid)
    }

    fn block_current(&self, tid: ThreadId) {
        self.blocks.fetch_add(1, Ordering::SeqCst);
        let mut tokens = self.tokens.lock().unwrap();
        while !tokens.remove(&tid) {
            tokens = self.ready.wait(tokens).unwrap();
        }
    }

    fn unblock(&self, tid: ThreadId) {
        self.tokens.lock().unwrap().insert(tid);
        self.ready.notify_all();
    }
}

// ---------------------------------------------------------------------------
// Console and power
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Machine {
    output: Mutex<String>,
    pub powered_off: AtomicBool,
}

impl Machine {
    pub fn output(&self) -> String {
        self.output.lock().unwrap().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.output().lines().map(str::to_owned).collect()
    }
}

impl Console for Machine {
    fn write_str(&self, s: &str) {
        self.output.lock().unwrap().push_str(s);
    }
}

impl Platform for Machine {
    fn power_off(&self) {
        self.powered_off.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// Scripted user mode
// ---------------------------------------------------------------------------

/// The program left user mode; nothing more runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stopped(pub Trap);

pub type Program = Arc<dyn Fn(&mut Cpu<'_>) -> Result<(), Stopped> + Send + Sync>;

/// Syscall block address inside the stack page
const BLOCK: u32 = STACK_PAGE_BASE + 0x40;
/// Scratch area for strings passed to the kernel
const SCRATCH: u32 = STACK_PAGE_BASE + 0x100;

/// User-mode view handed to a test program
pub struct Cpu<'a> {
    pub thread: &'a mut ThreadContext,
    pub entry: IntrFrame,
}

impl Cpu<'_> {
    /// Decoded argv of the initial stack
    pub fn args(&self) -> Vec<String> {
        let pagedir = self.thread.pagedir().expect("user thread without address space");
        let frame = pagedir
            .get_page(VirtAddr::new(STACK_PAGE_BASE))
            .expect("stack page not mapped");
        let stack = InitialStack::new(frame.as_bytes(), STACK_PAGE_BASE, self.entry.esp)
            .expect("stack pointer outside the stack page");
        let argc = stack.argc().unwrap();
        let args: Vec<String> = (0..argc)
            .map(|i| {
                let bytes = stack.arg(i).unwrap().expect("NULL before argc");
                String::from_utf8(bytes.to_vec()).unwrap()
            })
            .collect();
        assert_eq!(stack.arg(argc), Ok(None), "argv[argc] is not NULL");
        args
    }

    /// Trap with `esp` pointing at whatever is already there
    pub fn trap_at(&mut self, esp: u32) -> Result<u32, Stopped> {
        let mut frame = IntrFrame { esp, ..self.entry };
        match dispatch(self.thread, &mut frame) {
            Trap::Resume => Ok(frame.eax),
            other => Err(Stopped(other)),
        }
    }

    /// Store `words` as a syscall block and trap
    pub fn syscall(&mut self, words: &[u32]) -> Result<u32, Stopped> {
        let bytes: Vec<u8> = words.iter().flat_map(|w| w.to_le_bytes()).collect();
        copy_to_user(self.thread, BLOCK, &bytes).expect("syscall block not writable");
        self.trap_at(BLOCK)
    }

    fn put_str(&mut self, s: &str) -> u32 {
        let mut bytes = s.as_bytes().to_vec();
        bytes.push(0);
        copy_to_user(self.thread, SCRATCH, &bytes).expect("scratch area not writable");
        SCRATCH
    }

    pub fn exit(&mut self, code: i32) -> Result<(), Stopped> {
        self.syscall(&[SyscallNumber::Exit as u32, code as u32])?;
        unreachable!("exit returned to user mode");
    }

    pub fn halt(&mut self) -> Result<(), Stopped> {
        self.syscall(&[SyscallNumber::Halt as u32])?;
        unreachable!("halt returned to user mode");
    }

    pub fn exec(&mut self, command: &str) -> Result<i32, Stopped> {
        let ptr = self.put_str(command);
        self.syscall(&[SyscallNumber::Exec as u32, ptr]).map(|v| v as i32)
    }

    pub fn wait(&mut self, pid: i32) -> Result<i32, Stopped> {
        self.syscall(&[SyscallNumber::Wait as u32, pid as u32]).map(|v| v as i32)
    }

    pub fn create(&mut self, name: &str, size: u32) -> Result<bool, Stopped> {
        let ptr = self.put_str(name);
        self.syscall(&[SyscallNumber::Create as u32, ptr, size]).map(|v| v != 0)
    }

    pub fn remove(&mut self, name: &str) -> Result<bool, Stopped> {
        let ptr = self.put_str(name);
        self.syscall(&[SyscallNumber::Remove as u32, ptr]).map(|v| v != 0)
    }
}

/// User mode that runs registered programs by name
#[derive(Default)]
pub struct ScriptedCpu {
    programs: Mutex<HashMap<String, Program>>,
    pub entries: Mutex<Vec<(String, IntrFrame)>>,
}

impl ScriptedCpu {
    pub fn register(&self, name: &str, program: Program) {
        self.programs.lock().unwrap().insert(name.to_owned(), program);
    }
}

impl UserMode for ScriptedCpu {
    fn enter(&self, thread: &mut ThreadContext, frame: IntrFrame) -> Trap {
        self.entries
            .lock()
            .unwrap()
            .push((thread.name().to_owned(), frame));
        let program = self.programs.lock().unwrap().get(thread.name()).cloned();
        let mut cpu = Cpu { thread, entry: frame };
        let outcome = match program {
            Some(program) => (*program)(&mut cpu),
            None => Ok(()),
        };
        match outcome {
            Err(Stopped(trap)) => trap,
            // returning from main: the C runtime calls exit(0)
            Ok(()) => match cpu.exit(0) {
                Err(Stopped(trap)) => trap,
                Ok(()) => Trap::Exit,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// A kernel wired to host doubles
pub struct World {
    pub kernel: Arc<Kernel>,
    pub frames: Arc<CountingFrames>,
    pub spaces: Arc<MapSpaces>,
    pub fs: Arc<MemFs>,
    pub threads: Arc<HostThreads>,
    pub cpu: Arc<ScriptedCpu>,
    pub machine: Arc<Machine>,
}

impl World {
    pub fn new() -> Self {
        Self::with_config(KernelConfig::default())
    }

    pub fn with_config(config: KernelConfig) -> Self {
        init_logging();
        let frames = Arc::new(CountingFrames::default());
        let spaces = Arc::new(MapSpaces::default());
        let fs = Arc::new(MemFs::default());
        let threads = Arc::new(HostThreads::default());
        let cpu = Arc::new(ScriptedCpu::default());
        let machine = Arc::new(Machine::default());
        let kernel = Kernel::new(
            Services {
                file_system: fs.clone(),
                frames: frames.clone(),
                address_spaces: spaces.clone(),
                scheduler: threads.clone(),
                user_mode: cpu.clone(),
                console: machine.clone(),
                platform: machine.clone(),
            },
            config,
        );
        Self {
            kernel,
            frames,
            spaces,
            fs,
            threads,
            cpu,
            machine,
        }
    }

    /// Install a minimal valid executable under `name`
    pub fn install(&self, name: &str) {
        self.fs.install(name, elf::minimal());
    }

    /// Install an executable and the behaviour it has in user mode
    pub fn program(
        &self,
        name: &str,
        body: impl Fn(&mut Cpu<'_>) -> Result<(), Stopped> + Send + Sync + 'static,
    ) {
        self.install(name);
        self.cpu.register(name, Arc::new(body));
    }

    pub fn main_thread(&self) -> ThreadContext {
        self.kernel.main_thread(ThreadId(1), "main")
    }
}

/// Run `f` on its own thread and fail the test if it takes longer than
/// [`TIMEOUT`].
pub fn within_timeout<T: Send + 'static>(f: impl FnOnce() -> T + Send + 'static) -> T {
    within(TIMEOUT, f)
}

/// Run `f` on its own thread and fail the test if it takes longer than
/// `limit`.
pub fn within<T: Send + 'static>(limit: Duration, f: impl FnOnce() -> T + Send + 'static) -> T {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(f());
    });
    rx.recv_timeout(limit)
        .unwrap_or_else(|_| panic!("operation did not finish within {limit:?}"))
}

/// Poll `cond` until it holds or [`TIMEOUT`] passes
pub fn eventually(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + TIMEOUT;
    while std::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}
