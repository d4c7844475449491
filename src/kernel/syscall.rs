//! System call interface
//!
//! The boundary between the external caller and the machine. The kernel owns
//! one CPU, one memory, one file store, and the app registry; every operation
//! on them goes through `Kernel::dispatch` with a typed `Syscall` value, so
//! there is no string-keyed table and no way to invoke an operation that does
//! not exist.
//!
//! Error policy: dispatch returns a `SyscallError` and mutates nothing on the
//! failing path; the command layer folds it into a textual result so one bad
//! call never takes the session down. The output channel is the other half of
//! the interface - kernel prints and background app progress arrive there,
//! never in a call's return value.

use super::cpu::{Cpu, CpuError};
use super::executor::Executor;
use super::memory::{Memory, MemoryError};
use super::task::TaskId;
use super::timer::{sleep_ticks, Clock, TimerHandle, TimerQueue};
use super::trace::Tracer;
use crate::vfs::{FileStore, FsError, Permissions, ROOT_DIR};
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use slab::Slab;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

/// Progress messages each app emits before finishing
pub const APP_PROGRESS_STEPS: u32 = 5;

/// Handle to a registered app (its slab key)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AppId(pub usize);

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "app:{}", self.0)
    }
}

/// A registered app: a name, and the task it was last launched as.
/// Records are never removed; they live until the machine goes away.
#[derive(Debug, Clone)]
pub struct AppRecord {
    pub name: String,
    pub task: Option<TaskId>,
}

/// A system call, fully typed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Syscall {
    /// Emit the arguments on the output channel
    Print(Vec<String>),
    /// Read one byte of memory
    ReadMem(usize),
    /// Write one byte of memory
    WriteMem(usize, u8),
    /// Read a file's content
    ReadFile(String),
    /// Write a file into "root" with read-write permissions
    WriteFile(String, String),
    /// List a directory (default "root")
    ListFiles(Option<String>),
    /// Register an app by name
    CreateApp(String),
    /// Launch a registered app as a background task
    RunApp(String),
    /// Mark the machine down; the driver exits the process
    Shutdown,
}

impl Syscall {
    /// Stable name, for tracing
    pub fn name(&self) -> &'static str {
        match self {
            Syscall::Print(_) => "print",
            Syscall::ReadMem(_) => "read_mem",
            Syscall::WriteMem(_, _) => "write_mem",
            Syscall::ReadFile(_) => "read_file",
            Syscall::WriteFile(_, _) => "write_file",
            Syscall::ListFiles(_) => "list_files",
            Syscall::CreateApp(_) => "create_app",
            Syscall::RunApp(_) => "run_app",
            Syscall::Shutdown => "shutdown",
        }
    }
}

/// What a successful dispatch hands back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyscallReply {
    None,
    Byte(u8),
    Content(String),
    Names(Vec<String>),
}

impl SyscallReply {
    /// File content, or empty for any other reply shape
    pub fn into_content(self) -> String {
        match self {
            SyscallReply::Content(content) => content,
            _ => String::new(),
        }
    }

    /// Directory listing, or empty for any other reply shape
    pub fn into_names(self) -> Vec<String> {
        match self {
            SyscallReply::Names(names) => names,
            _ => Vec::new(),
        }
    }
}

/// System call error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyscallError {
    Memory(MemoryError),
    Fs(FsError),
    Cpu(CpuError),
    /// RUN_APP on a name never registered
    UnknownApp(String),
}

impl fmt::Display for SyscallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyscallError::Memory(e) => write!(f, "{}", e),
            SyscallError::Fs(e) => write!(f, "{}", e),
            SyscallError::Cpu(e) => write!(f, "{}", e),
            SyscallError::UnknownApp(name) => write!(f, "unknown app: {}", name),
        }
    }
}

impl std::error::Error for SyscallError {}

impl From<MemoryError> for SyscallError {
    fn from(e: MemoryError) -> Self {
        SyscallError::Memory(e)
    }
}

impl From<FsError> for SyscallError {
    fn from(e: FsError) -> Self {
        SyscallError::Fs(e)
    }
}

impl From<CpuError> for SyscallError {
    fn from(e: CpuError) -> Self {
        SyscallError::Cpu(e)
    }
}

pub type SyscallResult<T> = Result<T, SyscallError>;

/// The kernel - owns the whole machine
pub struct Kernel {
    cpu: Cpu,
    memory: Memory,
    files: FileStore,
    /// App registry; slab keys are AppIds and grow monotonically
    apps: Slab<AppRecord>,
    /// Cooperative executor for background app tasks
    executor: Executor,
    /// One-shot timers over the simulated clock
    timers: TimerHandle,
    /// Simulated time; 1.0 is one time unit
    clock: Clock,
    /// Sender half of the observable output channel
    output: UnboundedSender<String>,
    tracer: Tracer,
    shutdown: bool,
}

impl Kernel {
    /// Build a kernel and hand back the receiving half of its output channel
    pub fn new() -> (Self, UnboundedReceiver<String>) {
        Self::with_cpu(Cpu::new())
    }

    /// Build a kernel around a specific CPU (seeded RNG, custom step limit)
    pub fn with_cpu(cpu: Cpu) -> (Self, UnboundedReceiver<String>) {
        let (output, receiver) = unbounded();
        let kernel = Self {
            cpu,
            memory: Memory::default(),
            files: FileStore::new(),
            apps: Slab::new(),
            executor: Executor::new(),
            timers: Rc::new(RefCell::new(TimerQueue::new())),
            clock: Rc::new(Cell::new(0.0)),
            output,
            tracer: Tracer::new(),
            shutdown: false,
        };
        (kernel, receiver)
    }

    fn emit(&self, line: String) {
        // A dropped receiver just means nobody is watching
        let _ = self.output.unbounded_send(line);
    }

    /// Dispatch one system call
    pub fn dispatch(&mut self, call: Syscall) -> SyscallResult<SyscallReply> {
        self.tracer.record(call.name());
        match call {
            Syscall::Print(args) => {
                self.emit(format!("Kernel Print: {}", args.join(" ")));
                Ok(SyscallReply::None)
            }
            Syscall::ReadMem(addr) => Ok(SyscallReply::Byte(self.memory.read(addr)?)),
            Syscall::WriteMem(addr, value) => {
                self.memory.write(addr, value)?;
                Ok(SyscallReply::None)
            }
            Syscall::ReadFile(name) => {
                Ok(SyscallReply::Content(self.files.read(&name)?.to_string()))
            }
            Syscall::WriteFile(name, content) => {
                let permissions = Permissions::READ_WRITE;
                self.files.write(&name, &content, ROOT_DIR, permissions)?;
                self.emit(format!(
                    "File '{}' saved with {} permissions!",
                    name, permissions
                ));
                Ok(SyscallReply::None)
            }
            Syscall::ListFiles(directory) => {
                let directory = directory.as_deref().unwrap_or(ROOT_DIR);
                Ok(SyscallReply::Names(self.files.list(directory)))
            }
            Syscall::CreateApp(name) => {
                self.apps.insert(AppRecord {
                    name: name.clone(),
                    task: None,
                });
                self.emit(format!("App '{}' created.", name));
                Ok(SyscallReply::None)
            }
            Syscall::RunApp(name) => {
                self.run_app(&name)?;
                Ok(SyscallReply::None)
            }
            Syscall::Shutdown => {
                self.shutdown = true;
                self.emit("Shutting down...".to_string());
                Ok(SyscallReply::None)
            }
        }
    }

    /// Launch the most recently created app with this name.
    ///
    /// The task is fire-and-forget: it emits five progress lines one time
    /// unit apart, then a completion line, all on the output channel. This
    /// call returns as soon as the task is spawned.
    fn run_app(&mut self, name: &str) -> SyscallResult<()> {
        let id = self
            .apps
            .iter()
            .filter(|(_, record)| record.name == name)
            .map(|(key, _)| key)
            .max()
            .ok_or_else(|| SyscallError::UnknownApp(name.to_string()))?;

        self.emit(format!("Running app: {}", name));

        let out = self.output.clone();
        let clock = Rc::clone(&self.clock);
        let timers = Rc::clone(&self.timers);
        let name = name.to_string();
        let task = self.executor.spawn(async move {
            for step in 1..=APP_PROGRESS_STEPS {
                let _ = out.unbounded_send(format!("{} is running... Step {}", name, step));
                sleep_ticks(&clock, &timers, 1.0).await;
            }
            let _ = out.unbounded_send(format!("{} finished.", name));
        });
        self.apps[id].task = Some(task);
        Ok(())
    }

    /// Load an instruction program into the CPU
    pub fn load_program(&mut self, program: Vec<String>) {
        self.cpu.load(program);
    }

    /// Run the loaded program; PRINT snapshots go to the output channel
    pub fn run_program(&mut self) -> Result<(), CpuError> {
        let out = self.output.clone();
        self.cpu.run(&mut |line| {
            let _ = out.unbounded_send(line);
        })
    }

    /// Advance simulated time by `dt`, fire due timers, run one executor
    /// tick. Returns how many tasks were polled.
    pub fn tick(&mut self, dt: f64) -> usize {
        let now = self.clock.get() + dt;
        self.clock.set(now);
        self.timers.borrow_mut().tick(now);
        self.executor.tick()
    }

    /// Tick one time unit at a time until no background task remains, up to
    /// `max_ticks`. Returns the number of ticks spent.
    pub fn run_until_idle(&mut self, max_ticks: usize) -> usize {
        let mut ticks = 0;
        while self.executor.has_tasks() && ticks < max_ticks {
            self.tick(1.0);
            ticks += 1;
        }
        ticks
    }

    pub fn has_background_tasks(&self) -> bool {
        self.executor.has_tasks()
    }

    pub fn now(&self) -> f64 {
        self.clock.get()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    pub fn files(&self) -> &FileStore {
        &self.files
    }

    /// Registered apps in creation order
    pub fn apps(&self) -> impl Iterator<Item = (AppId, &AppRecord)> {
        self.apps.iter().map(|(key, record)| (AppId(key), record))
    }

    pub fn tracer(&self) -> &Tracer {
        &self.tracer
    }

    pub fn trace_summary(&self) -> Vec<(&'static str, u64)> {
        self.tracer.summary()
    }
}
