//! The kernel - machine state, syscalls, and background task execution
//!
//! Everything the machine is lives behind one `Kernel` value: CPU, memory,
//! file store, app registry, executor, timers. There is no global instance;
//! whoever builds the kernel owns it and passes it where it is needed.

pub mod cpu;
pub mod executor;
pub mod memory;
pub mod syscall;
pub mod task;
pub mod timer;
pub mod trace;

pub use cpu::{Cpu, CpuError, CpuState, Flags, Instruction};
pub use executor::Executor;
pub use memory::{Memory, MemoryError};
pub use syscall::{
    AppId, AppRecord, Kernel, Syscall, SyscallError, SyscallReply, SyscallResult,
};
pub use task::TaskId;
pub use timer::TimerQueue;
pub use trace::Tracer;
