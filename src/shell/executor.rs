//! Command execution
//!
//! Translates parsed protocol commands into kernel syscalls and formats the
//! single textual result each command owes its caller. Every failure - parse
//! or dispatch - folds into an "Error: ..." result; nothing here panics and
//! nothing crosses back to the caller as a raw error.

use super::parser::{self, Command};
use crate::kernel::syscall::{Kernel, Syscall, SyscallResult};

/// Bytes of memory the `memory` command shows
const MEMORY_PREVIEW: usize = 10;

/// Result of executing one command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecResult {
    /// Exit code (0 = success)
    pub code: i32,
    /// The command's result string on success
    pub output: String,
    /// The "Error: ..." string on failure
    pub error: String,
    /// Should the driver exit the process?
    pub should_exit: bool,
}

impl ExecResult {
    pub fn success() -> Self {
        Self {
            code: 0,
            output: String::new(),
            error: String::new(),
            should_exit: false,
        }
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.output = output.into();
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = error.into();
        self.code = 1;
        self
    }

    fn exiting(mut self) -> Self {
        self.should_exit = true;
        self
    }

    /// The one textual result the protocol promises per command
    pub fn message(&self) -> &str {
        if self.error.is_empty() {
            &self.output
        } else {
            &self.error
        }
    }
}

/// Execute one command line against the kernel
pub fn execute(kernel: &mut Kernel, line: &str) -> ExecResult {
    let command = match parser::parse(line) {
        Ok(command) => command,
        Err(e) => return ExecResult::success().with_error(format!("Error: {}", e)),
    };

    match run_command(kernel, command) {
        Ok(result) => result,
        Err(e) => ExecResult::success().with_error(format!("Error: {}", e)),
    }
}

fn run_command(kernel: &mut Kernel, command: Command) -> SyscallResult<ExecResult> {
    let result = match command {
        Command::Run => {
            kernel.dispatch(Syscall::Print(vec!["Hello from the minos kernel!".into()]))?;
            ExecResult::success().with_output("Kernel Executed a Command")
        }
        Command::Write { name, data } => {
            kernel.dispatch(Syscall::WriteFile(name.clone(), data))?;
            ExecResult::success().with_output(format!("File '{}' saved!", name))
        }
        Command::Read { name } => {
            let content = kernel.dispatch(Syscall::ReadFile(name))?.into_content();
            ExecResult::success().with_output(format!("File Content: {}", content))
        }
        Command::Memory => {
            let preview = kernel.memory().dump(MEMORY_PREVIEW);
            ExecResult::success().with_output(format!("Memory: {:?}", preview))
        }
        Command::ListFiles => {
            let names = kernel.dispatch(Syscall::ListFiles(None))?.into_names();
            ExecResult::success().with_output(format!("Files in root: {:?}", names))
        }
        Command::CreateApp { name } => {
            kernel.dispatch(Syscall::CreateApp(name.clone()))?;
            ExecResult::success().with_output(format!("App '{}' created.", name))
        }
        Command::RunApp { name } => {
            kernel.dispatch(Syscall::RunApp(name.clone()))?;
            ExecResult::success().with_output(format!("Running App: {}", name))
        }
        Command::Shutdown => {
            kernel.dispatch(Syscall::Shutdown)?;
            ExecResult::success()
                .with_output("Shutting down...")
                .exiting()
        }
    };
    Ok(result)
}
