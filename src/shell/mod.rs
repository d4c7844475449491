//! Shell - the textual command protocol
//!
//! The machine's outward face for interactive callers: one command line per
//! call, one result string back. Parsing and execution are separate so the
//! protocol itself (the `Command` enum) stays inspectable and testable.

pub mod executor;
pub mod parser;

pub use executor::{execute, ExecResult};
pub use parser::{parse, Command, ParseError};
