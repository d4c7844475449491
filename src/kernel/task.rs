//! Task identity
//!
//! Background apps are the only unit of concurrent execution. A task is a
//! `'static` future spawned on the kernel's executor; it owns nothing of the
//! machine and reports back solely through the output channel.

use std::future::Future;
use std::pin::Pin;

/// Unique identifier for a spawned task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Task({})", self.0)
    }
}

/// A boxed future representing a spawned task
pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + 'static>>;
