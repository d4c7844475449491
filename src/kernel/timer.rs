//! Simulated-time timers and sleep
//!
//! Time in this machine is explicit: the kernel advances a clock and then
//! asks the timer queue which deadlines have passed. A fired timer wakes the
//! waker stored with it; nothing here knows about the executor beyond that.
//!
//! Design:
//! - TimerQueue is a min-heap sorted by deadline
//! - Timers are one-shot; a sleeping future arms one on first poll
//! - 1.0 on the clock is one "time unit" everywhere in the system

use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Unique identifier for a timer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(pub u64);

/// Entry in the timer heap (for ordering only)
#[derive(Debug)]
struct TimerEntry {
    deadline: f64,
    id: TimerId,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering for min-heap (earliest deadline first)
        other
            .deadline
            .partial_cmp(&self.deadline)
            .unwrap_or(Ordering::Equal)
    }
}

/// One-shot timer queue over the simulated clock
#[derive(Debug, Default)]
pub struct TimerQueue {
    heap: BinaryHeap<TimerEntry>,
    /// Wakers for pending timers; fired timers are removed
    wakers: HashMap<TimerId, Waker>,
    next_id: u64,
}

impl TimerQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer that wakes `waker` once the clock reaches `deadline`
    pub fn schedule_at(&mut self, deadline: f64, waker: Waker) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.heap.push(TimerEntry { deadline, id });
        self.wakers.insert(id, waker);
        id
    }

    /// Fire every timer whose deadline has passed. Returns how many fired.
    pub fn tick(&mut self, now: f64) -> usize {
        let mut fired = 0;
        while self.heap.peek().is_some_and(|entry| entry.deadline <= now) {
            if let Some(entry) = self.heap.pop()
                && let Some(waker) = self.wakers.remove(&entry.id)
            {
                waker.wake();
                fired += 1;
            }
        }
        fired
    }

    /// Time until the next pending deadline, if any
    pub fn time_until_next(&self, now: f64) -> Option<f64> {
        self.heap.peek().map(|entry| (entry.deadline - now).max(0.0))
    }

    pub fn pending_count(&self) -> usize {
        self.wakers.len()
    }
}

/// Shared handle to the kernel's timer queue
pub type TimerHandle = Rc<RefCell<TimerQueue>>;

/// Shared handle to the kernel's simulated clock
pub type Clock = Rc<Cell<f64>>;

/// Future that completes once the simulated clock reaches its deadline
pub struct Sleep {
    deadline: f64,
    clock: Clock,
    timers: TimerHandle,
    armed: bool,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if this.clock.get() >= this.deadline {
            return Poll::Ready(());
        }
        if !this.armed {
            this.timers
                .borrow_mut()
                .schedule_at(this.deadline, cx.waker().clone());
            this.armed = true;
        }
        Poll::Pending
    }
}

/// Sleep for `ticks` time units from now
pub fn sleep_ticks(clock: &Clock, timers: &TimerHandle, ticks: f64) -> Sleep {
    Sleep {
        deadline: clock.get() + ticks,
        clock: Rc::clone(clock),
        timers: Rc::clone(timers),
        armed: false,
    }
}
