//! Cooperative task executor
//!
//! Single-threaded and tick-based: one tick polls every task whose waker has
//! fired since the last tick, exactly once. Tasks that return Pending stay
//! parked until something (a timer, usually) wakes them again. There is no
//! preemption and no thread pool; the whole machine shares one call stack.

use super::task::{BoxFuture, TaskId};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet, VecDeque};
use std::rc::Rc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Waker};

/// Set of tasks whose wakers have fired, shared with every waker
type ReadySet = Rc<RefCell<HashSet<TaskId>>>;

/// The executor - runs spawned futures one cooperative tick at a time
pub struct Executor {
    /// Parked and runnable tasks, by ID
    tasks: BTreeMap<TaskId, BoxFuture>,
    /// Tasks whose wakers have fired
    ready: ReadySet,
    /// Tasks spawned since the last tick (possibly mid-tick)
    incoming: RefCell<VecDeque<(TaskId, BoxFuture)>>,
    next_id: u64,
}

impl Executor {
    pub fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
            ready: Rc::new(RefCell::new(HashSet::new())),
            incoming: RefCell::new(VecDeque::new()),
            next_id: 0,
        }
    }

    /// Spawn a future. It first runs on the next tick.
    pub fn spawn<F>(&mut self, future: F) -> TaskId
    where
        F: std::future::Future<Output = ()> + 'static,
    {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        self.incoming.borrow_mut().push_back((id, Box::pin(future)));
        self.ready.borrow_mut().insert(id);
        id
    }

    /// Move freshly spawned tasks into the task map
    fn absorb_incoming(&mut self) {
        let mut incoming = self.incoming.borrow_mut();
        while let Some((id, future)) = incoming.pop_front() {
            self.tasks.insert(id, future);
        }
    }

    /// Poll every ready task once. Returns how many were polled.
    pub fn tick(&mut self) -> usize {
        self.absorb_incoming();

        let mut ready_ids: Vec<TaskId> = self.ready.borrow().iter().copied().collect();
        ready_ids.sort();

        let mut polled = 0;
        for id in ready_ids {
            self.ready.borrow_mut().remove(&id);
            let Some(mut future) = self.tasks.remove(&id) else {
                continue;
            };

            let waker = self.waker_for(id);
            let mut cx = Context::from_waker(&waker);
            match future.as_mut().poll(&mut cx) {
                Poll::Ready(()) => {}
                Poll::Pending => {
                    // Parked until its waker fires
                    self.tasks.insert(id, future);
                }
            }
            polled += 1;
        }

        self.absorb_incoming();
        polled
    }

    /// Drive all tasks to completion. If nothing is ready, every task is
    /// marked ready, so futures that yield without arranging a wake still
    /// make progress.
    pub fn run(&mut self) {
        loop {
            self.absorb_incoming();
            if self.tasks.is_empty() && self.incoming.borrow().is_empty() {
                break;
            }
            if self.ready.borrow().is_empty() {
                let mut ready = self.ready.borrow_mut();
                for id in self.tasks.keys() {
                    ready.insert(*id);
                }
            }
            self.tick();
        }
    }

    pub fn has_tasks(&self) -> bool {
        !self.tasks.is_empty() || !self.incoming.borrow().is_empty()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len() + self.incoming.borrow().len()
    }

    fn waker_for(&self, id: TaskId) -> Waker {
        let slot = Box::new(WakeSlot {
            id,
            ready: Rc::clone(&self.ready),
        });
        let raw = RawWaker::new(Box::into_raw(slot) as *const (), &WAKE_VTABLE);
        unsafe { Waker::from_raw(raw) }
    }
}

impl Default for Executor {
    fn default() -> Self {
        Self::new()
    }
}

/// Waker payload: which task to mark ready, and where
struct WakeSlot {
    id: TaskId,
    ready: ReadySet,
}

const WAKE_VTABLE: RawWakerVTable =
    RawWakerVTable::new(vt_clone, vt_wake, vt_wake_by_ref, vt_drop);

unsafe fn vt_clone(ptr: *const ()) -> RawWaker {
    let slot = unsafe { &*(ptr as *const WakeSlot) };
    let copy = Box::new(WakeSlot {
        id: slot.id,
        ready: Rc::clone(&slot.ready),
    });
    RawWaker::new(Box::into_raw(copy) as *const (), &WAKE_VTABLE)
}

unsafe fn vt_wake(ptr: *const ()) {
    let slot = unsafe { Box::from_raw(ptr as *mut WakeSlot) };
    slot.ready.borrow_mut().insert(slot.id);
}

unsafe fn vt_wake_by_ref(ptr: *const ()) {
    let slot = unsafe { &*(ptr as *const WakeSlot) };
    slot.ready.borrow_mut().insert(slot.id);
}

unsafe fn vt_drop(ptr: *const ()) {
    drop(unsafe { Box::from_raw(ptr as *mut WakeSlot) });
}
