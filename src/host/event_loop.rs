//! Deterministic single-threaded event loop with a virtual clock.
//!
//! Queues, in the order they are drained:
//!
//! 1. microtasks (mutation record delivery),
//! 2. tasks,
//! 3. timers whose deadline has passed,
//! 4. idle callbacks, only when nothing above is runnable.
//!
//! Time never moves on its own. [`EventLoop::run_until_stalled`] runs
//! everything runnable *now*; [`EventLoop::advance`] additionally moves the
//! clock forward, firing timers at their deadlines along the way.

use super::{Scheduler, Task};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

struct Timer {
    deadline: Duration,
    seq: u64,
    task: Task,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: earliest deadline first, then insertion order.
        other.deadline.cmp(&self.deadline).then_with(|| other.seq.cmp(&self.seq))
    }
}

struct LoopState {
    now: Duration,
    seq: u64,
    timers: BinaryHeap<Timer>,
    tasks: VecDeque<Task>,
    microtasks: VecDeque<Task>,
    idle: VecDeque<Task>,
    idle_supported: bool,
}

/// Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
}

impl Default for EventLoop {
    fn default() -> Self {
        EventLoop::new()
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.state.borrow();
        f.debug_struct("EventLoop")
            .field("now", &s.now)
            .field("timers", &s.timers.len())
            .field("tasks", &s.tasks.len())
            .field("microtasks", &s.microtasks.len())
            .field("idle", &s.idle.len())
            .field("idle_supported", &s.idle_supported)
            .finish()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        EventLoop::with_idle_support(true)
    }

    /// A loop whose host offers no idle callbacks.
    pub fn without_idle() -> Self {
        EventLoop::with_idle_support(false)
    }

    fn with_idle_support(idle_supported: bool) -> Self {
        let state = LoopState {
            now: Duration::ZERO,
            seq: 0,
            timers: BinaryHeap::new(),
            tasks: VecDeque::new(),
            microtasks: VecDeque::new(),
            idle: VecDeque::new(),
            idle_supported,
        };
        EventLoop { state: Rc::new(RefCell::new(state)) }
    }

    pub fn now(&self) -> Duration {
        self.state.borrow().now
    }

    pub fn queue_task(&self, task: impl FnOnce() + 'static) {
        self.state.borrow_mut().tasks.push_back(Box::new(task));
    }

    pub fn queue_microtask(&self, task: impl FnOnce() + 'static) {
        self.state.borrow_mut().microtasks.push_back(Box::new(task));
    }

    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    pub fn pending_idle(&self) -> usize {
        self.state.borrow().idle.len()
    }

    /// Run everything runnable at the current time. Returns how many
    /// callbacks ran.
    pub fn run_until_stalled(&self) -> usize {
        let mut ran = 0;
        while let Some(task) = self.next_runnable() {
            task();
            ran += 1;
        }
        ran
    }

    /// Move the clock forward by `by`, firing due timers in deadline order.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.now() + by;
        let mut ran = self.run_until_stalled();

        loop {
            let next = self.state.borrow().timers.peek().map(|t| t.deadline);
            match next {
                Some(deadline) if deadline <= target => {
                    {
                        let mut s = self.state.borrow_mut();
                        s.now = s.now.max(deadline);
                    }
                    ran += self.run_until_stalled();
                }
                _ => break,
            }
        }

        self.state.borrow_mut().now = target;
        ran + self.run_until_stalled()
    }

    // The borrow is released before the task runs so tasks can queue more work.
    fn next_runnable(&self) -> Option<Task> {
        let mut s = self.state.borrow_mut();
        if let Some(task) = s.microtasks.pop_front() {
            return Some(task);
        }
        if let Some(task) = s.tasks.pop_front() {
            return Some(task);
        }
        let now = s.now;
        if s.timers.peek().is_some_and(|t| t.deadline <= now) {
            return s.timers.pop().map(|t| t.task);
        }
        s.idle.pop_front()
    }
}

impl Scheduler for EventLoop {
    fn now(&self) -> Duration {
        EventLoop::now(self)
    }

    fn set_timeout(&self, delay: Duration, task: Task) {
        let mut s = self.state.borrow_mut();
        let deadline = s.now + delay;
        let seq = s.seq;
        s.seq += 1;
        s.timers.push(Timer { deadline, seq, task });
    }

    fn request_idle(&self, task: Task) -> Result<(), Task> {
        let mut s = self.state.borrow_mut();
        if !s.idle_supported {
            return Err(task);
        }
        s.idle.push_back(task);
        Ok(())
    }
}
