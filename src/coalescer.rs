//! Mutation coalescing.
//!
//! Two independent guards sit between a burst of change notifications and the
//! tree walk:
//!
//! ```text
//! notification ──> throttle (leading edge, fixed interval)
//!                     │ admitted
//!                     v
//!                  ProcessingGate (one outstanding pass)
//!                     │ guard acquired
//!                     v
//!                  defer (idle callback, else zero-delay timer)
//!                     │
//!                     v
//!                  walk, then guard dropped
//! ```
//!
//! Dropped calls are never queued or replayed. The next admitted pass walks
//! the then-current tree, which covers what the dropped calls would have seen.

use crate::host::{Scheduler, Task};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tracing::trace;

/// Leading-edge rate limiter state.
#[derive(Debug, Clone, Default)]
pub(crate) struct Throttle {
    interval: Duration,
    window_start: Option<Duration>,
}

impl Throttle {
    pub(crate) fn new(interval: Duration) -> Self {
        Throttle { interval, window_start: None }
    }

    /// Admit a call at `now` if no admitted call happened within the last
    /// `interval`. Admission opens a new window.
    pub(crate) fn admit(&mut self, now: Duration) -> bool {
        let open = match self.window_start {
            None => true,
            Some(start) => now.saturating_sub(start) >= self.interval,
        };
        if open {
            self.window_start = Some(now);
        }
        open
    }
}

/// Wrap `f` so it runs at most once per `interval` of `clock` time.
///
/// The first call runs `f` synchronously; calls within the following
/// `interval` are dropped. The wrapper returns whether `f` ran.
pub fn throttle<C, F>(interval: Duration, clock: C, mut f: F) -> impl FnMut() -> bool
where
    C: Fn() -> Duration,
    F: FnMut(),
{
    let mut state = Throttle::new(interval);
    move || {
        if !state.admit(clock()) {
            trace!("throttled trigger dropped");
            return false;
        }
        f();
        true
    }
}

/// The Processing Flag: at most one deferred pass outstanding.
///
/// Clones share the flag.
#[derive(Debug, Clone, Default)]
pub struct ProcessingGate {
    busy: Rc<Cell<bool>>,
}

impl ProcessingGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the flag, or `None` if a pass is already outstanding.
    pub fn try_begin(&self) -> Option<PassGuard> {
        if self.busy.replace(true) {
            return None;
        }
        Some(PassGuard { busy: self.busy.clone() })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }
}

/// Held for the lifetime of one deferred pass; clears the flag on drop.
#[derive(Debug)]
pub struct PassGuard {
    busy: Rc<Cell<bool>>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.busy.set(false);
    }
}

/// Run `task` when the host is idle, or on the next timer tick if the host
/// has no idle scheduling.
pub fn defer<S: Scheduler + ?Sized>(scheduler: &S, task: Task) {
    if let Err(task) = scheduler.request_idle(task) {
        scheduler.set_timeout(Duration::ZERO, task);
    }
}
