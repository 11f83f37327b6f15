/*!
 * Virtual Time
 *
 * A manually advanced clock that doubles as a timer service. Expiries fire
 * synchronously from `advance`, in deadline order, with the clock set to each
 * deadline as it fires. Drives deterministic tests and dry-run simulations.
 */

use super::timer::{TimerCallback, TimerHeap, TimerService};
use crate::core::time::Clock;
use crate::core::types::TaskId;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

struct VirtualState {
    now: Instant,
    timers: TimerHeap,
}

/// Shared virtual clock and timer queue; clones observe the same time
#[derive(Clone)]
pub struct VirtualTime {
    state: Arc<Mutex<VirtualState>>,
}

impl VirtualTime {
    /// Start virtual time at the current host instant
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(origin: Instant) -> Self {
        Self {
            state: Arc::new(Mutex::new(VirtualState {
                now: origin,
                timers: TimerHeap::default(),
            })),
        }
    }

    /// Move time forward by `by`, firing every timer that falls due
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.lock().now + by;
        self.advance_to(target)
    }

    /// Move time forward to `target`, firing due timers; returns how many fired
    ///
    /// Time never moves backward; an earlier target only fires what is already due.
    pub fn advance_to(&self, target: Instant) -> usize {
        let mut fired = 0;
        loop {
            let entry = {
                let mut state = self.state.lock();
                let target = target.max(state.now);
                match state.timers.pop_due(target) {
                    Some(entry) => {
                        state.now = state.now.max(entry.deadline);
                        entry
                    }
                    None => {
                        state.now = target;
                        return fired;
                    }
                }
            };
            (entry.callback)();
            fired += 1;
        }
    }

    /// Deadline of the next pending timer
    pub fn next_deadline(&self) -> Option<Instant> {
        self.state.lock().timers.next_deadline()
    }

    pub fn pending(&self) -> usize {
        self.state.lock().timers.armed_count()
    }
}

impl Default for VirtualTime {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualTime {
    fn now(&self) -> Instant {
        self.state.lock().now
    }
}

impl TimerService for VirtualTime {
    fn arm(&self, id: TaskId, after: Duration, on_expiry: TimerCallback) {
        let mut state = self.state.lock();
        let deadline = state.now + after;
        state.timers.arm(id, deadline, on_expiry);
    }

    fn cancel(&self, id: TaskId) {
        // Callbacks run outside the lock on the advancing thread, so there is
        // never a firing in flight relative to another caller of `cancel`
        self.state.lock().timers.cancel(id);
    }

    fn is_armed(&self, id: TaskId) -> bool {
        self.state.lock().timers.is_armed(id)
    }

    fn shutdown(&self) {
        self.state.lock().timers.clear();
    }
}
