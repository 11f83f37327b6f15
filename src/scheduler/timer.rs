/*!
 * Timer Service
 *
 * One-shot per-task release timers. A task has at most one outstanding timer;
 * arming again replaces the previous one. `cancel` rendezvous with a firing
 * already in flight, so once it returns no callback for that task can run.
 *
 * Callbacks run on the timer context and must not block or call back into
 * the timer service.
 */

use crate::core::types::TaskId;
use ahash::RandomState;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Work performed when a release timer expires
pub type TimerCallback = Box<dyn FnOnce() + Send + 'static>;

/// One-shot timer facility keyed by task id
pub trait TimerService: Send + Sync {
    /// Schedule `on_expiry` to run once after `after`, replacing any armed timer for `id`
    fn arm(&self, id: TaskId, after: Duration, on_expiry: TimerCallback);

    /// Cancel the timer for `id`, waiting out a callback that is already running
    fn cancel(&self, id: TaskId);

    /// Whether a timer for `id` is still pending
    fn is_armed(&self, id: TaskId) -> bool;

    /// Stop delivering expiries
    fn shutdown(&self) {}
}

/// Heap entry; `seq` identifies the arming it belongs to
pub(super) struct Pending {
    pub deadline: Instant,
    pub seq: u64,
    pub id: TaskId,
    pub callback: TimerCallback,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.seq == other.seq
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

/// Deadline heap plus the live arming per task
///
/// Entries whose `seq` no longer matches `armed` were cancelled or replaced
/// and are discarded when they reach the top.
#[derive(Default)]
pub(super) struct TimerHeap {
    heap: BinaryHeap<Reverse<Pending>>,
    armed: HashMap<TaskId, u64, RandomState>,
    next_seq: u64,
}

impl TimerHeap {
    pub fn arm(&mut self, id: TaskId, deadline: Instant, callback: TimerCallback) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.armed.insert(id, seq);
        self.heap.push(Reverse(Pending {
            deadline,
            seq,
            id,
            callback,
        }));
    }

    pub fn cancel(&mut self, id: TaskId) -> bool {
        self.armed.remove(&id).is_some()
    }

    pub fn is_armed(&self, id: TaskId) -> bool {
        self.armed.contains_key(&id)
    }

    pub fn armed_count(&self) -> usize {
        self.armed.len()
    }

    /// Earliest deadline, discarding stale entries on the way
    pub fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse(top)) = self.heap.peek() {
            if self.armed.get(&top.id) == Some(&top.seq) {
                return Some(top.deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// Pop the earliest live entry if it is due at `now`, disarming it
    pub fn pop_due(&mut self, now: Instant) -> Option<Pending> {
        match self.next_deadline() {
            Some(deadline) if deadline <= now => {}
            _ => return None,
        }
        let Reverse(entry) = self.heap.pop()?;
        self.armed.remove(&entry.id);
        Some(entry)
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.armed.clear();
    }
}

struct TimerState {
    heap: TimerHeap,
    stopped: bool,
}

struct TimerShared {
    state: Mutex<TimerState>,
    wakeup: Condvar,
    /// Held by the timer thread for the duration of each callback
    firing: Mutex<()>,
}

/// Timer service backed by a dedicated `rms-timer` thread
pub struct ThreadTimer {
    shared: Arc<TimerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadTimer {
    /// Start the timer thread
    pub fn spawn() -> io::Result<Self> {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                heap: TimerHeap::default(),
                stopped: false,
            }),
            wakeup: Condvar::new(),
            firing: Mutex::new(()),
        });

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("rms-timer".into())
            .spawn(move || run_timer_loop(&worker_shared))?;

        debug!("Timer thread started");

        Ok(Self {
            shared,
            worker: Mutex::new(Some(handle)),
        })
    }

    /// Number of timers currently armed
    pub fn pending(&self) -> usize {
        self.shared.state.lock().heap.armed_count()
    }
}

fn run_timer_loop(shared: &TimerShared) {
    let mut state = shared.state.lock();
    loop {
        if state.stopped {
            break;
        }

        let now = Instant::now();
        let Some(entry) = state.heap.pop_due(now) else {
            match state.heap.next_deadline() {
                Some(deadline) => {
                    shared.wakeup.wait_until(&mut state, deadline);
                }
                None => shared.wakeup.wait(&mut state),
            }
            continue;
        };

        trace!(task_id = entry.id, "Release timer expired");

        // Take `firing` before releasing `state` so a concurrent cancel that
        // finds the entry gone waits for this callback to finish
        let firing = shared.firing.lock();
        let callback = entry.callback;
        MutexGuard::unlocked(&mut state, callback);
        drop(firing);
    }
    debug!("Timer thread exiting");
}

impl TimerService for ThreadTimer {
    fn arm(&self, id: TaskId, after: Duration, on_expiry: TimerCallback) {
        let deadline = Instant::now() + after;
        let mut state = self.shared.state.lock();
        if state.stopped {
            return;
        }
        state.heap.arm(id, deadline, on_expiry);
        drop(state);
        self.shared.wakeup.notify_one();
    }

    fn cancel(&self, id: TaskId) {
        self.shared.state.lock().heap.cancel(id);
        drop(self.shared.firing.lock());
    }

    fn is_armed(&self, id: TaskId) -> bool {
        self.shared.state.lock().heap.is_armed(id)
    }

    fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            state.stopped = true;
            state.heap.clear();
        }
        self.shared.wakeup.notify_all();

        if let Some(handle) = self.worker.lock().take() {
            // The last scheduler reference can be dropped from inside a callback
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                tracing::warn!("Timer thread panicked during shutdown");
            }
        }
    }
}

impl Drop for ThreadTimer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
