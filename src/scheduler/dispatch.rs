/*!
 * Dispatch State
 *
 * The run queue and the running slot, kept under one `spin::Mutex` so run-queue
 * membership and task state always change together. Every transition of the
 * RUNNING/READY/SLEEPING state machine happens here; priority changes are
 * applied afterwards by the caller, outside the spin lock.
 */

use super::run_queue::RunQueue;
use super::task::{advance_release, TaskRecord};
use crate::core::types::{TaskId, TaskState};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of one evaluation
#[derive(Debug, Default)]
pub struct Decision {
    /// Running task displaced by a shorter-period head; demote it
    pub preempted: Option<Arc<TaskRecord>>,
    /// Task that now holds the resource; promote it
    pub dispatched: Option<Arc<TaskRecord>>,
    /// Period boundaries skipped while advancing the dispatched task
    pub skipped: u64,
    /// The dispatched task differs from the last one that held the resource
    pub switched: bool,
}

impl Decision {
    pub fn is_idle(&self) -> bool {
        self.preempted.is_none() && self.dispatched.is_none()
    }
}

/// Outcome of a yield
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum YieldOutcome {
    /// Next release is in the future; arm the timer for the remaining time
    Sleep { remaining: Duration, was_running: bool },
    /// The next period already began; the task went straight back to READY
    Overrun { was_running: bool },
    /// Released but not yet dispatched; the task keeps its queue position
    Queued,
}

impl YieldOutcome {
    pub fn was_running(&self) -> bool {
        match *self {
            Self::Sleep { was_running, .. } | Self::Overrun { was_running } => was_running,
            Self::Queued => false,
        }
    }
}

#[derive(Debug, Default)]
pub struct Dispatch {
    run_queue: RunQueue,
    running: Option<Arc<TaskRecord>>,
    /// Last task given the resource, kept across yields and preemptions
    last_dispatched: Option<TaskId>,
}

impl Dispatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run_queue(&self) -> &RunQueue {
        &self.run_queue
    }

    pub fn running(&self) -> Option<&Arc<TaskRecord>> {
        self.running.as_ref()
    }

    pub fn running_id(&self) -> Option<TaskId> {
        self.running.as_ref().map(|t| t.id())
    }

    /// Mark a sleeping task READY and queue it
    ///
    /// Returns whether the task became the new head, or `None` if it was not
    /// sleeping (already released, running, or retired).
    pub fn release(&mut self, task: &Arc<TaskRecord>) -> Option<bool> {
        {
            let mut sched = task.sched().lock();
            if sched.retired || sched.state != TaskState::Sleeping {
                return None;
            }
            sched.state = TaskState::Ready;
        }
        Some(self.run_queue.insert(Arc::clone(task)) == 0)
    }

    /// One scheduling evaluation at `now`
    ///
    /// 1. Preempt the running task if the head has a strictly shorter period.
    /// 2. If nothing runs, dispatch the head and advance its next release past `now`.
    pub fn evaluate(&mut self, now: Instant) -> Decision {
        let mut decision = Decision::default();

        let preempt = match (&self.running, self.run_queue.peek_shortest()) {
            (Some(running), Some(head)) => head.period() < running.period(),
            _ => false,
        };
        if preempt {
            if let Some(task) = self.running.take() {
                task.sched().lock().state = TaskState::Ready;
                self.run_queue.insert(Arc::clone(&task));
                decision.preempted = Some(task);
            }
        }

        if self.running.is_none() {
            if let Some(task) = self.run_queue.pop_shortest() {
                {
                    let mut sched = task.sched().lock();
                    let (next, steps) = advance_release(sched.next_release, task.period(), now);
                    let skipped = steps.saturating_sub(1);
                    sched.state = TaskState::Running;
                    sched.next_release = next;
                    sched.dispatches += 1;
                    sched.skipped_releases += skipped;
                    decision.skipped = skipped;
                }
                decision.switched = self.last_dispatched != Some(task.id());
                self.last_dispatched = Some(task.id());
                self.running = Some(Arc::clone(&task));
                decision.dispatched = Some(task);
            }
        }

        decision
    }

    /// Voluntary yield of `task` at `now`
    ///
    /// A running task gives up the resource, then sleeps until its next
    /// release or re-enters the queue at once if that release has already
    /// passed. A READY task that has not run yet stays where it is; a
    /// sleeping one is put back to sleep for the remaining time.
    pub fn yield_task(&mut self, task: &Arc<TaskRecord>, now: Instant) -> YieldOutcome {
        let was_running = self.running_id() == Some(task.id());
        if !was_running && self.run_queue.contains(task.id()) {
            return YieldOutcome::Queued;
        }
        if was_running {
            self.running = None;
        }

        let mut sched = task.sched().lock();
        if sched.next_release > now {
            sched.state = TaskState::Sleeping;
            YieldOutcome::Sleep {
                remaining: sched.next_release - now,
                was_running,
            }
        } else {
            sched.state = TaskState::Ready;
            if was_running {
                sched.overruns += 1;
            }
            drop(sched);
            self.run_queue.insert(Arc::clone(task));
            YieldOutcome::Overrun { was_running }
        }
    }

    /// Take a task out of scheduling for good; returns whether it was running
    pub fn retire(&mut self, task: &Arc<TaskRecord>) -> bool {
        let was_running = self.running_id() == Some(task.id());
        if was_running {
            self.running = None;
        }
        self.run_queue.remove(task.id());
        task.sched().lock().retired = true;
        was_running
    }
}
