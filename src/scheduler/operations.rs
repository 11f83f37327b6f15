/*!
 * Scheduler Core Operations
 * Register, yield, deregister, evaluate, status, and teardown
 */

use super::config::InitialRelease;
use super::dispatch::YieldOutcome;
use super::registry::Registry;
use super::task::TaskRecord;
use super::types::{SchedulerEvent, SchedulerStats, StatusReport, TaskStatus};
use super::{Scheduler, Shared};
use crate::core::errors::{ControllerError, SchedulerError, SchedulerResult};
use crate::core::types::{Millis, TaskId, TaskState};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

impl Shared {
    /// Timer expiry: SLEEPING -> READY, queue, wake the loop
    ///
    /// Runs on the timer context and takes only the dispatch lock.
    fn on_release(&self, task: &Arc<TaskRecord>) {
        let released = self.dispatch.lock().release(task);
        match released {
            Some(new_head) => {
                trace!(task_id = task.id(), new_head, "Task released");
                self.wake();
            }
            None => trace!(task_id = task.id(), "Ignoring stale release"),
        }
    }

    fn wake(&self) {
        // Only fails once the loop is gone, which is fine to ignore
        let _ = self.events.send(SchedulerEvent::Wake);
    }

    fn demote(&self, task: &TaskRecord) {
        if let Err(e) = self.controller.demote(task.handle()) {
            warn!(task_id = task.id(), error = %e, "Demotion failed");
        }
    }

    /// Remove a task from every collection; the registry lock must be held
    fn drop_task(&self, registry: &mut Registry, task: &Arc<TaskRecord>) -> bool {
        registry.remove(task.id());
        self.timers.cancel(task.id());
        let was_running = self.dispatch.lock().retire(task);
        self.stats.dec_active();
        was_running
    }
}

impl Scheduler {
    /// Register a periodic task with period `period_ms` and budget `budget_ms`
    ///
    /// The task starts SLEEPING with its first release one period from now,
    /// unless the scheduler is configured for immediate release.
    pub fn register(&self, id: TaskId, period_ms: Millis, budget_ms: Millis) -> SchedulerResult<()> {
        self.ensure_active()?;
        if period_ms == 0 || budget_ms == 0 {
            return Err(SchedulerError::InvalidTiming {
                id,
                period_ms,
                budget_ms,
            });
        }

        let Some(handle) = self.inner.controller.resolve(id) else {
            warn!(task_id = id, "Registration rejected: no live execution context");
            return Err(SchedulerError::UnresolvedHandle(id));
        };

        let mut registry = self.inner.registry.lock();
        self.ensure_active()?;
        if registry.contains(id) {
            return Err(SchedulerError::AlreadyRegistered(id));
        }

        let config = &self.inner.config;
        let task = Arc::new(TaskRecord::new(
            id,
            period_ms,
            budget_ms,
            config.quantize(period_ms),
            config.quantize(budget_ms),
            handle,
            self.inner.clock.now(),
        ));
        registry.insert(Arc::clone(&task));
        self.inner.stats.inc_active();

        match config.initial_release {
            InitialRelease::Deferred => self.arm_release(&task, task.period()),
            InitialRelease::Immediate => {
                if self.inner.dispatch.lock().release(&task) == Some(true) {
                    self.inner.wake();
                }
            }
        }

        info!(task_id = id, period_ms, budget_ms, %handle, "Task registered");
        Ok(())
    }

    /// Remove a task, cancelling its timer and demoting it if it was running
    pub fn deregister(&self, id: TaskId) -> SchedulerResult<()> {
        let mut registry = self.inner.registry.lock();
        self.ensure_active()?;
        let task = registry
            .find(id)
            .cloned()
            .ok_or(SchedulerError::NotFound(id))?;

        let was_running = self.inner.drop_task(&mut registry, &task);
        if was_running {
            self.inner.demote(&task);
            self.inner.wake();
        }

        info!(task_id = id, was_running, "Task deregistered");
        Ok(())
    }

    /// Voluntary yield at the end of a task's job
    ///
    /// Sleeps the task until its next release, or re-queues it at once when
    /// that release has already passed (an overrun). A task still waiting in
    /// the run queue is left untouched.
    pub fn yield_task(&self, id: TaskId) -> SchedulerResult<()> {
        let registry = self.inner.registry.lock();
        self.ensure_active()?;
        let task = registry
            .find(id)
            .cloned()
            .ok_or(SchedulerError::NotFound(id))?;

        // Any armed release is superseded by the outcome below
        self.inner.timers.cancel(id);
        let now = self.inner.clock.now();
        let outcome = self.inner.dispatch.lock().yield_task(&task, now);

        match outcome {
            YieldOutcome::Sleep { remaining, .. } => {
                self.arm_release(&task, remaining);
                debug!(
                    task_id = id,
                    remaining_us = remaining.as_micros() as u64,
                    "Task sleeping until next release"
                );
            }
            YieldOutcome::Overrun { was_running: true } => {
                self.inner.stats.inc_overruns();
                warn!(task_id = id, "Yield after period boundary; re-queued without sleeping");
            }
            YieldOutcome::Overrun { was_running: false } => {
                debug!(task_id = id, "Release already due; queued without sleeping");
            }
            YieldOutcome::Queued => {
                debug!(task_id = id, "Yield ignored; task is waiting to run");
                return Ok(());
            }
        }

        if outcome.was_running() {
            self.inner.demote(&task);
        }
        self.inner.wake();
        drop(registry);
        Ok(())
    }

    /// Status of one task; absence is not an error
    pub fn find(&self, id: TaskId) -> Option<TaskStatus> {
        let now = self.inner.clock.now();
        let registry = self.inner.registry.lock();
        registry.find(id).map(|task| task_status(task, now))
    }

    /// Status of every registered task
    pub fn status(&self) -> StatusReport {
        let now = self.inner.clock.now();
        let registry = self.inner.registry.lock();
        StatusReport {
            tasks: registry.iter().map(|task| task_status(task, now)).collect(),
        }
    }

    pub fn state_of(&self, id: TaskId) -> Option<TaskState> {
        self.inner.registry.lock().find(id).map(|task| task.state())
    }

    /// Id of the task holding the resource
    pub fn running(&self) -> Option<TaskId> {
        self.inner.dispatch.lock().running_id()
    }

    /// Run-queue ids, head first
    pub fn run_queue_ids(&self) -> Vec<TaskId> {
        self.inner.dispatch.lock().run_queue().ids()
    }

    /// Whether the run queue is currently sorted by period
    pub fn run_queue_ordered(&self) -> bool {
        self.inner.dispatch.lock().run_queue().is_ordered()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.inner.stats.snapshot()
    }

    /// One pass of the scheduling loop; returns the running task afterwards
    ///
    /// Demotes a preempted task before promoting its successor. A dispatched
    /// task whose execution context has vanished is dropped as if deregistered
    /// and the next head is tried.
    pub fn evaluate(&self) -> Option<TaskId> {
        let mut registry = self.inner.registry.lock();
        if self.is_stopped() {
            return None;
        }

        loop {
            let now = self.inner.clock.now();
            let decision = self.inner.dispatch.lock().evaluate(now);
            self.inner.stats.inc_evaluations();

            if let Some(preempted) = &decision.preempted {
                self.inner.stats.inc_preemptions();
                self.inner.demote(preempted);
                debug!(task_id = preempted.id(), "Preempted by shorter-period task");
            }

            let Some(task) = decision.dispatched else {
                break;
            };
            self.inner.stats.inc_dispatches();
            if decision.switched {
                self.inner.stats.inc_context_switches();
            }
            if decision.skipped > 0 {
                self.inner.stats.add_skipped_releases(decision.skipped);
                warn!(task_id = task.id(), skipped = decision.skipped, "Skipped missed releases");
            }

            match self.inner.controller.promote(task.handle()) {
                Ok(()) => {
                    debug!(task_id = task.id(), "Task dispatched");
                    break;
                }
                Err(ControllerError::HandleGone(handle)) => {
                    error!(
                        task_id = task.id(),
                        %handle,
                        "Dispatched task has no live execution context; dropping it"
                    );
                    self.inner.drop_task(&mut registry, &task);
                }
                Err(e) => {
                    warn!(task_id = task.id(), error = %e, "Promotion failed; running at baseline");
                    break;
                }
            }
        }

        drop(registry);
        self.running()
    }

    /// Tear down: cancel every timer, demote the running task, clear all
    /// tasks, then stop the loop. Later commands fail with `Stopped`.
    pub fn shutdown(&self) {
        if self.inner.stopped.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut registry = self.inner.registry.lock();
        let tasks = registry.drain();
        for task in &tasks {
            self.inner.timers.cancel(task.id());
            if self.inner.dispatch.lock().retire(task) {
                self.inner.demote(task);
            }
            self.inner.stats.dec_active();
        }
        drop(registry);

        self.inner.timers.shutdown();
        let _ = self.inner.events.send(SchedulerEvent::Stop);
        info!(tasks = tasks.len(), "Scheduler stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Wake signals not yet consumed by a loop
    pub fn pending_wakes(&self) -> usize {
        self.inner.events.len()
    }

    /// Claim the event receiver; only the first caller gets it
    pub fn take_events(&self) -> Option<flume::Receiver<SchedulerEvent>> {
        self.inner.receiver.lock().take()
    }

    /// Ask the loop to re-evaluate
    pub fn wake(&self) {
        self.inner.wake();
    }

    fn ensure_active(&self) -> SchedulerResult<()> {
        if self.is_stopped() {
            Err(SchedulerError::Stopped)
        } else {
            Ok(())
        }
    }

    fn arm_release(&self, task: &Arc<TaskRecord>, after: Duration) {
        let shared = Arc::downgrade(&self.inner);
        let target = Arc::clone(task);
        self.inner.timers.arm(
            task.id(),
            after,
            Box::new(move || {
                if let Some(shared) = shared.upgrade() {
                    shared.on_release(&target);
                }
            }),
        );
    }
}

fn task_status(task: &TaskRecord, now: Instant) -> TaskStatus {
    let sched = task.snapshot();
    TaskStatus {
        id: task.id(),
        period_ms: task.period_ms(),
        budget_ms: task.budget_ms(),
        state: sched.state,
        next_release_in_ms: sched
            .next_release
            .saturating_duration_since(now)
            .as_millis() as Millis,
        dispatches: sched.dispatches,
        overruns: sched.overruns,
        skipped_releases: sched.skipped_releases,
    }
}
