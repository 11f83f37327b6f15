/*!
 * Task Records
 * Per-task identity, timing parameters, and mutable scheduling state
 */

use crate::core::types::{ExecHandle, Millis, TaskId, TaskState};
use std::time::{Duration, Instant};

/// Mutable scheduling state of a task
///
/// Written only while the dispatch lock is held, so it always agrees with
/// run-queue membership.
#[derive(Debug, Clone)]
pub struct SchedState {
    pub state: TaskState,
    /// Absolute instant of the next period boundary
    pub next_release: Instant,
    /// Times this task was given the execution resource
    pub dispatches: u64,
    /// Yields observed after the next period had already begun
    pub overruns: u64,
    /// Period boundaries jumped over by the skip-forward advance
    pub skipped_releases: u64,
    /// Set once the task leaves the registry; stale timers check it
    pub retired: bool,
}

/// A registered periodic task
#[derive(Debug)]
pub struct TaskRecord {
    id: TaskId,
    period: Duration,
    budget: Duration,
    period_ms: Millis,
    budget_ms: Millis,
    handle: ExecHandle,
    registered_at: Instant,
    sched: spin::Mutex<SchedState>,
}

impl TaskRecord {
    /// Create a sleeping task whose first release is one period after `now`
    pub fn new(
        id: TaskId,
        period_ms: Millis,
        budget_ms: Millis,
        period: Duration,
        budget: Duration,
        handle: ExecHandle,
        now: Instant,
    ) -> Self {
        Self {
            id,
            period,
            budget,
            period_ms,
            budget_ms,
            handle,
            registered_at: now,
            sched: spin::Mutex::new(SchedState {
                state: TaskState::Sleeping,
                next_release: now + period,
                dispatches: 0,
                overruns: 0,
                skipped_releases: 0,
                retired: false,
            }),
        }
    }

    #[inline]
    pub fn id(&self) -> TaskId {
        self.id
    }

    /// Period at host tick resolution
    #[inline]
    pub fn period(&self) -> Duration {
        self.period
    }

    #[inline]
    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Period exactly as supplied at registration
    #[inline]
    pub fn period_ms(&self) -> Millis {
        self.period_ms
    }

    #[inline]
    pub fn budget_ms(&self) -> Millis {
        self.budget_ms
    }

    #[inline]
    pub fn handle(&self) -> ExecHandle {
        self.handle
    }

    #[inline]
    pub fn registered_at(&self) -> Instant {
        self.registered_at
    }

    #[inline]
    pub fn state(&self) -> TaskState {
        self.sched.lock().state
    }

    #[inline]
    pub fn next_release(&self) -> Instant {
        self.sched.lock().next_release
    }

    /// Copy of the scheduling state
    pub fn snapshot(&self) -> SchedState {
        self.sched.lock().clone()
    }

    pub(crate) fn sched(&self) -> &spin::Mutex<SchedState> {
        &self.sched
    }
}

/// Move `next` forward by whole periods until it lies strictly after `now`
///
/// Equivalent to repeatedly adding `period`; returns the new boundary and the
/// number of periods added. A boundary already in the future is returned
/// unchanged, so the value never moves backward.
pub fn advance_release(next: Instant, period: Duration, now: Instant) -> (Instant, u64) {
    if next > now {
        return (next, 0);
    }
    let period_nanos = period.as_nanos().max(1);
    let behind = now.duration_since(next).as_nanos();
    let steps = behind / period_nanos + 1;
    let offset = u64::try_from(period_nanos * steps).unwrap_or(u64::MAX);
    (
        next + Duration::from_nanos(offset),
        u64::try_from(steps).unwrap_or(u64::MAX),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: TaskId, period_ms: Millis, now: Instant) -> TaskRecord {
        TaskRecord::new(
            id,
            period_ms,
            period_ms / 2,
            Duration::from_millis(period_ms),
            Duration::from_millis(period_ms / 2),
            ExecHandle::from_raw(u64::from(id)),
            now,
        )
    }

    #[test]
    fn test_new_task_is_sleeping_one_period_out() {
        let t0 = Instant::now();
        let task = record(1, 450, t0);
        assert_eq!(task.state(), TaskState::Sleeping);
        assert_eq!(task.next_release(), t0 + Duration::from_millis(450));
        assert_eq!(task.period_ms(), 450);
        assert_eq!(task.budget_ms(), 225);
    }

    #[test]
    fn test_advance_keeps_future_boundary() {
        let t0 = Instant::now();
        let next = t0 + Duration::from_millis(100);
        assert_eq!(
            advance_release(next, Duration::from_millis(100), t0),
            (next, 0)
        );
    }

    #[test]
    fn test_advance_single_period() {
        let t0 = Instant::now();
        let period = Duration::from_millis(100);
        let next = t0 + period;
        // Dispatched exactly at the release
        let (advanced, steps) = advance_release(next, period, next);
        assert_eq!(advanced, t0 + 2 * period);
        assert_eq!(steps, 1);
    }

    #[test]
    fn test_advance_skips_missed_periods_on_grid() {
        let t0 = Instant::now();
        let period = Duration::from_millis(100);
        let next = t0 + period;
        let now = t0 + Duration::from_millis(350);
        let (advanced, steps) = advance_release(next, period, now);
        assert_eq!(advanced, t0 + Duration::from_millis(400));
        assert_eq!(steps, 3);
    }

    #[test]
    fn test_advance_matches_repeated_addition() {
        let t0 = Instant::now();
        let period = Duration::from_millis(7);
        for offset in 0..100u64 {
            let now = t0 + Duration::from_millis(offset);
            let mut expected = t0 + period;
            while expected <= now {
                expected += period;
            }
            assert_eq!(advance_release(t0 + period, period, now).0, expected);
        }
    }
}
