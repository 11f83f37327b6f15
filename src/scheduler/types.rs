/*!
 * Scheduler Types
 * Status snapshots, statistics, and loop events
 */

use crate::core::types::{Millis, TaskId, TaskState};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-task status as reported by a status query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub id: TaskId,
    pub period_ms: Millis,
    pub budget_ms: Millis,
    pub state: TaskState,
    /// Milliseconds until the next period boundary, zero if already due
    pub next_release_in_ms: Millis,
    pub dispatches: u64,
    pub overruns: u64,
    pub skipped_releases: u64,
}

/// Status of every registered task, in arbitrary order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub tasks: Vec<TaskStatus>,
}

impl StatusReport {
    pub fn find(&self, id: TaskId) -> Option<&TaskStatus> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

/// One line per task: `PID:<id>, P:<period>, C:<budget>`
impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for task in &self.tasks {
            writeln!(f, "PID:{}, P:{}, C:{}", task.id, task.period_ms, task.budget_ms)?;
        }
        Ok(())
    }
}

/// Global scheduler counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerStats {
    pub dispatches: u64,
    pub context_switches: u64,
    pub preemptions: u64,
    pub overruns: u64,
    pub skipped_releases: u64,
    pub active_tasks: usize,
    pub evaluations: u64,
}

/// Signal delivered to the scheduler loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerEvent {
    /// Re-evaluate the run queue against the running task
    Wake,
    /// Leave the loop
    Stop,
}
