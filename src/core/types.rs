/*!
 * Core Types
 * Common types used across the scheduler
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Task identifier, assigned externally (an OS pid or an in-process worker id)
pub type TaskId = u32;

/// Period and budget values as they cross the control surface
pub type Millis = u64;

/// Scheduling state of a registered task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting for its next release
    Sleeping,
    /// Released and waiting in the run queue
    Ready,
    /// Holding the execution resource
    Running,
}

impl TaskState {
    #[inline(always)]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sleeping => "sleeping",
            Self::Ready => "ready",
            Self::Running => "running",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque handle to the host execution context of a task
///
/// Only the priority controller interprets the raw value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecHandle(u64);

impl ExecHandle {
    #[inline]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExecHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
