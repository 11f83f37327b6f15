/*!
 * Error Types
 * Centralized error handling with thiserror, miette, and serde support
 */

use super::types::{ExecHandle, Millis, TaskId};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors reported to control-surface callers
///
/// None of these are fatal to the scheduler loop.
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum SchedulerError {
    #[error("Task {0} is not registered")]
    #[diagnostic(
        code(scheduler::not_found),
        help("The task may have been deregistered already or never registered.")
    )]
    NotFound(TaskId),

    #[error("Cannot resolve execution context for task {0}")]
    #[diagnostic(
        code(scheduler::unresolved_handle),
        help("The id must name a live process (or an attached worker) at registration time.")
    )]
    UnresolvedHandle(TaskId),

    #[error("Task {0} is already registered")]
    #[diagnostic(
        code(scheduler::already_registered),
        help("Deregister the task before registering it again.")
    )]
    AlreadyRegistered(TaskId),

    #[error("Invalid timing for task {id}: period {period_ms}ms, budget {budget_ms}ms")]
    #[diagnostic(
        code(scheduler::invalid_timing),
        help("Period and budget must both be positive millisecond values.")
    )]
    InvalidTiming {
        id: TaskId,
        period_ms: Millis,
        budget_ms: Millis,
    },

    #[error("Scheduler loop is already running")]
    #[diagnostic(
        code(scheduler::loop_already_started),
        help("Only one scheduler loop may consume a scheduler's events.")
    )]
    LoopAlreadyStarted,

    #[error("Scheduler has been stopped")]
    #[diagnostic(
        code(scheduler::stopped),
        help("The scheduler was shut down; create a new one to accept commands.")
    )]
    Stopped,

    #[error("Internal error: {0}")]
    #[diagnostic(
        code(scheduler::internal_error),
        help("An unexpected internal error occurred. Check the logs for details.")
    )]
    Internal(String),
}

impl From<std::io::Error> for SchedulerError {
    fn from(err: std::io::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

/// Errors raised by a priority controller while changing a task's priority
#[derive(Error, Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Diagnostic)]
#[serde(tag = "error_type", content = "details", rename_all = "snake_case")]
pub enum ControllerError {
    #[error("Execution context {0} no longer exists")]
    #[diagnostic(
        code(controller::handle_gone),
        help("The process exited or the worker detached; the task will be dropped.")
    )]
    HandleGone(ExecHandle),

    #[error("Priority change for {handle} failed: {reason}")]
    #[diagnostic(
        code(controller::os_error),
        help("Raising to a real-time class usually needs CAP_SYS_NICE or root.")
    )]
    Os { handle: ExecHandle, reason: String },
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;
