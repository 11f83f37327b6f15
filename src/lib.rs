/*!
 * Rate-Monotonic Kernel Library
 * Fixed-priority periodic task scheduling exposed as a library
 */

pub mod core;
pub mod monitoring;
pub mod scheduler;

// Re-exports
pub use crate::core::errors::*;
pub use crate::core::types::{ExecHandle, Millis, TaskId, TaskState};
pub use monitoring::init_tracing;
pub use scheduler::{
    ControlCommand, ControlReply, InProcessController, InitialRelease, PriorityController,
    Scheduler, SchedulerBuilder, SchedulerConfig, SchedulerService, SchedulerStats, StatusReport,
    TaskStatus, VirtualTime,
};
#[cfg(unix)]
pub use scheduler::OsPriorityController;
