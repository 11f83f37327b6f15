/*!
 * Control Surface
 *
 * Serializable commands for driving a scheduler from outside the process
 * boundary: register, yield, deregister, and a status read. Replies carry
 * either the status report or the typed error.
 */

use super::types::StatusReport;
use super::Scheduler;
use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::core::types::{Millis, TaskId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A control request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum ControlCommand {
    Register {
        id: TaskId,
        period_ms: Millis,
        budget_ms: Millis,
    },
    Yield {
        id: TaskId,
    },
    Deregister {
        id: TaskId,
    },
    Status,
}

impl ControlCommand {
    /// Parse the line format `R, <id>, <period>, <budget>` / `Y, <id>` / `D, <id>`
    pub fn parse_line(line: &str) -> Option<Self> {
        let fields: Vec<&str> = line.trim().split(',').map(str::trim).collect();
        let number = |i: usize| fields.get(i)?.parse::<u64>().ok();
        let id = || number(1).and_then(|v| TaskId::try_from(v).ok());

        match (fields.first().copied()?, fields.len()) {
            ("R", 4) => Some(Self::Register {
                id: id()?,
                period_ms: number(2)?,
                budget_ms: number(3)?,
            }),
            ("Y", 2) => Some(Self::Yield { id: id()? }),
            ("D", 2) => Some(Self::Deregister { id: id()? }),
            ("S", 1) => Some(Self::Status),
            _ => None,
        }
    }
}

/// Reply to a [`ControlCommand`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", content = "body", rename_all = "snake_case")]
pub enum ControlReply {
    Done,
    Status(StatusReport),
    Failed(SchedulerError),
}

impl ControlReply {
    pub fn into_result(self) -> SchedulerResult<Option<StatusReport>> {
        match self {
            Self::Done => Ok(None),
            Self::Status(report) => Ok(Some(report)),
            Self::Failed(e) => Err(e),
        }
    }
}

impl From<SchedulerResult<()>> for ControlReply {
    fn from(result: SchedulerResult<()>) -> Self {
        match result {
            Ok(()) => Self::Done,
            Err(e) => Self::Failed(e),
        }
    }
}

impl Scheduler {
    /// Run one control command
    #[tracing::instrument(skip(self))]
    pub fn execute(&self, command: ControlCommand) -> ControlReply {
        let reply = match command {
            ControlCommand::Register {
                id,
                period_ms,
                budget_ms,
            } => self.register(id, period_ms, budget_ms).into(),
            ControlCommand::Yield { id } => self.yield_task(id).into(),
            ControlCommand::Deregister { id } => self.deregister(id).into(),
            ControlCommand::Status => ControlReply::Status(self.status()),
        };
        if let ControlReply::Failed(e) = &reply {
            debug!(error = %e, "Control command failed");
        }
        reply
    }
}
