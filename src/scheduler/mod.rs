/*!
 * Rate-Monotonic Scheduler
 *
 * Periodic tasks arbitrate one execution resource; among READY tasks the
 * shortest period wins.
 *
 * # Locking
 * - Registry: blocking mutex, held by control operations and evaluations.
 *   Every priority change happens under it, so demote/promote never interleave.
 * - Dispatch (run queue + running slot): `spin::Mutex` with short critical
 *   sections; the only lock a timer callback takes.
 * - Order is always registry, then dispatch. Timer cancellation never runs
 *   under the dispatch lock.
 */

use crate::core::time::{Clock, SystemClock};
use crate::core::errors::SchedulerResult;
use parking_lot::Mutex;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

pub mod atomic_stats;
pub mod config;
pub mod control;
pub mod dispatch;
pub mod priority;
pub mod registry;
pub mod run_queue;
pub mod service;
pub mod sim;
pub mod task;
pub mod timer;
pub mod types;

mod operations;

// Re-export public API
pub use atomic_stats::AtomicSchedulerStats;
pub use config::{InitialRelease, SchedulerConfig};
pub use control::{ControlCommand, ControlReply};
pub use dispatch::{Decision, Dispatch, YieldOutcome};
pub use priority::{InProcessController, PriorityController, PriorityEvent};
#[cfg(unix)]
pub use priority::OsPriorityController;
pub use registry::Registry;
pub use run_queue::RunQueue;
pub use service::SchedulerService;
pub use sim::VirtualTime;
pub use task::{advance_release, SchedState, TaskRecord};
pub use timer::{ThreadTimer, TimerCallback, TimerService};
pub use types::{SchedulerEvent, SchedulerStats, StatusReport, TaskStatus};

/// State shared by every handle to one scheduler
struct Shared {
    config: SchedulerConfig,
    registry: Mutex<Registry>,
    dispatch: spin::Mutex<Dispatch>,
    events: flume::Sender<SchedulerEvent>,
    /// Receiving end, claimed by the scheduler loop
    receiver: Mutex<Option<flume::Receiver<SchedulerEvent>>>,
    timers: Arc<dyn TimerService>,
    clock: Arc<dyn Clock>,
    controller: Arc<dyn PriorityController>,
    stats: AtomicSchedulerStats,
    stopped: AtomicBool,
}

/// Process-wide scheduler context
///
/// Cheap to clone; all clones drive the same registry and run queue.
/// Construct with [`Scheduler::builder`] and tear down with
/// [`Scheduler::shutdown`].
#[derive(Clone)]
pub struct Scheduler {
    inner: Arc<Shared>,
}

impl Scheduler {
    pub fn builder(controller: Arc<dyn PriorityController>) -> SchedulerBuilder {
        SchedulerBuilder::new(controller)
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }
}

/// Builder for [`Scheduler`]
///
/// Defaults: [`SchedulerConfig::default`], the host clock, and a
/// [`ThreadTimer`].
pub struct SchedulerBuilder {
    config: SchedulerConfig,
    controller: Arc<dyn PriorityController>,
    clock: Option<Arc<dyn Clock>>,
    timers: Option<Arc<dyn TimerService>>,
}

impl SchedulerBuilder {
    pub fn new(controller: Arc<dyn PriorityController>) -> Self {
        Self {
            config: SchedulerConfig::default(),
            controller,
            clock: None,
            timers: None,
        }
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn timers(mut self, timers: Arc<dyn TimerService>) -> Self {
        self.timers = Some(timers);
        self
    }

    /// Use one virtual time source as both clock and timer service
    pub fn virtual_time(self, time: &VirtualTime) -> Self {
        self.clock(Arc::new(time.clone()))
            .timers(Arc::new(time.clone()))
    }

    pub fn build(self) -> SchedulerResult<Scheduler> {
        let timers: Arc<dyn TimerService> = match self.timers {
            Some(timers) => timers,
            None => Arc::new(ThreadTimer::spawn()?),
        };
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let (events, receiver) = flume::unbounded();

        info!(
            tick_us = self.config.tick.as_micros() as u64,
            rt_priority = self.config.rt_priority,
            initial_release = ?self.config.initial_release,
            "Rate-monotonic scheduler initialized"
        );

        Ok(Scheduler {
            inner: Arc::new(Shared {
                config: self.config,
                registry: Mutex::new(Registry::new()),
                dispatch: spin::Mutex::new(Dispatch::new()),
                events,
                receiver: Mutex::new(Some(receiver)),
                timers,
                clock,
                controller: self.controller,
                stats: AtomicSchedulerStats::new(),
                stopped: AtomicBool::new(false),
            }),
        })
    }
}
