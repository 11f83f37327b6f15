/*!
 * Scheduler Service - Dispatch Loop Thread
 *
 * Dedicated thread that sleeps until woken, then runs one evaluation.
 * Wakes arrive from timer releases, yields, and deregistrations; bursts of
 * wakes collapse into a single evaluation.
 */

use super::types::SchedulerEvent;
use super::Scheduler;
use crate::core::errors::{SchedulerError, SchedulerResult};
use crate::monitoring::EvaluationSpan;
use std::thread::{self, JoinHandle};
use tracing::{info, trace, warn};

/// Handle to the running scheduler loop
pub struct SchedulerService {
    scheduler: Scheduler,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerService {
    /// Start the loop; a scheduler supports one loop for its lifetime
    pub fn start(scheduler: Scheduler) -> SchedulerResult<Self> {
        let events = scheduler
            .take_events()
            .ok_or(SchedulerError::LoopAlreadyStarted)?;

        let worker = scheduler.clone();
        let handle = thread::Builder::new()
            .name("rms-scheduler".into())
            .spawn(move || run_scheduler_loop(worker, events))?;

        // Pick up anything released before the loop existed
        scheduler.wake();
        info!("Scheduler loop spawned");

        Ok(Self {
            scheduler,
            handle: Some(handle),
        })
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Force an evaluation
    pub fn trigger(&self) {
        self.scheduler.wake();
    }

    /// Stop the scheduler and wait for the loop to exit
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.scheduler.shutdown();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Scheduler loop panicked during shutdown");
            } else {
                info!("Scheduler loop shutdown complete");
            }
        }
    }
}

fn run_scheduler_loop(scheduler: Scheduler, events: flume::Receiver<SchedulerEvent>) {
    info!("Scheduler loop started");

    while let Ok(event) = events.recv() {
        if event == SchedulerEvent::Stop {
            break;
        }
        // Coalesce the backlog; one evaluation covers all of it
        if events.try_iter().any(|e| e == SchedulerEvent::Stop) {
            break;
        }

        let span = EvaluationSpan::new();
        let running = scheduler.evaluate();
        span.record_running(running);
        if let Some(id) = running {
            trace!(task_id = id, "Evaluation complete");
        }
    }

    info!("Scheduler loop exiting");
}

impl Drop for SchedulerService {
    fn drop(&mut self) {
        if self.handle.is_some() {
            warn!("SchedulerService dropped without shutdown(); stopping now");
            self.stop();
        }
    }
}
