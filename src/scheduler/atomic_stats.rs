/*!
 * Lock-Free Scheduler Statistics
 * Atomic counters updated from the scheduling and timer paths
 */

use super::types::SchedulerStats;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Atomic scheduler statistics
///
/// # Performance
/// - Cache-line aligned to prevent false sharing
/// - Relaxed ordering; a snapshot is per-counter accurate, not globally consistent
#[repr(C, align(64))]
#[derive(Debug, Default)]
pub struct AtomicSchedulerStats {
    dispatches: AtomicU64,
    context_switches: AtomicU64,
    preemptions: AtomicU64,
    overruns: AtomicU64,
    skipped_releases: AtomicU64,
    evaluations: AtomicU64,
    active_tasks: AtomicUsize,
}

impl AtomicSchedulerStats {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline(always)]
    pub fn inc_dispatches(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_context_switches(&self) {
        self.context_switches.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_preemptions(&self) {
        self.preemptions.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_overruns(&self) {
        self.overruns.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn add_skipped_releases(&self, count: u64) {
        if count > 0 {
            self.skipped_releases.fetch_add(count, Ordering::Relaxed);
        }
    }

    #[inline(always)]
    pub fn inc_evaluations(&self) {
        self.evaluations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn inc_active(&self) {
        self.active_tasks.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn dec_active(&self) {
        self.active_tasks.fetch_sub(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            context_switches: self.context_switches.load(Ordering::Relaxed),
            preemptions: self.preemptions.load(Ordering::Relaxed),
            overruns: self.overruns.load(Ordering::Relaxed),
            skipped_releases: self.skipped_releases.load(Ordering::Relaxed),
            active_tasks: self.active_tasks.load(Ordering::Relaxed),
            evaluations: self.evaluations.load(Ordering::Relaxed),
        }
    }
}
