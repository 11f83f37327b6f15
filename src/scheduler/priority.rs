/*!
 * Priority Control
 *
 * Bridges scheduler decisions to the host: a promoted task runs in the
 * highest real-time class, a demoted one returns to baseline. The scheduler
 * guarantees demote-before-promote, so at most one task is elevated.
 */

#[cfg(unix)]
use super::config::SchedulerConfig;
use crate::core::errors::ControllerError;
use crate::core::types::{ExecHandle, TaskId};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tokio::sync::watch;
use tracing::{debug, info};

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::libc;
#[cfg(unix)]
use nix::sys::signal::kill;
#[cfg(unix)]
use nix::unistd::Pid as NixPid;

/// Host-side priority manipulation, consumed by the scheduler
pub trait PriorityController: Send + Sync {
    /// Bind a task id to a live execution context
    fn resolve(&self, id: TaskId) -> Option<ExecHandle>;

    /// Raise to the highest real-time class
    fn promote(&self, handle: ExecHandle) -> Result<(), ControllerError>;

    /// Restore baseline priority
    fn demote(&self, handle: ExecHandle) -> Result<(), ControllerError>;
}

/// Controller for OS processes: ids are pids, promotion means `SCHED_FIFO`
#[cfg(unix)]
#[derive(Debug, Clone)]
pub struct OsPriorityController {
    rt_priority: i32,
}

#[cfg(unix)]
impl OsPriorityController {
    pub fn new(rt_priority: i32) -> Self {
        info!(rt_priority, "OS priority controller initialized");
        Self { rt_priority }
    }

    /// Controller promoting at the configured real-time priority
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.rt_priority)
    }

    pub fn rt_priority(&self) -> i32 {
        self.rt_priority
    }

    /// Policy and priority a promotion applies
    fn promotion(&self) -> (libc::c_int, i32) {
        (libc::SCHED_FIFO, self.rt_priority)
    }

    fn pid(handle: ExecHandle) -> Result<NixPid, ControllerError> {
        i32::try_from(handle.raw())
            .ok()
            .filter(|raw| *raw > 0)
            .map(NixPid::from_raw)
            .ok_or(ControllerError::HandleGone(handle))
    }

    fn set_policy(
        &self,
        handle: ExecHandle,
        policy: libc::c_int,
        priority: i32,
    ) -> Result<(), ControllerError> {
        let pid = Self::pid(handle)?;
        // SAFETY: sched_param is plain data; zeroing also covers libc variants
        // that carry extra fields
        let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
        param.sched_priority = priority;

        // SAFETY: `param` outlives the call and the pid is a plain integer
        let rc = unsafe { libc::sched_setscheduler(pid.as_raw(), policy, &param) };
        if rc == 0 {
            return Ok(());
        }
        match Errno::last() {
            Errno::ESRCH => Err(ControllerError::HandleGone(handle)),
            errno => Err(ControllerError::Os {
                handle,
                reason: errno.desc().to_string(),
            }),
        }
    }
}

#[cfg(unix)]
impl Default for OsPriorityController {
    fn default() -> Self {
        Self::new(99)
    }
}

#[cfg(unix)]
impl PriorityController for OsPriorityController {
    fn resolve(&self, id: TaskId) -> Option<ExecHandle> {
        let handle = ExecHandle::from_raw(u64::from(id));
        let pid = Self::pid(handle).ok()?;
        // Null signal: checks existence only. EPERM still proves the pid is live.
        match kill(pid, None) {
            Ok(()) | Err(Errno::EPERM) => Some(handle),
            Err(_) => None,
        }
    }

    fn promote(&self, handle: ExecHandle) -> Result<(), ControllerError> {
        let (policy, priority) = self.promotion();
        self.set_policy(handle, policy, priority)?;
        debug!(%handle, rt_priority = self.rt_priority, "Promoted to SCHED_FIFO");
        Ok(())
    }

    fn demote(&self, handle: ExecHandle) -> Result<(), ControllerError> {
        self.set_policy(handle, libc::SCHED_OTHER, 0)?;
        debug!(%handle, "Demoted to SCHED_OTHER");
        Ok(())
    }
}

/// Priority change recorded by [`InProcessController`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "task_id", rename_all = "snake_case")]
pub enum PriorityEvent {
    Promoted(TaskId),
    Demoted(TaskId),
}

#[derive(Default)]
struct Journal {
    history: Vec<PriorityEvent>,
    elevated: BTreeSet<TaskId>,
    peak_elevated: usize,
}

/// Controller for in-process workers
///
/// Each attached worker observes a `watch` flag that is `true` while it holds
/// the execution resource. The controller journals every change.
#[derive(Default)]
pub struct InProcessController {
    workers: DashMap<TaskId, watch::Sender<bool>>,
    journal: Mutex<Journal>,
}

impl InProcessController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a worker so `id` can be registered; returns its run flag
    pub fn attach(&self, id: TaskId) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        self.workers.insert(id, tx);
        rx
    }

    /// Detach a worker; later promotions report the handle as gone
    pub fn detach(&self, id: TaskId) -> bool {
        self.workers.remove(&id).is_some()
    }

    pub fn history(&self) -> Vec<PriorityEvent> {
        self.journal.lock().history.clone()
    }

    /// Tasks currently holding elevated priority
    pub fn elevated(&self) -> Vec<TaskId> {
        self.journal.lock().elevated.iter().copied().collect()
    }

    /// Largest number of simultaneously elevated tasks ever observed
    pub fn peak_elevated(&self) -> usize {
        self.journal.lock().peak_elevated
    }

    fn task_id(handle: ExecHandle) -> Result<TaskId, ControllerError> {
        TaskId::try_from(handle.raw()).map_err(|_| ControllerError::HandleGone(handle))
    }
}

impl PriorityController for InProcessController {
    fn resolve(&self, id: TaskId) -> Option<ExecHandle> {
        self.workers
            .contains_key(&id)
            .then(|| ExecHandle::from_raw(u64::from(id)))
    }

    fn promote(&self, handle: ExecHandle) -> Result<(), ControllerError> {
        let id = Self::task_id(handle)?;
        let worker = self
            .workers
            .get(&id)
            .ok_or(ControllerError::HandleGone(handle))?;

        {
            let mut journal = self.journal.lock();
            journal.history.push(PriorityEvent::Promoted(id));
            journal.elevated.insert(id);
            journal.peak_elevated = journal.peak_elevated.max(journal.elevated.len());
        }
        worker.send_replace(true);
        Ok(())
    }

    fn demote(&self, handle: ExecHandle) -> Result<(), ControllerError> {
        let id = Self::task_id(handle)?;
        {
            let mut journal = self.journal.lock();
            journal.history.push(PriorityEvent::Demoted(id));
            journal.elevated.remove(&id);
        }
        // A detached worker is already at baseline
        if let Some(worker) = self.workers.get(&id) {
            worker.send_replace(false);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_requires_attach() {
        let controller = InProcessController::new();
        assert!(controller.resolve(1).is_none());

        let _rx = controller.attach(1);
        assert_eq!(controller.resolve(1), Some(ExecHandle::from_raw(1)));

        assert!(controller.detach(1));
        assert!(controller.resolve(1).is_none());
    }

    #[test]
    fn test_promote_flips_run_flag() {
        let controller = InProcessController::new();
        let rx = controller.attach(3);
        let handle = ExecHandle::from_raw(3);

        controller.promote(handle).unwrap();
        assert!(*rx.borrow());
        assert_eq!(controller.elevated(), vec![3]);

        controller.demote(handle).unwrap();
        assert!(!*rx.borrow());
        assert!(controller.elevated().is_empty());
        assert_eq!(
            controller.history(),
            vec![PriorityEvent::Promoted(3), PriorityEvent::Demoted(3)]
        );
    }

    #[test]
    fn test_promote_detached_is_handle_gone() {
        let controller = InProcessController::new();
        let handle = ExecHandle::from_raw(8);
        assert_eq!(
            controller.promote(handle),
            Err(ControllerError::HandleGone(handle))
        );
        // Demoting something that is gone is harmless
        assert!(controller.demote(handle).is_ok());
    }

    #[test]
    fn test_peak_elevated_tracks_overlap() {
        let controller = InProcessController::new();
        let _a = controller.attach(1);
        let _b = controller.attach(2);

        controller.promote(ExecHandle::from_raw(1)).unwrap();
        controller.demote(ExecHandle::from_raw(1)).unwrap();
        controller.promote(ExecHandle::from_raw(2)).unwrap();
        assert_eq!(controller.peak_elevated(), 1);

        controller.promote(ExecHandle::from_raw(1)).unwrap();
        assert_eq!(controller.peak_elevated(), 2);
    }

    #[test]
    fn test_priority_event_serialization() {
        let json = serde_json::to_string(&PriorityEvent::Promoted(4)).unwrap();
        assert_eq!(json, r#"{"event":"promoted","task_id":4}"#);
    }

    #[cfg(unix)]
    #[test]
    fn test_os_resolve_own_pid() {
        let controller = OsPriorityController::default();
        let pid = std::process::id();
        assert_eq!(
            controller.resolve(pid),
            Some(ExecHandle::from_raw(u64::from(pid)))
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_os_promotes_at_configured_priority() {
        let config = SchedulerConfig::default().with_rt_priority(42);
        let controller = OsPriorityController::from_config(&config);
        assert_eq!(controller.rt_priority(), 42);
        assert_eq!(controller.promotion(), (libc::SCHED_FIFO, 42));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_os_promotion_reaches_the_kernel() {
        let config = SchedulerConfig::default().with_rt_priority(42);
        let controller = OsPriorityController::from_config(&config);
        let pid = std::process::id();
        let handle = ExecHandle::from_raw(u64::from(pid));

        // Unprivileged runs get EPERM; only a successful promotion is checked
        if controller.promote(handle).is_err() {
            return;
        }
        let raw = pid as libc::pid_t;
        // SAFETY: plain syscalls on our own pid with a live out-parameter
        let (policy, priority) = unsafe {
            let mut param: libc::sched_param = std::mem::zeroed();
            let policy = libc::sched_getscheduler(raw);
            libc::sched_getparam(raw, &mut param);
            (policy, param.sched_priority)
        };
        controller.demote(handle).unwrap();
        assert_eq!(policy, libc::SCHED_FIFO);
        assert_eq!(priority, 42);
    }

    #[cfg(unix)]
    #[test]
    fn test_os_rejects_unrepresentable_ids() {
        let controller = OsPriorityController::default();
        assert!(controller.resolve(0).is_none());
        assert!(controller.resolve(u32::MAX).is_none());
        assert_eq!(
            controller.promote(ExecHandle::from_raw(0)),
            Err(ControllerError::HandleGone(ExecHandle::from_raw(0)))
        );
    }
}
