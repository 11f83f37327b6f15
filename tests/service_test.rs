/*!
 * Service Tests
 * Real timer thread plus scheduler loop, observed by polling
 */

use rms_kernel::scheduler::{InProcessController, PriorityEvent, Scheduler, SchedulerService};
use rms_kernel::{ControlCommand, ControlReply, TaskState};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        thread::sleep(Duration::from_millis(1));
    }
    cond()
}

fn start() -> (SchedulerService, Arc<InProcessController>) {
    let controller = Arc::new(InProcessController::new());
    let scheduler = Scheduler::builder(controller.clone()).build().unwrap();
    let service = SchedulerService::start(scheduler).unwrap();
    (service, controller)
}

#[test]
fn test_periodic_task_dispatched_every_period() {
    let (service, controller) = start();
    let scheduler = service.scheduler().clone();
    let _run = controller.attach(1);

    scheduler.register(1, 100, 5).unwrap();
    assert!(wait_until(Duration::from_secs(2), || scheduler.running() == Some(1)));

    scheduler.yield_task(1).unwrap();
    assert_eq!(scheduler.state_of(1), Some(TaskState::Sleeping));

    assert!(wait_until(Duration::from_secs(2), || {
        scheduler.find(1).map(|t| t.dispatches).unwrap_or(0) >= 2
    }));
    assert_eq!(scheduler.running(), Some(1));
    service.shutdown();
}

#[test]
fn test_shorter_period_preempts_under_real_time() {
    let (service, controller) = start();
    let scheduler = service.scheduler().clone();
    let _slow = controller.attach(1);
    let _fast = controller.attach(2);

    scheduler.register(1, 30, 25).unwrap();
    assert!(wait_until(Duration::from_secs(2), || scheduler.running() == Some(1)));

    // Task 1 keeps the resource; task 2's first release must take it away
    scheduler.register(2, 10, 2).unwrap();
    assert!(wait_until(Duration::from_secs(2), || scheduler.running() == Some(2)));
    assert_eq!(scheduler.state_of(1), Some(TaskState::Ready));

    let history = controller.history();
    let promoted_fast = history
        .iter()
        .position(|e| *e == PriorityEvent::Promoted(2))
        .unwrap();
    assert_eq!(history[promoted_fast - 1], PriorityEvent::Demoted(1));
    assert!(controller.peak_elevated() <= 1);
    service.shutdown();
}

#[test]
fn test_control_commands_through_service() {
    let (service, controller) = start();
    let scheduler = service.scheduler().clone();
    let _run = controller.attach(9);

    let line = ControlCommand::parse_line("R, 9, 50, 10").unwrap();
    assert_eq!(scheduler.execute(line), ControlReply::Done);
    let report = scheduler
        .execute(ControlCommand::Status)
        .into_result()
        .unwrap()
        .unwrap();
    assert_eq!(report.to_string(), "PID:9, P:50, C:10\n");

    let line = ControlCommand::parse_line("D, 9").unwrap();
    assert_eq!(scheduler.execute(line), ControlReply::Done);
    service.shutdown();
}

#[test]
fn test_no_promotions_after_shutdown() {
    let (service, controller) = start();
    let scheduler = service.scheduler().clone();
    let _run = controller.attach(1);

    scheduler.register(1, 5, 1).unwrap();
    assert!(wait_until(Duration::from_secs(2), || scheduler.running() == Some(1)));
    service.shutdown();

    let settled = controller.history().len();
    assert!(controller.elevated().is_empty());
    thread::sleep(Duration::from_millis(30));
    assert_eq!(controller.history().len(), settled);
}
