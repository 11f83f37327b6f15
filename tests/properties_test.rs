/*!
 * Scheduler Property Tests
 * Random command sequences must preserve queue order and single occupancy
 */

use proptest::prelude::*;
use rms_kernel::scheduler::{InProcessController, Scheduler, VirtualTime};
use rms_kernel::TaskState;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
enum Op {
    Register { id: u32, period_ms: u64 },
    Yield(u32),
    Deregister(u32),
    Advance(u64),
    Evaluate,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0u32..6, 1u64..500).prop_map(|(id, period_ms)| Op::Register { id, period_ms }),
        (0u32..6).prop_map(Op::Yield),
        (0u32..6).prop_map(Op::Deregister),
        (1u64..300).prop_map(Op::Advance),
        Just(Op::Evaluate),
    ]
}

proptest! {
    #[test]
    fn prop_queue_sorted_and_single_runner(ops in prop::collection::vec(op(), 1..80)) {
        let controller = Arc::new(InProcessController::new());
        let time = VirtualTime::new();
        let scheduler = Scheduler::builder(controller.clone())
            .virtual_time(&time)
            .build()
            .unwrap();
        for id in 0..6 {
            drop(controller.attach(id));
        }

        for op in ops {
            // Command errors (duplicates, unknown ids) are part of the input space
            let _ = match op {
                Op::Register { id, period_ms } => {
                    scheduler.register(id, period_ms, (period_ms / 2).max(1))
                }
                Op::Yield(id) => scheduler.yield_task(id),
                Op::Deregister(id) => scheduler.deregister(id),
                Op::Advance(ms) => {
                    time.advance(Duration::from_millis(ms));
                    Ok(())
                }
                Op::Evaluate => {
                    scheduler.evaluate();
                    Ok(())
                }
            };

            prop_assert!(scheduler.run_queue_ordered());

            let report = scheduler.status();
            let running: Vec<u32> = report
                .tasks
                .iter()
                .filter(|t| t.state == TaskState::Running)
                .map(|t| t.id)
                .collect();
            prop_assert!(running.len() <= 1);
            prop_assert_eq!(running.first().copied(), scheduler.running());
            prop_assert!(controller.elevated().len() <= 1);

            for id in scheduler.run_queue_ids() {
                prop_assert_eq!(scheduler.state_of(id), Some(TaskState::Ready));
            }
        }

        prop_assert!(controller.peak_elevated() <= 1);
    }

    #[test]
    fn prop_next_release_is_smallest_future_boundary(
        period_ms in 1u64..1000,
        late_ms in 0u64..5000,
    ) {
        let controller = Arc::new(InProcessController::new());
        let time = VirtualTime::new();
        let scheduler = Scheduler::builder(controller.clone())
            .virtual_time(&time)
            .build()
            .unwrap();
        drop(controller.attach(1));
        scheduler.register(1, period_ms, 1).unwrap();

        time.advance(Duration::from_millis(period_ms + late_ms));
        prop_assert_eq!(scheduler.evaluate(), Some(1));

        let elapsed = period_ms + late_ms;
        let expected = (elapsed / period_ms + 1) * period_ms - elapsed;
        let status = scheduler.find(1).unwrap();
        prop_assert_eq!(status.next_release_in_ms, expected);
        prop_assert_eq!(status.skipped_releases, elapsed / period_ms - 1);
    }
}
