/*!
 * rmsd - Rate-Monotonic Scheduler Demo
 *
 * Runs a task set of in-process workers under the scheduler:
 * - Each worker waits for promotion, burns its budget, then yields
 * - Stops on Ctrl-C or after RMS_DEMO_SECS (default: 5)
 * - Task set from RMS_DEMO_TASKS as `id:period_ms:budget_ms,...`
 */

use miette::{miette, IntoDiagnostic, Result, WrapErr};
use rms_kernel::{
    init_tracing, InProcessController, Millis, Scheduler, SchedulerConfig, SchedulerError,
    SchedulerService, TaskId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

const DEFAULT_TASKS: &str = "1:450:300,2:200:100";
const DEFAULT_SECS: u64 = 5;

/// Granularity of simulated work
const WORK_SLICE: Duration = Duration::from_millis(5);

#[derive(Debug, Clone, Copy)]
struct DemoTask {
    id: TaskId,
    period_ms: Millis,
    budget_ms: Millis,
}

fn parse_tasks(raw: &str) -> Result<Vec<DemoTask>> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let fields: Vec<&str> = entry.split(':').collect();
            let [id, period, budget] = fields.as_slice() else {
                return Err(miette!("Task '{}' is not id:period_ms:budget_ms", entry));
            };
            Ok(DemoTask {
                id: id
                    .parse()
                    .into_diagnostic()
                    .wrap_err_with(|| format!("Bad task id in '{}'", entry))?,
                period_ms: period
                    .parse()
                    .into_diagnostic()
                    .wrap_err_with(|| format!("Bad period in '{}'", entry))?,
                budget_ms: budget
                    .parse()
                    .into_diagnostic()
                    .wrap_err_with(|| format!("Bad budget in '{}'", entry))?,
            })
        })
        .collect()
}

async fn run_worker(
    scheduler: Scheduler,
    id: TaskId,
    budget: Duration,
    mut run: watch::Receiver<bool>,
) {
    loop {
        if run.wait_for(|running| *running).await.is_err() {
            return;
        }

        // Only time spent holding the resource counts against the budget
        let mut used = Duration::ZERO;
        while used < budget {
            let holding = *run.borrow();
            if !holding && run.wait_for(|running| *running).await.is_err() {
                return;
            }
            let slice = WORK_SLICE.min(budget - used);
            tokio::time::sleep(slice).await;
            used += slice;
        }

        match scheduler.yield_task(id) {
            Ok(()) => debug!(task_id = id, "Job complete"),
            Err(SchedulerError::Stopped) => return,
            Err(e) => {
                warn!(task_id = id, error = %e, "Worker yield failed");
                return;
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = SchedulerConfig::from_env();
    let tasks = parse_tasks(
        &std::env::var("RMS_DEMO_TASKS").unwrap_or_else(|_| DEFAULT_TASKS.to_string()),
    )?;
    let secs = std::env::var("RMS_DEMO_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SECS);

    info!(tasks = tasks.len(), secs, "rmsd starting");

    let controller = Arc::new(InProcessController::new());
    let scheduler = Scheduler::builder(controller.clone())
        .config(config)
        .build()?;
    let service = SchedulerService::start(scheduler.clone())?;

    let mut workers = Vec::with_capacity(tasks.len());
    for task in &tasks {
        let run = controller.attach(task.id);
        scheduler.register(task.id, task.period_ms, task.budget_ms)?;
        workers.push(tokio::spawn(run_worker(
            scheduler.clone(),
            task.id,
            Duration::from_millis(task.budget_ms),
            run,
        )));
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
        _ = tokio::time::sleep(Duration::from_secs(secs)) => info!("Demo period elapsed"),
    }

    print!("{}", scheduler.status());
    println!(
        "{}",
        serde_json::to_string_pretty(&scheduler.stats()).into_diagnostic()?
    );
    info!(
        peak_elevated = controller.peak_elevated(),
        "Priority changes observed"
    );

    tokio::task::spawn_blocking(move || service.shutdown())
        .await
        .into_diagnostic()?;
    for worker in workers {
        worker.abort();
    }

    info!("rmsd stopped");
    Ok(())
}
