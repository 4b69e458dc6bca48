pub mod generator;
pub mod job;
pub mod publisher;
pub mod schedule;
pub mod scraper;
pub mod seen;

use std::pin::pin;

use time::OffsetDateTime;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info};

use crate::job::PublicationJob;
use crate::schedule::{HourMinute, Schedule};

pub const PROJECT_NAME: &str = "trendpost-bot";
pub const LOG_TARGET: &str = "trendpost_bot::main";

pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Poll `schedule` every [`POLL_INTERVAL`] and run `job` whenever a trigger
/// is due, until `shutdown` completes.
///
/// The job is awaited inline, so polling pauses while it runs and two runs
/// never overlap. `shutdown` is only observed between polls: a job that has
/// started always finishes, including saving the seen set.
pub async fn run_scheduler_loop<C, S>(
    mut schedule: Schedule,
    job: &mut PublicationJob,
    clock: C,
    shutdown: S,
) where
    C: Fn() -> OffsetDateTime,
    S: Future<Output = ()>,
{
    let mut ticker = interval(POLL_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut shutdown = pin!(shutdown);

    log_next_due(&schedule, clock());

    loop {
        tokio::select! {
            _ = ticker.tick() => {},
            () = &mut shutdown => {
                info!(target: LOG_TARGET, "Shutdown requested, leaving scheduler loop");
                return;
            }
        }

        let now = clock();
        if !schedule.poll(now) {
            continue;
        }

        info!(target: LOG_TARGET, at = %HourMinute(now.time()), "Trigger due, running publication job");
        let outcome = job.run().await;
        info!(target: LOG_TARGET, %outcome, "Scheduled publication job finished");

        log_next_due(&schedule, clock());
    }
}

fn log_next_due(schedule: &Schedule, now: OffsetDateTime) {
    match schedule.next_due(now) {
        Some(next) => {
            info!(target: LOG_TARGET, next = %next, "Waiting for next trigger");
        }
        None => {
            debug!(target: LOG_TARGET, "No triggers configured");
        }
    }
}
