//! Daily scheduler for service mode

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use tracing::{debug, info};

/// Longest single sleep; the wall clock is re-read after each one so clock
/// changes and suspend are picked up.
const MAX_SLEEP: Duration = Duration::from_secs(60);

/// The first instant strictly after `now` whose local time is `at`
pub fn next_run_after<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let tz = now.timezone();
    let today = now.date_naive();

    (0..=2)
        .filter_map(|offset| today.checked_add_days(Days::new(offset)))
        .filter_map(|date| tz.from_local_datetime(&date.and_time(at)).earliest())
        .find(|candidate| candidate > now)
        .unwrap_or_else(|| now.clone() + chrono::Duration::days(1))
}

/// Run `job` every day at local time `at` until `shutdown_signal` resolves.
///
/// A job already running is never interrupted.
pub async fn run_daily<J, F, S, SF>(
    at: NaiveTime,
    mut job: J,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    J: FnMut() -> F,
    F: Future<Output = ()>,
    S: Fn(Duration) -> SF,
    SF: Future<Output = ()>,
{
    info!(schedule_time = %at.format("%H:%M"), "Scheduler starting...");

    loop {
        let next_run = next_run_after(&Local::now(), at);
        info!(next_run = %next_run.format("%Y-%m-%d %H:%M:%S"), "Next backup job scheduled");

        loop {
            let remaining = (next_run - Local::now()).to_std().unwrap_or(Duration::ZERO);
            if remaining.is_zero() {
                break;
            }

            tokio::select! {
                _ = &mut shutdown_signal => {
                    info!("Scheduler shutting down...");
                    return;
                }
                _ = sleep_fn(remaining.min(MAX_SLEEP)) => {
                    debug!(remaining_secs = remaining.as_secs(), "Waiting for schedule");
                }
            }
        }

        job().await;
    }
}
