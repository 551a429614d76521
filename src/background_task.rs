use tokio::time::{interval, Duration, MissedTickBehavior};

use crate::use_cases::apod::{ApodHandler, RefreshOutcome};

/// Keeps today's picture warm so the first request of the day is served
/// from the store. Runs until the process exits.
pub async fn start_refresh_task(apod_handler: ApodHandler, every: Duration) {
    let mut interval = interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        interval.tick().await;

        match apod_handler.refresh_today().await {
            RefreshOutcome::AlreadyCached(date) => tracing::debug!("Picture for {} already cached", date),
            RefreshOutcome::Stored(date) => tracing::info!("Stored picture for {}", date),
            RefreshOutcome::Unavailable => tracing::warn!("Today's picture is not available upstream yet"),
        }
    }
}
