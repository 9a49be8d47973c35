use boxoffice_booking::{BookingService, NotificationDispatcher, RelayPolicy};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info};

/// Re-sends outbox entries the post-commit dispatch could not deliver.
pub async fn start_outbox_relay(
    dispatcher: Arc<NotificationDispatcher>,
    policy: RelayPolicy,
    poll_interval: Duration,
) {
    info!("Outbox relay started, polling every {:?}", poll_interval);
    let mut ticker = interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match dispatcher.relay_pending(&policy, Utc::now()).await {
            Ok(report) if report.delivered + report.failed > 0 => {
                info!(
                    "Outbox relay pass: {} delivered, {} failed, {} skipped",
                    report.delivered, report.failed, report.skipped
                );
            }
            Ok(_) => {}
            Err(e) => error!("Outbox relay failed to read pending entries: {}", e),
        }
    }
}

/// Releases unpaid bookings once their hold has run out.
pub async fn start_expiry_sweeper(bookings: Arc<BookingService>, every: Duration) {
    info!("Expiry sweeper started, running every {:?}", every);
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        if let Err(e) = bookings.expire_stale(Utc::now()).await {
            error!("Expiry sweep failed: {}", e);
        }
    }
}
