use anyhow::Context;
use boxoffice_api::{app, worker, AppState};
use boxoffice_booking::{BookingService, LockScope, NotificationDispatcher, RelayPolicy, ShowLocks};
use boxoffice_core::{SeatLayout, UuidKeyIssuer};
use boxoffice_store::app_config::Config;
use boxoffice_store::{DbClient, EventProducer, KafkaMessenger, KafkaSeatLookup, PgBookingStore, RedisIdempotencyRegistry};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boxoffice_api=debug,boxoffice_booking=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Box Office API on port {}", config.server.port);

    let layout = SeatLayout::new(config.venue.rows, config.venue.columns).context("Invalid venue layout")?;

    // Postgres
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;
    let store = Arc::new(PgBookingStore::new(db.pool.clone()));

    // Redis
    let registry = RedisIdempotencyRegistry::new(
        &config.redis.url,
        config.idempotency.retention(),
        config.idempotency.pending_lease(),
    )
    .await
    .context("Failed to connect to Redis")?;

    // Kafka
    let producer = EventProducer::new(&config.kafka.brokers).context("Failed to create Kafka producer")?;

    let dispatcher = Arc::new(
        NotificationDispatcher::new(
            store.clone(),
            Arc::new(UuidKeyIssuer),
            Arc::new(KafkaSeatLookup::new(producer.clone())),
            Arc::new(KafkaMessenger::new(producer)),
        )
        .with_max_attempts(config.outbox.max_attempts),
    );

    let bookings = Arc::new(
        BookingService::new(
            store,
            Arc::new(registry),
            dispatcher.clone(),
            ShowLocks::new(LockScope::PerShow),
            layout,
        )
        .with_unpaid_hold(chrono::Duration::hours(config.business_rules.unpaid_hold_hours as i64)),
    );

    let policy = RelayPolicy {
        batch_size: config.outbox.batch_size,
        max_attempts: config.outbox.max_attempts,
        grace: chrono::Duration::milliseconds(config.outbox.grace_ms as i64),
    };
    tokio::spawn(worker::start_outbox_relay(
        dispatcher,
        policy,
        Duration::from_millis(config.outbox.poll_interval_ms.max(1)),
    ));
    tokio::spawn(worker::start_expiry_sweeper(
        bookings.clone(),
        Duration::from_secs(config.business_rules.sweep_interval_seconds.max(1)),
    ));

    let app = app(AppState::new(bookings));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
