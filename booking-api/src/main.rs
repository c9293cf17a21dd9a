use anyhow::Context;
use booking_api::{app, AppState};
use booking_core::{BookingService, BookingStore, CircuitBreaker, InMemoryBookingStore};
use booking_store::app_config::Config;
use booking_store::{DbClient, HttpFlightClient, PostgresBookingStore};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "booking_api=debug,booking_core=debug,booking_store=info,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting booking service on port {}", config.server.port);

    let store: Arc<dyn BookingStore> = match &config.database.url {
        Some(url) => {
            let db = DbClient::new(url, config.database.max_connections)
                .await
                .context("Failed to connect to Postgres")?;
            if config.database.run_migrations {
                db.migrate().await.context("Failed to run migrations")?;
            }
            Arc::new(PostgresBookingStore::new(db.pool.clone()))
        }
        None => {
            tracing::warn!("No database.url configured, bookings are kept in memory");
            Arc::new(InMemoryBookingStore::new())
        }
    };

    let flight_client = HttpFlightClient::new(
        &config.flight_service.base_url,
        config.flight_service.timeout(),
    )
    .context("Failed to build flight service client")?;
    tracing::info!("Flight service at {}", config.flight_service.base_url);

    let breaker = CircuitBreaker::with_config("flightClient", (&config.circuit_breaker).into());
    let service = BookingService::new(Arc::new(flight_client), store, Arc::new(breaker));

    let app = app(AppState::new(service));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
