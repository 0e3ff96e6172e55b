mod auth;
mod config;
mod http;
mod jobs;
mod socket;
mod state;
mod workers;

use std::sync::Arc;

use inbox_coordination::CoordinationStore;
use inbox_eventbus::EventBus;
use inbox_persistence::PostgresStore;
use inbox_providers::{ProviderA, ProviderB};
use inbox_telemetry::TelemetryConfig;
use inbox_types::entities::Provider;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::auth::AuthProvider;
use crate::config::Config;
use crate::socket::ConnectionRegistry;
use crate::state::AppState;

const JOB_QUEUE_CAPACITY: usize = 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    inbox_telemetry::init_telemetry(&TelemetryConfig::from_env())?;
    let config = Arc::new(Config::from_env()?);

    let store = PostgresStore::connect(&config.database_url, config.database_max_connections).await?;
    store.run_migrations().await?;
    let store: Arc<dyn inbox_persistence::Persistence> = Arc::new(store);

    let coordination = Arc::new(CoordinationStore::connect(&config.redis_url, "inbox").await?);
    let bus = Arc::new(EventBus::new(Some(coordination.clone())));

    let mirror_rx = inbox_coordination::spawn_mirror(&coordination).await?;
    inbox_eventbus::spawn_bridge(bus.clone(), mirror_rx);

    let mut providers = inbox_providers::ProviderRegistry::new();
    providers.register(Provider::A, Arc::new(ProviderA::new(config.provider_a_api_base.clone())));
    providers.register(Provider::B, Arc::new(ProviderB::new(config.provider_b_api_base.clone())));
    let providers = Arc::new(providers);

    let auth = Arc::new(AuthProvider::new(config.jwt_secret.clone()));
    let connections = Arc::new(ConnectionRegistry::new());

    let (webhook_tx, webhook_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);
    let (outbound_tx, outbound_rx) = mpsc::channel(JOB_QUEUE_CAPACITY);

    let state = AppState {
        config: config.clone(),
        store,
        coordination,
        bus,
        providers,
        auth,
        connections,
        webhook_jobs: webhook_tx,
        outbound_jobs: outbound_tx,
    };

    workers::webhook_processor::spawn(
        state.clone(),
        webhook_rx,
        config.webhook_worker_concurrency,
        config.webhook_max_attempts,
        config.retry_base_delay,
    );
    workers::outbound_sender::spawn(
        state.clone(),
        outbound_rx,
        config.outbound_worker_concurrency,
        config.outbound_max_attempts,
        config.retry_base_delay,
    );

    let app = http::router(state);
    let listener = TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "inbox-server listening");
    axum::serve(listener, app).await?;

    Ok(())
}
