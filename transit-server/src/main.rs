use std::error::Error;
use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use transit_server::clock::SystemClock;
use transit_server::config::AppConfig;
use transit_server::graph::ReferenceData;
use transit_server::notify::{BroadcastPublisher, LogNotifier};
use transit_server::store::{MemoryStore, TimedStore};
use transit_server::sweep::Scheduler;
use transit_server::web::{AppState, create_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("transit_server=info,tower_http=info")),
        )
        .init();

    let config = AppConfig::from_env()?;

    let data = match &config.data_path {
        Some(path) => {
            let data = ReferenceData::load(path)?;
            info!(
                path = %path.display(),
                stops = data.stops.len(),
                lines = data.lines.len(),
                trips = data.trips.len(),
                "loaded reference data"
            );
            data
        }
        None => {
            warn!("TRANSIT_DATA not set, starting with an empty network");
            ReferenceData::default()
        }
    };

    let store = Arc::new(TimedStore::new(Arc::new(MemoryStore::new()), config.store_timeout()));
    let publisher = BroadcastPublisher::new(config.notification.event_buffer);
    let (state, sweepers) = AppState::wire(
        &config,
        data,
        store,
        Arc::new(publisher),
        Arc::new(LogNotifier),
        Arc::new(SystemClock),
    );

    let scheduler = Scheduler::start(&config.sweep, sweepers);
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!(addr = %config.addr, "transit server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await?;

    scheduler.stop().await;
    Ok(())
}
