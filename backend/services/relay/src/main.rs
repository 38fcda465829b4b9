mod connector;
mod datasystem;
mod relay;
mod routes;
mod scheduler;
mod state;
mod sync;

use std::net::SocketAddr;
use std::sync::Arc;

use hubsync_common::types::ServiceInfo;
use hubsync_config::{init_tracing, AppConfig};

use crate::datasystem::client::{DataSystemClient, DataSystemClientConfig};
use crate::relay::client::{RelayClient, RelayClientConfig};
use crate::routes::{build_router, AppState};
use crate::scheduler::{Scheduler, SyncService};
use crate::state::SyncStateStore;
use crate::sync::SyncOrchestrator;

#[tokio::main]
async fn main() {
    init_tracing("info");

    let config = AppConfig::from_env().expect("failed to load config");
    let service_info = ServiceInfo::new("hubsync-relay");
    tracing::info!(
        service = %service_info.name,
        version = %service_info.version,
        instance_id = %service_info.instance_id,
        datasystem = %config.datasystem_base_url,
        utc_offset_hours = config.utc_offset_hours,
        "starting"
    );

    let datasystem = DataSystemClient::new(DataSystemClientConfig::from(&config))
        .expect("failed to create datasystem client");
    let relay =
        RelayClient::new(RelayClientConfig::from(&config)).expect("failed to create relay client");

    let orchestrator = Arc::new(SyncOrchestrator::new(
        datasystem,
        relay,
        config.utc_offset(),
    ));
    let store = Arc::new(SyncStateStore::new());
    let service = SyncService::new(orchestrator, Arc::clone(&store));

    let scheduler = Scheduler::start(service.clone(), Arc::clone(service.store()), config.utc_offset());

    let app = build_router(AppState {
        store,
        trigger: Arc::new(service),
    });

    let addr: SocketAddr = config.bind_addr().parse().expect("invalid bind address");
    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
        })
        .await
        .expect("server error");

    scheduler.shutdown().await;
    tracing::info!("stopped");
}
