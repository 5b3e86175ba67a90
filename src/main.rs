use anyhow::Context;
use dialeye2mqtt::update_orchestrator::{restore_meter, OrchestratorSettings};
use dialeye2mqtt::{
    status_page, Config, DialEye, HomeAssistantAPI, SnapshotStore, UpdateCoordinator,
    UpdateOrchestrator,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting dialeye2mqtt {}", env!("CARGO_PKG_VERSION"));
    let config = Config::from_env()?;

    let store = SnapshotStore::new(&config.data_file);
    let meter = restore_meter(&store, config.dial, config.m3_init_value).await;

    let orchestrator = Arc::new(UpdateOrchestrator::new(
        DialEye::new(&config),
        HomeAssistantAPI::new(&config),
        store,
        meter,
        OrchestratorSettings::from(&config),
    ));
    let coordinator = UpdateCoordinator::start(orchestrator.clone(), config.update_interval);

    let router = status_page::router(
        orchestrator,
        coordinator.trigger_handle(),
        &config.web_static_dir,
        &config.meter_id,
    );
    let listener = TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("Cannot bind status page to port {}", config.http_port))?;
    let (stop_http, http_stopped) = oneshot::channel::<()>();
    let http_server = tokio::spawn(status_page::serve(listener, router, async move {
        let _ = http_stopped.await;
    }));

    tokio::signal::ctrl_c()
        .await
        .context("Cannot listen for shutdown signal")?;
    info!("Shutdown requested");

    coordinator.shutdown().await;
    let _ = stop_http.send(());
    match http_server.await {
        Ok(Err(e)) => error!("Status page failed: {e:#}"),
        Err(e) => error!("Status page task failed: {e}"),
        Ok(Ok(())) => {}
    }

    Ok(())
}
