use crate::dial_eye::DialReader;
use crate::publisher::Publisher;
use crate::update_coordinator::TriggerHandle;
use crate::update_orchestrator::UpdateOrchestrator;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::info;

pub struct StatusPage<R, P> {
    orchestrator: Arc<UpdateOrchestrator<R, P>>,
    triggers: TriggerHandle,
    image_path: String,
}

/// Builds the HTTP routes: status page, on-demand update, counters, health and the
/// rendered dial images under `/static`.
pub fn router<R: DialReader, P: Publisher>(
    orchestrator: Arc<UpdateOrchestrator<R, P>>,
    triggers: TriggerHandle,
    web_static_dir: &Path,
    meter_id: &str,
) -> Router {
    let state = Arc::new(StatusPage {
        orchestrator,
        triggers,
        image_path: format!("/static/{meter_id}.jpg"),
    });

    Router::new()
        .route("/", get(index::<R, P>))
        .route("/update", get(request_update::<R, P>))
        .route("/metrics", get(metrics::<R, P>))
        .route("/healthy", get(|| async { "OK" }))
        .nest_service("/static", ServeDir::new(web_static_dir))
        .with_state(state)
}

pub async fn serve(
    listener: TcpListener,
    router: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    info!("Status page listening on {}", listener.local_addr()?);
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn index<R: DialReader, P: Publisher>(
    State(page): State<Arc<StatusPage<R, P>>>,
) -> Html<String> {
    page.orchestrator.refresh_image().await;
    let value = page.orchestrator.current_value().await;
    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>dialeye2mqtt</title></head>\n<body>\n\
         <h1>Water meter</h1>\n\
         <p>Current value: <b>{value:.5}</b> m&sup3;</p>\n\
         <img src=\"{}\" alt=\"dial\">\n\
         </body>\n</html>\n",
        page.image_path
    ))
}

async fn request_update<R: DialReader, P: Publisher>(
    State(page): State<Arc<StatusPage<R, P>>>,
) -> impl IntoResponse {
    if page.triggers.request_update() {
        (StatusCode::ACCEPTED, "Update requested")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "Update not queued")
    }
}

async fn metrics<R: DialReader, P: Publisher>(
    State(page): State<Arc<StatusPage<R, P>>>,
) -> String {
    let stats = page.orchestrator.stats();
    format!(
        "successful_fetches_total {}\nfetch_errors_total {}\n",
        stats.successful_fetches, stats.fetch_errors
    )
}
