//! Taskwarden HTTP surface: webhook ingress plus the internal scheduling
//! API. Everything here is thin transport wiring over
//! [`taskwarden_core`]; the decision layer itself never sees axum types.

pub mod error;
pub mod routes;
pub mod state;

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::{AppState, Scheduler};

/// Build the axum Router with all API routes and middleware.
/// Used by `serve()` and available for integration testing.
pub fn build_router(scheduler: Arc<Scheduler>) -> Router {
    let app_state = AppState::new(scheduler);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Webhook ingress
        .route("/webhooks/{source}", post(routes::webhooks::ingest))
        // Scheduling API
        .route("/api/triggers", post(routes::triggers::schedule))
        .route("/api/triggers", get(routes::triggers::list))
        .route("/api/triggers/{id}", delete(routes::triggers::cancel))
        .route("/api/tick", post(routes::triggers::tick))
        // Health
        .route("/api/health", get(routes::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Start the server and the periodic tick loop.
///
/// The tick interval comes from the scheduler's configuration; ticks run on
/// the blocking pool so a slow store or context fetch never stalls request
/// handling.
pub async fn serve(scheduler: Arc<Scheduler>, port: u16) -> anyhow::Result<()> {
    let app = build_router(scheduler.clone());

    let tick_scheduler = scheduler.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick_scheduler.tick_interval());
        // the immediate first tick catches triggers that came due while the
        // process was down
        loop {
            interval.tick().await;
            let scheduler = tick_scheduler.clone();
            let result = tokio::task::spawn_blocking(move || scheduler.tick()).await;
            match result {
                Ok(Ok(summary)) if summary.due > 0 => {
                    tracing::info!(
                        due = summary.due,
                        fired = summary.fired,
                        skipped = summary.skipped,
                        failed = summary.failed,
                        "scheduler tick"
                    );
                }
                Ok(Ok(_)) => {}
                Ok(Err(e)) => tracing::error!(error = %e, "scheduler tick failed"),
                Err(e) => tracing::error!(error = %e, "scheduler tick panicked"),
            }
        }
    });

    let addr = std::net::SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "taskwarden server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
