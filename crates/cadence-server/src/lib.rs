pub mod auth;
pub mod error;
pub mod routes;
pub mod state;
pub mod webhooks;

use axum::middleware;
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use cadence_core::Workspace;

use crate::state::AppState;
use crate::webhooks::WebhookDispatcher;

/// Build the axum Router with all API routes and middleware.
/// Used by `serve_on()` and available for integration testing.
pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        // Releases
        .route(
            "/api/releases",
            get(routes::releases::list_releases).post(routes::releases::create_release),
        )
        .route(
            "/api/releases/mapEntriesToReleases",
            get(routes::releases::map_entries_to_releases),
        )
        .route(
            "/api/releases/{id}",
            get(routes::releases::get_release)
                .put(routes::releases::update_release)
                .delete(routes::releases::delete_release),
        )
        .route(
            "/api/releases/{id}/publish",
            post(routes::releases::publish_release),
        )
        // Actions
        .route(
            "/api/releases/{id}/actions",
            get(routes::actions::list_actions).post(routes::actions::create_action),
        )
        .route(
            "/api/releases/{id}/actions/bulk",
            post(routes::actions::create_many_actions),
        )
        .route(
            "/api/releases/{id}/actions/{action_id}",
            put(routes::actions::update_action).delete(routes::actions::delete_action),
        )
        // Events (SSE)
        .route("/api/events", get(routes::events::sse_events))
        .route_layer(middleware::from_fn_with_state(
            app_state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/api/health", get(routes::health::health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(app_state)
}

/// Bind `host:port` and serve the workspace until Ctrl-C.
pub async fn serve(ws: Workspace, host: &str, port: u16) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    serve_on(ws, listener).await
}

/// Serve on a pre-bound listener.
///
/// Startup reconciles actions with the content types and re-registers every
/// scheduled release; shutdown cancels the scheduled jobs.
pub async fn serve_on(ws: Workspace, listener: tokio::net::TcpListener) -> anyhow::Result<()> {
    let addr = listener.local_addr()?;
    let app_state = AppState::new(ws);
    let service = app_state.service.clone();

    let bootstrap = service.clone();
    let report = tokio::task::spawn_blocking(move || bootstrap.bootstrap()).await??;
    tracing::debug!(?report, "bootstrap complete");
    service.spawn_content_listener();
    let webhooks =
        WebhookDispatcher::new(app_state.config.webhooks.clone()).spawn(service.events());

    tracing::info!(
        project = %app_state.config.project.name,
        scheduled = service.scheduler().jobs().len(),
        "cadence listening on http://{addr}"
    );
    axum::serve(listener, build_router(app_state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    service.destroy();
    if let Some(handle) = webhooks {
        handle.abort();
    }
    tracing::info!("cadence stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
}
