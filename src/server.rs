//! # Server Configuration
//!
//! Router assembly, middleware and the listener loop for the calendar connect service.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::Request,
    http::HeaderValue,
    middleware,
    routing::get,
};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::TraceLayer,
};
use tracing::Span;
use url::Url;
use utoipa::OpenApi;

use crate::broker::{AuthorizationBroker, OAuth2Exchanger};
use crate::config::{AppConfig, EnvSource};
use crate::handlers::{
    self,
    google_auth::{CALLBACK_PATH, DEBUG_PATH, START_PATH},
};
use crate::telemetry;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub broker: AuthorizationBroker,
}

impl AppState {
    /// Wires the production token exchanger to the given environment source.
    pub fn new(config: AppConfig, env: Arc<dyn EnvSource>) -> Result<Self, reqwest::Error> {
        let exchanger = OAuth2Exchanger::new(config.token_exchange_timeout())?;
        let broker =
            AuthorizationBroker::new(env, Arc::new(exchanger), config.oauth_state.clone());
        Ok(Self {
            config: Arc::new(config),
            broker,
        })
    }
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.frontend_origins);

    let mut app = Router::new()
        .route("/health", get(handlers::health))
        .route(DEBUG_PATH, get(handlers::google_debug))
        .route(START_PATH, get(handlers::google_start))
        .route(CALLBACK_PATH, get(handlers::google_callback))
        .route("/openapi.json", get(openapi_json))
        .fallback(handlers::not_found)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(http_span));

    if let Some(cors) = cors {
        app = app.layer(cors);
    }

    app.layer(middleware::from_fn(telemetry::trace_context_middleware))
}

// Query strings carry authorization codes, so only the path is recorded.
fn http_span(request: &Request) -> Span {
    tracing::debug_span!(
        "http_request",
        method = %request.method(),
        path = %request.uri().path(),
    )
}

/// CORS policy for the configured origins; `None` when no usable origin is configured.
///
/// Entries that are not absolute http(s) origins are logged and skipped.
pub fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match allowed_origin(origin) {
            Some(value) => Some(value),
            None => {
                tracing::warn!(
                    %origin,
                    "Ignoring FRONTEND_ORIGIN entry; expected an absolute http(s) origin"
                );
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        return None;
    }

    // Credentials rule out wildcards, so methods and headers mirror the preflight.
    Some(
        CorsLayer::new()
            .allow_origin(allowed)
            .allow_credentials(true)
            .allow_methods(AllowMethods::mirror_request())
            .allow_headers(AllowHeaders::mirror_request()),
    )
}

fn allowed_origin(origin: &str) -> Option<HeaderValue> {
    let url = Url::parse(origin).ok()?;
    if !matches!(url.scheme(), "http" | "https") || !url.has_host() {
        return None;
    }
    origin.parse::<HeaderValue>().ok()
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Starts the server with the given configuration
pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.bind_addr()?;
    let profile = state.config.profile.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::health,
        crate::handlers::google_auth::google_debug,
        crate::handlers::google_auth::google_start,
        crate::handlers::google_auth::google_callback,
    ),
    components(
        schemas(
            crate::handlers::HealthStatus,
            crate::broker::DiagnosticReport,
            crate::broker::EnvSnapshot,
            crate::broker::OAuthUrlParams,
            crate::error::ApiError,
        )
    ),
    tags(
        (name = "health", description = "Liveness"),
        (name = "google-oauth", description = "Google Calendar OAuth2 connection flow")
    ),
    info(
        title = "Calendar Connect API",
        description = "Connects a Google Calendar account via OAuth2 and surfaces its refresh token",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
