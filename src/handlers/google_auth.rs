//! # Google OAuth Handlers
//!
//! Browser-facing routes for connecting a Google Calendar account. Start and
//! callback always answer with a rendered page or redirect; failures never
//! escape as raw errors.

use axum::{
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{Html, IntoResponse, Json, Response},
};
use url::Url;

use crate::broker::{AuthorizationBroker, CallbackOutcome, DiagnosticReport, read_cookie};
use crate::error::{BrokerError, ErrorPage};
use crate::pages;
use crate::server::AppState;

pub const DEBUG_PATH: &str = "/auth/google/debug";
pub const START_PATH: &str = "/auth/google/start";
pub const CALLBACK_PATH: &str = "/auth/google/callback";

const START_FAILED: &str = "Google OAuth start failed";
const CALLBACK_FAILED: &str = "Google OAuth callback failed";

/// Inspect the effective OAuth configuration
///
/// Rebuilds the authorization URL without redirecting so the configured and the
/// effective `redirect_uri` and client ID can be compared. Failures are reported
/// in the body with `ok=false`.
#[utoipa::path(
    get,
    path = "/auth/google/debug",
    responses(
        (status = 200, description = "Diagnostic report", body = DiagnosticReport)
    ),
    tag = "google-oauth"
)]
pub async fn google_debug(State(state): State<AppState>) -> Json<DiagnosticReport> {
    Json(state.broker.inspect())
}

/// Start the Google OAuth flow
///
/// Redirects the browser to Google's consent screen, asking for offline access so a
/// refresh token is issued.
#[utoipa::path(
    get,
    path = "/auth/google/start",
    responses(
        (status = 302, description = "Redirect to the Google authorization URL"),
        (status = 500, description = "OAuth client is not configured", content_type = "text/html", body = String)
    ),
    tag = "google-oauth"
)]
pub async fn google_start(State(state): State<AppState>) -> Response {
    let started = match state.broker.start() {
        Ok(started) => started,
        Err(err) => return failure_page(&state.broker, START_FAILED, &err).into_response(),
    };

    let location = match HeaderValue::from_str(started.request.authorization_url.as_str()) {
        Ok(location) => location,
        Err(_) => {
            tracing::error!("authorization URL is not a valid header value");
            return ErrorPage::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                START_FAILED,
                "Could not build the Google authorization URL.",
            )
            .into_response();
        }
    };

    let mut headers = HeaderMap::new();
    headers.insert(header::LOCATION, location);
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    if let Some(cookie) = started
        .state_cookie
        .as_deref()
        .and_then(|cookie| HeaderValue::from_str(cookie).ok())
    {
        headers.append(header::SET_COOKIE, cookie);
    }

    tracing::info!(
        state_bound = started.state_cookie.is_some(),
        "Redirecting to Google consent screen"
    );
    (StatusCode::FOUND, headers).into_response()
}

/// Handle the Google OAuth callback
///
/// Exchanges the authorization code for tokens and shows the refresh token for the
/// operator to store. The state cookie set by the start route is always cleared.
#[utoipa::path(
    get,
    path = "/auth/google/callback",
    params(
        ("code" = Option<String>, Query, description = "Authorization code issued by Google"),
        ("state" = Option<String>, Query, description = "State value issued by the start route"),
        ("error" = Option<String>, Query, description = "Error reported by Google instead of a code")
    ),
    responses(
        (status = 200, description = "Connected; page shows the refresh token or a reconnect notice", content_type = "text/html", body = String),
        (status = 400, description = "State check failed", content_type = "text/html", body = String),
        (status = 500, description = "Configuration or token exchange failure", content_type = "text/html", body = String)
    ),
    tag = "google-oauth"
)]
pub async fn google_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Response {
    let mut response = match callback_url(&headers, &uri) {
        Some(callback_url) => {
            let cookie = read_cookie(&headers);
            match state.broker.complete(&callback_url, cookie.as_deref()).await {
                Ok(outcome) => render_outcome(outcome),
                Err(err) => failure_page(&state.broker, CALLBACK_FAILED, &err).into_response(),
            }
        }
        None => ErrorPage::new(
            StatusCode::BAD_REQUEST,
            CALLBACK_FAILED,
            "Callback URL could not be parsed.",
        )
        .into_response(),
    };

    if let Ok(clear) = HeaderValue::from_str(&state.broker.clear_state_cookie()) {
        response.headers_mut().append(header::SET_COOKIE, clear);
    }
    response
}

fn render_outcome(outcome: CallbackOutcome) -> Response {
    let credentials = outcome.credentials();
    let scopes = credentials.tokens.scopes.len();
    let expires_at = credentials.expires_at();

    let body = match &outcome {
        CallbackOutcome::RefreshTokenIssued { refresh_token, .. } => {
            tracing::info!(
                scopes,
                expires_at = ?expires_at,
                "Google Calendar connected; refresh token issued"
            );
            pages::connected_page(refresh_token.secret())
        }
        CallbackOutcome::MissingRefreshToken { .. } => {
            tracing::warn!(
                scopes,
                expires_at = ?expires_at,
                "Google Calendar connected without a refresh token"
            );
            pages::missing_refresh_token_page(START_PATH)
        }
    };

    (
        [(header::CACHE_CONTROL, HeaderValue::from_static("no-store"))],
        Html(body),
    )
        .into_response()
}

fn failure_page(broker: &AuthorizationBroker, title: &str, err: &BrokerError) -> ErrorPage {
    let detail = broker.redactor().apply(&err.detail());
    let status = err.status_code();
    if status.is_server_error() {
        tracing::error!(status = status.as_u16(), error = %detail, "{title}");
    } else {
        tracing::warn!(status = status.as_u16(), error = %detail, "{title}");
    }
    ErrorPage::new(status, title, detail)
}

/// Rebuilds the absolute URL the browser requested.
///
/// Only the query is consumed; the token request itself always carries the
/// configured `GOOGLE_REDIRECT_URI`.
pub(crate) fn callback_url(headers: &HeaderMap, uri: &Uri) -> Option<Url> {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or(CALLBACK_PATH);
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|value| value.to_str().ok())
        .filter(|proto| matches!(*proto, "http" | "https"))
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .filter(|host| !host.is_empty() && !host.contains(['/', '?', '#', '@']));

    host.and_then(|host| Url::parse(&format!("{scheme}://{host}{path_and_query}")).ok())
        .or_else(|| Url::parse(&format!("http://localhost{path_and_query}")).ok())
}
