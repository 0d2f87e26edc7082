//! # Error Handling
//!
//! Broker failures are rendered as HTML pages for the browser-facing OAuth routes
//! and as problem+json for everything else. Both carry the request trace ID.

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::broker::{ExchangeFailureKind, StateError};
use crate::pages;
use crate::telemetry;

/// Failures produced while running the authorization-code flow.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// A required setting is missing or blank after normalization.
    #[error("Missing required env var: {name}")]
    Configuration { name: String },

    /// A configured endpoint could not be turned into a URL for the OAuth client.
    #[error("invalid {name}: {source}")]
    AuthorizationUrl {
        name: &'static str,
        source: url::ParseError,
    },

    #[error(transparent)]
    TokenExchange(#[from] TokenExchangeError),

    #[error(transparent)]
    State(#[from] StateError),
}

impl BrokerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            BrokerError::State(_) => StatusCode::BAD_REQUEST,
            BrokerError::Configuration { .. }
            | BrokerError::AuthorizationUrl { .. }
            | BrokerError::TokenExchange(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Operator-facing text: the raw message plus any classification hint.
    pub fn detail(&self) -> String {
        match self {
            BrokerError::TokenExchange(err) => err.detail(),
            other => other.to_string(),
        }
    }
}

/// The token endpoint (or the provider redirect) reported a failure.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TokenExchangeError {
    pub kind: ExchangeFailureKind,
    pub message: String,
}

impl TokenExchangeError {
    pub fn new(kind: ExchangeFailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn hint(&self) -> Option<&'static str> {
        self.kind.hint()
    }

    /// Raw provider message with the hint appended, if one applies.
    pub fn detail(&self) -> String {
        match self.hint() {
            Some(hint) => format!("{} {}", self.message, hint),
            None => self.message.clone(),
        }
    }
}

/// HTML error page returned by the start and callback routes.
#[derive(Debug, Clone)]
pub struct ErrorPage {
    pub status: StatusCode,
    pub title: String,
    pub detail: String,
    pub trace_id: Option<String>,
}

impl ErrorPage {
    pub fn new(status: StatusCode, title: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status,
            title: title.into(),
            detail: detail.into(),
            trace_id: telemetry::current_trace_id(),
        }
    }
}

impl IntoResponse for ErrorPage {
    fn into_response(self) -> Response {
        let body = pages::error_page(&self.title, &self.detail, self.trace_id.as_deref());
        (self.status, Html(body)).into_response()
    }
}

/// Unified JSON error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            trace_id: Self::current_trace_id(),
        }
    }

    pub fn not_found(message: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// Current request trace ID, falling back to a short correlation ID outside a request.
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                let id = uuid::Uuid::new_v4().simple().to_string();
                Some(format!("corr-{}", &id[..8]).into_boxed_str())
            })
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );

        (self.status, headers, axum::Json(self)).into_response()
    }
}
