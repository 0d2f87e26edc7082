//! Read-only view of the effective OAuth configuration for troubleshooting.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::authorize::build_authorization_request;
use super::descriptor::{CLIENT_ID_VAR, CLIENT_SECRET_VAR, ProviderClientConfig, REDIRECT_URI_VAR};
use super::redact::{Redactor, client_id_tail};
use crate::config::EnvSource;

/// Report returned by `GET /auth/google/debug`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DiagnosticReport {
    /// Whether the authorization URL could be built
    pub ok: bool,
    /// Redacted failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub env: EnvSnapshot,
    /// Values embedded in the generated authorization URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_url_params: Option<OAuthUrlParams>,
}

/// Configuration as read from the environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EnvSnapshot {
    /// Debug representation of the raw value, quotes and whitespace included
    pub redirect_uri_raw_repr: Option<String>,
    pub redirect_uri_normalized: Option<String>,
    /// Last 12 characters of the client ID
    pub client_id_tail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct OAuthUrlParams {
    pub redirect_uri: Option<String>,
    pub client_id_tail: Option<String>,
}

/// Builds the report; failures are reported in the body and never escape.
pub fn inspect(env: &dyn EnvSource) -> DiagnosticReport {
    let client_id = env.get(CLIENT_ID_VAR);
    let snapshot = EnvSnapshot {
        redirect_uri_raw_repr: env.raw(REDIRECT_URI_VAR).map(|raw| format!("{raw:?}")),
        redirect_uri_normalized: env.get(REDIRECT_URI_VAR),
        client_id_tail: tail_of(client_id.as_deref()),
    };

    match ProviderClientConfig::from_env(env) {
        Ok(config) => {
            let request = build_authorization_request(&config);
            let mut redirect_uri = None;
            let mut embedded_client_id = None;
            for (key, value) in request.authorization_url.query_pairs() {
                match key.as_ref() {
                    "redirect_uri" if redirect_uri.is_none() => {
                        redirect_uri = Some(value.into_owned())
                    }
                    "client_id" if embedded_client_id.is_none() => {
                        embedded_client_id = Some(value.into_owned())
                    }
                    _ => {}
                }
            }

            DiagnosticReport {
                ok: true,
                error: None,
                env: snapshot,
                oauth_url_params: Some(OAuthUrlParams {
                    redirect_uri,
                    client_id_tail: tail_of(embedded_client_id.as_deref()),
                }),
            }
        }
        Err(err) => {
            let redactor = Redactor::new()
                .secret(env.get(CLIENT_SECRET_VAR).as_deref())
                .secret(env.raw(CLIENT_SECRET_VAR).as_deref())
                .client_id(client_id.as_deref());
            tracing::warn!(error = %redactor.apply(&err.to_string()), "Google OAuth debug failed");

            DiagnosticReport {
                ok: false,
                error: Some(redactor.apply(&err.to_string())),
                env: snapshot,
                oauth_url_params: None,
            }
        }
    }
}

fn tail_of(client_id: Option<&str>) -> Option<String> {
    client_id.filter(|id| !id.is_empty()).map(client_id_tail)
}
