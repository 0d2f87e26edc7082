//! Provider client configuration rebuilt from the environment on every request.

use oauth2::{
    AuthType, AuthUrl, ClientId, ClientSecret, EndpointNotSet, EndpointSet, RedirectUrl, Scope,
    TokenUrl, basic::BasicClient,
};

use crate::config::EnvSource;
use crate::error::BrokerError;

pub const CLIENT_ID_VAR: &str = "GOOGLE_CLIENT_ID";
pub const CLIENT_SECRET_VAR: &str = "GOOGLE_CLIENT_SECRET";
pub const REDIRECT_URI_VAR: &str = "GOOGLE_REDIRECT_URI";
pub const AUTH_URI_VAR: &str = "GOOGLE_AUTH_URI";
pub const TOKEN_URI_VAR: &str = "GOOGLE_TOKEN_URI";

pub const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Calendar scopes requested on every authorization.
pub const CALENDAR_SCOPES: [&str; 2] = [
    "https://www.googleapis.com/auth/calendar.events",
    "https://www.googleapis.com/auth/calendar.readonly",
];

/// `BasicClient` with the authorization and token endpoints set.
pub type GoogleClient =
    BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;

/// Immutable client descriptor for the Google OAuth endpoints.
#[derive(Debug, Clone)]
pub struct ProviderClientConfig {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    pub auth_endpoint: AuthUrl,
    pub token_endpoint: TokenUrl,
    pub redirect_uri: RedirectUrl,
    pub scopes: Vec<Scope>,
}

impl ProviderClientConfig {
    /// Reads client credentials and endpoints, failing on the first missing required value.
    pub fn from_env(env: &dyn EnvSource) -> Result<Self, BrokerError> {
        let client_id = env.require(CLIENT_ID_VAR)?;
        let client_secret = env.require(CLIENT_SECRET_VAR)?;
        let redirect_uri = env.require(REDIRECT_URI_VAR)?;

        let auth_uri = optional_or(env, AUTH_URI_VAR, DEFAULT_AUTH_URI);
        let token_uri = optional_or(env, TOKEN_URI_VAR, DEFAULT_TOKEN_URI);

        Ok(Self {
            client_id: ClientId::new(client_id),
            client_secret: ClientSecret::new(client_secret),
            auth_endpoint: AuthUrl::new(auth_uri).map_err(|source| {
                BrokerError::AuthorizationUrl {
                    name: AUTH_URI_VAR,
                    source,
                }
            })?,
            token_endpoint: TokenUrl::new(token_uri).map_err(|source| {
                BrokerError::AuthorizationUrl {
                    name: TOKEN_URI_VAR,
                    source,
                }
            })?,
            redirect_uri: RedirectUrl::new(redirect_uri).map_err(|source| {
                BrokerError::AuthorizationUrl {
                    name: REDIRECT_URI_VAR,
                    source,
                }
            })?,
            scopes: CALENDAR_SCOPES
                .iter()
                .map(|scope| Scope::new(scope.to_string()))
                .collect(),
        })
    }

    /// Builds the `oauth2` client; credentials travel in the token request body.
    pub fn client(&self) -> GoogleClient {
        BasicClient::new(self.client_id.clone())
            .set_client_secret(self.client_secret.clone())
            .set_auth_uri(self.auth_endpoint.clone())
            .set_token_uri(self.token_endpoint.clone())
            .set_redirect_uri(self.redirect_uri.clone())
            .set_auth_type(AuthType::RequestBody)
    }

    /// Whether cookies tied to this client should carry the `Secure` attribute.
    pub fn uses_https_redirect(&self) -> bool {
        self.redirect_uri.url().scheme() == "https"
    }
}

fn optional_or(env: &dyn EnvSource, name: &str, default: &str) -> String {
    env.get(name)
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticEnv;

    fn full_env() -> StaticEnv {
        StaticEnv::from_pairs([
            (CLIENT_ID_VAR, "1234-abc.apps.googleusercontent.com"),
            (CLIENT_SECRET_VAR, "GOCSPX-secret"),
            (REDIRECT_URI_VAR, "\"https://app.example.com/auth/google/callback\""),
        ])
    }

    #[test]
    fn test_from_env_uses_defaults_and_normalizes() {
        let config = ProviderClientConfig::from_env(&full_env()).unwrap();

        assert_eq!(
            config.client_id.as_str(),
            "1234-abc.apps.googleusercontent.com"
        );
        assert_eq!(config.client_secret.secret(), "GOCSPX-secret");
        assert_eq!(
            config.redirect_uri.as_str(),
            "https://app.example.com/auth/google/callback"
        );
        assert_eq!(config.auth_endpoint.as_str(), DEFAULT_AUTH_URI);
        assert_eq!(config.token_endpoint.as_str(), DEFAULT_TOKEN_URI);
        assert_eq!(
            config
                .scopes
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>(),
            CALENDAR_SCOPES.to_vec()
        );
        assert!(config.uses_https_redirect());
    }

    #[test]
    fn test_each_required_variable_is_enforced() {
        for name in [CLIENT_ID_VAR, CLIENT_SECRET_VAR, REDIRECT_URI_VAR] {
            let missing = full_env().without(name);
            let err = ProviderClientConfig::from_env(&missing).unwrap_err();
            assert_eq!(err.to_string(), format!("Missing required env var: {name}"));

            let blank = full_env().with(name, "");
            let err = ProviderClientConfig::from_env(&blank).unwrap_err();
            assert!(matches!(err, BrokerError::Configuration { name: ref n } if n == name));
        }
    }

    #[test]
    fn test_endpoint_overrides() {
        let env = full_env()
            .with(AUTH_URI_VAR, "http://127.0.0.1:9999/auth")
            .with(TOKEN_URI_VAR, " 'http://127.0.0.1:9999/token' ");
        let config = ProviderClientConfig::from_env(&env).unwrap();

        assert_eq!(config.auth_endpoint.as_str(), "http://127.0.0.1:9999/auth");
        assert_eq!(config.token_endpoint.as_str(), "http://127.0.0.1:9999/token");
    }

    #[test]
    fn test_malformed_redirect_is_authorization_url_error_without_value() {
        let env = full_env().with(REDIRECT_URI_VAR, "not a url");
        let err = ProviderClientConfig::from_env(&env).unwrap_err();

        assert!(matches!(
            err,
            BrokerError::AuthorizationUrl {
                name: REDIRECT_URI_VAR,
                ..
            }
        ));
        assert!(!err.to_string().contains("not a url"));
    }

    #[test]
    fn test_client_secret_is_not_debug_printed() {
        let config = ProviderClientConfig::from_env(&full_env()).unwrap();
        assert!(!format!("{config:?}").contains("GOCSPX-secret"));
    }
}
