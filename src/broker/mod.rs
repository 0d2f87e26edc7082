//! Google OAuth2 authorization-code broker.
//!
//! The broker holds no provider configuration of its own. Every operation
//! rebuilds a [`ProviderClientConfig`] from the injected [`EnvSource`], so a
//! change to `GOOGLE_*` variables takes effect on the next request.

mod authorize;
mod descriptor;
mod diagnostics;
mod exchange;
mod redact;
mod state;

pub use authorize::{AuthorizationRequest, build_authorization_request};
pub use descriptor::{
    AUTH_URI_VAR, CALENDAR_SCOPES, CLIENT_ID_VAR, CLIENT_SECRET_VAR, DEFAULT_AUTH_URI,
    DEFAULT_TOKEN_URI, GoogleClient, ProviderClientConfig, REDIRECT_URI_VAR, TOKEN_URI_VAR,
};
pub use diagnostics::{DiagnosticReport, EnvSnapshot, OAuthUrlParams, inspect};
pub use exchange::{
    CallbackOutcome, CallbackParams, Credentials, ExchangeFailureKind, IssuedTokens,
    OAuth2Exchanger, TokenExchanger, classify_exchange_failure,
};
pub use redact::{CLIENT_ID_TAIL_LEN, Redactor, client_id_tail};
pub use state::{STATE_COOKIE, STATE_COOKIE_PATH, StateError, StateSigner, read_cookie};

use std::sync::Arc;

use chrono::Utc;
use url::Url;

use crate::config::{EnvSource, OAuthStateConfig};
use crate::error::BrokerError;

/// Result of the start leg: where to send the browser and the cookie to set.
#[derive(Debug, Clone)]
pub struct StartedAuthorization {
    pub request: AuthorizationRequest,
    /// `Set-Cookie` value binding the state to this browser; `None` when state checks are off.
    pub state_cookie: Option<String>,
}

#[derive(Clone)]
pub struct AuthorizationBroker {
    env: Arc<dyn EnvSource>,
    exchanger: Arc<dyn TokenExchanger>,
    state: OAuthStateConfig,
}

impl AuthorizationBroker {
    pub fn new(
        env: Arc<dyn EnvSource>,
        exchanger: Arc<dyn TokenExchanger>,
        state: OAuthStateConfig,
    ) -> Self {
        Self {
            env,
            exchanger,
            state,
        }
    }

    pub fn provider_config(&self) -> Result<ProviderClientConfig, BrokerError> {
        ProviderClientConfig::from_env(self.env.as_ref())
    }

    /// Redactor for the client credentials currently in the environment.
    pub fn redactor(&self) -> Redactor {
        Redactor::new()
            .secret(self.env.get(CLIENT_SECRET_VAR).as_deref())
            .secret(self.env.raw(CLIENT_SECRET_VAR).as_deref())
            .client_id(self.env.get(CLIENT_ID_VAR).as_deref())
    }

    pub fn start(&self) -> Result<StartedAuthorization, BrokerError> {
        let config = self.provider_config()?;
        let request = build_authorization_request(&config);

        let state_cookie = if self.state.check {
            let signed = StateSigner::from_client_secret(&config.client_secret)
                .sign(request.state.secret(), Utc::now().timestamp())?;
            Some(state::issue_cookie(
                &signed,
                self.state.ttl(),
                config.uses_https_redirect(),
            ))
        } else {
            None
        };

        Ok(StartedAuthorization {
            request,
            state_cookie,
        })
    }

    /// Validates the callback against the state cookie and exchanges its code for tokens.
    pub async fn complete(
        &self,
        callback_url: &Url,
        state_cookie: Option<&str>,
    ) -> Result<CallbackOutcome, BrokerError> {
        let config = self.provider_config()?;
        let params = CallbackParams::from_url(callback_url);

        if self.state.check {
            let cookie = state_cookie.ok_or(StateError::Missing)?;
            StateSigner::from_client_secret(&config.client_secret).verify(
                cookie,
                params.state.as_deref(),
                Utc::now().timestamp(),
                self.state.ttl(),
            )?;
        }

        let code = params.authorization_code()?;
        let tokens = self.exchanger.exchange(&config, code).await?;

        Ok(CallbackOutcome::from_credentials(Credentials {
            config,
            tokens,
            obtained_at: Utc::now(),
        }))
    }

    pub fn inspect(&self) -> DiagnosticReport {
        inspect(self.env.as_ref())
    }

    /// `Set-Cookie` value that removes the state cookie.
    pub fn clear_state_cookie(&self) -> String {
        let secure = self
            .env
            .get(REDIRECT_URI_VAR)
            .and_then(|uri| Url::parse(&uri).ok())
            .is_some_and(|uri| uri.scheme() == "https");
        state::clear_cookie(secure)
    }
}
