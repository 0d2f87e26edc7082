//! Callback handling: authorization code extraction, token exchange and failure classification.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use oauth2::{
    AccessToken, AuthorizationCode, RefreshToken, RequestTokenError, TokenResponse,
    basic::{BasicErrorResponse, BasicTokenResponse, BasicTokenType},
};
use url::Url;

use super::descriptor::ProviderClientConfig;
use crate::error::TokenExchangeError;

const INVALID_GRANT: &str = "invalid_grant";
const REDIRECT_URI_MISMATCH: &str = "redirect_uri_mismatch";

/// Known token-exchange failure categories that carry an operator hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeFailureKind {
    InvalidGrant,
    RedirectUriMismatch,
    Other,
}

impl ExchangeFailureKind {
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            ExchangeFailureKind::InvalidGrant => Some(
                "Invalid grant usually means the authorization code expired or was already used, \
                 the token was revoked, or the OAuth client credentials/redirect URI do not match.",
            ),
            ExchangeFailureKind::RedirectUriMismatch => Some(
                "Redirect URI mismatch: verify GOOGLE_REDIRECT_URI and Google OAuth settings.",
            ),
            ExchangeFailureKind::Other => None,
        }
    }
}

/// Classifies a failure by the provider's error code, falling back to the message text.
///
/// A redirect URI mismatch wins over an invalid grant when both are mentioned.
pub fn classify_exchange_failure(code: Option<&str>, message: &str) -> ExchangeFailureKind {
    match code {
        Some(REDIRECT_URI_MISMATCH) => return ExchangeFailureKind::RedirectUriMismatch,
        Some(INVALID_GRANT) => return ExchangeFailureKind::InvalidGrant,
        _ => {}
    }

    if message.contains(REDIRECT_URI_MISMATCH) {
        ExchangeFailureKind::RedirectUriMismatch
    } else if message.contains(INVALID_GRANT) {
        ExchangeFailureKind::InvalidGrant
    } else {
        ExchangeFailureKind::Other
    }
}

/// Query parameters Google appends to the redirect URI.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl CallbackParams {
    pub fn from_url(callback_url: &Url) -> Self {
        let mut params = CallbackParams::default();
        for (key, value) in callback_url.query_pairs() {
            let slot = match key.as_ref() {
                "code" => &mut params.code,
                "state" => &mut params.state,
                "error" => &mut params.error,
                "error_description" => &mut params.error_description,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }

    /// The authorization code, or the provider-reported error that replaced it.
    pub fn authorization_code(&self) -> Result<AuthorizationCode, TokenExchangeError> {
        if let Some(error) = self.error.as_deref() {
            let message = match self.error_description.as_deref() {
                Some(description) => format!("Provider returned error: {error}: {description}"),
                None => format!("Provider returned error: {error}"),
            };
            return Err(TokenExchangeError::new(
                classify_exchange_failure(Some(error), &message),
                message,
            ));
        }

        self.code
            .as_deref()
            .filter(|code| !code.is_empty())
            .map(|code| AuthorizationCode::new(code.to_string()))
            .ok_or_else(|| {
                TokenExchangeError::new(
                    ExchangeFailureKind::Other,
                    "Missing code parameter in response.",
                )
            })
    }
}

/// Tokens returned by the token endpoint.
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: AccessToken,
    pub refresh_token: Option<RefreshToken>,
    pub token_type: String,
    pub expires_in: Option<Duration>,
    pub scopes: Vec<String>,
}

impl IssuedTokens {
    pub fn from_response(response: &BasicTokenResponse) -> Self {
        let token_type = match response.token_type() {
            BasicTokenType::Bearer => "Bearer".to_string(),
            BasicTokenType::Mac => "MAC".to_string(),
            BasicTokenType::Extension(other) => other.clone(),
        };

        Self {
            access_token: response.access_token().clone(),
            refresh_token: response.refresh_token().cloned(),
            token_type,
            expires_in: response.expires_in(),
            scopes: response
                .scopes()
                .map(|scopes| scopes.iter().map(|s| s.as_str().to_string()).collect())
                .unwrap_or_default(),
        }
    }
}

/// Client configuration paired with the tokens it obtained; lives for one request.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub config: ProviderClientConfig,
    pub tokens: IssuedTokens,
    pub obtained_at: DateTime<Utc>,
}

impl Credentials {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        let expires_in = chrono::Duration::from_std(self.tokens.expires_in?).ok()?;
        self.obtained_at.checked_add_signed(expires_in)
    }
}

/// Successful callback results.
#[derive(Debug, Clone)]
pub enum CallbackOutcome {
    RefreshTokenIssued {
        refresh_token: RefreshToken,
        credentials: Credentials,
    },
    /// Connected, but Google did not issue a refresh token; the flow must be
    /// repeated with forced consent.
    MissingRefreshToken { credentials: Credentials },
}

impl CallbackOutcome {
    pub fn from_credentials(credentials: Credentials) -> Self {
        match credentials.tokens.refresh_token.clone() {
            Some(refresh_token) if !refresh_token.secret().is_empty() => {
                CallbackOutcome::RefreshTokenIssued {
                    refresh_token,
                    credentials,
                }
            }
            _ => CallbackOutcome::MissingRefreshToken { credentials },
        }
    }

    pub fn credentials(&self) -> &Credentials {
        match self {
            CallbackOutcome::RefreshTokenIssued { credentials, .. }
            | CallbackOutcome::MissingRefreshToken { credentials } => credentials,
        }
    }
}

/// Exchanges an authorization code at the provider's token endpoint.
#[async_trait]
pub trait TokenExchanger: Send + Sync {
    async fn exchange(
        &self,
        config: &ProviderClientConfig,
        code: AuthorizationCode,
    ) -> Result<IssuedTokens, TokenExchangeError>;
}

/// Token exchange over HTTPS with the `oauth2` crate; one attempt, bounded by a timeout.
#[derive(Debug, Clone)]
pub struct OAuth2Exchanger {
    http: reqwest::Client,
}

impl OAuth2Exchanger {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        // Redirects are never followed so the code cannot be replayed elsewhere.
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(timeout)
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl TokenExchanger for OAuth2Exchanger {
    async fn exchange(
        &self,
        config: &ProviderClientConfig,
        code: AuthorizationCode,
    ) -> Result<IssuedTokens, TokenExchangeError> {
        let response = config
            .client()
            .exchange_code(code)
            .request_async(&self.http)
            .await
            .map_err(exchange_failure)?;

        Ok(IssuedTokens::from_response(&response))
    }
}

fn exchange_failure<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> TokenExchangeError
where
    RE: std::error::Error + 'static,
{
    let code = match &err {
        RequestTokenError::ServerResponse(response) => Some(response.error().to_string()),
        _ => None,
    };
    let message = err.to_string();
    TokenExchangeError::new(
        classify_exchange_failure(code.as_deref(), &message),
        message,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticEnv;

    fn credentials(refresh_token: Option<&str>) -> Credentials {
        let env = StaticEnv::from_pairs([
            ("GOOGLE_CLIENT_ID", "id"),
            ("GOOGLE_CLIENT_SECRET", "secret"),
            ("GOOGLE_REDIRECT_URI", "http://localhost/cb"),
        ]);
        Credentials {
            config: ProviderClientConfig::from_env(&env).unwrap(),
            tokens: IssuedTokens {
                access_token: AccessToken::new("ya29.access".to_string()),
                refresh_token: refresh_token.map(|t| RefreshToken::new(t.to_string())),
                token_type: "Bearer".to_string(),
                expires_in: Some(Duration::from_secs(3599)),
                scopes: vec![],
            },
            obtained_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        }
    }

    #[test]
    fn test_classification_prefers_structured_code() {
        assert_eq!(
            classify_exchange_failure(Some("invalid_grant"), "Bad Request"),
            ExchangeFailureKind::InvalidGrant
        );
        assert_eq!(
            classify_exchange_failure(Some("redirect_uri_mismatch"), ""),
            ExchangeFailureKind::RedirectUriMismatch
        );
    }

    #[test]
    fn test_classification_falls_back_to_message() {
        assert_eq!(
            classify_exchange_failure(None, "Server returned error response: invalid_grant"),
            ExchangeFailureKind::InvalidGrant
        );
        assert_eq!(
            classify_exchange_failure(Some("invalid_request"), "redirect_uri_mismatch seen"),
            ExchangeFailureKind::RedirectUriMismatch
        );
        assert_eq!(
            classify_exchange_failure(None, "invalid_grant and redirect_uri_mismatch"),
            ExchangeFailureKind::RedirectUriMismatch
        );
        assert_eq!(
            classify_exchange_failure(None, "connection reset"),
            ExchangeFailureKind::Other
        );
        assert!(ExchangeFailureKind::Other.hint().is_none());
    }

    #[test]
    fn test_callback_params_from_url() {
        let url = Url::parse(
            "http://localhost:8080/auth/google/callback?state=s1&code=4%2F0Ab&scope=x&state=s2",
        )
        .unwrap();
        let params = CallbackParams::from_url(&url);

        assert_eq!(params.code.as_deref(), Some("4/0Ab"));
        assert_eq!(params.state.as_deref(), Some("s1"));
        assert_eq!(params.authorization_code().unwrap().secret(), "4/0Ab");
    }

    #[test]
    fn test_callback_error_and_missing_code() {
        let denied = Url::parse("http://localhost/cb?error=access_denied&state=s").unwrap();
        let err = CallbackParams::from_url(&denied)
            .authorization_code()
            .unwrap_err();
        assert_eq!(err.message, "Provider returned error: access_denied");
        assert_eq!(err.kind, ExchangeFailureKind::Other);

        let empty = Url::parse("http://localhost/cb?code=").unwrap();
        let err = CallbackParams::from_url(&empty)
            .authorization_code()
            .unwrap_err();
        assert_eq!(err.message, "Missing code parameter in response.");
    }

    #[test]
    fn test_outcome_distinguishes_missing_refresh_token() {
        match CallbackOutcome::from_credentials(credentials(Some("1//refresh"))) {
            CallbackOutcome::RefreshTokenIssued { refresh_token, .. } => {
                assert_eq!(refresh_token.secret(), "1//refresh")
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let missing = CallbackOutcome::from_credentials(credentials(None));
        assert!(matches!(missing, CallbackOutcome::MissingRefreshToken { .. }));
        assert_eq!(missing.credentials().tokens.access_token.secret(), "ya29.access");
        assert!(matches!(
            CallbackOutcome::from_credentials(credentials(Some(""))),
            CallbackOutcome::MissingRefreshToken { .. }
        ));
    }

    #[test]
    fn test_credentials_expiry() {
        let creds = credentials(None);
        assert_eq!(
            creds.expires_at().unwrap().timestamp(),
            1_700_000_000 + 3599
        );
    }
}
