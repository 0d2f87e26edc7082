//! Authorization URL construction for the start leg of the flow.

use oauth2::CsrfToken;
use url::Url;

use super::descriptor::ProviderClientConfig;

/// Authorization URL to send the browser to, plus the `state` embedded in it.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub authorization_url: Url,
    pub state: CsrfToken,
}

/// Builds a consent URL that asks for offline access so a refresh token is issued.
///
/// `prompt=consent` forces Google to re-issue a refresh token even when the user
/// already granted access; `include_granted_scopes=true` enables incremental auth.
pub fn build_authorization_request(config: &ProviderClientConfig) -> AuthorizationRequest {
    let (authorization_url, state) = config
        .client()
        .authorize_url(CsrfToken::new_random)
        .add_scopes(config.scopes.iter().cloned())
        .add_extra_param("access_type", "offline")
        .add_extra_param("prompt", "consent")
        .add_extra_param("include_granted_scopes", "true")
        .url();

    AuthorizationRequest {
        authorization_url,
        state,
    }
}
