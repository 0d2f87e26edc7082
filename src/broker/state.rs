//! Signed `state` cookie binding the provider callback to the browser that started the flow.
//!
//! The cookie value is `<state>.<issued_at>.<signature>` where the signature is
//! HMAC-SHA256 over `<state>.<issued_at>`, keyed with the client secret. Nothing is
//! kept server-side.

use std::time::Duration;

use axum::http::{HeaderMap, header};
use hmac::{Hmac, Mac};
use oauth2::ClientSecret;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

type HmacSha256 = Hmac<Sha256>;

pub const STATE_COOKIE: &str = "calconnect_oauth_state";
pub const STATE_COOKIE_PATH: &str = "/auth/google";

const SIGNING_CONTEXT: &[u8] = b"calconnect-oauth-state:v1|";
// Tolerated clock drift for cookies issued "in the future".
const MAX_CLOCK_SKEW_SECS: i64 = 60;

/// Reasons a callback's `state` is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("OAuth state cookie is missing; restart the flow from /auth/google/start")]
    Missing,
    #[error("OAuth callback is missing the state parameter")]
    MissingParameter,
    #[error("OAuth state cookie is malformed")]
    Malformed,
    #[error("OAuth state cookie signature is invalid")]
    BadSignature,
    #[error("OAuth state expired after {ttl_seconds}s; restart the flow from /auth/google/start")]
    Expired { ttl_seconds: u64 },
    #[error("OAuth state does not match the value issued by /auth/google/start")]
    Mismatch,
    #[error("OAuth state signing key was rejected")]
    InvalidKey,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct SigningKey(Vec<u8>);

/// Signs and verifies state cookie values.
pub struct StateSigner {
    key: SigningKey,
}

impl StateSigner {
    pub fn new(key: &[u8]) -> Self {
        Self {
            key: SigningKey(key.to_vec()),
        }
    }

    pub fn from_client_secret(secret: &ClientSecret) -> Self {
        Self::new(secret.secret().as_bytes())
    }

    fn mac(&self, state: &str, issued_at: i64) -> Result<HmacSha256, StateError> {
        let mut mac =
            HmacSha256::new_from_slice(&self.key.0).map_err(|_| StateError::InvalidKey)?;
        mac.update(SIGNING_CONTEXT);
        mac.update(format!("{state}.{issued_at}").as_bytes());
        Ok(mac)
    }

    /// Produces the cookie value for `state` issued at `issued_at` (unix seconds).
    pub fn sign(&self, state: &str, issued_at: i64) -> Result<String, StateError> {
        let signature = self.mac(state, issued_at)?.finalize().into_bytes();
        Ok(format!(
            "{state}.{issued_at}.{}",
            base64_url::encode(&signature)
        ))
    }

    /// Checks the cookie signature and age, then compares it against the callback `state`.
    pub fn verify(
        &self,
        cookie_value: &str,
        callback_state: Option<&str>,
        now: i64,
        ttl: Duration,
    ) -> Result<(), StateError> {
        let callback_state = callback_state
            .filter(|s| !s.is_empty())
            .ok_or(StateError::MissingParameter)?;

        let mut parts = cookie_value.rsplitn(3, '.');
        let (Some(signature), Some(issued_at), Some(state)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(StateError::Malformed);
        };
        let issued_at: i64 = issued_at.parse().map_err(|_| StateError::Malformed)?;
        let signature = base64_url::decode(signature).map_err(|_| StateError::Malformed)?;

        self.mac(state, issued_at)?
            .verify_slice(&signature)
            .map_err(|_| StateError::BadSignature)?;

        let ttl_seconds = ttl.as_secs();
        let age = now - issued_at;
        if age < -MAX_CLOCK_SKEW_SECS {
            return Err(StateError::Malformed);
        }
        if age > ttl_seconds as i64 {
            return Err(StateError::Expired { ttl_seconds });
        }

        if bool::from(state.as_bytes().ct_eq(callback_state.as_bytes())) {
            Ok(())
        } else {
            Err(StateError::Mismatch)
        }
    }
}

/// `Set-Cookie` value carrying a signed state.
pub fn issue_cookie(value: &str, ttl: Duration, secure: bool) -> String {
    cookie_header(value, ttl.as_secs(), secure)
}

/// `Set-Cookie` value that removes the state cookie.
pub fn clear_cookie(secure: bool) -> String {
    cookie_header("", 0, secure)
}

fn cookie_header(value: &str, max_age: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{STATE_COOKIE}={value}; Path={STATE_COOKIE_PATH}; Max-Age={max_age}; HttpOnly; SameSite=Lax"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Finds the state cookie among the request's `Cookie` headers.
pub fn read_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == STATE_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    #[test]
    fn test_sign_then_verify_matching_state() {
        let signer = StateSigner::new(b"GOCSPX-secret");
        let cookie = signer.sign("abc-123_XYZ", 1_700_000_000).unwrap();

        assert!(cookie.starts_with("abc-123_XYZ.1700000000."));
        assert_eq!(
            signer.verify(&cookie, Some("abc-123_XYZ"), 1_700_000_100, TTL),
            Ok(())
        );
    }

    #[test]
    fn test_rejects_mismatched_state() {
        let signer = StateSigner::new(b"GOCSPX-secret");
        let cookie = signer.sign("expected", 1_700_000_000).unwrap();

        assert_eq!(
            signer.verify(&cookie, Some("attacker"), 1_700_000_000, TTL),
            Err(StateError::Mismatch)
        );
        assert_eq!(
            signer.verify(&cookie, None, 1_700_000_000, TTL),
            Err(StateError::MissingParameter)
        );
    }

    #[test]
    fn test_rejects_tampered_or_foreign_cookie() {
        let signer = StateSigner::new(b"GOCSPX-secret");
        let cookie = signer.sign("state", 1_700_000_000).unwrap();

        let tampered = cookie.replacen("state", "other", 1);
        assert_eq!(
            signer.verify(&tampered, Some("other"), 1_700_000_000, TTL),
            Err(StateError::BadSignature)
        );

        let foreign = StateSigner::new(b"another-secret");
        assert_eq!(
            foreign.verify(&cookie, Some("state"), 1_700_000_000, TTL),
            Err(StateError::BadSignature)
        );

        assert_eq!(
            signer.verify("garbage", Some("state"), 1_700_000_000, TTL),
            Err(StateError::Malformed)
        );
    }

    #[test]
    fn test_rejects_expired_cookie() {
        let signer = StateSigner::new(b"GOCSPX-secret");
        let cookie = signer.sign("state", 1_700_000_000).unwrap();

        assert_eq!(
            signer.verify(&cookie, Some("state"), 1_700_000_601, TTL),
            Err(StateError::Expired { ttl_seconds: 600 })
        );
    }

    #[test]
    fn test_cookie_headers() {
        let issued = issue_cookie("v", TTL, true);
        assert_eq!(
            issued,
            "calconnect_oauth_state=v; Path=/auth/google; Max-Age=600; HttpOnly; SameSite=Lax; Secure"
        );
        assert!(clear_cookie(false).contains("Max-Age=0"));
        assert!(!clear_cookie(false).contains("Secure"));
    }

    #[test]
    fn test_read_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1; b=2"));
        headers.append(
            header::COOKIE,
            HeaderValue::from_static("calconnect_oauth_state=s.1.sig; c=3"),
        );

        assert_eq!(read_cookie(&headers).as_deref(), Some("s.1.sig"));
        assert_eq!(read_cookie(&HeaderMap::new()), None);
    }
}
