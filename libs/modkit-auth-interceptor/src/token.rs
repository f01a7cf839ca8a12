use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use zeroize::Zeroizing;

use crate::error::TokenError;

/// Token type used when the credential source does not supply one.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Credential produced by a [`TokenProvider`](crate::TokenProvider).
///
/// An immutable value: the opaque token, its optional type and an optional
/// lifetime hint used by caching sources. Cloning is cheap enough to hand out
/// a fresh copy per request.
///
/// `Debug` redacts the token value.
///
/// Deserializes from the RFC 6749 token-endpoint response shape
/// (`access_token`, `token_type`, `expires_in`); unknown fields are ignored.
#[derive(Clone, Deserialize)]
#[serde(try_from = "TokenResponse")]
pub struct TokenResult {
    token: SecretString,
    token_type: Option<String>,
    expires_in: Option<Duration>,
}

impl TokenResult {
    /// Create a credential with no explicit token type and no lifetime hint.
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::from(token.into()),
            token_type: None,
            expires_in: None,
        }
    }

    #[must_use]
    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    #[must_use]
    pub fn with_expires_in(mut self, expires_in: Duration) -> Self {
        self.expires_in = Some(expires_in);
        self
    }

    /// The raw token. Callers must not log or persist the exposed value.
    #[must_use]
    pub fn token(&self) -> &SecretString {
        &self.token
    }

    /// The token type exactly as supplied by the source.
    #[must_use]
    pub fn token_type(&self) -> Option<&str> {
        self.token_type.as_deref()
    }

    /// The token type, falling back to [`DEFAULT_TOKEN_TYPE`].
    #[must_use]
    pub fn token_type_or_default(&self) -> &str {
        self.token_type().unwrap_or(DEFAULT_TOKEN_TYPE)
    }

    #[must_use]
    pub fn expires_in(&self) -> Option<Duration> {
        self.expires_in
    }

    /// Render `"<token_type> <token>"`, scrubbed from memory on drop.
    #[must_use]
    pub fn authorization_value(&self) -> Zeroizing<String> {
        Zeroizing::new(format!(
            "{} {}",
            self.token_type_or_default(),
            self.token.expose_secret()
        ))
    }

    /// Whether both values carry the same token, ignoring type and lifetime.
    #[must_use]
    pub fn same_token(&self, other: &TokenResult) -> bool {
        self.token.expose_secret() == other.token.expose_secret()
    }
}

impl fmt::Debug for TokenResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenResult")
            .field("token", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Wire shape of a token-endpoint response.
///
/// Deserialize-only so the access token cannot be serialized back out by
/// accident.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl TryFrom<TokenResponse> for TokenResult {
    type Error = TokenError;

    fn try_from(resp: TokenResponse) -> Result<Self, Self::Error> {
        if resp.access_token.is_empty() {
            return Err(TokenError::InvalidResponse("access_token is empty".into()));
        }
        Ok(Self {
            token: SecretString::from(resp.access_token),
            token_type: resp.token_type.filter(|t| !t.is_empty()),
            expires_in: resp.expires_in.map(Duration::from_secs),
        })
    }
}
