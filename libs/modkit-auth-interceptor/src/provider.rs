use std::fmt;

use async_trait::async_trait;

use crate::error::TokenError;
use crate::token::TokenResult;

/// Source of the credential attached to outbound requests.
///
/// One provider is shared by every in-flight request of an interceptor, so
/// implementations must synchronize their own cached state. Implementations
/// should coalesce concurrent refreshes (see
/// [`CachedTokenProvider`](crate::CachedTokenProvider)).
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Return the current credential, from cache or by acquiring a new one.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when no credential can be produced.
    async fn get_token(&self) -> Result<TokenResult, TokenError>;

    /// Discard `rejected` so the next [`get_token`](Self::get_token) does not
    /// return it.
    ///
    /// Best-effort: a failure to invalidate must not prevent the caller from
    /// fetching again, so implementations log and return rather than error.
    async fn invalidate(&self, rejected: &TokenResult);
}

/// Provider that always hands out the same credential.
///
/// Suitable for static API keys. Invalidation is a no-op, so a retried
/// request carries the same value again.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: TokenResult,
}

impl StaticTokenProvider {
    #[must_use]
    pub fn new(token: TokenResult) -> Self {
        Self { token }
    }
}

impl fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &self.token)
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn get_token(&self) -> Result<TokenResult, TokenError> {
        Ok(self.token.clone())
    }

    async fn invalidate(&self, _rejected: &TokenResult) {
        tracing::trace!("static token provider ignores invalidation");
    }
}
