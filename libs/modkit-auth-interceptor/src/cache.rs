use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::TokenCacheConfig;
use crate::error::TokenError;
use crate::provider::TokenProvider;
use crate::token::TokenResult;

/// Performs the actual credential acquisition for a [`CachedTokenProvider`].
///
/// The acquisition protocol (client credentials, refresh token, vault lookup)
/// is entirely up to the implementation. Any
/// `Fn() -> impl Future<Output = Result<TokenResult, TokenError>>` closure
/// implements this trait.
#[async_trait]
pub trait TokenFetcher: Send + Sync {
    /// Acquire a brand new credential.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] when acquisition fails.
    async fn fetch_token(&self) -> Result<TokenResult, TokenError>;
}

#[async_trait]
impl<F, Fut> TokenFetcher for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<TokenResult, TokenError>> + Send,
{
    async fn fetch_token(&self) -> Result<TokenResult, TokenError> {
        (self)().await
    }
}

struct CachedEntry {
    token: TokenResult,
    /// `None` keeps the entry until it is invalidated.
    stale_at: Option<Instant>,
}

impl CachedEntry {
    fn is_fresh(&self, now: Instant) -> bool {
        self.stale_at.is_none_or(|stale_at| now < stale_at)
    }
}

/// Single-flight caching [`TokenProvider`].
///
/// One async mutex guards the cached entry and is held across the fetch, so
/// any number of concurrent callers that find the cache empty or stale share
/// a single call to the underlying [`TokenFetcher`].
///
/// Invalidation is compare-and-clear: the cached entry is dropped only if it
/// still holds the rejected token. When many requests are rejected with the
/// same stale token at once, the first invalidation clears it and the rest
/// see the already-refreshed value, so only one refresh happens.
///
/// Fetch errors are returned to the caller that triggered the fetch and are
/// never cached; the next caller tries again.
pub struct CachedTokenProvider<F> {
    fetcher: F,
    config: TokenCacheConfig,
    state: Mutex<Option<CachedEntry>>,
}

impl<F: TokenFetcher> CachedTokenProvider<F> {
    #[must_use]
    pub fn new(fetcher: F, config: TokenCacheConfig) -> Self {
        Self {
            fetcher,
            config,
            state: Mutex::new(None),
        }
    }

    /// Drop the cached entry regardless of its value.
    pub async fn clear(&self) {
        *self.state.lock().await = None;
    }

    /// `None` keeps the entry until invalidated. A lifetime too large to
    /// represent as an `Instant` is treated the same way.
    fn stale_at(&self, token: &TokenResult, now: Instant) -> Option<Instant> {
        let lifetime = token.expires_in().or(self.config.default_ttl)?;
        now.checked_add(refresh_delay(lifetime, self.config.refresh_skew))
    }
}

/// Time after which a token with `lifetime` should be refreshed.
///
/// Refresh `skew` before expiry; when the skew does not fit inside the
/// lifetime, refresh at half the lifetime instead.
fn refresh_delay(lifetime: Duration, skew: Duration) -> Duration {
    if skew < lifetime {
        lifetime - skew
    } else {
        lifetime / 2
    }
}

#[async_trait]
impl<F: TokenFetcher> TokenProvider for CachedTokenProvider<F> {
    async fn get_token(&self) -> Result<TokenResult, TokenError> {
        let mut slot = self.state.lock().await;

        if let Some(entry) = slot.as_ref()
            && entry.is_fresh(Instant::now())
        {
            tracing::trace!("serving cached token");
            return Ok(entry.token.clone());
        }

        *slot = None;
        tracing::trace!("fetching token");
        let token = self.fetcher.fetch_token().await.inspect_err(|e| {
            tracing::warn!(error = %e, "token fetch failed");
        })?;

        let stale_at = self.stale_at(&token, Instant::now());
        *slot = Some(CachedEntry {
            token: token.clone(),
            stale_at,
        });
        Ok(token)
    }

    async fn invalidate(&self, rejected: &TokenResult) {
        let mut slot = self.state.lock().await;
        match slot.as_ref().map(|entry| entry.token.same_token(rejected)) {
            Some(true) => {
                *slot = None;
                tracing::debug!("cached token invalidated");
            }
            Some(false) => tracing::trace!("cached token already replaced, skipping invalidation"),
            None => {}
        }
    }
}

impl<F> fmt::Debug for CachedTokenProvider<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedTokenProvider")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
