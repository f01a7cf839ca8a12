use thiserror::Error;
use tower::BoxError;

use crate::registry::ApiTarget;

/// Errors raised by a [`TokenProvider`](crate::TokenProvider) while obtaining
/// a credential.
///
/// Variants never carry token values; the formatted output is safe to log.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenError {
    /// The acquisition call (token endpoint, vault, etc.) failed.
    #[error("token fetch failed: {0}")]
    Fetch(#[source] BoxError),

    /// The credential source returned an unparseable or incomplete response.
    #[error("invalid token response: {0}")]
    InvalidResponse(String),

    /// The credential source is shut down or otherwise not able to serve.
    #[error("token unavailable: {0}")]
    Unavailable(String),
}

impl TokenError {
    /// Wrap an arbitrary acquisition failure.
    #[must_use]
    pub fn fetch(err: impl Into<BoxError>) -> Self {
        Self::Fetch(err.into())
    }
}

/// No credential source could be bound for an API target.
///
/// Returned at interceptor construction time; an interceptor value never
/// exists without a bound source.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ResolveError {
    /// Neither an exact registration nor a fallback provider matched.
    #[error("no token provider registered for API target '{target}'")]
    NotRegistered { target: ApiTarget },
}

/// Invalid [`InterceptorConfig`](crate::InterceptorConfig).
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("invalid credential header name: {0}")]
    InvalidHeaderName(#[from] http::header::InvalidHeaderName),

    #[error("invalid default token type '{0}'")]
    InvalidTokenType(String),
}

/// Errors surfaced by [`TokenAuthService`](crate::TokenAuthService).
///
/// A persistent `401` is not an error: it is returned as a normal response.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InterceptError {
    /// The credential source failed to produce a credential.
    #[error("credential unavailable: {0}")]
    Token(#[from] TokenError),

    /// The inner transport failed. The original error is kept as `source()`.
    #[error("transport error: {0}")]
    Transport(#[source] BoxError),

    /// The credential could not be encoded as a header value.
    #[error("invalid authorization header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),

    /// The request's cancellation token fired while the call was suspended.
    #[error("request cancelled")]
    Cancelled,
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::error::Error;
    use std::fmt;

    #[derive(Debug)]
    struct TestError(&'static str);

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl Error for TestError {}

    #[test]
    fn transport_error_preserves_source() {
        let err = InterceptError::Transport(Box::new(TestError("connection refused")));

        let source = err.source().unwrap();
        let downcast = source.downcast_ref::<TestError>().unwrap();
        assert_eq!(downcast.0, "connection refused");
        assert_eq!(err.to_string(), "transport error: connection refused");
    }

    #[test]
    fn token_error_converts_into_intercept_error() {
        let err: InterceptError = TokenError::Unavailable("shut down".into()).into();
        assert!(matches!(err, InterceptError::Token(TokenError::Unavailable(_))));
        assert_eq!(
            err.to_string(),
            "credential unavailable: token unavailable: shut down"
        );
    }

    #[test]
    fn fetch_error_chain_has_two_levels() {
        let err = TokenError::fetch(TestError("endpoint returned 500"));

        let mut count = 0;
        let mut current: Option<&(dyn Error + 'static)> = Some(&err);
        while let Some(e) = current {
            count += 1;
            current = e.source();
        }
        assert_eq!(count, 2);
    }

    #[test]
    fn resolve_error_names_target() {
        let err = ResolveError::NotRegistered {
            target: ApiTarget::named("billing"),
        };
        assert_eq!(
            err.to_string(),
            "no token provider registered for API target 'billing'"
        );
    }
}
