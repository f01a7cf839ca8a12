use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use http::header::{AUTHORIZATION, HeaderName};
use http::response::Parts;
use http::{HeaderMap, HeaderValue, StatusCode};
use secrecy::ExposeSecret;
use zeroize::Zeroizing;

use crate::config::InterceptorConfig;
use crate::error::{ConfigError, InterceptError, ResolveError};
use crate::provider::TokenProvider;
use crate::registry::{ApiTarget, TokenProviderRegistry};
use crate::token::{DEFAULT_TOKEN_TYPE, TokenResult};

type ResolveFn = dyn Fn(&TokenProviderRegistry, &ApiTarget) -> Result<Arc<dyn TokenProvider>, ResolveError>
    + Send
    + Sync;

type ApplyFn = dyn Fn(&mut HeaderMap, &TokenResult) -> Result<(), InterceptError> + Send + Sync;

/// Decides whether a response means the credential was rejected.
///
/// Only the response head is visible, so the body stays intact for the
/// caller. Plain closures `Fn(&Parts) -> bool` implement this trait;
/// implement it directly when the decision needs to await something.
///
/// Rejections signalled only in the body (an application-level error code
/// with a `200` status) cannot be detected here. Wrap the transport with a
/// service that reads the body and surfaces the code in a header, then match
/// on that header.
#[async_trait]
pub trait UnauthorizedPredicate: Send + Sync {
    async fn is_unauthorized(&self, response: &Parts) -> bool;
}

#[async_trait]
impl<F> UnauthorizedPredicate for F
where
    F: Fn(&Parts) -> bool + Send + Sync,
{
    async fn is_unauthorized(&self, response: &Parts) -> bool {
        (self)(response)
    }
}

/// The three replaceable steps of the interceptor.
///
/// - **resolver**: picks the [`TokenProvider`] for an API target, once, when
///   the layer is built;
/// - **predicate**: classifies a response as unauthorized;
/// - **applier**: writes the credential into the request headers.
///
/// Each step is an independent function value; replacing one leaves the other
/// two at their defaults.
#[derive(Clone)]
pub struct InterceptorPolicy {
    resolver: Arc<ResolveFn>,
    predicate: Arc<dyn UnauthorizedPredicate>,
    applier: Arc<ApplyFn>,
}

impl Default for InterceptorPolicy {
    fn default() -> Self {
        Self {
            resolver: Arc::new(default_resolver),
            predicate: Arc::new(status_is_unauthorized),
            applier: Arc::new(header_applier(AUTHORIZATION, DEFAULT_TOKEN_TYPE)),
        }
    }
}

impl InterceptorPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Default policy whose applier follows `config`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if `config` does not validate.
    pub fn from_config(config: &InterceptorConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let header = HeaderName::from_bytes(config.header_name.as_bytes())?;
        Ok(Self::default().with_applier(header_applier(header, &config.default_token_type)))
    }

    #[must_use]
    pub fn with_resolver<F>(mut self, resolver: F) -> Self
    where
        F: Fn(&TokenProviderRegistry, &ApiTarget) -> Result<Arc<dyn TokenProvider>, ResolveError>
            + Send
            + Sync
            + 'static,
    {
        self.resolver = Arc::new(resolver);
        self
    }

    #[must_use]
    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: UnauthorizedPredicate + 'static,
    {
        self.predicate = Arc::new(predicate);
        self
    }

    #[must_use]
    pub fn with_applier<F>(mut self, applier: F) -> Self
    where
        F: Fn(&mut HeaderMap, &TokenResult) -> Result<(), InterceptError> + Send + Sync + 'static,
    {
        self.applier = Arc::new(applier);
        self
    }

    /// Run the resolver.
    ///
    /// # Errors
    ///
    /// Whatever [`ResolveError`] the resolver reports.
    pub fn resolve(
        &self,
        registry: &TokenProviderRegistry,
        target: &ApiTarget,
    ) -> Result<Arc<dyn TokenProvider>, ResolveError> {
        (self.resolver)(registry, target)
    }

    /// Run the predicate.
    pub async fn is_unauthorized(&self, response: &Parts) -> bool {
        self.predicate.is_unauthorized(response).await
    }

    /// Run the applier.
    ///
    /// # Errors
    ///
    /// Whatever the applier reports, typically
    /// [`InterceptError::InvalidHeaderValue`].
    pub fn apply(&self, headers: &mut HeaderMap, token: &TokenResult) -> Result<(), InterceptError> {
        (self.applier)(headers, token)
    }
}

impl fmt::Debug for InterceptorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorPolicy").finish_non_exhaustive()
    }
}

/// Exact registry lookup, then the registry fallback.
///
/// # Errors
///
/// Returns [`ResolveError::NotRegistered`] when nothing matches.
pub fn default_resolver(
    registry: &TokenProviderRegistry,
    target: &ApiTarget,
) -> Result<Arc<dyn TokenProvider>, ResolveError> {
    registry.resolve(target)
}

/// `true` iff the status is exactly `401 Unauthorized`.
#[must_use]
pub fn status_is_unauthorized(response: &Parts) -> bool {
    response.status == StatusCode::UNAUTHORIZED
}

/// Applier that sets `header` to `"<token_type> <token>"`.
///
/// `default_token_type` is used when the credential has no type. The header
/// value is marked sensitive so it is hidden from `Debug` output and HPACK
/// indexing.
#[must_use]
pub fn header_applier(
    header: HeaderName,
    default_token_type: &str,
) -> impl Fn(&mut HeaderMap, &TokenResult) -> Result<(), InterceptError> + Clone + Send + Sync + 'static
{
    let default_token_type: Arc<str> = Arc::from(default_token_type);
    move |headers: &mut HeaderMap, token: &TokenResult| -> Result<(), InterceptError> {
        let token_type = token.token_type().unwrap_or(&*default_token_type);
        let raw = Zeroizing::new(format!("{token_type} {}", token.token().expose_secret()));
        let mut value = HeaderValue::from_str(&raw)?;
        value.set_sensitive(true);
        headers.insert(header.clone(), value);
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::provider::StaticTokenProvider;
    use http::Response;

    fn head(status: StatusCode) -> Parts {
        Response::builder().status(status).body(()).unwrap().into_parts().0
    }

    struct AsyncBodyCodePredicate;

    #[async_trait]
    impl UnauthorizedPredicate for AsyncBodyCodePredicate {
        async fn is_unauthorized(&self, response: &Parts) -> bool {
            tokio::task::yield_now().await;
            response
                .headers
                .get("x-error-code")
                .is_some_and(|v| v == "token_expired")
        }
    }

    #[tokio::test]
    async fn default_predicate_matches_only_401() {
        let policy = InterceptorPolicy::default();
        assert!(policy.is_unauthorized(&head(StatusCode::UNAUTHORIZED)).await);
        assert!(!policy.is_unauthorized(&head(StatusCode::FORBIDDEN)).await);
        assert!(!policy.is_unauthorized(&head(StatusCode::OK)).await);
        assert!(!policy.is_unauthorized(&head(StatusCode::PROXY_AUTHENTICATION_REQUIRED)).await);
    }

    #[tokio::test]
    async fn closure_predicate_replaces_default() {
        let policy = InterceptorPolicy::default()
            .with_predicate(|r: &Parts| r.status == StatusCode::FORBIDDEN);
        assert!(policy.is_unauthorized(&head(StatusCode::FORBIDDEN)).await);
        assert!(!policy.is_unauthorized(&head(StatusCode::UNAUTHORIZED)).await);
    }

    #[tokio::test]
    async fn async_predicate_sees_headers() {
        let policy = InterceptorPolicy::default().with_predicate(AsyncBodyCodePredicate);

        let mut expired = head(StatusCode::OK);
        expired
            .headers
            .insert("x-error-code", HeaderValue::from_static("token_expired"));

        assert!(policy.is_unauthorized(&expired).await);
        assert!(!policy.is_unauthorized(&head(StatusCode::UNAUTHORIZED)).await);
    }

    #[test]
    fn default_applier_writes_bearer_authorization() {
        let mut headers = HeaderMap::new();
        InterceptorPolicy::default()
            .apply(&mut headers, &TokenResult::new("abc"))
            .unwrap();

        let value = headers.get(AUTHORIZATION).unwrap();
        assert_eq!(value, "Bearer abc");
        assert!(value.is_sensitive());
    }

    #[test]
    fn applier_keeps_explicit_token_type() {
        let mut headers = HeaderMap::new();
        InterceptorPolicy::default()
            .apply(&mut headers, &TokenResult::new("abc").with_token_type("DPoP"))
            .unwrap();
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "DPoP abc");
    }

    #[test]
    fn applier_overwrites_previous_credential() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer old"));
        headers.insert("x-request-id", HeaderValue::from_static("req-1"));

        InterceptorPolicy::default()
            .apply(&mut headers, &TokenResult::new("new"))
            .unwrap();

        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(headers.get(AUTHORIZATION).unwrap(), "Bearer new");
        assert_eq!(headers.get("x-request-id").unwrap(), "req-1");
    }

    #[test]
    fn applier_rejects_control_characters() {
        let mut headers = HeaderMap::new();
        let err = InterceptorPolicy::default()
            .apply(&mut headers, &TokenResult::new("bad\ntoken"))
            .unwrap_err();
        assert!(matches!(err, InterceptError::InvalidHeaderValue(_)));
        assert!(headers.is_empty());
    }

    #[test]
    fn from_config_uses_custom_header_and_type() {
        let config = InterceptorConfig {
            header_name: "x-api-token".into(),
            default_token_type: "Token".into(),
        };
        let policy = InterceptorPolicy::from_config(&config).unwrap();

        let mut headers = HeaderMap::new();
        policy.apply(&mut headers, &TokenResult::new("abc")).unwrap();

        assert_eq!(headers.get("x-api-token").unwrap(), "Token abc");
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[test]
    fn from_config_rejects_invalid_header() {
        let config = InterceptorConfig {
            header_name: "not a header".into(),
            ..Default::default()
        };
        assert!(InterceptorPolicy::from_config(&config).is_err());
    }

    #[test]
    fn custom_resolver_replaces_default() {
        let shared: Arc<dyn TokenProvider> =
            Arc::new(StaticTokenProvider::new(TokenResult::new("shared")));
        let policy = InterceptorPolicy::default().with_resolver(move |_, _| Ok(Arc::clone(&shared)));

        let registry = TokenProviderRegistry::new();
        assert!(policy.resolve(&registry, &ApiTarget::named("anything")).is_ok());
        assert!(
            InterceptorPolicy::default()
                .resolve(&registry, &ApiTarget::named("anything"))
                .is_err()
        );
    }
}
