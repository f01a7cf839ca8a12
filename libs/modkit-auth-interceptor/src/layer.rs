use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use http::{Request, Response};
use tokio_util::sync::CancellationToken;
use tower::{BoxError, Layer, Service, ServiceExt};

use crate::error::{InterceptError, ResolveError};
use crate::metrics::{InterceptEvent, InterceptMetrics, NoOpMetrics};
use crate::policy::InterceptorPolicy;
use crate::provider::TokenProvider;
use crate::registry::{ApiTarget, TokenProviderRegistry};
use crate::token::TokenResult;

/// State shared by a layer and every service it produces.
#[derive(Clone)]
struct Shared {
    target: ApiTarget,
    provider: Arc<dyn TokenProvider>,
    policy: InterceptorPolicy,
    metrics: Arc<dyn InterceptMetrics>,
}

/// Tower layer that attaches a credential to outbound requests and retries
/// once with a fresh credential when the response is unauthorized.
///
/// The layer is bound to exactly one [`TokenProvider`] at construction. It
/// holds no mutable state of its own; all credential caching and refresh
/// coordination lives in the provider.
#[derive(Clone)]
pub struct TokenAuthLayer {
    shared: Arc<Shared>,
}

impl TokenAuthLayer {
    /// Resolve the provider for `target` from `registry` using the policy's
    /// resolver, and bind the layer to it.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when no provider can be bound; there is no
    /// unbound fallback.
    pub fn resolve(
        registry: &TokenProviderRegistry,
        target: ApiTarget,
        policy: InterceptorPolicy,
    ) -> Result<Self, ResolveError> {
        let provider = policy.resolve(registry, &target)?;
        tracing::debug!(target_api = %target, "token provider bound");
        Ok(Self::from_parts(target, provider, policy))
    }

    /// [`resolve`](Self::resolve) for the API identified by type `T`, with the
    /// default policy.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] when no provider is registered for `T`.
    pub fn for_api<T: ?Sized + 'static>(registry: &TokenProviderRegistry) -> Result<Self, ResolveError> {
        Self::resolve(registry, ApiTarget::of::<T>(), InterceptorPolicy::default())
    }

    /// Bind directly to `provider`, skipping resolution.
    #[must_use]
    pub fn new(target: ApiTarget, provider: Arc<dyn TokenProvider>) -> Self {
        Self::from_parts(target, provider, InterceptorPolicy::default())
    }

    /// Replace the predicate and applier. The provider stays bound; the
    /// policy's resolver is not consulted again.
    #[must_use]
    pub fn with_policy(self, policy: InterceptorPolicy) -> Self {
        let mut shared = Shared::clone(&self.shared);
        shared.policy = policy;
        Self {
            shared: Arc::new(shared),
        }
    }

    #[must_use]
    pub fn with_metrics(self, metrics: Arc<dyn InterceptMetrics>) -> Self {
        let mut shared = Shared::clone(&self.shared);
        shared.metrics = metrics;
        Self {
            shared: Arc::new(shared),
        }
    }

    #[must_use]
    pub fn target(&self) -> &ApiTarget {
        &self.shared.target
    }

    fn from_parts(target: ApiTarget, provider: Arc<dyn TokenProvider>, policy: InterceptorPolicy) -> Self {
        Self {
            shared: Arc::new(Shared {
                target,
                provider,
                policy,
                metrics: Arc::new(NoOpMetrics),
            }),
        }
    }
}

impl fmt::Debug for TokenAuthLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthLayer")
            .field("target", &self.shared.target)
            .finish_non_exhaustive()
    }
}

impl<S> Layer<S> for TokenAuthLayer {
    type Service = TokenAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TokenAuthService {
            inner,
            shared: Arc::clone(&self.shared),
        }
    }
}

/// Tower service produced by [`TokenAuthLayer`].
///
/// Per request:
/// 1. fetch a credential and write it into the request headers;
/// 2. forward to the inner service;
/// 3. if the policy classifies the response as unauthorized, invalidate that
///    credential, fetch again and forward the same request one more time,
///    returning the second response whatever its status.
///
/// Transport and provider errors are returned as-is and never retried. A
/// [`CancellationToken`] in the request extensions aborts the call at any
/// suspension point with [`InterceptError::Cancelled`].
///
/// The request body must be `Clone` because the request may be sent twice.
#[derive(Clone)]
pub struct TokenAuthService<S> {
    inner: S,
    shared: Arc<Shared>,
}

impl<S> fmt::Debug for TokenAuthService<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthService")
            .field("target", &self.shared.target)
            .finish_non_exhaustive()
    }
}

impl<S, B, ResBody> Service<Request<B>> for TokenAuthService<S>
where
    S: Service<Request<B>, Response = Response<ResBody>> + Clone + Send + 'static,
    S::Error: Into<BoxError>,
    S::Future: Send,
    B: Clone + Send + 'static,
    ResBody: Send + 'static,
{
    type Response = Response<ResBody>;
    type Error = InterceptError;
    type Future = Pin<Box<dyn Future<Output = Result<Response<ResBody>, InterceptError>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner
            .poll_ready(cx)
            .map_err(|e| InterceptError::Transport(e.into()))
    }

    fn call(&mut self, req: Request<B>) -> Self::Future {
        // Clone-swap pattern (Tower Service contract).
        let clone = self.inner.clone();
        let inner = std::mem::replace(&mut self.inner, clone);
        let shared = Arc::clone(&self.shared);
        let cancel = req.extensions().get::<CancellationToken>().cloned();

        Box::pin(async move {
            match cancel {
                Some(cancel) => tokio::select! {
                    biased;
                    () = cancel.cancelled() => Err(InterceptError::Cancelled),
                    res = shared.intercept(inner, req) => res,
                },
                None => shared.intercept(inner, req).await,
            }
        })
    }
}

impl Shared {
    async fn intercept<S, B, ResBody>(
        &self,
        mut inner: S,
        req: Request<B>,
    ) -> Result<Response<ResBody>, InterceptError>
    where
        S: Service<Request<B>, Response = Response<ResBody>>,
        S::Error: Into<BoxError>,
        B: Clone,
    {
        let (parts, body) = req.into_parts();

        // `inner` was readied by `poll_ready` before `call`.
        let first = Request::from_parts(parts.clone(), body.clone());
        let (response, rejected) = self.send(&mut inner, first, false).await?;

        let (head, response_body) = response.into_parts();
        if !self.policy.is_unauthorized(&head).await {
            return Ok(Response::from_parts(head, response_body));
        }
        drop(response_body);

        self.metrics
            .record_event(InterceptEvent::Unauthorized, &self.target);
        tracing::debug!(
            target_api = %self.target,
            status = %head.status,
            "credential rejected, retrying once with a fresh credential"
        );

        self.provider.invalidate(&rejected).await;

        inner
            .ready()
            .await
            .map_err(|e| InterceptError::Transport(e.into()))?;
        let (response, _) = self
            .send(&mut inner, Request::from_parts(parts, body), true)
            .await?;
        Ok(response)
    }

    /// Fetch, apply, forward. Returns the credential that was sent.
    ///
    /// A retry is counted once it is handed to the transport, whatever the
    /// transport then returns.
    async fn send<S, B, ResBody>(
        &self,
        inner: &mut S,
        mut req: Request<B>,
        is_retry: bool,
    ) -> Result<(Response<ResBody>, TokenResult), InterceptError>
    where
        S: Service<Request<B>, Response = Response<ResBody>>,
        S::Error: Into<BoxError>,
    {
        let token = self.provider.get_token().await?;
        self.policy.apply(req.headers_mut(), &token)?;

        let call = inner.call(req);
        if is_retry {
            self.metrics.record_event(InterceptEvent::Retried, &self.target);
        }
        let response = call.await.map_err(|e| InterceptError::Transport(e.into()))?;
        Ok((response, token))
    }
}
