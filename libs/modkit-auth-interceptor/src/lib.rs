#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![warn(warnings)]

//! Outbound authorization interceptor for `ModKit` HTTP clients.
//!
//! [`TokenAuthLayer`] is a Tower layer that:
//! - fetches a credential from a [`TokenProvider`] and writes it into every
//!   outbound request (`Authorization: Bearer <token>` by default);
//! - when the response is unauthorized (`401` by default), invalidates that
//!   credential and sends the same request once more with a fresh one.
//!
//! Credential caching and refresh coordination belong to the provider.
//! [`CachedTokenProvider`] is a single-flight cache around any async fetcher:
//! concurrent callers share one fetch, and concurrent rejections of the same
//! token cause one refresh.
//!
//! The three replaceable steps (provider resolution, unauthorized predicate,
//! credential application) live in [`InterceptorPolicy`].
//!
//! # Example
//!
//! ```ignore
//! use modkit_auth_interceptor::{
//!     ApiTarget, CachedTokenProvider, TokenAuthLayer, TokenCacheConfig,
//!     TokenProviderRegistry,
//! };
//!
//! let provider = CachedTokenProvider::new(
//!     || async { my_vendor_login().await },
//!     TokenCacheConfig::default(),
//! );
//! let registry = TokenProviderRegistry::new()
//!     .with_provider(ApiTarget::of::<VendorApi>(), Arc::new(provider));
//!
//! let svc = tower::ServiceBuilder::new()
//!     .layer(TokenAuthLayer::for_api::<VendorApi>(&registry)?)
//!     .service(transport);
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod layer;
pub mod metrics;
pub mod policy;
pub mod provider;
pub mod registry;
pub mod token;

pub use cache::{CachedTokenProvider, TokenFetcher};
pub use config::{InterceptorConfig, TokenCacheConfig};
pub use error::{ConfigError, InterceptError, ResolveError, TokenError};
pub use layer::{TokenAuthLayer, TokenAuthService};
pub use metrics::{InterceptEvent, InterceptMetrics, LoggingMetrics, NoOpMetrics};
pub use policy::{
    InterceptorPolicy, UnauthorizedPredicate, default_resolver, header_applier,
    status_is_unauthorized,
};
pub use provider::{StaticTokenProvider, TokenProvider};
pub use registry::{ApiTarget, TokenProviderRegistry};
pub use token::{DEFAULT_TOKEN_TYPE, TokenResult};
