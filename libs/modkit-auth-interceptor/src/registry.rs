use std::any::{TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::ResolveError;
use crate::provider::TokenProvider;

/// Identity of the remote API an interceptor talks to.
///
/// Either a Rust type (usually the typed client or its SDK marker) or a plain
/// name taken from configuration. Two targets are equal only if they are of
/// the same kind and identify the same type or name.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ApiTarget(TargetKey);

#[derive(Clone, PartialEq, Eq, Hash)]
enum TargetKey {
    Type { id: TypeId, name: &'static str },
    Named(Arc<str>),
}

impl ApiTarget {
    /// Target identified by the Rust type `T`.
    #[must_use]
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self(TargetKey::Type {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        })
    }

    /// Target identified by a configured name.
    #[must_use]
    pub fn named(name: impl Into<Arc<str>>) -> Self {
        Self(TargetKey::Named(name.into()))
    }

    /// Human-readable label, for logs and metrics.
    #[must_use]
    pub fn label(&self) -> &str {
        match &self.0 {
            TargetKey::Type { name, .. } => name,
            TargetKey::Named(name) => name.as_ref(),
        }
    }
}

impl fmt::Display for ApiTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl fmt::Debug for ApiTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiTarget").field(&self.label()).finish()
    }
}

/// Dependency context that token providers are resolved from.
///
/// Built once at the composition root and then only read. Different API
/// targets may be routed to different providers (e.g. different `OAuth2`
/// clients) while sharing one interceptor implementation.
#[derive(Clone, Default)]
pub struct TokenProviderRegistry {
    providers: HashMap<ApiTarget, Arc<dyn TokenProvider>>,
    fallback: Option<Arc<dyn TokenProvider>>,
}

impl TokenProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `provider` for `target`, replacing any previous registration.
    #[must_use]
    pub fn with_provider(mut self, target: ApiTarget, provider: Arc<dyn TokenProvider>) -> Self {
        self.providers.insert(target, provider);
        self
    }

    /// Provider handed out for targets without an explicit registration.
    #[must_use]
    pub fn with_fallback(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.fallback = Some(provider);
        self
    }

    /// Provider registered for exactly `target`.
    #[must_use]
    pub fn get(&self, target: &ApiTarget) -> Option<Arc<dyn TokenProvider>> {
        self.providers.get(target).cloned()
    }

    #[must_use]
    pub fn fallback(&self) -> Option<Arc<dyn TokenProvider>> {
        self.fallback.clone()
    }

    /// Exact registration first, then the fallback.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError::NotRegistered`] when neither matches.
    pub fn resolve(&self, target: &ApiTarget) -> Result<Arc<dyn TokenProvider>, ResolveError> {
        self.get(target)
            .or_else(|| self.fallback())
            .ok_or_else(|| ResolveError::NotRegistered {
                target: target.clone(),
            })
    }
}

impl fmt::Debug for TokenProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenProviderRegistry")
            .field("targets", &self.providers.keys().collect::<Vec<_>>())
            .field("has_fallback", &self.fallback.is_some())
            .finish()
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::provider::StaticTokenProvider;
    use crate::token::TokenResult;
    use secrecy::ExposeSecret;

    struct BillingApi;
    struct InventoryApi;

    fn provider(token: &str) -> Arc<dyn TokenProvider> {
        Arc::new(StaticTokenProvider::new(TokenResult::new(token)))
    }

    #[test]
    fn type_targets_compare_by_type() {
        assert_eq!(ApiTarget::of::<BillingApi>(), ApiTarget::of::<BillingApi>());
        assert_ne!(ApiTarget::of::<BillingApi>(), ApiTarget::of::<InventoryApi>());
        assert!(ApiTarget::of::<BillingApi>().label().ends_with("BillingApi"));
    }

    #[test]
    fn named_and_type_targets_never_collide() {
        let by_type = ApiTarget::of::<BillingApi>();
        let by_name = ApiTarget::named(by_type.label());
        assert_ne!(by_type, by_name);
    }

    #[tokio::test]
    async fn resolves_exact_registration() {
        let registry = TokenProviderRegistry::new()
            .with_provider(ApiTarget::of::<BillingApi>(), provider("billing"))
            .with_provider(ApiTarget::named("inventory"), provider("inventory"));

        let billing = registry.resolve(&ApiTarget::of::<BillingApi>()).unwrap();
        let inventory = registry.resolve(&ApiTarget::named("inventory")).unwrap();

        assert_eq!(billing.get_token().await.unwrap().token().expose_secret(), "billing");
        assert_eq!(inventory.get_token().await.unwrap().token().expose_secret(), "inventory");
    }

    #[tokio::test]
    async fn falls_back_for_unknown_target() {
        let registry = TokenProviderRegistry::new().with_fallback(provider("shared"));
        let resolved = registry.resolve(&ApiTarget::of::<InventoryApi>()).unwrap();
        assert_eq!(resolved.get_token().await.unwrap().token().expose_secret(), "shared");
    }

    #[test]
    fn unknown_target_without_fallback_is_an_error() {
        let registry = TokenProviderRegistry::new()
            .with_provider(ApiTarget::of::<BillingApi>(), provider("billing"));

        let err = registry.resolve(&ApiTarget::named("inventory")).err().unwrap();
        assert!(matches!(err, ResolveError::NotRegistered { ref target } if target.label() == "inventory"));
    }

    #[test]
    fn debug_lists_targets_without_tokens() {
        let registry = TokenProviderRegistry::new()
            .with_provider(ApiTarget::named("billing"), provider("secret-billing-token"));
        let dbg = format!("{registry:?}");
        assert!(dbg.contains("billing"));
        assert!(!dbg.contains("secret-billing-token"));
    }
}
