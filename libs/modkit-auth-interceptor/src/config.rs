use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::token::DEFAULT_TOKEN_TYPE;

/// Settings for the authorization carrier written by the default applier.
///
/// ```yaml
/// header_name: authorization
/// default_token_type: Bearer
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterceptorConfig {
    /// Header that carries the credential (default: `authorization`).
    pub header_name: String,

    /// Token type used when the credential has none (default: `Bearer`).
    pub default_token_type: String,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            header_name: http::header::AUTHORIZATION.as_str().to_owned(),
            default_token_type: DEFAULT_TOKEN_TYPE.to_owned(),
        }
    }
}

impl InterceptorConfig {
    /// Check that the header name parses and the default type is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when `header_name` is not a valid header name
    /// or `default_token_type` is blank or contains whitespace.
    pub fn validate(&self) -> Result<(), ConfigError> {
        http::HeaderName::from_bytes(self.header_name.as_bytes())?;
        let token_type = self.default_token_type.as_str();
        if token_type.is_empty() || token_type.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidTokenType(token_type.to_owned()));
        }
        Ok(())
    }
}

/// Refresh policy of a [`CachedTokenProvider`](crate::CachedTokenProvider).
///
/// Durations use humantime notation (`"30s"`, `"5m"`).
///
/// ```yaml
/// refresh_skew: 30s
/// default_ttl: 5m
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TokenCacheConfig {
    /// How long before expiry a cached token is considered stale (default: 30 s).
    #[serde(with = "humantime_duration")]
    pub refresh_skew: Duration,

    /// Lifetime assumed when the credential carries no `expires_in`
    /// (default: none, i.e. cached until invalidated).
    #[serde(with = "humantime_duration::option")]
    pub default_ttl: Option<Duration>,
}

impl Default for TokenCacheConfig {
    fn default() -> Self {
        Self {
            refresh_skew: Duration::from_secs(30),
            default_ttl: None,
        }
    }
}

mod humantime_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer, de};

    pub fn serialize<S: Serializer>(value: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&humantime::format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(d)?;
        humantime::parse_duration(&raw).map_err(de::Error::custom)
    }

    pub mod option {
        use std::time::Duration;

        use serde::{Deserialize, Deserializer, Serializer, de};

        #[allow(clippy::ref_option)]
        pub fn serialize<S: Serializer>(value: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
            match value {
                Some(d) => s.collect_str(&humantime::format_duration(*d)),
                None => s.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
            Option::<String>::deserialize(d)?
                .map(|raw| humantime::parse_duration(&raw).map_err(de::Error::custom))
                .transpose()
        }
    }
}
