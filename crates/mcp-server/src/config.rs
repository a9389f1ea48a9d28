//! Server configuration, builder, and the token-bucket rate limiter.
//!
//! Grounded on `turbomcp-server::config::{ServerConfig, RateLimiter,
//! TokenBucket}`; the bucket algorithm is kept verbatim, the surrounding
//! config surface is widened with notification debounce/rate-limit knobs and
//! an env-var overlay (`MCP_*`) via the `config` crate, which
//! `turbomcp-server`'s own config module does not use (it's built by
//! explicit builder calls only).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Default maximum message size (10MB), mirrors `turbomcp-server`'s default.
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Top-level server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub rate_limit: Option<RateLimitConfig>,
    pub notifications: NotificationConfig,
    pub max_message_size: usize,
    /// If unset, `initialize` fails closed on any version mismatch; if set,
    /// falls back to the server's own preferred version rather than failing.
    pub allow_protocol_fallback: bool,
    pub mask_error_details: bool,
    /// Ring buffer size per SSE stream for `Last-Event-ID` replay.
    pub event_store_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            rate_limit: None,
            notifications: NotificationConfig::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            allow_protocol_fallback: false,
            mask_error_details: false,
            event_store_capacity: 1024,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Layer `MCP_*` environment variables over the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if an `MCP_*` variable is present but doesn't
    /// deserialize into the expected field type.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let layered = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(config::Environment::with_prefix("MCP").separator("__"))
            .build()?;
        layered.try_deserialize()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    rate_limit: Option<RateLimitConfig>,
    notifications: Option<NotificationConfig>,
    max_message_size: Option<usize>,
    allow_protocol_fallback: Option<bool>,
    mask_error_details: Option<bool>,
    event_store_capacity: Option<usize>,
}

impl ServerConfigBuilder {
    #[must_use]
    pub fn rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    #[must_use]
    pub fn notifications(mut self, config: NotificationConfig) -> Self {
        self.notifications = Some(config);
        self
    }

    #[must_use]
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = Some(size);
        self
    }

    #[must_use]
    pub fn allow_protocol_fallback(mut self, allow: bool) -> Self {
        self.allow_protocol_fallback = Some(allow);
        self
    }

    #[must_use]
    pub fn mask_error_details(mut self, mask: bool) -> Self {
        self.mask_error_details = Some(mask);
        self
    }

    #[must_use]
    pub fn event_store_capacity(mut self, capacity: usize) -> Self {
        self.event_store_capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn build(self) -> ServerConfig {
        let defaults = ServerConfig::default();
        ServerConfig {
            rate_limit: self.rate_limit.or(defaults.rate_limit),
            notifications: self.notifications.unwrap_or(defaults.notifications),
            max_message_size: self.max_message_size.unwrap_or(defaults.max_message_size),
            allow_protocol_fallback: self
                .allow_protocol_fallback
                .unwrap_or(defaults.allow_protocol_fallback),
            mask_error_details: self.mask_error_details.unwrap_or(defaults.mask_error_details),
            event_store_capacity: self.event_store_capacity.unwrap_or(defaults.event_store_capacity),
        }
    }
}

/// Rate limit configuration for inbound requests.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    #[serde(with = "humantime_serde_duration")]
    pub window: Duration,
    pub per_session: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(1),
            per_session: true,
        }
    }
}

/// Debounce and rate-limit defaults for the notification manager.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationConfig {
    pub default_debounce_ms: u64,
    /// Per-session notification budget, refilled over a one-minute window.
    pub rate_limit_per_minute: u32,
    /// Manager backlog per session: debounce slots beyond this are dropped
    /// rather than queued, same as a rate-limit drop.
    pub max_queued_notifications: u32,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            default_debounce_ms: 100,
            rate_limit_per_minute: 60,
            max_queued_notifications: 1000,
        }
    }
}

/// Minimal inline `humantime`-free duration (de)serializer: seconds as an
/// integer. `turbomcp-server::config` never round-trips `ServerConfig`
/// through `serde`, so it has no equivalent helper; this one exists only to
/// let `RateLimitConfig::window` survive the `config` crate's env overlay.
mod humantime_serde_duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs_f64().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

/// Token-bucket limiter, one per session when `per_session` is set, else a
/// single shared bucket. Ported from `turbomcp-server::config::TokenBucket`.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    global_bucket: Mutex<TokenBucket>,
    session_buckets: Mutex<HashMap<String, TokenBucket>>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            global_bucket: Mutex::new(TokenBucket::new(config.max_requests, config.window)),
            session_buckets: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// `true` if the request is allowed, `false` if it should be rejected.
    pub fn check(&self, session_id: Option<&str>) -> bool {
        if self.config.per_session {
            if let Some(id) = session_id {
                let mut buckets = self.session_buckets.lock().unwrap();
                let bucket = buckets
                    .entry(id.to_string())
                    .or_insert_with(|| TokenBucket::new(self.config.max_requests, self.config.window));
                return bucket.try_acquire();
            }
        }
        self.global_bucket.lock().unwrap().try_acquire()
    }

    pub fn remove_session(&self, session_id: &str) {
        self.session_buckets.lock().unwrap().remove(session_id);
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    max_tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn new(max_requests: u32, window: Duration) -> Self {
        let max_tokens = f64::from(max_requests);
        Self {
            tokens: max_tokens,
            max_tokens,
            refill_rate: max_tokens / window.as_secs_f64(),
            last_refill: Instant::now(),
        }
    }

    fn try_acquire(&mut self) -> bool {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        if elapsed >= Duration::from_millis(10) {
            self.tokens = (self.tokens + elapsed.as_secs_f64() * self.refill_rate).min(self.max_tokens);
            self.last_refill = now;
        }
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = ServerConfig::builder()
            .max_message_size(1024)
            .mask_error_details(true)
            .build();
        assert_eq!(config.max_message_size, 1024);
        assert!(config.mask_error_details);
        assert!(!config.allow_protocol_fallback);
    }

    #[test]
    fn token_bucket_exhausts_then_blocks() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 2,
            window: Duration::from_secs(1),
            per_session: false,
        });
        assert!(limiter.check(None));
        assert!(limiter.check(None));
        assert!(!limiter.check(None));
    }

    #[test]
    fn per_session_buckets_are_independent() {
        let limiter = RateLimiter::new(RateLimitConfig {
            max_requests: 1,
            window: Duration::from_secs(1),
            per_session: true,
        });
        assert!(limiter.check(Some("a")));
        assert!(!limiter.check(Some("a")));
        assert!(limiter.check(Some("b")));
    }
}
