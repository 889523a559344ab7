//! Configuration surface consumed by the session handler.
//!
//! Mirrors a config-provider interface: one accessor per tunable, with a
//! concrete, `serde`-deserializable struct supplying every default named in
//! the glossary. A field left at its default means "use the built-in value".

use std::time::Duration;

use serde::Deserialize;

/// Compression algorithm selected for the payload codec (§4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLibrary {
    Gzip,
    Lzf,
    Lz4,
    Snappy,
    None,
}

impl Default for CompressionLibrary {
    fn default() -> Self {
        Self::None
    }
}

/// Sentinel topology, when the handler should discover the master through
/// Redis Sentinel rather than connecting directly (§4.7).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SentinelConfig {
    /// Sentinel endpoints, e.g. `["10.0.0.1:26379", "10.0.0.2:26379"]`.
    #[serde(default)]
    pub servers: Vec<String>,

    /// Name of the monitored master group.
    #[serde(default)]
    pub master: String,

    /// Whether to verify the resolved master's `ROLE` reply before trusting it.
    #[serde(default)]
    pub verify_master: bool,

    /// Extra round-robin passes over `servers` before giving up.
    #[serde(default)]
    pub connect_retries: u32,

    /// Password for authenticating to the sentinels themselves, if different
    /// from the main Redis password.
    #[serde(default)]
    pub password: Option<String>,
}

/// All tunables consumed by [`crate::handler::SessionHandler`] and its
/// collaborators. A falsy/zero value for a tunable field means "use the
/// default" exactly as in the glossary.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    pub database: i64,
    pub password: Option<String>,
    pub timeout_secs: u64,

    /// Key prefix applied to every session key (e.g. producing `sess_<id>`
    /// becomes `<persistent_identifier><id>`).
    pub persistent_identifier: String,

    pub compression_threshold: usize,
    pub compression_library: CompressionLibrary,

    pub max_concurrency: u32,
    pub lifetime: i64,
    pub max_lifetime: i64,
    pub min_lifetime: i64,
    pub disable_locking: bool,
    pub bot_lifetime: i64,
    pub bot_first_lifetime: i64,
    pub first_lifetime: i64,
    pub break_after: u64,
    pub fail_after: u64,

    pub sentinel: Option<SentinelConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            host: String::from("127.0.0.1"),
            port: 6379,
            database: 0,
            password: None,
            timeout_secs: 5,
            persistent_identifier: String::from("sess_"),
            compression_threshold: 0,
            compression_library: CompressionLibrary::None,
            max_concurrency: 6,
            lifetime: 1440,
            max_lifetime: 2_592_000,
            min_lifetime: 60,
            disable_locking: false,
            bot_lifetime: 7200,
            bot_first_lifetime: 60,
            first_lifetime: 600,
            break_after: 30,
            fail_after: 15,
            sentinel: None,
        }
    }
}

impl SessionConfig {
    /// Redis connection URL built from `host`/`port`/`database`, ignoring
    /// Sentinel topology (used only for the direct-connect path of §4.7).
    #[must_use]
    pub fn direct_url(&self) -> String {
        format!("redis://{}:{}/{}", self.host, self.port, self.database)
    }

    /// Full session key for a given session id.
    #[must_use]
    pub fn session_key(&self, id: &str) -> String {
        format!("{}{}", self.persistent_identifier, id)
    }

    /// Connection/pool-wait timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `breakAfter` converted to ticks of `SLEEP_TIME` (§4.5).
    #[must_use]
    pub fn break_after_ticks(&self) -> u64 {
        seconds_to_ticks(self.break_after)
    }

    /// `failAfter` converted to ticks of `SLEEP_TIME` (§4.5).
    #[must_use]
    pub fn fail_after_ticks(&self) -> u64 {
        seconds_to_ticks(self.fail_after)
    }
}

/// Fixed polling interval of the lock acquisition loop (§4.5).
pub const SLEEP_TIME: Duration = Duration::from_millis(500);

/// Every `DETECT_ZOMBIES` ticks, zombie-waiter/zombie-owner checks run (§4.5).
pub const DETECT_ZOMBIES: u64 = 20;

fn seconds_to_ticks(seconds: u64) -> u64 {
    let tick_ms = u64::try_from(SLEEP_TIME.as_millis()).unwrap_or(500);
    (seconds * 1000).div_ceil(tick_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_match_glossary() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.max_concurrency, 6);
        assert_eq!(cfg.first_lifetime, 600);
        assert_eq!(cfg.bot_first_lifetime, 60);
        assert_eq!(cfg.bot_lifetime, 7200);
        assert_eq!(cfg.max_lifetime, 2_592_000);
        assert_eq!(cfg.min_lifetime, 60);
        assert_eq!(cfg.break_after, 30);
        assert_eq!(cfg.fail_after, 15);
    }

    #[test]
    fn ticks_conversion_is_exact_on_half_second_boundaries() {
        let cfg = SessionConfig {
            break_after: 30,
            fail_after: 15,
            ..SessionConfig::default()
        };
        assert_eq!(cfg.break_after_ticks(), 60);
        assert_eq!(cfg.fail_after_ticks(), 30);
    }

    #[test]
    fn session_key_uses_persistent_identifier() {
        let cfg = SessionConfig::default();
        assert_eq!(cfg.session_key("abc123"), "sess_abc123");
    }
}
