//! Session lifetime policy (§4.3).

use crate::bot::{BotOverride, is_bot};
use crate::config::SessionConfig;

/// Choose a TTL (seconds) for a session given its write count and
/// user-agent, clamped to `[minLifetime, maxLifetime]`.
///
/// Order of precedence, first match wins:
/// 1. Bot with `botLifetime > 0`: `botFirstLifetime * (1 + writes)` on the
///    first write if `botFirstLifetime > 0`, else `botLifetime`.
/// 2. First write (`writes <= 1`) with `firstLifetime > 0`:
///    `firstLifetime * (1 + writes)`.
/// 3. Otherwise `cfg.lifetime`.
#[must_use]
pub fn compute_lifetime(
    session_writes: i64,
    user_agent: &str,
    cfg: &SessionConfig,
    override_hook: Option<&dyn BotOverride>,
) -> i64 {
    let raw = if cfg.bot_lifetime > 0 && is_bot(user_agent, override_hook) {
        if session_writes <= 1 && cfg.bot_first_lifetime > 0 {
            cfg.bot_first_lifetime * (1 + session_writes)
        } else {
            cfg.bot_lifetime
        }
    } else if session_writes <= 1 && cfg.first_lifetime > 0 {
        cfg.first_lifetime * (1 + session_writes)
    } else {
        cfg.lifetime
    };

    raw.clamp(cfg.min_lifetime, cfg.max_lifetime)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg() -> SessionConfig {
        SessionConfig {
            bot_lifetime: 7200,
            bot_first_lifetime: 60,
            first_lifetime: 600,
            lifetime: 1440,
            min_lifetime: 60,
            max_lifetime: 2_592_000,
            ..SessionConfig::default()
        }
    }

    #[test]
    fn bot_first_write_uses_bot_first_lifetime_scaled() {
        let result = compute_lifetime(0, "Googlebot", &cfg(), None);
        // 60 * (1 + 0) = 60, clamped stays 60.
        assert_eq!(result, 60);
    }

    #[test]
    fn bot_lifetime_clamps_small_bot_first_lifetime_up() {
        let mut c = cfg();
        c.bot_first_lifetime = 30;
        let result = compute_lifetime(0, "Googlebot", &c, None);
        // 30 * 1 = 30, clamped up to min_lifetime 60.
        assert_eq!(result, 60);
    }

    #[test]
    fn bot_steady_state_uses_bot_lifetime() {
        let result = compute_lifetime(5, "Googlebot", &cfg(), None);
        assert_eq!(result, 7200);
    }

    #[test]
    fn non_bot_first_write_uses_first_lifetime_scaled() {
        let result = compute_lifetime(1, "Mozilla/5.0", &cfg(), None);
        // 600 * (1 + 1) = 1200.
        assert_eq!(result, 1200);
    }

    #[test]
    fn non_bot_steady_state_uses_base_lifetime() {
        let result = compute_lifetime(10, "Mozilla/5.0", &cfg(), None);
        assert_eq!(result, 1440);
    }

    #[test]
    fn result_is_always_within_bounds() {
        let mut c = cfg();
        c.lifetime = 999_999_999;
        let result = compute_lifetime(50, "Mozilla/5.0", &c, None);
        assert_eq!(result, c.max_lifetime);
    }
}
