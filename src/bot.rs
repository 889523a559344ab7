//! Bot classification (§4.2).
//!
//! The override hook is modeled as an injected trait object handed to the
//! handler at construction time rather than a mutable global (§9's redesign
//! note): a process-wide `static mut` would make classification behavior
//! depend on call order across unrelated handler instances.

use std::sync::LazyLock;

use regex::Regex;

/// Case-insensitive pattern enumerating common crawler/bot user-agent tokens.
static BOT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)bot|crawl|slurp|spider|curl|wget|yandex|facebookexternalhit|googlebot|bingbot|duckduckbot|baiduspider|ia_archiver",
    )
    .expect("bot pattern is valid")
});

/// Consulted, after the fixed regex makes its decision, with `(userAgent,
/// regexVerdict)`; its return value is the final verdict.
pub trait BotOverride: Send + Sync {
    fn classify(&self, user_agent: &str, regex_verdict: bool) -> bool;
}

/// Return `true` when `user_agent` is empty or matches [`BOT_PATTERN`], then
/// hand that verdict to `override_hook` if one is installed.
#[must_use]
pub fn is_bot(user_agent: &str, override_hook: Option<&dyn BotOverride>) -> bool {
    let verdict = user_agent.is_empty() || BOT_PATTERN.is_match(user_agent);
    match override_hook {
        Some(hook) => hook.classify(user_agent, verdict),
        None => verdict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_user_agent_is_a_bot() {
        assert!(is_bot("", None));
    }

    #[test]
    fn googlebot_is_a_bot() {
        assert!(is_bot("Googlebot/2.1 (+http://www.google.com/bot.html)", None));
    }

    #[test]
    fn curl_is_a_bot() {
        assert!(is_bot("curl/8.4.0", None));
    }

    #[test]
    fn ordinary_browser_is_not_a_bot() {
        assert!(!is_bot(
            "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36",
            None
        ));
    }

    #[test]
    fn match_is_case_insensitive() {
        assert!(is_bot("SPIDER-CRAWLER", None));
    }

    struct AlwaysBot;
    impl BotOverride for AlwaysBot {
        fn classify(&self, _user_agent: &str, _regex_verdict: bool) -> bool {
            true
        }
    }

    struct NeverBot;
    impl BotOverride for NeverBot {
        fn classify(&self, _user_agent: &str, _regex_verdict: bool) -> bool {
            false
        }
    }

    #[test]
    fn override_hook_wins_over_regex_verdict() {
        assert!(is_bot("Mozilla/5.0 ordinary browser", Some(&AlwaysBot)));
        assert!(!is_bot("Googlebot", Some(&NeverBot)));
    }
}
