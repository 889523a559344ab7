//! Per-request metadata (§9's redesign note).
//!
//! The original reads `REQUEST_METHOD`/`SERVER_NAME`/`REQUEST_URI`/
//! `SCRIPT_NAME`/`HTTP_USER_AGENT` from a process-global environment map.
//! That's a side channel; here it's a value the caller builds and passes
//! into [`crate::handler::SessionHandler::read`] and `write` explicitly.
//! Its absence only degrades diagnostics and bot classification, never
//! correctness.

/// Request metadata used for diagnostics (the `req` field written on lock
/// acquisition) and bot classification.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: Option<String>,
    pub host: Option<String>,
    pub uri: Option<String>,
    pub script_name: Option<String>,
    pub user_agent: Option<String>,
}

impl RequestContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    #[must_use]
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    #[must_use]
    pub fn with_uri(mut self, uri: impl Into<String>) -> Self {
        self.uri = Some(uri.into());
        self
    }

    #[must_use]
    pub fn with_script_name(mut self, script_name: impl Into<String>) -> Self {
        self.script_name = Some(script_name.into());
        self
    }

    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    /// User-agent string to feed the bot classifier; empty if absent.
    #[must_use]
    pub fn user_agent_or_empty(&self) -> &str {
        self.user_agent.as_deref().unwrap_or_default()
    }

    /// Diagnostic descriptor written to the `req` field: `METHOD HOST URI`
    /// when all three are present, otherwise the script name, otherwise an
    /// empty string.
    #[must_use]
    pub fn descriptor(&self) -> String {
        match (&self.method, &self.host, &self.uri) {
            (Some(m), Some(h), Some(u)) => format!("{m} {h} {u}"),
            _ => self.script_name.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn descriptor_prefers_method_host_uri() {
        let ctx = RequestContext::new()
            .with_method("GET")
            .with_host("example.com")
            .with_uri("/path")
            .with_script_name("ignored.php");
        assert_eq!(ctx.descriptor(), "GET example.com /path");
    }

    #[test]
    fn descriptor_falls_back_to_script_name() {
        let ctx = RequestContext::new().with_script_name("worker.php");
        assert_eq!(ctx.descriptor(), "worker.php");
    }

    #[test]
    fn descriptor_empty_when_nothing_present() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.descriptor(), "");
    }

    #[test]
    fn user_agent_or_empty_defaults() {
        let ctx = RequestContext::new();
        assert_eq!(ctx.user_agent_or_empty(), "");
    }
}
