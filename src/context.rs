//! Client-wide configuration. A `Context` carries the knobs every operation
//! reads: which receiver app to probe for, how long discovery and
//! per-message operations are allowed to take, and whether transport is
//! swapped out for the canned fixtures in [`crate::testdata`].

use std::time::Duration;

/// `02834648`, the default media receiver app id, used by callers that
/// don't override [`Context::application_id`].
pub const DEFAULT_APPLICATION_ID: &str = "02834648";

const DEFAULT_DISCOVERY_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MESSAGE_TIMEOUT_MS: u64 = 500;

#[derive(Debug, Clone)]
pub struct Context {
    application_id: String,
    discovery_timeout: Duration,
    message_timeout: Duration,
    test_mode: bool,
}

impl Context {
    pub fn new() -> Self {
        Context::default()
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn set_application_id(&mut self, application_id: impl Into<String>) -> &mut Self {
        self.application_id = application_id.into();
        self
    }

    pub fn discovery_timeout(&self) -> Duration {
        self.discovery_timeout
    }

    pub fn set_discovery_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.discovery_timeout = timeout;
        self
    }

    pub fn message_timeout(&self) -> Duration {
        self.message_timeout
    }

    pub fn set_message_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.message_timeout = timeout;
        self
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    /// Routes every `Connection` built from this context through the
    /// in-memory fixture transport in [`crate::testdata`] instead of a real
    /// TLS socket, for the replay-driven tests described in the testable
    /// properties.
    pub fn set_test_mode(&mut self, test_mode: bool) -> &mut Self {
        self.test_mode = test_mode;
        self
    }
}

impl Default for Context {
    fn default() -> Self {
        Context {
            application_id: DEFAULT_APPLICATION_ID.to_owned(),
            discovery_timeout: Duration::from_millis(DEFAULT_DISCOVERY_TIMEOUT_MS),
            message_timeout: Duration::from_millis(DEFAULT_MESSAGE_TIMEOUT_MS),
            test_mode: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_values() {
        let ctx = Context::default();
        assert_eq!(ctx.application_id(), DEFAULT_APPLICATION_ID);
        assert_eq!(ctx.discovery_timeout(), Duration::from_millis(5_000));
        assert_eq!(ctx.message_timeout(), Duration::from_millis(500));
        assert!(!ctx.test_mode());
    }

    #[test]
    fn setters_are_chainable() {
        let mut ctx = Context::new();
        ctx.set_application_id("02834648")
            .set_discovery_timeout(Duration::from_secs(1))
            .set_test_mode(true);
        assert_eq!(ctx.application_id(), "02834648");
        assert_eq!(ctx.discovery_timeout(), Duration::from_secs(1));
        assert!(ctx.test_mode());
    }
}
