//! Configuration loading and resolution.

use std::time::Duration;

use crate::types::{Implementation, MCP_VERSION, SUPPORTED_VERSIONS};

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";

/// What to do with inbound requests that arrive before the handshake completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PreReadyPolicy {
    /// Answer immediately with a `ServerNotInitialized` error.
    #[default]
    Reject,
    /// Hold the request until the session is ready, or drop it if the session closes first.
    Queue,
}

/// What to do when a handler is registered for a method that already has one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DuplicateHandlerPolicy {
    /// Last registration wins.
    #[default]
    Replace,
    /// Keep the first registration and return `HandlerAlreadyRegistered`.
    Reject,
}

/// Runtime settings for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Name and version advertised during the handshake.
    pub implementation: Implementation,
    /// Version requested by a client or answered by a server when the
    /// client's request is not supported.
    pub protocol_version: String,
    pub supported_versions: Vec<String>,
    /// Free-form usage hints returned by a server in its initialize result.
    pub instructions: Option<String>,
    /// Upper bound on every outbound call. `None` waits indefinitely.
    pub request_timeout: Option<Duration>,
    /// Deadline given to inbound request handlers. `None` means no deadline.
    pub handler_timeout: Option<Duration>,
    pub pre_ready_policy: PreReadyPolicy,
    pub duplicate_handler_policy: DuplicateHandlerPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            implementation: Implementation::default(),
            protocol_version: MCP_VERSION.to_string(),
            supported_versions: SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect(),
            instructions: None,
            request_timeout: Some(Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)),
            handler_timeout: None,
            pre_ready_policy: PreReadyPolicy::Reject,
            duplicate_handler_policy: DuplicateHandlerPolicy::Replace,
        }
    }
}

impl SessionConfig {
    /// Defaults overlaid with `MCP_*` environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(version) = std::env::var("MCP_PROTOCOL_VERSION") {
            config = config.with_protocol_version(version);
        }
        if let Some(secs) = env_secs("MCP_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(secs) = env_secs("MCP_HANDLER_TIMEOUT_SECS") {
            config.handler_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Ok(flag) = std::env::var("MCP_QUEUE_BEFORE_READY") {
            if matches!(flag.as_str(), "1" | "true" | "yes") {
                config.pre_ready_policy = PreReadyPolicy::Queue;
            }
        }

        config
    }

    pub fn with_implementation(mut self, name: impl Into<String>, version: impl Into<String>) -> Self {
        self.implementation = Implementation::new(name, version);
        self
    }

    /// Prefer `version`, adding it to the supported set if missing.
    pub fn with_protocol_version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        if !self.supported_versions.contains(&version) {
            self.supported_versions.insert(0, version.clone());
        }
        self.protocol_version = version;
        self
    }

    /// Replace the supported set. The preferred version is kept in it.
    pub fn with_supported_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_versions = versions.into_iter().map(Into::into).collect();
        if !self.supported_versions.contains(&self.protocol_version) {
            self.supported_versions.insert(0, self.protocol_version.clone());
        }
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_pre_ready_policy(mut self, policy: PreReadyPolicy) -> Self {
        self.pre_ready_policy = policy;
        self
    }

    pub fn with_duplicate_handler_policy(mut self, policy: DuplicateHandlerPolicy) -> Self {
        self.duplicate_handler_policy = policy;
        self
    }

    pub fn supports_version(&self, version: &str) -> bool {
        self.supported_versions.iter().any(|v| v == version)
    }
}

fn env_secs(key: &str) -> Option<u64> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(secs) => Some(secs),
            Err(_) => {
                tracing::warn!("Ignoring {key}={raw}: not a number of seconds");
                None
            }
        },
        Err(_) => None,
    }
}

/// Resolve the TCP listen address.
pub fn resolve_listen_addr(explicit: Option<&str>) -> String {
    if let Some(addr) = explicit {
        return addr.to_string();
    }

    if let Ok(env_addr) = std::env::var("MCP_LISTEN_ADDR") {
        return env_addr;
    }

    DEFAULT_LISTEN_ADDR.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_version_is_always_supported() {
        let config = SessionConfig::default().with_protocol_version("1.0");
        assert_eq!(config.protocol_version, "1.0");
        assert!(config.supports_version("1.0"));
        assert!(config.supports_version(MCP_VERSION));

        let config = config.with_supported_versions(["0.9"]);
        assert!(config.supports_version("1.0"));
        assert!(config.supports_version("0.9"));
        assert!(!config.supports_version(MCP_VERSION));
    }

    #[test]
    fn explicit_listen_addr_wins() {
        assert_eq!(resolve_listen_addr(Some("0.0.0.0:9000")), "0.0.0.0:9000");
    }
}
