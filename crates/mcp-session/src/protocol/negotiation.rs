//! MCP capability negotiation during initialization.

use crate::config::SessionConfig;
use crate::types::{
    Capabilities, InitializeParams, InitializeResult, McpError, McpResult, PeerInfo,
    ServerCapabilities,
};

/// Applies one side's configuration to the initialize exchange.
#[derive(Debug, Clone, Copy)]
pub struct Negotiator<'a> {
    config: &'a SessionConfig,
}

impl<'a> Negotiator<'a> {
    pub fn new(config: &'a SessionConfig) -> Self {
        Self { config }
    }

    /// Server side: answer a client's initialize request.
    ///
    /// The client's requested version is echoed when supported; otherwise the
    /// server answers with its preferred version and leaves the decision to
    /// the client.
    pub fn respond(
        &self,
        params: InitializeParams,
        capabilities: ServerCapabilities,
    ) -> (InitializeResult, PeerInfo) {
        let protocol_version = if self.config.supports_version(&params.protocol_version) {
            params.protocol_version.clone()
        } else {
            tracing::warn!(
                "Client requested protocol version {}, server supports {:?}. Answering with {}.",
                params.protocol_version,
                self.config.supported_versions,
                self.config.protocol_version
            );
            self.config.protocol_version.clone()
        };

        tracing::info!(
            "Initialized with client: {} v{}",
            params.client_info.name,
            params.client_info.version
        );

        let result = InitializeResult {
            protocol_version: protocol_version.clone(),
            capabilities,
            server_info: self.config.implementation.clone(),
            instructions: self.config.instructions.clone(),
        };
        let peer = PeerInfo {
            protocol_version,
            capabilities: Capabilities::Client(params.capabilities),
            implementation: params.client_info,
            instructions: None,
        };

        (result, peer)
    }

    /// Client side: accept the server's initialize result, or fail fast.
    pub fn accept(&self, result: InitializeResult) -> McpResult<PeerInfo> {
        if !self.config.supports_version(&result.protocol_version) {
            return Err(McpError::UnsupportedProtocolVersion {
                requested: result.protocol_version,
                supported: self.config.supported_versions.join(", "),
            });
        }

        tracing::info!(
            "Connected to server: {} v{} (protocol {})",
            result.server_info.name,
            result.server_info.version,
            result.protocol_version
        );

        Ok(PeerInfo {
            protocol_version: result.protocol_version,
            capabilities: Capabilities::Server(result.capabilities),
            implementation: result.server_info,
            instructions: result.instructions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ClientCapabilities, Implementation};

    fn params(version: &str) -> InitializeParams {
        InitializeParams {
            protocol_version: version.to_string(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation::new("test-client", "1.0"),
        }
    }

    #[test]
    fn server_echoes_supported_version() {
        let config = SessionConfig::default().with_protocol_version("1.0");
        let (result, peer) = Negotiator::new(&config).respond(params("1.0"), ServerCapabilities::default());
        assert_eq!(result.protocol_version, "1.0");
        assert_eq!(peer.implementation.name, "test-client");
        assert!(peer.capabilities.as_client().is_some());
    }

    #[test]
    fn server_falls_back_to_preferred_version() {
        let config = SessionConfig::default().with_supported_versions(["2024-11-05"]);
        let (result, _) = Negotiator::new(&config).respond(params("1999-01-01"), ServerCapabilities::default());
        assert_eq!(result.protocol_version, config.protocol_version);
    }

    #[test]
    fn client_rejects_unknown_version() {
        let config = SessionConfig::default();
        let result = InitializeResult {
            protocol_version: "0.1".to_string(),
            capabilities: ServerCapabilities::default(),
            server_info: Implementation::new("srv", "0"),
            instructions: None,
        };
        let err = Negotiator::new(&config).accept(result).unwrap_err();
        assert!(matches!(err, McpError::UnsupportedProtocolVersion { .. }));
    }
}
