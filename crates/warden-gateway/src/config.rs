//! Gateway configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use warden_core::{CapabilityManifest, Retention, Reversibility, TrustLevel};

use crate::{GatewayError, DEFAULT_HOST, DEFAULT_PORT};

/// Main gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Address of the wrapped agent
    pub upstream_url: String,

    /// Identity of the wrapped agent
    pub agent_id: String,

    /// Version of the wrapped agent
    pub agent_version: String,

    /// Trust level used when no manifest file is supplied
    pub default_trust_level: TrustLevel,

    /// Reversibility used when no manifest file is supplied
    pub default_reversibility: Reversibility,

    /// Retention used when no manifest file is supplied
    pub default_retention: Retention,

    /// Whether a human reviews request data
    pub human_review: bool,

    /// Outbound call timeout in seconds
    pub forward_timeout_secs: u64,

    /// Directory for per-trace audit segments; None keeps them in memory
    pub trace_dir: Option<String>,

    /// Path to a manifest JSON file; overrides the default_* fields
    pub manifest_path: Option<String>,

    /// Enable tracing
    pub tracing: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            upstream_url: "http://127.0.0.1:9000".to_string(),
            agent_id: "wrapped-agent".to_string(),
            agent_version: "0.1.0".to_string(),
            default_trust_level: TrustLevel::Standard,
            default_reversibility: Reversibility::Partial,
            default_retention: Retention::Temporary,
            human_review: false,
            forward_timeout_secs: 30,
            trace_dir: None,
            manifest_path: None,
            tracing: true,
        }
    }
}

impl GatewayConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the host
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the upstream agent address
    pub fn with_upstream(mut self, url: impl Into<String>) -> Self {
        self.upstream_url = url.into();
        self
    }

    /// Set the agent identity
    pub fn with_agent_id(mut self, id: impl Into<String>) -> Self {
        self.agent_id = id.into();
        self
    }

    /// Set the outbound timeout
    pub fn with_forward_timeout_secs(mut self, secs: u64) -> Self {
        self.forward_timeout_secs = secs;
        self
    }

    /// Set the audit segment directory
    pub fn with_trace_dir(mut self, dir: impl Into<String>) -> Self {
        self.trace_dir = Some(dir.into());
        self
    }

    /// Get the socket address
    pub fn socket_addr(&self) -> crate::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|_| {
                GatewayError::InvalidConfig(format!("invalid address {}:{}", self.host, self.port))
            })
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: &str) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Build configuration from WARDEN_* environment variables, falling
    /// back to defaults for anything unset.
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("WARDEN_HOST") {
            config.host = host;
        }
        if let Some(port) = env_parse::<u16>("WARDEN_PORT")? {
            config.port = port;
        }
        if let Ok(url) = std::env::var("WARDEN_UPSTREAM_URL") {
            config.upstream_url = url;
        }
        if let Ok(id) = std::env::var("WARDEN_AGENT_ID") {
            config.agent_id = id;
        }
        if let Ok(version) = std::env::var("WARDEN_AGENT_VERSION") {
            config.agent_version = version;
        }
        if let Some(level) = env_enum("WARDEN_TRUST_LEVEL")? {
            config.default_trust_level = level;
        }
        if let Some(reversibility) = env_enum("WARDEN_REVERSIBILITY")? {
            config.default_reversibility = reversibility;
        }
        if let Some(retention) = env_enum("WARDEN_RETENTION")? {
            config.default_retention = retention;
        }
        if let Some(review) = env_bool("WARDEN_HUMAN_REVIEW") {
            config.human_review = review;
        }
        if let Some(secs) = env_parse::<u64>("WARDEN_FORWARD_TIMEOUT_SECS")? {
            config.forward_timeout_secs = secs;
        }
        if let Ok(dir) = std::env::var("WARDEN_TRACE_DIR") {
            config.trace_dir = Some(dir);
        }
        if let Ok(path) = std::env::var("WARDEN_MANIFEST_PATH") {
            config.manifest_path = Some(path);
        }

        Ok(config)
    }

    /// The manifest the gateway serves and decides with: loaded from
    /// `manifest_path` when set, otherwise synthesized from the defaults.
    pub fn resolve_manifest(&self) -> crate::Result<CapabilityManifest> {
        if let Some(ref path) = self.manifest_path {
            return CapabilityManifest::from_file(path)
                .map_err(|e| GatewayError::InvalidConfig(e.to_string()));
        }
        Ok(self.synthesize_manifest())
    }

    /// Build a manifest from the config's default fields
    pub fn synthesize_manifest(&self) -> CapabilityManifest {
        CapabilityManifest::new(self.agent_id.clone(), self.agent_version.clone())
            .with_trust_level(self.default_trust_level)
            .with_reversibility(self.default_reversibility)
            .with_retention(self.default_retention)
            .with_human_review(self.human_review)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> crate::Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| GatewayError::InvalidConfig(format!("invalid {}: {}", name, raw))),
        Err(_) => Ok(None),
    }
}

fn env_enum<T: serde::de::DeserializeOwned>(name: &str) -> crate::Result<Option<T>> {
    match std::env::var(name) {
        Ok(raw) => serde_json::from_value(serde_json::Value::String(raw.trim().to_string()))
            .map(Some)
            .map_err(|_| GatewayError::InvalidConfig(format!("invalid {}", name))),
        Err(_) => Ok(None),
    }
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.host, DEFAULT_HOST);
        assert_eq!(config.forward_timeout_secs, 30);
        assert!(config.trace_dir.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = GatewayConfig::new()
            .with_host("0.0.0.0")
            .with_port(8080)
            .with_upstream("http://agent:9000")
            .with_agent_id("billing-agent");

        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 8080);
        assert_eq!(config.upstream_url, "http://agent:9000");
        assert_eq!(config.agent_id, "billing-agent");
    }

    #[test]
    fn test_config_serialization() {
        let config = GatewayConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: GatewayConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.port, parsed.port);
        assert_eq!(config.default_retention, parsed.default_retention);
    }

    #[test]
    fn test_synthesized_manifest_uses_defaults() {
        let config = GatewayConfig::new().with_agent_id("agent-x");
        let manifest = config.synthesize_manifest();
        assert_eq!(manifest.agent_id, "agent-x");
        assert_eq!(manifest.trust_level, TrustLevel::Standard);
        assert_eq!(manifest.capabilities.reversibility, Reversibility::Partial);
        assert_eq!(manifest.privacy_contract.retention, Retention::Temporary);
    }

    #[test]
    fn test_socket_addr() {
        let config = GatewayConfig::default();
        assert!(config.socket_addr().is_ok());

        let bad = GatewayConfig::new().with_host("not a host");
        assert!(bad.socket_addr().is_err());
    }
}
