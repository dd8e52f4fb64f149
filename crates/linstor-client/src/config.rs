//! Client configuration.
//!
//! Settings live in `~/.config/linstor/client.toml` by default:
//!
//! ```toml
//! [controller]
//! uris = ["linstor://ctrl1", "linstor+ssl://ctrl2"]
//! connect_timeout = 10
//! request_timeout = 300
//!
//! [tls]
//! ca_file = "/etc/linstor/ca.pem"
//! ```
//!
//! The `--controllers` flag (or `LS_CONTROLLERS`) replaces `controller.uris`.

use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use linstor_core::{ControllerEndpoint, parse_controller_list};
use linstor_protocol::{MAX_API_VERSION, MAX_FRAME_SIZE, MIN_API_VERSION};

use crate::error::{ClientError, ClientResult};

/// Configuration for the linstor client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Controller connection settings.
    pub controller: ControllerSettings,

    /// TLS settings for `linstor+ssl://` controllers.
    pub tls: TlsSettings,
}

/// Controller connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerSettings {
    /// Controllers to try, in order.
    pub uris: Vec<String>,

    /// Connect plus handshake timeout in seconds.
    pub connect_timeout: u64,

    /// Time to wait for a reply in seconds.
    pub request_timeout: u64,

    /// Reader liveness check interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Largest accepted frame body in bytes.
    pub max_frame_size: u32,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            uris: vec!["linstor://localhost".to_string()],
            connect_timeout: 10,
            request_timeout: 300,
            poll_interval_ms: 1000,
            max_frame_size: MAX_FRAME_SIZE,
        }
    }
}

/// TLS settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsSettings {
    /// PEM bundle of trusted certificate authorities.
    pub ca_file: Option<PathBuf>,

    /// PEM client certificate chain, for controllers requiring client auth.
    pub cert_file: Option<PathBuf>,

    /// PEM private key matching `cert_file`.
    pub key_file: Option<PathBuf>,

    /// Name checked against the controller certificate instead of the host.
    pub server_name: Option<String>,
}

impl ClientConfig {
    /// Loads configuration from the default path, or defaults if absent.
    pub fn load() -> ClientResult<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> ClientResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            ClientError::Config(format!("failed to parse {}: {}", path.display(), e))
        })
    }

    /// Returns the default configuration file path.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("linstor")
            .join("client.toml")
    }

    /// Replaces the controller list with a comma-separated override.
    pub fn with_controllers(mut self, list: &str) -> Self {
        self.controller.uris = list.split(',').map(|s| s.trim().to_string()).collect();
        self
    }

    /// Parses the configured controller list.
    pub fn endpoints(&self) -> ClientResult<Vec<ControllerEndpoint>> {
        Ok(parse_controller_list(&self.controller.uris.join(","))?)
    }

    /// Builds connection options from these settings.
    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            connect_timeout: Duration::from_secs(self.controller.connect_timeout),
            request_timeout: Duration::from_secs(self.controller.request_timeout),
            poll_interval: Duration::from_millis(self.controller.poll_interval_ms.max(1)),
            max_frame_size: self.controller.max_frame_size,
            tls: self.tls.clone(),
            ..ConnectOptions::default()
        }
    }

    /// Renders the effective configuration as TOML.
    pub fn to_toml(&self) -> ClientResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ClientError::Config(format!("failed to serialize config: {}", e)))
    }
}

/// Runtime options of one controller connection.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Bound on TCP connect, TLS negotiation and version handshake together.
    pub connect_timeout: Duration,
    /// Default time a request waits for its reply.
    pub request_timeout: Duration,
    /// How often an idle reader wakes up to check the connection state.
    pub poll_interval: Duration,
    /// Largest accepted frame body.
    pub max_frame_size: u32,
    /// Accepted controller API versions.
    pub api_versions: RangeInclusive<u32>,
    /// TLS settings for encrypted endpoints.
    pub tls: TlsSettings,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
            max_frame_size: MAX_FRAME_SIZE,
            api_versions: MIN_API_VERSION..=MAX_API_VERSION,
            tls: TlsSettings::default(),
        }
    }
}

impl ConnectOptions {
    /// Builder: set connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder: set request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builder: set reader poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builder: set maximum frame body size.
    pub fn with_max_frame_size(mut self, max: u32) -> Self {
        self.max_frame_size = max;
        self
    }

    /// Builder: set the accepted API version range.
    pub fn with_api_versions(mut self, versions: RangeInclusive<u32>) -> Self {
        self.api_versions = versions;
        self
    }

    /// Builder: set TLS settings.
    pub fn with_tls(mut self, tls: TlsSettings) -> Self {
        self.tls = tls;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linstor_core::TransportKind;

    #[test]
    fn defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.controller.uris, vec!["linstor://localhost"]);
        assert_eq!(config.controller.request_timeout, 300);
        assert_eq!(config.tls, TlsSettings::default());

        let options = config.connect_options();
        assert_eq!(options.connect_timeout, Duration::from_secs(10));
        assert_eq!(options.api_versions, 1..=1);
        assert_eq!(options.max_frame_size, MAX_FRAME_SIZE);
    }

    #[test]
    fn loads_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(
            &path,
            r#"
[controller]
uris = ["ctrl1", "linstor+ssl://ctrl2"]
request_timeout = 30

[tls]
ca_file = "/etc/linstor/ca.pem"
"#,
        )
        .unwrap();

        let config = ClientConfig::load_from(&path).unwrap();
        assert_eq!(config.controller.request_timeout, 30);
        assert_eq!(config.controller.connect_timeout, 10);
        assert_eq!(
            config.tls.ca_file.as_deref(),
            Some(Path::new("/etc/linstor/ca.pem"))
        );

        let endpoints = config.endpoints().unwrap();
        assert_eq!(endpoints.len(), 2);
        assert_eq!(endpoints[1].transport, TransportKind::Ssl);
        assert_eq!(
            config.connect_options().request_timeout,
            Duration::from_secs(30)
        );
    }

    #[test]
    fn rejects_malformed_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.toml");
        std::fs::write(&path, "[controller\nuris = 3").unwrap();
        assert!(matches!(
            ClientConfig::load_from(&path),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn controller_override() {
        let config = ClientConfig::default().with_controllers("a, b:4000");
        let endpoints = config.endpoints().unwrap();
        assert_eq!(endpoints[0], ControllerEndpoint::plain("a"));
        assert_eq!(endpoints[1].port, 4000);

        let empty = ClientConfig::default().with_controllers(" ");
        assert!(matches!(
            empty.endpoints(),
            Err(ClientError::InvalidEndpoint(_))
        ));
    }

    #[test]
    fn dumps_toml() {
        let text = ClientConfig::default().to_toml().unwrap();
        assert!(text.contains("[controller]"));
        assert!(text.contains("linstor://localhost"));
    }
}
