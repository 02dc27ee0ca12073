//! TOML-based relay configuration.
//!
//! All runtime settings live in one file, loaded once at process start and
//! immutable afterwards. Example:
//!
//! ```toml
//! [listen]
//! bind_address = "0.0.0.0"
//! port = 2083
//!
//! # Optional: presence of this section enables TLS on the listener.
//! [tls]
//! certificate = "certs/cert.pem"
//! private_key = "certs/key.pem"
//!
//! [relay]
//! dial_timeout_secs = 10
//! close_grace_secs = 5
//!
//! [routes]
//! "/hub" = 327
//! "/smp" = 330
//! ```
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file, so a minimal
//! file containing only a `[routes]` table is a complete configuration.
//!
//! Validation (port ranges, parsable bind address) happens in
//! [`RelayConfig::validate`], called once at startup; a validation failure is
//! fatal before the listener binds.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::routes::RouteTable;

/// Error type for configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred while reading the config file.
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The listen port is outside the usable range (port 0 cannot be a
    /// stable, advertised endpoint).
    #[error("listen port must be in 1..=65535")]
    InvalidListenPort,

    /// A route maps to port 0, which no backend can listen on.
    #[error("route {path:?} maps to invalid backend port 0")]
    InvalidRoutePort { path: String },

    /// The bind address + port pair does not form a valid socket address.
    #[error("invalid bind address {addr:?}")]
    InvalidBindAddress { addr: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level relay configuration as read from the TOML file.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RelayConfig {
    /// Listener endpoint settings.
    #[serde(default)]
    pub listen: ListenConfig,
    /// TLS material for the listener. `None` means plain TCP.
    #[serde(default)]
    pub tls: Option<TlsConfig>,
    /// Per-session timing knobs.
    #[serde(default)]
    pub relay: RelayTuning,
    /// Request path → backend TCP port on the local host.
    #[serde(default)]
    pub routes: HashMap<String, u16>,
}

/// Bind address and port for the single listening socket.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ListenConfig {
    /// IP address to bind to. `"0.0.0.0"` accepts connections from any
    /// interface; use `"127.0.0.1"` to accept only local connections.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port the relay listens on.
    #[serde(default = "default_listen_port")]
    pub port: u16,
}

/// Certificate/key file pair for the listener's TLS handshake.
///
/// Both files are PEM. The material is loaded once at startup; a load
/// failure aborts the process before any connection is accepted.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TlsConfig {
    /// Path to the PEM certificate chain presented to clients.
    pub certificate: PathBuf,
    /// Path to the PEM private key matching the certificate.
    pub private_key: PathBuf,
}

/// Timing knobs for the per-session relay lifecycle.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RelayTuning {
    /// Maximum time to wait for the backend WebSocket dial to complete.
    #[serde(default = "default_dial_timeout_secs")]
    pub dial_timeout_secs: u64,
    /// Upper bound on the best-effort close of a connection during session
    /// teardown. Keeps an unresponsive peer from pinning session resources.
    #[serde(default = "default_close_grace_secs")]
    pub close_grace_secs: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_listen_port() -> u16 {
    2083
}
fn default_dial_timeout_secs() -> u64 {
    10
}
fn default_close_grace_secs() -> u64 {
    5
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_listen_port(),
        }
    }
}

impl Default for RelayTuning {
    fn default() -> Self {
        Self {
            dial_timeout_secs: default_dial_timeout_secs(),
            close_grace_secs: default_close_grace_secs(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: ListenConfig::default(),
            tls: None,
            relay: RelayTuning::default(),
            routes: HashMap::new(),
        }
    }
}

// ── Loading and validation ────────────────────────────────────────────────────

impl RelayConfig {
    /// Loads the configuration from a TOML file.
    ///
    /// Unlike optional per-user settings, the relay cannot do anything useful
    /// without its route table, so a missing file is an error rather than a
    /// silent fallback to defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] for file-system errors (including "not
    /// found") and [`ConfigError::Parse`] if the TOML is malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: RelayConfig = toml::from_str(&content)?;
        Ok(cfg)
    }

    /// Checks the invariants that `serde` cannot express.
    ///
    /// # Errors
    ///
    /// Returns the first of: [`ConfigError::InvalidListenPort`] when the
    /// listen port is 0, [`ConfigError::InvalidRoutePort`] for a route
    /// mapped to port 0, [`ConfigError::InvalidBindAddress`] when the bind
    /// address does not parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.listen.port == 0 {
            return Err(ConfigError::InvalidListenPort);
        }
        for (path, port) in &self.routes {
            if *port == 0 {
                return Err(ConfigError::InvalidRoutePort { path: path.clone() });
            }
        }
        self.bind_addr()?;
        Ok(())
    }

    /// The socket address the listener binds to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidBindAddress`] when `bind_address` is
    /// not a valid IP address literal.
    pub fn bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let addr = format!("{}:{}", self.listen.bind_address, self.listen.port);
        addr.parse()
            .map_err(|_| ConfigError::InvalidBindAddress { addr })
    }

    /// Builds the immutable route table from the configured map.
    pub fn route_table(&self) -> RouteTable {
        RouteTable::new(self.routes.clone())
    }

    /// Backend dial timeout as a [`Duration`].
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.relay.dial_timeout_secs)
    }

    /// Bounded close grace period as a [`Duration`].
    pub fn close_grace(&self) -> Duration {
        Duration::from_secs(self.relay.close_grace_secs)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_CONFIG: &str = r#"
        [listen]
        bind_address = "127.0.0.1"
        port = 2053

        [tls]
        certificate = "certs/cert.pem"
        private_key = "certs/key.pem"

        [relay]
        dial_timeout_secs = 3
        close_grace_secs = 2

        [routes]
        "/hub" = 327
        "/smp" = 330
    "#;

    #[test]
    fn test_full_config_parses() {
        let cfg: RelayConfig = toml::from_str(FULL_CONFIG).expect("deserialize");

        assert_eq!(cfg.listen.bind_address, "127.0.0.1");
        assert_eq!(cfg.listen.port, 2053);
        assert_eq!(cfg.relay.dial_timeout_secs, 3);
        assert_eq!(cfg.relay.close_grace_secs, 2);
        assert_eq!(cfg.routes.get("/hub"), Some(&327));
        assert_eq!(cfg.routes.get("/smp"), Some(&330));
    }

    #[test]
    fn test_tls_section_presence_enables_tls() {
        let cfg: RelayConfig = toml::from_str(FULL_CONFIG).expect("deserialize");
        let tls = cfg.tls.expect("tls section present");
        assert_eq!(tls.certificate, PathBuf::from("certs/cert.pem"));
        assert_eq!(tls.private_key, PathBuf::from("certs/key.pem"));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        // Only a route table; every other field falls back to its default.
        let cfg: RelayConfig = toml::from_str(
            r#"
            [routes]
            "/hub" = 327
            "#,
        )
        .expect("deserialize minimal");

        assert_eq!(cfg.listen.bind_address, "0.0.0.0");
        assert_eq!(cfg.listen.port, 2083);
        assert!(cfg.tls.is_none());
        assert_eq!(cfg.relay.dial_timeout_secs, 10);
        assert_eq!(cfg.relay.close_grace_secs, 5);
    }

    #[test]
    fn test_empty_config_parses_with_empty_routes() {
        let cfg: RelayConfig = toml::from_str("").expect("deserialize empty");
        assert!(cfg.routes.is_empty());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_route_paths_are_case_sensitive_keys() {
        let cfg: RelayConfig = toml::from_str(
            r#"
            [routes]
            "/hub" = 327
            "/Hub" = 328
            "#,
        )
        .expect("deserialize");
        assert_eq!(cfg.routes.get("/hub"), Some(&327));
        assert_eq!(cfg.routes.get("/Hub"), Some(&328));
    }

    #[test]
    fn test_port_above_u16_range_is_a_parse_error() {
        let result: Result<RelayConfig, toml::de::Error> = toml::from_str(
            r#"
            [routes]
            "/hub" = 70000
            "#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_toml_is_a_parse_error() {
        let result: Result<RelayConfig, toml::de::Error> = toml::from_str("[listen\nport=1");
        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_listen_port_zero() {
        let cfg: RelayConfig = toml::from_str(
            r#"
            [listen]
            port = 0
            "#,
        )
        .expect("deserialize");
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidListenPort)
        ));
    }

    #[test]
    fn test_validate_rejects_route_port_zero() {
        let cfg: RelayConfig = toml::from_str(
            r#"
            [routes]
            "/hub" = 0
            "#,
        )
        .expect("deserialize");
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidRoutePort { path }) if path == "/hub"
        ));
    }

    #[test]
    fn test_validate_rejects_unparsable_bind_address() {
        let cfg: RelayConfig = toml::from_str(
            r#"
            [listen]
            bind_address = "not.an.ip"
            "#,
        )
        .expect("deserialize");
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidBindAddress { .. })
        ));
    }

    #[test]
    fn test_bind_addr_combines_address_and_port() {
        let cfg: RelayConfig = toml::from_str(FULL_CONFIG).expect("deserialize");
        let addr = cfg.bind_addr().expect("bind addr");
        assert_eq!(addr.to_string(), "127.0.0.1:2053");
    }

    #[test]
    fn test_route_table_reflects_configured_routes() {
        let cfg: RelayConfig = toml::from_str(FULL_CONFIG).expect("deserialize");
        let table = cfg.route_table();
        assert_eq!(table.resolve("/hub"), Some(327));
        assert_eq!(table.resolve("/smp"), Some(330));
        assert_eq!(table.resolve("/other"), None);
    }

    #[test]
    fn test_durations_derive_from_tuning_fields() {
        let cfg: RelayConfig = toml::from_str(FULL_CONFIG).expect("deserialize");
        assert_eq!(cfg.dial_timeout(), Duration::from_secs(3));
        assert_eq!(cfg.close_grace(), Duration::from_secs(2));
    }

    #[test]
    fn test_load_reads_config_from_disk() {
        // Unique path under the system temp dir so parallel tests never collide.
        let path = std::env::temp_dir().join(format!("ws_relay_test_{}.toml", uuid::Uuid::new_v4()));
        std::fs::write(&path, FULL_CONFIG).expect("write temp config");

        let cfg = RelayConfig::load(&path).expect("load");
        assert_eq!(cfg.listen.port, 2053);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let path = std::env::temp_dir().join(format!("ws_relay_missing_{}.toml", uuid::Uuid::new_v4()));
        let result = RelayConfig::load(&path);
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }
}
