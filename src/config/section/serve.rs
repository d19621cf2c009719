//! `[serve]`: where watch mode listens.
//!
//! ```toml
//! [serve]
//! interface = "127.0.0.1"
//! port = 5000            # HTTP, tries the next ports when busy
//! ws_port = 5001         # hot reload socket, same retry rule
//! https = false          # needs `mkcert` on PATH
//! cert_dir = ".lumen/certs"
//! ```

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::config::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub interface: IpAddr,
    /// First HTTP port tried.
    pub port: u16,
    /// First socket port tried.
    pub ws_port: u16,
    pub https: bool,
    /// Cache for the generated certificate pair, relative to the project root.
    pub cert_dir: PathBuf,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            interface: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 5000,
            ws_port: 5001,
            https: false,
            cert_dir: PathBuf::from(".lumen").join("certs"),
        }
    }
}

impl ServeConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match (self.port, self.ws_port) {
            (0, _) | (_, 0) => Err(ConfigError::Validation("ports must not be 0".into())),
            (http, ws) if http == ws => Err(ConfigError::Validation(
                "`serve.port` and `serve.ws_port` must differ".into(),
            )),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_parse_config;

    #[test]
    fn test_parse_all_fields() {
        let serve = test_parse_config(
            "[serve]\ninterface = \"::\"\nport = 8080\nws_port = 8081\nhttps = true\ncert_dir = \"certs\"",
        )
        .serve;
        assert!(serve.interface.is_unspecified());
        assert!(serve.interface.is_ipv6());
        assert_eq!((serve.port, serve.ws_port), (8080, 8081));
        assert!(serve.https);
        assert_eq!(serve.cert_dir, PathBuf::from("certs"));
    }

    #[test]
    fn test_defaults_are_loopback() {
        let serve = test_parse_config("").serve;
        assert_eq!(serve.interface, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!((serve.port, serve.ws_port), (5000, 5001));
        assert!(!serve.https);
        assert!(serve.validate().is_ok());
    }

    #[test]
    fn test_validate_ports() {
        let zero = ServeConfig { ws_port: 0, ..ServeConfig::default() };
        assert!(zero.validate().is_err());

        let clash = ServeConfig { port: 4000, ws_port: 4000, ..ServeConfig::default() };
        let err = clash.validate().unwrap_err();
        assert!(err.to_string().contains("must differ"));
    }
}
