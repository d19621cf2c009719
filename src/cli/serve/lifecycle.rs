//! Listener binding and shutdown.

use std::{
    net::{IpAddr, SocketAddr},
    thread::{self, JoinHandle},
    time::Duration,
};

use thiserror::Error;
use tiny_http::{Server, SslConfig};

use crate::log;

/// Maximum number of port binding attempts.
const MAX_PORT_RETRIES: u16 = 10;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind after {attempts} attempts (ports {first}-{last}): {reason}")]
    Bind {
        attempts: u16,
        first: u16,
        last: u16,
        reason: String,
    },
}

/// Bind to the specified interface and port, with automatic port retry.
///
/// With `tls` set the listener speaks HTTPS.
pub fn bind_with_retry(
    interface: IpAddr,
    base_port: u16,
    tls: Option<&SslConfig>,
) -> Result<(Server, SocketAddr), ServeError> {
    let mut last_error = String::new();
    let mut last_port = base_port;

    for offset in 0..MAX_PORT_RETRIES {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);
        last_port = port;

        let bound = match tls {
            Some(ssl) => Server::https(addr, clone_ssl(ssl)),
            None => Server::http(addr),
        };
        match bound {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                let addr = server.server_addr().to_ip().unwrap_or(addr);
                return Ok((server, addr));
            }
            Err(e) => last_error = e.to_string(),
        }
    }

    Err(ServeError::Bind {
        attempts: MAX_PORT_RETRIES,
        first: base_port,
        last: last_port,
        reason: last_error,
    })
}

fn clone_ssl(ssl: &SslConfig) -> SslConfig {
    SslConfig {
        certificate: ssl.certificate.clone(),
        private_key: ssl.private_key.clone(),
    }
}

/// Browser-facing base URL of a bound listener.
///
/// Unspecified interfaces are reached through localhost.
pub fn base_url(addr: SocketAddr, https: bool) -> String {
    let scheme = if https { "https" } else { "http" };
    let host = match addr.ip() {
        ip if ip.is_unspecified() || ip.is_loopback() => "localhost".to_string(),
        IpAddr::V6(ip) => format!("[{ip}]"),
        IpAddr::V4(ip) => ip.to_string(),
    };
    format!("{scheme}://{host}:{}", addr.port())
}

/// Wait for the request loop to drain (max 2 seconds).
pub fn wait_for_shutdown(handle: JoinHandle<()>) {
    for _ in 0..40 {
        if handle.is_finished() {
            let _ = handle.join();
            return;
        }
        thread::sleep(Duration::from_millis(50));
    }
}
