//! Cached development certificate for `serve.https`.
//!
//! The certificate and key live in `serve.cert_dir` as `cert.pem` and
//! `key.pem`. They are (re)generated with `mkcert` when missing or older
//! than [`MAX_AGE`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tiny_http::SslConfig;

use crate::log;
use crate::utils::exec::Cmd;

pub const CERT_FILE: &str = "cert.pem";
pub const KEY_FILE: &str = "key.pem";

/// Regenerate after a week.
pub const MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub struct CertificateStore {
    dir: PathBuf,
}

impl CertificateStore {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
        }
    }

    pub fn cert_path(&self) -> PathBuf {
        self.dir.join(CERT_FILE)
    }

    pub fn key_path(&self) -> PathBuf {
        self.dir.join(KEY_FILE)
    }

    /// Read the cached pair, generating a fresh one first if needed.
    pub fn load_or_generate(&self) -> Result<SslConfig> {
        if !self.is_fresh(SystemTime::now()) {
            self.generate()?;
        }

        let certificate = fs::read(self.cert_path())
            .with_context(|| format!("failed to read {}", self.cert_path().display()))?;
        let private_key = fs::read(self.key_path())
            .with_context(|| format!("failed to read {}", self.key_path().display()))?;
        Ok(SslConfig {
            certificate,
            private_key,
        })
    }

    /// Both files exist and the certificate is younger than [`MAX_AGE`].
    pub fn is_fresh(&self, now: SystemTime) -> bool {
        if !self.key_path().is_file() {
            return false;
        }
        match fs::metadata(self.cert_path()).and_then(|m| m.modified()) {
            Ok(modified) => !is_expired(modified, now),
            Err(_) => false,
        }
    }

    fn generate(&self) -> Result<()> {
        let mkcert = which::which("mkcert")
            .context("`serve.https` needs `mkcert` on PATH to create a local certificate")?;
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;

        log!("serve"; "generating certificate in {}", self.dir.display());
        Cmd::new(mkcert)
            .arg("-cert-file")
            .arg(self.cert_path())
            .arg("-key-file")
            .arg(self.key_path())
            .args(["localhost", "127.0.0.1", "::1"])
            .quiet()
            .run()
            .context("mkcert failed")?;
        Ok(())
    }
}

/// Whether a certificate written at `modified` has outlived [`MAX_AGE`].
///
/// Timestamps in the future count as fresh.
pub fn is_expired(modified: SystemTime, now: SystemTime) -> bool {
    now.duration_since(modified)
        .map(|age| age >= MAX_AGE)
        .unwrap_or(false)
}
