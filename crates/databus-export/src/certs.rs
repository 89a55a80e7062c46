//! Certificate files that exist only while a secured context is created.
//!
//! The export configuration carries the server certificate, its private key
//! and the CA certificate as base64 DER.  The transport wants file paths, so
//! the material is decoded into owner-only files and removed again as soon
//! as the context exists.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use base64::{Engine as _, engine::general_purpose};
use databus_types::ContextConfig;
use tracing::{debug, warn};

use crate::ExportError;

pub const SERVER_CERT_FILE: &str = "opcua_server_cert.der";
pub const SERVER_KEY_FILE: &str = "opcua_server_key.der";
pub const CA_CERT_FILE: &str = "ca_cert.der";

/// Base64 encoded DER material as found in the configuration.
#[derive(Clone, Copy)]
pub struct CertificateMaterial<'a> {
    pub server_cert: &'a str,
    pub server_key: &'a str,
    pub ca_cert: &'a str,
}

/// Decoded certificate files on disk.  Removed by [`remove`](Self::remove)
/// or on drop.
#[derive(Debug)]
pub struct CertificateFiles {
    cert: PathBuf,
    key: PathBuf,
    ca: PathBuf,
    removed: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Public API
// ─────────────────────────────────────────────────────────────────────────────

impl CertificateFiles {
    /// Decode all three entries, then write them into `dir`.
    ///
    /// Nothing is written unless every entry decodes.  A failed write removes
    /// the files written before it.
    pub fn write(dir: &Path, material: CertificateMaterial<'_>) -> Result<Self, ExportError> {
        let decoded = [
            decode("server_cert", material.server_cert)?,
            decode("server_key", material.server_key)?,
            decode("ca_cert", material.ca_cert)?,
        ];
        let files = Self {
            cert: dir.join(SERVER_CERT_FILE),
            key: dir.join(SERVER_KEY_FILE),
            ca: dir.join(CA_CERT_FILE),
            removed: false,
        };
        for (path, bytes) in files.paths().into_iter().zip(&decoded) {
            write_owner_only(path, bytes).map_err(|e| ExportError::CertificateIo {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;
            debug!(path = %path.display(), bytes = bytes.len(), "certificate file written");
        }
        Ok(files)
    }

    /// Server certificate, private key and CA certificate paths.
    pub fn paths(&self) -> [&Path; 3] {
        [self.cert.as_path(), self.key.as_path(), self.ca.as_path()]
    }

    /// Point `config` at these files.
    pub fn apply_to(&self, config: ContextConfig) -> ContextConfig {
        config.with_security(
            self.cert.to_string_lossy(),
            self.key.to_string_lossy(),
            self.ca.to_string_lossy(),
        )
    }

    pub fn remove(mut self) {
        self.remove_files();
    }
}

impl Drop for CertificateFiles {
    fn drop(&mut self) {
        self.remove_files();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

impl CertificateFiles {
    fn remove_files(&mut self) {
        if self.removed {
            return;
        }
        for path in self.paths() {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "certificate file removed"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "failed to remove certificate file"),
            }
        }
        self.removed = true;
    }
}

fn decode(key: &'static str, value: &str) -> Result<Vec<u8>, ExportError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ExportError::InvalidCertificate {
            key,
            reason: "not configured".to_string(),
        });
    }
    general_purpose::STANDARD
        .decode(value)
        .map_err(|e| ExportError::InvalidCertificate {
            key,
            reason: e.to_string(),
        })
}

fn write_owner_only(path: &Path, bytes: &[u8]) -> io::Result<()> {
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(bytes))
    }
    #[cfg(not(unix))]
    fs::write(path, bytes)
}
