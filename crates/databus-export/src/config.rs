//! Export service configuration – reads `~/.databus/export.toml`.
//!
//! ```toml
//! export_cfg = "opcua,localhost:65003"
//! topics = ["camera1_stream_results", "camera2_stream_results"]
//! dev_mode = false
//! server_cert = "MIIC..."   # base64 DER
//! server_key = "MIIE..."
//! ca_cert = "MIIC..."
//! cert_dir = "/tmp"
//! ```
//!
//! `OpcuaExportCfg` and `OpcuaDatabusTopics` are accepted as aliases of
//! `export_cfg` and `topics`.

use std::fs;
use std::path::{Path, PathBuf};

use databus_types::TopicDescriptor;
use serde::{Deserialize, Serialize};

use crate::ExportError;
use crate::certs::CertificateMaterial;
use crate::exporter::STREAM_MANAGER_NAMESPACE;

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// `scheme,host:port`, e.g. `opcua,localhost:65003`.
    #[serde(alias = "OpcuaExportCfg")]
    pub export_cfg: String,
    /// Topic names published in the `StreamManager` namespace.
    #[serde(alias = "OpcuaDatabusTopics")]
    pub topics: Vec<String>,
    /// Skip certificates entirely.
    #[serde(default)]
    pub dev_mode: bool,
    #[serde(default)]
    pub server_cert: String,
    #[serde(default)]
    pub server_key: String,
    #[serde(default)]
    pub ca_cert: String,
    /// Where decoded certificates live during context creation.  Defaults to
    /// the system temporary directory.
    #[serde(default)]
    pub cert_dir: Option<PathBuf>,
}

impl std::fmt::Debug for ExportConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let secret = |value: &str| if value.is_empty() { "<not set>" } else { "<redacted>" };
        f.debug_struct("ExportConfig")
            .field("export_cfg", &self.export_cfg)
            .field("topics", &self.topics)
            .field("dev_mode", &self.dev_mode)
            .field("server_cert", &secret(&self.server_cert))
            .field("server_key", &secret(&self.server_key))
            .field("ca_cert", &secret(&self.ca_cert))
            .field("cert_dir", &self.cert_dir)
            .finish()
    }
}

impl ExportConfig {
    /// Turn `scheme,host:port` into the endpoint `scheme://host:port`.
    pub fn endpoint(&self) -> Result<String, ExportError> {
        let mut parts = self.export_cfg.split(',').map(str::trim);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(scheme), Some(address), None) if !scheme.is_empty() && !address.is_empty() => {
                Ok(format!("{scheme}://{address}"))
            }
            _ => Err(ExportError::Config(format!(
                "export_cfg '{}' is not of the form 'scheme,host:port'",
                self.export_cfg
            ))),
        }
    }

    /// One string topic per configured name, in configuration order.
    pub fn topic_descriptors(&self) -> Vec<TopicDescriptor> {
        self.topics
            .iter()
            .map(|name| TopicDescriptor::new(STREAM_MANAGER_NAMESPACE, name, "string"))
            .collect()
    }

    pub fn certificate_material(&self) -> CertificateMaterial<'_> {
        CertificateMaterial {
            server_cert: &self.server_cert,
            server_key: &self.server_key,
            ca_cert: &self.ca_cert,
        }
    }

    pub fn cert_dir(&self) -> PathBuf {
        self.cert_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    pub fn validate(&self) -> Result<(), ExportError> {
        self.endpoint()?;
        if self.topics.iter().all(|t| t.trim().is_empty()) {
            return Err(ExportError::Config(
                "at least one export topic is required".to_string(),
            ));
        }
        Ok(())
    }
}

/// Return `$DATABUS_EXPORT_CONFIG`, or `~/.databus/export.toml` when unset.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("DATABUS_EXPORT_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".databus").join("export.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<ExportConfig>, ExportError> {
    load_from(&config_path())
}

/// Load the config from a specific path and apply environment overrides.
pub fn load_from(path: &Path) -> Result<Option<ExportConfig>, ExportError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        ExportError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: ExportConfig = toml::from_str(&raw)
        .map_err(|e| ExportError::Config(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(Some(cfg))
}

/// Apply environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `DATABUS_EXPORT_CFG` | `export_cfg` |
/// | `DATABUS_EXPORT_TOPICS` | `topics` (comma-separated) |
/// | `DATABUS_DEV_MODE` | `dev_mode` (`true` / `false`) |
/// | `DATABUS_EXPORT_CERT_DIR` | `cert_dir` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut ExportConfig) {
    apply_overrides(cfg, |name| std::env::var(name).ok());
}

fn apply_overrides(cfg: &mut ExportConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("DATABUS_EXPORT_CFG") {
        cfg.export_cfg = v;
    }
    if let Some(v) = var("DATABUS_EXPORT_TOPICS") {
        let topics: Vec<String> = v
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
        if !topics.is_empty() {
            cfg.topics = topics;
        }
    }
    if let Some(v) = var("DATABUS_DEV_MODE")
        && let Ok(dev_mode) = v.trim().to_ascii_lowercase().parse::<bool>()
    {
        cfg.dev_mode = dev_mode;
    }
    if let Some(v) = var("DATABUS_EXPORT_CERT_DIR") {
        cfg.cert_dir = Some(PathBuf::from(v));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
OpcuaExportCfg = "opcua,localhost:65003"
OpcuaDatabusTopics = ["camera1_stream_results", "camera2_stream_results"]
server_cert = "c2VydmVy"
server_key = "a2V5"
ca_cert = "Y2E="
"#;

    fn sample() -> ExportConfig {
        toml::from_str(SAMPLE).unwrap()
    }

    #[test]
    fn config_path_for_home_is_under_dot_databus() {
        assert_eq!(
            config_path_for_home("/home/operator"),
            PathBuf::from("/home/operator/.databus/export.toml")
        );
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_from(&dir.path().join("export.toml")).unwrap().is_none());
    }

    #[test]
    fn original_key_names_are_accepted() {
        let cfg = sample();
        assert_eq!(cfg.export_cfg, "opcua,localhost:65003");
        assert_eq!(cfg.topics.len(), 2);
        assert!(!cfg.dev_mode);
        assert_eq!(cfg.cert_dir, None);
    }

    #[test]
    fn load_from_reads_and_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("export.toml");
        fs::write(&path, SAMPLE).unwrap();
        let cfg = load_from(&path).unwrap().unwrap();
        assert_eq!(cfg.endpoint().unwrap(), "opcua://localhost:65003");

        fs::write(&path, "export_cfg = \"opcua,localhost:65003\"\ntopics = []\n").unwrap();
        assert!(matches!(
            load_from(&path),
            Err(ExportError::Config(m)) if m.contains("topic")
        ));

        fs::write(&path, "not toml at all [").unwrap();
        assert!(matches!(load_from(&path), Err(ExportError::Config(_))));
    }

    #[test]
    fn endpoint_requires_scheme_and_address() {
        let mut cfg = sample();
        cfg.export_cfg = " opcua , 10.0.0.5:4840 ".to_string();
        assert_eq!(cfg.endpoint().unwrap(), "opcua://10.0.0.5:4840");

        for bad in ["opcua", "opcua,", ",localhost:65003", "opcua,localhost:1,extra", ""] {
            cfg.export_cfg = bad.to_string();
            assert!(matches!(cfg.endpoint(), Err(ExportError::Config(_))), "{bad:?}");
        }
    }

    #[test]
    fn topics_live_in_the_stream_manager_namespace() {
        let topics = sample().topic_descriptors();
        assert_eq!(
            topics,
            vec![
                TopicDescriptor::new("StreamManager", "camera1_stream_results", "string"),
                TopicDescriptor::new("StreamManager", "camera2_stream_results", "string"),
            ]
        );
    }

    #[test]
    fn env_overrides_replace_fields_and_ignore_garbage() {
        let env: HashMap<&str, &str> = [
            ("DATABUS_EXPORT_CFG", "opcua,0.0.0.0:4840"),
            ("DATABUS_EXPORT_TOPICS", " a, ,b "),
            ("DATABUS_DEV_MODE", "TRUE"),
            ("DATABUS_EXPORT_CERT_DIR", "/run/databus"),
        ]
        .into_iter()
        .collect();
        let mut cfg = sample();
        apply_overrides(&mut cfg, |name| env.get(name).map(|v| v.to_string()));
        assert_eq!(cfg.export_cfg, "opcua,0.0.0.0:4840");
        assert_eq!(cfg.topics, vec!["a", "b"]);
        assert!(cfg.dev_mode);
        assert_eq!(cfg.cert_dir(), PathBuf::from("/run/databus"));

        let garbage: HashMap<&str, &str> =
            [("DATABUS_DEV_MODE", "maybe"), ("DATABUS_EXPORT_TOPICS", " , ")]
                .into_iter()
                .collect();
        apply_overrides(&mut cfg, |name| garbage.get(name).map(|v| v.to_string()));
        assert!(cfg.dev_mode);
        assert_eq!(cfg.topics, vec!["a", "b"]);
    }

    #[test]
    fn debug_redacts_certificate_material() {
        let mut cfg = sample();
        cfg.ca_cert.clear();
        let debug_str = format!("{cfg:?}");
        assert!(!debug_str.contains("c2VydmVy"));
        assert!(debug_str.contains("<redacted>"));
        assert!(debug_str.contains("<not set>"));
    }
}
