//! File configuration – reads `~/.databus/config.toml`.
//!
//! ```toml
//! [context]
//! endpoint = "opcua://localhost:65003"
//! direction = "PUB"
//! certFile = ""
//! privateFile = ""
//! trustFile = ""
//!
//! [delivery]
//! queue_capacity = 1024
//! poll_interval_ms = 2000
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use databus_types::{ContextConfig, DataBusError, Direction};
use serde::{Deserialize, Serialize};

use crate::queue::DEFAULT_QUEUE_CAPACITY;
use crate::worker::DEFAULT_POLL_INTERVAL;

/// Tuning of the subscription delivery pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliverySettings {
    /// Messages buffered per session before new arrivals are dropped.
    pub queue_capacity: usize,
    /// How long an idle worker waits before rechecking its stop flag.
    pub poll_interval: Duration,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl DeliverySettings {
    /// Clamp zero values to the smallest usable ones.
    pub(crate) fn normalized(self) -> Self {
        Self {
            queue_capacity: self.queue_capacity.max(1),
            poll_interval: self.poll_interval.max(Duration::from_millis(1)),
        }
    }
}

/// `[delivery]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL.as_millis() as u64
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl From<&DeliveryConfig> for DeliverySettings {
    fn from(config: &DeliveryConfig) -> Self {
        Self {
            queue_capacity: config.queue_capacity,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        }
    }
}

/// Persisted data bus configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataBusConfig {
    pub context: ContextConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

impl DataBusConfig {
    pub fn delivery_settings(&self) -> DeliverySettings {
        DeliverySettings::from(&self.delivery)
    }

    fn validate(&self) -> Result<(), DataBusError> {
        if self.delivery.queue_capacity == 0 {
            return Err(DataBusError::Config(
                "delivery.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.delivery.poll_interval_ms == 0 {
            return Err(DataBusError::Config(
                "delivery.poll_interval_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Return `$DATABUS_CONFIG`, or `~/.databus/config.toml` when unset.
pub fn config_path() -> PathBuf {
    if let Ok(path) = std::env::var("DATABUS_CONFIG") {
        return PathBuf::from(path);
    }
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".databus").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<DataBusConfig>, DataBusError> {
    load_from(&config_path())
}

/// Load the config from a specific path and apply environment overrides.
pub fn load_from(path: &Path) -> Result<Option<DataBusConfig>, DataBusError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|e| {
        DataBusError::Config(format!("failed to read config at {}: {e}", path.display()))
    })?;
    let mut cfg: DataBusConfig = toml::from_str(&raw)
        .map_err(|e| DataBusError::Config(format!("failed to parse config: {e}")))?;
    apply_env_overrides(&mut cfg);
    cfg.validate()?;
    Ok(Some(cfg))
}

/// Apply `DATABUS_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `DATABUS_ENDPOINT` | `context.endpoint` |
/// | `DATABUS_DIRECTION` | `context.direction` |
/// | `DATABUS_CERT_FILE` | `context.certFile` |
/// | `DATABUS_PRIVATE_FILE` | `context.privateFile` |
/// | `DATABUS_TRUST_FILE` | `context.trustFile` |
/// | `DATABUS_QUEUE_CAPACITY` | `delivery.queue_capacity` |
/// | `DATABUS_POLL_INTERVAL_MS` | `delivery.poll_interval_ms` |
///
/// Values that do not parse are ignored.
pub fn apply_env_overrides(cfg: &mut DataBusConfig) {
    apply_overrides(cfg, |name| std::env::var(name).ok());
}

fn apply_overrides(cfg: &mut DataBusConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(v) = var("DATABUS_ENDPOINT") {
        cfg.context.endpoint = v;
    }
    if let Some(v) = var("DATABUS_DIRECTION")
        && let Ok(direction) = v.parse::<Direction>()
    {
        cfg.context.direction = direction;
    }
    if let Some(v) = var("DATABUS_CERT_FILE") {
        cfg.context.cert_file = v;
    }
    if let Some(v) = var("DATABUS_PRIVATE_FILE") {
        cfg.context.private_file = v;
    }
    if let Some(v) = var("DATABUS_TRUST_FILE") {
        cfg.context.trust_file = v;
    }
    if let Some(v) = var("DATABUS_QUEUE_CAPACITY")
        && let Ok(capacity) = v.parse::<usize>()
    {
        cfg.delivery.queue_capacity = capacity;
    }
    if let Some(v) = var("DATABUS_POLL_INTERVAL_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.delivery.poll_interval_ms = ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const SAMPLE: &str = r#"
[context]
endpoint = "opcua://localhost:65003"
direction = "SUB"
certFile = "server.der"
privateFile = "server_key.der"
trustFile = "ca.der"

[delivery]
queue_capacity = 64
poll_interval_ms = 250
"#;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        fs::create_dir_all(path.parent().unwrap()).expect("config dir");
        fs::write(&path, contents).expect("write config");
        (dir, path)
    }

    fn overrides(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn config_path_points_to_databus_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".databus"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn load_from_parses_both_tables() {
        let (_dir, path) = write_config(SAMPLE);
        let cfg = load_from(&path).expect("load ok").expect("some");

        assert_eq!(cfg.context.direction, Direction::Sub);
        assert_eq!(cfg.context.cert_file, "server.der");
        assert!(!cfg.context.is_dev_mode());
        assert_eq!(
            cfg.delivery_settings(),
            DeliverySettings {
                queue_capacity: 64,
                poll_interval: Duration::from_millis(250),
            }
        );
    }

    #[test]
    fn delivery_table_is_optional() {
        let (_dir, path) = write_config(
            "[context]\nendpoint = \"opcua://localhost:65003\"\ndirection = \"PUB\"\n",
        );
        let cfg = load_from(&path).expect("load ok").expect("some");
        assert!(cfg.context.is_dev_mode());
        assert_eq!(cfg.delivery, DeliveryConfig::default());
        assert_eq!(cfg.delivery_settings().poll_interval, DEFAULT_POLL_INTERVAL);
    }

    #[test]
    fn malformed_toml_is_a_config_error() {
        let (_dir, path) = write_config("[context\nendpoint = ");
        assert!(matches!(load_from(&path), Err(DataBusError::Config(_))));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let (_dir, path) = write_config(
            "[context]\nendpoint = \"opcua://localhost:65003\"\ndirection = \"PUB\"\n\n[delivery]\nqueue_capacity = 0\n",
        );
        assert!(matches!(load_from(&path), Err(DataBusError::Config(m)) if m.contains("queue_capacity")));
    }

    #[test]
    fn overrides_replace_context_fields() {
        let mut cfg: DataBusConfig = toml::from_str(SAMPLE).unwrap();
        apply_overrides(
            &mut cfg,
            overrides(&[
                ("DATABUS_ENDPOINT", "opcua://robot-host:4840"),
                ("DATABUS_DIRECTION", "PUB"),
                ("DATABUS_CERT_FILE", ""),
                ("DATABUS_PRIVATE_FILE", ""),
                ("DATABUS_TRUST_FILE", ""),
            ]),
        );
        assert_eq!(cfg.context.endpoint, "opcua://robot-host:4840");
        assert_eq!(cfg.context.direction, Direction::Pub);
        assert!(cfg.context.is_dev_mode());
    }

    #[test]
    fn overrides_replace_delivery_fields() {
        let mut cfg: DataBusConfig = toml::from_str(SAMPLE).unwrap();
        apply_overrides(
            &mut cfg,
            overrides(&[
                ("DATABUS_QUEUE_CAPACITY", "4096"),
                ("DATABUS_POLL_INTERVAL_MS", "100"),
            ]),
        );
        assert_eq!(cfg.delivery.queue_capacity, 4096);
        assert_eq!(cfg.delivery.poll_interval_ms, 100);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let mut cfg: DataBusConfig = toml::from_str(SAMPLE).unwrap();
        let original = cfg.clone();
        apply_overrides(
            &mut cfg,
            overrides(&[
                ("DATABUS_DIRECTION", "SIDEWAYS"),
                ("DATABUS_QUEUE_CAPACITY", "lots"),
                ("DATABUS_POLL_INTERVAL_MS", "-5"),
            ]),
        );
        assert_eq!(cfg, original);
    }

    #[test]
    fn apply_env_overrides_reads_process_environment() {
        // SAFETY: only this test touches DATABUS_PRIVATE_FILE.
        unsafe { std::env::set_var("DATABUS_PRIVATE_FILE", "/etc/databus/key.der") };
        let mut cfg: DataBusConfig = toml::from_str(SAMPLE).unwrap();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.context.private_file, "/etc/databus/key.der");
        unsafe { std::env::remove_var("DATABUS_PRIVATE_FILE") };
    }

    #[test]
    fn zero_settings_are_normalized() {
        let settings = DeliverySettings {
            queue_capacity: 0,
            poll_interval: Duration::ZERO,
        }
        .normalized();
        assert_eq!(settings.queue_capacity, 1);
        assert_eq!(settings.poll_interval, Duration::from_millis(1));
    }
}
