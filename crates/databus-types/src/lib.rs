//! `databus-types` – value types and the error taxonomy shared by every
//! data bus crate.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Largest text payload the native publish path accepts (61 KiB).
pub const MAX_PUBLISH_PAYLOAD_BYTES: usize = 61 * 1024;

/// Direction of a bus context. A context is either a publisher or a
/// subscriber, never both.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// No live context.
    #[default]
    None,
    /// Publisher (server side of the transport).
    Pub,
    /// Subscriber (client side of the transport).
    Sub,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::None => write!(f, "NONE"),
            Direction::Pub => write!(f, "PUB"),
            Direction::Sub => write!(f, "SUB"),
        }
    }
}

impl FromStr for Direction {
    type Err = DataBusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(Direction::None),
            "PUB" => Ok(Direction::Pub),
            "SUB" => Ok(Direction::Sub),
            other => Err(DataBusError::UnsupportedBusDirection(other.to_string())),
        }
    }
}

/// Concrete transport families a context can be opened against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Opcua,
}

impl BusKind {
    /// Every supported bus kind, in lookup order.
    pub const ALL: [BusKind; 1] = [BusKind::Opcua];

    /// Endpoint scheme prefix, i.e. the text in front of the first `//`.
    pub fn scheme(self) -> &'static str {
        match self {
            BusKind::Opcua => "opcua:",
        }
    }

    /// Resolve the bus kind from a scheme-prefixed endpoint such as
    /// `opcua://localhost:65003`.
    pub fn from_endpoint(endpoint: &str) -> Result<Self, DataBusError> {
        let prefix = endpoint.split("//").next().unwrap_or_default();
        Self::ALL
            .into_iter()
            .find(|kind| kind.scheme() == prefix)
            .ok_or_else(|| DataBusError::UnsupportedBusKind(endpoint.to_string()))
    }
}

impl fmt::Display for BusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusKind::Opcua => write!(f, "opcua"),
        }
    }
}

/// A parsed `scheme://host:port[/path]` endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    kind: BusKind,
    host: String,
    port: u16,
}

impl Endpoint {
    /// Parse and validate an endpoint string.
    ///
    /// # Errors
    ///
    /// * [`DataBusError::UnsupportedBusKind`] when the scheme is unknown.
    /// * [`DataBusError::InvalidEndpoint`] when the host or port is missing or
    ///   the port is not a valid `u16`.
    pub fn parse(endpoint: &str) -> Result<Self, DataBusError> {
        let kind = BusKind::from_endpoint(endpoint)?;
        let invalid = |reason: &str| DataBusError::InvalidEndpoint {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };

        let (_, rest) = endpoint
            .split_once("://")
            .ok_or_else(|| invalid("missing '://' separator"))?;
        let authority = rest.split('/').next().unwrap_or_default();
        let (host, port) = authority
            .rsplit_once(':')
            .ok_or_else(|| invalid("missing port"))?;
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        let port = port
            .parse::<u16>()
            .map_err(|_| invalid("port must be a number between 0 and 65535"))?;

        Ok(Self {
            kind,
            host: host.to_string(),
            port,
        })
    }

    pub fn kind(&self) -> BusKind {
        self.kind
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// `host:port`, the key a transport binds or connects to.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// URL understood by the native OPC UA stack.
    pub fn opc_tcp_url(&self) -> String {
        format!("opc.tcp://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}//{}:{}", self.kind.scheme(), self.host, self.port)
    }
}

/// Identifies one publishable / subscribable variable in the transport's
/// namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicDescriptor {
    #[serde(rename = "ns")]
    pub namespace: String,
    /// Hierarchical, `/`-delimited name. Transports treat it as opaque.
    pub name: String,
    #[serde(rename = "type", alias = "dType")]
    pub data_type: String,
}

impl TopicDescriptor {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        data_type: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    /// Non-empty hierarchy levels of the topic name.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.name.split('/').filter(|s| !s.is_empty())
    }
}

impl fmt::Display for TopicDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.name)
    }
}

/// Value handed to `publish`. Only [`Payload::Text`] is accepted by the
/// current transports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Text(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Bytes(Vec<u8>),
}

impl Payload {
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Text(_) => "text",
            Payload::Integer(_) => "integer",
            Payload::Float(_) => "float",
            Payload::Boolean(_) => "boolean",
            Payload::Bytes(_) => "bytes",
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Payload::Integer(value)
    }
}

impl From<f64> for Payload {
    fn from(value: f64) -> Self {
        Payload::Float(value)
    }
}

impl From<bool> for Payload {
    fn from(value: bool) -> Self {
        Payload::Boolean(value)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(value)
    }
}

/// Subscription trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Trigger {
    Start,
    Stop,
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Trigger::Start => write!(f, "START"),
            Trigger::Stop => write!(f, "STOP"),
        }
    }
}

impl FromStr for Trigger {
    type Err = DataBusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "START" => Ok(Trigger::Start),
            "STOP" => Ok(Trigger::Stop),
            other => Err(DataBusError::UnsupportedTrigger(other.to_string())),
        }
    }
}

/// Options consumed by `create`.
///
/// Leaving `cert_file`, `private_file` and `trust_file` all empty selects
/// dev (insecure) mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextConfig {
    /// Scheme-prefixed address, e.g. `opcua://localhost:65003`.
    pub endpoint: String,
    pub direction: Direction,
    #[serde(default)]
    pub cert_file: String,
    #[serde(default)]
    pub private_file: String,
    #[serde(default)]
    pub trust_file: String,
}

impl ContextConfig {
    /// A dev-mode config with no certificates.
    pub fn new(endpoint: impl Into<String>, direction: Direction) -> Self {
        Self {
            endpoint: endpoint.into(),
            direction,
            cert_file: String::new(),
            private_file: String::new(),
            trust_file: String::new(),
        }
    }

    pub fn with_security(
        mut self,
        cert_file: impl Into<String>,
        private_file: impl Into<String>,
        trust_file: impl Into<String>,
    ) -> Self {
        self.cert_file = cert_file.into();
        self.private_file = private_file.into();
        self.trust_file = trust_file.into();
        self
    }

    pub fn is_dev_mode(&self) -> bool {
        self.cert_file.is_empty() && self.private_file.is_empty() && self.trust_file.is_empty()
    }

    /// Security selection handed to the transport. Partial triples are passed
    /// through unchanged; rejecting them is the transport's job.
    pub fn security(&self) -> SecurityMode {
        if self.is_dev_mode() {
            SecurityMode::Insecure
        } else {
            SecurityMode::Secured {
                cert_file: self.cert_file.clone(),
                private_file: self.private_file.clone(),
                trust_files: vec![self.trust_file.clone()],
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecurityMode {
    Insecure,
    Secured {
        cert_file: String,
        private_file: String,
        trust_files: Vec<String>,
    },
}

/// One message received from the transport, waiting for dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryMessage {
    pub topic: String,
    pub payload: String,
    pub received_at: DateTime<Utc>,
}

impl DeliveryMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            received_at: Utc::now(),
        }
    }
}

/// Every failure surfaced by the data bus.
///
/// Transport variants carry the transport's status text verbatim.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataBusError {
    #[error("Unsupported DataBus type for endpoint '{0}'")]
    UnsupportedBusKind(String),

    #[error("Unsupported bus direction '{0}'")]
    UnsupportedBusDirection(String),

    #[error("Unsupported subscription trigger '{0}'")]
    UnsupportedTrigger(String),

    #[error("Invalid endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("DataBus context already initialized as {0}")]
    AlreadyInitialized(Direction),

    #[error("DataBus context is not initialized")]
    NotInitialized,

    #[error("Wrong bus direction: operation requires {expected}, context is {actual}")]
    WrongDirection { expected: Direction, actual: Direction },

    #[error("Unsupported payload type: {0}")]
    UnsupportedPayloadType(String),

    #[error("Payload of {size} bytes exceeds the publish limit of {limit} bytes")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Subscription START requires a callback")]
    MissingCallback,

    #[error("Subscription START requires at least one topic")]
    EmptyTopicSet,

    #[error("A subscription is already active on this context")]
    SubscriptionAlreadyActive,

    #[error("Transport context creation failed: {0}")]
    TransportCreateFailed(String),

    #[error("Transport send failed: {0}")]
    TransportSendFailed(String),

    #[error("Transport subscription failed: {0}")]
    TransportSubscribeFailed(String),

    #[error("Transport context destruction failed: {0}")]
    TransportDestroyFailed(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_parses_and_displays() {
        assert_eq!("PUB".parse::<Direction>().unwrap(), Direction::Pub);
        assert_eq!("SUB".parse::<Direction>().unwrap(), Direction::Sub);
        assert_eq!(Direction::Sub.to_string(), "SUB");
        assert!(matches!(
            "pub".parse::<Direction>(),
            Err(DataBusError::UnsupportedBusDirection(s)) if s == "pub"
        ));
    }

    #[test]
    fn direction_serialises_uppercase() {
        let json = serde_json::to_string(&Direction::Pub).unwrap();
        assert_eq!(json, "\"PUB\"");
        let back: Direction = serde_json::from_str("\"NONE\"").unwrap();
        assert_eq!(back, Direction::None);
    }

    #[test]
    fn bus_kind_resolves_opcua_scheme() {
        assert_eq!(
            BusKind::from_endpoint("opcua://localhost:65003").unwrap(),
            BusKind::Opcua
        );
        assert!(matches!(
            BusKind::from_endpoint("mqtt://localhost:1883"),
            Err(DataBusError::UnsupportedBusKind(_))
        ));
        assert!(matches!(
            BusKind::from_endpoint(""),
            Err(DataBusError::UnsupportedBusKind(_))
        ));
    }

    #[test]
    fn endpoint_parses_host_and_port() {
        let ep = Endpoint::parse("opcua://0.0.0.0:4840/").unwrap();
        assert_eq!(ep.kind(), BusKind::Opcua);
        assert_eq!(ep.host(), "0.0.0.0");
        assert_eq!(ep.port(), 4840);
        assert_eq!(ep.address(), "0.0.0.0:4840");
        assert_eq!(ep.opc_tcp_url(), "opc.tcp://0.0.0.0:4840");
        assert_eq!(ep.to_string(), "opcua://0.0.0.0:4840");
    }

    #[test]
    fn endpoint_rejects_missing_or_bad_port() {
        assert!(matches!(
            Endpoint::parse("opcua://localhost"),
            Err(DataBusError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            Endpoint::parse("opcua://localhost:99999"),
            Err(DataBusError::InvalidEndpoint { .. })
        ));
        assert!(matches!(
            Endpoint::parse("opcua://:4840"),
            Err(DataBusError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn topic_descriptor_uses_native_field_names() {
        let topic = TopicDescriptor::new("StreamManager", "classifier_results", "string");
        let json = serde_json::to_value(&topic).unwrap();
        assert_eq!(json["ns"], "StreamManager");
        assert_eq!(json["type"], "string");

        let legacy: TopicDescriptor =
            serde_json::from_str(r#"{"ns":"NS","name":"t1","dType":"string"}"#).unwrap();
        assert_eq!(legacy.data_type, "string");
    }

    #[test]
    fn topic_segments_split_hierarchy() {
        let topic = TopicDescriptor::new("NS", "root/level1/level2", "string");
        let segments: Vec<&str> = topic.segments().collect();
        assert_eq!(segments, vec!["root", "level1", "level2"]);
    }

    #[test]
    fn payload_conversions_report_kind() {
        assert_eq!(Payload::from("hello").as_text(), Some("hello"));
        assert_eq!(Payload::from(42_i64).kind(), "integer");
        assert_eq!(Payload::from(vec![1_u8, 2]).kind(), "bytes");
        assert!(Payload::from(true).as_text().is_none());
    }

    #[test]
    fn empty_security_triple_selects_dev_mode() {
        let cfg = ContextConfig::new("opcua://localhost:65003", Direction::Pub);
        assert!(cfg.is_dev_mode());
        assert_eq!(cfg.security(), SecurityMode::Insecure);
    }

    #[test]
    fn partial_security_triple_is_passed_through() {
        let cfg = ContextConfig::new("opcua://localhost:65003", Direction::Sub)
            .with_security("client.der", "", "");
        assert!(!cfg.is_dev_mode());
        match cfg.security() {
            SecurityMode::Secured {
                cert_file,
                private_file,
                trust_files,
            } => {
                assert_eq!(cert_file, "client.der");
                assert!(private_file.is_empty());
                assert_eq!(trust_files, vec![String::new()]);
            }
            SecurityMode::Insecure => panic!("expected secured mode"),
        }
    }

    #[test]
    fn context_config_deserialises_camel_case_with_defaults() {
        let cfg: ContextConfig = serde_json::from_str(
            r#"{"endpoint":"opcua://localhost:65003","direction":"SUB","certFile":"c.der"}"#,
        )
        .unwrap();
        assert_eq!(cfg.direction, Direction::Sub);
        assert_eq!(cfg.cert_file, "c.der");
        assert!(cfg.private_file.is_empty());
    }

    #[test]
    fn trigger_parses() {
        assert_eq!("START".parse::<Trigger>().unwrap(), Trigger::Start);
        assert_eq!("STOP".parse::<Trigger>().unwrap(), Trigger::Stop);
        assert!(matches!(
            "PAUSE".parse::<Trigger>(),
            Err(DataBusError::UnsupportedTrigger(s)) if s == "PAUSE"
        ));
        assert!(matches!(
            "start".parse::<Trigger>(),
            Err(DataBusError::UnsupportedTrigger(s)) if s == "start"
        ));
    }

    #[test]
    fn error_display_carries_transport_status() {
        let err = DataBusError::TransportSendFailed("BadNodeIdUnknown".to_string());
        assert!(err.to_string().contains("BadNodeIdUnknown"));

        let err = DataBusError::WrongDirection {
            expected: Direction::Pub,
            actual: Direction::Sub,
        };
        assert!(err.to_string().contains("requires PUB"));
    }
}
