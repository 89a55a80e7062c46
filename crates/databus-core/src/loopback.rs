//! In-process loopback transport.
//!
//! [`LoopbackHub`] plays the role of the network: a publisher context binds a
//! `host:port` address on the hub and subscriber contexts connect to it.
//! Every bound address owns one [`tokio::sync::broadcast`] channel, so each
//! subscriber receives every sample without one slow subscriber blocking the
//! others.
//!
//! The transport honours the same contract as a real one: a subscriber
//! cannot connect to an address nobody has bound, and delivery goes through
//! the [`DeliverySink`] handed over on `START`.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use databus_types::{Direction, Endpoint, SecurityMode, TopicDescriptor, Trigger};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::queue::{DeliverySink, EnqueueOutcome};
use crate::status::TransportStatus;
use crate::transport::{Transport, TransportFactory};

/// Samples buffered per address before slow subscribers start to lag.
pub const DEFAULT_LOOPBACK_CAPACITY: usize = 256;

/// One published value travelling through the hub.
#[derive(Debug, Clone)]
pub struct Sample {
    pub topic: TopicDescriptor,
    pub payload: String,
}

// -----------------------------------------------------------------------------
// Hub
// -----------------------------------------------------------------------------

/// Shared in-process "network".  Clone it cheaply; all clones see the same
/// bound addresses.
#[derive(Clone, Debug)]
pub struct LoopbackHub {
    capacity: usize,
    servers: Arc<Mutex<HashMap<String, broadcast::Sender<Sample>>>>,
}

impl Default for LoopbackHub {
    fn default() -> Self {
        Self::new(DEFAULT_LOOPBACK_CAPACITY)
    }
}

impl LoopbackHub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            servers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Factory to register for [`BusKind::Opcua`][databus_types::BusKind].
    pub fn factory(&self) -> LoopbackFactory {
        LoopbackFactory { hub: self.clone() }
    }

    /// `true` while a publisher has `address` bound.
    pub fn is_bound(&self, address: &str) -> bool {
        self.servers().contains_key(address)
    }

    fn servers(&self) -> MutexGuard<'_, HashMap<String, broadcast::Sender<Sample>>> {
        self.servers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bind(&self, address: &str) -> Option<broadcast::Sender<Sample>> {
        let mut servers = self.servers();
        if servers.contains_key(address) {
            return None;
        }
        let (sender, _) = broadcast::channel(self.capacity);
        servers.insert(address.to_string(), sender.clone());
        Some(sender)
    }

    fn connect(&self, address: &str) -> Option<broadcast::Receiver<Sample>> {
        self.servers().get(address).map(broadcast::Sender::subscribe)
    }

    /// Release `address`, but only if it is still bound to `sender`'s channel.
    fn unbind(&self, address: &str, sender: &broadcast::Sender<Sample>) {
        let mut servers = self.servers();
        if servers
            .get(address)
            .is_some_and(|bound| bound.same_channel(sender))
        {
            servers.remove(address);
        }
    }
}

/// Opens a fresh [`LoopbackTransport`] on a shared hub.
#[derive(Clone, Debug)]
pub struct LoopbackFactory {
    hub: LoopbackHub,
}

impl TransportFactory for LoopbackFactory {
    fn open(&self) -> Arc<dyn Transport> {
        Arc::new(LoopbackTransport::new(self.hub.clone()))
    }
}

// -----------------------------------------------------------------------------
// Transport
// -----------------------------------------------------------------------------

#[derive(Default)]
enum Role {
    #[default]
    Idle,
    Publisher {
        address: String,
        sender: broadcast::Sender<Sample>,
    },
    Subscriber {
        address: String,
        forwarders: HashMap<Uuid, JoinHandle<()>>,
    },
}

/// One context's view of the hub.
pub struct LoopbackTransport {
    hub: LoopbackHub,
    role: Mutex<Role>,
}

impl LoopbackTransport {
    pub fn new(hub: LoopbackHub) -> Self {
        Self {
            hub,
            role: Mutex::new(Role::Idle),
        }
    }

    fn role(&self) -> MutexGuard<'_, Role> {
        self.role.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, role: Role) {
        match role {
            Role::Idle => {}
            Role::Publisher { address, sender } => {
                self.hub.unbind(&address, &sender);
                info!(address = %address, "loopback publisher unbound");
            }
            Role::Subscriber {
                address,
                forwarders,
            } => {
                for (_, forwarder) in forwarders {
                    forwarder.abort();
                }
                info!(address = %address, "loopback subscriber disconnected");
            }
        }
    }
}

fn check_security(security: &SecurityMode) -> Result<(), String> {
    let SecurityMode::Secured {
        cert_file,
        private_file,
        trust_files,
    } = security
    else {
        return Ok(());
    };
    std::iter::once(cert_file)
        .chain(std::iter::once(private_file))
        .chain(trust_files)
        .find(|path| !Path::new(path.as_str()).is_file())
        .map_or(Ok(()), |missing| {
            Err(format!("unable to load security file {missing}"))
        })
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn create_context(
        &self,
        endpoint: &Endpoint,
        direction: Direction,
        security: &SecurityMode,
    ) -> TransportStatus {
        if let Err(message) = check_security(security) {
            return TransportStatus::failed(message);
        }

        let mut role = self.role();
        if !matches!(*role, Role::Idle) {
            return TransportStatus::failed("loopback context already open");
        }

        let address = endpoint.address();
        match direction {
            Direction::Pub => {
                let Some(sender) = self.hub.bind(&address) else {
                    return TransportStatus::failed(format!(
                        "BadTcpEndpointUrlInvalid: {address} already in use"
                    ));
                };
                info!(url = %endpoint.opc_tcp_url(), "loopback publisher bound");
                *role = Role::Publisher { address, sender };
            }
            Direction::Sub => {
                if !self.hub.is_bound(&address) {
                    return TransportStatus::failed(format!(
                        "BadConnectionRejected: no publisher at {address}"
                    ));
                }
                info!(url = %endpoint.opc_tcp_url(), "loopback subscriber connected");
                *role = Role::Subscriber {
                    address,
                    forwarders: HashMap::new(),
                };
            }
            Direction::None => {
                return TransportStatus::failed("unsupported direction NONE");
            }
        }
        TransportStatus::ok()
    }

    async fn send(&self, topic: &TopicDescriptor, payload: &str) -> TransportStatus {
        let role = self.role();
        let Role::Publisher { sender, .. } = &*role else {
            return TransportStatus::failed("loopback context is not a publisher");
        };
        let sample = Sample {
            topic: topic.clone(),
            payload: payload.to_string(),
        };
        // No connected subscriber is not an error for a publisher.
        let receivers = sender.send(sample).unwrap_or(0);
        debug!(topic = %topic, receivers, "loopback sample sent");
        TransportStatus::ok()
    }

    async fn subscribe(
        &self,
        topics: &[TopicDescriptor],
        trigger: Trigger,
        sink: &DeliverySink,
    ) -> TransportStatus {
        let mut role = self.role();
        let Role::Subscriber {
            address,
            forwarders,
        } = &mut *role
        else {
            return TransportStatus::failed("loopback context is not a subscriber");
        };
        let session = sink.session_id();

        match trigger {
            Trigger::Start => {
                if forwarders.contains_key(&session) {
                    return TransportStatus::failed(format!("session {session} already subscribed"));
                }
                let Some(receiver) = self.hub.connect(address) else {
                    return TransportStatus::failed(format!(
                        "BadConnectionClosed: publisher at {address} has gone away"
                    ));
                };
                let forwarder = tokio::spawn(forward(receiver, topics.to_vec(), sink.clone()));
                forwarders.insert(session, forwarder);
                debug!(session = %session, topics = topics.len(), "loopback subscription started");
            }
            Trigger::Stop => match forwarders.remove(&session) {
                Some(forwarder) => {
                    forwarder.abort();
                    debug!(session = %session, "loopback subscription stopped");
                }
                None => debug!(session = %session, "loopback STOP for unknown session"),
            },
        }
        TransportStatus::ok()
    }

    async fn destroy_context(&self) -> TransportStatus {
        let role = std::mem::take(&mut *self.role());
        if matches!(role, Role::Idle) {
            return TransportStatus::failed("loopback context not open");
        }
        self.release(role);
        TransportStatus::ok()
    }
}

impl Drop for LoopbackTransport {
    fn drop(&mut self) {
        let role = std::mem::take(&mut *self.role());
        self.release(role);
    }
}

// -----------------------------------------------------------------------------
// Forwarding
// -----------------------------------------------------------------------------

/// Push every sample for one of `topics` into `sink` until the publisher
/// goes away or the session is closed.
async fn forward(
    mut receiver: broadcast::Receiver<Sample>,
    topics: Vec<TopicDescriptor>,
    sink: DeliverySink,
) {
    loop {
        match receiver.recv().await {
            Ok(sample) => {
                let wanted = topics.iter().any(|topic| {
                    topic.namespace == sample.topic.namespace && topic.name == sample.topic.name
                });
                if !wanted {
                    continue;
                }
                let outcome = sink.deliver(sample.topic.name.as_bytes(), sample.payload.as_bytes());
                if outcome == EnqueueOutcome::Closed {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!(session = %sink.session_id(), skipped, "loopback subscriber lagged");
            }
            Err(RecvError::Closed) => {
                debug!(session = %sink.session_id(), "loopback publisher closed");
                break;
            }
        }
    }
}
