//! [`OpcuaExporter`] – a publisher context that fans upstream messages out
//! to every export topic.

use databus_core::{BusContext, TransportRegistry};
use databus_types::{ContextConfig, Direction, TopicDescriptor};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::ExportError;
use crate::certs::CertificateFiles;
use crate::config::ExportConfig;
use crate::source::{MessageSource, SourceEvent};

/// Namespace of every export topic.
pub const STREAM_MANAGER_NAMESPACE: &str = "StreamManager";

/// Counters returned when a source is exhausted.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExportStats {
    /// Upstream messages received.
    pub received: u64,
    /// Successful publishes, one per message and topic.
    pub published: u64,
    /// Publishes the context rejected.
    pub failed: u64,
    /// Errors reported by the source.
    pub source_errors: u64,
}

pub struct OpcuaExporter {
    context: BusContext,
    topics: Vec<TopicDescriptor>,
}

impl OpcuaExporter {
    /// Create the publisher context described by `config`.
    ///
    /// Outside dev mode the certificate material is written to
    /// [`ExportConfig::cert_dir`] for the duration of the create and removed
    /// afterwards, whether or not the create succeeded.
    pub async fn start(registry: TransportRegistry, config: &ExportConfig) -> Result<Self, ExportError> {
        config.validate()?;
        let endpoint = config.endpoint()?;
        let context = BusContext::new(registry);
        let base = ContextConfig::new(endpoint.as_str(), Direction::Pub);

        if config.dev_mode {
            context.create(&base).await?;
        } else {
            let certs = CertificateFiles::write(&config.cert_dir(), config.certificate_material())?;
            let created = context.create(&certs.apply_to(base)).await;
            certs.remove();
            created?;
        }

        let topics = config.topic_descriptors();
        info!(
            endpoint = %endpoint,
            topics = topics.len(),
            dev_mode = config.dev_mode,
            "OPC UA export started"
        );
        Ok(Self { context, topics })
    }

    pub fn topics(&self) -> &[TopicDescriptor] {
        &self.topics
    }

    /// Publish `data` on every export topic as `"<topic> <data>"`.
    ///
    /// Strings are sent without JSON quotes; other values as compact JSON.
    /// A rejected publish is logged and does not stop the remaining topics.
    /// Returns the number of topics that accepted the message.
    pub async fn publish(&self, data: &Value) -> usize {
        let rendered = match data {
            Value::String(text) => text.clone(),
            other => other.to_string(),
        };
        let mut published = 0;
        for topic in &self.topics {
            let text = format!("{} {rendered}", topic.name);
            match self.context.publish(topic, text.as_str()).await {
                Ok(()) => {
                    published += 1;
                    debug!(topic = %topic, "exported");
                }
                Err(e) => warn!(topic = %topic, error = %e, "export publish failed"),
            }
        }
        published
    }

    /// Drain `source` until it is exhausted.
    pub async fn run<S: MessageSource + ?Sized>(&self, source: &mut S) -> ExportStats {
        let mut stats = ExportStats::default();
        while let Some(event) = source.next_event().await {
            match event {
                SourceEvent::Message(data) => {
                    stats.received += 1;
                    let published = self.publish(&data).await as u64;
                    stats.published += published;
                    stats.failed += self.topics.len() as u64 - published;
                }
                SourceEvent::Error(e) => {
                    stats.source_errors += 1;
                    error!(error = %e, "error receiving upstream message");
                }
            }
        }
        info!(
            received = stats.received,
            published = stats.published,
            failed = stats.failed,
            source_errors = stats.source_errors,
            "upstream source closed"
        );
        stats
    }

    /// Destroy the publisher context.
    pub async fn shutdown(self) -> Result<(), ExportError> {
        self.context.destroy().await?;
        Ok(())
    }
}
