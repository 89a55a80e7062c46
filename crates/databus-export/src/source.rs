//! Upstream message sources.
//!
//! The exporter does not care where messages come from: anything that yields
//! [`SourceEvent`]s is a [`MessageSource`].  A `tokio::sync::mpsc` receiver is
//! one; [`LineSource`] reads newline-delimited messages from any async reader.

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    /// One upstream message.
    Message(Value),
    /// A receive error.  The source may still yield further events.
    Error(String),
}

#[async_trait]
pub trait MessageSource: Send {
    /// Next event, or `None` once the source is exhausted.
    async fn next_event(&mut self) -> Option<SourceEvent>;
}

#[async_trait]
impl MessageSource for mpsc::Receiver<SourceEvent> {
    async fn next_event(&mut self) -> Option<SourceEvent> {
        self.recv().await
    }
}

/// Newline-delimited messages.  A line that is valid JSON becomes that
/// value; any other non-blank line becomes a JSON string.  A read error is
/// reported once and ends the source.
pub struct LineSource<R> {
    lines: Lines<R>,
    failed: bool,
}

impl<R: AsyncBufRead + Unpin> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            failed: false,
        }
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> MessageSource for LineSource<R> {
    async fn next_event(&mut self) -> Option<SourceEvent> {
        if self.failed {
            return None;
        }
        loop {
            match self.lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let value = serde_json::from_str(line)
                        .unwrap_or_else(|_| Value::String(line.to_string()));
                    return Some(SourceEvent::Message(value));
                }
                Ok(None) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(SourceEvent::Error(e.to_string()));
                }
            }
        }
    }
}
