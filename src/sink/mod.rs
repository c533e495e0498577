//! Delivery abstraction for collected records
//!
//! The dispatcher hands every produced unit of data to a [`Sink`] as a
//! [`SendRequest`] and never looks at it again. Delivery failures are the
//! sink's own concern: implementations log them rather than returning them.

mod local;
mod memory;
mod stdout;
mod stream;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::metrics::{MachineInfo, ProcessInfo};
use crate::retry::RetryConfig;

pub use local::LocalStore;
pub use memory::MemorySink;
pub use stdout::{StdoutSink, WriterSink};
pub use stream::StreamSink;

/// Trait for delivery backends
#[async_trait::async_trait]
pub trait Sink: Send + Sync + 'static {
    /// Deliver or queue a single request
    async fn submit(&self, request: SendRequest);

    /// Get the sink name
    fn name(&self) -> &str;
}

#[async_trait::async_trait]
impl<S: Sink + ?Sized> Sink for Arc<S> {
    async fn submit(&self, request: SendRequest) {
        (**self).submit(request).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Kind of delivery target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    /// Kafka brokers
    Kafka,
    /// Streaming engine listening on a TCP socket
    Spark,
    /// Standard output
    #[default]
    Stdout,
}

impl SinkKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SinkKind::Kafka => "kafka",
            SinkKind::Spark => "spark",
            SinkKind::Stdout => "stdout",
        }
    }
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SinkKind {
    type Err = RelayError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "kafka" => Ok(SinkKind::Kafka),
            "spark" => Ok(SinkKind::Spark),
            "stdout" | "" => Ok(SinkKind::Stdout),
            other => Err(RelayError::Config(format!(
                "Unknown destination '{}', expected kafka, spark or stdout",
                other
            ))),
        }
    }
}

/// Where records go
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Destination {
    pub kind: SinkKind,
    /// Comma separated server or broker list
    pub server: String,
    pub topic: String,
}

/// Semantic tag attached to every request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordKey {
    #[serde(rename = "ProcessInfo")]
    ProcessInfo,
    #[serde(rename = "MachineInfo")]
    MachineInfo,
    #[serde(rename = "sparklog")]
    Sparklog,
    #[serde(rename = "Pipe")]
    Pipe,
}

impl RecordKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKey::ProcessInfo => "ProcessInfo",
            RecordKey::MachineInfo => "MachineInfo",
            RecordKey::Sparklog => "sparklog",
            RecordKey::Pipe => "Pipe",
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data carried by a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Process(ProcessInfo),
    Machine(MachineInfo),
    Line(String),
}

impl Payload {
    /// The relayed line, if this payload is one
    pub fn as_line(&self) -> Option<&str> {
        match self {
            Payload::Line(line) => Some(line),
            _ => None,
        }
    }
}

/// The normalized unit handed to a [`Sink`]
#[derive(Debug, Clone, PartialEq)]
pub struct SendRequest {
    pub destination: Destination,
    pub key: RecordKey,
    pub payload: Payload,
    pub disable_local_persist: bool,
}

impl SendRequest {
    /// Create a new request
    pub fn new(
        destination: Destination,
        key: RecordKey,
        payload: Payload,
        disable_local_persist: bool,
    ) -> Self {
        Self {
            destination,
            key,
            payload,
            disable_local_persist,
        }
    }

    /// JSON object written by text based sinks
    pub fn to_envelope(&self) -> serde_json::Value {
        serde_json::json!({
            "topic": self.destination.topic,
            "key": self.key,
            "value": self.payload,
        })
    }
}

/// Build the sink for a destination kind.
///
/// Every sink is wrapped in a [`LocalStore`] so requests that ask for local
/// persistence are written under `persist_dir`.
pub fn build_sink(kind: SinkKind, persist_dir: &Path) -> Result<Arc<dyn Sink>> {
    match kind {
        SinkKind::Stdout => Ok(Arc::new(LocalStore::new(StdoutSink::stdout(), persist_dir))),
        SinkKind::Spark => Ok(Arc::new(LocalStore::new(
            StreamSink::new(RetryConfig::default()),
            persist_dir,
        ))),
        SinkKind::Kafka => Err(RelayError::Unsupported(
            "no Kafka producer is available in this build, use spark or stdout".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_kind_parsing() {
        assert_eq!("Kafka".parse::<SinkKind>().unwrap(), SinkKind::Kafka);
        assert_eq!(" spark ".parse::<SinkKind>().unwrap(), SinkKind::Spark);
        assert_eq!("STDOUT".parse::<SinkKind>().unwrap(), SinkKind::Stdout);
        assert!("carrier-pigeon".parse::<SinkKind>().is_err());
    }

    #[test]
    fn test_record_key_wire_names() {
        assert_eq!(RecordKey::ProcessInfo.to_string(), "ProcessInfo");
        assert_eq!(RecordKey::MachineInfo.to_string(), "MachineInfo");
        assert_eq!(RecordKey::Sparklog.to_string(), "sparklog");
        assert_eq!(RecordKey::Pipe.to_string(), "Pipe");
        assert_eq!(serde_json::to_value(RecordKey::Sparklog).unwrap(), "sparklog");
    }

    #[test]
    fn test_envelope_layout() {
        let request = SendRequest::new(
            Destination {
                kind: SinkKind::Stdout,
                server: String::new(),
                topic: "logs".to_string(),
            },
            RecordKey::Pipe,
            Payload::Line("x\n".to_string()),
            true,
        );

        let envelope = request.to_envelope();
        assert_eq!(envelope["topic"], "logs");
        assert_eq!(envelope["key"], "Pipe");
        assert_eq!(envelope["value"], "x\n");
    }

    #[test]
    fn test_kafka_is_unsupported() {
        let dir = std::env::temp_dir();
        assert!(matches!(
            build_sink(SinkKind::Kafka, &dir),
            Err(RelayError::Unsupported(_))
        ));
        assert!(build_sink(SinkKind::Stdout, &dir).is_ok());
    }
}
