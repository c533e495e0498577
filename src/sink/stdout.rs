use log::{error, trace};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use super::{SendRequest, Sink};
use crate::error::Result;

/// Sink writing each request as one JSON line to standard output
pub type StdoutSink = WriterSink<tokio::io::Stdout>;

impl StdoutSink {
    /// Create a sink over this process's standard output
    pub fn stdout() -> Self {
        WriterSink::new("stdout", tokio::io::stdout())
    }
}

/// Sink writing one JSON envelope per line to any async writer
pub struct WriterSink<W> {
    writer: Mutex<W>,
    name: String,
}

impl<W: AsyncWrite + Unpin + Send + 'static> WriterSink<W> {
    /// Create a new writer sink
    pub fn new(name: impl Into<String>, writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
            name: name.into(),
        }
    }

    async fn write_request(&self, request: &SendRequest) -> Result<()> {
        let mut line = serde_json::to_vec(&request.to_envelope())?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Give back the underlying writer
    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait::async_trait]
impl<W: AsyncWrite + Unpin + Send + 'static> Sink for WriterSink<W> {
    async fn submit(&self, request: SendRequest) {
        trace!("[{}] writing {} request", self.name, request.key);
        if let Err(e) = self.write_request(&request).await {
            error!("[{}] failed to write {} request: {}", self.name, request.key, e);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{Destination, Payload, RecordKey, SinkKind};

    #[tokio::test]
    async fn test_writes_one_json_line_per_request() {
        let sink = WriterSink::new("buffer", Vec::new());
        let destination = Destination {
            kind: SinkKind::Stdout,
            server: String::new(),
            topic: "spark".to_string(),
        };

        sink.submit(SendRequest::new(
            destination.clone(),
            RecordKey::Sparklog,
            Payload::Line("a".to_string()),
            true,
        ))
        .await;
        sink.submit(SendRequest::new(
            destination,
            RecordKey::Sparklog,
            Payload::Line("b".to_string()),
            true,
        ))
        .await;

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = output
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["key"], "sparklog");
        assert_eq!(lines[0]["topic"], "spark");
        assert_eq!(lines[0]["value"], "a");
        assert_eq!(lines[1]["value"], "b");
    }
}
