use log::{debug, error, info, warn};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use super::{SendRequest, Sink};
use crate::error::{RelayError, Result};
use crate::retry::{RetryConfig, execute_with_retry};

/// An open connection and the address it was made to
struct Connection {
    address: String,
    stream: TcpStream,
}

/// Sink writing JSON lines to a streaming engine over TCP.
///
/// The connection is opened on first use and reopened after a write failure.
pub struct StreamSink {
    connection: Mutex<Option<Connection>>,
    retry: RetryConfig,
}

impl StreamSink {
    /// Create a new stream sink
    pub fn new(retry: RetryConfig) -> Self {
        Self {
            connection: Mutex::new(None),
            retry,
        }
    }

    async fn connect(&self, address: &str) -> Result<TcpStream> {
        let stream = execute_with_retry(
            move || TcpStream::connect(address),
            self.retry.clone(),
            &format!("Connecting to {}", address),
        )
        .await?;
        info!("Connected to streaming engine at {}", address);
        Ok(stream)
    }

    async fn send(&self, request: &SendRequest) -> Result<()> {
        // The first entry of a server list is the engine endpoint
        let address = request
            .destination
            .server
            .split(',')
            .next()
            .map(str::trim)
            .unwrap_or_default();
        if address.is_empty() {
            return Err(RelayError::Config("No server address for spark destination".to_string()));
        }

        let mut line = serde_json::to_vec(&request.to_envelope())?;
        line.push(b'\n');

        let mut connection = self.connection.lock().await;
        let reuse = matches!(connection.as_ref(), Some(c) if c.address == address);
        if !reuse {
            let stream = self.connect(address).await?;
            *connection = Some(Connection {
                address: address.to_string(),
                stream,
            });
        }

        if let Some(open) = connection.as_mut() {
            if let Err(e) = open.stream.write_all(&line).await {
                warn!("Write to {} failed, dropping connection: {}", open.address, e);
                *connection = None;
                return Err(e.into());
            }
        }

        debug!("Sent {} request to {}", request.key, address);
        Ok(())
    }
}

#[async_trait::async_trait]
impl Sink for StreamSink {
    async fn submit(&self, request: SendRequest) {
        if let Err(e) = self.send(&request).await {
            error!("[spark] failed to deliver {} request: {}", request.key, e);
        }
    }

    fn name(&self) -> &str {
        "spark"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryBuilder;
    use crate::sink::{Destination, Payload, RecordKey, SinkKind};
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::net::TcpListener;

    fn request(server: &str, value: &str) -> SendRequest {
        SendRequest::new(
            Destination {
                kind: SinkKind::Spark,
                server: server.to_string(),
                topic: "t".to_string(),
            },
            RecordKey::Sparklog,
            Payload::Line(value.to_string()),
            true,
        )
    }

    #[tokio::test]
    async fn test_reuses_one_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let reader = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            let mut lines = BufReader::new(socket).lines();
            let mut received = Vec::new();
            while let Some(line) = lines.next_line().await.unwrap() {
                received.push(line);
            }
            received
        });

        let sink = StreamSink::new(RetryConfig::default());
        sink.submit(request(&address, "a")).await;
        sink.submit(request(&format!("{}, other:1", address), "b")).await;
        drop(sink);

        let received = reader.await.unwrap();
        assert_eq!(received.len(), 2);
        let first: serde_json::Value = serde_json::from_str(&received[0]).unwrap();
        assert_eq!(first["value"], "a");
        let second: serde_json::Value = serde_json::from_str(&received[1]).unwrap();
        assert_eq!(second["value"], "b");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_reported_not_raised() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let retry = RetryBuilder::new()
            .max_attempts(2)
            .initial_delay(1)
            .with_jitter(false)
            .build();
        let sink = StreamSink::new(retry);

        assert!(sink.send(&request(&address, "lost")).await.is_err());
        assert!(sink.send(&request("", "lost")).await.is_err());
        // submit swallows the failure
        sink.submit(request(&address, "lost")).await;
    }
}
