use std::path::{Path, PathBuf};

use log::{debug, error};
use tokio::io::AsyncWriteExt;

use super::{SendRequest, Sink};
use crate::error::Result;

const DEFAULT_TOPIC_DIR: &str = "default";

/// Persists requests to local files before forwarding them.
///
/// Requests with `disable_local_persist` set go straight to the inner sink.
/// Others are appended as JSON lines to `<dir>/<topic>/<key>.log` first.
pub struct LocalStore<S> {
    inner: S,
    dir: PathBuf,
}

impl<S: Sink> LocalStore<S> {
    /// Wrap a sink with local persistence under `dir`
    pub fn new(inner: S, dir: impl AsRef<Path>) -> Self {
        Self {
            inner,
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// File a request is persisted to
    pub fn path_for(&self, request: &SendRequest) -> PathBuf {
        let topic = request.destination.topic.trim();
        let topic = if topic.is_empty() || topic.contains(['/', '\\']) || topic == ".." {
            DEFAULT_TOPIC_DIR
        } else {
            topic
        };
        self.dir.join(topic).join(format!("{}.log", request.key))
    }

    async fn persist(&self, request: &SendRequest) -> Result<()> {
        let path = self.path_for(request);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut line = serde_json::to_vec(&request.payload)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        debug!("Persisted {} request to {}", request.key, path.display());
        Ok(())
    }

    /// The wrapped sink
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

#[async_trait::async_trait]
impl<S: Sink> Sink for LocalStore<S> {
    async fn submit(&self, request: SendRequest) {
        if !request.disable_local_persist {
            if let Err(e) = self.persist(&request).await {
                error!("Failed to persist {} request locally: {}", request.key, e);
            }
        }
        self.inner.submit(request).await;
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::{Destination, MemorySink, Payload, RecordKey, SinkKind};
    use tempfile::TempDir;

    fn request(topic: &str, value: &str, disable: bool) -> SendRequest {
        SendRequest::new(
            Destination {
                kind: SinkKind::Stdout,
                server: String::new(),
                topic: topic.to_string(),
            },
            RecordKey::Pipe,
            Payload::Line(value.to_string()),
            disable,
        )
    }

    #[tokio::test]
    async fn test_persists_when_enabled() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(MemorySink::new("memory"), dir.path());

        store.submit(request("logs", "x\n", false)).await;
        store.submit(request("logs", "y\n", false)).await;

        let content = std::fs::read_to_string(dir.path().join("logs/Pipe.log")).unwrap();
        assert_eq!(content, "\"x\\n\"\n\"y\\n\"\n");
        assert_eq!(store.inner().len().unwrap(), 2);
    }

    #[tokio::test]
    async fn test_skips_persistence_when_disabled() {
        let dir = TempDir::new().unwrap();
        let store = LocalStore::new(MemorySink::new("memory"), dir.path());

        store.submit(request("logs", "x\n", true)).await;

        assert!(!dir.path().join("logs").exists());
        assert_eq!(store.inner().len().unwrap(), 1);
    }

    #[test]
    fn test_unsafe_topics_use_default_dir() {
        let store = LocalStore::new(MemorySink::new("memory"), "/data");
        assert_eq!(
            store.path_for(&request("", "x", false)),
            PathBuf::from("/data/default/Pipe.log")
        );
        assert_eq!(
            store.path_for(&request("../etc", "x", false)),
            PathBuf::from("/data/default/Pipe.log")
        );
    }
}
