use std::sync::RwLock;

use log::{error, trace};

use super::{RecordKey, SendRequest, Sink};
use crate::error::{RelayError, Result};

/// An in-memory sink that keeps every request in submission order
pub struct MemorySink {
    requests: RwLock<Vec<SendRequest>>,
    name: String,
}

impl MemorySink {
    /// Create a new memory sink
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            requests: RwLock::new(Vec::new()),
            name: name.into(),
        }
    }

    /// Record a request
    pub fn store(&self, request: SendRequest) -> Result<()> {
        let mut requests = self
            .requests
            .write()
            .map_err(|_| RelayError::Sink("Lock poisoned".to_string()))?;
        requests.push(request);
        Ok(())
    }

    /// All recorded requests, oldest first
    pub fn requests(&self) -> Result<Vec<SendRequest>> {
        let requests = self
            .requests
            .read()
            .map_err(|_| RelayError::Sink("Lock poisoned".to_string()))?;
        Ok(requests.clone())
    }

    /// Keys of the recorded requests, oldest first
    pub fn keys(&self) -> Result<Vec<RecordKey>> {
        let requests = self
            .requests
            .read()
            .map_err(|_| RelayError::Sink("Lock poisoned".to_string()))?;
        Ok(requests.iter().map(|r| r.key).collect())
    }

    /// Number of recorded requests
    pub fn len(&self) -> Result<usize> {
        let requests = self
            .requests
            .read()
            .map_err(|_| RelayError::Sink("Lock poisoned".to_string()))?;
        Ok(requests.len())
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Drop all recorded requests
    pub fn clear(&self) -> Result<()> {
        let mut requests = self
            .requests
            .write()
            .map_err(|_| RelayError::Sink("Lock poisoned".to_string()))?;
        requests.clear();
        Ok(())
    }
}

#[async_trait::async_trait]
impl Sink for MemorySink {
    async fn submit(&self, request: SendRequest) {
        trace!("[{}] recording {} request", self.name, request.key);
        if let Err(e) = self.store(request) {
            error!("[{}] failed to record request: {}", self.name, e);
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
