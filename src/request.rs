//! The resolved, immutable description of one run

use std::path::PathBuf;
use std::time::Duration;

use crate::sink::{Destination, Payload, RecordKey, SendRequest};

/// Settings for the local snapshot loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    /// Root of the proc filesystem
    pub proc_root: PathBuf,
    /// Optional monitoring agent URL
    pub agent_url: Option<String>,
    /// Pause between iterations; zero runs a single iteration
    pub interval: Duration,
}

impl LocalConfig {
    /// Whether the loop stops after one iteration
    pub fn is_bounded(&self) -> bool {
        self.interval.is_zero()
    }
}

/// Settings for the remote stream relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// `host:port` of the line source; may be empty and is checked at dispatch
    pub address: String,
}

/// Where data comes from. Exactly one mode is active per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionMode {
    Local(LocalConfig),
    RemoteStream(RemoteConfig),
    Pipe,
}

impl AcquisitionMode {
    pub fn name(&self) -> &'static str {
        match self {
            AcquisitionMode::Local(_) => "local",
            AcquisitionMode::RemoteStream(_) => "remote",
            AcquisitionMode::Pipe => "pipe",
        }
    }
}

/// Configuration for one run, built once at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionRequest {
    mode: AcquisitionMode,
    destination: Destination,
    disable_local_persist: bool,
}

impl CollectionRequest {
    /// Create a new collection request
    pub fn new(mode: AcquisitionMode, destination: Destination, disable_local_persist: bool) -> Self {
        Self {
            mode,
            destination,
            disable_local_persist,
        }
    }

    pub fn mode(&self) -> &AcquisitionMode {
        &self.mode
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    pub fn disable_local_persist(&self) -> bool {
        self.disable_local_persist
    }

    /// Tag a unit of data for the sink
    pub fn send_request(&self, key: RecordKey, payload: Payload) -> SendRequest {
        SendRequest::new(self.destination.clone(), key, payload, self.disable_local_persist)
    }
}
