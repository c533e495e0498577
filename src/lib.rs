//! Host telemetry collection and relay
//!
//! Gathers process and machine snapshots from `/proc`, or relays lines from
//! a remote socket or standard input, and hands every record to a delivery
//! [`Sink`](sink::Sink).

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod framer;
pub mod metrics;
pub mod request;
pub mod retry;
pub mod shutdown;
pub mod sink;
pub mod util;

pub use util::logging::init as init_logging;

/// Re-export of commonly used types for convenience
pub mod prelude {
    pub use crate::config::{ConfigBuilder, ConnectorConfig, ENV_PREFIX};
    pub use crate::dispatcher::{Dispatcher, RunOutcome};
    pub use crate::error::{RelayError, Result};
    pub use crate::framer::{FrameError, RecordFramer};
    pub use crate::metrics::{MetricsProvider, ProcfsProvider};
    pub use crate::request::{AcquisitionMode, CollectionRequest};
    pub use crate::retry::{RetryConfig, execute_with_retry};
    pub use crate::shutdown::Shutdown;
    pub use crate::sink::{Payload, RecordKey, SendRequest, Sink, SinkKind, build_sink};
}

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
