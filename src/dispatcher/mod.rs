//! Collection and dispatch
//!
//! The [`Dispatcher`] runs exactly one acquisition mode per call on the
//! calling task and pushes every produced record to its [`Sink`]:
//!
//! - local: periodic process and machine snapshots
//! - remote: lines read from a TCP source until the stream fails or ends
//! - pipe: lines read from standard input until end-of-stream
//!
//! Records are submitted one at a time, in the order they were produced.
//! Nothing is retried; a run that cannot continue logs why and returns a
//! [`RunOutcome`].

mod local;
mod pipe;
mod remote;

use std::sync::Arc;

use log::{debug, error, warn};
use tokio::io::{AsyncRead, BufReader};

use crate::framer::RecordFramer;
use crate::metrics::MetricsProvider;
use crate::request::{AcquisitionMode, CollectionRequest};
use crate::shutdown::Shutdown;
use crate::sink::Sink;

/// How a dispatcher run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Bounded local run finished its single iteration
    Completed { records: u64 },
    /// Pipe input reached end-of-stream
    Exhausted { records: u64 },
    /// Pipe mode with nothing buffered on standard input
    NoInput,
    /// Local collection is not available on this platform
    Unsupported,
    /// Remote mode without a source address
    MissingSource,
    /// Remote source could not be reached
    ConnectFailed,
    /// Remote stream failed or ended
    StreamTerminated { records: u64 },
    /// Pipe input failed with something other than end-of-stream
    PipeFailed { records: u64 },
    /// Stopped through the shutdown signal
    Interrupted { records: u64 },
}

impl RunOutcome {
    /// Requests submitted during the run
    pub fn records(&self) -> u64 {
        match self {
            RunOutcome::Completed { records }
            | RunOutcome::Exhausted { records }
            | RunOutcome::StreamTerminated { records }
            | RunOutcome::PipeFailed { records }
            | RunOutcome::Interrupted { records } => *records,
            RunOutcome::NoInput
            | RunOutcome::Unsupported
            | RunOutcome::MissingSource
            | RunOutcome::ConnectFailed => 0,
        }
    }
}

/// Runs one acquisition mode and forwards its records to a sink
pub struct Dispatcher {
    sink: Arc<dyn Sink>,
    provider: Arc<dyn MetricsProvider>,
    shutdown: Shutdown,
    platform_supported: bool,
}

impl Dispatcher {
    /// Create a dispatcher for this host
    pub fn new(sink: Arc<dyn Sink>, provider: Arc<dyn MetricsProvider>) -> Self {
        Self {
            sink,
            provider,
            shutdown: Shutdown::new(),
            platform_supported: cfg!(target_os = "linux"),
        }
    }

    /// Attach a shutdown signal that stops loops and relays
    pub fn with_shutdown(mut self, shutdown: Shutdown) -> Self {
        self.shutdown = shutdown;
        self
    }

    /// Override platform detection for local and remote collection
    pub fn with_platform_supported(mut self, supported: bool) -> Self {
        self.platform_supported = supported;
        self
    }

    /// The shutdown signal this dispatcher observes
    pub fn shutdown(&self) -> &Shutdown {
        &self.shutdown
    }

    /// Run the request, reading pipe input from this process's stdin
    pub async fn run(&self, request: &CollectionRequest) -> RunOutcome {
        if !matches!(request.mode(), AcquisitionMode::Pipe) {
            return self.run_with_input(request, tokio::io::empty()).await;
        }

        // tokio's stdin reads on a blocking thread, so readiness is checked
        // on the descriptor before handing it over
        if !pipe::stdin_ready() {
            debug!("Nothing on standard input");
            return RunOutcome::NoInput;
        }
        let framer = RecordFramer::retained(BufReader::new(tokio::io::stdin()));
        self.forward_pipe(request, framer).await
    }

    /// Run the request with `input` standing in for standard input
    pub async fn run_with_input<R>(&self, request: &CollectionRequest, input: R) -> RunOutcome
    where
        R: AsyncRead + Unpin + Send,
    {
        debug!(
            "Dispatching {} run to {} sink",
            request.mode().name(),
            self.sink.name()
        );

        match request.mode() {
            AcquisitionMode::Pipe => self.relay_pipe(request, input).await,
            _ if !self.platform_supported => {
                warn!("Collecting data is only supported on Linux for now, exiting");
                RunOutcome::Unsupported
            }
            AcquisitionMode::RemoteStream(remote) => {
                if remote.address.is_empty() {
                    error!("A source address is required when the source type is remote");
                    return RunOutcome::MissingSource;
                }
                self.relay_remote(request, remote).await
            }
            AcquisitionMode::Local(local) => self.run_local(request, local).await,
        }
    }
}
