use log::{debug, error, info};
use tokio::io::BufReader;
use tokio::net::TcpStream;

use super::{Dispatcher, RunOutcome};
use crate::framer::RecordFramer;
use crate::request::{CollectionRequest, RemoteConfig};
use crate::sink::{Payload, RecordKey};

impl Dispatcher {
    /// Relay every line of a remote TCP stream as a `sparklog` record.
    ///
    /// The relay has no success exit: it ends when the stream fails,
    /// including a clean close by the peer, or on shutdown. The connection
    /// is dropped on every exit path.
    pub(super) async fn relay_remote(&self, request: &CollectionRequest, remote: &RemoteConfig) -> RunOutcome {
        let address = remote.address.as_str();
        info!("Collecting data from {}", address);

        let stream = match self.shutdown.guard(TcpStream::connect(address)).await {
            None => return RunOutcome::Interrupted { records: 0 },
            Some(Ok(stream)) => stream,
            Some(Err(e)) => {
                error!("Connect to {} failed: {}", address, e);
                return RunOutcome::ConnectFailed;
            }
        };

        let mut framer = RecordFramer::stripped(BufReader::new(stream));
        loop {
            let line = match self.shutdown.guard(framer.next_record()).await {
                None => {
                    info!("Stopped relaying {} after {} lines", address, framer.records());
                    return RunOutcome::Interrupted {
                        records: framer.records(),
                    };
                }
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    error!("Stream from {} ended after {} lines: {}", address, framer.records(), e);
                    return RunOutcome::StreamTerminated {
                        records: framer.records(),
                    };
                }
            };

            debug!("line {}: {}", framer.records(), line);
            self.sink
                .submit(request.send_request(RecordKey::Sparklog, Payload::Line(line)))
                .await;
        }
    }
}
