use std::io::IsTerminal;

use log::{debug, trace};
use tokio::io::{AsyncBufRead, AsyncRead, BufReader};

use super::{Dispatcher, RunOutcome};
use crate::framer::{FrameError, RecordFramer};
use crate::request::CollectionRequest;
use crate::sink::{Payload, RecordKey};

/// Whether this process's stdin has bytes to read right now.
///
/// Never waits: a terminal, or a pipe whose writer has not written yet,
/// counts as no input.
#[cfg(unix)]
pub(super) fn stdin_ready() -> bool {
    if std::io::stdin().is_terminal() {
        return false;
    }

    let mut fds = [libc::pollfd {
        fd: libc::STDIN_FILENO,
        events: libc::POLLIN,
        revents: 0,
    }];
    // SAFETY: `fds` is one valid pollfd for the duration of the call
    let ready = unsafe { libc::poll(fds.as_mut_ptr(), 1, 0) };
    ready > 0 && fds[0].revents & libc::POLLIN != 0
}

#[cfg(not(unix))]
pub(super) fn stdin_ready() -> bool {
    !std::io::stdin().is_terminal()
}

impl Dispatcher {
    /// Forward `input` line by line, terminators included.
    ///
    /// Returns `NoInput` at once when nothing is buffered yet.
    pub(super) async fn relay_pipe<R>(&self, request: &CollectionRequest, input: R) -> RunOutcome
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut framer = RecordFramer::retained(BufReader::new(input));

        match framer.has_input().await {
            Ok(true) => self.forward_pipe(request, framer).await,
            Ok(false) => {
                debug!("Nothing on standard input");
                RunOutcome::NoInput
            }
            Err(e) => {
                debug!("Standard input is not readable: {}", e);
                RunOutcome::NoInput
            }
        }
    }

    /// Submit every framed line until end-of-stream
    pub(super) async fn forward_pipe<R>(
        &self,
        request: &CollectionRequest,
        mut framer: RecordFramer<R>,
    ) -> RunOutcome
    where
        R: AsyncBufRead + Unpin + Send,
    {
        loop {
            match self.shutdown.guard(framer.next_record()).await {
                None => {
                    return RunOutcome::Interrupted {
                        records: framer.records(),
                    };
                }
                Some(Ok(line)) => {
                    trace!("pipe line {}", framer.records());
                    self.sink
                        .submit(request.send_request(RecordKey::Pipe, Payload::Line(line)))
                        .await;
                }
                Some(Err(FrameError::Eof)) => {
                    debug!("Standard input closed after {} lines", framer.records());
                    return RunOutcome::Exhausted {
                        records: framer.records(),
                    };
                }
                Some(Err(e)) => {
                    debug!("Stopped reading standard input: {}", e);
                    return RunOutcome::PipeFailed {
                        records: framer.records(),
                    };
                }
            }
        }
    }
}
