//! Line framing for byte streams
//!
//! Turns a socket or standard input into discrete textual records, one per
//! line. Both `\n` and `\r\n` terminated input is accepted. End-of-stream is
//! reported as [`FrameError::Eof`] so callers can tell it apart from a
//! transport failure.

use std::future::poll_fn;
use std::io;
use std::pin::Pin;
use std::task::Poll;

use log::trace;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

/// Errors that can occur while framing records
#[derive(Error, Debug)]
pub enum FrameError {
    #[error("end of stream")]
    Eof,

    #[error("failed to read from stream: {0}")]
    Read(#[from] io::Error),
}

impl FrameError {
    /// Whether this error is a plain end-of-stream
    pub fn is_eof(&self) -> bool {
        matches!(self, FrameError::Eof)
    }
}

/// How line terminators are treated in produced records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    /// Terminator removed. An unterminated tail before end-of-stream is
    /// still delivered as a record.
    Stripped,
    /// `\n` kept at the end of each record. An unterminated tail is dropped.
    Retained,
}

/// Splits a buffered byte stream into line records
pub struct RecordFramer<R> {
    reader: R,
    framing: Framing,
    buf: Vec<u8>,
    records: u64,
}

impl<R: AsyncBufRead + Unpin> RecordFramer<R> {
    /// Create a new framer over a buffered reader
    pub fn new(reader: R, framing: Framing) -> Self {
        Self {
            reader,
            framing,
            buf: Vec::with_capacity(256),
            records: 0,
        }
    }

    /// Framer that strips terminators (remote stream relay)
    pub fn stripped(reader: R) -> Self {
        Self::new(reader, Framing::Stripped)
    }

    /// Framer that keeps terminators (pipe relay)
    pub fn retained(reader: R) -> Self {
        Self::new(reader, Framing::Retained)
    }

    /// Check whether bytes are buffered right now, without consuming them.
    ///
    /// Polls the reader once. Returns `false` at end of stream and when the
    /// reader has nothing ready yet.
    pub async fn has_input(&mut self) -> Result<bool, FrameError> {
        let reader = &mut self.reader;
        poll_fn(|cx| match Pin::new(&mut *reader).poll_fill_buf(cx) {
            Poll::Ready(Ok(available)) => Poll::Ready(Ok(!available.is_empty())),
            Poll::Ready(Err(e)) => Poll::Ready(Err(FrameError::Read(e))),
            Poll::Pending => Poll::Ready(Ok(false)),
        })
        .await
    }

    /// Read the next record
    pub async fn next_record(&mut self) -> Result<String, FrameError> {
        self.buf.clear();

        let read = self.reader.read_until(b'\n', &mut self.buf).await?;
        if read == 0 {
            return Err(FrameError::Eof);
        }

        let terminated = self.buf.last() == Some(&b'\n');
        match self.framing {
            Framing::Retained => {
                if !terminated {
                    trace!("Dropping {} unterminated bytes at end of stream", self.buf.len());
                    return Err(FrameError::Eof);
                }
            }
            Framing::Stripped => {
                if terminated {
                    self.buf.pop();
                    if self.buf.last() == Some(&b'\r') {
                        self.buf.pop();
                    }
                }
            }
        }

        self.records += 1;
        Ok(String::from_utf8_lossy(&self.buf).into_owned())
    }

    /// Number of records framed so far
    pub fn records(&self) -> u64 {
        self.records
    }
}
