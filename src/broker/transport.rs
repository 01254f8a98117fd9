//! Line transport shared by the broker and the client library.
//!
//! * [`send_all`] writes a whole buffer, waiting at most the policy delay per
//!   attempt for the socket to accept more bytes and at most
//!   `max_attempts * delay` in total.
//! * [`LineReader`] accumulates reads and yields one `\n`-terminated line at a
//!   time. Waiting for the first byte of a line is unbounded; once a line has
//!   started, stalled reads count against the retry budget.
//!
//! Running out of budget is reported as [`TransportError::RetriesExhausted`]
//! and is as fatal as any other I/O error.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;

use crate::core::error::TransportError;
use crate::util::backoff::RetryPolicy;

const INBUF_INIT: usize = 1024;

/// Writes all of `buf`. Each attempt waits at most the policy delay, and the
/// whole call gives up after [`RetryPolicy::total`] even if bytes trickle out.
pub async fn send_all<W>(writer: &mut W, buf: &[u8], policy: &RetryPolicy) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    match timeout(policy.total(), write_with_budget(writer, buf, policy)).await {
        Ok(res) => res,
        Err(_) => Err(TransportError::RetriesExhausted(policy.max_attempts)),
    }
}

async fn write_with_budget<W>(writer: &mut W, buf: &[u8], policy: &RetryPolicy) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut budget = policy.budget();
    let mut sent = 0;

    while sent < buf.len() {
        match timeout(budget.delay(), writer.write(&buf[sent..])).await {
            Ok(Ok(0)) => return Err(io::Error::from(io::ErrorKind::WriteZero).into()),
            Ok(Ok(n)) => {
                sent += n;
                budget.progressed();
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                if !budget.stall() {
                    return Err(TransportError::RetriesExhausted(budget.stalls()));
                }
            }
        }
    }

    loop {
        match timeout(budget.delay(), writer.flush()).await {
            Ok(res) => return res.map_err(TransportError::from),
            Err(_) => {
                if !budget.stall() {
                    return Err(TransportError::RetriesExhausted(budget.stalls()));
                }
            }
        }
    }
}

/// Buffered `\n`-delimited reader.
#[derive(Debug)]
pub struct LineReader<R> {
    inner: R,
    buf: BytesMut,
    max_line: usize,
    policy: RetryPolicy,
}

impl<R> LineReader<R>
where
    R: AsyncRead + Unpin,
{
    /// `max_line` bounds a line including its terminator.
    pub fn new(inner: R, max_line: usize, policy: RetryPolicy) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INBUF_INIT.min(max_line.max(1))),
            max_line,
            policy,
        }
    }

    /// Reads the next line, terminator included.
    ///
    /// Returns `Ok(None)` when the peer closes between lines; a close in the
    /// middle of a line is [`TransportError::Closed`].
    pub async fn next_line(&mut self) -> Result<Option<String>, TransportError> {
        let mut budget = self.policy.budget();

        loop {
            if let Some(line) = self.take_line()? {
                return Ok(Some(line));
            }

            if self.buf.is_empty() {
                if self.inner.read_buf(&mut self.buf).await? == 0 {
                    return Ok(None);
                }
                continue;
            }

            match timeout(budget.delay(), self.inner.read_buf(&mut self.buf)).await {
                Ok(Ok(0)) => return Err(TransportError::Closed),
                Ok(Ok(_)) => budget.progressed(),
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => {
                    if !budget.stall() {
                        return Err(TransportError::RetriesExhausted(budget.stalls()));
                    }
                }
            }
        }
    }

    fn take_line(&mut self) -> Result<Option<String>, TransportError> {
        match self.buf.iter().position(|b| *b == b'\n') {
            Some(pos) if pos + 1 > self.max_line => Err(TransportError::LineTooLong(self.max_line)),
            Some(pos) => {
                let raw = self.buf.split_to(pos + 1);
                String::from_utf8(raw.to_vec())
                    .map(Some)
                    .map_err(|_| TransportError::InvalidUtf8)
            }
            None if self.buf.len() >= self.max_line => Err(TransportError::LineTooLong(self.max_line)),
            None => Ok(None),
        }
    }
}
