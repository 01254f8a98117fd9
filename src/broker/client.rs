//! Client library for the linemq line protocol.
//!
//! A [`Client`] issues `CREATE` and `SEND` requests and waits for the single
//! response line of each. [`Client::open_queue`] consumes the client: after a
//! successful `OPEN` the connection only receives, and the returned
//! [`Subscription`] yields the queue's backlog followed by live messages.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::debug;

use crate::broker::transport::{send_all, LineReader};
use crate::core::command::{encode_command, new_create, new_open, new_send, Command, Response};
use crate::core::error::TransportError;
use crate::core::message::MAX_BODY_LEN;
use crate::util::backoff::RetryPolicy;

const CLIENT_MAX_LINE: usize = 1024;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("broker answered ERROR")]
    Rejected,

    #[error("broker answered INVALID COMMAND")]
    InvalidCommand,

    #[error("unexpected response line: {0:?}")]
    UnexpectedResponse(String),

    #[error("broker closed the connection")]
    Disconnected,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

pub struct Client {
    peer: SocketAddr,
    reader: LineReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    policy: RetryPolicy,
}

impl Client {
    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, ClientError> {
        Self::connect_with(addr, RetryPolicy::new(5, Duration::from_millis(100))).await
    }

    pub async fn connect_with<A: ToSocketAddrs>(addr: A, policy: RetryPolicy) -> Result<Self, ClientError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let (read_half, writer) = stream.into_split();
        debug!(%peer, "connected to broker");
        Ok(Self {
            peer,
            reader: LineReader::new(read_half, CLIENT_MAX_LINE, policy),
            writer,
            policy,
        })
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    pub async fn create_queue(&mut self, queue: &str, max_size: i64, ttl_secs: i64) -> Result<(), ClientError> {
        check_queue_name(queue)?;
        let response = self.request(&new_create(queue, max_size, ttl_secs)).await?;
        expect_ok(response)
    }

    pub async fn send_message(&mut self, queue: &str, body: &str) -> Result<(), ClientError> {
        check_queue_name(queue)?;
        if body.trim().is_empty() || body.contains(['\n', '\r']) || body.len() > MAX_BODY_LEN {
            return Err(ClientError::InvalidArgument(format!(
                "message body must be one non-empty line of at most {MAX_BODY_LEN} bytes"
            )));
        }
        let response = self.request(&new_send(queue, body)).await?;
        expect_ok(response)
    }

    /// Subscribes to `queue`. On success the connection turns into a
    /// receive-only [`Subscription`].
    pub async fn open_queue(mut self, queue: &str) -> Result<Subscription, ClientError> {
        check_queue_name(queue)?;
        let response = self.request(&new_open(queue)).await?;
        expect_ok(response)?;
        Ok(Subscription {
            queue: queue.to_string(),
            reader: self.reader,
            _writer: self.writer,
        })
    }

    async fn request(&mut self, cmd: &Command) -> Result<Response, ClientError> {
        let line = encode_command(cmd);
        send_all(&mut self.writer, line.as_bytes(), &self.policy).await?;

        let reply = self.reader.next_line().await?.ok_or(ClientError::Disconnected)?;
        Response::parse(&reply).ok_or(ClientError::UnexpectedResponse(reply))
    }
}

/// Receive side of an opened queue.
pub struct Subscription {
    queue: String,
    reader: LineReader<OwnedReadHalf>,
    // held so the broker does not see a half-closed socket
    _writer: OwnedWriteHalf,
}

impl Subscription {
    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Next message body without its terminator, or `None` once the broker
    /// closes the connection.
    pub async fn next_message(&mut self) -> Result<Option<String>, ClientError> {
        match self.reader.next_line().await? {
            Some(mut line) => {
                line.truncate(line.trim_end_matches(['\n', '\r']).len());
                Ok(Some(line))
            }
            None => Ok(None),
        }
    }
}

fn check_queue_name(queue: &str) -> Result<(), ClientError> {
    if queue.is_empty() || queue.contains(char::is_whitespace) {
        return Err(ClientError::InvalidArgument(format!(
            "queue name {queue:?} must be a single non-empty word"
        )));
    }
    Ok(())
}

fn expect_ok(response: Response) -> Result<(), ClientError> {
    match response {
        Response::Ok => Ok(()),
        Response::Error => Err(ClientError::Rejected),
        Response::InvalidCommand => Err(ClientError::InvalidCommand),
    }
}
