//! Connection multiplexer for the linemq broker.
//!
//! One task owns the listener, the connection table and the queue store.
//! Per-connection reader tasks only frame lines and forward them as events;
//! every command, response, fan-out push and backlog replay is executed here,
//! one event at a time. That keeps a single mutator per queue and makes a
//! subscriber's backlog reach the socket before any later live push.
//!
//! Each wake-up of the loop (an accepted connection, an inbound event or the
//! poll interval elapsing) begins with a TTL sweep, so an idle broker still
//! expires messages.

use std::collections::HashMap;
use std::future::poll_fn;
use std::io;
use std::net::SocketAddr;
use std::task::Poll;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn, Instrument};

use crate::broker::transport::{send_all, LineReader};
use crate::config::Config;
use crate::core::command::{parse_command, Command, Response};
use crate::core::error::{StoreError, TransportError};
use crate::core::queue::QueueStore;
use crate::core::subscriber::{ConnectionId, DeliverySink};
use crate::util::backoff::RetryPolicy;

const EVENT_BACKLOG: usize = 1024;

/// Binds `config.server.bind_addr` and runs the broker until `shutdown` flips.
pub async fn serve(config: &Config, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
    let broker = Broker::bind(config).await?;
    broker.run(shutdown).await
}

/// Input delivered to the event loop by connection reader tasks.
#[derive(Debug)]
enum Event {
    Line { conn: ConnectionId, line: String },
    Closed { conn: ConnectionId, reason: Option<TransportError> },
}

/// What woke the loop up.
enum Wake {
    Accept(io::Result<(TcpStream, SocketAddr)>),
    Event(Event),
    Tick,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ClientState {
    AwaitingCommand,
    /// Subscribed to a queue; only receives pushes from now on.
    SubscribedIdle,
}

#[derive(Debug)]
struct Client {
    peer: SocketAddr,
    writer: OwnedWriteHalf,
    state: ClientState,
    reader: JoinHandle<()>,
}

/// Connection table. Doubles as the delivery sink for queue fan-out.
#[derive(Debug)]
struct Connections {
    clients: HashMap<ConnectionId, Client>,
    policy: RetryPolicy,
    /// Connections whose last write failed; torn down after the current event.
    failed: Vec<ConnectionId>,
}

#[async_trait]
impl DeliverySink for Connections {
    async fn push(&mut self, subscriber: ConnectionId, line: &str) -> Result<(), TransportError> {
        let Some(client) = self.clients.get_mut(&subscriber) else {
            return Err(TransportError::Closed);
        };
        let res = send_all(&mut client.writer, line.as_bytes(), &self.policy).await;
        if res.is_err() && !self.failed.contains(&subscriber) {
            self.failed.push(subscriber);
        }
        res
    }
}

pub struct Broker {
    listener: TcpListener,
    store: QueueStore,
    conns: Connections,
    events_tx: mpsc::Sender<Event>,
    events_rx: mpsc::Receiver<Event>,
    next_conn_id: u64,
    max_connections: usize,
    max_line: usize,
    poll_interval: Duration,
}

impl Broker {
    pub async fn bind(config: &Config) -> io::Result<Self> {
        let listener = TcpListener::bind(&config.server.bind_addr).await?;
        Ok(Self::from_listener(listener, config))
    }

    pub fn from_listener(listener: TcpListener, config: &Config) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_BACKLOG);
        Self {
            listener,
            store: QueueStore::new(config.store_limits()),
            conns: Connections {
                clients: HashMap::new(),
                policy: config.retry_policy(),
                failed: Vec::new(),
            },
            events_tx,
            events_rx,
            next_conn_id: 1,
            max_connections: config.server.max_connections,
            max_line: config.server.max_line_bytes,
            poll_interval: config.poll_interval(),
        }
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Runs the event loop until `shutdown` changes or its sender is dropped.
    pub async fn run(self, shutdown: watch::Receiver<bool>) -> anyhow::Result<()> {
        let span = tracing::info_span!("broker", bind_addr = %self.local_addr()?);
        self.event_loop(shutdown).instrument(span).await;
        Ok(())
    }

    async fn event_loop(mut self, mut shutdown: watch::Receiver<bool>) {
        info!("linemq broker listening");

        let mut tick = time::interval(self.poll_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let wake = tokio::select! {
                _ = shutdown.changed() => Wake::Shutdown,
                accepted = self.listener.accept() => Wake::Accept(accepted),
                Some(event) = self.events_rx.recv() => Wake::Event(event),
                _ = tick.tick() => Wake::Tick,
            };

            self.store.sweep_expired(Instant::now());

            match wake {
                Wake::Shutdown => break,
                Wake::Accept(accepted) => self.accept_ready(accepted).await,
                Wake::Event(Event::Line { conn, line }) => self.handle_line(conn, line).await,
                Wake::Event(Event::Closed { conn, reason }) => self.teardown(conn, reason),
                Wake::Tick => {}
            }
        }

        info!("shutdown signal received; closing {} connection(s)", self.conns.clients.len());
        let ids: Vec<ConnectionId> = self.conns.clients.keys().copied().collect();
        for conn in ids {
            self.teardown(conn, None);
        }
    }

    /// Registers the connection that woke the loop, then drains every other
    /// connection already waiting in the backlog.
    async fn accept_ready(&mut self, first: io::Result<(TcpStream, SocketAddr)>) {
        let mut next = Some(first);
        while let Some(accepted) = next {
            match accepted {
                Ok((stream, peer)) => self.register(stream, peer),
                Err(e) => {
                    // errors such as EMFILE persist; pause instead of spinning
                    error!("accept error: {}", e);
                    time::sleep(self.poll_interval).await;
                    return;
                }
            }
            next = self.try_accept().await;
        }
    }

    /// Accepts without waiting: `None` once the backlog would block.
    async fn try_accept(&self) -> Option<io::Result<(TcpStream, SocketAddr)>> {
        poll_fn(|cx| match self.listener.poll_accept(cx) {
            Poll::Ready(res) => Poll::Ready(Some(res)),
            Poll::Pending => Poll::Ready(None),
        })
        .await
    }

    fn register(&mut self, stream: TcpStream, peer: SocketAddr) {
        if self.conns.clients.len() >= self.max_connections {
            warn!(%peer, limit = self.max_connections, "connection limit reached; dropping");
            drop(stream);
            return;
        }
        if let Err(e) = stream.set_nodelay(true) {
            debug!(%peer, "set_nodelay failed: {}", e);
        }

        let conn = ConnectionId(self.next_conn_id);
        self.next_conn_id = self.next_conn_id.wrapping_add(1);

        let (read_half, writer) = stream.into_split();
        let reader = tokio::spawn(read_lines(
            conn,
            read_half,
            self.max_line,
            self.conns.policy,
            self.events_tx.clone(),
        ));

        self.conns.clients.insert(
            conn,
            Client {
                peer,
                writer,
                state: ClientState::AwaitingCommand,
                reader,
            },
        );
        info!(%conn, %peer, "client connected");
    }

    async fn handle_line(&mut self, conn: ConnectionId, line: String) {
        let Some(client) = self.conns.clients.get(&conn) else {
            // arrived after teardown
            return;
        };
        if client.state == ClientState::SubscribedIdle {
            debug!(%conn, "ignoring input from subscribed connection");
            return;
        }

        let command = parse_command(&line);
        debug!(%conn, ?command, "command received");

        let mut replay = None;
        let response = match command {
            Command::Create {
                queue,
                capacity,
                ttl_secs,
            } => respond(conn, self.store.create_queue(&queue, capacity, ttl_secs)),
            Command::Send { queue, body } => {
                respond(conn, self.store.publish(&queue, &body, &mut self.conns).await)
            }
            Command::Open { queue } => {
                let res = self.store.subscribe(&queue, conn);
                if res.is_ok() {
                    replay = Some(queue);
                }
                respond(conn, res)
            }
            Command::Invalid => Response::InvalidCommand,
        };

        let answered = self.conns.push(conn, response.as_line()).await.is_ok();

        if let Some(queue) = replay.filter(|_| answered) {
            if let Some(client) = self.conns.clients.get_mut(&conn) {
                client.state = ClientState::SubscribedIdle;
            }
            self.replay_backlog(conn, &queue).await;
        }

        self.reap_failed();
    }

    async fn replay_backlog(&mut self, conn: ConnectionId, queue: &str) {
        let lines = match self.store.backlog(queue, Instant::now()) {
            Ok(lines) => lines,
            Err(e) => {
                error!(%conn, "backlog unavailable: {}", e);
                return;
            }
        };
        debug!(%conn, queue, count = lines.len(), "replaying backlog");
        for line in lines {
            if self.conns.push(conn, &line).await.is_err() {
                break;
            }
        }
    }

    fn reap_failed(&mut self) {
        for conn in std::mem::take(&mut self.conns.failed) {
            self.teardown(conn, Some(TransportError::Closed));
        }
    }

    /// Closes the socket, stops its reader and drops it from every subscriber set.
    fn teardown(&mut self, conn: ConnectionId, reason: Option<TransportError>) {
        let Some(client) = self.conns.clients.remove(&conn) else {
            return;
        };
        client.reader.abort();
        let queue = self.store.unsubscribe(conn);

        match reason {
            None => info!(%conn, peer = %client.peer, ?queue, "client disconnected"),
            Some(e) => warn!(%conn, peer = %client.peer, ?queue, "closing connection: {}", e),
        }
    }
}

fn respond<T>(conn: ConnectionId, res: Result<T, StoreError>) -> Response {
    if let Err(e) = &res {
        debug!(%conn, "request refused: {}", e);
    }
    Response::from(res)
}

async fn read_lines(
    conn: ConnectionId,
    read_half: OwnedReadHalf,
    max_line: usize,
    policy: RetryPolicy,
    events: mpsc::Sender<Event>,
) {
    let mut reader = LineReader::new(read_half, max_line, policy);
    loop {
        let event = match reader.next_line().await {
            Ok(Some(line)) => Event::Line { conn, line },
            Ok(None) => Event::Closed { conn, reason: None },
            Err(e) => Event::Closed {
                conn,
                reason: Some(e),
            },
        };
        let closed = matches!(event, Event::Closed { .. });
        if events.send(event).await.is_err() || closed {
            return;
        }
    }
}
