#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Once;
use std::time::Duration;

use linemq::broker::transport::{send_all, LineReader};
use linemq::util::backoff::RetryPolicy;
use linemq::{Broker, Config};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;

pub const STEP: Duration = Duration::from_secs(5);

pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        linemq::logging::init_logging_with("warn");
    });
}

/// Config tuned for tests: fast sweeps, short retry budget.
pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.server.poll_interval_ms = 50;
    cfg.transport.max_retries = 5;
    cfg.transport.retry_delay_ms = 20;
    cfg
}

pub struct TestBroker {
    pub addr: SocketAddr,
    // dropping the sender stops the broker
    _shutdown: watch::Sender<bool>,
}

pub async fn start_broker(cfg: Config) -> TestBroker {
    init_logging();
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral");
    let broker = Broker::from_listener(listener, &cfg);
    let addr = broker.local_addr().expect("local addr");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = broker.run(shutdown_rx).await;
    });
    TestBroker {
        addr,
        _shutdown: shutdown_tx,
    }
}

/// Raw line-level client, for asserting exact wire bytes.
pub struct LineClient {
    reader: LineReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl LineClient {
    pub async fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).await.expect("connect");
        let (r, w) = stream.into_split();
        Self {
            reader: LineReader::new(r, 4096, RetryPolicy::new(5, Duration::from_millis(100))),
            writer: w,
        }
    }

    /// Connects with a tiny receive buffer, so a peer that stops reading
    /// backs up the broker's writes quickly.
    pub async fn connect_small_window(addr: SocketAddr) -> Self {
        let socket = TcpSocket::new_v4().expect("socket");
        socket.set_recv_buffer_size(1024).expect("SO_RCVBUF");
        let stream = socket.connect(addr).await.expect("connect");
        let (r, w) = stream.into_split();
        Self {
            reader: LineReader::new(r, 4096, RetryPolicy::new(5, Duration::from_millis(100))),
            writer: w,
        }
    }

    pub async fn send(&mut self, line: &str) {
        send_all(&mut self.writer, line.as_bytes(), &RetryPolicy::default())
            .await
            .expect("send");
    }

    /// Next line, or `None` if the broker closed the connection.
    pub async fn recv(&mut self) -> Option<String> {
        timeout(STEP, self.reader.next_line())
            .await
            .expect("timed out waiting for a line")
            .ok()
            .flatten()
    }

    /// Asserts nothing arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Ok(res) = timeout(wait, self.reader.next_line()).await {
            panic!("unexpected data: {res:?}");
        }
    }

    pub async fn request(&mut self, line: &str) -> String {
        self.send(line).await;
        self.recv().await.expect("connection closed")
    }
}
