//! NATS backend over plain TCP or WebSocket.
//!
//! `nats://` and `tcp://` URLs dial the client port directly; `ws://` and
//! `wss://` URLs go through the server's WebSocket listener, which carries the
//! same protocol in binary frames.
//!
//! Each session runs one connection task that owns the socket. Publishes are
//! queued to it and written whole, so a caller that gives up mid-publish never
//! leaves a partial frame behind. The task also pings the server and treats
//! unanswered pings as a lost connection.

use crate::config::QueueConfig;
use crate::error::{QueueError, Result};
use crate::proto::{self, ConnectOptions, OpParser, ServerOp};
use crate::transport::{Backend, DisconnectNotice, DisconnectSender, Established, Session};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Payload limit assumed when `INFO` does not advertise one.
const DEFAULT_MAX_PAYLOAD: usize = 1024 * 1024;
const OUTBOX_CAPACITY: usize = 64;

/// Opens NATS sessions.
#[derive(Debug, Clone)]
pub struct NatsBackend {
    connect_timeout: Duration,
    ping_interval: Duration,
    max_pings_out: u32,
}

impl Default for NatsBackend {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            ping_interval: Duration::from_secs(120),
            max_pings_out: 2,
        }
    }
}

impl NatsBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound on dialing plus the `INFO`/`CONNECT`/`PONG` handshake.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// How often the client pings an idle server. Zero disables client pings.
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Unanswered pings tolerated before the session counts as lost.
    pub fn with_max_pings_out(mut self, pings: u32) -> Self {
        self.max_pings_out = pings;
        self
    }
}

impl Backend for NatsBackend {
    type Session = NatsSession;

    async fn connect(&self, config: &QueueConfig) -> Result<Established<NatsSession>> {
        let fail = |reason: String| QueueError::Connection {
            url: config.url.clone(),
            reason,
        };
        let url = url::Url::parse(&config.url).map_err(|e| fail(e.to_string()))?;
        let opts = ConnectOptions::new(format!("{}/{}", config.cluster_id, config.client_id))
            .with_credentials(&url);

        let dial = async {
            let (mut reader, mut writer) = match url.scheme() {
                "nats" | "tcp" => dial_tcp(&url).await?,
                "ws" | "wss" => dial_ws(&url).await?,
                other => return Err(format!("unsupported scheme {other:?}")),
            };
            let mut parser = OpParser::default();
            let max_payload = handshake(&mut reader, &mut writer, &mut parser, &opts).await?;
            Ok::<_, String>((Connection { reader, writer, parser }, max_payload))
        };
        let (conn, max_payload) = tokio::time::timeout(self.connect_timeout, dial)
            .await
            .map_err(|_| fail(format!("timed out after {:?}", self.connect_timeout)))?
            .map_err(fail)?;

        tracing::debug!(url = %config.url, max_payload, "NATS handshake complete");
        let keepalive = Keepalive {
            interval: self.ping_interval,
            max_out: self.max_pings_out,
        };
        Ok(NatsSession::start(conn, keepalive, max_payload))
    }
}

async fn dial_tcp(url: &url::Url) -> std::result::Result<(Reader, Writer), String> {
    let host = url.host_str().ok_or("url has no host")?;
    let port = url.port().unwrap_or(crate::config::DEFAULT_PORT);
    let stream = TcpStream::connect((host, port))
        .await
        .map_err(|e| e.to_string())?;
    stream.set_nodelay(true).map_err(|e| e.to_string())?;
    let (read, write) = stream.into_split();
    Ok((Reader::Tcp(read), Writer::Tcp(write)))
}

async fn dial_ws(url: &url::Url) -> std::result::Result<(Reader, Writer), String> {
    let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
        .await
        .map_err(|e| e.to_string())?;
    let (sink, stream) = ws.split();
    Ok((Reader::Ws(stream), Writer::Ws(sink)))
}

/// Run `INFO`/`CONNECT`/`PING`/`PONG`. Returns the server's payload limit.
async fn handshake(
    reader: &mut Reader,
    writer: &mut Writer,
    parser: &mut OpParser,
    opts: &ConnectOptions,
) -> std::result::Result<usize, String> {
    let max_payload = match next_op(reader, parser).await? {
        ServerOp::Info(info) => {
            let server_id = &info["server_id"];
            tracing::trace!(%server_id, "Received INFO");
            info["max_payload"]
                .as_u64()
                .map_or(DEFAULT_MAX_PAYLOAD, |n| {
                    usize::try_from(n).unwrap_or(usize::MAX)
                })
        }
        other => return Err(format!("expected INFO, got {other:?}")),
    };

    let connect = proto::encode_connect(opts).map_err(|e| e.to_string())?;
    writer.send(connect).await?;
    writer.send(proto::PING.to_vec()).await?;

    loop {
        match next_op(reader, parser).await? {
            ServerOp::Pong => return Ok(max_payload),
            ServerOp::Err(msg) => return Err(format!("server rejected connection: {msg}")),
            ServerOp::Ping => writer.send(proto::PONG.to_vec()).await?,
            _ => {}
        }
    }
}

/// Next op from the server. Cancel-safe: partial input stays in `parser`.
async fn next_op(reader: &mut Reader, parser: &mut OpParser) -> std::result::Result<ServerOp, String> {
    loop {
        if let Some(op) = parser.next_op().map_err(|e| e.to_string())? {
            return Ok(op);
        }
        match reader.next_chunk().await? {
            Some(chunk) => parser.push(&chunk),
            None => return Err("connection closed by server".to_string()),
        }
    }
}

enum Reader {
    Tcp(OwnedReadHalf),
    Ws(SplitStream<WsStream>),
}

impl Reader {
    /// Next bytes from the server, `None` on a clean close.
    async fn next_chunk(&mut self) -> std::result::Result<Option<Vec<u8>>, String> {
        match self {
            Self::Tcp(read) => {
                let mut buf = vec![0u8; 8192];
                let n = read.read(&mut buf).await.map_err(|e| e.to_string())?;
                if n == 0 {
                    return Ok(None);
                }
                buf.truncate(n);
                Ok(Some(buf))
            }
            Self::Ws(stream) => loop {
                match stream.next().await {
                    None | Some(Ok(Message::Close(_))) => return Ok(None),
                    Some(Err(e)) => return Err(e.to_string()),
                    Some(Ok(Message::Binary(data))) => return Ok(Some(data.to_vec())),
                    Some(Ok(Message::Text(text))) => {
                        return Ok(Some(text.as_str().as_bytes().to_vec()));
                    }
                    Some(Ok(_)) => continue,
                }
            },
        }
    }
}

enum Writer {
    Tcp(OwnedWriteHalf),
    Ws(SplitSink<WsStream, Message>),
}

impl Writer {
    async fn send(&mut self, frame: Vec<u8>) -> std::result::Result<(), String> {
        match self {
            Self::Tcp(write) => {
                write.write_all(&frame).await.map_err(|e| e.to_string())?;
                write.flush().await.map_err(|e| e.to_string())
            }
            Self::Ws(sink) => sink
                .send(Message::Binary(frame.into()))
                .await
                .map_err(|e| e.to_string()),
        }
    }
}

struct Connection {
    reader: Reader,
    writer: Writer,
    parser: OpParser,
}

#[derive(Debug, Clone, Copy)]
struct Keepalive {
    interval: Duration,
    max_out: u32,
}

impl Keepalive {
    /// Longest a single write may block before the peer counts as gone.
    fn write_limit(&self) -> Option<Duration> {
        (!self.interval.is_zero()).then(|| self.interval.saturating_mul(self.max_out.saturating_add(1)))
    }
}

async fn write_frame(
    writer: &mut Writer,
    frame: Vec<u8>,
    limit: Option<Duration>,
) -> std::result::Result<(), String> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, writer.send(frame))
            .await
            .unwrap_or_else(|_| Err(format!("write stalled for {limit:?}"))),
        None => writer.send(frame).await,
    }
}

/// A frame for the connection task and where to report the write result.
type Outgoing = (Vec<u8>, oneshot::Sender<std::result::Result<(), String>>);

/// A connected NATS session.
pub struct NatsSession {
    outbox: mpsc::Sender<Outgoing>,
    closed: Arc<AtomicBool>,
    max_payload: usize,
    task: JoinHandle<()>,
}

impl NatsSession {
    fn start(conn: Connection, keepalive: Keepalive, max_payload: usize) -> Established<Self> {
        let (outbox, queued) = mpsc::channel(OUTBOX_CAPACITY);
        let closed = Arc::new(AtomicBool::new(false));
        let (notice, lost) = DisconnectNotice::channel();

        let task = tokio::spawn(run_connection(conn, queued, keepalive, closed.clone(), notice));

        Established {
            session: Self {
                outbox,
                closed,
                max_payload,
                task,
            },
            lost,
        }
    }

    /// Largest payload the server accepts, from its `INFO`.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}

impl Drop for NatsSession {
    fn drop(&mut self) {
        self.task.abort();
    }
}

impl Session for NatsSession {
    async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<()> {
        let fail = |reason: String| QueueError::Publish {
            subject: subject.to_string(),
            reason,
        };
        let gone = || fail("connection is closed".to_string());
        if self.is_closed() {
            return Err(gone());
        }
        if payload.len() > self.max_payload {
            return Err(fail(format!(
                "payload of {} bytes exceeds server limit of {}",
                payload.len(),
                self.max_payload
            )));
        }
        let frame = proto::encode_pub(subject, &payload).map_err(|e| fail(e.to_string()))?;

        let (done, written) = oneshot::channel();
        self.outbox.send((frame, done)).await.map_err(|_| gone())?;
        written.await.map_err(|_| gone())?.map_err(fail)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Own the socket: write queued frames, answer and send pings, and report
/// the first failure through `notice`.
async fn run_connection(
    conn: Connection,
    mut queued: mpsc::Receiver<Outgoing>,
    keepalive: Keepalive,
    closed: Arc<AtomicBool>,
    notice: DisconnectSender,
) {
    let Connection {
        mut reader,
        mut writer,
        mut parser,
    } = conn;

    let pinging = !keepalive.interval.is_zero();
    let limit = keepalive.write_limit();
    let period = keepalive.interval.max(Duration::from_millis(1));
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut pings_out = 0u32;

    let cause = loop {
        tokio::select! {
            op = next_op(&mut reader, &mut parser) => match op {
                Ok(ServerOp::Ping) => {
                    if let Err(e) = write_frame(&mut writer, proto::PONG.to_vec(), limit).await {
                        break e;
                    }
                }
                Ok(ServerOp::Pong) => pings_out = 0,
                Ok(ServerOp::Err(msg)) => tracing::warn!(error = %msg, "NATS server error"),
                Ok(ServerOp::Msg { subject }) => {
                    tracing::trace!(%subject, "Ignoring delivered message");
                }
                Ok(_) => {}
                Err(e) => break e,
            },
            Some((frame, done)) = queued.recv() => {
                let result = write_frame(&mut writer, frame, limit).await;
                let failure = result.as_ref().err().cloned();
                let _ = done.send(result);
                if let Some(e) = failure {
                    break e;
                }
            }
            _ = ticker.tick(), if pinging => {
                if pings_out >= keepalive.max_out {
                    break format!("no PONG after {pings_out} pings");
                }
                pings_out += 1;
                if let Err(e) = write_frame(&mut writer, proto::PING.to_vec(), limit).await {
                    break e;
                }
            }
        }
    };
    closed.store(true, Ordering::Release);
    notice.notify(cause);
}
