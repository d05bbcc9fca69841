//! WebSocket connection to a Z-Wave JS Server.
//!
//! A [`Client`] owns exactly one socket for its whole life. `connect`
//! spawns two background tasks:
//!
//! - a **reader** that decodes frames one at a time and routes them:
//!   handshake -> bootstrap commands, results -> [`CorrelationRegistry`],
//!   events -> [`EventDispatcher`]
//! - a **writer** that owns the socket sink and drains an outbound queue,
//!   so [`Client::send`] never waits on network I/O
//!
//! Callers awaiting results park on their own oneshot receivers, never on
//! the reader, so any number of requests can be in flight at once.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use zwjs_api::{Client, ClientConfig, EventMessage};
//!
//! let client = Client::new(ClientConfig::from_address("localhost:3000")?);
//! client.add_event_listener(Arc::new(|event: &EventMessage| {
//!     println!("{} / {}", event.source, event.event);
//! }));
//! client.connect().await?;
//!
//! if client.start_inclusion().await {
//!     println!("inclusion running");
//! }
//!
//! client.close().await;
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message, Utf8Bytes};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::codec::{self, InboundMessage, VersionInfo};
use crate::commands::{DISABLE_STATISTICS, START_LISTENING};
use crate::dispatcher::{EventDispatcher, EventListener};
use crate::error::Error;
use crate::registry::CorrelationRegistry;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

// ── ConnectionState ──────────────────────────────────────────────────

/// Socket lifecycle. Only moves forward; a closed client is not reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Closed,
}

// ── ClientConfig ─────────────────────────────────────────────────────

/// Where to connect and how long to wait for replies.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server endpoint, e.g. `ws://localhost:3000`.
    pub url: Url,

    /// Upper bound on waiting for a command result.
    /// `None` waits until the result arrives or the connection closes.
    pub request_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            request_timeout: Some(DEFAULT_REQUEST_TIMEOUT),
        }
    }

    /// Build from a `host:port` address or a full `ws://`/`wss://` URL.
    /// Bare addresses get the `ws://` scheme.
    pub fn from_address(address: &str) -> Result<Self, Error> {
        let address = address.trim();
        let url = if address.starts_with("ws://") || address.starts_with("wss://") {
            Url::parse(address)?
        } else {
            Url::parse(&format!("ws://{address}"))?
        };
        Ok(Self::new(url))
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// Handle to one Z-Wave JS Server connection.
///
/// Cheaply cloneable; all clones share the same socket, pending
/// requests, and listeners.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    state: watch::Sender<ConnectionState>,
    last_error: Mutex<Option<String>>,
    server_version: watch::Sender<Option<VersionInfo>>,
    registry: Arc<CorrelationRegistry>,
    dispatcher: EventDispatcher,
    outbound: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.inner.config.url.as_str())
            .field("state", &self.state())
            .field("pending", &self.inner.registry.pending_count())
            .field("listeners", &self.inner.dispatcher.len())
            .finish()
    }
}

impl Client {
    /// Create a client. Does NOT connect -- call [`connect()`](Self::connect).
    pub fn new(config: ClientConfig) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        let (server_version, _) = watch::channel(None);
        Self {
            inner: Arc::new(ClientInner {
                config,
                state,
                last_error: Mutex::new(None),
                server_version,
                registry: Arc::new(CorrelationRegistry::new()),
                dispatcher: EventDispatcher::new(),
                outbound: Mutex::new(None),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub(crate) fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.inner.registry
    }

    // ── Observability ────────────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    /// Receiver that observes every state transition.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Most recent transport error, if any was ever reported.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.inner.last_error).clone()
    }

    pub fn has_error(&self) -> bool {
        lock(&self.inner.last_error).is_some()
    }

    /// Handshake details, available once the server has said hello.
    pub fn server_version(&self) -> Option<VersionInfo> {
        self.inner.server_version.borrow().clone()
    }

    /// Wait until the server handshake has been processed and the
    /// bootstrap commands are queued, so further commands are meaningful.
    ///
    /// Bounded by the request timeout; fails with
    /// [`Error::ConnectionClosed`] if the connection ends first.
    pub async fn wait_for_handshake(&self) -> Result<VersionInfo, Error> {
        let mut version_rx = self.inner.server_version.subscribe();
        let mut state_rx = self.watch_state();

        let wait = async {
            tokio::select! {
                version = version_rx.wait_for(Option::is_some) => {
                    version.ok().and_then(|v| (*v).clone()).ok_or(Error::ConnectionClosed)
                }
                _ = state_rx.wait_for(|s| {
                    matches!(s, ConnectionState::Closing | ConnectionState::Closed)
                }) => Err(Error::ConnectionClosed),
            }
        };

        match self.inner.config.request_timeout {
            Some(limit) => tokio::time::timeout(limit, wait).await.map_err(|_| Error::Timeout {
                timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
            })?,
            None => wait.await,
        }
    }

    /// Requests still waiting for a result.
    pub fn pending_requests(&self) -> usize {
        self.inner.registry.pending_count()
    }

    // ── Listeners ────────────────────────────────────────────────────

    /// Register for server push events. Adding the same listener twice
    /// is a no-op and returns `false`.
    pub fn add_event_listener(&self, listener: Arc<dyn EventListener>) -> bool {
        self.inner.dispatcher.subscribe(listener)
    }

    pub fn remove_event_listener(&self, listener: &Arc<dyn EventListener>) -> bool {
        self.inner.dispatcher.unsubscribe(listener)
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Open the socket and start the reader and writer tasks.
    ///
    /// Resolves once the WebSocket handshake completes. The protocol
    /// handshake (`version` -> bootstrap commands) follows on the reader.
    pub async fn connect(&self) -> Result<(), Error> {
        let mut previous = ConnectionState::Disconnected;
        let started = self.inner.state.send_if_modified(|state| {
            previous = *state;
            if *state == ConnectionState::Disconnected {
                *state = ConnectionState::Connecting;
                true
            } else {
                false
            }
        });
        if !started {
            return Err(Error::AlreadyStarted { state: previous });
        }

        let url = &self.inner.config.url;
        tracing::info!(url = %url, "connecting to Z-Wave JS server");

        let connecting = tokio_tungstenite::connect_async(url.as_str());
        let result = tokio::select! {
            result = connecting => result,
            () = self.inner.cancel.cancelled() => {
                tracing::debug!("client closed while connecting");
                return Err(Error::ConnectionClosed);
            }
        };
        let ws_stream = match result {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                self.record_error(&e.to_string());
                self.set_state(ConnectionState::Closed);
                return Err(Error::WebSocketConnect(e.to_string()));
            }
        };

        let (sink, stream) = ws_stream.split();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *lock(&self.inner.outbound) = Some(outbound_tx);

        // Held across the state change so a concurrent `close` sees the tasks.
        let mut handles = lock(&self.inner.task_handles);
        if !self.on_open() {
            drop(handles);
            lock(&self.inner.outbound).take();
            tracing::debug!("client closed while connecting, dropping socket");
            return Err(Error::ConnectionClosed);
        }
        handles.push(tokio::spawn(write_loop(sink, outbound_rx)));
        handles.push(tokio::spawn(read_loop(
            self.clone(),
            stream,
            self.inner.cancel.clone(),
        )));
        Ok(())
    }

    /// Close the connection and wait for the background tasks to finish.
    ///
    /// Sends a close frame and gives the server a few seconds to answer
    /// before the reader is cancelled. Outstanding requests fail with
    /// [`Error::ConnectionClosed`].
    pub async fn close(&self) {
        let mut previous = ConnectionState::Closed;
        self.inner.state.send_if_modified(|state| {
            previous = *state;
            *state = match *state {
                ConnectionState::Open => ConnectionState::Closing,
                ConnectionState::Disconnected | ConnectionState::Connecting => {
                    ConnectionState::Closed
                }
                ConnectionState::Closing | ConnectionState::Closed => return false,
            };
            true
        });
        tracing::debug!(from = %previous, "closing connection");

        match previous {
            ConnectionState::Open => {
                let frame = CloseFrame {
                    code: CloseCode::Normal,
                    reason: Utf8Bytes::from_static("client closing"),
                };
                if let Some(tx) = lock(&self.inner.outbound).as_ref() {
                    let _ = tx.send(Message::Close(Some(frame)));
                }
            }
            ConnectionState::Disconnected => return,
            // An in-flight `connect` sees the cancellation and gives up.
            ConnectionState::Connecting => self.inner.cancel.cancel(),
            ConnectionState::Closing | ConnectionState::Closed => {}
        }

        let handles: Vec<_> = lock(&self.inner.task_handles).drain(..).collect();
        let mut handles = handles.into_iter();
        // The reader is the second handle; wait on it first so the
        // server's close reply is observed before we cancel.
        let writer = handles.next();
        if let Some(reader) = handles.next() {
            let cancel = self.inner.cancel.clone();
            let mut reader = reader;
            tokio::select! {
                _ = &mut reader => {}
                () = tokio::time::sleep(CLOSE_TIMEOUT) => {
                    tracing::debug!("server did not answer close frame, cancelling reader");
                    cancel.cancel();
                    let _ = reader.await;
                }
            }
        }
        self.inner.cancel.cancel();
        if let Some(writer) = writer {
            let _ = writer.await;
        }
        self.set_state(ConnectionState::Closed);
    }

    // ── Outbound ─────────────────────────────────────────────────────

    /// Queue a raw text frame for the writer.
    ///
    /// Fails fast with [`Error::NotConnected`] unless the connection
    /// is `Open`.
    pub fn send(&self, frame: impl Into<String>) -> Result<(), Error> {
        let state = self.state();
        if state != ConnectionState::Open {
            return Err(Error::NotConnected { state });
        }

        let outbound = lock(&self.inner.outbound);
        let Some(tx) = outbound.as_ref() else {
            return Err(Error::NotConnected { state });
        };
        let frame: String = frame.into();
        tx.send(Message::Text(frame.into()))
            .map_err(|_| Error::ConnectionClosed)
    }

    // ── Socket callbacks ─────────────────────────────────────────────

    /// `Connecting -> Open`. Refused once the client has been closed.
    fn on_open(&self) -> bool {
        let cancelled = self.inner.cancel.is_cancelled();
        let opened = self.inner.state.send_if_modified(|state| {
            if *state == ConnectionState::Connecting && !cancelled {
                *state = ConnectionState::Open;
                true
            } else {
                false
            }
        });
        if opened {
            tracing::info!("Z-Wave JS connection open");
        }
        opened
    }

    /// Route one inbound text frame. Undecodable frames are dropped.
    pub(crate) fn on_frame(&self, frame: &str) {
        let message = match codec::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "ignoring inbound frame");
                return;
            }
        };

        match message {
            InboundMessage::Version(info) => {
                tracing::info!(
                    driver_version = info.driver_version.as_deref().unwrap_or("?"),
                    server_version = info.server_version.as_deref().unwrap_or("?"),
                    "server handshake received"
                );
                self.bootstrap();
                self.inner.server_version.send_replace(Some(info));
            }
            InboundMessage::Result(result) => {
                let message_id = result.message_id.clone();
                self.inner.registry.resolve(&message_id, result);
            }
            InboundMessage::Event(event) => {
                tracing::trace!(source = %event.source, event = %event.event, "event received");
                self.inner.dispatcher.dispatch(&event);
            }
        }
    }

    fn on_close(&self, code: Option<u16>, reason: &str, remote: bool) {
        self.set_state(ConnectionState::Closed);
        lock(&self.inner.outbound).take();

        let failed = self.inner.registry.clear();
        tracing::info!(
            code = code.unwrap_or(0),
            reason,
            remote,
            failed_requests = failed,
            "Z-Wave JS connection closed"
        );
    }

    fn on_error(&self, err: &tungstenite::Error) {
        tracing::warn!(error = %err, "Z-Wave JS socket error");
        self.record_error(&err.to_string());
    }

    /// Protocol bootstrap: must precede any other command.
    ///
    /// Both commands are sent back to back; their results are checked on
    /// a detached task so the reader keeps going.
    fn bootstrap(&self) {
        for command in [DISABLE_STATISTICS, START_LISTENING] {
            let pending = match self.send_request(command, None) {
                Ok(pending) => pending,
                Err(e) => {
                    tracing::warn!(command, error = %e, "bootstrap command not sent");
                    continue;
                }
            };

            let timeout = self.inner.config.request_timeout;
            tokio::spawn(async move {
                match pending.wait(timeout).await {
                    Ok(result) if result.success => {
                        tracing::debug!(command, "bootstrap command acknowledged");
                    }
                    Ok(result) => tracing::warn!(
                        command,
                        error_code = result.error_code.as_deref().unwrap_or("unknown"),
                        "bootstrap command rejected"
                    ),
                    Err(e) => tracing::warn!(command, error = %e, "bootstrap command failed"),
                }
            });
        }
    }

    fn set_state(&self, state: ConnectionState) {
        let previous = self.inner.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "connection state changed");
        }
    }

    fn record_error(&self, message: &str) {
        *lock(&self.inner.last_error) = Some(message.to_owned());
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Read frames until the socket ends or the client cancels.
async fn read_loop(client: Client, mut stream: SplitStream<WsStream>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                client.on_close(None, "closed by client", false);
                return;
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => client.on_frame(text.as_str()),
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|cf| (Some(u16::from(cf.code)), cf.reason.as_str().to_owned()))
                            .unwrap_or_default();
                        let remote = client.state() != ConnectionState::Closing;
                        client.on_close(code, &reason, remote);
                        return;
                    }
                    Some(Ok(_)) => {
                        // Binary, Ping, Pong, Frame -- tungstenite answers pings itself
                    }
                    Some(Err(e)) => client.on_error(&e),
                    None => {
                        client.on_close(None, "stream ended", true);
                        return;
                    }
                }
            }
        }
    }
}

/// Drain the outbound queue into the socket. Ends when every sender is
/// dropped (connection closed) or after a close frame goes out.
async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outbound.recv().await {
        let is_close = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            tracing::warn!(error = %e, "failed to write frame");
            break;
        }
        if is_close {
            return;
        }
    }
    let _ = sink.close().await;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Test support ─────────────────────────────────────────────────────

#[cfg(test)]
impl Client {
    /// A client in the `Open` state whose outbound frames land in the
    /// returned receiver instead of a socket.
    pub(crate) fn attached(config: ClientConfig) -> (Self, mpsc::UnboundedReceiver<Message>) {
        let client = Self::new(config);
        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&client.inner.outbound) = Some(tx);
        client.set_state(ConnectionState::Connecting);
        client.on_open();
        (client, rx)
    }

    pub(crate) fn simulate_close(&self) {
        self.on_close(Some(1001), "going away", true);
    }
}

#[cfg(test)]
pub(crate) fn frame_text(message: Message) -> String {
    match message {
        Message::Text(text) => text.as_str().to_owned(),
        other => panic!("expected text frame, got {other:?}"),
    }
}

// ── Tests ────────────────────────────────────────────────────────────
