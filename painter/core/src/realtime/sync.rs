//! WebSocket session that keeps the canvas live
//!
//! ```text
//!  Disconnected ──► Connecting ──► Streaming ──┬─► Disconnected (error, reload, refresh)
//!        ▲              │                      │
//!        └── dial error ┘                      └─► Closing ──► Closed (shutdown)
//! ```
//!
//! [`RealtimeSync::run`] dials until it gets a connection, then streams until
//! the connection drops or the remote asks for a resync. The caller is
//! expected to refresh the canvas from a snapshot and call `run` again.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{watch, Notify};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::header::{HeaderValue, USER_AGENT};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::decoder::{decode_frame, Frame};
use crate::canvas::CanvasState;
use crate::error::{PainterError, PainterResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;

// =============================================================================
// Configuration
// =============================================================================

/// Realtime stream settings
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Push endpoint, without the resume parameter
    pub url: String,

    /// User-Agent sent on the upgrade request
    pub user_agent: String,

    /// How long to wait for the peer to acknowledge a close frame
    pub close_timeout: Duration,

    /// Delay between failed dial attempts (zero retries immediately)
    pub reconnect_delay: Duration,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: "wss://josephg.com/sp/ws".to_string(),
            user_agent: crate::DEFAULT_USER_AGENT.to_string(),
            close_timeout: Duration::from_secs(1),
            reconnect_delay: Duration::ZERO,
        }
    }
}

impl RealtimeConfig {
    /// Create a configuration for `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Set the close handshake timeout
    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set the dial retry delay
    #[must_use]
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Endpoint with the resume parameter for `version`
    #[must_use]
    pub fn resume_url(&self, version: u32) -> String {
        let sep = if self.url.contains('?') { '&' } else { '?' };
        format!("{}{sep}from={version}", self.url)
    }
}

// =============================================================================
// State
// =============================================================================

/// Lifecycle of the realtime connection
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// No connection
    Disconnected,
    /// Dialing
    Connecting,
    /// Reading frames
    Streaming,
    /// Close frame sent, waiting for the peer
    Closing,
    /// Shut down for good
    Closed,
}

/// Why a streaming session ended without a shutdown
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResyncReason {
    /// Remote sent `reload`
    Reload,
    /// Remote sent `refresh`
    Refresh,
    /// Peer closed the stream
    StreamEnded,
    /// Read failed
    ReadError(String),
}

/// How [`RealtimeSync::run`] finished
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncExit {
    /// Stream is gone; refresh from a snapshot and run again
    Resync(ResyncReason),
    /// Shutdown was requested
    Shutdown,
}

/// Counters for the realtime stream
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Successful dials
    pub connects: u64,
    /// Edit frames applied
    pub frames: u64,
    /// Individual patches applied
    pub patches: u64,
    /// Malformed frames, tails and out-of-bounds edits
    pub protocol_errors: u64,
}

#[derive(Debug, Default)]
struct SyncCounters {
    connects: AtomicU64,
    frames: AtomicU64,
    patches: AtomicU64,
    protocol_errors: AtomicU64,
}

#[derive(Clone)]
struct ActiveStream {
    sink: Arc<tokio::sync::Mutex<WsSink>>,
    finished: watch::Receiver<bool>,
    abort: Arc<Notify>,
}

// =============================================================================
// RealtimeSync
// =============================================================================

/// Applies the remote diff stream to a [`CanvasState`]
pub struct RealtimeSync {
    config: RealtimeConfig,
    canvas: Arc<CanvasState>,
    state: Mutex<ConnectionState>,
    active: Mutex<Option<ActiveStream>>,
    shutting_down: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    counters: SyncCounters,
}

impl RealtimeSync {
    /// Create a session for `canvas`
    #[must_use]
    pub fn new(config: RealtimeConfig, canvas: Arc<CanvasState>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            canvas,
            state: Mutex::new(ConnectionState::Disconnected),
            active: Mutex::new(None),
            shutting_down: AtomicBool::new(false),
            shutdown_tx,
            counters: SyncCounters::default(),
        }
    }

    /// Current connection state
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    /// Snapshot of stream counters
    #[must_use]
    pub fn stats(&self) -> SyncStats {
        SyncStats {
            connects: self.counters.connects.load(Ordering::Relaxed),
            frames: self.counters.frames.load(Ordering::Relaxed),
            patches: self.counters.patches.load(Ordering::Relaxed),
            protocol_errors: self.counters.protocol_errors.load(Ordering::Relaxed),
        }
    }

    /// Whether [`Self::shutdown`] has been called
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if *state != next {
            debug!(from = ?*state, to = ?next, "Realtime state change");
            *state = next;
        }
    }

    /// Dial and stream until the connection ends or shutdown is requested
    ///
    /// Dial failures are retried indefinitely.
    pub async fn run(&self) -> SyncExit {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let ws = loop {
            if self.is_shutting_down() {
                self.set_state(ConnectionState::Closed);
                return SyncExit::Shutdown;
            }
            self.set_state(ConnectionState::Connecting);
            let url = self.config.resume_url(self.canvas.version());
            info!(url = %url, "Connecting to realtime stream");

            let dial = tokio::select! {
                result = self.connect(&url) => result,
                _ = shutdown_rx.wait_for(|stop| *stop) => {
                    self.set_state(ConnectionState::Closed);
                    return SyncExit::Shutdown;
                }
            };
            match dial {
                Ok(ws) => break ws,
                Err(e) => {
                    warn!(error = %e, "Realtime dial failed");
                    self.set_state(ConnectionState::Disconnected);
                    if !self.config.reconnect_delay.is_zero() {
                        tokio::time::sleep(self.config.reconnect_delay).await;
                    }
                }
            }
        };

        self.counters.connects.fetch_add(1, Ordering::Relaxed);
        let (sink, stream) = ws.split();
        let (finished_tx, finished_rx) = watch::channel(false);
        let abort = Arc::new(Notify::new());
        *self.active.lock() = Some(ActiveStream {
            sink: Arc::new(tokio::sync::Mutex::new(sink)),
            finished: finished_rx,
            abort: Arc::clone(&abort),
        });

        let reason = if self.is_shutting_down() {
            // Shutdown raced the dial; dropping both halves closes the socket
            None
        } else {
            self.set_state(ConnectionState::Streaming);
            Some(self.read_loop(stream, &abort).await)
        };

        finished_tx.send_replace(true);
        self.active.lock().take();

        match reason {
            Some(reason) if !self.is_shutting_down() => {
                info!(reason = ?reason, "Realtime stream ended");
                self.set_state(ConnectionState::Disconnected);
                SyncExit::Resync(reason)
            }
            _ => {
                info!("Realtime stream closed");
                self.set_state(ConnectionState::Closed);
                SyncExit::Shutdown
            }
        }
    }

    async fn connect(&self, url: &str) -> PainterResult<WsStream> {
        let mut request = url
            .into_client_request()
            .map_err(|e| PainterError::Transport(format!("Invalid realtime URL {url}: {e}")))?;
        if let Ok(agent) = HeaderValue::from_str(&self.config.user_agent) {
            request.headers_mut().insert(USER_AGENT, agent);
        }
        let (ws, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| PainterError::Transport(e.to_string()))?;
        Ok(ws)
    }

    async fn read_loop(&self, mut stream: SplitStream<WsStream>, abort: &Notify) -> ResyncReason {
        loop {
            let next = tokio::select! {
                msg = stream.next() => msg,
                () = abort.notified() => {
                    warn!("Forcing realtime connection closed");
                    return ResyncReason::StreamEnded;
                }
            };
            match next {
                None => return ResyncReason::StreamEnded,
                Some(Err(e)) => {
                    warn!(error = %e, "Realtime read error");
                    return ResyncReason::ReadError(e.to_string());
                }
                Some(Ok(Message::Binary(data))) => {
                    if let Some(reason) = self.apply_message(&data) {
                        return reason;
                    }
                }
                Some(Ok(Message::Text(text))) => {
                    if let Some(reason) = self.apply_message(text.as_bytes()) {
                        return reason;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    debug!(frame = ?frame, "Peer sent close frame");
                }
                Some(Ok(_)) => {}
            }
        }
    }

    /// Decode one message and apply its edits to the canvas
    ///
    /// Returns a reason when the message asks for a resync. Malformed data is
    /// logged and skipped.
    pub fn apply_message(&self, data: &[u8]) -> Option<ResyncReason> {
        match decode_frame(data) {
            Ok(Frame::Reload) => {
                info!("Got reload command");
                Some(ResyncReason::Reload)
            }
            Ok(Frame::Refresh) => {
                info!("Got refresh command");
                Some(ResyncReason::Refresh)
            }
            Ok(Frame::Edits(mut batch)) => {
                if let Some(tail) = &batch.malformed_tail {
                    self.counters.protocol_errors.fetch_add(1, Ordering::Relaxed);
                    warn!(tail = ?tail, version = batch.version, "Unknown suffix on edits");
                }
                let dropped = batch.retain_within(self.canvas.dims());
                if dropped > 0 {
                    self.counters
                        .protocol_errors
                        .fetch_add(dropped as u64, Ordering::Relaxed);
                    warn!(dropped, version = batch.version, "Edits outside the canvas");
                }
                // Version advances even if every edit was dropped
                self.canvas.apply_patches(batch.version, &batch.patches);
                self.counters.frames.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .patches
                    .fetch_add(batch.patches.len() as u64, Ordering::Relaxed);
                debug!(
                    version = batch.version,
                    patches = batch.patches.len(),
                    "Applied realtime edits"
                );
                None
            }
            Err(e) => {
                self.counters.protocol_errors.fetch_add(1, Ordering::Relaxed);
                warn!(error = %e, "Ignoring malformed realtime frame");
                None
            }
        }
    }

    /// Close the stream cooperatively
    ///
    /// Sends a close frame and waits up to the configured timeout for the
    /// read loop to finish before forcing the connection down. A no-op when
    /// no connection is open. Any `run` in progress returns
    /// [`SyncExit::Shutdown`].
    pub async fn shutdown(&self) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.shutdown_tx.send_replace(true);

        let Some(active) = self.active.lock().clone() else {
            return;
        };
        self.set_state(ConnectionState::Closing);

        let close = Message::Close(Some(CloseFrame {
            code: CloseCode::Normal,
            reason: "".into(),
        }));
        let sent = tokio::time::timeout(self.config.close_timeout, async {
            let mut sink = active.sink.lock().await;
            sink.send(close).await
        })
        .await;
        match sent {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(error = %e, "Write close error");
                active.abort.notify_one();
                return;
            }
            Err(_) => {
                warn!("Timed out sending close frame");
                active.abort.notify_one();
                return;
            }
        }

        let mut finished = active.finished;
        let acked = tokio::time::timeout(self.config.close_timeout, finished.wait_for(|done| *done))
            .await
            .is_ok();
        if acked {
            info!("Realtime close acknowledged");
        } else {
            warn!(
                timeout_ms = self.config.close_timeout.as_millis() as u64,
                "Close handshake timed out"
            );
            active.abort.notify_one();
        }
    }
}
