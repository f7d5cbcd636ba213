/// SSE Session Manager
///
/// Owns every open Server-Sent Events stream, keyed by an unguessable session
/// token. Responses produced for a POSTed request are routed back to the
/// stream whose token the request carried. Each session also runs a
/// keep-alive ticker so idle connections survive intermediary proxies.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures_util::Stream;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Interval between keep-alive comment frames.
pub const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(30);

/// Frames queued per session before new frames are dropped.
pub const FRAME_BUFFER: usize = 64;

/// One frame written to an SSE stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// Announces the submission path for this session
    Endpoint(String),
    /// A serialized JSON-RPC response
    Message(String),
    KeepAlive,
}

impl SseFrame {
    pub fn message<T: Serialize>(payload: &T) -> serde_json::Result<Self> {
        serde_json::to_string(payload).map(SseFrame::Message)
    }

    /// Wire encoding of the frame.
    ///
    /// Compact JSON never contains a raw newline, so a message always fits on
    /// a single `data:` line.
    pub fn to_bytes(&self) -> Bytes {
        match self {
            SseFrame::Endpoint(path) => Bytes::from(format!("event: endpoint\ndata: {}\n\n", path)),
            SseFrame::Message(json) => Bytes::from(format!("event: message\ndata: {}\n\n", json)),
            SseFrame::KeepAlive => Bytes::from_static(b": keep-alive\n\n"),
        }
    }
}

struct Session {
    sender: mpsc::Sender<SseFrame>,
    created_at: Instant,
    keep_alive: JoinHandle<()>,
}

/// Write handle for a live session.
#[derive(Clone)]
pub struct SessionSender {
    sender: mpsc::Sender<SseFrame>,
}

impl SessionSender {
    /// Queue a frame without waiting.
    ///
    /// Returns `false` if the frame was not queued: either the stream is
    /// already gone, or the client stopped reading and the session's buffer
    /// of [`FRAME_BUFFER`] frames is full, in which case the frame is dropped.
    pub fn send(&self, frame: SseFrame) -> bool {
        match self.sender.try_send(frame) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("session buffer full, dropping frame");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Table of live SSE sessions.
pub struct SessionManager {
    sessions: Mutex<HashMap<String, Session>>,
    keep_alive_interval: Duration,
}

impl SessionManager {
    /// Create an empty table whose sessions tick every `keep_alive_interval`.
    pub fn new(keep_alive_interval: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            keep_alive_interval,
        }
    }

    /// Register a new session and return its token and frame stream.
    ///
    /// Must be called from within a tokio runtime: the keep-alive ticker is
    /// spawned here. The session closes when the returned stream is dropped.
    pub fn open(self: &Arc<Self>) -> (String, SessionStream) {
        let (sender, receiver) = mpsc::channel(FRAME_BUFFER);
        let keep_alive = tokio::spawn(keep_alive_loop(sender.clone(), self.keep_alive_interval));

        let token = {
            let mut sessions = self.sessions.lock();
            let token = loop {
                let candidate = Uuid::new_v4().to_string();
                if !sessions.contains_key(&candidate) {
                    break candidate;
                }
            };
            sessions.insert(
                token.clone(),
                Session {
                    sender,
                    created_at: Instant::now(),
                    keep_alive,
                },
            );
            token
        };

        tracing::info!(session = %token, "session opened");

        let stream = SessionStream {
            receiver,
            _guard: SessionGuard {
                token: token.clone(),
                manager: Arc::clone(self),
            },
        };
        (token, stream)
    }

    /// Look up the write handle for a live session. Never creates one.
    ///
    /// # Arguments
    /// * `token` - Session token issued by [`SessionManager::open`]
    pub fn get(&self, token: &str) -> Option<SessionSender> {
        self.sessions.lock().get(token).map(|session| SessionSender {
            sender: session.sender.clone(),
        })
    }

    /// Remove a session and stop its keep-alive ticker. Unknown tokens are ignored.
    pub fn close(&self, token: &str) {
        let removed = self.sessions.lock().remove(token);
        if let Some(session) = removed {
            session.keep_alive.abort();
            tracing::info!(
                session = %token,
                open_for_ms = session.created_at.elapsed().as_millis() as u64,
                "session closed"
            );
        }
    }

    /// Close every session; used when the server stops.
    pub fn close_all(&self) {
        let drained: Vec<(String, Session)> = self.sessions.lock().drain().collect();
        for (token, session) in drained {
            session.keep_alive.abort();
            tracing::debug!(session = %token, "session closed at shutdown");
        }
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether no session is currently open.
    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new(DEFAULT_KEEP_ALIVE)
    }
}

/// Push a keep-alive frame every `period`.
///
/// A full buffer means the client is not reading; the tick is skipped rather
/// than queued behind frames that are already pending.
async fn keep_alive_loop(sender: mpsc::Sender<SseFrame>, period: Duration) {
    let start = tokio::time::Instant::now() + period;
    let mut ticker = tokio::time::interval_at(start, period);
    loop {
        ticker.tick().await;
        match sender.try_send(SseFrame::KeepAlive) {
            Ok(()) | Err(TrySendError::Full(_)) => {}
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("keep-alive stopped, stream closed");
                break;
            }
        }
    }
}

struct SessionGuard {
    token: String,
    manager: Arc<SessionManager>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.manager.close(&self.token);
    }
}

/// Frames destined for one SSE connection.
///
/// Ends once the session is closed; dropping it closes the session.
pub struct SessionStream {
    receiver: mpsc::Receiver<SseFrame>,
    _guard: SessionGuard,
}

impl Stream for SessionStream {
    type Item = SseFrame;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<SseFrame>> {
        self.receiver.poll_recv(cx)
    }
}
