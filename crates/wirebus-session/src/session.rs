//! The session task: one Tokio task owning one connection.
//!
//! A session converts the connection's byte stream into frames, executes
//! the per-frame handlers ([`PeerState`]), runs the two liveness timers,
//! and drains an outbound channel of frames other components want written.
//! Communication outward is a small closed set of notifications
//! ([`SessionEvent`]) on a channel — no callbacks, no shared registry.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──→ run() ──→ [select loop: recv / heartbeat / timeout / outbound]
//!                           │
//!              disconnect / transport error / protocol violation /
//!              timeout / close request
//!                           │
//!                           ▼
//!                      close (once) ──→ SessionEvent::Closed
//! ```
//!
//! Every exit path funnels through the same close step, which is
//! idempotent: racing triggers (a timeout firing while the transport
//! reports closure) still produce exactly one `Closed` notification.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{Mutex, mpsc};
use tokio::time::interval_at;

use wirebus_protocol::{Frame, FrameAssembler, JsonCodec, ProtocolError};
use wirebus_transport::{Connection, ConnectionId};

use crate::peer::{Action, PeerState};
use crate::SessionConfig;

// ---------------------------------------------------------------------------
// Outward notifications
// ---------------------------------------------------------------------------

/// The notifications a session raises for its owner (the broker's router,
/// or whoever spawned it).
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The peer published an event frame; `frame` already carries the
    /// broker-stamped sender. The origin never receives it back.
    Published {
        origin: ConnectionId,
        frame: Frame,
    },

    /// The peer went silent past the timeout threshold and had a known
    /// name. Raised immediately before the session closes.
    TimedOut {
        origin: ConnectionId,
        name: String,
    },

    /// The session is gone: transport closed, timers cancelled, buffer
    /// released. Raised exactly once per session.
    Closed { origin: ConnectionId },
}

/// Commands a [`SessionHandle`] can push into the session task.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Write this frame to the peer (fire-and-forget).
    Deliver(Frame),
    /// Tear the session down.
    Close,
}

// ---------------------------------------------------------------------------
// SessionHandle
// ---------------------------------------------------------------------------

/// Cheap clonable handle to a running session.
///
/// The router keeps one per live session: it reads the peer's name and
/// subscription set for fan-out decisions and queues outbound frames.
/// All methods are safe against a session that already closed — delivery
/// to a dead session is silently dropped, exactly like a write to a peer
/// that is about to vanish.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: ConnectionId,
    peer: Arc<Mutex<PeerState>>,
    commands: mpsc::UnboundedSender<SessionCommand>,
}

impl SessionHandle {
    /// Builds a handle from its parts. Normally obtained from
    /// [`Session::new`]; constructible directly for tests that exercise
    /// routing without a socket.
    pub fn new(
        id: ConnectionId,
        peer: Arc<Mutex<PeerState>>,
        commands: mpsc::UnboundedSender<SessionCommand>,
    ) -> Self {
        Self { id, peer, commands }
    }

    /// The session's connection ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// The peer's declared name (empty until it handshakes).
    pub async fn name(&self) -> String {
        self.peer.lock().await.name().to_string()
    }

    /// Whether the peer is currently subscribed to `topic`.
    pub async fn is_subscribed(&self, topic: &str) -> bool {
        self.peer.lock().await.is_subscribed(topic)
    }

    /// Queues a frame for delivery. Fire-and-forget: no acknowledgment,
    /// no buffering beyond the channel, no error if the session is gone.
    pub fn deliver(&self, frame: Frame) {
        let _ = self.commands.send(SessionCommand::Deliver(frame));
    }

    /// Requests the session to close. Idempotent.
    pub fn close(&self) {
        let _ = self.commands.send(SessionCommand::Close);
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Why the select loop ended. Only used for the close path and logging.
#[derive(Debug)]
enum CloseReason {
    /// The peer closed the stream cleanly.
    Disconnected,
    /// The transport reported a send/recv failure.
    Transport(String),
    /// A record failed to decode or the buffer bound was exceeded.
    Protocol(ProtocolError),
    /// No inbound bytes within the timeout threshold.
    TimedOut,
    /// A handle asked us to close (or every handle was dropped).
    Requested,
}

/// One live connection in the broker- or spawning-side role.
///
/// Owns the transport connection, the accumulation buffer, and the
/// last-activity clock. Consumed by [`run`](Session::run).
pub struct Session<C: Connection> {
    id: ConnectionId,
    conn: C,
    peer: Arc<Mutex<PeerState>>,
    assembler: FrameAssembler,
    codec: JsonCodec,
    config: SessionConfig,
    events: mpsc::UnboundedSender<SessionEvent>,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    closed: bool,
}

impl<C: Connection> Session<C> {
    /// Wraps an accepted connection into a session and its handle.
    ///
    /// The session does nothing until [`run`](Session::run) is spawned;
    /// callers should register the handle with the router first so the
    /// registry sees the session before any of its events.
    pub fn new(
        conn: C,
        config: SessionConfig,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> (Self, SessionHandle) {
        let id = conn.id();
        let peer = Arc::new(Mutex::new(PeerState::new()));
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let handle =
            SessionHandle::new(id, Arc::clone(&peer), command_tx);
        let session = Self {
            id,
            conn,
            peer,
            assembler: FrameAssembler::with_limit(config.max_buffer),
            codec: JsonCodec,
            config,
            events,
            commands: command_rx,
            closed: false,
        };
        (session, handle)
    }

    /// The session's connection ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Drives the session until it closes.
    ///
    /// All socket readiness, timer firings, and outbound deliveries are
    /// serialized through one `select!` loop, so no frame handler ever
    /// runs concurrently with another for this session, and inbound
    /// frames are processed strictly in reassembly order.
    pub async fn run(mut self) {
        let hb = self.config.heartbeat_interval;
        let check = self.config.timeout_check_interval;
        // interval_at: first fire after one full period, like the
        // reference's setInterval, not immediately.
        let mut heartbeat =
            interval_at(tokio::time::Instant::now() + hb, hb);
        let mut timeout_check =
            interval_at(tokio::time::Instant::now() + check, check);

        let mut last_seen = Instant::now();

        let reason = loop {
            tokio::select! {
                res = self.conn.recv() => match res {
                    Ok(Some(chunk)) => {
                        // Any inbound bytes count as activity, decodable
                        // or not.
                        last_seen = Instant::now();
                        self.assembler.push(&chunk);
                        // Dispatch record by record: frames ahead of a
                        // malformed one still take effect before the
                        // violation closes the session.
                        let failure = loop {
                            match self.assembler.next_record() {
                                Ok(Some(record)) => {
                                    if let Err(reason) =
                                        self.dispatch(record).await
                                    {
                                        break Some(reason);
                                    }
                                }
                                Ok(None) => break None,
                                Err(e) => {
                                    break Some(CloseReason::Protocol(e));
                                }
                            }
                        };
                        if let Some(reason) = failure {
                            break reason;
                        }
                    }
                    Ok(None) => break CloseReason::Disconnected,
                    Err(e) => {
                        break CloseReason::Transport(e.to_string());
                    }
                },

                _ = heartbeat.tick() => {
                    if let Err(reason) =
                        self.write_frame(&Frame::heartbeat()).await
                    {
                        break reason;
                    }
                }

                _ = timeout_check.tick() => {
                    if last_seen.elapsed() > self.config.timeout {
                        break CloseReason::TimedOut;
                    }
                }

                cmd = self.commands.recv() => match cmd {
                    Some(SessionCommand::Deliver(frame)) => {
                        if let Err(reason) =
                            self.write_frame(&frame).await
                        {
                            break reason;
                        }
                    }
                    Some(SessionCommand::Close) | None => {
                        break CloseReason::Requested;
                    }
                },
            }
        };

        // Dropping out of the loop cancels both timers and abandons any
        // buffered-but-unhandled bytes.
        self.close(reason).await;
    }

    /// Runs the peer handlers for one decoded record and executes the
    /// resulting actions.
    async fn dispatch(
        &self,
        record: wirebus_protocol::Decoded,
    ) -> Result<(), CloseReason> {
        let actions = self.peer.lock().await.handle(record);

        for action in actions {
            match action {
                Action::Reply(frame) => self.write_frame(&frame).await?,
                Action::Publish(frame) => {
                    let _ = self.events.send(SessionEvent::Published {
                        origin: self.id,
                        frame,
                    });
                }
            }
        }
        Ok(())
    }

    /// Encodes and writes one frame. A write failure is a transport
    /// failure: no app-level error, the normal close path follows.
    async fn write_frame(
        &self,
        frame: &Frame,
    ) -> Result<(), CloseReason> {
        let bytes = self
            .codec
            .encode(frame)
            .map_err(CloseReason::Protocol)?;
        self.conn
            .send(&bytes)
            .await
            .map_err(|e| CloseReason::Transport(e.to_string()))
    }

    /// The single terminal transition. Safe to reach from any number of
    /// racing triggers; everything after the first call is a no-op.
    async fn close(&mut self, reason: CloseReason) {
        if self.closed {
            return;
        }
        self.closed = true;

        match &reason {
            CloseReason::Disconnected => {
                tracing::info!(id = %self.id, "peer disconnected");
            }
            CloseReason::Transport(e) => {
                tracing::debug!(id = %self.id, error = %e, "transport failure");
            }
            CloseReason::Protocol(e) => {
                tracing::info!(id = %self.id, error = %e, "protocol violation");
            }
            CloseReason::TimedOut => {
                tracing::info!(id = %self.id, "peer timed out");
            }
            CloseReason::Requested => {
                tracing::debug!(id = %self.id, "close requested");
            }
        }

        // A timeout of a named peer is announced before the close so the
        // router can notify "system" subscribers.
        if matches!(reason, CloseReason::TimedOut) {
            let name = self.peer.lock().await.name().to_string();
            if !name.is_empty() {
                let _ = self.events.send(SessionEvent::TimedOut {
                    origin: self.id,
                    name,
                });
            }
        }

        let _ = self.conn.close().await;
        let _ = self
            .events
            .send(SessionEvent::Closed { origin: self.id });
    }
}

// =========================================================================
// Tests
// =========================================================================
