//! The router: a single task that owns the registry and fans events out.
//!
//! Sessions never talk to each other. They send [`SessionEvent`]s to the
//! router, and the router decides who hears about them by consulting
//! each session's subscription set. Because one task consumes both the
//! registration channel and the event channel, a session is always
//! registered before any of its events are routed, and deliveries for
//! one event are enumerated against a consistent registry snapshot.

use tokio::sync::mpsc;

use wirebus_protocol::{Frame, SYSTEM_TOPIC};
use wirebus_session::{SessionEvent, SessionHandle};
use wirebus_transport::ConnectionId;

use crate::Registry;

/// Cheap clonable handle for feeding the router.
///
/// The accept loop uses [`register`](RouterHandle::register) for each
/// accepted connection and hands [`events_sender`](RouterHandle::events_sender)
/// to every session it spawns.
#[derive(Debug, Clone)]
pub struct RouterHandle {
    registrations: mpsc::UnboundedSender<SessionHandle>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

impl RouterHandle {
    /// Registers a new session with the router. Must happen before the
    /// session task is spawned, so the registry sees the session before
    /// its first event.
    pub fn register(&self, handle: SessionHandle) {
        let _ = self.registrations.send(handle);
    }

    /// The sender sessions use to report their events.
    pub fn events_sender(&self) -> mpsc::UnboundedSender<SessionEvent> {
        self.events.clone()
    }
}

/// The routing task. Owns the [`Registry`]; consumed by [`run`](Router::run).
pub struct Router {
    broker_name: String,
    registry: Registry,
    registrations: mpsc::UnboundedReceiver<SessionHandle>,
    events: mpsc::UnboundedReceiver<SessionEvent>,
}

impl Router {
    /// Creates a router and its handle. `broker_name` is the identity
    /// announced in HELO greetings and timeout notices.
    pub fn new(broker_name: impl Into<String>) -> (Self, RouterHandle) {
        let (registration_tx, registration_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let router = Self {
            broker_name: broker_name.into(),
            registry: Registry::new(),
            registrations: registration_rx,
            events: event_rx,
        };
        let handle = RouterHandle {
            registrations: registration_tx,
            events: event_tx,
        };
        (router, handle)
    }

    /// Drives the router until every handle is dropped.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                // Registrations drain first so a freshly accepted
                // session is in the registry before any queued event
                // is routed.
                biased;

                registration = self.registrations.recv() => {
                    match registration {
                        Some(handle) => self.register(handle),
                        None => break,
                    }
                }

                event = self.events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }
        tracing::debug!("router stopped");
    }

    /// Adds a session and greets it.
    fn register(&mut self, handle: SessionHandle) {
        tracing::info!(id = %handle.id(), "session registered");
        handle.deliver(Frame::helo(&self.broker_name));
        self.registry.insert(handle);
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Published { origin, frame } => {
                // Frames without a topic have nowhere to go.
                let Some(topic) = frame.topic().map(str::to_string)
                else {
                    return;
                };
                self.fan_out(origin, &topic, frame).await;
            }

            SessionEvent::TimedOut { origin, name } => {
                tracing::info!(
                    id = %origin,
                    client = %name,
                    "announcing timeout"
                );
                let notice =
                    Frame::timeout_notice(&self.broker_name, &name);
                self.fan_out(origin, SYSTEM_TOPIC, notice).await;
            }

            SessionEvent::Closed { origin } => {
                self.registry.remove(origin);
                tracing::info!(
                    id = %origin,
                    live = self.registry.len(),
                    "session removed"
                );
            }
        }
    }

    /// Delivers `frame` to every session subscribed to `topic`, except
    /// the one it came from.
    async fn fan_out(
        &self,
        origin: ConnectionId,
        topic: &str,
        frame: Frame,
    ) {
        let mut delivered = 0usize;
        for handle in self.registry.iter() {
            if handle.id() == origin {
                continue;
            }
            if handle.is_subscribed(topic).await {
                handle.deliver(frame.clone());
                delivered += 1;
            }
        }
        tracing::debug!(%origin, topic, delivered, "fanned out event");
    }
}

// =========================================================================
// Tests
// =========================================================================
