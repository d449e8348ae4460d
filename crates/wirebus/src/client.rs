//! A Wirebus client: connects, handshakes, subscribes, publishes.
//!
//! The client mirrors the broker's session shape: one background task
//! owns the connection and a `select!` loop over inbound bytes, the
//! heartbeat and timeout timers, and a command channel. A broker that
//! goes silent past the timeout threshold is treated as dead and the
//! client closes. The [`Client`] the caller holds is just the command
//! sender plus a receiver for delivered events; dropping it disconnects.

use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval_at;

use wirebus_protocol::{
    Decoded, Frame, FrameAssembler, JsonCodec, Map, Value,
};
use wirebus_transport::{Connection, TcpConnection};

use crate::WirebusError;

/// Client-side connection settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// The name announced in the handshake. Shows up as the `sender` of
    /// every event this client publishes.
    pub client_name: String,

    /// Topics declared up front in the handshake, subscribed before the
    /// first event can arrive.
    pub topics: Vec<String>,

    /// How often the client sends its own `HB` frames. Must stay well
    /// under the broker's silence threshold.
    pub heartbeat_interval: Duration,

    /// How often the client checks whether the broker has gone silent.
    pub timeout_check_interval: Duration,

    /// The silence threshold: no inbound bytes for longer than this when
    /// the check fires means the broker is dead and the client closes.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            client_name: random_client_name(),
            topics: Vec::new(),
            heartbeat_interval: Duration::from_millis(2000),
            timeout_check_interval: Duration::from_millis(5000),
            timeout: Duration::from_millis(5000),
        }
    }
}

impl ClientConfig {
    /// A config with the given name and otherwise default settings.
    pub fn named(name: &str) -> Self {
        Self {
            client_name: name.to_string(),
            ..Self::default()
        }
    }
}

/// Generates a throwaway client name for callers that do not care.
fn random_client_name() -> String {
    let n: u32 = rand::rng().random_range(0..10_000);
    format!("WIREBUS_CLIENT_{n}")
}

/// Commands from the [`Client`] to its connection task.
enum ClientCommand {
    Send(Frame),
    /// Subscribe and report back once the broker acks the topic.
    Subscribe {
        topic: String,
        ack: oneshot::Sender<()>,
    },
    /// Unsubscribe and report back once the broker acks the topic.
    Unsubscribe {
        topic: String,
        ack: oneshot::Sender<()>,
    },
}

/// A connected, handshaken client.
///
/// [`connect`](Client::connect) resolves only after the broker's
/// `CLIHELO_ACK` arrives, so a freshly returned client is fully
/// registered, with its handshake topics already active.
pub struct Client {
    name: String,
    commands: mpsc::UnboundedSender<ClientCommand>,
    events: mpsc::UnboundedReceiver<Frame>,
}

impl Client {
    /// Connects to a broker and completes the handshake.
    pub async fn connect(
        addr: &str,
        config: ClientConfig,
    ) -> Result<Self, WirebusError> {
        let conn = TcpConnection::connect(addr).await?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();

        let task = ClientTask {
            conn,
            config: config.clone(),
            assembler: FrameAssembler::new(),
            codec: JsonCodec,
            commands: command_rx,
            events: event_tx,
            ready: Some(ready_tx),
            pending_subs: Vec::new(),
            pending_unsubs: Vec::new(),
        };
        tokio::spawn(task.run());

        // The task drops `ready` without firing it if the connection
        // dies before CLIHELO_ACK.
        ready_rx
            .await
            .map_err(|_| WirebusError::HandshakeFailed)?;

        Ok(Self {
            name: config.client_name,
            commands: command_tx,
            events: event_rx,
        })
    }

    /// The name this client announced in its handshake.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribes to a topic; resolves once the broker acks it, so an
    /// event published afterwards is guaranteed to be delivered.
    pub async fn subscribe(&self, topic: &str) -> Result<(), WirebusError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands
            .send(ClientCommand::Subscribe {
                topic: topic.to_string(),
                ack: ack_tx,
            })
            .map_err(|_| connection_lost())?;
        ack_rx.await.map_err(|_| connection_lost())
    }

    /// Unsubscribes from a topic; resolves once the broker acks it.
    pub async fn unsubscribe(
        &self,
        topic: &str,
    ) -> Result<(), WirebusError> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands
            .send(ClientCommand::Unsubscribe {
                topic: topic.to_string(),
                ack: ack_tx,
            })
            .map_err(|_| connection_lost())?;
        ack_rx.await.map_err(|_| connection_lost())
    }

    /// Publishes an event with no extra payload.
    pub fn publish(&self, event_type: &str, topic: &str) {
        let _ = self.commands.send(ClientCommand::Send(Frame::event(
            event_type, topic,
        )));
    }

    /// Publishes an event carrying extra payload fields.
    pub fn publish_with_payload(
        &self,
        event_type: &str,
        topic: &str,
        payload: Map<String, Value>,
    ) {
        let _ = self.commands.send(ClientCommand::Send(
            Frame::event_with_payload(event_type, topic, payload),
        ));
    }

    /// The next event delivered for a subscribed topic. `None` once the
    /// connection is gone.
    pub async fn next_event(&mut self) -> Option<Frame> {
        self.events.recv().await
    }
}

/// The connection task behind a [`Client`].
struct ClientTask {
    conn: TcpConnection,
    config: ClientConfig,
    assembler: FrameAssembler,
    codec: JsonCodec,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    events: mpsc::UnboundedSender<Frame>,
    ready: Option<oneshot::Sender<()>>,
    pending_subs: Vec<(String, oneshot::Sender<()>)>,
    pending_unsubs: Vec<(String, oneshot::Sender<()>)>,
}

impl ClientTask {
    async fn run(mut self) {
        let hb = self.config.heartbeat_interval;
        let check = self.config.timeout_check_interval;
        let mut heartbeat =
            interval_at(tokio::time::Instant::now() + hb, hb);
        let mut timeout_check =
            interval_at(tokio::time::Instant::now() + check, check);

        let mut last_seen = std::time::Instant::now();

        loop {
            tokio::select! {
                res = self.conn.recv() => match res {
                    Ok(Some(chunk)) => {
                        last_seen = std::time::Instant::now();
                        self.assembler.push(&chunk);
                        loop {
                            match self.assembler.next_record() {
                                Ok(Some(record)) => {
                                    if self.dispatch(record).await.is_err() {
                                        return self.shutdown().await;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    tracing::warn!(error = %e, "broker sent an invalid record");
                                    return self.shutdown().await;
                                }
                            }
                        }
                    }
                    Ok(None) => {
                        tracing::info!("broker closed the connection");
                        return self.shutdown().await;
                    }
                    Err(e) => {
                        tracing::debug!(error = %e, "receive failed");
                        return self.shutdown().await;
                    }
                },

                _ = heartbeat.tick() => {
                    if self.write(&Frame::heartbeat()).await.is_err() {
                        return self.shutdown().await;
                    }
                }

                _ = timeout_check.tick() => {
                    if last_seen.elapsed() > self.config.timeout {
                        tracing::warn!("broker timed out");
                        return self.shutdown().await;
                    }
                }

                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => {
                        if self.execute(cmd).await.is_err() {
                            return self.shutdown().await;
                        }
                    }
                    // The Client was dropped; disconnect.
                    None => return self.shutdown().await,
                },
            }
        }
    }

    /// Handles one frame from the broker.
    async fn dispatch(&mut self, record: Decoded) -> Result<(), ()> {
        let frame = match record {
            Decoded::Frame(frame) => frame,
            Decoded::Unrecognized(frame_type) => {
                tracing::debug!(%frame_type, "ignoring unrecognized frame");
                return Ok(());
            }
            Decoded::Incomplete(frame_type) => {
                tracing::debug!(%frame_type, "ignoring incomplete frame");
                return Ok(());
            }
        };

        match frame {
            // The broker greets first; the handshake is our reply.
            Frame::Helo { broker_name, .. } => {
                tracing::info!(%broker_name, "greeted by broker");
                self.write(&Frame::client_helo(
                    &self.config.client_name,
                    self.config.topics.clone(),
                ))
                .await
            }

            Frame::ClientHeloAck { .. } => {
                if let Some(ready) = self.ready.take() {
                    let _ = ready.send(());
                }
                Ok(())
            }

            Frame::SubscribeAck { ref topic, .. } => {
                complete_pending(&mut self.pending_subs, topic);
                Ok(())
            }

            Frame::UnsubscribeAck { ref topic, .. } => {
                complete_pending(&mut self.pending_unsubs, topic);
                Ok(())
            }

            frame @ Frame::Event { .. } => {
                let _ = self.events.send(frame);
                Ok(())
            }

            // Broker heartbeats need no reply; anything else inbound is
            // not client-facing and is ignored.
            _ => Ok(()),
        }
    }

    /// Executes one caller command.
    async fn execute(&mut self, cmd: ClientCommand) -> Result<(), ()> {
        match cmd {
            ClientCommand::Send(frame) => self.write(&frame).await,
            ClientCommand::Subscribe { topic, ack } => {
                let frame = Frame::subscribe(&topic);
                self.pending_subs.push((topic, ack));
                self.write(&frame).await
            }
            ClientCommand::Unsubscribe { topic, ack } => {
                let frame = Frame::unsubscribe(&topic);
                self.pending_unsubs.push((topic, ack));
                self.write(&frame).await
            }
        }
    }

    /// Encodes and writes one frame. Any failure ends the connection.
    async fn write(&self, frame: &Frame) -> Result<(), ()> {
        let bytes = match self.codec.encode(frame) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode frame");
                return Err(());
            }
        };
        self.conn.send(&bytes).await.map_err(|e| {
            tracing::debug!(error = %e, "send failed");
        })
    }

    async fn shutdown(self) {
        let _ = self.conn.close().await;
        // Dropping `ready` unresolved fails a pending connect();
        // dropping the ack senders fails pending subscribe calls.
    }
}

/// The error reported when the connection task has already stopped.
fn connection_lost() -> WirebusError {
    wirebus_transport::TransportError::ConnectionClosed(
        "connection task stopped".to_string(),
    )
    .into()
}

/// Resolves the oldest pending ack for `topic`, if any. Acks for a
/// topic arrive in the order its requests were written.
fn complete_pending(
    pending: &mut Vec<(String, oneshot::Sender<()>)>,
    topic: &str,
) {
    if let Some(pos) = pending.iter().position(|(t, _)| t == topic) {
        let (_, ack) = pending.remove(pos);
        let _ = ack.send(());
    }
}
