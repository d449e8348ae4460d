//! Broker-side protocol state for one peer: its declared name, its
//! subscription set, and the frame handlers.
//!
//! `PeerState` is deliberately free of I/O — it maps one decoded record to
//! a list of [`Action`]s (frames to write back, frames to hand the router)
//! and mutates only its own name and topic set. The session task owns the
//! sockets and timers and executes the actions; keeping the handlers pure
//! makes every protocol rule unit-testable without a connection.

use std::collections::HashSet;

use wirebus_protocol::{Decoded, Frame, PROTOCOL_VERSION};

/// What the session task should do with the output of one handled frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Write this frame back to the peer.
    Reply(Frame),
    /// Hand this frame to the router for fan-out (sender already stamped).
    Publish(Frame),
}

/// Per-session protocol state.
///
/// The name is empty until the peer handshakes; nothing blocks other
/// message types from being processed before (or without) a handshake —
/// the design tolerates any message type in any order.
#[derive(Debug, Default)]
pub struct PeerState {
    name: String,
    topics: HashSet<String>,
}

impl PeerState {
    /// Creates the initial state: unnamed, no subscriptions.
    pub fn new() -> Self {
        Self::default()
    }

    /// The peer's declared name, empty until a `CLIHELO` carried one.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this session is subscribed to `topic`.
    pub fn is_subscribed(&self, topic: &str) -> bool {
        self.topics.contains(topic)
    }

    /// Number of subscribed topics.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Adds a topic to the subscription set. Idempotent.
    pub fn subscribe(&mut self, topic: &str) {
        self.topics.insert(topic.to_string());
    }

    /// Removes a topic. Removing an absent topic is a no-op.
    pub fn unsubscribe(&mut self, topic: &str) {
        self.topics.remove(topic);
    }

    /// The current topic set, sorted for stable output.
    fn topics_sorted(&self) -> Vec<String> {
        let mut topics: Vec<String> =
            self.topics.iter().cloned().collect();
        topics.sort();
        topics
    }

    /// Applies one decoded record and returns the resulting actions.
    ///
    /// Unrecognized record types, records missing the fields their
    /// handler needs, heartbeats, and frame types this role never
    /// consumes (`HELO`, the acks) produce no actions — they are
    /// accepted and ignored.
    pub fn handle(&mut self, decoded: Decoded) -> Vec<Action> {
        let frame = match decoded {
            Decoded::Frame(frame) => frame,
            Decoded::Unrecognized(frame_type) => {
                tracing::debug!(frame_type, "ignoring unrecognized frame");
                return Vec::new();
            }
            Decoded::Incomplete(frame_type) => {
                tracing::debug!(frame_type, "ignoring incomplete frame");
                return Vec::new();
            }
        };

        match frame {
            Frame::ClientHelo {
                client_name,
                protocol_version,
                topics,
                ..
            } => {
                // Last write wins, no validation: a duplicate handshake
                // simply overwrites the name.
                if !client_name.is_empty() {
                    self.name = client_name;
                }
                for topic in topics.into_iter().flatten() {
                    self.topics.insert(topic);
                }

                tracing::info!(
                    name = %self.name,
                    topics = ?self.topics,
                    "peer handshake"
                );

                let version = protocol_version
                    .unwrap_or_else(|| PROTOCOL_VERSION.to_string());
                vec![Action::Reply(Frame::client_helo_ack(
                    version,
                    self.topics_sorted(),
                ))]
            }

            Frame::Subscribe { topic, .. } => {
                self.subscribe(&topic);
                tracing::debug!(name = %self.name, %topic, "subscribed");
                vec![Action::Reply(Frame::subscribe_ack(&topic))]
            }

            Frame::Unsubscribe { topic, .. } => {
                self.unsubscribe(&topic);
                tracing::debug!(name = %self.name, %topic, "unsubscribed");
                vec![Action::Reply(Frame::unsubscribe_ack(&topic))]
            }

            Frame::Event {
                ts,
                flags,
                event_type,
                topic,
                client_name,
                payload,
                ..
            } => {
                tracing::debug!(
                    name = %self.name,
                    %event_type,
                    %topic,
                    "event published"
                );
                // The broker is authoritative on sender identity: any
                // sender the peer supplied is overwritten.
                vec![Action::Publish(Frame::Event {
                    ts,
                    flags,
                    event_type,
                    topic,
                    sender: Some(self.name.clone()),
                    client_name,
                    payload,
                })]
            }

            // Heartbeats only refresh the activity clock, which the
            // session loop does on every inbound chunk.
            Frame::Heartbeat { .. } => Vec::new(),

            // Broker-to-client frames arriving at the broker: tolerated,
            // no effect.
            Frame::Helo { .. }
            | Frame::ClientHeloAck { .. }
            | Frame::SubscribeAck { .. }
            | Frame::UnsubscribeAck { .. } => Vec::new(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn handle_frame(state: &mut PeerState, frame: Frame) -> Vec<Action> {
        state.handle(Decoded::Frame(frame))
    }

    // =====================================================================
    // Handshake
    // =====================================================================

    #[test]
    fn test_client_helo_records_name_and_topics() {
        let mut state = PeerState::new();

        let actions = handle_frame(
            &mut state,
            Frame::client_helo("c1", vec!["a".into(), "b".into()]),
        );

        assert_eq!(state.name(), "c1");
        assert!(state.is_subscribed("a"));
        assert!(state.is_subscribed("b"));

        // The ack echoes the version and the full current topic set.
        let [Action::Reply(Frame::ClientHeloAck {
            protocol_version,
            topics: Some(topics),
            ..
        })] = actions.as_slice()
        else {
            panic!("expected one CLIHELO_ACK, got {actions:?}");
        };
        assert_eq!(protocol_version, PROTOCOL_VERSION);
        assert_eq!(topics, &vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_duplicate_client_helo_last_name_wins() {
        let mut state = PeerState::new();
        handle_frame(&mut state, Frame::client_helo("first", vec![]));
        handle_frame(&mut state, Frame::client_helo("second", vec![]));

        assert_eq!(state.name(), "second");
    }

    #[test]
    fn test_duplicate_client_helo_unions_topics() {
        let mut state = PeerState::new();
        handle_frame(
            &mut state,
            Frame::client_helo("c1", vec!["a".into()]),
        );
        handle_frame(
            &mut state,
            Frame::client_helo("c1", vec!["a".into(), "b".into()]),
        );

        assert_eq!(state.topic_count(), 2);
    }

    #[test]
    fn test_client_helo_empty_name_keeps_previous() {
        let mut state = PeerState::new();
        handle_frame(&mut state, Frame::client_helo("c1", vec![]));

        // An empty clientName is present-but-falsy in the reference:
        // the recorded name stays.
        let helo = Frame::ClientHelo {
            ts: 0,
            flags: None,
            client_name: String::new(),
            protocol_version: None,
            topics: None,
        };
        handle_frame(&mut state, helo);

        assert_eq!(state.name(), "c1");
    }

    #[test]
    fn test_client_helo_without_version_acks_default() {
        let mut state = PeerState::new();
        let helo = Frame::ClientHelo {
            ts: 0,
            flags: None,
            client_name: "c1".into(),
            protocol_version: None,
            topics: None,
        };

        let actions = handle_frame(&mut state, helo);

        let [Action::Reply(Frame::ClientHeloAck {
            protocol_version,
            ..
        })] = actions.as_slice()
        else {
            panic!("expected CLIHELO_ACK");
        };
        assert_eq!(protocol_version, PROTOCOL_VERSION);
    }

    // =====================================================================
    // Subscribe / unsubscribe
    // =====================================================================

    #[test]
    fn test_subscribe_is_idempotent() {
        let mut state = PeerState::new();

        handle_frame(&mut state, Frame::subscribe("x"));
        handle_frame(&mut state, Frame::subscribe("x"));

        assert_eq!(state.topic_count(), 1);
        assert!(state.is_subscribed("x"));
    }

    #[test]
    fn test_subscribe_replies_with_new_ack_frame() {
        let mut state = PeerState::new();

        let actions = handle_frame(&mut state, Frame::subscribe("x"));

        let [Action::Reply(Frame::SubscribeAck { topic, ts, .. })] =
            actions.as_slice()
        else {
            panic!("expected SUB_ACK, got {actions:?}");
        };
        assert_eq!(topic, "x");
        // The ack carries a fresh producer timestamp, not the request's.
        assert!(*ts > 0);
    }

    #[test]
    fn test_unsubscribe_removes_topic() {
        let mut state = PeerState::new();
        handle_frame(&mut state, Frame::subscribe("x"));

        let actions = handle_frame(&mut state, Frame::unsubscribe("x"));

        assert!(!state.is_subscribed("x"));
        assert!(matches!(
            actions.as_slice(),
            [Action::Reply(Frame::UnsubscribeAck { .. })]
        ));
    }

    #[test]
    fn test_unsubscribe_absent_topic_is_noop_with_ack() {
        // Removing a topic that was never subscribed is not an error —
        // the peer still gets its ack.
        let mut state = PeerState::new();

        let actions =
            handle_frame(&mut state, Frame::unsubscribe("ghost"));

        assert_eq!(state.topic_count(), 0);
        assert!(matches!(
            actions.as_slice(),
            [Action::Reply(Frame::UnsubscribeAck { .. })]
        ));
    }

    // =====================================================================
    // Events
    // =====================================================================

    #[test]
    fn test_event_sender_is_stamped_with_session_name() {
        let mut state = PeerState::new();
        handle_frame(&mut state, Frame::client_helo("alice", vec![]));

        // The peer lies about its sender; the broker overwrites it.
        let mut event = Frame::event("PING", "x");
        if let Frame::Event { sender, .. } = &mut event {
            *sender = Some("mallory".into());
        }

        let actions = handle_frame(&mut state, event);

        let [Action::Publish(Frame::Event { sender, .. })] =
            actions.as_slice()
        else {
            panic!("expected Publish, got {actions:?}");
        };
        assert_eq!(sender.as_deref(), Some("alice"));
    }

    #[test]
    fn test_event_from_unnamed_peer_gets_empty_sender() {
        let mut state = PeerState::new();

        let actions =
            handle_frame(&mut state, Frame::event("PING", "x"));

        let [Action::Publish(Frame::Event { sender, .. })] =
            actions.as_slice()
        else {
            panic!("expected Publish");
        };
        assert_eq!(sender.as_deref(), Some(""));
    }

    #[test]
    fn test_event_preserves_payload_fields() {
        let mut state = PeerState::new();
        let mut payload = serde_json::Map::new();
        payload.insert("x".into(), serde_json::json!(1.5));

        let actions = handle_frame(
            &mut state,
            Frame::event_with_payload("POS_UPDATE", "positioning", payload),
        );

        let [Action::Publish(Frame::Event { payload, .. })] =
            actions.as_slice()
        else {
            panic!("expected Publish");
        };
        assert_eq!(payload["x"], serde_json::json!(1.5));
    }

    // =====================================================================
    // Silent no-ops
    // =====================================================================

    #[test]
    fn test_heartbeat_produces_no_actions() {
        let mut state = PeerState::new();
        assert!(handle_frame(&mut state, Frame::heartbeat()).is_empty());
    }

    #[test]
    fn test_unrecognized_type_is_silently_ignored() {
        let mut state = PeerState::new();
        let actions =
            state.handle(Decoded::Unrecognized("FUTURE_THING".into()));
        assert!(actions.is_empty());
    }

    #[test]
    fn test_incomplete_frame_is_silently_ignored() {
        // A SUB that carried no topic: nothing to subscribe, no ack,
        // and the session stays healthy.
        let mut state = PeerState::new();
        let actions = state.handle(Decoded::Incomplete("SUB".into()));
        assert!(actions.is_empty());
        assert_eq!(state.topic_count(), 0);
    }

    #[test]
    fn test_broker_role_frames_are_ignored() {
        let mut state = PeerState::new();
        assert!(handle_frame(&mut state, Frame::helo("b")).is_empty());
        assert!(
            handle_frame(&mut state, Frame::subscribe_ack("x")).is_empty()
        );
        assert_eq!(state.topic_count(), 0);
    }
}
