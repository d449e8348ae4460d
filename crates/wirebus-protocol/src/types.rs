//! Core protocol types for the Wirebus wire format.
//!
//! This module defines every frame shape that travels on the wire. A frame
//! is one JSON object with a `type` tag; field names are camelCase to match
//! the wire schema. Frames are immutable once constructed — an ack is a new
//! frame built from the inbound one's fields, never an in-place mutation.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The protocol version announced in `HELO` and `CLIHELO` frames.
pub const PROTOCOL_VERSION: &str = "1.0";

/// The reserved topic for broker-originated control notices.
///
/// Currently the only notice is the client-timeout event
/// ([`TIMEOUT_EVENT_TYPE`]). Clients subscribe to it like any other topic.
pub const SYSTEM_TOPIC: &str = "system";

/// The `eventType` of the notice broadcast when a named client times out.
pub const TIMEOUT_EVENT_TYPE: &str = "APP_TIMEOUT";

/// Milliseconds since the Unix epoch, the `ts` stamped on every frame.
pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One complete protocol message.
///
/// The `type` field on the wire selects the variant; each variant carries
/// only its relevant fields. Every frame has a producer-side creation
/// timestamp `ts` (epoch millis, defaulting to 0 when a peer omits it) and
/// optional `flags`.
///
/// `EVENT` frames may carry arbitrary additional payload fields; those are
/// captured verbatim in [`Frame::Event::payload`] via `#[serde(flatten)]`
/// so the broker can fan an event out without understanding its contents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Broker → client greeting, sent immediately after a connection is
    /// registered.
    #[serde(rename = "HELO", rename_all = "camelCase")]
    Helo {
        #[serde(default)]
        ts: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flags: Option<u32>,
        protocol_version: String,
        broker_name: String,
    },

    /// Client → broker handshake: declares the peer's name and its initial
    /// topics of interest.
    #[serde(rename = "CLIHELO", rename_all = "camelCase")]
    ClientHelo {
        #[serde(default)]
        ts: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flags: Option<u32>,
        client_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        protocol_version: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topics: Option<Vec<String>>,
    },

    /// Broker → client handshake reply, echoing the protocol version the
    /// session was handshaked with and its current full topic set.
    #[serde(rename = "CLIHELO_ACK", rename_all = "camelCase")]
    ClientHeloAck {
        #[serde(default)]
        ts: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flags: Option<u32>,
        protocol_version: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        topics: Option<Vec<String>>,
    },

    /// Client → broker: add a topic to the session's subscription set.
    #[serde(rename = "SUB", rename_all = "camelCase")]
    Subscribe {
        #[serde(default)]
        ts: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flags: Option<u32>,
        topic: String,
    },

    /// Broker → client acknowledgment of a `SUB`.
    #[serde(rename = "SUB_ACK", rename_all = "camelCase")]
    SubscribeAck {
        #[serde(default)]
        ts: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flags: Option<u32>,
        topic: String,
    },

    /// Client → broker: remove a topic from the subscription set.
    #[serde(rename = "UNSUB", rename_all = "camelCase")]
    Unsubscribe {
        #[serde(default)]
        ts: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flags: Option<u32>,
        topic: String,
    },

    /// Broker → client acknowledgment of an `UNSUB`.
    #[serde(rename = "UNSUB_ACK", rename_all = "camelCase")]
    UnsubscribeAck {
        #[serde(default)]
        ts: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flags: Option<u32>,
        topic: String,
    },

    /// A published application event, fanned out to every other session
    /// subscribed to `topic`. The broker overwrites `sender` with the
    /// publishing session's declared name before fan-out.
    #[serde(rename = "EVENT", rename_all = "camelCase")]
    Event {
        #[serde(default)]
        ts: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flags: Option<u32>,
        event_type: String,
        topic: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_name: Option<String>,
        /// Any additional fields the publisher attached, passed through
        /// verbatim.
        #[serde(flatten)]
        payload: Map<String, Value>,
    },

    /// Periodic no-op keep-alive, sent unconditionally by both roles.
    #[serde(rename = "HB", rename_all = "camelCase")]
    Heartbeat {
        #[serde(default)]
        ts: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        flags: Option<u32>,
    },
}

impl Frame {
    /// Builds a heartbeat frame stamped with the current time.
    pub fn heartbeat() -> Self {
        Self::Heartbeat {
            ts: now_ms(),
            flags: None,
        }
    }

    /// Builds the broker-side greeting carrying the broker's identity.
    pub fn helo(broker_name: &str) -> Self {
        Self::Helo {
            ts: now_ms(),
            flags: None,
            protocol_version: PROTOCOL_VERSION.to_string(),
            broker_name: broker_name.to_string(),
        }
    }

    /// Builds the client-side handshake with an initial topic list.
    pub fn client_helo(client_name: &str, topics: Vec<String>) -> Self {
        Self::ClientHelo {
            ts: now_ms(),
            flags: None,
            client_name: client_name.to_string(),
            protocol_version: Some(PROTOCOL_VERSION.to_string()),
            topics: Some(topics),
        }
    }

    /// Builds the handshake reply echoing `protocol_version` and the
    /// session's current topic set.
    pub fn client_helo_ack(
        protocol_version: String,
        topics: Vec<String>,
    ) -> Self {
        Self::ClientHeloAck {
            ts: now_ms(),
            flags: None,
            protocol_version,
            topics: Some(topics),
        }
    }

    /// Builds a subscription request for `topic`.
    pub fn subscribe(topic: &str) -> Self {
        Self::Subscribe {
            ts: now_ms(),
            flags: None,
            topic: topic.to_string(),
        }
    }

    /// Builds the acknowledgment for a subscription to `topic`.
    pub fn subscribe_ack(topic: &str) -> Self {
        Self::SubscribeAck {
            ts: now_ms(),
            flags: None,
            topic: topic.to_string(),
        }
    }

    /// Builds an unsubscription request for `topic`.
    pub fn unsubscribe(topic: &str) -> Self {
        Self::Unsubscribe {
            ts: now_ms(),
            flags: None,
            topic: topic.to_string(),
        }
    }

    /// Builds the acknowledgment for an unsubscription from `topic`.
    pub fn unsubscribe_ack(topic: &str) -> Self {
        Self::UnsubscribeAck {
            ts: now_ms(),
            flags: None,
            topic: topic.to_string(),
        }
    }

    /// Builds an event frame with no extra payload fields.
    pub fn event(event_type: &str, topic: &str) -> Self {
        Self::event_with_payload(event_type, topic, Map::new())
    }

    /// Builds an event frame carrying arbitrary extra payload fields.
    pub fn event_with_payload(
        event_type: &str,
        topic: &str,
        payload: Map<String, Value>,
    ) -> Self {
        Self::Event {
            ts: now_ms(),
            flags: None,
            event_type: event_type.to_string(),
            topic: topic.to_string(),
            sender: None,
            client_name: None,
            payload,
        }
    }

    /// Builds the control notice broadcast on the `system` topic when a
    /// named client times out.
    pub fn timeout_notice(broker_name: &str, client_name: &str) -> Self {
        Self::Event {
            ts: now_ms(),
            flags: None,
            event_type: TIMEOUT_EVENT_TYPE.to_string(),
            topic: SYSTEM_TOPIC.to_string(),
            sender: Some(broker_name.to_string()),
            client_name: Some(client_name.to_string()),
            payload: Map::new(),
        }
    }

    /// The wire `type` tag for this frame, mainly for logging.
    pub fn frame_type(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::ClientHelo { .. } => "CLIHELO",
            Self::ClientHeloAck { .. } => "CLIHELO_ACK",
            Self::Subscribe { .. } => "SUB",
            Self::SubscribeAck { .. } => "SUB_ACK",
            Self::Unsubscribe { .. } => "UNSUB",
            Self::UnsubscribeAck { .. } => "UNSUB_ACK",
            Self::Event { .. } => "EVENT",
            Self::Heartbeat { .. } => "HB",
        }
    }

    /// The topic this frame addresses, for the frame types that carry one.
    pub fn topic(&self) -> Option<&str> {
        match self {
            Self::Subscribe { topic, .. }
            | Self::SubscribeAck { topic, .. }
            | Self::Unsubscribe { topic, .. }
            | Self::UnsubscribeAck { topic, .. }
            | Self::Event { topic, .. } => Some(topic),
            _ => None,
        }
    }

    /// The producer-side creation timestamp (epoch millis).
    pub fn ts(&self) -> u64 {
        match self {
            Self::Helo { ts, .. }
            | Self::ClientHelo { ts, .. }
            | Self::ClientHeloAck { ts, .. }
            | Self::Subscribe { ts, .. }
            | Self::SubscribeAck { ts, .. }
            | Self::Unsubscribe { ts, .. }
            | Self::UnsubscribeAck { ts, .. }
            | Self::Event { ts, .. }
            | Self::Heartbeat { ts, .. } => *ts,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
