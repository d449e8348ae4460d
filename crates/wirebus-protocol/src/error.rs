//! Error types for the protocol layer.
//!
//! Each crate in Wirebus defines its own error enum. This keeps errors
//! specific and meaningful — a `ProtocolError` always means the problem
//! is in framing or serialization, not in networking or routing.

/// Errors that can occur while encoding, decoding, or reassembling frames.
///
/// `Decode`, `MissingType`, and `BufferOverflow` are all protocol
/// violations from the session's point of view: the offending connection
/// is torn down, other connections are unaffected.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a [`Frame`](crate::Frame) into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// A terminator-delimited record was not well-formed JSON, or a
    /// recognized frame type was missing one of its required fields.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// A record parsed as JSON but carried no string `type` field, so it
    /// cannot be dispatched at all.
    #[error("frame has no type field")]
    MissingType,

    /// The accumulation buffer grew past its bound without producing a
    /// complete frame — oversized or undelimited input.
    #[error("receive buffer exceeded {limit} bytes (got {size})")]
    BufferOverflow {
        /// The buffer size after the offending chunk was appended.
        size: usize,
        /// The configured bound.
        limit: usize,
    },
}
