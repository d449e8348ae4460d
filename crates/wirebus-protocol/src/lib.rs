//! Wire protocol for Wirebus.
//!
//! This crate defines the "language" that brokers and clients speak:
//!
//! - **Types** ([`Frame`] and the protocol constants) — the tagged union of
//!   messages that travel on the wire.
//! - **Codec** ([`JsonCodec`], [`Decoded`]) — how one record is converted
//!   to/from bytes, and the CRLF terminator that delimits records.
//! - **Assembler** ([`FrameAssembler`]) — the per-connection state machine
//!   that turns an arbitrarily-chunked byte stream back into frames, with
//!   a bounded accumulation buffer.
//! - **Errors** ([`ProtocolError`]) — what can go wrong doing any of that.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and session
//! (peer identity and subscriptions). It knows nothing about connections
//! or topics' meanings — only how frames are shaped and delimited.
//!
//! ```text
//! Transport (bytes) → Protocol (Frame) → Session (peer context)
//! ```

mod assembler;
mod codec;
mod error;
mod types;

pub use assembler::{FrameAssembler, MAX_BUFFER};
pub use codec::{Decoded, FRAME_TERMINATOR, JsonCodec};
pub use error::ProtocolError;
pub use types::{
    Frame, PROTOCOL_VERSION, SYSTEM_TOPIC, TIMEOUT_EVENT_TYPE,
};

// Event payloads are open-ended JSON objects; re-exported so callers can
// build them without a direct serde_json dependency.
pub use serde_json::{Map, Value};
