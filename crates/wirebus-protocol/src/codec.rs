//! Encoding and decoding of single wire records.
//!
//! One frame on the wire is one compact JSON object followed by CRLF. The
//! terminator the reassembler scans for is the three bytes `}` CR LF
//! ([`FRAME_TERMINATOR`]): JSON string escaping turns any CR or LF inside a
//! payload into `\r`/`\n`, so the raw byte sequence can never occur inside
//! an encoded record and framing stays unambiguous.

use serde_json::Value;

use crate::{Frame, ProtocolError};

/// The byte sequence that ends every encoded frame.
pub const FRAME_TERMINATOR: &[u8] = b"}\r\n";

/// The `type` tags the codec recognizes. Anything else decodes to
/// [`Decoded::Unrecognized`] for forward compatibility.
const KNOWN_TYPES: [&str; 9] = [
    "HELO",
    "CLIHELO",
    "CLIHELO_ACK",
    "SUB",
    "SUB_ACK",
    "UNSUB",
    "UNSUB_ACK",
    "EVENT",
    "HB",
];

/// The outcome of decoding one well-formed record.
///
/// A record with an unknown `type`, or a known `type` whose fields do not
/// validate (a `SUB` without a topic, a `CLIHELO` without a name), is not
/// an error: the protocol tolerates any message type in any order, and
/// records a handler cannot act on are silently ignored. Only records
/// that are not JSON at all, or carry no string `type`, are protocol
/// violations.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A recognized frame.
    Frame(Frame),
    /// A well-formed record with an unrecognized `type` tag.
    Unrecognized(String),
    /// A recognized `type` missing or mistyping the fields it needs.
    Incomplete(String),
}

/// The JSON codec for Wirebus frames.
///
/// `encode` produces a self-delimited byte sequence (record + CRLF);
/// `decode` takes the bytes of exactly one record, up to and including its
/// closing `}`. Leading whitespace — the CRLF tail a previous record left
/// in the buffer — is tolerated by the JSON parser.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Serializes a frame into its terminated wire form.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if serialization fails.
    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>, ProtocolError> {
        let mut bytes =
            serde_json::to_vec(frame).map_err(ProtocolError::Encode)?;
        bytes.extend_from_slice(b"\r\n");
        Ok(bytes)
    }

    /// Parses the bytes of one record.
    ///
    /// # Errors
    /// - [`ProtocolError::Decode`] — not well-formed JSON.
    /// - [`ProtocolError::MissingType`] — valid JSON with no string `type`.
    pub fn decode(&self, data: &[u8]) -> Result<Decoded, ProtocolError> {
        let value: Value =
            serde_json::from_slice(data).map_err(ProtocolError::Decode)?;

        let frame_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(ProtocolError::MissingType)?
            .to_owned();

        if !KNOWN_TYPES.contains(&frame_type.as_str()) {
            return Ok(Decoded::Unrecognized(frame_type));
        }

        // A known type that fails field validation is ignorable, not
        // fatal: handlers simply have nothing to act on.
        Ok(match serde_json::from_value(value) {
            Ok(frame) => Decoded::Frame(frame),
            Err(_) => Decoded::Incomplete(frame_type),
        })
    }
}

// =========================================================================
// Tests
// =========================================================================
