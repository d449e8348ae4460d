//! Unified error type for the Wirebus meta-crate.

use wirebus_protocol::ProtocolError;
use wirebus_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `wirebus` meta-crate, you deal with this single error
/// type instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant auto-generates `From` impls, so the `?`
/// operator converts sub-crate errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum WirebusError {
    /// A transport-level error (bind, accept, connect, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode, buffer bound).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The broker closed the connection before completing the handshake.
    #[error("handshake did not complete")]
    HandshakeFailed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = TransportError::ConnectionClosed("gone".into());
        let wirebus_err: WirebusError = err.into();
        assert!(matches!(wirebus_err, WirebusError::Transport(_)));
        assert!(wirebus_err.to_string().contains("gone"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::MissingType;
        let wirebus_err: WirebusError = err.into();
        assert!(matches!(wirebus_err, WirebusError::Protocol(_)));
    }
}
