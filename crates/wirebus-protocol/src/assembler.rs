//! Byte-stream reassembly: turning arbitrarily-chunked TCP reads into
//! discrete frames.
//!
//! TCP gives no message boundaries — a single frame may arrive split
//! across many reads, and one read may contain many frames. The assembler
//! owns the accumulation buffer for one connection: each inbound chunk is
//! appended, then every complete terminator-delimited record is sliced
//! out and decoded in wire order, one at a time, so the caller can act on
//! each record before the next is examined.

use crate::codec::{Decoded, FRAME_TERMINATOR, JsonCodec};
use crate::ProtocolError;

/// The default accumulation-buffer bound in bytes.
///
/// A buffer that grows past this without yielding a frame means the peer
/// is sending oversized or undelimited input; the session treats it as a
/// protocol violation and closes.
pub const MAX_BUFFER: usize = 16 * 1024;

/// Per-connection reassembly state.
///
/// One assembler per session, fed from that session's read loop only, so
/// it needs no synchronization. Dropped together with the session, which
/// releases the buffer.
#[derive(Debug)]
pub struct FrameAssembler {
    codec: JsonCodec,
    buffer: Vec<u8>,
    limit: usize,
}

impl FrameAssembler {
    /// Creates an assembler with the default buffer bound.
    pub fn new() -> Self {
        Self::with_limit(MAX_BUFFER)
    }

    /// Creates an assembler with a custom buffer bound.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            codec: JsonCodec,
            buffer: Vec::new(),
            limit,
        }
    }

    /// Appends one inbound chunk. Complete records are drained one at a
    /// time via [`next_record`](Self::next_record), so the caller can
    /// dispatch each record before the next is decoded.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Drains and decodes the next complete record, in wire order.
    ///
    /// The slice handed to the decoder runs from the buffer start through
    /// the first `}` of the terminator; the terminator's CRLF tail stays
    /// in the buffer and is swallowed as leading whitespace by the next
    /// record's decode. Returns `Ok(None)` once no complete record
    /// remains; the buffer bound is checked at that point, after
    /// draining, so a chunk holding several records plus a partial tail
    /// is only measured by its residue.
    ///
    /// # Errors
    /// - [`ProtocolError::Decode`] / [`ProtocolError::MissingType`] — the
    ///   drained record was malformed. Records drained before it have
    ///   already been returned; the caller closes the session, which
    ///   discards whatever bytes remain.
    /// - [`ProtocolError::BufferOverflow`] — the residual buffer exceeds
    ///   the bound.
    pub fn next_record(
        &mut self,
    ) -> Result<Option<Decoded>, ProtocolError> {
        if let Some(end) = find_terminator(&self.buffer) {
            // `end` indexes the '}' — include it, keep the CRLF.
            let record: Vec<u8> = self.buffer.drain(..=end).collect();
            return self.codec.decode(&record).map(Some);
        }

        if self.buffer.len() > self.limit {
            return Err(ProtocolError::BufferOverflow {
                size: self.buffer.len(),
                limit: self.limit,
            });
        }

        Ok(None)
    }

    /// Bytes currently buffered without a complete frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Finds the first frame terminator, returning the index of its `}`.
fn find_terminator(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(FRAME_TERMINATOR.len())
        .position(|w| w == FRAME_TERMINATOR)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Frame;

    /// Encodes frames and concatenates their wire bytes.
    fn wire_bytes(frames: &[Frame]) -> Vec<u8> {
        let codec = JsonCodec;
        frames
            .iter()
            .flat_map(|f| codec.encode(f).unwrap())
            .collect()
    }

    fn sample_frames() -> Vec<Frame> {
        vec![
            Frame::helo("b"),
            Frame::client_helo("c1", vec!["a".into(), "b".into()]),
            Frame::subscribe("weather"),
            Frame::event("TEMP", "weather"),
            Frame::heartbeat(),
        ]
    }

    /// Drains every currently-complete record from the assembler.
    fn drain_records(
        assembler: &mut FrameAssembler,
    ) -> Result<Vec<Decoded>, ProtocolError> {
        let mut out = Vec::new();
        while let Some(record) = assembler.next_record()? {
            out.push(record);
        }
        Ok(out)
    }

    /// Pushes one chunk and drains everything it completed.
    fn push_and_drain(
        assembler: &mut FrameAssembler,
        chunk: &[u8],
    ) -> Result<Vec<Decoded>, ProtocolError> {
        assembler.push(chunk);
        drain_records(assembler)
    }

    /// Feeds `bytes` to a fresh assembler in chunks of `chunk_size` and
    /// returns every decoded frame.
    fn reassemble_chunked(bytes: &[u8], chunk_size: usize) -> Vec<Decoded> {
        let mut assembler = FrameAssembler::new();
        let mut out = Vec::new();
        for chunk in bytes.chunks(chunk_size) {
            out.extend(push_and_drain(&mut assembler, chunk).unwrap());
        }
        out
    }

    #[test]
    fn test_single_frame_single_chunk() {
        let mut assembler = FrameAssembler::new();
        let bytes = wire_bytes(&[Frame::heartbeat()]);

        let frames = push_and_drain(&mut assembler, &bytes).unwrap();

        assert_eq!(frames.len(), 1);
        assert!(matches!(
            frames[0],
            Decoded::Frame(Frame::Heartbeat { .. })
        ));
    }

    #[test]
    fn test_many_frames_one_chunk() {
        let frames = sample_frames();
        let bytes = wire_bytes(&frames);

        let mut assembler = FrameAssembler::new();
        let decoded = push_and_drain(&mut assembler, &bytes).unwrap();

        let expected: Vec<Decoded> =
            frames.into_iter().map(Decoded::Frame).collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_framing_idempotent_under_arbitrary_chunking() {
        // Any chunking of the same byte stream must yield the same frames
        // in the same order — down to one byte at a time.
        let frames = sample_frames();
        let bytes = wire_bytes(&frames);
        let expected: Vec<Decoded> =
            frames.into_iter().map(Decoded::Frame).collect();

        for chunk_size in [1, 2, 3, 7, 16, 64, bytes.len()] {
            let decoded = reassemble_chunked(&bytes, chunk_size);
            assert_eq!(
                decoded, expected,
                "chunk size {chunk_size} changed the result"
            );
        }
    }

    #[test]
    fn test_partial_frame_stays_buffered() {
        let bytes = wire_bytes(&[Frame::subscribe("weather")]);
        let (head, tail) = bytes.split_at(bytes.len() / 2);

        let mut assembler = FrameAssembler::new();
        assert!(push_and_drain(&mut assembler, head).unwrap().is_empty());
        assert_eq!(assembler.buffered(), head.len());

        let frames = push_and_drain(&mut assembler, tail).unwrap();
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_buffer_under_bound_survives() {
        // limit - 1 bytes of terminator-free input must not error.
        let mut assembler = FrameAssembler::with_limit(256);
        let junk = vec![b'x'; 255];
        assert!(push_and_drain(&mut assembler, &junk).unwrap().is_empty());
    }

    #[test]
    fn test_buffer_one_past_bound_errors() {
        let mut assembler = FrameAssembler::with_limit(256);
        push_and_drain(&mut assembler, &vec![b'x'; 255]).unwrap();

        // Two more bytes: 257 total, one past the bound.
        let result = push_and_drain(&mut assembler, b"xx");
        assert!(matches!(
            result,
            Err(ProtocolError::BufferOverflow { size: 257, limit: 256 })
        ));
    }

    #[test]
    fn test_bound_checked_after_draining_frames() {
        // A chunk that completes frames and leaves a small residue is
        // fine even if the raw chunk was larger than the residue bound
        // would allow to linger.
        let mut assembler = FrameAssembler::with_limit(32);
        let mut bytes = wire_bytes(&[Frame::heartbeat(), Frame::heartbeat()]);
        bytes.extend_from_slice(b"{\"type\":\"HB\"");
        assert!(bytes.len() > 32, "chunk itself exceeds the bound");

        let frames = push_and_drain(&mut assembler, &bytes).unwrap();
        assert_eq!(frames.len(), 2);
        assert!(assembler.buffered() <= 32);
    }

    #[test]
    fn test_malformed_record_errors() {
        let mut assembler = FrameAssembler::new();
        let result =
            push_and_drain(&mut assembler, b"this is not a frame}\r\n");
        assert!(matches!(result, Err(ProtocolError::Decode(_))));
    }

    #[test]
    fn test_records_before_a_malformed_one_are_still_yielded() {
        // One chunk: a valid frame, then garbage. The valid frame must
        // come out before the error surfaces.
        let mut assembler = FrameAssembler::new();
        let mut bytes = wire_bytes(&[Frame::event("TEMP", "weather")]);
        bytes.extend_from_slice(b"{garbage}\r\n");
        assembler.push(&bytes);

        let first = assembler.next_record().unwrap();
        assert!(matches!(
            first,
            Some(Decoded::Frame(Frame::Event { .. }))
        ));
        assert!(matches!(
            assembler.next_record(),
            Err(ProtocolError::Decode(_))
        ));
    }

    #[test]
    fn test_unknown_type_passes_through() {
        let mut assembler = FrameAssembler::new();
        let frames = push_and_drain(
            &mut assembler,
            b"{\"type\":\"MYSTERY\",\"ts\":1}\r\n",
        )
        .unwrap();
        assert_eq!(
            frames,
            vec![Decoded::Unrecognized("MYSTERY".to_string())]
        );
    }

    #[test]
    fn test_frame_split_across_terminator_bytes() {
        // The cruelest split: right between '}' and CR LF.
        let bytes = wire_bytes(&[Frame::heartbeat()]);
        let brace = bytes.len() - 2;

        let mut assembler = FrameAssembler::new();
        assert!(
            push_and_drain(&mut assembler, &bytes[..brace])
                .unwrap()
                .is_empty()
        );
        let frames =
            push_and_drain(&mut assembler, &bytes[brace..]).unwrap();
        assert_eq!(frames.len(), 1);
    }
}
