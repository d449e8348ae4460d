//! Per-connection session layer for Wirebus.
//!
//! This crate handles everything one connection needs once it has been
//! accepted:
//!
//! 1. **Reassembly** — feeding the byte stream through the frame
//!    assembler, one chunk at a time
//! 2. **Frame handling** — handshakes, subscription changes, and the
//!    broker-side sender stamping ([`PeerState`])
//! 3. **Liveness** — periodic heartbeats out, silence detection in
//!
//! # How it fits in the stack
//!
//! ```text
//! Broker Layer (above)   ← routes Published events between sessions
//!     ↕
//! Session Layer (this crate)  ← one task per connection, frames in/out
//!     ↕
//! Transport Layer (below)     ← raw byte chunks over TCP
//! ```

#![allow(async_fn_in_trait)]

mod config;
mod peer;
mod session;

pub use config::SessionConfig;
pub use peer::{Action, PeerState};
pub use session::{Session, SessionCommand, SessionEvent, SessionHandle};
