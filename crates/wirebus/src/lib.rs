//! # Wirebus
//!
//! A minimal topic-based publish/subscribe broker (and client) over raw
//! TCP. Peers exchange CRLF-terminated JSON records; the broker tracks
//! each connection's subscriptions and fans published events out to
//! every other subscriber of the event's topic.
//!
//! ## Running a broker
//!
//! ```rust,no_run
//! use wirebus::BrokerServer;
//!
//! # async fn demo() -> Result<(), wirebus::WirebusError> {
//! let server = BrokerServer::builder()
//!     .bind("0.0.0.0:7450")
//!     .broker_name("hub-1")
//!     .build()
//!     .await?;
//! server.run().await
//! # }
//! ```
//!
//! ## Connecting a client
//!
//! ```rust,no_run
//! use wirebus::{Client, ClientConfig};
//!
//! # async fn demo() -> Result<(), wirebus::WirebusError> {
//! let mut client =
//!     Client::connect("127.0.0.1:7450", ClientConfig::named("alice"))
//!         .await?;
//! client.subscribe("positioning").await?;
//! while let Some(event) = client.next_event().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod server;

pub use client::{Client, ClientConfig};
pub use error::WirebusError;
pub use server::{BrokerServer, BrokerServerBuilder};

// Commonly needed pieces from the layer crates.
pub use wirebus_protocol::{
    Frame, Map, PROTOCOL_VERSION, SYSTEM_TOPIC, TIMEOUT_EVENT_TYPE, Value,
};
pub use wirebus_session::SessionConfig;
