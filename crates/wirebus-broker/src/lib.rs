//! Broker core for Wirebus: the session registry and the fan-out router.
//!
//! One router task owns the registry of live sessions and consumes the
//! events every session emits. Routing decisions (who is subscribed to
//! what, who published) happen in that single task, so no locks guard
//! the registry and event ordering is the channel ordering.
//!
//! # Key types
//!
//! - [`Router`] — the routing task; consumes registrations and session
//!   events
//! - [`RouterHandle`] — feed the router from the accept loop
//! - [`Registry`] — the live-session map the router owns

mod registry;
mod router;

pub use registry::Registry;
pub use router::{Router, RouterHandle};
