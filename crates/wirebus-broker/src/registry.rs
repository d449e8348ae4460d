//! Session registry: who is connected right now.
//!
//! A plain map owned by the router task. Nothing else touches it, so
//! there is no locking and no interior mutability; all ordering
//! guarantees come from the router processing its channels in order.

use std::collections::HashMap;

use wirebus_session::SessionHandle;
use wirebus_transport::ConnectionId;

/// All live sessions, keyed by connection ID.
#[derive(Default)]
pub struct Registry {
    sessions: HashMap<ConnectionId, SessionHandle>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a session. Connection IDs are process-unique, so an insert
    /// never displaces a live session.
    pub fn insert(&mut self, handle: SessionHandle) {
        self.sessions.insert(handle.id(), handle);
    }

    /// Removes a session, returning its handle if it was present.
    pub fn remove(&mut self, id: ConnectionId) -> Option<SessionHandle> {
        self.sessions.remove(&id)
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no sessions are registered.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Iterates over all live sessions, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &SessionHandle> {
        self.sessions.values()
    }
}
