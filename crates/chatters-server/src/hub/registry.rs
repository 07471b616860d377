//! Online-user table owned by the router loop.

use std::collections::HashMap;

use chatters_core::{ConnectionId, UserId};

use crate::websocket::connection::ClientConnection;

/// Maps each online user to their single live connection.
///
/// Only the router task touches this, so it needs no locking.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    entries: HashMap<UserId, ClientConnection>,
}

impl ConnectionRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `connection` for its user, returning any connection it replaced.
    pub fn register(&mut self, connection: ClientConnection) -> Option<ClientConnection> {
        self.entries.insert(connection.user_id().clone(), connection)
    }

    /// Remove the entry for `user_id`, but only if it is still `connection_id`.
    ///
    /// A late disconnect from a superseded connection must not evict its
    /// replacement, and removing an absent user is a no-op.
    pub fn unregister(
        &mut self,
        user_id: &UserId,
        connection_id: &ConnectionId,
    ) -> Option<ClientConnection> {
        match self.entries.get(user_id) {
            Some(current) if current.id() == connection_id => self.entries.remove(user_id),
            _ => None,
        }
    }

    /// Live connection for `user_id`, if online.
    pub fn lookup(&self, user_id: &UserId) -> Option<&ClientConnection> {
        self.entries.get(user_id)
    }

    /// Number of online users.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nobody is online.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove every connection.
    pub fn drain(&mut self) -> impl Iterator<Item = ClientConnection> + '_ {
        self.entries.drain().map(|(_, connection)| connection)
    }
}
