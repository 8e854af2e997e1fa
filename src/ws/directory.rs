//! Session identifier to session mapping for one channel.

use crate::ws::session::Session;
use crate::ws::types::{ConnectionId, SessionId};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Maps session identifiers to live sessions.
///
/// Locked independently of the [`ConnectionRegistry`](crate::ws::registry::ConnectionRegistry):
/// session churn never serializes against connection churn or broadcasts.
/// Cloning yields another handle to the same directory.
#[derive(Clone, Default)]
pub struct SessionDirectory {
    sessions: Arc<DashMap<SessionId, Arc<Session>>>,
}

impl SessionDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or overwrites the entry for `id`, returning the replaced session.
    pub fn add(&self, id: SessionId, session: Arc<Session>) -> Option<Arc<Session>> {
        let previous = self.sessions.insert(id, session);
        debug!(total = self.sessions.len(), "Session added to directory.");
        previous
    }

    /// Deletes the entry for `id` if present.
    pub fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Deletes the entry for `session.id()` only while it still refers to
    /// `session`. A later session that reused the identifier keeps its entry.
    pub fn remove_session(&self, session: &Session) -> bool {
        let removed = self
            .sessions
            .remove_if(session.id(), |_, current| {
                current.connection_id() == session.connection_id()
            })
            .is_some();
        debug!(
            session_id = %session.id(),
            removed,
            remaining = self.sessions.len(),
            "Session left directory."
        );
        removed
    }

    /// Deletes whichever entry is backed by `conn_id`, if any.
    pub fn remove_connection(&self, conn_id: &ConnectionId) -> Option<SessionId> {
        let id = self
            .sessions
            .iter()
            .find(|entry| entry.value().connection_id() == *conn_id)
            .map(|entry| entry.key().clone())?;
        self.sessions
            .remove_if(&id, |_, current| current.connection_id() == *conn_id)
            .map(|(id, _)| id)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// A point-in-time copy of the mapping, for diagnostics.
    pub fn list(&self) -> HashMap<SessionId, Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl fmt::Debug for SessionDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDirectory")
            .field("sessions_count", &self.sessions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ws::testing::RecordingTransport;
    use crate::ws::types::{Channel, Connection};

    fn session(directory: &SessionDirectory, id: &str) -> Arc<Session> {
        let connection = Arc::new(Connection::new(RecordingTransport::default()));
        Arc::new(Session::new(
            id.to_string(),
            Channel::Stock,
            connection,
            directory.clone(),
            false,
            None,
        ))
    }

    #[test]
    fn add_list_and_remove() {
        let directory = SessionDirectory::new();
        directory.add("a".into(), session(&directory, "a"));
        directory.add("b".into(), session(&directory, "b"));

        let snapshot = directory.list();
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.contains_key("a"));

        assert!(directory.remove("a").is_some());
        assert!(directory.remove("a").is_none());
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn add_overwrites_existing_identifier() {
        let directory = SessionDirectory::new();
        let first = session(&directory, "dup");
        let second = session(&directory, "dup");

        assert!(directory.add("dup".into(), Arc::clone(&first)).is_none());
        let replaced = directory.add("dup".into(), Arc::clone(&second)).unwrap();

        assert_eq!(replaced.connection_id(), first.connection_id());
        assert_eq!(
            directory.get("dup").unwrap().connection_id(),
            second.connection_id()
        );
        assert_eq!(directory.len(), 1);
    }

    #[test]
    fn stale_session_does_not_evict_its_replacement() {
        let directory = SessionDirectory::new();
        let first = session(&directory, "dup");
        let second = session(&directory, "dup");
        directory.add("dup".into(), Arc::clone(&first));
        directory.add("dup".into(), Arc::clone(&second));

        assert!(!directory.remove_session(&first));
        assert_eq!(directory.len(), 1);
        assert!(directory.remove_session(&second));
        assert!(directory.is_empty());
    }

    #[test]
    fn remove_connection_drops_only_the_matching_entry() {
        let directory = SessionDirectory::new();
        let kept = session(&directory, "kept");
        let dropped = session(&directory, "dropped");
        directory.add("kept".into(), Arc::clone(&kept));
        directory.add("dropped".into(), Arc::clone(&dropped));

        assert_eq!(
            directory.remove_connection(&dropped.connection_id()),
            Some("dropped".to_string())
        );
        assert!(directory.remove_connection(&dropped.connection_id()).is_none());
        assert_eq!(directory.len(), 1);
        assert!(directory.get("kept").is_some());
    }
}
