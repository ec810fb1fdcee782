//! In-memory table of live sessions and the single active flag.
//!
//! Pure and synchronous: no I/O, no notifications. The session manager is the
//! only owner and the only caller of the mutating methods.

use wraith_ipc::SessionId;

use crate::error::{Result, SessionError};
use crate::session::{LifecycleState, Session};

/// Default bound on concurrently live sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 9;

/// The display-side session table.
#[derive(Debug, Clone)]
pub struct Registry {
    /// Insertion order.
    sessions: Vec<Session>,
    active: Option<SessionId>,
    capacity: usize,
}

impl Registry {
    /// Create an empty registry holding at most `capacity` sessions.
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Vec::with_capacity(capacity),
            active: None,
            capacity,
        }
    }

    /// Insert a session. It starts inactive and `Live`.
    pub fn add(&mut self, mut session: Session) -> Result<()> {
        if self.is_full() {
            return Err(SessionError::CapacityExceeded { max: self.capacity });
        }
        if self.contains(session.id) {
            return Err(SessionError::DuplicateId(session.id));
        }
        session.is_active = false;
        session.lifecycle = LifecycleState::Live;
        self.sessions.push(session);
        Ok(())
    }

    /// Remove a session and return its record in the `Closed` state.
    ///
    /// If it was active, the most recently created remaining session becomes
    /// active; if none remain, nothing is active.
    pub fn remove(&mut self, id: SessionId) -> Result<Session> {
        let index = self
            .position(id)
            .ok_or(SessionError::NotFound(id))?;
        let mut session = self.sessions.remove(index);
        session.is_active = false;
        session.lifecycle = LifecycleState::Closed;

        if self.active == Some(id) {
            self.active = None;
            // `max_by_key` keeps the last of equal keys, i.e. the later insertion.
            if let Some(next) = self.sessions.iter_mut().max_by_key(|s| s.created_at) {
                next.is_active = true;
                self.active = Some(next.id);
            }
        }
        Ok(session)
    }

    /// Make `id` the only active session.
    pub fn set_active(&mut self, id: SessionId) -> Result<()> {
        if !self.contains(id) {
            return Err(SessionError::NotFound(id));
        }
        for session in &mut self.sessions {
            session.is_active = session.id == id;
        }
        self.active = Some(id);
        Ok(())
    }

    /// Sessions ordered by `created_at`, ties kept in insertion order.
    pub fn list_ordered_by_creation(&self) -> Vec<&Session> {
        let mut ordered: Vec<&Session> = self.sessions.iter().collect();
        ordered.sort_by_key(|s| s.created_at);
        ordered
    }

    /// Ids in creation order.
    pub fn ordered_ids(&self) -> Vec<SessionId> {
        self.list_ordered_by_creation()
            .into_iter()
            .map(|s| s.id)
            .collect()
    }

    pub fn get(&self, id: SessionId) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Mutable access for metadata updates. Activation must go through
    /// [`Registry::set_active`].
    pub(crate) fn get_mut(&mut self, id: SessionId) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == id)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.position(id).is_some()
    }

    pub fn active(&self) -> Option<SessionId> {
        self.active
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.sessions.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn position(&self, id: SessionId) -> Option<usize> {
        self.sessions.iter().position(|s| s.id == id)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SESSIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::Dimensions;
    use std::path::PathBuf;

    fn session(id: SessionId, created_at: u64) -> Session {
        Session::new(id, id, PathBuf::from("/tmp"), created_at, Dimensions::default())
    }

    fn active_count(registry: &Registry) -> usize {
        registry
            .list_ordered_by_creation()
            .iter()
            .filter(|s| s.is_active)
            .count()
    }

    #[test]
    fn test_add_marks_live_and_inactive() {
        let mut registry = Registry::default();
        let mut s = session(1, 1);
        s.is_active = true;
        registry.add(s).unwrap();

        let stored = registry.get(1).unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.lifecycle, LifecycleState::Live);
        assert_eq!(registry.active(), None);
    }

    #[test]
    fn test_add_rejects_at_capacity() {
        let mut registry = Registry::new(2);
        registry.add(session(1, 1)).unwrap();
        registry.add(session(2, 2)).unwrap();

        let err = registry.add(session(3, 3)).unwrap_err();
        assert_eq!(err, SessionError::CapacityExceeded { max: 2 });
        assert_eq!(registry.len(), 2);
        assert!(!registry.contains(3));
    }

    #[test]
    fn test_add_rejects_duplicate_id() {
        let mut registry = Registry::default();
        registry.add(session(1, 1)).unwrap();
        assert_eq!(
            registry.add(session(1, 2)).unwrap_err(),
            SessionError::DuplicateId(1)
        );
    }

    #[test]
    fn test_remove_unknown_is_not_found() {
        let mut registry = Registry::default();
        assert_eq!(registry.remove(5).unwrap_err(), SessionError::NotFound(5));
    }

    #[test]
    fn test_set_active_unknown_is_not_found() {
        let mut registry = Registry::default();
        registry.add(session(1, 1)).unwrap();
        registry.set_active(1).unwrap();

        assert_eq!(registry.set_active(9).unwrap_err(), SessionError::NotFound(9));
        assert_eq!(registry.active(), Some(1));
    }

    #[test]
    fn test_set_active_moves_the_flag() {
        let mut registry = Registry::default();
        registry.add(session(1, 1)).unwrap();
        registry.add(session(2, 2)).unwrap();

        registry.set_active(1).unwrap();
        registry.set_active(2).unwrap();

        assert_eq!(registry.active(), Some(2));
        assert!(!registry.get(1).unwrap().is_active);
        assert!(registry.get(2).unwrap().is_active);
        assert_eq!(active_count(&registry), 1);
    }

    #[test]
    fn test_closing_active_activates_most_recent_remaining() {
        // Create A, B, C; activate B; close B => C, not A.
        let mut registry = Registry::default();
        registry.add(session(10, 1)).unwrap();
        registry.add(session(20, 2)).unwrap();
        registry.add(session(30, 3)).unwrap();
        registry.set_active(20).unwrap();

        let removed = registry.remove(20).unwrap();

        assert_eq!(removed.lifecycle, LifecycleState::Closed);
        assert!(!removed.is_active);
        assert_eq!(registry.active(), Some(30));
        assert!(registry.get(30).unwrap().is_active);
        assert_eq!(active_count(&registry), 1);
    }

    #[test]
    fn test_closing_inactive_keeps_active() {
        let mut registry = Registry::default();
        registry.add(session(1, 1)).unwrap();
        registry.add(session(2, 2)).unwrap();
        registry.set_active(1).unwrap();

        registry.remove(2).unwrap();
        assert_eq!(registry.active(), Some(1));
    }

    #[test]
    fn test_closing_last_session_clears_active() {
        let mut registry = Registry::default();
        registry.add(session(1, 1)).unwrap();
        registry.set_active(1).unwrap();

        registry.remove(1).unwrap();

        assert_eq!(registry.active(), None);
        assert!(registry.list_ordered_by_creation().is_empty());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reassignment_tie_prefers_later_insertion() {
        let mut registry = Registry::default();
        registry.add(session(1, 5)).unwrap();
        registry.add(session(2, 5)).unwrap();
        registry.add(session(3, 1)).unwrap();
        registry.set_active(3).unwrap();

        registry.remove(3).unwrap();
        assert_eq!(registry.active(), Some(2));
    }

    #[test]
    fn test_order_is_by_creation_not_activation() {
        let mut registry = Registry::default();
        registry.add(session(3, 30)).unwrap();
        registry.add(session(1, 10)).unwrap();
        registry.add(session(2, 10)).unwrap();
        registry.set_active(1).unwrap();

        assert_eq!(registry.ordered_ids(), vec![1, 2, 3]);
    }
}
