//! Registry of attached sessions.
//!
//! Tracks the output handle of every live session so the broadcast
//! driver can reach them. Slab keys give O(1) insert and remove.

use crate::session::SessionHandle;
use slab::Slab;
use std::sync::{Mutex, PoisonError};

/// Live-session set keyed by slab index.
pub struct SessionRegistry {
    sessions: Mutex<Slab<SessionHandle>>,
}

impl SessionRegistry {
    /// Create a registry with room for `capacity` sessions before growing.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(Slab::with_capacity(capacity)),
        }
    }

    /// Register a session, returning its key.
    pub fn insert(&self, handle: SessionHandle) -> usize {
        self.lock().insert(handle)
    }

    /// Register a session for as long as the returned guard lives.
    pub fn register(&self, handle: SessionHandle) -> Registration<'_> {
        Registration {
            registry: self,
            key: self.insert(handle),
        }
    }

    /// Unregister a session.
    pub fn remove(&self, key: usize) -> Option<SessionHandle> {
        self.lock().try_remove(key)
    }

    /// Clone out every registered handle.
    pub fn snapshot(&self) -> Vec<SessionHandle> {
        self.lock().iter().map(|(_, h)| h.clone()).collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Slab<SessionHandle>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Registry entry that is removed when dropped.
pub struct Registration<'a> {
    registry: &'a SessionRegistry,
    key: usize,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.remove(self.key);
    }
}
