//! Pool of reusable sessions.
//!
//! Sessions are allocated once at startup and recycled across
//! connections. Running dry is not an error: `acquire` falls back to a
//! fresh allocation and the pool stays bounded on `release`.

use super::Session;
use std::sync::{Mutex, PoisonError};
use tracing::{trace, warn};

/// Fixed-capacity stack of detached sessions.
pub struct SessionPool {
    /// Stack of free sessions (LIFO for cache locality).
    free: Mutex<Vec<Session>>,
    capacity: usize,
}

impl SessionPool {
    /// Create a pool pre-warmed with `capacity` sessions.
    pub fn new(capacity: usize) -> Self {
        let free = (0..capacity).map(|_| Session::new()).collect();
        Self {
            free: Mutex::new(free),
            capacity,
        }
    }

    /// Take a session from the pool, allocating one if the pool is empty.
    pub fn acquire(&self) -> Session {
        let pooled = self
            .free
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        pooled.unwrap_or_else(|| {
            trace!("Session pool empty, allocating transient session");
            Session::new()
        })
    }

    /// Return a detached session to the pool.
    ///
    /// Attached sessions are never pooled. Sessions beyond capacity are
    /// dropped.
    pub fn release(&self, session: Session) {
        if session.is_attached() {
            warn!(
                address = ?session.address(),
                "Refusing to pool a session that is still attached"
            );
            return;
        }

        let mut free = self.free.lock().unwrap_or_else(PoisonError::into_inner);
        if free.len() < self.capacity {
            free.push(session);
        }
    }

    /// Number of sessions currently available without allocating.
    pub fn available(&self) -> usize {
        self.free.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of sessions the pool retains.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use tokio_test::io::Builder;

    #[test]
    fn test_pool_basic() {
        let pool = SessionPool::new(4);
        assert_eq!(pool.capacity(), 4);
        assert_eq!(pool.available(), 4);

        let a = pool.acquire();
        let b = pool.acquire();
        assert_eq!(pool.available(), 2);

        pool.release(a);
        pool.release(b);
        assert_eq!(pool.available(), 4);
    }

    #[test]
    fn test_empty_pool_allocates() {
        let pool = SessionPool::new(1);
        let first = pool.acquire();
        let second = pool.acquire();
        assert_eq!(pool.available(), 0);
        assert_eq!(second.state(), SessionState::Idle);

        // Transient sessions past capacity are dropped on release
        pool.release(first);
        pool.release(second);
        assert_eq!(pool.available(), 1);
    }

    #[tokio::test]
    async fn test_attached_session_is_not_pooled() {
        let pool = SessionPool::new(1);
        let mut session = pool.acquire();
        session.attach("10.0.0.5", 9000, Builder::new().build());

        pool.release(session);
        assert_eq!(pool.available(), 0);
    }

    #[tokio::test]
    async fn test_reacquired_session_is_clean() {
        let pool = SessionPool::new(1);
        let mut session = pool.acquire();
        session.attach(
            "10.0.0.6",
            9001,
            Builder::new()
                .write(&crate::session::PREAMBLE)
                .read(&[0xFF, 0xFD, 0x01])
                .write(b">")
                .read(b"abc")
                .write(b"abc")
                .build(),
        );
        let recorder = crate::command::testing::Recorder::default();
        session
            .run(
                &recorder,
                std::time::Duration::from_millis(50),
                &crate::registry::SessionRegistry::with_capacity(1),
            )
            .await
            .unwrap();
        pool.release(session);

        let session = pool.acquire();
        assert_eq!(session.cursor(), 0);
        assert_eq!(session.address(), None);
        assert_eq!(session.port(), None);
        assert!(!session.is_attached());
    }
}
