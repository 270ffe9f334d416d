//! Bounded session pool.
//!
//! A semaphore bounds how many sessions exist at once; a mutex-guarded
//! idle list holds the ones not currently borrowed. Crashed sessions are
//! discarded and replaced lazily on the next acquire.

use std::collections::VecDeque;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, warn};

use crate::browser::session::{Driver, Session};
use crate::error::{BrowserError, BrowserResult};

/// Bounded pool of browser sessions.
pub struct SessionPool<D: Driver> {
    driver: D,
    permits: Arc<Semaphore>,
    idle: Mutex<VecDeque<D::Session>>,
}

impl<D: Driver> SessionPool<D> {
    /// Create a pool of at most `size` live sessions (floor 1).
    pub fn new(driver: D, size: usize) -> Self {
        Self {
            driver,
            permits: Arc::new(Semaphore::new(size.max(1))),
            idle: Mutex::new(VecDeque::new()),
        }
    }

    /// Borrow a session, suspending until one is free or a creation slot
    /// is available.
    ///
    /// Dead idle sessions found on the way are discarded; a replacement is
    /// launched in their place.
    pub async fn acquire(self: &Arc<Self>) -> BrowserResult<PooledSession<D>> {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BrowserError::PoolClosed)?;

        loop {
            let candidate = self.idle.lock().expect("pool lock poisoned").pop_front();
            match candidate {
                Some(session) if session.is_alive() => {
                    return Ok(PooledSession::new(session, Arc::clone(self), permit));
                }
                Some(mut dead) => {
                    warn!(session_id = dead.id(), "discarding dead pooled session");
                    dead.close().await;
                }
                None => break,
            }
        }

        // Creation slot: the permit is held, so the bound still applies.
        let session = self.driver.launch().await?;
        debug!(
            driver = self.driver.name(),
            session_id = session.id(),
            "launched browser session"
        );
        Ok(PooledSession::new(session, Arc::clone(self), permit))
    }

    /// Shut the pool down: future acquires fail with `PoolClosed` and idle
    /// sessions are torn down.
    pub async fn close(&self) {
        self.permits.close();
        let drained: Vec<D::Session> = self
            .idle
            .lock()
            .expect("pool lock poisoned")
            .drain(..)
            .collect();
        for mut session in drained {
            session.close().await;
        }
    }

    /// Number of sessions currently idle (test/diagnostic aid).
    pub fn idle_count(&self) -> usize {
        self.idle.lock().expect("pool lock poisoned").len()
    }

    fn return_session(&self, session: D::Session) {
        self.idle
            .lock()
            .expect("pool lock poisoned")
            .push_back(session);
    }
}

/// A borrowed session plus its pool slot.
///
/// Call [`PooledSession::release`] to reset the session and hand it back;
/// call [`PooledSession::discard`] when it crashed. Dropping the guard
/// without either frees the slot but abandons the session.
pub struct PooledSession<D: Driver> {
    session: Option<D::Session>,
    pool: Arc<SessionPool<D>>,
    _permit: OwnedSemaphorePermit,
}

impl<D: Driver> PooledSession<D> {
    fn new(session: D::Session, pool: Arc<SessionPool<D>>, permit: OwnedSemaphorePermit) -> Self {
        Self {
            session: Some(session),
            pool,
            _permit: permit,
        }
    }

    /// Reset to a blank page and return the session to the pool.
    ///
    /// A session that fails to reset is discarded instead of being handed
    /// to the next caller in an unknown state.
    pub async fn release(mut self) {
        if let Some(mut session) = self.session.take() {
            match session.reset().await {
                Ok(()) if session.is_alive() => self.pool.return_session(session),
                _ => {
                    warn!(session_id = session.id(), "session failed reset, discarding");
                    session.close().await;
                }
            }
        }
    }

    /// Tear the session down without returning it to the pool.
    pub async fn discard(mut self) {
        if let Some(mut session) = self.session.take() {
            session.close().await;
        }
    }
}

impl<D: Driver> Deref for PooledSession<D> {
    type Target = D::Session;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref().expect("session already taken")
    }
}

impl<D: Driver> DerefMut for PooledSession<D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut().expect("session already taken")
    }
}

impl<D: Driver> Drop for PooledSession<D> {
    fn drop(&mut self) {
        if self.session.is_some() {
            debug!("pooled session dropped without release; abandoning session");
        }
    }
}
