//! Testing utilities including mock implementations.
//!
//! Useful for exercising pipeline logic without a real browser process or
//! completion service. All mocks are deterministic and track their calls
//! for assertions.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use uuid::Uuid;

use crate::browser::session::{Driver, Session, WaitCondition};
use crate::error::{BrowserError, BrowserResult, GenerateError, GenerateResult};
use crate::generate::client::{Completion, Model};
use crate::types::generation::{GenerationRequest, TokenUsage};

// =============================================================================
// Browser mocks
// =============================================================================

/// Scripted navigation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavFailure {
    /// Wait condition never satisfied.
    Timeout,
    /// Browser process became unresponsive; the session dies.
    Crash,
}

#[derive(Default)]
struct MockBrowserState {
    pages: HashMap<String, String>,
    failures: HashMap<String, VecDeque<NavFailure>>,
    crash_urls: Vec<String>,
    nav_delay: Option<Duration>,
    launches: usize,
    navigations: Vec<String>,
    resets: usize,
}

/// Counters shared between a [`MockDriver`] and its sessions.
#[derive(Clone)]
pub struct MockBrowserCounters {
    state: Arc<RwLock<MockBrowserState>>,
}

impl MockBrowserCounters {
    /// Sessions launched so far.
    pub fn launches(&self) -> usize {
        self.state.read().unwrap().launches
    }

    /// URLs navigated to, in order.
    pub fn navigations(&self) -> Vec<String> {
        self.state.read().unwrap().navigations.clone()
    }

    /// Resets performed on release.
    pub fn resets(&self) -> usize {
        self.state.read().unwrap().resets
    }
}

/// A mock browser driver with scripted pages and failures.
///
/// Unknown URLs resolve to a synthetic page so pipeline tests don't have
/// to script every navigation.
#[derive(Default)]
pub struct MockDriver {
    state: Arc<RwLock<MockBrowserState>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `markup` for `url`.
    pub fn with_page(self, url: impl Into<String>, markup: impl Into<String>) -> Self {
        self.state
            .write()
            .unwrap()
            .pages
            .insert(url.into(), markup.into());
        self
    }

    /// Queue `count` scripted failures for `url`, consumed before any
    /// success.
    pub fn with_nav_failures(self, url: impl Into<String>, kind: NavFailure, count: u32) -> Self {
        let url = url.into();
        {
            let mut state = self.state.write().unwrap();
            let queue = state.failures.entry(url).or_default();
            for _ in 0..count {
                queue.push_back(kind);
            }
        }
        self
    }

    /// Crash the session on every navigation to `url`.
    pub fn with_crash_on(self, url: impl Into<String>) -> Self {
        self.state.write().unwrap().crash_urls.push(url.into());
        self
    }

    /// Delay every navigation (for cancellation tests).
    pub fn with_nav_delay(self, delay: Duration) -> Self {
        self.state.write().unwrap().nav_delay = Some(delay);
        self
    }

    /// Handle to the shared call counters.
    pub fn counters(&self) -> MockBrowserCounters {
        MockBrowserCounters {
            state: Arc::clone(&self.state),
        }
    }
}

#[async_trait]
impl Driver for MockDriver {
    type Session = MockSession;

    async fn launch(&self) -> BrowserResult<MockSession> {
        self.state.write().unwrap().launches += 1;
        Ok(MockSession {
            id: Uuid::new_v4().to_string(),
            alive: true,
            current: None,
            state: Arc::clone(&self.state),
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Session spawned by [`MockDriver`].
pub struct MockSession {
    id: String,
    alive: bool,
    current: Option<String>,
    state: Arc<RwLock<MockBrowserState>>,
}

#[async_trait]
impl Session for MockSession {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_alive(&self) -> bool {
        self.alive
    }

    fn current_target(&self) -> Option<&str> {
        self.current.as_deref()
    }

    async fn navigate(
        &mut self,
        url: &str,
        _wait: &WaitCondition,
        deadline: Duration,
    ) -> BrowserResult<String> {
        if !self.alive {
            return Err(BrowserError::SessionCrashed {
                session_id: self.id.clone(),
            });
        }
        self.state
            .write()
            .unwrap()
            .navigations
            .push(url.to_string());
        self.current = Some(url.to_string());

        let delay = self.state.read().unwrap().nav_delay;
        if let Some(delay) = delay {
            if tokio::time::timeout(deadline, tokio::time::sleep(delay))
                .await
                .is_err()
            {
                return Err(BrowserError::NavigationTimeout {
                    url: url.to_string(),
                });
            }
        }

        let crash = self
            .state
            .read()
            .unwrap()
            .crash_urls
            .iter()
            .any(|u| u == url);
        if crash {
            self.alive = false;
            return Err(BrowserError::SessionCrashed {
                session_id: self.id.clone(),
            });
        }

        let scripted = self
            .state
            .write()
            .unwrap()
            .failures
            .get_mut(url)
            .and_then(|queue| queue.pop_front());
        match scripted {
            Some(NavFailure::Timeout) => {
                return Err(BrowserError::NavigationTimeout {
                    url: url.to_string(),
                })
            }
            Some(NavFailure::Crash) => {
                self.alive = false;
                return Err(BrowserError::SessionCrashed {
                    session_id: self.id.clone(),
                });
            }
            None => {}
        }

        let page = self.state.read().unwrap().pages.get(url).cloned();
        Ok(page.unwrap_or_else(|| {
            format!("<html><head><title>{url}</title></head><body><main>Mock page for {url}</main></body></html>")
        }))
    }

    async fn reset(&mut self) -> BrowserResult<()> {
        if !self.alive {
            return Err(BrowserError::SessionCrashed {
                session_id: self.id.clone(),
            });
        }
        self.state.write().unwrap().resets += 1;
        self.current = None;
        Ok(())
    }

    async fn close(&mut self) {
        self.alive = false;
    }
}

// =============================================================================
// Model mocks
// =============================================================================

/// Which transient error a scripted failure produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientKind {
    RateLimited,
    Timeout,
    ServiceUnavailable,
}

impl TransientKind {
    fn to_error(self) -> GenerateError {
        match self {
            TransientKind::RateLimited => GenerateError::RateLimited,
            TransientKind::Timeout => GenerateError::Timeout,
            TransientKind::ServiceUnavailable => GenerateError::ServiceUnavailable { status: 503 },
        }
    }
}

enum MockModelMode {
    Respond,
    AlwaysTransient(TransientKind),
    AlwaysReject(String),
    AlwaysMalformed,
}

/// A mock completion provider with scripted behavior.
pub struct MockModel {
    response: String,
    mode: MockModelMode,
    fail_first: AtomicU32,
    fail_kind: TransientKind,
    delay: Option<Duration>,
    calls: Arc<AtomicU32>,
}

impl Default for MockModel {
    fn default() -> Self {
        Self {
            response: "mock completion".to_string(),
            mode: MockModelMode::Respond,
            fail_first: AtomicU32::new(0),
            fail_kind: TransientKind::Timeout,
            delay: None,
            calls: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl MockModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the text returned on success.
    pub fn with_response(mut self, text: impl Into<String>) -> Self {
        self.response = text.into();
        self
    }

    /// Fail the first `count` calls with a transient error, then succeed.
    pub fn with_transient_failures(self, count: u32, kind: TransientKind) -> Self {
        self.fail_first.store(count, Ordering::SeqCst);
        Self {
            fail_kind: kind,
            ..self
        }
    }

    /// Fail every call with a transient error.
    pub fn always_fail_transient(mut self, kind: TransientKind) -> Self {
        self.mode = MockModelMode::AlwaysTransient(kind);
        self
    }

    /// Fail every call with a non-retryable rejection.
    pub fn always_reject(mut self, reason: impl Into<String>) -> Self {
        self.mode = MockModelMode::AlwaysReject(reason.into());
        self
    }

    /// Fail every call with a malformed-response error.
    pub fn always_malformed(mut self) -> Self {
        self.mode = MockModelMode::AlwaysMalformed;
        self
    }

    /// Delay every call (for cancellation tests).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Shared call counter handle.
    pub fn call_count_handle(&self) -> Arc<AtomicU32> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Model for MockModel {
    async fn complete(&self, request: &GenerationRequest) -> GenerateResult<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &self.mode {
            MockModelMode::AlwaysTransient(kind) => return Err(kind.to_error()),
            MockModelMode::AlwaysReject(reason) => {
                return Err(GenerateError::Rejected {
                    reason: reason.clone(),
                })
            }
            MockModelMode::AlwaysMalformed => {
                return Err(GenerateError::Malformed {
                    reason: "scripted malformed response".to_string(),
                })
            }
            MockModelMode::Respond => {}
        }

        let consumed = self
            .fail_first
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(self.fail_kind.to_error());
        }

        // Deterministic usage derived from lengths.
        let prompt_tokens = (request.prompt_chars() / 4) as u32;
        let completion_tokens = (self.response.chars().count() / 4) as u32;
        Ok(Completion {
            text: self.response.clone(),
            usage: TokenUsage {
                prompt_tokens,
                completion_tokens,
                total_tokens: prompt_tokens + completion_tokens,
            },
        })
    }

    fn name(&self) -> &str {
        "mock"
    }
}
