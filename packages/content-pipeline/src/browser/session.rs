//! Driver and session traits - the seam between the pipeline and a
//! concrete browser.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::BrowserResult;

/// Readiness condition a navigation waits for before markup is read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitCondition {
    /// Wait for the document load to settle.
    #[default]
    DocumentReady,

    /// Wait until the given selector matches an element.
    Selector(String),
}

/// Launches browser sessions.
///
/// The concrete implementation is [`crate::browser::CdpDriver`]; tests use
/// a scripted mock.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    type Session: Session;

    /// Start a fresh session on a blank page.
    async fn launch(&self) -> BrowserResult<Self::Session>;

    /// Driver name (for logging/debugging).
    fn name(&self) -> &str {
        "unknown"
    }
}

/// A live, addressable browser instance.
///
/// Sessions take `&mut self` everywhere: a session is owned by exactly one
/// worker at a time and is never shared across concurrent extractions.
#[async_trait]
pub trait Session: Send + Sync + 'static {
    /// Stable identifier for logging and crash reports.
    fn id(&self) -> &str;

    /// Whether the underlying browser process is still responsive.
    fn is_alive(&self) -> bool;

    /// The target currently loaded, if any.
    fn current_target(&self) -> Option<&str>;

    /// Navigate to `url`, wait for `wait` to hold, and return the rendered
    /// markup.
    ///
    /// Fails with `NavigationTimeout` when the condition is not satisfied
    /// within `deadline`, or `SessionCrashed` when the browser becomes
    /// unresponsive (the session must then report `is_alive() == false`).
    async fn navigate(
        &mut self,
        url: &str,
        wait: &WaitCondition,
        deadline: Duration,
    ) -> BrowserResult<String>;

    /// Return the session to a neutral state (blank page).
    ///
    /// Called before the session re-enters the pool so no caller ever
    /// observes another target's page state.
    async fn reset(&mut self) -> BrowserResult<()>;

    /// Tear the session down.
    async fn close(&mut self);
}
