//! Chromium-backed driver via the DevTools protocol.

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::browser::session::{Driver, Session, WaitCondition};
use crate::error::{BrowserError, BrowserResult};

const SELECTOR_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Launches headless Chromium sessions over CDP.
pub struct CdpDriver {
    headless: bool,
}

impl CdpDriver {
    pub fn new() -> Self {
        Self { headless: true }
    }

    /// Run with a visible browser window (debugging aid).
    pub fn with_head(mut self) -> Self {
        self.headless = false;
        self
    }
}

impl Default for CdpDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for CdpDriver {
    type Session = CdpSession;

    async fn launch(&self) -> BrowserResult<CdpSession> {
        let builder = BrowserConfig::builder();
        let builder = if self.headless {
            builder
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| BrowserError::Launch(e.into()))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(Box::new(e)))?;

        // The handler stream must be polled for any CDP command to make
        // progress.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "protocol handler reported an event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Launch(Box::new(e)))?;

        let session = CdpSession {
            id: Uuid::new_v4().to_string(),
            browser,
            handler_task,
            page,
            alive: true,
            current: None,
        };
        info!(session_id = %session.id, "browser session launched");
        Ok(session)
    }

    fn name(&self) -> &str {
        "cdp"
    }
}

/// One live Chromium instance with a single page.
pub struct CdpSession {
    id: String,
    browser: Browser,
    handler_task: JoinHandle<()>,
    page: Page,
    alive: bool,
    current: Option<String>,
}

impl CdpSession {
    fn crashed(&mut self) -> BrowserError {
        self.alive = false;
        BrowserError::SessionCrashed {
            session_id: self.id.clone(),
        }
    }
}

#[async_trait]
impl Session for CdpSession {
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
        wait: &WaitCondition,
        deadline: Duration,
    ) -> BrowserResult<String> {
        if !self.alive {
            return Err(BrowserError::SessionCrashed {
                session_id: self.id.clone(),
            });
        }
        self.current = Some(url.to_string());

        let page = self.page.clone();
        let wait = wait.clone();
        let target = url.to_string();
        let outcome = tokio::time::timeout(deadline, async move {
            page.goto(target.as_str()).await?;
            match &wait {
                WaitCondition::DocumentReady => {
                    page.wait_for_navigation().await?;
                }
                WaitCondition::Selector(selector) => loop {
                    if page.find_element(selector.as_str()).await.is_ok() {
                        break;
                    }
                    tokio::time::sleep(SELECTOR_POLL_INTERVAL).await;
                },
            }
            page.content().await
        })
        .await;

        match outcome {
            Err(_) => {
                debug!(session_id = %self.id, url = %url, "navigation deadline exceeded");
                Err(BrowserError::NavigationTimeout {
                    url: url.to_string(),
                })
            }
            Ok(Err(e)) => {
                warn!(session_id = %self.id, url = %url, error = %e, "navigation failed, session crashed");
                Err(self.crashed())
            }
            Ok(Ok(markup)) => Ok(markup),
        }
    }

    async fn reset(&mut self) -> BrowserResult<()> {
        let page = self.page.clone();
        match page.goto("about:blank").await {
            Ok(_) => {
                self.current = None;
                Ok(())
            }
            Err(e) => {
                warn!(session_id = %self.id, error = %e, "reset failed, session crashed");
                Err(self.crashed())
            }
        }
    }

    async fn close(&mut self) {
        self.alive = false;
        if let Err(e) = self.browser.close().await {
            debug!(session_id = %self.id, error = %e, "browser close reported error");
        }
        self.handler_task.abort();
    }
}
