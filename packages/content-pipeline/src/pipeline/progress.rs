//! Progress feed - per-target status transitions for the UI layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::types::target::{Target, TargetStatus};

/// One status transition, pushed as it happens.
///
/// This stream is the only UI-facing contract the pipeline provides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub target_id: Uuid,
    pub url: String,
    pub from: TargetStatus,
    pub to: TargetStatus,
    pub at: DateTime<Utc>,
    /// Error detail or stage note, when there is one.
    pub detail: Option<String>,
}

/// Receiving half handed to the caller.
pub type ProgressReceiver = mpsc::UnboundedReceiver<ProgressEvent>;

/// Sending half owned by the coordinator.
#[derive(Clone)]
pub(crate) struct ProgressFeed {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ProgressFeed {
    pub(crate) fn channel() -> (Self, ProgressReceiver) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Emit a transition. A dropped receiver is fine; progress is
    /// best-effort.
    pub(crate) fn emit(&self, target: &Target, from: TargetStatus, detail: Option<String>) {
        let _ = self.tx.send(ProgressEvent {
            target_id: target.id,
            url: target.url.clone(),
            from,
            to: target.status,
            at: Utc::now(),
            detail,
        });
    }
}
