//! Pipeline runs - the aggregate of all targets in one invocation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::error::FailureKind;
use crate::types::target::{Target, TargetStatus};

/// The aggregate of all targets processed in one invocation.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub targets: Vec<Target>,
}

impl PipelineRun {
    /// Start an empty run.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            targets: Vec::new(),
        }
    }

    /// Whether no target remains in a stage-active status.
    ///
    /// `Generated` counts as settled: export failure leaves a target there
    /// by design and must not hold the run open.
    pub fn is_settled(&self) -> bool {
        self.targets.iter().all(|t| {
            matches!(
                t.status,
                TargetStatus::Exported | TargetStatus::Failed(_) | TargetStatus::Generated
            )
        })
    }

    /// Stamp the finish time.
    pub fn finalize(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    /// Count of targets per status label.
    pub fn status_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for target in &self.targets {
            *counts.entry(target.status.label()).or_insert(0) += 1;
        }
        counts
    }

    /// Targets that reached `Exported`.
    pub fn exported_count(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| t.status == TargetStatus::Exported)
            .count()
    }

    /// Targets that ended `Failed`.
    pub fn failed_count(&self) -> usize {
        self.targets
            .iter()
            .filter(|t| t.failure_kind().is_some())
            .count()
    }

    /// Failure counts grouped by reason code.
    pub fn failures_by_kind(&self) -> HashMap<FailureKind, usize> {
        let mut counts = HashMap::new();
        for target in &self.targets {
            if let Some(kind) = target.failure_kind() {
                *counts.entry(kind).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Condensed, serializable view of the run outcome.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.id,
            total: self.targets.len(),
            exported: self.exported_count(),
            failed: self.failed_count(),
            failures_by_kind: self
                .failures_by_kind()
                .into_iter()
                .map(|(kind, count)| (kind.to_string(), count))
                .collect(),
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

/// Run-level outcome: success count, failure count, reasons by kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub total: usize,
    pub exported: usize,
    pub failed: usize,
    pub failures_by_kind: HashMap<String, usize>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}
