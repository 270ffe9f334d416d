//! Targets and their status state machine.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::FailureKind;
use crate::extract::ExtractionSpec;
use crate::types::generation::GenerationResult;
use crate::types::record::ExtractionRecord;

/// Pipeline status of one target.
///
/// Transitions run `Queued → Extracting → Extracted → Generating →
/// Generated → Exported`; `Failed` absorbs from any non-terminal state.
/// Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetStatus {
    Queued,
    Extracting,
    Extracted,
    Generating,
    Generated,
    Exported,
    Failed(FailureKind),
}

impl TargetStatus {
    /// Whether this status can never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TargetStatus::Exported | TargetStatus::Failed(_))
    }

    /// Whether the forward transition `self -> next` is legal.
    ///
    /// `Failed` is reachable from any non-terminal state; regeneration may
    /// move a non-terminal target back to `Extracted` via a fresh record.
    pub fn allows(&self, next: TargetStatus) -> bool {
        use TargetStatus::*;
        if self.is_terminal() {
            return false;
        }
        match (self, next) {
            (_, Failed(_)) => true,
            (Queued, Extracting) => true,
            (Extracting, Extracted) => true,
            (Extracted, Generating) => true,
            (Generating, Generated) => true,
            (Generated, Exported) => true,
            // Record replacement re-enters Extracted.
            (Extracted | Generating | Generated, Extracted) => true,
            _ => false,
        }
    }

    /// Status name for tabular output.
    pub fn label(&self) -> String {
        match self {
            TargetStatus::Queued => "queued".to_string(),
            TargetStatus::Extracting => "extracting".to_string(),
            TargetStatus::Extracted => "extracted".to_string(),
            TargetStatus::Generating => "generating".to_string(),
            TargetStatus::Generated => "generated".to_string(),
            TargetStatus::Exported => "exported".to_string(),
            TargetStatus::Failed(kind) => format!("failed:{kind}"),
        }
    }
}

/// Caller-supplied description of one unit of work.
#[derive(Debug, Clone)]
pub struct TargetSpec {
    /// Page to navigate to.
    pub url: String,

    /// Selector spec; defaults apply when absent.
    pub extraction: Option<ExtractionSpec>,

    /// Prompt template override for this target.
    pub prompt_template: Option<String>,
}

impl TargetSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            extraction: None,
            prompt_template: None,
        }
    }

    pub fn with_extraction(mut self, spec: ExtractionSpec) -> Self {
        self.extraction = Some(spec);
        self
    }

    pub fn with_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.prompt_template = Some(template.into());
        self
    }
}

/// One unit of pipeline work and its bookkeeping.
///
/// Mutated only by the coordinator; immutable once terminal.
#[derive(Debug, Clone)]
pub struct Target {
    pub id: Uuid,
    pub url: String,
    pub extraction_spec: ExtractionSpec,
    pub prompt_template: Option<String>,
    pub status: TargetStatus,

    /// Navigation attempts made, including retries.
    pub extraction_attempts: u32,

    /// Completion calls made, including retries.
    pub generation_attempts: u32,

    /// Detail of the last error seen, terminal or not.
    pub last_error: Option<String>,

    /// Extracted content, once produced.
    pub record: Option<ExtractionRecord>,

    /// Generated output, once produced.
    pub generation: Option<GenerationResult>,
}

impl Target {
    /// Create a queued target from a spec.
    pub fn from_spec(spec: TargetSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            url: spec.url,
            extraction_spec: spec.extraction.unwrap_or_default(),
            prompt_template: spec.prompt_template,
            status: TargetStatus::Queued,
            extraction_attempts: 0,
            generation_attempts: 0,
            last_error: None,
            record: None,
            generation: None,
        }
    }

    /// Apply a forward transition, returning whether it was legal.
    ///
    /// Illegal transitions are coordinator bugs; they are logged and
    /// rejected rather than applied.
    pub fn transition(&mut self, next: TargetStatus) -> bool {
        if !self.status.allows(next) {
            debug_assert!(false, "illegal transition {:?} -> {:?}", self.status, next);
            tracing::warn!(
                target_id = %self.id,
                from = ?self.status,
                to = ?next,
                "rejected illegal status transition"
            );
            return false;
        }
        self.status = next;
        true
    }

    /// Attach a fresh record and enter `Extracted`.
    ///
    /// Records are never mutated in place: a re-extraction replaces the
    /// record wholesale.
    pub fn attach_record(&mut self, record: ExtractionRecord) -> bool {
        if !self.status.allows(TargetStatus::Extracted) {
            return false;
        }
        self.record = Some(record);
        self.status = TargetStatus::Extracted;
        true
    }

    /// Attach generated output and enter `Generated`.
    pub fn attach_generation(&mut self, result: GenerationResult) -> bool {
        if !self.status.allows(TargetStatus::Generated) {
            return false;
        }
        self.generation_attempts = result.attempts;
        self.generation = Some(result);
        self.status = TargetStatus::Generated;
        true
    }

    /// Mark the target terminally failed with a reason code and detail.
    pub fn fail(&mut self, kind: FailureKind, detail: impl Into<String>) {
        if self.status.is_terminal() {
            return;
        }
        self.last_error = Some(detail.into());
        self.status = TargetStatus::Failed(kind);
    }

    /// The failure kind, when terminally failed.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self.status {
            TargetStatus::Failed(kind) => Some(kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target() -> Target {
        Target::from_spec(TargetSpec::new("https://example.com"))
    }

    #[test]
    fn happy_path_transitions() {
        let mut t = target();
        assert!(t.transition(TargetStatus::Extracting));
        assert!(t.attach_record(ExtractionRecord::new(
            "https://example.com",
            "T",
            "body",
            vec![]
        )));
        assert!(t.transition(TargetStatus::Generating));
        assert!(t.attach_generation(GenerationResult {
            text: "out".into(),
            usage: Default::default(),
            completed_at: chrono::Utc::now(),
            truncated: false,
            attempts: 1,
        }));
        assert!(t.transition(TargetStatus::Exported));
        assert!(t.status.is_terminal());
    }

    #[test]
    #[cfg_attr(debug_assertions, should_panic)]
    fn stage_skip_rejected_debug() {
        let mut t = target();
        t.transition(TargetStatus::Generating);
    }

    #[test]
    fn failed_is_absorbing() {
        let mut t = target();
        t.transition(TargetStatus::Extracting);
        t.fail(FailureKind::NavigationTimeout, "deadline exceeded");
        assert_eq!(t.failure_kind(), Some(FailureKind::NavigationTimeout));

        // No regression out of a terminal state.
        assert!(!t.status.allows(TargetStatus::Extracted));
        t.fail(FailureKind::Cancelled, "later");
        assert_eq!(t.failure_kind(), Some(FailureKind::NavigationTimeout));
    }

    #[test]
    fn regeneration_reenters_extracted() {
        let mut t = target();
        t.transition(TargetStatus::Extracting);
        t.attach_record(ExtractionRecord::new("u", "T", "old", vec![]));
        t.transition(TargetStatus::Generating);

        let replaced = ExtractionRecord::new("u", "T", "new", vec![]);
        assert!(t.attach_record(replaced));
        assert_eq!(t.status, TargetStatus::Extracted);
        assert_eq!(t.record.as_ref().map(|r| r.body.as_str()), Some("new"));
    }
}
