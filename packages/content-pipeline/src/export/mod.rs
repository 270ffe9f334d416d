//! Export - tabular summaries and per-target documents.
//!
//! Export is decoupled from pipeline success: a sink failure is reported
//! to the caller and never changes a target's status. The CSV sink is
//! append-only; a target's row is written once no matter how often the
//! run is exported.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

use crate::error::{ExportError, ExportResult};
use crate::types::run::PipelineRun;
use crate::types::target::Target;

/// Characters of generated text kept in the tabular excerpt.
const EXCERPT_CHARS: usize = 120;

/// Receives completed targets as the coordinator finishes them.
pub trait ExportSink: Send + Sync {
    /// Record one target's row. Must be idempotent per target id.
    fn submit(&self, target: &Target) -> ExportResult<()>;
}

#[derive(Debug, Clone, Serialize)]
struct CsvRow {
    id: Uuid,
    url: String,
    status: String,
    excerpt: String,
    completed_at: Option<DateTime<Utc>>,
}

impl CsvRow {
    fn from_target(target: &Target) -> Self {
        Self {
            id: target.id,
            url: target.url.clone(),
            status: target.status.label(),
            excerpt: target
                .generation
                .as_ref()
                .map(|g| g.excerpt(EXCERPT_CHARS))
                .unwrap_or_default(),
            completed_at: target.generation.as_ref().map(|g| g.completed_at),
        }
    }
}

/// Append-only CSV sink.
#[derive(Default)]
pub struct CsvExporter {
    state: Mutex<CsvExporterState>,
}

#[derive(Default)]
struct CsvExporterState {
    rows: Vec<CsvRow>,
    written: HashSet<Uuid>,
}

impl CsvExporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serialize every known row to CSV.
    ///
    /// Targets the coordinator never submitted (failures, stragglers) are
    /// appended first so the artifact carries one row per target. Calling
    /// this twice on the same run adds nothing the second time.
    pub fn export(&self, run: &PipelineRun) -> ExportResult<ExportArtifact> {
        {
            let mut state = self.state.lock().expect("exporter lock poisoned");
            for target in &run.targets {
                if state.written.insert(target.id) {
                    state.rows.push(CsvRow::from_target(target));
                }
            }
        }

        let state = self.state.lock().expect("exporter lock poisoned");
        let mut writer = csv::Writer::from_writer(Vec::new());
        for row in &state.rows {
            writer.serialize(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| ExportError::Io(std::io::Error::other(e)))?;
        let csv = String::from_utf8(bytes)
            .map_err(|e| ExportError::Io(std::io::Error::other(e)))?;

        Ok(ExportArtifact {
            rows: state.rows.len(),
            csv,
        })
    }

    /// Number of rows recorded so far.
    pub fn row_count(&self) -> usize {
        self.state.lock().expect("exporter lock poisoned").rows.len()
    }
}

impl ExportSink for CsvExporter {
    fn submit(&self, target: &Target) -> ExportResult<()> {
        let mut state = self.state.lock().expect("exporter lock poisoned");
        if state.written.insert(target.id) {
            state.rows.push(CsvRow::from_target(target));
        }
        Ok(())
    }
}

/// Tabular summary of a run.
#[derive(Debug, Clone)]
pub struct ExportArtifact {
    pub csv: String,
    pub rows: usize,
}

impl ExportArtifact {
    /// Write the CSV to disk.
    pub fn write_to(&self, path: impl AsRef<Path>) -> ExportResult<()> {
        std::fs::write(path, &self.csv)?;
        Ok(())
    }
}

/// Per-target rich output: extracted content plus generated text.
#[derive(Debug, Clone)]
pub struct DocumentArtifact {
    /// Suggested filename, already sanitized.
    pub filename: String,
    pub content: String,
}

impl DocumentArtifact {
    /// Write the document into `dir` under its suggested filename.
    pub fn write_to(&self, dir: impl AsRef<Path>) -> ExportResult<()> {
        std::fs::write(dir.as_ref().join(&self.filename), &self.content)?;
        Ok(())
    }
}

/// Render the per-target document artifact.
///
/// Requires both the record and the generated output; targets that never
/// reached `Generated` have nothing to render.
pub fn document(target: &Target) -> ExportResult<DocumentArtifact> {
    let (record, generation) = match (&target.record, &target.generation) {
        (Some(record), Some(generation)) => (record, generation),
        _ => {
            return Err(ExportError::TargetIncomplete {
                target_id: target.id,
            })
        }
    };

    // Untitled pages fall back to their host name.
    let host = url::Url::parse(&target.url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string));
    let title = if record.title.is_empty() {
        host.as_deref().unwrap_or(target.url.as_str()).to_string()
    } else {
        record.title.clone()
    };

    let mut content = String::new();
    content.push_str(&format!("# {title}\n\n"));
    content.push_str(&format!(
        "Generated on: {}\n",
        generation.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    content.push_str(&format!("Source: {}\n\n", target.url));

    if !record.fields.is_empty() {
        content.push_str("## Extracted fields\n\n");
        for field in &record.fields {
            content.push_str(&format!("- {}: {}\n", field.name, field.value));
        }
        content.push('\n');
    }

    content.push_str("## Extracted content\n\n");
    content.push_str(&record.body);
    content.push_str("\n\n## Generated text\n\n");
    content.push_str(&generation.text);
    content.push('\n');

    Ok(DocumentArtifact {
        filename: format!("{}.md", sanitize_filename(&title)),
        content,
    })
}

/// Reduce a title to a safe filename stem.
pub fn sanitize_filename(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = true;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '-' {
            out.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    let trimmed = out.trim_end_matches('_').to_string();
    if trimmed.is_empty() {
        "document".to_string()
    } else {
        trimmed
    }
}
