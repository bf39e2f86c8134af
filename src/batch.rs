// 📦 Batch Driver - cleaned records → assembler → upsert collaborator
//
// Records are processed one at a time. A record that fails to build is
// reported and skipped; the batch always runs to the end.

use crate::entity::{EntityDescription, NatureAreaAssembler};
use crate::error::BuildError;
use crate::record::{fields, SourceRecord};
use crate::resolver::Resolution;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Write;
use tracing::{error, info};

// ============================================================================
// UPSERT BOUNDARY
// ============================================================================

/// Receives finished descriptions. Writing to the knowledge base is the
/// implementor's business; descriptions with `upload == false` are passed
/// along too so preview and audit streams stay complete.
pub trait Upserter {
    /// Returns the id of the entity now holding this description in the
    /// knowledge base, or `None` when nothing was written.
    fn upsert(&mut self, entity: &EntityDescription) -> Result<Option<String>>;
}

/// Collects descriptions in memory
impl Upserter for Vec<EntityDescription> {
    fn upsert(&mut self, entity: &EntityDescription) -> Result<Option<String>> {
        self.push(entity.clone());
        Ok(None)
    }
}

/// One JSON document per line
pub struct JsonLinesSink<W: Write> {
    writer: W,
    written: usize,
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesSink { writer, written: 0 }
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush output")
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Upserter for JsonLinesSink<W> {
    fn upsert(&mut self, entity: &EntityDescription) -> Result<Option<String>> {
        serde_json::to_writer(&mut self.writer, entity)
            .with_context(|| format!("Failed to serialize entity {}", entity.nature_id))?;
        writeln!(self.writer).context("Failed to write output line")?;
        self.written += 1;
        Ok(None)
    }
}

// ============================================================================
// DIAGNOSTICS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// No entity found, a new one will be created
    Unmatched,
    /// Static mapping offered several entities, `chosen` was used
    AmbiguousMapping {
        chosen: String,
        candidates: Vec<String>,
    },
    /// Record could not be built
    Failed { error: String },
    /// Record carried an explicit "no value" that this run does not accept
    UnsupportedValue { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub nature_id: String,
    pub name: String,
    pub kind: DiagnosticKind,
}

impl Diagnostic {
    fn for_record(record: &SourceRecord, kind: DiagnosticKind) -> Self {
        Diagnostic {
            nature_id: record.get_opt(fields::NATURE_ID).unwrap_or_default().to_string(),
            name: record.display_name().to_string(),
            kind,
        }
    }

    fn from_error(record: &SourceRecord, err: &BuildError) -> Self {
        let kind = if err.is_unsupported_value() {
            DiagnosticKind::UnsupportedValue {
                error: err.to_string(),
            }
        } else {
            DiagnosticKind::Failed {
                error: err.to_string(),
            }
        };
        Diagnostic::for_record(record, kind)
    }

    /// Event type name used by the link store
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            DiagnosticKind::Unmatched => "unmatched",
            DiagnosticKind::AmbiguousMapping { .. } => "ambiguous_mapping",
            DiagnosticKind::Failed { .. } => "failed",
            DiagnosticKind::UnsupportedValue { .. } => "unsupported_value",
        }
    }
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub matched: usize,
    pub unmatched: usize,
    pub failed: usize,
}

impl BatchSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} records: {} matched, {} unmatched (new), {} failed",
            self.total, self.matched, self.unmatched, self.failed
        )
    }
}

/// A nature id the upsert collaborator confirmed as written to an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenLink {
    pub nature_id: String,
    pub entity_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub diagnostics: Vec<Diagnostic>,
    /// Links confirmed by the collaborator that the existing-link index
    /// did not already hold. Static mapping guesses never land here.
    pub new_links: Vec<WrittenLink>,
}

impl BatchReport {
    pub fn unmatched_names(&self) -> Vec<&str> {
        self.diagnostics
            .iter()
            .filter(|d| d.kind == DiagnosticKind::Unmatched)
            .map(|d| d.name.as_str())
            .collect()
    }

    pub fn unsupported_values(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d.kind, DiagnosticKind::UnsupportedValue { .. }))
            .collect()
    }

    pub fn failures(&self) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| matches!(d.kind, DiagnosticKind::Failed { .. }))
            .collect()
    }
}

// ============================================================================
// DRIVER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    /// Records to skip from the start (resumption)
    pub offset: usize,
    /// Maximum number of records to process
    pub limit: Option<usize>,
    /// Nature ids built and streamed but not uploaded
    pub skip_upload: HashSet<String>,
}

impl BatchOptions {
    /// The slice of `records` this run covers
    pub fn window<'r>(&self, records: &'r [SourceRecord]) -> &'r [SourceRecord] {
        let start = self.offset.min(records.len());
        let end = match self.limit {
            Some(limit) => start.saturating_add(limit).min(records.len()),
            None => records.len(),
        };
        &records[start..end]
    }
}

/// Assemble every record in the window and hand the results to `upserter`.
///
/// Build failures become diagnostics. An error from the upserter itself is an
/// I/O problem and stops the batch.
pub fn run_batch(
    records: &[SourceRecord],
    assembler: &NatureAreaAssembler,
    options: &BatchOptions,
    upserter: &mut dyn Upserter,
) -> Result<BatchReport> {
    let window = options.window(records);
    info!(records = window.len(), offset = options.offset, "starting batch");

    let mut report = BatchReport::default();

    for record in window {
        report.summary.total += 1;

        let assembly = match assembler.assemble(record) {
            Ok(assembly) => assembly,
            Err(err) => {
                error!(
                    nature_id = ?record.get_opt(fields::NATURE_ID),
                    name = record.display_name(),
                    configuration = err.is_configuration(),
                    "failed to build record: {}",
                    err
                );
                report.summary.failed += 1;
                report.diagnostics.push(Diagnostic::from_error(record, &err));
                continue;
            }
        };

        match &assembly.resolution {
            Resolution::Unmatched => {
                report.summary.unmatched += 1;
                report
                    .diagnostics
                    .push(Diagnostic::for_record(record, DiagnosticKind::Unmatched));
            }
            Resolution::Mapped {
                entity,
                alternatives,
            } if !alternatives.is_empty() => {
                report.summary.matched += 1;
                report.diagnostics.push(Diagnostic::for_record(
                    record,
                    DiagnosticKind::AmbiguousMapping {
                        chosen: entity.clone(),
                        candidates: alternatives.clone(),
                    },
                ));
            }
            _ => report.summary.matched += 1,
        }

        let mut entity = assembly.entity;
        if options.skip_upload.contains(&entity.nature_id) {
            entity.disable_upload();
        }

        if let Some(entity_id) = upserter.upsert(&entity)? {
            let known = matches!(
                &assembly.resolution,
                Resolution::Existing { entity } if *entity == entity_id
            );
            if !known {
                report.new_links.push(WrittenLink {
                    nature_id: entity.nature_id.clone(),
                    entity_id,
                });
            }
        }
    }

    info!("{}", report.summary.summary());
    Ok(report)
}

// ============================================================================
// TESTS
// ============================================================================
