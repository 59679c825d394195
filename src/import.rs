//! Streaming row importer.
//!
//! A run moves through `Opening` (schema introspection, rule parsing, write
//! mode checks), `Streaming` (one element fully pipelined before the next is
//! decoded) and `Finalizing` (last batch commit). Only `Opening` can fail the
//! run; row-level problems are counted and sampled.
//!
//! Sources with root fallbacks are the one exception to strict streaming: a
//! row that needs a root member the walk has not reached yet waits until the
//! document ends.

use std::io::Read;
use std::ops::ControlFlow;

use chrono::{Local, NaiveDateTime};
use itertools::Itertools;
use log::{debug, info, warn};
use rusqlite::{Connection, Transaction};
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::data::{Cell, RawElement, Record};
use crate::mapping::{FieldDictionary, MappingError};
use crate::normalize::Corrections;
use crate::rules::{FieldErrors, RuleParseError, RuleSet};
use crate::schema::{SchemaError, TableSchema};
use crate::sources::{SourceKind, SourceSpec};
use crate::store::{self, WriteClass, WriteFailure, WriteMode};
use crate::stream::{self, RootValues, StreamError};

pub const DEFAULT_MAX_LOG_ERRORS: usize = 20;
pub const DEFAULT_RECLAIM_EVERY: usize = 1000;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Mapping(#[from] MappingError),
    #[error(transparent)]
    Rules(#[from] RuleParseError),
    #[error("match column '{column}' does not exist in '{table}'")]
    UnknownMatchColumn { table: String, column: String },
    #[error("match columns ({keys}) are not a unique key of '{table}'")]
    NotUniqueKey { table: String, keys: String },
    #[error("reading the JSON document")]
    Root(#[source] StreamError),
    #[error("managing the write batch")]
    Batch(#[from] rusqlite::Error),
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub source: SourceKind,
    pub table: Option<String>,
    pub pointer: Option<String>,
    pub match_keys: Vec<String>,
    pub dry_run: bool,
    pub validate: bool,
    pub max_log_errors: usize,
    pub reclaim_every: usize,
    pub keep_failures: bool,
}

impl ImportOptions {
    pub fn new(source: SourceKind) -> Self {
        Self {
            source,
            table: None,
            pointer: None,
            match_keys: Vec::new(),
            dry_run: false,
            validate: true,
            max_log_errors: DEFAULT_MAX_LOG_ERRORS,
            reclaim_every: DEFAULT_RECLAIM_EVERY,
            keep_failures: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    Validation,
    SkippedHeader,
    DuplicateKey,
    NotNullViolation,
    DbError,
}

impl From<WriteClass> for FailureReason {
    fn from(class: WriteClass) -> Self {
        match class {
            WriteClass::DuplicateKey => FailureReason::DuplicateKey,
            WriteClass::NotNullViolation => FailureReason::NotNullViolation,
            WriteClass::DbError => FailureReason::DbError,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureEntry {
    /// 1-based position of the element in the row array.
    pub row: usize,
    pub reason: FailureReason,
    pub detail: String,
    pub code: Option<i32>,
    pub data: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub source: String,
    pub table: String,
    pub dry_run: bool,
    pub total: usize,
    /// Rows written, or rows that would have been written in a dry run.
    pub inserted: usize,
    pub failed: usize,
    pub failed_validation: usize,
    pub failed_duplicate: usize,
    /// Store failures other than duplicates, not-null violations included.
    pub failed_other: usize,
    pub failed_not_null: usize,
    pub skipped_header: usize,
    pub corrections: Corrections,
    pub batches_committed: usize,
    pub samples: Vec<FailureEntry>,
    pub stream_error: Option<String>,
}

impl ImportSummary {
    pub fn is_complete(&self) -> bool {
        self.stream_error.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportReport {
    pub summary: ImportSummary,
    /// Every failure of the run; filled only when requested.
    pub failures: Vec<FailureEntry>,
}

pub struct Importer<'c> {
    conn: &'c Connection,
    spec: &'static SourceSpec,
    dictionary: FieldDictionary,
    rules: RuleSet,
    schema: TableSchema,
    mode: WriteMode,
    options: ImportOptions,
    stamp: Option<NaiveDateTime>,
    batch: Option<Transaction<'c>>,
    rows_in_batch: usize,
    summary: ImportSummary,
    failures: Vec<FailureEntry>,
    /// Rows waiting for a root member, with their element position.
    deferred: Vec<(usize, Map<String, Value>)>,
    fatal: Option<rusqlite::Error>,
}

impl<'c> Importer<'c> {
    pub fn open(conn: &'c Connection, options: &ImportOptions) -> Result<Self, ImportError> {
        let spec = options.source.spec();
        let table = options.table.as_deref().unwrap_or(spec.table);
        let schema = TableSchema::introspect(conn, table)?;
        let dictionary = FieldDictionary::new(spec.name, spec.dictionary)?;
        let rules = RuleSet::parse(spec.rules)?;
        debug!(
            "Dictionary '{}' maps {} field(s)",
            dictionary.name(),
            dictionary.targets().count()
        );

        let mode = if options.match_keys.is_empty() {
            WriteMode::Insert
        } else {
            if let Some(column) = options.match_keys.iter().find(|k| !schema.has_column(k)) {
                return Err(ImportError::UnknownMatchColumn {
                    table: table.to_string(),
                    column: column.clone(),
                });
            }
            if !schema.is_unique_key(&options.match_keys) {
                return Err(ImportError::NotUniqueKey {
                    table: table.to_string(),
                    keys: options.match_keys.join(", "),
                });
            }
            WriteMode::Upsert {
                keys: options.match_keys.clone(),
            }
        };

        let stamp = schema
            .supports_timestamps()
            .then(|| Local::now().naive_local());
        let batch = if options.dry_run {
            None
        } else {
            Some(conn.unchecked_transaction()?)
        };

        info!(
            "Importing {} rows into '{}' ({}, {})",
            spec.name,
            table,
            match &mode {
                WriteMode::Insert => "insert".to_string(),
                WriteMode::Upsert { keys } => format!("upsert on {}", keys.join(", ")),
            },
            if options.dry_run { "dry run" } else { "writing" }
        );
        if !options.validate {
            warn!("Validation disabled; the store enforces constraints alone");
        }

        Ok(Self {
            conn,
            spec,
            dictionary,
            rules,
            schema,
            mode,
            options: options.clone(),
            stamp,
            batch,
            rows_in_batch: 0,
            summary: ImportSummary {
                source: spec.name.to_string(),
                table: table.to_string(),
                dry_run: options.dry_run,
                ..ImportSummary::default()
            },
            failures: Vec::new(),
            deferred: Vec::new(),
            fatal: None,
        })
    }

    pub fn pointer(&self) -> &str {
        self.options.pointer.as_deref().unwrap_or(self.spec.pointer)
    }

    pub fn summary(&self) -> &ImportSummary {
        &self.summary
    }

    /// Root members the source falls back on.
    pub fn root_members(&self) -> Vec<&'static str> {
        self.spec.root_fallbacks.iter().map(|(member, _)| *member).collect()
    }

    /// Runs one element through map, root fill, normalize, guard, header
    /// filter, validation and write.
    pub fn process(&mut self, element: RawElement, root: &RootValues) -> ControlFlow<()> {
        self.summary.total += 1;
        let row = self.summary.total;

        let object = match element {
            RawElement::Object(map) => map,
            other => {
                let detail = format!("expected an object, found {}", other.kind());
                self.record_failure(row, FailureReason::Validation, detail, None, other.into_json());
                return self.after_row();
            }
        };

        let record = self.dictionary.map(&object);
        if self.awaits_root(&record, root) {
            self.deferred.push((row, object));
            return ControlFlow::Continue(());
        }
        self.pipeline(row, object, record, root)
    }

    /// Processes deferred rows once every root member is known. Fallbacks
    /// still missing leave the field empty for validation to reject.
    pub fn drain_deferred(&mut self, root: &RootValues) -> ControlFlow<()> {
        if !self.deferred.is_empty() {
            debug!("Processing {} row(s) that waited for root values", self.deferred.len());
        }
        for (row, object) in std::mem::take(&mut self.deferred) {
            let record = self.dictionary.map(&object);
            self.pipeline(row, object, record, root)?;
        }
        ControlFlow::Continue(())
    }

    fn awaits_root(&self, record: &Record, root: &RootValues) -> bool {
        self.spec
            .root_fallbacks
            .iter()
            .any(|(member, field)| is_blank(record.get(*field)) && !root.contains_key(*member))
    }

    fn pipeline(
        &mut self,
        row: usize,
        object: Map<String, Value>,
        mut record: Record,
        root: &RootValues,
    ) -> ControlFlow<()> {
        for (member, field) in self.spec.root_fallbacks {
            if is_blank(record.get(*field))
                && let Some(value) = root.get(*member).filter(|value| !value.is_null())
            {
                record.insert(field.to_string(), Cell::from_json(value.clone()));
            }
        }
        self.spec
            .plan
            .apply(&mut record, &mut self.summary.corrections);
        let record = self.schema.restrict(record);

        if self.spec.headers.looks_like_header(&record) {
            self.summary.skipped_header += 1;
            self.capture(FailureEntry {
                row,
                reason: FailureReason::SkippedHeader,
                detail: "row repeats the column headers".to_string(),
                code: None,
                data: Value::Object(object),
            });
            return self.after_row();
        }

        let mut record = if self.options.validate {
            match self.rules.validate(record) {
                Ok(valid) => self.schema.restrict(valid),
                Err(errors) => {
                    self.record_failure(
                        row,
                        FailureReason::Validation,
                        describe_field_errors(&errors),
                        None,
                        Value::Object(object),
                    );
                    return self.after_row();
                }
            }
        } else {
            record
        };
        self.stamp(&mut record);

        if self.options.dry_run {
            self.summary.inserted += 1;
            return self.after_row();
        }

        match store::write_record(self.conn, &self.summary.table, &record, &self.mode) {
            Ok(_) => self.summary.inserted += 1,
            Err(failure) => self.record_write_failure(row, failure, object),
        }
        self.after_row()
    }

    fn stamp(&self, record: &mut Record) {
        if let Some(now) = self.stamp {
            for column in ["created_at", "updated_at"] {
                record
                    .entry(column.to_string())
                    .or_insert(Cell::DateTime(now));
            }
        }
    }

    fn record_write_failure(&mut self, row: usize, failure: WriteFailure, object: Map<String, Value>) {
        let WriteFailure {
            class,
            detail,
            code,
        } = failure;
        self.record_failure(row, class.into(), detail, code, Value::Object(object));
    }

    fn record_failure(
        &mut self,
        row: usize,
        reason: FailureReason,
        detail: String,
        code: Option<i32>,
        data: Value,
    ) {
        self.summary.failed += 1;
        match reason {
            FailureReason::Validation => self.summary.failed_validation += 1,
            FailureReason::DuplicateKey => self.summary.failed_duplicate += 1,
            FailureReason::NotNullViolation => {
                self.summary.failed_not_null += 1;
                self.summary.failed_other += 1;
            }
            FailureReason::DbError => self.summary.failed_other += 1,
            FailureReason::SkippedHeader => {}
        }
        self.capture(FailureEntry {
            row,
            reason,
            detail,
            code,
            data,
        });
    }

    fn capture(&mut self, entry: FailureEntry) {
        if self.summary.samples.len() < self.options.max_log_errors {
            warn!(
                "Row {} {:?}: {}",
                entry.row, entry.reason, entry.detail
            );
            self.summary.samples.push(entry.clone());
        }
        if self.options.keep_failures {
            self.failures.push(entry);
        }
    }

    fn after_row(&mut self) -> ControlFlow<()> {
        self.rows_in_batch += 1;
        if self.options.reclaim_every > 0 && self.rows_in_batch >= self.options.reclaim_every {
            if let Err(err) = self.reclaim() {
                self.fatal = Some(err);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Commits the open batch, drops cached statements and starts a new batch.
    fn reclaim(&mut self) -> rusqlite::Result<()> {
        self.rows_in_batch = 0;
        if let Some(batch) = self.batch.take() {
            batch.commit()?;
            self.summary.batches_committed += 1;
            self.conn.flush_prepared_statement_cache();
            self.batch = Some(self.conn.unchecked_transaction()?);
        }
        self.failures.shrink_to_fit();
        debug!(
            "Reclaimed after {} row(s): {} inserted, {} failed",
            self.summary.total, self.summary.inserted, self.summary.failed
        );
        Ok(())
    }

    pub fn finish(mut self) -> Result<ImportReport, ImportError> {
        if let Some(err) = self.fatal.take() {
            return Err(ImportError::Batch(err));
        }
        if let Some(batch) = self.batch.take() {
            batch.commit()?;
            self.summary.batches_committed += 1;
        }
        let s = &self.summary;
        info!(
            "{}: total={} inserted={} failed={} (validation={}, duplicate={}, other={}, not_null={}) header_rows={} day_month_swaps={}",
            s.table,
            s.total,
            s.inserted,
            s.failed,
            s.failed_validation,
            s.failed_duplicate,
            s.failed_other,
            s.failed_not_null,
            s.skipped_header,
            s.corrections.day_month_swaps
        );
        Ok(ImportReport {
            summary: self.summary,
            failures: self.failures,
        })
    }
}

/// Opens the run, streams every element of `reader` through the pipeline and
/// finalizes. A document that cannot yield its first element fails the run;
/// later stream errors end it early with a summary.
pub fn run<R: Read>(
    conn: &Connection,
    options: &ImportOptions,
    reader: R,
) -> Result<ImportReport, ImportError> {
    let mut importer = Importer::open(conn, options)?;
    let pointer = importer.pointer().to_string();
    let members = importer.root_members();
    let streamed = stream::for_each_element_with_root(reader, &pointer, &members, |element, root| {
        importer.process(element, root)
    });
    match streamed {
        Ok(walked) => {
            debug!("Streamed {} element(s) from '{pointer}'", walked.elements);
            let _ = importer.drain_deferred(&walked.root);
        }
        Err(StreamError::Stopped { .. }) => {}
        Err(err) if err.elements_delivered() == 0 => return Err(ImportError::Root(err)),
        Err(err) => {
            let message = error_chain(&err);
            warn!("Input ended early: {message}");
            importer.summary.stream_error = Some(message);
            let _ = importer.drain_deferred(&RootValues::new());
        }
    }
    importer.finish()
}

fn is_blank(cell: Option<&Cell>) -> bool {
    match cell {
        None | Some(Cell::Null) => true,
        Some(Cell::Text(text)) => text.trim().is_empty(),
        Some(_) => false,
    }
}

pub fn describe_field_errors(errors: &FieldErrors) -> String {
    errors
        .0
        .iter()
        .map(|(field, messages)| format!("{field}: {}", messages.join(" ")))
        .join("; ")
}

fn error_chain(err: &dyn std::error::Error) -> String {
    let mut parts = vec![err.to_string()];
    let mut source = err.source();
    while let Some(cause) = source {
        parts.push(cause.to_string());
        source = cause.source();
    }
    parts.join(": ")
}
