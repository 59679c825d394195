//! Per-company financial statement files.
//!
//! A directory holds `<tax_id>_balance.json`, `<tax_id>_income.json` and
//! `<tax_id>_ratios.json`, each shaped `{ "<year>": [{"item_en": .., "amount": ..}] }`.
//! A file is imported only when its company already exists in
//! `company_entity`; otherwise the whole file is skipped.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use log::{debug, info, warn};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;

use crate::data::{Cell, Record};
use crate::normalize::{self, normalize_identifier};
use crate::store::{self, WriteMode};
use crate::tables;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Balance,
    Income,
    Ratios,
}

impl StatementKind {
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "balance" => Some(Self::Balance),
            "income" => Some(Self::Income),
            "ratios" => Some(Self::Ratios),
            _ => None,
        }
    }

    pub fn table(self) -> &'static str {
        match self {
            Self::Balance => tables::BALANCE_SHEET,
            Self::Income => tables::INCOME_STATEMENT,
            Self::Ratios => tables::FINANCIAL_RATIOS,
        }
    }

    pub fn fields(self) -> &'static [&'static str] {
        match self {
            Self::Balance => tables::BALANCE_FIELDS,
            Self::Income => tables::INCOME_FIELDS,
            Self::Ratios => tables::RATIO_FIELDS,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FinancialOptions {
    pub dir: PathBuf,
    pub tax_id: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FinancialSummary {
    pub files: usize,
    pub years: usize,
    pub columns: usize,
    pub skipped_no_parent: usize,
    pub skipped_bad_name: usize,
    pub skipped_bad_json: usize,
}

/// Splits `0105537086874_balance.json` into its raw identifier and kind.
pub fn parse_file_name(name: &str) -> Option<(&str, StatementKind)> {
    let stem = name.strip_suffix(".json")?;
    let (tax_id, suffix) = stem.rsplit_once('_')?;
    if tax_id.is_empty() {
        return None;
    }
    Some((tax_id, StatementKind::from_suffix(suffix)?))
}

pub fn import_dir(conn: &Connection, options: &FinancialOptions) -> Result<FinancialSummary> {
    let filter = options.tax_id.as_deref().map(normalize_identifier);
    let mut paths = fs::read_dir(&options.dir)
        .with_context(|| format!("Reading directory {:?}", options.dir))?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Listing {:?}", options.dir))?;
    paths.retain(|path| {
        path.file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with(".json"))
    });
    paths.sort();

    info!(
        "Importing financial statements from {:?} (filter: {}, {})",
        options.dir,
        filter.as_deref().unwrap_or("none"),
        if options.dry_run { "dry run" } else { "writing" }
    );

    let mut summary = FinancialSummary::default();
    for path in &paths {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let Some((raw_tax_id, kind)) = parse_file_name(name) else {
            warn!("Skipping {name}: name is not <tax_id>_<balance|income|ratios>.json");
            summary.skipped_bad_name += 1;
            continue;
        };
        let tax_id = normalize_identifier(raw_tax_id);
        if filter.as_ref().is_some_and(|wanted| *wanted != tax_id) {
            continue;
        }

        let document = match read_document(path) {
            Ok(document) => document,
            Err(err) => {
                warn!("Skipping {name}: {err:#}");
                summary.skipped_bad_json += 1;
                continue;
            }
        };

        if !store::parent_exists(conn, tables::COMPANY_ENTITY, "registered_no", &tax_id)
            .with_context(|| format!("Looking up company {tax_id}"))?
        {
            warn!("Skipping {name}: no company_entity with registered_no {tax_id}");
            summary.skipped_no_parent += 1;
            continue;
        }

        let (years, columns) = import_statement(conn, &tax_id, kind, &document, options.dry_run)
            .with_context(|| format!("Importing {name}"))?;
        info!("{name}: {years} year(s), {columns} column(s)");
        summary.files += 1;
        summary.years += years;
        summary.columns += columns;
    }

    info!(
        "Financial import done: files={} years={} columns={} skipped_no_parent={}",
        summary.files, summary.years, summary.columns, summary.skipped_no_parent
    );
    Ok(summary)
}

fn read_document(path: &Path) -> Result<Value> {
    let file = File::open(path).with_context(|| format!("Opening {path:?}"))?;
    let document: Value =
        serde_json::from_reader(BufReader::new(file)).context("Parsing JSON")?;
    anyhow::ensure!(document.is_object(), "expected an object keyed by year");
    Ok(document)
}

/// Upserts one statement document for `tax_id` inside a single transaction and
/// returns how many years and line items were written.
pub fn import_statement(
    conn: &Connection,
    tax_id: &str,
    kind: StatementKind,
    document: &Value,
    dry_run: bool,
) -> Result<(usize, usize)> {
    let Some(by_year) = document.as_object() else {
        return Ok((0, 0));
    };
    let fields = kind.fields();
    let mode = WriteMode::Upsert {
        keys: vec!["tax_id".to_string(), "fiscal_year".to_string()],
    };
    let now = Cell::DateTime(Local::now().naive_local());
    let tx = conn.unchecked_transaction()?;

    let mut years = 0;
    let mut columns = 0;
    for (year_key, rows) in by_year {
        let (Ok(raw_year), Some(rows)) = (year_key.trim().parse::<i64>(), rows.as_array()) else {
            debug!("Ignoring non-year key '{year_key}'");
            continue;
        };
        let Some(year) = normalize::normalize_fiscal_year(raw_year) else {
            debug!("Ignoring implausible year {raw_year}");
            continue;
        };

        let mut record = Record::new();
        record.insert("tax_id".into(), Cell::Text(tax_id.to_string()));
        record.insert("fiscal_year".into(), Cell::Integer(i64::from(year)));
        for row in rows.iter().filter_map(Value::as_object) {
            let Some(item) = row.get("item_en").and_then(Value::as_str) else {
                continue;
            };
            if let Some(field) = fields.iter().find(|field| **field == item) {
                let amount = row.get("amount").and_then(normalize::normalize_amount);
                record.insert(field.to_string(), amount.into());
                columns += 1;
            }
        }

        if dry_run {
            debug!("Dry run: {} upsert {tax_id} {year} ({} fields)", kind.table(), record.len() - 2);
        } else {
            record.insert("created_at".into(), now.clone());
            record.insert("updated_at".into(), now.clone());
            store::write_record(&tx, kind.table(), &record, &mode)?;
        }
        years += 1;
    }

    tx.commit()?;
    Ok((years, columns))
}
