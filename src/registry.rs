//! Registry intake: company, people and yearly financials per entity.
//!
//! Every registry document is archived verbatim first. Each entry of
//! `searchResults` is then reconciled inside its own transaction, so a bad
//! entity rolls back alone and the rest of the batch proceeds.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{Local, NaiveDateTime};
use heck::ToLowerCamelCase;
use log::{debug, info, warn};
use rusqlite::{Connection, params};
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::data::{Cell, DATETIME_FORMAT, Record};
use crate::names::{PersonName, split_person_name};
use crate::normalize::{
    fiscal_year_from_value, normalize_amount, normalize_identifier, normalize_thai_date,
    parse_range, text_or_null,
};
use crate::store::{self, WriteFailure, WriteMode, quote_ident};
use crate::tables::{self, COMPANY_DECIMAL_FIELDS};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry document has no searchResults entries")]
    NoResults,
    #[error("writing registry rows")]
    Write(#[from] WriteFailure),
    #[error("registry store error")]
    Store(#[from] rusqlite::Error),
    #[error("encoding the raw payload")]
    Encode(#[from] serde_json::Error),
}

/// Whether a director or shareholder row is part of the current roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Active,
    Deleted,
}

impl Lifecycle {
    fn from_deleted_at(deleted_at: Option<&str>) -> Self {
        match deleted_at {
            Some(_) => Lifecycle::Deleted,
            None => Lifecycle::Active,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonKind {
    Director,
    Shareholder,
}

impl PersonKind {
    pub fn table(self) -> &'static str {
        match self {
            PersonKind::Director => tables::COMPANY_DIRECTOR,
            PersonKind::Shareholder => tables::COMPANY_SHAREHOLDER,
        }
    }

    fn items(self, entity: &Map<String, Value>) -> &[Value] {
        let collection = match self {
            PersonKind::Director => entity.get("directors"),
            PersonKind::Shareholder => entity
                .get("shareholder")
                .and_then(|holder| holder.get("shareholders")),
        };
        collection
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    fn attributes(self, item: &Value, record: &mut Record) {
        record.insert("director_no".into(), text_or_null(item.get("no")).into());
        if self == PersonKind::Shareholder {
            record.insert(
                "nationality".into(),
                text_or_null(item.get("nationality")).into(),
            );
            for (field, key) in [
                ("percent_share", "percentShare"),
                ("no_of_share", "noOfShare"),
                ("baht_share", "bahtShare"),
            ] {
                record.insert(field.into(), item.get(key).and_then(normalize_amount).into());
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonRow {
    pub id: i64,
    pub name: PersonName,
    pub lifecycle: Lifecycle,
}

/// Roster transitions applied for one entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RosterChanges {
    pub created: usize,
    pub restored: usize,
    pub updated: usize,
    pub retired: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EntitySync {
    pub registered_no: String,
    pub directors: RosterChanges,
    pub shareholders: RosterChanges,
    /// `None` when the payload carried no financial block.
    pub financial_years: Option<usize>,
    pub financial_years_removed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityFailure {
    pub registered_no: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistryOutcome {
    pub payload_id: String,
    pub stored: Vec<EntitySync>,
    pub failed: Vec<EntityFailure>,
    pub skipped: usize,
}

/// Appends the raw document to the archive and returns its payload id.
pub fn archive_payload(
    conn: &Connection,
    registration_no: Option<&str>,
    document: &Value,
) -> Result<String, RegistryError> {
    let raw = serde_json::to_string_pretty(document)?;
    let payload_id = Uuid::new_v4().to_string();
    let mut record = Record::new();
    record.insert("payload_id".into(), Cell::Text(payload_id.clone()));
    record.insert(
        "registration_no".into(),
        registration_no.map(str::to_string).into(),
    );
    record.insert("sha256".into(), Cell::Text(format!("{:x}", Sha256::digest(raw.as_bytes()))));
    record.insert("raw_json".into(), Cell::Text(raw));
    record.insert(
        "received_at".into(),
        Cell::Text(Local::now().format(DATETIME_FORMAT).to_string()),
    );
    store::write_record(conn, tables::REGISTRY_RAW_PAYLOAD, &record, &WriteMode::Insert)?;
    debug!("Archived registry payload {payload_id}");
    Ok(payload_id)
}

/// Archives `document` and reconciles every entity in `searchResults`.
pub fn store_results(
    conn: &Connection,
    requested: Option<&str>,
    document: &Value,
) -> Result<RegistryOutcome, RegistryError> {
    let payload_id = archive_payload(conn, requested, document)?;
    let results = document
        .get("searchResults")
        .and_then(Value::as_array)
        .filter(|results| !results.is_empty())
        .ok_or(RegistryError::NoResults)?;

    let mut outcome = RegistryOutcome {
        payload_id,
        ..RegistryOutcome::default()
    };
    for entity in results {
        let Some(entity) = entity.as_object() else {
            outcome.skipped += 1;
            continue;
        };
        let Some(registered_no) = text_or_null(entity.get("registrationNo")) else {
            warn!("Skipping registry entity without registrationNo");
            outcome.skipped += 1;
            continue;
        };
        let registered_no = normalize_identifier(&registered_no);
        match store_entity(conn, &registered_no, entity) {
            Ok(sync) => {
                info!(
                    "Registry {registered_no}: directors {:?}, shareholders {:?}, years {:?}",
                    sync.directors, sync.shareholders, sync.financial_years
                );
                outcome.stored.push(sync);
            }
            Err(err) => {
                warn!("Registry {registered_no} rolled back: {err}");
                outcome.failed.push(EntityFailure {
                    registered_no,
                    error: error_text(&err),
                });
            }
        }
    }
    Ok(outcome)
}

/// Reconciles one entity atomically: company row, both rosters and the
/// financial-year history commit together or not at all.
pub fn store_entity(
    conn: &Connection,
    registered_no: &str,
    entity: &Map<String, Value>,
) -> Result<EntitySync, RegistryError> {
    let now = Local::now().naive_local();
    let tx = conn.unchecked_transaction()?;
    upsert_company(&tx, registered_no, entity, now)?;
    let directors = reconcile_people(&tx, PersonKind::Director, registered_no, entity, now)?;
    let shareholders = reconcile_people(&tx, PersonKind::Shareholder, registered_no, entity, now)?;
    let (financial_years, financial_years_removed) =
        reconcile_financial_years(&tx, registered_no, entity, now)?;
    tx.commit()?;
    Ok(EntitySync {
        registered_no: registered_no.to_string(),
        directors,
        shareholders,
        financial_years,
        financial_years_removed,
    })
}

const COMPANY_TEXT_KEYS: &[(&str, &str)] = &[
    ("company_name", "companyName"),
    ("company_status", "companyStatus"),
    ("address", "address"),
    ("telephone_no", "telephoneNo"),
    ("business_size", "businessSize"),
    ("company_type", "companyType"),
    ("registration_no_previous", "registrationNoPrevious"),
    ("importer_exporter", "importerExporter"),
    ("sub_district", "subDistrict"),
    ("district", "district"),
    ("province", "province"),
    ("region", "region"),
    ("official_signatory", "officialSignatory"),
];

const CODED_KEYS: &[(&str, &str, &str)] = &[
    ("tsicCode1", "tsic_code1", "description_tsic_code1"),
    ("tsicCode2", "tsic_code2", "description_tsic_code2"),
    ("tsicCode3", "tsic_code3", "description_tsic_code3"),
    ("naicsCode1", "naics_code1", "description_naics_code1"),
    ("naicsCode2", "naics_code2", "description_naics_code2"),
    ("naicsCode3", "naics_code3", "description_naics_code3"),
    ("fsClass", "fs_class_code", "description_fs_class_code"),
];

fn upsert_company(
    conn: &Connection,
    registered_no: &str,
    entity: &Map<String, Value>,
    now: NaiveDateTime,
) -> Result<(), RegistryError> {
    let mut record = Record::new();
    record.insert("registered_no".into(), Cell::Text(registered_no.to_string()));
    for (column, key) in COMPANY_TEXT_KEYS {
        record.insert(column.to_string(), text_or_null(entity.get(*key)).into());
    }
    // Coded classifications arrive as {code, description} or an empty array.
    for (key, code, description) in CODED_KEYS {
        let coded = entity.get(*key);
        record.insert(
            code.to_string(),
            text_or_null(coded.and_then(|c| c.get("code"))).into(),
        );
        record.insert(
            description.to_string(),
            text_or_null(coded.and_then(|c| c.get("description"))).into(),
        );
    }
    for (column, key) in [
        ("registration_date", "registrationDate"),
        ("inactive_date", "inactiveDate"),
    ] {
        let date = text_or_null(entity.get(key)).and_then(|raw| normalize_thai_date(&raw));
        record.insert(column.into(), date.into());
    }
    for column in COMPANY_DECIMAL_FIELDS
        .iter()
        .filter(|c| !c.starts_with("company_credit") && !c.starts_with("credit_term"))
    {
        let amount = entity
            .get(column.to_lower_camel_case().as_str())
            .and_then(normalize_amount);
        record.insert(column.to_string(), amount.into());
    }
    for (prefix, key) in [("company_credit", "companyCredit"), ("credit_term", "creditTerm")] {
        let (start, end) = text_or_null(entity.get(key))
            .map(|raw| parse_range(&raw))
            .unwrap_or((None, None));
        record.insert(format!("{prefix}_start"), start.into());
        record.insert(format!("{prefix}_end"), end.into());
    }
    stamp(&mut record, now);
    store::write_record(
        conn,
        tables::COMPANY_ENTITY,
        &record,
        &WriteMode::Upsert {
            keys: vec!["registered_no".into()],
        },
    )?;
    Ok(())
}

/// Current roster rows for one company, deleted ones included.
pub fn people(
    conn: &Connection,
    kind: PersonKind,
    registered_no: &str,
) -> rusqlite::Result<Vec<PersonRow>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT id, prefix_name, first_name, last_name, deleted_at FROM {} \
         WHERE registered_no = ?1 ORDER BY id",
        quote_ident(kind.table())
    ))?;
    let rows = stmt.query_map([registered_no], |row| {
        let deleted_at: Option<String> = row.get(4)?;
        Ok(PersonRow {
            id: row.get(0)?,
            name: PersonName {
                prefix: row.get(1)?,
                first_name: row.get(2)?,
                last_name: row.get(3)?,
            },
            lifecycle: Lifecycle::from_deleted_at(deleted_at.as_deref()),
        })
    })?;
    rows.collect()
}

/// Replace-all reconciliation of one roster: incoming people are restored or
/// created and updated in place; active people missing from the payload are
/// retired. A missing or empty collection retires everyone.
fn reconcile_people(
    conn: &Connection,
    kind: PersonKind,
    registered_no: &str,
    entity: &Map<String, Value>,
    now: NaiveDateTime,
) -> Result<RosterChanges, RegistryError> {
    let existing: BTreeMap<PersonName, PersonRow> = people(conn, kind, registered_no)?
        .into_iter()
        .map(|row| (row.name.clone(), row))
        .collect();
    let mode = WriteMode::Upsert {
        keys: ["registered_no", "prefix_name", "first_name", "last_name"]
            .map(String::from)
            .to_vec(),
    };

    let mut changes = RosterChanges::default();
    let mut incoming = BTreeSet::new();
    for item in kind.items(entity) {
        let raw = item.get("name").and_then(Value::as_str).unwrap_or_default();
        let name = split_person_name(raw);
        if name.is_empty() {
            debug!("Ignoring unnamed {:?} of {registered_no}", kind);
            continue;
        }
        if incoming.insert(name.clone()) {
            match existing.get(&name).map(|row| row.lifecycle) {
                None => changes.created += 1,
                Some(Lifecycle::Deleted) => changes.restored += 1,
                Some(Lifecycle::Active) => changes.updated += 1,
            }
        }

        let mut record = Record::new();
        record.insert("registered_no".into(), Cell::Text(registered_no.to_string()));
        record.insert("prefix_name".into(), Cell::Text(name.prefix));
        record.insert("first_name".into(), Cell::Text(name.first_name));
        record.insert("last_name".into(), Cell::Text(name.last_name));
        record.insert("deleted_at".into(), Cell::Null);
        kind.attributes(item, &mut record);
        stamp(&mut record, now);
        store::write_record(conn, kind.table(), &record, &mode)?;
    }

    let mut retire = conn.prepare_cached(&format!(
        "UPDATE {} SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2",
        quote_ident(kind.table())
    ))?;
    for row in existing.values() {
        if row.lifecycle == Lifecycle::Active && !incoming.contains(&row.name) {
            retire.execute(params![Cell::DateTime(now), row.id])?;
            changes.retired += 1;
        }
    }
    Ok(changes)
}

/// Upserts every usable fiscal year and drops years absent from the payload.
/// Returns `(None, 0)` and leaves history alone when there is no financial
/// block or no usable year in it.
fn reconcile_financial_years(
    conn: &Connection,
    registered_no: &str,
    entity: &Map<String, Value>,
    now: NaiveDateTime,
) -> Result<(Option<usize>, usize), RegistryError> {
    let Some(items) = entity
        .get("financial")
        .and_then(Value::as_array)
        .filter(|items| !items.is_empty())
    else {
        return Ok((None, 0));
    };

    let mode = WriteMode::Upsert {
        keys: vec!["registered_no".into(), "fiscal_year".into()],
    };
    let mut seen = BTreeSet::new();
    for item in items {
        let Some(year) = item.get("fiscalYear").and_then(fiscal_year_from_value) else {
            continue;
        };
        seen.insert(year);

        let mut record = Record::new();
        record.insert("registered_no".into(), Cell::Text(registered_no.to_string()));
        record.insert("fiscal_year".into(), Cell::Integer(i64::from(year)));
        record.insert(
            "financial_date".into(),
            text_or_null(item.get("financialDate"))
                .and_then(|raw| normalize_thai_date(&raw))
                .into(),
        );
        record.insert("fs_type".into(), text_or_null(item.get("fsType")).into());
        for field in tables::REGISTRY_FINANCIAL_FIELDS {
            let amount = item
                .get(field.to_lower_camel_case().as_str())
                .and_then(normalize_amount);
            record.insert(field.to_string(), amount.into());
        }
        stamp(&mut record, now);
        store::write_record(conn, tables::COMPANY_FINANCIAL_YEAR, &record, &mode)?;
    }

    if seen.is_empty() {
        return Ok((Some(0), 0));
    }
    let stored_years = {
        let mut stmt = conn.prepare_cached(
            "SELECT fiscal_year FROM company_financial_year WHERE registered_no = ?1",
        )?;
        stmt.query_map([registered_no], |row| row.get::<_, i32>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
    };
    let mut removed = 0;
    for year in stored_years.into_iter().filter(|year| !seen.contains(year)) {
        removed += conn.execute(
            "DELETE FROM company_financial_year WHERE registered_no = ?1 AND fiscal_year = ?2",
            params![registered_no, year],
        )?;
    }
    Ok((Some(seen.len()), removed))
}

/// Active-roster lookup used by callers that only need current names.
pub fn active_people(
    conn: &Connection,
    kind: PersonKind,
    registered_no: &str,
) -> rusqlite::Result<Vec<PersonName>> {
    Ok(people(conn, kind, registered_no)?
        .into_iter()
        .filter(|row| row.lifecycle == Lifecycle::Active)
        .map(|row| row.name)
        .collect())
}

fn stamp(record: &mut Record, now: NaiveDateTime) {
    record.insert("created_at".into(), Cell::DateTime(now));
    record.insert("updated_at".into(), Cell::DateTime(now));
}

fn error_text(err: &RegistryError) -> String {
    match err {
        RegistryError::Write(failure) => failure.detail.clone(),
        RegistryError::Store(source) => source.to_string(),
        other => other.to_string(),
    }
}
