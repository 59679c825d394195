//! SQLite access: connection setup, generic row writes and write-failure
//! classification.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use itertools::Itertools;
use log::debug;
use rusqlite::{Connection, ErrorCode, ffi, params_from_iter};
use serde::Serialize;
use thiserror::Error;

use crate::data::{Cell, Record};

pub fn is_safe_ident(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn open(path: &Path, busy_timeout: Duration) -> Result<Connection> {
    let conn =
        Connection::open(path).with_context(|| format!("Opening database {path:?}"))?;
    apply_pragmas(&conn, busy_timeout)?;
    debug!("Opened database {path:?}");
    Ok(conn)
}

fn apply_pragmas(conn: &Connection, busy_timeout: Duration) -> Result<()> {
    conn.busy_timeout(busy_timeout)
        .context("Setting busy timeout")?;
    let _mode: String = conn
        .query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))
        .context("Enabling WAL journal")?;
    conn.execute_batch("PRAGMA synchronous = NORMAL;")
        .context("Setting synchronous mode")?;
    Ok(())
}

/// How a record reaches its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteMode {
    Insert,
    /// `INSERT .. ON CONFLICT (keys) DO UPDATE`; `created_at` is never overwritten.
    Upsert { keys: Vec<String> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteClass {
    DuplicateKey,
    NotNullViolation,
    DbError,
}

/// A classified store error for one row.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{detail}")]
pub struct WriteFailure {
    pub class: WriteClass,
    pub detail: String,
    /// SQLite extended result code, when the store reported one.
    pub code: Option<i32>,
}

impl WriteFailure {
    pub fn classify(err: &rusqlite::Error) -> Self {
        let detail = err.to_string();
        match err {
            rusqlite::Error::SqliteFailure(failure, _) => {
                let class = match (failure.code, failure.extended_code) {
                    (
                        ErrorCode::ConstraintViolation,
                        ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY,
                    ) => WriteClass::DuplicateKey,
                    (ErrorCode::ConstraintViolation, ffi::SQLITE_CONSTRAINT_NOTNULL) => {
                        WriteClass::NotNullViolation
                    }
                    _ => WriteClass::DbError,
                };
                Self {
                    class,
                    detail,
                    code: Some(failure.extended_code),
                }
            }
            _ => Self {
                class: WriteClass::DbError,
                detail,
                code: None,
            },
        }
    }
}

pub fn insert_sql(table: &str, columns: &[&str]) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_ident(table),
        columns.iter().map(|c| quote_ident(c)).join(", "),
        (1..=columns.len()).map(|i| format!("?{i}")).join(", ")
    )
}

pub fn upsert_sql(table: &str, columns: &[&str], keys: &[String]) -> String {
    let updates = columns
        .iter()
        .filter(|c| !keys.iter().any(|k| k == *c) && **c != "created_at")
        .map(|c| format!("{col} = excluded.{col}", col = quote_ident(c)))
        .join(", ");
    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {updates}")
    };
    format!(
        "{} ON CONFLICT ({}) {action}",
        insert_sql(table, columns),
        keys.iter().map(|k| quote_ident(k)).join(", ")
    )
}

/// SQLite treats NULLs as distinct, so a null key would never hit `ON CONFLICT`.
fn null_match_key(record: &Record, keys: &[String]) -> Option<WriteFailure> {
    let key = keys
        .iter()
        .find(|key| record.get(key.as_str()).is_none_or(Cell::is_null))?;
    Some(WriteFailure {
        class: WriteClass::NotNullViolation,
        detail: format!("match key column {key} is null"),
        code: None,
    })
}

/// Writes one record through the connection's prepared-statement cache.
pub fn write_record(
    conn: &Connection,
    table: &str,
    record: &Record,
    mode: &WriteMode,
) -> Result<usize, WriteFailure> {
    if let WriteMode::Upsert { keys } = mode
        && let Some(failure) = null_match_key(record, keys)
    {
        return Err(failure);
    }
    let columns = record.keys().map(String::as_str).collect::<Vec<_>>();
    let sql = match mode {
        WriteMode::Insert => insert_sql(table, &columns),
        WriteMode::Upsert { keys } => upsert_sql(table, &columns, keys),
    };
    let mut stmt = conn
        .prepare_cached(&sql)
        .map_err(|err| WriteFailure::classify(&err))?;
    stmt.execute(params_from_iter(record.values()))
        .map_err(|err| WriteFailure::classify(&err))
}

pub fn parent_exists(conn: &Connection, table: &str, column: &str, value: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        &format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = ?1)",
            quote_ident(table),
            quote_ident(column)
        ),
        [value],
        |row| row.get(0),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (
                id INTEGER PRIMARY KEY,
                code TEXT NOT NULL,
                name TEXT,
                created_at TEXT,
                updated_at TEXT,
                UNIQUE (code)
            );",
        )
        .unwrap();
        conn
    }

    fn record(pairs: &[(&str, Cell)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn duplicate_and_not_null_are_told_apart() {
        let conn = connection();
        let row = record(&[("code", Cell::Text("A".into()))]);
        write_record(&conn, "t", &row, &WriteMode::Insert).unwrap();
        let dup = write_record(&conn, "t", &row, &WriteMode::Insert).unwrap_err();
        assert_eq!(dup.class, WriteClass::DuplicateKey);
        let missing = write_record(&conn, "t", &record(&[("code", Cell::Null)]), &WriteMode::Insert)
            .unwrap_err();
        assert_eq!(missing.class, WriteClass::NotNullViolation);
        let unknown = write_record(&conn, "t", &record(&[("nope", Cell::Null)]), &WriteMode::Insert)
            .unwrap_err();
        assert_eq!(unknown.class, WriteClass::DbError);
    }

    #[test]
    fn upsert_keeps_created_at() {
        let conn = connection();
        let mode = WriteMode::Upsert {
            keys: vec!["code".into()],
        };
        let first = record(&[
            ("code", Cell::Text("A".into())),
            ("name", Cell::Text("first".into())),
            ("created_at", Cell::Text("2024-01-01 00:00:00".into())),
            ("updated_at", Cell::Text("2024-01-01 00:00:00".into())),
        ]);
        let mut second = first.clone();
        second.insert("name".into(), Cell::Text("second".into()));
        second.insert("created_at".into(), Cell::Text("2025-01-01 00:00:00".into()));
        write_record(&conn, "t", &first, &mode).unwrap();
        write_record(&conn, "t", &second, &mode).unwrap();
        let (count, name, created): (i64, String, String) = conn
            .query_row("SELECT COUNT(*), name, created_at FROM t", [], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?))
            })
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(name, "second");
        assert_eq!(created, "2024-01-01 00:00:00");
    }

    #[test]
    fn null_match_key_is_refused_before_writing() {
        let conn = connection();
        conn.execute_batch("CREATE TABLE u (code TEXT, name TEXT, UNIQUE (code));")
            .unwrap();
        let mode = WriteMode::Upsert {
            keys: vec!["code".into()],
        };
        let row = record(&[("code", Cell::Null), ("name", Cell::Text("x".into()))]);
        let failure = write_record(&conn, "u", &row, &mode).unwrap_err();
        assert_eq!(failure.class, WriteClass::NotNullViolation);
        assert!(failure.detail.contains("code"));
        let missing = record(&[("name", Cell::Text("y".into()))]);
        assert_eq!(
            write_record(&conn, "u", &missing, &mode).unwrap_err().class,
            WriteClass::NotNullViolation
        );
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM u", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 0);
    }

    #[test]
    fn identifiers_are_checked_and_quoted() {
        assert!(is_safe_ident("rm_detail_report"));
        assert!(!is_safe_ident("1table"));
        assert!(!is_safe_ident("bad name"));
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
