//! Live schema introspection and record restriction.

use std::collections::BTreeSet;

use rusqlite::Connection;
use thiserror::Error;

use crate::data::Record;
use crate::store::{is_safe_ident, quote_ident};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("'{0}' is not a valid table name")]
    InvalidName(String),
    #[error("table '{0}' does not exist or has no columns")]
    MissingTable(String),
    #[error("reading schema of '{table}'")]
    Introspection {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
}

/// Column set and unique keys of one destination table, read once per run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub table: String,
    columns: BTreeSet<String>,
    unique_keys: Vec<BTreeSet<String>>,
}

impl TableSchema {
    pub fn introspect(conn: &Connection, table: &str) -> Result<Self, SchemaError> {
        if !is_safe_ident(table) {
            return Err(SchemaError::InvalidName(table.to_string()));
        }
        let wrap = |source| SchemaError::Introspection {
            table: table.to_string(),
            source,
        };

        let mut columns = BTreeSet::new();
        let mut primary_key = Vec::new();
        let mut stmt = conn
            .prepare(&format!("PRAGMA table_info({})", quote_ident(table)))
            .map_err(wrap)?;
        let mut rows = stmt.query([]).map_err(wrap)?;
        while let Some(row) = rows.next().map_err(wrap)? {
            let name: String = row.get(1).map_err(wrap)?;
            let pk_position: i64 = row.get(5).map_err(wrap)?;
            if pk_position > 0 {
                primary_key.push(name.clone());
            }
            columns.insert(name);
        }
        if columns.is_empty() {
            return Err(SchemaError::MissingTable(table.to_string()));
        }

        let mut unique_keys = Vec::new();
        if !primary_key.is_empty() {
            unique_keys.push(primary_key.into_iter().collect());
        }
        let mut stmt = conn
            .prepare(&format!("PRAGMA index_list({})", quote_ident(table)))
            .map_err(wrap)?;
        let indexes = stmt
            .query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, i64>(2)?)))
            .map_err(wrap)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(wrap)?;
        for (index, unique) in indexes {
            if unique == 0 {
                continue;
            }
            let mut stmt = conn
                .prepare(&format!("PRAGMA index_info({})", quote_ident(&index)))
                .map_err(wrap)?;
            let key = stmt
                .query_map([], |row| row.get::<_, String>(2))
                .map_err(wrap)?
                .collect::<Result<BTreeSet<_>, _>>()
                .map_err(wrap)?;
            unique_keys.push(key);
        }

        Ok(Self {
            table: table.to_string(),
            columns,
            unique_keys,
        })
    }

    pub fn columns(&self) -> &BTreeSet<String> {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(column)
    }

    pub fn supports_timestamps(&self) -> bool {
        self.has_column("created_at") && self.has_column("updated_at")
    }

    /// True when `keys` is exactly the column set of a unique index.
    pub fn is_unique_key(&self, keys: &[String]) -> bool {
        let wanted: BTreeSet<String> = keys.iter().cloned().collect();
        !wanted.is_empty() && self.unique_keys.iter().any(|key| *key == wanted)
    }

    pub fn restrict(&self, record: Record) -> Record {
        restrict_to_schema(record, &self.columns)
    }
}

/// Drops keys the table does not have and values no scalar column can hold.
pub fn restrict_to_schema(record: Record, columns: &BTreeSet<String>) -> Record {
    record
        .into_iter()
        .filter(|(key, cell)| columns.contains(key) && !cell.is_composite())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Cell;
    use serde_json::json;

    fn sample_connection() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE invoices (
                id INTEGER PRIMARY KEY,
                invoice_no TEXT NOT NULL,
                supplier_code TEXT,
                amount DECIMAL(20,2),
                created_at TEXT,
                updated_at TEXT,
                UNIQUE (invoice_no, supplier_code)
            );",
        )
        .unwrap();
        conn
    }

    #[test]
    fn introspects_columns_and_unique_keys() {
        let schema = TableSchema::introspect(&sample_connection(), "invoices").unwrap();
        assert!(schema.has_column("amount"));
        assert!(schema.supports_timestamps());
        assert!(schema.is_unique_key(&["supplier_code".into(), "invoice_no".into()]));
        assert!(schema.is_unique_key(&["id".into()]));
        assert!(!schema.is_unique_key(&["invoice_no".into()]));
    }

    #[test]
    fn missing_table_is_an_error() {
        let err = TableSchema::introspect(&sample_connection(), "nowhere").unwrap_err();
        assert!(matches!(err, SchemaError::MissingTable(_)));
        let err = TableSchema::introspect(&sample_connection(), "x; DROP").unwrap_err();
        assert!(matches!(err, SchemaError::InvalidName(_)));
    }

    #[test]
    fn restrict_drops_unknown_and_composite_values() {
        let schema = TableSchema::introspect(&sample_connection(), "invoices").unwrap();
        let record: Record = [
            ("invoice_no", Cell::Text("INV-1".into())),
            ("amount", Cell::from_json(json!([1, 2]))),
            ("ghost", Cell::Integer(1)),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v))
        .collect();
        let restricted = schema.restrict(record);
        assert_eq!(restricted.keys().collect::<Vec<_>>(), vec!["invoice_no"]);
    }
}
