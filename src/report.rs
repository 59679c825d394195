//! Read-side reshaping of the three financial statement tables.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rusqlite::Connection;
use rusqlite::types::ValueRef;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::api::ApiResponse;
use crate::normalize::normalize_identifier;
use crate::store::quote_ident;
use crate::tables::{self, BALANCE_FIELDS, INCOME_FIELDS, RATIO_FIELDS};

pub const MIN_YEAR: i32 = 1990;
pub const MAX_YEAR: i32 = 2100;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{10,15}$").expect("static pattern"));

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("no financial data for {tax_id}")]
    NotFound { tax_id: String },
    #[error("reading financial statements")]
    Store(#[from] rusqlite::Error),
}

/// One statement domain: where it lives and which fields it exposes, in order.
#[derive(Debug, Clone, Copy)]
struct Domain {
    table: &'static str,
    fields: &'static [&'static str],
}

const BALANCE: Domain = Domain {
    table: tables::BALANCE_SHEET,
    fields: BALANCE_FIELDS,
};
const INCOME: Domain = Domain {
    table: tables::INCOME_STATEMENT,
    fields: INCOME_FIELDS,
};
const RATIOS: Domain = Domain {
    table: tables::FINANCIAL_RATIOS,
    fields: RATIO_FIELDS,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialView {
    pub tax_id: String,
    pub fiscal_year: i32,
    pub balance: Option<Map<String, Value>>,
    pub income: Option<Map<String, Value>>,
    pub ratios: Option<Map<String, Value>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinancialRangeView {
    pub tax_id: String,
    pub from: i32,
    pub to: i32,
    /// Keyed by fiscal year.
    pub balance: BTreeMap<String, Map<String, Value>>,
    pub income: BTreeMap<String, Map<String, Value>>,
    pub ratios: BTreeMap<String, Map<String, Value>>,
}

/// Two-decimal text for any stored number; text that is not a number passes
/// through unchanged.
pub fn decimal_text(value: ValueRef<'_>) -> Value {
    let decimal = match value {
        ValueRef::Null => return Value::Null,
        ValueRef::Integer(i) => Some(Decimal::from(i)),
        ValueRef::Real(f) => Decimal::from_f64_retain(f),
        ValueRef::Text(bytes) => {
            let text = String::from_utf8_lossy(bytes);
            match Decimal::from_str(text.trim()) {
                Ok(decimal) => Some(decimal),
                Err(_) => return Value::String(text.into_owned()),
            }
        }
        ValueRef::Blob(_) => None,
    };
    decimal.map_or(Value::Null, |d| {
        Value::String(format!("{:.2}", d.round_dp(2)))
    })
}

fn fetch(
    conn: &Connection,
    domain: Domain,
    tax_id: &str,
    from: i32,
    to: i32,
) -> rusqlite::Result<Vec<(i32, Map<String, Value>)>> {
    let columns = domain
        .fields
        .iter()
        .map(|field| quote_ident(field))
        .collect::<Vec<_>>()
        .join(", ");
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT fiscal_year, {columns} FROM {} \
         WHERE tax_id = ?1 AND fiscal_year BETWEEN ?2 AND ?3 ORDER BY fiscal_year",
        quote_ident(domain.table)
    ))?;
    let rows = stmt.query_map(rusqlite::params![tax_id, from, to], |row| {
        let year: i32 = row.get(0)?;
        let mut projected = Map::with_capacity(domain.fields.len());
        for (idx, field) in domain.fields.iter().enumerate() {
            projected.insert(field.to_string(), decimal_text(row.get_ref(idx + 1)?));
        }
        Ok((year, projected))
    })?;
    rows.collect()
}

pub fn financials_for_year(
    conn: &Connection,
    tax_id: &str,
    year: i32,
) -> Result<FinancialView, ReadError> {
    let first = |domain| -> rusqlite::Result<Option<Map<String, Value>>> {
        Ok(fetch(conn, domain, tax_id, year, year)?
            .into_iter()
            .next()
            .map(|(_, row)| row))
    };
    let view = FinancialView {
        tax_id: tax_id.to_string(),
        fiscal_year: year,
        balance: first(BALANCE)?,
        income: first(INCOME)?,
        ratios: first(RATIOS)?,
    };
    if view.balance.is_none() && view.income.is_none() && view.ratios.is_none() {
        return Err(ReadError::NotFound {
            tax_id: tax_id.to_string(),
        });
    }
    Ok(view)
}

pub fn financials_for_range(
    conn: &Connection,
    tax_id: &str,
    from: i32,
    to: i32,
) -> Result<FinancialRangeView, ReadError> {
    let by_year = |domain| -> rusqlite::Result<BTreeMap<String, Map<String, Value>>> {
        Ok(fetch(conn, domain, tax_id, from, to)?
            .into_iter()
            .map(|(year, row)| (year.to_string(), row))
            .collect())
    };
    let view = FinancialRangeView {
        tax_id: tax_id.to_string(),
        from,
        to,
        balance: by_year(BALANCE)?,
        income: by_year(INCOME)?,
        ratios: by_year(RATIOS)?,
    };
    if view.balance.is_empty() && view.income.is_empty() && view.ratios.is_empty() {
        return Err(ReadError::NotFound {
            tax_id: tax_id.to_string(),
        });
    }
    Ok(view)
}

fn check_identifier(tax_id: &str, messages: &mut BTreeMap<&'static str, Vec<String>>) {
    if !IDENTIFIER.is_match(tax_id) {
        messages
            .entry("tax_id")
            .or_default()
            .push("The tax_id must be 10 to 15 digits.".to_string());
    }
}

fn check_year(field: &'static str, year: i64, messages: &mut BTreeMap<&'static str, Vec<String>>) {
    if !(i64::from(MIN_YEAR)..=i64::from(MAX_YEAR)).contains(&year) {
        messages
            .entry(field)
            .or_default()
            .push(format!("The {field} must be between {MIN_YEAR} and {MAX_YEAR}."));
    }
}

fn respond<T: Serialize>(result: Result<T, ReadError>) -> ApiResponse {
    match result {
        Ok(view) => match serde_json::to_value(view) {
            Ok(data) => ApiResponse::new(200, json!({ "success": true, "data": data })),
            Err(err) => ApiResponse::server_error(err.to_string()),
        },
        Err(err @ ReadError::NotFound { .. }) => ApiResponse::not_found(&err.to_string()),
        Err(err) => {
            log::error!("Financial read failed: {err}");
            ApiResponse::server_error(err.to_string())
        }
    }
}

/// `GET .../{tax_id}/{year}`: 422 on bad input, 404 when no domain has data.
///
/// Statement rows are keyed by the 13-digit normalized identifier, so the
/// path identifier is normalized the same way before the lookup.
pub fn year_endpoint(conn: &Connection, tax_id: &str, year: i64) -> ApiResponse {
    let mut messages = BTreeMap::new();
    check_identifier(tax_id, &mut messages);
    check_year("year", year, &mut messages);
    if !messages.is_empty() {
        return ApiResponse::validation_failed(messages);
    }
    let tax_id = normalize_identifier(tax_id);
    respond(financials_for_year(conn, &tax_id, year as i32))
}

/// `GET .../{tax_id}?from=&to=`.
pub fn range_endpoint(conn: &Connection, tax_id: &str, from: i64, to: i64) -> ApiResponse {
    let mut messages = BTreeMap::new();
    check_identifier(tax_id, &mut messages);
    check_year("from", from, &mut messages);
    check_year("to", to, &mut messages);
    if from > to {
        messages
            .entry("to")
            .or_default()
            .push("The to year must not be before the from year.".to_string());
    }
    if !messages.is_empty() {
        return ApiResponse::validation_failed(messages);
    }
    let tax_id = normalize_identifier(tax_id);
    respond(financials_for_range(conn, &tax_id, from as i32, to as i32))
}
