//! Per-field validation rules written in a compact pipe syntax such as
//! `nullable|string|max:50` or `required|integer`.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use itertools::Itertools;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::data::{Cell, Record};
use crate::normalize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rule {
    Required,
    Nullable,
    String,
    Max(u64),
    Numeric,
    Integer,
    Date,
    DateFormat(String),
}

impl FromStr for Rule {
    type Err = String;

    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match token.split_once(':') {
            Some((name, arg)) => (name.trim(), Some(arg.trim())),
            None => (token.trim(), None),
        };
        match (name, arg) {
            ("required", None) => Ok(Rule::Required),
            ("nullable", None) => Ok(Rule::Nullable),
            ("string", None) => Ok(Rule::String),
            ("numeric", None) => Ok(Rule::Numeric),
            ("integer", None) => Ok(Rule::Integer),
            ("date", None) => Ok(Rule::Date),
            ("max", Some(limit)) => limit.parse().map(Rule::Max).map_err(|_| token.to_string()),
            ("date_format", Some(fmt)) if !fmt.is_empty() => Ok(Rule::DateFormat(fmt.to_string())),
            _ => Err(token.to_string()),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid rule '{rule}' for field '{field}'")]
pub struct RuleParseError {
    pub field: String,
    pub rule: String,
}

/// Structured per-field validation messages.
#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("validation failed for {}", .0.keys().join(", "))]
pub struct FieldErrors(pub BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first_message(&self) -> Option<&str> {
        self.0.values().flatten().next().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRules {
    pub field: String,
    pub rules: Vec<Rule>,
}

impl FieldRules {
    fn has(&self, rule: &Rule) -> bool {
        self.rules.contains(rule)
    }

    fn check(&self, value: Option<Cell>) -> Result<Option<Cell>, Vec<String>> {
        let field = &self.field;
        let value = match value {
            None if self.has(&Rule::Required) => {
                return Err(vec![format!("The {field} field is required.")]);
            }
            None => return Ok(None),
            Some(Cell::Text(text)) if text.trim().is_empty() => Cell::Null,
            Some(cell) => cell,
        };

        if value.is_null() {
            if self.has(&Rule::Required) {
                return Err(vec![format!("The {field} field is required.")]);
            }
            if self.has(&Rule::Nullable) {
                return Ok(Some(Cell::Null));
            }
        }

        let mut messages = Vec::new();
        let mut cell = value;
        for rule in &self.rules {
            let coerced = match rule {
                Rule::String => match cell {
                    Cell::Text(_) => Ok(cell),
                    _ => Err(format!("The {field} field must be a string.")),
                },
                Rule::Numeric => as_decimal(&cell)
                    .map(Cell::Decimal)
                    .ok_or_else(|| format!("The {field} field must be a number.")),
                Rule::Integer => as_integer(&cell)
                    .map(Cell::Integer)
                    .ok_or_else(|| format!("The {field} field must be an integer.")),
                Rule::Date => match cell {
                    Cell::Date(_) | Cell::DateTime(_) => Ok(cell),
                    Cell::Text(ref text) => normalize::normalize_date(text)
                        .map(Cell::Date)
                        .ok_or_else(|| format!("The {field} field must be a valid date.")),
                    _ => Err(format!("The {field} field must be a valid date.")),
                },
                Rule::DateFormat(fmt) => match cell {
                    Cell::Date(_) | Cell::DateTime(_) => Ok(cell),
                    Cell::Text(ref text) => NaiveDate::parse_from_str(text.trim(), fmt)
                        .map(Cell::Date)
                        .map_err(|_| format!("The {field} field must match the format {fmt}.")),
                    _ => Err(format!("The {field} field must match the format {fmt}.")),
                },
                Rule::Required | Rule::Nullable | Rule::Max(_) => Ok(cell),
            };
            match coerced {
                Ok(next) => cell = next,
                Err(message) => {
                    messages.push(message);
                    return Err(messages);
                }
            }
        }

        for rule in &self.rules {
            if let Rule::Max(limit) = rule
                && let Some(message) = exceeds_max(field, &cell, *limit)
            {
                messages.push(message);
            }
        }
        if messages.is_empty() {
            Ok(Some(cell))
        } else {
            Err(messages)
        }
    }
}

/// An ordered set of field rules; validation keeps only the declared fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSet {
    fields: Vec<FieldRules>,
}

impl RuleSet {
    pub fn parse(specs: &[(&str, &str)]) -> Result<Self, RuleParseError> {
        let fields = specs
            .iter()
            .map(|(field, spec)| {
                let rules = spec
                    .split('|')
                    .filter(|token| !token.trim().is_empty())
                    .map(|token| {
                        token.parse::<Rule>().map_err(|rule| RuleParseError {
                            field: field.to_string(),
                            rule,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FieldRules {
                    field: field.to_string(),
                    rules,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { fields })
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.field.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn validate(&self, mut record: Record) -> Result<Record, FieldErrors> {
        let mut validated = Record::new();
        let mut errors = FieldErrors::default();
        for rules in &self.fields {
            match rules.check(record.remove(&rules.field)) {
                Ok(Some(cell)) => {
                    validated.insert(rules.field.clone(), cell);
                }
                Ok(None) => {}
                Err(messages) => {
                    errors.0.insert(rules.field.clone(), messages);
                }
            }
        }
        if errors.is_empty() {
            Ok(validated)
        } else {
            Err(errors)
        }
    }
}

fn as_decimal(cell: &Cell) -> Option<Decimal> {
    match cell {
        Cell::Integer(i) => Some(Decimal::from(*i)),
        Cell::Decimal(d) => Some(*d),
        Cell::Text(text) => {
            let trimmed = text.trim();
            Decimal::from_str(trimmed)
                .or_else(|_| Decimal::from_scientific(trimmed))
                .ok()
        }
        _ => None,
    }
}

fn as_integer(cell: &Cell) -> Option<i64> {
    match cell {
        Cell::Integer(i) => Some(*i),
        Cell::Decimal(d) if d.fract().is_zero() => i64::try_from(*d).ok(),
        Cell::Text(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn exceeds_max(field: &str, cell: &Cell, limit: u64) -> Option<String> {
    match cell {
        Cell::Text(text) if text.chars().count() as u64 > limit => Some(format!(
            "The {field} field must not be greater than {limit} characters."
        )),
        Cell::Integer(i) if *i > 0 && (*i as u64) > limit => {
            Some(format!("The {field} field must not be greater than {limit}."))
        }
        Cell::Decimal(d) if *d > Decimal::from(limit) => {
            Some(format!("The {field} field must not be greater than {limit}."))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(pairs: &[(&str, Cell)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn rules() -> RuleSet {
        RuleSet::parse(&[
            ("registration_id", "required|string|max:20"),
            ("supplier_id", "required|integer"),
            ("size", "nullable|string|max:10"),
            ("registered_capital", "nullable|numeric"),
            ("registration_date", "nullable|date"),
            ("invoice_date", "nullable|date_format:%Y-%m-%d"),
        ])
        .unwrap()
    }

    #[test]
    fn coerces_and_restricts_to_declared_fields() {
        let validated = rules()
            .validate(record(&[
                ("registration_id", Cell::Text("0105537086874".into())),
                ("supplier_id", Cell::Text("42".into())),
                ("registered_capital", Cell::Text("1000000.50".into())),
                ("registration_date", Cell::Text("15/03/2024".into())),
                ("undeclared", Cell::Text("dropped".into())),
            ]))
            .unwrap();
        assert_eq!(validated["supplier_id"], Cell::Integer(42));
        assert_eq!(
            validated["registered_capital"],
            Cell::Decimal(Decimal::from_str("1000000.50").unwrap())
        );
        assert_eq!(
            validated["registration_date"],
            Cell::Date(NaiveDate::from_ymd_opt(2024, 3, 15).unwrap())
        );
        assert!(!validated.contains_key("undeclared"));
        assert!(!validated.contains_key("size"));
    }

    #[test]
    fn reports_every_failing_field() {
        let errors = rules()
            .validate(record(&[
                ("registration_id", Cell::Integer(105)),
                ("size", Cell::Text("EXTRA-LARGE-SIZE".into())),
                ("invoice_date", Cell::Text("15/03/2024".into())),
            ]))
            .unwrap_err();
        assert_eq!(
            errors.0.keys().cloned().collect::<Vec<_>>(),
            vec!["invoice_date", "registration_id", "size", "supplier_id"]
        );
        assert!(
            errors
                .first_message()
                .is_some_and(|message| message.contains("invoice_date"))
        );
        assert_eq!(
            errors.0["supplier_id"],
            vec!["The supplier_id field is required."]
        );
        assert_eq!(
            errors.0["size"],
            vec!["The size field must not be greater than 10 characters."]
        );
    }

    #[test]
    fn nullable_accepts_null_and_blank() {
        let set = RuleSet::parse(&[("status", "nullable|string|max:50")]).unwrap();
        let validated = set
            .validate(record(&[("status", Cell::Text("  ".into()))]))
            .unwrap();
        assert_eq!(validated["status"], Cell::Null);
    }

    #[test]
    fn unknown_rule_is_a_parse_error() {
        let err = RuleSet::parse(&[("amount", "nullable|money")]).unwrap_err();
        assert_eq!(err.rule, "money");
        assert_eq!(err.field, "amount");
    }
}
