//! Pure value normalizers shared by every importer.
//!
//! Vendor exports mix ISO dates with day-first and month-first layouts,
//! Buddhist-era years, two-digit years, thousands separators and stray
//! currency symbols. Each function here accepts the raw text (or JSON value)
//! and returns a canonical typed value, or `None` when nothing usable is left.
//! None of them fail or panic.

use std::borrow::Cow;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use regex::{Captures, Regex};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::Value;

pub const IDENTIFIER_WIDTH: usize = 13;
const BUDDHIST_ERA_OFFSET: i32 = 543;
const BUDDHIST_ERA_THRESHOLD: i32 = 2400;

const NULL_TOKENS: &[&str] = &["", "-", "?", "null", "n/a"];

const DATE_FORMATS: &[&str] = &[
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%b %d, %Y",
    "%B %d, %Y",
];

// Date-time layouts that still identify a calendar date.
const DATE_WITH_TIME_FORMATS: &[&str] = &[
    "%d %b %Y %H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const ZONED_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%:z",
    "%Y-%m-%d %H:%M:%S%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%:z",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%d-%m-%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%d/%m/%Y %H:%M",
];

static ISO_DATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{2}-\d{2}$").expect("static pattern"));
static TWO_DIGIT_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{1,2})([./-])(\d{1,2})[./-](\d{2})$").expect("static pattern")
});
static FOUR_DIGIT_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("static pattern"));
static STRICT_DATETIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4})-(\d{2})-(\d{2}) (\d{2}):(\d{2}):(\d{2})$").expect("static pattern")
});
static SWAPPED_DATETIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4})-(\d{2})-(\d{2})[ T](\d{2}):(\d{2})(?::(\d{2}))?(?:\.\d+)?(?:Z|[+-]\d{2}:?\d{2})?$",
    )
    .expect("static pattern")
});
static TRAILING_ZERO_FRACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(-?\d+)\.0+$").expect("static pattern"));

/// Per-run auto-correction counters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Corrections {
    pub day_month_swaps: u64,
}

pub fn is_null_token(raw: &str) -> bool {
    let trimmed = raw.trim();
    NULL_TOKENS
        .iter()
        .any(|token| trimmed.eq_ignore_ascii_case(token))
}

/// Trims the value (treating no-break spaces as spaces) and maps `""` and `"?"`
/// to `None`.
pub fn null_if_empty(raw: &str) -> Option<String> {
    let cleaned = raw.replace('\u{a0}', " ");
    let trimmed = cleaned.trim();
    if trimmed.is_empty() || trimmed == "?" {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Like [`null_if_empty`] but for an arbitrary JSON value; numbers are rendered
/// as text, composites are dropped.
pub fn text_or_null(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => null_if_empty(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parses a calendar date from any supported layout.
pub fn normalize_date(raw: &str) -> Option<NaiveDate> {
    if is_null_token(raw) {
        return None;
    }
    let gregorian = to_gregorian_years(raw.trim());
    let text = expand_two_digit_year(&gregorian);
    let text = text.as_ref();

    if ISO_DATE.is_match(text)
        && let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d")
    {
        return plausible(date);
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return plausible(date);
        }
    }
    for fmt in DATE_WITH_TIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return plausible(dt.date());
        }
    }
    permissive_datetime(text).and_then(|dt| plausible(dt.date()))
}

/// Parses a date-time, repairing a transposed day and month when the month
/// slot holds a value above 12 and the day slot one that fits as a month.
pub fn normalize_datetime(raw: &str, corrections: &mut Corrections) -> Option<NaiveDateTime> {
    if is_null_token(raw) {
        return None;
    }
    let gregorian = to_gregorian_years(raw.trim());
    let text = gregorian.as_ref();

    if let Some(caps) = STRICT_DATETIME.captures(text)
        && let Some(parsed) = datetime_from_parts(&caps, corrections)
    {
        return Some(parsed);
    }

    for fmt in ZONED_DATETIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, fmt) {
            return Some(dt.naive_local());
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(dt);
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Some(date.and_time(NaiveTime::MIN));
        }
    }

    if let Some(caps) = SWAPPED_DATETIME.captures(text)
        && let Some(parsed) = datetime_from_parts(&caps, corrections)
    {
        return Some(parsed);
    }

    permissive_datetime(text)
        .or_else(|| normalize_date(text).map(|date| date.and_time(NaiveTime::MIN)))
}

/// Parses a monetary or ratio value. Strings are stripped to digits, dots,
/// commas and minus signs; commas are thousands separators and, when several
/// dots remain, only the last one is the decimal point.
pub fn normalize_amount(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(Decimal::from(i))
            } else {
                let text = n.to_string();
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .ok()
            }
        }
        Value::String(s) => normalize_amount_str(s),
        _ => None,
    }
}

pub fn normalize_amount_str(raw: &str) -> Option<Decimal> {
    let mut kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .filter(|c| *c != ',')
        .collect();
    if kept.matches('.').count() > 1
        && let Some(last) = kept.rfind('.')
    {
        let (head, tail) = kept.split_at(last);
        kept = format!("{}{}", head.replace('.', ""), tail);
    }
    if kept.is_empty() || kept == "-" || kept == "." || kept == "-." {
        return None;
    }
    Decimal::from_str(&kept).ok()
}

/// Reduces a registration or tax number to exactly 13 ASCII digits.
pub fn normalize_identifier(raw: &str) -> String {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    let start = digits.len().saturating_sub(IDENTIFIER_WIDTH);
    format!("{:0>width$}", &digits[start..], width = IDENTIFIER_WIDTH)
}

/// Converts a Buddhist-era year to Gregorian and discards implausible years.
pub fn normalize_fiscal_year(year: i64) -> Option<i32> {
    let year = i32::try_from(year).ok()?;
    let year = if year > BUDDHIST_ERA_THRESHOLD {
        year - BUDDHIST_ERA_OFFSET
    } else {
        year
    };
    (1000..=9999).contains(&year).then_some(year)
}

pub fn fiscal_year_from_value(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .and_then(normalize_fiscal_year),
        Value::String(s) => null_if_empty(s)
            .and_then(|s| s.parse::<i64>().ok())
            .and_then(normalize_fiscal_year),
        _ => None,
    }
}

/// Registry dates are always `dd/mm/yyyy`, usually with a Buddhist-era year.
pub fn normalize_thai_date(raw: &str) -> Option<NaiveDate> {
    let text = null_if_empty(raw)?;
    let mut parts = text.split('/').map(|part| part.trim().parse::<i32>().ok());
    let (Some(Some(day)), Some(Some(month)), Some(Some(year)), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    let year = normalize_fiscal_year(i64::from(year))?;
    NaiveDate::from_ymd_opt(year, u32::try_from(month).ok()?, u32::try_from(day).ok()?)
}

/// Splits a `"low - high"` band such as `"1,000,001 - 5,000,000"`.
pub fn parse_range(raw: &str) -> (Option<Decimal>, Option<Decimal>) {
    match raw.split_once(" - ") {
        Some((low, high)) => (normalize_amount_str(low), normalize_amount_str(high)),
        None => (normalize_amount_str(raw), None),
    }
}

/// `"12345.0"` becomes `"12345"`; any other text is returned trimmed.
pub fn strip_trailing_zero_fraction(raw: &str) -> String {
    let trimmed = raw.trim();
    match TRAILING_ZERO_FRACTION.captures(trimmed) {
        Some(caps) => caps[1].to_string(),
        None => trimmed.to_string(),
    }
}

fn to_gregorian_years(text: &str) -> Cow<'_, str> {
    FOUR_DIGIT_YEAR.replace_all(text, |caps: &Captures| {
        match caps[1].parse::<i32>() {
            Ok(year) if year > BUDDHIST_ERA_THRESHOLD => (year - BUDDHIST_ERA_OFFSET).to_string(),
            _ => caps[1].to_string(),
        }
    })
}

fn expand_two_digit_year(text: &str) -> Cow<'_, str> {
    match TWO_DIGIT_YEAR.captures(text) {
        Some(caps) => Cow::Owned(format!(
            "{}{sep}{}{sep}20{}",
            &caps[1],
            &caps[3],
            &caps[4],
            sep = &caps[2]
        )),
        None => Cow::Borrowed(text),
    }
}

fn datetime_from_parts(caps: &Captures, corrections: &mut Corrections) -> Option<NaiveDateTime> {
    let field = |idx: usize| -> Option<u32> {
        caps.get(idx)
            .map_or(Some(0), |m| m.as_str().parse().ok())
    };
    let year: i32 = caps.get(1)?.as_str().parse().ok()?;
    let mut month = field(2)?;
    let mut day = field(3)?;
    let (hour, minute, second) = (field(4)?, field(5)?, field(6)?);

    let swapped = month > 12 && (1..=12).contains(&day);
    if swapped {
        std::mem::swap(&mut month, &mut day);
    }
    let parsed = NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(hour, minute, second)?;
    if swapped {
        corrections.day_month_swaps += 1;
    }
    Some(parsed)
}

fn permissive_datetime(text: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.naive_local());
    }
    if text.len() == 8 && text.chars().all(|c| c.is_ascii_digit()) {
        return NaiveDate::parse_from_str(text, "%Y%m%d")
            .ok()
            .map(|date| date.and_time(NaiveTime::MIN));
    }
    None
}

fn plausible(date: NaiveDate) -> Option<NaiveDate> {
    (1000..=9999).contains(&date.year()).then_some(date)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn dates_accept_common_layouts() {
        assert_eq!(normalize_date("2024-03-15"), Some(ymd(2024, 3, 15)));
        assert_eq!(normalize_date("15/03/2024"), Some(ymd(2024, 3, 15)));
        assert_eq!(normalize_date("15.03.2024"), Some(ymd(2024, 3, 15)));
        assert_eq!(normalize_date("2024/03/15"), Some(ymd(2024, 3, 15)));
        assert_eq!(normalize_date("03/15/2024"), Some(ymd(2024, 3, 15)));
        assert_eq!(normalize_date("15 Mar 2024"), Some(ymd(2024, 3, 15)));
    }

    #[test]
    fn two_digit_years_land_in_this_century() {
        assert_eq!(normalize_date("05-01-24"), Some(ymd(2024, 1, 5)));
        assert_eq!(normalize_date("5/1/99"), Some(ymd(2099, 1, 5)));
    }

    #[test]
    fn buddhist_era_years_are_converted() {
        assert_eq!(normalize_date("15/03/2567"), Some(ymd(2024, 3, 15)));
        assert_eq!(normalize_date("2566-12-31"), Some(ymd(2023, 12, 31)));
        // 2567 BE is a leap year in the Gregorian calendar.
        assert_eq!(normalize_date("29/02/2567"), Some(ymd(2024, 2, 29)));
    }

    #[test]
    fn null_tokens_and_garbage_yield_none() {
        for raw in ["", " ", "-", "?", "NULL", "N/A", "not a date"] {
            assert_eq!(normalize_date(raw), None, "{raw:?}");
        }
    }

    #[test]
    fn datetime_swaps_transposed_day_and_month() {
        let mut corrections = Corrections::default();
        let parsed = normalize_datetime("2024-15-03 10:20:30", &mut corrections);
        assert_eq!(
            parsed,
            Some(ymd(2024, 3, 15).and_hms_opt(10, 20, 30).unwrap())
        );
        assert_eq!(corrections.day_month_swaps, 1);
    }

    #[test]
    fn datetime_swap_hunt_tolerates_t_separator_and_missing_seconds() {
        let mut corrections = Corrections::default();
        let parsed = normalize_datetime("2024-25-12T08:05", &mut corrections);
        assert_eq!(parsed, Some(ymd(2024, 12, 25).and_hms_opt(8, 5, 0).unwrap()));
        assert_eq!(corrections.day_month_swaps, 1);
    }

    #[test]
    fn datetime_without_swap_leaves_counter_alone() {
        let mut corrections = Corrections::default();
        assert_eq!(
            normalize_datetime("2024-03-15 23:59:59", &mut corrections),
            Some(ymd(2024, 3, 15).and_hms_opt(23, 59, 59).unwrap())
        );
        assert_eq!(
            normalize_datetime("15/03/2024 08:00", &mut corrections),
            Some(ymd(2024, 3, 15).and_hms_opt(8, 0, 0).unwrap())
        );
        assert_eq!(
            normalize_datetime("2024-03-15T08:00:00+07:00", &mut corrections),
            Some(ymd(2024, 3, 15).and_hms_opt(8, 0, 0).unwrap())
        );
        assert_eq!(corrections.day_month_swaps, 0);
    }

    #[test]
    fn datetime_rejects_impossible_values() {
        let mut corrections = Corrections::default();
        assert_eq!(normalize_datetime("2024-15-13 10:00:00", &mut corrections), None);
        assert_eq!(normalize_datetime("2024-02-30 10:00:00", &mut corrections), None);
        assert_eq!(normalize_datetime("2024-02-10 24:00:00", &mut corrections), None);
        assert_eq!(corrections.day_month_swaps, 0);
    }

    #[test]
    fn amounts_follow_separator_rules() {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        assert_eq!(normalize_amount_str("1,234.56"), Some(d("1234.56")));
        assert_eq!(normalize_amount_str("12.34.56"), Some(d("1234.56")));
        assert_eq!(normalize_amount_str("฿ -2,500"), Some(d("-2500")));
        assert_eq!(normalize_amount_str(""), None);
        assert_eq!(normalize_amount_str("-"), None);
        assert_eq!(normalize_amount_str("abc"), None);
        assert_eq!(normalize_amount(&json!(1500)), Some(d("1500")));
        assert_eq!(normalize_amount(&json!(12.75)), Some(d("12.75")));
        assert_eq!(normalize_amount(&json!(null)), None);
    }

    #[test]
    fn identifiers_are_thirteen_digits() {
        assert_eq!(normalize_identifier("0-1055-37086-87-4"), "0105537086874");
        assert_eq!(normalize_identifier("105537086874"), "0105537086874");
        assert_eq!(normalize_identifier("99990105537086874"), "0105537086874");
        assert_eq!(normalize_identifier(""), "0000000000000");
    }

    #[test]
    fn fiscal_years_convert_and_reject() {
        assert_eq!(normalize_fiscal_year(2566), Some(2023));
        assert_eq!(normalize_fiscal_year(2023), Some(2023));
        assert_eq!(normalize_fiscal_year(999), None);
        assert_eq!(fiscal_year_from_value(&json!("2565")), Some(2022));
        assert_eq!(fiscal_year_from_value(&json!("")), None);
    }

    #[test]
    fn ranges_and_document_numbers() {
        let d = |s: &str| Decimal::from_str(s).unwrap();
        assert_eq!(
            parse_range("1,000,001 - 5,000,000"),
            (Some(d("1000001")), Some(d("5000000")))
        );
        assert_eq!(parse_range("30"), (Some(d("30")), None));
        assert_eq!(strip_trailing_zero_fraction("5100012345.0"), "5100012345");
        assert_eq!(strip_trailing_zero_fraction("INV-01.0A"), "INV-01.0A");
    }

    #[test]
    fn thai_registry_dates() {
        assert_eq!(
            normalize_thai_date("01/07/2536"),
            NaiveDate::from_ymd_opt(1993, 7, 1)
        );
        assert_eq!(
            normalize_thai_date("15/3/2020"),
            NaiveDate::from_ymd_opt(2020, 3, 15)
        );
        assert_eq!(normalize_thai_date("31/02/2566"), None);
        assert_eq!(normalize_thai_date("2566-01-01"), None);
        assert_eq!(normalize_thai_date(""), None);
    }

    #[test]
    fn null_if_empty_handles_no_break_space() {
        assert_eq!(null_if_empty("\u{a0} "), None);
        assert_eq!(null_if_empty("?"), None);
        assert_eq!(null_if_empty(" ACME "), Some("ACME".to_string()));
    }
}
