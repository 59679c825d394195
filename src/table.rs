//! Plain-text rendering of import summaries.

use std::borrow::Cow;
use std::fmt::Write as _;

use crate::financial::FinancialSummary;
use crate::import::ImportSummary;

pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|h| h.chars().count().max(3))
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(sanitize_cell(cell).chars().count());
        }
    }

    let mut output = String::new();
    let header = headers.iter().map(|h| Cow::Borrowed(*h)).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&header, &widths));
    let rule = widths.iter().map(|w| Cow::Owned("-".repeat(*w))).collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &widths));
    for row in rows {
        let cells = row.iter().map(|c| sanitize_cell(c)).collect::<Vec<_>>();
        let _ = writeln!(output, "{}", format_row(&cells, &widths));
    }
    output
}

fn format_row(values: &[Cow<'_, str>], widths: &[usize]) -> String {
    let line = values
        .iter()
        .zip(widths)
        .map(|(value, width)| format!("{value:<width$}"))
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn sanitize_cell(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}

/// Counters first, then the captured failure samples (if any).
pub fn render_import_summary(summary: &ImportSummary) -> String {
    let mut counters = vec![
        ("source", summary.source.clone()),
        ("table", summary.table.clone()),
        ("total", summary.total.to_string()),
        (
            if summary.dry_run { "would_insert" } else { "inserted" },
            summary.inserted.to_string(),
        ),
        ("failed", summary.failed.to_string()),
        ("failed_validation", summary.failed_validation.to_string()),
        ("failed_duplicate", summary.failed_duplicate.to_string()),
        ("failed_other", summary.failed_other.to_string()),
        ("failed_not_null", summary.failed_not_null.to_string()),
        ("skipped_header", summary.skipped_header.to_string()),
        (
            "day_month_swaps",
            summary.corrections.day_month_swaps.to_string(),
        ),
        ("batches_committed", summary.batches_committed.to_string()),
    ];
    if let Some(message) = &summary.stream_error {
        counters.push(("stream_error", message.clone()));
    }
    let rows = counters
        .into_iter()
        .map(|(name, value)| vec![name.to_string(), value])
        .collect::<Vec<_>>();
    let mut output = render_table(&["metric", "value"], &rows);

    if !summary.samples.is_empty() {
        let samples = summary
            .samples
            .iter()
            .map(|entry| {
                vec![
                    entry.row.to_string(),
                    serde_json::to_value(entry.reason)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default(),
                    entry.code.map(|c| c.to_string()).unwrap_or_default(),
                    entry.detail.clone(),
                ]
            })
            .collect::<Vec<_>>();
        output.push('\n');
        output.push_str(&render_table(&["row", "reason", "code", "detail"], &samples));
    }
    output
}

pub fn render_financial_summary(summary: &FinancialSummary) -> String {
    let rows = [
        ("files", summary.files),
        ("years", summary.years),
        ("columns", summary.columns),
        ("skipped_no_parent", summary.skipped_no_parent),
        ("skipped_bad_name", summary.skipped_bad_name),
        ("skipped_bad_json", summary.skipped_bad_json),
    ]
    .into_iter()
    .map(|(name, value)| vec![name.to_string(), value.to_string()])
    .collect::<Vec<_>>();
    render_table(&["metric", "value"], &rows)
}
