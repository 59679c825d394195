//! Detection of header rows that spreadsheet exports repeat between data rows.

use crate::data::Record;

/// Header labels that spreadsheet exports repeat inside the data, per canonical field.
#[derive(Debug, Clone, Copy)]
pub struct HeaderLabels(pub &'static [(&'static str, &'static [&'static str])]);

impl HeaderLabels {
    pub const NONE: HeaderLabels = HeaderLabels(&[]);

    pub fn looks_like_header(&self, record: &Record) -> bool {
        self.0.iter().any(|(field, labels)| {
            record
                .get(*field)
                .and_then(|cell| cell.as_text())
                .map(|text| {
                    let text = text.trim().to_lowercase();
                    labels.iter().any(|label| label.to_lowercase() == text)
                })
                .unwrap_or(false)
        })
    }
}
