//! Person-name parsing for director and shareholder rosters.

use itertools::Itertools;

// Any token that is a prefix of another must appear after it.
const HONORIFICS: &[&str] = &[
    "ผศ.ดร.",
    "รศ.ดร.",
    "ศ.ดร.",
    "นางสาว",
    "Mrs.",
    "ผศ.",
    "รศ.",
    "ดร.",
    "นาย",
    "นาง",
    "คุณ",
    "Mr.",
    "Ms.",
    "ศ.",
    "ดร",
];

const ZERO_WIDTH: &[char] = &['\u{200b}', '\u{200c}', '\u{200d}', '\u{feff}'];

/// Natural key of a person within one company.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PersonName {
    pub prefix: String,
    pub first_name: String,
    pub last_name: String,
}

impl PersonName {
    pub fn is_empty(&self) -> bool {
        self.prefix.is_empty() && self.first_name.is_empty() && self.last_name.is_empty()
    }
}

pub fn clean_name(raw: &str) -> String {
    raw.chars()
        .filter(|c| !ZERO_WIDTH.contains(c))
        .collect::<String>()
        .split_whitespace()
        .join(" ")
}

pub fn split_person_name(raw: &str) -> PersonName {
    let cleaned = clean_name(raw);
    let (prefix, rest) = HONORIFICS
        .iter()
        .find_map(|token| {
            cleaned
                .strip_prefix(token)
                .map(|rest| (token.to_string(), rest.trim_start()))
        })
        .unwrap_or((String::new(), cleaned.as_str()));
    let (first_name, last_name) = match rest.split_once(' ') {
        Some((first, last)) => (first.to_string(), last.trim().to_string()),
        None => (rest.to_string(), String::new()),
    };
    PersonName {
        prefix,
        first_name,
        last_name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(prefix: &str, first: &str, last: &str) -> PersonName {
        PersonName {
            prefix: prefix.to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
        }
    }

    #[test]
    fn longer_honorifics_win() {
        assert_eq!(
            split_person_name("ผศ.ดร.สมชาย ใจดี"),
            name("ผศ.ดร.", "สมชาย", "ใจดี")
        );
        assert_eq!(split_person_name("ดร.สมหญิง รักไทย"), name("ดร.", "สมหญิง", "รักไทย"));
        assert_eq!(split_person_name("ดร สมหญิง รักไทย"), name("ดร", "สมหญิง", "รักไทย"));
        assert_eq!(
            split_person_name("นางสาวมาลี ศรีสุข"),
            name("นางสาว", "มาลี", "ศรีสุข")
        );
        assert_eq!(split_person_name("Mrs. Jane Doe"), name("Mrs.", "Jane", "Doe"));
    }

    #[test]
    fn last_name_keeps_remaining_tokens() {
        assert_eq!(
            split_person_name("นาย  สมศักดิ์   ณ   อยุธยา"),
            name("นาย", "สมศักดิ์", "ณ อยุธยา")
        );
    }

    #[test]
    fn zero_width_characters_are_ignored() {
        assert_eq!(
            split_person_name("\u{feff}นาย\u{200b}สมชาย\u{a0}ใจดี"),
            name("นาย", "สมชาย", "ใจดี")
        );
    }

    #[test]
    fn names_without_honorific() {
        assert_eq!(split_person_name("John"), name("", "John", ""));
        assert!(split_person_name("  ").is_empty());
    }

    #[test]
    fn honorific_order_checks_specific_forms_first() {
        for (idx, token) in HONORIFICS.iter().enumerate() {
            for later in &HONORIFICS[idx + 1..] {
                assert!(
                    !later.starts_with(token),
                    "{later} must be listed before {token}"
                );
            }
        }
    }
}
