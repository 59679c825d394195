//! Source-label dictionaries that rename vendor columns to canonical keys.

use std::collections::HashMap;

use serde_json::{Map, Value};
use thiserror::Error;

use crate::data::{Cell, Record};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("dictionary '{dictionary}' maps more than one source key to '{target}'")]
    DuplicateTarget {
        dictionary: &'static str,
        target: &'static str,
    },
    #[error("dictionary '{dictionary}' lists source key '{source_key}' twice")]
    DuplicateSource {
        dictionary: &'static str,
        source_key: &'static str,
    },
}

/// An ordered source-key to canonical-key table.
#[derive(Debug, Clone)]
pub struct FieldDictionary {
    name: &'static str,
    entries: &'static [(&'static str, &'static str)],
    lookup: HashMap<&'static str, &'static str>,
}

impl FieldDictionary {
    pub fn new(
        name: &'static str,
        entries: &'static [(&'static str, &'static str)],
    ) -> Result<Self, MappingError> {
        let mut lookup = HashMap::with_capacity(entries.len());
        let mut targets = HashMap::with_capacity(entries.len());
        for (source, target) in entries {
            if lookup.insert(*source, *target).is_some() {
                return Err(MappingError::DuplicateSource {
                    dictionary: name,
                    source_key: source,
                });
            }
            if targets.insert(*target, *source).is_some() {
                return Err(MappingError::DuplicateTarget {
                    dictionary: name,
                    target,
                });
            }
        }
        Ok(Self {
            name,
            entries,
            lookup,
        })
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn targets(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|(_, target)| *target)
    }

    /// Carries over every raw key the dictionary knows, matching keys after
    /// trimming surrounding whitespace. Values are not interpreted.
    pub fn map(&self, raw: &Map<String, Value>) -> Record {
        raw.iter()
            .filter_map(|(key, value)| {
                self.lookup
                    .get(key.trim())
                    .map(|target| (target.to_string(), Cell::from_json(value.clone())))
            })
            .collect()
    }
}
