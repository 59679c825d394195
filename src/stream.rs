//! Incremental traversal of a JSON document down to its row arrays.
//!
//! The document is walked with a `DeserializeSeed` that follows an RFC 6901
//! pointer. Values off the path are skipped with `IgnoredAny`; elements of the
//! target array are decoded one at a time and handed to a callback, so memory
//! use is bounded by the largest single element rather than the file.
//!
//! A `*` token matches every member at that level, so `/sheets/*/rows` visits
//! the rows of each sheet in document order. Containers below a wildcard that
//! do not have the expected shape are skipped.

use std::fmt;
use std::io::Read;
use std::ops::ControlFlow;

use serde::de::{self, DeserializeSeed, IgnoredAny, MapAccess, SeqAccess, Visitor};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::data::RawElement;

pub const WILDCARD: &str = "*";

/// Root-level members captured during a walk, keyed by member name.
pub type RootValues = Map<String, Value>;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("invalid JSON pointer '{0}'")]
    InvalidPointer(String),
    #[error("JSON pointer '{0}' does not resolve to a value")]
    PointerNotFound(String),
    #[error("JSON pointer '{0}' does not resolve to an array")]
    NotAnArray(String),
    #[error("stream stopped by the consumer after {elements} element(s)")]
    Stopped { elements: usize },
    #[error("malformed JSON after {elements} element(s)")]
    Syntax {
        elements: usize,
        #[source]
        source: serde_json::Error,
    },
}

impl StreamError {
    /// Number of elements delivered before the error, when any were.
    pub fn elements_delivered(&self) -> usize {
        match self {
            StreamError::Stopped { elements } | StreamError::Syntax { elements, .. } => *elements,
            _ => 0,
        }
    }
}

/// Outcome of a completed walk.
#[derive(Debug, Default)]
pub struct Walked {
    pub elements: usize,
    /// Every captured root member, including ones that follow the rows.
    pub root: RootValues,
}

pub fn parse_pointer(pointer: &str) -> Result<Vec<String>, StreamError> {
    if pointer.is_empty() {
        return Ok(Vec::new());
    }
    let Some(rest) = pointer.strip_prefix('/') else {
        return Err(StreamError::InvalidPointer(pointer.to_string()));
    };
    Ok(rest
        .split('/')
        .map(|token| token.replace("~1", "/").replace("~0", "~"))
        .collect())
}

/// Feeds every element of the array at `pointer` to `on_element` and returns
/// how many were delivered.
pub fn for_each_element<R, F>(reader: R, pointer: &str, mut on_element: F) -> Result<usize, StreamError>
where
    R: Read,
    F: FnMut(RawElement) -> ControlFlow<()>,
{
    for_each_element_with_root(reader, pointer, &[], |element, _| on_element(element))
        .map(|walked| walked.elements)
}

/// Like [`for_each_element`], but also captures the root-level members named
/// in `capture`. Each element is handed over together with the members read
/// so far; members that appear after the rows only show up in [`Walked`].
pub fn for_each_element_with_root<R, F>(
    reader: R,
    pointer: &str,
    capture: &[&str],
    mut on_element: F,
) -> Result<Walked, StreamError>
where
    R: Read,
    F: FnMut(RawElement, &RootValues) -> ControlFlow<()>,
{
    let path = parse_pointer(pointer)?;
    let mut state = WalkState::default();
    let mut de = serde_json::Deserializer::from_reader(reader);
    let result = Walk {
        path: &path,
        capture,
        lenient: false,
        on_element: &mut on_element,
        state: &mut state,
    }
    .deserialize(&mut de)
    .and_then(|()| de.end());

    match result {
        Ok(()) if state.wrong_shape => Err(StreamError::NotAnArray(pointer.to_string())),
        Ok(()) if !state.found => Err(StreamError::PointerNotFound(pointer.to_string())),
        Ok(()) => Ok(Walked {
            elements: state.elements,
            root: state.root,
        }),
        Err(_) if state.stopped => Err(StreamError::Stopped {
            elements: state.elements,
        }),
        Err(source) => Err(StreamError::Syntax {
            elements: state.elements,
            source,
        }),
    }
}

#[derive(Debug, Default)]
struct WalkState {
    found: bool,
    wrong_shape: bool,
    stopped: bool,
    elements: usize,
    root: RootValues,
}

struct Walk<'a, F> {
    path: &'a [String],
    /// Root members to keep; empty below the root.
    capture: &'a [&'a str],
    /// Set below a wildcard, where a mismatched shape is skipped.
    lenient: bool,
    on_element: &'a mut F,
    state: &'a mut WalkState,
}

impl<F> Walk<'_, F> {
    fn scalar<E>(self) -> Result<(), E> {
        if self.path.is_empty() && !self.lenient {
            self.state.wrong_shape = true;
        }
        Ok(())
    }
}

impl<'de, F> DeserializeSeed<'de> for Walk<'_, F>
where
    F: FnMut(RawElement, &RootValues) -> ControlFlow<()>,
{
    type Value = ();

    fn deserialize<D>(self, deserializer: D) -> Result<(), D::Error>
    where
        D: de::Deserializer<'de>,
    {
        deserializer.deserialize_any(self)
    }
}

impl<'de, F> Visitor<'de> for Walk<'_, F>
where
    F: FnMut(RawElement, &RootValues) -> ControlFlow<()>,
{
    type Value = ();

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a JSON document containing a row array")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<(), A::Error>
    where
        A: SeqAccess<'de>,
    {
        let Walk {
            path,
            lenient,
            on_element,
            state,
            ..
        } = self;

        let Some((head, tail)) = path.split_first() else {
            state.found = true;
            while let Some(value) = seq.next_element::<Value>()? {
                state.elements += 1;
                if on_element(RawElement::from(value), &state.root).is_break() {
                    state.stopped = true;
                    return Err(de::Error::custom("stopped by consumer"));
                }
            }
            return Ok(());
        };

        let wildcard = head == WILDCARD;
        if wildcard {
            state.found = true;
        }
        let wanted = head.parse::<usize>().ok();
        let mut index = 0usize;
        loop {
            let more = if wildcard || Some(index) == wanted {
                seq.next_element_seed(Walk {
                    path: tail,
                    capture: &[],
                    lenient: lenient || wildcard,
                    on_element: &mut *on_element,
                    state: &mut *state,
                })?
                .is_some()
            } else {
                seq.next_element::<IgnoredAny>()?.is_some()
            };
            if !more {
                return Ok(());
            }
            index += 1;
        }
    }

    fn visit_map<A>(self, mut map: A) -> Result<(), A::Error>
    where
        A: MapAccess<'de>,
    {
        let Walk {
            path,
            capture,
            lenient,
            on_element,
            state,
        } = self;

        let Some((head, tail)) = path.split_first() else {
            if !lenient {
                state.wrong_shape = true;
            }
            while map.next_entry::<IgnoredAny, IgnoredAny>()?.is_some() {}
            return Ok(());
        };

        let wildcard = head == WILDCARD;
        if wildcard {
            state.found = true;
        }
        let mut visited = false;
        while let Some(key) = map.next_key::<String>()? {
            if wildcard || (!visited && key == *head) {
                visited = true;
                map.next_value_seed(Walk {
                    path: tail,
                    capture: &[],
                    lenient: lenient || wildcard,
                    on_element: &mut *on_element,
                    state: &mut *state,
                })?;
            } else if capture.contains(&key.as_str()) {
                let value = map.next_value::<Value>()?;
                state.root.insert(key, value);
            } else {
                map.next_value::<IgnoredAny>()?;
            }
        }
        Ok(())
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<(), E> {
        self.scalar()
    }

    fn visit_i64<E: de::Error>(self, _: i64) -> Result<(), E> {
        self.scalar()
    }

    fn visit_u64<E: de::Error>(self, _: u64) -> Result<(), E> {
        self.scalar()
    }

    fn visit_f64<E: de::Error>(self, _: f64) -> Result<(), E> {
        self.scalar()
    }

    fn visit_str<E: de::Error>(self, _: &str) -> Result<(), E> {
        self.scalar()
    }

    fn visit_unit<E: de::Error>(self) -> Result<(), E> {
        self.scalar()
    }
}
