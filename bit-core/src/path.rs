//! Dot-path addressing into the state tree
//!
//! Paths are dot-delimited (`"consolidation.vip.selectedId"`). Bracket
//! indices are accepted as well (`"items[0].name"`, `"map['key']"`), and
//! both forms produce the same segment list.
//!
//! Numeric segments index into arrays and act as plain keys on objects.
//! When a write needs a container that does not exist yet, a numeric
//! segment creates an array and anything else creates an object.
//!
//! A write may pad an array with at most [`MAX_ARRAY_PAD`] `null` slots.
//! An index further out than that is kept as an object key by the lenient
//! writer and refused by the strict one.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::{BitError, Result};
use crate::StateTree;

/// Most `null` slots a single write may append to reach its index.
pub const MAX_ARRAY_PAD: usize = 1024;

/// A parsed path into a [`StateTree`].
///
/// An empty path addresses the root of the tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StatePath {
    raw: String,
    segments: Vec<String>,
}

impl StatePath {
    /// Parse a path string. Empty segments (`"a..b"`) are ignored.
    pub fn parse(raw: &str) -> Self {
        let mut segments = Vec::new();
        let mut current = String::new();
        let mut chars = raw.chars();

        while let Some(ch) = chars.next() {
            match ch {
                '.' => flush(&mut current, &mut segments),
                '[' => {
                    flush(&mut current, &mut segments);
                    let mut inner = String::new();
                    for c in chars.by_ref() {
                        if c == ']' {
                            break;
                        }
                        inner.push(c);
                    }
                    let inner = inner.trim().trim_matches(|c| c == '"' || c == '\'');
                    if !inner.is_empty() {
                        segments.push(inner.to_string());
                    }
                }
                _ => current.push(ch),
            }
        }
        flush(&mut current, &mut segments);

        Self {
            raw: raw.to_string(),
            segments,
        }
    }

    /// The path as written by the caller.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Parsed segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Whether this path addresses the whole tree.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Extend the path with one more segment.
    pub fn child(&self, segment: &str) -> Self {
        let raw = if self.raw.is_empty() {
            segment.to_string()
        } else {
            format!("{}.{}", self.raw, segment)
        };
        Self::parse(&raw)
    }

    /// Resolve the path against a tree.
    ///
    /// Returns `None` as soon as a segment is missing or the value at that
    /// point cannot be descended into.
    pub fn resolve<'a>(&self, tree: &'a StateTree) -> Option<&'a Value> {
        let mut cursor = tree;
        for segment in &self.segments {
            cursor = match cursor {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(parse_index(segment)?)?,
                _ => return None,
            };
        }
        Some(cursor)
    }

    /// Write `value` at this path, replacing any non-container value that
    /// sits in the way.
    ///
    /// Overwriting a non-null primitive is logged at `warn`.
    pub fn assign(&self, tree: &mut StateTree, value: Value) {
        // Lenient mode never fails.
        let _ = self.write(tree, value, false);
    }

    /// Write `value` at this path, refusing to replace a non-null
    /// primitive that sits in the way.
    ///
    /// `null` and missing segments are still filled with fresh containers.
    /// On error the tree is left as it was.
    pub fn try_assign(&self, tree: &mut StateTree, value: Value) -> Result<()> {
        self.check_writable(tree)?;
        self.write(tree, value, true)
    }

    fn write(&self, tree: &mut StateTree, value: Value, strict: bool) -> Result<()> {
        let mut cursor = tree;
        for depth in 0..self.segments.len() {
            cursor = self.descend(cursor, depth, strict)?;
        }
        *cursor = value;
        Ok(())
    }

    /// Check that a strict write would succeed, without touching `tree`.
    pub(crate) fn check_writable(&self, tree: &StateTree) -> Result<()> {
        let mut cursor = tree;
        for (depth, segment) in self.segments.iter().enumerate() {
            let next = match cursor {
                Value::Null => return Ok(()),
                Value::Object(map) => map.get(segment),
                Value::Array(items) => match array_slot(segment, items.len()) {
                    Some(i) => items.get(i),
                    None => return Err(self.unwritable(depth)),
                },
                _ => return Err(self.blocked(depth)),
            };
            match next {
                Some(value) => cursor = value,
                None => return Ok(()),
            }
        }
        Ok(())
    }

    fn descend<'a>(
        &self,
        cursor: &'a mut Value,
        depth: usize,
        strict: bool,
    ) -> Result<&'a mut Value> {
        let segment = &self.segments[depth];
        let index = match &*cursor {
            Value::Array(items) => array_slot(segment, items.len()),
            _ => array_slot(segment, 0),
        };
        if strict {
            if let (Value::Array(_), None) = (&*cursor, index) {
                return Err(self.unwritable(depth));
            }
        }

        let fits = matches!(
            (&*cursor, index),
            (Value::Object(_), _) | (Value::Array(_), Some(_))
        );
        if !fits {
            self.coerce(cursor, depth, index, strict)?;
        }

        match (cursor, index) {
            (Value::Array(items), Some(i)) => {
                if i >= items.len() {
                    items.resize(i + 1, Value::Null);
                }
                Ok(&mut items[i])
            }
            (Value::Object(map), _) => Ok(map.entry(segment.clone()).or_insert(Value::Null)),
            _ => Err(self.blocked(depth)),
        }
    }

    fn coerce(
        &self,
        cursor: &mut Value,
        depth: usize,
        index: Option<usize>,
        strict: bool,
    ) -> Result<()> {
        if !cursor.is_null() {
            if strict {
                return Err(self.blocked(depth));
            }
            tracing::warn!(
                path = %self.raw,
                at = %self.prefix(depth),
                "replacing non-container value to complete write"
            );
        }

        let replacement = match (&*cursor, index) {
            // An array addressed by a key keeps its items under index keys.
            (Value::Array(items), None) => Value::Object(
                items
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (i.to_string(), v.clone()))
                    .collect::<Map<_, _>>(),
            ),
            (_, Some(_)) => Value::Array(Vec::new()),
            (_, None) => Value::Object(Map::new()),
        };
        *cursor = replacement;
        Ok(())
    }

    /// Error for a strict write addressing an array with `segment` at
    /// `depth`: either a plain key or an index out of padding range.
    fn unwritable(&self, depth: usize) -> BitError {
        match parse_index(&self.segments[depth]) {
            Some(index) => BitError::IndexTooFar {
                path: self.raw.clone(),
                at: self.prefix(depth),
                index,
            },
            None => self.blocked(depth),
        }
    }

    fn blocked(&self, depth: usize) -> BitError {
        BitError::NotAContainer {
            path: self.raw.clone(),
            blocked_at: self.prefix(depth),
        }
    }

    fn prefix(&self, depth: usize) -> String {
        if depth == 0 {
            "<root>".to_string()
        } else {
            self.segments[..depth].join(".")
        }
    }
}

fn flush(current: &mut String, segments: &mut Vec<String>) {
    if !current.is_empty() {
        segments.push(std::mem::take(current));
    }
}

/// Index `segment` may use on an array of `len` items: in bounds, or at
/// most [`MAX_ARRAY_PAD`] slots past the end.
fn array_slot(segment: &str, len: usize) -> Option<usize> {
    let index = parse_index(segment)?;
    (index.saturating_sub(len) <= MAX_ARRAY_PAD).then_some(index)
}

fn parse_index(segment: &str) -> Option<usize> {
    if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
        segment.parse().ok()
    } else {
        None
    }
}

impl fmt::Display for StatePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for StatePath {
    fn from(raw: &str) -> Self {
        Self::parse(raw)
    }
}

impl From<String> for StatePath {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<&String> for StatePath {
    fn from(raw: &String) -> Self {
        Self::parse(raw)
    }
}

impl From<&StatePath> for StatePath {
    fn from(path: &StatePath) -> Self {
        path.clone()
    }
}
