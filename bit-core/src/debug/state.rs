//! State tree introspection for debug views
//!
//! [`state_sections`] turns a tree into one [`DebugSection`] per top-level
//! key, each listing its leaves by dotted path. [`section_lines`] renders
//! sections as ratatui lines.

use ratatui::style::{Modifier, Style};
use ratatui::text::{Line, Span};
use serde_json::Value;

use crate::StateTree;

/// A debug entry (key-value pair)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugEntry {
    pub key: String,
    pub value: String,
}

impl DebugEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// A debug section with a title and entries
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugSection {
    pub title: String,
    pub entries: Vec<DebugEntry>,
}

impl DebugSection {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            entries: Vec::new(),
        }
    }

    /// Add an entry to the section
    pub fn entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.entries.push(DebugEntry::new(key, value));
        self
    }

    pub fn push_entry(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push(DebugEntry::new(key, value));
    }
}

/// One section per top-level key, leaves listed by path below that key.
///
/// Scalars at the top level are grouped into a `"(root)"` section. Empty
/// objects and arrays appear as `{}` and `[]`.
pub fn state_sections(tree: &StateTree) -> Vec<DebugSection> {
    let Value::Object(map) = tree else {
        let mut root = DebugSection::new("(root)");
        root.push_entry("", render_leaf(tree));
        return vec![root];
    };

    let mut root = DebugSection::new("(root)");
    let mut sections = Vec::new();
    for (key, value) in map {
        if is_branch(value) {
            let mut section = DebugSection::new(key.as_str());
            flatten(value, String::new(), &mut section);
            sections.push(section);
        } else {
            root.push_entry(key.as_str(), render_leaf(value));
        }
    }
    if !root.entries.is_empty() {
        sections.insert(0, root);
    }
    sections
}

fn is_branch(value: &Value) -> bool {
    match value {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        _ => false,
    }
}

fn flatten(value: &Value, prefix: String, section: &mut DebugSection) {
    let join = |key: &str| {
        if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{prefix}.{key}")
        }
    };
    match value {
        Value::Object(map) if !map.is_empty() => {
            for (key, child) in map {
                flatten(child, join(key), section);
            }
        }
        Value::Array(items) if !items.is_empty() => {
            for (index, child) in items.iter().enumerate() {
                flatten(child, join(&index.to_string()), section);
            }
        }
        leaf => section.push_entry(prefix, render_leaf(leaf)),
    }
}

fn render_leaf(value: &Value) -> String {
    match value {
        Value::String(s) => format!("{s:?}"),
        other => other.to_string(),
    }
}

/// Render sections as lines: a bold title, then `  key = value` rows.
pub fn section_lines(sections: &[DebugSection]) -> Vec<Line<'static>> {
    let title = Style::default().add_modifier(Modifier::BOLD);
    let key = Style::default().add_modifier(Modifier::DIM);
    let mut lines = Vec::new();
    for section in sections {
        lines.push(Line::from(Span::styled(section.title.clone(), title)));
        for entry in &section.entries {
            lines.push(Line::from(vec![
                Span::raw("  "),
                Span::styled(entry.key.clone(), key),
                Span::raw(" = "),
                Span::raw(entry.value.clone()),
            ]));
        }
    }
    lines
}
