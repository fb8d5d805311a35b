//! Write and dispatch logging with pattern-based filtering and in-memory storage
//!
//! [`MutationLogMiddleware`] records every store write and action dispatch
//! that passes its [`MutationLogConfig`] filter, both through `tracing` and
//! into a bounded ring buffer that a debug view can show.
//!
//! # Example
//!
//! ```
//! use bit_core::debug::{MutationLogConfig, MutationLogMiddleware};
//! use bit_core::Store;
//! use serde_json::json;
//!
//! let log = MutationLogMiddleware::new(MutationLogConfig::new(Some("consolidation.*"), None));
//! let store = Store::with_middleware(json!({}), log.clone());
//!
//! store.set("consolidation.vip.selectedId", "vip-1");
//! store.set("ui.cursor", 3);
//!
//! let entries = log.recent(10);
//! assert_eq!(entries.len(), 1);
//! assert_eq!(entries[0].target, "consolidation.vip.selectedId");
//! ```

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::Value;

use crate::action::ActionArgs;
use crate::store::Middleware;

const SUMMARY_MAX_CHARS: usize = 80;

/// Filter and capacity for the mutation log.
///
/// Patterns are matched against the written path or the action name and
/// support:
/// - `*` matches any sequence of characters
/// - `?` matches any single character
/// - Literal text matches exactly
#[derive(Debug, Clone)]
pub struct MutationLogConfig {
    /// If non-empty, only log targets matching these patterns
    pub include_patterns: Vec<String>,
    /// Exclude targets matching these patterns (applied after include)
    pub exclude_patterns: Vec<String>,
    /// Maximum number of entries kept
    pub capacity: usize,
}

impl Default for MutationLogConfig {
    fn default() -> Self {
        Self {
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            capacity: 100,
        }
    }
}

impl MutationLogConfig {
    /// Create a config from comma-separated pattern strings
    ///
    /// ```
    /// use bit_core::debug::MutationLogConfig;
    ///
    /// let config = MutationLogConfig::new(Some("consolidation.*,handle*"), Some("*.isFetching"));
    /// assert!(config.should_log("consolidation.vip.selectedId"));
    /// assert!(config.should_log("handleAddNewConsolidatorFromVip"));
    /// assert!(!config.should_log("consolidation.vips.isFetching"));
    /// assert!(!config.should_log("ui.cursor"));
    /// ```
    pub fn new(include: Option<&str>, exclude: Option<&str>) -> Self {
        Self {
            include_patterns: include.map(split_patterns).unwrap_or_default(),
            exclude_patterns: exclude.map(split_patterns).unwrap_or_default(),
            ..Self::default()
        }
    }

    /// Set the ring buffer size.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Check whether a path or action name passes the filter
    pub fn should_log(&self, target: &str) -> bool {
        if !self.include_patterns.is_empty()
            && !self.include_patterns.iter().any(|p| glob_match(p, target))
        {
            return false;
        }
        !self.exclude_patterns.iter().any(|p| glob_match(p, target))
    }
}

fn split_patterns(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// What an entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Set,
    Dispatch,
}

/// An entry in the mutation log
#[derive(Debug, Clone)]
pub struct MutationEntry {
    pub kind: MutationKind,
    /// Written path or dispatched action name
    pub target: String,
    /// Short rendering of the value or arguments
    pub summary: String,
    pub timestamp: Instant,
    /// Sequence number for ordering
    pub sequence: u64,
    /// Listeners notified by a write, filled in once the sweep ends
    pub listeners_notified: Option<usize>,
}

impl MutationEntry {
    /// Time since this entry was logged
    pub fn elapsed(&self) -> Duration {
        self.timestamp.elapsed()
    }

    /// Format the elapsed time for display (e.g., "2.3s", "150ms")
    pub fn elapsed_display(&self) -> String {
        let elapsed = self.elapsed();
        if elapsed.as_secs() >= 1 {
            format!("{:.1}s", elapsed.as_secs_f64())
        } else {
            format!("{}ms", elapsed.as_millis())
        }
    }
}

#[derive(Debug)]
struct MutationLog {
    entries: VecDeque<MutationEntry>,
    next_sequence: u64,
    // Sequence of the write whose sweep is still running, per nesting level.
    open_sets: Vec<Option<u64>>,
}

impl MutationLog {
    fn push(&mut self, capacity: usize, kind: MutationKind, target: &str, summary: String) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        if capacity == 0 {
            return sequence;
        }
        while self.entries.len() >= capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(MutationEntry {
            kind,
            target: target.to_string(),
            summary,
            timestamp: Instant::now(),
            sequence,
            listeners_notified: None,
        });
        sequence
    }
}

/// Middleware keeping a filtered log of writes and dispatches.
///
/// Clones share one log.
#[derive(Clone)]
pub struct MutationLogMiddleware {
    config: Arc<MutationLogConfig>,
    log: Arc<Mutex<MutationLog>>,
}

impl MutationLogMiddleware {
    pub fn new(config: MutationLogConfig) -> Self {
        Self {
            log: Arc::new(Mutex::new(MutationLog {
                entries: VecDeque::with_capacity(config.capacity),
                next_sequence: 0,
                open_sets: Vec::new(),
            })),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &MutationLogConfig {
        &self.config
    }

    /// The most recent `count` entries, newest first.
    pub fn recent(&self, count: usize) -> Vec<MutationEntry> {
        self.log
            .lock()
            .entries
            .iter()
            .rev()
            .take(count)
            .cloned()
            .collect()
    }

    /// Every stored entry, oldest first.
    pub fn entries(&self) -> Vec<MutationEntry> {
        self.log.lock().entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.log.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.lock().entries.is_empty()
    }

    pub fn clear(&self) {
        self.log.lock().entries.clear();
    }
}

impl Default for MutationLogMiddleware {
    fn default() -> Self {
        Self::new(MutationLogConfig::default())
    }
}

impl fmt::Debug for MutationLogMiddleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutationLogMiddleware")
            .field("config", &self.config)
            .field("entries", &self.len())
            .finish()
    }
}

impl Middleware for MutationLogMiddleware {
    fn before_set(&self, path: &str, value: &Value) {
        let mut log = self.log.lock();
        if !self.config.should_log(path) {
            log.open_sets.push(None);
            return;
        }
        let summary = summarize(&value.to_string());
        tracing::debug!(path, value = %summary, "set");
        let sequence = log.push(self.config.capacity, MutationKind::Set, path, summary);
        log.open_sets.push(Some(sequence));
    }

    fn after_set(&self, _path: &str, listeners_notified: usize) {
        let mut log = self.log.lock();
        let Some(Some(sequence)) = log.open_sets.pop() else {
            return;
        };
        if let Some(entry) = log.entries.iter_mut().rev().find(|e| e.sequence == sequence) {
            entry.listeners_notified = Some(listeners_notified);
        }
    }

    fn on_dispatch(&self, action: &str, args: &ActionArgs) {
        if !self.config.should_log(action) {
            return;
        }
        let summary = summarize(&Value::Array(args.as_slice().to_vec()).to_string());
        tracing::debug!(action, args = %summary, "dispatch");
        self.log
            .lock()
            .push(self.config.capacity, MutationKind::Dispatch, action, summary);
    }
}

fn summarize(text: &str) -> String {
    if text.chars().count() <= SUMMARY_MAX_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(SUMMARY_MAX_CHARS - 1).collect();
    out.push('…');
    out
}

/// Simple glob pattern matching supporting `*` and `?`
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let mut pi = 0;
    let mut ti = 0;
    let mut star: Option<(usize, usize)> = None;

    while ti < text.len() {
        match pattern.get(pi) {
            Some('*') => {
                star = Some((pi, ti));
                pi += 1;
            }
            Some(&c) if c == '?' || c == text[ti] => {
                pi += 1;
                ti += 1;
            }
            _ => match star {
                Some((star_pi, star_ti)) => {
                    pi = star_pi + 1;
                    ti = star_ti + 1;
                    star = Some((star_pi, star_ti + 1));
                }
                None => return false,
            },
        }
    }

    pattern[pi..].iter().all(|&c| c == '*')
}
