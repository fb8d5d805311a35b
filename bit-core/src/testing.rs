//! Test utilities for bit applications
//!
//! - [`key`] and friends: build `KeyEvent`s (e.g. `key("ctrl+p")`)
//! - [`RenderHarness`]: draw into a ratatui `TestBackend` and read it back
//! - [`ListenerProbe`]: record every tree a store broadcasts
//! - [`ActionProbe`]: middleware recording dispatched actions, with the
//!   [`assert_dispatched!`](crate::assert_dispatched) family of macros
//!
//! # Example
//!
//! ```
//! use bit_core::testing::{ActionProbe, ListenerProbe};
//! use bit_core::{assert_dispatched, Store};
//! use serde_json::json;
//!
//! let probe = ActionProbe::new();
//! let store = Store::with_middleware(json!({}), probe.clone());
//! let listener = ListenerProbe::attach(&store);
//!
//! store.register_action("ping", |_| {});
//! store.actions().dispatch("ping", ()).unwrap();
//! store.set("x", 1);
//!
//! assert_dispatched!(probe, "ping");
//! assert_eq!(listener.calls(), 1);
//! ```

use std::fmt;
use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, KeyEventState, KeyModifiers};
use parking_lot::Mutex;
use ratatui::backend::TestBackend;
use ratatui::buffer::Buffer;
use ratatui::{Frame, Terminal};

use crate::action::ActionArgs;
use crate::store::{Middleware, Store, Subscription};
use crate::StateTree;

/// Parse a key string such as `"q"`, `"enter"`, `"ctrl+p"` or `"shift+tab"`.
pub fn parse_key(s: &str) -> Option<KeyEvent> {
    let mut modifiers = KeyModifiers::NONE;
    let mut parts: Vec<&str> = s.split('+').collect();
    let last = parts.pop()?;

    for part in parts {
        match part.to_ascii_lowercase().as_str() {
            "ctrl" | "control" => modifiers |= KeyModifiers::CONTROL,
            "alt" => modifiers |= KeyModifiers::ALT,
            "shift" => modifiers |= KeyModifiers::SHIFT,
            _ => return None,
        }
    }

    let code = match last.to_ascii_lowercase().as_str() {
        "esc" | "escape" => KeyCode::Esc,
        "enter" | "return" => KeyCode::Enter,
        "tab" if modifiers.contains(KeyModifiers::SHIFT) => {
            modifiers.remove(KeyModifiers::SHIFT);
            KeyCode::BackTab
        }
        "tab" => KeyCode::Tab,
        "backspace" => KeyCode::Backspace,
        "delete" | "del" => KeyCode::Delete,
        "space" => KeyCode::Char(' '),
        "up" => KeyCode::Up,
        "down" => KeyCode::Down,
        "left" => KeyCode::Left,
        "right" => KeyCode::Right,
        "home" => KeyCode::Home,
        "end" => KeyCode::End,
        "pageup" => KeyCode::PageUp,
        "pagedown" => KeyCode::PageDown,
        _ => {
            let mut chars = last.chars();
            let c = chars.next()?;
            if chars.next().is_some() {
                return None;
            }
            KeyCode::Char(c)
        }
    };

    Some(KeyEvent {
        code,
        modifiers,
        kind: KeyEventKind::Press,
        state: KeyEventState::empty(),
    })
}

/// Create a `KeyEvent` from a key string.
///
/// # Examples
///
/// ```
/// use bit_core::testing::key;
/// use crossterm::event::{KeyCode, KeyModifiers};
///
/// let k = key("ctrl+p");
/// assert_eq!(k.code, KeyCode::Char('p'));
/// assert!(k.modifiers.contains(KeyModifiers::CONTROL));
///
/// assert_eq!(key("shift+tab").code, KeyCode::BackTab);
/// ```
///
/// # Panics
///
/// Panics if the key string cannot be parsed.
pub fn key(s: &str) -> KeyEvent {
    parse_key(s).unwrap_or_else(|| panic!("Invalid key string: {:?}", s))
}

/// Press of `code` with no modifiers.
pub fn key_event(code: KeyCode) -> KeyEvent {
    KeyEvent {
        code,
        modifiers: KeyModifiers::NONE,
        kind: KeyEventKind::Press,
        state: KeyEventState::empty(),
    }
}

/// Create a `KeyEvent` for a character with no modifiers.
pub fn char_key(c: char) -> KeyEvent {
    key_event(KeyCode::Char(c))
}

/// Create a `KeyEvent` for a character with Ctrl modifier.
pub fn ctrl_key(c: char) -> KeyEvent {
    KeyEvent {
        modifiers: KeyModifiers::CONTROL,
        ..char_key(c)
    }
}

/// Create a `KeyEvent` for a character with Alt modifier.
pub fn alt_key(c: char) -> KeyEvent {
    KeyEvent {
        modifiers: KeyModifiers::ALT,
        ..char_key(c)
    }
}

/// Renders into an in-memory terminal.
pub struct RenderHarness {
    terminal: Terminal<TestBackend>,
}

impl RenderHarness {
    /// Harness with a `width` x `height` screen.
    ///
    /// # Panics
    ///
    /// Panics if the test terminal cannot be created.
    pub fn new(width: u16, height: u16) -> Self {
        let terminal = Terminal::new(TestBackend::new(width, height))
            .unwrap_or_else(|err| panic!("failed to create test terminal: {err}"));
        Self { terminal }
    }

    /// Draw one frame and return the resulting buffer.
    pub fn render(&mut self, draw: impl FnOnce(&mut Frame)) -> Buffer {
        match self.terminal.draw(draw) {
            Ok(completed) => completed.buffer.clone(),
            Err(err) => panic!("failed to draw test frame: {err}"),
        }
    }

    /// Draw one frame and return its text, one line per row.
    pub fn render_to_string_plain(&mut self, draw: impl FnOnce(&mut Frame)) -> String {
        let buffer = self.render(draw);
        buffer_to_string_plain(&buffer)
    }
}

impl fmt::Debug for RenderHarness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let area = self.terminal.backend().buffer().area;
        f.debug_struct("RenderHarness")
            .field("width", &area.width)
            .field("height", &area.height)
            .finish()
    }
}

/// Buffer contents without styling, trailing spaces trimmed per row.
pub fn buffer_to_string_plain(buffer: &Buffer) -> String {
    let area = buffer.area;
    let mut out = String::new();
    for y in area.top()..area.bottom() {
        let mut line = String::new();
        for x in area.left()..area.right() {
            if let Some(cell) = buffer.cell((x, y)) {
                line.push_str(cell.symbol());
            }
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Records every tree a store broadcasts while attached.
pub struct ListenerProbe {
    seen: Arc<Mutex<Vec<StateTree>>>,
    _subscription: Subscription,
}

impl ListenerProbe {
    /// Subscribe to `store`. Detaches on drop.
    pub fn attach(store: &Store) -> Self {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let subscription = store.subscribe_scoped(move |tree| sink.lock().push(tree.clone()));
        Self {
            seen,
            _subscription: subscription,
        }
    }

    /// Number of notifications received.
    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    /// Every tree received, oldest first.
    pub fn snapshots(&self) -> Vec<StateTree> {
        self.seen.lock().clone()
    }

    /// The most recent tree.
    pub fn last(&self) -> Option<StateTree> {
        self.seen.lock().last().cloned()
    }
}

impl fmt::Debug for ListenerProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerProbe")
            .field("calls", &self.calls())
            .finish()
    }
}

/// Middleware recording every dispatched action.
///
/// Clones share one record, so keep a clone after handing it to a store.
#[derive(Clone, Default)]
pub struct ActionProbe {
    dispatched: Arc<Mutex<Vec<(String, ActionArgs)>>>,
}

impl ActionProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names dispatched so far, oldest first.
    pub fn names(&self) -> Vec<String> {
        self.dispatched
            .lock()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Arguments of every dispatch of `name`.
    pub fn calls_of(&self, name: &str) -> Vec<ActionArgs> {
        self.dispatched
            .lock()
            .iter()
            .filter(|(n, _)| n == name)
            .map(|(_, args)| args.clone())
            .collect()
    }

    /// Take the record, leaving it empty.
    pub fn drain(&self) -> Vec<(String, ActionArgs)> {
        std::mem::take(&mut *self.dispatched.lock())
    }
}

impl Middleware for ActionProbe {
    fn on_dispatch(&self, action: &str, args: &ActionArgs) {
        self.dispatched
            .lock()
            .push((action.to_string(), args.clone()));
    }
}

impl fmt::Debug for ActionProbe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ActionProbe").field(&self.names()).finish()
    }
}

/// Assert that an action was dispatched through an [`ActionProbe`].
///
/// ```ignore
/// assert_dispatched!(probe, "handleAddNewConsolidatorFromVip");
/// ```
#[macro_export]
macro_rules! assert_dispatched {
    ($probe:expr, $name:expr) => {
        assert!(
            $probe.names().iter().any(|n| n == $name),
            "Expected action `{}` to be dispatched, but got: {:?}",
            $name,
            $probe.names()
        );
    };
}

/// Assert that an action was NOT dispatched through an [`ActionProbe`].
#[macro_export]
macro_rules! assert_not_dispatched {
    ($probe:expr, $name:expr) => {
        assert!(
            !$probe.names().iter().any(|n| n == $name),
            "Expected action `{}` NOT to be dispatched, but it was: {:?}",
            $name,
            $probe.names()
        );
    };
}

/// Count dispatches of an action.
#[macro_export]
macro_rules! count_dispatched {
    ($probe:expr, $name:expr) => {
        $probe.names().iter().filter(|n| *n == $name).count()
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::widgets::Paragraph;
    use serde_json::json;

    #[test]
    fn test_key_special() {
        assert_eq!(key("esc").code, KeyCode::Esc);
        assert_eq!(key("enter").code, KeyCode::Enter);
        assert_eq!(key("shift+tab").code, KeyCode::BackTab);
        assert_eq!(key("shift+tab").modifiers, KeyModifiers::NONE);
        assert_eq!(key("space").code, KeyCode::Char(' '));
    }

    #[test]
    fn test_key_invalid() {
        assert!(parse_key("hyper+x").is_none());
        assert!(parse_key("notakey").is_none());
        assert!(parse_key("").is_none());
    }

    #[test]
    fn test_modifier_helpers() {
        assert!(ctrl_key('c').modifiers.contains(KeyModifiers::CONTROL));
        assert!(alt_key('x').modifiers.contains(KeyModifiers::ALT));
        assert_eq!(char_key('x').modifiers, KeyModifiers::NONE);
    }

    #[test]
    fn test_render_harness_reads_back_text() {
        let mut harness = RenderHarness::new(12, 2);
        let out = harness.render_to_string_plain(|frame| {
            frame.render_widget(Paragraph::new("hello\nworld"), frame.area());
        });
        assert_eq!(out, "hello\nworld\n");
    }

    #[test]
    fn test_probes() {
        let probe = ActionProbe::new();
        let store = Store::with_middleware(json!({}), probe.clone());
        let listener = ListenerProbe::attach(&store);

        store.register_action("a", |_| {});
        store.actions().dispatch("a", ()).unwrap();
        store
            .actions()
            .dispatch("a", ActionArgs::new().with(2))
            .unwrap();
        store.set("k", "v");

        assert_dispatched!(probe, "a");
        assert_not_dispatched!(probe, "b");
        assert_eq!(count_dispatched!(probe, "a"), 2);
        assert_eq!(probe.calls_of("a")[1].get::<u32>(0), Some(2));
        assert_eq!(listener.last(), Some(json!({ "k": "v" })));

        drop(listener);
        assert_eq!(store.listener_count(), 0);
        assert_eq!(probe.drain().len(), 2);
        assert!(probe.names().is_empty());
    }
}
