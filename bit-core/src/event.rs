//! Terminal events and the crossterm poller feeding them

use std::time::Duration;

use crossterm::event::{self, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Raw event from crossterm before processing
#[derive(Debug)]
pub enum RawEvent {
    Key(KeyEvent),
    Mouse(MouseEvent),
    Resize(u16, u16),
}

/// Event delivered to views
#[derive(Debug, Clone)]
pub enum EventKind {
    Key(KeyEvent),
    Mouse(MouseEvent),
    /// Scroll wheel, `delta` is positive downwards
    Scroll { column: u16, row: u16, delta: isize },
    Resize(u16, u16),
    Tick,
}

impl EventKind {
    /// The key event, for key presses and repeats.
    pub fn key(&self) -> Option<&KeyEvent> {
        match self {
            EventKind::Key(key) if key.kind != KeyEventKind::Release => Some(key),
            _ => None,
        }
    }

    /// Whether this is a press of `code` without modifiers.
    pub fn is_key(&self, code: KeyCode) -> bool {
        self.key()
            .is_some_and(|key| key.code == code && key.modifiers == KeyModifiers::NONE)
    }

    /// Ctrl+C, delivered even while a view holds the keyboard.
    pub fn is_interrupt(&self) -> bool {
        self.key().is_some_and(|key| {
            key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c')
        })
    }
}

/// Spawn the event polling task with cancellation support
///
/// Polls crossterm and forwards key, mouse and resize events until the
/// token is cancelled or the receiver goes away.
pub fn spawn_event_poller(
    tx: mpsc::UnboundedSender<RawEvent>,
    poll_timeout: Duration,
    loop_sleep: Duration,
    cancel_token: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        const MAX_EVENTS_PER_BATCH: usize = 20;

        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    tracing::info!("Event poller cancelled, draining buffer");
                    while event::poll(Duration::ZERO).unwrap_or(false) {
                        let _ = event::read();
                    }
                    break;
                }
                _ = tokio::time::sleep(loop_sleep) => {
                    let mut processed = 0;
                    while processed < MAX_EVENTS_PER_BATCH
                        && event::poll(poll_timeout).unwrap_or(false)
                    {
                        processed += 1;
                        let raw = match event::read() {
                            Ok(event::Event::Key(key)) => RawEvent::Key(key),
                            Ok(event::Event::Mouse(mouse)) => RawEvent::Mouse(mouse),
                            Ok(event::Event::Resize(w, h)) => RawEvent::Resize(w, h),
                            Ok(_) => continue,
                            Err(err) => {
                                tracing::warn!(error = %err, "Failed to read terminal event");
                                continue;
                            }
                        };
                        if tx.send(raw).is_err() {
                            tracing::debug!("Event channel closed, stopping poller");
                            return;
                        }
                    }
                }
            }
        }
    })
}

/// Process a raw event into an EventKind
pub fn process_raw_event(raw: RawEvent) -> EventKind {
    match raw {
        RawEvent::Key(key) => EventKind::Key(key),
        RawEvent::Mouse(mouse) => match mouse.kind {
            MouseEventKind::ScrollDown => EventKind::Scroll {
                column: mouse.column,
                row: mouse.row,
                delta: 1,
            },
            MouseEventKind::ScrollUp => EventKind::Scroll {
                column: mouse.column,
                row: mouse.row,
                delta: -1,
            },
            _ => EventKind::Mouse(mouse),
        },
        RawEvent::Resize(w, h) => EventKind::Resize(w, h),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{char_key, ctrl_key, key_event};

    #[test]
    fn test_key_helpers() {
        let enter = EventKind::Key(key_event(KeyCode::Enter));
        assert!(enter.is_key(KeyCode::Enter));
        assert!(!enter.is_key(KeyCode::Esc));
        assert!(!enter.is_interrupt());

        assert!(EventKind::Key(ctrl_key('c')).is_interrupt());
        assert!(!EventKind::Key(ctrl_key('c')).is_key(KeyCode::Char('c')));
        assert!(EventKind::Key(char_key('q')).is_key(KeyCode::Char('q')));
    }

    #[test]
    fn test_release_is_not_a_key_press() {
        let mut release = key_event(KeyCode::Enter);
        release.kind = KeyEventKind::Release;
        assert!(EventKind::Key(release).key().is_none());
    }

    #[test]
    fn test_process_raw_event_scroll() {
        let scroll_up = MouseEvent {
            kind: MouseEventKind::ScrollUp,
            column: 3,
            row: 4,
            modifiers: KeyModifiers::NONE,
        };

        match process_raw_event(RawEvent::Mouse(scroll_up)) {
            EventKind::Scroll { column, row, delta } => {
                assert_eq!((column, row, delta), (3, 4, -1));
            }
            other => panic!("expected scroll, got {other:?}"),
        }
    }

    #[test]
    fn test_process_raw_event_passthrough() {
        assert!(matches!(
            process_raw_event(RawEvent::Resize(80, 24)),
            EventKind::Resize(80, 24)
        ));
        assert!(matches!(
            process_raw_event(RawEvent::Key(char_key('x'))),
            EventKind::Key(_)
        ));
    }
}
