//! Event, completion and render loop for a composed unit
//!
//! The runtime task is the store's single writer: terminal events reach the
//! unit's view, query results are written as they arrive, and the screen is
//! redrawn whenever a binding raised the render signal.

use std::io;
use std::time::Duration;

use ratatui::backend::Backend;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::compose::Unit;
use crate::event::{process_raw_event, spawn_event_poller, EventKind, RawEvent};

/// Configuration for the event poller.
#[derive(Debug, Clone, Copy)]
pub struct PollerConfig {
    /// Timeout passed to each `crossterm::event::poll` call.
    pub poll_timeout: Duration,
    /// Sleep between poll cycles.
    pub loop_sleep: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_timeout: Duration::from_millis(10),
            loop_sleep: Duration::from_millis(16),
        }
    }
}

/// Drives one [`Unit`] against a terminal.
#[derive(Debug)]
pub struct BitRuntime {
    unit: Unit,
    poller_config: PollerConfig,
}

impl BitRuntime {
    pub fn new(unit: Unit) -> Self {
        Self {
            unit,
            poller_config: PollerConfig::default(),
        }
    }

    /// Configure event polling behavior.
    pub fn with_event_poller(mut self, config: PollerConfig) -> Self {
        self.poller_config = config;
        self
    }

    pub fn unit(&self) -> &Unit {
        &self.unit
    }

    pub fn unit_mut(&mut self) -> &mut Unit {
        &mut self.unit
    }

    /// Draw a frame if one was requested. Returns whether it drew.
    pub fn draw_if_requested<B: Backend>(&mut self, terminal: &mut Terminal<B>) -> io::Result<bool> {
        if !self.unit.take_render_request() {
            return Ok(false);
        }
        terminal.draw(|frame| {
            let area = frame.area();
            self.unit.render(frame, area);
        })?;
        Ok(true)
    }

    /// Run until `should_quit` returns `true` for an event.
    ///
    /// Events `should_quit` declines are routed to the unit's view. Resize
    /// events always trigger a redraw.
    pub async fn run<B, FQuit>(
        &mut self,
        terminal: &mut Terminal<B>,
        mut should_quit: FQuit,
    ) -> io::Result<()>
    where
        B: Backend,
        FQuit: FnMut(&EventKind) -> bool,
    {
        let (event_tx, mut event_rx) = mpsc::unbounded_channel::<RawEvent>();
        let cancel_token = CancellationToken::new();
        let _handle = spawn_event_poller(
            event_tx,
            self.poller_config.poll_timeout,
            self.poller_config.loop_sleep,
            cancel_token.clone(),
        );
        tracing::debug!(stage = %self.unit.stage(), "Runtime started");

        let result = loop {
            if let Err(err) = self.draw_if_requested(terminal) {
                break Err(err);
            }

            tokio::select! {
                Some(raw_event) = event_rx.recv() => {
                    let event = process_raw_event(raw_event);
                    if should_quit(&event) {
                        tracing::debug!("Quit requested");
                        break Ok(());
                    }
                    if matches!(event, EventKind::Resize(..)) {
                        self.unit.request_render();
                    }
                    self.unit.handle_event(&event);
                }

                Some(completion) = self.unit.next_completion() => {
                    self.unit.apply_completion(completion);
                    self.unit.apply_query_results();
                }

                else => {
                    break Ok(());
                }
            }
        };

        cancel_token.cancel();
        self.unit.queries().cancel_all();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compose::{Composer, Context};
    use crate::query::QueryKey;
    use crate::testing::buffer_to_string_plain;
    use ratatui::backend::TestBackend;
    use ratatui::layout::Rect;
    use ratatui::widgets::Paragraph;
    use ratatui::Frame;
    use serde_json::json;

    fn counter_view(frame: &mut Frame, area: Rect, ctx: &Context) {
        let count = ctx.get("count").and_then(|v| v.as_i64()).unwrap_or_default();
        frame.render_widget(Paragraph::new(format!("count={count}")), area);
    }

    #[test]
    fn test_poller_config_default() {
        let config = PollerConfig::default();
        assert_eq!(config.poll_timeout, Duration::from_millis(10));
        assert_eq!(config.loop_sleep, Duration::from_millis(16));
    }

    #[test]
    fn test_draws_only_when_requested() {
        let unit = Composer::new(json!({ "count": 1 }))
            .view(counter_view)
            .compose()
            .unwrap();
        let mut runtime = BitRuntime::new(unit);
        let mut terminal = Terminal::new(TestBackend::new(10, 1)).unwrap();

        assert!(runtime.draw_if_requested(&mut terminal).unwrap());
        assert!(!runtime.draw_if_requested(&mut terminal).unwrap());

        runtime.unit().store().set("count", 2);
        runtime.unit().request_render();
        assert!(runtime.draw_if_requested(&mut terminal).unwrap());
        let text = buffer_to_string_plain(terminal.backend().buffer());
        assert_eq!(text, "count=2\n");
    }

    #[tokio::test]
    async fn test_completions_reach_the_store() {
        let unit = Composer::new(json!({})).compose().unwrap();
        let mut runtime = BitRuntime::new(unit);
        runtime
            .unit()
            .queries()
            .register_query("vips", QueryKey::new("vips"), || async {
                Ok::<_, String>(json!(["ana"]))
            })
            .unwrap();

        let completion = runtime.unit_mut().next_completion().await.unwrap();
        runtime.unit().apply_completion(completion);
        assert_eq!(runtime.unit().store().get("vips.data"), Some(json!(["ana"])));
    }
}
