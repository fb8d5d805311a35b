//! Dashboard screen: VIP list, selection detail, optional state inspector

use bit::debug::{section_lines, state_sections, MutationLogMiddleware};
use bit::{Context, EventKind, QueryState, QueryStatus, SelectorBinding, View};
use crossterm::event::KeyCode;
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph};
use ratatui::Frame;
use serde_json::json;

use crate::state::{
    Consolidator, ConsolidatorState, Vip, VipState, ACTION_ADD_CONSOLIDATOR, ACTION_REFRESH_VIPS,
};

const MUTATIONS_SHOWN: usize = 8;

#[derive(Default)]
struct Bindings {
    vips: Option<SelectorBinding<QueryState>>,
    cursor: Option<SelectorBinding<usize>>,
    selected_id: Option<SelectorBinding<Option<String>>>,
    consolidators: Option<SelectorBinding<QueryState>>,
}

/// The single dashboard screen.
#[derive(Default)]
pub struct DashboardView {
    bindings: Bindings,
    show_debug: bool,
    mutation_log: Option<MutationLogMiddleware>,
}

impl DashboardView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Show recent writes and dispatches under the state inspector.
    pub fn with_mutation_log(mut self, log: MutationLogMiddleware) -> Self {
        self.mutation_log = Some(log);
        self
    }

    pub fn show_debug(&self) -> bool {
        self.show_debug
    }

    fn vip_state(&self) -> QueryState {
        read(&self.bindings.vips).unwrap_or_default()
    }

    fn vips(&self) -> Vec<Vip> {
        self.vip_state().data_as().unwrap_or_default()
    }

    fn cursor(&self) -> usize {
        read(&self.bindings.cursor).unwrap_or_default()
    }

    fn selected_vip(&self) -> Option<Vip> {
        let id = read(&self.bindings.selected_id).flatten()?;
        self.vips().into_iter().find(|vip| vip.id == id)
    }

    fn move_cursor(&self, ctx: &Context, delta: isize) -> bool {
        let len = self.vips().len();
        let cursor = self.cursor();
        let next = cursor.saturating_add_signed(delta).min(len.saturating_sub(1));
        if len == 0 || next == cursor {
            return false;
        }
        ctx.bridge().store().set(VipState::cursor().path(), next);
        true
    }

    fn render_vips(&self, frame: &mut Frame, area: Rect) {
        let state = self.vip_state();
        let title = if state.is_fetching && state.data.is_some() {
            " VIPs (refreshing) "
        } else {
            " VIPs "
        };
        let block = Block::default().title(title).borders(Borders::ALL);

        let lines: Vec<Line> = match state.status {
            QueryStatus::Idle | QueryStatus::Loading => vec![Line::from("Loading VIPs…")],
            QueryStatus::Error if state.data.is_none() => vec![Line::styled(
                format!("Error: {}", state.error.unwrap_or_default()),
                Style::default().fg(Color::Red),
            )],
            _ => {
                let cursor = self.cursor();
                let vips = self.vips();
                if vips.is_empty() {
                    vec![Line::from("No VIPs")]
                } else {
                    vips.iter()
                        .enumerate()
                        .map(|(i, vip)| vip_line(vip, i == cursor))
                        .collect()
                }
            }
        };
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_detail(&self, frame: &mut Frame, area: Rect) {
        let block = Block::default().title(" Consolidation ").borders(Borders::ALL);
        let Some(vip) = self.selected_vip() else {
            let hint = Paragraph::new("Select a VIP with Enter").block(block);
            frame.render_widget(hint, area);
            return;
        };

        let mut lines = vec![
            Line::from(vec![
                Span::styled("VIP: ", Style::default().add_modifier(Modifier::BOLD)),
                Span::raw(vip.full_name()),
            ]),
            Line::from(format!(
                "Contact: {}",
                vip.contact_number.as_deref().unwrap_or("-")
            )),
            Line::from(""),
        ];

        let consolidators = read(&self.bindings.consolidators).unwrap_or_default();
        match consolidators.status {
            QueryStatus::Idle | QueryStatus::Loading => {
                lines.push(Line::from("Searching consolidators…"));
            }
            QueryStatus::Error => lines.push(Line::styled(
                format!("Error: {}", consolidators.error.unwrap_or_default()),
                Style::default().fg(Color::Red),
            )),
            QueryStatus::Success => {
                let found: Vec<Consolidator> = consolidators.data_as().unwrap_or_default();
                lines.push(Line::from(format!("Consolidators ({})", found.len())));
                lines.extend(
                    found
                        .iter()
                        .map(|c| Line::from(format!("  {}", c.full_name()))),
                );
            }
        }
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }

    fn render_debug(&self, frame: &mut Frame, area: Rect, ctx: &Context) {
        let state = ctx.bridge().store().state();
        let mut lines = section_lines(&state_sections(&state));
        if let Some(log) = &self.mutation_log {
            lines.push(Line::from(""));
            lines.push(Line::styled(
                "Recent mutations",
                Style::default().add_modifier(Modifier::BOLD),
            ));
            for entry in log.recent(MUTATIONS_SHOWN) {
                lines.push(Line::from(format!(
                    "  #{} {:?} {} {}",
                    entry.sequence,
                    entry.kind,
                    entry.target,
                    entry.elapsed_display()
                )));
            }
        }
        let block = Block::default().title(" State ").borders(Borders::ALL);
        frame.render_widget(Paragraph::new(lines).block(block), area);
    }
}

impl View for DashboardView {
    fn mount(&mut self, ctx: &Context) {
        self.bindings = Bindings {
            vips: Some(ctx.use_selector(&VipState::list())),
            cursor: Some(ctx.use_selector(&VipState::cursor())),
            selected_id: Some(ctx.use_selector(&VipState::selected_id())),
            consolidators: Some(ctx.use_selector(&ConsolidatorState::list())),
        };
    }

    fn render(&mut self, frame: &mut Frame, area: Rect, ctx: &Context) {
        let [body, help] = Layout::vertical([Constraint::Fill(1), Constraint::Length(1)]).areas(area);
        let [list, side] =
            Layout::horizontal([Constraint::Percentage(45), Constraint::Percentage(55)]).areas(body);

        self.render_vips(frame, list);
        if self.show_debug {
            self.render_debug(frame, side, ctx);
        } else {
            self.render_detail(frame, side);
        }

        let help_text = Paragraph::new("j/k: move  Enter: assign  r: refresh  d: state  q: quit")
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(help_text, help);
    }

    fn handle_event(&mut self, event: &EventKind, ctx: &Context) -> bool {
        let Some(key) = event.key() else {
            return false;
        };
        match key.code {
            KeyCode::Char('j') | KeyCode::Down => self.move_cursor(ctx, 1),
            KeyCode::Char('k') | KeyCode::Up => self.move_cursor(ctx, -1),
            KeyCode::Enter => {
                let Some(vip) = self.vips().into_iter().nth(self.cursor()) else {
                    return false;
                };
                let args = vec![json!(vip.id), json!(vip.first_name)];
                match ctx.dispatch(ACTION_ADD_CONSOLIDATOR, args) {
                    Ok(()) => true,
                    Err(err) => {
                        tracing::warn!(error = %err, "Assign failed");
                        false
                    }
                }
            }
            KeyCode::Char('r') => ctx.dispatch(ACTION_REFRESH_VIPS, ()).is_ok(),
            KeyCode::Char('d') => {
                self.show_debug = !self.show_debug;
                true
            }
            _ => false,
        }
    }
}

fn read<T: serde::de::DeserializeOwned>(binding: &Option<SelectorBinding<T>>) -> Option<T> {
    binding.as_ref().and_then(SelectorBinding::get)
}

fn vip_line(vip: &Vip, highlighted: bool) -> Line<'static> {
    let marker = if highlighted { "> " } else { "  " };
    let style = if highlighted {
        Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
    } else {
        Style::default()
    };
    Line::styled(format!("{marker}{}", vip.full_name()), style)
}
