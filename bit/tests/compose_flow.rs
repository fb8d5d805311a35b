//! A worker and a view composed into one unit, driven the way an app does

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bit::testing::{char_key, key, ActionProbe, RenderHarness};
use bit::{
    assert_dispatched, assert_not_dispatched, ActionSet, ComposeStage, Composer, Context,
    ContextBoundary, EventKind, Frame, QueryKey, QueryState, Rect, SelectorBinding, Selectors,
    Unit, View, WorkerContext,
};
use crossterm::event::KeyCode;
use parking_lot::Mutex;
use ratatui::widgets::Paragraph;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Vip {
    id: String,
    name: String,
}

#[derive(Selectors)]
#[selectors(prefix = "consolidation.vip", rename_all = "camelCase")]
#[allow(dead_code)]
struct VipState {
    selected_id: Option<String>,
    consolidator_q: String,
    cursor: usize,
    list: QueryState,
}

fn vip_worker(ctx: &WorkerContext) -> ActionSet {
    let store = ctx.store().clone();
    ActionSet::new().action("handleAddNewConsolidatorFromVip", move |args| {
        let _ = store.put(&VipState::selected_id(), args.get::<String>(0));
        let _ = store.put(
            &VipState::consolidator_q(),
            args.get::<String>(1).unwrap_or_default(),
        );
    })
}

/// Names with a cursor. Enter hands the highlighted VIP to the worker.
#[derive(Default)]
struct VipList {
    list: Option<SelectorBinding<QueryState>>,
    cursor: Option<SelectorBinding<usize>>,
}

impl VipList {
    fn state(&self) -> QueryState {
        self.list
            .as_ref()
            .and_then(SelectorBinding::get)
            .unwrap_or_default()
    }

    fn vips(&self) -> Vec<Vip> {
        self.state().data_as().unwrap_or_default()
    }

    fn cursor(&self) -> usize {
        self.cursor
            .as_ref()
            .and_then(SelectorBinding::get)
            .unwrap_or_default()
    }
}

impl View for VipList {
    fn mount(&mut self, ctx: &Context) {
        assert!(
            ctx.use_actions()
                .contains("handleAddNewConsolidatorFromVip"),
            "worker actions must be registered before mount"
        );
        self.list = Some(ctx.use_selector(&VipState::list()));
        self.cursor = Some(ctx.use_selector(&VipState::cursor()));
    }

    fn render(&mut self, frame: &mut Frame, area: Rect, _ctx: &Context) {
        let text = if self.state().is_fetching {
            "loading".to_string()
        } else {
            let cursor = self.cursor();
            self.vips()
                .iter()
                .enumerate()
                .map(|(i, vip)| {
                    let marker = if i == cursor { ">" } else { " " };
                    format!("{marker}{}", vip.name)
                })
                .collect::<Vec<_>>()
                .join("\n")
        };
        frame.render_widget(Paragraph::new(text), area);
    }

    fn handle_event(&mut self, event: &EventKind, ctx: &Context) -> bool {
        let Some(key) = event.key() else {
            return false;
        };
        let vips = self.vips();
        let cursor = self.cursor();
        let store = ctx.bridge().store();
        match key.code {
            KeyCode::Char('j') if cursor + 1 < vips.len() => {
                store.set(VipState::cursor().path(), cursor + 1);
                true
            }
            KeyCode::Char('k') if cursor > 0 => {
                store.set(VipState::cursor().path(), cursor - 1);
                true
            }
            KeyCode::Enter => match vips.get(cursor) {
                Some(vip) => ctx
                    .dispatch(
                        "handleAddNewConsolidatorFromVip",
                        vec![json!(vip.id), json!(vip.name)],
                    )
                    .is_ok(),
                None => false,
            },
            _ => false,
        }
    }
}

fn seeded_vips() -> serde_json::Value {
    json!({
        "consolidation": { "vip": { "list": {
            "status": "success",
            "data": [
                { "id": "v1", "name": "Ana" },
                { "id": "v2", "name": "Sam" }
            ],
            "error": null,
            "updatedAt": 1,
            "isFetching": false
        } } }
    })
}

fn draw(harness: &mut RenderHarness, unit: &mut Unit) -> String {
    harness.render_to_string_plain(|frame| {
        let area = frame.area();
        unit.render(frame, area);
    })
}

#[test]
fn test_keys_move_the_cursor_and_enter_dispatches() {
    let probe = ActionProbe::new();
    let mut unit = Composer::new(seeded_vips())
        .worker(vip_worker)
        .view(VipList::default())
        .middleware(probe.clone())
        .compose()
        .unwrap();
    let mut harness = RenderHarness::new(8, 3);

    assert_eq!(unit.stage(), ComposeStage::Ready);
    assert!(unit.take_render_request());
    assert_eq!(draw(&mut harness, &mut unit), ">Ana\n Sam\n\n");

    assert!(unit.handle_event(&EventKind::Key(char_key('j'))));
    assert!(unit.take_render_request());
    assert_eq!(draw(&mut harness, &mut unit), " Ana\n>Sam\n\n");

    // Already at the bottom.
    assert!(!unit.handle_event(&EventKind::Key(char_key('j'))));
    assert_not_dispatched!(probe, "handleAddNewConsolidatorFromVip");

    assert!(unit.handle_event(&EventKind::Key(key("enter"))));
    assert_dispatched!(probe, "handleAddNewConsolidatorFromVip");
    assert_eq!(
        unit.store().select(&VipState::selected_id()),
        Some(Some("v2".to_string()))
    );
    assert_eq!(
        unit.store().get("consolidation.vip.consolidatorQ"),
        Some(json!("Sam"))
    );
}

#[test]
fn test_on_ready_runs_after_the_worker_and_before_mount() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let from_ready = Arc::clone(&log);
    let from_view = Arc::clone(&log);

    let _unit = Composer::new(json!({ "n": 0 }))
        .worker(|ctx: &WorkerContext| {
            ctx.set("n", 1);
            ActionSet::new().action("noop", |_| {})
        })
        .on_ready(move |ready| {
            assert!(ready.context().use_actions().contains("noop"));
            from_ready
                .lock()
                .push(format!("ready n={}", ready.get("n").unwrap_or_default()));
            Ok(())
        })
        .view(move |_: &mut Frame, _: Rect, _: &Context| {
            from_view.lock().push("render".to_string());
        })
        .compose()
        .unwrap();

    // Closure views have no mount hook and are not drawn until asked.
    assert_eq!(*log.lock(), ["ready n=1"]);
}

#[test]
fn test_on_ready_error_aborts_composition() {
    let err = Composer::new(json!({}))
        .on_ready(|_| Err(bit::BitError::ActionNotRegistered("boot".into())))
        .compose()
        .unwrap_err();
    assert!(matches!(err, bit::BitError::ActionNotRegistered(name) if name == "boot"));
}

#[test]
fn test_boundary_publishes_the_raw_store() {
    let plain = Composer::new(json!({})).compose().unwrap();
    assert!(plain.context().store().is_none());
    assert!(plain.context().boundary().is_none());

    let bounded = Composer::new(json!({ "a": 1 }))
        .context(ContextBoundary::new("consolidation"))
        .compose()
        .unwrap();
    let store = bounded.context().store().unwrap();
    assert!(bit::Store::ptr_eq(store, bounded.store()));
    assert_eq!(bounded.context().boundary().unwrap().name(), "consolidation");
}

#[tokio::test]
async fn test_query_result_reaches_the_view() {
    let calls = Arc::new(AtomicUsize::new(0));
    let fetches = Arc::clone(&calls);
    let mut unit = Composer::new(json!({}))
        .worker(move |ctx: &WorkerContext| {
            let fetches = Arc::clone(&fetches);
            ctx.register_query(VipState::list().path(), "vips", move || {
                fetches.fetch_add(1, Ordering::SeqCst);
                async {
                    Ok::<_, String>(vec![
                        Vip {
                            id: "v1".into(),
                            name: "Ana".into(),
                        },
                        Vip {
                            id: "v2".into(),
                            name: "Sam".into(),
                        },
                    ])
                }
            })
            .unwrap();
            vip_worker(ctx)
        })
        .view(VipList::default())
        .compose()
        .unwrap();
    let mut harness = RenderHarness::new(8, 3);

    assert_eq!(draw(&mut harness, &mut unit), "loading\n\n\n");
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    unit.take_render_request();

    let completion = unit.next_completion().await.unwrap();
    unit.apply_completion(completion);
    assert!(unit.take_render_request());
    assert_eq!(draw(&mut harness, &mut unit), ">Ana\n Sam\n\n");

    // Invalidation refetches right away; the view shows the fetch until
    // the new result lands.
    assert!(unit.queries().invalidate(&QueryKey::new("vips")).unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(draw(&mut harness, &mut unit), "loading\n\n\n");

    let completion = unit.next_completion().await.unwrap();
    unit.apply_completion(completion);
    assert_eq!(draw(&mut harness, &mut unit), ">Ana\n Sam\n\n");
    assert_eq!(unit.queries().in_flight(), 0);
}
