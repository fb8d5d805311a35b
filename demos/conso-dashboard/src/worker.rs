//! Business logic of the dashboard
//!
//! The worker owns every write except cursor movement: it registers the VIP
//! query at start-up and publishes the actions the view calls.

use bit::{ActionSet, QueryClient, QueryKey, Store, Worker, WorkerContext};
use serde_json::json;

use crate::api::EdgeClient;
use crate::state::{
    ConsolidatorState, VipFilter, VipState, ACTION_ADD_CONSOLIDATOR, ACTION_REFRESH_VIPS,
};

pub struct ConsoWorker {
    api: EdgeClient,
    filter: Option<VipFilter>,
}

impl ConsoWorker {
    pub fn new(api: EdgeClient, filter: Option<VipFilter>) -> Self {
        Self { api, filter }
    }

    fn vips_key(&self) -> QueryKey {
        QueryKey::with_params("getVips", &json!({ "status": self.filter }))
    }
}

impl Worker for ConsoWorker {
    fn initialize(&mut self, ctx: &WorkerContext) -> ActionSet {
        let api = self.api.clone();
        let filter = self.filter;
        let registered = ctx.register_query(VipState::list().path(), self.vips_key(), move || {
            let api = api.clone();
            async move { api.get_vips(filter).await }
        });
        if let Err(err) = registered {
            tracing::error!(error = %err, "Could not start VIP query");
        }

        let store = ctx.store().clone();
        let queries = ctx.queries().clone();
        let api = self.api.clone();
        let vips_key = self.vips_key();
        let refresh = ctx.queries().clone();

        ActionSet::new()
            .action(ACTION_ADD_CONSOLIDATOR, move |args| {
                let Some(id) = args.get::<String>(0) else {
                    tracing::warn!("{ACTION_ADD_CONSOLIDATOR} called without a VIP id");
                    return;
                };
                let q = args.get::<String>(1).unwrap_or_default();
                add_consolidator_from_vip(&store, &queries, &api, id, q);
            })
            .action(ACTION_REFRESH_VIPS, move |_| {
                if let Err(err) = refresh.invalidate(&vips_key) {
                    tracing::warn!(error = %err, "VIP refresh failed");
                }
            })
    }
}

/// Select a VIP and search consolidators for them.
fn add_consolidator_from_vip(
    store: &Store,
    queries: &QueryClient,
    api: &EdgeClient,
    id: String,
    q: String,
) {
    store.set(VipState::selected_id().path(), id);
    store.set(VipState::consolidator_q().path(), q.clone());

    let key = QueryKey::with_params("getConsolidators", &json!({ "q": q }));
    let api = api.clone();
    let registered = queries.register_query(ConsolidatorState::list().path(), key, move || {
        let api = api.clone();
        let q = q.clone();
        async move { api.get_consolidators(&q).await }
    });
    if let Err(err) = registered {
        tracing::warn!(error = %err, "Could not search consolidators");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bit::{Composer, QueryStatus};
    use serde_json::Value;

    fn offline_worker() -> ConsoWorker {
        // Nothing listens here; fetches fail fast with a connection error.
        let api = EdgeClient::new("http://127.0.0.1:9", "test-key").unwrap();
        ConsoWorker::new(api, Some(VipFilter::Pending))
    }

    #[tokio::test]
    async fn test_vip_query_starts_with_the_unit() {
        let unit = Composer::new(crate::state::initial_state())
            .worker(offline_worker())
            .compose()
            .unwrap();

        let list = unit.store().select(&VipState::list()).unwrap();
        assert_eq!(list.status, QueryStatus::Loading);
        assert!(unit
            .queries()
            .is_fetching(&QueryKey::with_params("getVips", &json!({ "status": "PENDING" }))));
        unit.queries().cancel_all();
    }

    #[tokio::test]
    async fn test_add_consolidator_sets_selection_and_query() {
        let unit = Composer::new(crate::state::initial_state())
            .worker(offline_worker())
            .compose()
            .unwrap();

        unit.context()
            .dispatch(
                ACTION_ADD_CONSOLIDATOR,
                vec![json!("vip-7"), json!("Ana")],
            )
            .unwrap();

        assert_eq!(
            unit.store().select(&VipState::selected_id()),
            Some(Some("vip-7".to_string()))
        );
        assert_eq!(
            unit.store().get(VipState::consolidator_q().path()),
            Some(Value::from("Ana"))
        );
        assert_eq!(
            unit.store()
                .get("consolidation.consolidator.list.status"),
            Some(json!("loading"))
        );
        unit.queries().cancel_all();
    }

    #[tokio::test]
    async fn test_add_consolidator_without_id_is_ignored() {
        let unit = Composer::new(crate::state::initial_state())
            .worker(offline_worker())
            .compose()
            .unwrap();

        unit.context().dispatch(ACTION_ADD_CONSOLIDATOR, ()).unwrap();
        assert_eq!(unit.store().select(&VipState::selected_id()), Some(None));
        unit.queries().cancel_all();
    }
}
