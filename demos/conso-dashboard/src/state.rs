//! Store layout for the dashboard
//!
//! Everything lives in one tree. The selector structs below name the paths
//! views and the worker agree on.

use bit::{QueryState, Selectors};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Which VIPs to list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VipFilter {
    Pending,
    Assigned,
}

/// A first-time attendee waiting for a consolidator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vip {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub contact_number: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

impl Vip {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Member who can follow up with a VIP.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Consolidator {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
}

impl Consolidator {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Selectors)]
#[selectors(prefix = "consolidation.vip", rename_all = "camelCase")]
#[allow(dead_code)]
pub struct VipState {
    pub list: QueryState,
    pub cursor: usize,
    pub selected_id: Option<String>,
    pub consolidator_q: String,
}

#[derive(Selectors)]
#[selectors(prefix = "consolidation.consolidator", rename_all = "camelCase")]
#[allow(dead_code)]
pub struct ConsolidatorState {
    pub list: QueryState,
}

pub const ACTION_ADD_CONSOLIDATOR: &str = "handleAddNewConsolidatorFromVip";
pub const ACTION_REFRESH_VIPS: &str = "refreshVips";

/// Tree the root unit starts from.
pub fn initial_state() -> Value {
    json!({
        "consolidation": {
            "vip": { "cursor": 0, "selectedId": null, "consolidatorQ": "" },
            "consolidator": {}
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_wire_names() {
        assert_eq!(serde_json::to_value(VipFilter::Pending).unwrap(), json!("PENDING"));
        assert_eq!(serde_json::to_value(VipFilter::Assigned).unwrap(), json!("ASSIGNED"));
    }

    #[test]
    fn test_vip_optional_fields() {
        let vip: Vip = serde_json::from_value(json!({
            "id": "v1",
            "first_name": "Ana",
            "last_name": "Reyes"
        }))
        .unwrap();
        assert_eq!(vip.full_name(), "Ana Reyes");
        assert_eq!(vip.contact_number, None);
    }

    #[test]
    fn test_selector_paths() {
        assert_eq!(VipState::selected_id().path(), "consolidation.vip.selectedId");
        assert_eq!(VipState::consolidator_q().path(), "consolidation.vip.consolidatorQ");
        assert_eq!(ConsolidatorState::list().path(), "consolidation.consolidator.list");
    }
}
