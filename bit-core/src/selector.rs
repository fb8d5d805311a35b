//! Typed handles to store paths
//!
//! A [`Selector<T>`] pairs a path with the type stored there, so reads and
//! writes go through serde instead of ad-hoc string plumbing. Reading a
//! selector whose path was never written gives `None`.
//!
//! `#[derive(Selectors)]` (from `bit-macros`) generates one selector per
//! struct field:
//!
//! ```ignore
//! use bit::Selectors;
//!
//! #[derive(Selectors)]
//! #[selectors(prefix = "consolidation.vip", rename_all = "camelCase")]
//! struct VipState {
//!     selected_id: Option<String>,
//!     consolidator_q: String,
//! }
//!
//! store.put(&VipState::selected_id(), Some("vip-1".to_string()))?;
//! assert_eq!(VipState::consolidator_q().path(), "consolidation.vip.consolidatorQ");
//! ```

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;

/// Typed path into the state tree.
pub struct Selector<T> {
    path: Cow<'static, str>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Selector<T> {
    /// Selector for a static path.
    pub const fn new(path: &'static str) -> Self {
        Self {
            path: Cow::Borrowed(path),
            _marker: PhantomData,
        }
    }

    /// Selector for a path built at runtime.
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            path: Cow::Owned(path.into()),
            _marker: PhantomData,
        }
    }

    /// The selected path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Selector for a field below this one.
    pub fn field<U>(&self, name: &str) -> Selector<U> {
        if self.path.is_empty() {
            Selector::from_path(name)
        } else {
            Selector::from_path(format!("{}.{}", self.path, name))
        }
    }

    /// Selector for an array element below this one.
    pub fn index<U>(&self, index: usize) -> Selector<U> {
        self.field(&index.to_string())
    }
}

impl<T> Clone for Selector<T> {
    fn clone(&self) -> Self {
        Self {
            path: self.path.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> PartialEq for Selector<T> {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl<T> Eq for Selector<T> {}

impl<T> fmt::Debug for Selector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Selector").field(&self.path).finish()
    }
}

impl<T> fmt::Display for Selector<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Store;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Vip {
        id: String,
        name: String,
    }

    const SELECTED: Selector<String> = Selector::new("consolidation.vip.selectedId");

    #[test]
    fn test_select_before_and_after_write() {
        let store = Store::new(json!({}));
        assert_eq!(store.select(&SELECTED), None);

        store.put(&SELECTED, "vip-1".to_string()).unwrap();
        assert_eq!(store.select(&SELECTED).as_deref(), Some("vip-1"));
        assert_eq!(store.get("consolidation.vip.selectedId"), Some(json!("vip-1")));
    }

    #[test]
    fn test_struct_values_round_trip() {
        let store = Store::new(json!({}));
        let vips: Selector<Vec<Vip>> = Selector::new("vips");
        let first: Selector<Vip> = vips.index(0);
        let vip = Vip {
            id: "1".into(),
            name: "Ana".into(),
        };

        store.put(&vips, vec![vip.clone()]).unwrap();
        assert_eq!(first.path(), "vips.0");
        assert_eq!(store.select(&first), Some(vip));
        assert_eq!(store.select(&first.field::<String>("name")).as_deref(), Some("Ana"));
    }

    #[test]
    fn test_wrong_shape_reads_none() {
        let store = Store::new(json!({ "consolidation": { "vip": { "selectedId": 7 } } }));
        assert_eq!(store.select(&SELECTED), None);
    }
}
