//! The live context the UI evaluates when-clauses against.
//!
//! The host pushes point events while extensions register their keys, then
//! signals once that all extensions have started. Point events can race the
//! host's own start-up, so that signal triggers an authoritative resync that
//! replaces the whole tree.

use crate::ast::Expr;
use crate::context::{ContextTree, ROOT_CONTEXT};
use crate::error::Result;
use crate::types::ContextValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;

/// A change notification from the extension host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContextEvent {
    ValueUpdated { key: String, value: ContextValue },
    KeyRemoved { key: String },
    ExtensionsStarted,
}

/// The host side of the store: the authoritative source of context values.
pub trait ContextHost {
    fn collect_all_values(&self) -> impl Future<Output = Result<BTreeMap<String, ContextValue>>> + Send;
}

/// A fixed set of values, used as a host by tests and the command line.
impl ContextHost for BTreeMap<String, ContextValue> {
    async fn collect_all_values(&self) -> Result<BTreeMap<String, ContextValue>> {
        Ok(self.clone())
    }
}

pub struct ContextStore {
    tree: watch::Sender<Arc<ContextTree>>,
}

impl Default for ContextStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextStore {
    pub fn new() -> Self {
        Self::with_tree(ContextTree::new())
    }

    pub fn with_tree(tree: ContextTree) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(tree));
        Self { tree: tx }
    }

    /// A receiver that is woken whenever the tree changes.
    pub fn subscribe(&self) -> watch::Receiver<Arc<ContextTree>> {
        self.tree.subscribe()
    }

    /// The current tree. Later updates do not affect the returned snapshot.
    pub fn snapshot(&self) -> Arc<ContextTree> {
        self.tree.borrow().clone()
    }

    pub fn get_value(&self, key: &str) -> Option<ContextValue> {
        self.tree.borrow().get_value(ROOT_CONTEXT, key).cloned()
    }

    pub fn evaluate(&self, expr: &Expr) -> bool {
        let tree = self.tree.borrow();
        expr.evaluate(&tree.root())
    }

    /// Applies a point event to the root context. Returns whether anything
    /// changed; subscribers are only notified in that case.
    /// `ExtensionsStarted` carries no data and is ignored here; see
    /// [`handle`](Self::handle).
    pub fn apply(&self, event: &ContextEvent) -> bool {
        let changed = self.tree.send_if_modified(|tree| {
            let tree = Arc::make_mut(tree);
            let result = match event {
                ContextEvent::ValueUpdated { key, value } => tree.set_value(ROOT_CONTEXT, key.as_str(), value.clone()),
                ContextEvent::KeyRemoved { key } => tree.remove_value(ROOT_CONTEXT, key),
                ContextEvent::ExtensionsStarted => Ok(false),
            };
            result.unwrap_or(false)
        });
        tracing::trace!(?event, changed, "applied context event");
        changed
    }

    /// Rebuilds the tree from the host's values and swaps it in with a
    /// single update.
    pub async fn resync<H: ContextHost>(&self, host: &H) -> Result<()> {
        let values = host.collect_all_values().await?;
        let count = values.len();
        self.tree.send_replace(Arc::new(ContextTree::from_values(values)));
        tracing::debug!(keys = count, "context store resynced");
        Ok(())
    }

    pub async fn handle<H: ContextHost>(&self, event: &ContextEvent, host: &H) -> Result<bool> {
        match event {
            ContextEvent::ExtensionsStarted => self.resync(host).await.map(|_| true),
            point => Ok(self.apply(point)),
        }
    }
}

lazy_static::lazy_static! {
    static ref GLOBAL: ContextStore = ContextStore::new();
}

/// The process-wide store.
pub fn global() -> &'static ContextStore {
    &GLOBAL
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(key: &str, value: impl Into<ContextValue>) -> ContextEvent {
        ContextEvent::ValueUpdated { key: key.to_string(), value: value.into() }
    }

    #[test]
    fn events_deserialize_by_type_tag() {
        let e: ContextEvent = serde_json::from_str(r#"{"type": "valueUpdated", "key": "a", "value": [1, 2]}"#).unwrap();
        assert_eq!(e, update("a", vec![1.0, 2.0]));
        let e: ContextEvent = serde_json::from_str(r#"{"type": "extensionsStarted"}"#).unwrap();
        assert_eq!(e, ContextEvent::ExtensionsStarted);
    }

    #[test]
    fn apply_reports_changes() {
        let store = ContextStore::new();
        assert!(store.apply(&update("a", true)));
        assert!(!store.apply(&update("a", true)));
        assert_eq!(store.get_value("a"), Some(ContextValue::Bool(true)));
        assert!(store.apply(&ContextEvent::KeyRemoved { key: "a".into() }));
        assert!(!store.apply(&ContextEvent::KeyRemoved { key: "a".into() }));
    }

    #[test]
    fn snapshots_are_isolated_from_updates() {
        let store = ContextStore::new();
        store.apply(&update("a", 1.0));
        let before = store.snapshot();
        store.apply(&update("a", 2.0));
        assert_eq!(before.get_value(ROOT_CONTEXT, "a"), Some(&ContextValue::Number(1.0)));
        assert_eq!(store.get_value("a"), Some(ContextValue::Number(2.0)));
    }

    #[tokio::test]
    async fn resync_replaces_point_updates() {
        let store = ContextStore::new();
        store.apply(&update("stale", true));

        let mut host = BTreeMap::new();
        host.insert("fresh".to_string(), ContextValue::Bool(true));
        assert!(store.handle(&ContextEvent::ExtensionsStarted, &host).await.unwrap());

        assert_eq!(store.get_value("stale"), None);
        assert!(store.evaluate(&Expr::has("fresh")));
    }

    #[test]
    fn global_store_is_shared() {
        assert!(global().apply(&update("global.smoke", "on")));
        assert_eq!(global().get_value("global.smoke"), Some(ContextValue::from("on")));
        assert!(global().evaluate(&Expr::equals("global.smoke", "on")));
        assert!(global().apply(&ContextEvent::KeyRemoved { key: "global.smoke".into() }));
    }
}
