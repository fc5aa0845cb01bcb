use crate::error::{Error, Result};
use crate::types::ContextValue;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

pub type ContextId = u64;

/// Id of the context every [`ContextTree`] starts with.
pub const ROOT_CONTEXT: ContextId = 0;

/// Every context stores its own id under this key. It is visible to
/// `get_value` but never reported by `collect_all_values`.
pub const CONTEXT_ID_KEY: &str = "_contextId";

/// Read access to context keys; the only capability evaluation needs.
pub trait ContextLookup {
    fn get_value(&self, key: &str) -> Option<&ContextValue>;
}

impl ContextLookup for HashMap<String, ContextValue> {
    fn get_value(&self, key: &str) -> Option<&ContextValue> {
        self.get(key)
    }
}

impl ContextLookup for BTreeMap<String, ContextValue> {
    fn get_value(&self, key: &str) -> Option<&ContextValue> {
        self.get(key)
    }
}

#[derive(Debug, Clone)]
pub struct ContextNode {
    id: ContextId,
    parent: Option<ContextId>,
    extension: Option<String>,
    values: HashMap<String, ContextValue>,
}

impl ContextNode {
    fn new(id: ContextId, parent: Option<ContextId>, extension: Option<String>) -> Self {
        let mut values = HashMap::new();
        values.insert(CONTEXT_ID_KEY.to_string(), ContextValue::Number(id as f64));
        Self { id, parent, extension, values }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn parent(&self) -> Option<ContextId> {
        self.parent
    }

    pub fn extension(&self) -> Option<&str> {
        self.extension.as_deref()
    }
}

/// A context as the extension host reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub id: ContextId,
    #[serde(default)]
    pub extension: Option<String>,
    #[serde(default)]
    pub values: BTreeMap<String, ContextValue>,
}

/// Contexts arranged by parent links. Nodes own their values only; a parent
/// is referenced by id, so disposing a parent never frees its children.
#[derive(Debug, Clone)]
pub struct ContextTree {
    nodes: HashMap<ContextId, ContextNode>,
}

impl Default for ContextTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextTree {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(ROOT_CONTEXT, ContextNode::new(ROOT_CONTEXT, None, None));
        Self { nodes }
    }

    /// A tree whose root holds `values`.
    pub fn from_values(values: impl IntoIterator<Item = (String, ContextValue)>) -> Self {
        let mut tree = Self::new();
        if let Some(root) = tree.nodes.get_mut(&ROOT_CONTEXT) {
            root.values.extend(values.into_iter().filter(|(k, _)| k != CONTEXT_ID_KEY));
        }
        tree
    }

    pub fn create(&mut self, id: ContextId, parent: Option<ContextId>, extension: Option<String>) -> Result<ContextId> {
        if self.nodes.contains_key(&id) {
            return Err(Error::DuplicateContext(id));
        }
        if let Some(parent) = parent {
            self.node(parent)?;
        }
        self.nodes.insert(id, ContextNode::new(id, parent, extension));
        Ok(id)
    }

    /// Mirrors a host-side context under `parent`.
    pub fn adapt_context(&mut self, snapshot: ContextSnapshot, parent: Option<ContextId>) -> Result<ContextId> {
        let id = self.create(snapshot.id, parent, snapshot.extension)?;
        let node = self.node_mut(id)?;
        node.values.extend(snapshot.values.into_iter().filter(|(k, _)| k != CONTEXT_ID_KEY));
        Ok(id)
    }

    pub fn contains(&self, id: ContextId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: ContextId) -> Result<&ContextNode> {
        self.nodes.get(&id).ok_or(Error::UnknownContext(id))
    }

    fn node_mut(&mut self, id: ContextId) -> Result<&mut ContextNode> {
        self.nodes.get_mut(&id).ok_or(Error::UnknownContext(id))
    }

    pub fn context(&self, id: ContextId) -> Option<ContextRef<'_>> {
        self.nodes.contains_key(&id).then_some(ContextRef { tree: self, id })
    }

    pub fn root(&self) -> ContextRef<'_> {
        ContextRef { tree: self, id: ROOT_CONTEXT }
    }

    /// Stores `value` under `key`; `Ok(false)` when it was already there.
    pub fn set_value(&mut self, id: ContextId, key: impl Into<String>, value: ContextValue) -> Result<bool> {
        let node = self.node_mut(id)?;
        let key = key.into();
        if node.values.get(&key) == Some(&value) {
            return Ok(false);
        }
        node.values.insert(key, value);
        Ok(true)
    }

    pub fn remove_value(&mut self, id: ContextId, key: &str) -> Result<bool> {
        Ok(self.node_mut(id)?.values.remove(key).is_some())
    }

    /// Local value first, then the parent chain.
    pub fn get_value(&self, id: ContextId, key: &str) -> Option<&ContextValue> {
        let mut current = self.nodes.get(&id);
        // a reparenting cycle must not hang lookups
        for _ in 0..self.nodes.len() {
            let node = current?;
            if let Some(value) = node.values.get(key) {
                return Some(value);
            }
            current = node.parent.and_then(|p| self.nodes.get(&p));
        }
        None
    }

    /// Parent values overridden by local ones, without the id key.
    pub fn collect_all_values(&self, id: ContextId) -> Result<BTreeMap<String, ContextValue>> {
        let mut chain = Vec::new();
        let mut current = Some(self.node(id)?);
        while let Some(node) = current {
            if chain.len() >= self.nodes.len() {
                break;
            }
            chain.push(node);
            current = node.parent.and_then(|p| self.nodes.get(&p));
        }
        let mut result = BTreeMap::new();
        for node in chain.into_iter().rev() {
            result.extend(node.values.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        result.remove(CONTEXT_ID_KEY);
        Ok(result)
    }

    pub fn update_parent(&mut self, id: ContextId, parent: Option<ContextId>) -> Result<()> {
        if let Some(parent) = parent {
            self.node(parent)?;
        }
        self.node_mut(id)?.parent = parent;
        Ok(())
    }

    /// Detaches `id` from its parent. Children keep pointing at `id`.
    pub fn dispose(&mut self, id: ContextId) -> Result<()> {
        self.node_mut(id)?.parent = None;
        Ok(())
    }
}

/// A borrowed view of one context inside a tree.
#[derive(Debug, Clone, Copy)]
pub struct ContextRef<'a> {
    tree: &'a ContextTree,
    id: ContextId,
}

impl<'a> ContextRef<'a> {
    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn parent(&self) -> Option<ContextRef<'a>> {
        let parent = self.tree.nodes.get(&self.id)?.parent?;
        self.tree.context(parent)
    }

    pub fn extension(&self) -> Option<&'a str> {
        self.tree.nodes.get(&self.id)?.extension()
    }

    pub fn collect_all_values(&self) -> BTreeMap<String, ContextValue> {
        self.tree.collect_all_values(self.id).unwrap_or_default()
    }
}

impl ContextLookup for ContextRef<'_> {
    fn get_value(&self, key: &str) -> Option<&ContextValue> {
        self.tree.get_value(self.id, key)
    }
}
