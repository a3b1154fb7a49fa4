//! The process-wide typed name registry.

use fxhash::FxHashMap;
use std::cell::RefCell;

use crate::error::{ErrorCode, GraphError};

/// The type tag half of a namespace key. Only `Module` is used by this
/// crate today; the type stays generic because the source's namespace
/// is a general `(type, name)` registry, not a module-only one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    Module,
}

/// A typed `(type_tag, name) -> handle` registry.
///
/// Iteration snapshots the map, so it is stable under concurrent
/// *reads*. Concurrent insert/remove is not handled here — graph
/// mutation is expected to be serialized by the caller.
pub struct Namespace<V: Clone> {
    entries: RefCell<FxHashMap<(NamespaceKind, String), V>>,
}

impl<V: Clone> Default for Namespace<V> {
    fn default() -> Self {
        Self {
            entries: RefCell::new(FxHashMap::default()),
        }
    }
}

impl<V: Clone> Namespace<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `obj` under `(kind, name)`. Fails `EEXIST` on a duplicate.
    pub fn insert(&self, kind: NamespaceKind, name: &str, obj: V) -> Result<(), GraphError> {
        let mut entries = self.entries.borrow_mut();
        let key = (kind, name.to_string());
        if entries.contains_key(&key) {
            return Err(GraphError::new(
                ErrorCode::EExist,
                format!("name '{name}' already registered"),
            ));
        }
        entries.insert(key, obj);
        Ok(())
    }

    #[must_use]
    pub fn lookup(&self, kind: NamespaceKind, name: &str) -> Option<V> {
        self.entries
            .borrow()
            .get(&(kind, name.to_string()))
            .cloned()
    }

    pub fn remove(&self, kind: NamespaceKind, name: &str) {
        self.entries.borrow_mut().remove(&(kind, name.to_string()));
    }

    #[must_use]
    pub fn contains(&self, kind: NamespaceKind, name: &str) -> bool {
        self.entries.borrow().contains_key(&(kind, name.to_string()))
    }

    /// Byte-exact name comparison count for a given type tag.
    #[must_use]
    pub fn len(&self, kind: NamespaceKind) -> usize {
        self.entries.borrow().keys().filter(|(k, _)| *k == kind).count()
    }

    #[must_use]
    pub fn is_empty(&self, kind: NamespaceKind) -> bool {
        self.len(kind) == 0
    }

    /// Takes a stable snapshot of every entry of the given type, in
    /// unspecified but fixed iteration order.
    #[must_use]
    pub fn snapshot(&self, kind: NamespaceKind) -> Vec<V> {
        self.entries
            .borrow()
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// `init_iterator`/`next`/`release_iterator` collapsed into one call
    /// that snapshots up front — Rust's iterator protocol already owns
    /// the cursor, so there is nothing separate to release.
    #[must_use]
    pub fn iter(&self, kind: NamespaceKind) -> std::vec::IntoIter<V> {
        self.snapshot(kind).into_iter()
    }
}
