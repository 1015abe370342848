use std::collections::HashMap;
use std::fmt;

use super::id::ItemId;

/// Resolves symbolic item type names to the id of their type definition.
///
/// Implementations are shared between query nodes and may be read from
/// several threads at once.
pub trait TypeProvider: Send + Sync + fmt::Debug {
    fn type_id(&self, type_name: &str) -> Option<ItemId>;
}

/// In-memory type provider keyed by case-folded type name.
#[derive(Debug, Clone, Default)]
pub struct TypeMap {
    types: HashMap<String, ItemId>,
}

impl TypeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type, replacing any previous id for the same name.
    pub fn insert(&mut self, type_name: &str, id: ItemId) -> Option<ItemId> {
        self.types.insert(type_name.to_lowercase(), id)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

impl TypeProvider for TypeMap {
    fn type_id(&self, type_name: &str) -> Option<ItemId> {
        let id = self.types.get(&type_name.to_lowercase()).cloned();
        if id.is_none() {
            tracing::trace!(type_name, "type name not found in type map");
        }
        id
    }
}

impl<S: AsRef<str>> FromIterator<(S, ItemId)> for TypeMap {
    fn from_iter<I: IntoIterator<Item = (S, ItemId)>>(iter: I) -> Self {
        let mut map = TypeMap::new();
        for (name, id) in iter {
            map.insert(name.as_ref(), id);
        }
        map
    }
}
