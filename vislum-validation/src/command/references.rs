use std::{
    collections::{HashMap, HashSet},
    sync::{PoisonError, RwLock},
};

use crate::handle::{Handle, ObjectKey};

/// Reverse edges: which command buffers reference an object.
///
/// Kept in step with every command buffer's forward edge set. This lock is a
/// leaf: no command buffer lock may be acquired while it is held.
#[derive(Default)]
pub struct ReferenceIndex {
    holders: RwLock<HashMap<ObjectKey, HashSet<Handle>>>,
}

impl ReferenceIndex {
    pub fn insert(&self, key: ObjectKey, command_buffer: Handle) {
        self.holders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .insert(command_buffer);
    }

    /// Removes the reverse edges of a command buffer's dropped forward edges.
    pub fn remove_all(&self, keys: impl IntoIterator<Item = ObjectKey>, command_buffer: Handle) {
        let mut holders = self.holders.write().unwrap_or_else(PoisonError::into_inner);
        for key in keys {
            if let Some(set) = holders.get_mut(&key) {
                set.remove(&command_buffer);
                if set.is_empty() {
                    holders.remove(&key);
                }
            }
        }
    }

    /// Forgets an object entirely.
    pub fn forget(&self, key: ObjectKey) {
        self.holders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
    }

    /// The command buffers referencing `key`, sorted by handle.
    pub fn holders(&self, key: ObjectKey) -> Vec<Handle> {
        let mut holders: Vec<_> = self
            .holders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        holders.sort_unstable();
        holders
    }
}
