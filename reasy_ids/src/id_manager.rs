// id_manager.rs - Handle <-> positional index mapping for one instance heap
//
// Handles are session-scoped:
// 1. Every live instance gets a handle the first time it is registered
// 2. When a shift moves an instance, its handle is rewritten to the new index
// 3. Deleting an instance drops both directions of the mapping
// 4. `reset` starts a new generation, so stale handles stop resolving

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;

use crate::ids::InstanceHandle;

#[derive(Debug, Clone)]
pub struct IdManager {
    next_serial: u32,
    generation: u32,
    handle_to_index: FxHashMap<InstanceHandle, u32>,
    index_to_handle: FxHashMap<u32, InstanceHandle>,
}

impl Default for IdManager {
    fn default() -> Self {
        Self::new()
    }
}

impl IdManager {
    pub fn new() -> Self {
        Self {
            next_serial: 1,
            generation: 0,
            handle_to_index: FxHashMap::default(),
            index_to_handle: FxHashMap::default(),
        }
    }

    /// Returns the handle for `index`, assigning a fresh one if the index is unknown.
    pub fn register(&mut self, index: u32) -> InstanceHandle {
        if let Some(handle) = self.index_to_handle.get(&index) {
            return *handle;
        }

        let handle = InstanceHandle::from_parts(self.next_serial, self.generation);
        self.next_serial += 1;
        self.handle_to_index.insert(handle, index);
        self.index_to_handle.insert(index, handle);
        handle
    }

    pub fn register_batch<I: IntoIterator<Item = u32>>(&mut self, indices: I) {
        for index in indices {
            self.register(index);
        }
    }

    pub fn handle_of(&self, index: u32) -> Option<InstanceHandle> {
        self.index_to_handle.get(&index).copied()
    }

    /// Handle for `index`, or nil for the null slot and unregistered indices.
    pub fn handle_or_nil(&self, index: u32) -> InstanceHandle {
        if index == 0 {
            return InstanceHandle::nil();
        }
        self.handle_of(index).unwrap_or_default()
    }

    pub fn index_of(&self, handle: InstanceHandle) -> Option<u32> {
        self.handle_to_index.get(&handle).copied()
    }

    /// Moves the handle registered at `old` to `new`. Returns false if `old` had no handle.
    pub fn update_index(&mut self, old: u32, new: u32) -> bool {
        let Some(handle) = self.index_to_handle.remove(&old) else {
            return false;
        };
        self.index_to_handle.insert(new, handle);
        self.handle_to_index.insert(handle, new);
        true
    }

    pub fn remove(&mut self, index: u32) -> Option<InstanceHandle> {
        let handle = self.index_to_handle.remove(&index)?;
        self.handle_to_index.remove(&handle);
        Some(handle)
    }

    /// Applies a whole renumbering at once. Indices in `removed`, or mapped to 0, lose
    /// their handle; indices absent from `mapping` keep their position.
    pub fn remap(&mut self, mapping: &BTreeMap<u32, u32>, removed: &[u32]) {
        let old = std::mem::take(&mut self.index_to_handle);
        self.handle_to_index.clear();

        for (index, handle) in old {
            if removed.contains(&index) {
                continue;
            }
            let new_index = mapping.get(&index).copied().unwrap_or(index);
            if new_index == 0 {
                continue;
            }
            self.index_to_handle.insert(new_index, handle);
            self.handle_to_index.insert(handle, new_index);
        }
    }

    pub fn reset(&mut self) {
        self.handle_to_index.clear();
        self.index_to_handle.clear();
        self.next_serial = 1;
        self.generation = self.generation.wrapping_add(1);
    }

    pub fn len(&self) -> usize {
        self.index_to_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index_to_handle.is_empty()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}
