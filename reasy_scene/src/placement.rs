use std::collections::BTreeSet;

use reasy_types::TypeRegistry;

use crate::error::{HeapError, Result};
use crate::heap::InstanceHeap;

impl InstanceHeap {
    /// Index at which a new child of `owner.field` keeps the heap in
    /// children-before-parents order: after everything reachable through earlier
    /// fields (and elements already in the target array), before everything
    /// reachable through later fields, and never after the owner.
    pub fn insertion_index(&self, registry: &TypeRegistry, owner: u32, field: &str) -> Result<u32> {
        let inst = self.instance(owner)?;
        let info = registry.require(inst.type_id)?;
        let target = info
            .field_position(field)
            .ok_or_else(|| HeapError::UnknownField {
                type_name: info.name.clone(),
                field: field.to_string(),
            })?;

        let mut max_before: Option<u32> = None;
        let mut min_after: Option<u32> = None;
        for (pos, def) in info.fields.iter().enumerate() {
            let Some(value) = inst.fields.get(&def.name) else {
                continue;
            };
            // A scalar target is being replaced, so its current child does not count.
            if pos == target && !def.array {
                continue;
            }
            let subtree = self.subtree(&value.refs());
            if pos <= target {
                max_before = max_before.max(subtree.last().copied());
            } else if let Some(&lo) = subtree.first() {
                min_after = Some(min_after.map_or(lo, |m| m.min(lo)));
            }
        }

        let upper = min_after.map_or(owner, |m| m.min(owner));
        let index = match max_before {
            Some(m) => (m + 1).min(upper),
            None => upper,
        };
        Ok(index.max(1))
    }

    /// Reachable non-root instances below `roots`.
    fn subtree(&self, roots: &[u32]) -> BTreeSet<u32> {
        self.reachable(roots.iter().copied(), |n| !self.is_root(n))
    }
}
