use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use reasy_ids::{IdManager, InstanceHandle};
use reasy_variant::Value;

use crate::container::EmbeddedContainer;
use crate::error::{HeapError, Result};
use crate::instance::{HierarchyEntry, Instance};

/// Outcome of one `shift_references` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShiftReport {
    /// Field values whose target changed (nulling included).
    pub rewritten: usize,
    /// Field values mapped to 0.
    pub nulled: usize,
    pub dropped_roots: usize,
    pub dropped_containers: usize,
}

/// Ordered, densely numbered instance store. Slot 0 is the reserved null instance.
#[derive(Debug, Clone)]
pub struct InstanceHeap {
    instances: Vec<Option<Instance>>,
    object_table: Vec<u32>,
    hierarchy: BTreeMap<u32, HierarchyEntry>,
    containers: Vec<EmbeddedContainer>,
    ids: IdManager,
}

impl Default for InstanceHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for InstanceHeap {
    fn eq(&self, other: &Self) -> bool {
        self.instances == other.instances
            && self.object_table == other.object_table
            && self.containers == other.containers
    }
}

impl InstanceHeap {
    pub fn new() -> Self {
        Self {
            instances: vec![None],
            object_table: Vec::new(),
            hierarchy: BTreeMap::new(),
            containers: Vec::new(),
            ids: IdManager::new(),
        }
    }

    /// Assembles a heap from decoded parts: registers handles and derives the hierarchy.
    pub fn from_parts(
        mut instances: Vec<Option<Instance>>,
        object_table: Vec<u32>,
        mut containers: Vec<EmbeddedContainer>,
    ) -> Self {
        match instances.first_mut() {
            Some(slot) => *slot = None,
            None => instances.push(None),
        }
        containers.sort_by_key(|c| c.owner_index);

        let mut heap = Self {
            instances,
            object_table,
            hierarchy: BTreeMap::new(),
            containers,
            ids: IdManager::new(),
        };
        let live: Vec<u32> = heap.iter().map(|(i, _)| i).collect();
        heap.ids.register_batch(live);
        heap.rebuild_hierarchy();
        heap
    }

    // ---- queries ----

    /// Slot count, null slot included.
    #[inline]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn live_count(&self) -> usize {
        self.instances.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.live_count() == 0
    }

    pub fn slots(&self) -> &[Option<Instance>] {
        &self.instances
    }

    pub fn get(&self, index: u32) -> Option<&Instance> {
        self.instances.get(index as usize)?.as_ref()
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut Instance> {
        self.instances.get_mut(index as usize)?.as_mut()
    }

    pub fn instance(&self, index: u32) -> Result<&Instance> {
        if index == 0 || index as usize >= self.instances.len() {
            return Err(HeapError::InvalidIndex(index));
        }
        self.get(index).ok_or(HeapError::EmptySlot(index))
    }

    pub fn contains(&self, index: u32) -> bool {
        index != 0 && self.get(index).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &Instance)> {
        self.instances
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|inst| (i as u32, inst)))
    }

    pub fn object_table(&self) -> &[u32] {
        &self.object_table
    }

    pub fn is_root(&self, index: u32) -> bool {
        self.object_table.contains(&index)
    }

    pub fn push_root(&mut self, index: u32) -> Result<()> {
        self.instance(index)?;
        if !self.object_table.contains(&index) {
            self.object_table.push(index);
        }
        Ok(())
    }

    /// Registers `index` in the object table at `position`, keeping later entries in order.
    pub fn insert_root(&mut self, position: usize, index: u32) -> Result<()> {
        self.instance(index)?;
        if position > self.object_table.len() {
            return Err(HeapError::InvalidIndex(position as u32));
        }
        if !self.object_table.contains(&index) {
            self.object_table.insert(position, index);
        }
        Ok(())
    }

    pub fn hierarchy(&self) -> &BTreeMap<u32, HierarchyEntry> {
        &self.hierarchy
    }

    pub fn parent_of(&self, index: u32) -> Option<u32> {
        self.hierarchy.get(&index)?.parent
    }

    pub fn containers(&self) -> &[EmbeddedContainer] {
        &self.containers
    }

    pub fn container(&self, owner: u32) -> Option<&EmbeddedContainer> {
        self.containers.iter().find(|c| c.owner_index == owner)
    }

    pub fn container_mut(&mut self, owner: u32) -> Option<&mut EmbeddedContainer> {
        self.containers.iter_mut().find(|c| c.owner_index == owner)
    }

    /// Attaches `container` to its owner slot, replacing any container already there.
    pub fn attach_container(&mut self, container: EmbeddedContainer) -> Result<()> {
        self.instance(container.owner_index)?;
        self.containers
            .retain(|c| c.owner_index != container.owner_index);
        self.containers.push(container);
        self.containers.sort_by_key(|c| c.owner_index);
        Ok(())
    }

    pub fn ids(&self) -> &IdManager {
        &self.ids
    }

    pub fn handle_of(&self, index: u32) -> Option<InstanceHandle> {
        self.ids.handle_of(index)
    }

    pub fn index_of(&self, handle: InstanceHandle) -> Option<u32> {
        self.ids.index_of(handle)
    }

    /// Target -> set of instances whose fields reference it.
    pub fn referrers(&self) -> BTreeMap<u32, BTreeSet<u32>> {
        let mut out: BTreeMap<u32, BTreeSet<u32>> = BTreeMap::new();
        for (index, inst) in self.iter() {
            for target in inst.refs() {
                out.entry(target).or_default().insert(index);
            }
        }
        out
    }

    pub fn referrers_of(&self, target: u32) -> BTreeSet<u32> {
        self.iter()
            .filter(|(_, inst)| inst.refs().contains(&target))
            .map(|(index, _)| index)
            .collect()
    }

    /// Populated instances reachable from `roots` through references. A node is
    /// entered only when `enter` accepts it.
    pub fn reachable(
        &self,
        roots: impl IntoIterator<Item = u32>,
        enter: impl Fn(u32) -> bool,
    ) -> BTreeSet<u32> {
        let mut seen = BTreeSet::new();
        let mut stack: Vec<u32> = roots.into_iter().collect();
        while let Some(index) = stack.pop() {
            if !self.contains(index) || !enter(index) || !seen.insert(index) {
                continue;
            }
            if let Some(inst) = self.get(index) {
                stack.extend(inst.refs().into_iter().rev());
            }
        }
        seen
    }

    // ---- mutation ----

    /// Appends an instance after the last slot.
    pub fn push(&mut self, instance: Instance) -> u32 {
        let index = self.instances.len() as u32;
        self.instances.push(Some(instance));
        self.ids.register(index);
        self.rebuild_hierarchy();
        index
    }

    /// Inserts `instance` at `at`, shifting every slot at or above it up by one.
    pub fn insert(&mut self, at: u32, instance: Instance) -> Result<u32> {
        self.insert_many(at, vec![instance]).map(|range| range.start)
    }

    /// Opens a contiguous window of `instances.len()` slots at `at` and fills it.
    /// References held by the inserted instances are taken as already final.
    pub fn insert_many(&mut self, at: u32, instances: Vec<Instance>) -> Result<Range<u32>> {
        let len = self.instances.len() as u32;
        if at == 0 || at > len {
            return Err(HeapError::InvalidIndex(at));
        }
        let count = instances.len() as u32;
        if count == 0 {
            return Ok(at..at);
        }

        let shift: BTreeMap<u32, u32> = (at..len).map(|i| (i, i + count)).collect();
        self.shift_references(&shift);

        let tail = self.instances.split_off(at as usize);
        self.instances.extend(instances.into_iter().map(Some));
        self.instances.extend(tail);
        self.ids.register_batch(at..at + count);
        self.rebuild_hierarchy();

        log::debug!(
            "heap: inserted {count} instance(s) at {at}, shifted {} slot(s)",
            len - at
        );
        Ok(at..at + count)
    }

    /// Rewrites every reference whose target is a key of `map`, in one pass over the
    /// final numbering. Touches field values, the object table, the hierarchy,
    /// container owners and handles. Targets mapped to 0 are nulled or dropped.
    pub fn shift_references(&mut self, map: &BTreeMap<u32, u32>) -> ShiftReport {
        let mut report = ShiftReport::default();
        if map.is_empty() {
            return report;
        }
        let remap = |index: u32| map.get(&index).copied().unwrap_or(index);

        for inst in self.instances.iter_mut().flatten() {
            let mut nulled = 0;
            report.rewritten += inst.remap_refs(&mut |index| {
                let next = remap(index);
                if next == 0 {
                    nulled += 1;
                }
                next
            });
            report.nulled += nulled;
        }

        let before = self.object_table.len();
        self.object_table = self
            .object_table
            .iter()
            .filter_map(|&index| {
                let next = remap(index);
                (index == 0 || next != 0).then_some(next)
            })
            .collect();
        report.dropped_roots = before - self.object_table.len();

        let old = std::mem::take(&mut self.hierarchy);
        for (index, mut entry) in old {
            let next = remap(index);
            if next == 0 {
                continue;
            }
            entry.parent = entry.parent.map(remap).filter(|&p| p != 0);
            entry.children = entry
                .children
                .into_iter()
                .map(remap)
                .filter(|&c| c != 0)
                .collect();
            self.hierarchy.insert(next, entry);
        }

        let before = self.containers.len();
        self.containers.retain_mut(|c| {
            let next = remap(c.owner_index);
            c.owner_index = next;
            next != 0
        });
        report.dropped_containers = before - self.containers.len();
        self.containers.sort_by_key(|c| c.owner_index);

        self.ids.remap(map, &[]);

        if report.nulled > 0 {
            log::warn!("heap: nulled {} reference(s) during shift", report.nulled);
        }
        report
    }

    /// Replaces a declared field. Reference targets must be populated slots.
    pub fn set_field(&mut self, index: u32, name: &str, value: Value) -> Result<Option<Value>> {
        if let Some(bad) = value.refs().into_iter().find(|&r| !self.contains(r)) {
            return Err(HeapError::InvalidIndex(bad));
        }
        let inst = self
            .get_mut(index)
            .ok_or(HeapError::EmptySlot(index))?;
        let Some(slot) = inst.fields.get_mut(name) else {
            return Err(HeapError::UnknownField {
                type_name: format!("{:#010x}", inst.type_id),
                field: name.to_string(),
            });
        };
        let old = std::mem::replace(slot, value);
        self.rebuild_hierarchy();
        Ok(Some(old))
    }

    /// Points `field` of `owner` at a reference value: appends for arrays, replaces otherwise.
    pub fn link_reference(&mut self, owner: u32, field: &str, value: Value) -> Result<()> {
        let expected = match value {
            Value::Object(_) => "object",
            Value::UserData { .. } => "userdata",
            _ => {
                return Err(HeapError::FieldKindMismatch {
                    field: field.to_string(),
                    expected: "reference",
                });
            }
        };
        if let Some(bad) = value.refs().into_iter().find(|&r| !self.contains(r)) {
            return Err(HeapError::InvalidIndex(bad));
        }
        let inst = self.get_mut(owner).ok_or(HeapError::EmptySlot(owner))?;
        let type_id = inst.type_id;
        let slot = inst
            .fields
            .get_mut(field)
            .ok_or_else(|| HeapError::UnknownField {
                type_name: format!("{type_id:#010x}"),
                field: field.to_string(),
            })?;

        match slot {
            Value::Array { items, .. } => items.push(value),
            Value::Object(_) | Value::UserData { .. } => *slot = value,
            // Maybe-object slots decode as raw bytes while they hold no reference.
            Value::Scalar(s) if s.as_bytes().is_some_and(|b| b.len() == 4) => *slot = value,
            _ => {
                return Err(HeapError::FieldKindMismatch {
                    field: field.to_string(),
                    expected,
                });
            }
        }
        self.rebuild_hierarchy();
        Ok(())
    }

    /// Tombstones a slot without shifting. References to it dangle until
    /// `validate_references` or `compact` runs.
    pub fn clear_slot(&mut self, index: u32) -> Result<Instance> {
        self.instance(index)?;
        let inst = self.instances[index as usize]
            .take()
            .ok_or(HeapError::EmptySlot(index))?;
        self.ids.remove(index);
        self.containers.retain(|c| c.owner_index != index);
        self.rebuild_hierarchy();
        Ok(inst)
    }

    /// Drops tombstoned slots and renumbers densely. Returns the old -> new map
    /// (tombstones map to 0).
    pub fn compact(&mut self) -> BTreeMap<u32, u32> {
        let mut map = BTreeMap::new();
        let mut next = 1u32;
        for (i, slot) in self.instances.iter().enumerate().skip(1) {
            let i = i as u32;
            if slot.is_some() {
                if i != next {
                    map.insert(i, next);
                }
                next += 1;
            } else {
                map.insert(i, 0);
            }
        }
        if map.is_empty() {
            return map;
        }

        let old = std::mem::take(&mut self.instances);
        self.instances.push(None);
        self.instances.extend(old.into_iter().skip(1).filter(Option::is_some));
        self.shift_references(&map);
        self.rebuild_hierarchy();
        map
    }

    /// Nulls every reference that does not address a populated slot and drops
    /// invalid object-table entries. Returns the number of values nulled.
    pub fn validate_references(&mut self) -> usize {
        let dangling: BTreeSet<u32> = self
            .iter()
            .flat_map(|(_, inst)| inst.refs())
            .filter(|&r| !self.contains(r))
            .collect();

        let mut nulled = 0;
        for inst in self.instances.iter_mut().flatten() {
            nulled += inst.remap_refs(&mut |r| if dangling.contains(&r) { 0 } else { r });
        }

        let instances = &self.instances;
        self.object_table.retain(|&r| {
            r != 0 && instances.get(r as usize).is_some_and(Option::is_some)
        });

        if nulled > 0 {
            log::warn!("heap: nulled {nulled} dangling reference(s)");
            self.rebuild_hierarchy();
        }
        nulled
    }

    pub(crate) fn retain_slots(&mut self, keep: impl Fn(u32) -> bool) {
        let old = std::mem::take(&mut self.instances);
        self.instances = old
            .into_iter()
            .enumerate()
            .filter(|(i, _)| *i == 0 || keep(*i as u32))
            .map(|(_, slot)| slot)
            .collect();
    }

    pub(crate) fn rebuild_hierarchy(&mut self) {
        let edges: Vec<(u32, Vec<u32>)> = self
            .iter()
            .map(|(index, inst)| (index, inst.refs()))
            .collect();

        self.hierarchy.clear();
        for (index, _) in &edges {
            self.hierarchy.entry(*index).or_default();
        }
        for (index, children) in edges {
            for child in children {
                if !self.contains(child) {
                    continue;
                }
                let entry = self.hierarchy.entry(index).or_default();
                if !entry.children.contains(&child) {
                    entry.children.push(child);
                }
                self.hierarchy.entry(child).or_default().parent = Some(index);
            }
        }
    }
}
