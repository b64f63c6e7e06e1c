use std::fmt;

use reasy_ids::InstanceHandle;
use reasy_types::{FieldKind, TypeRegistry};
use reasy_variant::{Scalar, Value};

use crate::delete::DeleteReport;
use crate::error::{HeapError, Result};
use crate::heap::InstanceHeap;
use crate::instance::Instance;

/// "RSZ\0" read as a little-endian u32.
pub const RSZ_MAGIC: u32 = 0x005A_5352;
pub const DEFAULT_RSZ_VERSION: u32 = 16;

/// Header words carried through untouched; offsets and counts are recomputed on build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerHeader {
    pub magic: u32,
    pub version: u32,
    pub reserved: u32,
}

impl Default for ContainerHeader {
    fn default() -> Self {
        Self {
            magic: RSZ_MAGIC,
            version: DEFAULT_RSZ_VERSION,
            reserved: 0,
        }
    }
}

/// A container either decoded into a heap, or kept as the bytes it came in as.
#[derive(Debug, Clone, PartialEq)]
pub enum ContainerBody {
    Heap(InstanceHeap),
    Opaque(Vec<u8>),
}

/// Self-contained RSZ blob hosted by a userdata slot of its parent heap.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddedContainer {
    /// Slot in the parent heap that hosts this blob. 0 for a top-level container.
    pub owner_index: u32,
    pub type_id: u32,
    pub path_hash: u32,
    pub header: ContainerHeader,
    pub body: ContainerBody,
    pub modified: bool,
}

/// Route from a top-level container to a nested one: one owner handle per hop.
/// Handles survive index shifts, so a path stays valid across edits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ContainerPath(Vec<InstanceHandle>);

impl ContainerPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn child(&self, owner: InstanceHandle) -> Self {
        let mut hops = self.0.clone();
        hops.push(owner);
        Self(hops)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    pub fn hops(&self) -> &[InstanceHandle] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }
}

impl fmt::Display for ContainerPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("root")?;
        for hop in &self.0 {
            write!(f, "/{hop}")?;
        }
        Ok(())
    }
}

impl EmbeddedContainer {
    /// Top-level container around an already decoded heap.
    pub fn top_level(type_id: u32, header: ContainerHeader, heap: InstanceHeap) -> Self {
        Self {
            owner_index: 0,
            type_id,
            path_hash: 0,
            header,
            body: ContainerBody::Heap(heap),
            modified: false,
        }
    }

    /// Fresh container holding one default instance of `type_name` as its root.
    pub fn for_type(
        registry: &TypeRegistry,
        owner_index: u32,
        type_name: &str,
        header: ContainerHeader,
    ) -> Result<Self> {
        let (_, type_id) = registry.require_by_name(type_name)?;
        let root = Instance::with_defaults(registry, type_id)?;
        let heap = InstanceHeap::from_parts(vec![None, Some(root)], vec![1], Vec::new());
        Ok(Self {
            owner_index,
            type_id,
            path_hash: 0,
            header,
            body: ContainerBody::Heap(heap),
            modified: true,
        })
    }

    pub fn heap(&self) -> Option<&InstanceHeap> {
        match &self.body {
            ContainerBody::Heap(heap) => Some(heap),
            ContainerBody::Opaque(_) => None,
        }
    }

    pub fn heap_mut(&mut self) -> Option<&mut InstanceHeap> {
        match &mut self.body {
            ContainerBody::Heap(heap) => Some(heap),
            ContainerBody::Opaque(_) => None,
        }
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self.body, ContainerBody::Opaque(_))
    }

    /// Root instance of the heap: the first object-table entry.
    pub fn root_index(&self) -> Option<u32> {
        self.heap()?.object_table().first().copied()
    }

    // ---- navigation ----

    pub fn container_at(&self, path: &ContainerPath) -> Option<&EmbeddedContainer> {
        let mut current = self;
        for hop in path.hops() {
            let heap = current.heap()?;
            let owner = heap.index_of(*hop)?;
            current = heap.container(owner)?;
        }
        Some(current)
    }

    pub fn container_at_mut(&mut self, path: &ContainerPath) -> Option<&mut EmbeddedContainer> {
        self.descend_mut(path.hops())
    }

    fn descend_mut(&mut self, hops: &[InstanceHandle]) -> Option<&mut EmbeddedContainer> {
        let Some((first, rest)) = hops.split_first() else {
            return Some(self);
        };
        let heap = self.heap_mut()?;
        let owner = heap.index_of(*first)?;
        heap.container_mut(owner)?.descend_mut(rest)
    }

    pub fn heap_at(&self, path: &ContainerPath) -> Result<&InstanceHeap> {
        let container = self
            .container_at(path)
            .ok_or_else(|| HeapError::UnknownContainer(path.to_string()))?;
        container
            .heap()
            .ok_or_else(|| HeapError::OpaqueContainer(path.to_string()))
    }

    pub fn heap_at_mut(&mut self, path: &ContainerPath) -> Result<&mut InstanceHeap> {
        let container = self
            .container_at_mut(path)
            .ok_or_else(|| HeapError::UnknownContainer(path.to_string()))?;
        container
            .heap_mut()
            .ok_or_else(|| HeapError::OpaqueContainer(path.to_string()))
    }

    /// Builds a path from owner indices, outermost first.
    pub fn path_from_indices(&self, owners: &[u32]) -> Option<ContainerPath> {
        let mut path = ContainerPath::root();
        let mut current = self;
        for &owner in owners {
            let heap = current.heap()?;
            let next = heap.container(owner)?;
            path = path.child(heap.handle_of(owner)?);
            current = next;
        }
        Some(path)
    }

    /// Flags every container on `path` as modified, so the chain gets rebuilt.
    pub fn mark_modified(&mut self, path: &ContainerPath) {
        self.mark_chain(path.hops());
    }

    fn mark_chain(&mut self, hops: &[InstanceHandle]) {
        self.modified = true;
        let Some((first, rest)) = hops.split_first() else {
            return;
        };
        let Some(heap) = self.heap_mut() else {
            return;
        };
        if let Some(owner) = heap.index_of(*first) {
            if let Some(child) = heap.container_mut(owner) {
                child.mark_chain(rest);
            }
        }
    }

    /// Every container in the tree, depth-first, this one included.
    pub fn walk(&self) -> Vec<(ContainerPath, &EmbeddedContainer)> {
        let mut out = Vec::new();
        self.walk_into(ContainerPath::root(), &mut out);
        out
    }

    fn walk_into<'a>(&'a self, path: ContainerPath, out: &mut Vec<(ContainerPath, &'a EmbeddedContainer)>) {
        out.push((path.clone(), self));
        let Some(heap) = self.heap() else {
            return;
        };
        for child in heap.containers() {
            if let Some(handle) = heap.handle_of(child.owner_index) {
                child.walk_into(path.child(handle), out);
            }
        }
    }

    /// Distinct non-empty resource paths across the whole tree, in first-seen order.
    pub fn collect_resources(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for (_, container) in self.walk() {
            let Some(heap) = container.heap() else {
                continue;
            };
            for (_, inst) in heap.iter() {
                for value in inst.fields.values() {
                    value.for_each_scalar(&mut |s| {
                        if let Scalar::Resource(path) = s {
                            let path = path.trim_matches('\0');
                            if !path.is_empty() && !out.iter().any(|p| p == path) {
                                out.push(path.to_string());
                            }
                        }
                    });
                }
            }
        }
        out
    }

    // ---- editing ----

    /// Creates a default instance of `type_name` and links it from `owner.field`.
    /// The new instance is placed ahead of its owner. Returns its index.
    pub fn create_object(
        &mut self,
        path: &ContainerPath,
        registry: &TypeRegistry,
        owner: u32,
        field: &str,
        type_name: &str,
    ) -> Result<u32> {
        let heap = self.heap_at(path)?;
        check_field_kind(registry, heap, owner, field, &[FieldKind::Object, FieldKind::MaybeObject], "object")?;
        let (_, type_id) = registry.require_by_name(type_name)?;
        let instance = Instance::with_defaults(registry, type_id)?;
        let at = heap.insertion_index(registry, owner, field)?;

        let heap = self.heap_at_mut(path)?;
        let index = heap.insert(at, instance)?;
        let owner = if owner >= at { owner + 1 } else { owner };
        heap.link_reference(owner, field, Value::Object(index))?;
        self.mark_modified(path);
        log::debug!("container {path}: created {type_name} at {index}");
        Ok(index)
    }

    /// Creates a default instance of `type_name` as a new top-level object.
    /// After `after_root` it takes the slot following that root and the table entry
    /// following its own, so the neighbouring component ranges stay intact.
    /// Without an anchor it is appended. Returns its index.
    pub fn create_root_object(
        &mut self,
        path: &ContainerPath,
        registry: &TypeRegistry,
        type_name: &str,
        after_root: Option<u32>,
    ) -> Result<u32> {
        let heap = self.heap_at(path)?;
        let (_, type_id) = registry.require_by_name(type_name)?;
        let instance = Instance::with_defaults(registry, type_id)?;
        let (at, position) = match after_root {
            Some(anchor) => {
                let position = heap
                    .object_table()
                    .iter()
                    .position(|&entry| entry == anchor)
                    .ok_or(HeapError::NotARoot(anchor))?;
                (anchor + 1, position + 1)
            }
            None => (heap.len() as u32, heap.object_table().len()),
        };

        let heap = self.heap_at_mut(path)?;
        let index = heap.insert(at, instance)?;
        heap.insert_root(position, index)?;
        self.mark_modified(path);
        log::debug!("container {path}: created root {type_name} at {index}, table entry {position}");
        Ok(index)
    }

    /// Creates a userdata slot of `type_name` hosting a fresh nested container,
    /// and links it from `owner.field`. Returns the slot index.
    pub fn create_userdata(
        &mut self,
        path: &ContainerPath,
        registry: &TypeRegistry,
        owner: u32,
        field: &str,
        type_name: &str,
    ) -> Result<u32> {
        let header = self
            .container_at(path)
            .map(|c| c.header)
            .ok_or_else(|| HeapError::UnknownContainer(path.to_string()))?;
        let heap = self.heap_at(path)?;
        check_field_kind(registry, heap, owner, field, &[FieldKind::UserData], "userdata")?;
        let (info, type_id) = registry.require_by_name(type_name)?;
        let slot = Instance::userdata_slot(type_id, info.crc);
        let at = heap.insertion_index(registry, owner, field)?;
        let mut nested = EmbeddedContainer::for_type(registry, at, type_name, header)?;

        let heap = self.heap_at_mut(path)?;
        let index = heap.insert(at, slot)?;
        nested.owner_index = index;
        heap.attach_container(nested)?;
        let owner = if owner >= at { owner + 1 } else { owner };
        heap.link_reference(
            owner,
            field,
            Value::UserData {
                index,
                string: type_name.to_string(),
            },
        )?;
        self.mark_modified(path);
        log::debug!("container {path}: created userdata {type_name} at {index}");
        Ok(index)
    }

    /// Removes one element of a reference array. The former target is deleted only
    /// when nothing else references it and it is not a root.
    pub fn remove_array_element(
        &mut self,
        path: &ContainerPath,
        owner: u32,
        field: &str,
        element: usize,
    ) -> Result<DeleteReport> {
        let heap = self.heap_at_mut(path)?;
        let inst = heap.instance(owner)?;
        let items = inst
            .field(field)
            .and_then(Value::as_array)
            .ok_or_else(|| HeapError::FieldKindMismatch {
                field: field.to_string(),
                expected: "array",
            })?;
        let removed = items
            .get(element)
            .ok_or_else(|| HeapError::ElementOutOfRange {
                field: field.to_string(),
                element,
            })?
            .clone();

        let mut updated = items.to_vec();
        updated.remove(element);
        let kind = match inst.field(field) {
            Some(Value::Array { kind, .. }) => *kind,
            _ => FieldKind::Data,
        };
        heap.set_field(owner, field, Value::Array { kind, items: updated })?;

        let mut report = DeleteReport::default();
        for target in removed.refs() {
            if heap.referrers_of(target).is_empty() && !heap.is_root(target) {
                report = heap.delete(target)?;
            }
        }
        self.mark_modified(path);
        Ok(report)
    }

    pub fn delete_instance(&mut self, path: &ContainerPath, index: u32) -> Result<DeleteReport> {
        let report = self.heap_at_mut(path)?.delete(index)?;
        if !report.is_noop() {
            self.mark_modified(path);
        }
        Ok(report)
    }

    pub fn set_field(
        &mut self,
        path: &ContainerPath,
        index: u32,
        field: &str,
        value: Value,
    ) -> Result<Option<Value>> {
        let old = self.heap_at_mut(path)?.set_field(index, field, value)?;
        self.mark_modified(path);
        Ok(old)
    }
}

fn check_field_kind(
    registry: &TypeRegistry,
    heap: &InstanceHeap,
    owner: u32,
    field: &str,
    accepted: &[FieldKind],
    expected: &'static str,
) -> Result<()> {
    let inst = heap.instance(owner)?;
    let info = registry.require(inst.type_id)?;
    let def = info.field(field).ok_or_else(|| HeapError::UnknownField {
        type_name: info.name.clone(),
        field: field.to_string(),
    })?;
    if accepted.contains(&def.kind) {
        Ok(())
    } else {
        Err(HeapError::FieldKindMismatch {
            field: field.to_string(),
            expected,
        })
    }
}
