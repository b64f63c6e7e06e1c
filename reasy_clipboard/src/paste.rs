use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use reasy_scene::{
    ContainerBody, ContainerHeader, ContainerPath, EmbeddedContainer, HeapError, Instance,
    InstanceHeap,
};
use reasy_types::{FieldKind, TypeRegistry};
use reasy_variant::{FieldMap, Value};

use crate::compat::is_compatible;
use crate::error::{ClipboardError, Result};
use crate::graph::{EMBEDDED_CONTEXT, EmbeddedGraph, GraphInstance, ObjectGraph, TransportFields, TransportValue};
use crate::guid::GuidMapper;

/// Where the pasted root gets linked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasteTarget {
    /// Linked from `owner.field`: appended for arrays, replaced otherwise.
    Field { owner: u32, field: String },
    /// Appended after the last slot and registered in the object table.
    Root,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasteOptions {
    pub randomize_guids: bool,
}

impl Default for PasteOptions {
    fn default() -> Self {
        Self {
            randomize_guids: true,
        }
    }
}

impl PasteOptions {
    /// Keeps every GUID as copied. Used when restoring a structure in place.
    pub fn keep_guids() -> Self {
        Self {
            randomize_guids: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PasteOutcome {
    /// Reference to the pasted root, as linked into the target.
    pub root: Value,
    /// Slots occupied by the pasted instances.
    pub inserted: Range<u32>,
    /// External references that address nothing in the destination. Nulled in the pasted copy.
    pub unresolved_external_refs: Vec<u32>,
    pub guids_replaced: usize,
}

/// Pastes into the heap at `path` of `tree` and flags the chain up to the root as modified.
pub fn paste(
    registry: &TypeRegistry,
    tree: &mut EmbeddedContainer,
    path: &ContainerPath,
    target: &PasteTarget,
    element: &TransportValue,
    options: PasteOptions,
) -> Result<PasteOutcome> {
    let heap = tree.heap_at_mut(path)?;
    let outcome = paste_into_heap(registry, heap, target, element, options)?;
    tree.mark_modified(path);
    log::debug!(
        "clipboard: pasted {} instance(s) into {path} at {}",
        outcome.inserted.len(),
        outcome.inserted.start
    );
    Ok(outcome)
}

/// Reconstructs `element`'s object graph inside `heap`. Work happens on a staged
/// copy that replaces `heap` only once every step succeeded.
pub fn paste_into_heap(
    registry: &TypeRegistry,
    heap: &mut InstanceHeap,
    target: &PasteTarget,
    element: &TransportValue,
    options: PasteOptions,
) -> Result<PasteOutcome> {
    let graph = element
        .object_graph()
        .ok_or_else(|| ClipboardError::InvalidGraph("element carries no object graph".into()))?;
    validate_graph(registry, graph)?;

    let old_len = heap.len() as u32;
    let at = match target {
        PasteTarget::Root => old_len,
        PasteTarget::Field { owner, field } => {
            check_target_field(registry, heap, *owner, field, element, graph)?;
            heap.insertion_index(registry, *owner, field)?
        }
    };
    if at == 0 || at > old_len {
        let (owner, field) = match target {
            PasteTarget::Field { owner, field } => (*owner, field.clone()),
            PasteTarget::Root => (0, String::new()),
        };
        return Err(ClipboardError::NoInsertionWindow { owner, field });
    }

    let by_id: BTreeMap<u32, &GraphInstance> = graph.instances.iter().map(|i| (i.id, i)).collect();
    let order = paste_order(graph);
    let count = order.len() as u32;
    let new_index: BTreeMap<u32, u32> = order
        .iter()
        .enumerate()
        .map(|(pos, &id)| (id, at + pos as u32))
        .collect();

    let mut guids = GuidMapper::new(options.randomize_guids);
    let mut guids_replaced = 0;
    let mut unresolved = BTreeSet::new();
    let mut instances = Vec::with_capacity(order.len());
    let mut containers = Vec::new();

    for id in &order {
        let source = by_id
            .get(id)
            .ok_or_else(|| ClipboardError::InvalidGraph(format!("ordered id {id} has no instance")))?;
        let mut fields = rebuild_fields(&source.fields, &mut |value, in_graph, _| {
            if in_graph {
                return new_index.get(&value).copied().unwrap_or_else(|| {
                    log::warn!("clipboard: graph reference to missing id {value} nulled");
                    0
                });
            }
            // External: keep addressing the same destination instance across the splice.
            // Anything else would land on a pasted slot once the window opens.
            if !heap.contains(value) {
                unresolved.insert(value);
                0
            } else if value >= at {
                value + count
            } else {
                value
            }
        });
        guids_replaced += guids.apply(&mut fields);
        instances.push(Instance::new(source.type_id, source.crc, fields));

        if let (Some(embedded), Some(&owner)) = (&source.embedded, new_index.get(id)) {
            containers.push(rebuild_container(embedded, owner, &mut guids, &mut guids_replaced)?);
        }
    }

    let root = new_index
        .get(&graph.root_id)
        .copied()
        .ok_or_else(|| ClipboardError::InvalidGraph(format!("root id {} has no instance", graph.root_id)))?;
    let root_value = match element {
        TransportValue::UserDataData { string, orig_type, .. } => Value::UserData {
            index: root,
            string: if string.is_empty() { orig_type.clone() } else { string.clone() },
        },
        _ => Value::Object(root),
    };

    let mut staged = heap.clone();
    let inserted = staged.insert_many(at, instances)?;
    for container in containers {
        staged.attach_container(container)?;
    }
    match target {
        PasteTarget::Field { owner, field } => {
            let owner = if *owner >= at { owner + count } else { *owner };
            staged.link_reference(owner, field, root_value.clone())?;
        }
        PasteTarget::Root => staged.push_root(root)?,
    }
    *heap = staged;

    if !unresolved.is_empty() {
        log::warn!(
            "clipboard: {} external reference(s) do not resolve in the destination",
            unresolved.len()
        );
    }
    Ok(PasteOutcome {
        root: root_value,
        inserted,
        unresolved_external_refs: unresolved.into_iter().collect(),
        guids_replaced,
    })
}

/// Order in which graph instances take their new slots: children before the
/// instance referencing them, earlier fields first. Unreachable ids follow in
/// ascending order.
pub fn paste_order(graph: &ObjectGraph) -> Vec<u32> {
    let children: BTreeMap<u32, Vec<u32>> = graph
        .instances
        .iter()
        .map(|inst| (inst.id, inst.graph_refs()))
        .collect();

    let mut visited = BTreeSet::new();
    let mut order = Vec::with_capacity(children.len());
    post_order(graph.root_id, &children, &mut visited, &mut order);
    for &id in children.keys() {
        post_order(id, &children, &mut visited, &mut order);
    }
    order
}

fn post_order(
    start: u32,
    children: &BTreeMap<u32, Vec<u32>>,
    visited: &mut BTreeSet<u32>,
    order: &mut Vec<u32>,
) {
    if !children.contains_key(&start) || !visited.insert(start) {
        return;
    }
    let mut stack = vec![(start, 0usize)];
    while let Some(&(id, next)) = stack.last() {
        let kids = children.get(&id).map(Vec::as_slice).unwrap_or(&[]);
        match kids.get(next) {
            Some(&child) => {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                if children.contains_key(&child) && visited.insert(child) {
                    stack.push((child, 0));
                }
            }
            None => {
                order.push(id);
                stack.pop();
            }
        }
    }
}

fn validate_graph(registry: &TypeRegistry, graph: &ObjectGraph) -> Result<()> {
    let mut seen = BTreeSet::new();
    for inst in &graph.instances {
        if !seen.insert(inst.id) {
            return Err(ClipboardError::InvalidGraph(format!("duplicate instance id {}", inst.id)));
        }
        registry.require(inst.type_id)?;
        if let Some(embedded) = &inst.embedded {
            validate_embedded(registry, embedded)?;
        }
    }
    if !seen.contains(&graph.root_id) {
        return Err(ClipboardError::InvalidGraph(format!(
            "root id {} has no instance",
            graph.root_id
        )));
    }
    Ok(())
}

fn validate_embedded(registry: &TypeRegistry, graph: &EmbeddedGraph) -> Result<()> {
    if graph.context_type != EMBEDDED_CONTEXT {
        return Err(ClipboardError::InvalidGraph(format!(
            "unexpected embedded context `{}`",
            graph.context_type
        )));
    }
    for inst in &graph.instances {
        registry.require(inst.type_id)?;
    }
    for nested in &graph.userdata_infos {
        validate_embedded(registry, &nested.graph)?;
    }
    Ok(())
}

fn check_target_field(
    registry: &TypeRegistry,
    heap: &InstanceHeap,
    owner: u32,
    field: &str,
    element: &TransportValue,
    graph: &ObjectGraph,
) -> Result<()> {
    let inst = heap.instance(owner)?;
    let info = registry.require(inst.type_id)?;
    let def = info.field(field).ok_or_else(|| HeapError::UnknownField {
        type_name: info.name.clone(),
        field: field.to_string(),
    })?;
    let source_type = match element.orig_type().filter(|name| !name.is_empty()) {
        Some(name) => name.to_string(),
        None => {
            let root = graph
                .instance(graph.root_id)
                .ok_or_else(|| ClipboardError::InvalidGraph(format!("root id {} has no instance", graph.root_id)))?;
            registry.require(root.type_id)?.name.clone()
        }
    };
    let kind_fits = match element {
        TransportValue::ObjectData { .. } => {
            matches!(def.kind, FieldKind::Object | FieldKind::MaybeObject)
        }
        TransportValue::UserDataData { .. } => def.kind == FieldKind::UserData,
        _ => false,
    };
    if kind_fits && is_compatible(def.element_type(), &source_type) {
        Ok(())
    } else {
        Err(ClipboardError::Incompatible {
            target: def.original_type.clone(),
            source_type,
        })
    }
}

/// Rebuilds an embedded graph as a brand-new container with dense ids.
fn rebuild_container(
    graph: &EmbeddedGraph,
    owner_index: u32,
    guids: &mut GuidMapper,
    guids_replaced: &mut usize,
) -> Result<EmbeddedContainer> {
    let mut ids: Vec<u32> = graph.instances.iter().map(|i| i.id).filter(|&id| id != 0).collect();
    ids.sort_unstable();
    ids.dedup();
    let dense: BTreeMap<u32, u32> = ids
        .iter()
        .enumerate()
        .map(|(pos, &id)| (id, pos as u32 + 1))
        .collect();

    let mut slots: Vec<Option<Instance>> = vec![None; ids.len() + 1];
    for source in &graph.instances {
        let Some(&index) = dense.get(&source.id) else {
            continue;
        };
        let mut fields = rebuild_fields(&source.fields, &mut |value, in_graph, _| {
            if in_graph {
                dense.get(&value).copied().unwrap_or(0)
            } else {
                0
            }
        });
        *guids_replaced += guids.apply(&mut fields);
        if let Some(slot) = slots.get_mut(index as usize) {
            *slot = Some(Instance::new(source.type_id, source.crc, fields));
        }
    }

    let object_table = graph
        .object_table
        .iter()
        .filter_map(|id| dense.get(id).copied())
        .collect();
    let mut children = Vec::with_capacity(graph.userdata_infos.len());
    for nested in &graph.userdata_infos {
        match dense.get(&nested.instance_id) {
            Some(&owner) => children.push(rebuild_container(&nested.graph, owner, guids, guids_replaced)?),
            None => log::warn!(
                "clipboard: nested container for missing slot {} dropped",
                nested.instance_id
            ),
        }
    }

    let mut heap = InstanceHeap::from_parts(slots, object_table, children);
    heap.validate_references();
    Ok(EmbeddedContainer {
        owner_index,
        type_id: graph.type_id,
        path_hash: graph.path_hash,
        header: ContainerHeader {
            magic: graph.magic,
            version: graph.version,
            reserved: 0,
        },
        body: ContainerBody::Heap(heap),
        modified: true,
    })
}

/// `resolve(value, in_graph, is_external_ref)` yields the final index of a non-null reference.
fn rebuild_fields(fields: &TransportFields, resolve: &mut impl FnMut(u32, bool, bool) -> u32) -> FieldMap {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), rebuild_value(value, resolve)))
        .collect()
}

fn rebuild_value(value: &TransportValue, resolve: &mut impl FnMut(u32, bool, bool) -> u32) -> Value {
    match value {
        TransportValue::ScalarData { value } => Value::Scalar(value.clone()),
        TransportValue::ObjectData {
            value,
            in_graph,
            is_external_ref,
            ..
        } => Value::Object(resolve_ref(*value, *in_graph, *is_external_ref, resolve)),
        TransportValue::UserDataData {
            value,
            string,
            in_graph,
            is_external_ref,
            ..
        } => Value::UserData {
            index: resolve_ref(*value, *in_graph, *is_external_ref, resolve),
            string: string.clone(),
        },
        TransportValue::ArrayData {
            element_kind,
            values,
        } => Value::Array {
            kind: *element_kind,
            items: values.iter().map(|v| rebuild_value(v, resolve)).collect(),
        },
        TransportValue::StructData { type_name, values } => Value::Struct {
            type_name: type_name.clone(),
            items: values.iter().map(|fields| rebuild_fields(fields, resolve)).collect(),
        },
    }
}

fn resolve_ref(
    value: u32,
    in_graph: bool,
    is_external_ref: bool,
    resolve: &mut impl FnMut(u32, bool, bool) -> u32,
) -> u32 {
    if value == 0 && !in_graph {
        0
    } else {
        resolve(value, in_graph, is_external_ref)
    }
}
