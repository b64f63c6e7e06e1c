use std::collections::{BTreeMap, BTreeSet};

use reasy_scene::{EmbeddedContainer, InstanceHeap};
use reasy_types::TypeRegistry;
use reasy_variant::{FieldMap, Value};

use crate::error::{ClipboardError, Result};
use crate::graph::{
    EMBEDDED_CONTEXT, EmbeddedGraph, EmbeddedUserData, GraphInstance, ObjectGraph, TransportFields,
    TransportValue,
};

/// Half-open neighbourhood of `root` in the object table: the closest entries
/// below and above it. 0 and `u32::MAX` stand in for missing neighbours.
pub fn component_range(heap: &InstanceHeap, root: u32) -> (u32, u32) {
    let table = heap.object_table();
    let prev = table.iter().copied().filter(|&r| r < root).max().unwrap_or(0);
    let next = table
        .iter()
        .copied()
        .filter(|&r| r > root)
        .min()
        .unwrap_or(u32::MAX);
    (prev, next)
}

/// Absolute ids copied along with `root`. Object references leave the graph when
/// they point at another top-level entry or outside the component range.
/// Userdata slots are always taken.
pub fn graph_members(heap: &InstanceHeap, root: u32) -> BTreeSet<u32> {
    let (prev, next) = component_range(heap, root);
    heap.reachable([root], |id| {
        id == root
            || heap.container(id).is_some()
            || (prev < id && id < next && !heap.is_root(id))
    })
}

/// Copies the subgraph rooted at `root` into its clipboard form. The result is a
/// pure function of the heap: extracting twice yields identical graphs.
pub fn extract(registry: &TypeRegistry, heap: &InstanceHeap, root: u32) -> Result<TransportValue> {
    let root_inst = heap.instance(root)?;
    let type_name = registry.require(root_inst.type_id)?.name.clone();

    let members = graph_members(heap, root);
    let relative: BTreeMap<u32, u32> = members
        .iter()
        .enumerate()
        .map(|(rel, &abs)| (abs, rel as u32))
        .collect();

    let mut external = BTreeSet::new();
    let mut instances = Vec::with_capacity(relative.len());
    for (&abs, &rel) in &relative {
        let inst = heap.instance(abs)?;
        registry.require(inst.type_id)?;
        let embedded = match heap.container(abs) {
            Some(container) => Some(Box::new(embed_container(container)?)),
            None => None,
        };
        instances.push(GraphInstance {
            id: rel,
            type_id: inst.type_id,
            crc: inst.crc,
            fields: transport_fields(&inst.fields, &relative, &mut external),
            embedded,
        });
    }

    let root_id = relative
        .get(&root)
        .copied()
        .ok_or_else(|| ClipboardError::InvalidGraph(format!("root {root} is not part of its own graph")))?;
    let graph = ObjectGraph {
        root_id,
        instances,
        external_refs: external.into_iter().collect(),
    };
    log::debug!(
        "clipboard: extracted {type_name} at {root}: {} instance(s), {} external ref(s)",
        graph.instances.len(),
        graph.external_refs.len()
    );

    Ok(if heap.container(root).is_some() {
        TransportValue::UserDataData {
            value: root,
            string: type_name.clone(),
            is_external_ref: false,
            in_graph: false,
            orig_type: type_name,
            object_graph: Some(graph),
        }
    } else {
        TransportValue::ObjectData {
            value: root,
            is_external_ref: false,
            in_graph: false,
            orig_type: type_name,
            object_graph: Some(graph),
        }
    })
}

/// Captures a whole nested container, ids untouched, nested containers included.
pub fn embed_container(container: &EmbeddedContainer) -> Result<EmbeddedGraph> {
    let heap = container
        .heap()
        .ok_or(ClipboardError::OpaqueContainer(container.owner_index))?;

    let ids: BTreeMap<u32, u32> = heap.iter().map(|(i, _)| (i, i)).collect();
    let mut dangling = BTreeSet::new();
    let instances = heap
        .iter()
        .map(|(id, inst)| GraphInstance {
            id,
            type_id: inst.type_id,
            crc: inst.crc,
            fields: transport_fields(&inst.fields, &ids, &mut dangling),
            embedded: None,
        })
        .collect();
    if !dangling.is_empty() {
        log::warn!(
            "clipboard: nested container at {} has {} dangling reference(s)",
            container.owner_index,
            dangling.len()
        );
    }

    let userdata_infos = heap
        .containers()
        .iter()
        .map(|child| {
            Ok(EmbeddedUserData {
                instance_id: child.owner_index,
                graph: embed_container(child)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(EmbeddedGraph {
        context_type: EMBEDDED_CONTEXT.to_string(),
        magic: container.header.magic,
        version: container.header.version,
        type_id: container.type_id,
        path_hash: container.path_hash,
        object_table: heap.object_table().to_vec(),
        instances,
        userdata_infos,
    })
}

fn transport_fields(
    fields: &FieldMap,
    ids: &BTreeMap<u32, u32>,
    external: &mut BTreeSet<u32>,
) -> TransportFields {
    fields
        .iter()
        .map(|(name, value)| (name.clone(), to_transport(value, ids, external)))
        .collect()
}

/// `ids` maps in-graph absolute ids to their transported id. Anything else is external.
fn to_transport(value: &Value, ids: &BTreeMap<u32, u32>, external: &mut BTreeSet<u32>) -> TransportValue {
    match value {
        Value::Scalar(s) => TransportValue::ScalarData { value: s.clone() },
        Value::Object(index) => {
            let (value, in_graph, is_external_ref) = classify(*index, ids, external);
            TransportValue::ObjectData {
                value,
                is_external_ref,
                in_graph,
                orig_type: String::new(),
                object_graph: None,
            }
        }
        Value::UserData { index, string } => {
            let (value, in_graph, is_external_ref) = classify(*index, ids, external);
            TransportValue::UserDataData {
                value,
                string: string.clone(),
                is_external_ref,
                in_graph,
                orig_type: String::new(),
                object_graph: None,
            }
        }
        Value::Array { kind, items } => TransportValue::ArrayData {
            element_kind: *kind,
            values: items.iter().map(|v| to_transport(v, ids, external)).collect(),
        },
        Value::Struct { type_name, items } => TransportValue::StructData {
            type_name: type_name.clone(),
            values: items
                .iter()
                .map(|fields| transport_fields(fields, ids, external))
                .collect(),
        },
    }
}

fn classify(index: u32, ids: &BTreeMap<u32, u32>, external: &mut BTreeSet<u32>) -> (u32, bool, bool) {
    if index == 0 {
        return (0, false, false);
    }
    match ids.get(&index) {
        Some(&rel) => (rel, true, false),
        None => {
            external.insert(index);
            (index, false, true)
        }
    }
}
