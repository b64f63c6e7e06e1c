use std::collections::BTreeMap;

use reasy_scene::{ContainerBody, EmbeddedContainer, InstanceHeap};
use reasy_types::TypeRegistry;

use super::common::{
    InstanceInfo, RszHeader, SECTION_ALIGN, USERDATA_INFO_SIZE, UserDataInfo, align_up, pad_to, write_header,
    write_instance_info, write_userdata_info,
};
use super::fields::encode_fields;
use crate::error::{CodecError, Result};
use crate::hash::hash_utf16;

/// Path hash a container is written with: the hash of its root's first non-empty
/// text field, or the stored value when the root has none.
pub fn path_hash_of(container: &EmbeddedContainer) -> u32 {
    container
        .heap()
        .and_then(|heap| {
            let root = *heap.object_table().first()?;
            heap.get(root)?.first_text().map(hash_utf16)
        })
        .unwrap_or(container.path_hash)
}

/// Stores the recomputed path hash on every container of the tree.
pub fn refresh_path_hashes(container: &mut EmbeddedContainer) {
    container.path_hash = path_hash_of(container);
    if let Some(heap) = container.heap_mut() {
        let owners: Vec<u32> = heap.containers().iter().map(|c| c.owner_index).collect();
        for owner in owners {
            if let Some(child) = heap.container_mut(owner) {
                refresh_path_hashes(child);
            }
        }
    }
}

/// Old index -> dense new index for every live slot. Tombstones are absent.
fn dense_numbering(heap: &InstanceHeap) -> BTreeMap<u32, u32> {
    let mut map = BTreeMap::new();
    map.insert(0, 0);
    for (next, (index, _)) in heap.iter().enumerate() {
        map.insert(index, next as u32 + 1);
    }
    map
}

/// Serialises a container. Opaque containers are returned verbatim; heaps are
/// written densely with every nested container rebuilt first.
pub fn build(registry: &TypeRegistry, container: &EmbeddedContainer) -> Result<Vec<u8>> {
    match &container.body {
        ContainerBody::Opaque(bytes) => Ok(bytes.clone()),
        ContainerBody::Heap(heap) => build_heap(registry, container, heap),
    }
}

fn build_heap(registry: &TypeRegistry, container: &EmbeddedContainer, heap: &InstanceHeap) -> Result<Vec<u8>> {
    let numbering = dense_numbering(heap);
    let renumber = |index: u32| numbering.get(&index).copied().unwrap_or(0);

    let object_table: Vec<u32> = heap.object_table().iter().map(|&i| renumber(i)).collect();
    let mut infos = vec![InstanceInfo::default()];
    infos.extend(heap.iter().map(|(_, inst)| InstanceInfo {
        type_id: inst.type_id,
        crc: inst.crc,
    }));

    let mut children = Vec::new();
    for child in heap.containers() {
        let instance_id = renumber(child.owner_index);
        if instance_id == 0 {
            continue;
        }
        let bytes = build(registry, child)?;
        children.push((
            UserDataInfo {
                instance_id,
                type_id: child.type_id,
                path_hash: path_hash_of(child),
                data_size: bytes.len() as u32,
                rsz_offset: 0,
            },
            bytes,
        ));
    }
    children.sort_by_key(|(info, _)| info.instance_id);

    let mut header = RszHeader {
        magic: container.header.magic,
        version: container.header.version,
        object_count: object_table.len() as u32,
        instance_count: infos.len() as u32,
        userdata_count: children.len() as u32,
        reserved: container.header.reserved,
        ..RszHeader::default()
    };
    if header.is_legacy() && !children.is_empty() {
        return Err(CodecError::format(format!(
            "version {} containers cannot host userdata",
            header.version
        )));
    }

    let mut out = Vec::new();
    write_header(&mut out, &header)?;
    for entry in &object_table {
        out.extend_from_slice(&(*entry as i32).to_le_bytes());
    }

    header.instance_offset = out.len() as u64;
    for info in &infos {
        write_instance_info(&mut out, info)?;
    }
    pad_to(&mut out, SECTION_ALIGN);

    if !header.is_legacy() {
        header.userdata_offset = out.len() as u64;
        let table_end = out.len() + children.len() * USERDATA_INFO_SIZE;
        let mut blob_offset = align_up(table_end, SECTION_ALIGN);
        for (info, bytes) in &mut children {
            info.rsz_offset = blob_offset as u64;
            blob_offset += align_up(bytes.len(), SECTION_ALIGN);
            write_userdata_info(&mut out, info)?;
        }
        pad_to(&mut out, SECTION_ALIGN);
        for (_, bytes) in &children {
            out.extend_from_slice(bytes);
            pad_to(&mut out, SECTION_ALIGN);
        }
    }

    header.data_offset = out.len() as u64;
    let hosting: Vec<u32> = heap.containers().iter().map(|c| c.owner_index).collect();
    let mut data = Vec::new();
    for (index, inst) in heap.iter() {
        if hosting.contains(&index) {
            continue;
        }
        let type_info = registry.require(inst.type_id)?;
        let mut fields = inst.fields.clone();
        for value in fields.values_mut() {
            value.remap_refs(&mut |r| renumber(r));
        }
        encode_fields(registry, &mut data, &type_info.fields, &fields)?;
    }
    out.extend_from_slice(&data);

    let mut head = Vec::with_capacity(header.size());
    write_header(&mut head, &header)?;
    out[..head.len()].copy_from_slice(&head);

    log::debug!(
        "rsz: built {} bytes ({} instances, {} userdata)",
        out.len(),
        header.instance_count,
        header.userdata_count
    );
    Ok(out)
}
