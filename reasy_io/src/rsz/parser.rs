use std::collections::BTreeSet;
use std::io::Cursor;

use reasy_scene::{ContainerBody, ContainerHeader, EmbeddedContainer, Instance, InstanceHeap};
use reasy_types::TypeRegistry;

use super::common::{
    INSTANCE_INFO_SIZE, InstanceInfo, RszHeader, USERDATA_INFO_SIZE, UserDataInfo, read_header, read_i32,
    read_instance_info, read_userdata_info,
};
use super::fields::{DecodeContext, decode_fields};
use crate::error::{CodecError, Result};

/// Nested blobs deeper than this are kept opaque.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Parses a top-level blob. The container's type is that of its first root.
pub fn parse(registry: &TypeRegistry, bytes: &[u8]) -> Result<EmbeddedContainer> {
    let (header, heap) = parse_heap(registry, bytes, 0)?;
    let type_id = heap
        .object_table()
        .first()
        .and_then(|&root| heap.get(root))
        .map_or(0, |inst| inst.type_id);

    log::debug!(
        "rsz: parsed {} instance(s), {} nested container(s)",
        heap.live_count(),
        heap.containers().len()
    );
    Ok(EmbeddedContainer::top_level(type_id, header, heap))
}

fn container_header(header: &RszHeader) -> ContainerHeader {
    ContainerHeader {
        magic: header.magic,
        version: header.version,
        reserved: header.reserved,
    }
}

fn check_table(what: &str, start: u64, count: u32, entry: usize, len: usize) -> Result<()> {
    let end = start.saturating_add(u64::from(count) * entry as u64);
    if end > len as u64 {
        return Err(CodecError::format(format!(
            "{what} ({count} entries at {start:#x}) overflows the {len}-byte blob"
        )));
    }
    Ok(())
}

/// Reads header and tables, then decodes every instance. Nothing is returned
/// unless the whole blob decodes.
fn parse_heap(registry: &TypeRegistry, bytes: &[u8], depth: usize) -> Result<(ContainerHeader, InstanceHeap)> {
    let len = bytes.len();
    let mut cursor = Cursor::new(bytes);
    let header = read_header(&mut cursor)
        .map_err(|_| CodecError::format(format!("blob of {len} bytes is too short for a header")))?;
    let header_size = header.size();

    if header.object_count == 0 {
        return Err(CodecError::format("object table is empty"));
    }
    let mut offsets = vec![("instance", header.instance_offset), ("data", header.data_offset)];
    if !header.is_legacy() {
        offsets.push(("userdata", header.userdata_offset));
    }
    for (name, offset) in offsets {
        if offset > len as u64 {
            return Err(CodecError::format(format!(
                "{name} offset {offset:#x} is past the end of the {len}-byte blob"
            )));
        }
        if offset < header_size as u64 {
            return Err(CodecError::format(format!(
                "{name} offset {offset:#x} overlaps the {header_size}-byte header"
            )));
        }
    }

    check_table("object table", header_size as u64, header.object_count, 4, len)?;
    let mut object_table = Vec::with_capacity(header.object_count as usize);
    for _ in 0..header.object_count {
        let entry = read_i32(&mut cursor)?;
        object_table.push(entry.max(0) as u32);
    }

    check_table("instance table", header.instance_offset, header.instance_count, INSTANCE_INFO_SIZE, len)?;
    cursor.set_position(header.instance_offset);
    let mut infos = Vec::with_capacity(header.instance_count as usize);
    for _ in 0..header.instance_count {
        infos.push(read_instance_info(&mut cursor)?);
    }

    let mut userdata = Vec::new();
    if !header.is_legacy() && header.userdata_count > 0 {
        check_table("userdata table", header.userdata_offset, header.userdata_count, USERDATA_INFO_SIZE, len)?;
        cursor.set_position(header.userdata_offset);
        for _ in 0..header.userdata_count {
            let info = read_userdata_info(&mut cursor)?;
            if info.instance_id == 0 || info.instance_id >= header.instance_count {
                return Err(CodecError::format(format!(
                    "userdata descriptor names instance {} of {}",
                    info.instance_id, header.instance_count
                )));
            }
            userdata.push(info);
        }
    }

    let instances = decode_instances(registry, bytes, &header, &infos, &userdata)?;

    let mut containers = Vec::with_capacity(userdata.len());
    for info in &userdata {
        containers.push(parse_nested(registry, bytes, info, depth)?);
    }

    let heap = InstanceHeap::from_parts(instances, object_table, containers);
    Ok((container_header(&header), heap))
}

fn decode_instances(
    registry: &TypeRegistry,
    bytes: &[u8],
    header: &RszHeader,
    infos: &[InstanceInfo],
    userdata: &[UserDataInfo],
) -> Result<Vec<Option<Instance>>> {
    let hosting: BTreeSet<u32> = userdata.iter().map(|u| u.instance_id).collect();
    let slot_types: Vec<u32> = infos.iter().map(|i| i.type_id).collect();
    let ctx = DecodeContext {
        registry,
        slot_types: &slot_types,
    };

    let data = &bytes[header.data_offset as usize..];
    let mut reader = Cursor::new(data);
    let mut instances = Vec::with_capacity(infos.len());

    for (i, info) in infos.iter().enumerate() {
        let index = i as u32;
        if index == 0 || info.type_id == 0 {
            instances.push(None);
            continue;
        }
        if hosting.contains(&index) {
            instances.push(Some(Instance::userdata_slot(info.type_id, info.crc)));
            continue;
        }
        let type_info = registry.require(info.type_id)?;
        let fields = decode_fields(&ctx, &mut reader, &type_info.fields, index).map_err(|e| match e {
            CodecError::Format(msg) => CodecError::format(format!(
                "instance {index} ({}): {msg}",
                type_info.name
            )),
            other => other,
        })?;
        instances.push(Some(Instance::new(info.type_id, info.crc, fields)));
    }
    Ok(instances)
}

/// A nested blob that cannot be decoded stays opaque; the parent still parses.
fn parse_nested(
    registry: &TypeRegistry,
    bytes: &[u8],
    info: &UserDataInfo,
    depth: usize,
) -> Result<EmbeddedContainer> {
    let start = info.rsz_offset as usize;
    let blob = start
        .checked_add(info.data_size as usize)
        .and_then(|end| bytes.get(start..end))
        .ok_or_else(|| {
            CodecError::format(format!(
                "userdata {} ({} bytes at {start:#x}) lies outside the {}-byte blob",
                info.instance_id,
                info.data_size,
                bytes.len()
            ))
        })?;

    let parsed = if depth + 1 > MAX_NESTING_DEPTH {
        Err(CodecError::format("nesting too deep"))
    } else {
        parse_heap(registry, blob, depth + 1)
    };

    let (header, body) = match parsed {
        Ok((header, heap)) => (header, ContainerBody::Heap(heap)),
        Err(err) => {
            log::warn!(
                "rsz: userdata {} kept opaque ({} bytes): {err}",
                info.instance_id,
                blob.len()
            );
            let header = read_header(&mut Cursor::new(blob))
                .map(|h| container_header(&h))
                .unwrap_or_default();
            (header, ContainerBody::Opaque(blob.to_vec()))
        }
    };

    Ok(EmbeddedContainer {
        owner_index: info.instance_id,
        type_id: info.type_id,
        path_hash: info.path_hash,
        header,
        body,
        modified: false,
    })
}
