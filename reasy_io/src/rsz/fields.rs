use std::io::{self, Cursor, Read};

use reasy_types::{FieldDef, FieldKind, RegistryError, TypeRegistry};
use reasy_variant::{FieldMap, Scalar, Value};
use uuid::Uuid;

use super::common::{align_up, pad_to, read_exact_array, read_u32};
use crate::error::{CodecError, Result};

/// Lookups the field decoder needs besides the bytes themselves.
pub(crate) struct DecodeContext<'a> {
    pub registry: &'a TypeRegistry,
    /// Type id of every slot in the heap being decoded, for userdata display names.
    pub slot_types: &'a [u32],
}

impl DecodeContext<'_> {
    fn userdata_name(&self, index: u32) -> String {
        self.slot_types
            .get(index as usize)
            .and_then(|&type_id| self.registry.type_name(type_id))
            .unwrap_or_default()
            .to_string()
    }
}

type Reader<'a> = Cursor<&'a [u8]>;

fn align_reader(reader: &mut Reader<'_>, align: u32) {
    let pos = reader.position() as usize;
    reader.set_position(align_up(pos, align as usize) as u64);
}

fn remaining(reader: &Reader<'_>) -> usize {
    reader
        .get_ref()
        .len()
        .saturating_sub(reader.position() as usize)
}

fn truncated(field: &str, err: io::Error) -> CodecError {
    CodecError::format(format!("field `{field}`: data truncated ({err})"))
}

/// Decodes every declared field of one instance, in declaration order.
pub(crate) fn decode_fields(
    ctx: &DecodeContext<'_>,
    reader: &mut Reader<'_>,
    fields: &[FieldDef],
    index: u32,
) -> Result<FieldMap> {
    let mut out = FieldMap::with_capacity(fields.len());
    for def in fields {
        let value = decode_field(ctx, reader, def, index)?;
        out.insert(def.name.clone(), value);
    }
    Ok(out)
}

fn decode_field(
    ctx: &DecodeContext<'_>,
    reader: &mut Reader<'_>,
    def: &FieldDef,
    index: u32,
) -> Result<Value> {
    if def.kind == FieldKind::Struct {
        return decode_struct(ctx, reader, def, index);
    }
    if !def.array {
        return decode_element(ctx, reader, def, index).map_err(|e| truncated(&def.name, e));
    }

    align_reader(reader, 4);
    let count = read_u32(reader).map_err(|e| truncated(&def.name, e))? as usize;
    if count > remaining(reader) {
        return Err(CodecError::format(format!(
            "field `{}`: array count {count} exceeds remaining data",
            def.name
        )));
    }

    if def.kind == FieldKind::MaybeObject {
        return decode_maybe_object_array(reader, def, count, index).map_err(|e| truncated(&def.name, e));
    }

    let mut items = Vec::with_capacity(count);
    for _ in 0..count {
        items.push(decode_element(ctx, reader, def, index).map_err(|e| truncated(&def.name, e))?);
    }
    Ok(Value::Array {
        kind: def.kind,
        items,
    })
}

/// The first element decides whether the whole array holds backward references.
fn decode_maybe_object_array(
    reader: &mut Reader<'_>,
    def: &FieldDef,
    count: usize,
    index: u32,
) -> io::Result<Value> {
    let mut raw = Vec::with_capacity(count);
    for _ in 0..count {
        align_reader(reader, def.align);
        raw.push(read_exact_array::<4, _>(reader)?);
    }
    let is_ref = raw
        .first()
        .map(|b| u32::from_le_bytes(*b))
        .is_some_and(|v| v > 0 && v < index);

    let items = raw
        .into_iter()
        .map(|b| {
            if is_ref {
                Value::Object(u32::from_le_bytes(b))
            } else {
                Value::Scalar(Scalar::Data(b.to_vec()))
            }
        })
        .collect();
    Ok(Value::Array {
        kind: def.kind,
        items,
    })
}

fn decode_struct(
    ctx: &DecodeContext<'_>,
    reader: &mut Reader<'_>,
    def: &FieldDef,
    index: u32,
) -> Result<Value> {
    let type_name = def.element_type().to_string();
    align_reader(reader, 4);
    let count = read_u32(reader).map_err(|e| truncated(&def.name, e))? as usize;
    if count > remaining(reader) {
        return Err(CodecError::format(format!(
            "field `{}`: struct count {count} exceeds remaining data",
            def.name
        )));
    }

    let mut items = Vec::with_capacity(count);
    if count > 0 {
        let (info, _) = ctx
            .registry
            .find_type_by_name(&type_name)
            .ok_or_else(|| RegistryError::UnknownTypeName(type_name.clone()))?;
        for _ in 0..count {
            items.push(decode_fields(ctx, reader, &info.fields, index)?);
        }
    }
    Ok(Value::Struct { type_name, items })
}

fn decode_element(
    ctx: &DecodeContext<'_>,
    reader: &mut Reader<'_>,
    def: &FieldDef,
    index: u32,
) -> io::Result<Value> {
    align_reader(reader, def.align);
    let value = match def.kind {
        FieldKind::Object => Value::Object(read_u32(reader)?),
        FieldKind::UserData => {
            let target = read_u32(reader)?;
            Value::UserData {
                index: target,
                string: if target == 0 {
                    String::new()
                } else {
                    ctx.userdata_name(target)
                },
            }
        }
        FieldKind::MaybeObject => {
            let raw = read_exact_array::<4, _>(reader)?;
            let v = u32::from_le_bytes(raw);
            if v > 0 && v < index {
                Value::Object(v)
            } else {
                Value::Scalar(Scalar::Data(raw.to_vec()))
            }
        }
        kind => Value::Scalar(decode_scalar(reader, kind, def.size)?),
    };
    Ok(value)
}

fn read_array<const N: usize, T, R: Read>(
    reader: &mut R,
    conv: impl Fn([u8; 4]) -> T,
    init: T,
) -> io::Result<[T; N]>
where
    T: Copy,
{
    let mut out = [init; N];
    for slot in &mut out {
        *slot = conv(read_exact_array::<4, _>(reader)?);
    }
    Ok(out)
}

fn f32s<const N: usize, R: Read>(reader: &mut R) -> io::Result<[f32; N]> {
    read_array(reader, f32::from_le_bytes, 0.0)
}

fn i32s<const N: usize, R: Read>(reader: &mut R) -> io::Result<[i32; N]> {
    read_array(reader, i32::from_le_bytes, 0)
}

fn u32s<const N: usize, R: Read>(reader: &mut R) -> io::Result<[u32; N]> {
    read_array(reader, u32::from_le_bytes, 0)
}

fn skip<R: Read>(reader: &mut R, n: usize) -> io::Result<()> {
    let mut buf = vec![0u8; n];
    reader.read_exact(&mut buf)
}

fn decode_scalar(reader: &mut Reader<'_>, kind: FieldKind, size: u32) -> io::Result<Scalar> {
    let scalar = match kind {
        FieldKind::Bool => Scalar::Bool(read_exact_array::<1, _>(reader)?[0] != 0),
        FieldKind::S8 => Scalar::S8(i8::from_le_bytes(read_exact_array(reader)?)),
        FieldKind::S16 => Scalar::S16(i16::from_le_bytes(read_exact_array(reader)?)),
        FieldKind::S32 => Scalar::S32(i32::from_le_bytes(read_exact_array(reader)?)),
        FieldKind::S64 => Scalar::S64(i64::from_le_bytes(read_exact_array(reader)?)),
        FieldKind::U8 => Scalar::U8(read_exact_array::<1, _>(reader)?[0]),
        FieldKind::U16 => Scalar::U16(u16::from_le_bytes(read_exact_array(reader)?)),
        FieldKind::U32 => Scalar::U32(u32::from_le_bytes(read_exact_array(reader)?)),
        FieldKind::U64 => Scalar::U64(u64::from_le_bytes(read_exact_array(reader)?)),
        FieldKind::F32 => Scalar::F32(f32::from_le_bytes(read_exact_array(reader)?)),
        FieldKind::F64 => Scalar::F64(f64::from_le_bytes(read_exact_array(reader)?)),

        FieldKind::String => Scalar::String(read_utf16(reader)?),
        FieldKind::Resource => Scalar::Resource(read_utf16(reader)?),
        FieldKind::RuntimeType => Scalar::RuntimeType(read_utf8(reader)?),

        FieldKind::Guid => Scalar::Guid(Uuid::from_bytes_le(read_exact_array(reader)?)),
        FieldKind::GameObjectRef => {
            Scalar::GameObjectRef(Uuid::from_bytes_le(read_exact_array(reader)?))
        }

        FieldKind::Vec2 => {
            let [x, y, _, _] = f32s::<4, _>(reader)?;
            Scalar::Vec2([x, y])
        }
        FieldKind::Vec3 => {
            let [x, y, z, _] = f32s::<4, _>(reader)?;
            Scalar::Vec3([x, y, z])
        }
        FieldKind::Vec4 => Scalar::Vec4(f32s(reader)?),
        FieldKind::Float2 => Scalar::Float2(f32s(reader)?),
        FieldKind::Float3 => Scalar::Float3(f32s(reader)?),
        FieldKind::Float4 => Scalar::Float4(f32s(reader)?),
        FieldKind::Quaternion => Scalar::Quaternion(f32s(reader)?),
        FieldKind::Position => {
            let mut out = [0.0f64; 3];
            for v in &mut out {
                *v = f64::from_le_bytes(read_exact_array(reader)?);
            }
            Scalar::Position(out)
        }
        FieldKind::Mat4 => Scalar::Mat4(f32s(reader)?),
        FieldKind::Obb => Scalar::Obb(f32s(reader)?),
        FieldKind::Color => Scalar::Color(read_exact_array(reader)?),
        FieldKind::Range => Scalar::Range(f32s(reader)?),
        FieldKind::RangeI => Scalar::RangeI(i32s(reader)?),
        FieldKind::Int2 => Scalar::Int2(i32s(reader)?),
        FieldKind::Int3 => Scalar::Int3(i32s(reader)?),
        FieldKind::Int4 => Scalar::Int4(i32s(reader)?),
        FieldKind::Uint2 => Scalar::Uint2(u32s(reader)?),
        FieldKind::Uint3 => Scalar::Uint3(u32s(reader)?),

        FieldKind::Capsule => {
            let [sx, sy, sz, _] = f32s::<4, _>(reader)?;
            let [ex, ey, ez, _] = f32s::<4, _>(reader)?;
            let [radius] = f32s::<1, _>(reader)?;
            skip(reader, 12)?;
            Scalar::Capsule {
                start: [sx, sy, sz],
                end: [ex, ey, ez],
                radius,
            }
        }
        FieldKind::Aabb => {
            let [ax, ay, az, _] = f32s::<4, _>(reader)?;
            let [bx, by, bz, _] = f32s::<4, _>(reader)?;
            Scalar::Aabb {
                min: [ax, ay, az],
                max: [bx, by, bz],
            }
        }
        FieldKind::Area => {
            let v = f32s::<10, _>(reader)?;
            skip(reader, 8)?;
            Scalar::Area {
                points: [[v[0], v[1]], [v[2], v[3]], [v[4], v[5]], [v[6], v[7]]],
                height: v[8],
                bottom: v[9],
            }
        }

        FieldKind::Object | FieldKind::MaybeObject | FieldKind::UserData | FieldKind::Struct | FieldKind::Data => {
            let mut buf = vec![0u8; size as usize];
            reader.read_exact(&mut buf)?;
            Scalar::Data(buf)
        }
    };
    Ok(scalar)
}

/// u32 character count (terminator included), then UTF-16LE code units.
fn read_utf16(reader: &mut Reader<'_>) -> io::Result<String> {
    align_reader(reader, 4);
    let count = read_u32(reader)? as usize;
    if count * 2 > remaining(reader) {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("string of {count} chars runs past the data"),
        ));
    }
    let mut units = Vec::with_capacity(count);
    for _ in 0..count {
        units.push(u16::from_le_bytes(read_exact_array(reader)?));
    }
    let text = String::from_utf16_lossy(&units);
    Ok(text.trim_end_matches('\0').to_string())
}

/// u32 byte count (terminator included), then UTF-8 bytes.
fn read_utf8(reader: &mut Reader<'_>) -> io::Result<String> {
    align_reader(reader, 4);
    let count = read_u32(reader)? as usize;
    if count > remaining(reader) {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            format!("runtime type of {count} bytes runs past the data"),
        ));
    }
    let mut buf = vec![0u8; count];
    reader.read_exact(&mut buf)?;
    let text = String::from_utf8_lossy(&buf);
    Ok(text.trim_end_matches('\0').to_string())
}

// ---- encoding ----

fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn put_f32s(out: &mut Vec<u8>, values: &[f32]) {
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

fn mismatch(def: &FieldDef, expected: &'static str) -> CodecError {
    CodecError::ValueMismatch {
        field: def.name.clone(),
        expected,
    }
}

/// Encodes one instance's fields in declaration order. Missing fields are
/// written as their default value. Offsets are relative to the start of `out`.
pub(crate) fn encode_fields(
    registry: &TypeRegistry,
    out: &mut Vec<u8>,
    fields: &[FieldDef],
    values: &FieldMap,
) -> Result<()> {
    for def in fields {
        match values.get(&def.name) {
            Some(value) => encode_field(registry, out, def, value)?,
            None => encode_field(registry, out, def, &Value::default_for(def))?,
        }
    }
    Ok(())
}

fn encode_field(registry: &TypeRegistry, out: &mut Vec<u8>, def: &FieldDef, value: &Value) -> Result<()> {
    if def.kind == FieldKind::Struct {
        let Value::Struct { items, .. } = value else {
            return Err(mismatch(def, "a struct list"));
        };
        pad_to(out, 4);
        put_u32(out, items.len() as u32);
        if items.is_empty() {
            return Ok(());
        }
        let type_name = def.element_type();
        let (info, _) = registry
            .find_type_by_name(type_name)
            .ok_or_else(|| RegistryError::UnknownTypeName(type_name.to_string()))?;
        for item in items {
            encode_fields(registry, out, &info.fields, item)?;
        }
        return Ok(());
    }

    if def.array {
        let Value::Array { items, .. } = value else {
            return Err(mismatch(def, "an array"));
        };
        pad_to(out, 4);
        put_u32(out, items.len() as u32);
        for item in items {
            pad_to(out, def.align as usize);
            encode_element(out, def, item)?;
        }
        return Ok(());
    }

    pad_to(out, def.align as usize);
    encode_element(out, def, value)
}

fn encode_element(out: &mut Vec<u8>, def: &FieldDef, value: &Value) -> Result<()> {
    match value {
        Value::Object(index) => put_u32(out, *index),
        Value::UserData { index, .. } => put_u32(out, *index),
        Value::Scalar(s) => encode_scalar(out, def, s),
        Value::Array { .. } | Value::Struct { .. } => return Err(mismatch(def, "a single value")),
    }
    Ok(())
}

fn encode_scalar(out: &mut Vec<u8>, def: &FieldDef, scalar: &Scalar) {
    match scalar {
        Scalar::Bool(v) => out.push(u8::from(*v)),
        Scalar::S8(v) => out.extend_from_slice(&v.to_le_bytes()),
        Scalar::S16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Scalar::S32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Scalar::S64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Scalar::U8(v) => out.push(*v),
        Scalar::U16(v) => out.extend_from_slice(&v.to_le_bytes()),
        Scalar::U32(v) => put_u32(out, *v),
        Scalar::U64(v) => out.extend_from_slice(&v.to_le_bytes()),
        Scalar::F32(v) => out.extend_from_slice(&v.to_le_bytes()),
        Scalar::F64(v) => out.extend_from_slice(&v.to_le_bytes()),

        Scalar::String(s) | Scalar::Resource(s) => {
            pad_to(out, 4);
            let text = s.trim_end_matches('\0');
            if text.is_empty() {
                put_u32(out, 0);
            } else {
                let units: Vec<u16> = text.encode_utf16().chain(std::iter::once(0)).collect();
                put_u32(out, units.len() as u32);
                for unit in units {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
            }
        }
        Scalar::RuntimeType(s) => {
            pad_to(out, 4);
            let text = s.trim_end_matches('\0');
            if text.is_empty() {
                put_u32(out, 0);
            } else {
                put_u32(out, text.len() as u32 + 1);
                out.extend_from_slice(text.as_bytes());
                out.push(0);
            }
        }

        Scalar::Guid(g) | Scalar::GameObjectRef(g) => out.extend_from_slice(&g.to_bytes_le()),

        Scalar::Vec2([x, y]) => put_f32s(out, &[*x, *y, 0.0, 0.0]),
        Scalar::Vec3([x, y, z]) => put_f32s(out, &[*x, *y, *z, 0.0]),
        Scalar::Vec4(v) | Scalar::Float4(v) | Scalar::Quaternion(v) => put_f32s(out, v),
        Scalar::Float2(v) | Scalar::Range(v) => put_f32s(out, v),
        Scalar::Float3(v) => put_f32s(out, v),
        Scalar::Position(v) => {
            for c in v {
                out.extend_from_slice(&c.to_le_bytes());
            }
        }
        Scalar::Mat4(v) => put_f32s(out, v),
        Scalar::Obb(v) => put_f32s(out, v),
        Scalar::Color(c) => out.extend_from_slice(c),
        Scalar::RangeI(v) | Scalar::Int2(v) => v.iter().for_each(|c| out.extend_from_slice(&c.to_le_bytes())),
        Scalar::Int3(v) => v.iter().for_each(|c| out.extend_from_slice(&c.to_le_bytes())),
        Scalar::Int4(v) => v.iter().for_each(|c| out.extend_from_slice(&c.to_le_bytes())),
        Scalar::Uint2(v) => v.iter().for_each(|c| put_u32(out, *c)),
        Scalar::Uint3(v) => v.iter().for_each(|c| put_u32(out, *c)),

        Scalar::Capsule { start, end, radius } => {
            put_f32s(out, &[start[0], start[1], start[2], 0.0]);
            put_f32s(out, &[end[0], end[1], end[2], 0.0]);
            put_f32s(out, &[*radius]);
            out.extend_from_slice(&[0u8; 12]);
        }
        Scalar::Aabb { min, max } => {
            put_f32s(out, &[min[0], min[1], min[2], 0.0]);
            put_f32s(out, &[max[0], max[1], max[2], 0.0]);
        }
        Scalar::Area {
            points,
            height,
            bottom,
        } => {
            for p in points {
                put_f32s(out, p);
            }
            put_f32s(out, &[*height, *bottom]);
            out.extend_from_slice(&[0u8; 8]);
        }

        Scalar::Data(bytes) => {
            out.extend_from_slice(bytes);
            let size = def.size as usize;
            if bytes.len() < size {
                out.resize(out.len() + size - bytes.len(), 0);
            }
        }
    }
}
