use std::fmt;

use reasy_types::FieldKind;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload of a non-reference field. Vector types keep only their meaningful lanes;
/// padding lanes are restored by the codec.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Scalar {
    // --- Primitives ---
    Bool(bool),
    S8(i8),
    S16(i16),
    S32(i32),
    S64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),

    // --- Text ---
    String(String),
    Resource(String),
    RuntimeType(String),

    // --- Identity ---
    Guid(Uuid),
    GameObjectRef(Uuid),

    // --- Math ---
    Vec2([f32; 2]),
    Vec3([f32; 3]),
    Vec4([f32; 4]),
    Float2([f32; 2]),
    Float3([f32; 3]),
    Float4([f32; 4]),
    Quaternion([f32; 4]),
    Position([f64; 3]),
    Mat4([f32; 16]),
    Obb([f32; 20]),
    Color([u8; 4]),
    Range([f32; 2]),
    RangeI([i32; 2]),
    Int2([i32; 2]),
    Int3([i32; 3]),
    Int4([i32; 4]),
    Uint2([u32; 2]),
    Uint3([u32; 3]),

    // --- Geometry ---
    Capsule {
        start: [f32; 3],
        end: [f32; 3],
        radius: f32,
    },
    Aabb {
        min: [f32; 3],
        max: [f32; 3],
    },
    Area {
        points: [[f32; 2]; 4],
        height: f32,
        bottom: f32,
    },

    // --- Opaque ---
    Data(Vec<u8>),
}

impl Scalar {
    /// Zero value for a field of `kind`; raw kinds get `size` zero bytes.
    pub fn default_for(kind: FieldKind, size: u32) -> Self {
        match kind {
            FieldKind::Bool => Scalar::Bool(false),
            FieldKind::S8 => Scalar::S8(0),
            FieldKind::S16 => Scalar::S16(0),
            FieldKind::S32 => Scalar::S32(0),
            FieldKind::S64 => Scalar::S64(0),
            FieldKind::U8 => Scalar::U8(0),
            FieldKind::U16 => Scalar::U16(0),
            FieldKind::U32 => Scalar::U32(0),
            FieldKind::U64 => Scalar::U64(0),
            FieldKind::F32 => Scalar::F32(0.0),
            FieldKind::F64 => Scalar::F64(0.0),
            FieldKind::String => Scalar::String(String::new()),
            FieldKind::Resource => Scalar::Resource(String::new()),
            FieldKind::RuntimeType => Scalar::RuntimeType(String::new()),
            FieldKind::Guid => Scalar::Guid(Uuid::nil()),
            FieldKind::GameObjectRef => Scalar::GameObjectRef(Uuid::nil()),
            FieldKind::Vec2 => Scalar::Vec2([0.0; 2]),
            FieldKind::Vec3 => Scalar::Vec3([0.0; 3]),
            FieldKind::Vec4 => Scalar::Vec4([0.0; 4]),
            FieldKind::Float2 => Scalar::Float2([0.0; 2]),
            FieldKind::Float3 => Scalar::Float3([0.0; 3]),
            FieldKind::Float4 => Scalar::Float4([0.0; 4]),
            FieldKind::Quaternion => Scalar::Quaternion([0.0, 0.0, 0.0, 1.0]),
            FieldKind::Position => Scalar::Position([0.0; 3]),
            FieldKind::Mat4 => Scalar::Mat4([0.0; 16]),
            FieldKind::Obb => Scalar::Obb([0.0; 20]),
            FieldKind::Color => Scalar::Color([0; 4]),
            FieldKind::Range => Scalar::Range([0.0; 2]),
            FieldKind::RangeI => Scalar::RangeI([0; 2]),
            FieldKind::Int2 => Scalar::Int2([0; 2]),
            FieldKind::Int3 => Scalar::Int3([0; 3]),
            FieldKind::Int4 => Scalar::Int4([0; 4]),
            FieldKind::Uint2 => Scalar::Uint2([0; 2]),
            FieldKind::Uint3 => Scalar::Uint3([0; 3]),
            FieldKind::Capsule => Scalar::Capsule {
                start: [0.0; 3],
                end: [0.0; 3],
                radius: 0.0,
            },
            FieldKind::Aabb => Scalar::Aabb {
                min: [0.0; 3],
                max: [0.0; 3],
            },
            FieldKind::Area => Scalar::Area {
                points: [[0.0; 2]; 4],
                height: 0.0,
                bottom: 0.0,
            },
            FieldKind::Object
            | FieldKind::MaybeObject
            | FieldKind::UserData
            | FieldKind::Struct
            | FieldKind::Data => Scalar::Data(vec![0; size as usize]),
        }
    }

    /// Text payload for string-like scalars.
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Scalar::String(s) | Scalar::Resource(s) | Scalar::RuntimeType(s) => Some(s),
            _ => None,
        }
    }

    /// GUID payload for identity scalars (plain GUIDs and game-object references).
    #[inline]
    pub fn as_guid(&self) -> Option<Uuid> {
        match *self {
            Scalar::Guid(g) | Scalar::GameObjectRef(g) => Some(g),
            _ => None,
        }
    }

    #[inline]
    pub fn as_guid_mut(&mut self) -> Option<&mut Uuid> {
        match self {
            Scalar::Guid(g) | Scalar::GameObjectRef(g) => Some(g),
            _ => None,
        }
    }

    #[inline]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Scalar::Data(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Bool(v) => write!(f, "{v}"),
            Scalar::S8(v) => write!(f, "{v}"),
            Scalar::S16(v) => write!(f, "{v}"),
            Scalar::S32(v) => write!(f, "{v}"),
            Scalar::S64(v) => write!(f, "{v}"),
            Scalar::U8(v) => write!(f, "{v}"),
            Scalar::U16(v) => write!(f, "{v}"),
            Scalar::U32(v) => write!(f, "{v}"),
            Scalar::U64(v) => write!(f, "{v}"),
            Scalar::F32(v) => write!(f, "{v}"),
            Scalar::F64(v) => write!(f, "{v}"),
            Scalar::String(s) | Scalar::Resource(s) | Scalar::RuntimeType(s) => {
                write!(f, "{s:?}")
            }
            Scalar::Guid(g) | Scalar::GameObjectRef(g) => write!(f, "{g}"),
            Scalar::Data(b) => write!(f, "<bytes:{}>", b.len()),
            other => write!(f, "{other:?}"),
        }
    }
}

impl From<bool> for Scalar {
    #[inline]
    fn from(v: bool) -> Self {
        Scalar::Bool(v)
    }
}

impl From<i32> for Scalar {
    #[inline]
    fn from(v: i32) -> Self {
        Scalar::S32(v)
    }
}

impl From<u32> for Scalar {
    #[inline]
    fn from(v: u32) -> Self {
        Scalar::U32(v)
    }
}

impl From<f32> for Scalar {
    #[inline]
    fn from(v: f32) -> Self {
        Scalar::F32(v)
    }
}

impl From<&str> for Scalar {
    #[inline]
    fn from(v: &str) -> Self {
        Scalar::String(v.to_string())
    }
}

impl From<Uuid> for Scalar {
    #[inline]
    fn from(v: Uuid) -> Self {
        Scalar::Guid(v)
    }
}
