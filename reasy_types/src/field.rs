use serde::{Deserialize, Serialize};

/// Closed set of field encodings understood by the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    S8,
    S16,
    S32,
    S64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,

    String,
    Resource,
    RuntimeType,

    Object,
    /// Native 4-byte slot that is an object reference only when it points backwards.
    MaybeObject,
    UserData,

    Guid,
    GameObjectRef,

    Vec2,
    Vec3,
    Vec4,
    Float2,
    Float3,
    Float4,
    Quaternion,
    Position,
    Mat4,
    Obb,
    Color,
    Range,
    RangeI,
    Int2,
    Int3,
    Int4,
    Uint2,
    Uint3,
    Capsule,
    Aabb,
    Area,

    Struct,
    Data,
}

impl FieldKind {
    /// Maps a registry `type` string plus layout hints onto a kind.
    pub fn resolve(
        declared: &str,
        size: u32,
        align: u32,
        native: bool,
        array: bool,
        original_type: &str,
    ) -> Self {
        let declared = declared.to_ascii_lowercase();

        if declared == "data" {
            match size {
                16 if align == 8 && native => return FieldKind::Guid,
                16 => return FieldKind::Vec4,
                80 => return FieldKind::Obb,
                64 if align == 16 => return FieldKind::Mat4,
                4 if native => return FieldKind::MaybeObject,
                1 => return FieldKind::U8,
                _ => return FieldKind::Data,
            }
        }
        if declared == "obb" && size == 16 {
            return FieldKind::Vec4;
        }
        if declared == "uri" && original_type.contains("GameObjectRef") {
            return FieldKind::GameObjectRef;
        }
        if declared == "point" && original_type.contains("Range") {
            return FieldKind::Range;
        }
        if array && native && size == 4 && (declared == "s32" || declared == "u32") {
            return FieldKind::MaybeObject;
        }

        let kind = match declared.as_str() {
            "bool" => FieldKind::Bool,
            "s8" => FieldKind::S8,
            "s16" => FieldKind::S16,
            "s32" | "int" | "enum" => FieldKind::S32,
            "s64" => FieldKind::S64,
            "u8" => FieldKind::U8,
            "u16" => FieldKind::U16,
            "u32" | "uint" => FieldKind::U32,
            "u64" => FieldKind::U64,
            "f32" | "float" => FieldKind::F32,
            "f64" => FieldKind::F64,
            "string" => FieldKind::String,
            "resource" => FieldKind::Resource,
            "runtimetype" => FieldKind::RuntimeType,
            "object" => FieldKind::Object,
            "userdata" => FieldKind::UserData,
            "guid" => FieldKind::Guid,
            "gameobjectref" => FieldKind::GameObjectRef,
            "vec2" => FieldKind::Vec2,
            "vec3" => FieldKind::Vec3,
            "vec4" | "keyframe" => FieldKind::Vec4,
            "float2" | "point" | "size" => FieldKind::Float2,
            "float3" => FieldKind::Float3,
            "float4" => FieldKind::Float4,
            "quaternion" => FieldKind::Quaternion,
            "position" => FieldKind::Position,
            "mat4" => FieldKind::Mat4,
            "obb" => FieldKind::Obb,
            "color" => FieldKind::Color,
            "range" => FieldKind::Range,
            "rangei" => FieldKind::RangeI,
            "int2" => FieldKind::Int2,
            "int3" => FieldKind::Int3,
            "int4" => FieldKind::Int4,
            "uint2" => FieldKind::Uint2,
            "uint3" => FieldKind::Uint3,
            "capsule" => FieldKind::Capsule,
            "aabb" => FieldKind::Aabb,
            "area" => FieldKind::Area,
            "struct" => FieldKind::Struct,
            _ => FieldKind::Data,
        };

        // A declared size that disagrees with the encoding would desync the stream.
        match kind.encoded_size() {
            Some(expected) if size != 0 && expected != size as usize => FieldKind::Data,
            _ => kind,
        }
    }

    /// Byte size on disk for fixed-size kinds; `None` for length-prefixed or raw kinds.
    pub const fn encoded_size(self) -> Option<usize> {
        match self {
            FieldKind::Bool | FieldKind::S8 | FieldKind::U8 => Some(1),
            FieldKind::S16 | FieldKind::U16 => Some(2),
            FieldKind::S32
            | FieldKind::U32
            | FieldKind::F32
            | FieldKind::Object
            | FieldKind::MaybeObject
            | FieldKind::UserData
            | FieldKind::Color => Some(4),
            FieldKind::S64 | FieldKind::U64 | FieldKind::F64 => Some(8),
            FieldKind::Float2
            | FieldKind::Range
            | FieldKind::RangeI
            | FieldKind::Int2
            | FieldKind::Uint2 => Some(8),
            FieldKind::Float3 | FieldKind::Int3 | FieldKind::Uint3 => Some(12),
            FieldKind::Vec2
            | FieldKind::Vec3
            | FieldKind::Vec4
            | FieldKind::Float4
            | FieldKind::Quaternion
            | FieldKind::Int4
            | FieldKind::Guid
            | FieldKind::GameObjectRef => Some(16),
            FieldKind::Position => Some(24),
            FieldKind::Aabb => Some(32),
            FieldKind::Capsule | FieldKind::Area => Some(48),
            FieldKind::Mat4 => Some(64),
            FieldKind::Obb => Some(80),
            FieldKind::String
            | FieldKind::Resource
            | FieldKind::RuntimeType
            | FieldKind::Struct
            | FieldKind::Data => None,
        }
    }

    #[inline]
    pub const fn is_reference(self) -> bool {
        matches!(
            self,
            FieldKind::Object | FieldKind::MaybeObject | FieldKind::UserData
        )
    }

    #[inline]
    pub const fn is_text(self) -> bool {
        matches!(
            self,
            FieldKind::String | FieldKind::Resource | FieldKind::RuntimeType
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
struct RawFieldDef {
    name: String,
    #[serde(rename = "type")]
    declared: String,
    #[serde(default = "default_size")]
    size: u32,
    #[serde(default = "default_align")]
    align: u32,
    #[serde(default)]
    array: bool,
    #[serde(default)]
    native: bool,
    #[serde(default)]
    original_type: String,
}

fn default_size() -> u32 {
    4
}

fn default_align() -> u32 {
    1
}

/// One declared field of a registry type, with its kind resolved at load time.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawFieldDef")]
pub struct FieldDef {
    pub name: String,
    pub declared: String,
    pub kind: FieldKind,
    pub size: u32,
    pub align: u32,
    pub array: bool,
    pub native: bool,
    pub original_type: String,
}

impl From<RawFieldDef> for FieldDef {
    fn from(raw: RawFieldDef) -> Self {
        let kind = FieldKind::resolve(
            &raw.declared,
            raw.size,
            raw.align,
            raw.native,
            raw.array,
            &raw.original_type,
        );
        Self {
            name: raw.name,
            declared: raw.declared,
            kind,
            size: raw.size,
            align: raw.align.max(1),
            array: raw.array,
            native: raw.native,
            original_type: raw.original_type,
        }
    }
}

impl FieldDef {
    pub fn new(
        name: impl Into<String>,
        declared: impl Into<String>,
        size: u32,
        align: u32,
        array: bool,
        original_type: impl Into<String>,
    ) -> Self {
        Self::from(RawFieldDef {
            name: name.into(),
            declared: declared.into(),
            size,
            align,
            array,
            native: false,
            original_type: original_type.into(),
        })
    }

    /// Declared element type for arrays (`original_type` without the `[]` suffix).
    pub fn element_type(&self) -> &str {
        self.original_type
            .strip_suffix("[]")
            .unwrap_or(&self.original_type)
    }
}
