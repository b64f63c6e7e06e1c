use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

use crate::error::{RegistryError, Result};
use crate::field::FieldDef;

/// Layout of one engine type as found in the registry dump.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TypeInfo {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_hex_u32")]
    pub crc: u32,
    #[serde(default)]
    pub fields: Vec<FieldDef>,
    #[serde(default)]
    pub parent: Option<String>,
}

impl TypeInfo {
    pub fn new(name: impl Into<String>, crc: u32, fields: Vec<FieldDef>) -> Self {
        Self {
            name: name.into(),
            crc,
            fields,
            parent: None,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Declaration position of `name`, the order that drives index placement.
    pub fn field_position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }
}

fn deserialize_hex_u32<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<u32, D::Error> {
    let value = JsonValue::deserialize(deserializer)?;
    match value {
        JsonValue::Number(n) => n
            .as_u64()
            .and_then(|v| u32::try_from(v).ok())
            .ok_or_else(|| serde::de::Error::custom("crc out of range")),
        JsonValue::String(s) => parse_hex_u32(&s)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid hex crc `{s}`"))),
        JsonValue::Null => Ok(0),
        _ => Err(serde::de::Error::custom("crc must be a hex string or number")),
    }
}

/// Parses a hex id (optional `0x` prefix, optional zero padding).
pub fn parse_hex_u32(s: &str) -> Option<u32> {
    let s = s.trim();
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if s.is_empty() {
        return None;
    }
    u32::from_str_radix(s, 16).ok()
}

/// Read-only type lookup, loaded once and passed by reference to every component.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: FxHashMap<u32, TypeInfo>,
    by_name: FxHashMap<String, u32>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self> {
        let root: JsonValue = serde_json::from_str(contents)?;
        let JsonValue::Object(entries) = root else {
            return Err(RegistryError::NotAnObject);
        };

        let mut registry = Self::new();
        for (key, value) in entries {
            let Some(type_id) = parse_hex_u32(&key) else {
                log::warn!("registry: skipping non-hex key `{key}`");
                continue;
            };
            match serde_json::from_value::<TypeInfo>(value) {
                Ok(info) => registry.insert(type_id, info),
                Err(err) => log::warn!("registry: skipping type {key}: {err}"),
            }
        }
        log::debug!("registry: loaded {} types", registry.len());
        Ok(registry)
    }

    pub fn insert(&mut self, type_id: u32, info: TypeInfo) {
        self.by_name.insert(info.name.clone(), type_id);
        self.types.insert(type_id, info);
    }

    pub fn get_type_info(&self, type_id: u32) -> Option<&TypeInfo> {
        self.types.get(&type_id)
    }

    pub fn find_type_by_name(&self, name: &str) -> Option<(&TypeInfo, u32)> {
        let type_id = *self.by_name.get(name)?;
        self.types.get(&type_id).map(|info| (info, type_id))
    }

    pub fn require(&self, type_id: u32) -> Result<&TypeInfo> {
        self.get_type_info(type_id)
            .ok_or(RegistryError::UnknownTypeId(type_id))
    }

    pub fn require_by_name(&self, name: &str) -> Result<(&TypeInfo, u32)> {
        self.find_type_by_name(name)
            .ok_or_else(|| RegistryError::UnknownTypeName(name.to_string()))
    }

    pub fn type_name(&self, type_id: u32) -> Option<&str> {
        self.get_type_info(type_id).map(|info| info.name.as_str())
    }

    pub fn crc_of(&self, type_id: u32) -> Option<u32> {
        self.get_type_info(type_id).map(|info| info.crc)
    }

    pub fn field(&self, type_id: u32, name: &str) -> Option<&FieldDef> {
        self.get_type_info(type_id)?.field(name)
    }

    pub fn field_position(&self, type_id: u32, name: &str) -> Option<usize> {
        self.get_type_info(type_id)?.field_position(name)
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}
