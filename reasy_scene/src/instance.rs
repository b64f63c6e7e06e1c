use reasy_types::{Result as RegistryResult, TypeRegistry};
use reasy_variant::{FieldMap, Value, default_fields};

/// One typed record of a heap. Its index is its position in the heap.
#[derive(Debug, Clone, PartialEq)]
pub struct Instance {
    pub type_id: u32,
    pub crc: u32,
    pub fields: FieldMap,
}

impl Instance {
    pub fn new(type_id: u32, crc: u32, fields: FieldMap) -> Self {
        Self {
            type_id,
            crc,
            fields,
        }
    }

    /// Instance of `type_id` with every declared field default-initialised.
    pub fn with_defaults(registry: &TypeRegistry, type_id: u32) -> RegistryResult<Self> {
        let info = registry.require(type_id)?;
        Ok(Self::new(type_id, info.crc, default_fields(&info.fields)))
    }

    /// Slot instance for an embedded userdata container: descriptor only, no field data.
    pub fn userdata_slot(type_id: u32, crc: u32) -> Self {
        Self::new(type_id, crc, FieldMap::new())
    }

    /// Non-null reference targets across all fields, in field order.
    pub fn refs(&self) -> Vec<u32> {
        let mut out = Vec::new();
        for value in self.fields.values() {
            value.for_each_ref(&mut |_, index| out.push(index));
        }
        out
    }

    pub fn remap_refs(&mut self, f: &mut impl FnMut(u32) -> u32) -> usize {
        self.fields.values_mut().map(|v| v.remap_refs(f)).sum()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// First non-empty string payload in declaration order.
    pub fn first_text(&self) -> Option<&str> {
        self.fields
            .values()
            .filter_map(Value::as_text)
            .map(|s| s.trim_matches('\0'))
            .find(|s| !s.is_empty())
    }
}

/// Parent / children links derived from reference edges.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HierarchyEntry {
    pub parent: Option<u32>,
    pub children: Vec<u32>,
}
