use std::fmt;

use indexmap::IndexMap;
use reasy_types::{FieldDef, FieldKind};
use serde_json::{Map as JsonMap, Value as JsonValue};

use crate::scalar::Scalar;

/// Field name -> value, in the owning type's declaration order.
pub type FieldMap = IndexMap<String, Value>;

/// Which reference flavour a visited index came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RefKind {
    Object,
    UserData,
}

/// A decoded field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Scalar(Scalar),
    /// Index of another instance in the same heap; 0 = null.
    Object(u32),
    /// Index of the slot hosting an embedded container; 0 = null.
    UserData { index: u32, string: String },
    Array { kind: FieldKind, items: Vec<Value> },
    /// Counted list of sub-field maps laid out by `type_name`'s declaration.
    Struct { type_name: String, items: Vec<FieldMap> },
}

impl Value {
    /// Default-initialised value for a declared field.
    pub fn default_for(field: &FieldDef) -> Self {
        if field.kind == FieldKind::Struct {
            return Value::Struct {
                type_name: field.element_type().to_string(),
                items: Vec::new(),
            };
        }
        if field.array {
            return Value::Array {
                kind: field.kind,
                items: Vec::new(),
            };
        }
        Self::default_element(field)
    }

    /// Default for one element of `field` (ignores the array flag).
    pub fn default_element(field: &FieldDef) -> Self {
        match field.kind {
            FieldKind::Object => Value::Object(0),
            FieldKind::UserData => Value::UserData {
                index: 0,
                string: String::new(),
            },
            kind => Value::Scalar(Scalar::default_for(kind, field.size)),
        }
    }

    #[inline]
    pub fn object_ref(&self) -> Option<u32> {
        match *self {
            Value::Object(index) => Some(index),
            _ => None,
        }
    }

    #[inline]
    pub fn userdata_ref(&self) -> Option<(u32, &str)> {
        match self {
            Value::UserData { index, string } => Some((*index, string)),
            _ => None,
        }
    }

    #[inline]
    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        self.as_scalar().and_then(Scalar::as_text)
    }

    #[inline]
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array { items, .. } => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::Array { items, .. } => Some(items),
            _ => None,
        }
    }

    /// Visits every non-null reference in this value, arrays and structs included.
    pub fn for_each_ref(&self, f: &mut impl FnMut(RefKind, u32)) {
        match self {
            Value::Object(index) if *index != 0 => f(RefKind::Object, *index),
            Value::UserData { index, .. } if *index != 0 => f(RefKind::UserData, *index),
            Value::Array { items, .. } => {
                for item in items {
                    item.for_each_ref(f);
                }
            }
            Value::Struct { items, .. } => {
                for fields in items {
                    for value in fields.values() {
                        value.for_each_ref(f);
                    }
                }
            }
            _ => {}
        }
    }

    /// Non-null reference targets in visit order (may repeat).
    pub fn refs(&self) -> Vec<u32> {
        let mut out = Vec::new();
        self.for_each_ref(&mut |_, index| out.push(index));
        out
    }

    /// Rewrites every non-null reference through `f`. Returns how many values changed.
    pub fn remap_refs(&mut self, f: &mut impl FnMut(u32) -> u32) -> usize {
        match self {
            Value::Object(index) | Value::UserData { index, .. } => {
                if *index == 0 {
                    return 0;
                }
                let next = f(*index);
                if next != *index {
                    *index = next;
                    1
                } else {
                    0
                }
            }
            Value::Array { items, .. } => items.iter_mut().map(|item| item.remap_refs(f)).sum(),
            Value::Struct { items, .. } => items
                .iter_mut()
                .flat_map(|fields| fields.values_mut())
                .map(|value| value.remap_refs(f))
                .sum(),
            Value::Scalar(_) => 0,
        }
    }

    /// Visits every scalar, descending into arrays and structs.
    pub fn for_each_scalar(&self, f: &mut impl FnMut(&Scalar)) {
        match self {
            Value::Scalar(s) => f(s),
            Value::Array { items, .. } => {
                for item in items {
                    item.for_each_scalar(f);
                }
            }
            Value::Struct { items, .. } => {
                for fields in items {
                    for value in fields.values() {
                        value.for_each_scalar(f);
                    }
                }
            }
            Value::Object(_) | Value::UserData { .. } => {}
        }
    }

    /// Visits every scalar mutably, descending into arrays and structs.
    pub fn for_each_scalar_mut(&mut self, f: &mut impl FnMut(&mut Scalar)) {
        match self {
            Value::Scalar(s) => f(s),
            Value::Array { items, .. } => {
                for item in items {
                    item.for_each_scalar_mut(f);
                }
            }
            Value::Struct { items, .. } => {
                for fields in items {
                    for value in fields.values_mut() {
                        value.for_each_scalar_mut(f);
                    }
                }
            }
            Value::Object(_) | Value::UserData { .. } => {}
        }
    }

    /// Plain JSON rendering for dumps and diagnostics (not the clipboard format).
    pub fn to_json_value(&self) -> JsonValue {
        match self {
            Value::Scalar(s) => serde_json::to_value(s).unwrap_or(JsonValue::Null),
            Value::Object(index) => {
                let mut m = JsonMap::new();
                m.insert("object".into(), JsonValue::from(*index));
                JsonValue::Object(m)
            }
            Value::UserData { index, string } => {
                let mut m = JsonMap::new();
                m.insert("userdata".into(), JsonValue::from(*index));
                m.insert("string".into(), JsonValue::from(string.as_str()));
                JsonValue::Object(m)
            }
            Value::Array { items, .. } => {
                JsonValue::Array(items.iter().map(Value::to_json_value).collect())
            }
            Value::Struct { items, .. } => JsonValue::Array(
                items.iter().map(fields_to_json).collect(),
            ),
        }
    }
}

/// Renders a field map as a JSON object.
pub fn fields_to_json(fields: &FieldMap) -> JsonValue {
    let mut m = JsonMap::new();
    for (name, value) in fields {
        m.insert(name.clone(), value.to_json_value());
    }
    JsonValue::Object(m)
}

/// Field map with every declared field default-initialised.
pub fn default_fields(fields: &[FieldDef]) -> FieldMap {
    fields
        .iter()
        .map(|f| (f.name.clone(), Value::default_for(f)))
        .collect()
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(s) => write!(f, "{s}"),
            Value::Object(index) => write!(f, "@{index}"),
            Value::UserData { index, string } => write!(f, "@{index}<{string}>"),
            Value::Array { items, .. } => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Value::Struct { type_name, items } => {
                write!(f, "{type_name}{{{} items}}", items.len())
            }
        }
    }
}

impl From<Scalar> for Value {
    #[inline]
    fn from(v: Scalar) -> Self {
        Value::Scalar(v)
    }
}
