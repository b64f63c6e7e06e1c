use indexmap::IndexMap;
use reasy_types::FieldKind;
use reasy_variant::Scalar;
use serde::{Deserialize, Serialize};

pub const EMBEDDED_CONTEXT: &str = "embedded_rsz";

/// Field name -> transported value, in declaration order.
pub type TransportFields = IndexMap<String, TransportValue>;

fn is_false(v: &bool) -> bool {
    !*v
}

/// One field value in clipboard form. Reference values say whether they point
/// inside the copied graph (relative id) or outside it (absolute id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransportValue {
    ObjectData {
        value: u32,
        #[serde(default, skip_serializing_if = "is_false")]
        is_external_ref: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        in_graph: bool,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        orig_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        object_graph: Option<ObjectGraph>,
    },
    UserDataData {
        value: u32,
        #[serde(default)]
        string: String,
        #[serde(default, skip_serializing_if = "is_false")]
        is_external_ref: bool,
        #[serde(default, skip_serializing_if = "is_false")]
        in_graph: bool,
        #[serde(default, skip_serializing_if = "String::is_empty")]
        orig_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        object_graph: Option<ObjectGraph>,
    },
    ArrayData {
        element_kind: FieldKind,
        values: Vec<TransportValue>,
    },
    StructData {
        type_name: String,
        values: Vec<TransportFields>,
    },
    ScalarData {
        value: Scalar,
    },
}

impl TransportValue {
    /// Root graph carried by a top-level clipboard element.
    pub fn object_graph(&self) -> Option<&ObjectGraph> {
        match self {
            TransportValue::ObjectData { object_graph, .. }
            | TransportValue::UserDataData { object_graph, .. } => object_graph.as_ref(),
            _ => None,
        }
    }

    pub fn orig_type(&self) -> Option<&str> {
        match self {
            TransportValue::ObjectData { orig_type, .. }
            | TransportValue::UserDataData { orig_type, .. } => Some(orig_type),
            _ => None,
        }
    }

    pub fn is_userdata(&self) -> bool {
        matches!(self, TransportValue::UserDataData { .. })
    }

    /// Visits every reference value: `(value, in_graph, is_external_ref)`.
    pub fn for_each_ref(&self, f: &mut impl FnMut(u32, bool, bool)) {
        match self {
            TransportValue::ObjectData {
                value,
                in_graph,
                is_external_ref,
                ..
            }
            | TransportValue::UserDataData {
                value,
                in_graph,
                is_external_ref,
                ..
            } => f(*value, *in_graph, *is_external_ref),
            TransportValue::ArrayData { values, .. } => {
                for v in values {
                    v.for_each_ref(f);
                }
            }
            TransportValue::StructData { values, .. } => {
                for fields in values {
                    for v in fields.values() {
                        v.for_each_ref(f);
                    }
                }
            }
            TransportValue::ScalarData { .. } => {}
        }
    }
}

/// A copied subgraph of one heap. Instance ids are relative and dense from 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObjectGraph {
    pub root_id: u32,
    pub instances: Vec<GraphInstance>,
    #[serde(default)]
    pub external_refs: Vec<u32>,
}

impl ObjectGraph {
    pub fn instance(&self, id: u32) -> Option<&GraphInstance> {
        self.instances.iter().find(|i| i.id == id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphInstance {
    pub id: u32,
    pub type_id: u32,
    pub crc: u32,
    pub fields: TransportFields,
    /// Nested container hosted by this instance, for userdata slots.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded: Option<Box<EmbeddedGraph>>,
}

impl GraphInstance {
    /// Reference targets inside the graph, in field order.
    pub fn graph_refs(&self) -> Vec<u32> {
        let mut out = Vec::new();
        for value in self.fields.values() {
            value.for_each_ref(&mut |v, in_graph, _| {
                if in_graph {
                    out.push(v);
                }
            });
        }
        out
    }
}

/// A whole nested container. Ids are the container's own, not relative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedGraph {
    pub context_type: String,
    pub magic: u32,
    pub version: u32,
    pub type_id: u32,
    pub path_hash: u32,
    pub object_table: Vec<u32>,
    pub instances: Vec<GraphInstance>,
    #[serde(default)]
    pub userdata_infos: Vec<EmbeddedUserData>,
}

/// A container nested inside an embedded graph, keyed by its hosting slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddedUserData {
    pub instance_id: u32,
    pub graph: EmbeddedGraph,
}
