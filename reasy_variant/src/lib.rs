#![forbid(unsafe_code)]

pub mod scalar;
pub mod value;

pub use scalar::*;
pub use value::*;

#[cfg(test)]
mod tests {
    use super::*;
    use reasy_types::{FieldDef, FieldKind};
    use uuid::Uuid;

    fn nested() -> Value {
        let mut inner = FieldMap::new();
        inner.insert("Target".into(), Value::Object(7));
        inner.insert("Weight".into(), Value::Scalar(Scalar::F32(0.5)));
        Value::Struct {
            type_name: "app.Link".into(),
            items: vec![inner],
        }
    }

    // ---- defaults ----

    #[test]
    fn default_for_declared_fields() {
        let obj = FieldDef::new("Child", "Object", 4, 4, false, "app.Node");
        assert_eq!(Value::default_for(&obj), Value::Object(0));

        let arr = FieldDef::new("Children", "Object", 4, 4, true, "app.Node[]");
        assert_eq!(
            Value::default_for(&arr),
            Value::Array {
                kind: FieldKind::Object,
                items: vec![]
            }
        );

        let ud = FieldDef::new("Data", "UserData", 4, 4, false, "app.UserData");
        assert_eq!(
            Value::default_for(&ud),
            Value::UserData {
                index: 0,
                string: String::new()
            }
        );

        let raw = FieldDef::new("Blob", "Sphere", 16, 16, false, "");
        assert_eq!(Value::default_for(&raw), Value::Scalar(Scalar::Data(vec![0; 16])));

        let st = FieldDef::new("Links", "Struct", 4, 4, true, "app.Link");
        assert!(matches!(Value::default_for(&st), Value::Struct { ref type_name, .. } if type_name == "app.Link"));
    }

    #[test]
    fn default_fields_keep_declaration_order() {
        let defs = vec![
            FieldDef::new("B", "S32", 4, 4, false, ""),
            FieldDef::new("A", "String", 4, 4, false, ""),
        ];
        let fields = default_fields(&defs);
        let names: Vec<_> = fields.keys().cloned().collect();
        assert_eq!(names, vec!["B", "A"]);
    }

    // ---- references ----

    #[test]
    fn refs_descend_into_arrays_and_structs() {
        let arr = Value::Array {
            kind: FieldKind::Object,
            items: vec![Value::Object(3), Value::Object(0), Value::Object(5)],
        };
        assert_eq!(arr.refs(), vec![3, 5]);
        assert_eq!(nested().refs(), vec![7]);

        let ud = Value::UserData {
            index: 9,
            string: "x".into(),
        };
        let mut kinds = vec![];
        ud.for_each_ref(&mut |k, i| kinds.push((k, i)));
        assert_eq!(kinds, vec![(RefKind::UserData, 9)]);
    }

    #[test]
    fn remap_skips_null_and_counts_changes() {
        let mut arr = Value::Array {
            kind: FieldKind::Object,
            items: vec![Value::Object(1), Value::Object(0), Value::Object(2)],
        };
        let changed = arr.remap_refs(&mut |i| if i == 1 { 10 } else { i });
        assert_eq!(changed, 1);
        assert_eq!(arr.refs(), vec![10, 2]);

        let mut st = nested();
        assert_eq!(st.remap_refs(&mut |_| 0), 1);
        assert!(st.refs().is_empty());
    }

    #[test]
    fn scalar_visitor_reaches_nested_guids() {
        let g = Uuid::from_u128(0x1234);
        let mut v = Value::Array {
            kind: FieldKind::Guid,
            items: vec![Value::Scalar(Scalar::Guid(g)), Value::Scalar(Scalar::Guid(g))],
        };
        let mut seen = 0;
        v.for_each_scalar_mut(&mut |s| {
            if let Some(guid) = s.as_guid_mut() {
                *guid = Uuid::nil();
                seen += 1;
            }
        });
        assert_eq!(seen, 2);
        assert!(v.as_array().unwrap().iter().all(|i| i.as_scalar() == Some(&Scalar::Guid(Uuid::nil()))));
    }

    // ---- accessors / rendering ----

    #[test]
    fn text_accessors() {
        assert_eq!(Value::Scalar(Scalar::Resource("a/b.pfb".into())).as_text(), Some("a/b.pfb"));
        assert_eq!(Value::Object(1).as_text(), None);
        assert_eq!(Value::Object(4).object_ref(), Some(4));
    }

    #[test]
    fn scalar_serde_is_tagged() {
        let json = serde_json::to_value(Scalar::Vec3([1.0, 2.0, 3.0])).unwrap();
        assert_eq!(json["kind"], "vec3");
        let back: Scalar = serde_json::from_value(json).unwrap();
        assert_eq!(back, Scalar::Vec3([1.0, 2.0, 3.0]));
    }

    #[test]
    fn display_formats() {
        assert_eq!(Value::Object(3).to_string(), "@3");
        assert_eq!(Value::Scalar(Scalar::String("hi".into())).to_string(), "\"hi\"");
        let arr = Value::Array {
            kind: FieldKind::Object,
            items: vec![Value::Object(1), Value::Object(2)],
        };
        assert_eq!(arr.to_string(), "[@1, @2]");
    }

    #[test]
    fn json_dump_renders_refs() {
        let mut fields = FieldMap::new();
        fields.insert("Z".into(), Value::Object(1));
        fields.insert("A".into(), Value::Scalar(Scalar::Bool(true)));
        let json = fields_to_json(&fields);
        assert_eq!(json.as_object().unwrap().len(), 2);
        assert_eq!(json["A"]["kind"], "bool");
        assert_eq!(json["Z"]["object"], 1);
    }
}
