#![forbid(unsafe_code)]

pub mod error;
pub mod hash;
pub mod rsz;

pub use error::*;
pub use hash::*;
pub use rsz::{build, parse, path_hash_of, refresh_path_hashes};

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use reasy_scene::{ContainerBody, ContainerHeader, ContainerPath, EmbeddedContainer, Instance, InstanceHeap};
    use reasy_types::{FieldKind, TypeRegistry};
    use reasy_variant::{FieldMap, Scalar, Value};
    use uuid::Uuid;

    const REGISTRY: &str = r#"{
        "100": {"name": "app.Leaf", "crc": "aaaa", "fields": [
            {"name": "Name", "type": "String", "size": 4, "align": 4},
            {"name": "Path", "type": "Resource", "size": 4, "align": 4},
            {"name": "Next", "type": "Object", "size": 4, "align": 4, "original_type": "app.Leaf"}
        ]},
        "200": {"name": "app.Kitchen", "crc": "bbbb", "fields": [
            {"name": "Flag", "type": "Bool", "size": 1, "align": 1},
            {"name": "Count", "type": "S32", "size": 4, "align": 4},
            {"name": "Pos", "type": "Vec3", "size": 16, "align": 16},
            {"name": "World", "type": "Position", "size": 24, "align": 8},
            {"name": "Id", "type": "Guid", "size": 16, "align": 8},
            {"name": "Tint", "type": "Color", "size": 4, "align": 1},
            {"name": "Shape", "type": "Capsule", "size": 48, "align": 16},
            {"name": "Kind", "type": "RuntimeType", "size": 4, "align": 4},
            {"name": "Blob", "type": "Data", "size": 3, "align": 1},
            {"name": "Links", "type": "Object", "size": 4, "align": 4, "array": true, "original_type": "app.Leaf[]"},
            {"name": "Points", "type": "Struct", "size": 4, "align": 4, "array": true, "original_type": "app.Point[]"},
            {"name": "Extra", "type": "UserData", "size": 4, "align": 4, "original_type": "app.Payload"}
        ]},
        "300": {"name": "app.Point", "crc": "cccc", "fields": [
            {"name": "Weight", "type": "F32", "size": 4, "align": 4},
            {"name": "Target", "type": "Object", "size": 4, "align": 4, "original_type": "app.Leaf"}
        ]},
        "400": {"name": "app.Payload", "crc": "dddd", "fields": [
            {"name": "Title", "type": "String", "size": 4, "align": 4},
            {"name": "Path", "type": "Resource", "size": 4, "align": 4}
        ]},
        "500": {"name": "app.Raw", "crc": "eeee", "fields": [
            {"name": "Slot", "type": "Data", "size": 4, "align": 4, "native": true},
            {"name": "Slots", "type": "S32", "size": 4, "align": 4, "array": true, "native": true}
        ]}
    }"#;

    const LEAF: u32 = 0x100;
    const KITCHEN: u32 = 0x200;
    const PAYLOAD: u32 = 0x400;
    const RAW: u32 = 0x500;

    fn registry() -> TypeRegistry {
        TypeRegistry::from_json_str(REGISTRY).unwrap()
    }

    fn text(s: &str) -> Value {
        Value::Scalar(Scalar::String(s.into()))
    }

    fn leaf(reg: &TypeRegistry, name: &str, next: u32) -> Instance {
        let mut inst = Instance::with_defaults(reg, LEAF).unwrap();
        inst.fields.insert("Name".into(), text(name));
        inst.fields.insert("Next".into(), Value::Object(next));
        inst
    }

    fn top(heap: InstanceHeap, version: u32) -> EmbeddedContainer {
        let header = ContainerHeader {
            version,
            ..ContainerHeader::default()
        };
        EmbeddedContainer::top_level(0, header, heap)
    }

    /// 1: a, 2: b -> a, 3: payload slot, 4: kitchen (root)
    fn kitchen(reg: &TypeRegistry) -> EmbeddedContainer {
        let mut a = leaf(reg, "a", 0);
        a.fields
            .insert("Path".into(), Value::Scalar(Scalar::Resource("tex/a.tex".into())));
        let b = leaf(reg, "b", 1);

        let mut k = Instance::with_defaults(reg, KITCHEN).unwrap();
        let set = |k: &mut Instance, name: &str, v: Value| {
            k.fields.insert(name.into(), v);
        };
        set(&mut k, "Flag", Value::Scalar(Scalar::Bool(true)));
        set(&mut k, "Count", Value::Scalar(Scalar::S32(-7)));
        set(&mut k, "Pos", Value::Scalar(Scalar::Vec3([1.0, 2.0, 3.0])));
        set(&mut k, "World", Value::Scalar(Scalar::Position([1e9, -2.5, 0.125])));
        set(&mut k, "Id", Value::Scalar(Scalar::Guid(Uuid::from_u128(0x0123_4567_89ab_cdef_0011_2233_4455_6677))));
        set(&mut k, "Tint", Value::Scalar(Scalar::Color([1, 2, 3, 255])));
        set(
            &mut k,
            "Shape",
            Value::Scalar(Scalar::Capsule {
                start: [0.0, 1.0, 0.0],
                end: [0.0, 2.0, 0.0],
                radius: 0.5,
            }),
        );
        set(&mut k, "Kind", Value::Scalar(Scalar::RuntimeType("app.Leaf".into())));
        set(&mut k, "Blob", Value::Scalar(Scalar::Data(vec![7, 8, 9])));
        set(
            &mut k,
            "Links",
            Value::Array {
                kind: FieldKind::Object,
                items: vec![Value::Object(1), Value::Object(2)],
            },
        );
        let mut point = FieldMap::new();
        point.insert("Weight".into(), Value::Scalar(Scalar::F32(0.5)));
        point.insert("Target".into(), Value::Object(2));
        set(
            &mut k,
            "Points",
            Value::Struct {
                type_name: "app.Point".into(),
                items: vec![point],
            },
        );
        set(
            &mut k,
            "Extra",
            Value::UserData {
                index: 3,
                string: "app.Payload".into(),
            },
        );

        let mut nested = EmbeddedContainer::for_type(reg, 3, "app.Payload", ContainerHeader::default()).unwrap();
        let nested_heap = nested.heap_mut().unwrap();
        nested_heap.set_field(1, "Title", text("Test")).unwrap();
        nested_heap
            .set_field(1, "Path", Value::Scalar(Scalar::Resource("x/y.tex".into())))
            .unwrap();

        let slot = Instance::userdata_slot(PAYLOAD, 0xdddd);
        let heap = InstanceHeap::from_parts(
            vec![None, Some(a), Some(b), Some(slot), Some(k)],
            vec![4],
            vec![nested],
        );
        top(heap, 16)
    }

    fn nested_heap(container: &EmbeddedContainer, owner: u32) -> &InstanceHeap {
        container.heap().unwrap().container(owner).unwrap().heap().unwrap()
    }

    // ---- hashing ----

    #[test]
    fn murmur3_matches_engine_vectors() {
        assert_eq!(hash_utf16("Test"), 0xa71b_e5f2);
        assert_eq!(hash_utf16(""), 0x81f1_6f39);
        assert_eq!(hash_utf16("a"), 0x7bfa_8451);
        assert_eq!(murmur3_32(b"abc", ENGINE_SEED), 0xfc80_c2af);
    }

    // ---- round trip ----

    #[test]
    fn kitchen_sink_round_trip() {
        let reg = registry();
        let source = kitchen(&reg);
        let bytes = build(&reg, &source).unwrap();
        let parsed = parse(&reg, &bytes).unwrap();

        let heap = parsed.heap().unwrap();
        assert_eq!(parsed.type_id, KITCHEN);
        assert_eq!(heap.slots(), source.heap().unwrap().slots());
        assert_eq!(heap.object_table(), &[4]);
        assert_eq!(nested_heap(&parsed, 3).slots(), nested_heap(&source, 3).slots());
        assert_eq!(heap.parent_of(3), Some(4));
    }

    #[test]
    fn nested_path_hash_follows_root_text() {
        let reg = registry();
        let mut source = kitchen(&reg);
        let parsed = parse(&reg, &build(&reg, &source).unwrap()).unwrap();
        assert_eq!(parsed.heap().unwrap().container(3).unwrap().path_hash, 0xa71b_e5f2);

        let slot = source.heap().unwrap().handle_of(3).unwrap();
        let path = ContainerPath::root().child(slot);
        source.set_field(&path, 1, "Title", text("a")).unwrap();
        let parsed = parse(&reg, &build(&reg, &source).unwrap()).unwrap();
        assert_eq!(parsed.heap().unwrap().container(3).unwrap().path_hash, 0x7bfa_8451);

        refresh_path_hashes(&mut source);
        assert_eq!(source.heap().unwrap().container(3).unwrap().path_hash, 0x7bfa_8451);
    }

    #[test]
    fn sections_are_aligned() {
        let reg = registry();
        let bytes = build(&reg, &kitchen(&reg)).unwrap();
        let data_offset = u64::from_le_bytes(bytes[32..40].try_into().unwrap());
        let userdata_offset = u64::from_le_bytes(bytes[40..48].try_into().unwrap());
        assert_eq!(data_offset % 16, 0);
        assert_eq!(userdata_offset % 16, 0);
        let rsz_offset = u64::from_le_bytes(bytes[userdata_offset as usize + 16..][..8].try_into().unwrap());
        assert_eq!(rsz_offset % 16, 0);
    }

    #[test]
    fn tombstones_are_dropped_and_refs_renumbered() {
        let reg = registry();
        let mut heap = InstanceHeap::from_parts(
            vec![None, Some(leaf(&reg, "a", 0)), Some(leaf(&reg, "b", 1)), Some(leaf(&reg, "c", 2))],
            vec![3],
            Vec::new(),
        );
        heap.clear_slot(1).unwrap();
        let bytes = build(&reg, &top(heap, 16)).unwrap();
        let parsed = parse(&reg, &bytes).unwrap();
        let heap = parsed.heap().unwrap();

        assert_eq!(heap.len(), 3);
        assert_eq!(heap.get(1).unwrap().field("Next"), Some(&Value::Object(0)));
        assert_eq!(heap.get(2).unwrap().field("Next"), Some(&Value::Object(1)));
        assert_eq!(heap.object_table(), &[2]);
    }

    #[test]
    fn opaque_nested_blob_survives_byte_for_byte() {
        let reg = registry();
        let raw = vec![0xde, 0xad, 0xbe, 0xef, 1, 2, 3, 4, 5];
        let mut heap = InstanceHeap::from_parts(
            vec![None, Some(Instance::userdata_slot(PAYLOAD, 0xdddd)), Some(leaf(&reg, "root", 0))],
            vec![2],
            Vec::new(),
        );
        heap.attach_container(EmbeddedContainer {
            owner_index: 1,
            type_id: PAYLOAD,
            path_hash: 0x1234,
            header: ContainerHeader::default(),
            body: ContainerBody::Opaque(raw.clone()),
            modified: false,
        })
        .unwrap();

        let first = build(&reg, &top(heap, 16)).unwrap();
        let parsed = parse(&reg, &first).unwrap();
        let nested = parsed.heap().unwrap().container(1).unwrap();
        assert_eq!(nested.body, ContainerBody::Opaque(raw));
        assert_eq!(nested.path_hash, 0x1234);
        assert_eq!(build(&reg, &parsed).unwrap(), first);
    }

    #[test]
    fn legacy_header_round_trip() {
        let reg = registry();
        let heap = InstanceHeap::from_parts(
            vec![None, Some(leaf(&reg, "a", 0)), Some(leaf(&reg, "b", 1))],
            vec![2],
            Vec::new(),
        );
        let source = top(heap, 3);
        let bytes = build(&reg, &source).unwrap();

        assert_eq!(u32::from_le_bytes(bytes[4..8].try_into().unwrap()), 3);
        assert_eq!(u64::from_le_bytes(bytes[16..24].try_into().unwrap()), 36);
        let parsed = parse(&reg, &bytes).unwrap();
        assert_eq!(parsed.header.version, 3);
        assert_eq!(parsed.heap().unwrap().slots(), source.heap().unwrap().slots());
    }

    #[test]
    fn maybe_object_uses_backward_rule() {
        let reg = registry();
        let mut first = Instance::with_defaults(&reg, RAW).unwrap();
        first
            .fields
            .insert("Slot".into(), Value::Scalar(Scalar::Data(vec![9, 0, 0, 0])));
        let mut second = Instance::with_defaults(&reg, RAW).unwrap();
        second.fields.insert("Slot".into(), Value::Object(1));
        second.fields.insert(
            "Slots".into(),
            Value::Array {
                kind: FieldKind::MaybeObject,
                items: vec![Value::Object(1), Value::Object(1)],
            },
        );
        let source = top(
            InstanceHeap::from_parts(vec![None, Some(first), Some(second)], vec![2], Vec::new()),
            16,
        );

        let parsed = parse(&reg, &build(&reg, &source).unwrap()).unwrap();
        assert_eq!(parsed.heap().unwrap().slots(), source.heap().unwrap().slots());
    }

    #[test]
    fn random_chains_round_trip() {
        let reg = registry();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..16 {
            let n = rng.gen_range(1..24u32);
            let mut slots = vec![None];
            for i in 1..=n {
                let next = if i > 1 && rng.gen_bool(0.6) { rng.gen_range(1..i) } else { 0 };
                slots.push(Some(leaf(&reg, &format!("n{i}"), next)));
            }
            let source = top(InstanceHeap::from_parts(slots, vec![n], Vec::new()), 16);
            let parsed = parse(&reg, &build(&reg, &source).unwrap()).unwrap();
            assert_eq!(parsed.heap().unwrap().slots(), source.heap().unwrap().slots());
        }
    }

    // ---- failures ----

    #[test]
    fn truncated_blob_is_rejected() {
        let reg = registry();
        let bytes = build(&reg, &kitchen(&reg)).unwrap();
        let err = parse(&reg, &bytes[..bytes.len() - 5]).unwrap_err();
        assert!(matches!(err, CodecError::Format(_)));
        assert!(err.to_string().contains("app.Kitchen"));

        assert!(matches!(parse(&reg, &[1, 2, 3]), Err(CodecError::Format(_))));
    }

    #[test]
    fn empty_object_table_is_rejected() {
        let reg = registry();
        let mut bytes = vec![0u8; 64];
        bytes[0..4].copy_from_slice(&0x005A_5352u32.to_le_bytes());
        bytes[4..8].copy_from_slice(&16u32.to_le_bytes());
        let err = parse(&reg, &bytes).unwrap_err();
        assert_eq!(err.to_string(), "object table is empty");
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let reg = registry();
        let mut bytes = build(&reg, &kitchen(&reg)).unwrap();
        let past = bytes.len() as u64 + 100;
        bytes[32..40].copy_from_slice(&past.to_le_bytes());
        let err = parse(&reg, &bytes).unwrap_err();
        assert!(err.to_string().contains("data offset"));
    }

    #[test]
    fn unknown_type_in_nested_blob_keeps_it_opaque() {
        let reg = registry();
        let bytes = build(&reg, &kitchen(&reg)).unwrap();

        // Without the payload type the nested blob cannot decode; the parent still does.
        let mut reduced = TypeRegistry::new();
        for id in [LEAF, KITCHEN, 0x300, RAW] {
            reduced.insert(id, reg.get_type_info(id).unwrap().clone());
        }
        let parsed = parse(&reduced, &bytes).unwrap();
        assert!(parsed.heap().unwrap().container(3).unwrap().is_opaque());
    }
}
