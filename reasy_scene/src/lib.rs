#![forbid(unsafe_code)]

pub mod container;
pub mod delete;
pub mod error;
pub mod heap;
pub mod instance;
pub mod placement;

pub use container::*;
pub use delete::*;
pub use error::*;
pub use heap::*;
pub use instance::*;

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use reasy_types::{FieldDef, TypeInfo, TypeRegistry};
    use reasy_variant::{Scalar, Value};

    const LEAF: u32 = 0x100;
    const PARENT: u32 = 0x200;
    const PAYLOAD: u32 = 0x300;

    fn registry() -> TypeRegistry {
        let mut reg = TypeRegistry::new();
        reg.insert(
            LEAF,
            TypeInfo::new(
                "app.Leaf",
                0xaaaa,
                vec![
                    FieldDef::new("Name", "String", 4, 4, false, "System.String"),
                    FieldDef::new("Path", "Resource", 4, 4, false, "via.Resource"),
                    FieldDef::new("Next", "Object", 4, 4, false, "app.Leaf"),
                ],
            ),
        );
        reg.insert(
            PARENT,
            TypeInfo::new(
                "app.Parent",
                0xbbbb,
                vec![
                    FieldDef::new("A", "Object", 4, 4, false, "app.Leaf"),
                    FieldDef::new("Items", "Object", 4, 4, true, "app.Leaf[]"),
                    FieldDef::new("B", "Object", 4, 4, false, "app.Leaf"),
                    FieldDef::new("Data", "UserData", 4, 4, false, "app.Payload"),
                ],
            ),
        );
        reg.insert(
            PAYLOAD,
            TypeInfo::new(
                "app.Payload",
                0xcccc,
                vec![FieldDef::new("Path", "Resource", 4, 4, false, "via.Resource")],
            ),
        );
        reg
    }

    fn leaf(reg: &TypeRegistry, name: &str) -> Instance {
        let mut inst = Instance::with_defaults(reg, LEAF).unwrap();
        inst.fields
            .insert("Name".into(), Value::Scalar(Scalar::String(name.into())));
        inst
    }

    fn name_of(heap: &InstanceHeap, index: u32) -> &str {
        heap.get(index).and_then(Instance::first_text).unwrap_or("")
    }

    /// 1: a, 2: b, 3: parent { A -> 1, Items [], B -> 2 }
    fn parent_heap(reg: &TypeRegistry) -> InstanceHeap {
        let mut parent = Instance::with_defaults(reg, PARENT).unwrap();
        parent.fields.insert("A".into(), Value::Object(1));
        parent.fields.insert("B".into(), Value::Object(2));
        InstanceHeap::from_parts(
            vec![None, Some(leaf(reg, "a")), Some(leaf(reg, "b")), Some(parent)],
            vec![3],
            Vec::new(),
        )
    }

    fn top(heap: InstanceHeap) -> EmbeddedContainer {
        EmbeddedContainer::top_level(PARENT, ContainerHeader::default(), heap)
    }

    // ---- placement ----

    #[test]
    fn insertion_lands_between_neighbouring_subtrees() {
        let reg = registry();
        let heap = parent_heap(&reg);
        let at = heap.insertion_index(&reg, 3, "Items").unwrap();
        assert_eq!(at, 2);
    }

    #[test]
    fn insertion_after_existing_array_elements() {
        let reg = registry();
        let mut heap = parent_heap(&reg);
        let index = heap.insert(2, leaf(&reg, "item0")).unwrap();
        heap.link_reference(4, "Items", Value::Object(index)).unwrap();

        let at = heap.insertion_index(&reg, 4, "Items").unwrap();
        assert_eq!(at, 3);
    }

    #[test]
    fn insertion_for_unknown_field_errors() {
        let reg = registry();
        let heap = parent_heap(&reg);
        assert!(matches!(
            heap.insertion_index(&reg, 3, "Nope"),
            Err(HeapError::UnknownField { .. })
        ));
    }

    // ---- insert / shift ----

    #[test]
    fn insert_shifts_references_and_roots() {
        let reg = registry();
        let mut heap = parent_heap(&reg);
        let handle_b = heap.handle_of(2).unwrap();

        heap.insert(2, leaf(&reg, "new")).unwrap();

        assert_eq!(heap.len(), 5);
        assert_eq!(name_of(&heap, 3), "b");
        let parent = heap.get(4).unwrap();
        assert_eq!(parent.field("A"), Some(&Value::Object(1)));
        assert_eq!(parent.field("B"), Some(&Value::Object(3)));
        assert_eq!(heap.object_table(), &[4]);
        assert_eq!(heap.index_of(handle_b), Some(3));
        assert_eq!(heap.parent_of(3), Some(4));
    }

    #[test]
    fn insert_rejects_null_slot() {
        let reg = registry();
        let mut heap = parent_heap(&reg);
        assert!(matches!(
            heap.insert(0, leaf(&reg, "x")),
            Err(HeapError::InvalidIndex(0))
        ));
        assert!(heap.insert(5, leaf(&reg, "x")).is_err());
    }

    #[test]
    fn insert_many_keeps_inserted_refs_verbatim() {
        let reg = registry();
        let mut heap = parent_heap(&reg);
        let mut second = leaf(&reg, "second");
        second.fields.insert("Next".into(), Value::Object(1));
        let range = heap.insert_many(1, vec![leaf(&reg, "first"), second]).unwrap();

        assert_eq!(range, 1..3);
        assert_eq!(heap.get(2).unwrap().field("Next"), Some(&Value::Object(1)));
        assert_eq!(heap.get(5).unwrap().field("A"), Some(&Value::Object(3)));
    }

    #[test]
    fn random_inserts_preserve_identity() {
        let reg = registry();
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut heap = parent_heap(&reg);

        for n in 0..40 {
            let len = heap.len() as u32;
            let at = rng.gen_range(1..=len);
            heap.insert(at, leaf(&reg, &format!("n{n}"))).unwrap();

            let root = heap.object_table()[0];
            let parent = heap.get(root).unwrap();
            assert_eq!(parent.type_id, PARENT);
            let a = parent.field("A").and_then(Value::object_ref).unwrap();
            let b = parent.field("B").and_then(Value::object_ref).unwrap();
            assert_eq!(name_of(&heap, a), "a");
            assert_eq!(name_of(&heap, b), "b");
        }
        assert_eq!(heap.live_count(), 43);
    }

    // ---- tombstones ----

    #[test]
    fn compact_drops_tombstones_and_nulls_refs() {
        let reg = registry();
        let mut heap = parent_heap(&reg);
        heap.clear_slot(1).unwrap();

        let map = heap.compact();
        assert_eq!(map.get(&1), Some(&0));
        assert_eq!(map.get(&3), Some(&2));
        let parent = heap.get(2).unwrap();
        assert_eq!(parent.field("A"), Some(&Value::Object(0)));
        assert_eq!(parent.field("B"), Some(&Value::Object(1)));
        assert_eq!(heap.object_table(), &[2]);
    }

    #[test]
    fn validate_nulls_dangling_refs() {
        let reg = registry();
        let mut parent = Instance::with_defaults(&reg, PARENT).unwrap();
        parent.fields.insert("A".into(), Value::Object(9));
        parent.fields.insert("B".into(), Value::Object(1));
        let mut heap =
            InstanceHeap::from_parts(vec![None, Some(leaf(&reg, "b")), Some(parent)], vec![2, 7], Vec::new());

        assert_eq!(heap.validate_references(), 1);
        assert_eq!(heap.get(2).unwrap().field("A"), Some(&Value::Object(0)));
        assert_eq!(heap.object_table(), &[2]);
    }

    // ---- delete ----

    #[test]
    fn delete_removes_exclusive_subtree() {
        let reg = registry();
        let mut a = leaf(&reg, "a");
        a.fields.insert("Next".into(), Value::Object(1));
        let mut parent = Instance::with_defaults(&reg, PARENT).unwrap();
        parent.fields.insert("A".into(), Value::Object(2));
        parent.fields.insert("B".into(), Value::Object(3));
        let mut heap = InstanceHeap::from_parts(
            vec![None, Some(leaf(&reg, "a.next")), Some(a), Some(leaf(&reg, "b")), Some(parent)],
            vec![4],
            Vec::new(),
        );

        let report = heap.delete(2).unwrap();
        assert_eq!(report.freed, vec![1, 2]);
        assert_eq!(report.nulled_references, 1);
        assert_eq!(heap.len(), 3);
        let parent = heap.get(2).unwrap();
        assert_eq!(parent.field("A"), Some(&Value::Object(0)));
        assert_eq!(parent.field("B"), Some(&Value::Object(1)));
        assert_eq!(heap.object_table(), &[2]);
    }

    #[test]
    fn delete_keeps_descendants_shared_elsewhere() {
        let reg = registry();
        let mut a = leaf(&reg, "a");
        a.fields.insert("Next".into(), Value::Object(1));
        let mut parent = Instance::with_defaults(&reg, PARENT).unwrap();
        parent.fields.insert("A".into(), Value::Object(2));
        parent.fields.insert("B".into(), Value::Object(1));
        let mut heap = InstanceHeap::from_parts(
            vec![None, Some(leaf(&reg, "shared")), Some(a), Some(parent)],
            vec![3],
            Vec::new(),
        );

        let report = heap.delete(2).unwrap();
        assert_eq!(report.freed, vec![2]);
        assert_eq!(name_of(&heap, 1), "shared");
        assert_eq!(heap.get(2).unwrap().field("B"), Some(&Value::Object(1)));
    }

    #[test]
    fn delete_of_multiply_referenced_target_is_noop() {
        let reg = registry();
        let mut parent = Instance::with_defaults(&reg, PARENT).unwrap();
        parent.fields.insert("A".into(), Value::Object(1));
        parent.fields.insert("B".into(), Value::Object(1));
        let mut other = leaf(&reg, "other");
        other.fields.insert("Next".into(), Value::Object(1));
        let mut heap = InstanceHeap::from_parts(
            vec![None, Some(leaf(&reg, "x")), Some(other), Some(parent)],
            vec![3],
            Vec::new(),
        );
        let before = heap.clone();

        let report = heap.delete(1).unwrap();
        assert!(report.is_noop());
        assert_eq!(heap, before);
    }

    #[test]
    fn delete_missing_slot_errors() {
        let reg = registry();
        let mut heap = parent_heap(&reg);
        assert!(matches!(heap.delete(9), Err(HeapError::InvalidIndex(9))));
        assert!(matches!(heap.delete(0), Err(HeapError::InvalidIndex(0))));
    }

    // ---- container tree ----

    #[test]
    fn create_object_links_before_owner() {
        let reg = registry();
        let mut root = top(parent_heap(&reg));
        let path = ContainerPath::root();

        let index = root
            .create_object(&path, &reg, 3, "Items", "app.Leaf")
            .unwrap();
        assert_eq!(index, 2);

        let heap = root.heap().unwrap();
        let parent = heap.get(4).unwrap();
        assert_eq!(parent.field("Items").and_then(Value::as_array), Some(&[Value::Object(2)][..]));
        assert_eq!(parent.field("B"), Some(&Value::Object(3)));
        assert!(root.modified);
    }

    #[test]
    fn create_object_rejects_wrong_field_kind() {
        let reg = registry();
        let mut root = top(parent_heap(&reg));
        let before = root.clone();
        let err = root
            .create_object(&ContainerPath::root(), &reg, 3, "Data", "app.Leaf")
            .unwrap_err();
        assert!(matches!(err, HeapError::FieldKindMismatch { .. }));
        assert_eq!(root, before);
    }

    /// 1: a, 2: p1 { A -> 1 }, 3: b, 4: p2 { A -> 3, B -> 1 }, with p1 and p2 as roots.
    fn two_root_heap(reg: &TypeRegistry) -> InstanceHeap {
        let mut p1 = Instance::with_defaults(reg, PARENT).unwrap();
        p1.fields.insert("A".into(), Value::Object(1));
        let mut p2 = Instance::with_defaults(reg, PARENT).unwrap();
        p2.fields.insert("A".into(), Value::Object(3));
        p2.fields.insert("B".into(), Value::Object(1));
        InstanceHeap::from_parts(
            vec![None, Some(leaf(reg, "a")), Some(p1), Some(leaf(reg, "b")), Some(p2)],
            vec![2, 4],
            Vec::new(),
        )
    }

    #[test]
    fn create_root_object_lands_between_existing_roots() {
        let reg = registry();
        let mut root = top(two_root_heap(&reg));
        let path = ContainerPath::root();

        let index = root
            .create_root_object(&path, &reg, "app.Leaf", Some(2))
            .unwrap();
        assert_eq!(index, 3);

        let heap = root.heap().unwrap();
        assert_eq!(heap.object_table(), &[2, 3, 5]);
        assert_eq!(name_of(heap, 4), "b");
        let p2 = heap.get(5).unwrap();
        assert_eq!(p2.field("A"), Some(&Value::Object(4)));
        assert_eq!(p2.field("B"), Some(&Value::Object(1)));
        assert_eq!(heap.get(2).unwrap().field("A"), Some(&Value::Object(1)));
        assert_eq!(heap.get(3).unwrap().type_id, LEAF);
        assert!(root.modified);
    }

    #[test]
    fn create_root_object_without_anchor_appends() {
        let reg = registry();
        let mut root = top(two_root_heap(&reg));
        let index = root
            .create_root_object(&ContainerPath::root(), &reg, "app.Payload", None)
            .unwrap();
        assert_eq!(index, 5);
        assert_eq!(root.heap().unwrap().object_table(), &[2, 4, 5]);
    }

    #[test]
    fn create_root_object_needs_a_root_anchor() {
        let reg = registry();
        let mut root = top(two_root_heap(&reg));
        let before = root.clone();
        let err = root
            .create_root_object(&ContainerPath::root(), &reg, "app.Leaf", Some(3))
            .unwrap_err();
        assert!(matches!(err, HeapError::NotARoot(3)));
        assert_eq!(root, before);
    }

    #[test]
    fn nested_paths_survive_parent_shifts() {
        let reg = registry();
        let mut root = top(parent_heap(&reg));
        let path = ContainerPath::root();

        let slot = root
            .create_userdata(&path, &reg, 3, "Data", "app.Payload")
            .unwrap();
        let handle = root.heap().unwrap().handle_of(slot).unwrap();
        let nested = path.child(handle);
        assert_eq!(root.heap_at(&nested).unwrap().object_table(), &[1]);

        root.create_object(&path, &reg, root.root_index().unwrap(), "A", "app.Leaf")
            .unwrap();
        let heap = root.heap().unwrap();
        assert_eq!(heap.containers()[0].owner_index, heap.index_of(handle).unwrap());
        assert!(root.container_at(&nested).is_some());

        root.modified = false;
        root.container_at_mut(&nested).unwrap().modified = false;
        root.set_field(&nested, 1, "Path", Value::Scalar(Scalar::Resource("a/b.tex".into())))
            .unwrap();
        assert!(root.modified);
        assert!(root.container_at(&nested).unwrap().modified);
        assert_eq!(root.collect_resources(), vec!["a/b.tex".to_string()]);
        assert_eq!(root.walk().len(), 2);
    }

    #[test]
    fn opaque_container_refuses_edits() {
        let reg = registry();
        let mut heap = parent_heap(&reg);
        let slot = heap.push(Instance::userdata_slot(PAYLOAD, 0xcccc));
        heap.attach_container(EmbeddedContainer {
            owner_index: slot,
            type_id: PAYLOAD,
            path_hash: 0,
            header: ContainerHeader::default(),
            body: ContainerBody::Opaque(vec![1, 2, 3]),
            modified: false,
        })
        .unwrap();
        let mut root = top(heap);
        let nested = root.path_from_indices(&[slot]).unwrap();

        let err = root
            .set_field(&nested, 1, "Path", Value::Scalar(Scalar::Resource("x".into())))
            .unwrap_err();
        assert!(matches!(err, HeapError::OpaqueContainer(_)));
    }

    #[test]
    fn remove_array_element_deletes_orphaned_target() {
        let reg = registry();
        let mut root = top(parent_heap(&reg));
        let path = ContainerPath::root();
        let first = root.create_object(&path, &reg, 3, "Items", "app.Leaf").unwrap();
        let owner = root.root_index().unwrap();
        root.create_object(&path, &reg, owner, "Items", "app.Leaf").unwrap();
        let owner = root.root_index().unwrap();
        assert_eq!(first, 2);

        let report = root.remove_array_element(&path, owner, "Items", 0).unwrap();
        assert_eq!(report.freed, vec![2]);
        let heap = root.heap().unwrap();
        let owner = heap.object_table()[0];
        let items = heap.get(owner).unwrap().field("Items").and_then(Value::as_array).unwrap();
        assert_eq!(items.len(), 1);
        assert!(matches!(
            root.remove_array_element(&path, owner, "Items", 4),
            Err(HeapError::ElementOutOfRange { element: 4, .. })
        ));
    }

    #[test]
    fn container_path_display() {
        let path = ContainerPath::root()
            .child(reasy_ids::InstanceHandle::from_parts(3, 0))
            .child(reasy_ids::InstanceHandle::from_parts(1, 2));
        assert_eq!(path.to_string(), "root/3:0/1:2");
        assert_eq!(path.parent().unwrap().depth(), 1);
    }
}
