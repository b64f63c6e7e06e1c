use reasy_variant::FieldMap;
use rustc_hash::FxHashMap;
use uuid::Uuid;

/// Hands out replacement GUIDs for one paste. The same original always maps to the
/// same replacement, and the nil GUID is never replaced.
#[derive(Debug, Default)]
pub struct GuidMapper {
    enabled: bool,
    mapping: FxHashMap<Uuid, Uuid>,
}

impl GuidMapper {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            mapping: FxHashMap::default(),
        }
    }

    /// Mapper that keeps every GUID as is.
    pub fn identity() -> Self {
        Self::new(false)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn map(&mut self, original: Uuid) -> Uuid {
        if !self.enabled || original.is_nil() {
            return original;
        }
        *self.mapping.entry(original).or_insert_with(Uuid::new_v4)
    }

    /// Rewrites every GUID-typed scalar in `fields`. Returns how many changed.
    pub fn apply(&mut self, fields: &mut FieldMap) -> usize {
        let mut changed = 0;
        for value in fields.values_mut() {
            value.for_each_scalar_mut(&mut |scalar| {
                if let Some(guid) = scalar.as_guid_mut() {
                    let next = self.map(*guid);
                    if next != *guid {
                        *guid = next;
                        changed += 1;
                    }
                }
            });
        }
        changed
    }

    pub fn get(&self, original: &Uuid) -> Option<Uuid> {
        self.mapping.get(original).copied()
    }

    /// Number of distinct GUIDs replaced so far.
    pub fn len(&self) -> usize {
        self.mapping.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.is_empty()
    }
}
