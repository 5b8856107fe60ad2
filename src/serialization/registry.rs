//! Per-type tag registry.

use std::collections::{BTreeMap, HashMap};

use super::tags::{IncludeTag, IncludeTarget, PayloadDataIndex, PayloadIncludeIndex};
use crate::error::{PeerError, Result};

#[derive(Debug, Default)]
struct MemberTable {
    by_tag: BTreeMap<PayloadDataIndex, String>,
    by_field: HashMap<String, PayloadDataIndex>,
}

/// Member and include tags keyed by payload type name.
#[derive(Debug, Default)]
pub struct TagRegistry {
    members: HashMap<String, MemberTable>,
    includes: HashMap<String, BTreeMap<PayloadIncludeIndex, IncludeTarget>>,
}

impl TagRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tag `field` of `type_name`.
    ///
    /// A tag may appear once per type and a field may carry one tag.
    pub fn register_member(
        &mut self,
        type_name: &str,
        field: &str,
        index: PayloadDataIndex,
    ) -> Result<()> {
        let table = self.members.entry(type_name.to_string()).or_default();

        if table.by_tag.contains_key(&index) {
            return Err(PeerError::DuplicateTag {
                type_name: type_name.to_string(),
                tag: index.get(),
            });
        }
        if table.by_field.contains_key(field) {
            return Err(PeerError::invalid_argument(
                "field",
                format!("`{}` on `{}` is already tagged", field, type_name),
            ));
        }

        table.by_tag.insert(index, field.to_string());
        table.by_field.insert(field.to_string(), index);
        Ok(())
    }

    /// Wire an include tag on `base_type`.
    pub fn register_include(&mut self, base_type: &str, include: IncludeTag) -> Result<()> {
        let table = self.includes.entry(base_type.to_string()).or_default();
        if table.contains_key(&include.index()) {
            return Err(PeerError::DuplicateTag {
                type_name: base_type.to_string(),
                tag: include.index().get(),
            });
        }
        table.insert(include.index(), include.target());
        Ok(())
    }

    /// Tag of a member field.
    pub fn member_tag(&self, type_name: &str, field: &str) -> Option<PayloadDataIndex> {
        self.members
            .get(type_name)
            .and_then(|table| table.by_field.get(field))
            .copied()
    }

    /// Field carrying a member tag.
    pub fn member_field(&self, type_name: &str, index: PayloadDataIndex) -> Option<&str> {
        self.members
            .get(type_name)
            .and_then(|table| table.by_tag.get(&index))
            .map(String::as_str)
    }

    /// Members of a type in tag order.
    pub fn members(&self, type_name: &str) -> Vec<(PayloadDataIndex, &str)> {
        self.members
            .get(type_name)
            .map(|table| {
                table
                    .by_tag
                    .iter()
                    .map(|(index, field)| (*index, field.as_str()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Target wired to an include tag.
    pub fn include_target(
        &self,
        base_type: &str,
        index: PayloadIncludeIndex,
    ) -> Option<IncludeTarget> {
        self.includes
            .get(base_type)
            .and_then(|table| table.get(&index))
            .copied()
    }

    /// Include tag wired to `T` on `base_type`.
    pub fn include_index_of<T: ?Sized + 'static>(
        &self,
        base_type: &str,
    ) -> Option<PayloadIncludeIndex> {
        self.includes.get(base_type).and_then(|table| {
            table
                .iter()
                .find(|(_, target)| target.is::<T>())
                .map(|(index, _)| *index)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Warrior;
    struct Mage;

    fn data(tag: i64) -> PayloadDataIndex {
        PayloadDataIndex::new(tag).unwrap()
    }

    fn include(tag: i64) -> PayloadIncludeIndex {
        PayloadIncludeIndex::new(tag).unwrap()
    }

    #[test]
    fn test_member_lookup_both_ways() {
        let mut registry = TagRegistry::new();
        registry.register_member("Move", "x", data(1)).unwrap();
        registry.register_member("Move", "y", data(2)).unwrap();

        assert_eq!(registry.member_tag("Move", "y"), Some(data(2)));
        assert_eq!(registry.member_field("Move", data(1)), Some("x"));
        assert_eq!(registry.member_tag("Move", "z"), None);
        assert_eq!(registry.members("Move"), vec![(data(1), "x"), (data(2), "y")]);
        assert!(registry.members("Unknown").is_empty());
    }

    #[test]
    fn test_duplicate_member_tag_rejected() {
        let mut registry = TagRegistry::new();
        registry.register_member("Move", "x", data(1)).unwrap();

        let err = registry.register_member("Move", "y", data(1)).unwrap_err();
        assert!(matches!(err, PeerError::DuplicateTag { tag: 1, .. }));

        // Same tag on a different type is fine.
        registry.register_member("Chat", "text", data(1)).unwrap();
    }

    #[test]
    fn test_field_tagged_twice_rejected() {
        let mut registry = TagRegistry::new();
        registry.register_member("Move", "x", data(1)).unwrap();
        assert!(registry
            .register_member("Move", "x", data(2))
            .unwrap_err()
            .is_invalid_argument());
    }

    #[test]
    fn test_includes() {
        let mut registry = TagRegistry::new();
        registry
            .register_include("Hero", IncludeTag::new(include(1), IncludeTarget::of::<Warrior>()).unwrap())
            .unwrap();
        registry
            .register_include("Hero", IncludeTag::new(include(2), IncludeTarget::of::<Mage>()).unwrap())
            .unwrap();

        assert!(registry.include_target("Hero", include(2)).unwrap().is::<Mage>());
        assert_eq!(registry.include_index_of::<Warrior>("Hero"), Some(include(1)));
        assert_eq!(registry.include_index_of::<String>("Hero"), None);

        let dup = IncludeTag::new(include(1), IncludeTarget::of::<Mage>()).unwrap();
        assert!(matches!(
            registry.register_include("Hero", dup),
            Err(PeerError::DuplicateTag { .. })
        ));
    }
}
