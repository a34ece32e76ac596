//! Field path to column name mapping.
//!
//! A field path is the dotted chain of serialized property names from the
//! saga root, e.g. `Nested.Id`. Columns are resolved from registered
//! mapping entries:
//!
//! 1. an exact entry on the full path,
//! 2. the longest prefix entry on a parent path (prefix + remaining segments),
//! 3. the leaf property name.

/// Whether a mapping renames one path or prefixes everything below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    Exact,
    Prefix,
}

/// A single registered mapping entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMapping {
    pub path: String,
    pub name: String,
    pub kind: MappingKind,
}

impl FieldMapping {
    /// Map `path` to exactly the column `name`.
    pub fn exact(path: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            name: name.into(),
            kind: MappingKind::Exact,
        }
    }

    /// Prefix every column below `path`. Defaults the prefix to the leaf segment.
    pub fn prefix(path: impl Into<String>, prefix: Option<&str>) -> Self {
        let path = path.into();
        let name = match prefix {
            Some(prefix) => prefix.to_string(),
            None => leaf(&path).to_string(),
        };
        Self {
            path,
            name,
            kind: MappingKind::Prefix,
        }
    }
}

/// Ordered set of mapping entries for one saga type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMappings {
    entries: Vec<FieldMapping>,
}

impl FieldMappings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mapping: FieldMapping) {
        self.entries.push(mapping);
    }

    pub fn entries(&self) -> &[FieldMapping] {
        &self.entries
    }

    /// Resolve the column name for a field path.
    pub fn resolve(&self, path: &str) -> String {
        // later registrations win over earlier ones for the same path
        if let Some(exact) = self
            .entries
            .iter()
            .rev()
            .find(|m| m.kind == MappingKind::Exact && m.path == path)
        {
            return exact.name.clone();
        }

        let mut best: Option<&FieldMapping> = None;
        for mapping in self.entries.iter().filter(|m| m.kind == MappingKind::Prefix) {
            if !is_parent(&mapping.path, path) {
                continue;
            }
            if best.is_none_or(|b| mapping.path.len() >= b.path.len()) {
                best = Some(mapping);
            }
        }

        match best {
            Some(prefix) => {
                let rest: String = path[prefix.path.len() + 1..].split('.').collect();
                format!("{}{}", prefix.name, rest)
            }
            None => leaf(path).to_string(),
        }
    }
}

fn is_parent(parent: &str, path: &str) -> bool {
    path.len() > parent.len()
        && path.starts_with(parent)
        && path.as_bytes()[parent.len()] == b'.'
}

/// Last segment of a dotted path.
pub(crate) fn leaf(path: &str) -> &str {
    path.rsplit('.').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mappings(entries: Vec<FieldMapping>) -> FieldMappings {
        let mut m = FieldMappings::new();
        for entry in entries {
            m.push(entry);
        }
        m
    }

    #[test]
    fn unmapped_path_uses_leaf() {
        let m = FieldMappings::new();
        assert_eq!(m.resolve("Name"), "Name");
        assert_eq!(m.resolve("Nested.Id"), "Id");
    }

    #[test]
    fn prefix_applies_to_children_only() {
        let m = mappings(vec![FieldMapping::prefix("Nested", None)]);
        assert_eq!(m.resolve("Nested.Id"), "NestedId");
        assert_eq!(m.resolve("Id"), "Id");
        assert_eq!(m.resolve("NestedValue"), "NestedValue");
    }

    #[test]
    fn custom_prefix() {
        let m = mappings(vec![FieldMapping::prefix("Nested", Some("nst_"))]);
        assert_eq!(m.resolve("Nested.Id"), "nst_Id");
    }

    #[test]
    fn exact_beats_prefix() {
        let m = mappings(vec![
            FieldMapping::prefix("Nested", None),
            FieldMapping::exact("Nested.Id", "MyId"),
        ]);
        assert_eq!(m.resolve("Nested.Id"), "MyId");
        assert_eq!(m.resolve("Nested.Name"), "NestedName");
    }

    #[test]
    fn longest_prefix_wins() {
        let m = mappings(vec![
            FieldMapping::prefix("Outer", None),
            FieldMapping::prefix("Outer.Inner", Some("in_")),
        ]);
        assert_eq!(m.resolve("Outer.Inner.Id"), "in_Id");
        assert_eq!(m.resolve("Outer.Other.Id"), "OuterOtherId");
    }

    #[test]
    fn exact_mappings_do_not_conflict() {
        let m = mappings(vec![
            FieldMapping::exact("Optional.Id", "id2"),
            FieldMapping::exact("Nested.Id", "id1"),
        ]);
        assert_eq!(m.resolve("Nested.Id"), "id1");
        assert_eq!(m.resolve("Optional.Id"), "id2");
    }
}
