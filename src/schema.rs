//! Collection schema definitions.
//!
//! A [`Schema`] is a versioned, append-only list of collections. Each
//! [`CollectionDef`] names its primary-key policy and its secondary indices.
//! The store persists the schema it was created with so later versions can
//! add collections and indices without touching existing data.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::{Key, Record};

pub const PROJECTS: &str = "projects";
pub const DIARY_ENTRIES: &str = "diaryEntries";
pub const TIME_ENTRIES: &str = "timeEntries";
pub const EMPLOYEES: &str = "employees";
pub const FORMS: &str = "forms";
pub const PHOTOS: &str = "photos";
pub const SYNC_QUEUE: &str = "syncQueue";

/// Schema version of [`Schema::field_app`].
pub const FIELD_APP_SCHEMA_VERSION: u32 = 1;

/// Name prefix reserved for internal databases.
pub(crate) const RESERVED_PREFIX: &str = "__";

/// How a collection obtains primary keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum KeyPolicy {
    /// The caller supplies a non-empty string id in `field`.
    Provided { field: String },
    /// The store assigns the next value of a per-collection counter when `field` is absent.
    AutoIncrement { field: String },
}

impl KeyPolicy {
    pub fn field(&self) -> &str {
        match self {
            KeyPolicy::Provided { field } | KeyPolicy::AutoIncrement { field } => field,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    pub name: String,
    pub field: String,
}

impl IndexDef {
    /// Indexed value of `record`. Absent and `null` fields are not indexed.
    pub fn value_of(&self, record: &Record) -> Option<Value> {
        match record.get(&self.field) {
            None | Some(Value::Null) => None,
            Some(value) => Some(value.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionDef {
    pub name: String,
    pub key: KeyPolicy,
    #[serde(default)]
    pub indices: Vec<IndexDef>,
}

impl CollectionDef {
    /// Collection keyed by a caller-supplied string id.
    pub fn keyed(name: &str, key_field: &str) -> Self {
        Self {
            name: name.to_string(),
            key: KeyPolicy::Provided {
                field: key_field.to_string(),
            },
            indices: Vec::new(),
        }
    }

    /// Collection keyed by an auto-incrementing sequence number.
    pub fn auto_increment(name: &str, key_field: &str) -> Self {
        Self {
            name: name.to_string(),
            key: KeyPolicy::AutoIncrement {
                field: key_field.to_string(),
            },
            indices: Vec::new(),
        }
    }

    /// Adds a secondary index named `name` over `field`.
    pub fn index(mut self, name: &str, field: &str) -> Self {
        self.indices.push(IndexDef {
            name: name.to_string(),
            field: field.to_string(),
        });
        self
    }

    pub fn find_index(&self, name: &str) -> Option<&IndexDef> {
        self.indices.iter().find(|index| index.name == name)
    }

    /// Reads the primary key carried by `record`, if any.
    ///
    /// String ids belong to [`KeyPolicy::Provided`] collections and unsigned
    /// integers to [`KeyPolicy::AutoIncrement`] ones; anything else is rejected.
    pub fn key_of(&self, record: &Record) -> Result<Option<Key>, String> {
        let field = self.key.field();
        let value = match record.get(field) {
            None | Some(Value::Null) => return Ok(None),
            Some(value) => value,
        };

        match (&self.key, value) {
            (KeyPolicy::Provided { .. }, Value::String(id)) if id.is_empty() => {
                Err(format!("primary key '{field}' must not be empty"))
            }
            (KeyPolicy::Provided { .. }, Value::String(id)) => Ok(Some(Key::Text(id.clone()))),
            (KeyPolicy::AutoIncrement { .. }, Value::Number(n)) => n
                .as_u64()
                .filter(|seq| *seq > 0)
                .map(|seq| Some(Key::Seq(seq)))
                .ok_or_else(|| format!("primary key '{field}' must be a positive integer")),
            (KeyPolicy::Provided { .. }, other) => {
                Err(format!("primary key '{field}' must be a string, got {other}"))
            }
            (KeyPolicy::AutoIncrement { .. }, other) => {
                Err(format!("primary key '{field}' must be an integer, got {other}"))
            }
        }
    }

    /// Converts a textual key (e.g. received over FFI) into this collection's key type.
    pub fn parse_key(&self, raw: &str) -> Key {
        match self.key {
            KeyPolicy::AutoIncrement { .. } => match raw.parse::<u64>() {
                Ok(seq) => Key::Seq(seq),
                Err(_) => Key::Text(raw.to_string()),
            },
            KeyPolicy::Provided { .. } => Key::Text(raw.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub version: u32,
    pub collections: Vec<CollectionDef>,
}

impl Schema {
    pub fn new(version: u32, collections: Vec<CollectionDef>) -> Self {
        Self {
            version,
            collections,
        }
    }

    /// The collections used by the field-worker application.
    pub fn field_app() -> Self {
        Self::new(
            FIELD_APP_SCHEMA_VERSION,
            vec![
                CollectionDef::keyed(PROJECTS, "id")
                    .index("status", "status")
                    .index("createdAt", "createdAt"),
                CollectionDef::keyed(DIARY_ENTRIES, "id")
                    .index("projectId", "projectId")
                    .index("date", "date"),
                CollectionDef::keyed(TIME_ENTRIES, "id")
                    .index("projectId", "projectId")
                    .index("employeeId", "employeeId")
                    .index("date", "date"),
                CollectionDef::keyed(EMPLOYEES, "id").index("name", "name"),
                CollectionDef::keyed(FORMS, "id")
                    .index("projectId", "projectId")
                    .index("type", "type"),
                CollectionDef::keyed(PHOTOS, "id")
                    .index("diaryEntryId", "diaryEntryId")
                    .index("formId", "formId"),
                CollectionDef::auto_increment(SYNC_QUEUE, "id"),
            ],
        )
    }

    pub fn collection(&self, name: &str) -> Option<&CollectionDef> {
        self.collections.iter().find(|c| c.name == name)
    }

    /// Number of named databases the schema occupies.
    pub fn database_count(&self) -> usize {
        self.collections.iter().map(|c| 1 + c.indices.len()).sum()
    }

    /// Rejects duplicate or reserved names and names that could collide with
    /// index database names.
    pub fn validate(&self) -> Result<(), String> {
        let mut names = HashSet::new();
        for collection in &self.collections {
            if collection.name.is_empty()
                || collection.name.contains('.')
                || collection.name.starts_with(RESERVED_PREFIX)
            {
                return Err(format!("invalid collection name '{}'", collection.name));
            }
            if !names.insert(collection.name.as_str()) {
                return Err(format!("duplicate collection '{}'", collection.name));
            }

            let mut index_names = HashSet::new();
            for index in &collection.indices {
                if index.name.is_empty() || !index_names.insert(index.name.as_str()) {
                    return Err(format!(
                        "invalid or duplicate index '{}' on '{}'",
                        index.name, collection.name
                    ));
                }
            }
        }
        Ok(())
    }

    /// Checks that `self` only appends to `previous`: every earlier collection
    /// survives with the same key policy and at least its earlier indices.
    pub fn extends(&self, previous: &Schema) -> Result<(), String> {
        for old in &previous.collections {
            let Some(new) = self.collection(&old.name) else {
                return Err(format!("collection '{}' was removed", old.name));
            };
            if new.key != old.key {
                return Err(format!("key policy of '{}' changed", old.name));
            }
            for index in &old.indices {
                if new.find_index(&index.name) != Some(index) {
                    return Err(format!(
                        "index '{}' on '{}' was removed or altered",
                        index.name, old.name
                    ));
                }
            }
        }
        Ok(())
    }

    /// Indices that `self` adds to collections already present in `previous`.
    /// These need backfilling from existing records.
    pub fn indices_added_since<'a>(
        &'a self,
        previous: &Schema,
    ) -> Vec<(&'a CollectionDef, &'a IndexDef)> {
        let mut added = Vec::new();
        for collection in &self.collections {
            let Some(old) = previous.collection(&collection.name) else {
                continue;
            };
            for index in &collection.indices {
                if old.find_index(&index.name).is_none() {
                    added.push((collection, index));
                }
            }
        }
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_app_layout() {
        let schema = Schema::field_app();

        assert!(schema.validate().is_ok());
        assert_eq!(schema.collections.len(), 7);
        assert_eq!(schema.database_count(), 7 + 12);

        let queue = schema.collection(SYNC_QUEUE).unwrap();
        assert!(matches!(queue.key, KeyPolicy::AutoIncrement { .. }));
        assert!(queue.indices.is_empty());

        let photos = schema.collection(PHOTOS).unwrap();
        assert!(photos.find_index("diaryEntryId").is_some());
        assert!(photos.find_index("formId").is_some());
    }

    #[test]
    fn test_key_of() {
        let projects = CollectionDef::keyed(PROJECTS, "id");
        let queue = CollectionDef::auto_increment(SYNC_QUEUE, "id");

        let with_id = Record::try_from(json!({"id": "p1"})).unwrap();
        let without_id = Record::try_from(json!({"name": "x"})).unwrap();
        let empty_id = Record::try_from(json!({"id": ""})).unwrap();
        let numeric_id = Record::try_from(json!({"id": 7})).unwrap();

        assert_eq!(projects.key_of(&with_id).unwrap(), Some(Key::Text("p1".into())));
        assert_eq!(projects.key_of(&without_id).unwrap(), None);
        assert!(projects.key_of(&empty_id).is_err());
        assert!(projects.key_of(&numeric_id).is_err());

        assert_eq!(queue.key_of(&numeric_id).unwrap(), Some(Key::Seq(7)));
        assert!(queue.key_of(&with_id).is_err());
    }

    #[test]
    fn test_rejects_invalid_names() {
        let dotted = Schema::new(1, vec![CollectionDef::keyed("a.b", "id")]);
        let reserved = Schema::new(1, vec![CollectionDef::keyed("__meta", "id")]);
        let duplicate = Schema::new(
            1,
            vec![CollectionDef::keyed("a", "id"), CollectionDef::keyed("a", "id")],
        );

        assert!(dotted.validate().is_err());
        assert!(reserved.validate().is_err());
        assert!(duplicate.validate().is_err());
    }

    #[test]
    fn test_additive_changes() {
        let v1 = Schema::new(1, vec![CollectionDef::keyed("notes", "id")]);
        let v2 = Schema::new(
            2,
            vec![
                CollectionDef::keyed("notes", "id").index("tag", "tag"),
                CollectionDef::keyed("labels", "id"),
            ],
        );

        assert!(v2.extends(&v1).is_ok());
        assert!(v1.extends(&v2).is_err());

        let added = v2.indices_added_since(&v1);
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].0.name, "notes");
        assert_eq!(added[0].1.name, "tag");
    }
}
