//! In-memory storage backend.
//!
//! Tables are keyed by shape name, rows by primary-key text. Join state
//! for many-to-many associations lives in a separate key list per
//! owner record and field. Intended for tests and small tools; every
//! operation clones through a single mutex.

use std::collections::BTreeMap;
use std::sync::Mutex;

use metabind_record::{
    FieldKind, RelationshipKind, Shape, Storage, StorageError, Value,
};

#[derive(Default)]
struct Inner {
    /// shape name -> primary-key text -> record
    tables: BTreeMap<String, BTreeMap<String, Value>>,
    /// "shape:owner key:field" -> related primary keys
    joins: BTreeMap<String, Vec<String>>,
}

/// A thread-safe in-memory [`Storage`] implementation.
pub struct MemoryStorage {
    inner: Mutex<Inner>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage {
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Seed one record under its current primary key.
    #[must_use]
    pub fn with_record(self, shape: &Shape, record: Value) -> Self {
        let key = shape.primary_key_text(&record);
        {
            let mut inner = self.lock();
            inner
                .tables
                .entry(shape.name().to_string())
                .or_default()
                .insert(key, record);
        }
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Storage state stays consistent even if a panicking test held
        // the lock.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn join_key(shape: &Shape, owner_key: &str, field: &str) -> String {
        format!("{}:{}:{}", shape.name(), owner_key, field)
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        MemoryStorage::new()
    }
}

/// Descending, numeric-aware key comparison: numeric keys sort by
/// magnitude, everything else lexicographically.
fn key_descending(a: &str, b: &str) -> std::cmp::Ordering {
    match (a.parse::<i64>(), b.parse::<i64>()) {
        (Ok(x), Ok(y)) => y.cmp(&x),
        _ => b.cmp(a),
    }
}

impl Storage for MemoryStorage {
    fn find_by_key(&self, shape: &Shape, key: &str) -> Result<Option<Value>, StorageError> {
        let inner = self.lock();
        Ok(inner
            .tables
            .get(shape.name())
            .and_then(|table| table.get(key))
            .cloned())
    }

    fn find_by_keys(&self, shape: &Shape, keys: &[String]) -> Result<Vec<Value>, StorageError> {
        let inner = self.lock();
        let Some(table) = inner.tables.get(shape.name()) else {
            return Ok(Vec::new());
        };
        Ok(keys.iter().filter_map(|key| table.get(key).cloned()).collect())
    }

    fn find_all(&self, shape: &Shape) -> Result<Vec<Value>, StorageError> {
        let inner = self.lock();
        let Some(table) = inner.tables.get(shape.name()) else {
            return Ok(Vec::new());
        };
        let mut keys: Vec<&String> = table.keys().collect();
        keys.sort_by(|a, b| key_descending(a, b));
        Ok(keys.into_iter().map(|key| table[key].clone()).collect())
    }

    fn count(&self, shape: &Shape) -> Result<u64, StorageError> {
        let inner = self.lock();
        Ok(inner
            .tables
            .get(shape.name())
            .map(|table| table.len() as u64)
            .unwrap_or(0))
    }

    fn save(&self, shape: &Shape, record: &mut Value) -> Result<(), StorageError> {
        let mut inner = self.lock();
        let table = inner.tables.entry(shape.name().to_string()).or_default();

        if shape.primary_key_zero(record) {
            let next = table
                .keys()
                .filter_map(|key| key.parse::<i64>().ok())
                .max()
                .unwrap_or(0)
                + 1;
            let key = match shape.lookup(shape.primary_field()).map(|f| &f.kind) {
                Some(FieldKind::Text) => Value::String(next.to_string()),
                _ => Value::Integer(next),
            };
            record
                .set_field(shape.primary_field(), key)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }

        let key = shape.primary_key_text(record);
        log::debug!("saving {} '{}'", shape.name(), key);
        table.insert(key, record.clone());
        Ok(())
    }

    fn delete(&self, shape: &Shape, key: &str) -> Result<(), StorageError> {
        let mut inner = self.lock();
        let removed = inner
            .tables
            .get_mut(shape.name())
            .and_then(|table| table.remove(key));
        if removed.is_none() {
            return Err(StorageError::NotFound);
        }
        log::debug!("deleted {} '{}'", shape.name(), key);
        Ok(())
    }

    fn load_association(
        &self,
        shape: &Shape,
        record: &Value,
        field: &str,
    ) -> Result<Option<Value>, StorageError> {
        let Some(field_shape) = shape.lookup(field) else {
            return Ok(None);
        };
        let Some(relationship) = &field_shape.relationship else {
            return Ok(None);
        };
        let Some(related) = field_shape.kind.related_shape() else {
            return Ok(None);
        };

        let inner = self.lock();
        match relationship.kind {
            RelationshipKind::BelongsTo => {
                let fk = record
                    .get_field(&relationship.foreign_field)
                    .map(Value::to_text)
                    .unwrap_or_default();
                if fk.is_empty() || fk == "0" {
                    return Ok(None);
                }
                Ok(inner
                    .tables
                    .get(related.name())
                    .and_then(|table| table.get(&fk))
                    .cloned())
            }
            RelationshipKind::HasOne | RelationshipKind::HasMany => {
                let owner_key = shape.primary_key_text(record);
                if owner_key.is_empty() {
                    return Ok(None);
                }
                let Some(table) = inner.tables.get(related.name()) else {
                    return Ok(None);
                };
                let mut rows: Vec<Value> = table
                    .values()
                    .filter(|row| {
                        row.get_field(&relationship.foreign_field)
                            .map(|v| v.to_text() == owner_key)
                            .unwrap_or(false)
                    })
                    .cloned()
                    .collect();
                match relationship.kind {
                    RelationshipKind::HasOne => Ok(rows.pop()),
                    _ => {
                        if rows.is_empty() {
                            Ok(None)
                        } else {
                            Ok(Some(Value::Array(rows)))
                        }
                    }
                }
            }
            RelationshipKind::ManyToMany => {
                let owner_key = shape.primary_key_text(record);
                let join = Self::join_key(shape, &owner_key, field);
                let Some(keys) = inner.joins.get(&join) else {
                    return Ok(None);
                };
                let Some(table) = inner.tables.get(related.name()) else {
                    return Ok(None);
                };
                let rows: Vec<Value> = keys
                    .iter()
                    .filter_map(|key| table.get(key).cloned())
                    .collect();
                Ok(Some(Value::Array(rows)))
            }
        }
    }

    fn replace_association(
        &self,
        shape: &Shape,
        record: &Value,
        field: &str,
        related: &Value,
    ) -> Result<(), StorageError> {
        let relationship = shape
            .lookup(field)
            .and_then(|f| f.relationship.as_ref())
            .ok_or_else(|| {
                StorageError::Unsupported(format!("'{}' is not an association field", field))
            })?;
        if relationship.kind != RelationshipKind::ManyToMany {
            return Err(StorageError::Unsupported(format!(
                "replace_association only supports many-to-many ('{}')",
                field
            )));
        }
        let related_shape = shape
            .lookup(field)
            .and_then(|f| f.kind.related_shape())
            .ok_or_else(|| {
                StorageError::Unsupported(format!("'{}' has no related shape", field))
            })?;

        let owner_key = shape.primary_key_text(record);
        let keys: Vec<String> = match related {
            Value::Array(rows) => rows
                .iter()
                .map(|row| related_shape.primary_key_text(row))
                .filter(|key| !key.is_empty())
                .collect(),
            Value::Null => Vec::new(),
            other => vec![related_shape.primary_key_text(other)],
        };

        let mut inner = self.lock();
        let join = Self::join_key(shape, &owner_key, field);
        log::debug!("join '{}' now holds {} keys", join, keys.len());
        inner.joins.insert(join, keys);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use metabind_record::{FieldShape, Relationship};

    fn tag_shape() -> std::sync::Arc<Shape> {
        Shape::new("Tag")
            .field(FieldShape::new("Id", FieldKind::Unsigned))
            .field(FieldShape::new("Label", FieldKind::Text))
            .build()
    }

    fn user_shape() -> std::sync::Arc<Shape> {
        Shape::new("User")
            .field(FieldShape::new("Id", FieldKind::Unsigned))
            .field(FieldShape::new("Name", FieldKind::Text))
            .field(FieldShape::new("CategoryId", FieldKind::Unsigned))
            .field(
                FieldShape::new("Category", FieldKind::Struct(tag_shape()))
                    .with_relationship(Relationship::belongs_to("CategoryId")),
            )
            .field(
                FieldShape::new("Tags", FieldKind::StructList(tag_shape()))
                    .with_relationship(Relationship::many_to_many()),
            )
            .build()
    }

    fn record(fields: &[(&str, Value)]) -> Value {
        let mut out = Value::map();
        for (name, value) in fields {
            out.set_field(name, value.clone()).unwrap();
        }
        out
    }

    #[test]
    fn save_assigns_sequential_keys() {
        let storage = MemoryStorage::new();
        let shape = user_shape();

        let mut first = record(&[("Name", Value::from("a"))]);
        let mut second = record(&[("Name", Value::from("b"))]);
        storage.save(&shape, &mut first).unwrap();
        storage.save(&shape, &mut second).unwrap();

        assert_eq!(first.get_field("Id"), Some(&Value::Integer(1)));
        assert_eq!(second.get_field("Id"), Some(&Value::Integer(2)));
        assert_eq!(storage.count(&shape).unwrap(), 2);
    }

    #[test]
    fn save_keeps_existing_keys() {
        let storage = MemoryStorage::new();
        let shape = user_shape();

        let mut existing = record(&[("Id", Value::Integer(40)), ("Name", Value::from("a"))]);
        storage.save(&shape, &mut existing).unwrap();

        let mut fresh = record(&[("Name", Value::from("b"))]);
        storage.save(&shape, &mut fresh).unwrap();
        assert_eq!(fresh.get_field("Id"), Some(&Value::Integer(41)));
    }

    #[test]
    fn text_primary_keys_stay_text() {
        let storage = MemoryStorage::new();
        let shape = Shape::new("Doc")
            .field(FieldShape::new("Code", FieldKind::Text))
            .with_primary("Code")
            .build();

        let mut doc = record(&[]);
        storage.save(&shape, &mut doc).unwrap();
        assert_eq!(doc.get_field("Code"), Some(&Value::from("1")));
    }

    #[test]
    fn find_by_key_and_keys() {
        let storage = MemoryStorage::new();
        let shape = user_shape();
        for name in ["a", "b", "c"] {
            let mut row = record(&[("Name", Value::from(name))]);
            storage.save(&shape, &mut row).unwrap();
        }

        let found = storage.find_by_key(&shape, "2").unwrap().unwrap();
        assert_eq!(found.get_field("Name"), Some(&Value::from("b")));
        assert!(storage.find_by_key(&shape, "9").unwrap().is_none());

        let some = storage
            .find_by_keys(&shape, &["3".to_string(), "9".to_string(), "1".to_string()])
            .unwrap();
        assert_eq!(some.len(), 2);
    }

    #[test]
    fn find_all_descends_numerically() {
        let storage = MemoryStorage::new();
        let shape = user_shape();
        for _ in 0..11 {
            let mut row = record(&[("Name", Value::from("x"))]);
            storage.save(&shape, &mut row).unwrap();
        }

        let rows = storage.find_all(&shape).unwrap();
        // Numeric order, not lexicographic: 11 before 2.
        assert_eq!(rows[0].get_field("Id"), Some(&Value::Integer(11)));
        assert_eq!(rows[10].get_field("Id"), Some(&Value::Integer(1)));
    }

    #[test]
    fn delete_missing_record_errors() {
        let storage = MemoryStorage::new();
        let shape = user_shape();
        assert_eq!(
            storage.delete(&shape, "1"),
            Err(StorageError::NotFound)
        );

        let mut row = record(&[("Name", Value::from("a"))]);
        storage.save(&shape, &mut row).unwrap();
        storage.delete(&shape, "1").unwrap();
        assert_eq!(storage.count(&shape).unwrap(), 0);
    }

    #[test]
    fn belongs_to_loads_by_foreign_key() {
        let tags = tag_shape();
        let storage = MemoryStorage::new().with_record(
            &tags,
            record(&[("Id", Value::Integer(7)), ("Label", Value::from("books"))]),
        );
        let shape = user_shape();

        let owner = record(&[("Id", Value::Integer(1)), ("CategoryId", Value::Integer(7))]);
        let loaded = storage
            .load_association(&shape, &owner, "Category")
            .unwrap()
            .unwrap();
        assert_eq!(loaded.get_field("Label"), Some(&Value::from("books")));

        let unlinked = record(&[("Id", Value::Integer(2))]);
        assert!(storage
            .load_association(&shape, &unlinked, "Category")
            .unwrap()
            .is_none());
    }

    #[test]
    fn many_to_many_round_trip() {
        let tags = tag_shape();
        let storage = MemoryStorage::new()
            .with_record(
                &tags,
                record(&[("Id", Value::Integer(1)), ("Label", Value::from("a"))]),
            )
            .with_record(
                &tags,
                record(&[("Id", Value::Integer(2)), ("Label", Value::from("b"))]),
            );
        let shape = user_shape();
        let owner = record(&[("Id", Value::Integer(5))]);

        let related = Value::Array(vec![
            record(&[("Id", Value::Integer(2))]),
            record(&[("Id", Value::Integer(1))]),
        ]);
        storage
            .replace_association(&shape, &owner, "Tags", &related)
            .unwrap();

        let loaded = storage
            .load_association(&shape, &owner, "Tags")
            .unwrap()
            .unwrap();
        match loaded {
            Value::Array(rows) => {
                assert_eq!(rows.len(), 2);
                assert_eq!(rows[0].get_field("Label"), Some(&Value::from("b")));
            }
            other => panic!("unexpected {:?}", other),
        }

        // Replacing with an empty set clears the join.
        storage
            .replace_association(&shape, &owner, "Tags", &Value::array())
            .unwrap();
        let cleared = storage
            .load_association(&shape, &owner, "Tags")
            .unwrap()
            .unwrap();
        assert_eq!(cleared, Value::array());
    }

    #[test]
    fn replace_association_rejects_non_join_fields() {
        let storage = MemoryStorage::new();
        let shape = user_shape();
        let owner = record(&[("Id", Value::Integer(1))]);
        assert!(matches!(
            storage.replace_association(&shape, &owner, "Category", &Value::Null),
            Err(StorageError::Unsupported(_))
        ));
    }
}
