//! Dotted field-path resolution with on-demand association loading.
//!
//! A meta's `field_path` may traverse associated sub-records
//! (`Address.City`). The resolver walks every segment but the last and
//! yields the owning sub-record the leaf field lives on. An existing
//! intermediate sub-record is descended into in place; an absent one is
//! loaded through storage when the segment declares a relationship, and
//! materialized empty otherwise.

use std::sync::Arc;

use metabind_record::{FieldKind, FieldPath, Shape, Value};

use crate::{Context, Error};

/// Resolve the mutable owner of `path`'s leaf field, materializing
/// missing intermediate sub-records.
///
/// `Ok(None)` means the path cannot be resolved (a segment is not a
/// struct field); no further mutation should be attempted.
pub fn resolve_owner_mut<'a>(
    record: &'a mut Value,
    shape: &Arc<Shape>,
    path: &FieldPath,
    ctx: &Context,
) -> Result<Option<(&'a mut Value, Arc<Shape>)>, Error> {
    let mut current = record;
    let mut current_shape = shape.clone();
    let segments = path.segments();

    for segment in &segments[..segments.len() - 1] {
        let field = match current_shape.lookup(segment) {
            Some(f) => f.clone(),
            None => return Ok(None),
        };
        let sub_shape = match &field.kind {
            FieldKind::Struct(s) => s.clone(),
            _ => return Ok(None),
        };

        // An existing sub-record is descended into in place; replacing
        // it would drop fields other metas already wrote this run.
        let in_place = matches!(current.get_field(segment), Some(Value::Map(_)));
        if in_place {
            let unsaved = current
                .get_field(segment)
                .map(|child| sub_shape.primary_key_zero(child))
                .unwrap_or(true);
            if field.relationship.is_some() && unsaved {
                let loaded = ctx
                    .storage
                    .load_association(&current_shape, current, segment)?;
                if let Some(Value::Map(row)) = loaded {
                    log::debug!(
                        "materialized association '{}' on shape '{}'",
                        segment,
                        current_shape.name()
                    );
                    // Hydrate underneath: fields written this run win.
                    if let Some(Value::Map(map)) = current.get_field_mut(segment) {
                        for (key, value) in row {
                            map.entry(key).or_insert(value);
                        }
                    }
                }
            }
        } else {
            let loaded = if field.relationship.is_some() {
                ctx.storage
                    .load_association(&current_shape, current, segment)?
            } else {
                None
            };
            if loaded.is_some() {
                log::debug!(
                    "materialized association '{}' on shape '{}'",
                    segment,
                    current_shape.name()
                );
            }
            let child = loaded.unwrap_or_else(Value::map);
            current.set_field(segment, child)?;
        }

        let next = current;
        current = match next.get_field_mut(segment) {
            Some(child) => child,
            None => return Ok(None),
        };
        current_shape = sub_shape;
    }

    Ok(Some((current, current_shape)))
}

/// Read-only variant of [`resolve_owner_mut`] used by valuers: the same
/// descent, but the input record is never mutated - loaded associations
/// are returned as part of the cloned owner, not cached.
pub fn resolve_owner(
    record: &Value,
    shape: &Arc<Shape>,
    path: &FieldPath,
    ctx: &Context,
) -> Result<Option<(Value, Arc<Shape>)>, Error> {
    let mut current = record.clone();
    let mut current_shape = shape.clone();
    let segments = path.segments();

    for segment in &segments[..segments.len() - 1] {
        let field = match current_shape.lookup(segment) {
            Some(f) => f.clone(),
            None => return Ok(None),
        };
        let sub_shape = match &field.kind {
            FieldKind::Struct(s) => s.clone(),
            _ => return Ok(None),
        };

        let mut child = current
            .get_field(segment)
            .cloned()
            .filter(Value::is_map)
            .unwrap_or_else(Value::map);
        if field.relationship.is_some() && sub_shape.primary_key_zero(&child) {
            let loaded = ctx
                .storage
                .load_association(&current_shape, &current, segment)?;
            if let (Some(Value::Map(row)), Value::Map(map)) = (loaded, &mut child) {
                for (key, value) in row {
                    map.entry(key).or_insert(value);
                }
            }
        }

        current = child;
        current_shape = sub_shape;
    }

    Ok(Some((current, current_shape)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use metabind_record::{FieldShape, Relationship, Storage, StorageError};

    struct NullStorage;

    impl Storage for NullStorage {
        fn find_by_key(&self, _: &Shape, _: &str) -> Result<Option<Value>, StorageError> {
            Ok(None)
        }
        fn find_by_keys(&self, _: &Shape, _: &[String]) -> Result<Vec<Value>, StorageError> {
            Ok(Vec::new())
        }
        fn find_all(&self, _: &Shape) -> Result<Vec<Value>, StorageError> {
            Ok(Vec::new())
        }
        fn count(&self, _: &Shape) -> Result<u64, StorageError> {
            Ok(0)
        }
        fn save(&self, _: &Shape, _: &mut Value) -> Result<(), StorageError> {
            Ok(())
        }
        fn delete(&self, _: &Shape, _: &str) -> Result<(), StorageError> {
            Ok(())
        }
        fn load_association(
            &self,
            _: &Shape,
            _: &Value,
            _: &str,
        ) -> Result<Option<Value>, StorageError> {
            Ok(None)
        }
        fn replace_association(
            &self,
            _: &Shape,
            _: &Value,
            _: &str,
            _: &Value,
        ) -> Result<(), StorageError> {
            Ok(())
        }
    }

    fn shapes() -> Arc<Shape> {
        let address = Shape::new("Address")
            .field(FieldShape::new("City", FieldKind::Text))
            .field(FieldShape::new("Zip", FieldKind::Text))
            .build();
        Shape::new("User")
            .field(FieldShape::new("Id", FieldKind::Unsigned))
            .field(FieldShape::new("Name", FieldKind::Text))
            .field(FieldShape::new("Address", FieldKind::Struct(address)))
            .build()
    }

    fn ctx() -> Context {
        Context::new(Arc::new(NullStorage))
    }

    #[test]
    fn single_segment_resolves_to_record_itself() {
        let shape = shapes();
        let mut record = shape.new_record();
        let path = FieldPath::parse("Name").unwrap();

        let (owner, owner_shape) = resolve_owner_mut(&mut record, &shape, &path, &ctx())
            .unwrap()
            .unwrap();
        assert_eq!(owner_shape.name(), "User");
        owner.set_field("Name", Value::from("x")).unwrap();
        assert_eq!(record.get_field("Name"), Some(&Value::from("x")));
    }

    #[test]
    fn dotted_path_materializes_intermediate() {
        let shape = shapes();
        let mut record = shape.new_record();
        let path = FieldPath::parse("Address.City").unwrap();

        let (owner, owner_shape) = resolve_owner_mut(&mut record, &shape, &path, &ctx())
            .unwrap()
            .unwrap();
        assert_eq!(owner_shape.name(), "Address");
        owner.set_field("City", Value::from("Berlin")).unwrap();

        assert_eq!(
            record.get_path(&path),
            Some(&Value::from("Berlin"))
        );
    }

    #[test]
    fn sibling_paths_share_the_intermediate() {
        let shape = shapes();
        let mut record = shape.new_record();
        let ctx = ctx();

        let city = FieldPath::parse("Address.City").unwrap();
        let (owner, _) = resolve_owner_mut(&mut record, &shape, &city, &ctx)
            .unwrap()
            .unwrap();
        owner.set_field("City", Value::from("Berlin")).unwrap();

        let zip = FieldPath::parse("Address.Zip").unwrap();
        let (owner, _) = resolve_owner_mut(&mut record, &shape, &zip, &ctx)
            .unwrap()
            .unwrap();
        owner.set_field("Zip", Value::from("10117")).unwrap();

        assert_eq!(record.get_path(&city), Some(&Value::from("Berlin")));
        assert_eq!(record.get_path(&zip), Some(&Value::from("10117")));
    }

    struct StoredAddress;

    impl Storage for StoredAddress {
        fn find_by_key(&self, _: &Shape, _: &str) -> Result<Option<Value>, StorageError> {
            Ok(None)
        }
        fn find_by_keys(&self, _: &Shape, _: &[String]) -> Result<Vec<Value>, StorageError> {
            Ok(Vec::new())
        }
        fn find_all(&self, _: &Shape) -> Result<Vec<Value>, StorageError> {
            Ok(Vec::new())
        }
        fn count(&self, _: &Shape) -> Result<u64, StorageError> {
            Ok(0)
        }
        fn save(&self, _: &Shape, _: &mut Value) -> Result<(), StorageError> {
            Ok(())
        }
        fn delete(&self, _: &Shape, _: &str) -> Result<(), StorageError> {
            Ok(())
        }
        fn load_association(
            &self,
            _: &Shape,
            _: &Value,
            _: &str,
        ) -> Result<Option<Value>, StorageError> {
            let mut row = Value::map();
            row.set_field("Id", Value::Integer(3)).unwrap();
            row.set_field("City", Value::from("Graz")).unwrap();
            Ok(Some(row))
        }
        fn replace_association(
            &self,
            _: &Shape,
            _: &Value,
            _: &str,
            _: &Value,
        ) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[test]
    fn hydration_keeps_fields_written_this_run() {
        let address = Shape::new("Address")
            .field(FieldShape::new("Id", FieldKind::Unsigned))
            .field(FieldShape::new("City", FieldKind::Text))
            .field(FieldShape::new("Zip", FieldKind::Text))
            .build();
        let shape = Shape::new("User")
            .field(FieldShape::new("Id", FieldKind::Unsigned))
            .field(
                FieldShape::new("Address", FieldKind::Struct(address))
                    .with_relationship(Relationship::has_one("UserId")),
            )
            .build();
        let ctx = Context::new(Arc::new(StoredAddress));

        // A sub-record with writes but no key yet: hydration must fill
        // in underneath it, never over it.
        let mut record = shape.new_record();
        let mut pending = Value::map();
        pending.set_field("Zip", Value::from("8010")).unwrap();
        record.set_field("Address", pending).unwrap();

        let city = FieldPath::parse("Address.City").unwrap();
        let (owner, _) = resolve_owner_mut(&mut record, &shape, &city, &ctx)
            .unwrap()
            .unwrap();
        assert_eq!(owner.get_field("Zip"), Some(&Value::from("8010")));
        assert_eq!(owner.get_field("City"), Some(&Value::from("Graz")));
        assert_eq!(owner.get_field("Id"), Some(&Value::Integer(3)));
    }

    #[test]
    fn non_struct_segment_stops_resolution() {
        let shape = shapes();
        let mut record = shape.new_record();
        let path = FieldPath::parse("Name.Whatever").unwrap();
        assert!(resolve_owner_mut(&mut record, &shape, &path, &ctx())
            .unwrap()
            .is_none());
    }

    #[test]
    fn read_only_variant_never_mutates() {
        let shape = shapes();
        let record = shape.new_record();
        let path = FieldPath::parse("Address.City").unwrap();

        let resolved = resolve_owner(&record, &shape, &path, &ctx()).unwrap();
        assert!(resolved.is_some());
        assert_eq!(record, shape.new_record());
    }
}
