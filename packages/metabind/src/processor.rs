//! The decode pipeline: initialize, validate, commit.
//!
//! One processor run binds a parsed payload tree onto one record.
//! Initialize locates or prepares the record; validators may veto the
//! commit; commit writes decoded fields and runs post-hooks. A
//! `SkipRemaining` from any phase silently suppresses the rest of the
//! run without counting as a failure.

use std::sync::Arc;

use metabind_record::Value;

use crate::meta_value::splice_nested;
use crate::{Context, Error, Errors, MetaValues, PermissionMode, Resource};

pub struct Processor<'a> {
    resource: Arc<Resource>,
    record: &'a mut Value,
    meta_values: Option<&'a MetaValues>,
    context: &'a Context,
    skip_remaining: bool,
    new_record: bool,
}

impl<'a> Processor<'a> {
    pub fn new(
        resource: Arc<Resource>,
        record: &'a mut Value,
        meta_values: Option<&'a MetaValues>,
        context: &'a Context,
    ) -> Self {
        let new_record = resource.shape().primary_key_zero(record);
        Processor {
            resource,
            record,
            meta_values,
            context,
            skip_remaining: false,
            new_record,
        }
    }

    /// Whether any phase requested skip-remaining.
    pub fn skipped(&self) -> bool {
        self.skip_remaining
    }

    /// Run the full pipeline. `Ok(())` covers both a complete run and a
    /// skipped one; `Err` carries the aggregated failures.
    pub fn run(&mut self) -> Result<(), Error> {
        self.initialize()?;

        let mut errors = Errors::new();

        if !self.skip_remaining {
            for validator in self.resource.validators() {
                match validator(self.record, self.meta_values, self.context) {
                    Ok(()) => {}
                    Err(Error::SkipRemaining) => {
                        self.skip_remaining = true;
                        break;
                    }
                    Err(e) => errors.add(e),
                }
            }
        }

        // Commit only proceeds when validation raised nothing. Hooks
        // still run after a decode that raised field errors; their
        // failures accumulate alongside.
        if !self.skip_remaining && errors.is_empty() {
            self.decode(&mut errors);
            if !self.skip_remaining {
                for hook in self.resource.processors() {
                    match hook(self.record, self.meta_values, self.context) {
                        Ok(()) => {}
                        Err(Error::SkipRemaining) => {
                            self.skip_remaining = true;
                            break;
                        }
                        Err(e) => errors.add(e),
                    }
                }
            }
        }

        errors.into_result()
    }

    /// Locate or prepare the record via find-one. A skip-remaining
    /// signal (e.g. a consumed destroy marker) ends the run early.
    fn initialize(&mut self) -> Result<(), Error> {
        match self
            .resource
            .call_find_one(self.record, self.meta_values, self.context)
        {
            Ok(()) => {
                // Find-one may have populated the record; the decode
                // mode follows its post-lookup key state.
                self.new_record = self.resource.shape().primary_key_zero(self.record);
                Ok(())
            }
            Err(Error::SkipRemaining) => {
                log::debug!("find-one requested skip for {}", self.resource.name());
                self.skip_remaining = true;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Write every decodable payload node into the record.
    fn decode(&mut self, errors: &mut Errors) {
        let Some(meta_values) = self.meta_values else {
            return;
        };
        let mode = if self.new_record {
            PermissionMode::Create
        } else {
            PermissionMode::Update
        };

        for mv in meta_values.iter() {
            let Some(meta) = mv.meta.as_ref() else {
                continue;
            };
            if !meta.granted(mode, &self.context.roles) {
                continue;
            }

            // Nodes bound to a child resource and no explicit setter
            // decode through a nested pipeline and splice into the
            // owner; everything else goes through the meta's setter.
            let result = match (meta.resource(), meta.field_shape()) {
                (Some(child), Some(field)) if mv.children.is_some() && !meta.has_setter() => {
                    splice_nested(self.record, field, mv, child, self.context)
                }
                _ => meta.set(self.record, mv, self.context),
            };

            match result {
                Ok(()) => {}
                Err(Error::SkipRemaining) => {
                    self.skip_remaining = true;
                    return;
                }
                Err(e @ Error::Field { .. }) | Err(e @ Error::Configuration(_)) => errors.add(e),
                Err(e) => errors.add(Error::field(meta.name(), e.to_string())),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use metabind_record::{FieldKind, FieldShape, Shape, Storage, StorageError};

    use crate::{Meta, MetaValue, Permission, ANYONE};

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

    fn ctx() -> Context {
        Context::new(Arc::new(NullStorage))
    }

    fn user_resource() -> Arc<Resource> {
        let shape = Shape::new("User")
            .field(FieldShape::new("Id", FieldKind::Unsigned))
            .field(FieldShape::new("Name", FieldKind::Text))
            .field(FieldShape::new("Age", FieldKind::Integer))
            .build();
        Resource::build(shape)
            .meta(Meta::named("Id"))
            .meta(Meta::named("Name"))
            .meta(Meta::named("Age"))
            .finish()
            .unwrap()
    }

    fn bound(resource: &Arc<Resource>, name: &str, value: Value) -> MetaValue {
        MetaValue::scalar(name, value, resource.meta(name).cloned())
    }

    #[test]
    fn decode_writes_scalar_fields() {
        let resource = user_resource();
        let mut record = resource.new_record();
        let mut values = MetaValues::new();
        values.push(bound(&resource, "Name", Value::from("ada")));
        values.push(bound(&resource, "Age", Value::from("36")));

        let ctx = ctx();
        Processor::new(resource.clone(), &mut record, Some(&values), &ctx)
            .run()
            .unwrap();
        assert_eq!(record.get_field("Name"), Some(&Value::from("ada")));
        assert_eq!(record.get_field("Age"), Some(&Value::Integer(36)));
    }

    #[test]
    fn coercion_failures_aggregate_per_field() {
        let resource = user_resource();
        let mut record = resource.new_record();
        let mut values = MetaValues::new();
        values.push(bound(&resource, "Age", Value::from("old")));
        values.push(bound(&resource, "Name", Value::from("ada")));

        let ctx = ctx();
        let err = Processor::new(resource.clone(), &mut record, Some(&values), &ctx)
            .run()
            .unwrap_err();
        match err {
            Error::Multiple(errors) => {
                assert_eq!(errors.len(), 1);
                assert!(matches!(
                    errors.iter().next().unwrap(),
                    Error::Field { meta, .. } if meta == "Age"
                ));
            }
            other => panic!("unexpected error {:?}", other),
        }
        // The failing field leaves the record untouched; the rest still
        // decodes.
        assert_eq!(record.get_field("Age"), None);
        assert_eq!(record.get_field("Name"), Some(&Value::from("ada")));
    }

    #[test]
    fn sibling_dotted_paths_decode_into_one_sub_record() {
        let address = Shape::new("Address")
            .field(FieldShape::new("City", FieldKind::Text))
            .field(FieldShape::new("Zip", FieldKind::Text))
            .build();
        let shape = Shape::new("User")
            .field(FieldShape::new("Id", FieldKind::Unsigned))
            .field(FieldShape::new("Address", FieldKind::Struct(address)))
            .build();
        let resource = Resource::build(shape)
            .meta(Meta::named("City").with_field_name("Address.City"))
            .meta(Meta::named("Zip").with_field_name("Address.Zip"))
            .finish()
            .unwrap();

        let mut record = resource.new_record();
        let mut values = MetaValues::new();
        values.push(bound(&resource, "City", Value::from("Berlin")));
        values.push(bound(&resource, "Zip", Value::from("10117")));

        let ctx = ctx();
        Processor::new(resource.clone(), &mut record, Some(&values), &ctx)
            .run()
            .unwrap();

        let address = record.get_field("Address").unwrap();
        assert_eq!(address.get_field("City"), Some(&Value::from("Berlin")));
        assert_eq!(address.get_field("Zip"), Some(&Value::from("10117")));
    }

    #[test]
    fn validation_failure_vetoes_commit() {
        let shape = Shape::new("User")
            .field(FieldShape::new("Id", FieldKind::Unsigned))
            .field(FieldShape::new("Name", FieldKind::Text))
            .build();
        let resource = Resource::build(shape)
            .meta(Meta::named("Name"))
            .validator(|_, _, _| Err(Error::Validation("nope".to_string())))
            .finish()
            .unwrap();

        let mut record = resource.new_record();
        let mut values = MetaValues::new();
        values.push(bound(&resource, "Name", Value::from("ada")));

        let ctx = ctx();
        let err = Processor::new(resource.clone(), &mut record, Some(&values), &ctx)
            .run()
            .unwrap_err();
        assert!(matches!(err, Error::Multiple(_)));
        assert_eq!(record.get_field("Name"), None);
    }

    #[test]
    fn skip_remaining_from_validator_is_silent_success() {
        let shape = Shape::new("User")
            .field(FieldShape::new("Id", FieldKind::Unsigned))
            .field(FieldShape::new("Name", FieldKind::Text))
            .build();
        let resource = Resource::build(shape)
            .meta(Meta::named("Name"))
            .validator(|_, _, _| Err(Error::SkipRemaining))
            .processor(|_, _, _| Err(Error::Validation("never runs".to_string())))
            .finish()
            .unwrap();

        let mut record = resource.new_record();
        let mut values = MetaValues::new();
        values.push(bound(&resource, "Name", Value::from("ada")));

        let ctx = ctx();
        let mut processor = Processor::new(resource.clone(), &mut record, Some(&values), &ctx);
        processor.run().unwrap();
        assert!(processor.skipped());
        assert_eq!(record.get_field("Name"), None);
    }

    #[test]
    fn hooks_still_run_after_field_errors() {
        let shape = Shape::new("User")
            .field(FieldShape::new("Id", FieldKind::Unsigned))
            .field(FieldShape::new("Name", FieldKind::Text))
            .field(FieldShape::new("Age", FieldKind::Integer))
            .build();
        let resource = Resource::build(shape)
            .meta(Meta::named("Age"))
            .processor(|record, _, _| {
                record.set_field("Name", Value::from("hooked"))?;
                Ok(())
            })
            .finish()
            .unwrap();

        let mut record = resource.new_record();
        let mut values = MetaValues::new();
        values.push(bound(&resource, "Age", Value::from("old")));

        let ctx = ctx();
        let err = Processor::new(resource.clone(), &mut record, Some(&values), &ctx)
            .run()
            .unwrap_err();
        assert!(matches!(err, Error::Multiple(_)));
        assert_eq!(record.get_field("Name"), Some(&Value::from("hooked")));
    }

    #[test]
    fn create_permission_gates_new_records() {
        let shape = Shape::new("User")
            .field(FieldShape::new("Id", FieldKind::Unsigned))
            .field(FieldShape::new("Name", FieldKind::Text))
            .build();
        let resource = Resource::build(shape)
            .meta(
                Meta::named("Name").with_permission(
                    Permission::new().allow(PermissionMode::Create, &["admin"]),
                ),
            )
            .finish()
            .unwrap();

        let mut record = resource.new_record();
        let mut values = MetaValues::new();
        values.push(bound(&resource, "Name", Value::from("ada")));

        // No admin role: the field is silently left alone, no error.
        let ctx = ctx().with_roles(&["viewer"]);
        Processor::new(resource.clone(), &mut record, Some(&values), &ctx)
            .run()
            .unwrap();
        assert_eq!(record.get_field("Name"), None);

        let ctx = self::ctx().with_roles(&["admin"]);
        Processor::new(resource.clone(), &mut record, Some(&values), &ctx)
            .run()
            .unwrap();
        assert_eq!(record.get_field("Name"), Some(&Value::from("ada")));
    }

    #[test]
    fn update_permission_gates_existing_records() {
        let shape = Shape::new("User")
            .field(FieldShape::new("Id", FieldKind::Unsigned))
            .field(FieldShape::new("Name", FieldKind::Text))
            .build();
        let resource = Resource::build(shape)
            .meta(Meta::named("Id"))
            .meta(
                Meta::named("Name").with_permission(
                    Permission::new().allow(PermissionMode::Update, &[ANYONE]).deny(
                        PermissionMode::Update,
                        &["intern"],
                    ),
                ),
            )
            .finish()
            .unwrap();

        let mut record = resource.new_record();
        record.set_field("Id", Value::Integer(5)).unwrap();
        record.set_field("Name", Value::from("old")).unwrap();

        let mut values = MetaValues::new();
        values.push(bound(&resource, "Name", Value::from("new")));

        let ctx = ctx().with_roles(&["intern"]);
        Processor::new(resource.clone(), &mut record, Some(&values), &ctx)
            .run()
            .unwrap();
        assert_eq!(record.get_field("Name"), Some(&Value::from("old")));
    }

    #[test]
    fn processors_run_after_decode() {
        let shape = Shape::new("User")
            .field(FieldShape::new("Id", FieldKind::Unsigned))
            .field(FieldShape::new("Name", FieldKind::Text))
            .build();
        let resource = Resource::build(shape)
            .meta(Meta::named("Name"))
            .processor(|record, _, _| {
                let name = record
                    .get_field("Name")
                    .map(|v| v.to_text())
                    .unwrap_or_default();
                record.set_field("Name", Value::from(name.to_uppercase()))?;
                Ok(())
            })
            .finish()
            .unwrap();

        let mut record = resource.new_record();
        let mut values = MetaValues::new();
        values.push(bound(&resource, "Name", Value::from("ada")));

        let ctx = ctx();
        Processor::new(resource.clone(), &mut record, Some(&values), &ctx)
            .run()
            .unwrap();
        assert_eq!(record.get_field("Name"), Some(&Value::from("ADA")));
    }
}
