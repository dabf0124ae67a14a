//! The parsed payload tree: MetaValue nodes paired with their metas.

use std::sync::Arc;

use metabind_record::{FieldKind, FieldShape, Value};

use crate::processor::Processor;
use crate::{Context, Error, Meta, Resource};

/// One node of the parsed external payload.
///
/// Exactly one of `value` / `children` is meaningfully populated; a
/// pure container grouping indexed children may carry neither. `index`
/// is the ordinal position within a repeated nested group.
#[derive(Clone)]
pub struct MetaValue {
    pub name: String,
    pub value: Option<Value>,
    pub index: usize,
    pub children: Option<MetaValues>,
    pub meta: Option<Arc<Meta>>,
}

impl MetaValue {
    /// A scalar leaf node.
    pub fn scalar(name: impl Into<String>, value: Value, meta: Option<Arc<Meta>>) -> Self {
        MetaValue {
            name: name.into(),
            value: Some(value),
            index: 0,
            children: None,
            meta,
        }
    }

    /// A nested structured node.
    pub fn nested(
        name: impl Into<String>,
        index: usize,
        children: MetaValues,
        meta: Option<Arc<Meta>>,
    ) -> Self {
        MetaValue {
            name: name.into(),
            value: None,
            index,
            children: Some(children),
            meta,
        }
    }
}

/// An ordered list of MetaValue nodes - one level of the payload tree.
#[derive(Clone, Default)]
pub struct MetaValues {
    pub values: Vec<MetaValue>,
}

impl MetaValues {
    pub fn new() -> Self {
        MetaValues::default()
    }

    /// The first node with the given name, if any.
    pub fn get(&self, name: &str) -> Option<&MetaValue> {
        self.values.iter().find(|v| v.name == name)
    }

    pub fn push(&mut self, value: MetaValue) {
        self.values.push(value);
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetaValue> {
        self.values.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }
}

/// Run a nested decode pipeline for one node and splice the result
/// into the owner's association slot or collection.
///
/// A fresh sub-record goes through the full pipeline in miniature; it
/// is only spliced when that pipeline did not request skip-remaining
/// and produced a non-zero record, so absent optional nested input
/// never commits an empty placeholder row.
pub(crate) fn splice_nested(
    owner: &mut Value,
    field: &FieldShape,
    mv: &MetaValue,
    resource: &Arc<Resource>,
    ctx: &Context,
) -> Result<(), Error> {
    match &field.kind {
        FieldKind::Struct(shape) => {
            let mut sub = shape.new_record();
            let skipped = {
                let mut nested =
                    Processor::new(resource.clone(), &mut sub, mv.children.as_ref(), ctx);
                nested.run()?;
                nested.skipped()
            };
            if !skipped && !shape.is_zero_record(&sub) {
                owner.set_field(&field.name, sub)?;
            }
            Ok(())
        }
        FieldKind::StructList(shape) => {
            // The first indexed occurrence resets the collection.
            if mv.index == 0 {
                owner.set_field(&field.name, Value::array())?;
            }
            let mut sub = shape.new_record();
            let skipped = {
                let mut nested =
                    Processor::new(resource.clone(), &mut sub, mv.children.as_ref(), ctx);
                nested.run()?;
                nested.skipped()
            };
            if !skipped && !shape.is_zero_record(&sub) {
                match owner.get_field_mut(&field.name) {
                    Some(Value::Array(items)) => items.push(sub),
                    _ => owner.set_field(&field.name, Value::Array(vec![sub]))?,
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}
