//! Record type descriptors: Shape, FieldShape, FieldKind, Relationship.
//!
//! A `Shape` is the declarative description of a record type: its named
//! fields, their kinds, optionality, relationships and the primary-key
//! field. Shapes are built once at registration time and shared behind
//! `Arc` for the life of the process.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;

use crate::{Error, Value};

/// Self-decoding hook for a field: tried with the raw external value
/// before any generic conversion.
pub type ScanFn = Arc<dyn Fn(&Value) -> Result<Value, Error> + Send + Sync>;

/// The closed enumeration of leaf kinds a field can have.
///
/// Coercion of external input dispatches on this tag, so the engine
/// never inspects concrete host types.
#[derive(Clone, Debug)]
pub enum FieldKind {
    Integer,
    Unsigned,
    Float,
    Bool,
    Text,
    TextList,
    Binary,
    Temporal,
    /// A nested or associated single record.
    Struct(Arc<Shape>),
    /// A collection of nested or associated records.
    StructList(Arc<Shape>),
}

impl FieldKind {
    /// The zero value a cleared field of this kind holds.
    pub fn zero_value(&self) -> Value {
        match self {
            FieldKind::Integer | FieldKind::Unsigned => Value::Integer(0),
            FieldKind::Float => Value::Float(0.0),
            FieldKind::Bool => Value::Bool(false),
            FieldKind::Text => Value::String(String::new()),
            FieldKind::TextList => Value::array(),
            FieldKind::Binary => Value::Bytes(Bytes::new()),
            FieldKind::Temporal => Value::Null,
            FieldKind::Struct(_) => Value::Null,
            FieldKind::StructList(_) => Value::array(),
        }
    }

    /// Display name used in conversion errors.
    pub fn name(&self) -> &'static str {
        match self {
            FieldKind::Integer => "integer",
            FieldKind::Unsigned => "unsigned",
            FieldKind::Float => "float",
            FieldKind::Bool => "bool",
            FieldKind::Text => "text",
            FieldKind::TextList => "text list",
            FieldKind::Binary => "binary",
            FieldKind::Temporal => "temporal",
            FieldKind::Struct(_) => "struct",
            FieldKind::StructList(_) => "struct list",
        }
    }

    /// The related shape, when this kind is an association slot.
    pub fn related_shape(&self) -> Option<&Arc<Shape>> {
        match self {
            FieldKind::Struct(s) | FieldKind::StructList(s) => Some(s),
            _ => None,
        }
    }
}

/// How an association field rewrites foreign-key or join state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelationshipKind {
    BelongsTo,
    HasOne,
    HasMany,
    ManyToMany,
}

/// Association declaration on a field.
///
/// `foreign_field` is the owner's foreign-key field for `BelongsTo`, and
/// the related record's owner-key field for `HasOne`/`HasMany`. It is
/// unused for `ManyToMany` (the backend owns the join state).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Relationship {
    pub kind: RelationshipKind,
    pub foreign_field: String,
}

impl Relationship {
    pub fn new(kind: RelationshipKind, foreign_field: impl Into<String>) -> Self {
        Relationship {
            kind,
            foreign_field: foreign_field.into(),
        }
    }

    pub fn belongs_to(foreign_field: impl Into<String>) -> Self {
        Self::new(RelationshipKind::BelongsTo, foreign_field)
    }

    pub fn has_one(foreign_field: impl Into<String>) -> Self {
        Self::new(RelationshipKind::HasOne, foreign_field)
    }

    pub fn has_many(foreign_field: impl Into<String>) -> Self {
        Self::new(RelationshipKind::HasMany, foreign_field)
    }

    pub fn many_to_many() -> Self {
        Self::new(RelationshipKind::ManyToMany, "")
    }
}

/// One declared field of a shape.
#[derive(Clone)]
pub struct FieldShape {
    pub name: String,
    pub kind: FieldKind,
    pub optional: bool,
    pub relationship: Option<Relationship>,
    pub scan: Option<ScanFn>,
}

impl FieldShape {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        FieldShape {
            name: name.into(),
            kind,
            optional: false,
            relationship: None,
            scan: None,
        }
    }

    /// Mark the field optional: empty input clears it to `Null`.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    #[must_use]
    pub fn with_relationship(mut self, relationship: Relationship) -> Self {
        self.relationship = Some(relationship);
        self
    }

    /// Install a self-decoding hook, tried before generic conversion.
    #[must_use]
    pub fn with_scan(mut self, scan: ScanFn) -> Self {
        self.scan = Some(scan);
        self
    }
}

impl fmt::Debug for FieldShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldShape")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("optional", &self.optional)
            .field("relationship", &self.relationship)
            .field("scan", &self.scan.is_some())
            .finish()
    }
}

/// A record type descriptor.
#[derive(Clone, Debug)]
pub struct Shape {
    name: String,
    fields: Vec<FieldShape>,
    primary_field: String,
}

impl Shape {
    /// Start a shape for a record type. The primary-key field defaults
    /// to `Id`.
    pub fn new(name: impl Into<String>) -> Self {
        Shape {
            name: name.into(),
            fields: Vec::new(),
            primary_field: "Id".to_string(),
        }
    }

    /// Declare a field.
    #[must_use]
    pub fn field(mut self, field: FieldShape) -> Self {
        self.fields.push(field);
        self
    }

    /// Override the primary-key field name.
    #[must_use]
    pub fn with_primary(mut self, name: impl Into<String>) -> Self {
        self.primary_field = name.into();
        self
    }

    /// Finish construction, sharing the shape.
    pub fn build(self) -> Arc<Shape> {
        Arc::new(self)
    }

    /// The record type's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared fields, in declaration order.
    pub fn fields(&self) -> &[FieldShape] {
        &self.fields
    }

    /// The primary-key field name.
    pub fn primary_field(&self) -> &str {
        &self.primary_field
    }

    /// Look up a declared field by name.
    pub fn lookup(&self, name: &str) -> Option<&FieldShape> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// A fresh empty record instance of this shape.
    pub fn new_record(&self) -> Value {
        Value::map()
    }

    /// The record's primary-key value, if present.
    pub fn primary_key(&self, record: &Value) -> Option<Value> {
        record.get_field(&self.primary_field).cloned()
    }

    /// Whether the record's primary key is absent or zero.
    pub fn primary_key_zero(&self, record: &Value) -> bool {
        record
            .get_field(&self.primary_field)
            .map(Value::is_zero)
            .unwrap_or(true)
    }

    /// String form of the record's primary key ("" when zero/absent).
    pub fn primary_key_text(&self, record: &Value) -> String {
        record
            .get_field(&self.primary_field)
            .map(Value::to_text)
            .unwrap_or_default()
    }

    /// Whether the record is entirely zero-valued: `Null`, or a map
    /// whose every entry is zero. Used to suppress splicing empty
    /// placeholder rows from absent nested input.
    pub fn is_zero_record(&self, record: &Value) -> bool {
        match record {
            Value::Null => true,
            Value::Map(map) => map.values().all(Value::is_zero),
            _ => false,
        }
    }

    /// Coerce a loose value into a shape-conforming record map.
    ///
    /// This is the structural-encoding bridge target used as the
    /// fallback coercion path: unknown keys are dropped, declared
    /// fields are coerced per kind, nested shapes recurse.
    pub fn conform(&self, value: &Value) -> Result<Value, Error> {
        let map = match value {
            Value::Null => return Ok(Value::Null),
            Value::Map(map) => map,
            other => {
                return Err(Error::conversion(
                    other.to_text(),
                    format!("shape '{}'", self.name),
                ))
            }
        };

        let mut out = BTreeMap::new();
        for field in &self.fields {
            if let Some(raw) = map.get(&field.name) {
                out.insert(field.name.clone(), Self::conform_field(field, raw)?);
            }
        }
        Ok(Value::Map(out))
    }

    fn conform_field(field: &FieldShape, raw: &Value) -> Result<Value, Error> {
        if raw.is_null() {
            return Ok(Value::Null);
        }

        let mismatch = || Error::conversion(raw.to_text(), field.kind.name());

        match &field.kind {
            FieldKind::Integer | FieldKind::Unsigned => match raw {
                Value::Integer(i) => Ok(Value::Integer(*i)),
                Value::Float(f) => Ok(Value::Integer(*f as i64)),
                Value::String(s) => s
                    .parse::<i64>()
                    .map(Value::Integer)
                    .map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            FieldKind::Float => match raw {
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Integer(i) => Ok(Value::Float(*i as f64)),
                Value::String(s) => s.parse::<f64>().map(Value::Float).map_err(|_| mismatch()),
                _ => Err(mismatch()),
            },
            FieldKind::Bool => match raw {
                Value::Bool(b) => Ok(Value::Bool(*b)),
                Value::String(s) => Ok(Value::Bool(s == "true")),
                _ => Err(mismatch()),
            },
            FieldKind::Text => match raw {
                Value::Array(_) | Value::Map(_) => Err(mismatch()),
                other => Ok(Value::String(other.to_text())),
            },
            FieldKind::TextList => Ok(Value::Array(
                raw.to_text_list().into_iter().map(Value::String).collect(),
            )),
            FieldKind::Binary => match raw {
                Value::Bytes(b) => Ok(Value::Bytes(b.clone())),
                Value::String(s) => Ok(Value::Bytes(Bytes::copy_from_slice(s.as_bytes()))),
                _ => Err(mismatch()),
            },
            FieldKind::Temporal => match raw {
                Value::String(s) => Ok(Value::String(s.clone())),
                _ => Err(mismatch()),
            },
            FieldKind::Struct(shape) => shape.conform(raw),
            FieldKind::StructList(shape) => match raw {
                Value::Array(items) => {
                    let mut out = Vec::with_capacity(items.len());
                    for item in items {
                        out.push(shape.conform(item)?);
                    }
                    Ok(Value::Array(out))
                }
                Value::Map(_) => Ok(Value::Array(vec![shape.conform(raw)?])),
                _ => Err(mismatch()),
            },
        }
    }
}
