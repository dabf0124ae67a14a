//! The Meta descriptor: one external field bound to a record field,
//! with synthesized getter/setter closures.
//!
//! Metas are declared with chainable constructors, finalized exactly
//! once by `Resource` registration (which resolves the field shape and
//! backfills any missing valuer/setter), and immutable afterwards.

use std::sync::Arc;

use metabind_record::{FieldPath, FieldShape, RelationshipKind, Shape, Value};

use crate::coerce::{coerce, key_set, CoerceFailure};
use crate::resolver::{resolve_owner, resolve_owner_mut};
use crate::{Context, Error, MetaValue, Permission, PermissionMode, Resource};

/// Writes one decoded node into a record.
pub type Setter = Box<dyn Fn(&mut Value, &MetaValue, &Context) -> Result<(), Error> + Send + Sync>;

/// Reads a record field's external representation.
pub type Valuer = Box<dyn Fn(&Value, &Context) -> Result<Value, Error> + Send + Sync>;

/// Per-field descriptor: external name, field binding, closures,
/// permission gate and optional child resource for nested records.
pub struct Meta {
    name: String,
    field_name: String,
    setter: Option<Setter>,
    valuer: Option<Valuer>,
    formatted_valuer: Option<Valuer>,
    permission: Option<Permission>,
    resource: Option<Arc<Resource>>,
    field_path: Option<FieldPath>,
    field_shape: Option<FieldShape>,
}

impl Meta {
    /// Start a meta for an external field name. The field binding
    /// defaults to the same name.
    pub fn named(name: impl Into<String>) -> Self {
        let name = name.into();
        Meta {
            field_name: name.clone(),
            name,
            setter: None,
            valuer: None,
            formatted_valuer: None,
            permission: None,
            resource: None,
            field_path: None,
            field_shape: None,
        }
    }

    /// Bind to a (possibly dotted) field path, e.g. `Address.City`.
    #[must_use]
    pub fn with_field_name(mut self, field_name: impl Into<String>) -> Self {
        self.field_name = field_name.into();
        self
    }

    #[must_use]
    pub fn with_setter<F>(mut self, setter: F) -> Self
    where
        F: Fn(&mut Value, &MetaValue, &Context) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.setter = Some(Box::new(setter));
        self
    }

    #[must_use]
    pub fn with_valuer<F>(mut self, valuer: F) -> Self
    where
        F: Fn(&Value, &Context) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.valuer = Some(Box::new(valuer));
        self
    }

    /// Display-oriented valuer; falls back to the plain valuer.
    #[must_use]
    pub fn with_formatted_valuer<F>(mut self, valuer: F) -> Self
    where
        F: Fn(&Value, &Context) -> Result<Value, Error> + Send + Sync + 'static,
    {
        self.formatted_valuer = Some(Box::new(valuer));
        self
    }

    #[must_use]
    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    /// Attach a child resource: nodes for this meta decode through a
    /// nested pipeline instead of a setter.
    #[must_use]
    pub fn with_resource(mut self, resource: Arc<Resource>) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn field_name(&self) -> &str {
        &self.field_name
    }

    pub fn field_path(&self) -> Option<&FieldPath> {
        self.field_path.as_ref()
    }

    pub fn field_shape(&self) -> Option<&FieldShape> {
        self.field_shape.as_ref()
    }

    pub fn resource(&self) -> Option<&Arc<Resource>> {
        self.resource.as_ref()
    }

    pub fn has_setter(&self) -> bool {
        self.setter.is_some()
    }

    /// Evaluate this meta's permission gate; absent means allowed.
    pub fn granted(&self, mode: PermissionMode, roles: &[String]) -> bool {
        self.permission
            .as_ref()
            .map(|p| p.granted(mode, roles))
            .unwrap_or(true)
    }

    /// Invoke the setter with a decoded node, if one is configured.
    pub fn set(&self, record: &mut Value, mv: &MetaValue, ctx: &Context) -> Result<(), Error> {
        match &self.setter {
            Some(setter) => setter(record, mv, ctx),
            None => Ok(()),
        }
    }

    /// Read the field's external representation.
    pub fn value(&self, record: &Value, ctx: &Context) -> Result<Value, Error> {
        match &self.valuer {
            Some(valuer) => valuer(record, ctx),
            None => Ok(Value::Null),
        }
    }

    /// Read the display representation, falling back to the plain
    /// valuer when no formatted one is configured.
    pub fn formatted_value(&self, record: &Value, ctx: &Context) -> Result<Value, Error> {
        match &self.formatted_valuer {
            Some(valuer) => valuer(record, ctx),
            None => self.value(record, ctx),
        }
    }

    /// Registration-time finalization: resolve the field shape, wrap
    /// explicitly configured closures for dotted paths, and synthesize
    /// the missing valuer/setter from the field's declared shape.
    pub(crate) fn initialize(&mut self, shape: &Arc<Shape>) -> Result<(), Error> {
        if self.name.is_empty() {
            return Err(Error::Configuration("meta must have a name".to_string()));
        }

        let path = FieldPath::parse(&self.field_name)
            .map_err(|e| Error::Configuration(format!("meta '{}': {}", self.name, e)))?;

        self.field_shape = Self::resolve_field_shape(shape, &path)?;
        if self.field_shape.is_none() && self.valuer.is_none() && self.resource.is_none() {
            return Err(Error::Configuration(format!(
                "meta '{}' is not supported for shape '{}', no valuer configured for it",
                self.name,
                shape.name()
            )));
        }

        // Explicit closures know nothing about dotted paths; resolve
        // the owning sub-record for them. Synthesized closures resolve
        // internally.
        if !path.is_leaf() {
            if let Some(base) = self.setter.take() {
                let wrap_shape = shape.clone();
                let wrap_path = path.clone();
                self.setter = Some(Box::new(move |record, mv, ctx| {
                    match resolve_owner_mut(record, &wrap_shape, &wrap_path, ctx)? {
                        Some((owner, _)) => base(owner, mv, ctx),
                        None => Ok(()),
                    }
                }));
            }
            if let Some(base) = self.valuer.take() {
                let wrap_shape = shape.clone();
                let wrap_path = path.clone();
                self.valuer = Some(Box::new(move |record, ctx| {
                    match resolve_owner(record, &wrap_shape, &wrap_path, ctx)? {
                        Some((owner, _)) => base(&owner, ctx),
                        None => Ok(Value::Null),
                    }
                }));
            }
        }

        if let Some(field_shape) = self.field_shape.clone() {
            if self.valuer.is_none() {
                self.valuer = Some(Self::synthesize_valuer(
                    shape.clone(),
                    path.clone(),
                    field_shape.clone(),
                ));
            }
            if self.setter.is_none() && self.resource.is_none() {
                self.setter = match field_shape.relationship.as_ref().map(|r| r.kind) {
                    Some(RelationshipKind::BelongsTo) | Some(RelationshipKind::ManyToMany) => {
                        Some(Self::synthesize_association_setter(
                            shape.clone(),
                            path.clone(),
                            field_shape,
                        ))
                    }
                    // HasOne/HasMany decode through nested pipelines.
                    Some(_) => None,
                    None => Some(Self::synthesize_setter(
                        self.name.clone(),
                        shape.clone(),
                        path.clone(),
                        field_shape,
                    )),
                };
            }
        }

        self.field_path = Some(path);
        Ok(())
    }

    fn resolve_field_shape(
        shape: &Arc<Shape>,
        path: &FieldPath,
    ) -> Result<Option<FieldShape>, Error> {
        let mut current = shape.clone();
        let segments = path.segments();
        for segment in &segments[..segments.len() - 1] {
            let field = match current.lookup(segment) {
                Some(f) => f.clone(),
                None => return Ok(None),
            };
            current = match &field.kind {
                metabind_record::FieldKind::Struct(s) => s.clone(),
                _ => {
                    return Err(Error::Configuration(format!(
                        "field path '{}' traverses non-struct field '{}'",
                        path, segment
                    )))
                }
            };
        }
        Ok(current.lookup(path.leaf()).cloned())
    }

    /// Default valuer: resolve the owner, read the leaf; associations
    /// on persisted records are populated from storage first.
    fn synthesize_valuer(shape: Arc<Shape>, path: FieldPath, field_shape: FieldShape) -> Valuer {
        Box::new(move |record, ctx| {
            let Some((owner, owner_shape)) = resolve_owner(record, &shape, &path, ctx)? else {
                return Ok(Value::Null);
            };
            let leaf = path.leaf();
            if field_shape.relationship.is_some() && !owner_shape.primary_key_zero(&owner) {
                if let Some(loaded) = ctx.storage.load_association(&owner_shape, &owner, leaf)? {
                    return Ok(loaded);
                }
            }
            Ok(owner.get_field(leaf).cloned().unwrap_or(Value::Null))
        })
    }

    /// Default setter for plain leaf fields: resolve the owner, coerce
    /// the node's raw value by the leaf kind, write.
    fn synthesize_setter(
        name: String,
        shape: Arc<Shape>,
        path: FieldPath,
        field_shape: FieldShape,
    ) -> Setter {
        Box::new(move |record, mv, ctx| {
            let Some(raw) = mv.value.as_ref() else {
                return Ok(());
            };
            let Some((owner, _)) = resolve_owner_mut(record, &shape, &path, ctx)? else {
                return Ok(());
            };
            match coerce(&field_shape, raw, ctx) {
                Ok(value) => {
                    owner.set_field(path.leaf(), value)?;
                    Ok(())
                }
                Err(CoerceFailure::Recoverable(message)) => Err(Error::field(&name, message)),
                Err(CoerceFailure::Configuration(message)) => Err(Error::Configuration(message)),
            }
        })
    }

    /// Default setter for belongs-to and many-to-many associations:
    /// the node value is a set of related-record primary keys.
    fn synthesize_association_setter(
        shape: Arc<Shape>,
        path: FieldPath,
        field_shape: FieldShape,
    ) -> Setter {
        Box::new(move |record, mv, ctx| {
            let Some(raw) = mv.value.as_ref() else {
                return Ok(());
            };
            let Some((owner, owner_shape)) = resolve_owner_mut(record, &shape, &path, ctx)? else {
                return Ok(());
            };
            let leaf = path.leaf();
            let Some(relationship) = field_shape.relationship.as_ref() else {
                return Ok(());
            };
            let related_shape = field_shape.kind.related_shape().cloned().ok_or_else(|| {
                Error::Configuration(format!(
                    "association field '{}' is not a struct kind",
                    leaf
                ))
            })?;
            let keys = key_set(raw);

            match relationship.kind {
                RelationshipKind::BelongsTo => {
                    let old = key_set(
                        owner
                            .get_field(&relationship.foreign_field)
                            .unwrap_or(&Value::Null),
                    );
                    // Identical non-empty key sets are a no-op.
                    if !keys.is_empty() && keys == old {
                        return Ok(());
                    }
                    if keys.is_empty() {
                        let zero = owner_shape
                            .lookup(&relationship.foreign_field)
                            .map(|f| f.kind.zero_value())
                            .unwrap_or(Value::Integer(0));
                        owner.set_field(&relationship.foreign_field, zero)?;
                        return Ok(());
                    }
                    let rows = ctx.storage.find_by_keys(&related_shape, &keys)?;
                    if let Some(first) = rows.first() {
                        let key = related_shape.primary_key(first).unwrap_or(Value::Null);
                        owner.set_field(&relationship.foreign_field, key)?;
                        owner.set_field(leaf, first.clone())?;
                    }
                    Ok(())
                }
                RelationshipKind::ManyToMany => {
                    let rows = if keys.is_empty() {
                        Vec::new()
                    } else {
                        ctx.storage.find_by_keys(&related_shape, &keys)?
                    };
                    owner.set_field(leaf, Value::Array(rows))?;
                    if !owner_shape.primary_key_zero(owner) {
                        let slot = owner.get_field(leaf).cloned().unwrap_or_else(Value::array);
                        ctx.storage
                            .replace_association(&owner_shape, owner, leaf, &slot)?;
                        // The join table owns the rows now; a populated
                        // slot would double-report them.
                        owner.set_field(leaf, Value::array())?;
                    }
                    Ok(())
                }
                _ => Ok(()),
            }
        })
    }
}
