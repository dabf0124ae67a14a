//! Resource descriptors: a shape plus its metas, permission, pipeline
//! hooks and overridable CRUD handlers.

use std::sync::Arc;

use metabind_record::{Shape, Value};

use crate::{crud, Context, Error, Meta, MetaValues, Permission, PermissionMode};

/// A pipeline hook: validators run between decode and commit,
/// processors run after commit decode.
pub type Hook =
    Box<dyn Fn(&mut Value, Option<&MetaValues>, &Context) -> Result<(), Error> + Send + Sync>;

/// Overridable CRUD handlers. Defaults live in [`crate::crud`].
pub type FindOneHandler =
    Box<dyn Fn(&Resource, &mut Value, Option<&MetaValues>, &Context) -> Result<(), Error> + Send + Sync>;
pub type FindManyHandler =
    Box<dyn Fn(&Resource, &Context) -> Result<crud::Found, Error> + Send + Sync>;
pub type SaveHandler =
    Box<dyn Fn(&Resource, &mut Value, &Context) -> Result<(), Error> + Send + Sync>;
pub type DeleteHandler = Box<dyn Fn(&Resource, &Context) -> Result<(), Error> + Send + Sync>;

/// One bindable external resource.
///
/// Built once through [`Resource::build`], then shared immutably behind
/// an `Arc`. Registration finalizes every meta against the shape, so a
/// finished resource is guaranteed internally consistent.
pub struct Resource {
    name: String,
    shape: Arc<Shape>,
    metas: Vec<Arc<Meta>>,
    permission: Option<Permission>,
    validators: Vec<Hook>,
    processors: Vec<Hook>,
    find_one: Option<FindOneHandler>,
    find_many: Option<FindManyHandler>,
    save: Option<SaveHandler>,
    delete: Option<DeleteHandler>,
    primary_meta: Option<String>,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("name", &self.name)
            .field("permission", &self.permission)
            .field("primary_meta", &self.primary_meta)
            .finish_non_exhaustive()
    }
}

impl Resource {
    /// Start building a resource for a shape. The display name defaults
    /// to the humanized shape name.
    pub fn build(shape: Arc<Shape>) -> ResourceBuilder {
        ResourceBuilder {
            name: humanize_string(shape.name()),
            shape,
            metas: Vec::new(),
            permission: None,
            validators: Vec::new(),
            processors: Vec::new(),
            find_one: None,
            find_many: None,
            save: None,
            delete: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn shape(&self) -> &Arc<Shape> {
        &self.shape
    }

    pub fn metas(&self) -> &[Arc<Meta>] {
        &self.metas
    }

    /// The meta whose field is the shape's primary key, if registered.
    pub fn primary_meta(&self) -> Option<&str> {
        self.primary_meta.as_deref()
    }

    pub fn meta(&self, name: &str) -> Option<&Arc<Meta>> {
        self.metas.iter().find(|m| m.name() == name)
    }

    pub fn new_record(&self) -> Value {
        self.shape.new_record()
    }

    /// Evaluate the resource-level permission gate; absent means
    /// allowed.
    pub fn has_permission(&self, mode: PermissionMode, ctx: &Context) -> bool {
        self.permission
            .as_ref()
            .map(|p| p.granted(mode, &ctx.roles))
            .unwrap_or(true)
    }

    pub(crate) fn validators(&self) -> &[Hook] {
        &self.validators
    }

    pub(crate) fn processors(&self) -> &[Hook] {
        &self.processors
    }

    /// Locate one record, by payload key or context resource id.
    pub fn call_find_one(
        &self,
        record: &mut Value,
        meta_values: Option<&MetaValues>,
        ctx: &Context,
    ) -> Result<(), Error> {
        match &self.find_one {
            Some(handler) => handler(self, record, meta_values, ctx),
            None => crud::find_one(self, record, meta_values, ctx),
        }
    }

    /// List records, or count them when the context asks for it.
    pub fn call_find_many(&self, ctx: &Context) -> Result<crud::Found, Error> {
        match &self.find_many {
            Some(handler) => handler(self, ctx),
            None => crud::find_many(self, ctx),
        }
    }

    /// Persist one record.
    pub fn call_save(&self, record: &mut Value, ctx: &Context) -> Result<(), Error> {
        match &self.save {
            Some(handler) => handler(self, record, ctx),
            None => crud::save(self, record, ctx),
        }
    }

    /// Remove the record the context points at.
    pub fn call_delete(&self, ctx: &Context) -> Result<(), Error> {
        match &self.delete {
            Some(handler) => handler(self, ctx),
            None => crud::delete(self, ctx),
        }
    }
}

/// Chainable construction for [`Resource`].
pub struct ResourceBuilder {
    name: String,
    shape: Arc<Shape>,
    metas: Vec<Meta>,
    permission: Option<Permission>,
    validators: Vec<Hook>,
    processors: Vec<Hook>,
    find_one: Option<FindOneHandler>,
    find_many: Option<FindManyHandler>,
    save: Option<SaveHandler>,
    delete: Option<DeleteHandler>,
}

impl ResourceBuilder {
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    #[must_use]
    pub fn meta(mut self, meta: Meta) -> Self {
        self.metas.push(meta);
        self
    }

    #[must_use]
    pub fn permission(mut self, permission: Permission) -> Self {
        self.permission = Some(permission);
        self
    }

    /// Add a validator hook; validators run after initialize and may
    /// veto the commit phase.
    #[must_use]
    pub fn validator<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Value, Option<&MetaValues>, &Context) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.validators.push(Box::new(hook));
        self
    }

    /// Add a processor hook; processors run after the commit decode.
    #[must_use]
    pub fn processor<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut Value, Option<&MetaValues>, &Context) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.processors.push(Box::new(hook));
        self
    }

    #[must_use]
    pub fn find_one<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Resource, &mut Value, Option<&MetaValues>, &Context) -> Result<(), Error>
            + Send
            + Sync
            + 'static,
    {
        self.find_one = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn find_many<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Resource, &Context) -> Result<crud::Found, Error> + Send + Sync + 'static,
    {
        self.find_many = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn save<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Resource, &mut Value, &Context) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.save = Some(Box::new(handler));
        self
    }

    #[must_use]
    pub fn delete<F>(mut self, handler: F) -> Self
    where
        F: Fn(&Resource, &Context) -> Result<(), Error> + Send + Sync + 'static,
    {
        self.delete = Some(Box::new(handler));
        self
    }

    /// Finalize: initialize every meta against the shape and freeze the
    /// resource. Misconfigured metas surface here, not at decode time.
    pub fn finish(self) -> Result<Arc<Resource>, Error> {
        let mut metas = Vec::with_capacity(self.metas.len());
        for mut meta in self.metas {
            meta.initialize(&self.shape)?;
            metas.push(Arc::new(meta));
        }

        let primary_meta = metas
            .iter()
            .find(|m| m.field_name() == self.shape.primary_field())
            .map(|m| m.name().to_string());

        Ok(Arc::new(Resource {
            name: self.name,
            shape: self.shape,
            metas,
            permission: self.permission,
            validators: self.validators,
            processors: self.processors,
            find_one: self.find_one,
            find_many: self.find_many,
            save: self.save,
            delete: self.delete,
            primary_meta,
        }))
    }
}

/// Turn an identifier into a display label: `OrderItemID` becomes
/// `Order Item ID`, acronym runs survive untouched.
pub fn humanize_string(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut spaced = String::with_capacity(input.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() && i > 0 {
            let prev = chars[i - 1];
            let next = chars.get(i + 1).copied();
            let break_before_run = !prev.is_uppercase() && prev != ' ';
            let break_after_run = next
                .map(|n| !n.is_uppercase() && n != ' ' && prev != ' ')
                .unwrap_or(false);
            if break_before_run || break_after_run {
                spaced.push(' ');
            }
        }
        spaced.push(c);
    }
    spaced
        .split(' ')
        .map(|word| {
            let mut out = String::with_capacity(word.len());
            let mut cs = word.chars();
            if let Some(first) = cs.next() {
                out.extend(first.to_uppercase());
                out.extend(cs);
            }
            out
        })
        .collect::<Vec<_>>()
        .join(" ")
}
