//! Schema-driven data binding: resources, metas and the decode
//! pipeline.
//!
//! The engine binds external input (flat form fields or JSON bodies)
//! onto record values described by shapes:
//!
//! 1. A parser turns the payload into a [`MetaValues`] tree whose nodes
//!    are paired with registered [`Meta`] descriptors.
//! 2. A [`Processor`] runs the pipeline on one record: locate it via
//!    find-one, run validators, decode every granted node, run
//!    post-processors.
//! 3. [`Resource`] ties it together: the shape, its metas, permissions,
//!    hooks and overridable CRUD handlers.
//!
//! # Examples
//!
//! ```
//! use std::sync::Arc;
//!
//! use metabind::record::{FieldKind, FieldShape, Shape, Value};
//! use metabind::{decode, Context, Meta, Payload, Resource};
//! use metabind_memory::MemoryStorage;
//!
//! let shape = Shape::new("User")
//!     .field(FieldShape::new("Id", FieldKind::Unsigned))
//!     .field(FieldShape::new("Name", FieldKind::Text))
//!     .build();
//! let resource = Resource::build(shape)
//!     .meta(Meta::named("Id"))
//!     .meta(Meta::named("Name"))
//!     .finish()
//!     .unwrap();
//!
//! let ctx = Context::new(Arc::new(MemoryStorage::new()))
//!     .with_payload(Payload::Json(r#"{"Name": "ada"}"#.into()));
//! let mut record = resource.new_record();
//! decode(&ctx, &mut record, &resource).unwrap();
//! assert_eq!(record.get_field("Name"), Some(&Value::from("ada")));
//! ```

pub use metabind_record as record;

mod coerce;
mod context;
pub mod crud;
mod error;
mod meta;
mod meta_value;
mod parse;
mod processor;
mod resolver;
mod resource;
mod roles;
mod time;

pub use coerce::{coerce, key_set, truthy, CoerceFailure};
pub use context::{Context, FormFile, FormPayload, Payload};
pub use crud::{Found, DESTROY_MARKER};
pub use error::{Error, Errors};
pub use meta::{Meta, Setter, Valuer};
pub use meta_value::{MetaValue, MetaValues};
pub use parse::{
    decode, decode_into, form_to_meta_values, json_to_meta_values, DEFAULT_FORM_PREFIX,
};
pub use processor::Processor;
pub use resolver::{resolve_owner, resolve_owner_mut};
pub use resource::{
    humanize_string, DeleteHandler, FindManyHandler, FindOneHandler, Hook, Resource,
    ResourceBuilder, SaveHandler,
};
pub use roles::{Permission, PermissionMode, ANYONE};
pub use time::TimeParser;
