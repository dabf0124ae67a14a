//! Record layer for metabind.
//!
//! This crate is the capability-polymorphic field accessor the decode
//! engine is built on:
//! - `Value`: the loose tree representation of records and payloads
//! - `FieldPath`: validated dotted field paths (`Address.City`)
//! - `Shape`: declarative record type descriptors with field kinds,
//!   relationships and primary-key identity
//! - `Storage`: the CRUD capability backends implement
//! - a serde bridge between `Value` and typed Rust data
//!
//! The engine never inspects concrete host types: every record is a
//! `Value` interpreted through its `Shape`.

pub use bytes::Bytes;

mod bridge;
mod error;
mod path;
mod shape;
mod storage;
mod value;

pub use bridge::{bytes_from_base64, from_value, json_to_value, to_value, value_to_json};
pub use error::Error;
pub use path::FieldPath;
pub use shape::{FieldKind, FieldShape, Relationship, RelationshipKind, ScanFn, Shape};
pub use storage::{Storage, StorageError};
pub use value::Value;
