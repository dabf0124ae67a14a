//! The Storage trait - the CRUD capability the engine consumes.
//!
//! Backends implement this beside the value model so they need nothing
//! from the engine crate. The handle is shared (`&self` receivers);
//! implementations carry their own interior mutability.

use crate::{Shape, Value};

/// Errors a storage backend can produce.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("record not found")]
    NotFound,

    #[error("unsupported storage operation: {0}")]
    Unsupported(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Keyed record storage with association support.
///
/// # Object Safety
///
/// This trait is object-safe: the engine holds it as `Arc<dyn Storage>`.
pub trait Storage: Send + Sync {
    /// Load one record by primary-key text. `Ok(None)` when absent.
    fn find_by_key(&self, shape: &Shape, key: &str) -> Result<Option<Value>, StorageError>;

    /// Load the records matching a set of primary keys, in key order.
    fn find_by_keys(&self, shape: &Shape, keys: &[String]) -> Result<Vec<Value>, StorageError>;

    /// Load every record of a shape, primary key descending.
    fn find_all(&self, shape: &Shape) -> Result<Vec<Value>, StorageError>;

    /// Count the records of a shape.
    fn count(&self, shape: &Shape) -> Result<u64, StorageError>;

    /// Persist a record, assigning a fresh primary key when it is zero.
    fn save(&self, shape: &Shape, record: &mut Value) -> Result<(), StorageError>;

    /// Delete one record by primary-key text.
    fn delete(&self, shape: &Shape, key: &str) -> Result<(), StorageError>;

    /// Load the value of an association field for a record.
    ///
    /// `Ok(None)` when nothing is related.
    fn load_association(
        &self,
        shape: &Shape,
        record: &Value,
        field: &str,
    ) -> Result<Option<Value>, StorageError>;

    /// Replace the stored association state of a field with `related`.
    fn replace_association(
        &self,
        shape: &Shape,
        record: &Value,
        field: &str,
        related: &Value,
    ) -> Result<(), StorageError>;
}

// Blanket implementations so shared handles stand in wherever Storage
// is expected.

macro_rules! forward_storage {
    ($ty:ty) => {
        impl<T: Storage + ?Sized> Storage for $ty {
            fn find_by_key(&self, shape: &Shape, key: &str) -> Result<Option<Value>, StorageError> {
                (**self).find_by_key(shape, key)
            }

            fn find_by_keys(
                &self,
                shape: &Shape,
                keys: &[String],
            ) -> Result<Vec<Value>, StorageError> {
                (**self).find_by_keys(shape, keys)
            }

            fn find_all(&self, shape: &Shape) -> Result<Vec<Value>, StorageError> {
                (**self).find_all(shape)
            }

            fn count(&self, shape: &Shape) -> Result<u64, StorageError> {
                (**self).count(shape)
            }

            fn save(&self, shape: &Shape, record: &mut Value) -> Result<(), StorageError> {
                (**self).save(shape, record)
            }

            fn delete(&self, shape: &Shape, key: &str) -> Result<(), StorageError> {
                (**self).delete(shape, key)
            }

            fn load_association(
                &self,
                shape: &Shape,
                record: &Value,
                field: &str,
            ) -> Result<Option<Value>, StorageError> {
                (**self).load_association(shape, record, field)
            }

            fn replace_association(
                &self,
                shape: &Shape,
                record: &Value,
                field: &str,
                related: &Value,
            ) -> Result<(), StorageError> {
                (**self).replace_association(shape, record, field, related)
            }
        }
    };
}

forward_storage!(&T);
forward_storage!(Box<T>);
forward_storage!(std::sync::Arc<T>);
