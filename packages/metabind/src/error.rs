//! Engine error taxonomy and the flattening aggregate.

use std::fmt;

use metabind_record::{Error as RecordError, StorageError};

/// Errors produced by the decode engine.
///
/// `SkipRemaining` is a control signal, not a user-visible failure: the
/// processor consumes it to short-circuit later pipeline phases, and it
/// never appears in an aggregated error set.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("permission denied")]
    PermissionDenied,

    #[error("record not found")]
    NotFound,

    #[error("{meta}: {message}")]
    Field { meta: String, message: String },

    #[error("{0}")]
    Validation(String),

    #[error("skip remaining")]
    SkipRemaining,

    #[error("parse error: {0}")]
    Parse(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("record error: {0}")]
    Record(#[from] RecordError),

    #[error("{0}")]
    Multiple(Errors),
}

impl Error {
    /// A field-coercion or setter failure attributed to a meta.
    pub fn field(meta: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Field {
            meta: meta.into(),
            message: message.into(),
        }
    }
}

/// Ordered aggregate of engine errors.
///
/// Adding an `Error::Multiple` flattens its members instead of nesting,
/// so a composite stays one level deep. Display joins member messages
/// with `"; "` as a diagnostic convenience; callers inspect the list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Errors {
    errors: Vec<Error>,
}

impl Errors {
    pub fn new() -> Self {
        Errors::default()
    }

    /// Record an error, flattening nested aggregates.
    pub fn add(&mut self, error: Error) {
        match error {
            Error::Multiple(nested) => self.errors.extend(nested.errors),
            other => self.errors.push(other),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.errors.iter()
    }

    /// `Ok` when empty, otherwise the whole set as one error.
    pub fn into_result(self) -> Result<(), Error> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Multiple(self))
        }
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let joined = self
            .errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        write!(f, "{}", joined)
    }
}
