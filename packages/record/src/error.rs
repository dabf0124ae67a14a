//! Record-layer errors.

/// Errors produced while navigating or converting record values.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("invalid field path '{path}': {message}")]
    InvalidPath { path: String, message: String },

    #[error("cannot traverse '{segment}' in non-record value")]
    Traversal { segment: String },

    #[error("cannot convert {from} to {kind}")]
    Conversion { from: String, kind: String },

    #[error("bridge error: {0}")]
    Bridge(String),
}

impl Error {
    /// Conversion failure between a loose value and a declared field kind.
    pub fn conversion(from: impl Into<String>, kind: impl Into<String>) -> Self {
        Error::Conversion {
            from: from.into(),
            kind: kind.into(),
        }
    }
}
