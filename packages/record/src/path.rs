//! FieldPath type with validated Unicode identifier segments.

use std::fmt;

use crate::Error;

/// A validated dotted field path, e.g. `Address.City`.
///
/// Segments must be valid Unicode identifiers (per UAX#31). Unlike a
/// storage path, a field path never indexes into arrays - it addresses
/// declared fields of nested record shapes.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a dotted path string, validating every segment.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use metabind_record::FieldPath;
    ///
    /// let path = FieldPath::parse("Address.City").unwrap();
    /// assert_eq!(path.len(), 2);
    /// assert_eq!(path.leaf(), "City");
    /// ```
    pub fn parse(s: &str) -> Result<Self, Error> {
        if s.is_empty() {
            return Err(Error::InvalidPath {
                path: s.to_string(),
                message: "empty path".to_string(),
            });
        }

        let segments: Vec<String> = s.split('.').map(|c| c.to_string()).collect();
        for segment in &segments {
            Self::validate_segment(s, segment)?;
        }

        Ok(FieldPath { segments })
    }

    fn validate_segment(path: &str, segment: &str) -> Result<(), Error> {
        let invalid = |message: &str| Error::InvalidPath {
            path: path.to_string(),
            message: format!("segment '{}': {}", segment, message),
        };

        let mut chars = segment.chars();
        let first = chars.next().ok_or_else(|| invalid("empty segment"))?;

        let valid_start = unicode_ident::is_xid_start(first)
            || (first == '_'
                && chars
                    .clone()
                    .next()
                    .is_some_and(unicode_ident::is_xid_continue));
        if !valid_start {
            return Err(invalid(
                "must start with a letter or underscore followed by letter/digit",
            ));
        }

        for c in chars {
            if !unicode_ident::is_xid_continue(c) {
                return Err(invalid(&format!("invalid character '{}'", c)));
            }
        }

        Ok(())
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    /// A path always has at least one segment, but clippy wants the pair.
    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Whether this path addresses a top-level field directly.
    pub fn is_leaf(&self) -> bool {
        self.segments.len() == 1
    }

    /// The segments of this path.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The final segment - the addressed leaf field.
    pub fn leaf(&self) -> &str {
        self.segments.last().map(String::as_str).unwrap_or("")
    }

    /// All segments except the last, as the owning path.
    ///
    /// Returns `None` for a single-segment path.
    pub fn parent(&self) -> Option<FieldPath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(FieldPath {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Join this path with a further segment.
    #[must_use]
    pub fn join(&self, segment: &str) -> Result<FieldPath, Error> {
        let joined = format!("{}.{}", self, segment);
        FieldPath::parse(&joined)
    }

    /// Iterate over segments.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.segments.iter()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl std::ops::Index<usize> for FieldPath {
    type Output = String;

    fn index(&self, i: usize) -> &Self::Output {
        &self.segments[i]
    }
}
