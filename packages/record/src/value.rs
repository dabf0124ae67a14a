//! The Value type - the loose, tree-shaped data representation.
//!
//! Both parsed external payloads and in-memory record instances are
//! `Value` trees; the schema layer (`Shape`) gives them meaning.

use std::collections::BTreeMap;

use bytes::Bytes;

use crate::{Error, FieldPath};

/// A tree-shaped value holding either a record instance or loose
/// external data.
///
/// # Design Notes
///
/// - Uses `BTreeMap` for deterministic ordering (important for comparison
///   and for the sorted-key guarantees of the input parsers)
/// - Includes `Bytes` for binary data (multipart file contents)
/// - Uses `i64` for integers
#[derive(Clone, Debug, Default, PartialEq)]
pub enum Value {
    /// Absence of a value. Distinct from "field doesn't exist".
    #[default]
    Null,
    /// Boolean value.
    Bool(bool),
    /// Signed 64-bit integer.
    Integer(i64),
    /// 64-bit floating point.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Binary data.
    Bytes(Bytes),
    /// Ordered sequence of values.
    Array(Vec<Value>),
    /// Key-value map with string keys (a record instance).
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Create an empty map.
    pub fn map() -> Self {
        Value::Map(BTreeMap::new())
    }

    /// Create an empty array.
    pub fn array() -> Self {
        Value::Array(Vec::new())
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value is a map.
    pub fn is_map(&self) -> bool {
        matches!(self, Value::Map(_))
    }

    /// Check if this value is an array.
    pub fn is_array(&self) -> bool {
        matches!(self, Value::Array(_))
    }

    /// Zero-value test: null, `0`, `0.0`, `false`, `""`, or an empty
    /// array/map/bytes.
    pub fn is_zero(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Bool(b) => !b,
            Value::Integer(i) => *i == 0,
            Value::Float(f) => *f == 0.0,
            Value::String(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Map(m) => m.is_empty(),
        }
    }

    /// External string form of this value.
    ///
    /// Form fields arrive as repeated values, so an array renders as its
    /// first element's string form.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Integer(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Value::Array(a) => a.first().map(Value::to_text).unwrap_or_default(),
            Value::Map(_) => String::new(),
        }
    }

    /// External array form of this value: element-wise string forms for
    /// arrays, empty for null, a one-element list for scalars.
    pub fn to_text_list(&self) -> Vec<String> {
        match self {
            Value::Null => Vec::new(),
            Value::Array(a) => a.iter().map(Value::to_text).collect(),
            other => vec![other.to_text()],
        }
    }

    /// Get a reference to a named field of a map value.
    pub fn get_field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Map(map) => map.get(name),
            _ => None,
        }
    }

    /// Get a mutable reference to a named field of a map value.
    pub fn get_field_mut(&mut self, name: &str) -> Option<&mut Value> {
        match self {
            Value::Map(map) => map.get_mut(name),
            _ => None,
        }
    }

    /// Set a named field. A `Null` target becomes a map first.
    pub fn set_field(&mut self, name: &str, value: Value) -> Result<(), Error> {
        if self.is_null() {
            *self = Value::map();
        }
        match self {
            Value::Map(map) => {
                map.insert(name.to_string(), value);
                Ok(())
            }
            _ => Err(Error::Traversal {
                segment: name.to_string(),
            }),
        }
    }

    /// Remove a named field, returning it if it existed.
    pub fn remove_field(&mut self, name: &str) -> Option<Value> {
        match self {
            Value::Map(map) => map.remove(name),
            _ => None,
        }
    }

    /// Get a reference to a nested value by field path.
    pub fn get_path(&self, path: &FieldPath) -> Option<&Value> {
        let mut current = self;
        for segment in path.iter() {
            current = current.get_field(segment)?;
        }
        Some(current)
    }

    /// Set a value at a field path, creating intermediate maps as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the path traverses through a non-map value.
    pub fn set_path(&mut self, path: &FieldPath, value: Value) -> Result<(), Error> {
        let mut current = self;
        let segments = path.segments();
        for segment in &segments[..segments.len() - 1] {
            if current.is_null() {
                *current = Value::map();
            }
            current = match current {
                Value::Map(map) => map.entry(segment.clone()).or_insert_with(Value::map),
                _ => {
                    return Err(Error::Traversal {
                        segment: segment.clone(),
                    })
                }
            };
        }
        current.set_field(path.leaf(), value)
    }
}

// Conversion from common types

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v as i64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Bytes(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(s: &str) -> FieldPath {
        FieldPath::parse(s).unwrap()
    }

    #[test]
    fn get_set_field() {
        let mut value = Value::map();
        value.set_field("Name", Value::from("Alice")).unwrap();
        assert_eq!(value.get_field("Name"), Some(&Value::from("Alice")));
        assert_eq!(value.get_field("Missing"), None);
    }

    #[test]
    fn set_field_on_null_allocates_map() {
        let mut value = Value::Null;
        value.set_field("Name", Value::from("Alice")).unwrap();
        assert!(value.is_map());
    }

    #[test]
    fn set_field_on_scalar_errors() {
        let mut value = Value::from(42i64);
        assert!(value.set_field("Name", Value::Null).is_err());
    }

    #[test]
    fn set_path_creates_intermediate_maps() {
        let mut value = Value::map();
        value.set_path(&path("A.B.C"), Value::from(42i64)).unwrap();
        assert_eq!(value.get_path(&path("A.B.C")), Some(&Value::from(42i64)));
        assert!(value.get_path(&path("A")).unwrap().is_map());
    }

    #[test]
    fn remove_field_works() {
        let mut value = Value::map();
        value.set_field("Name", Value::from("Alice")).unwrap();
        assert_eq!(value.remove_field("Name"), Some(Value::from("Alice")));
        assert_eq!(value.get_field("Name"), None);
    }

    #[test]
    fn is_zero_covers_all_variants() {
        assert!(Value::Null.is_zero());
        assert!(Value::Bool(false).is_zero());
        assert!(Value::Integer(0).is_zero());
        assert!(Value::Float(0.0).is_zero());
        assert!(Value::from("").is_zero());
        assert!(Value::Bytes(Bytes::new()).is_zero());
        assert!(Value::array().is_zero());
        assert!(Value::map().is_zero());

        assert!(!Value::Bool(true).is_zero());
        assert!(!Value::Integer(7).is_zero());
        assert!(!Value::from("x").is_zero());
    }

    #[test]
    fn to_text_scalars() {
        assert_eq!(Value::Null.to_text(), "");
        assert_eq!(Value::Bool(true).to_text(), "true");
        assert_eq!(Value::Integer(-3).to_text(), "-3");
        assert_eq!(Value::from("hi").to_text(), "hi");
    }

    #[test]
    fn to_text_array_uses_first_element() {
        let v = Value::from(vec!["a", "b"]);
        assert_eq!(v.to_text(), "a");
        assert_eq!(Value::array().to_text(), "");
    }

    #[test]
    fn to_text_list_forms() {
        assert_eq!(Value::Null.to_text_list(), Vec::<String>::new());
        assert_eq!(Value::from("x").to_text_list(), vec!["x"]);
        assert_eq!(
            Value::from(vec![1i64, 2]).to_text_list(),
            vec!["1".to_string(), "2".to_string()]
        );
    }
}
