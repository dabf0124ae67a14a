//! Scalar coercion: one tagged dispatch from external values to field
//! kinds.
//!
//! The priority order is fixed: numeric kinds, bool, the field's scan
//! hook, text, text list, binary, temporal, and finally structural
//! conformance through the shape bridge.

use bytes::Bytes;

use metabind_record::{FieldKind, FieldShape, Value};

use crate::Context;

/// How a coercion failed. The meta setter decides attribution:
/// recoverable failures become field-level validation errors,
/// configuration failures surface as schema misconfiguration.
#[derive(Debug, Clone, PartialEq)]
pub enum CoerceFailure {
    Recoverable(String),
    Configuration(String),
}

/// Coerce an external raw value into the declared shape of a leaf
/// field.
pub fn coerce(field: &FieldShape, raw: &Value, ctx: &Context) -> Result<Value, CoerceFailure> {
    let text = raw.to_text();

    // An empty input into an optional leaf clears it, whatever the kind.
    if field.optional && text.is_empty() {
        return Ok(Value::Null);
    }

    match &field.kind {
        FieldKind::Integer => {
            if text.is_empty() {
                return Ok(field.kind.zero_value());
            }
            text.parse::<i64>().map(Value::Integer).map_err(|_| {
                CoerceFailure::Recoverable(format!("can't set value {}", text))
            })
        }
        FieldKind::Unsigned => {
            if text.is_empty() {
                return Ok(field.kind.zero_value());
            }
            // Values past i64::MAX do not fit the integer model.
            text.parse::<u64>()
                .ok()
                .and_then(|u| i64::try_from(u).ok())
                .map(Value::Integer)
                .ok_or_else(|| CoerceFailure::Recoverable(format!("can't set value {}", text)))
        }
        FieldKind::Float => {
            if text.is_empty() {
                return Ok(field.kind.zero_value());
            }
            text.parse::<f64>().map(Value::Float).map_err(|_| {
                CoerceFailure::Recoverable(format!("can't set value {}", text))
            })
        }
        FieldKind::Bool => Ok(Value::Bool(text == "true")),
        _ => coerce_structured(field, raw, &text, ctx),
    }
}

fn coerce_structured(
    field: &FieldShape,
    raw: &Value,
    text: &str,
    ctx: &Context,
) -> Result<Value, CoerceFailure> {
    // Self-decoding hook: try the raw value, retry with its string form.
    if let Some(scan) = &field.scan {
        return scan(raw)
            .or_else(|_| scan(&Value::String(text.to_string())))
            .map_err(|e| CoerceFailure::Recoverable(e.to_string()));
    }

    match &field.kind {
        FieldKind::Text => Ok(Value::String(text.to_string())),
        FieldKind::TextList => Ok(Value::Array(
            raw.to_text_list().into_iter().map(Value::String).collect(),
        )),
        FieldKind::Binary => match raw {
            Value::Bytes(b) => Ok(Value::Bytes(b.clone())),
            other => Ok(Value::Bytes(Bytes::from(other.to_text().into_bytes()))),
        },
        FieldKind::Temporal => {
            // Empty input clears instead of parsing.
            if text.is_empty() {
                return Ok(Value::Null);
            }
            ctx.time
                .parse_canonical(text)
                .map(Value::String)
                .map_err(CoerceFailure::Recoverable)
        }
        FieldKind::Struct(shape) => {
            // Exact-shape fast path first, then structural conformance.
            shape
                .conform(raw)
                .map_err(|e| CoerceFailure::Configuration(e.to_string()))
        }
        FieldKind::StructList(shape) => match raw {
            Value::Array(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(
                        shape
                            .conform(item)
                            .map_err(|e| CoerceFailure::Configuration(e.to_string()))?,
                    );
                }
                Ok(Value::Array(out))
            }
            Value::Map(_) => Ok(Value::Array(vec![shape
                .conform(raw)
                .map_err(|e| CoerceFailure::Configuration(e.to_string()))?])),
            other => Err(CoerceFailure::Configuration(format!(
                "can't convert {} to struct list",
                other.to_text()
            ))),
        },
        // Numeric and bool kinds never reach here.
        _ => unreachable!("scalar kinds handled in coerce"),
    }
}

/// Extract a related-record key set from an external value: the array
/// form with blank entries dropped.
pub fn key_set(raw: &Value) -> Vec<String> {
    raw.to_text_list()
        .into_iter()
        .filter(|k| !k.is_empty())
        .collect()
}

/// Truthiness of the destroy marker: anything but "", "0" and "false".
pub fn truthy(text: &str) -> bool {
    !matches!(text, "" | "0" | "false")
}
