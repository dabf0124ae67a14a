//! Payload parsers: flat form fields and JSON bodies into the
//! MetaValue tree, plus the top-level decode entry points.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use metabind_record::{from_value, json_to_value, to_value, Value};

use crate::processor::Processor;
use crate::{Context, Error, FormFile, FormPayload, MetaValue, MetaValues, Payload, Resource};

/// Form field names address record fields under this prefix:
/// `Record.Name`, `Record.Addresses[0].City`.
pub const DEFAULT_FORM_PREFIX: &str = "Record.";

/// Recursion ceiling for nested payloads; deeper input is rejected
/// instead of overflowing the stack.
const MAX_DEPTH: usize = 32;

lazy_static! {
    static ref CURRENT_LEVEL: Regex = Regex::new(r"^[^.]+$").unwrap();
    static ref NEXT_LEVEL: Regex = Regex::new(r"^(([^.\[\]]+)(\[\d+\])?)(?:(\.[^.]+)+)$").unwrap();
}

/// Parse a JSON object body into a MetaValue tree for a resource.
///
/// Mappings under a key whose meta carries a child resource recurse
/// into nested nodes; any other mapping stays a scalar node so the
/// field's structural coercion handles it. An array of mappings under a
/// child-resource meta becomes one indexed nested node per element.
pub fn json_to_meta_values(body: &[u8], resource: &Arc<Resource>) -> Result<MetaValues, Error> {
    let json: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| Error::Parse(e.to_string()))?;
    let value = json_to_value(json);
    let Value::Map(map) = value else {
        return Err(Error::Parse("payload is not an object".to_string()));
    };
    value_map_to_meta_values(&map, resource, 0)
}

fn value_map_to_meta_values(
    map: &BTreeMap<String, Value>,
    resource: &Arc<Resource>,
    depth: usize,
) -> Result<MetaValues, Error> {
    if depth >= MAX_DEPTH {
        return Err(Error::Parse("payload nesting too deep".to_string()));
    }

    let mut values = MetaValues::new();
    for (name, raw) in map {
        let meta = resource.meta(name).cloned();
        let child = meta.as_ref().and_then(|m| m.resource().cloned());

        match (raw, child) {
            (Value::Map(nested), Some(child)) => {
                let children = value_map_to_meta_values(nested, &child, depth + 1)?;
                values.push(MetaValue::nested(name.clone(), 0, children, meta));
            }
            (Value::Array(items), Some(child)) => {
                // Mixed-shape sequences are not supported: the first
                // scalar element demotes the whole sequence to one
                // scalar node.
                let mut nested = Vec::with_capacity(items.len());
                let mut all_maps = true;
                for (index, item) in items.iter().enumerate() {
                    match item {
                        Value::Map(inner) => {
                            let children = value_map_to_meta_values(inner, &child, depth + 1)?;
                            nested.push(MetaValue::nested(
                                name.clone(),
                                index,
                                children,
                                meta.clone(),
                            ));
                        }
                        _ => {
                            all_maps = false;
                            break;
                        }
                    }
                }
                if all_maps {
                    for node in nested {
                        values.push(node);
                    }
                } else {
                    values.push(MetaValue::scalar(name.clone(), raw.clone(), meta));
                }
            }
            _ => values.push(MetaValue::scalar(name.clone(), raw.clone(), meta)),
        }
    }
    Ok(values)
}

/// Parse flat form fields into a MetaValue tree for a resource.
///
/// Keys are consumed in sorted order so indexed nested groups come out
/// ordered by their indexed name, not submission order. Each distinct
/// indexed group (`Addresses[1]`) recurses exactly once with the
/// extended prefix and receives a sequential `index` per base name.
pub fn form_to_meta_values(
    payload: &FormPayload,
    resource: &Arc<Resource>,
    prefix: &str,
) -> Result<MetaValues, Error> {
    form_level(payload, resource, prefix, 0)
}

fn form_level(
    payload: &FormPayload,
    resource: &Arc<Resource>,
    prefix: &str,
    depth: usize,
) -> Result<MetaValues, Error> {
    if depth >= MAX_DEPTH {
        return Err(Error::Parse("form nesting too deep".to_string()));
    }

    let mut values = MetaValues::new();
    let mut converted: BTreeSet<String> = BTreeSet::new();
    let mut nested_index: BTreeMap<String, usize> = BTreeMap::new();

    let mut push_node = |key: &str, raw: Value, values: &mut MetaValues| -> Result<(), Error> {
        let Some(suffix) = key.strip_prefix(prefix) else {
            return Ok(());
        };

        if CURRENT_LEVEL.is_match(suffix) {
            let meta = resource.meta(suffix).cloned();
            values.push(MetaValue::scalar(suffix, raw, meta));
        } else if let Some(captures) = NEXT_LEVEL.captures(suffix) {
            // indexed = "Addresses[1]", base = "Addresses"
            let indexed = &captures[1];
            let base = &captures[2];
            if !converted.insert(indexed.to_string()) {
                return Ok(());
            }

            let meta = resource.meta(base).cloned();
            let child = meta.as_ref().and_then(|m| m.resource().cloned());
            let child_prefix = format!("{}{}.", prefix, indexed);
            let children = match &child {
                Some(child) => form_level(payload, child, &child_prefix, depth + 1)?,
                None => MetaValues::new(),
            };

            let counter = format!("{}{}", prefix, base);
            let index = match nested_index.get(&counter) {
                Some(i) => i + 1,
                None => 0,
            };
            nested_index.insert(counter, index);

            values.push(MetaValue::nested(base, index, children, meta));
        }
        Ok(())
    };

    for (key, field_values) in &payload.fields {
        let raw = Value::Array(field_values.iter().cloned().map(Value::String).collect());
        push_node(key, raw, &mut values)?;
    }
    for (key, files) in &payload.files {
        let raw = match files.as_slice() {
            [single] => file_value(single),
            many => Value::Array(many.iter().map(file_value).collect()),
        };
        push_node(key, raw, &mut values)?;
    }

    Ok(values)
}

fn file_value(file: &FormFile) -> Value {
    let mut map = BTreeMap::new();
    map.insert("Filename".to_string(), Value::String(file.filename.clone()));
    map.insert(
        "ContentType".to_string(),
        Value::String(file.content_type.clone()),
    );
    map.insert("Data".to_string(), Value::Bytes(file.data.clone()));
    Value::Map(map)
}

/// Parse the context's payload and run the full decode pipeline on a
/// record.
pub fn decode(ctx: &Context, record: &mut Value, resource: &Arc<Resource>) -> Result<(), Error> {
    let meta_values = match &ctx.payload {
        Some(Payload::Json(body)) => Some(json_to_meta_values(body, resource)?),
        Some(Payload::Form(payload)) => {
            Some(form_to_meta_values(payload, resource, DEFAULT_FORM_PREFIX)?)
        }
        None => None,
    };
    Processor::new(resource.clone(), record, meta_values.as_ref(), ctx).run()
}

/// Decode the context's payload into a typed record via the serde
/// bridge.
pub fn decode_into<T>(ctx: &Context, target: &mut T, resource: &Arc<Resource>) -> Result<(), Error>
where
    T: Serialize + DeserializeOwned,
{
    let mut record = to_value(target)?;
    decode(ctx, &mut record, resource)?;
    *target = from_value(record)?;
    Ok(())
}
