//! Default CRUD handlers, overridable per resource.

use metabind_record::Value;

use crate::coerce::truthy;
use crate::{Context, Error, MetaValues, PermissionMode, Resource};

/// The destroy marker field: a truthy value in the payload deletes the
/// addressed record instead of updating it.
pub const DESTROY_MARKER: &str = "_destroy";

/// Result of a find-many call.
#[derive(Clone, Debug, PartialEq)]
pub enum Found {
    Rows(Vec<Value>),
    Count(u64),
}

/// Locate the record a decode run targets.
///
/// The key comes from the payload's primary-key node when a parsed tree
/// is present, otherwise from the context's resource id. A present tree
/// without a resolvable key is the creation flow: the record stays
/// fresh and decode proceeds. A truthy destroy marker deletes the
/// addressed record and ends the run via `SkipRemaining`.
pub fn find_one(
    resource: &Resource,
    record: &mut Value,
    meta_values: Option<&MetaValues>,
    ctx: &Context,
) -> Result<(), Error> {
    if !resource.has_permission(PermissionMode::Read, ctx) {
        return Err(Error::PermissionDenied);
    }

    let key = match meta_values {
        Some(values) => {
            let primary = resource
                .primary_meta()
                .unwrap_or_else(|| resource.shape().primary_field());
            values
                .get(primary)
                .and_then(|mv| mv.value.as_ref())
                .map(Value::to_text)
                .unwrap_or_default()
        }
        None => ctx.resource_id.clone().unwrap_or_default(),
    };

    if key.is_empty() {
        // A payload with no key is a creation; no payload at all and no
        // context id means there is nothing to find.
        return if meta_values.is_some() {
            Ok(())
        } else {
            Err(Error::NotFound)
        };
    }

    let destroy = meta_values
        .and_then(|values| values.get(DESTROY_MARKER))
        .and_then(|mv| mv.value.as_ref())
        .map(|v| truthy(&v.to_text()))
        .unwrap_or(false);
    if destroy {
        if !resource.has_permission(PermissionMode::Delete, ctx) {
            return Err(Error::PermissionDenied);
        }
        log::debug!("destroying {} '{}'", resource.name(), key);
        ctx.storage.delete(resource.shape(), &key)?;
        return Err(Error::SkipRemaining);
    }

    match ctx.storage.find_by_key(resource.shape(), &key)? {
        Some(found) => {
            *record = found;
            Ok(())
        }
        None => Err(Error::NotFound),
    }
}

/// List or count all records of the resource's shape.
pub fn find_many(resource: &Resource, ctx: &Context) -> Result<Found, Error> {
    if !resource.has_permission(PermissionMode::Read, ctx) {
        return Err(Error::PermissionDenied);
    }
    if ctx.counting {
        Ok(Found::Count(ctx.storage.count(resource.shape())?))
    } else {
        Ok(Found::Rows(ctx.storage.find_all(resource.shape())?))
    }
}

/// Persist one record; new records need Create, existing need Update.
pub fn save(resource: &Resource, record: &mut Value, ctx: &Context) -> Result<(), Error> {
    let mode = if resource.shape().primary_key_zero(record) {
        PermissionMode::Create
    } else {
        PermissionMode::Update
    };
    if !resource.has_permission(mode, ctx) {
        return Err(Error::PermissionDenied);
    }
    ctx.storage.save(resource.shape(), record)?;
    Ok(())
}

/// Remove the record addressed by the context's resource id.
pub fn delete(resource: &Resource, ctx: &Context) -> Result<(), Error> {
    if !resource.has_permission(PermissionMode::Delete, ctx) {
        return Err(Error::PermissionDenied);
    }
    let key = ctx.resource_id.clone().ok_or(Error::NotFound)?;
    if ctx.storage.find_by_key(resource.shape(), &key)?.is_none() {
        return Err(Error::NotFound);
    }
    ctx.storage.delete(resource.shape(), &key)?;
    Ok(())
}
