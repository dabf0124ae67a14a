//! Per-request context shared by parsers, metas and CRUD handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;

use metabind_record::Storage;

use crate::TimeParser;

/// One multipart file field.
#[derive(Clone, Debug, PartialEq)]
pub struct FormFile {
    pub filename: String,
    pub content_type: String,
    pub data: Bytes,
}

/// Decoded form/multipart body: repeated regular fields and file
/// fields, both keyed by their flat form names.
///
/// `BTreeMap` keeps keys sorted, which the form parser relies on for
/// deterministic child ordering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormPayload {
    pub fields: BTreeMap<String, Vec<String>>,
    pub files: BTreeMap<String, Vec<FormFile>>,
}

impl FormPayload {
    pub fn new() -> Self {
        FormPayload::default()
    }

    /// Append one regular field value.
    #[must_use]
    pub fn with_field(mut self, key: &str, value: &str) -> Self {
        self.fields
            .entry(key.to_string())
            .or_default()
            .push(value.to_string());
        self
    }

    /// Append one file field value.
    #[must_use]
    pub fn with_file(mut self, key: &str, file: FormFile) -> Self {
        self.files.entry(key.to_string()).or_default().push(file);
        self
    }
}

/// The raw request body plus its content discriminator.
///
/// The transport layer decides which parser runs; the engine never
/// sniffs content types itself.
#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    Json(Bytes),
    Form(FormPayload),
}

/// Per-request state threaded through the whole decode pipeline.
#[derive(Clone)]
pub struct Context {
    pub storage: Arc<dyn Storage>,
    pub roles: Vec<String>,
    pub resource_id: Option<String>,
    pub payload: Option<Payload>,
    pub time: TimeParser,
    /// Count-only flag for find-many: return cardinality, not rows.
    pub counting: bool,
}

impl Context {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Context {
            storage,
            roles: Vec::new(),
            resource_id: None,
            payload: None,
            time: TimeParser::default(),
            counting: false,
        }
    }

    #[must_use]
    pub fn with_roles(mut self, roles: &[&str]) -> Self {
        self.roles = roles.iter().map(|r| r.to_string()).collect();
        self
    }

    #[must_use]
    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = Some(payload);
        self
    }

    #[must_use]
    pub fn with_time(mut self, time: TimeParser) -> Self {
        self.time = time;
        self
    }

    #[must_use]
    pub fn with_counting(mut self, counting: bool) -> Self {
        self.counting = counting;
        self
    }
}
