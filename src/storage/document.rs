use serde_json::{Map, Value};

use crate::err::WorldError;
use crate::schema::version::SchemaVersion;

pub(crate) const ID_FIELD: &str = "_id";
pub(crate) const CLASS_FIELD: &str = "_class";
pub(crate) const SCHEMA_FIELD: &str = "_schema";
pub(crate) const WORLD_FIELD: &str = "worldId";

pub(crate) type Document = Map<String, Value>;

pub(crate) fn parse(raw: &str) -> Result<Document, WorldError> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(document) => Ok(document),
        other => Err(WorldError::Serde(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
    }
}

pub(crate) fn to_string(document: &Document) -> Result<String, WorldError> {
    Ok(serde_json::to_string(document)?)
}

/// `_id` as a string. Numeric ids are accepted and rendered in decimal.
pub(crate) fn id(document: &Document) -> Option<String> {
    match document.get(ID_FIELD)? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

pub(crate) fn entity_type(document: &Document) -> Option<&str> {
    document
        .get(CLASS_FIELD)
        .and_then(Value::as_str)
        .map(|class| class.rsplit('.').next().unwrap_or(class))
        .filter(|class| !class.is_empty())
}

pub(crate) fn world_id(document: &Document) -> Option<&str> {
    document.get(WORLD_FIELD).and_then(Value::as_str)
}

/// Missing `_schema` is the zero version.
pub(crate) fn schema_version(document: &Document) -> Result<SchemaVersion, WorldError> {
    match document.get(SCHEMA_FIELD) {
        None | Some(Value::Null) => Ok(SchemaVersion::zero()),
        Some(Value::String(version)) => SchemaVersion::parse(version),
        Some(Value::Number(version)) => SchemaVersion::parse(&version.to_string()),
        Some(other) => Err(WorldError::Validation(format!(
            "_schema must be a string, got {}",
            kind_of(other)
        ))),
    }
}

pub(crate) fn set_schema_version(document: &mut Document, version: &SchemaVersion) {
    document.insert(SCHEMA_FIELD.into(), Value::String(version.to_string()));
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
