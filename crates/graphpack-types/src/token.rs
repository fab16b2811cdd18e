use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::TypeError;
use crate::id::{ObjectId, TypeId};

/// A link from one packed value to a packed object.
///
/// Carries both the object's identity and its declared type so a reader can
/// pick a constructor without loading anything else first. The optional
/// `typeName` is a debugging aid and is ignored when resolving.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReferenceToken {
    #[serde(rename = "ref")]
    pub object: ObjectId,
    #[serde(rename = "type")]
    pub type_id: TypeId,
    #[serde(
        rename = "typeName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub type_name: Option<String>,
}

impl ReferenceToken {
    pub fn new(object: ObjectId, type_id: TypeId) -> Self {
        Self {
            object,
            type_id,
            type_name: None,
        }
    }

    /// Attach a human-readable type name.
    pub fn with_type_name(mut self, name: impl Into<String>) -> Self {
        self.type_name = Some(name.into());
        self
    }

    /// The JSON form of this token.
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("ref".into(), Value::String(self.object.to_string()));
        map.insert("type".into(), Value::String(self.type_id.to_string()));
        if let Some(name) = &self.type_name {
            map.insert("typeName".into(), Value::String(name.clone()));
        }
        Value::Object(map)
    }

    /// Parse a token out of an arbitrary JSON value.
    ///
    /// Integer ids are accepted and converted to their decimal text.
    pub fn from_value(value: &Value) -> Result<Self, TypeError> {
        let map = value
            .as_object()
            .ok_or_else(|| TypeError::NotAnObject(json_kind(value)))?;
        let object = ObjectId::new(id_text(map, "ref")?);
        let type_id = TypeId::new(id_text(map, "type")?);
        let type_name = map
            .get("typeName")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Self {
            object,
            type_id,
            type_name,
        })
    }

    /// Returns `true` if `value` has the shape of a reference token.
    pub fn is_reference(value: &Value) -> bool {
        Self::from_value(value).is_ok()
    }
}

/// Type marker for a packed object, and entry of the document type table.
///
/// `fullname` is present only in the top-level table, where it records the
/// qualified type name needed to re-resolve the id on a foreign load.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    #[serde(rename = "type")]
    pub type_id: TypeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fullname: Option<String>,
}

impl TypeInfo {
    /// A short marker without a qualified name.
    pub fn short(type_id: TypeId) -> Self {
        Self {
            type_id,
            fullname: None,
        }
    }

    pub fn extended(type_id: TypeId, fullname: impl Into<String>) -> Self {
        Self {
            type_id,
            fullname: Some(fullname.into()),
        }
    }

    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        map.insert("type".into(), Value::String(self.type_id.to_string()));
        if let Some(fullname) = &self.fullname {
            map.insert("fullname".into(), Value::String(fullname.clone()));
        }
        Value::Object(map)
    }

    pub fn from_value(value: &Value) -> Result<Self, TypeError> {
        let map = value
            .as_object()
            .ok_or_else(|| TypeError::NotAnObject(json_kind(value)))?;
        Ok(Self {
            type_id: TypeId::new(id_text(map, "type")?),
            fullname: map
                .get("fullname")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }
}

fn id_text(map: &Map<String, Value>, field: &'static str) -> Result<String, TypeError> {
    match map.get(field) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) if n.is_u64() || n.is_i64() => Ok(n.to_string()),
        Some(_) => Err(TypeError::InvalidField { field }),
        None => Err(TypeError::MissingField(field)),
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
