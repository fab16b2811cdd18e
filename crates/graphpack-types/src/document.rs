//! The packed-graph document.
//!
//! ```text
//! {
//!   "version": 2,
//!   "root":    { "ref": "1", "type": "1" },
//!   "objects": { "1": { ...fields..., "isa": { "type": "1" } } },
//!   "types":   { "1": { "type": "1", "fullname": "game::Level" } }
//! }
//! ```
//!
//! `types` lists only non-built-in types and is omitted when empty.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::TypeError;
use crate::id::{ObjectId, TypeId};
use crate::token::{ReferenceToken, TypeInfo};

/// Current document format revision.
pub const FORMAT_VERSION: u32 = 2;

/// Field key holding an object's type marker.
pub const ISA_KEY: &str = "isa";

/// Root aggregate of a packed object graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub version: u32,
    pub root: ReferenceToken,
    #[serde(default)]
    pub objects: BTreeMap<ObjectId, Map<String, Value>>,
    #[serde(
        default,
        deserialize_with = "type_table",
        skip_serializing_if = "Option::is_none"
    )]
    pub types: Option<BTreeMap<TypeId, TypeInfo>>,
}

impl Document {
    /// An empty document at the current format version.
    pub fn new(root: ReferenceToken) -> Self {
        Self {
            version: FORMAT_VERSION,
            root,
            objects: BTreeMap::new(),
            types: None,
        }
    }

    pub fn from_value(value: Value) -> Result<Self, TypeError> {
        serde_json::from_value(value).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    pub fn to_value(&self) -> Result<Value, TypeError> {
        serde_json::to_value(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    pub fn from_json_str(text: &str) -> Result<Self, TypeError> {
        serde_json::from_str(text).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    pub fn to_json_string(&self) -> Result<String, TypeError> {
        serde_json::to_string(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    pub fn to_json_string_pretty(&self) -> Result<String, TypeError> {
        serde_json::to_string_pretty(self).map_err(|e| TypeError::Serialization(e.to_string()))
    }

    /// The packed field map of one object.
    pub fn object(&self, id: &ObjectId) -> Option<&Map<String, Value>> {
        self.objects.get(id)
    }

    /// One packed field of one object. Missing object and missing key both
    /// yield `None`.
    pub fn field(&self, id: &ObjectId, key: &str) -> Option<&Value> {
        self.objects.get(id)?.get(key)
    }

    /// The `isa` marker of an object, if present and well formed.
    pub fn isa(&self, id: &ObjectId) -> Option<TypeInfo> {
        TypeInfo::from_value(self.field(id, ISA_KEY)?).ok()
    }

    /// The type-table entry for `type_id`.
    pub fn type_info(&self, type_id: &TypeId) -> Option<&TypeInfo> {
        self.types.as_ref()?.get(type_id)
    }

    /// References reachable from `root` whose object has no entry in
    /// `objects`. Empty for any document produced by a completed pack.
    pub fn missing_objects(&self) -> Vec<ReferenceToken> {
        let mut seen = HashSet::new();
        let mut missing = Vec::new();
        let mut queue = VecDeque::from([self.root.clone()]);

        while let Some(token) = queue.pop_front() {
            if !seen.insert(token.object.clone()) {
                continue;
            }
            match self.objects.get(&token.object) {
                Some(fields) => {
                    for (key, value) in fields {
                        if key != ISA_KEY {
                            collect_references(value, &mut queue);
                        }
                    }
                }
                None => missing.push(token),
            }
        }
        missing
    }

    /// Ids of objects not reachable from `root`.
    pub fn unreachable_objects(&self) -> Vec<ObjectId> {
        let mut reachable = HashSet::new();
        let mut queue = VecDeque::from([self.root.clone()]);
        while let Some(token) = queue.pop_front() {
            if !reachable.insert(token.object.clone()) {
                continue;
            }
            if let Some(fields) = self.objects.get(&token.object) {
                for (key, value) in fields {
                    if key != ISA_KEY {
                        collect_references(value, &mut queue);
                    }
                }
            }
        }
        self.objects
            .keys()
            .filter(|id| !reachable.contains(*id))
            .cloned()
            .collect()
    }
}

// A malformed entry keeps its key and whatever string `fullname` it has, so
// the loader can report it instead of the whole document being rejected.
fn type_table<'de, D>(deserializer: D) -> Result<Option<BTreeMap<TypeId, TypeInfo>>, D::Error>
where
    D: Deserializer<'de>,
{
    let table: Option<BTreeMap<TypeId, Value>> = Option::deserialize(deserializer)?;
    Ok(table.map(|entries| {
        entries
            .into_iter()
            .map(|(id, value)| {
                let info = TypeInfo::from_value(&value).unwrap_or_else(|_| TypeInfo {
                    type_id: id.clone(),
                    fullname: value
                        .get("fullname")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                });
                (id, info)
            })
            .collect()
    }))
}

/// Collect every reference token nested anywhere inside `value`.
///
/// A map shaped like a token is collected and not descended into.
pub fn collect_references(value: &Value, out: &mut impl Extend<ReferenceToken>) {
    match value {
        Value::Object(map) => {
            if let Ok(token) = ReferenceToken::from_value(value) {
                out.extend(Some(token));
                return;
            }
            for nested in map.values() {
                collect_references(nested, out);
            }
        }
        Value::Array(items) => {
            for nested in items {
                collect_references(nested, out);
            }
        }
        _ => {}
    }
}
