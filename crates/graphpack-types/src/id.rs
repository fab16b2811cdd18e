use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier naming exactly one object within a document.
///
/// Minted ids are decimal sequence numbers starting at `1`. Ids read from
/// older documents may carry an `o:` prefix; it is stripped on parse and
/// never written back.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ObjectId(String);

impl ObjectId {
    /// Prefix used by legacy documents.
    pub const LEGACY_PREFIX: &'static str = "o:";

    /// Create an id from its textual form, stripping a legacy prefix.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        match id.strip_prefix(Self::LEGACY_PREFIX) {
            Some(stripped) => Self(stripped.to_string()),
            None => Self(id),
        }
    }

    /// The id minted for the `n`th object of a session.
    pub fn from_sequence(n: u64) -> Self {
        Self(n.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The sequence number, if this id is a decimal one.
    pub fn sequence(&self) -> Option<u64> {
        parse_sequence(&self.0)
    }
}

impl Ord for ObjectId {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_ids(&self.0, &other.0)
    }
}

impl PartialOrd for ObjectId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<String> for ObjectId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<&str> for ObjectId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<ObjectId> for String {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier naming exactly one concrete type within a document.
///
/// Built-in ids are arbitrary stable strings chosen by the host. Assigned
/// ids are decimal sequence numbers. Legacy `t:` prefixes are stripped.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct TypeId(String);

impl TypeId {
    /// Prefix used by legacy documents.
    pub const LEGACY_PREFIX: &'static str = "t:";

    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        match id.strip_prefix(Self::LEGACY_PREFIX) {
            Some(stripped) => Self(stripped.to_string()),
            None => Self(id),
        }
    }

    pub fn from_sequence(n: u64) -> Self {
        Self(n.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn sequence(&self) -> Option<u64> {
        parse_sequence(&self.0)
    }
}

impl Ord for TypeId {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_ids(&self.0, &other.0)
    }
}

impl PartialOrd for TypeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl From<String> for TypeId {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

impl From<&str> for TypeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<TypeId> for String {
    fn from(id: TypeId) -> Self {
        id.0
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeId({})", self.0)
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_sequence(id: &str) -> Option<u64> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}

// Sequence ids sort numerically and ahead of named ids. Ties fall back to
// the raw text so the order stays consistent with `Eq`.
fn compare_ids(a: &str, b: &str) -> Ordering {
    match (parse_sequence(a), parse_sequence(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}
