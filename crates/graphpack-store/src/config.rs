use serde::{Deserialize, Serialize};

use graphpack_types::FORMAT_VERSION;

/// Configuration for an [`ObjectStore`](crate::ObjectStore).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Written as the document `version`.
    pub format_version: u32,
    /// Maximum number of objects a single pack may emit. `None` means
    /// unbounded; exceeding the limit fails the pack.
    pub max_objects: Option<usize>,
    /// Add a `typeName` to every reference token. Readers ignore it.
    pub reference_type_names: bool,
    /// Write an empty `types` table instead of omitting the key.
    pub emit_empty_types: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            format_version: FORMAT_VERSION,
            max_objects: None,
            reference_type_names: false,
            emit_empty_types: false,
        }
    }
}

impl StoreConfig {
    /// Configuration that makes documents easier to read by hand.
    pub fn debug() -> Self {
        Self {
            reference_type_names: true,
            emit_empty_types: true,
            ..Default::default()
        }
    }

    /// Limit packing to `limit` objects.
    pub fn with_max_objects(mut self, limit: usize) -> Self {
        self.max_objects = Some(limit);
        self
    }
}
