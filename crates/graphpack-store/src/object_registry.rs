//! Bidirectional map between live objects and document object ids.
//!
//! Deduplication is by identity, never by value: two equal but distinct
//! objects get two ids, and one object reached through many paths gets one.

use std::collections::HashMap;
use std::fmt;

use graphpack_types::ObjectId;

use crate::handle::{Identity, ObjectHandle};

/// Per-store object registry.
///
/// Holds a handle to every registered object, which keeps each object's
/// allocation (and therefore its [`Identity`]) alive for as long as the
/// registry exists.
#[derive(Clone, Default)]
pub struct ObjectRegistry {
    objects: HashMap<ObjectId, ObjectHandle>,
    identities: HashMap<Identity, ObjectId>,
    next_id: u64,
}

impl ObjectRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The id of `handle`, minting the next sequential id if the object is
    /// new. The flag is `true` when an id was minted.
    pub fn register(&mut self, handle: &ObjectHandle) -> (ObjectId, bool) {
        if let Some(id) = self.identities.get(&handle.identity()) {
            return (id.clone(), false);
        }
        let id = self.mint();
        self.identities.insert(handle.identity(), id.clone());
        self.objects.insert(id.clone(), handle.clone());
        (id, true)
    }

    /// Bind `id` to `handle`, evicting whichever object held it before.
    /// If `handle` was bound to another id, that binding is dropped.
    pub fn register_at(&mut self, id: ObjectId, handle: ObjectHandle) {
        let stale = self
            .identities
            .get(&handle.identity())
            .filter(|bound| **bound != id)
            .cloned();
        if let Some(stale) = stale {
            self.objects.remove(&stale);
        }
        if let Some(previous) = self.objects.insert(id.clone(), handle.clone()) {
            if self.identities.get(&previous.identity()) == Some(&id) {
                self.identities.remove(&previous.identity());
            }
        }
        self.identities.insert(handle.identity(), id);
    }

    /// The object bound to `id`.
    pub fn get(&self, id: &ObjectId) -> Option<&ObjectHandle> {
        self.objects.get(id)
    }

    /// Whether `id` is bound.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.objects.contains_key(id)
    }

    /// The id currently bound to `handle`'s object.
    pub fn id_of(&self, handle: &ObjectHandle) -> Option<&ObjectId> {
        self.identities.get(&handle.identity())
    }

    /// Number of registered objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// All registered ids in sequence order.
    pub fn ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.objects.keys().cloned().collect();
        ids.sort();
        ids
    }

    // Ids bound through `register_at` are never re-minted.
    fn mint(&mut self) -> ObjectId {
        loop {
            self.next_id += 1;
            let id = ObjectId::from_sequence(self.next_id);
            if !self.objects.contains_key(&id) {
                return id;
            }
        }
    }
}

impl fmt::Debug for ObjectRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRegistry")
            .field("object_count", &self.objects.len())
            .field("next_id", &self.next_id)
            .finish()
    }
}
