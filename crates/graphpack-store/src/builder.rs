//! Construction of pre-seeded stores.
//!
//! Built-in types and renames are one-time setup. Seeded types and objects
//! let a session resume with the ids of an earlier one.

use graphpack_types::{Document, ObjectId, TypeId};

use crate::catalog::TypeCatalog;
use crate::config::StoreConfig;
use crate::handle::{ObjectHandle, TypeDescriptor};
use crate::object_registry::ObjectRegistry;
use crate::packable::Packable;
use crate::store::ObjectStore;
use crate::type_registry::TypeRegistry;

/// Builder for [`ObjectStore`].
#[derive(Debug, Default)]
pub struct ObjectStoreBuilder {
    config: StoreConfig,
    catalog: TypeCatalog,
    builtin_types: Vec<(TypeDescriptor, TypeId)>,
    types: Vec<(TypeDescriptor, TypeId)>,
    type_renames: Vec<(TypeId, TypeId)>,
    objects: Vec<(ObjectId, ObjectHandle)>,
    document: Option<Document>,
}

impl ObjectStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    /// Types resolvable by qualified name when loading a document.
    pub fn with_catalog(mut self, catalog: TypeCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_builtin_types<I, S>(mut self, builtin_types: I) -> Self
    where
        I: IntoIterator<Item = (TypeDescriptor, S)>,
        S: Into<TypeId>,
    {
        self.builtin_types
            .extend(builtin_types.into_iter().map(|(d, id)| (d, id.into())));
        self
    }

    /// Declare `T` built in under the stable id `id`.
    pub fn with_builtin<T: Packable>(mut self, id: impl Into<TypeId>) -> Self {
        self.builtin_types.push((TypeDescriptor::of::<T>(), id.into()));
        self
    }

    /// Seed assigned type ids, e.g. from an earlier session.
    pub fn with_types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = (TypeDescriptor, S)>,
        S: Into<TypeId>,
    {
        self.types
            .extend(types.into_iter().map(|(d, id)| (d, id.into())));
        self
    }

    /// Map superseded type ids to their current ids (one hop).
    pub fn with_type_renames<I, A, B>(mut self, renames: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<TypeId>,
        B: Into<TypeId>,
    {
        self.type_renames
            .extend(renames.into_iter().map(|(from, to)| (from.into(), to.into())));
        self
    }

    /// Seed objects under fixed ids.
    pub fn with_objects<I, S>(mut self, objects: I) -> Self
    where
        I: IntoIterator<Item = (S, ObjectHandle)>,
        S: Into<ObjectId>,
    {
        self.objects
            .extend(objects.into_iter().map(|(id, handle)| (id.into(), handle)));
        self
    }

    /// The document to unpack from.
    pub fn with_document(mut self, document: Document) -> Self {
        self.document = Some(document);
        self
    }

    pub fn build(self) -> ObjectStore {
        let mut types = TypeRegistry::new();
        for (descriptor, id) in self.builtin_types {
            types.add_builtin(descriptor, id);
        }
        for (descriptor, id) in self.types {
            types.add_assigned(descriptor, id);
        }
        for (from, to) in self.type_renames {
            types.add_rename(from, to);
        }

        let mut objects = ObjectRegistry::new();
        for (id, handle) in self.objects {
            objects.register_at(id, handle);
        }

        let mut store = ObjectStore::from_parts(self.config, self.catalog, types, objects);
        if let Some(document) = self.document {
            store.load_document(document);
        }
        store
    }
}
