//! Name-based type resolution for foreign loads.
//!
//! Assigned type ids are only meaningful within the session that minted
//! them. A document therefore records each type's qualified name, and a
//! [`TypeCatalog`] maps those names back to live types when loading.

use std::collections::HashMap;

use crate::handle::{ObjectHandle, TypeDescriptor};
use crate::packable::{shared, Packable};

/// Builds an empty instance of a catalogued type.
pub type Constructor = fn() -> ObjectHandle;

fn construct<T: Packable + Default>() -> ObjectHandle {
    ObjectHandle::new(&shared(T::default()))
}

/// Registry of the packable types a host knows how to load.
#[derive(Clone, Debug, Default)]
pub struct TypeCatalog {
    by_name: HashMap<String, TypeDescriptor>,
    constructors: HashMap<std::any::TypeId, Constructor>,
}

impl TypeCatalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under its qualified name, with a `Default` constructor.
    pub fn register<T: Packable + Default>(&mut self) -> &mut Self {
        let descriptor = TypeDescriptor::of::<T>();
        self.constructors
            .insert(descriptor.key(), construct::<T> as Constructor);
        self.by_name.insert(descriptor.name().to_string(), descriptor);
        self
    }

    /// Register `T` under its qualified name without a constructor. Loads
    /// of `T` then need a caller-supplied factory.
    pub fn register_type<T: Packable>(&mut self) -> &mut Self {
        let descriptor = TypeDescriptor::of::<T>();
        self.by_name.insert(descriptor.name().to_string(), descriptor);
        self
    }

    /// Also resolve `name` to `T`, for types whose path changed since a
    /// document was written.
    pub fn alias<T: Packable>(&mut self, name: impl Into<String>) -> &mut Self {
        self.by_name.insert(name.into(), TypeDescriptor::of::<T>());
        self
    }

    /// Map a qualified name back to a live type.
    pub fn resolve(&self, name: &str) -> Option<TypeDescriptor> {
        self.by_name.get(name).copied()
    }

    pub fn constructor(&self, descriptor: &TypeDescriptor) -> Option<Constructor> {
        self.constructors.get(&descriptor.key()).copied()
    }

    /// Build an empty instance of `descriptor`, if it has a constructor.
    pub fn construct(&self, descriptor: &TypeDescriptor) -> Option<ObjectHandle> {
        self.constructor(descriptor).map(|build| build())
    }

    /// Number of resolvable names.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}
