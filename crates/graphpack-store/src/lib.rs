//! Identity-preserving object-graph packing.
//!
//! This crate turns a possibly cyclic graph of domain objects into a single
//! flat [`Document`](graphpack_types::Document) and rebuilds an equivalent
//! graph from it later, even when type ids have changed between versions.
//!
//! # Components
//!
//! - [`Packable`] -- the capability every serializable object implements
//! - [`TypeRegistry`] -- live types <-> type ids, with built-ins and renames
//! - [`ObjectRegistry`] -- live objects (by identity) <-> object ids
//! - [`ObjectStore`] -- the pack/unpack engine
//! - [`ObjectStoreBuilder`] -- pre-seeded stores for resumed sessions
//! - [`TypeCatalog`] -- qualified name -> live type, for foreign loads
//!
//! # Design Rules
//!
//! 1. Object identity is allocation identity: `Rc::ptr_eq`, never `==`.
//! 2. Ids are assigned before contents are packed, so cycles terminate.
//! 3. Objects are bound to their id before they are unpacked, so
//!    back-references find the placeholder instead of recursing.
//! 4. Registries are per store. There is no global state.
//! 5. A store is single-threaded and meant for one pass.

pub mod builder;
pub mod catalog;
pub mod config;
pub mod error;
pub mod handle;
pub mod object_registry;
pub mod packable;
pub mod store;
pub mod type_registry;

pub use builder::ObjectStoreBuilder;
pub use catalog::{Constructor, TypeCatalog};
pub use config::StoreConfig;
pub use error::{StoreError, StoreResult};
pub use handle::{Identity, ObjectHandle, TypeDescriptor};
pub use object_registry::ObjectRegistry;
pub use packable::{shared, Packable, Shared};
pub use store::ObjectStore;
pub use type_registry::{TypeRegistry, UnresolvedType};
