//! Bidirectional map between live types and document type ids.
//!
//! Lookups by id go through three layers in order: built-in types, assigned
//! types, then a single hop through the rename table (whose target is
//! itself looked up in the built-in and assigned layers).

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use graphpack_types::{TypeId, TypeInfo};

use crate::catalog::TypeCatalog;
use crate::handle::TypeDescriptor;

/// A type-table entry that could not be mapped to a live type on load.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnresolvedType {
    pub type_id: TypeId,
    pub fullname: Option<String>,
}

/// Per-store type registry.
#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    builtin: HashMap<TypeDescriptor, TypeId>,
    builtin_reverse: HashMap<TypeId, TypeDescriptor>,
    assigned: HashMap<TypeDescriptor, TypeId>,
    assigned_reverse: HashMap<TypeId, TypeDescriptor>,
    renames: HashMap<TypeId, TypeId>,
    next_id: u64,
}

impl TypeRegistry {
    /// Create an empty registry with no built-in types.
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------
    // Setup
    // ---------------------------------------------------------------

    /// Declare a built-in type with a stable id. Built-in types are never
    /// written to the document type table.
    pub fn add_builtin(&mut self, descriptor: TypeDescriptor, id: TypeId) {
        self.builtin.insert(descriptor, id.clone());
        self.builtin_reverse.insert(id, descriptor);
    }

    /// Seed an assigned mapping. If `descriptor` already has an id, only
    /// the reverse direction is recorded, so the type is never claimed
    /// twice in the forward map.
    pub fn add_assigned(&mut self, descriptor: TypeDescriptor, id: TypeId) {
        if self.lookup(&descriptor).is_none() {
            self.assigned.insert(descriptor, id.clone());
        }
        self.assigned_reverse.insert(id, descriptor);
    }

    /// Declare that `from` has been superseded by `to`.
    pub fn add_rename(&mut self, from: TypeId, to: TypeId) {
        self.renames.insert(from, to);
    }

    // ---------------------------------------------------------------
    // Forward: type -> id
    // ---------------------------------------------------------------

    /// The id of `descriptor`, minting the next sequential id on first use.
    pub fn register(&mut self, descriptor: TypeDescriptor) -> TypeId {
        if let Some(id) = self.lookup(&descriptor) {
            return id.clone();
        }
        let id = self.mint();
        debug!(type_id = %id, type_name = descriptor.name(), "assigned type id");
        self.assigned.insert(descriptor, id.clone());
        self.assigned_reverse.insert(id.clone(), descriptor);
        id
    }

    /// The id of `descriptor` without registering it.
    pub fn lookup(&self, descriptor: &TypeDescriptor) -> Option<&TypeId> {
        self.builtin
            .get(descriptor)
            .or_else(|| self.assigned.get(descriptor))
    }

    pub fn is_builtin(&self, descriptor: &TypeDescriptor) -> bool {
        self.builtin.contains_key(descriptor)
    }

    /// Type marker for `descriptor`, registering it if needed. Extended
    /// markers of non-built-in types carry the qualified name.
    pub fn describe(&mut self, descriptor: TypeDescriptor, extended: bool) -> TypeInfo {
        let id = self.register(descriptor);
        if extended && !self.is_builtin(&descriptor) {
            TypeInfo::extended(id, descriptor.name())
        } else {
            TypeInfo::short(id)
        }
    }

    /// Every assigned (non-built-in) type, ordered by id.
    pub fn assigned_types(&self) -> Vec<(TypeId, TypeDescriptor)> {
        let mut types: Vec<(TypeId, TypeDescriptor)> = self
            .assigned
            .iter()
            .map(|(descriptor, id)| (id.clone(), *descriptor))
            .collect();
        types.sort_by(|a, b| a.0.cmp(&b.0));
        types
    }

    // ---------------------------------------------------------------
    // Reverse: id -> type
    // ---------------------------------------------------------------

    /// Resolve an id through built-in, assigned, then renamed tables.
    pub fn resolve(&self, id: &TypeId) -> Option<TypeDescriptor> {
        self.resolve_direct(id).or_else(|| {
            let renamed = self.renames.get(id)?;
            self.resolve_direct(renamed)
        })
    }

    fn resolve_direct(&self, id: &TypeId) -> Option<TypeDescriptor> {
        self.builtin_reverse
            .get(id)
            .or_else(|| self.assigned_reverse.get(id))
            .copied()
    }

    // ---------------------------------------------------------------
    // Loading
    // ---------------------------------------------------------------

    /// Merge a persisted type table.
    ///
    /// Entries whose id already resolves are skipped. Others are resolved
    /// by qualified name through `catalog`; failures are logged, returned,
    /// and otherwise ignored so the rest of the document stays loadable.
    pub fn load(
        &mut self,
        table: &BTreeMap<TypeId, TypeInfo>,
        catalog: &TypeCatalog,
    ) -> Vec<UnresolvedType> {
        let mut unresolved = Vec::new();
        for (id, info) in table {
            if self.resolve(id).is_some() {
                continue;
            }
            let descriptor = info
                .fullname
                .as_deref()
                .and_then(|name| catalog.resolve(name));
            match descriptor {
                Some(descriptor) => {
                    debug!(type_id = %id, type_name = descriptor.name(), "loaded type");
                    self.add_assigned(descriptor, id.clone());
                }
                None => {
                    warn!(
                        type_id = %id,
                        fullname = info.fullname.as_deref().unwrap_or("<none>"),
                        "did not find type for type-table entry; skipping"
                    );
                    unresolved.push(UnresolvedType {
                        type_id: id.clone(),
                        fullname: info.fullname.clone(),
                    });
                }
            }
        }
        unresolved
    }

    // Seeded, loaded, and rename-source ids are never re-minted.
    fn mint(&mut self) -> TypeId {
        loop {
            self.next_id += 1;
            let id = TypeId::from_sequence(self.next_id);
            if !self.is_taken(&id) {
                return id;
            }
        }
    }

    fn is_taken(&self, id: &TypeId) -> bool {
        self.builtin_reverse.contains_key(id)
            || self.assigned_reverse.contains_key(id)
            || self.renames.contains_key(id)
    }
}
