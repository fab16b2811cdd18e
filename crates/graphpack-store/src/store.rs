//! The pack/unpack engine.
//!
//! # Packing
//!
//! The root is registered first, so in a fresh store it gets object id `1`.
//! Objects are then drained from a worklist: each is asked to pack its
//! fields, and every reference it creates to a not-yet-seen object appends
//! that object to the worklist. Ids are assigned before contents are
//! packed, which is what makes cycles terminate. The loop runs until the
//! worklist is empty; the only bound is [`StoreConfig::max_objects`].
//!
//! # Unpacking
//!
//! Each object moves through `unseen -> placeholder-registered ->
//! fully-unpacked`. The engine binds an empty instance to its id *before*
//! calling [`Packable::unpack`], so a back-reference reached from inside
//! that call resolves to the placeholder instead of recursing. Failures are
//! propagated to whoever triggered the unpack; nothing is rolled back.

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use graphpack_types::{Document, ObjectId, ReferenceToken, TypeInfo, ISA_KEY};

use crate::builder::ObjectStoreBuilder;
use crate::catalog::TypeCatalog;
use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::handle::{ObjectHandle, TypeDescriptor};
use crate::object_registry::ObjectRegistry;
use crate::packable::{Packable, Shared};
use crate::type_registry::{TypeRegistry, UnresolvedType};

/// Identity-preserving object-graph store.
///
/// A store is meant for one pack or one unpack pass. Its registries only
/// grow: ids are never freed or reassigned while the store lives.
pub struct ObjectStore {
    config: StoreConfig,
    catalog: TypeCatalog,
    types: TypeRegistry,
    objects: ObjectRegistry,
    document: Option<Document>,
    pending: VecDeque<ObjectId>,
    unresolved: Vec<UnresolvedType>,
}

impl ObjectStore {
    /// An empty store with default configuration, ready to pack.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building a pre-seeded store.
    pub fn builder() -> ObjectStoreBuilder {
        ObjectStoreBuilder::new()
    }

    /// A store ready to unpack `document`, resolving its type table
    /// through `catalog`.
    pub fn from_document(document: Document, catalog: TypeCatalog) -> Self {
        Self::builder()
            .with_catalog(catalog)
            .with_document(document)
            .build()
    }

    pub(crate) fn from_parts(
        config: StoreConfig,
        catalog: TypeCatalog,
        types: TypeRegistry,
        objects: ObjectRegistry,
    ) -> Self {
        Self {
            config,
            catalog,
            types,
            objects,
            document: None,
            pending: VecDeque::new(),
            unresolved: Vec::new(),
        }
    }

    /// Attach a source document and merge its type table.
    pub(crate) fn load_document(&mut self, document: Document) {
        if document.version > self.config.format_version {
            warn!(
                document_version = document.version,
                supported = self.config.format_version,
                "document is newer than this format version"
            );
        }
        if let Some(table) = &document.types {
            let unresolved = self.types.load(table, &self.catalog);
            self.unresolved.extend(unresolved);
        }
        debug!(
            objects = document.objects.len(),
            unresolved = self.unresolved.len(),
            "document loaded"
        );
        self.document = Some(document);
    }

    /// Active configuration.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Types resolvable by qualified name.
    pub fn catalog(&self) -> &TypeCatalog {
        &self.catalog
    }

    /// The store's type registry.
    pub fn types(&self) -> &TypeRegistry {
        &self.types
    }

    /// The store's object registry.
    pub fn objects(&self) -> &ObjectRegistry {
        &self.objects
    }

    /// The source document, if the store was built with one.
    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Format version of the source document.
    pub fn document_version(&self) -> Option<u32> {
        self.document.as_ref().map(|doc| doc.version)
    }

    /// Type-table entries of the source document that could not be mapped
    /// to a live type.
    pub fn unresolved_types(&self) -> &[UnresolvedType] {
        &self.unresolved
    }

    // ---------------------------------------------------------------
    // Packing
    // ---------------------------------------------------------------

    /// Reference token for `object`, registering it (and its type) if new.
    pub fn reference_token(&mut self, handle: &ObjectHandle) -> ReferenceToken {
        let (id, fresh) = self.objects.register(handle);
        if fresh {
            self.pending.push_back(id.clone());
        }
        let descriptor = handle.descriptor();
        let token = ReferenceToken::new(id, self.types.register(descriptor));
        if self.config.reference_type_names {
            token.with_type_name(descriptor.short_name())
        } else {
            token
        }
    }

    /// JSON reference to `object`, for use inside [`Packable::pack`].
    pub fn make_reference<T: Packable>(&mut self, object: &Shared<T>) -> Value {
        self.reference_token(&ObjectHandle::new(object)).to_value()
    }

    /// JSON reference to a type-erased object.
    pub fn make_handle_reference(&mut self, handle: &ObjectHandle) -> Value {
        self.reference_token(handle).to_value()
    }

    /// Type marker for `T`, registering the type if new.
    pub fn describe_type<T: Packable>(&mut self, extended: bool) -> TypeInfo {
        self.types.describe(TypeDescriptor::of::<T>(), extended)
    }

    /// Pack the graph reachable from `root` into a document.
    pub fn pack<T: Packable>(&mut self, root: &Shared<T>) -> StoreResult<Document> {
        self.pack_handle(&ObjectHandle::new(root))
    }

    /// Pack the graph reachable from a type-erased root.
    ///
    /// Objects seeded through the builder are packed along with whatever
    /// the root reaches. A failed pack leaves no usable document.
    pub fn pack_handle(&mut self, root: &ObjectHandle) -> StoreResult<Document> {
        self.pending = self.objects.ids().into();
        let root_token = self.reference_token(root);

        let mut packed = HashSet::new();
        let mut objects = BTreeMap::new();

        while let Some(id) = self.pending.pop_front() {
            if !packed.insert(id.clone()) {
                continue;
            }
            if let Some(limit) = self.config.max_objects {
                if packed.len() > limit {
                    return Err(StoreError::BudgetExceeded { limit });
                }
            }
            let fields = self.pack_object(&id)?;
            objects.insert(id, fields);
        }

        let types: BTreeMap<_, _> = self
            .types
            .assigned_types()
            .into_iter()
            .map(|(id, descriptor)| (id, self.types.describe(descriptor, true)))
            .collect();
        let types = if types.is_empty() && !self.config.emit_empty_types {
            None
        } else {
            Some(types)
        };

        debug!(
            objects = objects.len(),
            types = types.as_ref().map_or(0, BTreeMap::len),
            "pack complete"
        );

        Ok(Document {
            version: self.config.format_version,
            root: root_token,
            objects,
            types,
        })
    }

    fn pack_object(&mut self, id: &ObjectId) -> StoreResult<Map<String, Value>> {
        let handle = self
            .objects
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::ObjectNotFound(id.clone()))?;

        let mut fields = Map::new();
        {
            let object = handle
                .packable()
                .try_borrow()
                .map_err(|_| StoreError::AlreadyBorrowed(id.clone()))?;
            object.pack(self, &mut fields)?;
        }

        let isa = self.types.describe(handle.descriptor(), false);
        fields.insert(ISA_KEY.into(), isa.to_value());
        debug!(object = %id, type_name = handle.descriptor().short_name(), "packed object");
        Ok(fields)
    }

    // ---------------------------------------------------------------
    // Field lookup
    // ---------------------------------------------------------------

    /// A packed field of object `id`, borrowed from the source document.
    pub fn field_ref(&self, id: &ObjectId, key: &str) -> Option<&Value> {
        self.document.as_ref()?.field(id, key)
    }

    /// A packed field of object `id`. Missing objects and missing keys are
    /// both `None`; whether that is an error is up to the caller.
    pub fn field(&self, id: &ObjectId, key: &str) -> Option<Value> {
        self.field_ref(id, key).cloned()
    }

    /// A packed field converted to `T`.
    pub fn field_as<T: DeserializeOwned>(&self, id: &ObjectId, key: &str) -> StoreResult<Option<T>> {
        self.field_ref(id, key)
            .map(|value| {
                T::deserialize(value).map_err(|e| StoreError::Serialization(format!("{id}.{key}: {e}")))
            })
            .transpose()
    }

    /// Whether the source document has an entry for `id`.
    pub fn has_object(&self, id: &ObjectId) -> bool {
        self.document
            .as_ref()
            .is_some_and(|doc| doc.object(id).is_some())
    }

    // ---------------------------------------------------------------
    // Reference resolution
    // ---------------------------------------------------------------

    /// Resolve `token` into a caller-supplied empty `instance`.
    ///
    /// If the referenced id is new, `instance` is bound to it and unpacked.
    /// If it is already bound, the existing object is returned instead,
    /// provided it is a `T`.
    pub fn unpack_reference<T: Packable>(
        &mut self,
        token: &Value,
        instance: Shared<T>,
    ) -> StoreResult<Shared<T>> {
        let token = parse_token(token)?;
        if let Some(existing) = self.objects.get(&token.object) {
            return downcast_existing(&token.object, existing);
        }
        self.unpack_into(token.object, ObjectHandle::new(&instance))?;
        Ok(instance)
    }

    /// Resolve `token`, building a new instance with `factory` if the
    /// referenced id has not been seen yet.
    ///
    /// Fails if the type id is unknown, if the factory produces nothing, or
    /// if the id is already bound to an object that is not a `T`.
    pub fn create_from_reference<T, F>(&mut self, token: &Value, factory: F) -> StoreResult<Shared<T>>
    where
        T: Packable,
        F: FnOnce(&TypeDescriptor) -> Option<Shared<T>>,
    {
        let token = parse_token(token)?;
        let descriptor = self.resolve_type(&token)?;
        if let Some(existing) = self.objects.get(&token.object) {
            return downcast_existing(&token.object, existing);
        }
        let instance = factory(&descriptor).ok_or_else(|| StoreError::FactoryFailed {
            id: token.object.clone(),
            type_name: descriptor.name(),
        })?;
        self.unpack_into(token.object, ObjectHandle::new(&instance))?;
        Ok(instance)
    }

    /// Type-erased form of [`create_from_reference`](Self::create_from_reference)
    /// for fields that may hold any packable type.
    pub fn create_handle_from_reference<F>(
        &mut self,
        token: &Value,
        factory: F,
    ) -> StoreResult<ObjectHandle>
    where
        F: FnOnce(&TypeDescriptor) -> Option<ObjectHandle>,
    {
        let token = parse_token(token)?;
        let descriptor = self.resolve_type(&token)?;
        if let Some(existing) = self.objects.get(&token.object) {
            return Ok(existing.clone());
        }
        let handle = factory(&descriptor).ok_or_else(|| StoreError::FactoryFailed {
            id: token.object.clone(),
            type_name: descriptor.name(),
        })?;
        self.unpack_into(token.object, handle.clone())?;
        Ok(handle)
    }

    /// Resolve `token` using the catalog's constructor for its type.
    pub fn instantiate_from_reference(&mut self, token: &Value) -> StoreResult<ObjectHandle> {
        let parsed = parse_token(token)?;
        let descriptor = self.resolve_type(&parsed)?;
        let constructor = self.catalog.constructor(&descriptor);
        self.create_handle_from_reference(token, move |_| constructor.map(|build| build()))
    }

    // ---------------------------------------------------------------
    // Root
    // ---------------------------------------------------------------

    /// Unpack the document root into `instance`.
    pub fn unpack_root<T: Packable>(&mut self, instance: Shared<T>) -> StoreResult<Shared<T>> {
        let root = self.root_token()?;
        self.unpack_reference(&root, instance)
    }

    /// Unpack the document root, building it with `factory`.
    pub fn create_root<T, F>(&mut self, factory: F) -> StoreResult<Shared<T>>
    where
        T: Packable,
        F: FnOnce(&TypeDescriptor) -> Option<Shared<T>>,
    {
        let root = self.root_token()?;
        self.create_from_reference(&root, factory)
    }

    /// Unpack the document root using the catalog's constructor.
    pub fn instantiate_root(&mut self) -> StoreResult<ObjectHandle> {
        let root = self.root_token()?;
        self.instantiate_from_reference(&root)
    }

    fn root_token(&self) -> StoreResult<Value> {
        self.document
            .as_ref()
            .map(|doc| doc.root.to_value())
            .ok_or(StoreError::NoDocument)
    }

    fn resolve_type(&self, token: &ReferenceToken) -> StoreResult<TypeDescriptor> {
        self.types
            .resolve(&token.type_id)
            .ok_or_else(|| StoreError::UnknownType(token.type_id.clone()))
    }

    // Placeholder registration happens before `unpack` so cycles through
    // this object find it already bound.
    fn unpack_into(&mut self, id: ObjectId, handle: ObjectHandle) -> StoreResult<()> {
        self.objects.register_at(id.clone(), handle.clone());
        let mut object = handle
            .packable()
            .try_borrow_mut()
            .map_err(|_| StoreError::AlreadyBorrowed(id.clone()))?;
        debug!(object = %id, type_name = handle.descriptor().short_name(), "unpacking object");
        object.unpack(self, &id)
    }
}

impl Default for ObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("objects", &self.objects.len())
            .field("has_document", &self.document.is_some())
            .field("unresolved_types", &self.unresolved.len())
            .finish()
    }
}

fn parse_token(value: &Value) -> StoreResult<ReferenceToken> {
    ReferenceToken::from_value(value).map_err(StoreError::MalformedReference)
}

fn downcast_existing<T: Packable>(id: &ObjectId, existing: &ObjectHandle) -> StoreResult<Shared<T>> {
    existing
        .downcast::<T>()
        .ok_or_else(|| StoreError::TypeConflict {
            id: id.clone(),
            expected: std::any::type_name::<T>(),
            actual: existing.descriptor().name(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packable::shared;
    use graphpack_types::TypeId;
    use proptest::prelude::*;
    use serde_json::json;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;
    use std::rc::Rc;

    thread_local! {
        static NODE_UNPACKS: Cell<usize> = const { Cell::new(0) };
    }

    /// A graph node with an optional link and an ordered child list.
    #[derive(Debug, Default)]
    struct Node {
        name: String,
        next: Option<Shared<Node>>,
        children: Vec<Shared<Node>>,
    }

    impl Node {
        fn named(name: &str) -> Shared<Node> {
            shared(Node {
                name: name.to_string(),
                ..Default::default()
            })
        }
    }

    impl Packable for Node {
        fn pack(&self, store: &mut ObjectStore, out: &mut Map<String, Value>) -> StoreResult<()> {
            out.insert("name".into(), json!(self.name));
            if let Some(next) = &self.next {
                out.insert("next".into(), store.make_reference(next));
            }
            let children: Vec<Value> = self
                .children
                .iter()
                .map(|child| store.make_reference(child))
                .collect();
            out.insert("children".into(), Value::Array(children));
            Ok(())
        }

        fn unpack(&mut self, store: &mut ObjectStore, id: &ObjectId) -> StoreResult<()> {
            NODE_UNPACKS.with(|count| count.set(count.get() + 1));
            self.name = store.field_as(id, "name")?.unwrap_or_default();
            if let Some(token) = store.field(id, "next") {
                self.next = Some(store.create_from_reference(&token, |_| Some(shared(Node::default())))?);
            }
            if let Some(Value::Array(items)) = store.field(id, "children") {
                for item in &items {
                    let child = store.create_from_reference(item, |_| Some(shared(Node::default())))?;
                    self.children.push(child);
                }
            }
            Ok(())
        }
    }

    /// A field-less object, used as a built-in root type.
    #[derive(Default)]
    struct Marker;

    impl Packable for Marker {
        fn pack(&self, _: &mut ObjectStore, _: &mut Map<String, Value>) -> StoreResult<()> {
            Ok(())
        }

        fn unpack(&mut self, _: &mut ObjectStore, _: &ObjectId) -> StoreResult<()> {
            Ok(())
        }
    }

    /// A leaf with a scalar payload.
    #[derive(Debug, Default)]
    struct Gem {
        carats: u32,
    }

    impl Packable for Gem {
        fn pack(&self, _: &mut ObjectStore, out: &mut Map<String, Value>) -> StoreResult<()> {
            out.insert("carats".into(), json!(self.carats));
            Ok(())
        }

        fn unpack(&mut self, store: &mut ObjectStore, id: &ObjectId) -> StoreResult<()> {
            self.carats = store.field_as(id, "carats")?.unwrap_or_default();
            Ok(())
        }
    }

    /// Holds a required gem and a list of arbitrary packables.
    #[derive(Default)]
    struct Chest {
        gem: Shared<Gem>,
        loot: Vec<ObjectHandle>,
    }

    impl Packable for Chest {
        fn pack(&self, store: &mut ObjectStore, out: &mut Map<String, Value>) -> StoreResult<()> {
            out.insert("gem".into(), store.make_reference(&self.gem));
            let loot: Vec<Value> = self
                .loot
                .iter()
                .map(|item| store.make_handle_reference(item))
                .collect();
            out.insert("loot".into(), Value::Array(loot));
            Ok(())
        }

        fn unpack(&mut self, store: &mut ObjectStore, id: &ObjectId) -> StoreResult<()> {
            let token = store
                .field(id, "gem")
                .ok_or_else(|| StoreError::ObjectNotFound(id.clone()))?;
            self.gem = store.unpack_reference(&token, self.gem.clone())?;
            if let Some(Value::Array(items)) = store.field(id, "loot") {
                for item in &items {
                    self.loot.push(store.instantiate_from_reference(item)?);
                }
            }
            Ok(())
        }
    }

    /// Two objects pointing at each other, resolved into fresh instances.
    #[derive(Debug, Default)]
    struct Pair {
        label: String,
        other: Option<Shared<Pair>>,
    }

    impl Packable for Pair {
        fn pack(&self, store: &mut ObjectStore, out: &mut Map<String, Value>) -> StoreResult<()> {
            out.insert("label".into(), json!(self.label));
            if let Some(other) = &self.other {
                out.insert("other".into(), store.make_reference(other));
            }
            Ok(())
        }

        fn unpack(&mut self, store: &mut ObjectStore, id: &ObjectId) -> StoreResult<()> {
            self.label = store.field_as(id, "label")?.unwrap_or_default();
            if let Some(token) = store.field(id, "other") {
                self.other = Some(store.unpack_reference(&token, shared(Pair::default()))?);
            }
            Ok(())
        }
    }

    fn catalog() -> TypeCatalog {
        let mut catalog = TypeCatalog::new();
        catalog
            .register::<Pair>()
            .register::<Node>()
            .register::<Gem>()
            .register::<Chest>()
            .register::<Marker>();
        catalog
    }

    fn reload(document: &Document) -> ObjectStore {
        let text = document.to_json_string().unwrap();
        ObjectStore::from_document(Document::from_json_str(&text).unwrap(), catalog())
    }

    fn round_trip(root: &Shared<Node>) -> Shared<Node> {
        let document = ObjectStore::new().pack(root).unwrap();
        reload(&document)
            .create_root(|_| Some(shared(Node::default())))
            .unwrap()
    }

    /// Walk both graphs in lockstep and check the pairing is a bijection.
    fn assert_isomorphic(original: &Shared<Node>, restored: &Shared<Node>) {
        let mut forward: HashMap<*const RefCell<Node>, *const RefCell<Node>> = HashMap::new();
        let mut backward: HashMap<*const RefCell<Node>, *const RefCell<Node>> = HashMap::new();
        let mut queue = VecDeque::from([(original.clone(), restored.clone())]);

        while let Some((a, b)) = queue.pop_front() {
            let (pa, pb) = (Rc::as_ptr(&a), Rc::as_ptr(&b));
            if let Some(&seen) = forward.get(&pa) {
                assert_eq!(seen, pb, "one original maps to two restored nodes");
                continue;
            }
            assert!(
                backward.insert(pb, pa).is_none(),
                "two originals map to one restored node"
            );
            forward.insert(pa, pb);

            let (a_node, b_node) = (a.borrow(), b.borrow());
            assert_eq!(a_node.name, b_node.name);
            assert_eq!(a_node.children.len(), b_node.children.len());
            assert_eq!(a_node.next.is_some(), b_node.next.is_some());
            for (x, y) in a_node.children.iter().zip(&b_node.children) {
                queue.push_back((x.clone(), y.clone()));
            }
            if let (Some(x), Some(y)) = (&a_node.next, &b_node.next) {
                queue.push_back((x.clone(), y.clone()));
            }
        }
    }

    // -----------------------------------------------------------------------
    // Document shape
    // -----------------------------------------------------------------------

    #[test]
    fn empty_builtin_root_document() {
        let mut store = ObjectStore::builder()
            .with_builtin::<Marker>("root")
            .build();
        let document = store.pack(&shared(Marker)).unwrap();
        assert_eq!(
            document.to_value().unwrap(),
            json!({
                "version": 2,
                "root": {"ref": "1", "type": "root"},
                "objects": {"1": {"isa": {"type": "root"}}}
            })
        );
    }

    #[test]
    fn child_of_assigned_type_is_listed_in_types() {
        let chest = shared(Chest {
            gem: shared(Gem { carats: 3 }),
            loot: Vec::new(),
        });
        let mut store = ObjectStore::builder()
            .with_builtin::<Chest>("chest")
            .build();
        let document = store.pack(&chest).unwrap();

        assert_eq!(document.objects.len(), 2);
        assert!(document.object(&ObjectId::from("1")).is_some());
        assert_eq!(
            document.field(&ObjectId::from("2"), "carats"),
            Some(&json!(3))
        );
        let types = document.types.as_ref().expect("gem type is not built in");
        assert_eq!(types.len(), 1);
        let gem_type = &types[&TypeId::from("1")];
        assert_eq!(gem_type.fullname.as_deref(), Some(std::any::type_name::<Gem>()));
        // `isa` never carries the qualified name.
        assert_eq!(
            document.isa(&ObjectId::from("2")),
            Some(TypeInfo::short(TypeId::from("1")))
        );
    }

    #[test]
    fn builtin_types_never_reach_the_type_table() {
        let root = Node::named("root");
        for i in 0..5 {
            root.borrow_mut().children.push(Node::named(&format!("child-{i}")));
        }
        let mut store = ObjectStore::builder().with_builtin::<Node>("node").build();
        let document = store.pack(&root).unwrap();
        assert_eq!(document.objects.len(), 6);
        assert!(document.types.is_none());
    }

    #[test]
    fn debug_config_adds_type_names_and_empty_table() {
        let root = Node::named("solo");
        let mut store = ObjectStore::builder()
            .with_config(StoreConfig::debug())
            .with_builtin::<Node>("node")
            .build();
        let document = store.pack(&root).unwrap();
        assert_eq!(document.root.type_name.as_deref(), Some("Node"));
        assert_eq!(document.types, Some(BTreeMap::new()));
    }

    #[test]
    fn packed_documents_are_closed() {
        let root = Node::named("root");
        let a = Node::named("a");
        let b = Node::named("b");
        a.borrow_mut().next = Some(b.clone());
        b.borrow_mut().children.push(root.clone());
        root.borrow_mut().children.push(a);
        let document = ObjectStore::new().pack(&root).unwrap();
        assert!(document.missing_objects().is_empty());
        assert!(document.unreachable_objects().is_empty());
    }

    // -----------------------------------------------------------------------
    // Identity and cycles
    // -----------------------------------------------------------------------

    #[test]
    fn shared_child_packs_once() {
        let root = Node::named("root");
        let shared_child = Node::named("shared");
        root.borrow_mut().children.push(shared_child.clone());
        root.borrow_mut().children.push(shared_child.clone());
        root.borrow_mut().next = Some(shared_child);

        let document = ObjectStore::new().pack(&root).unwrap();
        assert_eq!(document.objects.len(), 2);
        assert_eq!(
            document.field(&ObjectId::from("1"), "children"),
            Some(&json!([{"ref": "2", "type": "1"}, {"ref": "2", "type": "1"}]))
        );
    }

    #[test]
    fn shared_child_round_trips_to_one_object() {
        let root = Node::named("root");
        let shared_child = Node::named("shared");
        root.borrow_mut().children.push(shared_child.clone());
        root.borrow_mut().children.push(shared_child);

        let restored = round_trip(&root);
        let restored = restored.borrow();
        assert!(Rc::ptr_eq(&restored.children[0], &restored.children[1]));
        assert_eq!(restored.children[0].borrow().name, "shared");
    }

    #[test]
    fn equal_but_distinct_objects_stay_distinct() {
        let root = Node::named("root");
        root.borrow_mut().children.push(Node::named("twin"));
        root.borrow_mut().children.push(Node::named("twin"));

        let restored = round_trip(&root);
        let restored = restored.borrow();
        assert!(!Rc::ptr_eq(&restored.children[0], &restored.children[1]));
    }

    #[test]
    fn two_cycle_round_trips() {
        let a = Node::named("a");
        let b = Node::named("b");
        a.borrow_mut().next = Some(b.clone());
        b.borrow_mut().next = Some(a.clone());

        let restored_a = round_trip(&a);
        let restored_b = restored_a.borrow().next.clone().expect("a links to b");
        assert_eq!(restored_b.borrow().name, "b");
        let back = restored_b.borrow().next.clone().expect("b links to a");
        assert!(Rc::ptr_eq(&back, &restored_a));
    }

    #[test]
    fn supplied_instances_close_a_cycle() {
        let a = shared(Pair {
            label: "a".into(),
            other: None,
        });
        let b = shared(Pair {
            label: "b".into(),
            other: Some(a.clone()),
        });
        a.borrow_mut().other = Some(b);
        let document = ObjectStore::new().pack(&a).unwrap();

        let target = shared(Pair::default());
        let restored_a = reload(&document).unpack_root(target.clone()).unwrap();
        assert!(Rc::ptr_eq(&restored_a, &target));

        let restored_b = restored_a.borrow().other.clone().expect("a links to b");
        assert_eq!(restored_b.borrow().label, "b");
        let back = restored_b.borrow().other.clone().expect("b links to a");
        assert!(Rc::ptr_eq(&back, &restored_a));
        assert_eq!(back.borrow().label, "a");
    }

    #[test]
    fn self_reference_round_trips() {
        let node = Node::named("loop");
        node.borrow_mut().next = Some(node.clone());
        let restored = round_trip(&node);
        let next = restored.borrow().next.clone().unwrap();
        assert!(Rc::ptr_eq(&next, &restored));
    }

    #[test]
    fn deep_chain_packs_without_truncation() {
        let root = Node::named("0");
        let mut tail = root.clone();
        for i in 1..1000 {
            let next = Node::named(&i.to_string());
            tail.borrow_mut().next = Some(next.clone());
            tail = next;
        }
        let document = ObjectStore::new().pack(&root).unwrap();
        assert_eq!(document.objects.len(), 1000);
        assert!(document.missing_objects().is_empty());
    }

    #[test]
    fn chain_round_trips() {
        let root = Node::named("0");
        let mut tail = root.clone();
        for i in 1..50 {
            let next = Node::named(&i.to_string());
            tail.borrow_mut().next = Some(next.clone());
            tail = next;
        }
        let restored = round_trip(&root);
        assert_isomorphic(&root, &restored);
    }

    #[test]
    fn budget_is_reported_not_truncated() {
        let root = Node::named("root");
        for i in 0..3 {
            root.borrow_mut().children.push(Node::named(&i.to_string()));
        }
        let mut store = ObjectStore::builder()
            .with_config(StoreConfig::default().with_max_objects(2))
            .build();
        let err = store.pack(&root).unwrap_err();
        assert!(matches!(err, StoreError::BudgetExceeded { limit: 2 }));
    }

    #[test]
    fn repeated_packing_is_stable() {
        let root = Node::named("root");
        root.borrow_mut().children.push(Node::named("child"));

        let mut store = ObjectStore::new();
        let first = store.make_reference(&root);
        let second = store.make_reference(&root);
        assert_eq!(first, second);

        let doc_a = store.pack(&root).unwrap();
        let doc_b = store.pack(&root).unwrap();
        assert_eq!(doc_a.root, doc_b.root);
        assert_eq!(doc_a.objects, doc_b.objects);
        assert_eq!(
            store.describe_type::<Node>(false),
            TypeInfo::short(doc_a.root.type_id.clone())
        );
    }

    #[test]
    fn borrowed_object_fails_pack() {
        let root = Node::named("root");
        let _guard = root.borrow_mut();
        let err = ObjectStore::new().pack(&root).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyBorrowed(_)));
    }

    // -----------------------------------------------------------------------
    // Resolution
    // -----------------------------------------------------------------------

    #[test]
    fn re_resolution_returns_same_object_without_unpacking_again() {
        let root = Node::named("root");
        root.borrow_mut().children.push(Node::named("child"));
        let document = ObjectStore::new().pack(&root).unwrap();
        let mut store = reload(&document);
        let token = document.root.to_value();

        NODE_UNPACKS.with(|count| count.set(0));
        let first = store
            .create_from_reference(&token, |_| Some(shared(Node::default())))
            .unwrap();
        let unpacks = NODE_UNPACKS.with(Cell::get);
        assert_eq!(unpacks, 2);

        let second = store
            .create_from_reference(&token, |_| Some(shared(Node::default())))
            .unwrap();
        let third = store.unpack_reference(&token, Node::named("unused")).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert!(Rc::ptr_eq(&first, &third));
        assert_eq!(NODE_UNPACKS.with(Cell::get), unpacks);
    }

    #[test]
    fn unpack_reference_fills_the_given_instance() {
        let chest = shared(Chest {
            gem: shared(Gem { carats: 7 }),
            loot: Vec::new(),
        });
        let document = ObjectStore::new().pack(&chest).unwrap();

        let target = shared(Chest::default());
        let restored = reload(&document).unpack_root(target.clone()).unwrap();
        assert!(Rc::ptr_eq(&restored, &target));
        assert_eq!(restored.borrow().gem.borrow().carats, 7);
    }

    #[test]
    fn polymorphic_fields_use_the_catalog() {
        let gem = shared(Gem { carats: 2 });
        let chest = shared(Chest {
            gem: gem.clone(),
            loot: vec![
                ObjectHandle::new(&gem),
                ObjectHandle::new(&Node::named("map")),
                ObjectHandle::from_value(Marker),
            ],
        });
        let document = ObjectStore::new().pack(&chest).unwrap();
        assert_eq!(document.types.as_ref().map(BTreeMap::len), Some(4));

        let handle = reload(&document).instantiate_root().unwrap();
        let restored = handle.downcast::<Chest>().expect("root is a chest");
        let restored = restored.borrow();
        assert_eq!(restored.loot.len(), 3);
        let loot_gem = restored.loot[0].downcast::<Gem>().expect("first loot is the gem");
        assert!(Rc::ptr_eq(&loot_gem, &restored.gem));
        assert_eq!(
            restored.loot[1].downcast::<Node>().unwrap().borrow().name,
            "map"
        );
        assert!(restored.loot[2].is::<Marker>());
    }

    #[test]
    fn conflicting_expectations_fail() {
        let root = Node::named("root");
        let document = ObjectStore::new().pack(&root).unwrap();
        let mut store = reload(&document);
        let token = document.root.to_value();
        store
            .create_from_reference(&token, |_| Some(shared(Node::default())))
            .unwrap();

        let err = store
            .create_from_reference(&token, |_| Some(shared(Gem::default())))
            .unwrap_err();
        assert!(matches!(err, StoreError::TypeConflict { .. }));
        let err = store
            .unpack_reference(&token, shared(Gem::default()))
            .unwrap_err();
        assert!(matches!(err, StoreError::TypeConflict { .. }));
    }

    #[test]
    fn malformed_references_fail_cleanly() {
        let mut store = ObjectStore::new();
        for bad in [json!(42), json!(null), json!({"ref": "1"}), json!({"type": "1"})] {
            let err = store
                .create_from_reference(&bad, |_| Some(shared(Node::default())))
                .unwrap_err();
            assert!(matches!(err, StoreError::MalformedReference(_)));
        }
        let err = store.unpack_reference(&json!("1"), Node::named("x")).unwrap_err();
        assert!(matches!(err, StoreError::MalformedReference(_)));
    }

    #[test]
    fn factory_failure_is_reported() {
        let document = ObjectStore::new().pack(&Node::named("root")).unwrap();
        let mut store = reload(&document);
        let err = store.create_root::<Node, _>(|_| None).unwrap_err();
        assert!(matches!(err, StoreError::FactoryFailed { .. }));
        assert!(store.objects().is_empty());
    }

    #[test]
    fn factory_sees_the_resolved_type() {
        let document = ObjectStore::new().pack(&Node::named("root")).unwrap();
        let mut store = reload(&document);
        let mut seen = None;
        store
            .create_root(|descriptor| {
                seen = Some(*descriptor);
                Some(shared(Node::default()))
            })
            .unwrap();
        assert_eq!(seen, Some(TypeDescriptor::of::<Node>()));
    }

    #[test]
    fn unpack_without_document_fails() {
        let mut store = ObjectStore::new();
        assert!(matches!(
            store.instantiate_root().unwrap_err(),
            StoreError::NoDocument
        ));
        assert_eq!(store.field(&ObjectId::from("1"), "name"), None);
        assert!(!store.has_object(&ObjectId::from("1")));
    }

    #[test]
    fn field_lookup_reports_absence() {
        let document = ObjectStore::new().pack(&Node::named("root")).unwrap();
        let store = reload(&document);
        let root = ObjectId::from("1");
        assert!(store.has_object(&root));
        assert_eq!(store.field_as::<String>(&root, "name").unwrap().as_deref(), Some("root"));
        assert_eq!(store.field(&root, "next"), None);
        assert_eq!(store.field(&ObjectId::from("99"), "name"), None);
        assert!(matches!(
            store.field_as::<u32>(&root, "name"),
            Err(StoreError::Serialization(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Version compatibility
    // -----------------------------------------------------------------------

    #[test]
    fn renamed_type_id_resolves() {
        let document = Document::from_value(json!({
            "version": 1,
            "root": {"ref": "1", "type": "7"},
            "objects": {"1": {"carats": 9, "isa": {"type": "7"}}},
            "types": {"7": {"type": "7", "fullname": "old_game::Gemstone"}}
        }))
        .unwrap();
        let mut store = ObjectStore::builder()
            .with_catalog(catalog())
            .with_builtin::<Gem>("gem")
            .with_type_renames([("7", "gem")])
            .with_document(document)
            .build();

        assert!(store.unresolved_types().is_empty());
        let gem = store.create_root(|_| Some(shared(Gem::default()))).unwrap();
        assert_eq!(gem.borrow().carats, 9);
    }

    #[test]
    fn foreign_ids_resolve_by_name() {
        let document = Document::from_value(json!({
            "version": 2,
            "root": {"ref": "1", "type": "42"},
            "objects": {"1": {"carats": 4, "isa": {"type": "42"}}},
            "types": {"42": {"type": "42", "fullname": std::any::type_name::<Gem>()}}
        }))
        .unwrap();
        let mut store = ObjectStore::from_document(document, catalog());
        assert_eq!(store.document_version(), Some(2));
        let handle = store.instantiate_root().unwrap();
        assert_eq!(handle.downcast::<Gem>().unwrap().borrow().carats, 4);
    }

    #[test]
    fn unresolvable_type_is_skipped_with_a_diagnostic() {
        let document = Document::from_value(json!({
            "version": 2,
            "root": {"ref": "1", "type": "1"},
            "objects": {"1": {"isa": {"type": "1"}}},
            "types": {"1": {"type": "1", "fullname": "garbage::Nothing"}}
        }))
        .unwrap();
        let mut store = ObjectStore::from_document(document, catalog());

        assert_eq!(store.unresolved_types().len(), 1);
        assert_eq!(
            store.unresolved_types()[0].fullname.as_deref(),
            Some("garbage::Nothing")
        );
        let err = store
            .create_root(|_| Some(shared(Node::default())))
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownType(id) if id.as_str() == "1"));
    }

    #[test]
    fn malformed_type_entries_are_skipped() {
        let document = Document::from_value(json!({
            "version": 2,
            "root": {"ref": "1", "type": "1"},
            "objects": {"1": {"carats": 6, "isa": {"type": "1"}}},
            "types": {
                "1": {"type": "1", "fullname": std::any::type_name::<Gem>()},
                "2": {"type": "2", "fullname": 5},
                "3": {"fullname": "garbage::Nothing"},
                "4": null
            }
        }))
        .unwrap();
        let mut store = ObjectStore::from_document(document, catalog());

        let unresolved: Vec<&str> = store
            .unresolved_types()
            .iter()
            .map(|entry| entry.type_id.as_str())
            .collect();
        assert_eq!(unresolved, vec!["2", "3", "4"]);
        assert_eq!(
            store.unresolved_types()[1].fullname.as_deref(),
            Some("garbage::Nothing")
        );

        let gem = store.create_root(|_| Some(shared(Gem::default()))).unwrap();
        assert_eq!(gem.borrow().carats, 6);
        let err = store
            .create_from_reference(&json!({"ref": "9", "type": "3"}), |_| {
                Some(shared(Gem::default()))
            })
            .unwrap_err();
        assert!(matches!(err, StoreError::UnknownType(id) if id.as_str() == "3"));
    }

    #[test]
    fn legacy_prefixed_document_unpacks() {
        let text = format!(
            r#"{{
                "version": 1,
                "root": {{"ref": "o:1", "type": "t:1"}},
                "objects": {{
                    "o:1": {{"name": "old", "next": {{"ref": "o:1", "type": "t:1"}}, "isa": {{"type": "t:1"}}}}
                }},
                "types": {{"t:1": {{"type": "t:1", "fullname": "{}"}}}}
            }}"#,
            std::any::type_name::<Node>()
        );
        let mut store = ObjectStore::from_document(Document::from_json_str(&text).unwrap(), catalog());
        let node = store.create_root(|_| Some(shared(Node::default()))).unwrap();
        assert_eq!(node.borrow().name, "old");
        let next = node.borrow().next.clone().unwrap();
        assert!(Rc::ptr_eq(&next, &node));
    }

    // -----------------------------------------------------------------------
    // Random graphs
    // -----------------------------------------------------------------------

    fn graph_strategy() -> impl Strategy<Value = (usize, Vec<(usize, usize)>, Vec<Option<usize>>)> {
        (1usize..10).prop_flat_map(|n| {
            (
                Just(n),
                proptest::collection::vec((0..n, 0..n), 0..24),
                proptest::collection::vec(proptest::option::of(0..n), n),
            )
        })
    }

    proptest! {
        #[test]
        fn random_graphs_round_trip_isomorphically((n, edges, links) in graph_strategy()) {
            let nodes: Vec<Shared<Node>> = (0..n).map(|i| Node::named(&format!("node-{i}"))).collect();
            for (from, to) in edges {
                nodes[from].borrow_mut().children.push(nodes[to].clone());
            }
            for (from, link) in links.into_iter().enumerate() {
                nodes[from].borrow_mut().next = link.map(|to| nodes[to].clone());
            }

            let document = ObjectStore::new().pack(&nodes[0]).unwrap();
            prop_assert!(document.missing_objects().is_empty());

            let restored = reload(&document)
                .create_root(|_| Some(shared(Node::default())))
                .unwrap();
            assert_isomorphic(&nodes[0], &restored);
        }
    }
}
