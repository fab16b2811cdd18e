//! The [`Packable`] capability implemented by every serializable object.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use serde_json::{Map, Value};

use graphpack_types::ObjectId;

use crate::error::StoreResult;
use crate::store::ObjectStore;

/// Shared, mutable handle to a domain object.
///
/// Object identity is the identity of the `Rc` allocation: two handles name
/// the same object iff `Rc::ptr_eq` holds.
pub type Shared<T> = Rc<RefCell<T>>;

/// Wrap a value in a fresh [`Shared`] handle.
pub fn shared<T>(value: T) -> Shared<T> {
    Rc::new(RefCell::new(value))
}

/// A domain object that can write its state into a packed field map and
/// restore it later.
///
/// Fields that hold other objects go through the store:
/// [`ObjectStore::make_reference`] when packing and one of the
/// `*_from_reference` methods when unpacking. The engine registers an
/// object under its id *before* calling `unpack`, so a back-reference to the
/// object being unpacked resolves to the same handle instead of recursing.
pub trait Packable: Any {
    /// Write serializable state into `out`. The engine adds the `isa` key.
    fn pack(&self, store: &mut ObjectStore, out: &mut Map<String, Value>) -> StoreResult<()>;

    /// Restore state from the fields previously packed under `id`.
    fn unpack(&mut self, store: &mut ObjectStore, id: &ObjectId) -> StoreResult<()>;
}
