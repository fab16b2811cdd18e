use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

use crate::packable::{Packable, Shared};

/// Runtime descriptor of a concrete packable type.
///
/// Descriptors compare by the Rust type they describe. The name is the
/// fully-qualified `std::any::type_name`, which is what gets written to the
/// document type table.
#[derive(Clone, Copy)]
pub struct TypeDescriptor {
    key: std::any::TypeId,
    name: &'static str,
}

impl TypeDescriptor {
    pub fn of<T: Packable>() -> Self {
        Self {
            key: std::any::TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    pub fn key(&self) -> std::any::TypeId {
        self.key
    }

    /// Fully-qualified type name.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Last path segment of the name, without generic arguments.
    pub fn short_name(&self) -> &'static str {
        let base = match self.name.find('<') {
            Some(idx) => &self.name[..idx],
            None => self.name,
        };
        base.rsplit("::").next().unwrap_or(base)
    }

    pub fn is<T: Packable>(&self) -> bool {
        self.key == std::any::TypeId::of::<T>()
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for TypeDescriptor {}

impl Hash for TypeDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeDescriptor({})", self.name)
    }
}

/// Stable surrogate key for an object's identity: the address of its
/// shared allocation. Valid while any handle to the object is alive, which
/// the object registry guarantees for the lifetime of a store.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Identity(usize);

/// Type-erased handle to a packable object.
///
/// Keeps two views of the same allocation: one for dynamic dispatch of
/// `pack`/`unpack`, one for downcasting back to the concrete type.
#[derive(Clone)]
pub struct ObjectHandle {
    any: Rc<dyn Any>,
    packable: Rc<RefCell<dyn Packable>>,
    descriptor: TypeDescriptor,
}

impl ObjectHandle {
    pub fn new<T: Packable>(object: &Shared<T>) -> Self {
        let any: Rc<dyn Any> = object.clone();
        let packable: Rc<RefCell<dyn Packable>> = object.clone();
        Self {
            any,
            packable,
            descriptor: TypeDescriptor::of::<T>(),
        }
    }

    /// Wrap a plain value in a fresh handle.
    pub fn from_value<T: Packable>(value: T) -> Self {
        Self::new(&crate::packable::shared(value))
    }

    pub fn descriptor(&self) -> TypeDescriptor {
        self.descriptor
    }

    pub fn identity(&self) -> Identity {
        Identity(Rc::as_ptr(&self.any) as *const () as usize)
    }

    /// Returns `true` if both handles name the same object.
    pub fn ptr_eq(&self, other: &ObjectHandle) -> bool {
        self.identity() == other.identity()
    }

    pub fn is<T: Packable>(&self) -> bool {
        self.descriptor.is::<T>()
    }

    /// Recover the concrete handle, if the object is a `T`.
    pub fn downcast<T: Packable>(&self) -> Option<Shared<T>> {
        Rc::downcast::<RefCell<T>>(self.any.clone()).ok()
    }

    pub(crate) fn packable(&self) -> &Rc<RefCell<dyn Packable>> {
        &self.packable
    }
}

impl<T: Packable> From<&Shared<T>> for ObjectHandle {
    fn from(object: &Shared<T>) -> Self {
        Self::new(object)
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectHandle")
            .field("type", &self.descriptor.name())
            .field("identity", &self.identity())
            .finish()
    }
}
