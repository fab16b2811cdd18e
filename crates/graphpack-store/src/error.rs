use graphpack_types::{ObjectId, TypeError, TypeId};

/// Errors from packing and unpacking.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A value expected to be a `{ref, type}` token is not one.
    #[error("malformed reference: {0}")]
    MalformedReference(TypeError),

    /// A type id resolves through none of the built-in, assigned, or
    /// renamed tables.
    #[error("unknown type id: {0}")]
    UnknownType(TypeId),

    /// An object id is already bound to an instance of another type.
    #[error("object {id} is a {actual}, expected {expected}")]
    TypeConflict {
        id: ObjectId,
        expected: &'static str,
        actual: &'static str,
    },

    /// The construction function produced no instance.
    #[error("factory produced no instance for object {id} of type {type_name}")]
    FactoryFailed {
        id: ObjectId,
        type_name: &'static str,
    },

    /// An object id named by a reference is not registered.
    #[error("object not found: {0}")]
    ObjectNotFound(ObjectId),

    /// The store was built without a source document.
    #[error("store has no document to unpack")]
    NoDocument,

    /// An object was already borrowed when the engine needed it.
    #[error("object {0} is already borrowed")]
    AlreadyBorrowed(ObjectId),

    /// Packing discovered more objects than the configured budget allows.
    #[error("packing budget of {limit} objects exceeded")]
    BudgetExceeded { limit: usize },

    /// A field value could not be converted.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
