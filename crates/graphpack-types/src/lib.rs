//! Foundation types for graphpack.
//!
//! This crate provides the identifier and document types shared by the
//! packing engine and by tooling that reads saved documents. It has no
//! knowledge of live objects; it only describes what a packed graph looks
//! like on disk.
//!
//! # Key Types
//!
//! - [`ObjectId`] -- per-document identifier naming one packed object
//! - [`TypeId`] -- per-document identifier naming one concrete type
//! - [`ReferenceToken`] -- the `{ "ref", "type" }` link between objects
//! - [`TypeInfo`] -- the `isa` marker and type-table entry
//! - [`Document`] -- the versioned root aggregate

pub mod document;
pub mod error;
pub mod id;
pub mod token;

pub use document::{collect_references, Document, FORMAT_VERSION, ISA_KEY};
pub use error::TypeError;
pub use id::{ObjectId, TypeId};
pub use token::{ReferenceToken, TypeInfo};
