//! Opaque runtime-collaborator interface for the Avalanche compiler.
//!
//! The compiler treats the dynamically-typed value/string/list/map runtime,
//! the LLVM backend, and the bootstrap drivers as external collaborators. This
//! crate names only the surface the compiler actually touches: converting a
//! constant literal to a runtime value, parsing a function prototype spec, and
//! describing a struct's fields for the global cross-reference check. There is
//! no interpreter and no code generator here.
//!
//! # Modules
//!
//! - `value`: `RuntimeValue`, `RuntimeList`, `RuntimeMap` traits
//! - `prototype`: `FunctionPrototype` parsing (`"1 arg1 arg2 ..."`)
//! - `structdef`: `StructDescriptor`, `FieldKind`
//! - `testvalue` (feature `testvalue`): a minimal in-memory implementation
//!   used only by the compiler crate's own tests

pub mod prototype;
pub mod structdef;
pub mod value;

#[cfg(feature = "testvalue")]
pub mod testvalue;

pub use prototype::{ArgumentBinding, BindingKind, FunctionPrototype, PrototypeError};
pub use structdef::{FieldKind, StructDescriptor, StructField};
pub use value::{RuntimeList, RuntimeMap, RuntimeValue};
