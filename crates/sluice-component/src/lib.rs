//! Sluice component contract.
//!
//! This crate defines the surface a unit of work must expose to be wired
//! into a sluice graph: a declared table of named, typed input and output
//! fields, by-name access to their values, and a single entry point.
//!
//! Components register their field table at construction time; the engine
//! works exclusively from that table and never inspects the object behind
//! it.

mod component;
mod error;
mod field;

pub use component::{Component, Fields, SharedComponent, SharedFields};
pub use error::{ComponentFault, FieldError};
pub use field::{Direction, FieldSpec, FieldType};
