//! The collaborator contract: field access plus an entry point.

use std::sync::{Arc, Mutex};

use serde_json::Value;

use crate::error::{ComponentFault, FieldError};
use crate::field::FieldSpec;

/// By-name access to an object's declared fields.
///
/// Implementors expose a fixed field table; the table must not change after
/// construction. Reads and writes move `serde_json::Value`s in and out of
/// whatever storage the implementor keeps. Direction is declared in the
/// table and enforced by the engine at wiring time, so `read`/`write` only
/// need to care about storage, not about who is asking.
pub trait Fields: Send {
  /// The declared field table.
  fn fields(&self) -> Vec<FieldSpec>;

  /// Read the current value of a declared field.
  fn read(&self, field: &str) -> Result<Value, FieldError>;

  /// Write a value into a declared field.
  fn write(&mut self, field: &str, value: Value) -> Result<(), FieldError>;
}

/// A unit of work the engine can schedule.
///
/// The engine writes the component's bound inputs, calls `execute` once per
/// round, then reads its bound outputs. `execute` takes no arguments and
/// reports failure through a [`ComponentFault`]; everything else flows
/// through the field table.
pub trait Component: Fields {
  /// Display name used in events, logs and errors. Identity in the graph is
  /// the shared allocation, not this name; two components may share one.
  fn name(&self) -> &str;

  /// Run the component once.
  fn execute(&mut self) -> Result<(), ComponentFault>;
}

/// A component shared between the caller and the engine.
pub type SharedComponent = Arc<Mutex<dyn Component>>;

/// An arbitrary field-bearing object, not necessarily a component.
pub type SharedFields = Arc<Mutex<dyn Fields>>;
