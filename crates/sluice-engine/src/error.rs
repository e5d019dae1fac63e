//! Error types for wiring and execution.

use sluice_component::{ComponentFault, FieldType};
use thiserror::Error;

/// Errors raised by the wiring surface and the execution protocol.
///
/// Wiring errors are synchronous: they surface to the caller of the wiring
/// call that triggered them, never at run time. Execution errors follow
/// first-error-wins semantics; secondary failures from sibling tasks in the
/// same round are dropped from the result and only logged.
#[derive(Debug, Error)]
pub enum EngineError {
  /// A named field does not exist or cannot be bound as requested.
  #[error("cannot bind '{component}.{field}': {reason}")]
  Binding {
    component: String,
    field: String,
    reason: String,
  },

  /// The destination field's type does not accept the source's type.
  #[error("type mismatch: {from} ({from_ty:?}) does not fit {to}.{to_field} ({to_ty:?})")]
  TypeMismatch {
    from: String,
    from_ty: FieldType,
    to: String,
    to_field: String,
    to_ty: FieldType,
  },

  /// A component was bound to itself, or the compound to one of its own
  /// children.
  #[error("self reference on '{component}'")]
  CircularSelfReference { component: String },

  /// The ordinary-connection graph contains a cycle through the named
  /// component.
  #[error("circular reference through '{component}'")]
  CircularReference { component: String },

  /// Malformed wiring arguments (empty field name, null literal).
  #[error("invalid binding: {reason}")]
  InvalidBinding { reason: String },

  /// A component's entry point failed during a round.
  #[error("component '{component}' failed: {source}")]
  ComponentExecution {
    component: String,
    #[source]
    source: ComponentFault,
  },

  /// `run` was called while a round was already in flight.
  #[error("a round is already in progress")]
  RoundInProgress,

  /// The round was cancelled through the scheduler.
  #[error("execution cancelled")]
  Cancelled,
}
