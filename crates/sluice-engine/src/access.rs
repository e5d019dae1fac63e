//! Access variants: how a round task reads and writes one bound field.
//!
//! Every binding created by the wiring surface ends up as an [`Access`] in a
//! component's pull or push list. Pulls fetch a value and write it into the
//! component's input field; pushes read the component's output field and
//! publish it.

use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use sluice_component::{ComponentFault, FieldError, Fields, SharedComponent, SharedFields};
use tokio_util::sync::CancellationToken;

use crate::cell::FieldContent;
use crate::error::EngineError;

/// Round-delay buffer of a delayed access.
pub(crate) type Latch = Arc<Mutex<Option<Value>>>;

/// A registered component's declared field bound through a shared cell.
#[derive(Clone)]
pub(crate) struct CellBinding {
  pub target: SharedComponent,
  pub field: String,
  pub cell: Arc<FieldContent>,
}

/// A fixed value resolved at wiring time, immutable thereafter.
#[derive(Clone)]
pub(crate) struct LiteralBinding {
  pub target: SharedComponent,
  pub field: String,
  pub value: Value,
}

/// A named field on an arbitrary object, resolved at wiring time and cached;
/// values move straight between the object and the component, no cell.
#[derive(Clone)]
pub(crate) struct ObjectBinding {
  pub component: SharedComponent,
  pub field: String,
  pub object: SharedFields,
  pub object_field: String,
}

/// One bound endpoint.
#[derive(Clone)]
pub(crate) enum Access {
  Direct(CellBinding),
  Literal(LiteralBinding),
  FieldRef(ObjectBinding),
  /// Wraps another access. Writes pass through to the cell; reads are
  /// served from a latch snapshotted at round start, so a value produced in
  /// round N becomes visible to the dependent from round N+1 on.
  Delayed { inner: Box<Access>, latch: Latch },
}

impl Access {
  pub(crate) fn direct(
    target: SharedComponent,
    field: impl Into<String>,
    cell: Arc<FieldContent>,
  ) -> Self {
    Access::Direct(CellBinding {
      target,
      field: field.into(),
      cell,
    })
  }

  pub(crate) fn delayed(inner: Access) -> Self {
    Access::Delayed {
      inner: Box::new(inner),
      latch: Arc::new(Mutex::new(None)),
    }
  }

  /// Fetch this endpoint's value and write it into the bound input field.
  ///
  /// A direct pull waits until the producing output has written the cell
  /// this round; the wait is interrupted by round cancellation.
  pub(crate) async fn pull(
    &self,
    owner: &str,
    cancel: &CancellationToken,
  ) -> Result<(), EngineError> {
    match self {
      Access::Direct(binding) => {
        let value = tokio::select! {
          value = binding.cell.recv() => value,
          _ = cancel.cancelled() => return Err(EngineError::Cancelled),
        };
        write_field(binding.target.as_ref(), &binding.field, value)
          .map_err(|e| binding_fault(owner, &binding.field, e))
      }
      Access::Literal(binding) => {
        write_field(binding.target.as_ref(), &binding.field, binding.value.clone())
          .map_err(|e| binding_fault(owner, &binding.field, e))
      }
      Access::FieldRef(binding) => {
        let value = read_field(binding.object.as_ref(), &binding.object_field)
          .map_err(|e| binding_fault(owner, &binding.object_field, e))?;
        write_field(binding.component.as_ref(), &binding.field, value)
          .map_err(|e| binding_fault(owner, &binding.field, e))
      }
      Access::Delayed { inner, latch } => {
        let value = lock_recover(latch).clone();
        if let (Access::Direct(binding), Some(value)) = (inner.as_ref(), value) {
          // Nothing latched yet means the loop has not produced a value;
          // the component's initial field value stands.
          write_field(binding.target.as_ref(), &binding.field, value)
            .map_err(|e| binding_fault(owner, &binding.field, e))?;
        }
        Ok(())
      }
    }
  }

  /// Read the bound output field and publish it.
  pub(crate) fn push(&self, owner: &str) -> Result<(), EngineError> {
    match self {
      Access::Direct(binding) => {
        let value = read_field(binding.target.as_ref(), &binding.field)
          .map_err(|e| binding_fault(owner, &binding.field, e))?;
        binding.cell.write(value);
        Ok(())
      }
      // Literals never sit on the output side.
      Access::Literal(_) => Ok(()),
      Access::FieldRef(binding) => {
        let value = read_field(binding.component.as_ref(), &binding.field)
          .map_err(|e| binding_fault(owner, &binding.field, e))?;
        write_field(binding.object.as_ref(), &binding.object_field, value)
          .map_err(|e| binding_fault(owner, &binding.object_field, e))
      }
      Access::Delayed { inner, .. } => inner.push(owner),
    }
  }

  /// Snapshot the cell for delayed reads; no-op for other variants.
  pub(crate) fn latch_round(&self) {
    if let Access::Delayed { inner, latch } = self {
      if let Access::Direct(binding) = inner.as_ref() {
        *lock_recover(latch) = binding.cell.peek();
      }
    }
  }
}

/// Lock recovery: a poisoned component mutex means its entry point panicked;
/// the round that observed the panic already failed, so later rounds and
/// wiring calls recover the guard instead of wedging.
pub(crate) fn lock_recover<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) fn read_field<T: Fields + ?Sized>(
  target: &Mutex<T>,
  field: &str,
) -> Result<Value, FieldError> {
  lock_recover(target).read(field)
}

pub(crate) fn write_field<T: Fields + ?Sized>(
  target: &Mutex<T>,
  field: &str,
  value: Value,
) -> Result<(), FieldError> {
  lock_recover(target).write(field, value)
}

/// A field access that fails once the round is running is attributed to the
/// component that owns the binding.
fn binding_fault(owner: &str, field: &str, err: FieldError) -> EngineError {
  EngineError::ComponentExecution {
    component: owner.to_string(),
    source: ComponentFault::with_source(format!("field '{field}' access failed"), err),
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use sluice_component::{Component, FieldSpec, FieldType};

  #[derive(Default)]
  struct Slot {
    value: Value,
  }

  impl Fields for Slot {
    fn fields(&self) -> Vec<FieldSpec> {
      vec![
        FieldSpec::input("value", FieldType::Any),
        FieldSpec::output("value", FieldType::Any),
      ]
    }

    fn read(&self, field: &str) -> Result<Value, FieldError> {
      match field {
        "value" => Ok(self.value.clone()),
        _ => Err(FieldError::NoSuchField(field.to_string())),
      }
    }

    fn write(&mut self, field: &str, value: Value) -> Result<(), FieldError> {
      match field {
        "value" => {
          self.value = value;
          Ok(())
        }
        _ => Err(FieldError::NoSuchField(field.to_string())),
      }
    }
  }

  impl Component for Slot {
    fn name(&self) -> &str {
      "slot"
    }

    fn execute(&mut self) -> Result<(), ComponentFault> {
      Ok(())
    }
  }

  fn slot() -> SharedComponent {
    Arc::new(Mutex::new(Slot::default()))
  }

  #[tokio::test]
  async fn direct_pull_moves_cell_value_into_field() {
    let target = slot();
    let cell = Arc::new(FieldContent::new());
    cell.write(json!(7));
    let access = Access::direct(target.clone(), "value", cell);
    access.pull("slot", &CancellationToken::new()).await.unwrap();
    assert_eq!(read_field(target.as_ref(), "value").unwrap(), json!(7));
  }

  #[tokio::test]
  async fn direct_pull_is_interrupted_by_cancellation() {
    let access = Access::direct(slot(), "value", Arc::new(FieldContent::new()));
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = access.pull("slot", &cancel).await.unwrap_err();
    assert!(matches!(err, EngineError::Cancelled));
  }

  #[test]
  fn direct_push_publishes_field_value() {
    let target = slot();
    write_field(target.as_ref(), "value", json!("out")).unwrap();
    let cell = Arc::new(FieldContent::new());
    let access = Access::direct(target, "value", cell.clone());
    access.push("slot").unwrap();
    assert!(cell.is_valid());
    assert_eq!(cell.peek(), Some(json!("out")));
  }

  #[tokio::test]
  async fn literal_pull_writes_the_fixed_value() {
    let target = slot();
    let access = Access::Literal(LiteralBinding {
      target: target.clone(),
      field: "value".to_string(),
      value: json!(42),
    });
    access.pull("slot", &CancellationToken::new()).await.unwrap();
    assert_eq!(read_field(target.as_ref(), "value").unwrap(), json!(42));
  }

  #[tokio::test]
  async fn delayed_pull_without_latch_keeps_initial_value() {
    let target = slot();
    write_field(target.as_ref(), "value", json!("initial")).unwrap();
    let cell = Arc::new(FieldContent::new());
    cell.write(json!("fresh"));
    let access = Access::delayed(Access::direct(target.clone(), "value", cell));
    access.pull("slot", &CancellationToken::new()).await.unwrap();
    assert_eq!(
      read_field(target.as_ref(), "value").unwrap(),
      json!("initial")
    );
  }

  #[tokio::test]
  async fn delayed_pull_serves_the_latched_value() {
    let target = slot();
    let cell = Arc::new(FieldContent::new());
    cell.write(json!("previous round"));
    let access = Access::delayed(Access::direct(target.clone(), "value", cell.clone()));
    access.latch_round();
    // A newer write must not leak into this round's delayed read.
    cell.invalidate();
    cell.write(json!("this round"));
    access.pull("slot", &CancellationToken::new()).await.unwrap();
    assert_eq!(
      read_field(target.as_ref(), "value").unwrap(),
      json!("previous round")
    );
  }
}
