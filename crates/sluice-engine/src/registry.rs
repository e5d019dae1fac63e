//! Identity-keyed registration of components.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sluice_component::{Direction, FieldSpec, SharedComponent};

use crate::access::{Access, lock_recover};
use crate::cell::FieldContent;
use crate::error::EngineError;

pub(crate) type ComponentId = usize;

/// Per-component bookkeeping: the field table cached at registration and
/// the access lists a round task drains.
pub(crate) struct ComponentEntry {
  pub name: String,
  pub component: SharedComponent,
  ins: HashMap<String, FieldSpec>,
  outs: HashMap<String, FieldSpec>,
  /// One shared cell per bound output field; every consumer of that output
  /// shares it.
  pub out_cells: HashMap<String, Arc<FieldContent>>,
  /// Output fields with at least one binding of any kind.
  pub bound_outputs: HashSet<String>,
  pub pulls: Vec<Access>,
  pub pushes: Vec<Access>,
}

impl ComponentEntry {
  fn new(name: String, component: SharedComponent, specs: Vec<FieldSpec>) -> Self {
    let mut ins = HashMap::new();
    let mut outs = HashMap::new();
    for spec in specs {
      match spec.direction {
        Direction::In => {
          ins.insert(spec.name.clone(), spec);
        }
        Direction::Out => {
          outs.insert(spec.name.clone(), spec);
        }
      }
    }
    Self {
      name,
      component,
      ins,
      outs,
      out_cells: HashMap::new(),
      bound_outputs: HashSet::new(),
      pulls: Vec::new(),
      pushes: Vec::new(),
    }
  }

  /// Declared input spec, or a binding error naming the component.
  pub fn input(&self, field: &str) -> Result<&FieldSpec, EngineError> {
    self.ins.get(field).ok_or_else(|| EngineError::Binding {
      component: self.name.clone(),
      field: field.to_string(),
      reason: "no such input field".to_string(),
    })
  }

  /// Declared output spec, or a binding error naming the component.
  pub fn output(&self, field: &str) -> Result<&FieldSpec, EngineError> {
    self.outs.get(field).ok_or_else(|| EngineError::Binding {
      component: self.name.clone(),
      field: field.to_string(),
      reason: "no such output field".to_string(),
    })
  }

  /// Declared output fields with no binding, for the advisory check.
  pub fn unbound_outputs(&self) -> Vec<&str> {
    self
      .outs
      .keys()
      .filter(|name| !self.bound_outputs.contains(*name))
      .map(String::as_str)
      .collect()
  }
}

/// The set of components known to one controller.
#[derive(Default)]
pub(crate) struct Registry {
  entries: Vec<ComponentEntry>,
  index: HashMap<usize, ComponentId>,
}

impl Registry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn entries(&self) -> impl Iterator<Item = &ComponentEntry> {
    self.entries.iter()
  }

  pub fn entry(&self, id: ComponentId) -> &ComponentEntry {
    &self.entries[id]
  }

  pub fn entry_mut(&mut self, id: ComponentId) -> &mut ComponentEntry {
    &mut self.entries[id]
  }

  /// Id for a component, registering it on first sight.
  ///
  /// Idempotent: looking up an already-known component returns the cached
  /// entry's id, the field table is snapshotted only once.
  pub fn lookup(&mut self, component: &SharedComponent) -> ComponentId {
    let key = identity(component);
    if let Some(&id) = self.index.get(&key) {
      return id;
    }
    let (name, specs) = {
      let guard = lock_recover(component.as_ref());
      (guard.name().to_string(), guard.fields())
    };
    let id = self.entries.len();
    self
      .entries
      .push(ComponentEntry::new(name, component.clone(), specs));
    self.index.insert(key, id);
    id
  }
}

/// Identity of the shared allocation. Names play no part here: two distinct
/// instances with the same name are two components.
pub(crate) fn identity(component: &SharedComponent) -> usize {
  Arc::as_ptr(component) as *const () as usize
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::Value;
  use sluice_component::{Component, ComponentFault, FieldError, FieldType, Fields};
  use std::sync::Mutex;

  struct Unit;

  impl Fields for Unit {
    fn fields(&self) -> Vec<FieldSpec> {
      vec![
        FieldSpec::input("a", FieldType::Integer),
        FieldSpec::output("b", FieldType::Integer),
      ]
    }

    fn read(&self, field: &str) -> Result<Value, FieldError> {
      Err(FieldError::NoSuchField(field.to_string()))
    }

    fn write(&mut self, field: &str, _value: Value) -> Result<(), FieldError> {
      Err(FieldError::NoSuchField(field.to_string()))
    }
  }

  impl Component for Unit {
    fn name(&self) -> &str {
      "unit"
    }

    fn execute(&mut self) -> Result<(), ComponentFault> {
      Ok(())
    }
  }

  #[test]
  fn lookup_is_idempotent_per_allocation() {
    let mut registry = Registry::new();
    let first: SharedComponent = Arc::new(Mutex::new(Unit));
    let second: SharedComponent = Arc::new(Mutex::new(Unit));

    let id = registry.lookup(&first);
    assert_eq!(registry.lookup(&first), id);
    assert_eq!(registry.lookup(&first.clone()), id);
    assert_ne!(registry.lookup(&second), id);
    assert_eq!(registry.len(), 2);
  }

  #[test]
  fn field_tables_are_split_by_direction() {
    let mut registry = Registry::new();
    let unit: SharedComponent = Arc::new(Mutex::new(Unit));
    let id = registry.lookup(&unit);
    let entry = registry.entry(id);

    assert!(entry.input("a").is_ok());
    assert!(entry.output("b").is_ok());
    assert!(matches!(
      entry.input("b"),
      Err(EngineError::Binding { .. })
    ));
    assert!(matches!(
      entry.output("a"),
      Err(EngineError::Binding { .. })
    ));
  }

  #[test]
  fn unbound_outputs_reports_untouched_declarations() {
    let mut registry = Registry::new();
    let unit: SharedComponent = Arc::new(Mutex::new(Unit));
    let id = registry.lookup(&unit);
    assert_eq!(registry.entry(id).unbound_outputs(), vec!["b"]);
    registry.entry_mut(id).bound_outputs.insert("b".to_string());
    assert!(registry.entry(id).unbound_outputs().is_empty());
  }
}
