//! Caller-facing wrapper: compound state plus its controller.

use std::sync::Arc;

use serde_json::Value;
use sluice_component::{SharedComponent, SharedFields};

use crate::controller::Controller;
use crate::error::EngineError;
use crate::events::{EventNotifier, NoopNotifier};
use crate::scheduler::Scheduler;

/// The enclosing component: a field-bearing state object and the controller
/// that wires and runs its children.
///
/// Purely a convenience over [`Controller`]; the full wiring surface is
/// delegated so callers can hold one value.
pub struct Compound<N: EventNotifier = NoopNotifier> {
  state: SharedFields,
  controller: Controller<N>,
}

impl Compound<NoopNotifier> {
  /// A compound that discards events.
  pub fn new(
    name: impl Into<String>,
    state: SharedFields,
    scheduler: Arc<Scheduler>,
  ) -> Self {
    Self::with_notifier(name, state, scheduler, NoopNotifier)
  }
}

impl<N: EventNotifier> Compound<N> {
  /// A compound with a custom notifier.
  pub fn with_notifier(
    name: impl Into<String>,
    state: SharedFields,
    scheduler: Arc<Scheduler>,
    notifier: N,
  ) -> Self {
    Self {
      state: state.clone(),
      controller: Controller::with_notifier(name, state, scheduler, notifier),
    }
  }

  /// The compound's own field state.
  pub fn state(&self) -> &SharedFields {
    &self.state
  }

  pub fn controller(&self) -> &Controller<N> {
    &self.controller
  }

  pub fn connect(
    &mut self,
    from: &SharedComponent,
    from_out: &str,
    to: &SharedComponent,
    to_in: &str,
  ) -> Result<(), EngineError> {
    self.controller.connect(from, from_out, to, to_in)
  }

  pub fn feedback(
    &mut self,
    from: &SharedComponent,
    from_out: &str,
    to: &SharedComponent,
    to_in: &str,
  ) -> Result<(), EngineError> {
    self.controller.feedback(from, from_out, to, to_in)
  }

  pub fn map_in(
    &mut self,
    field: &str,
    to: &SharedComponent,
    to_in: &str,
  ) -> Result<(), EngineError> {
    self.controller.map_in(field, to, to_in)
  }

  pub fn map_out(
    &mut self,
    field: &str,
    from: &SharedComponent,
    from_out: &str,
  ) -> Result<(), EngineError> {
    self.controller.map_out(field, from, from_out)
  }

  pub fn map_in_val(
    &mut self,
    value: Value,
    to: &SharedComponent,
    to_in: &str,
  ) -> Result<(), EngineError> {
    self.controller.map_in_val(value, to, to_in)
  }

  pub fn map_in_field(
    &mut self,
    from: &SharedFields,
    from_field: &str,
    to: &SharedComponent,
    to_in: &str,
  ) -> Result<(), EngineError> {
    self.controller.map_in_field(from, from_field, to, to_in)
  }

  pub fn map_out_field(
    &mut self,
    from: &SharedComponent,
    from_out: &str,
    to: &SharedFields,
    to_field: &str,
  ) -> Result<(), EngineError> {
    self.controller.map_out_field(from, from_out, to, to_field)
  }

  /// Execute one round.
  pub async fn run(&self) -> Result<(), EngineError> {
    self.controller.run().await
  }
}
