//! The execution controller: wiring operations and the round protocol.
//!
//! A controller belongs to one compound. Wiring is single-threaded and
//! synchronous; every structure the wiring phase builds is only read once a
//! round is running. The shared cells are the one exception: they are the
//! only state mutated concurrently during a round, under the one writer per
//! cell per round discipline the wiring rules uphold.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use futures::future::join_all;
use serde_json::Value;
use sluice_component::{
  ComponentFault, Direction, FieldError, FieldSpec, FieldType, SharedComponent, SharedFields,
};
use sluice_graph::{DependencyGraph, GraphError};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use crate::access::{Access, LiteralBinding, ObjectBinding, lock_recover, read_field, write_field};
use crate::cell::FieldContent;
use crate::error::EngineError;
use crate::events::{EngineEvent, EventNotifier, NoopNotifier};
use crate::registry::{ComponentId, Registry, identity};
use crate::scheduler::Scheduler;

/// A compound-boundary input: the compound's field feeds this cell at the
/// start of every round.
struct InLink {
  field: String,
  cell: Arc<FieldContent>,
}

/// A compound-boundary output: this cell feeds the compound's field at the
/// end of every successful round.
struct OutLink {
  field: String,
  cell: Arc<FieldContent>,
}

/// The engine for one compound.
///
/// Generic over `N: EventNotifier` to allow different notification
/// strategies. Use `Controller::new()` for a controller that discards
/// events, or `Controller::with_notifier()` to observe them.
pub struct Controller<N: EventNotifier = NoopNotifier> {
  compound: SharedFields,
  compound_name: String,
  compound_addr: usize,
  compound_ins: HashMap<String, FieldSpec>,
  compound_outs: HashMap<String, FieldSpec>,
  compound_in_cells: HashMap<String, Arc<FieldContent>>,
  scheduler: Arc<Scheduler>,
  notifier: Arc<N>,
  registry: Registry,
  graph: DependencyGraph,
  /// Every cell subject to the round-start invalidation sweep.
  cells: Vec<Arc<FieldContent>>,
  in_links: Vec<InLink>,
  out_links: Vec<OutLink>,
  running: AtomicBool,
  checked: AtomicBool,
}

impl Controller<NoopNotifier> {
  /// A controller that discards events.
  pub fn new(
    name: impl Into<String>,
    compound: SharedFields,
    scheduler: Arc<Scheduler>,
  ) -> Self {
    Self::with_notifier(name, compound, scheduler, NoopNotifier)
  }
}

impl<N: EventNotifier> Controller<N> {
  /// A controller with a custom notifier.
  pub fn with_notifier(
    name: impl Into<String>,
    compound: SharedFields,
    scheduler: Arc<Scheduler>,
    notifier: N,
  ) -> Self {
    let compound_addr = Arc::as_ptr(&compound) as *const () as usize;
    let mut compound_ins = HashMap::new();
    let mut compound_outs = HashMap::new();
    for spec in lock_recover(compound.as_ref()).fields() {
      match spec.direction {
        Direction::In => {
          compound_ins.insert(spec.name.clone(), spec);
        }
        Direction::Out => {
          compound_outs.insert(spec.name.clone(), spec);
        }
      }
    }
    Self {
      compound,
      compound_name: name.into(),
      compound_addr,
      compound_ins,
      compound_outs,
      compound_in_cells: HashMap::new(),
      scheduler,
      notifier: Arc::new(notifier),
      registry: Registry::new(),
      graph: DependencyGraph::new(),
      cells: Vec::new(),
      in_links: Vec::new(),
      out_links: Vec::new(),
      running: AtomicBool::new(false),
      checked: AtomicBool::new(false),
    }
  }

  /// The notifier wired into this controller.
  pub fn notifier(&self) -> &N {
    &self.notifier
  }

  /// Number of distinct registered components.
  pub fn component_count(&self) -> usize {
    self.registry.len()
  }

  // ---------------------------------------------------------------------
  // Wiring
  // ---------------------------------------------------------------------

  /// Connect a component's output field to another component's input field.
  ///
  /// The producer's cell is shared with the consumer (one cell per output
  /// field, however many consumers), the edge joins the dependency graph,
  /// and the whole graph is checked for cycles immediately. A cycle fails
  /// the call but the offending edge stays installed; what to do with the
  /// compound afterwards is the caller's decision.
  pub fn connect(
    &mut self,
    from: &SharedComponent,
    from_out: &str,
    to: &SharedComponent,
    to_in: &str,
  ) -> Result<(), EngineError> {
    let (from_id, to_id) = self.resolve_link(from, from_out, to, to_in)?;
    let cell = self.producer_cell(from_id, from, from_out, false);
    cell.tag_in();
    cell.tag_out();
    let consumer = Access::direct(to.clone(), to_in, cell);
    self.registry.entry_mut(to_id).pulls.push(consumer);

    self.graph.add_edge(from_id, to_id);
    if let Err(GraphError::CircularReference { node }) = self.graph.check_circular() {
      return Err(EngineError::CircularReference {
        component: self.registry.entry(node).name.clone(),
      });
    }

    self.notifier.notify(EngineEvent::Connected {
      from: self.registry.entry(from_id).name.clone(),
      from_field: from_out.to_string(),
      to: self.registry.entry(to_id).name.clone(),
      to_field: to_in.to_string(),
      delayed: false,
    });
    Ok(())
  }

  /// Connect with a one-round delay.
  ///
  /// Endpoint resolution and type checking match `connect`, but both
  /// endpoints are wrapped in delayed accesses and the edge never enters
  /// the dependency graph: the delay is what makes a loop safe, so it must
  /// not trip the cycle detector.
  pub fn feedback(
    &mut self,
    from: &SharedComponent,
    from_out: &str,
    to: &SharedComponent,
    to_in: &str,
  ) -> Result<(), EngineError> {
    let (from_id, to_id) = self.resolve_link(from, from_out, to, to_in)?;
    let cell = self.producer_cell(from_id, from, from_out, true);
    cell.tag_in();
    cell.tag_out();
    let consumer = Access::delayed(Access::direct(to.clone(), to_in, cell));
    self.registry.entry_mut(to_id).pulls.push(consumer);

    self.notifier.notify(EngineEvent::Connected {
      from: self.registry.entry(from_id).name.clone(),
      from_field: from_out.to_string(),
      to: self.registry.entry(to_id).name.clone(),
      to_field: to_in.to_string(),
      delayed: true,
    });
    Ok(())
  }

  /// Bind a compound-level input field to a nested component's input field.
  pub fn map_in(
    &mut self,
    field: &str,
    to: &SharedComponent,
    to_in: &str,
  ) -> Result<(), EngineError> {
    check_field_names(&[field, to_in])?;
    let to_id = self.lookup(to)?;
    let compound_spec = self.compound_input(field)?;
    let to_spec = self.registry.entry(to_id).input(to_in)?.clone();
    if !to_spec.ty.accepts(compound_spec.ty) {
      return Err(EngineError::TypeMismatch {
        from: format!("{}.{}", self.compound_name, field),
        from_ty: compound_spec.ty,
        to: self.registry.entry(to_id).name.clone(),
        to_field: to_in.to_string(),
        to_ty: to_spec.ty,
      });
    }

    let cell = self.compound_in_cell(field);
    let consumer = Access::direct(to.clone(), to_in, cell);
    self.registry.entry_mut(to_id).pulls.push(consumer);

    self.notifier.notify(EngineEvent::MappedIn {
      field: field.to_string(),
      to: self.registry.entry(to_id).name.clone(),
      to_field: to_in.to_string(),
    });
    Ok(())
  }

  /// Bind a nested component's output field to a compound-level output
  /// field.
  pub fn map_out(
    &mut self,
    field: &str,
    from: &SharedComponent,
    from_out: &str,
  ) -> Result<(), EngineError> {
    check_field_names(&[field, from_out])?;
    let from_id = self.lookup(from)?;
    let compound_spec = self.compound_output(field)?;
    let from_spec = self.registry.entry(from_id).output(from_out)?.clone();
    if !compound_spec.ty.accepts(from_spec.ty) {
      return Err(EngineError::TypeMismatch {
        from: format!("{}.{}", self.registry.entry(from_id).name, from_out),
        from_ty: from_spec.ty,
        to: self.compound_name.clone(),
        to_field: field.to_string(),
        to_ty: compound_spec.ty,
      });
    }

    let cell = self.producer_cell(from_id, from, from_out, false);
    cell.tag_leaf();
    cell.tag_out();
    self.out_links.push(OutLink {
      field: field.to_string(),
      cell,
    });

    self.notifier.notify(EngineEvent::MappedOut {
      field: field.to_string(),
      from: self.registry.entry(from_id).name.clone(),
      from_field: from_out.to_string(),
    });
    Ok(())
  }

  /// Bind a literal value to a nested component's input field.
  ///
  /// The value is fixed at wiring time and written into the field every
  /// round; no producer task or cell is involved.
  pub fn map_in_val(
    &mut self,
    value: Value,
    to: &SharedComponent,
    to_in: &str,
  ) -> Result<(), EngineError> {
    check_field_names(&[to_in])?;
    let Some(value_ty) = FieldType::of(&value) else {
      return Err(EngineError::InvalidBinding {
        reason: "null literal".to_string(),
      });
    };
    let to_id = self.lookup(to)?;
    let to_spec = self.registry.entry(to_id).input(to_in)?.clone();
    if !to_spec.ty.accepts(value_ty) {
      return Err(EngineError::TypeMismatch {
        from: "literal".to_string(),
        from_ty: value_ty,
        to: self.registry.entry(to_id).name.clone(),
        to_field: to_in.to_string(),
        to_ty: to_spec.ty,
      });
    }

    self
      .registry
      .entry_mut(to_id)
      .pulls
      .push(Access::Literal(LiteralBinding {
        target: to.clone(),
        field: to_in.to_string(),
        value,
      }));
    Ok(())
  }

  /// Bind a named field on an arbitrary object to a nested component's
  /// input field.
  ///
  /// The field is resolved once, here; a missing field is a wiring-time
  /// error, never a run-time one.
  pub fn map_in_field(
    &mut self,
    from: &SharedFields,
    from_field: &str,
    to: &SharedComponent,
    to_in: &str,
  ) -> Result<(), EngineError> {
    check_field_names(&[from_field, to_in])?;
    let to_id = self.lookup(to)?;
    let to_spec = self.registry.entry(to_id).input(to_in)?.clone();
    let foreign = resolve_object_field(from, from_field)?;
    if !to_spec.ty.accepts(foreign.ty) {
      return Err(EngineError::TypeMismatch {
        from: format!("<object>.{from_field}"),
        from_ty: foreign.ty,
        to: self.registry.entry(to_id).name.clone(),
        to_field: to_in.to_string(),
        to_ty: to_spec.ty,
      });
    }

    self
      .registry
      .entry_mut(to_id)
      .pulls
      .push(Access::FieldRef(ObjectBinding {
        component: to.clone(),
        field: to_in.to_string(),
        object: from.clone(),
        object_field: from_field.to_string(),
      }));
    Ok(())
  }

  /// Bind a nested component's output field to a named field on an
  /// arbitrary object.
  pub fn map_out_field(
    &mut self,
    from: &SharedComponent,
    from_out: &str,
    to: &SharedFields,
    to_field: &str,
  ) -> Result<(), EngineError> {
    check_field_names(&[from_out, to_field])?;
    let from_id = self.lookup(from)?;
    let from_spec = self.registry.entry(from_id).output(from_out)?.clone();
    let foreign = resolve_object_field(to, to_field)?;
    if !foreign.ty.accepts(from_spec.ty) {
      return Err(EngineError::TypeMismatch {
        from: format!("{}.{}", self.registry.entry(from_id).name, from_out),
        from_ty: from_spec.ty,
        to: "<object>".to_string(),
        to_field: to_field.to_string(),
        to_ty: foreign.ty,
      });
    }

    let entry = self.registry.entry_mut(from_id);
    entry.pushes.push(Access::FieldRef(ObjectBinding {
      component: from.clone(),
      field: from_out.to_string(),
      object: to.clone(),
      object_field: to_field.to_string(),
    }));
    entry.bound_outputs.insert(from_out.to_string());
    Ok(())
  }

  // ---------------------------------------------------------------------
  // Execution
  // ---------------------------------------------------------------------

  /// Execute one round: pull compound inputs, invalidate cells, run every
  /// registered component concurrently, wait on the barrier, push compound
  /// outputs.
  ///
  /// Rounds must not overlap; a `run` while another is in flight returns
  /// [`EngineError::RoundInProgress`] untouched. On failure the first
  /// recorded error is returned, outputs are not pushed, and the shared
  /// cells are left in an undefined, partially-written state.
  #[instrument(name = "compound_run", skip(self), fields(compound = %self.compound_name))]
  pub async fn run(&self) -> Result<(), EngineError> {
    if self
      .running
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      return Err(EngineError::RoundInProgress);
    }
    let _running = RunningGuard(&self.running);

    if self.scheduler.is_shutdown() {
      return Err(EngineError::Cancelled);
    }
    if self.registry.is_empty() {
      return Ok(());
    }
    if !self.checked.swap(true, Ordering::SeqCst) {
      self.check_out_field_access();
    }

    let round_id = uuid::Uuid::new_v4().to_string();
    info!(round_id = %round_id, components = self.registry.len(), "round started");

    // Compound inputs first, then the invalidation sweep: leaf input cells
    // carry their freshly pulled values through it.
    self.pull_inputs()?;
    for entry in self.registry.entries() {
      for access in &entry.pulls {
        access.latch_round();
      }
    }
    for cell in &self.cells {
      cell.invalidate();
    }

    self.notifier.notify(EngineEvent::Started {
      round_id: round_id.clone(),
      compound: self.compound_name.clone(),
    });

    let cancel = self.scheduler.round_token();
    let first_error: Arc<Mutex<Option<EngineError>>> = Arc::new(Mutex::new(None));
    let mut handles = Vec::with_capacity(self.registry.len());
    let mut aborts = Vec::with_capacity(self.registry.len());
    for entry in self.registry.entries() {
      let task = RoundTask {
        name: entry.name.clone(),
        component: entry.component.clone(),
        pulls: entry.pulls.clone(),
        pushes: entry.pushes.clone(),
        scheduler: self.scheduler.clone(),
      };
      let handle = self.scheduler.spawn(run_component(
        task,
        round_id.clone(),
        cancel.clone(),
        first_error.clone(),
        self.notifier.clone(),
      ));
      aborts.push(handle.abort_handle());
      handles.push(handle);
    }

    // The barrier: either every task finishes, or a failure forces it open
    // through the round token and whatever is still pending gets aborted.
    // Entry points already running on the blocking pool cannot be
    // interrupted, so the abort is best effort.
    tokio::select! {
      _ = join_all(handles) => {}
      _ = cancel.cancelled() => {
        for abort in &aborts {
          abort.abort();
        }
      }
    }

    let recorded = lock_recover(&first_error).take();
    let failure = match recorded {
      Some(err) => Some(err),
      None if cancel.is_cancelled() => Some(EngineError::Cancelled),
      None => None,
    };
    if let Some(err) = failure {
      error!(round_id = %round_id, error = %err, "round failed");
      self.notifier.notify(EngineEvent::ExceptionRaised {
        round_id,
        error: err.to_string(),
      });
      return Err(err);
    }

    self.notifier.notify(EngineEvent::Finished {
      round_id: round_id.clone(),
      compound: self.compound_name.clone(),
    });
    self.push_outputs()?;
    info!(round_id = %round_id, "round completed");
    Ok(())
  }

  /// Read every compound-level input field into its shared cell.
  fn pull_inputs(&self) -> Result<(), EngineError> {
    for link in &self.in_links {
      let value = read_field(self.compound.as_ref(), &link.field)
        .map_err(|e| self.compound_fault("failed to pull compound input", e))?;
      link.cell.write(value);
    }
    Ok(())
  }

  /// Write every compound-level output field from its now-valid cell.
  fn push_outputs(&self) -> Result<(), EngineError> {
    for link in &self.out_links {
      match link.cell.peek() {
        Some(value) => {
          write_field(self.compound.as_ref(), &link.field, value)
            .map_err(|e| self.compound_fault("failed to push compound output", e))?;
        }
        None => {
          warn!(field = %link.field, "compound output cell was never written");
        }
      }
    }
    Ok(())
  }

  /// Advisory only: a declared output nobody consumes is often a wiring
  /// oversight, but a component may legitimately produce a value nobody
  /// reads, so this warns and never fails.
  fn check_out_field_access(&self) {
    for entry in self.registry.entries() {
      for field in entry.unbound_outputs() {
        warn!(component = %entry.name, field = %field, "declared output has no binding");
      }
    }
  }

  // ---------------------------------------------------------------------
  // Shared wiring plumbing
  // ---------------------------------------------------------------------

  /// Register (or find) a component, rejecting the compound itself.
  fn lookup(&mut self, component: &SharedComponent) -> Result<ComponentId, EngineError> {
    if identity(component) == self.compound_addr {
      return Err(EngineError::CircularSelfReference {
        component: self.compound_name.clone(),
      });
    }
    Ok(self.registry.lookup(component))
  }

  /// Endpoint resolution shared by `connect` and `feedback`: self-edge and
  /// field-name checks, registration, direction lookup, assignability.
  fn resolve_link(
    &mut self,
    from: &SharedComponent,
    from_out: &str,
    to: &SharedComponent,
    to_in: &str,
  ) -> Result<(ComponentId, ComponentId), EngineError> {
    if identity(from) == identity(to) {
      return Err(EngineError::CircularSelfReference {
        component: lock_recover(from.as_ref()).name().to_string(),
      });
    }
    check_field_names(&[from_out, to_in])?;
    let from_id = self.lookup(from)?;
    let to_id = self.lookup(to)?;
    let from_spec = self.registry.entry(from_id).output(from_out)?.clone();
    let to_spec = self.registry.entry(to_id).input(to_in)?.clone();
    if !to_spec.ty.accepts(from_spec.ty) {
      return Err(EngineError::TypeMismatch {
        from: format!("{}.{}", self.registry.entry(from_id).name, from_out),
        from_ty: from_spec.ty,
        to: self.registry.entry(to_id).name.clone(),
        to_field: to_in.to_string(),
        to_ty: to_spec.ty,
      });
    }
    Ok((from_id, to_id))
  }

  /// The shared cell behind an output field, created on first binding
  /// together with the producer's push access.
  fn producer_cell(
    &mut self,
    id: ComponentId,
    component: &SharedComponent,
    field: &str,
    delayed: bool,
  ) -> Arc<FieldContent> {
    if let Some(cell) = self.registry.entry(id).out_cells.get(field) {
      return cell.clone();
    }
    let cell = Arc::new(FieldContent::new());
    let entry = self.registry.entry_mut(id);
    entry.out_cells.insert(field.to_string(), cell.clone());
    let access = Access::direct(component.clone(), field, cell.clone());
    entry.pushes.push(if delayed {
      Access::delayed(access)
    } else {
      access
    });
    entry.bound_outputs.insert(field.to_string());
    self.cells.push(cell.clone());
    cell
  }

  /// The shared cell behind a compound-level input field, created on first
  /// binding together with its boundary link.
  fn compound_in_cell(&mut self, field: &str) -> Arc<FieldContent> {
    if let Some(cell) = self.compound_in_cells.get(field) {
      return cell.clone();
    }
    let cell = Arc::new(FieldContent::new());
    cell.tag_leaf();
    cell.tag_in();
    self
      .compound_in_cells
      .insert(field.to_string(), cell.clone());
    self.in_links.push(InLink {
      field: field.to_string(),
      cell: cell.clone(),
    });
    self.cells.push(cell.clone());
    cell
  }

  fn compound_input(&self, field: &str) -> Result<FieldSpec, EngineError> {
    self
      .compound_ins
      .get(field)
      .cloned()
      .ok_or_else(|| EngineError::Binding {
        component: self.compound_name.clone(),
        field: field.to_string(),
        reason: "no such input field".to_string(),
      })
  }

  fn compound_output(&self, field: &str) -> Result<FieldSpec, EngineError> {
    self
      .compound_outs
      .get(field)
      .cloned()
      .ok_or_else(|| EngineError::Binding {
        component: self.compound_name.clone(),
        field: field.to_string(),
        reason: "no such output field".to_string(),
      })
  }

  fn compound_fault(&self, message: &str, err: FieldError) -> EngineError {
    EngineError::ComponentExecution {
      component: self.compound_name.clone(),
      source: ComponentFault::with_source(message, err),
    }
  }
}

/// Resets the round guard when `run` leaves, whichever way it leaves.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

fn check_field_names(fields: &[&str]) -> Result<(), EngineError> {
  for field in fields {
    if field.trim().is_empty() {
      return Err(EngineError::InvalidBinding {
        reason: "empty field name".to_string(),
      });
    }
  }
  Ok(())
}

/// Resolve a named field on an arbitrary object, once, at wiring time.
fn resolve_object_field(object: &SharedFields, field: &str) -> Result<FieldSpec, EngineError> {
  let specs = lock_recover(object.as_ref()).fields();
  specs
    .into_iter()
    .find(|spec| spec.name == field)
    .ok_or_else(|| EngineError::Binding {
      component: "<object>".to_string(),
      field: field.to_string(),
      reason: "no such field on external object".to_string(),
    })
}

/// Everything one component task needs, cloned out of the controller so the
/// task owns its working set.
struct RoundTask {
  name: String,
  component: SharedComponent,
  pulls: Vec<Access>,
  pushes: Vec<Access>,
  scheduler: Arc<Scheduler>,
}

/// One component's slice of a round: record the outcome, keep the first
/// error, force the barrier open on failure.
async fn run_component<N: EventNotifier>(
  task: RoundTask,
  round_id: String,
  cancel: CancellationToken,
  first_error: Arc<Mutex<Option<EngineError>>>,
  notifier: Arc<N>,
) {
  match execute_component(&task, &cancel).await {
    Ok(()) => {
      notifier.notify(EngineEvent::ComponentDone {
        round_id,
        component: task.name.clone(),
      });
    }
    Err(err) => {
      let mut slot = lock_recover(&first_error);
      if slot.is_none() {
        *slot = Some(err);
        drop(slot);
        // Wake blocked siblings and force the barrier open. Only the first
        // error survives; the ones this cancellation provokes are noise.
        cancel.cancel();
      } else if !matches!(err, EngineError::Cancelled) {
        warn!(component = %task.name, error = %err, "discarding secondary failure");
      }
    }
  }
}

/// Pull bound inputs, run the entry point on the blocking pool, push bound
/// outputs.
async fn execute_component(
  task: &RoundTask,
  cancel: &CancellationToken,
) -> Result<(), EngineError> {
  if cancel.is_cancelled() {
    return Err(EngineError::Cancelled);
  }
  for access in &task.pulls {
    access.pull(&task.name, cancel).await?;
  }

  let component = task.component.clone();
  let outcome = task
    .scheduler
    .run_blocking(move || lock_recover(component.as_ref()).execute())
    .await;
  match outcome {
    Ok(Ok(())) => {}
    Ok(Err(fault)) => {
      return Err(EngineError::ComponentExecution {
        component: task.name.clone(),
        source: fault,
      });
    }
    Err(join_err) => {
      return Err(EngineError::ComponentExecution {
        component: task.name.clone(),
        source: ComponentFault::new(format!("entry point aborted: {join_err}")),
      });
    }
  }

  for access in &task.pushes {
    access.push(&task.name)?;
  }
  Ok(())
}
