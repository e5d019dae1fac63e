//! Shared data cells bound between component fields.

use std::sync::Mutex;

use serde_json::Value;
use tokio::sync::Notify;

/// The value container shared between a producing output and its consumers.
///
/// A cell is invalidated at the start of every round and becomes valid again
/// once its producer writes it during that round. Consumers waiting in
/// [`recv`](FieldContent::recv) are woken by the write; a consumer chain that
/// can never be woken is exactly the deadlock the wiring-time cycle check
/// exists to prevent.
///
/// Invalidation clears validity but keeps the value, so delayed accesses can
/// still observe the previous round's result through
/// [`peek`](FieldContent::peek).
#[derive(Debug, Default)]
pub struct FieldContent {
  state: Mutex<CellState>,
  notify: Notify,
}

#[derive(Debug, Default)]
struct CellState {
  value: Option<Value>,
  valid: bool,
  leaf: bool,
  is_in: bool,
  is_out: bool,
}

impl FieldContent {
  pub fn new() -> Self {
    Self::default()
  }

  /// Write a value and mark the cell valid, waking all waiting consumers.
  pub fn write(&self, value: Value) {
    {
      let mut state = lock(&self.state);
      state.value = Some(value);
      state.valid = true;
    }
    self.notify.notify_waiters();
  }

  /// Wait until the cell is valid, then return its value.
  pub async fn recv(&self) -> Value {
    loop {
      let notified = self.notify.notified();
      tokio::pin!(notified);
      // Register before checking so a write between the check and the
      // await cannot be missed.
      notified.as_mut().enable();
      if let Some(value) = self.read_valid() {
        return value;
      }
      notified.await;
    }
  }

  /// The current value regardless of validity.
  pub fn peek(&self) -> Option<Value> {
    lock(&self.state).value.clone()
  }

  /// Clear validity at round start.
  ///
  /// The value is kept. Cells tagged both leaf and in keep their validity:
  /// their producing write is the compound input pull, which has already
  /// happened when the sweep runs.
  pub fn invalidate(&self) {
    let mut state = lock(&self.state);
    if state.leaf && state.is_in {
      return;
    }
    state.valid = false;
  }

  pub fn is_valid(&self) -> bool {
    lock(&self.state).valid
  }

  /// Tag the cell as sitting on the compound boundary. Idempotent.
  pub fn tag_leaf(&self) {
    lock(&self.state).leaf = true;
  }

  /// Tag the cell as feeding an input. Idempotent.
  pub fn tag_in(&self) {
    lock(&self.state).is_in = true;
  }

  /// Tag the cell as fed by an output. Idempotent.
  pub fn tag_out(&self) {
    lock(&self.state).is_out = true;
  }

  pub fn is_leaf(&self) -> bool {
    lock(&self.state).leaf
  }

  pub fn is_in(&self) -> bool {
    lock(&self.state).is_in
  }

  pub fn is_out(&self) -> bool {
    lock(&self.state).is_out
  }

  fn read_valid(&self) -> Option<Value> {
    let state = lock(&self.state);
    if state.valid { state.value.clone() } else { None }
  }
}

// A poisoned cell lock means a thread panicked mid-update; the state itself
// is a plain value and stays coherent, so recover rather than wedge the
// round.
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::Arc;
  use std::time::Duration;

  #[test]
  fn write_marks_valid_and_keeps_value_across_invalidate() {
    let cell = FieldContent::new();
    assert!(!cell.is_valid());
    cell.write(json!(5));
    assert!(cell.is_valid());
    cell.invalidate();
    assert!(!cell.is_valid());
    assert_eq!(cell.peek(), Some(json!(5)));
  }

  #[test]
  fn leaf_in_cells_survive_invalidation() {
    let cell = FieldContent::new();
    cell.tag_leaf();
    cell.tag_in();
    cell.write(json!("external"));
    cell.invalidate();
    assert!(cell.is_valid());
  }

  #[test]
  fn tags_are_idempotent_and_combine() {
    let cell = FieldContent::new();
    cell.tag_leaf();
    cell.tag_leaf();
    cell.tag_in();
    cell.tag_out();
    assert!(cell.is_leaf());
    assert!(cell.is_in());
    assert!(cell.is_out());
  }

  #[tokio::test]
  async fn recv_returns_immediately_when_valid() {
    let cell = FieldContent::new();
    cell.write(json!(1));
    assert_eq!(cell.recv().await, json!(1));
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn recv_wakes_on_write() {
    let cell = Arc::new(FieldContent::new());
    let waiter = {
      let cell = cell.clone();
      tokio::spawn(async move { cell.recv().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    cell.write(json!(42));
    let value = tokio::time::timeout(Duration::from_secs(1), waiter)
      .await
      .unwrap()
      .unwrap();
    assert_eq!(value, json!(42));
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn recv_wakes_all_waiters() {
    let cell = Arc::new(FieldContent::new());
    let waiters: Vec<_> = (0..3)
      .map(|_| {
        let cell = cell.clone();
        tokio::spawn(async move { cell.recv().await })
      })
      .collect();
    tokio::time::sleep(Duration::from_millis(20)).await;
    cell.write(json!("shared"));
    for waiter in waiters {
      let value = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .unwrap()
        .unwrap();
      assert_eq!(value, json!("shared"));
    }
  }
}
