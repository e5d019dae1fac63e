//! Lifecycle events and notifiers for observability.
//!
//! Events are emitted while wiring and while executing rounds so consumers
//! can log progress, drive UIs or collect metrics. They are observability
//! only: an observer can never block or alter scheduling.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Events emitted by a controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EngineEvent {
  /// Two component fields were connected. `delayed` marks a feedback
  /// connection.
  Connected {
    from: String,
    from_field: String,
    to: String,
    to_field: String,
    delayed: bool,
  },

  /// A compound input was mapped onto a child input.
  MappedIn {
    field: String,
    to: String,
    to_field: String,
  },

  /// A child output was mapped onto a compound output.
  MappedOut {
    field: String,
    from: String,
    from_field: String,
  },

  /// A round has started.
  Started { round_id: String, compound: String },

  /// A component finished its work for the round.
  ComponentDone { round_id: String, component: String },

  /// The round is aborting with an error.
  ExceptionRaised { round_id: String, error: String },

  /// All components finished; compound outputs are about to be published.
  Finished { round_id: String, compound: String },
}

/// Trait for receiving engine events.
///
/// The controller calls `notify` for each event. Implementations decide what
/// to do with them (log, persist, broadcast, ignore) and must return
/// quickly.
pub trait EventNotifier: Send + Sync + 'static {
  fn notify(&self, event: EngineEvent);
}

/// Discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl EventNotifier for NoopNotifier {
  fn notify(&self, _event: EngineEvent) {
    // Intentionally empty
  }
}

/// Sends events to an unbounded channel.
///
/// Unbounded so a slow consumer can never stall a round; the volume is a
/// handful of events per round, so memory growth is not a practical concern.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  sender: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<EngineEvent>) -> Self {
    Self { sender }
  }
}

impl EventNotifier for ChannelNotifier {
  fn notify(&self, event: EngineEvent) {
    // Receiver may be gone; events are fire-and-forget.
    let _ = self.sender.send(event);
  }
}
