//! Sluice execution engine.
//!
//! Wires independently-authored components into a directed data-flow graph
//! and runs them to completion, one round at a time: concurrent fan-out over
//! a shared worker pool, barrier synchronization, fail-fast error handling.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                        Compound                            │
//! │  - caller-facing wrapper: state object + controller        │
//! └────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │                       Controller                           │
//! │  - wiring: connect / feedback / map_in / map_out           │
//! │  - round protocol: pull inputs, invalidate cells, fan out  │
//! │    one task per component, barrier-wait, push outputs      │
//! └────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌────────────────────────────────────────────────────────────┐
//! │               Shared cells (FieldContent)                  │
//! │  - one producer, many consumers; consumers wait for        │
//! │    validity; delayed accesses read last round's value      │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::{Arc, Mutex};
//! use sluice_engine::{Compound, Scheduler, SharedComponent};
//!
//! let scheduler = Arc::new(Scheduler::new());
//! let source: SharedComponent = Arc::new(Mutex::new(Source::default()));
//! let sink: SharedComponent = Arc::new(Mutex::new(Sink::default()));
//!
//! let mut compound = Compound::new("demo", state, scheduler);
//! compound.connect(&source, "x", &sink, "y")?;
//! compound.run().await?;
//! ```

mod access;
pub mod cell;
mod compound;
mod controller;
mod error;
mod events;
mod registry;
mod scheduler;

pub use cell::FieldContent;
pub use compound::Compound;
pub use controller::Controller;
pub use error::EngineError;
pub use events::{ChannelNotifier, EngineEvent, EventNotifier, NoopNotifier};
pub use scheduler::Scheduler;

// Re-export the collaborator contract so consumers only need one crate.
pub use sluice_component::{
  Component, ComponentFault, Direction, FieldError, FieldSpec, FieldType, Fields,
  SharedComponent, SharedFields,
};
