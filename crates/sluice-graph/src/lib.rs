//! Sluice dependency graph.
//!
//! Records the ordinary (non-delayed) connections between registered
//! components and detects cycles among them. Delayed feedback connections
//! are deliberately never recorded here: they break cycles by design, so
//! they must not trip the detector.
//!
//! Nodes are the dense component ids handed out by the engine's registry;
//! mapping an id back to a component name for error reporting is the
//! caller's job.

mod error;
mod graph;

pub use error::GraphError;
pub use graph::DependencyGraph;
