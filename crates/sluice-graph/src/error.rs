use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
  /// The node can reach itself through ordinary connections.
  #[error("circular reference through node {node}")]
  CircularReference { node: usize },
}
