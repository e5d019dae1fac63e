//! Error types for field access and component execution.

use thiserror::Error;

/// Errors raised by [`Fields`](crate::Fields) implementations.
#[derive(Debug, Error)]
pub enum FieldError {
  #[error("no such field: {0}")]
  NoSuchField(String),

  #[error("field is not writable: {0}")]
  NotWritable(String),

  #[error("incompatible value for field '{field}': {message}")]
  IncompatibleValue { field: String, message: String },
}

/// Failure raised by a component's entry point.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct ComponentFault {
  message: String,
  #[source]
  source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ComponentFault {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      source: None,
    }
  }

  /// A fault wrapping an underlying cause.
  pub fn with_source(
    message: impl Into<String>,
    source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
  ) -> Self {
    Self {
      message: message.into(),
      source: Some(source.into()),
    }
  }
}
