//! Field descriptors and value types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Direction of a declared field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
  In,
  Out,
}

/// Value type of a declared field.
///
/// Assignability is checked at wiring time, never at run time: the
/// destination field's type must accept the source field's type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
  /// Accepts any value.
  Any,
  Bool,
  Integer,
  Float,
  /// Accepts both `Integer` and `Float`.
  Number,
  String,
  Array,
  Object,
}

impl FieldType {
  /// Whether a value of `source` type can flow into a field of this type.
  pub fn accepts(self, source: FieldType) -> bool {
    match (self, source) {
      (FieldType::Any, _) => true,
      (FieldType::Number, FieldType::Integer | FieldType::Float) => true,
      (a, b) => a == b,
    }
  }

  /// The type of a concrete value, or `None` for `null` (null carries no
  /// type and cannot be bound).
  pub fn of(value: &Value) -> Option<FieldType> {
    match value {
      Value::Null => None,
      Value::Bool(_) => Some(FieldType::Bool),
      Value::Number(n) if n.is_f64() => Some(FieldType::Float),
      Value::Number(_) => Some(FieldType::Integer),
      Value::String(_) => Some(FieldType::String),
      Value::Array(_) => Some(FieldType::Array),
      Value::Object(_) => Some(FieldType::Object),
    }
  }
}

/// One declared input or output slot on a component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
  pub name: String,
  pub direction: Direction,
  pub ty: FieldType,
}

impl FieldSpec {
  /// Declare an input slot.
  pub fn input(name: impl Into<String>, ty: FieldType) -> Self {
    Self {
      name: name.into(),
      direction: Direction::In,
      ty,
    }
  }

  /// Declare an output slot.
  pub fn output(name: impl Into<String>, ty: FieldType) -> Self {
    Self {
      name: name.into(),
      direction: Direction::Out,
      ty,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn any_accepts_everything() {
    for ty in [
      FieldType::Bool,
      FieldType::Integer,
      FieldType::Float,
      FieldType::Number,
      FieldType::String,
      FieldType::Array,
      FieldType::Object,
      FieldType::Any,
    ] {
      assert!(FieldType::Any.accepts(ty));
    }
  }

  #[test]
  fn number_accepts_integer_and_float() {
    assert!(FieldType::Number.accepts(FieldType::Integer));
    assert!(FieldType::Number.accepts(FieldType::Float));
    assert!(FieldType::Number.accepts(FieldType::Number));
    assert!(!FieldType::Number.accepts(FieldType::String));
  }

  #[test]
  fn narrower_types_reject_wider_sources() {
    assert!(!FieldType::Integer.accepts(FieldType::Number));
    assert!(!FieldType::Integer.accepts(FieldType::Float));
    assert!(!FieldType::String.accepts(FieldType::Any));
  }

  #[test]
  fn value_types() {
    assert_eq!(FieldType::of(&json!(true)), Some(FieldType::Bool));
    assert_eq!(FieldType::of(&json!(3)), Some(FieldType::Integer));
    assert_eq!(FieldType::of(&json!(3.5)), Some(FieldType::Float));
    assert_eq!(FieldType::of(&json!("s")), Some(FieldType::String));
    assert_eq!(FieldType::of(&json!([1])), Some(FieldType::Array));
    assert_eq!(FieldType::of(&json!({})), Some(FieldType::Object));
    assert_eq!(FieldType::of(&Value::Null), None);
  }
}
