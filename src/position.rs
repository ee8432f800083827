//! Sibling rank used to order lists, cards, checklists and check items.

use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

use crate::record::FieldValue;

/// Rank of an entity among its siblings.
///
/// `Top` sorts before every concrete value and `Bottom` after. `Unknown`
/// means the rank has not been assigned or needs a refresh; it has no
/// ordering relative to anything and is not equal to anything, including
/// another `Unknown`.
#[derive(Debug, Clone, Copy, Default)]
pub enum Position {
  Top,
  Bottom,
  Value(f64),
  #[default]
  Unknown,
}

impl Position {
  /// Build a concrete rank. Non-finite or non-positive values are `Unknown`.
  pub fn new(value: f64) -> Self {
    if value.is_finite() && value > 0.0 {
      Position::Value(value)
    } else {
      Position::Unknown
    }
  }

  pub fn is_known(&self) -> bool {
    !matches!(self, Position::Unknown)
  }

  /// The numeric rank, if this is a concrete value.
  pub fn value(&self) -> Option<f64> {
    match self {
      Position::Value(v) => Some(*v),
      _ => None,
    }
  }

  /// Total key for stable sorting: `Unknown` goes after `Bottom`.
  pub(crate) fn sort_key(&self) -> (u8, f64) {
    match self {
      Position::Top => (0, 0.0),
      Position::Value(v) => (1, *v),
      Position::Bottom => (2, 0.0),
      Position::Unknown => (3, 0.0),
    }
  }

  pub(crate) fn cmp_for_sort(&self, other: &Self) -> Ordering {
    let (a_class, a_value) = self.sort_key();
    let (b_class, b_value) = other.sort_key();
    a_class
      .cmp(&b_class)
      .then_with(|| a_value.total_cmp(&b_value))
  }
}

impl PartialEq for Position {
  fn eq(&self, other: &Self) -> bool {
    self.partial_cmp(other) == Some(Ordering::Equal)
  }
}

impl PartialOrd for Position {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    if !self.is_known() || !other.is_known() {
      return None;
    }
    Some(self.cmp_for_sort(other))
  }
}

impl fmt::Display for Position {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Position::Top => f.write_str("top"),
      Position::Bottom => f.write_str("bottom"),
      Position::Value(v) => write!(f, "{}", v),
      Position::Unknown => f.write_str("unknown"),
    }
  }
}

impl FieldValue for Position {
  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Number(n) => n.as_f64().map(Position::new),
      Value::String(s) => match s.as_str() {
        "top" => Some(Position::Top),
        "bottom" => Some(Position::Bottom),
        other => other.parse::<f64>().ok().map(Position::new),
      },
      _ => None,
    }
  }

  fn to_value(&self) -> Value {
    match self {
      Position::Value(v) => Value::from(*v),
      Position::Unknown => Value::Null,
      other => Value::String(other.to_string()),
    }
  }
}
