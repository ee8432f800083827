//! Backing records and conversion of field values to and from them.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// Raw field snapshot of a remote resource, as last returned by the server.
pub type Record = Map<String, Value>;

/// Ordered field name to value map, used for staged writes and request bodies.
pub type Params = Map<String, Value>;

/// Conversion between a typed field value and its record representation.
pub trait FieldValue: Sized {
  fn from_value(value: &Value) -> Option<Self>;
  fn to_value(&self) -> Value;
}

impl FieldValue for String {
  fn from_value(value: &Value) -> Option<Self> {
    value.as_str().map(String::from)
  }

  fn to_value(&self) -> Value {
    Value::String(self.clone())
  }
}

impl FieldValue for bool {
  fn from_value(value: &Value) -> Option<Self> {
    match value {
      Value::Bool(b) => Some(*b),
      Value::String(s) => s.parse().ok(),
      _ => None,
    }
  }

  fn to_value(&self) -> Value {
    Value::Bool(*self)
  }
}

impl FieldValue for i64 {
  fn from_value(value: &Value) -> Option<Self> {
    value.as_i64()
  }

  fn to_value(&self) -> Value {
    Value::from(*self)
  }
}

impl FieldValue for f64 {
  fn from_value(value: &Value) -> Option<Self> {
    value.as_f64()
  }

  fn to_value(&self) -> Value {
    Value::from(*self)
  }
}

impl FieldValue for DateTime<Utc> {
  fn from_value(value: &Value) -> Option<Self> {
    value
      .as_str()
      .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
      .map(|dt| dt.with_timezone(&Utc))
  }

  fn to_value(&self) -> Value {
    Value::String(self.to_rfc3339_opts(chrono::SecondsFormat::Millis, true))
  }
}

impl FieldValue for Value {
  fn from_value(value: &Value) -> Option<Self> {
    Some(value.clone())
  }

  fn to_value(&self) -> Value {
    self.clone()
  }
}

/// Read the server-assigned id out of a record.
pub(crate) fn record_id(record: &Record) -> Option<String> {
  record
    .get("id")
    .and_then(Value::as_str)
    .filter(|id| !id.is_empty())
    .map(String::from)
}

/// Render a value the way it is sent as a query/form parameter.
pub(crate) fn param_string(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => String::new(),
    other => other.to_string(),
  }
}
