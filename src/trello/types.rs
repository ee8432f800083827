//! Enumerated field values.
//!
//! Each enum keeps an `Other` variant so unrecognized wire values survive a
//! read; the validator rejects `Other` on writes.

use serde_json::Value;

use crate::record::FieldValue;
use crate::validator::Enumerated;

/// Completion state of a check item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckItemState {
  Incomplete,
  Complete,
  Other(String),
}

impl CheckItemState {
  pub fn as_str(&self) -> &str {
    match self {
      CheckItemState::Incomplete => "incomplete",
      CheckItemState::Complete => "complete",
      CheckItemState::Other(s) => s,
    }
  }
}

impl From<&str> for CheckItemState {
  fn from(s: &str) -> Self {
    match s {
      "incomplete" => CheckItemState::Incomplete,
      "complete" => CheckItemState::Complete,
      other => CheckItemState::Other(other.to_string()),
    }
  }
}

/// Permission level of a board member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MembershipType {
  Normal,
  Admin,
  Observer,
  Other(String),
}

impl MembershipType {
  pub fn as_str(&self) -> &str {
    match self {
      MembershipType::Normal => "normal",
      MembershipType::Admin => "admin",
      MembershipType::Observer => "observer",
      MembershipType::Other(s) => s,
    }
  }
}

impl From<&str> for MembershipType {
  fn from(s: &str) -> Self {
    match s {
      "normal" => MembershipType::Normal,
      "admin" => MembershipType::Admin,
      "observer" => MembershipType::Observer,
      other => MembershipType::Other(other.to_string()),
    }
  }
}

/// How often a member receives summary emails, in minutes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryPeriod {
  Disabled,
  EveryMinute,
  Hourly,
  Other(i64),
}

impl SummaryPeriod {
  pub fn minutes(&self) -> i64 {
    match self {
      SummaryPeriod::Disabled => -1,
      SummaryPeriod::EveryMinute => 1,
      SummaryPeriod::Hourly => 60,
      SummaryPeriod::Other(m) => *m,
    }
  }
}

impl From<i64> for SummaryPeriod {
  fn from(minutes: i64) -> Self {
    match minutes {
      -1 => SummaryPeriod::Disabled,
      1 => SummaryPeriod::EveryMinute,
      60 => SummaryPeriod::Hourly,
      other => SummaryPeriod::Other(other),
    }
  }
}

/// What an action records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionType {
  CreateBoard,
  CreateList,
  UpdateList,
  CreateCard,
  UpdateCard,
  DeleteCard,
  CommentCard,
  AddChecklistToCard,
  UpdateCheckItemStateOnCard,
  AddMemberToBoard,
  Other(String),
}

impl ActionType {
  pub fn as_str(&self) -> &str {
    match self {
      ActionType::CreateBoard => "createBoard",
      ActionType::CreateList => "createList",
      ActionType::UpdateList => "updateList",
      ActionType::CreateCard => "createCard",
      ActionType::UpdateCard => "updateCard",
      ActionType::DeleteCard => "deleteCard",
      ActionType::CommentCard => "commentCard",
      ActionType::AddChecklistToCard => "addChecklistToCard",
      ActionType::UpdateCheckItemStateOnCard => "updateCheckItemStateOnCard",
      ActionType::AddMemberToBoard => "addMemberToBoard",
      ActionType::Other(s) => s,
    }
  }
}

impl From<&str> for ActionType {
  fn from(s: &str) -> Self {
    match s {
      "createBoard" => ActionType::CreateBoard,
      "createList" => ActionType::CreateList,
      "updateList" => ActionType::UpdateList,
      "createCard" => ActionType::CreateCard,
      "updateCard" => ActionType::UpdateCard,
      "deleteCard" => ActionType::DeleteCard,
      "commentCard" => ActionType::CommentCard,
      "addChecklistToCard" => ActionType::AddChecklistToCard,
      "updateCheckItemStateOnCard" => ActionType::UpdateCheckItemStateOnCard,
      "addMemberToBoard" => ActionType::AddMemberToBoard,
      other => ActionType::Other(other.to_string()),
    }
  }
}

// ============================================================================
// Record conversions
// ============================================================================

impl FieldValue for CheckItemState {
  fn from_value(value: &Value) -> Option<Self> {
    value.as_str().map(Self::from)
  }

  fn to_value(&self) -> Value {
    Value::String(self.as_str().to_string())
  }
}

impl FieldValue for MembershipType {
  fn from_value(value: &Value) -> Option<Self> {
    value.as_str().map(Self::from)
  }

  fn to_value(&self) -> Value {
    Value::String(self.as_str().to_string())
  }
}

impl FieldValue for SummaryPeriod {
  fn from_value(value: &Value) -> Option<Self> {
    value.as_i64().map(Self::from)
  }

  fn to_value(&self) -> Value {
    Value::from(self.minutes())
  }
}

impl FieldValue for ActionType {
  fn from_value(value: &Value) -> Option<Self> {
    value.as_str().map(Self::from)
  }

  fn to_value(&self) -> Value {
    Value::String(self.as_str().to_string())
  }
}

// ============================================================================
// Validation
// ============================================================================

impl Enumerated for CheckItemState {
  fn is_defined(&self) -> bool {
    !matches!(self, CheckItemState::Other(_))
  }
}

impl Enumerated for MembershipType {
  fn is_defined(&self) -> bool {
    !matches!(self, MembershipType::Other(_))
  }
}

impl Enumerated for SummaryPeriod {
  fn is_defined(&self) -> bool {
    !matches!(self, SummaryPeriod::Other(_))
  }
}
