//! Precondition checks run by every mutating operation.
//!
//! Each check is pure and fails with its own [`ValidationError`] variant.
//! Callers run all checks before touching entity state or the network.

use std::fmt::Debug;

use crate::cache::{EntityCore, Resource};
use crate::error::ValidationError;
use crate::position::Position;
use crate::service::Service;

type Result<T> = std::result::Result<T, ValidationError>;

/// A value drawn from a closed set that may also carry unrecognized wire values.
pub trait Enumerated: Debug {
  fn is_defined(&self) -> bool;
}

/// The entity must be live and attached to a running service.
pub fn writable(core: &EntityCore) -> Result<Service> {
  if core.is_deleted() {
    return Err(ValidationError::Deleted);
  }
  core.service().ok_or(ValidationError::NotWritable)
}

/// The entity must already carry a server-assigned id.
pub fn has_id(core: &EntityCore) -> Result<String> {
  core.id().ok_or(ValidationError::MissingId)
}

pub fn non_empty_string(field: &'static str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(ValidationError::EmptyString(field));
  }
  Ok(())
}

pub fn nullable<T>(field: &'static str, value: Option<T>) -> Result<T> {
  value.ok_or(ValidationError::ValueRequired(field))
}

pub fn enumeration<E: Enumerated>(field: &'static str, value: &E) -> Result<()> {
  if !value.is_defined() {
    return Err(ValidationError::NotInEnumeration {
      field,
      value: format!("{:?}", value),
    });
  }
  Ok(())
}

/// A referenced entity must exist, be attached and not be deleted.
/// Returns its id.
pub fn entity<T: Resource>(field: &'static str, value: Option<&T>) -> Result<String> {
  let core = value.ok_or(ValidationError::EntityRequired(field))?.core();
  if core.is_deleted() {
    return Err(ValidationError::EntityDeleted(field));
  }
  if core.service().is_none() {
    return Err(ValidationError::EntityDetached(field));
  }
  core.id().ok_or(ValidationError::EntityDetached(field))
}

pub fn position(field: &'static str, value: &Position) -> Result<()> {
  if !value.is_known() {
    return Err(ValidationError::PositionUnknown(field));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::MockTransport;
  use crate::trello::{Card, SummaryPeriod};

  #[test]
  fn test_strings() {
    assert!(non_empty_string("name", "x").is_ok());
    assert_eq!(
      non_empty_string("name", "   "),
      Err(ValidationError::EmptyString("name"))
    );
  }

  #[test]
  fn test_nullable_and_position() {
    assert_eq!(nullable("closed", Some(true)), Ok(true));
    assert_eq!(
      nullable::<bool>("closed", None),
      Err(ValidationError::ValueRequired("closed"))
    );
    assert!(position("pos", &Position::Top).is_ok());
    assert_eq!(
      position("pos", &Position::Unknown),
      Err(ValidationError::PositionUnknown("pos"))
    );
  }

  #[test]
  fn test_enumeration() {
    assert!(enumeration("period", &SummaryPeriod::Hourly).is_ok());
    assert!(matches!(
      enumeration("period", &SummaryPeriod::Other(7)),
      Err(ValidationError::NotInEnumeration { field: "period", .. })
    ));
  }

  #[tokio::test]
  async fn test_entity_arguments() {
    assert_eq!(
      entity::<Card>("card", None),
      Err(ValidationError::EntityRequired("card"))
    );

    let detached = Card::detached(Some("c1"));
    assert_eq!(
      entity("card", Some(detached.as_ref())),
      Err(ValidationError::EntityDetached("card"))
    );
    assert_eq!(writable(detached.core()).err(), Some(ValidationError::NotWritable));

    let (svc, _mock) = MockTransport::service();
    let card = svc.retrieve::<Card>("c1");
    assert_eq!(entity("card", Some(card.as_ref())), Ok("c1".to_string()));
  }
}
