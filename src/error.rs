//! Error taxonomy for every cache-aware operation.

use color_eyre::eyre::Report;
use thiserror::Error;

use crate::endpoint::ResourceKind;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failure of an operation on an entity, collection or the write queue.
#[derive(Debug, Error)]
pub enum Error {
  /// A precondition failed before anything reached the network.
  #[error(transparent)]
  Validation(#[from] ValidationError),

  /// The transport collaborator failed; carried through untouched.
  #[error("transport failure: {0:#}")]
  Transport(Report),

  /// The remote resource no longer exists.
  #[error("{kind} {id} no longer exists")]
  NotFound { kind: ResourceKind, id: String },

  /// The remote API does not expose this operation.
  #[error("{0} is not supported by the remote API")]
  Unsupported(&'static str),

  /// The flush processor task has stopped.
  #[error("write queue is no longer running")]
  QueueClosed,
}

impl Error {
  pub fn is_validation(&self) -> bool {
    matches!(self, Error::Validation(_))
  }

  pub fn is_not_found(&self) -> bool {
    matches!(self, Error::NotFound { .. })
  }
}

/// A named precondition that was violated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
  #[error("entity is not attached to a live service")]
  NotWritable,

  #[error("entity has been deleted")]
  Deleted,

  #[error("entity has no id yet")]
  MissingId,

  #[error("`{0}` must not be empty")]
  EmptyString(&'static str),

  #[error("`{0}` requires a value")]
  ValueRequired(&'static str),

  #[error("`{field}` is not a defined value: {value}")]
  NotInEnumeration { field: &'static str, value: String },

  #[error("`{0}` requires an entity")]
  EntityRequired(&'static str),

  #[error("`{0}` refers to an entity that is not attached or has no id")]
  EntityDetached(&'static str),

  #[error("`{0}` refers to a deleted entity")]
  EntityDeleted(&'static str),

  #[error("`{0}` requires a concrete position")]
  PositionUnknown(&'static str),

  #[error("collection options cannot change once it has been enumerated")]
  CollectionLocked,
}
