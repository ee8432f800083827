//! Core traits for cacheable entities and their capabilities.
//!
//! Every proxy implements [`Resource`]. What it can do beyond being read is
//! opted into per type: [`Refreshable`], [`Mutable`] and [`Deletable`].

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use super::entity::{self, EntityCore};
use crate::endpoint::{Endpoint, ResourceKind};
use crate::error::Result;
use crate::position::Position;
use crate::record::{Params, Record};
use crate::transport::Query;
use crate::validator;

/// The minimal field set a refresh asks for, plus suppression flags that
/// keep the server from expanding nested resources.
#[derive(Debug, Clone, Copy)]
pub struct Projection {
  pub fields: &'static [&'static str],
  pub suppress: &'static [(&'static str, &'static str)],
}

impl Projection {
  pub const fn new(
    fields: &'static [&'static str],
    suppress: &'static [(&'static str, &'static str)],
  ) -> Self {
    Self { fields, suppress }
  }

  pub fn fields_param(&self) -> String {
    self.fields.join(",")
  }

  pub fn query(&self) -> Query {
    let mut query = Vec::with_capacity(self.suppress.len() + 1);
    if !self.fields.is_empty() {
      query.push(("fields".to_string(), self.fields_param()));
    }
    query.extend(
      self
        .suppress
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string())),
    );
    query
  }
}

/// A local proxy for one remote resource.
pub trait Resource: Send + Sync + Sized + 'static {
  const KIND: ResourceKind;

  const PROJECTION: Projection;

  /// Whether sibling collections of this type are ordered by `pos`.
  const ORDERED: bool = false;

  /// Fields a refresh keeps from the cached record when the response
  /// omits them.
  const CARRIED: &'static [&'static str] = &[];

  fn from_core(core: EntityCore) -> Self;

  fn core(&self) -> &EntityCore;

  /// A new proxy that is not attached to any service.
  fn detached(id: Option<&str>) -> Arc<Self> {
    Arc::new(Self::from_core(EntityCore::new(Self::KIND, id)))
  }

  fn id(&self) -> Option<String> {
    self.core().id()
  }

  fn is_deleted(&self) -> bool {
    self.core().is_deleted()
  }

  /// Where this entity is read, written and deleted.
  fn endpoint(&self) -> Result<Endpoint> {
    let id = validator::has_id(self.core())?;
    Ok(Endpoint::entity(Self::KIND, &id))
  }

  /// Where a new entity of this type is created.
  fn create_endpoint(&self) -> Result<Endpoint> {
    Ok(Endpoint::collection(Self::KIND))
  }

  /// Rank among siblings from the cached record, without refreshing.
  fn cached_position(&self) -> Position {
    self.core().peek("pos").unwrap_or_default()
  }

  /// Fill in what a record fetched through an owner's collection leaves
  /// implicit, such as the owner reference itself.
  fn adopt(_record: &mut Record, _owner: ResourceKind, _owner_id: &str) {}
}

pub trait Refreshable: Resource {
  /// Re-read the full current state. `Ok(false)` means the remote resource
  /// no longer exists; the stale record stays readable.
  fn refresh(&self) -> impl Future<Output = Result<bool>> + Send {
    entity::refresh(self, false)
  }

  /// Force the next read to refresh, regardless of expiry.
  fn mark_for_update(&self) {
    self.core().mark_for_update();
  }

  fn is_expired(&self) -> bool {
    self.core().is_expired()
  }
}

/// HTTP verb of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMethod {
  Post,
  Put,
}

/// One request produced by flushing an entity's pending parameters.
#[derive(Debug, Clone)]
pub struct WriteRequest {
  pub method: WriteMethod,
  pub endpoint: Endpoint,
  pub params: Params,
  /// Whether the response is the entity's full record.
  pub returns_record: bool,
}

impl WriteRequest {
  pub fn put(endpoint: Endpoint, params: Params) -> Self {
    Self {
      method: WriteMethod::Put,
      endpoint,
      params,
      returns_record: true,
    }
  }

  pub fn post(endpoint: Endpoint, params: Params) -> Self {
    Self {
      method: WriteMethod::Post,
      endpoint,
      params,
      returns_record: true,
    }
  }

  pub fn without_record(mut self) -> Self {
    self.returns_record = false;
    self
  }
}

pub trait Mutable: Resource {
  /// Requests that carry the given pending parameters to the server.
  ///
  /// Entities with an id are updated in place; entities without one are
  /// created.
  fn write_requests(&self, params: &Params) -> Result<Vec<WriteRequest>> {
    let request = match self.core().id() {
      Some(_) => WriteRequest::put(self.endpoint()?, params.clone()),
      None => WriteRequest::post(self.create_endpoint()?, params.clone()),
    };
    Ok(vec![request])
  }

  /// Called after a field changed locally, with its previous value.
  fn staged(&self, _field: &str, _previous: Option<&Value>) {}

  /// Mark collections and entities that depend on this one as stale.
  fn invalidate_dependents(&self) {}

  /// Called once a write for this entity succeeded. `replaced` maps each
  /// sent field to the value it held before, `Null` when that was unknown.
  fn written(&self, _sent: &Params, _replaced: &Params) {
    self.invalidate_dependents();
  }
}

pub trait Deletable: Resource {
  /// Delete the remote resource. Deleting twice is a no-op.
  fn delete(&self) -> impl Future<Output = Result<()>> + Send {
    entity::delete(self)
  }

  /// Mark collections that listed this entity as stale. Runs just before
  /// the entity is flagged deleted, so cached fields are still readable.
  fn before_delete(&self) {}
}
