//! Expiring entity state and the read/refresh/write/delete protocol.

use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

use super::queue::Flushable;
use super::traits::{Deletable, Mutable, Resource};
use crate::endpoint::ResourceKind;
use crate::error::{Error, Result};
use crate::record::{self, FieldValue, Params, Record};
use crate::service::{Service, WeakService};
use crate::validator;

#[derive(Debug, Default)]
struct EntityState {
  id: Option<String>,
  record: Record,
  pending: Params,
  /// Value each pending field held before it was first staged, `Null` when
  /// it was never loaded.
  replaced: Params,
  deleted: bool,
  /// Kind generation at the last sync. `None` means expired.
  synced_at: Option<u64>,
  /// Completed refreshes, used to let waiters reuse an in-flight result.
  refreshes: u64,
  /// Outcome of the last completed refresh.
  exists: bool,
}

/// Shared state every proxy embeds: identity, backing record, staged
/// writes, expiry and the handle to its service.
///
/// Reads and writes of the record happen under one lock so a reader never
/// observes a half-applied record. Concurrent mutation of one entity from
/// two flows is last-write-wins on the staged parameters and is otherwise
/// not coordinated.
#[derive(Debug)]
pub struct EntityCore {
  kind: ResourceKind,
  service: RwLock<WeakService>,
  state: RwLock<EntityState>,
  refresh_gate: tokio::sync::Mutex<()>,
}

/// Result of staging a field change.
pub(crate) enum Staged {
  Unchanged,
  Changed(Option<Value>),
}

impl EntityCore {
  /// A detached core, optionally with a known id.
  pub(crate) fn new(kind: ResourceKind, id: Option<&str>) -> Self {
    Self {
      kind,
      service: RwLock::new(WeakService::new()),
      state: RwLock::new(EntityState {
        id: id.map(String::from),
        ..EntityState::default()
      }),
      refresh_gate: tokio::sync::Mutex::new(()),
    }
  }

  pub(crate) fn attached(kind: ResourceKind, id: &str, service: WeakService) -> Self {
    let core = Self::new(kind, Some(id));
    core.attach(service);
    core
  }

  fn read(&self) -> RwLockReadGuard<'_, EntityState> {
    self.state.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, EntityState> {
    self.state.write().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn kind(&self) -> ResourceKind {
    self.kind
  }

  pub fn id(&self) -> Option<String> {
    self.read().id.clone()
  }

  pub fn is_deleted(&self) -> bool {
    self.read().deleted
  }

  /// The live service this entity is attached to, if any.
  pub fn service(&self) -> Option<Service> {
    self
      .service
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .upgrade()
      .map(Service::from_inner)
  }

  pub fn is_attached(&self) -> bool {
    self.service().is_some()
  }

  pub(crate) fn attach(&self, service: WeakService) {
    *self.service.write().unwrap_or_else(PoisonError::into_inner) = service;
  }

  /// Expired entities refresh before their next read. Detached entities
  /// never expire since there is nothing to refresh from.
  pub fn is_expired(&self) -> bool {
    let Some(service) = self.service() else {
      return false;
    };
    match self.read().synced_at {
      Some(generation) => service.generation(self.kind) > generation,
      None => true,
    }
  }

  pub fn mark_for_update(&self) {
    self.write().synced_at = None;
  }

  /// Staged parameters not yet written.
  pub fn pending(&self) -> Params {
    self.read().pending.clone()
  }

  pub fn has_pending(&self) -> bool {
    !self.read().pending.is_empty()
  }

  /// A field from the cached record, without any expiry check.
  pub(crate) fn peek<V: FieldValue>(&self, field: &str) -> Option<V> {
    let state = self.read();
    if state.deleted {
      return None;
    }
    state.record.get(field).and_then(V::from_value)
  }

  /// Copy of the whole cached record.
  pub fn snapshot(&self) -> Record {
    self.read().record.clone()
  }

  /// Replace the backing record wholesale. Staged values are laid back on
  /// top so optimistic reads survive until they are written.
  pub(crate) fn apply_record(&self, mut record: Record, generation: Option<u64>) {
    let mut state = self.write();
    if state.id.is_none() {
      state.id = record::record_id(&record);
    }
    for (field, value) in &state.pending {
      record.insert(field.clone(), value.clone());
    }
    state.record = record;
    if generation.is_some() {
      state.synced_at = generation;
    }
  }

  /// Copy `fields` from the cached record into `record` where it lacks them.
  pub(crate) fn carry_over(&self, record: &mut Record, fields: &[&str]) {
    let state = self.read();
    for field in fields {
      if record.contains_key(*field) {
        continue;
      }
      if let Some(value) = state.record.get(*field) {
        record.insert(field.to_string(), value.clone());
      }
    }
  }

  pub(crate) fn stage(&self, field: &str, value: Value) -> Staged {
    let mut state = self.write();
    if state.record.get(field) == Some(&value) {
      return Staged::Unchanged;
    }
    state.pending.insert(field.to_string(), value.clone());
    let previous = state.record.insert(field.to_string(), value);
    state
      .replaced
      .entry(field.to_string())
      .or_insert_with(|| previous.clone().unwrap_or(Value::Null));
    Staged::Changed(previous)
  }

  /// Undo a staged change that could not be queued.
  pub(crate) fn unstage(&self, field: &str, previous: Option<Value>) {
    let mut state = self.write();
    state.pending.remove(field);
    state.replaced.remove(field);
    match previous {
      Some(value) => state.record.insert(field.to_string(), value),
      None => state.record.remove(field),
    };
  }

  /// Drop the staged fields that were sent, unless they were re-staged
  /// with a different value while the write was in flight. Returns what the
  /// sent fields held before this write.
  pub(crate) fn clear_sent(&self, sent: &Params) -> Params {
    let mut state = self.write();
    let mut replaced = Params::new();
    for (field, value) in sent {
      let previous = state.replaced.remove(field).unwrap_or(Value::Null);
      if state.pending.get(field) == Some(value) {
        state.pending.remove(field);
      } else {
        state.replaced.insert(field.clone(), value.clone());
      }
      replaced.insert(field.clone(), previous);
    }
    replaced
  }

  pub(crate) fn mark_deleted(&self) {
    let mut state = self.write();
    state.deleted = true;
    state.pending.clear();
    state.replaced.clear();
    state.synced_at = None;
  }

  fn refresh_count(&self) -> u64 {
    self.read().refreshes
  }

  fn finish_refresh(&self, exists: bool) {
    let mut state = self.write();
    state.refreshes += 1;
    state.exists = exists;
  }
}

/// Read a field, refreshing first if the entity has expired.
pub(crate) async fn read<T: Resource, V: FieldValue>(entity: &T, field: &str) -> Result<Option<V>> {
  let core = entity.core();
  if core.is_deleted() {
    return Ok(None);
  }
  if core.is_expired() && core.id().is_some() && !refresh(entity, true).await? {
    return Err(Error::NotFound {
      kind: T::KIND,
      id: core.id().unwrap_or_default(),
    });
  }
  Ok(core.peek(field))
}

/// Fetch the entity's current state. At most one fetch per entity runs at a
/// time; a caller that waited on another caller's completed refresh reuses
/// its outcome instead of fetching again.
pub(crate) async fn refresh<T: Resource>(entity: &T, only_if_expired: bool) -> Result<bool> {
  let core = entity.core();
  if core.is_deleted() {
    return Ok(false);
  }
  let service = core.service().ok_or(crate::ValidationError::NotWritable)?;
  let endpoint = entity.endpoint()?;

  let seen = core.refresh_count();
  let _guard = core.refresh_gate.lock().await;
  if core.refresh_count() != seen {
    return Ok(core.read().exists);
  }
  if only_if_expired && !core.is_expired() {
    return Ok(true);
  }

  let generation = service.generation(T::KIND);
  let query = T::PROJECTION.query();
  debug!(kind = %T::KIND, %endpoint, "refreshing");
  match service.get(&endpoint, &query).await? {
    Some(mut record) => {
      core.carry_over(&mut record, T::CARRIED);
      core.apply_record(record, Some(generation));
      core.finish_refresh(true);
      Ok(true)
    }
    None => {
      debug!(kind = %T::KIND, %endpoint, "remote resource is gone");
      core.finish_refresh(false);
      Ok(false)
    }
  }
}

/// Stage a field change and queue it for the next flush.
pub(crate) fn write<T: Mutable>(entity: &Arc<T>, field: &str, value: Value) -> Result<()> {
  let core = entity.core();
  let service = validator::writable(core)?;
  let previous = match core.stage(field, value) {
    Staged::Unchanged => return Ok(()),
    Staged::Changed(previous) => previous,
  };
  if let Err(e) = service.enqueue(Arc::clone(entity) as Arc<dyn Flushable>) {
    core.unstage(field, previous);
    return Err(e);
  }
  entity.staged(field, previous.as_ref());
  entity.invalidate_dependents();
  Ok(())
}

pub(crate) async fn delete<T: Deletable>(entity: &T) -> Result<()> {
  let core = entity.core();
  if core.is_deleted() {
    return Ok(());
  }
  let service = validator::writable(core)?;
  let id = validator::has_id(core)?;
  let endpoint = entity.endpoint()?;

  service.delete(&endpoint).await?;
  debug!(kind = %T::KIND, %id, "deleted");
  entity.before_delete();
  core.mark_deleted();
  service.cache().remove(T::KIND, &id);
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::Refreshable;
  use crate::testing::MockTransport;
  use crate::trello::Card;
  use serde_json::json;
  use std::time::Duration;

  #[tokio::test]
  async fn test_read_fetches_once_then_serves_cache() {
    let (svc, mock) = MockTransport::service();
    mock.insert("cards/c1", json!({"id": "c1", "name": "Write docs"}));

    let card = svc.retrieve::<Card>("c1");
    assert!(card.is_expired());
    assert_eq!(card.name().await.unwrap().as_deref(), Some("Write docs"));
    assert_eq!(card.name().await.unwrap().as_deref(), Some("Write docs"));
    assert_eq!(mock.count("GET", "cards/c1"), 1);
  }

  #[tokio::test]
  async fn test_refresh_requests_minimal_projection() {
    let (svc, mock) = MockTransport::service();
    mock.insert("cards/c1", json!({"id": "c1", "name": "A"}));

    let card = svc.retrieve::<Card>("c1");
    assert!(card.refresh().await.unwrap());

    let call = mock.last_call().unwrap();
    assert_eq!(
      call.param("fields").as_deref(),
      Some("name,desc,closed,idList,idBoard,pos,due,url")
    );
    assert_eq!(call.param("actions").as_deref(), Some("none"));
    assert_eq!(call.param("checklists").as_deref(), Some("none"));
  }

  #[tokio::test]
  async fn test_concurrent_reads_share_one_fetch() {
    let (svc, mock) = MockTransport::service();
    mock.insert("cards/c1", json!({"id": "c1", "name": "Slow"}));
    mock.set_latency(Duration::from_millis(30));

    let card = svc.retrieve::<Card>("c1");
    let (a, b, c) = tokio::join!(card.name(), card.name(), card.description());
    assert_eq!(a.unwrap().as_deref(), Some("Slow"));
    assert_eq!(b.unwrap().as_deref(), Some("Slow"));
    assert!(c.unwrap().is_none());
    assert_eq!(mock.count("GET", "cards/c1"), 1);
  }

  #[tokio::test]
  async fn test_concurrent_reads_across_tasks_share_one_fetch() {
    let (svc, mock) = MockTransport::service();
    mock.insert("cards/c1", json!({"id": "c1", "name": "Slow"}));
    mock.set_latency(Duration::from_millis(30));

    let card = svc.retrieve::<Card>("c1");
    let tasks: Vec<_> = (0..4)
      .map(|_| {
        let card = Arc::clone(&card);
        tokio::spawn(async move { card.name().await })
      })
      .collect();
    for task in tasks {
      assert_eq!(task.await.unwrap().unwrap().as_deref(), Some("Slow"));
    }
    assert_eq!(mock.count("GET", "cards/c1"), 1);
  }

  #[tokio::test]
  async fn test_mark_for_update_forces_refetch() {
    let (svc, mock) = MockTransport::service();
    mock.insert("cards/c1", json!({"id": "c1", "name": "Old"}));

    let card = svc.retrieve::<Card>("c1");
    assert_eq!(card.name().await.unwrap().as_deref(), Some("Old"));

    mock.insert("cards/c1", json!({"id": "c1", "name": "New"}));
    assert_eq!(card.name().await.unwrap().as_deref(), Some("Old"));

    card.mark_for_update();
    assert_eq!(card.name().await.unwrap().as_deref(), Some("New"));
    assert_eq!(mock.count("GET", "cards/c1"), 2);
  }

  #[tokio::test]
  async fn test_generation_advance_expires_kind() {
    let (svc, mock) = MockTransport::service();
    mock.insert("cards/c1", json!({"id": "c1", "name": "A"}));

    let card = svc.retrieve::<Card>("c1");
    card.name().await.unwrap();
    assert!(!card.is_expired());

    svc.expire(ResourceKind::Board);
    assert!(!card.is_expired());

    svc.expire(ResourceKind::Card);
    assert!(card.is_expired());
    card.name().await.unwrap();
    assert_eq!(mock.count("GET", "cards/c1"), 2);
  }

  #[tokio::test]
  async fn test_refresh_of_externally_deleted_entity_keeps_stale_values() {
    let (svc, mock) = MockTransport::service();
    mock.insert("cards/c1", json!({"id": "c1", "name": "Gone soon"}));

    let card = svc.retrieve::<Card>("c1");
    assert!(card.refresh().await.unwrap());

    mock.remove("cards/c1");
    assert!(!card.refresh().await.unwrap());
    assert!(!card.is_deleted());
    assert_eq!(
      card.core().peek::<String>("name").as_deref(),
      Some("Gone soon")
    );

    // An expired read surfaces the missing resource as a failure.
    card.mark_for_update();
    assert!(card.name().await.unwrap_err().is_not_found());
  }

  #[tokio::test]
  async fn test_refresh_failure_leaves_state_untouched() {
    let (svc, mock) = MockTransport::service();
    mock.insert("cards/c1", json!({"id": "c1", "name": "Kept"}));

    let card = svc.retrieve::<Card>("c1");
    card.refresh().await.unwrap();

    mock.fail("cards/c1");
    card.mark_for_update();
    let err = card.name().await.unwrap_err();
    assert!(matches!(err, Error::Transport(_)));
    assert_eq!(card.core().peek::<String>("name").as_deref(), Some("Kept"));
    assert!(card.is_expired());
  }

  #[tokio::test]
  async fn test_detached_entity_reads_without_fetching() {
    let card = Card::detached(Some("c1"));
    assert!(!card.is_expired());
    assert_eq!(card.name().await.unwrap(), None);
    assert!(matches!(
      card.refresh().await,
      Err(Error::Validation(crate::ValidationError::NotWritable))
    ));
  }
}
