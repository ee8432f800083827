//! Lazily populated child collections.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::entity::EntityCore;
use super::traits::Resource;
use crate::endpoint::Endpoint;
use crate::error::{Result, ValidationError};
use crate::transport::Query;

#[derive(Debug, Default)]
struct Options {
  filter: Option<String>,
  fields: Option<String>,
}

struct State<T> {
  items: Vec<Arc<T>>,
  /// Child kind generation at the last fetch. `None` means stale.
  synced_at: Option<u64>,
  fetches: u64,
  /// Options are frozen after the first enumeration.
  used: bool,
}

/// The children of one owner, e.g. the open lists of a board.
///
/// Holds no reference back to its owner; the owner passes its own core in
/// when enumerating. A stale collection costs nothing until it is read.
pub struct ExpiringCollection<T: Resource> {
  options: Mutex<Options>,
  state: Mutex<State<T>>,
  fetch_gate: tokio::sync::Mutex<()>,
}

impl<T: Resource> std::fmt::Debug for ExpiringCollection<T> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    let state = self.lock_state();
    f.debug_struct("ExpiringCollection")
      .field("kind", &T::KIND)
      .field("options", &*self.lock_options())
      .field("items", &state.items.len())
      .field("synced_at", &state.synced_at)
      .finish()
  }
}

impl<T: Resource> Default for ExpiringCollection<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: Resource> ExpiringCollection<T> {
  pub fn new() -> Self {
    Self {
      options: Mutex::new(Options::default()),
      state: Mutex::new(State {
        items: Vec::new(),
        synced_at: None,
        fetches: 0,
        used: false,
      }),
      fetch_gate: tokio::sync::Mutex::new(()),
    }
  }

  /// A collection restricted by a server-side filter such as `closed`.
  pub fn filtered(filter: &str) -> Self {
    let collection = Self::new();
    collection.lock_options().filter = Some(filter.to_string());
    collection
  }

  fn lock_options(&self) -> MutexGuard<'_, Options> {
    self.options.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn lock_state(&self) -> MutexGuard<'_, State<T>> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn filter(&self) -> Option<String> {
    self.lock_options().filter.clone()
  }

  pub fn fields(&self) -> Option<String> {
    self.lock_options().fields.clone()
  }

  pub fn set_filter(&self, filter: Option<&str>) -> Result<()> {
    self.ensure_unused()?;
    self.lock_options().filter = filter.map(String::from);
    Ok(())
  }

  /// Request a custom field projection. Children are then only resolved by
  /// id and load their own fields lazily.
  pub fn set_fields(&self, fields: Option<&str>) -> Result<()> {
    self.ensure_unused()?;
    self.lock_options().fields = fields.map(String::from);
    Ok(())
  }

  fn ensure_unused(&self) -> Result<()> {
    if self.lock_state().used {
      return Err(ValidationError::CollectionLocked.into());
    }
    Ok(())
  }

  /// Invalidate without fetching; the next enumeration pays for it.
  pub fn mark_for_update(&self) {
    self.lock_state().synced_at = None;
  }

  pub fn is_stale(&self, owner: &EntityCore) -> bool {
    let Some(service) = owner.service() else {
      return false;
    };
    match self.lock_state().synced_at {
      Some(generation) => service.generation(T::KIND) > generation,
      None => true,
    }
  }

  /// The cached sequence, whatever its freshness.
  pub fn cached(&self) -> Vec<Arc<T>> {
    self.lock_state().items.clone()
  }

  fn query(&self) -> (Query, bool) {
    let options = self.lock_options();
    let mut query = Query::new();
    let apply = options.fields.is_none();
    let fields = options
      .fields
      .clone()
      .unwrap_or_else(|| T::PROJECTION.fields_param());
    query.push(("fields".to_string(), fields));
    query.extend(
      T::PROJECTION
        .suppress
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string())),
    );
    if let Some(filter) = &options.filter {
      query.push(("filter".to_string(), filter.clone()));
    }
    (query, apply)
  }

  /// Enumerate the children, fetching once if stale. Concurrent callers
  /// wait for the same fetch.
  pub(crate) async fn items(&self, owner: &EntityCore) -> Result<Vec<Arc<T>>> {
    if owner.is_deleted() {
      return Ok(Vec::new());
    }
    let (Some(service), Some(owner_id)) = (owner.service(), owner.id()) else {
      return Ok(self.cached());
    };

    let seen = {
      let mut state = self.lock_state();
      state.used = true;
      state.fetches
    };
    if !self.is_stale(owner) {
      return Ok(self.cached());
    }

    let _guard = self.fetch_gate.lock().await;
    let fetched_meanwhile = self.lock_state().fetches != seen;
    if fetched_meanwhile || !self.is_stale(owner) {
      return Ok(self.cached());
    }

    let endpoint = Endpoint::children(owner.kind(), &owner_id, T::KIND);
    let (query, apply) = self.query();
    let generation = service.generation(T::KIND);
    debug!(%endpoint, "fetching collection");
    let records = service.get_list(&endpoint, &query).await?;

    let apply_at = apply.then_some(generation);
    let mut items = records
      .into_iter()
      .map(|mut record| {
        T::adopt(&mut record, owner.kind(), &owner_id);
        service.resolve::<T>(record, apply_at)
      })
      .collect::<Result<Vec<_>>>()?;
    if T::ORDERED {
      items.sort_by(|a, b| a.cached_position().cmp_for_sort(&b.cached_position()));
    }

    let mut state = self.lock_state();
    state.items = items.clone();
    state.synced_at = Some(generation);
    state.fetches += 1;
    Ok(items)
  }
}
