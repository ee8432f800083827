//! Identity map guaranteeing one live proxy per remote entity.

use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

use super::traits::Resource;
use crate::endpoint::ResourceKind;

type Entry = Arc<dyn Any + Send + Sync>;

/// Registry mapping (kind, id) to the single shared instance for it.
///
/// All operations run under one mutex; lookups are cheap next to the
/// network round trips that populate the map.
#[derive(Default)]
pub struct IdentityCache {
  entries: Mutex<HashMap<(ResourceKind, String), Entry>>,
}

impl IdentityCache {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<(ResourceKind, String), Entry>> {
    self.entries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn find<T: Resource>(&self, id: &str) -> Option<Arc<T>> {
    let entry = self.lock().get(&(T::KIND, id.to_string())).cloned()?;
    entry.downcast::<T>().ok()
  }

  /// Insert an entity unless one with the same id is already live, and
  /// return whichever instance is now registered. Entities without an id
  /// are returned as-is and not registered.
  pub fn add<T: Resource>(&self, entity: Arc<T>) -> Arc<T> {
    let Some(id) = entity.core().id() else {
      return entity;
    };
    self.get_or_insert_with(&id, || entity).0
  }

  /// Atomic find-or-create. The flag is true when `create` ran.
  pub(crate) fn get_or_insert_with<T: Resource>(
    &self,
    id: &str,
    create: impl FnOnce() -> Arc<T>,
  ) -> (Arc<T>, bool) {
    let mut entries = self.lock();
    let key = (T::KIND, id.to_string());
    if let Some(existing) = entries.get(&key).cloned().and_then(|e| e.downcast::<T>().ok()) {
      return (existing, false);
    }
    let entity = create();
    entries.insert(key, Arc::clone(&entity) as Entry);
    (entity, true)
  }

  /// Evict by identity. Returns whether an entry was removed.
  pub fn remove(&self, kind: ResourceKind, id: &str) -> bool {
    let removed = self.lock().remove(&(kind, id.to_string())).is_some();
    if removed {
      debug!(%kind, id, "evicted from identity cache");
    }
    removed
  }

  pub fn contains(&self, kind: ResourceKind, id: &str) -> bool {
    self.lock().contains_key(&(kind, id.to_string()))
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  pub fn clear(&self) {
    self.lock().clear();
  }
}

impl std::fmt::Debug for IdentityCache {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("IdentityCache")
      .field("entries", &self.len())
      .finish()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::trello::{Board, Card};

  #[test]
  fn test_add_keeps_first_instance() {
    let cache = IdentityCache::new();
    let first = Card::detached(Some("c1"));
    let second = Card::detached(Some("c1"));

    let live = cache.add(Arc::clone(&first));
    assert!(Arc::ptr_eq(&live, &first));
    let live = cache.add(second);
    assert!(Arc::ptr_eq(&live, &first));
    assert_eq!(cache.len(), 1);
  }

  #[test]
  fn test_kinds_do_not_collide() {
    let cache = IdentityCache::new();
    cache.add(Card::detached(Some("x")));
    cache.add(Board::detached(Some("x")));
    assert_eq!(cache.len(), 2);
    assert!(cache.find::<Card>("x").is_some());
    assert!(cache.find::<Board>("x").is_some());
  }

  #[test]
  fn test_entities_without_id_are_not_registered() {
    let cache = IdentityCache::new();
    cache.add(Card::detached(None));
    assert!(cache.is_empty());
  }

  #[test]
  fn test_remove() {
    let cache = IdentityCache::new();
    cache.add(Card::detached(Some("c1")));
    assert!(cache.remove(ResourceKind::Card, "c1"));
    assert!(!cache.remove(ResourceKind::Card, "c1"));
    assert!(cache.find::<Card>("c1").is_none());
  }

  #[test]
  fn test_concurrent_resolution_yields_one_instance() {
    let cache = Arc::new(IdentityCache::new());
    let handles: Vec<_> = (0..8)
      .map(|_| {
        let cache = Arc::clone(&cache);
        std::thread::spawn(move || {
          cache
            .get_or_insert_with::<Card>("c1", || Card::detached(Some("c1")))
            .0
        })
      })
      .collect();
    let resolved: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    assert!(resolved.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    assert_eq!(cache.len(), 1);
  }
}
