//! Service façade: the transport, the identity cache, expiry generations
//! and the write queue, shared by every attached entity.

use color_eyre::{eyre::eyre, Result as EyreResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::debug;

use crate::cache::{EntityCore, Flushable, IdentityCache, Resource, WriteQueue};
use crate::config::Config;
use crate::endpoint::{Endpoint, ResourceKind};
use crate::error::{Error, Result};
use crate::record::{self, Params, Record};
use crate::transport::{Query, Transport};
use crate::trello::RestTransport;

/// Tuning for a [`Service`].
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
  /// Drain queued writes automatically this long after the first write of
  /// a batch. `None` waits for [`Service::flush`].
  pub flush_delay: Option<Duration>,
}

pub(crate) struct ServiceInner {
  transport: Arc<dyn Transport>,
  cache: IdentityCache,
  generations: [AtomicU64; ResourceKind::COUNT],
  queue: WriteQueue,
}

impl std::fmt::Debug for ServiceInner {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ServiceInner")
      .field("cache", &self.cache)
      .finish_non_exhaustive()
  }
}

/// Handle entities keep to their service. Weak so the identity cache,
/// which owns entities, does not keep its own service alive.
pub(crate) type WeakService = Weak<ServiceInner>;

/// Entry point to the object model. Cheap to clone.
///
/// Each service owns an isolated identity cache, so two services in one
/// process never share entities. Must be created inside a tokio runtime,
/// since it spawns the write queue's processor task.
#[derive(Clone, Debug)]
pub struct Service {
  inner: Arc<ServiceInner>,
}

impl Service {
  pub fn new(transport: Arc<dyn Transport>) -> Self {
    Self::with_options(transport, ServiceOptions::default())
  }

  pub fn with_options(transport: Arc<dyn Transport>, options: ServiceOptions) -> Self {
    let queue = WriteQueue::spawn(Arc::clone(&transport), options.flush_delay);
    Self {
      inner: Arc::new(ServiceInner {
        transport,
        cache: IdentityCache::new(),
        generations: std::array::from_fn(|_| AtomicU64::new(0)),
        queue,
      }),
    }
  }

  /// Build a service talking to the REST API described by `config`.
  pub fn connect(config: &Config) -> EyreResult<Self> {
    let token = Config::get_api_token()?;
    let transport = RestTransport::new(&config.api.url, &config.api.key, &token)
      .map_err(|e| eyre!("Failed to create REST transport: {}", e))?;
    Ok(Self::with_options(
      Arc::new(transport),
      ServiceOptions {
        flush_delay: config.queue.flush_delay(),
      },
    ))
  }

  pub(crate) fn from_inner(inner: Arc<ServiceInner>) -> Self {
    Self { inner }
  }

  pub(crate) fn downgrade(&self) -> WeakService {
    Arc::downgrade(&self.inner)
  }

  pub fn cache(&self) -> &IdentityCache {
    &self.inner.cache
  }

  // --------------------------------------------------------------------------
  // Expiry
  // --------------------------------------------------------------------------

  pub fn generation(&self, kind: ResourceKind) -> u64 {
    self.inner.generations[kind.index()].load(Ordering::Acquire)
  }

  /// Expire every entity and collection of `kind`.
  pub fn expire(&self, kind: ResourceKind) {
    let generation = self.inner.generations[kind.index()].fetch_add(1, Ordering::AcqRel) + 1;
    debug!(%kind, generation, "expired");
  }

  pub fn expire_all(&self) {
    for kind in ResourceKind::ALL {
      self.expire(kind);
    }
  }

  // --------------------------------------------------------------------------
  // Identity resolution
  // --------------------------------------------------------------------------

  /// The live proxy for `id`, creating an empty expired one if none exists.
  pub fn retrieve<T: Resource>(&self, id: &str) -> Arc<T> {
    self
      .inner
      .cache
      .get_or_insert_with(id, || self.allocate::<T>(id))
      .0
  }

  /// The live proxy for `id`, only if one is already cached.
  pub fn cached<T: Resource>(&self, id: &str) -> Option<Arc<T>> {
    self.inner.cache.find(id)
  }

  /// Attach a detached entity to this service. If an instance with the
  /// same id is already live, that instance is returned instead.
  pub fn attach<T: Resource>(&self, entity: &Arc<T>) -> Arc<T> {
    match entity.core().id() {
      Some(id) => {
        self
          .inner
          .cache
          .get_or_insert_with(&id, || {
            entity.core().attach(self.downgrade());
            Arc::clone(entity)
          })
          .0
      }
      None => {
        entity.core().attach(self.downgrade());
        Arc::clone(entity)
      }
    }
  }

  fn allocate<T: Resource>(&self, id: &str) -> Arc<T> {
    Arc::new(T::from_core(EntityCore::attached(T::KIND, id, self.downgrade())))
  }

  /// Turn a server record into the live proxy for it. With a generation,
  /// the record becomes the proxy's backing record.
  pub(crate) fn resolve<T: Resource>(&self, record: Record, generation: Option<u64>) -> Result<Arc<T>> {
    let id = record::record_id(&record)
      .ok_or_else(|| Error::Transport(eyre!("{} record without an id", T::KIND)))?;
    let entity = self.retrieve::<T>(&id);
    if generation.is_some() {
      entity.core().apply_record(record, generation);
    }
    Ok(entity)
  }

  /// Create a remote resource and return its live proxy.
  pub(crate) async fn create<T: Resource>(&self, endpoint: &Endpoint, params: &Params) -> Result<Arc<T>> {
    let generation = self.generation(T::KIND);
    let record = self.post(endpoint, params).await?;
    let entity = self.resolve::<T>(record, Some(generation))?;
    debug!(kind = %T::KIND, id = entity.core().id().as_deref().unwrap_or(""), "created");
    Ok(entity)
  }

  // --------------------------------------------------------------------------
  // Writes
  // --------------------------------------------------------------------------

  pub(crate) fn enqueue(&self, entity: Arc<dyn Flushable>) -> Result<()> {
    self.inner.queue.enqueue(entity)
  }

  /// Write out everything queued so far.
  pub async fn flush(&self) -> Result<()> {
    self.inner.queue.flush().await
  }

  /// Write out everything queued and stop accepting writes.
  pub async fn shutdown(&self) -> Result<()> {
    self.inner.queue.shutdown().await
  }

  // --------------------------------------------------------------------------
  // Transport
  // --------------------------------------------------------------------------

  pub(crate) async fn get(&self, endpoint: &Endpoint, query: &Query) -> Result<Option<Record>> {
    self
      .inner
      .transport
      .get(endpoint, query)
      .await
      .map_err(Error::Transport)
  }

  pub(crate) async fn get_list(&self, endpoint: &Endpoint, query: &Query) -> Result<Vec<Record>> {
    self
      .inner
      .transport
      .get_list(endpoint, query)
      .await
      .map_err(Error::Transport)
  }

  pub(crate) async fn post(&self, endpoint: &Endpoint, params: &Params) -> Result<Record> {
    self
      .inner
      .transport
      .post(endpoint, params)
      .await
      .map_err(Error::Transport)
  }

  pub(crate) async fn put(&self, endpoint: &Endpoint, params: &Params) -> Result<Record> {
    self
      .inner
      .transport
      .put(endpoint, params)
      .await
      .map_err(Error::Transport)
  }

  pub(crate) async fn delete(&self, endpoint: &Endpoint) -> Result<()> {
    self
      .inner
      .transport
      .delete(endpoint)
      .await
      .map_err(Error::Transport)
  }
}
