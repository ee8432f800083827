//! Write queue: staged entity writes drained by a single background task.
//!
//! Writers enqueue entities through an unbounded channel and never block.
//! The processor task keeps one entry per entity, so every write to that
//! entity made before a drain goes out as a single request carrying the
//! latest value of each field.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::entity::EntityCore;
use super::traits::{Mutable, Resource, WriteMethod, WriteRequest};
use crate::endpoint::ResourceKind;
use crate::error::{Error, Result};
use crate::record::{Params, Record};
use crate::transport::Transport;

/// Type-erased view of a mutable entity, as held by the queue.
pub(crate) trait Flushable: Send + Sync {
  fn entity_kind(&self) -> ResourceKind;

  fn entity_core(&self) -> &EntityCore;

  fn requests(&self, params: &Params) -> Result<Vec<WriteRequest>>;

  /// Settle a successful write: clear what was sent, apply the response
  /// and run cascading invalidation.
  fn complete(self: Arc<Self>, sent: &Params, response: Option<Record>);
}

impl<T: Mutable> Flushable for T {
  fn entity_kind(&self) -> ResourceKind {
    T::KIND
  }

  fn entity_core(&self) -> &EntityCore {
    Resource::core(self)
  }

  fn requests(&self, params: &Params) -> Result<Vec<WriteRequest>> {
    self.write_requests(params)
  }

  fn complete(self: Arc<Self>, sent: &Params, response: Option<Record>) {
    let core = Resource::core(self.as_ref());
    let created = core.id().is_none();
    let replaced = core.clear_sent(sent);
    if let Some(record) = response {
      let generation = core.service().map(|s| s.generation(T::KIND));
      core.apply_record(record, generation);
    }
    if created {
      if let Some(service) = core.service() {
        service.cache().add(Arc::clone(&self));
      }
    }
    self.written(sent, &replaced);
  }
}

enum Command {
  Write(Arc<dyn Flushable>),
  Flush(oneshot::Sender<Result<()>>),
  Shutdown(oneshot::Sender<Result<()>>),
}

/// Handle to the flush processor task.
#[derive(Debug)]
pub(crate) struct WriteQueue {
  tx: mpsc::UnboundedSender<Command>,
}

impl WriteQueue {
  /// Spawn the processor on the current tokio runtime.
  ///
  /// With a `batch_delay`, pending writes are also drained that long after
  /// the first write of a batch arrives; without one they wait for an
  /// explicit flush.
  pub(crate) fn spawn(transport: Arc<dyn Transport>, batch_delay: Option<Duration>) -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    let processor = FlushProcessor {
      transport,
      batch_delay,
      pending: Vec::new(),
      queued: HashSet::new(),
      deadline: None,
    };
    tokio::spawn(processor.run(rx));
    Self { tx }
  }

  pub(crate) fn enqueue(&self, entity: Arc<dyn Flushable>) -> Result<()> {
    self
      .tx
      .send(Command::Write(entity))
      .map_err(|_| Error::QueueClosed)
  }

  /// Drain every write enqueued before this call.
  pub(crate) async fn flush(&self) -> Result<()> {
    let (reply, done) = oneshot::channel();
    self
      .tx
      .send(Command::Flush(reply))
      .map_err(|_| Error::QueueClosed)?;
    done.await.map_err(|_| Error::QueueClosed)?
  }

  /// Drain a final time and stop the processor.
  pub(crate) async fn shutdown(&self) -> Result<()> {
    let (reply, done) = oneshot::channel();
    if self.tx.send(Command::Shutdown(reply)).is_err() {
      return Ok(());
    }
    done.await.map_err(|_| Error::QueueClosed)?
  }
}

struct FlushProcessor {
  transport: Arc<dyn Transport>,
  batch_delay: Option<Duration>,
  pending: Vec<Arc<dyn Flushable>>,
  queued: HashSet<usize>,
  deadline: Option<Instant>,
}

/// Identity of an entity by address, for coalescing.
fn entity_key(entity: &Arc<dyn Flushable>) -> usize {
  Arc::as_ptr(entity) as *const () as usize
}

impl FlushProcessor {
  async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
    loop {
      let deadline = self.deadline;
      let command = tokio::select! {
        command = rx.recv() => command,
        _ = sleep_until(deadline) => {
          if let Err(e) = self.drain().await {
            warn!(error = %e, "background flush failed");
          }
          continue;
        }
      };

      match command {
        Some(Command::Write(entity)) => self.push(entity),
        Some(Command::Flush(reply)) => {
          let _ = reply.send(self.drain().await);
        }
        Some(Command::Shutdown(reply)) => {
          // Refuse new work, but keep what was sent before the shutdown.
          rx.close();
          let mut waiting = Vec::new();
          while let Ok(command) = rx.try_recv() {
            match command {
              Command::Write(entity) => self.push(entity),
              Command::Flush(other) | Command::Shutdown(other) => waiting.push(other),
            }
          }
          let result = self.drain().await;
          for other in waiting {
            let _ = other.send(result.as_ref().map(|_| ()).map_err(|_| Error::QueueClosed));
          }
          let _ = reply.send(result);
          break;
        }
        None => {
          // Every handle is gone; write out what is left.
          if let Err(e) = self.drain().await {
            warn!(error = %e, "final flush failed");
          }
          break;
        }
      }
    }
    debug!("write queue stopped");
  }

  fn push(&mut self, entity: Arc<dyn Flushable>) {
    if self.queued.insert(entity_key(&entity)) {
      self.pending.push(entity);
    }
    if self.deadline.is_none() {
      self.deadline = self.batch_delay.map(|delay| Instant::now() + delay);
    }
  }

  /// Write every pending entity. All of them are attempted; the first
  /// failure is returned. Entities whose write failed stay queued for the
  /// next drain without arming the batch timer.
  async fn drain(&mut self) -> Result<()> {
    self.deadline = None;
    self.queued.clear();
    let batch = std::mem::take(&mut self.pending);
    if batch.is_empty() {
      return Ok(());
    }

    debug!(entities = batch.len(), "flushing pending writes");
    let mut first_error = None;
    let mut failed = Vec::new();
    for entity in batch {
      let kind = entity.entity_kind();
      let id = entity.entity_core().id();
      if let Err(e) = self.flush_entity(&entity).await {
        warn!(%kind, id = id.as_deref().unwrap_or("<new>"), error = %e, "write failed");
        first_error.get_or_insert(e);
        failed.push(entity);
      }
    }
    for entity in failed {
      if self.queued.insert(entity_key(&entity)) {
        self.pending.push(entity);
      }
    }
    first_error.map_or(Ok(()), Err)
  }

  async fn flush_entity(&self, entity: &Arc<dyn Flushable>) -> Result<()> {
    let core = entity.entity_core();
    if core.is_deleted() {
      return Ok(());
    }
    let sent = core.pending();
    if sent.is_empty() {
      return Ok(());
    }

    let requests = entity.requests(&sent)?;
    let mut response = None;
    for request in &requests {
      debug!(method = ?request.method, endpoint = %request.endpoint, "writing");
      let record = match request.method {
        WriteMethod::Put => self.transport.put(&request.endpoint, &request.params).await,
        WriteMethod::Post => self.transport.post(&request.endpoint, &request.params).await,
      }
      .map_err(Error::Transport)?;
      if request.returns_record {
        response = Some(record);
      }
    }

    Arc::clone(entity).complete(&sent, response);
    Ok(())
  }
}

async fn sleep_until(deadline: Option<Instant>) {
  match deadline {
    Some(deadline) => tokio::time::sleep_until(deadline).await,
    None => std::future::pending().await,
  }
}
