//! Trello object model built on the expiring cache.

mod action;
mod board;
mod card;
mod checklist;
mod client;
mod list;
mod member;
mod membership;
mod types;

pub use action::Action;
pub use board::Board;
pub use card::Card;
pub use checklist::{CheckItem, CheckList};
pub use client::RestTransport;
pub use list::List;
pub use member::{Member, MemberPreferences, MemberSearchResult};
pub use membership::Membership;
pub use types::{ActionType, CheckItemState, MembershipType, SummaryPeriod};

use serde_json::Value;
use std::sync::Arc;

use crate::cache::{self, EntityCore, Resource};
use crate::error::Result;
use crate::record::Params;

/// Resolve a reference field such as `idBoard` to its live proxy, reading
/// through the owner's expiry. Detached owners resolve nothing.
async fn related<T: Resource, R: Resource>(entity: &T, field: &str) -> Result<Option<Arc<R>>> {
  let Some(id) = cache::read::<T, String>(entity, field).await? else {
    return Ok(None);
  };
  Ok(entity.core().service().map(|service| service.retrieve::<R>(&id)))
}

/// The already-live proxy a cached reference field points at, if any.
/// Never fetches; used for cascading invalidation.
fn live_related<R: Resource>(core: &EntityCore, field: &str) -> Option<Arc<R>> {
  let id = core.peek::<String>(field)?;
  core.service()?.cached::<R>(&id)
}

/// Same as [`live_related`] for an id that is already known.
fn live<R: Resource>(core: &EntityCore, id: Option<&str>) -> Option<Arc<R>> {
  core.service()?.cached::<R>(id?)
}

/// After a write moved the reference `field`, run `mark` on the live proxies
/// it pointed at before and after. When the earlier target was never loaded,
/// every collection of the written entity's kind is expired instead.
fn relinked<R: Resource>(core: &EntityCore, field: &str, replaced: &Params, mark: impl Fn(&R)) {
  if let Some(current) = live_related::<R>(core, field) {
    mark(&current);
  }
  match replaced.get(field).and_then(Value::as_str) {
    Some(previous) => {
      if let Some(old) = live::<R>(core, Some(previous)) {
        mark(&old);
      }
    }
    None => {
      if let Some(service) = core.service() {
        service.expire(core.kind());
      }
    }
  }
}
