use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use super::{related, ActionType, Card, Member};
use crate::cache::{self, EntityCore, Projection, Refreshable, Resource};
use crate::endpoint::ResourceKind;
use crate::error::Result;

/// A read-only entry in the activity history of a board, list, card or
/// member.
#[derive(Debug)]
pub struct Action {
  core: EntityCore,
}

impl Resource for Action {
  const KIND: ResourceKind = ResourceKind::Action;

  const PROJECTION: Projection = Projection::new(
    &["type", "date", "idMemberCreator", "data"],
    &[("member", "false"), ("memberCreator", "false")],
  );

  fn from_core(core: EntityCore) -> Self {
    Self { core }
  }

  fn core(&self) -> &EntityCore {
    &self.core
  }
}

impl Refreshable for Action {}

impl Action {
  pub async fn kind(&self) -> Result<Option<ActionType>> {
    cache::read(self, "type").await
  }

  pub async fn date(&self) -> Result<Option<DateTime<Utc>>> {
    cache::read(self, "date").await
  }

  pub async fn data(&self) -> Result<Option<Value>> {
    cache::read(self, "data").await
  }

  pub async fn creator(&self) -> Result<Option<Arc<Member>>> {
    related(self, "idMemberCreator").await
  }

  /// Text of a comment; `None` for other kinds of action.
  pub async fn text(&self) -> Result<Option<String>> {
    Ok(self.data_field(&["text"]).await?.and_then(|v| v.as_str().map(String::from)))
  }

  /// The card the action happened on, if any.
  pub async fn card(&self) -> Result<Option<Arc<Card>>> {
    let id = self
      .data_field(&["card", "id"])
      .await?
      .and_then(|v| v.as_str().map(String::from));
    Ok(id.and_then(|id| Some(self.core.service()?.retrieve::<Card>(&id))))
  }

  async fn data_field(&self, path: &[&str]) -> Result<Option<Value>> {
    let Some(data) = self.data().await? else {
      return Ok(None);
    };
    Ok(path.iter().try_fold(&data, |value, key| value.get(*key)).cloned())
  }
}
