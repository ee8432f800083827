use serde_json::Value;
use std::sync::Arc;

use super::{Action, Board, Card, SummaryPeriod};
use crate::cache::{
  self, EntityCore, ExpiringCollection, Mutable, Projection, Refreshable, Resource, WriteRequest,
};
use crate::endpoint::{Endpoint, ResourceKind};
use crate::error::{Result, ValidationError};
use crate::record::{FieldValue, Params};
use crate::service::Service;
use crate::validator;

/// A Trello user. `me` resolves to the member owning the token.
#[derive(Debug)]
pub struct Member {
  core: EntityCore,
  boards: ExpiringCollection<Board>,
  cards: ExpiringCollection<Card>,
  actions: ExpiringCollection<Action>,
}

impl Resource for Member {
  const KIND: ResourceKind = ResourceKind::Member;

  const PROJECTION: Projection = Projection::new(
    &["fullName", "username", "initials", "bio", "url"],
    &[("boards", "none"), ("organizations", "none")],
  );

  fn from_core(core: EntityCore) -> Self {
    Self {
      core,
      boards: ExpiringCollection::new(),
      cards: ExpiringCollection::new(),
      actions: ExpiringCollection::new(),
    }
  }

  fn core(&self) -> &EntityCore {
    &self.core
  }
}

impl Refreshable for Member {}

impl Mutable for Member {
  fn invalidate_dependents(&self) {
    self.actions.mark_for_update();
  }
}

impl Member {
  pub async fn full_name(&self) -> Result<Option<String>> {
    cache::read(self, "fullName").await
  }

  pub async fn username(&self) -> Result<Option<String>> {
    cache::read(self, "username").await
  }

  pub async fn initials(&self) -> Result<Option<String>> {
    cache::read(self, "initials").await
  }

  pub async fn bio(&self) -> Result<Option<String>> {
    cache::read(self, "bio").await
  }

  pub async fn url(&self) -> Result<Option<String>> {
    cache::read(self, "url").await
  }

  pub fn set_full_name(self: &Arc<Self>, full_name: &str) -> Result<()> {
    validator::non_empty_string("fullName", full_name)?;
    cache::write(self, "fullName", Value::String(full_name.to_string()))
  }

  pub fn set_username(self: &Arc<Self>, username: &str) -> Result<()> {
    validator::non_empty_string("username", username)?;
    cache::write(self, "username", Value::String(username.to_string()))
  }

  pub fn set_initials(self: &Arc<Self>, initials: &str) -> Result<()> {
    validator::non_empty_string("initials", initials)?;
    cache::write(self, "initials", Value::String(initials.to_string()))
  }

  pub fn set_bio(self: &Arc<Self>, bio: Option<&str>) -> Result<()> {
    cache::write(self, "bio", Value::String(bio.unwrap_or_default().to_string()))
  }

  pub async fn boards(&self) -> Result<Vec<Arc<Board>>> {
    self.boards.items(&self.core).await
  }

  /// Open cards the member is assigned to, across boards.
  pub async fn cards(&self) -> Result<Vec<Arc<Card>>> {
    self.cards.items(&self.core).await
  }

  pub async fn actions(&self) -> Result<Vec<Arc<Action>>> {
    self.actions.items(&self.core).await
  }

  pub fn mark_boards_for_update(&self) {
    self.boards.mark_for_update();
  }

  pub fn mark_cards_for_update(&self) {
    self.cards.mark_for_update();
  }

  /// The member's preferences, sharing the member's id. A detached member
  /// gets detached preferences.
  pub fn preferences(&self) -> Result<Arc<MemberPreferences>> {
    let id = validator::has_id(&self.core)?;
    Ok(match self.core.service() {
      Some(service) => service.retrieve::<MemberPreferences>(&id),
      None => MemberPreferences::detached(Some(&id)),
    })
  }

  /// Members matching a name, username or email address, best match first.
  pub async fn search(service: &Service, query: &str, limit: usize) -> Result<Vec<MemberSearchResult>> {
    validator::non_empty_string("query", query)?;
    let endpoint = Endpoint::root("search").with(ResourceKind::Member.path());
    let params = vec![
      ("query".to_string(), query.to_string()),
      ("limit".to_string(), limit.to_string()),
    ];

    service
      .get_list(&endpoint, &params)
      .await?
      .into_iter()
      .map(|record| {
        let similarity = record.get("similarity").and_then(Value::as_i64);
        let member = service.resolve::<Member>(record, None)?;
        Ok(MemberSearchResult { member, similarity })
      })
      .collect()
  }
}

/// One hit of [`Member::search`].
#[derive(Debug, Clone)]
pub struct MemberSearchResult {
  pub member: Arc<Member>,
  /// How closely the member matched the query, as scored by the server.
  pub similarity: Option<i64>,
}

/// Per-member settings, written one field at a time.
#[derive(Debug)]
pub struct MemberPreferences {
  core: EntityCore,
}

impl Resource for MemberPreferences {
  const KIND: ResourceKind = ResourceKind::MemberPreferences;

  const PROJECTION: Projection = Projection::new(&[], &[]);

  fn from_core(core: EntityCore) -> Self {
    Self { core }
  }

  fn core(&self) -> &EntityCore {
    &self.core
  }

  fn endpoint(&self) -> Result<Endpoint> {
    let id = validator::has_id(&self.core)?;
    Ok(Endpoint::children(
      ResourceKind::Member,
      &id,
      ResourceKind::MemberPreferences,
    ))
  }

  fn create_endpoint(&self) -> Result<Endpoint> {
    Err(ValidationError::MissingId.into())
  }
}

impl Refreshable for MemberPreferences {}

impl Mutable for MemberPreferences {
  fn write_requests(&self, params: &Params) -> Result<Vec<WriteRequest>> {
    let endpoint = self.endpoint()?;
    Ok(
      params
        .iter()
        .map(|(field, value)| {
          let mut body = Params::new();
          body.insert("value".into(), value.clone());
          WriteRequest::put(endpoint.clone().with(field), body).without_record()
        })
        .collect(),
    )
  }
}

impl MemberPreferences {
  pub async fn is_color_blind(&self) -> Result<Option<bool>> {
    cache::read(self, "colorBlind").await
  }

  pub async fn summary_period(&self) -> Result<Option<SummaryPeriod>> {
    cache::read(self, "minutesBetweenSummaries").await
  }

  pub fn set_color_blind(self: &Arc<Self>, color_blind: bool) -> Result<()> {
    cache::write(self, "colorBlind", color_blind.to_value())
  }

  /// The period is required; there is no way to unset it remotely.
  pub fn set_summary_period(self: &Arc<Self>, period: Option<SummaryPeriod>) -> Result<()> {
    let period = validator::nullable("minutesBetweenSummaries", period)?;
    validator::enumeration("minutesBetweenSummaries", &period)?;
    cache::write(self, "minutesBetweenSummaries", period.to_value())
  }
}
