use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use super::{live, live_related, related, relinked, Action, Board, CheckList, List, Member};
use crate::cache::{
  self, Deletable, EntityCore, ExpiringCollection, Mutable, Projection, Refreshable, Resource,
};
use crate::endpoint::{Endpoint, ResourceKind};
use crate::error::Result;
use crate::position::Position;
use crate::record::{FieldValue, Params};
use crate::validator;

/// A card on a list.
#[derive(Debug)]
pub struct Card {
  core: EntityCore,
  checklists: ExpiringCollection<CheckList>,
  actions: ExpiringCollection<Action>,
  members: ExpiringCollection<Member>,
}

impl Resource for Card {
  const KIND: ResourceKind = ResourceKind::Card;

  const PROJECTION: Projection = Projection::new(
    &["name", "desc", "closed", "idList", "idBoard", "pos", "due", "url"],
    &[
      ("actions", "none"),
      ("attachments", "false"),
      ("members", "false"),
      ("checklists", "none"),
      ("board", "false"),
      ("list", "false"),
    ],
  );

  const ORDERED: bool = true;

  fn from_core(core: EntityCore) -> Self {
    Self {
      core,
      checklists: ExpiringCollection::new(),
      actions: ExpiringCollection::new(),
      members: ExpiringCollection::new(),
    }
  }

  fn core(&self) -> &EntityCore {
    &self.core
  }
}

impl Refreshable for Card {}

impl Mutable for Card {
  fn staged(&self, field: &str, previous: Option<&Value>) {
    match field {
      "idList" => {
        if let Some(old) = live::<List>(&self.core, previous.and_then(Value::as_str)) {
          old.mark_cards_for_update();
        }
        self.mark_list_cards();
      }
      "idBoard" => {
        if let Some(old) = live::<Board>(&self.core, previous.and_then(Value::as_str)) {
          old.mark_cards_for_update();
          old.mark_actions_for_update();
        }
      }
      "pos" | "closed" => {
        self.mark_list_cards();
        if let Some(board) = live_related::<Board>(&self.core, "idBoard") {
          board.mark_cards_for_update();
        }
      }
      _ => {}
    }
  }

  fn invalidate_dependents(&self) {
    self.actions.mark_for_update();
    if let Some(board) = live_related::<Board>(&self.core, "idBoard") {
      board.mark_actions_for_update();
    }
  }

  fn written(&self, sent: &Params, replaced: &Params) {
    if sent.contains_key("idList") {
      relinked::<List>(&self.core, "idList", replaced, List::mark_cards_for_update);
    }
    if sent.contains_key("idBoard") {
      relinked::<Board>(&self.core, "idBoard", replaced, |board| {
        board.mark_cards_for_update();
        board.mark_actions_for_update();
      });
    }
    if sent.contains_key("pos") || sent.contains_key("closed") {
      self.mark_list_cards();
      if let Some(board) = live_related::<Board>(&self.core, "idBoard") {
        board.mark_cards_for_update();
      }
    }
    self.invalidate_dependents();
  }
}

impl Deletable for Card {
  fn before_delete(&self) {
    self.mark_list_cards();
    if let Some(board) = live_related::<Board>(&self.core, "idBoard") {
      board.mark_cards_for_update();
      board.mark_actions_for_update();
    }
  }
}

impl Card {
  fn mark_list_cards(&self) {
    if let Some(list) = live_related::<List>(&self.core, "idList") {
      list.mark_cards_for_update();
    }
  }

  pub async fn name(&self) -> Result<Option<String>> {
    cache::read(self, "name").await
  }

  pub async fn description(&self) -> Result<Option<String>> {
    let description: Option<String> = cache::read(self, "desc").await?;
    Ok(description.filter(|d| !d.is_empty()))
  }

  pub async fn is_closed(&self) -> Result<Option<bool>> {
    cache::read(self, "closed").await
  }

  pub async fn due(&self) -> Result<Option<DateTime<Utc>>> {
    cache::read(self, "due").await
  }

  pub async fn url(&self) -> Result<Option<String>> {
    cache::read(self, "url").await
  }

  pub async fn position(&self) -> Result<Position> {
    Ok(cache::read(self, "pos").await?.unwrap_or_default())
  }

  pub async fn list(&self) -> Result<Option<Arc<List>>> {
    related(self, ResourceKind::List.id_field()).await
  }

  pub async fn board(&self) -> Result<Option<Arc<Board>>> {
    related(self, ResourceKind::Board.id_field()).await
  }

  pub fn set_name(self: &Arc<Self>, name: &str) -> Result<()> {
    validator::non_empty_string("name", name)?;
    cache::write(self, "name", Value::String(name.to_string()))
  }

  /// `None` clears the description.
  pub fn set_description(self: &Arc<Self>, description: Option<&str>) -> Result<()> {
    cache::write(self, "desc", Value::String(description.unwrap_or_default().to_string()))
  }

  pub fn set_closed(self: &Arc<Self>, closed: bool) -> Result<()> {
    cache::write(self, "closed", closed.to_value())
  }

  /// `None` removes the due date.
  pub fn set_due(self: &Arc<Self>, due: Option<DateTime<Utc>>) -> Result<()> {
    cache::write(self, "due", due.map_or(Value::Null, |d| d.to_value()))
  }

  pub fn set_position(self: &Arc<Self>, position: Position) -> Result<()> {
    validator::position("pos", &position)?;
    cache::write(self, "pos", position.to_value())
  }

  /// Move the card to `list`, following it to its board when that is known.
  pub fn move_to_list(self: &Arc<Self>, list: &List) -> Result<()> {
    let list_id = validator::entity("list", Some(list))?;
    validator::writable(&self.core)?;
    if let Some(board_id) = list.core().peek::<String>(ResourceKind::Board.id_field()) {
      cache::write(self, ResourceKind::Board.id_field(), Value::String(board_id))?;
    }
    cache::write(self, ResourceKind::List.id_field(), Value::String(list_id))
  }

  // --------------------------------------------------------------------------
  // Collections
  // --------------------------------------------------------------------------

  pub async fn checklists(&self) -> Result<Vec<Arc<CheckList>>> {
    self.checklists.items(&self.core).await
  }

  pub async fn actions(&self) -> Result<Vec<Arc<Action>>> {
    self.actions.items(&self.core).await
  }

  pub async fn members(&self) -> Result<Vec<Arc<Member>>> {
    self.members.items(&self.core).await
  }

  pub fn mark_checklists_for_update(&self) {
    self.checklists.mark_for_update();
  }

  pub fn mark_actions_for_update(&self) {
    self.actions.mark_for_update();
  }

  pub fn mark_members_for_update(&self) {
    self.members.mark_for_update();
  }

  pub async fn add_checklist(&self, name: &str) -> Result<Arc<CheckList>> {
    let service = validator::writable(&self.core)?;
    let id = validator::has_id(&self.core)?;
    validator::non_empty_string("name", name)?;

    let mut params = Params::new();
    params.insert("name".into(), Value::String(name.to_string()));
    params.insert(ResourceKind::Card.id_field().into(), Value::String(id));

    let checklist = service
      .create::<CheckList>(&Endpoint::collection(ResourceKind::CheckList), &params)
      .await?;
    self.mark_checklists_for_update();
    self.invalidate_dependents();
    Ok(checklist)
  }

  pub async fn add_comment(&self, text: &str) -> Result<Arc<Action>> {
    let service = validator::writable(&self.core)?;
    let id = validator::has_id(&self.core)?;
    validator::non_empty_string("text", text)?;

    let mut params = Params::new();
    params.insert("text".into(), Value::String(text.to_string()));
    let endpoint = Endpoint::children(ResourceKind::Card, &id, ResourceKind::Action).with("comments");

    let comment = service.create::<Action>(&endpoint, &params).await?;
    self.invalidate_dependents();
    Ok(comment)
  }
}
