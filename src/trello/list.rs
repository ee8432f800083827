use serde_json::Value;
use std::sync::Arc;

use super::{live, live_related, related, relinked, Action, Board, Card};
use crate::cache::{self, EntityCore, ExpiringCollection, Mutable, Projection, Refreshable, Resource};
use crate::endpoint::{Endpoint, ResourceKind};
use crate::error::{Error, Result};
use crate::position::Position;
use crate::record::{FieldValue, Params};
use crate::validator;

/// A column of cards on a board.
#[derive(Debug)]
pub struct List {
  core: EntityCore,
  cards: ExpiringCollection<Card>,
  actions: ExpiringCollection<Action>,
}

impl Resource for List {
  const KIND: ResourceKind = ResourceKind::List;

  const PROJECTION: Projection = Projection::new(
    &["name", "closed", "idBoard", "pos", "subscribed"],
    &[("cards", "none"), ("board", "false")],
  );

  const ORDERED: bool = true;

  fn from_core(core: EntityCore) -> Self {
    Self {
      core,
      cards: ExpiringCollection::new(),
      actions: ExpiringCollection::new(),
    }
  }

  fn core(&self) -> &EntityCore {
    &self.core
  }
}

impl Refreshable for List {}

impl Mutable for List {
  fn staged(&self, field: &str, previous: Option<&Value>) {
    match field {
      "idBoard" => {
        if let Some(old) = live::<Board>(&self.core, previous.and_then(Value::as_str)) {
          old.mark_lists_for_update();
        }
        self.mark_board_lists();
      }
      "pos" | "closed" => self.mark_board_lists(),
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
    if sent.contains_key("idBoard") {
      relinked::<Board>(&self.core, "idBoard", replaced, Board::mark_lists_for_update);
    }
    if sent.contains_key("pos") || sent.contains_key("closed") {
      self.mark_board_lists();
    }
    self.invalidate_dependents();
  }
}

impl List {
  fn mark_board_lists(&self) {
    if let Some(board) = live_related::<Board>(&self.core, "idBoard") {
      board.mark_lists_for_update();
    }
  }

  pub async fn name(&self) -> Result<Option<String>> {
    cache::read(self, "name").await
  }

  pub async fn is_closed(&self) -> Result<Option<bool>> {
    cache::read(self, "closed").await
  }

  pub async fn is_subscribed(&self) -> Result<Option<bool>> {
    cache::read(self, "subscribed").await
  }

  pub async fn position(&self) -> Result<Position> {
    Ok(cache::read(self, "pos").await?.unwrap_or_default())
  }

  pub async fn board(&self) -> Result<Option<Arc<Board>>> {
    related(self, ResourceKind::Board.id_field()).await
  }

  pub fn set_name(self: &Arc<Self>, name: &str) -> Result<()> {
    validator::non_empty_string("name", name)?;
    cache::write(self, "name", Value::String(name.to_string()))
  }

  pub fn set_closed(self: &Arc<Self>, closed: bool) -> Result<()> {
    cache::write(self, "closed", closed.to_value())
  }

  pub fn set_subscribed(self: &Arc<Self>, subscribed: bool) -> Result<()> {
    cache::write(self, "subscribed", subscribed.to_value())
  }

  pub fn set_position(self: &Arc<Self>, position: Position) -> Result<()> {
    validator::position("pos", &position)?;
    cache::write(self, "pos", position.to_value())
  }

  /// Move the list to another board.
  pub fn set_board(self: &Arc<Self>, board: &Board) -> Result<()> {
    let board_id = validator::entity("board", Some(board))?;
    cache::write(self, ResourceKind::Board.id_field(), Value::String(board_id))
  }

  /// Lists can only be archived, never deleted.
  pub async fn delete(&self) -> Result<()> {
    Err(Error::Unsupported("deleting a list"))
  }

  // --------------------------------------------------------------------------
  // Collections
  // --------------------------------------------------------------------------

  /// Open cards, ordered by position.
  pub async fn cards(&self) -> Result<Vec<Arc<Card>>> {
    self.cards.items(&self.core).await
  }

  pub fn card_collection(&self) -> &ExpiringCollection<Card> {
    &self.cards
  }

  pub async fn actions(&self) -> Result<Vec<Arc<Action>>> {
    self.actions.items(&self.core).await
  }

  pub fn mark_cards_for_update(&self) {
    self.cards.mark_for_update();
  }

  pub fn mark_actions_for_update(&self) {
    self.actions.mark_for_update();
  }

  /// Create a card at the given position, or at the bottom.
  pub async fn add_card(&self, name: &str, position: Option<Position>) -> Result<Arc<Card>> {
    let service = validator::writable(&self.core)?;
    let id = validator::has_id(&self.core)?;
    validator::non_empty_string("name", name)?;
    if let Some(position) = &position {
      validator::position("pos", position)?;
    }

    let mut params = Params::new();
    params.insert("name".into(), Value::String(name.to_string()));
    params.insert(ResourceKind::List.id_field().into(), Value::String(id));
    if let Some(position) = position {
      params.insert("pos".into(), position.to_value());
    }

    let card = service
      .create::<Card>(&Endpoint::collection(ResourceKind::Card), &params)
      .await?;
    self.mark_cards_for_update();
    self.invalidate_dependents();
    Ok(card)
  }
}
