use serde_json::Value;
use std::sync::Arc;

use super::{live, live_related, related, relinked, Board, Card, CheckItemState};
use crate::cache::{
  self, Deletable, EntityCore, ExpiringCollection, Mutable, Projection, Refreshable, Resource,
};
use crate::endpoint::{Endpoint, ResourceKind};
use crate::error::{Result, ValidationError};
use crate::position::Position;
use crate::record::{FieldValue, Params};
use crate::validator;

/// A named list of check items on a card.
#[derive(Debug)]
pub struct CheckList {
  core: EntityCore,
  check_items: ExpiringCollection<CheckItem>,
}

impl Resource for CheckList {
  const KIND: ResourceKind = ResourceKind::CheckList;

  const PROJECTION: Projection = Projection::new(
    &["name", "idBoard", "idCard", "pos"],
    &[("checkItems", "none"), ("cards", "none")],
  );

  const ORDERED: bool = true;

  fn from_core(core: EntityCore) -> Self {
    Self {
      core,
      check_items: ExpiringCollection::new(),
    }
  }

  fn core(&self) -> &EntityCore {
    &self.core
  }
}

impl Refreshable for CheckList {}

impl Mutable for CheckList {
  fn staged(&self, field: &str, previous: Option<&Value>) {
    match field {
      "idCard" => {
        if let Some(old) = live::<Card>(&self.core, previous.and_then(Value::as_str)) {
          old.mark_checklists_for_update();
        }
        self.mark_card_checklists();
      }
      "pos" => self.mark_card_checklists(),
      _ => {}
    }
  }

  fn invalidate_dependents(&self) {
    if let Some(card) = live_related::<Card>(&self.core, "idCard") {
      card.mark_actions_for_update();
    }
  }

  fn written(&self, sent: &Params, replaced: &Params) {
    if sent.contains_key("idCard") {
      relinked::<Card>(&self.core, "idCard", replaced, Card::mark_checklists_for_update);
    }
    if sent.contains_key("pos") {
      self.mark_card_checklists();
    }
    self.invalidate_dependents();
  }
}

impl Deletable for CheckList {
  fn before_delete(&self) {
    self.mark_card_checklists();
  }
}

impl CheckList {
  fn mark_card_checklists(&self) {
    if let Some(card) = live_related::<Card>(&self.core, "idCard") {
      card.mark_checklists_for_update();
    }
  }

  pub async fn name(&self) -> Result<Option<String>> {
    cache::read(self, "name").await
  }

  pub async fn position(&self) -> Result<Position> {
    Ok(cache::read(self, "pos").await?.unwrap_or_default())
  }

  pub async fn card(&self) -> Result<Option<Arc<Card>>> {
    related(self, ResourceKind::Card.id_field()).await
  }

  pub async fn board(&self) -> Result<Option<Arc<Board>>> {
    related(self, ResourceKind::Board.id_field()).await
  }

  pub fn set_name(self: &Arc<Self>, name: &str) -> Result<()> {
    validator::non_empty_string("name", name)?;
    cache::write(self, "name", Value::String(name.to_string()))
  }

  pub fn set_position(self: &Arc<Self>, position: Position) -> Result<()> {
    validator::position("pos", &position)?;
    cache::write(self, "pos", position.to_value())
  }

  /// Move the checklist to another card.
  pub fn set_card(self: &Arc<Self>, card: &Card) -> Result<()> {
    let card_id = validator::entity("card", Some(card))?;
    cache::write(self, ResourceKind::Card.id_field(), Value::String(card_id))
  }

  pub async fn check_items(&self) -> Result<Vec<Arc<CheckItem>>> {
    self.check_items.items(&self.core).await
  }

  pub fn mark_check_items_for_update(&self) {
    self.check_items.mark_for_update();
  }

  /// Add an item in the given state, at `position` or at the bottom.
  pub async fn add_check_item(
    &self,
    name: &str,
    state: CheckItemState,
    position: Option<Position>,
  ) -> Result<Arc<CheckItem>> {
    let service = validator::writable(&self.core)?;
    let id = validator::has_id(&self.core)?;
    validator::non_empty_string("name", name)?;
    validator::enumeration("state", &state)?;
    if let Some(position) = &position {
      validator::position("pos", position)?;
    }

    let mut params = Params::new();
    params.insert("name".into(), Value::String(name.to_string()));
    params.insert("checked".into(), (state == CheckItemState::Complete).to_value());
    if let Some(position) = position {
      params.insert("pos".into(), position.to_value());
    }

    let endpoint = Endpoint::children(ResourceKind::CheckList, &id, ResourceKind::CheckItem);
    let item = service.create::<CheckItem>(&endpoint, &params).await?;
    self.mark_check_items_for_update();
    self.invalidate_dependents();
    Ok(item)
  }
}

/// One entry of a checklist. Only reachable through its checklist.
#[derive(Debug)]
pub struct CheckItem {
  core: EntityCore,
}

impl CheckItem {
  fn checklist_id(&self) -> Result<String> {
    self
      .core
      .peek::<String>(ResourceKind::CheckList.id_field())
      .ok_or_else(|| ValidationError::EntityRequired("checklist").into())
  }
}

impl Resource for CheckItem {
  const KIND: ResourceKind = ResourceKind::CheckItem;

  const PROJECTION: Projection = Projection::new(&["name", "state", "pos", "idChecklist"], &[]);

  const ORDERED: bool = true;

  fn from_core(core: EntityCore) -> Self {
    Self { core }
  }

  fn core(&self) -> &EntityCore {
    &self.core
  }

  fn endpoint(&self) -> Result<Endpoint> {
    let id = validator::has_id(&self.core)?;
    Ok(Endpoint::related(
      ResourceKind::CheckList,
      &self.checklist_id()?,
      ResourceKind::CheckItem,
      &id,
    ))
  }

  fn create_endpoint(&self) -> Result<Endpoint> {
    Ok(Endpoint::children(
      ResourceKind::CheckList,
      &self.checklist_id()?,
      ResourceKind::CheckItem,
    ))
  }
}

impl Refreshable for CheckItem {}

impl Mutable for CheckItem {
  fn invalidate_dependents(&self) {
    if let Some(checklist) = live_related::<CheckList>(&self.core, "idChecklist") {
      checklist.mark_check_items_for_update();
      checklist.invalidate_dependents();
    }
  }
}

impl Deletable for CheckItem {
  fn before_delete(&self) {
    self.invalidate_dependents();
  }
}

impl CheckItem {
  pub async fn name(&self) -> Result<Option<String>> {
    cache::read(self, "name").await
  }

  pub async fn state(&self) -> Result<Option<CheckItemState>> {
    cache::read(self, "state").await
  }

  pub async fn position(&self) -> Result<Position> {
    Ok(cache::read(self, "pos").await?.unwrap_or_default())
  }

  pub async fn checklist(&self) -> Result<Option<Arc<CheckList>>> {
    related(self, ResourceKind::CheckList.id_field()).await
  }

  pub fn set_name(self: &Arc<Self>, name: &str) -> Result<()> {
    validator::non_empty_string("name", name)?;
    cache::write(self, "name", Value::String(name.to_string()))
  }

  pub fn set_state(self: &Arc<Self>, state: CheckItemState) -> Result<()> {
    validator::enumeration("state", &state)?;
    cache::write(self, "state", state.to_value())
  }

  pub fn set_position(self: &Arc<Self>, position: Position) -> Result<()> {
    validator::position("pos", &position)?;
    cache::write(self, "pos", position.to_value())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::MockTransport;
  use serde_json::json;

  #[tokio::test]
  async fn test_add_check_item_marks_items() {
    let (svc, mock) = MockTransport::service();
    mock.insert("checklists/cl1", json!({"id": "cl1", "name": "Steps", "idCard": "c1"}));
    let checklist = svc.retrieve::<CheckList>("cl1");
    assert!(checklist.check_items().await.unwrap().is_empty());

    let item = checklist
      .add_check_item("One", CheckItemState::Complete, Some(Position::Top))
      .await
      .unwrap();
    let post = mock.calls_for("POST", "checklists/cl1/checkItems").pop().unwrap();
    assert_eq!(post.param("checked").as_deref(), Some("true"));
    assert_eq!(post.param("pos").as_deref(), Some("top"));
    let items = checklist.check_items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert!(Arc::ptr_eq(&items[0], &item));

    checklist
      .add_check_item("Two", CheckItemState::Incomplete, None)
      .await
      .unwrap();
    let post = mock.calls_for("POST", "checklists/cl1/checkItems").pop().unwrap();
    assert_eq!(post.param("checked").as_deref(), Some("false"));
    assert!(checklist
      .add_check_item("Three", CheckItemState::Other("skipped".into()), None)
      .await
      .unwrap_err()
      .is_validation());
    assert_eq!(mock.count("POST", "checklists/cl1/checkItems"), 2);
  }

  #[tokio::test]
  async fn test_check_item_writes_use_nested_path() {
    let (svc, mock) = MockTransport::service();
    mock.insert(
      "checklists/cl1/checkItems/i1",
      json!({"id": "i1", "name": "One", "state": "incomplete", "idChecklist": "cl1"}),
    );
    mock.link("checklists/cl1/checkItems", "checklists/cl1/checkItems/i1");
    let checklist = svc.retrieve::<CheckList>("cl1");
    let item = checklist.check_items().await.unwrap().pop().unwrap();

    assert_eq!(item.state().await.unwrap(), Some(CheckItemState::Incomplete));
    item.set_state(CheckItemState::Complete).unwrap();
    assert!(item
      .set_state(CheckItemState::Other("skipped".into()))
      .unwrap_err()
      .is_validation());
    svc.flush().await.unwrap();

    let put = mock.calls_for("PUT", "checklists/cl1/checkItems/i1").pop().unwrap();
    assert_eq!(put.param("state").as_deref(), Some("complete"));
  }

  #[tokio::test]
  async fn test_moving_checklist_marks_both_cards_after_write() {
    let (svc, mock) = MockTransport::service();
    mock.insert("checklists/cl1", json!({"id": "cl1", "idCard": "c1"}));
    mock.link("cards/c1/checklists", "checklists/cl1");
    let from = svc.retrieve::<Card>("c1");
    let to = svc.retrieve::<Card>("c2");
    let checklist = from.checklists().await.unwrap().pop().unwrap();
    assert!(to.checklists().await.unwrap().is_empty());

    checklist.set_card(&to).unwrap();
    assert_eq!(from.checklists().await.unwrap().len(), 1);
    svc.flush().await.unwrap();

    assert!(from.checklists().await.unwrap().is_empty());
    let moved = to.checklists().await.unwrap();
    assert!(Arc::ptr_eq(&moved[0], &checklist));
  }

  #[tokio::test]
  async fn test_deleting_checklist_marks_card_checklists() {
    let (svc, mock) = MockTransport::service();
    mock.insert("checklists/cl1", json!({"id": "cl1", "idCard": "c1"}));
    mock.link("cards/c1/checklists", "checklists/cl1");
    let card = svc.retrieve::<Card>("c1");
    let checklists = card.checklists().await.unwrap();
    assert_eq!(checklists.len(), 1);

    checklists[0].delete().await.unwrap();
    assert!(card.checklists().await.unwrap().is_empty());
    assert_eq!(mock.count("GET", "cards/c1/checklists"), 2);
  }
}
