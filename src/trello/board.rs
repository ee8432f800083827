use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::{Action, Card, List, Member, Membership, MembershipType};
use crate::cache::{self, EntityCore, ExpiringCollection, Mutable, Projection, Refreshable, Resource};
use crate::endpoint::{Endpoint, ResourceKind};
use crate::error::{Error, Result};
use crate::position::Position;
use crate::record::{FieldValue, Params};
use crate::validator;

/// A board: the top of the board / list / card hierarchy.
#[derive(Debug)]
pub struct Board {
  core: EntityCore,
  actions: ExpiringCollection<Action>,
  lists: ExpiringCollection<List>,
  archived_lists: ExpiringCollection<List>,
  archived_cards: ExpiringCollection<Card>,
  members: ExpiringCollection<Member>,
  memberships: ExpiringCollection<Membership>,
}

impl Resource for Board {
  const KIND: ResourceKind = ResourceKind::Board;

  const PROJECTION: Projection = Projection::new(
    &["name", "desc", "closed", "idOrganization", "pinned", "url", "subscribed"],
    &[
      ("actions", "none"),
      ("cards", "none"),
      ("lists", "none"),
      ("members", "none"),
      ("checklists", "none"),
      ("organization", "false"),
      ("myPrefs", "false"),
    ],
  );

  fn from_core(core: EntityCore) -> Self {
    Self {
      core,
      actions: ExpiringCollection::new(),
      lists: ExpiringCollection::new(),
      archived_lists: ExpiringCollection::filtered("closed"),
      archived_cards: ExpiringCollection::filtered("closed"),
      members: ExpiringCollection::new(),
      memberships: ExpiringCollection::new(),
    }
  }

  fn core(&self) -> &EntityCore {
    &self.core
  }
}

impl Refreshable for Board {}

impl Mutable for Board {
  fn invalidate_dependents(&self) {
    self.actions.mark_for_update();
  }
}

impl Board {
  pub async fn name(&self) -> Result<Option<String>> {
    cache::read(self, "name").await
  }

  pub async fn description(&self) -> Result<Option<String>> {
    cache::read(self, "desc").await
  }

  pub async fn is_closed(&self) -> Result<Option<bool>> {
    cache::read(self, "closed").await
  }

  pub async fn is_pinned(&self) -> Result<Option<bool>> {
    cache::read(self, "pinned").await
  }

  pub async fn is_subscribed(&self) -> Result<Option<bool>> {
    cache::read(self, "subscribed").await
  }

  pub async fn url(&self) -> Result<Option<String>> {
    cache::read(self, "url").await
  }

  pub async fn organization_id(&self) -> Result<Option<String>> {
    cache::read(self, "idOrganization").await
  }

  pub fn set_name(self: &Arc<Self>, name: &str) -> Result<()> {
    validator::non_empty_string("name", name)?;
    cache::write(self, "name", name.to_string().to_value())
  }

  pub fn set_description(self: &Arc<Self>, description: Option<&str>) -> Result<()> {
    cache::write(self, "desc", Value::String(description.unwrap_or_default().to_string()))
  }

  pub fn set_closed(self: &Arc<Self>, closed: bool) -> Result<()> {
    cache::write(self, "closed", closed.to_value())
  }

  pub fn set_subscribed(self: &Arc<Self>, subscribed: bool) -> Result<()> {
    cache::write(self, "subscribed", subscribed.to_value())
  }

  // --------------------------------------------------------------------------
  // Collections
  // --------------------------------------------------------------------------

  pub async fn actions(&self) -> Result<Vec<Arc<Action>>> {
    self.actions.items(&self.core).await
  }

  /// Open lists, ordered by position.
  pub async fn lists(&self) -> Result<Vec<Arc<List>>> {
    self.lists.items(&self.core).await
  }

  /// Options of the open lists collection, for custom fields or filters.
  pub fn list_collection(&self) -> &ExpiringCollection<List> {
    &self.lists
  }

  pub async fn archived_lists(&self) -> Result<Vec<Arc<List>>> {
    self.archived_lists.items(&self.core).await
  }

  pub async fn archived_cards(&self) -> Result<Vec<Arc<Card>>> {
    self.archived_cards.items(&self.core).await
  }

  pub async fn members(&self) -> Result<Vec<Arc<Member>>> {
    self.members.items(&self.core).await
  }

  /// Members together with their role on this board.
  pub async fn memberships(&self) -> Result<Vec<Arc<Membership>>> {
    self.memberships.items(&self.core).await
  }

  pub fn mark_actions_for_update(&self) {
    self.actions.mark_for_update();
  }

  pub fn mark_lists_for_update(&self) {
    self.lists.mark_for_update();
    self.archived_lists.mark_for_update();
  }

  pub fn mark_cards_for_update(&self) {
    self.archived_cards.mark_for_update();
  }

  pub fn mark_members_for_update(&self) {
    self.members.mark_for_update();
    self.memberships.mark_for_update();
  }

  // --------------------------------------------------------------------------
  // Operations
  // --------------------------------------------------------------------------

  /// Create a list on this board.
  pub async fn add_list(&self, name: &str, position: Option<Position>) -> Result<Arc<List>> {
    let service = validator::writable(&self.core)?;
    let id = validator::has_id(&self.core)?;
    validator::non_empty_string("name", name)?;
    if let Some(position) = &position {
      validator::position("pos", position)?;
    }

    let mut params = Params::new();
    params.insert("name".into(), name.to_string().to_value());
    params.insert(ResourceKind::Board.id_field().into(), Value::String(id));
    if let Some(position) = position {
      params.insert("pos".into(), position.to_value());
    }

    let list = service
      .create::<List>(&Endpoint::collection(ResourceKind::List), &params)
      .await?;
    self.mark_lists_for_update();
    self.mark_actions_for_update();
    Ok(list)
  }

  /// Add a member to the board, or change the membership type of an
  /// existing one.
  pub async fn add_or_update_member(&self, member: &Member, membership: MembershipType) -> Result<()> {
    let service = validator::writable(&self.core)?;
    let id = validator::has_id(&self.core)?;
    let member_id = validator::entity("member", Some(member))?;
    validator::enumeration("type", &membership)?;

    let mut params = Params::new();
    params.insert("type".into(), membership.to_value());
    let endpoint = Endpoint::related(ResourceKind::Board, &id, ResourceKind::Member, &member_id);
    service.put(&endpoint, &params).await?;
    debug!(board = %id, member = %member_id, membership = membership.as_str(), "membership updated");

    self.mark_members_for_update();
    self.mark_actions_for_update();
    Ok(())
  }

  pub async fn remove_member(&self, member: &Member) -> Result<()> {
    let service = validator::writable(&self.core)?;
    let id = validator::has_id(&self.core)?;
    let member_id = validator::entity("member", Some(member))?;

    let endpoint = Endpoint::related(ResourceKind::Board, &id, ResourceKind::Member, &member_id);
    service.delete(&endpoint).await?;

    self.mark_members_for_update();
    self.mark_actions_for_update();
    Ok(())
  }

  /// Reset the unread marker for the current member.
  pub async fn mark_as_viewed(&self) -> Result<()> {
    let service = validator::writable(&self.core)?;
    let endpoint = self.endpoint()?.with("markAsViewed");
    service.post(&endpoint, &Params::new()).await?;
    self.mark_actions_for_update();
    Ok(())
  }

  /// Look a member up by email address and add them, or update their role.
  /// `Ok(None)` when no member matches. The full name is only checked.
  pub async fn add_or_update_member_by_email(
    &self,
    email: &str,
    full_name: &str,
    membership: MembershipType,
  ) -> Result<Option<Arc<Member>>> {
    let service = validator::writable(&self.core)?;
    validator::non_empty_string("email", email)?;
    validator::non_empty_string("fullName", full_name)?;

    let Some(found) = Member::search(&service, email, 1).await?.into_iter().next() else {
      debug!(email, "no member found");
      return Ok(None);
    };
    self.add_or_update_member(&found.member, membership).await?;
    Ok(Some(found.member))
  }

  /// Board invitations are not exposed by the API.
  pub async fn invite_member(&self, member: &Member, _membership: MembershipType) -> Result<()> {
    validator::writable(&self.core)?;
    validator::entity("member", Some(member))?;
    Err(Error::Unsupported("inviting a member to a board"))
  }

  pub async fn rescind_invitation(&self, member: &Member) -> Result<()> {
    validator::entity("member", Some(member))?;
    Err(Error::Unsupported("rescinding a board invitation"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::MockTransport;
  use serde_json::json;

  #[tokio::test]
  async fn test_add_list_marks_lists_stale() {
    let (svc, mock) = MockTransport::service();
    mock.insert("boards/b1", json!({"id": "b1", "name": "Board"}));
    mock.insert("lists/l1", json!({"id": "l1", "name": "Todo", "idBoard": "b1", "pos": 1}));
    mock.link("boards/b1/lists", "lists/l1");

    let board = svc.retrieve::<Board>("b1");
    assert_eq!(board.lists().await.unwrap().len(), 1);

    let list = board.add_list("Done", Some(Position::Bottom)).await.unwrap();
    let post = mock.calls_for("POST", "lists").pop().unwrap();
    assert_eq!(post.param("idBoard").as_deref(), Some("b1"));
    assert_eq!(post.param("pos").as_deref(), Some("bottom"));

    let lists = board.lists().await.unwrap();
    assert_eq!(lists.len(), 2);
    assert!(lists.iter().any(|l| Arc::ptr_eq(l, &list)));
    assert_eq!(mock.count("GET", "boards/b1/lists"), 2);
  }

  #[tokio::test]
  async fn test_add_list_validates_before_network() {
    let (svc, mock) = MockTransport::service();
    let board = svc.retrieve::<Board>("b1");

    assert!(board.add_list("  ", None).await.unwrap_err().is_validation());
    assert!(board
      .add_list("Later", Some(Position::Unknown))
      .await
      .unwrap_err()
      .is_validation());
    assert!(mock.calls().is_empty());
  }

  #[tokio::test]
  async fn test_writes_mark_actions_stale() {
    let (svc, mock) = MockTransport::service();
    mock.insert("boards/b1", json!({"id": "b1", "name": "Board"}));
    let board = svc.retrieve::<Board>("b1");

    board.actions().await.unwrap();
    board.set_name("Renamed").unwrap();
    svc.flush().await.unwrap();
    board.actions().await.unwrap();
    assert_eq!(mock.count("GET", "boards/b1/actions"), 2);
  }

  #[tokio::test]
  async fn test_membership() {
    let (svc, mock) = MockTransport::service();
    mock.insert("boards/b1", json!({"id": "b1"}));
    mock.insert("members/m1", json!({"id": "m1", "username": "ada"}));
    let board = svc.retrieve::<Board>("b1");
    let member = svc.retrieve::<Member>("m1");

    board
      .add_or_update_member(&member, MembershipType::Admin)
      .await
      .unwrap();
    let put = mock.calls_for("PUT", "boards/b1/members/m1").pop().unwrap();
    assert_eq!(put.param("type").as_deref(), Some("admin"));

    let err = board
      .add_or_update_member(&member, MembershipType::Other("owner".into()))
      .await
      .unwrap_err();
    assert!(err.is_validation());

    board.remove_member(&member).await.unwrap();
    assert_eq!(mock.count("DELETE", "boards/b1/members/m1"), 1);
  }

  #[tokio::test]
  async fn test_mark_as_viewed_marks_actions() {
    let (svc, mock) = MockTransport::service();
    mock.insert("boards/b1", json!({"id": "b1"}));
    let board = svc.retrieve::<Board>("b1");
    board.actions().await.unwrap();

    board.mark_as_viewed().await.unwrap();
    assert_eq!(mock.count("POST", "boards/b1/markAsViewed"), 1);
    board.actions().await.unwrap();
    assert_eq!(mock.count("GET", "boards/b1/actions"), 2);
  }

  #[tokio::test]
  async fn test_invitations_validate_then_report_unsupported() {
    let (svc, mock) = MockTransport::service();
    let board = svc.retrieve::<Board>("b1");
    let member = svc.retrieve::<Member>("m1");

    assert!(matches!(
      board.invite_member(&member, MembershipType::Normal).await,
      Err(Error::Unsupported(_))
    ));
    assert!(matches!(
      board.rescind_invitation(&member).await,
      Err(Error::Unsupported(_))
    ));

    let stranger = Member::detached(Some("m2"));
    assert!(board
      .invite_member(&stranger, MembershipType::Normal)
      .await
      .unwrap_err()
      .is_validation());
    assert!(board.rescind_invitation(&stranger).await.unwrap_err().is_validation());
    let detached = Board::detached(Some("b2"));
    assert!(detached
      .invite_member(&member, MembershipType::Normal)
      .await
      .unwrap_err()
      .is_validation());
    assert!(mock.calls().is_empty());
  }

  #[tokio::test]
  async fn test_add_member_by_email_uses_search() {
    let (svc, mock) = MockTransport::service();
    mock.insert("boards/b1", json!({"id": "b1"}));
    mock.insert("members/m1", json!({"id": "m1", "username": "ada", "similarity": 90}));
    mock.link("search/members", "members/m1");
    let board = svc.retrieve::<Board>("b1");
    board.memberships().await.unwrap();

    let member = board
      .add_or_update_member_by_email("ada@example.com", "Ada Lovelace", MembershipType::Observer)
      .await
      .unwrap()
      .unwrap();
    assert!(Arc::ptr_eq(&member, &svc.retrieve::<Member>("m1")));
    let search = mock.calls_for("GET", "search/members").pop().unwrap();
    assert_eq!(search.param("query").as_deref(), Some("ada@example.com"));
    assert_eq!(search.param("limit").as_deref(), Some("1"));
    let put = mock.calls_for("PUT", "boards/b1/members/m1").pop().unwrap();
    assert_eq!(put.param("type").as_deref(), Some("observer"));

    board.memberships().await.unwrap();
    assert_eq!(mock.count("GET", "boards/b1/memberships"), 2);

    assert!(board
      .add_or_update_member_by_email("ada@example.com", " ", MembershipType::Normal)
      .await
      .unwrap_err()
      .is_validation());
  }

  #[tokio::test]
  async fn test_add_member_by_email_without_match() {
    let (svc, mock) = MockTransport::service();
    let board = svc.retrieve::<Board>("b1");
    let found = board
      .add_or_update_member_by_email("nobody@example.com", "Nobody", MembershipType::Normal)
      .await
      .unwrap();
    assert!(found.is_none());
    assert_eq!(mock.count("GET", "search/members"), 1);
    assert!(mock.calls_for("PUT", "boards/b1/members/m1").is_empty());
  }
}
