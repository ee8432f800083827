use serde_json::Value;
use std::sync::Arc;

use super::{related, Board, Member, MembershipType};
use crate::cache::{self, EntityCore, Projection, Refreshable, Resource};
use crate::endpoint::{Endpoint, ResourceKind};
use crate::error::{Result, ValidationError};
use crate::record::Record;
use crate::validator;

/// A member's role on one board. Read-only; roles change through
/// [`Board::add_or_update_member`].
#[derive(Debug)]
pub struct Membership {
  core: EntityCore,
}

impl Resource for Membership {
  const KIND: ResourceKind = ResourceKind::Membership;

  const PROJECTION: Projection = Projection::new(
    &["idMember", "memberType", "unconfirmed", "deactivated"],
    &[("member", "false")],
  );

  const CARRIED: &'static [&'static str] = &["idBoard"];

  fn from_core(core: EntityCore) -> Self {
    Self { core }
  }

  fn core(&self) -> &EntityCore {
    &self.core
  }

  fn endpoint(&self) -> Result<Endpoint> {
    let id = validator::has_id(&self.core)?;
    let board = self
      .core
      .peek::<String>(ResourceKind::Board.id_field())
      .ok_or(ValidationError::EntityRequired("board"))?;
    Ok(Endpoint::related(ResourceKind::Board, &board, ResourceKind::Membership, &id))
  }

  fn adopt(record: &mut Record, owner: ResourceKind, owner_id: &str) {
    if owner == ResourceKind::Board {
      record
        .entry(ResourceKind::Board.id_field())
        .or_insert_with(|| Value::String(owner_id.to_string()));
    }
  }
}

impl Refreshable for Membership {}

impl Membership {
  pub async fn member_type(&self) -> Result<Option<MembershipType>> {
    cache::read(self, "memberType").await
  }

  /// Whether the member has not yet accepted an invitation.
  pub async fn is_unconfirmed(&self) -> Result<Option<bool>> {
    cache::read(self, "unconfirmed").await
  }

  pub async fn is_deactivated(&self) -> Result<Option<bool>> {
    cache::read(self, "deactivated").await
  }

  pub async fn member(&self) -> Result<Option<Arc<Member>>> {
    related(self, ResourceKind::Member.id_field()).await
  }

  pub async fn board(&self) -> Result<Option<Arc<Board>>> {
    related(self, ResourceKind::Board.id_field()).await
  }
}
