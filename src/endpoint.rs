//! Resource kinds and the paths used to reach them.

use std::fmt;

/// The fixed set of remote resource types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
  Board,
  List,
  Card,
  CheckList,
  CheckItem,
  Member,
  MemberPreferences,
  Action,
  Membership,
}

impl ResourceKind {
  pub const COUNT: usize = 9;

  pub const ALL: [ResourceKind; Self::COUNT] = [
    ResourceKind::Board,
    ResourceKind::List,
    ResourceKind::Card,
    ResourceKind::CheckList,
    ResourceKind::CheckItem,
    ResourceKind::Member,
    ResourceKind::MemberPreferences,
    ResourceKind::Action,
    ResourceKind::Membership,
  ];

  /// Path segment naming the collection of this kind.
  pub fn path(&self) -> &'static str {
    match self {
      ResourceKind::Board => "boards",
      ResourceKind::List => "lists",
      ResourceKind::Card => "cards",
      ResourceKind::CheckList => "checklists",
      ResourceKind::CheckItem => "checkItems",
      ResourceKind::Member => "members",
      ResourceKind::MemberPreferences => "prefs",
      ResourceKind::Action => "actions",
      ResourceKind::Membership => "memberships",
    }
  }

  /// Name of the field other records use to reference this kind.
  pub fn id_field(&self) -> &'static str {
    match self {
      ResourceKind::Board => "idBoard",
      ResourceKind::List => "idList",
      ResourceKind::Card => "idCard",
      ResourceKind::CheckList => "idChecklist",
      ResourceKind::CheckItem => "idCheckItem",
      ResourceKind::Member => "idMember",
      ResourceKind::MemberPreferences => "prefs",
      ResourceKind::Action => "idAction",
      ResourceKind::Membership => "idMembership",
    }
  }

  pub(crate) fn index(&self) -> usize {
    *self as usize
  }
}

impl fmt::Display for ResourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      ResourceKind::Board => "board",
      ResourceKind::List => "list",
      ResourceKind::Card => "card",
      ResourceKind::CheckList => "checklist",
      ResourceKind::CheckItem => "check item",
      ResourceKind::Member => "member",
      ResourceKind::MemberPreferences => "member preferences",
      ResourceKind::Action => "action",
      ResourceKind::Membership => "membership",
    };
    f.write_str(name)
  }
}

/// A resource path relative to the API root, e.g. `boards/abc/lists`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
  segments: Vec<String>,
}

impl Endpoint {
  /// A path outside the resource hierarchy, such as `search`.
  pub fn root(segment: &str) -> Self {
    Self {
      segments: vec![segment.to_string()],
    }
  }

  /// The collection of a kind, used for creation: `cards`.
  pub fn collection(kind: ResourceKind) -> Self {
    Self::root(kind.path())
  }

  /// A single entity: `cards/{id}`.
  pub fn entity(kind: ResourceKind, id: &str) -> Self {
    Self::collection(kind).with(id)
  }

  /// A child collection of an entity: `boards/{id}/lists`.
  pub fn children(owner: ResourceKind, owner_id: &str, child: ResourceKind) -> Self {
    Self::entity(owner, owner_id).with(child.path())
  }

  /// A related entity under an owner: `boards/{id}/members/{member}`.
  pub fn related(owner: ResourceKind, owner_id: &str, child: ResourceKind, id: &str) -> Self {
    Self::children(owner, owner_id, child).with(id)
  }

  pub fn with(mut self, segment: &str) -> Self {
    self.segments.push(segment.to_string());
    self
  }

  pub fn segments(&self) -> &[String] {
    &self.segments
  }
}

impl fmt::Display for Endpoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.segments.join("/"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_paths() {
    assert_eq!(Endpoint::entity(ResourceKind::Card, "c1").to_string(), "cards/c1");
    assert_eq!(
      Endpoint::children(ResourceKind::Board, "b1", ResourceKind::List).to_string(),
      "boards/b1/lists"
    );
    assert_eq!(
      Endpoint::related(ResourceKind::Board, "b1", ResourceKind::Member, "m1").to_string(),
      "boards/b1/members/m1"
    );
    assert_eq!(
      Endpoint::entity(ResourceKind::Board, "b1")
        .with("markAsViewed")
        .to_string(),
      "boards/b1/markAsViewed"
    );
    assert_eq!(
      Endpoint::root("search").with(ResourceKind::Member.path()).to_string(),
      "search/members"
    );
  }

  #[test]
  fn test_kind_indices_are_dense() {
    for (i, kind) in ResourceKind::ALL.iter().enumerate() {
      assert_eq!(kind.index(), i);
    }
  }
}
