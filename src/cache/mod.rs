//! Expiring entity cache and lazy synchronization layer.
//!
//! This module provides the resource-agnostic machinery every proxy is
//! built from:
//! - an identity map holding one live instance per (kind, id)
//! - expiring entities that refresh before a read once their kind's
//!   generation moves past their last sync, or after an explicit mark
//! - lazily fetched child collections
//! - a write queue that coalesces staged writes per entity

mod collection;
mod entity;
mod identity;
mod queue;
mod traits;

pub use collection::ExpiringCollection;
pub use entity::EntityCore;
pub use identity::IdentityCache;
pub use traits::{
  Deletable, Mutable, Projection, Refreshable, Resource, WriteMethod, WriteRequest,
};

pub(crate) use entity::{read, write};
pub(crate) use queue::{Flushable, WriteQueue};
