//! Client-side object model for the Trello REST API.
//!
//! Entities are lazily synchronized proxies: reads refresh an expired
//! entity first, writes are staged locally and coalesced by a background
//! write queue, and every remote entity has exactly one live proxy per
//! [`Service`].

pub mod cache;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod position;
pub mod record;
pub mod service;
pub mod transport;
pub mod trello;
pub mod validator;

#[cfg(test)]
pub(crate) mod testing;

pub use cache::{Deletable, ExpiringCollection, Mutable, Refreshable, Resource};
pub use config::Config;
pub use endpoint::{Endpoint, ResourceKind};
pub use error::{Error, Result, ValidationError};
pub use position::Position;
pub use service::{Service, ServiceOptions};
pub use transport::Transport;
