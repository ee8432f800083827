//! Contract between the cache layer and whatever talks HTTP.

use color_eyre::Result;
use futures::future::BoxFuture;

use crate::endpoint::Endpoint;
use crate::record::{Params, Record};

/// Query string pairs sent with a read.
pub type Query = Vec<(String, String)>;

/// Remote transport consumed by the cache layer.
///
/// Errors are opaque to the core: they are wrapped in
/// [`crate::Error::Transport`] and never interpreted. The one signal the
/// core does rely on is `get` returning `Ok(None)` when the resource no
/// longer exists.
pub trait Transport: Send + Sync {
  fn get<'a>(&'a self, endpoint: &'a Endpoint, query: &'a Query)
    -> BoxFuture<'a, Result<Option<Record>>>;

  fn get_list<'a>(&'a self, endpoint: &'a Endpoint, query: &'a Query)
    -> BoxFuture<'a, Result<Vec<Record>>>;

  fn post<'a>(&'a self, endpoint: &'a Endpoint, params: &'a Params) -> BoxFuture<'a, Result<Record>>;

  fn put<'a>(&'a self, endpoint: &'a Endpoint, params: &'a Params) -> BoxFuture<'a, Result<Record>>;

  fn delete<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<()>>;
}
