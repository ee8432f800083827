//! In-memory transport for tests.
//!
//! Objects live at their full path (`cards/c1`), collections map a path
//! (`lists/l1/cards`) to the object paths they list. Creation and updates
//! maintain those links from `id*` reference fields the way the server does.

use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::endpoint::{Endpoint, ResourceKind};
use crate::record::{self, Params, Record};
use crate::service::Service;
use crate::transport::{Query, Transport};

/// One request seen by the mock.
#[derive(Debug, Clone)]
pub struct Call {
  pub method: String,
  pub endpoint: String,
  /// Query pairs for reads, the body for writes.
  pub params: Params,
}

impl Call {
  pub fn param(&self, name: &str) -> Option<String> {
    self.params.get(name).map(record::param_string)
  }
}

#[derive(Default)]
struct State {
  objects: HashMap<String, Record>,
  collections: HashMap<String, Vec<String>>,
  failing: HashSet<String>,
  calls: Vec<Call>,
  latency: Duration,
  next_id: u64,
}

#[derive(Default)]
pub struct MockTransport {
  state: Mutex<State>,
}

impl MockTransport {
  /// A fresh service over a fresh mock.
  pub fn service() -> (Service, Arc<MockTransport>) {
    let mock = Arc::new(MockTransport::default());
    (Service::new(mock.clone()), mock)
  }

  fn state(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap()
  }

  pub fn insert(&self, path: &str, value: Value) {
    let Value::Object(record) = value else {
      panic!("mock objects must be JSON objects");
    };
    self.state().objects.insert(path.to_string(), record);
  }

  /// Remove an object behind the cache's back.
  pub fn remove(&self, path: &str) {
    let mut state = self.state();
    state.objects.remove(path);
    unlink_everywhere(&mut state, path);
  }

  pub fn link(&self, collection: &str, path: &str) {
    let mut state = self.state();
    let items = state.collections.entry(collection.to_string()).or_default();
    if !items.iter().any(|p| p == path) {
      items.push(path.to_string());
    }
  }

  /// Make every request to `path` fail until [`MockTransport::recover`].
  pub fn fail(&self, path: &str) {
    self.state().failing.insert(path.to_string());
  }

  pub fn recover(&self, path: &str) {
    self.state().failing.remove(path);
  }

  pub fn set_latency(&self, latency: Duration) {
    self.state().latency = latency;
  }

  pub fn calls(&self) -> Vec<Call> {
    self.state().calls.clone()
  }

  pub fn calls_for(&self, method: &str, path: &str) -> Vec<Call> {
    self
      .state()
      .calls
      .iter()
      .filter(|c| c.method == method && c.endpoint == path)
      .cloned()
      .collect()
  }

  pub fn count(&self, method: &str, path: &str) -> usize {
    self.calls_for(method, path).len()
  }

  pub fn last_call(&self) -> Option<Call> {
    self.state().calls.last().cloned()
  }

  /// Log the call, apply latency, then fail if the path is marked failing.
  async fn begin(&self, method: &str, endpoint: &Endpoint, params: Params) -> Result<()> {
    let path = endpoint.to_string();
    let latency = {
      let mut state = self.state();
      state.calls.push(Call {
        method: method.to_string(),
        endpoint: path.clone(),
        params,
      });
      state.latency
    };
    if !latency.is_zero() {
      tokio::time::sleep(latency).await;
    }
    if self.state().failing.contains(&path) {
      return Err(eyre!("injected failure for {} {}", method, path));
    }
    Ok(())
  }

  fn create(&self, endpoint: &Endpoint, params: &Params) -> Record {
    let mut state = self.state();
    state.next_id += 1;
    let id = format!("{:024x}", state.next_id);
    let segments = endpoint.segments();

    // cards/{id}/actions/comments
    if segments.last().map(String::as_str) == Some("comments") {
      let card = segments[1].clone();
      let record = as_record(json!({
        "id": id,
        "type": "commentCard",
        "idMemberCreator": "me",
        "data": {"text": params.get("text").cloned().unwrap_or(Value::Null), "card": {"id": card}},
      }));
      let path = format!("actions/{}", id);
      state.objects.insert(path.clone(), record.clone());
      state
        .collections
        .entry(format!("cards/{}/actions", card))
        .or_default()
        .push(path);
      return record;
    }

    match segments {
      [collection] => {
        let mut record = params.clone();
        record.insert("id".into(), Value::String(id.clone()));
        let path = format!("{}/{}", collection, id);
        for (field, value) in params {
          if let (Some(owner), Some(owner_id)) = (owner_kind(field), value.as_str()) {
            let parent = format!("{}/{}/{}", owner.path(), owner_id, collection);
            state.collections.entry(parent).or_default().push(path.clone());
          }
        }
        state.objects.insert(path, record.clone());
        record
      }
      [owner, owner_id, child] if is_kind_path(child) => {
        let mut record = params.clone();
        record.insert("id".into(), Value::String(id.clone()));
        if let Some(kind) = ResourceKind::ALL.iter().find(|k| k.path() == owner.as_str()) {
          record.insert(kind.id_field().into(), Value::String(owner_id.clone()));
        }
        let path = format!("{}/{}", endpoint, id);
        state
          .collections
          .entry(endpoint.to_string())
          .or_default()
          .push(path.clone());
        state.objects.insert(path, record.clone());
        record
      }
      // Operations such as boards/{id}/markAsViewed answer with the owner.
      [owner, owner_id, ..] => state
        .objects
        .get(&format!("{}/{}", owner, owner_id))
        .cloned()
        .unwrap_or_default(),
      [] => Record::new(),
    }
  }

  fn update(&self, endpoint: &Endpoint, params: &Params) -> Record {
    let mut state = self.state();
    let path = endpoint.to_string();
    let mut record = state.objects.get(&path).cloned().unwrap_or_default();

    if let [collection, _] = endpoint.segments() {
      for (field, value) in params {
        let (Some(owner), Some(new)) = (owner_kind(field), value.as_str()) else {
          continue;
        };
        if let Some(old) = record.get(field).and_then(Value::as_str) {
          if old == new {
            continue;
          }
          let parent = format!("{}/{}/{}", owner.path(), old, collection);
          if let Some(items) = state.collections.get_mut(&parent) {
            items.retain(|p| p != &path);
          }
        }
        let parent = format!("{}/{}/{}", owner.path(), new, collection);
        state.collections.entry(parent).or_default().push(path.clone());
      }
    }

    for (field, value) in params {
      record.insert(field.clone(), value.clone());
    }
    state.objects.insert(path, record.clone());
    record
  }
}

fn as_record(value: Value) -> Record {
  match value {
    Value::Object(record) => record,
    _ => Record::new(),
  }
}

fn is_kind_path(segment: &str) -> bool {
  ResourceKind::ALL.iter().any(|k| k.path() == segment)
}

/// The kind a reference field such as `idList` points at.
fn owner_kind(field: &str) -> Option<ResourceKind> {
  ResourceKind::ALL
    .into_iter()
    .filter(|k| *k != ResourceKind::MemberPreferences)
    .find(|k| k.id_field() == field)
}

fn unlink_everywhere(state: &mut State, path: &str) {
  for items in state.collections.values_mut() {
    items.retain(|p| p != path);
  }
}

fn query_params(query: &Query) -> Params {
  query
    .iter()
    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
    .collect()
}

fn matches_filter(record: &Record, filter: Option<&str>) -> bool {
  let closed = record.get("closed").and_then(Value::as_bool).unwrap_or(false);
  match filter {
    Some("closed") => closed,
    Some("open") => !closed,
    _ => true,
  }
}

impl Transport for MockTransport {
  fn get<'a>(&'a self, endpoint: &'a Endpoint, query: &'a Query) -> BoxFuture<'a, Result<Option<Record>>> {
    Box::pin(async move {
      self.begin("GET", endpoint, query_params(query)).await?;
      Ok(self.state().objects.get(&endpoint.to_string()).cloned())
    })
  }

  fn get_list<'a>(&'a self, endpoint: &'a Endpoint, query: &'a Query) -> BoxFuture<'a, Result<Vec<Record>>> {
    Box::pin(async move {
      self.begin("GET", endpoint, query_params(query)).await?;
      let filter = query
        .iter()
        .find(|(k, _)| k == "filter")
        .map(|(_, v)| v.as_str());
      let state = self.state();
      let paths = state
        .collections
        .get(&endpoint.to_string())
        .cloned()
        .unwrap_or_default();
      Ok(
        paths
          .iter()
          .filter_map(|p| state.objects.get(p))
          .filter(|r| matches_filter(r, filter))
          .cloned()
          .collect(),
      )
    })
  }

  fn post<'a>(&'a self, endpoint: &'a Endpoint, params: &'a Params) -> BoxFuture<'a, Result<Record>> {
    Box::pin(async move {
      self.begin("POST", endpoint, params.clone()).await?;
      Ok(self.create(endpoint, params))
    })
  }

  fn put<'a>(&'a self, endpoint: &'a Endpoint, params: &'a Params) -> BoxFuture<'a, Result<Record>> {
    Box::pin(async move {
      self.begin("PUT", endpoint, params.clone()).await?;
      Ok(self.update(endpoint, params))
    })
  }

  fn delete<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
      self.begin("DELETE", endpoint, Params::new()).await?;
      let path = endpoint.to_string();
      let mut state = self.state();
      state.objects.remove(&path);
      unlink_everywhere(&mut state, &path);
      Ok(())
    })
  }
}
