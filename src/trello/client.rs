use color_eyre::{eyre::eyre, Result};
use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::endpoint::Endpoint;
use crate::record::{Params, Record};
use crate::transport::{Query, Transport};

/// Trello REST API transport
///
/// Authenticates every request with the application key and user token as
/// query parameters. Write parameters go out as a JSON body.
#[derive(Clone)]
pub struct RestTransport {
  client: Client,
  base: Url,
  key: String,
  token: String,
}

impl RestTransport {
  pub fn new(base_url: &str, key: &str, token: &str) -> Result<Self> {
    let base = Url::parse(base_url).map_err(|e| eyre!("Invalid API url {}: {}", base_url, e))?;
    if base.cannot_be_a_base() {
      return Err(eyre!("Invalid API url {}: not a base url", base_url));
    }

    let client = Client::builder()
      .user_agent(concat!("trello-sync/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self {
      client,
      base,
      key: key.to_string(),
      token: token.to_string(),
    })
  }

  fn url(&self, endpoint: &Endpoint) -> Result<Url> {
    let mut url = self.base.clone();
    url
      .path_segments_mut()
      .map_err(|_| eyre!("Invalid API url {}", self.base))?
      .pop_if_empty()
      .extend(endpoint.segments());
    Ok(url)
  }

  fn request(&self, method: Method, endpoint: &Endpoint) -> Result<RequestBuilder> {
    let url = self.url(endpoint)?;
    debug!(%method, %endpoint, "request");
    Ok(
      self
        .client
        .request(method, url)
        .query(&[("key", &self.key), ("token", &self.token)]),
    )
  }

  /// Send a request; `Ok(None)` when the resource does not exist.
  async fn send(&self, request: RequestBuilder, endpoint: &Endpoint) -> Result<Option<Value>> {
    let response = request
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach {}: {}", endpoint, e))?;

    let status = response.status();
    if status == StatusCode::NOT_FOUND {
      return Ok(None);
    }
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(eyre!("Request to {} failed with {}: {}", endpoint, status, body.trim()));
    }

    let body = response
      .text()
      .await
      .map_err(|e| eyre!("Failed to read response from {}: {}", endpoint, e))?;
    if body.trim().is_empty() {
      return Ok(Some(Value::Null));
    }
    let value = serde_json::from_str(&body)
      .map_err(|e| eyre!("Failed to parse response from {}: {}", endpoint, e))?;
    Ok(Some(value))
  }

  async fn write(&self, method: Method, endpoint: &Endpoint, params: &Params) -> Result<Record> {
    let request = self.request(method, endpoint)?.json(params);
    let value = self
      .send(request, endpoint)
      .await?
      .ok_or_else(|| eyre!("{} does not exist", endpoint))?;
    into_record(value, endpoint)
  }
}

fn into_record(value: Value, endpoint: &Endpoint) -> Result<Record> {
  match value {
    Value::Object(record) => Ok(record),
    Value::Null => Ok(Record::new()),
    other => Err(eyre!("Expected an object from {}, got {}", endpoint, other)),
  }
}

impl Transport for RestTransport {
  fn get<'a>(&'a self, endpoint: &'a Endpoint, query: &'a Query) -> BoxFuture<'a, Result<Option<Record>>> {
    Box::pin(async move {
      let request = self.request(Method::GET, endpoint)?.query(query);
      match self.send(request, endpoint).await? {
        Some(value) => into_record(value, endpoint).map(Some),
        None => Ok(None),
      }
    })
  }

  fn get_list<'a>(&'a self, endpoint: &'a Endpoint, query: &'a Query) -> BoxFuture<'a, Result<Vec<Record>>> {
    Box::pin(async move {
      let request = self.request(Method::GET, endpoint)?.query(query);
      let value = self
        .send(request, endpoint)
        .await?
        .ok_or_else(|| eyre!("{} does not exist", endpoint))?;
      match value {
        Value::Array(items) => items
          .into_iter()
          .map(|item| into_record(item, endpoint))
          .collect(),
        other => Err(eyre!("Expected a list from {}, got {}", endpoint, other)),
      }
    })
  }

  fn post<'a>(&'a self, endpoint: &'a Endpoint, params: &'a Params) -> BoxFuture<'a, Result<Record>> {
    Box::pin(self.write(Method::POST, endpoint, params))
  }

  fn put<'a>(&'a self, endpoint: &'a Endpoint, params: &'a Params) -> BoxFuture<'a, Result<Record>> {
    Box::pin(self.write(Method::PUT, endpoint, params))
  }

  fn delete<'a>(&'a self, endpoint: &'a Endpoint) -> BoxFuture<'a, Result<()>> {
    Box::pin(async move {
      let request = self.request(Method::DELETE, endpoint)?;
      self
        .send(request, endpoint)
        .await?
        .ok_or_else(|| eyre!("{} does not exist", endpoint))?;
      Ok(())
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::endpoint::ResourceKind;

  #[test]
  fn test_url_appends_segments_to_base_path() {
    let transport = RestTransport::new("https://api.trello.com/1/", "k", "t").unwrap();
    let endpoint = Endpoint::children(ResourceKind::Board, "b 1", ResourceKind::List);
    assert_eq!(
      transport.url(&endpoint).unwrap().as_str(),
      "https://api.trello.com/1/boards/b%201/lists"
    );
  }

  #[test]
  fn test_rejects_non_base_url() {
    assert!(RestTransport::new("mailto:someone@example.com", "k", "t").is_err());
    assert!(RestTransport::new("not a url", "k", "t").is_err());
  }
}
