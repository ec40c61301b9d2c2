use crate::config::Config;
use crate::items::types::{Item, ItemId, ItemPatch};
use color_eyre::{eyre::eyre, Result};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Longest slice of an error body quoted back in error messages
const ERROR_BODY_EXCERPT: usize = 200;

/// Items REST API client
#[derive(Clone)]
pub struct ItemsClient {
  http: reqwest::Client,
  base_url: Url,
}

impl ItemsClient {
  pub fn new(config: &Config) -> Result<Self> {
    let base_url = Url::parse(&config.api.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.api.base_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  fn endpoint(&self, path: &str) -> Result<Url> {
    self
      .base_url
      .join(path)
      .map_err(|e| eyre!("Failed to build URL for {}: {}", path, e))
  }

  /// Fetch the whole item list
  pub async fn list_items(&self) -> Result<Vec<Item>> {
    let url = self.endpoint("/api/items")?;
    debug!(%url, "GET item list");

    let response = self
      .http
      .get(url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach {}: {}", url, e))?;

    decode(check_status(response, "load items").await?, "item list").await
  }

  /// Send a partial update for one item, returning the server's version of it
  pub async fn update_item(&self, id: ItemId, patch: &ItemPatch) -> Result<Item> {
    let url = self.endpoint(&format!("/api/items/{}", id))?;
    debug!(%url, id, "PUT item update");

    let response = self
      .http
      .put(url.clone())
      .json(patch)
      .send()
      .await
      .map_err(|e| eyre!("Failed to reach {}: {}", url, e))?;

    let action = format!("update item {}", id);
    decode(check_status(response, &action).await?, "updated item").await
  }
}

/// Turn a non-success status into an error quoting the start of the body
async fn check_status(response: Response, action: &str) -> Result<Response> {
  let status = response.status();
  if status.is_success() {
    return Ok(response);
  }

  let body = response.text().await.unwrap_or_default();
  Err(eyre!(
    "Server refused to {}: {}{}",
    action,
    describe_status(status),
    excerpt(&body)
  ))
}

async fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T> {
  let bytes = response
    .bytes()
    .await
    .map_err(|e| eyre!("Failed to read {} response: {}", what, e))?;

  serde_json::from_slice(&bytes).map_err(|e| eyre!("Failed to parse {}: {}", what, e))
}

fn describe_status(status: StatusCode) -> String {
  match status.canonical_reason() {
    Some(reason) => format!("HTTP {} {}", status.as_u16(), reason),
    None => format!("HTTP {}", status.as_u16()),
  }
}

fn excerpt(body: &str) -> String {
  let body = body.trim();
  if body.is_empty() {
    return String::new();
  }
  let cut: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
  if cut.len() < body.len() {
    format!(" ({}...)", cut)
  } else {
    format!(" ({})", cut)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::ApiConfig;
  use serde_json::json;
  use wiremock::matchers::{body_json, header, method, path};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  fn client_for(server: &MockServer) -> ItemsClient {
    let config = Config {
      api: ApiConfig {
        base_url: server.uri(),
        timeout_secs: 5,
      },
      ..Config::default()
    };
    ItemsClient::new(&config).unwrap()
  }

  #[tokio::test]
  async fn test_list_items() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/items"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        {"id": 1, "name": "A"},
        {"id": 2, "name": "B"}
      ])))
      .mount(&server)
      .await;

    let items = client_for(&server).list_items().await.unwrap();
    assert_eq!(items, vec![Item::new(1, "A"), Item::new(2, "B")]);
  }

  #[tokio::test]
  async fn test_list_and_update_negative_ids() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/items"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([
        {"id": -1, "name": "A"},
        {"id": 0, "name": "Zero"},
        {"id": 2, "name": "B"}
      ])))
      .mount(&server)
      .await;
    Mock::given(method("PUT"))
      .and(path("/api/items/-1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": -1, "name": "X"})))
      .expect(1)
      .mount(&server)
      .await;

    let client = client_for(&server);
    let items = client.list_items().await.unwrap();
    let ids: Vec<ItemId> = items.iter().map(|i| i.id).collect();
    assert_eq!(ids, vec![-1, 0, 2]);

    let updated = client
      .update_item(-1, &ItemPatch::rename("X"))
      .await
      .unwrap();
    assert_eq!(updated, Item::new(-1, "X"));
  }

  #[tokio::test]
  async fn test_list_items_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/items"))
      .respond_with(ResponseTemplate::new(503).set_body_string("down for maintenance"))
      .mount(&server)
      .await;

    let err = client_for(&server).list_items().await.unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("HTTP 503"), "{}", msg);
    assert!(msg.contains("down for maintenance"), "{}", msg);
  }

  #[tokio::test]
  async fn test_list_items_malformed_body() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path("/api/items"))
      .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
      .mount(&server)
      .await;

    let err = client_for(&server).list_items().await.unwrap_err();
    assert!(err.to_string().contains("Failed to parse item list"));
  }

  #[tokio::test]
  async fn test_update_item_sends_patch() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
      .and(path("/api/items/7"))
      .and(header("content-type", "application/json"))
      .and(body_json(json!({"name": "Renamed"})))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": 7, "name": "Renamed"})))
      .expect(1)
      .mount(&server)
      .await;

    let item = client_for(&server)
      .update_item(7, &ItemPatch::rename("Renamed"))
      .await
      .unwrap();
    assert_eq!(item, Item::new(7, "Renamed"));
  }

  #[tokio::test]
  async fn test_update_item_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
      .and(path("/api/items/7"))
      .respond_with(ResponseTemplate::new(404))
      .mount(&server)
      .await;

    let err = client_for(&server)
      .update_item(7, &ItemPatch::rename("Renamed"))
      .await
      .unwrap_err();
    assert_eq!(
      err.to_string(),
      "Server refused to update item 7: HTTP 404 Not Found"
    );
  }

  #[test]
  fn test_excerpt_truncates_long_bodies() {
    let body = "x".repeat(ERROR_BODY_EXCERPT + 10);
    let out = excerpt(&body);
    assert!(out.ends_with("...)"));
    assert_eq!(excerpt("  "), "");
  }
}
