//! Network fetch primitive.

use color_eyre::{eyre::eyre, Result};
use std::collections::BTreeMap;
use url::Url;

use crate::http::{Request, Response};

/// Network access used by the worker.
///
/// `Err` means a network-layer failure (offline, DNS, transport timeout).
/// HTTP error statuses are not failures; they come back as `Ok` responses
/// and are passed through to the caller.
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// HTTP fetcher that resolves root-relative paths against a fixed origin.
pub struct HttpFetcher {
  client: reqwest::Client,
  origin: Url,
}

impl HttpFetcher {
  pub fn new(origin: &str) -> Result<Self> {
    let origin =
      Url::parse(origin).map_err(|e| eyre!("Invalid origin URL {}: {}", origin, e))?;

    Ok(Self {
      client: reqwest::Client::new(),
      origin,
    })
  }
}

impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<Response> {
    let url = self
      .origin
      .join(&request.path)
      .map_err(|e| eyre!("Invalid request path {}: {}", request.path, e))?;

    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid request method {}: {}", request.method, e))?;

    let response = self
      .client
      .request(method, url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Request to {} failed: {}", url, e))?;

    let status = response.status();
    let mut headers = BTreeMap::new();
    for (name, value) in response.headers() {
      if let Ok(value) = value.to_str() {
        headers.insert(name.to_string(), value.to_string());
      }
    }

    // A transport failure while streaming the body counts as a network
    // failure, same as a failed connect.
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body from {}: {}", url, e))?
      .to_vec();

    Ok(Response {
      status: status.as_u16(),
      status_text: status.canonical_reason().unwrap_or("").to_string(),
      headers,
      body,
    })
  }
}
