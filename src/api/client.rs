use crate::config::ApiConfig;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use url::Url;

use super::error::FetchError;

/// Something that can GET a JSON document for a site-relative URL.
///
/// The caches only depend on this trait, so tests can count and script
/// requests without a server.
pub trait Fetch: Send + Sync {
  fn get_json(&self, url: &str) -> impl Future<Output = Result<Value, FetchError>> + Send;
}

/// Statistics API client
#[derive(Clone)]
pub struct ApiClient {
  http: reqwest::Client,
  base_url: Url,
}

impl ApiClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    let base_url = Url::parse(&config.base_url)
      .map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;

    let mut builder = reqwest::Client::builder().user_agent(concat!(
      env!("CARGO_PKG_NAME"),
      "/",
      env!("CARGO_PKG_VERSION")
    ));
    if let Some(secs) = config.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }

    let http = builder
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base_url })
  }

  pub fn base_url(&self) -> &str {
    self.base_url.as_str()
  }

  fn resolve(&self, url: &str) -> Result<Url, FetchError> {
    self
      .base_url
      .join(url)
      .map_err(|e| FetchError::Network(format!("invalid request URL {}: {}", url, e)))
  }
}

impl Fetch for ApiClient {
  async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
    let target = self.resolve(url)?;
    tracing::debug!(%target, "GET");

    let response = self.http.get(target).send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
      tracing::warn!(url, %status, "request failed");
      return Err(FetchError::from_status(status, &body));
    }

    Ok(serde_json::from_str(&body)?)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(base: &str) -> ApiClient {
    ApiClient::new(&ApiConfig {
      base_url: base.to_string(),
      timeout_secs: Some(5),
    })
    .unwrap()
  }

  #[test]
  fn test_resolve_relative_paths() {
    let api = client("http://localhost:3000");
    assert_eq!(
      api.resolve("/api/sel/stats?season=2024").unwrap().as_str(),
      "http://localhost:3000/api/sel/stats?season=2024"
    );
  }

  #[test]
  fn test_invalid_base_url_is_rejected() {
    let result = ApiClient::new(&ApiConfig {
      base_url: "not a url".to_string(),
      timeout_secs: None,
    });
    assert!(result.is_err());
  }
}
