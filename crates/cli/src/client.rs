//! HTTP client for a running agent's API

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

/// Client for the agent's health endpoints
pub struct AgentClient {
    client: Client,
    base_url: Url,
}

impl AgentClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = Url::parse(base_url).context("Invalid agent URL")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET `path` and decode the JSON body.
    ///
    /// Health endpoints answer 503 with a body, so the status is returned
    /// alongside rather than treated as an error.
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<(StatusCode, T)> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("Failed to reach agent at {}", url))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            anyhow::bail!("Agent API error ({}): {} not found", status, url);
        }

        let body = response
            .json()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))?;
        Ok((status, body))
    }
}
