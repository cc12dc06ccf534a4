//! HTTP client for the remote run store.

pub mod types;

use motion_config::StoreConfig;
use motion_imu::FrameRecord;
use reqwest::{Client, Method, Response, StatusCode};
use std::time::Duration;
use thiserror::Error;
pub use types::{FrameData, RunDetails, RunId, RunSummary, SaveRunResponse};
use types::SaveRunRequest;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Run store request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{method} {url} failed: {status} {body}")]
    Status {
        method: Method,
        url: String,
        status: StatusCode,
        body: String,
    },
}

/// Client for the `/api/runs` endpoints.
#[derive(Debug, Clone)]
pub struct RunStore {
    client: Client,
    base_url: String,
}

impl RunStore {
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Store a recording under `name`.
    pub async fn save(
        &self,
        name: &str,
        frames: &[FrameRecord],
    ) -> Result<SaveRunResponse, StoreError> {
        let url = self.url("/api/runs");
        let request = SaveRunRequest {
            name,
            frames: frames.iter().map(FrameData::from).collect(),
        };
        let resp = self.client.post(&url).json(&request).send().await?;
        let saved: SaveRunResponse = check(Method::POST, url, resp).await?.json().await?;
        tracing::info!(id = saved.id, name = %saved.name, frames = saved.frame_count, "Run saved");
        Ok(saved)
    }

    /// List stored runs, optionally filtered by name.
    pub async fn list(&self, search: Option<&str>) -> Result<Vec<RunSummary>, StoreError> {
        let url = self.url("/api/runs");
        let mut req = self.client.get(&url);
        if let Some(search) = search.filter(|s| !s.is_empty()) {
            req = req.query(&[("search", search)]);
        }
        let runs: Vec<RunSummary> = check(Method::GET, url, req.send().await?).await?.json().await?;
        tracing::debug!(count = runs.len(), ?search, "Runs listed");
        Ok(runs)
    }

    /// Fetch one run with its frames.
    pub async fn get(&self, id: RunId) -> Result<RunDetails, StoreError> {
        let url = self.url(&format!("/api/runs/{id}"));
        let resp = self.client.get(&url).send().await?;
        let run: RunDetails = check(Method::GET, url, resp).await?.json().await?;
        tracing::info!(id, frames = run.frames.len(), "Run fetched");
        Ok(run)
    }

    pub async fn delete(&self, id: RunId) -> Result<(), StoreError> {
        let url = self.url(&format!("/api/runs/{id}"));
        let resp = self.client.delete(&url).send().await?;
        check(Method::DELETE, url, resp).await?;
        tracing::info!(id, "Run deleted");
        Ok(())
    }
}

async fn check(method: Method, url: String, resp: Response) -> Result<Response, StoreError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(StoreError::Status {
        method,
        url,
        status,
        body,
    })
}
