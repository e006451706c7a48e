//! Remote tier: a single JSON document behind an HTTP endpoint.
//!
//! `GET` returns the stored envelope (or a bare snapshot), `404` or a `null`
//! body meaning nothing is stored yet. `POST` replaces it.

use std::time::Duration;

use async_trait::async_trait;
use gf_core::snapshot::{Snapshot, StoredSnapshot};
use reqwest::StatusCode;
use tracing::debug;

use crate::backend::{PersistenceError, SnapshotBackend};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

pub struct RemoteBackend {
    client: reqwest::Client,
    url: String,
}

impl RemoteBackend {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SnapshotBackend for RemoteBackend {
    fn name(&self) -> &str {
        "remote"
    }

    async fn load(&self) -> Result<Option<Snapshot>, PersistenceError> {
        let resp = self
            .client
            .get(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;
        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(PersistenceError::Status(resp.status().as_u16()));
        }
        let value: serde_json::Value = resp.json().await?;
        if value.is_null() {
            return Ok(None);
        }
        Ok(Some(StoredSnapshot::unwrap_value(value)?))
    }

    async fn save(&self, stored: &StoredSnapshot) -> Result<(), PersistenceError> {
        let resp = self
            .client
            .post(&self.url)
            .timeout(REQUEST_TIMEOUT)
            .json(stored)
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(PersistenceError::Status(resp.status().as_u16()));
        }
        debug!(url = %self.url, "snapshot posted");
        Ok(())
    }
}
