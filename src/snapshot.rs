#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Shareable snapshots of rendered programs, for staff review.

use std::{future::Future, time::Duration};

use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Reference recorded when no snapshot could be created.
pub const PLACEHOLDER_LINK: &str = "temp";

/// Time allowed for one snapshot request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A snapshot to publish.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotRequest {
    /// File name shown by the service, e.g. `is_even.py`.
    pub name:       String,
    /// Random link name.
    pub link:       String,
    /// File contents.
    pub contents:   String,
    /// Restrict the link to staff.
    pub staff_only: bool,
}

impl SnapshotRequest {
    /// A staff-only snapshot under a fresh random link.
    pub fn staff(name: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            name:       name.into(),
            link:       uuid::Uuid::new_v4().simple().to_string(),
            contents:   contents.into(),
            staff_only: true,
        }
    }
}

/// Something that turns snapshot contents into a shareable reference.
pub trait SnapshotService: Send + Sync {
    /// Publishes `request`, returning its URL.
    fn create(&self, request: SnapshotRequest) -> impl Future<Output = Result<String>> + Send;
}

/// Publishes `request`, falling back to [`PLACEHOLDER_LINK`] on any failure.
pub async fn create_or_placeholder<S: SnapshotService>(service: &S, request: SnapshotRequest) -> String {
    let name = request.name.clone();
    match service.create(request).await {
        Ok(url) => url,
        Err(err) => {
            tracing::warn!(snapshot = %name, "Could not create snapshot: {err:#}");
            PLACEHOLDER_LINK.to_string()
        }
    }
}

/// A service that never publishes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledSnapshots;

impl SnapshotService for DisabledSnapshots {
    async fn create(&self, _request: SnapshotRequest) -> Result<String> {
        Ok(PLACEHOLDER_LINK.to_string())
    }
}

/// Accepted reply bodies.
#[derive(Deserialize)]
#[serde(untagged)]
enum SnapshotReply {
    /// A bare JSON string.
    Bare(String),
    /// `{"url": ...}`
    Object {
        /// Link to the snapshot.
        url: String,
    },
}

/// Publishes snapshots by POSTing JSON to an HTTP endpoint.
#[derive(Debug, Clone)]
pub struct HttpSnapshotService {
    /// Shared client.
    client:   Client,
    /// Endpoint URL.
    endpoint: String,
}

impl HttpSnapshotService {
    /// Creates a service posting to `endpoint`.
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl SnapshotService for HttpSnapshotService {
    async fn create(&self, request: SnapshotRequest) -> Result<String> {
        let response = self
            .client
            .post(&self.endpoint)
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await
            .with_context(|| format!("Could not reach snapshot service at {}", self.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            bail!("Snapshot service answered {status}");
        }

        let reply: SnapshotReply = response
            .json()
            .await
            .context("Snapshot service sent an unreadable reply")?;
        Ok(match reply {
            SnapshotReply::Bare(url) | SnapshotReply::Object { url } => url,
        })
    }
}

/// Either snapshot backend, chosen from configuration.
#[derive(Debug, Clone)]
pub enum Snapshots {
    /// Publish over HTTP.
    Http(HttpSnapshotService),
    /// Don't publish.
    Disabled(DisabledSnapshots),
}

impl Snapshots {
    /// HTTP snapshots when an endpoint is configured, disabled otherwise.
    pub fn from_endpoint(client: Client, endpoint: Option<&str>) -> Self {
        match endpoint {
            Some(url) => Snapshots::Http(HttpSnapshotService::new(client, url)),
            None => Snapshots::Disabled(DisabledSnapshots),
        }
    }
}

impl SnapshotService for Snapshots {
    async fn create(&self, request: SnapshotRequest) -> Result<String> {
        match self {
            Snapshots::Http(http) => http.create(request).await,
            Snapshots::Disabled(disabled) => disabled.create(request).await,
        }
    }
}
