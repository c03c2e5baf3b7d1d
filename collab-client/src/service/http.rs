//! reqwest-backed pairing service.

use async_trait::async_trait;
use collab_core::pairing::{await_path, hello_path, join_url};
use collab_types::{HelloResponse, RawPairing, UserId, WireError};

use super::{PairingService, ServiceError};
use crate::config::ClientConfig;

/// Pairing service over HTTP(S).
///
/// No request timeout is set: the await call is a long poll and only
/// cancellation ends it early.
#[derive(Debug, Clone)]
pub struct HttpPairingService {
    client: reqwest::Client,
    base: String,
}

impl HttpPairingService {
    /// Create a service for the given base URL.
    pub fn new(base: &str) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| ServiceError::Request {
                path: base.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            client,
            base: base.to_string(),
        })
    }

    /// Create a service for the configured HTTP base.
    pub fn from_config(config: &ClientConfig) -> Result<Self, ServiceError> {
        Self::new(&config.server.http_base)
    }

    /// Absolute URL of a route.
    pub fn url(&self, path: &str) -> String {
        join_url(&self.base, path)
    }

    async fn get_text(&self, path: &str) -> Result<String, ServiceError> {
        tracing::debug!(path, "pairing request");

        let request_failed = |e: reqwest::Error| ServiceError::Request {
            path: path.to_string(),
            reason: e.to_string(),
        };

        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(request_failed)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(request_failed)
    }
}

#[async_trait]
impl PairingService for HttpPairingService {
    async fn hello(&self, version: &str) -> Result<HelloResponse, ServiceError> {
        let body = self.get_text(&hello_path(version)).await?;
        Ok(HelloResponse::from_json(&body)?)
    }

    async fn await_collaboration(&self, user: &UserId) -> Result<RawPairing, ServiceError> {
        let body = self.get_text(&await_path(user)).await?;
        let raw = serde_json::from_str(&body).map_err(WireError::Malformed)?;
        Ok(raw)
    }

    async fn fetch_script(&self, path: &str) -> Result<String, ServiceError> {
        self.get_text(path).await
    }
}
