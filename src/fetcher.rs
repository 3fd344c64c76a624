//! ==============================================================================
//! fetcher.rs - remote sensor fetcher
//! ==============================================================================
//!
//! purpose:
//!     pulls the current reading from the two configured sensor endpoints.
//!     one GET per call, zero retries. whoever calls decides what a failure
//!     means (the relay loop logs and waits for its next tick, the REST
//!     handler answers 502).
//!
//! relationships:
//!     - used by: relay.rs (every tick), server/handlers.rs (fetch-and-save)
//!     - reads: config.rs (DeviceEndpoint, FetchConfig)
//!
//! ==============================================================================

use crate::config::{DeviceEndpoint, FetchConfig};
use crate::error::FetchError;

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// raw JSON body as returned by a sensor endpoint
pub type RawPayload = Value;

/// anything that can read one endpoint
#[async_trait]
pub trait SensorFetcher: Send + Sync {
    async fn fetch(&self, endpoint: &DeviceEndpoint) -> Result<RawPayload, FetchError>;
}

// ==============================================================================
// http implementation
// ==============================================================================

#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    bearer_token: Option<String>,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> anyhow::Result<Self> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            bearer_token: config.bearer_token.clone(),
        })
    }
}

#[async_trait]
impl SensorFetcher for HttpFetcher {
    async fn fetch(&self, endpoint: &DeviceEndpoint) -> Result<RawPayload, FetchError> {
        let mut request = self.client.get(&endpoint.url);
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|source| FetchError::Transport {
            url: endpoint.url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: endpoint.url.clone(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(|source| FetchError::Transport {
            url: endpoint.url.clone(),
            source,
        })?;

        serde_json::from_slice(&body).map_err(|e| FetchError::Decode {
            url: endpoint.url.clone(),
            reason: e.to_string(),
        })
    }
}

// ==============================================================================
// the two fixed endpoints
// ==============================================================================

/// which of the two configured sensors
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceRole {
    Primary,
    Secondary,
}

/// Clone-able handle pairing a fetcher with the two endpoints it reads
#[derive(Clone)]
pub struct RemoteSensors {
    fetcher: Arc<dyn SensorFetcher>,
    primary: DeviceEndpoint,
    secondary: DeviceEndpoint,
}

impl RemoteSensors {
    pub fn new(
        fetcher: Arc<dyn SensorFetcher>,
        primary: DeviceEndpoint,
        secondary: DeviceEndpoint,
    ) -> Self {
        Self { fetcher, primary, secondary }
    }

    pub fn endpoint(&self, role: DeviceRole) -> &DeviceEndpoint {
        match role {
            DeviceRole::Primary => &self.primary,
            DeviceRole::Secondary => &self.secondary,
        }
    }

    pub async fn fetch(&self, role: DeviceRole) -> Result<RawPayload, FetchError> {
        self.fetcher.fetch(self.endpoint(role)).await
    }

    pub async fn fetch_primary(&self) -> Result<RawPayload, FetchError> {
        self.fetch(DeviceRole::Primary).await
    }

    pub async fn fetch_secondary(&self) -> Result<RawPayload, FetchError> {
        self.fetch(DeviceRole::Secondary).await
    }
}
