//! ==============================================================================
//! poller.rs - chart poller (client side of the reconciler)
//! ==============================================================================
//!
//! purpose:
//!     what the dashboard chart does: every few seconds (and right away when
//!     the user picks other devices) pull the recent readings of two devices
//!     over REST, align them with merge_series and publish the result.
//!
//! rules:
//!     - every run fully replaces the published state; nothing is merged
//!       incrementally.
//!     - nothing to draw -> ChartState::Empty, not an error.
//!     - a failed poll is logged and the previous state stays up; the next
//!       tick is the retry.
//!
//! relationships:
//!     - uses: reconcile.rs (merge_series), domain.rs (temperature_series)
//!     - talks to: server/handlers.rs (GET /api/data/{id}/{num}) via RestSeriesSource
//!
//! ==============================================================================

use crate::domain::{temperature_series, AlignedPoint, Reading};
use crate::reconcile::merge_series;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// the two devices drawn on the chart
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChartSelection {
    pub primary: String,
    pub secondary: String,
}

impl ChartSelection {
    pub fn new(primary: impl Into<String>, secondary: impl Into<String>) -> Self {
        Self { primary: primary.into(), secondary: secondary.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "state", content = "points", rename_all = "lowercase")]
pub enum ChartState {
    /// no poll has completed yet
    Loading,
    /// both series were empty
    Empty,
    Ready(Vec<AlignedPoint<f64>>),
}

/// where the poller gets readings from
#[async_trait]
pub trait SeriesSource: Send + Sync {
    /// newest first, like the REST endpoint
    async fn recent(&self, device_id: &str, count: usize) -> anyhow::Result<Vec<Reading>>;
}

// ==============================================================================
// rest source
// ==============================================================================

/// reads `GET {base}/api/data/{id}/{count}`
#[derive(Clone)]
pub struct RestSeriesSource {
    client: reqwest::Client,
    base_url: Url,
    bearer_token: Option<String>,
}

impl RestSeriesSource {
    pub fn new(base_url: &str, bearer_token: Option<String>) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url).with_context(|| format!("invalid relay url {base_url}"))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("relay url {base_url} cannot carry a path");
        }
        Ok(Self { client: reqwest::Client::new(), base_url, bearer_token })
    }

    /// device ids are percent-encoded as single path segments
    fn recent_url(&self, device_id: &str, count: usize) -> Url {
        let count = count.to_string();
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["api", "data", device_id, count.as_str()]);
        }
        url
    }
}

#[async_trait]
impl SeriesSource for RestSeriesSource {
    async fn recent(&self, device_id: &str, count: usize) -> anyhow::Result<Vec<Reading>> {
        let mut request = self.client.get(self.recent_url(device_id, count));
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }
        let readings = request
            .send()
            .await?
            .error_for_status()?
            .json::<Vec<Reading>>()
            .await?;
        Ok(readings)
    }
}

// ==============================================================================
// poller
// ==============================================================================

pub struct ChartPoller {
    source: Arc<dyn SeriesSource>,
    interval: Duration,
    window: usize,
}

impl ChartPoller {
    pub fn new(source: Arc<dyn SeriesSource>, interval: Duration, window: usize) -> Self {
        Self { source, interval, window }
    }

    /// one poll + merge for the given selection
    pub async fn refresh(&self, selection: &ChartSelection) -> anyhow::Result<ChartState> {
        let primary = self.source.recent(&selection.primary, self.window).await?;
        let secondary = self.source.recent(&selection.secondary, self.window).await?;

        let state = match merge_series(&temperature_series(&primary), &temperature_series(&secondary)) {
            Ok(points) => ChartState::Ready(points),
            Err(_) => ChartState::Empty,
        };
        Ok(state)
    }

    /// poll until cancelled or until the selection sender is gone
    pub async fn run(
        self,
        mut selection: watch::Receiver<ChartSelection>,
        output: watch::Sender<ChartState>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                changed = selection.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    // a fresh selection restarts the period
                    ticker.reset();
                }
                _ = ticker.tick() => {}
            }

            let current = selection.borrow_and_update().clone();
            // a stalled source must not outlive cancellation
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                result = self.refresh(&current) => result,
            };
            match result {
                Ok(state) => {
                    output.send_replace(state);
                }
                Err(e) => tracing::warn!(
                    primary = %current.primary,
                    secondary = %current.secondary,
                    error = %e,
                    "chart poll failed"
                ),
            }
        }
        tracing::debug!("chart poller stopped");
    }
}
