//! chart-watch: the dashboard chart without the browser.
//!
//! polls a running relay for two devices, aligns their temperature series
//! and logs every new chart state. usage:
//!
//!     chart-watch [BASE_URL] [PRIMARY_DEVICE] [SECONDARY_DEVICE]

use anyhow::Result;
use sensor_relay::{
    config::Settings,
    poller::{ChartPoller, ChartSelection, ChartState, RestSeriesSource},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let (config, source) = Settings::load_or_default();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    config.log_summary(&source);

    let mut args = std::env::args().skip(1);
    let base_url = args.next().unwrap_or_else(|| config.server.local_url());
    let primary = args.next().unwrap_or_else(|| config.devices.primary.device_id.clone());
    let secondary = args.next().unwrap_or_else(|| config.devices.secondary.device_id.clone());

    let series = RestSeriesSource::new(&base_url, config.auth.bearer_token.clone())?;
    let poller = ChartPoller::new(
        Arc::new(series),
        Duration::from_secs(config.chart.poll_interval_seconds.max(1)),
        config.chart.window,
    );

    let (_selection_tx, selection_rx) = watch::channel(ChartSelection::new(primary, secondary));
    let (state_tx, mut state_rx) = watch::channel(ChartState::Loading);
    let cancel = CancellationToken::new();
    let task = tokio::spawn(poller.run(selection_rx, state_tx, cancel.clone()));

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = state_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                match &*state_rx.borrow_and_update() {
                    ChartState::Loading => {}
                    ChartState::Empty => tracing::info!("no data to chart yet"),
                    ChartState::Ready(points) => {
                        if let Some(last) = points.last() {
                            tracing::info!(
                                points = points.len(),
                                primary = ?last.primary,
                                secondary = ?last.secondary,
                                "chart updated"
                            );
                        }
                    }
                }
            }
        }
    }

    cancel.cancel();
    task.await?;
    Ok(())
}
