//! ==============================================================================
//! relay.rs - live relay sessions
//! ==============================================================================
//!
//! purpose:
//!     every real-time client gets its own polling loop. while the client is
//!     connected the loop fetches both sensors every tick, pushes each raw
//!     payload to the client as a named event, and writes the validated
//!     reading to the store on the side.
//!
//! lifecycle (per connection):
//!
//! ```text
//!     ┌──────┐  start()   ┌────────┐  close() / drop / disconnect  ┌────────┐
//!     │ Idle │ ─────────> │ Active │ ────────────────────────────> │ Closed │
//!     └──────┘            └────────┘                               └────────┘
//!                          one task, one interval, one cancellation token
//! ```
//!
//! failure policy:
//!     a failed fetch is logged and that push is skipped. a rejected payload
//!     or store error is logged. nothing ends the loop except cancellation.
//!     timers are per session and not coordinated, so outbound fetch volume
//!     grows with the number of connected clients.
//!
//! relationships:
//!     - uses: fetcher.rs (RemoteSensors), validate.rs, store.rs
//!     - used by: server/websocket.rs (one session per socket)
//!
//! ==============================================================================

use crate::config::DeviceEndpoint;
use crate::fetcher::{DeviceRole, RawPayload, RemoteSensors};
use crate::store::ReadingStore;
use crate::validate::validate;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// one named push to a client
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RelayMessage {
    pub event: String,
    pub data: RawPayload,
}

/// the client went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// where a session delivers its pushes
#[async_trait]
pub trait PushSink: Send + Sync + 'static {
    async fn push(&self, message: RelayMessage) -> Result<(), SinkClosed>;
}

/// the websocket writer task sits on the other end of this channel
#[async_trait]
impl PushSink for mpsc::Sender<RelayMessage> {
    async fn push(&self, message: RelayMessage) -> Result<(), SinkClosed> {
        self.send(message).await.map_err(|_| SinkClosed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Active,
    Closed,
}

// ==============================================================================
// hub
// ==============================================================================

/// Clone-able factory for live sessions; shares fetcher, store and the
/// count of running session loops
#[derive(Clone)]
pub struct LiveRelay {
    sensors: RemoteSensors,
    store: Arc<dyn ReadingStore>,
    interval: Duration,
    show_sensor_data: bool,
    running: Arc<AtomicUsize>,
}

impl LiveRelay {
    pub fn new(sensors: RemoteSensors, store: Arc<dyn ReadingStore>, interval: Duration) -> Self {
        Self {
            sensors,
            store,
            interval,
            show_sensor_data: false,
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// log every relayed reading at info
    pub fn with_sensor_logging(mut self, enabled: bool) -> Self {
        self.show_sensor_data = enabled;
        self
    }

    /// a new session for one connection, not yet ticking
    pub fn session<S: PushSink>(&self, sink: S) -> LiveSession<S> {
        LiveSession {
            relay: self.clone(),
            sink: Some(sink),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// number of session loops currently alive
    pub fn active_sessions(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// one tick: both endpoints, in order
    async fn tick<S: PushSink>(&self, sink: &S, cancel: &CancellationToken) {
        for role in [DeviceRole::Primary, DeviceRole::Secondary] {
            let endpoint = self.sensors.endpoint(role);
            let payload = match self.sensors.fetch(role).await {
                Ok(payload) => payload,
                Err(e) => {
                    tracing::warn!(device = %endpoint.label, error = %e, "fetch failed, skipping push");
                    continue;
                }
            };

            if cancel.is_cancelled() {
                return;
            }
            let message = RelayMessage { event: endpoint.event.clone(), data: payload.clone() };
            if sink.push(message).await.is_err() {
                tracing::debug!(device = %endpoint.label, "client gone, push dropped");
            }

            self.persist(endpoint, &payload).await;
        }
    }

    async fn persist(&self, endpoint: &DeviceEndpoint, payload: &RawPayload) {
        let reading = match validate(payload, &endpoint.schema()) {
            Ok(reading) => reading,
            Err(e) => {
                tracing::warn!(device = %endpoint.label, error = %e, "relayed payload rejected");
                return;
            }
        };

        match self.store.append(reading).await {
            Ok(stored) if self.show_sensor_data => tracing::info!(
                device = %endpoint.label,
                temperature = stored.temperature,
                humidity = ?stored.humidity,
                "reading relayed"
            ),
            Ok(_) => {}
            Err(e) => tracing::error!(device = %endpoint.label, error = %e, "failed to store reading"),
        }
    }
}

// ==============================================================================
// session
// ==============================================================================

/// one connection's polling loop
///
/// dropping an active session cancels it, so a session can never outlive
/// the connection handler that owns it.
pub struct LiveSession<S: PushSink> {
    relay: LiveRelay,
    sink: Option<S>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// keeps the running-session count honest however the loop exits
struct RunningGuard(Arc<AtomicUsize>);

impl RunningGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter.clone())
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl<S: PushSink> LiveSession<S> {
    pub fn state(&self) -> SessionState {
        match (&self.task, self.cancel.is_cancelled()) {
            (_, true) => SessionState::Closed,
            (None, false) => SessionState::Idle,
            (Some(_), false) => SessionState::Active,
        }
    }

    /// Idle -> Active. spawns the loop; a second call is a no-op
    pub fn start(&mut self) {
        if self.state() != SessionState::Idle {
            return;
        }
        let Some(sink) = self.sink.take() else {
            return;
        };

        let relay = self.relay.clone();
        let cancel = self.cancel.clone();
        // the guard is taken before spawning so the count is visible at once
        let guard = RunningGuard::enter(&relay.running);
        let period = relay.interval;
        let first_tick = Instant::now() + period;

        self.task = Some(tokio::spawn(async move {
            let _guard = guard;
            let mut ticker = interval_at(first_tick, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = relay.tick(&sink, &cancel) => {}
                }
            }
            tracing::debug!("live session loop stopped");
        }));
    }

    /// Active -> Closed (Idle -> Closed works too). no tick fires afterwards
    pub fn close(&mut self) {
        self.cancel.cancel();
    }

    /// close and wait for the loop to wind down
    pub async fn shutdown(mut self) {
        self.close();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl<S: PushSink> Drop for LiveSession<S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
