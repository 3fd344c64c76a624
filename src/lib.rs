//! sensor relay: polls remote temperature/humidity sensors, keeps a short
//! history of readings and relays them live to dashboard clients.
//!
//! write path: fetcher -> validate -> store (REST calls and live sessions)
//! read path:  store -> REST -> chart poller -> reconcile
//! live path:  fetcher -> websocket, one session per connection

pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetcher;
pub mod poller;
pub mod reconcile;
pub mod relay;
pub mod server;
pub mod store;
pub mod validate;

pub use domain::{AlignedPoint, DeviceSchema, HumidityPolicy, Reading, SeriesPoint};
pub use error::{FetchError, NoDataError, StoreError, ValidationError};
pub use reconcile::merge_series;
pub use validate::validate;
