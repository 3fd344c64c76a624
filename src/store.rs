//! ==============================================================================
//! store.rs - reading store
//! ==============================================================================
//!
//! purpose:
//!     append-only persistence of validated readings, keyed by device.
//!     the ReadingStore trait is the seam a real database would plug into;
//!     MemoryStore is the engine shipped with the relay.
//!
//! semantics:
//!     - append is the only way in; stored readings are never edited.
//!     - the store stamps createdAt when the reading carries none.
//!     - readings expire after the retention window (ttl index semantics):
//!       expired entries are invisible to every read and dropped by purge_expired.
//!     - reads come back newest first, in arrival order per device.
//!
//! concurrency:
//!     MemoryStore shards by device id (dashmap), so appends for different
//!     devices land on different locks; appends for one device serialize on
//!     that device's shard in arrival order.
//!
//! ==============================================================================

use crate::clock::Clock;
use crate::domain::Reading;
use crate::error::StoreError;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// persist one reading, returning it as stored
    async fn append(&self, reading: Reading) -> Result<Reading, StoreError>;

    /// most recent reading of every device that has any
    async fn latest_per_device(&self) -> Result<BTreeMap<String, Reading>, StoreError>;

    /// the `count` most recent readings of a device, newest first
    async fn recent(&self, device_id: &str, count: usize) -> Result<Vec<Reading>, StoreError>;

    /// every live reading of a device, newest first
    async fn all_for_device(&self, device_id: &str) -> Result<Vec<Reading>, StoreError>;

    /// drop a device's readings; returns how many went away
    async fn delete_device(&self, device_id: &str) -> Result<usize, StoreError>;

    async fn delete_all(&self) -> Result<usize, StoreError>;

    /// number of live readings across all devices
    async fn len(&self) -> Result<usize, StoreError>;

    /// physically remove expired readings
    async fn purge_expired(&self) -> Result<usize, StoreError>;
}

/// in-memory engine with ttl semantics
pub struct MemoryStore {
    devices: DashMap<String, Vec<Reading>>,
    retention: Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    pub fn new(retention: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            devices: DashMap::new(),
            retention,
            clock,
        }
    }

    fn cutoff(&self) -> DateTime<Utc> {
        self.clock.now() - self.retention
    }

    fn newest_first(&self, device_id: &str, limit: Option<usize>) -> Vec<Reading> {
        let cutoff = self.cutoff();
        let Some(series) = self.devices.get(device_id) else {
            return Vec::new();
        };
        series
            .iter()
            .rev()
            .filter(|r| is_live(r, cutoff))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }
}

fn is_live(reading: &Reading, cutoff: DateTime<Utc>) -> bool {
    reading.created_at.map_or(true, |at| at > cutoff)
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn append(&self, mut reading: Reading) -> Result<Reading, StoreError> {
        reading.created_at.get_or_insert_with(|| self.clock.now());
        self.devices
            .entry(reading.device_id.clone())
            .or_default()
            .push(reading.clone());
        Ok(reading)
    }

    async fn latest_per_device(&self) -> Result<BTreeMap<String, Reading>, StoreError> {
        let cutoff = self.cutoff();
        let latest = self
            .devices
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .iter()
                    .rev()
                    .find(|r| is_live(r, cutoff))
                    .map(|r| (entry.key().clone(), r.clone()))
            })
            .collect();
        Ok(latest)
    }

    async fn recent(&self, device_id: &str, count: usize) -> Result<Vec<Reading>, StoreError> {
        Ok(self.newest_first(device_id, Some(count)))
    }

    async fn all_for_device(&self, device_id: &str) -> Result<Vec<Reading>, StoreError> {
        Ok(self.newest_first(device_id, None))
    }

    async fn delete_device(&self, device_id: &str) -> Result<usize, StoreError> {
        Ok(self
            .devices
            .remove(device_id)
            .map_or(0, |(_, series)| series.len()))
    }

    async fn delete_all(&self) -> Result<usize, StoreError> {
        let removed: usize = self.devices.iter().map(|entry| entry.value().len()).sum();
        self.devices.clear();
        Ok(removed)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let cutoff = self.cutoff();
        Ok(self
            .devices
            .iter()
            .map(|entry| entry.value().iter().filter(|r| is_live(r, cutoff)).count())
            .sum())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let cutoff = self.cutoff();
        let mut removed = 0;
        for mut entry in self.devices.iter_mut() {
            let before = entry.len();
            entry.retain(|r| is_live(r, cutoff));
            removed += before - entry.len();
        }
        self.devices.retain(|_, series| !series.is_empty());
        Ok(removed)
    }
}
