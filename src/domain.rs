use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// one validated sensor sample
///
/// serialized with the field names the dashboard expects:
/// `{"temperature": 21.5, "humidity": 40.0, "deviceId": "kitchen", "createdAt": "..."}`
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reading {
    /// temperature in celsius
    pub temperature: f64,

    /// relative humidity (0-100%), only for devices that report it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,

    /// device identifier (e.g. "kitchen", "living-room", "3")
    pub device_id: String,

    /// assigned by the store on append when the payload carries none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Reading {
    pub fn new(device_id: impl Into<String>, temperature: f64, humidity: Option<f64>) -> Self {
        Self {
            temperature,
            humidity,
            device_id: device_id.into(),
            created_at: None,
        }
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }
}

/// what the validator demands of the humidity field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HumidityPolicy {
    /// the device reports humidity; it must be present
    Required,
    /// temperature-only device; humidity must be absent
    Forbidden,
    /// unknown device; accepted either way
    Optional,
}

/// expected shape of one device's payloads
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceSchema {
    /// when set, the payload's deviceId must match it (and defaults to it)
    pub device_id: Option<String>,
    pub humidity: HumidityPolicy,
}

impl DeviceSchema {
    pub fn for_device(device_id: impl Into<String>, reports_humidity: bool) -> Self {
        Self {
            device_id: Some(device_id.into()),
            humidity: if reports_humidity {
                HumidityPolicy::Required
            } else {
                HumidityPolicy::Forbidden
            },
        }
    }

    /// schema for a device nobody configured: any humidity, device id from the route
    pub fn ad_hoc(device_id: impl Into<String>) -> Self {
        Self {
            device_id: Some(device_id.into()),
            humidity: HumidityPolicy::Optional,
        }
    }
}

/// one point of a chart series; timestamp in unix milliseconds
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint<T> {
    pub timestamp: i64,
    pub value: T,
}

impl<T> SeriesPoint<T> {
    pub fn new(timestamp: i64, value: T) -> Self {
        Self { timestamp, value }
    }
}

/// one row of two series aligned onto a shared time axis
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlignedPoint<T> {
    pub timestamp: i64,
    pub primary: Option<T>,
    pub secondary: Option<T>,
}

/// turns newest-first store output into an ascending temperature series
pub fn temperature_series(readings: &[Reading]) -> Vec<SeriesPoint<f64>> {
    let mut points: Vec<SeriesPoint<f64>> = readings
        .iter()
        .filter_map(|r| {
            r.created_at
                .map(|at| SeriesPoint::new(at.timestamp_millis(), r.temperature))
        })
        .collect();
    // stable: equal timestamps keep arrival order
    points.sort_by_key(|p| p.timestamp);
    points
}
