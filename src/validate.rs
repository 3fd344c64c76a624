//! ==============================================================================
//! validate.rs - ingest validator
//! ==============================================================================
//!
//! purpose:
//!     turns an untrusted JSON payload into a Reading, or rejects it whole.
//!     nothing reaches the store without passing through here.
//!
//! accepted shapes:
//!     - reading object:   {"temperature": 21.5, "humidity": 40, "deviceId": "kitchen"}
//!     - array of those:   every element must validate, the first one is returned
//!     - sensor pairs:     {"air": [{"id": 1, "value": 21.5}, ...], "deviceId": 3}
//!                         slot 0 temperature, slot 1 pressure (dropped), slot 2 humidity
//!
//! relationships:
//!     - used by: relay.rs, server/handlers.rs
//!     - reads: domain.rs (DeviceSchema, HumidityPolicy)
//!
//! ==============================================================================

use crate::domain::{DeviceSchema, HumidityPolicy, Reading};
use crate::error::ValidationError;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::HashSet;

const TEMPERATURE_SLOT: usize = 0;
const HUMIDITY_SLOT: usize = 2;

/// validate a raw payload against a device schema
pub fn validate(raw: &Value, schema: &DeviceSchema) -> Result<Reading, ValidationError> {
    match raw {
        Value::Array(items) => validate_batch(items, schema),
        Value::Object(fields) if fields.contains_key("air") => validate_pairs(fields, schema),
        Value::Object(fields) => validate_object(fields, schema),
        other => Err(ValidationError::new(format!(
            "expected an object or an array, got {}",
            kind(other)
        ))),
    }
}

fn validate_batch(items: &[Value], schema: &DeviceSchema) -> Result<Reading, ValidationError> {
    let mut first = None;
    for (index, item) in items.iter().enumerate() {
        let fields = item.as_object().ok_or_else(|| {
            ValidationError::new(format!("item {index}: expected an object, got {}", kind(item)))
        })?;
        let reading = validate_object(fields, schema)
            .map_err(|e| ValidationError::new(format!("item {index}: {}", e.cause)))?;
        first.get_or_insert(reading);
    }
    first.ok_or_else(|| ValidationError::new("payload array is empty"))
}

fn validate_object(fields: &Map<String, Value>, schema: &DeviceSchema) -> Result<Reading, ValidationError> {
    let temperature = match fields.get("temperature") {
        Some(value) => number(value, "temperature")?,
        None => return Err(ValidationError::new("temperature is required")),
    };
    let humidity = humidity(fields.get("humidity"), schema.humidity)?;
    let device_id = device_id(fields.get("deviceId"), schema)?;
    let created_at = match fields.get("createdAt") {
        None | Some(Value::Null) => None,
        Some(value) => Some(timestamp(value)?),
    };

    Ok(Reading { temperature, humidity, device_id, created_at })
}

fn validate_pairs(fields: &Map<String, Value>, schema: &DeviceSchema) -> Result<Reading, ValidationError> {
    let air = fields
        .get("air")
        .and_then(Value::as_array)
        .ok_or_else(|| ValidationError::new("air must be an array"))?;

    let mut ids = HashSet::new();
    let mut values = Vec::with_capacity(air.len());
    for (index, item) in air.iter().enumerate() {
        let pair = item
            .as_object()
            .ok_or_else(|| ValidationError::new(format!("air[{index}] must be an object")))?;

        let id = pair
            .get("id")
            .and_then(Value::as_u64)
            .filter(|id| *id > 0)
            .ok_or_else(|| ValidationError::new(format!("air[{index}].id must be a positive integer")))?;
        if !ids.insert(id) {
            return Err(ValidationError::new(format!("air[{index}] duplicates id {id}")));
        }

        let value = pair
            .get("value")
            .ok_or_else(|| ValidationError::new(format!("air[{index}].value is required")))?;
        values.push(number(value, &format!("air[{index}].value"))?);
    }

    let temperature = *values
        .get(TEMPERATURE_SLOT)
        .ok_or_else(|| ValidationError::new("temperature is required"))?;
    let humidity = match (values.get(HUMIDITY_SLOT), schema.humidity) {
        (Some(_), HumidityPolicy::Forbidden) => {
            return Err(ValidationError::new("humidity is not reported by this device"))
        }
        (None, HumidityPolicy::Required) => return Err(ValidationError::new("humidity is required")),
        (slot, _) => slot.copied(),
    };
    let device_id = device_id(fields.get("deviceId"), schema)?;

    Ok(Reading { temperature, humidity, device_id, created_at: None })
}

fn humidity(value: Option<&Value>, policy: HumidityPolicy) -> Result<Option<f64>, ValidationError> {
    match (value, policy) {
        (None, HumidityPolicy::Required) => Err(ValidationError::new("humidity is required")),
        (Some(_), HumidityPolicy::Forbidden) => {
            Err(ValidationError::new("humidity is not reported by this device"))
        }
        (None, _) => Ok(None),
        (Some(value), _) => number(value, "humidity").map(Some),
    }
}

fn device_id(value: Option<&Value>, schema: &DeviceSchema) -> Result<String, ValidationError> {
    let given = match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) if n.is_u64() => Some(n.to_string()),
        Some(other) => {
            return Err(ValidationError::new(format!(
                "deviceId must be a string or a non-negative integer, got {}",
                kind(other)
            )))
        }
    };

    match (given, &schema.device_id) {
        (Some(given), Some(expected)) if &given != expected => Err(ValidationError::new(format!(
            "deviceId {given} does not match {expected}"
        ))),
        (Some(given), _) => Ok(given),
        (None, Some(expected)) => Ok(expected.clone()),
        (None, None) => Err(ValidationError::new("deviceId is required")),
    }
}

fn number(value: &Value, field: &str) -> Result<f64, ValidationError> {
    value
        .as_f64()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::new(format!("{field} must be a number, got {}", kind(value))))
}

fn timestamp(value: &Value) -> Result<DateTime<Utc>, ValidationError> {
    value
        .as_str()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|at| at.with_timezone(&Utc))
        .ok_or_else(|| ValidationError::new("createdAt must be an RFC 3339 timestamp"))
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
