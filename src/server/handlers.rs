//! REST handlers for the data api
//!
//! the two sensor-specific fetch-and-save routes share one handler that takes
//! the device role; clear routes likewise.

use super::{ApiError, ApiResult, AppState};
use crate::domain::Reading;
use crate::fetcher::DeviceRole;
use crate::validate::validate;

use axum::{
    body::Bytes,
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Serialize)]
pub struct SavedResponse {
    pub message: String,
    /// every reading of the resolved device, newest first
    pub data: Vec<Reading>,
}

#[derive(Debug, Serialize)]
pub struct ClearedResponse {
    pub message: String,
    pub removed: usize,
}

// ==============================================================================
// fetch-and-save
// ==============================================================================

pub async fn fetch_and_save_primary(State(state): State<AppState>) -> ApiResult<Json<SavedResponse>> {
    fetch_and_save(&state, DeviceRole::Primary).await
}

pub async fn fetch_and_save_secondary(State(state): State<AppState>) -> ApiResult<Json<SavedResponse>> {
    fetch_and_save(&state, DeviceRole::Secondary).await
}

/// fetcher -> validator -> store, then answer with the device's readings
async fn fetch_and_save(state: &AppState, role: DeviceRole) -> ApiResult<Json<SavedResponse>> {
    let endpoint = state.sensors.endpoint(role);
    let raw = state.sensors.fetch(role).await?;
    let reading = validate(&raw, &endpoint.schema())?;

    let stored = state.store.append(reading).await?;
    tracing::debug!(device = %endpoint.label, temperature = stored.temperature, "reading saved");

    let data = state.store.all_for_device(&stored.device_id).await?;
    Ok(Json(SavedResponse {
        message: format!("Data from {} saved", endpoint.label),
        data,
    }))
}

// ==============================================================================
// reads
// ==============================================================================

pub async fn latest(State(state): State<AppState>) -> ApiResult<Json<BTreeMap<String, Reading>>> {
    Ok(Json(state.store.latest_per_device().await?))
}

pub async fn recent(
    State(state): State<AppState>,
    Path((id, num)): Path<(String, String)>,
) -> ApiResult<Json<Vec<Reading>>> {
    let count = num
        .parse::<usize>()
        .ok()
        .filter(|n| *n > 0)
        .ok_or_else(|| ApiError::bad_request(format!("count must be a positive integer, got {num}")))?;

    Ok(Json(state.store.recent(&id, count).await?))
}

// ==============================================================================
// direct submission
// ==============================================================================

pub async fn add_reading(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<Reading>> {
    // parsed here rather than by the Json extractor so bad bodies get our error shape
    let payload: Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::bad_request(format!("body is not valid JSON: {e}")))?;
    let reading = validate(&payload, &state.devices.schema_for(&id))?;
    let stored = state.store.append(reading).await?;
    Ok(Json(stored))
}

// ==============================================================================
// purges
// ==============================================================================

pub async fn clear_primary(State(state): State<AppState>) -> ApiResult<Json<ClearedResponse>> {
    let device_id = state.sensors.endpoint(DeviceRole::Primary).device_id.clone();
    clear(&state, &device_id).await
}

pub async fn clear_secondary(State(state): State<AppState>) -> ApiResult<Json<ClearedResponse>> {
    let device_id = state.sensors.endpoint(DeviceRole::Secondary).device_id.clone();
    clear(&state, &device_id).await
}

pub async fn clear_device(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ClearedResponse>> {
    clear(&state, &id).await
}

pub async fn clear_all(State(state): State<AppState>) -> ApiResult<Json<ClearedResponse>> {
    let removed = state.store.delete_all().await?;
    tracing::info!(removed, "all device data cleared");
    Ok(Json(ClearedResponse {
        message: "All device data cleared".to_string(),
        removed,
    }))
}

/// unknown devices are not an error; there was simply nothing to remove
async fn clear(state: &AppState, device_id: &str) -> ApiResult<Json<ClearedResponse>> {
    let removed = state.store.delete_device(device_id).await?;
    if removed == 0 {
        tracing::debug!(device = device_id, "clear on device without data");
    } else {
        tracing::info!(device = device_id, removed, "device data cleared");
    }
    Ok(Json(ClearedResponse {
        message: format!("Data of device {device_id} cleared"),
        removed,
    }))
}
