//! Device catalog endpoints

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use reloop_common::db::{Device, TeardownStep};
use uuid::Uuid;

use crate::db::catalog;
use crate::{ApiError, ApiResult, AppState};

/// GET /api/devices
pub async fn list_devices(State(state): State<AppState>) -> ApiResult<Json<Vec<Device>>> {
    Ok(Json(catalog::list_devices(&state.db).await?))
}

/// GET /api/devices/:id
pub async fn get_device(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
) -> ApiResult<Json<Device>> {
    catalog::get_device(&state.db, device_id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Device {} not found", device_id)))
}

/// GET /api/devices/:id/steps
///
/// Ordered by `step_number`. A known device without steps yields an empty list.
pub async fn list_steps(
    State(state): State<AppState>,
    Path(device_id): Path<Uuid>,
) -> ApiResult<Json<Vec<TeardownStep>>> {
    if catalog::get_device(&state.db, device_id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Device {} not found", device_id)));
    }
    Ok(Json(catalog::list_steps(&state.db, device_id).await?))
}

pub fn catalog_routes() -> Router<AppState> {
    Router::new()
        .route("/api/devices", get(list_devices))
        .route("/api/devices/:id", get(get_device))
        .route("/api/devices/:id/steps", get(list_steps))
}
