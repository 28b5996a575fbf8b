use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::api::rest::auth::{hash_password, AuthenticatedDriver};
use crate::engine::with_deadline;
use crate::api::rest::extract::AppJson;
use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus, GeoPoint, NewDriver};
use crate::models::order::Order;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/drivers", post(create_driver))
        .route("/drivers/me/availability", post(set_availability))
        .route("/drivers/me/order", get(active_order))
        .route("/fleets/:id/drivers", get(list_fleet_drivers))
}

#[derive(Deserialize)]
pub struct CreateDriverRequest {
    pub fleet_id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub password: String,
    pub lat: f64,
    pub lng: f64,
}

impl CreateDriverRequest {
    fn validate(&self) -> Result<GeoPoint, AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::BadRequest("name is required".to_string()));
        }
        if self.phone.trim().is_empty() {
            return Err(AppError::BadRequest("phone is required".to_string()));
        }
        if !self.email.contains('@') {
            return Err(AppError::BadRequest("a valid email is required".to_string()));
        }
        if self.password.is_empty() {
            return Err(AppError::BadRequest("password is required".to_string()));
        }

        let location = GeoPoint::new(self.lat, self.lng);
        location.validate()?;
        Ok(location)
    }
}

#[derive(Serialize)]
pub struct CreateDriverResponse {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub status: DriverStatus,
}

async fn create_driver(
    State(state): State<Arc<AppState>>,
    AppJson(payload): AppJson<CreateDriverRequest>,
) -> Result<(StatusCode, Json<CreateDriverResponse>), AppError> {
    let location = payload.validate()?;

    let new_driver = NewDriver {
        fleet_id: payload.fleet_id,
        name: payload.name.trim().to_string(),
        phone: payload.phone.trim().to_string(),
        email: payload.email.trim().to_string(),
        password_hash: hash_password(&payload.password),
        location,
    };
    let driver = with_deadline(
        state.config.request_timeout,
        "create_driver",
        state.store.create_driver(new_driver),
    )
    .await?;

    if let Err(err) = state.geo.upsert(driver.id, location).await {
        warn!(driver_id = %driver.id, error = %err, "failed to seed driver position");
    }

    info!(driver_id = %driver.id, fleet_id = %driver.fleet_id, "driver registered");

    Ok((
        StatusCode::CREATED,
        Json(CreateDriverResponse {
            id: driver.id,
            created_at: driver.created_at,
            status: driver.status,
        }),
    ))
}

#[derive(Deserialize)]
pub struct AvailabilityRequest {
    pub online: bool,
}

async fn set_availability(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedDriver,
    AppJson(payload): AppJson<AvailabilityRequest>,
) -> Result<Json<Driver>, AppError> {
    let driver = with_deadline(
        state.config.request_timeout,
        "set_driver_availability",
        state
            .engine
            .set_driver_availability(auth.driver_id, payload.online),
    )
    .await?;

    Ok(Json(driver))
}

async fn active_order(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedDriver,
) -> Result<Json<Order>, AppError> {
    let order = with_deadline(
        state.config.request_timeout,
        "active_order",
        state.engine.active_order(auth.driver_id),
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("driver {} has no active order", auth.driver_id)))?;

    Ok(Json(order))
}

async fn list_fleet_drivers(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedDriver,
    Path(fleet_id): Path<Uuid>,
) -> Result<Json<Vec<Driver>>, AppError> {
    let drivers = with_deadline(
        state.config.request_timeout,
        "list_drivers_by_fleet",
        state.store.list_drivers_by_fleet(fleet_id),
    )
    .await?;
    Ok(Json(drivers))
}
