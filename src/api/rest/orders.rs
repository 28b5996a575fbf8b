use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::rest::auth::AuthenticatedDriver;
use crate::engine::{with_deadline, DispatchReport, OrderRequest};
use crate::api::rest::extract::AppJson;
use crate::error::AppError;
use crate::models::driver::GeoPoint;
use crate::models::order::Order;
use crate::models::pricing::VehicleClass;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/:id", get(get_order))
        .route("/orders/:id/dispatch", post(dispatch_order))
        .route("/orders/:id/arrive", post(arrive_at_pickup))
        .route("/orders/:id/pickup", post(pick_up_order))
        .route("/orders/:id/deliver", post(complete_order))
}

#[derive(Deserialize)]
pub struct CreateOrderRequest {
    pub fleet_id: Uuid,
    pub pickup_lat: f64,
    pub pickup_lng: f64,
    pub dropoff_lat: f64,
    pub dropoff_lng: f64,
    #[serde(default)]
    pub vehicle_class: Option<VehicleClass>,
}

#[derive(Serialize)]
pub struct TransitionResponse {
    pub status: &'static str,
}

async fn create_order(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedDriver,
    AppJson(payload): AppJson<CreateOrderRequest>,
) -> Result<(StatusCode, Json<DispatchReport>), AppError> {
    let request = OrderRequest {
        fleet_id: payload.fleet_id,
        pickup: GeoPoint::new(payload.pickup_lat, payload.pickup_lng),
        dropoff: GeoPoint::new(payload.dropoff_lat, payload.dropoff_lng),
        vehicle_class: payload.vehicle_class.unwrap_or(VehicleClass::Bike),
    };

    let report = with_deadline(
        state.config.request_timeout,
        "create_and_dispatch",
        state.engine.create_and_dispatch(request),
    )
    .await?;

    Ok((StatusCode::CREATED, Json(report)))
}

async fn get_order(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedDriver,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>, AppError> {
    let order = with_deadline(
        state.config.request_timeout,
        "get_order",
        state.store.get_order(id),
    )
    .await?
    .ok_or_else(|| AppError::NotFound(format!("order {} not found", id)))?;

    Ok(Json(order))
}

async fn dispatch_order(
    State(state): State<Arc<AppState>>,
    _auth: AuthenticatedDriver,
    Path(id): Path<Uuid>,
) -> Result<Json<DispatchReport>, AppError> {
    let report = with_deadline(
        state.config.request_timeout,
        "redispatch",
        state.engine.redispatch(id),
    )
    .await?;

    Ok(Json(report))
}

async fn arrive_at_pickup(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedDriver,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    with_deadline(
        state.config.request_timeout,
        "arrive_at_pickup",
        state.engine.arrive_at_pickup(auth.driver_id, id),
    )
    .await?;
    Ok(success())
}

async fn pick_up_order(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedDriver,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    with_deadline(
        state.config.request_timeout,
        "pick_up_order",
        state.engine.pick_up_order(auth.driver_id, id),
    )
    .await?;
    Ok(success())
}

async fn complete_order(
    State(state): State<Arc<AppState>>,
    auth: AuthenticatedDriver,
    Path(id): Path<Uuid>,
) -> Result<Json<TransitionResponse>, AppError> {
    with_deadline(
        state.config.request_timeout,
        "complete_order",
        state.engine.complete_order(auth.driver_id, id),
    )
    .await?;
    Ok(success())
}

fn success() -> Json<TransitionResponse> {
    Json(TransitionResponse { status: "success" })
}
