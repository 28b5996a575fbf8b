use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::driver::GeoPoint;
use crate::models::pricing::VehicleClass;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Created,
    Assigned,
    Arrived,
    PickedUp,
    Delivered,
    Rejected,
}

impl OrderStatus {
    /// Statuses in which the assigned driver is still bound to the order.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            OrderStatus::Assigned | OrderStatus::Arrived | OrderStatus::PickedUp
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub fleet_id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub vehicle_class: VehicleClass,
    pub amount_cents: i64,
    pub driver_id: Option<Uuid>,
    pub status: OrderStatus,
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub fleet_id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub vehicle_class: VehicleClass,
    pub amount_cents: i64,
}
