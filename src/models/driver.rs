use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Rejects non-finite or out-of-range coordinates.
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(AppError::BadRequest(format!("invalid latitude: {}", self.lat)));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(AppError::BadRequest(format!("invalid longitude: {}", self.lng)));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriverStatus {
    Offline,
    Idle,
    EnRoute,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub fleet_id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password_hash: String,
    pub status: DriverStatus,
    pub location: GeoPoint,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    pub fn can_accept_order(&self) -> bool {
        self.status == DriverStatus::Idle
    }
}

/// Registration data; the store assigns identity, status and timestamps.
#[derive(Debug, Clone)]
pub struct NewDriver {
    pub fleet_id: Uuid,
    pub name: String,
    pub phone: String,
    pub email: String,
    pub password_hash: String,
    pub location: GeoPoint,
}

#[cfg(test)]
mod tests {
    use super::{DriverStatus, GeoPoint};

    #[test]
    fn status_uses_wire_names() {
        let encoded = serde_json::to_string(&DriverStatus::EnRoute).unwrap();
        assert_eq!(encoded, "\"EN_ROUTE\"");
    }

    #[test]
    fn out_of_range_coordinates_are_rejected() {
        assert!(GeoPoint::new(40.0, -74.0).validate().is_ok());
        assert!(GeoPoint::new(91.0, 0.0).validate().is_err());
        assert!(GeoPoint::new(0.0, 180.5).validate().is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).validate().is_err());
    }
}
