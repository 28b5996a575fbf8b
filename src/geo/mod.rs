pub mod memory;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::GeoPoint;

pub use memory::InMemoryGeoIndex;

const EARTH_RADIUS_KM: f64 = 6_371.0;

pub fn haversine_km(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let delta_lat = (b.lat - a.lat).to_radians();
    let delta_lng = (b.lng - a.lng).to_radians();

    let sin_lat = (delta_lat / 2.0).sin();
    let sin_lng = (delta_lng / 2.0).sin();

    let haversine = sin_lat * sin_lat + lat1.cos() * lat2.cos() * sin_lng * sin_lng;
    let central_angle = 2.0 * haversine.sqrt().min(1.0).asin();

    EARTH_RADIUS_KM * central_angle
}

pub fn distance_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    haversine_km(a, b) * 1_000.0
}

/// A driver returned by a proximity query; not yet validated as available.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub driver_id: Uuid,
    pub distance_km: f64,
}

/// Ephemeral store of driver positions.
///
/// Entries are hints for candidate generation only: they may outlive the
/// driver's availability, so callers re-check the durable record.
#[async_trait]
pub trait GeoIndex: Send + Sync {
    /// Replaces any prior position for `driver_id`. Last write wins.
    async fn upsert(&self, driver_id: Uuid, position: GeoPoint) -> Result<(), AppError>;

    /// Drivers within `radius_km` of `origin`, nearest first, at most `limit`.
    ///
    /// An empty result is not an error. Index unavailability is reported as
    /// [`AppError::Unavailable`].
    async fn nearest_drivers(
        &self,
        origin: GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<Candidate>, AppError>;
}
