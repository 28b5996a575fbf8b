use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VehicleClass {
    Bike,
    Van,
    Truck,
}

impl fmt::Display for VehicleClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VehicleClass::Bike => "BIKE",
            VehicleClass::Van => "VAN",
            VehicleClass::Truck => "TRUCK",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct PricingInput {
    pub distance_meters: f64,
    pub vehicle_class: VehicleClass,
    pub at: DateTime<Utc>,
}
