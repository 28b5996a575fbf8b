use std::collections::HashMap;

use crate::error::AppError;
use crate::models::pricing::{PricingInput, VehicleClass};
use crate::pricing::PricingStrategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rate {
    pub base_cents: i64,
    pub per_km_cents: i64,
}

/// Flat base fare plus a per-kilometre component rounded up to the next cent.
#[derive(Debug, Clone)]
pub struct StandardStrategy {
    rates: HashMap<VehicleClass, Rate>,
}

impl StandardStrategy {
    pub fn new(rates: HashMap<VehicleClass, Rate>) -> Self {
        Self { rates }
    }

    pub fn rate(&self, class: VehicleClass) -> Option<Rate> {
        self.rates.get(&class).copied()
    }
}

impl Default for StandardStrategy {
    fn default() -> Self {
        let rates = HashMap::from([
            (
                VehicleClass::Bike,
                Rate {
                    base_cents: 500,
                    per_km_cents: 50,
                },
            ),
            (
                VehicleClass::Van,
                Rate {
                    base_cents: 1500,
                    per_km_cents: 100,
                },
            ),
            (
                VehicleClass::Truck,
                Rate {
                    base_cents: 3000,
                    per_km_cents: 200,
                },
            ),
        ]);
        Self::new(rates)
    }
}

impl PricingStrategy for StandardStrategy {
    fn calculate_price(&self, input: &PricingInput) -> Result<i64, AppError> {
        let rate = self
            .rate(input.vehicle_class)
            .ok_or(AppError::UnsupportedVehicleClass(input.vehicle_class))?;

        // NaN and negative distances price as a zero-length trip.
        let distance_km = if input.distance_meters.is_finite() {
            input.distance_meters.max(0.0) / 1_000.0
        } else if input.distance_meters == f64::INFINITY {
            return Err(AppError::BadRequest("trip distance is unbounded".to_string()));
        } else {
            0.0
        };

        let variable = (distance_km * rate.per_km_cents as f64).ceil();
        let total = rate.base_cents.saturating_add(variable as i64);

        Ok(total.max(rate.base_cents))
    }
}
