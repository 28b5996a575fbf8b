use crate::geo::Candidate;
use crate::models::driver::Driver;
use crate::models::order::Order;

/// Candidate ordering and eligibility, injected into the dispatch engine.
///
/// The engine walks the ranked list, re-reads each driver's durable record
/// and assigns the first one the policy accepts.
pub trait MatchingPolicy: Send + Sync {
    fn rank(&self, order: &Order, candidates: Vec<Candidate>) -> Vec<Candidate>;

    fn is_eligible(&self, driver: &Driver, order: &Order) -> bool;
}

/// Greedy nearest-first matching: closest idle driver wins. No load balancing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestIdle;

impl MatchingPolicy for NearestIdle {
    fn rank(&self, _order: &Order, mut candidates: Vec<Candidate>) -> Vec<Candidate> {
        candidates.sort_by(|a, b| a.distance_km.total_cmp(&b.distance_km));
        candidates
    }

    fn is_eligible(&self, driver: &Driver, _order: &Order) -> bool {
        driver.can_accept_order()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::{MatchingPolicy, NearestIdle};
    use crate::geo::Candidate;
    use crate::models::driver::{Driver, DriverStatus, GeoPoint};
    use crate::models::order::{Order, OrderStatus};
    use crate::models::pricing::VehicleClass;

    fn order() -> Order {
        Order {
            id: Uuid::new_v4(),
            fleet_id: Uuid::new_v4(),
            pickup: GeoPoint::new(40.0, -74.0),
            dropoff: GeoPoint::new(40.1, -74.1),
            vehicle_class: VehicleClass::Bike,
            amount_cents: 550,
            driver_id: None,
            status: OrderStatus::Created,
            accepted: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn driver(status: DriverStatus) -> Driver {
        Driver {
            id: Uuid::new_v4(),
            fleet_id: Uuid::new_v4(),
            name: "test-driver".to_string(),
            phone: "+15550100".to_string(),
            email: "driver@fleet.io".to_string(),
            password_hash: String::new(),
            status,
            location: GeoPoint::new(40.0, -74.0),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn ranks_nearest_first() {
        let far = Candidate {
            driver_id: Uuid::from_u128(1),
            distance_km: 3.2,
        };
        let near = Candidate {
            driver_id: Uuid::from_u128(2),
            distance_km: 0.4,
        };

        let ranked = NearestIdle.rank(&order(), vec![far, near]);
        assert_eq!(ranked, vec![near, far]);
    }

    #[test]
    fn only_idle_drivers_are_eligible() {
        let order = order();
        assert!(NearestIdle.is_eligible(&driver(DriverStatus::Idle), &order));
        assert!(!NearestIdle.is_eligible(&driver(DriverStatus::Offline), &order));
        assert!(!NearestIdle.is_eligible(&driver(DriverStatus::EnRoute), &order));
    }
}
