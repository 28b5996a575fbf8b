use async_trait::async_trait;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::AppError;
use crate::geo::{haversine_km, Candidate, GeoIndex};
use crate::models::driver::GeoPoint;

/// Process-local position index. Queries scan every entry.
#[derive(Debug, Default)]
pub struct InMemoryGeoIndex {
    positions: DashMap<Uuid, GeoPoint>,
}

impl InMemoryGeoIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, driver_id: &Uuid) -> Option<GeoPoint> {
        self.positions.get(driver_id).map(|entry| *entry.value())
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

#[async_trait]
impl GeoIndex for InMemoryGeoIndex {
    async fn upsert(&self, driver_id: Uuid, position: GeoPoint) -> Result<(), AppError> {
        position.validate()?;
        self.positions.insert(driver_id, position);
        Ok(())
    }

    async fn nearest_drivers(
        &self,
        origin: GeoPoint,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<Candidate>, AppError> {
        if limit == 0 || radius_km.is_nan() || radius_km < 0.0 {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<Candidate> = self
            .positions
            .iter()
            .filter_map(|entry| {
                let distance_km = haversine_km(&origin, entry.value());
                (distance_km <= radius_km).then_some(Candidate {
                    driver_id: *entry.key(),
                    distance_km,
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.distance_km
                .total_cmp(&b.distance_km)
                .then_with(|| a.driver_id.cmp(&b.driver_id))
        });
        candidates.truncate(limit);

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use uuid::Uuid;

    use super::InMemoryGeoIndex;
    use crate::geo::{haversine_km, GeoIndex};
    use crate::models::driver::GeoPoint;

    #[tokio::test]
    async fn upsert_is_last_write_wins() {
        let index = InMemoryGeoIndex::new();
        let driver = Uuid::from_u128(1);

        index.upsert(driver, GeoPoint::new(40.0, -74.0)).await.unwrap();
        index.upsert(driver, GeoPoint::new(41.0, -73.0)).await.unwrap();

        assert_eq!(index.len(), 1);
        assert_eq!(index.position(&driver), Some(GeoPoint::new(41.0, -73.0)));
    }

    #[tokio::test]
    async fn invalid_position_is_rejected_and_not_stored() {
        let index = InMemoryGeoIndex::new();
        let result = index.upsert(Uuid::from_u128(1), GeoPoint::new(120.0, 0.0)).await;

        assert!(result.is_err());
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn nearest_drivers_are_sorted_filtered_and_truncated() {
        let index = InMemoryGeoIndex::new();
        let origin = GeoPoint::new(40.0, -74.0);

        let far = Uuid::from_u128(1);
        let near = Uuid::from_u128(2);
        let mid = Uuid::from_u128(3);
        let outside = Uuid::from_u128(4);

        index.upsert(far, GeoPoint::new(40.03, -74.0)).await.unwrap();
        index.upsert(near, GeoPoint::new(40.001, -74.0)).await.unwrap();
        index.upsert(mid, GeoPoint::new(40.01, -74.0)).await.unwrap();
        index.upsert(outside, GeoPoint::new(40.2, -74.0)).await.unwrap();

        let found = index.nearest_drivers(origin, 5.0, 10).await.unwrap();
        let ids: Vec<Uuid> = found.iter().map(|c| c.driver_id).collect();
        assert_eq!(ids, vec![near, mid, far]);

        let truncated = index.nearest_drivers(origin, 5.0, 2).await.unwrap();
        assert_eq!(truncated.len(), 2);
        assert_eq!(truncated[0].driver_id, near);
    }

    #[tokio::test]
    async fn empty_range_is_not_an_error() {
        let index = InMemoryGeoIndex::new();
        index
            .upsert(Uuid::from_u128(1), GeoPoint::new(10.0, 10.0))
            .await
            .unwrap();

        let found = index
            .nearest_drivers(GeoPoint::new(40.0, -74.0), 5.0, 10)
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    proptest! {
        #[test]
        fn prop_results_ascend_and_stay_within_radius(
            offsets in proptest::collection::vec((-0.1f64..0.1, -0.1f64..0.1), 0..40),
            radius_km in 0.5f64..15.0,
            limit in 1usize..20,
        ) {
            let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
            let origin = GeoPoint::new(40.0, -74.0);
            let index = InMemoryGeoIndex::new();

            runtime.block_on(async {
                for (i, (dlat, dlng)) in offsets.iter().enumerate() {
                    let point = GeoPoint::new(origin.lat + dlat, origin.lng + dlng);
                    index.upsert(Uuid::from_u128(i as u128), point).await.unwrap();
                }
            });

            let found = runtime
                .block_on(index.nearest_drivers(origin, radius_km, limit))
                .unwrap();

            prop_assert!(found.len() <= limit);
            for pair in found.windows(2) {
                prop_assert!(pair[0].distance_km <= pair[1].distance_km);
            }
            for candidate in &found {
                let position = index.position(&candidate.driver_id).unwrap();
                prop_assert!(haversine_km(&origin, &position) <= radius_km);
            }
        }
    }
}
