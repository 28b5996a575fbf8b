use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::engine::matching::{MatchingPolicy, NearestIdle};
use crate::engine::DriverNotifier;
use crate::error::AppError;
use crate::geo::{distance_meters, GeoIndex};
use crate::hub::protocol::OutboundEvent;
use crate::hub::session::DispatchLogic;
use crate::models::driver::{Driver, DriverStatus, GeoPoint};
use crate::models::order::{NewOrder, Order, OrderStatus};
use crate::models::pricing::{PricingInput, VehicleClass};
use crate::observability::metrics::Metrics;
use crate::pricing::{PricingStrategy, StandardStrategy};
use crate::store::{atomically, require_row, Store};

#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    pub radius_km: f64,
    pub candidate_limit: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            radius_km: 5.0,
            candidate_limit: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub fleet_id: Uuid,
    pub pickup: GeoPoint,
    pub dropoff: GeoPoint,
    pub vehicle_class: VehicleClass,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DispatchOutcome {
    Assigned { driver_id: Uuid },
    NoDriversAvailable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub order_id: Uuid,
    pub amount_cents: i64,
    #[serde(flatten)]
    pub outcome: DispatchOutcome,
}

enum AssignAttempt {
    Assigned,
    DriverTaken,
}

/// Orchestrates pricing, matching and the order/driver state machine.
///
/// Holds no locks of its own: paired order and driver writes always go
/// through one store scope, with guards evaluated inside the write.
pub struct DispatchEngine {
    store: Arc<dyn Store>,
    geo: Arc<dyn GeoIndex>,
    pricing: Arc<dyn PricingStrategy>,
    matching: Arc<dyn MatchingPolicy>,
    notifier: Arc<dyn DriverNotifier>,
    settings: DispatchSettings,
    metrics: Metrics,
}

impl DispatchEngine {
    pub fn new(
        store: Arc<dyn Store>,
        geo: Arc<dyn GeoIndex>,
        notifier: Arc<dyn DriverNotifier>,
        settings: DispatchSettings,
        metrics: Metrics,
    ) -> Self {
        Self {
            store,
            geo,
            pricing: Arc::new(StandardStrategy::default()),
            matching: Arc::new(NearestIdle),
            notifier,
            settings,
            metrics,
        }
    }

    pub fn with_pricing(mut self, pricing: Arc<dyn PricingStrategy>) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_matching(mut self, matching: Arc<dyn MatchingPolicy>) -> Self {
        self.matching = matching;
        self
    }

    /// Prices and persists a new order, then runs one dispatch cycle for it.
    ///
    /// The order survives a failed or empty dispatch and stays `CREATED`.
    pub async fn create_and_dispatch(&self, request: OrderRequest) -> Result<DispatchReport, AppError> {
        request.pickup.validate()?;
        request.dropoff.validate()?;

        let amount_cents = self.pricing.calculate_price(&PricingInput {
            distance_meters: distance_meters(&request.pickup, &request.dropoff),
            vehicle_class: request.vehicle_class,
            at: Utc::now(),
        })?;

        let order = self
            .store
            .create_order(NewOrder {
                fleet_id: request.fleet_id,
                pickup: request.pickup,
                dropoff: request.dropoff,
                vehicle_class: request.vehicle_class,
                amount_cents,
            })
            .await?;

        info!(
            order_id = %order.id,
            fleet_id = %order.fleet_id,
            amount_cents,
            vehicle_class = %order.vehicle_class,
            "order created"
        );

        let outcome = self.dispatch(&order).await?;
        Ok(DispatchReport {
            order_id: order.id,
            amount_cents,
            outcome,
        })
    }

    /// Runs a fresh dispatch cycle for an order still waiting in `CREATED`.
    pub async fn redispatch(&self, order_id: Uuid) -> Result<DispatchReport, AppError> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("order {order_id} not found")))?;

        if order.status != OrderStatus::Created || order.driver_id.is_some() {
            return Err(AppError::InvalidTransition);
        }

        let outcome = self.dispatch(&order).await?;
        Ok(DispatchReport {
            order_id: order.id,
            amount_cents: order.amount_cents,
            outcome,
        })
    }

    async fn dispatch(&self, order: &Order) -> Result<DispatchOutcome, AppError> {
        let start = Instant::now();
        let result = self.match_and_assign(order).await;

        let label = match &result {
            Ok(DispatchOutcome::Assigned { .. }) => "assigned",
            Ok(DispatchOutcome::NoDriversAvailable) => "no_drivers",
            Err(_) => "error",
        };
        self.metrics
            .dispatch_latency_seconds
            .with_label_values(&[label])
            .observe(start.elapsed().as_secs_f64());
        self.metrics.dispatch_total.with_label_values(&[label]).inc();

        match &result {
            Ok(DispatchOutcome::Assigned { driver_id }) => {
                info!(order_id = %order.id, driver_id = %driver_id, "order assigned");
                self.notify_assignment(*driver_id, order).await;
            }
            Ok(DispatchOutcome::NoDriversAvailable) => {
                warn!(order_id = %order.id, "no available drivers found");
            }
            Err(err) => {
                error!(order_id = %order.id, error = %err, "dispatch failed");
            }
        }

        result
    }

    async fn match_and_assign(&self, order: &Order) -> Result<DispatchOutcome, AppError> {
        let candidates = match self
            .geo
            .nearest_drivers(order.pickup, self.settings.radius_km, self.settings.candidate_limit)
            .await
        {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(order_id = %order.id, error = %err, "geo index unavailable; no candidates");
                Vec::new()
            }
        };

        for candidate in self.matching.rank(order, candidates) {
            let driver = match self.store.get_driver(candidate.driver_id).await {
                Ok(Some(driver)) => driver,
                Ok(None) => {
                    debug!(driver_id = %candidate.driver_id, "stale geo entry without driver record");
                    continue;
                }
                Err(err) => {
                    warn!(driver_id = %candidate.driver_id, error = %err, "failed to load candidate");
                    continue;
                }
            };

            if !self.matching.is_eligible(&driver, order) {
                continue;
            }

            match self.assign(order.id, driver.id).await? {
                AssignAttempt::Assigned => {
                    return Ok(DispatchOutcome::Assigned {
                        driver_id: driver.id,
                    });
                }
                AssignAttempt::DriverTaken => {
                    debug!(driver_id = %driver.id, order_id = %order.id, "candidate taken concurrently");
                }
            }
        }

        Ok(DispatchOutcome::NoDriversAvailable)
    }

    async fn assign(&self, order_id: Uuid, driver_id: Uuid) -> Result<AssignAttempt, AppError> {
        atomically(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                let rows = tx
                    .set_driver_status_if(driver_id, DriverStatus::Idle, DriverStatus::EnRoute)
                    .await?;
                if rows == 0 {
                    return Ok(AssignAttempt::DriverTaken);
                }

                require_row(tx.assign_driver_to_order(order_id, driver_id).await?)?;
                Ok(AssignAttempt::Assigned)
            })
        })
        .await
    }

    async fn notify_assignment(&self, driver_id: Uuid, order: &Order) {
        let event = OutboundEvent::OrderAssigned {
            order_id: order.id,
            lat: order.pickup.lat,
            lng: order.pickup.lng,
        };

        if let Err(err) = self.notifier.send_to_driver(driver_id, event).await {
            warn!(
                driver_id = %driver_id,
                order_id = %order.id,
                error = %err,
                "assignment notification failed"
            );
        }
    }

    /// Driver confirms an assignment. Repeating it is a no-op.
    pub async fn accept_assignment(&self, driver_id: Uuid, order_id: Uuid) -> Result<(), AppError> {
        let scope = atomically(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                require_row(tx.confirm_order_acceptance(order_id, driver_id).await?)?;
                require_row(tx.set_driver_status(driver_id, DriverStatus::EnRoute).await?)
            })
        });
        self.transition("accept", driver_id, order_id, scope).await
    }

    /// Returns the order to the matching pool and frees the driver. Does not
    /// re-run matching.
    pub async fn reject_assignment(&self, driver_id: Uuid, order_id: Uuid) -> Result<(), AppError> {
        let scope = atomically(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                require_row(tx.reject_order_assignment(order_id, driver_id).await?)?;
                require_row(tx.set_driver_status(driver_id, DriverStatus::Idle).await?)
            })
        });
        self.transition("reject", driver_id, order_id, scope).await
    }

    pub async fn arrive_at_pickup(&self, driver_id: Uuid, order_id: Uuid) -> Result<(), AppError> {
        let scope = atomically(self.store.as_ref(), move |tx| {
            Box::pin(async move { require_row(tx.mark_order_arrived(order_id, driver_id).await?) })
        });
        self.transition("arrive", driver_id, order_id, scope).await
    }

    pub async fn pick_up_order(&self, driver_id: Uuid, order_id: Uuid) -> Result<(), AppError> {
        let scope = atomically(self.store.as_ref(), move |tx| {
            Box::pin(async move { require_row(tx.mark_order_picked_up(order_id, driver_id).await?) })
        });
        self.transition("pickup", driver_id, order_id, scope).await
    }

    /// Delivers the order and frees the driver in the same scope.
    pub async fn complete_order(&self, driver_id: Uuid, order_id: Uuid) -> Result<(), AppError> {
        let scope = atomically(self.store.as_ref(), move |tx| {
            Box::pin(async move {
                require_row(tx.mark_order_delivered(order_id, driver_id).await?)?;
                require_row(tx.set_driver_status(driver_id, DriverStatus::Idle).await?)
            })
        });
        self.transition("deliver", driver_id, order_id, scope).await
    }

    async fn transition<F>(
        &self,
        name: &'static str,
        driver_id: Uuid,
        order_id: Uuid,
        scope: F,
    ) -> Result<(), AppError>
    where
        F: Future<Output = Result<(), AppError>>,
    {
        let result = scope.await;

        let outcome = match &result {
            Ok(()) => {
                info!(order_id = %order_id, driver_id = %driver_id, transition = name, "order transition applied");
                "success"
            }
            Err(AppError::InvalidTransition) => {
                warn!(order_id = %order_id, driver_id = %driver_id, transition = name, "order transition refused");
                "refused"
            }
            Err(err) => {
                error!(order_id = %order_id, driver_id = %driver_id, transition = name, error = %err, "order transition failed");
                "error"
            }
        };
        self.metrics
            .order_transitions_total
            .with_label_values(&[name, outcome])
            .inc();

        result
    }

    /// The driver's current assignment, for reconciling after a reconnect.
    pub async fn active_order(&self, driver_id: Uuid) -> Result<Option<Order>, AppError> {
        self.store.active_order_for_driver(driver_id).await
    }

    /// Moves a driver between `OFFLINE` and `IDLE`. Drivers that are
    /// `EN_ROUTE` stay bound to their order.
    pub async fn set_driver_availability(&self, driver_id: Uuid, online: bool) -> Result<Driver, AppError> {
        let (expected, target) = if online {
            (DriverStatus::Offline, DriverStatus::Idle)
        } else {
            (DriverStatus::Idle, DriverStatus::Offline)
        };

        let rows = atomically(self.store.as_ref(), move |tx| {
            Box::pin(async move { tx.set_driver_status_if(driver_id, expected, target).await })
        })
        .await?;

        let driver = self
            .store
            .get_driver(driver_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("driver {driver_id} not found")))?;

        if rows == 0 && driver.status != target {
            return Err(AppError::InvalidTransition);
        }

        info!(driver_id = %driver_id, status = ?driver.status, "driver availability updated");
        Ok(driver)
    }
}

#[async_trait]
impl DispatchLogic for DispatchEngine {
    async fn accept_assignment(&self, driver_id: Uuid, order_id: Uuid) -> Result<(), AppError> {
        DispatchEngine::accept_assignment(self, driver_id, order_id).await
    }

    async fn reject_assignment(&self, driver_id: Uuid, order_id: Uuid) -> Result<(), AppError> {
        DispatchEngine::reject_assignment(self, driver_id, order_id).await
    }

    async fn active_order(&self, driver_id: Uuid) -> Result<Option<Order>, AppError> {
        DispatchEngine::active_order(self, driver_id).await
    }
}
