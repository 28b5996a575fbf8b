use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus, NewDriver};
use crate::models::order::{NewOrder, Order, OrderStatus};
use crate::store::{Store, StoreCounts, StoreTx};

#[derive(Debug, Default)]
struct Tables {
    drivers: HashMap<Uuid, Driver>,
    orders: HashMap<Uuid, Order>,
}

/// Process-local store. Scopes are serialized on a single table lock, so a
/// scope sees no concurrent writes and its own writes stay invisible until
/// it releases the lock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError> {
        let tables = self.tables.clone().lock_owned().await;
        Ok(Box::new(InMemoryTx {
            tables,
            undo: Vec::new(),
            committed: false,
        }))
    }

    async fn create_driver(&self, driver: NewDriver) -> Result<Driver, AppError> {
        let mut tables = self.tables.lock().await;

        let email_taken = tables
            .drivers
            .values()
            .any(|existing| existing.email.eq_ignore_ascii_case(&driver.email));
        if email_taken {
            return Err(AppError::Conflict(format!(
                "driver with email {} already exists",
                driver.email
            )));
        }

        let now = Utc::now();
        let record = Driver {
            id: Uuid::new_v4(),
            fleet_id: driver.fleet_id,
            name: driver.name,
            phone: driver.phone,
            email: driver.email,
            password_hash: driver.password_hash,
            status: DriverStatus::Offline,
            location: driver.location,
            created_at: now,
            updated_at: now,
        };

        tables.drivers.insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_driver(&self, id: Uuid) -> Result<Option<Driver>, AppError> {
        Ok(self.tables.lock().await.drivers.get(&id).cloned())
    }

    async fn get_driver_by_email(&self, email: &str) -> Result<Option<Driver>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .drivers
            .values()
            .find(|driver| driver.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_drivers_by_fleet(&self, fleet_id: Uuid) -> Result<Vec<Driver>, AppError> {
        let tables = self.tables.lock().await;
        let mut drivers: Vec<Driver> = tables
            .drivers
            .values()
            .filter(|driver| driver.fleet_id == fleet_id)
            .cloned()
            .collect();
        drivers.sort_by_key(|driver| driver.created_at);
        Ok(drivers)
    }

    async fn create_order(&self, order: NewOrder) -> Result<Order, AppError> {
        let now = Utc::now();
        let record = Order {
            id: Uuid::new_v4(),
            fleet_id: order.fleet_id,
            pickup: order.pickup,
            dropoff: order.dropoff,
            vehicle_class: order.vehicle_class,
            amount_cents: order.amount_cents,
            driver_id: None,
            status: OrderStatus::Created,
            accepted: false,
            created_at: now,
            updated_at: now,
        };

        self.tables
            .lock()
            .await
            .orders
            .insert(record.id, record.clone());
        Ok(record)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, AppError> {
        Ok(self.tables.lock().await.orders.get(&id).cloned())
    }

    async fn active_order_for_driver(&self, driver_id: Uuid) -> Result<Option<Order>, AppError> {
        let tables = self.tables.lock().await;
        Ok(tables
            .orders
            .values()
            .filter(|order| order.driver_id == Some(driver_id) && order.status.is_active())
            .max_by_key(|order| order.updated_at)
            .cloned())
    }

    async fn counts(&self) -> Result<StoreCounts, AppError> {
        let tables = self.tables.lock().await;
        Ok(StoreCounts {
            drivers: tables.drivers.len(),
            orders: tables.orders.len(),
        })
    }
}

/// Prior row images, replayed in reverse on rollback.
enum Undo {
    Driver(Driver),
    Order(Order),
}

struct InMemoryTx {
    tables: OwnedMutexGuard<Tables>,
    undo: Vec<Undo>,
    committed: bool,
}

impl InMemoryTx {
    fn update_driver_if(
        &mut self,
        id: Uuid,
        guard: impl FnOnce(&Driver) -> bool,
        apply: impl FnOnce(&mut Driver),
    ) -> u64 {
        let Some(driver) = self.tables.drivers.get_mut(&id) else {
            return 0;
        };
        if !guard(driver) {
            return 0;
        }

        self.undo.push(Undo::Driver(driver.clone()));
        apply(driver);
        driver.updated_at = Utc::now();
        1
    }

    fn update_order_if(
        &mut self,
        id: Uuid,
        guard: impl FnOnce(&Order) -> bool,
        apply: impl FnOnce(&mut Order),
    ) -> u64 {
        let Some(order) = self.tables.orders.get_mut(&id) else {
            return 0;
        };
        if !guard(order) {
            return 0;
        }

        self.undo.push(Undo::Order(order.clone()));
        apply(order);
        order.updated_at = Utc::now();
        1
    }

    fn rollback(&mut self) {
        while let Some(prior) = self.undo.pop() {
            match prior {
                Undo::Driver(driver) => {
                    self.tables.drivers.insert(driver.id, driver);
                }
                Undo::Order(order) => {
                    self.tables.orders.insert(order.id, order);
                }
            }
        }
    }
}

fn assigned_to(order: &Order, status: OrderStatus, driver_id: Uuid) -> bool {
    order.status == status && order.driver_id == Some(driver_id)
}

#[async_trait]
impl StoreTx for InMemoryTx {
    async fn set_driver_status(
        &mut self,
        id: Uuid,
        status: DriverStatus,
    ) -> Result<u64, AppError> {
        Ok(self.update_driver_if(id, |_| true, |driver| driver.status = status))
    }

    async fn set_driver_status_if(
        &mut self,
        id: Uuid,
        expected: DriverStatus,
        status: DriverStatus,
    ) -> Result<u64, AppError> {
        Ok(self.update_driver_if(
            id,
            |driver| driver.status == expected,
            |driver| driver.status = status,
        ))
    }

    async fn assign_driver_to_order(
        &mut self,
        order_id: Uuid,
        driver_id: Uuid,
    ) -> Result<u64, AppError> {
        Ok(self.update_order_if(
            order_id,
            |order| order.status == OrderStatus::Created && order.driver_id.is_none(),
            |order| {
                order.status = OrderStatus::Assigned;
                order.driver_id = Some(driver_id);
                order.accepted = false;
            },
        ))
    }

    async fn confirm_order_acceptance(
        &mut self,
        order_id: Uuid,
        driver_id: Uuid,
    ) -> Result<u64, AppError> {
        Ok(self.update_order_if(
            order_id,
            |order| assigned_to(order, OrderStatus::Assigned, driver_id),
            |order| order.accepted = true,
        ))
    }

    async fn reject_order_assignment(
        &mut self,
        order_id: Uuid,
        driver_id: Uuid,
    ) -> Result<u64, AppError> {
        Ok(self.update_order_if(
            order_id,
            |order| assigned_to(order, OrderStatus::Assigned, driver_id),
            |order| {
                order.status = OrderStatus::Created;
                order.driver_id = None;
                order.accepted = false;
            },
        ))
    }

    async fn mark_order_arrived(
        &mut self,
        order_id: Uuid,
        driver_id: Uuid,
    ) -> Result<u64, AppError> {
        Ok(self.update_order_if(
            order_id,
            |order| assigned_to(order, OrderStatus::Assigned, driver_id),
            |order| order.status = OrderStatus::Arrived,
        ))
    }

    async fn mark_order_picked_up(
        &mut self,
        order_id: Uuid,
        driver_id: Uuid,
    ) -> Result<u64, AppError> {
        Ok(self.update_order_if(
            order_id,
            |order| assigned_to(order, OrderStatus::Arrived, driver_id),
            |order| order.status = OrderStatus::PickedUp,
        ))
    }

    async fn mark_order_delivered(
        &mut self,
        order_id: Uuid,
        driver_id: Uuid,
    ) -> Result<u64, AppError> {
        Ok(self.update_order_if(
            order_id,
            |order| assigned_to(order, OrderStatus::PickedUp, driver_id),
            |order| order.status = OrderStatus::Delivered,
        ))
    }

    async fn commit(mut self: Box<Self>) -> Result<(), AppError> {
        self.undo.clear();
        self.committed = true;
        Ok(())
    }
}

impl Drop for InMemoryTx {
    fn drop(&mut self) {
        if !self.committed && !self.undo.is_empty() {
            debug!(writes = self.undo.len(), "rolling back uncommitted scope");
            self.rollback();
        }
    }
}
