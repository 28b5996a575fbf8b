//! Durable driver and order records.
//!
//! Every multi-record mutation goes through a [`StoreTx`]: writes made on the
//! handle become visible to other callers only when it is committed, and a
//! handle dropped without commit (including one owned by a cancelled future)
//! rolls back. Guarded writes return the number of affected rows; zero means
//! the guard condition did not hold and nothing was written.

pub mod memory;

use async_trait::async_trait;
use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::driver::{Driver, DriverStatus, NewDriver};
use crate::models::order::{NewOrder, Order};

pub use memory::InMemoryStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub drivers: usize,
    pub orders: usize,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Opens an atomic scope.
    async fn begin(&self) -> Result<Box<dyn StoreTx>, AppError>;

    /// Fails with [`AppError::Conflict`] if the email is already registered.
    async fn create_driver(&self, driver: NewDriver) -> Result<Driver, AppError>;

    async fn get_driver(&self, id: Uuid) -> Result<Option<Driver>, AppError>;

    async fn get_driver_by_email(&self, email: &str) -> Result<Option<Driver>, AppError>;

    async fn list_drivers_by_fleet(&self, fleet_id: Uuid) -> Result<Vec<Driver>, AppError>;

    /// Persists a new order in `CREATED` status.
    async fn create_order(&self, order: NewOrder) -> Result<Order, AppError>;

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>, AppError>;

    /// The driver's order in a non-terminal status, if any.
    async fn active_order_for_driver(&self, driver_id: Uuid) -> Result<Option<Order>, AppError>;

    async fn counts(&self) -> Result<StoreCounts, AppError>;
}

/// Transactional handle. See the module docs for visibility rules.
#[async_trait]
pub trait StoreTx: Send {
    /// Unconditional status write; 0 rows if the driver does not exist.
    async fn set_driver_status(&mut self, id: Uuid, status: DriverStatus)
    -> Result<u64, AppError>;

    /// Status write guarded on the driver's current status.
    async fn set_driver_status_if(
        &mut self,
        id: Uuid,
        expected: DriverStatus,
        status: DriverStatus,
    ) -> Result<u64, AppError>;

    /// `CREATED` and unassigned -> `ASSIGNED` to `driver_id`.
    async fn assign_driver_to_order(
        &mut self,
        order_id: Uuid,
        driver_id: Uuid,
    ) -> Result<u64, AppError>;

    /// Marks an `ASSIGNED` order as accepted by its driver. Repeatable.
    async fn confirm_order_acceptance(
        &mut self,
        order_id: Uuid,
        driver_id: Uuid,
    ) -> Result<u64, AppError>;

    /// `ASSIGNED` -> `CREATED`, clearing the driver reference.
    async fn reject_order_assignment(
        &mut self,
        order_id: Uuid,
        driver_id: Uuid,
    ) -> Result<u64, AppError>;

    /// `ASSIGNED` -> `ARRIVED`.
    async fn mark_order_arrived(&mut self, order_id: Uuid, driver_id: Uuid)
    -> Result<u64, AppError>;

    /// `ARRIVED` -> `PICKED_UP`.
    async fn mark_order_picked_up(
        &mut self,
        order_id: Uuid,
        driver_id: Uuid,
    ) -> Result<u64, AppError>;

    /// `PICKED_UP` -> `DELIVERED`.
    async fn mark_order_delivered(
        &mut self,
        order_id: Uuid,
        driver_id: Uuid,
    ) -> Result<u64, AppError>;

    async fn commit(self: Box<Self>) -> Result<(), AppError>;
}

/// Runs `work` inside one atomic scope.
///
/// Commits when `work` returns `Ok`; otherwise the scope is rolled back and
/// the error is returned unchanged.
pub async fn atomically<T, F>(store: &dyn Store, work: F) -> Result<T, AppError>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut dyn StoreTx) -> BoxFuture<'t, Result<T, AppError>> + Send,
{
    let mut tx = store.begin().await?;
    let value = work(tx.as_mut()).await?;
    tx.commit().await?;
    Ok(value)
}

/// Maps a zero-row guarded write to [`AppError::InvalidTransition`].
pub fn require_row(rows: u64) -> Result<(), AppError> {
    if rows == 0 {
        return Err(AppError::InvalidTransition);
    }
    Ok(())
}
