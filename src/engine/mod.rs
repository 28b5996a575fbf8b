pub mod dispatch;
pub mod matching;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AppError;
use crate::hub::protocol::OutboundEvent;

pub use dispatch::{DispatchEngine, DispatchOutcome, DispatchReport, DispatchSettings, OrderRequest};
pub use matching::{MatchingPolicy, NearestIdle};

/// Outbound, best-effort channel to a driver. Implemented by the hub.
#[async_trait]
pub trait DriverNotifier: Send + Sync {
    async fn send_to_driver(&self, driver_id: Uuid, event: OutboundEvent) -> Result<(), AppError>;
}

/// Bounds an engine call by `deadline`. On expiry the inner future is
/// dropped, which rolls back any scope it still holds open.
pub async fn with_deadline<T, F>(deadline: Duration, operation: &str, fut: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(AppError::Timeout(format!(
            "{operation} exceeded {}ms",
            deadline.as_millis()
        ))),
    }
}
