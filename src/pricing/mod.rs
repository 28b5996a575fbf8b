pub mod standard;

use crate::error::AppError;
use crate::models::pricing::PricingInput;

pub use standard::StandardStrategy;

/// Fare calculation, injected into the dispatch engine.
///
/// Implementations must be pure: the same input always yields the same fare.
pub trait PricingStrategy: Send + Sync {
    fn calculate_price(&self, input: &PricingInput) -> Result<i64, AppError>;
}
