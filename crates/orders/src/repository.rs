use async_trait::async_trait;

use crate::{DomainOrder, Result};

/// Persistence contract for orders.
///
/// Implementations must tolerate concurrent calls from every consumer
/// worker at once.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists a new order and returns it with its assigned identifier.
    async fn save(&self, order: DomainOrder) -> Result<DomainOrder>;
}
