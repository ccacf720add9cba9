//! Order creation gateway.

use async_trait::async_trait;
use common::OrderId;

use crate::{DomainOrder, OrderError, OrderRepository, Result};

/// Creates orders on behalf of the ingestion path.
///
/// This is the single operation consumer workers call per inbound record.
#[async_trait]
pub trait OrderCreator: Send + Sync {
    /// Creates and persists a pending order, returning its generated identifier.
    async fn create_order(&self, description: &str, quantity: i32) -> Result<OrderId>;
}

/// Order service backed by an [`OrderRepository`].
pub struct OrderService<R: OrderRepository> {
    repository: R,
}

impl<R: OrderRepository> OrderService<R> {
    /// Creates a new order service over the given repository.
    pub fn new(repository: R) -> Self {
        Self { repository }
    }

    /// Returns a reference to the underlying repository.
    pub fn repository(&self) -> &R {
        &self.repository
    }
}

#[async_trait]
impl<R: OrderRepository> OrderCreator for OrderService<R> {
    #[tracing::instrument(skip(self))]
    async fn create_order(&self, description: &str, quantity: i32) -> Result<OrderId> {
        if description.trim().is_empty() {
            return Err(OrderError::EmptyDescription);
        }
        if quantity <= 0 {
            return Err(OrderError::InvalidQuantity { quantity });
        }

        let order = self
            .repository
            .save(DomainOrder::pending(description, quantity))
            .await?;

        let id = order
            .id
            .ok_or_else(|| OrderError::Unavailable("store did not assign an id".to_string()))?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %id,
            description = %order.description,
            quantity = order.quantity,
            status = %order.status,
            "order created"
        );

        Ok(id)
    }
}
