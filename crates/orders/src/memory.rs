use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use tokio::sync::RwLock;

use crate::{DomainOrder, OrderError, OrderRepository, Result};

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: Vec<DomainOrder>,
    next_id: i64,
    fail_on_save: bool,
}

/// In-memory order store.
///
/// Used when no database is configured and in tests. Identifiers are
/// assigned sequentially starting at 1.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderRepository {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderRepository {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent save fail until reset.
    pub async fn set_fail_on_save(&self, fail: bool) {
        self.state.write().await.fail_on_save = fail;
    }

    /// Returns the number of saved orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns a snapshot of all saved orders, in save order.
    pub async fn orders(&self) -> Vec<DomainOrder> {
        self.state.read().await.orders.clone()
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn save(&self, order: DomainOrder) -> Result<DomainOrder> {
        let mut state = self.state.write().await;

        if state.fail_on_save {
            return Err(OrderError::Unavailable(
                "store configured to reject writes".to_string(),
            ));
        }

        state.next_id += 1;
        let saved = order.with_id(OrderId::new(state.next_id));
        state.orders.push(saved.clone());

        Ok(saved)
    }
}
