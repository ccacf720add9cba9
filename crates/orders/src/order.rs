//! The persisted order entity.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an order.
///
/// Orders created by the ingestion path start as `Pending` and are not
/// transitioned further by this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
}

impl OrderStatus {
    /// Returns the status as stored in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            other => Err(format!("unknown order status '{other}'")),
        }
    }
}

/// An order as persisted by the store.
///
/// `id` is `None` until the store has saved the order and assigned one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainOrder {
    pub id: Option<OrderId>,
    pub description: String,
    pub quantity: i32,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

impl DomainOrder {
    /// Builds a new, unsaved order in the `Pending` status.
    pub fn pending(description: impl Into<String>, quantity: i32) -> Self {
        Self {
            id: None,
            description: description.into(),
            quantity,
            status: OrderStatus::Pending,
            created_at: Utc::now(),
        }
    }

    /// Returns a copy of this order carrying the store-assigned identifier.
    pub fn with_id(mut self, id: OrderId) -> Self {
        self.id = Some(id);
        self
    }

    /// Returns true once the store has assigned an identifier.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}
