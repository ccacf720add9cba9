//! Order creation gateway for the ingestion service.
//!
//! This crate provides:
//! - `DomainOrder`, the persisted entity created once per processed record
//! - `OrderRepository`, the persistence contract, with in-memory and PostgreSQL stores
//! - `OrderCreator` / `OrderService`, the gateway consumers call per inbound record

pub mod config;
pub mod error;
pub mod memory;
pub mod order;
pub mod postgres;
pub mod repository;
pub mod service;

pub use common::OrderId;
pub use config::DatabaseConfig;
pub use error::{OrderError, Result};
pub use memory::InMemoryOrderRepository;
pub use order::{DomainOrder, OrderStatus};
pub use postgres::PostgresOrderRepository;
pub use repository::OrderRepository;
pub use service::{OrderCreator, OrderService};
