use async_trait::async_trait;
use common::OrderId;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;

use crate::{DatabaseConfig, DomainOrder, OrderRepository, Result};

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderRepository {
    pool: PgPool,
}

impl PostgresOrderRepository {
    /// Creates a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens a pool sized from `config`.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .max_lifetime(config.max_lifetime)
            .idle_timeout(config.idle_timeout)
            .connect(&config.url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "connected to order database"
        );

        Ok(Self { pool })
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OrderRepository for PostgresOrderRepository {
    async fn save(&self, order: DomainOrder) -> Result<DomainOrder> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO orders (description, quantity, status, created_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id
            "#,
        )
        .bind(&order.description)
        .bind(order.quantity)
        .bind(order.status.as_str())
        .bind(order.created_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(order.with_id(OrderId::new(id)))
    }
}
