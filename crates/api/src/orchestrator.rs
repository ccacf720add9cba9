//! Startup and ordered shutdown of the ingestion pipeline.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use messaging::{CancellationToken, MessageConsumer, MessageProducer};
use tokio::net::TcpListener;
use tokio::time::Instant;

use crate::error::StartupError;

/// One producer, a pool of consumer workers and the HTTP trigger.
pub struct Ingestion {
    producer: Arc<dyn MessageProducer>,
    consumer: Arc<dyn MessageConsumer>,
    workers: usize,
    shutdown_timeout: Duration,
}

impl Ingestion {
    pub fn new(
        producer: Arc<dyn MessageProducer>,
        consumer: Arc<dyn MessageConsumer>,
        workers: usize,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            producer,
            consumer,
            workers,
            shutdown_timeout,
        }
    }

    pub fn producer(&self) -> Arc<dyn MessageProducer> {
        Arc::clone(&self.producer)
    }

    pub fn consumer(&self) -> Arc<dyn MessageConsumer> {
        Arc::clone(&self.consumer)
    }

    /// Runs until `shutdown` resolves, then drains everything.
    ///
    /// Workers start first, then the producer is initialized; a producer
    /// connection failure is fatal. On shutdown the token is cancelled and,
    /// within one overall deadline, the HTTP server stops accepting, the
    /// producer drains and closes, and finally the workers are awaited.
    pub async fn run<F>(
        self,
        listener: TcpListener,
        app: Router,
        shutdown: F,
    ) -> Result<(), StartupError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let cancel = CancellationToken::new();

        for _ in 0..self.workers {
            self.consumer.start(cancel.clone());
        }
        tracing::info!(workers = self.workers, "consumer workers started");

        if let Err(err) = self.producer.initialize().await {
            cancel.cancel();
            self.consumer.wait().await;
            return Err(err.into());
        }

        let addr = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_default();
        tracing::info!(%addr, "starting HTTP server");

        let server_token = cancel.clone();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move { server_token.cancelled().await })
                .await
        });

        let mut server_result = None;
        tokio::select! {
            () = shutdown => {
                tracing::info!("shutdown signal received, draining");
            }
            joined = &mut server => {
                tracing::error!("HTTP server stopped before a shutdown signal");
                server_result = Some(joined);
            }
        }

        let deadline = Instant::now() + self.shutdown_timeout;
        cancel.cancel();

        let server_result = match server_result {
            Some(joined) => Some(joined),
            None => match tokio::time::timeout_at(deadline, server).await {
                Ok(joined) => Some(joined),
                Err(_) => {
                    tracing::warn!("HTTP server did not stop before the shutdown deadline");
                    None
                }
            },
        };

        self.producer.shutdown(deadline).await;
        self.consumer.wait().await;
        tracing::info!("ingestion stopped");

        match server_result {
            Some(Ok(Err(err))) => Err(StartupError::Serve(err)),
            Some(Err(err)) => Err(StartupError::Serve(std::io::Error::other(err))),
            _ => Ok(()),
        }
    }
}
