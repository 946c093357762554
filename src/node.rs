use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::ServiceConfig;
use crate::dispatch::{DispatchQueue, RedisDispatchQueue};
use crate::enqueue::{Enqueuer, Reconciler};
use crate::error::Result;
use crate::grpc::GrpcServer;
use crate::store::{JobStore, PostgresJobStore};

/// A running queue service: both store adapters, the reconciler and the gRPC
/// server, sharing one set of process-wide connection pools.
pub struct Node {
    pub config: ServiceConfig,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn DispatchQueue>,
    postgres: Option<PostgresJobStore>,
    redis: Option<RedisDispatchQueue>,
}

impl Node {
    /// Open the Postgres and Redis pools, verify both, and apply migrations.
    pub async fn connect(config: ServiceConfig) -> Result<Self> {
        let postgres = PostgresJobStore::connect(&config.postgres).await?;
        postgres.migrate().await?;
        tracing::info!("Database migrations applied");

        let redis = RedisDispatchQueue::connect(&config.redis).await?;

        Ok(Self {
            config,
            store: Arc::new(postgres.clone()),
            queue: Arc::new(redis.clone()),
            postgres: Some(postgres),
            redis: Some(redis),
        })
    }

    /// Assemble a node from existing store adapters.
    pub fn with_backends(
        config: ServiceConfig,
        store: Arc<dyn JobStore>,
        queue: Arc<dyn DispatchQueue>,
    ) -> Self {
        Self {
            config,
            store,
            queue,
            postgres: None,
            redis: None,
        }
    }

    pub fn enqueuer(&self) -> Enqueuer {
        Enqueuer::new(self.store.clone(), self.queue.clone())
    }

    /// Run the node until `shutdown` is cancelled.
    ///
    /// 1. Spawns the reconciliation loop (if enabled)
    /// 2. Runs the gRPC server until shutdown
    /// 3. Stops the reconciler and closes both connection pools
    ///
    /// # Errors
    ///
    /// Returns an error if the gRPC server fails to bind or encounters a fatal error.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let reconcile_stop = shutdown.child_token();
        let reconciler = if self.config.reconcile.enabled {
            let reconciler = Reconciler::new(
                self.store.clone(),
                self.queue.clone(),
                self.config.reconcile.clone(),
            );
            let token = reconcile_stop.clone();
            Some(tokio::spawn(async move { reconciler.run(token).await }))
        } else {
            tracing::warn!("Reconciliation disabled; jobs whose publish fails stay unpublished");
            None
        };

        let server = GrpcServer::new(
            self.config.listen_addr,
            self.enqueuer(),
            self.config.request_timeout,
        );
        let served = server.run(shutdown).await;

        reconcile_stop.cancel();
        if let Some(handle) = reconciler {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Reconciliation task ended abnormally");
            }
        }

        let Node {
            store,
            queue,
            postgres,
            redis,
            ..
        } = self;
        drop(store);
        drop(queue);

        if let Some(postgres) = postgres {
            postgres.close().await;
            tracing::info!("Postgres pool closed");
        }
        if let Some(redis) = redis {
            redis.close();
        }
        tracing::info!("Node stopped");

        served?;
        Ok(())
    }
}
