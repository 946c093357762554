use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tonic::transport::server::Router;
use tonic::transport::Server;

use crate::enqueue::Enqueuer;
use crate::error::Result;
use crate::grpc::queue_service::QueueHandler;
use crate::proto::{self, queue_service_server::QueueServiceServer};

pub struct GrpcServer {
    addr: SocketAddr,
    enqueuer: Enqueuer,
    request_timeout: Duration,
}

impl GrpcServer {
    pub fn new(addr: SocketAddr, enqueuer: Enqueuer, request_timeout: Duration) -> Self {
        Self {
            addr,
            enqueuer,
            request_timeout,
        }
    }

    /// Serve on the configured address until `shutdown` is cancelled.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        tracing::info!(addr = %self.addr, "Starting gRPC server");

        let addr = self.addr;
        self.router()?
            .serve_with_shutdown(addr, async move { shutdown.cancelled().await })
            .await?;
        Ok(())
    }

    /// Serve on an already-bound listener until `shutdown` is cancelled.
    pub async fn run_with_listener(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<()> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(addr = %addr, "Starting gRPC server");
        }

        self.router()?
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
                shutdown.cancelled().await
            })
            .await?;
        Ok(())
    }

    fn router(self) -> Result<Router> {
        let handler = QueueHandler::new(self.enqueuer);
        let reflection = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
            .build_v1()?;

        // tonic also honors a shorter grpc-timeout sent by the client
        Ok(Server::builder()
            .timeout(self.request_timeout)
            .add_service(QueueServiceServer::new(handler))
            .add_service(reflection))
    }
}
