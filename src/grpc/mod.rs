pub mod queue_service;
pub mod server;

pub use queue_service::QueueHandler;
pub use server::GrpcServer;
