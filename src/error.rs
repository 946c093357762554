use thiserror::Error;

use crate::dispatch::QueueError;
use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum BoltqError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Transport error: {0}")]
    TransportError(#[from] tonic::transport::Error),

    #[error("Reflection error: {0}")]
    Reflection(#[from] tonic_reflection::server::Error),
}

pub type Result<T> = std::result::Result<T, BoltqError>;
