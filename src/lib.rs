pub mod config;
pub mod dispatch;
pub mod enqueue;
pub mod error;
pub mod grpc;
pub mod node;
pub mod shutdown;
pub mod store;

// Re-export generated protobuf types
pub mod proto {
    tonic::include_proto!("boltq");

    /// Encoded descriptors for the reflection service
    pub const FILE_DESCRIPTOR_SET: &[u8] = tonic::include_file_descriptor_set!("boltq_descriptor");
}
