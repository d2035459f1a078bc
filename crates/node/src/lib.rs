pub mod endpoint;
pub mod error;
pub mod handle;
pub mod message;
pub mod name;
pub mod publisher;
pub mod remap;
pub mod runtime;
pub mod service_client;
pub mod service_server;
pub mod spinner;
pub mod subscriber;
