pub mod directory;
pub mod error;
pub mod peer;
pub mod server;
pub mod value;

pub use directory::{DirectoryClient, DirectoryError};
pub use error::RpcError;
pub use peer::{PeerClient, PeerError, TopicDescriptor};
pub use server::RpcListener;
pub use value::{Fault, Value};
