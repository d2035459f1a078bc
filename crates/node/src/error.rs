//! Unified error taxonomy (§7). Per-component errors below convert into
//! this one at the boundaries a caller actually observes (handle methods,
//! runtime init); internal plumbing keeps using the narrower component
//! error where that is more informative.

use rpc::{DirectoryError, PeerError, RpcError};

#[derive(Debug)]
pub enum NodeError {
    InvalidName(String),
    InvalidHeader(String),
    TypeMismatch { expected: String, actual: String },
    Md5Mismatch,
    Directory(DirectoryError),
    PeerUnreachable,
    PeerRejected { message: String },
    QueueFull,
    ServiceFailed { message: String },
    Shutdown,
    Aborted,
    ShutdownDuringInit,
    Serialization(String),
    Io(String),
}

impl std::error::Error for NodeError {}

impl std::fmt::Display for NodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(name) => write!(f, "invalid graph name: {name}"),
            Self::InvalidHeader(message) => write!(f, "invalid header: {message}"),
            Self::TypeMismatch { expected, actual } => write!(f, "type mismatch: expected {expected}, got {actual}"),
            Self::Md5Mismatch => write!(f, "md5sum mismatch"),
            Self::Directory(error) => write!(f, "directory error: {error}"),
            Self::PeerUnreachable => write!(f, "peer unreachable"),
            Self::PeerRejected { message } => write!(f, "peer rejected: {message}"),
            Self::QueueFull => write!(f, "queue full"),
            Self::ServiceFailed { message } => write!(f, "service call failed: {message}"),
            Self::Shutdown => write!(f, "endpoint shut down"),
            Self::Aborted => write!(f, "aborted"),
            Self::ShutdownDuringInit => write!(f, "shut down during initialization"),
            Self::Serialization(message) => write!(f, "serialization error: {message}"),
            Self::Io(message) => write!(f, "io error: {message}"),
        }
    }
}

impl From<crate::name::NameError> for NodeError {
    fn from(error: crate::name::NameError) -> Self {
        match error {
            crate::name::NameError::Invalid(name) => Self::InvalidName(name),
        }
    }
}

impl From<DirectoryError> for NodeError {
    fn from(error: DirectoryError) -> Self {
        Self::Directory(error)
    }
}

impl From<PeerError> for NodeError {
    fn from(error: PeerError) -> Self {
        match error {
            PeerError::Unreachable => Self::PeerUnreachable,
            PeerError::Rejected { message } => Self::PeerRejected { message },
            PeerError::Aborted => Self::Aborted,
        }
    }
}

impl From<RpcError> for NodeError {
    fn from(error: RpcError) -> Self {
        Self::Directory(DirectoryError::Transport(error))
    }
}

impl From<wire::Error> for NodeError {
    fn from(error: wire::Error) -> Self {
        Self::InvalidHeader(error.to_string())
    }
}

impl From<std::io::Error> for NodeError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}
