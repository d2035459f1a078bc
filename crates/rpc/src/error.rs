#[derive(Debug)]
pub enum RpcError {
    ConnectionRefused,
    Timeout,
    Transport(String),
    Fault { code: i32, message: String },
    Decode(String),
}

impl std::error::Error for RpcError {}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConnectionRefused => write!(f, "connection refused"),
            Self::Timeout => write!(f, "timed out"),
            Self::Transport(message) => write!(f, "transport error: {message}"),
            Self::Fault { code, message } => write!(f, "fault {code}: {message}"),
            Self::Decode(message) => write!(f, "decode error: {message}"),
        }
    }
}

impl From<reqwest::Error> for RpcError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_connect() {
            Self::ConnectionRefused
        } else if error.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(error.to_string())
        }
    }
}

impl From<crate::value::Fault> for RpcError {
    fn from(fault: crate::value::Fault) -> Self {
        Self::Fault { code: fault.code, message: fault.message }
    }
}
