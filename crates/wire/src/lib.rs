//! Wire-level framing for the compute-graph protocol.
//!
//! This crate is deliberately byte-level and synchronous: it knows nothing
//! about sockets, only about turning buffers into records and records into
//! buffers. Everything here operates on already-read bytes; the I/O lives
//! one layer up, in `graphnode`.

pub mod datagram;
pub mod deframer;
pub mod framing;
pub mod header;

pub use datagram::{DatagramHeader, Opcode, chunk_message};
pub use deframer::{Deframer, Frame, Mode};
pub use header::ConnectionHeader;

#[derive(Debug)]
pub enum Error {
    InvalidInput,
    InvalidHeader(String),
    MissingField(&'static str),
    Truncated,
    Utf8Error(std::str::Utf8Error),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(value: std::str::Utf8Error) -> Self {
        Self::Utf8Error(value)
    }
}
