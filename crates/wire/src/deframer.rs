//! Stateful stream deframer: buffers partial reads and yields complete
//! records. The first record on any connection is always a connection
//! header; callers switch to `ServiceResponse` mode once they know they're
//! talking to a service client.

use crate::Error;
use bytes::{Buf, Bytes, BytesMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Record,
    ServiceResponse,
}

#[derive(Debug)]
pub enum Frame {
    Record(Bytes),
    ServiceResponse { success: bool, payload: Bytes },
}

pub struct Deframer {
    buf: BytesMut,
    mode: Mode,
}

impl Default for Deframer {
    fn default() -> Self {
        Self::new()
    }
}

impl Deframer {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::new(),
            mode: Mode::Record,
        }
    }

    pub fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Drain as many complete frames as are currently buffered.
    ///
    /// # Test
    ///
    /// ```
    /// use graphnode_wire::deframer::{Deframer, Frame};
    /// use graphnode_wire::framing::encode_message;
    ///
    /// let mut deframer = Deframer::new();
    /// let framed = encode_message(b"hello");
    ///
    /// // feed it in two pieces to exercise partial buffering
    /// deframer.push(&framed[..3]);
    /// assert!(deframer.poll().unwrap().is_empty());
    ///
    /// deframer.push(&framed[3..]);
    /// let frames = deframer.poll().unwrap();
    /// assert_eq!(frames.len(), 1);
    /// match &frames[0] {
    ///     Frame::Record(bytes) => assert_eq!(&bytes[..], b"hello"),
    ///     _ => panic!("expected a record"),
    /// }
    /// ```
    pub fn poll(&mut self) -> Result<Vec<Frame>, Error> {
        let mut out = Vec::new();

        loop {
            match self.mode {
                Mode::Record => {
                    if self.buf.len() < 4 {
                        break;
                    }
                    let len = u32::from_le_bytes(self.buf[..4].try_into().unwrap()) as usize;
                    if self.buf.len() < 4 + len {
                        break;
                    }
                    self.buf.advance(4);
                    let record = self.buf.split_to(len).freeze();
                    out.push(Frame::Record(record));
                }
                Mode::ServiceResponse => {
                    if self.buf.len() < 5 {
                        break;
                    }
                    let success = self.buf[0] == 1;
                    let len = u32::from_le_bytes(self.buf[1..5].try_into().unwrap()) as usize;
                    if self.buf.len() < 5 + len {
                        break;
                    }
                    self.buf.advance(5);
                    let payload = self.buf.split_to(len).freeze();
                    out.push(Frame::ServiceResponse { success, payload });
                }
            }
        }

        Ok(out)
    }

    /// Call when the underlying connection has closed. Raises `Truncated`
    /// only if a partial record was left buffered.
    pub fn close(&mut self) -> Result<(), Error> {
        if self.buf.is_empty() {
            Ok(())
        } else {
            Err(Error::Truncated)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framing::{encode_service_failure, encode_service_success};

    #[test]
    fn service_response_mode_decodes_success_and_failure() {
        let mut deframer = Deframer::new();
        deframer.set_mode(Mode::ServiceResponse);
        deframer.push(&encode_service_success(b"ok"));
        deframer.push(&encode_service_failure("nope"));

        let frames = deframer.poll().unwrap();
        assert_eq!(frames.len(), 2);
        match &frames[0] {
            Frame::ServiceResponse { success, payload } => {
                assert!(*success);
                assert_eq!(&payload[..], b"ok");
            }
            _ => panic!("expected a service response"),
        }
        match &frames[1] {
            Frame::ServiceResponse { success, payload } => {
                assert!(!*success);
                assert_eq!(&payload[..], b"nope");
            }
            _ => panic!("expected a service response"),
        }
    }

    #[test]
    fn close_with_partial_record_is_truncated() {
        let mut deframer = Deframer::new();
        deframer.push(&10u32.to_le_bytes());
        deframer.push(b"short");
        assert!(matches!(deframer.close(), Err(Error::Truncated)));
    }

    #[test]
    fn close_with_empty_buffer_is_ok() {
        let mut deframer = Deframer::new();
        assert!(deframer.close().is_ok());
    }
}
