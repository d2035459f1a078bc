//! The external codec contract (§6): the core never interprets payload
//! bytes beyond framing, so every publisher/subscriber/service endpoint is
//! generic over a concrete implementation of this trait instead of knowing
//! about message schemas itself.

/// A concrete, generated message type. Implementations normally come from
/// a code generator external to this crate; the two small types in
/// `message::testing` stand in for that generator in this crate's own
/// tests.
pub trait RosMessage: Clone + Send + Sync + 'static {
    fn md5sum() -> &'static str;
    fn message_type() -> &'static str;
    fn message_definition() -> &'static str {
        ""
    }

    fn encode(&self, buf: &mut Vec<u8>);
    fn decode(buf: &[u8]) -> Result<Self, DecodeError>
    where
        Self: Sized;
}

#[derive(Debug)]
pub struct DecodeError(pub String);

impl std::error::Error for DecodeError {}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "message decode error: {}", self.0)
    }
}

/// A service type exposes a request and a response message, each with its
/// own encoding, plus a shared md5sum covering both.
pub trait RosService {
    type Request: RosMessage;
    type Response: RosMessage;

    fn md5sum() -> &'static str;
    fn service_type() -> &'static str;
}

/// Stand-in message/service types used by this crate's own tests, playing
/// the role an external code generator would play in a real deployment.
pub mod testing {
    use super::{DecodeError, RosMessage, RosService};

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Int8(pub i8);

    impl RosMessage for Int8 {
        fn md5sum() -> &'static str {
            "27ffa0c9c4b8fb8492252bcad9e5c57b"
        }

        fn message_type() -> &'static str {
            "std_msgs/Int8"
        }

        fn encode(&self, buf: &mut Vec<u8>) {
            buf.push(self.0 as u8);
        }

        fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
            buf.first().map(|b| Self(*b as i8)).ok_or_else(|| DecodeError("Int8 needs 1 byte".into()))
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Str(pub String);

    impl RosMessage for Str {
        fn md5sum() -> &'static str {
            "992ce8a1687cec8c8bd883ec73ca41d1"
        }

        fn message_type() -> &'static str {
            "std_msgs/String"
        }

        fn encode(&self, buf: &mut Vec<u8>) {
            let bytes = self.0.as_bytes();
            buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
            buf.extend_from_slice(bytes);
        }

        fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
            if buf.len() < 4 {
                return Err(DecodeError("Str needs a 4-byte length prefix".into()));
            }
            let len = u32::from_le_bytes(buf[..4].try_into().unwrap()) as usize;
            let body = buf.get(4..4 + len).ok_or_else(|| DecodeError("Str payload truncated".into()))?;
            let text = std::str::from_utf8(body).map_err(|e| DecodeError(e.to_string()))?;
            Ok(Self(text.to_string()))
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AddTwoIntsRequest {
        pub a: i64,
        pub b: i64,
    }

    impl RosMessage for AddTwoIntsRequest {
        fn md5sum() -> &'static str {
            "add_two_ints_req"
        }

        fn message_type() -> &'static str {
            "graphnode_test/AddTwoIntsRequest"
        }

        fn encode(&self, buf: &mut Vec<u8>) {
            buf.extend_from_slice(&self.a.to_le_bytes());
            buf.extend_from_slice(&self.b.to_le_bytes());
        }

        fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
            if buf.len() < 16 {
                return Err(DecodeError("AddTwoIntsRequest needs 16 bytes".into()));
            }
            Ok(Self {
                a: i64::from_le_bytes(buf[0..8].try_into().unwrap()),
                b: i64::from_le_bytes(buf[8..16].try_into().unwrap()),
            })
        }
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct AddTwoIntsResponse {
        pub sum: i64,
    }

    impl RosMessage for AddTwoIntsResponse {
        fn md5sum() -> &'static str {
            "add_two_ints_res"
        }

        fn message_type() -> &'static str {
            "graphnode_test/AddTwoIntsResponse"
        }

        fn encode(&self, buf: &mut Vec<u8>) {
            buf.extend_from_slice(&self.sum.to_le_bytes());
        }

        fn decode(buf: &[u8]) -> Result<Self, DecodeError> {
            if buf.len() < 8 {
                return Err(DecodeError("AddTwoIntsResponse needs 8 bytes".into()));
            }
            Ok(Self { sum: i64::from_le_bytes(buf[0..8].try_into().unwrap()) })
        }
    }

    pub struct AddTwoInts;

    impl RosService for AddTwoInts {
        type Request = AddTwoIntsRequest;
        type Response = AddTwoIntsResponse;

        fn md5sum() -> &'static str {
            "add_two_ints"
        }

        fn service_type() -> &'static str {
            "graphnode_test/AddTwoInts"
        }
    }
}
