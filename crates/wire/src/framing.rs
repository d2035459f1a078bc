//! Message and service-response framing.

use bytes::{BufMut, Bytes, BytesMut};

/// Frame a serialized message with a 4-byte LE length prefix.
///
/// # Test
///
/// ```
/// use graphnode_wire::framing::encode_message;
///
/// let framed = encode_message(b"abc");
/// assert_eq!(&framed[..4], &3u32.to_le_bytes());
/// assert_eq!(&framed[4..], b"abc");
/// ```
pub fn encode_message(payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(4 + payload.len());
    out.put_u32_le(payload.len() as u32);
    out.extend_from_slice(payload);
    out.freeze()
}

/// Frame a successful service response: a `1` success byte followed by a
/// length-prefixed payload.
pub fn encode_service_success(payload: &[u8]) -> Bytes {
    let mut out = BytesMut::with_capacity(5 + payload.len());
    out.put_u8(1);
    out.put_u32_le(payload.len() as u32);
    out.extend_from_slice(payload);
    out.freeze()
}

/// Frame a failed service response: a `0` success byte followed by a
/// length-prefixed UTF-8 error string.
pub fn encode_service_failure(message: &str) -> Bytes {
    let bytes = message.as_bytes();
    let mut out = BytesMut::with_capacity(5 + bytes.len());
    out.put_u8(0);
    out.put_u32_le(bytes.len() as u32);
    out.extend_from_slice(bytes);
    out.freeze()
}
