//! Connection headers: an outer length prefix around concatenated inner
//! length-prefixed UTF-8 `key=value` records.

use crate::Error;
use bytes::{BufMut, Bytes, BytesMut};
use std::collections::BTreeMap;

pub const CALLER_ID: &str = "callerid";
pub const MD5SUM: &str = "md5sum";
pub const TOPIC: &str = "topic";
pub const SERVICE: &str = "service";
pub const TYPE: &str = "type";
pub const LATCHING: &str = "latching";
pub const PERSISTENT: &str = "persistent";
pub const TCP_NODELAY: &str = "tcp_nodelay";
pub const MESSAGE_DEFINITION: &str = "message_definition";

const WILDCARD: &str = "*";

/// A parsed connection header. Keys are kept sorted so encoding is
/// deterministic, which keeps the doctests below stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionHeader(BTreeMap<String, String>);

impl ConnectionHeader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// Encode the inner `key=value` records only (without the outer length
    /// prefix, which the deframer/framer owns).
    ///
    /// # Test
    ///
    /// ```
    /// use graphnode_wire::ConnectionHeader;
    ///
    /// let mut header = ConnectionHeader::new();
    /// header.insert("topic", "/chatter").insert("type", "std_msgs/String");
    ///
    /// let encoded = header.encode();
    /// let decoded = ConnectionHeader::decode(&encoded).unwrap();
    /// assert_eq!(decoded.get("topic"), Some("/chatter"));
    /// assert_eq!(decoded.get("type"), Some("std_msgs/String"));
    /// ```
    pub fn encode(&self) -> Bytes {
        let mut out = BytesMut::new();
        for (key, value) in &self.0 {
            let record = format!("{key}={value}");
            out.put_u32_le(record.len() as u32);
            out.extend_from_slice(record.as_bytes());
        }
        out.freeze()
    }

    pub fn decode(mut bytes: &[u8]) -> Result<Self, Error> {
        let mut map = BTreeMap::new();

        while !bytes.is_empty() {
            if bytes.len() < 4 {
                return Err(Error::Truncated);
            }

            let len = u32::from_le_bytes(bytes[..4].try_into().unwrap()) as usize;
            bytes = &bytes[4..];

            if bytes.len() < len {
                return Err(Error::Truncated);
            }

            let record = std::str::from_utf8(&bytes[..len])?;
            bytes = &bytes[len..];

            let (key, value) = record
                .split_once('=')
                .ok_or_else(|| Error::InvalidHeader(record.to_string()))?;
            map.insert(key.to_string(), value.to_string());
        }

        Ok(Self(map))
    }

    fn require(&self, key: &'static str) -> Result<(), Error> {
        if self.0.contains_key(key) {
            Ok(())
        } else {
            Err(Error::MissingField(key))
        }
    }

    /// Validates a subscriber's header sent to a publisher: `topic`,
    /// `type`, and `md5sum` must be present (wildcard `*` is allowed for
    /// `type`/`md5sum`).
    pub fn validate_subscriber(&self) -> Result<(), Error> {
        self.require(TOPIC)?;
        self.require(TYPE)?;
        self.require(MD5SUM)?;
        Ok(())
    }

    /// Validates a service client's header sent to a server: `service` and
    /// `md5sum` must be present.
    pub fn validate_service_client(&self) -> Result<(), Error> {
        self.require(SERVICE)?;
        self.require(MD5SUM)?;
        Ok(())
    }

    pub fn md5sum_matches(&self, expected: &str) -> bool {
        matches!(self.get(MD5SUM), Some(v) if v == WILDCARD || v == expected)
    }

    pub fn type_matches(&self, expected: &str) -> bool {
        matches!(self.get(TYPE), Some(v) if v == WILDCARD || v == expected)
    }

    pub fn is_latching(&self) -> bool {
        self.get(LATCHING) == Some("1")
    }

    pub fn is_persistent(&self) -> bool {
        self.get(PERSISTENT) == Some("1")
    }

    pub fn is_tcp_nodelay(&self) -> bool {
        self.get(TCP_NODELAY) == Some("1")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_subscriber_requires_fields() {
        let mut header = ConnectionHeader::new();
        assert!(header.validate_subscriber().is_err());
        header.insert(TOPIC, "/t").insert(TYPE, "*").insert(MD5SUM, "*");
        assert!(header.validate_subscriber().is_ok());
    }

    #[test]
    fn truncated_inner_record_is_an_error() {
        let mut bytes = BytesMut::new();
        bytes.put_u32_le(10);
        bytes.extend_from_slice(b"short");
        assert!(matches!(ConnectionHeader::decode(&bytes), Err(Error::Truncated)));
    }
}
