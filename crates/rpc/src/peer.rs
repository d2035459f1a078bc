//! Peer (slave-to-slave) client: `requestTopic`, negotiating a streaming or
//! datagram transport descriptor with a publisher's own slave API.

use crate::value::{Value, encode_call, parse_response};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;

#[derive(Debug)]
pub enum PeerError {
    Unreachable,
    Rejected { message: String },
    Aborted,
}

impl std::error::Error for PeerError {}

impl std::fmt::Display for PeerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unreachable => write!(f, "peer unreachable"),
            Self::Rejected { message } => write!(f, "peer rejected: {message}"),
            Self::Aborted => write!(f, "peer request aborted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicDescriptor {
    Stream { host: String, port: u16 },
    Dgram { host: String, port: u16, connection_id: u32, dgram_size: u32, header: Vec<u8> },
}

pub struct PeerClient {
    http: reqwest::Client,
}

impl Default for PeerClient {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerClient {
    pub fn new() -> Self {
        Self { http: reqwest::Client::new() }
    }

    /// `candidates` is the subscriber's transport preference list, e.g.
    /// `["TCPROS"]` or `["UDPROS", "TCPROS"]`. `dgram_self`, when present,
    /// is `(host, port, dgram_size)` for the subscriber's own datagram
    /// socket, carried along with a `UDPROS` candidate so the publisher
    /// knows where to send chunks. The publisher, not the subscriber, owns
    /// connection-id allocation (§4.11), so no id is offered here.
    pub async fn request_topic(
        &self,
        peer_uri: &str,
        caller_id: &str,
        topic: &str,
        candidates: &[&str],
        dgram_self: Option<(&str, u16, u32)>,
    ) -> Result<TopicDescriptor, PeerError> {
        let protocols = Value::Array(
            candidates
                .iter()
                .map(|name| {
                    if *name == "UDPROS" {
                        if let Some((host, port, dgram_size)) = dgram_self {
                            return Value::Array(vec![
                                Value::Str("UDPROS".into()),
                                Value::Str(host.to_string()),
                                Value::Int(port as i32),
                                Value::Int(dgram_size as i32),
                            ]);
                        }
                    }
                    Value::Array(vec![Value::Str((*name).to_string())])
                })
                .collect(),
        );
        let body = encode_call("requestTopic", &[Value::Str(caller_id.into()), Value::Str(topic.into()), protocols]);

        let response = self
            .http
            .post(peer_uri)
            .body(body)
            .send()
            .await
            .map_err(|error| if error.is_connect() { PeerError::Unreachable } else { PeerError::Aborted })?;

        let text = response.text().await.map_err(|_| PeerError::Aborted)?;
        let value = parse_response(&text).map_err(|fault| PeerError::Rejected { message: fault.message })?;

        let mut triple = value.into_array().ok_or(PeerError::Aborted)?;
        if triple.len() != 3 {
            return Err(PeerError::Aborted);
        }
        let payload = triple.pop().unwrap();
        let message = triple.pop().unwrap().into_string().unwrap_or_default();
        let status = triple.pop().unwrap().into_int().ok_or(PeerError::Aborted)?;
        if status != 1 {
            return Err(PeerError::Rejected { message });
        }

        let mut fields = payload.into_array().ok_or(PeerError::Aborted)?;
        if fields.is_empty() {
            return Err(PeerError::Aborted);
        }
        let protocol = fields.remove(0).into_string().unwrap_or_default();

        match protocol.as_str() {
            // [TCPROS, host, port]
            "TCPROS" => {
                if fields.len() != 2 {
                    return Err(PeerError::Aborted);
                }
                let port = fields.pop().and_then(Value::into_int).ok_or(PeerError::Aborted)? as u16;
                let host = fields.pop().and_then(Value::into_string).ok_or(PeerError::Aborted)?;
                Ok(TopicDescriptor::Stream { host, port })
            }
            // [UDPROS, host, port, connection_id, dgram_size, header_base64]
            "UDPROS" => {
                if fields.len() != 5 {
                    return Err(PeerError::Aborted);
                }
                let mut fields = fields.into_iter();
                let host = fields.next().and_then(Value::into_string).ok_or(PeerError::Aborted)?;
                let port = fields.next().and_then(Value::into_int).ok_or(PeerError::Aborted)? as u16;
                let connection_id = fields.next().and_then(Value::into_int).ok_or(PeerError::Aborted)? as u32;
                let dgram_size = fields.next().and_then(Value::into_int).ok_or(PeerError::Aborted)? as u32;
                let header_b64 = fields.next().and_then(Value::into_string).ok_or(PeerError::Aborted)?;
                let header = BASE64.decode(header_b64.as_bytes()).map_err(|_| PeerError::Aborted)?;
                Ok(TopicDescriptor::Dgram { host, port, connection_id, dgram_size, header })
            }
            _ => Err(PeerError::Aborted),
        }
    }
}
