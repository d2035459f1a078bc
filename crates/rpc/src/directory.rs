//! Directory client: one method per directory RPC, normalizing the
//! `[status, message, payload]` triple, retried on connection-refused with
//! exponential backoff starting at 100ms and bounded by a caller-supplied
//! `max_attempts` (`None` = unlimited).

use crate::error::RpcError;
use crate::value::{Value, encode_call, parse_response};
use std::time::Duration;

#[derive(Debug)]
pub enum DirectoryError {
    Transport(RpcError),
    /// `status != 1` in the `[status, message, payload]` triple.
    Application { code: i32, message: String },
}

impl std::error::Error for DirectoryError {}

impl std::fmt::Display for DirectoryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Transport(error) => write!(f, "{error}"),
            Self::Application { code, message } => write!(f, "directory error {code}: {message}"),
        }
    }
}

fn decode_triple(value: Value) -> Result<Value, DirectoryError> {
    let mut items = value.into_array().ok_or_else(|| DirectoryError::Application {
        code: -1,
        message: "malformed response: expected [status, message, payload]".into(),
    })?;
    if items.len() != 3 {
        return Err(DirectoryError::Application {
            code: -1,
            message: "malformed response: expected a 3-element triple".into(),
        });
    }

    let payload = items.pop().unwrap();
    let message = items.pop().unwrap().into_string().unwrap_or_default();
    let status = items.pop().unwrap().into_int().ok_or_else(|| DirectoryError::Application {
        code: -1,
        message: "malformed response: status is not an int".into(),
    })?;

    if status == 1 {
        Ok(payload)
    } else {
        Err(DirectoryError::Application { code: status, message })
    }
}

fn string_list(value: Value) -> Result<Vec<String>, DirectoryError> {
    value
        .into_array()
        .ok_or_else(|| DirectoryError::Application { code: -1, message: "expected a list".into() })?
        .into_iter()
        .map(|item| {
            item.into_string()
                .ok_or_else(|| DirectoryError::Application { code: -1, message: "expected a string".into() })
        })
        .collect()
}

/// A `(name, type)` pair, as returned by `get_published_topics`/`get_topic_types`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedPair(pub String, pub String);

fn named_pairs(value: Value) -> Result<Vec<NamedPair>, DirectoryError> {
    value
        .into_array()
        .ok_or_else(|| DirectoryError::Application { code: -1, message: "expected a list".into() })?
        .into_iter()
        .map(|item| {
            let mut pair = item
                .into_array()
                .ok_or_else(|| DirectoryError::Application { code: -1, message: "expected a pair".into() })?;
            if pair.len() != 2 {
                return Err(DirectoryError::Application { code: -1, message: "expected a 2-element pair".into() });
            }
            let second = pair.pop().unwrap().into_string().unwrap_or_default();
            let first = pair.pop().unwrap().into_string().unwrap_or_default();
            Ok(NamedPair(first, second))
        })
        .collect()
}

/// Reshaped `getSystemState` response: for each of publishers, subscribers,
/// and services, a list of `(name, providing_nodes)` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemState {
    pub publishers: Vec<(String, Vec<String>)>,
    pub subscribers: Vec<(String, Vec<String>)>,
    pub services: Vec<(String, Vec<String>)>,
}

fn name_node_list(value: Value) -> Result<Vec<(String, Vec<String>)>, DirectoryError> {
    value
        .into_array()
        .ok_or_else(|| DirectoryError::Application { code: -1, message: "expected a list".into() })?
        .into_iter()
        .map(|entry| {
            let mut pair = entry
                .into_array()
                .ok_or_else(|| DirectoryError::Application { code: -1, message: "expected an entry".into() })?;
            if pair.len() != 2 {
                return Err(DirectoryError::Application { code: -1, message: "expected a 2-element entry".into() });
            }
            let nodes = string_list(pair.pop().unwrap())?;
            let name = pair.pop().unwrap().into_string().unwrap_or_default();
            Ok((name, nodes))
        })
        .collect()
}

#[derive(Clone)]
pub struct DirectoryClient {
    base_uri: String,
    http: reqwest::Client,
}

impl DirectoryClient {
    pub fn new(base_uri: impl Into<String>) -> Self {
        Self { base_uri: base_uri.into(), http: reqwest::Client::new() }
    }

    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    async fn call(&self, method: &str, params: &[Value], max_attempts: Option<u32>) -> Result<Value, RpcError> {
        let body = encode_call(method, params);
        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(100);

        loop {
            attempt += 1;
            match self.http.post(&self.base_uri).body(body.clone()).send().await {
                Ok(response) => {
                    let text = response.text().await.map_err(RpcError::from)?;
                    return parse_response(&text).map_err(RpcError::from);
                }
                Err(error) => {
                    let error = RpcError::from(error);
                    let retriable = matches!(error, RpcError::ConnectionRefused)
                        && max_attempts.is_none_or(|max| attempt < max);
                    if !retriable {
                        return Err(error);
                    }
                    log::warn!("directory rpc {method} connection refused, retrying in {backoff:?}");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
            }
        }
    }

    async fn call_triple(&self, method: &str, params: &[Value], max_attempts: Option<u32>) -> Result<Value, DirectoryError> {
        let value = self.call(method, params, max_attempts).await.map_err(DirectoryError::Transport)?;
        decode_triple(value)
    }

    pub async fn register_publisher(
        &self,
        caller_id: &str,
        topic: &str,
        topic_type: &str,
        caller_api: &str,
        max_attempts: Option<u32>,
    ) -> Result<Vec<String>, DirectoryError> {
        let params = [
            Value::Str(caller_id.into()),
            Value::Str(topic.into()),
            Value::Str(topic_type.into()),
            Value::Str(caller_api.into()),
        ];
        string_list(self.call_triple("registerPublisher", &params, max_attempts).await?)
    }

    pub async fn unregister_publisher(
        &self,
        caller_id: &str,
        topic: &str,
        caller_api: &str,
        max_attempts: Option<u32>,
    ) -> Result<(), DirectoryError> {
        let params = [Value::Str(caller_id.into()), Value::Str(topic.into()), Value::Str(caller_api.into())];
        self.call_triple("unregisterPublisher", &params, max_attempts).await?;
        Ok(())
    }

    pub async fn register_subscriber(
        &self,
        caller_id: &str,
        topic: &str,
        topic_type: &str,
        caller_api: &str,
        max_attempts: Option<u32>,
    ) -> Result<Vec<String>, DirectoryError> {
        let params = [
            Value::Str(caller_id.into()),
            Value::Str(topic.into()),
            Value::Str(topic_type.into()),
            Value::Str(caller_api.into()),
        ];
        string_list(self.call_triple("registerSubscriber", &params, max_attempts).await?)
    }

    pub async fn unregister_subscriber(
        &self,
        caller_id: &str,
        topic: &str,
        caller_api: &str,
        max_attempts: Option<u32>,
    ) -> Result<(), DirectoryError> {
        let params = [Value::Str(caller_id.into()), Value::Str(topic.into()), Value::Str(caller_api.into())];
        self.call_triple("unregisterSubscriber", &params, max_attempts).await?;
        Ok(())
    }

    pub async fn register_service(
        &self,
        caller_id: &str,
        service: &str,
        service_api: &str,
        caller_api: &str,
        max_attempts: Option<u32>,
    ) -> Result<(), DirectoryError> {
        let params = [
            Value::Str(caller_id.into()),
            Value::Str(service.into()),
            Value::Str(service_api.into()),
            Value::Str(caller_api.into()),
        ];
        self.call_triple("registerService", &params, max_attempts).await?;
        Ok(())
    }

    pub async fn unregister_service(
        &self,
        caller_id: &str,
        service: &str,
        service_api: &str,
        max_attempts: Option<u32>,
    ) -> Result<(), DirectoryError> {
        let params = [Value::Str(caller_id.into()), Value::Str(service.into()), Value::Str(service_api.into())];
        self.call_triple("unregisterService", &params, max_attempts).await?;
        Ok(())
    }

    pub async fn lookup_node(&self, caller_id: &str, node_name: &str, max_attempts: Option<u32>) -> Result<String, DirectoryError> {
        let params = [Value::Str(caller_id.into()), Value::Str(node_name.into())];
        self.call_triple("lookupNode", &params, max_attempts)
            .await?
            .into_string()
            .ok_or_else(|| DirectoryError::Application { code: -1, message: "expected a uri".into() })
    }

    pub async fn lookup_service(&self, caller_id: &str, service: &str, max_attempts: Option<u32>) -> Result<String, DirectoryError> {
        let params = [Value::Str(caller_id.into()), Value::Str(service.into())];
        self.call_triple("lookupService", &params, max_attempts)
            .await?
            .into_string()
            .ok_or_else(|| DirectoryError::Application { code: -1, message: "expected a uri".into() })
    }

    pub async fn get_uri(&self, caller_id: &str, max_attempts: Option<u32>) -> Result<String, DirectoryError> {
        let params = [Value::Str(caller_id.into())];
        self.call_triple("getUri", &params, max_attempts)
            .await?
            .into_string()
            .ok_or_else(|| DirectoryError::Application { code: -1, message: "expected a uri".into() })
    }

    pub async fn get_published_topics(
        &self,
        caller_id: &str,
        subgraph: &str,
        max_attempts: Option<u32>,
    ) -> Result<Vec<NamedPair>, DirectoryError> {
        let params = [Value::Str(caller_id.into()), Value::Str(subgraph.into())];
        named_pairs(self.call_triple("getPublishedTopics", &params, max_attempts).await?)
    }

    pub async fn get_topic_types(&self, caller_id: &str, max_attempts: Option<u32>) -> Result<Vec<NamedPair>, DirectoryError> {
        let params = [Value::Str(caller_id.into())];
        named_pairs(self.call_triple("getTopicTypes", &params, max_attempts).await?)
    }

    pub async fn get_system_state(&self, caller_id: &str, max_attempts: Option<u32>) -> Result<SystemState, DirectoryError> {
        let params = [Value::Str(caller_id.into())];
        let mut rows = self
            .call_triple("getSystemState", &params, max_attempts)
            .await?
            .into_array()
            .ok_or_else(|| DirectoryError::Application { code: -1, message: "expected a triple of lists".into() })?;
        if rows.len() != 3 {
            return Err(DirectoryError::Application { code: -1, message: "expected 3 system-state sections".into() });
        }
        let services = name_node_list(rows.pop().unwrap())?;
        let subscribers = name_node_list(rows.pop().unwrap())?;
        let publishers = name_node_list(rows.pop().unwrap())?;
        Ok(SystemState { publishers, subscribers, services })
    }

    pub async fn set_param(&self, caller_id: &str, key: &str, value: &str, max_attempts: Option<u32>) -> Result<(), DirectoryError> {
        let params = [Value::Str(caller_id.into()), Value::Str(key.into()), Value::Str(value.into())];
        self.call_triple("setParam", &params, max_attempts).await?;
        Ok(())
    }

    pub async fn get_param(&self, caller_id: &str, key: &str, max_attempts: Option<u32>) -> Result<Value, DirectoryError> {
        let params = [Value::Str(caller_id.into()), Value::Str(key.into())];
        self.call_triple("getParam", &params, max_attempts).await
    }

    pub async fn has_param(&self, caller_id: &str, key: &str, max_attempts: Option<u32>) -> Result<bool, DirectoryError> {
        let params = [Value::Str(caller_id.into()), Value::Str(key.into())];
        Ok(matches!(self.call_triple("hasParam", &params, max_attempts).await?, Value::Bool(true)))
    }

    pub async fn delete_param(&self, caller_id: &str, key: &str, max_attempts: Option<u32>) -> Result<(), DirectoryError> {
        let params = [Value::Str(caller_id.into()), Value::Str(key.into())];
        self.call_triple("deleteParam", &params, max_attempts).await?;
        Ok(())
    }

    pub async fn get_param_names(&self, caller_id: &str, max_attempts: Option<u32>) -> Result<Vec<String>, DirectoryError> {
        let params = [Value::Str(caller_id.into())];
        string_list(self.call_triple("getParamNames", &params, max_attempts).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_triple_rejects_non_triple() {
        let err = decode_triple(Value::Array(vec![Value::Int(1)])).unwrap_err();
        assert!(matches!(err, DirectoryError::Application { .. }));
    }

    #[test]
    fn decode_triple_success_returns_payload() {
        let value = Value::Array(vec![Value::Int(1), Value::Str("ok".into()), Value::Str("payload".into())]);
        assert_eq!(decode_triple(value).unwrap(), Value::Str("payload".into()));
    }

    #[test]
    fn decode_triple_failure_status_surfaces_application_error() {
        let value = Value::Array(vec![Value::Int(0), Value::Str("nope".into()), Value::Str(String::new())]);
        match decode_triple(value) {
            Err(DirectoryError::Application { code, message }) => {
                assert_eq!(code, 0);
                assert_eq!(message, "nope");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
