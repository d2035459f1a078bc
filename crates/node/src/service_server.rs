//! Service server endpoint (C9). Shares the node's streaming listener: a
//! header carrying a `service` key routes here instead of to a publisher.
//! The user's typed callback is boxed into a byte-to-byte closure so the
//! server's own state stays non-generic, the same trick `Publisher`/
//! `Subscriber` use for their inner state.

use crate::endpoint::Lifecycle;
use crate::error::NodeError;
use crate::message::{RosMessage, RosService};
use bytes::Bytes;
use rpc::DirectoryClient;
use wire::{ConnectionHeader, framing, header};
use parking_lot::Mutex;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

type Callback = Arc<dyn Fn(Bytes) -> Pin<Box<dyn Future<Output = Result<Bytes, String>> + Send>> + Send + Sync>;

struct State {
    lifecycle: Lifecycle,
    refcount: usize,
}

pub struct ServiceServer {
    pub service: String,
    pub type_name: String,
    pub md5sum: String,
    caller_id: String,
    service_api: String,
    callback: Callback,
    state: Mutex<State>,
}

impl ServiceServer {
    pub async fn register<S, F, Fut>(
        directory: &DirectoryClient,
        service: String,
        caller_id: String,
        caller_api: String,
        service_api: String,
        handler: F,
    ) -> Result<Arc<Self>, NodeError>
    where
        S: RosService,
        F: Fn(S::Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S::Response, String>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let callback: Callback = Arc::new(move |bytes| {
            let handler = handler.clone();
            Box::pin(async move {
                let request = S::Request::decode(&bytes).map_err(|e| e.to_string())?;
                let response = handler(request).await?;
                let mut buf = Vec::new();
                response.encode(&mut buf);
                Ok(Bytes::from(buf))
            })
        });

        let server = Arc::new(Self {
            service: service.clone(),
            type_name: S::service_type().to_string(),
            md5sum: S::md5sum().to_string(),
            caller_id: caller_id.clone(),
            service_api: service_api.clone(),
            callback,
            state: Mutex::new(State { lifecycle: Lifecycle::Registering, refcount: 0 }),
        });

        directory.register_service(&caller_id, &service, &service_api, &caller_api, None).await?;
        server.state.lock().lifecycle = Lifecycle::Registered;
        log::info!("service {service} registered");
        Ok(server)
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().lifecycle.is_shutdown()
    }

    pub fn incref(&self) {
        self.state.lock().refcount += 1;
    }

    pub fn decref(&self) -> usize {
        let mut state = self.state.lock();
        state.refcount = state.refcount.saturating_sub(1);
        state.refcount
    }

    /// Validates the client header, handles exactly one request, and
    /// closes the connection unless the client asked to stay persistent.
    pub async fn handle_streaming_peer(self: &Arc<Self>, mut stream: TcpStream, peer_header: ConnectionHeader) -> Result<(), NodeError> {
        if self.is_shutdown() {
            return Err(NodeError::Shutdown);
        }

        peer_header.validate_service_client().map_err(|e| NodeError::InvalidHeader(e.to_string()))?;
        if !peer_header.md5sum_matches(&self.md5sum) {
            return Err(NodeError::Md5Mismatch);
        }

        let mut response = ConnectionHeader::new();
        response.insert(header::CALLER_ID, &self.caller_id).insert(header::MD5SUM, &self.md5sum);
        stream.write_all(&framing::encode_message(&response.encode())).await?;

        let persistent = peer_header.is_persistent();
        let mut deframer = wire::Deframer::new();
        let mut buf = [0u8; 4096];

        loop {
            if self.is_shutdown() {
                return Ok(());
            }

            let request = loop {
                let n = match tokio::io::AsyncReadExt::read(&mut stream, &mut buf).await {
                    Ok(0) | Err(_) => return Ok(()),
                    Ok(n) => n,
                };
                deframer.push(&buf[..n]);
                let frames = deframer.poll().map_err(NodeError::from)?;
                if let Some(wire::Frame::Record(bytes)) = frames.into_iter().next() {
                    break bytes;
                }
            };

            let outcome = (self.callback)(request).await;
            let framed = match outcome {
                Ok(payload) => framing::encode_service_success(&payload),
                Err(message) => framing::encode_service_failure(&message),
            };
            stream.write_all(&framed).await?;

            if !persistent {
                return Ok(());
            }
        }
    }

    pub async fn shutdown(&self, directory: &DirectoryClient) {
        let already_shutdown = {
            let mut state = self.state.lock();
            if state.lifecycle.is_shutdown() {
                true
            } else {
                state.lifecycle = Lifecycle::Shutdown;
                false
            }
        };
        if already_shutdown {
            return;
        }

        let _ = directory.unregister_service(&self.caller_id, &self.service, &self.service_api, Some(1)).await;
        log::info!("service {} shut down", self.service);
    }
}

/// A message-typed, refcounted handle over a service server endpoint.
pub struct Service<S: RosService> {
    pub(crate) inner: Arc<ServiceServer>,
    _handle: Option<crate::handle::RefHandle>,
    _marker: PhantomData<S>,
}

impl<S: RosService> Service<S> {
    pub(crate) fn from_inner(inner: Arc<ServiceServer>) -> Self {
        Self { inner, _handle: None, _marker: PhantomData }
    }

    pub(crate) fn attach_handle(mut self, handle: crate::handle::RefHandle) -> Self {
        self._handle = Some(handle);
        self
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    pub async fn shutdown(&self, directory: &DirectoryClient) {
        self.inner.shutdown(directory).await;
    }
}
