//! Service client endpoint (C10). `call` normalizes, serializes, and waits
//! for exactly one response; calls queue with `max_queue_length` bound
//! (`-1` = unbounded) and overflow rejects the OLDEST pending entry with
//! `QueueFull`.

use crate::endpoint::Lifecycle;
use crate::error::NodeError;
use crate::message::{RosMessage, RosService};
use bytes::Bytes;
use rpc::DirectoryClient;
use wire::{ConnectionHeader, Deframer, Frame, Mode, framing, header};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::oneshot;

struct PendingCall {
    request: Bytes,
    completer: oneshot::Sender<Result<Bytes, NodeError>>,
}

struct State {
    lifecycle: Lifecycle,
    refcount: usize,
    socket: Option<(TcpStream, Deframer)>,
    in_flight: bool,
    queue: VecDeque<PendingCall>,
}

pub struct ServiceClientInner {
    pub service: String,
    pub md5sum: String,
    persistent: bool,
    max_queue_length: i64,
    caller_id: String,
    directory: DirectoryClient,
    state: Mutex<State>,
}

impl ServiceClientInner {
    pub fn new(
        directory: DirectoryClient,
        service: String,
        md5sum: String,
        persistent: bool,
        max_queue_length: i64,
        caller_id: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            service,
            md5sum,
            persistent,
            max_queue_length,
            caller_id,
            directory,
            state: Mutex::new(State { lifecycle: Lifecycle::Registered, refcount: 0, socket: None, in_flight: false, queue: VecDeque::new() }),
        })
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

    /// Enqueues a serialized request and returns its response bytes once
    /// the queue reaches the front and the exchange completes.
    pub async fn call_bytes(self: &Arc<Self>, request: Bytes) -> Result<Bytes, NodeError> {
        if self.is_shutdown() {
            return Err(NodeError::Shutdown);
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock();
            if self.max_queue_length >= 0 && state.queue.len() >= self.max_queue_length as usize {
                if let Some(evicted) = state.queue.pop_front() {
                    let _ = evicted.completer.send(Err(NodeError::QueueFull));
                }
            }
            state.queue.push_back(PendingCall { request, completer: tx });
        }

        self.clone().drive();
        rx.await.map_err(|_| NodeError::Shutdown)?
    }

    fn drive(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                let next = {
                    let mut state = self.state.lock();
                    if state.in_flight || state.queue.is_empty() {
                        return;
                    }
                    state.in_flight = true;
                    state.queue.pop_front()
                };

                let Some(call) = next else { return };
                let result = self.exchange(call.request).await;
                let _ = call.completer.send(result);
                self.state.lock().in_flight = false;
            }
        });
    }

    async fn exchange(&self, request: Bytes) -> Result<Bytes, NodeError> {
        let needs_connect = self.state.lock().socket.is_none();
        if needs_connect {
            self.connect().await?;
        }

        // Take the connection out of the lock for the actual I/O, then put
        // it back afterward; we never hold the lock across an await.
        let Some((mut stream, mut deframer)) = self.state.lock().socket.take() else {
            return Err(NodeError::Aborted);
        };

        let result = async {
            stream.write_all(&framing::encode_message(&request)).await?;

            let mut buf = [0u8; 4096];
            loop {
                let frames = deframer.poll().map_err(NodeError::from)?;
                for frame in frames {
                    if let Frame::ServiceResponse { success, payload } = frame {
                        return if success { Ok(payload) } else {
                            let message = std::str::from_utf8(&payload).unwrap_or_default().to_string();
                            Err(NodeError::ServiceFailed { message })
                        };
                    }
                }
                let n = stream.read(&mut buf).await?;
                if n == 0 {
                    return Err(NodeError::Aborted);
                }
                deframer.push(&buf[..n]);
            }
        }
        .await;

        if self.persistent && result.is_ok() {
            self.state.lock().socket = Some((stream, deframer));
        }

        result
    }

    async fn connect(&self) -> Result<(), NodeError> {
        let uri = self.lookup_uri().await?;
        let (host, port) = parse_host_port(&uri)?;
        let mut stream = TcpStream::connect((host.as_str(), port)).await?;

        let mut request = ConnectionHeader::new();
        request.insert(header::CALLER_ID, &self.caller_id).insert(header::SERVICE, &self.service).insert(header::MD5SUM, &self.md5sum);
        if self.persistent {
            request.insert(header::PERSISTENT, "1");
        }
        stream.write_all(&framing::encode_message(&request.encode())).await?;

        let mut deframer = Deframer::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Err(NodeError::PeerUnreachable);
            }
            deframer.push(&buf[..n]);
            if let Some(Frame::Record(_)) = deframer.poll().map_err(NodeError::from)?.into_iter().next() {
                break;
            }
        }

        deframer.set_mode(Mode::ServiceResponse);
        self.state.lock().socket = Some((stream, deframer));
        Ok(())
    }

    async fn lookup_uri(&self) -> Result<String, NodeError> {
        Ok(self.directory.lookup_service(&self.caller_id, &self.service, None).await?)
    }

    pub async fn shutdown(&self) {
        let mut state = self.state.lock();
        if state.lifecycle.is_shutdown() {
            return;
        }
        state.lifecycle = Lifecycle::Shutdown;
        state.socket = None;
        let pending: Vec<PendingCall> = state.queue.drain(..).collect();
        drop(state);
        for call in pending {
            let _ = call.completer.send(Err(NodeError::Shutdown));
        }
        log::info!("service client {} shut down", self.service);
    }
}

fn parse_host_port(uri: &str) -> Result<(String, u16), NodeError> {
    let stripped = uri.trim_start_matches("rosrpc://").trim_end_matches('/');
    let (host, port) = stripped.split_once(':').ok_or(NodeError::PeerUnreachable)?;
    let port: u16 = port.parse().map_err(|_| NodeError::PeerUnreachable)?;
    Ok((host.to_string(), port))
}

/// A message-typed handle over a service client endpoint.
pub struct ServiceClient<S: RosService> {
    pub(crate) inner: Arc<ServiceClientInner>,
    _handle: Option<crate::handle::RefHandle>,
    _marker: PhantomData<S>,
}

impl<S: RosService> ServiceClient<S> {
    /// Builds a client for `service`; the service URI is resolved lazily
    /// via `lookup_service` the first time a call needs a fresh socket.
    pub fn new(directory: DirectoryClient, service: String, persistent: bool, max_queue_length: i64, caller_id: String) -> Self {
        let inner = ServiceClientInner::new(directory, service, S::md5sum().to_string(), persistent, max_queue_length, caller_id);
        Self { inner, _handle: None, _marker: PhantomData }
    }

    pub(crate) fn from_inner(inner: Arc<ServiceClientInner>) -> Self {
        Self { inner, _handle: None, _marker: PhantomData }
    }

    pub(crate) fn attach_handle(mut self, handle: crate::handle::RefHandle) -> Self {
        self._handle = Some(handle);
        self
    }

    pub async fn call(&self, request: &S::Request) -> Result<S::Response, NodeError> {
        let mut buf = Vec::new();
        request.encode(&mut buf);
        let response = self.inner.call_bytes(Bytes::from(buf)).await?;
        S::Response::decode(&response).map_err(|e| NodeError::Serialization(e.to_string()))
    }

    pub async fn shutdown(&self) {
        self.inner.shutdown().await;
    }
}
