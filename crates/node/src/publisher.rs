//! Publisher endpoint (C7). Non-generic state lives in `PublisherInner` so
//! the node runtime can hold one endpoint type regardless of message type;
//! `Publisher<M>` is the thin, message-typed handle a caller actually
//! constructs and calls `publish` on.

use crate::endpoint::{Lifecycle, PeerIdGen};
use crate::error::NodeError;
use crate::message::RosMessage;
use crate::spinner::{ClientId, Spinner};
use bytes::Bytes;
use rpc::DirectoryClient;
use wire::{ConnectionHeader, datagram, framing, header};
use ahash::{HashMap, HashMapExt};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::net::UdpSocket;
use tokio::net::tcp::OwnedWriteHalf;

struct DgramPeer {
    addr: SocketAddr,
    dgram_size: usize,
}

struct State {
    lifecycle: Lifecycle,
    refcount: usize,
    last_message: Option<Bytes>,
    stream_peers: HashMap<u64, OwnedWriteHalf>,
    dgram_peers: HashMap<u32, DgramPeer>,
    message_id: u8,
}

/// The network- and lifecycle-facing half of a publisher, with no
/// knowledge of the concrete message type it is carrying.
pub struct PublisherInner {
    pub topic: String,
    pub type_name: String,
    pub md5sum: String,
    pub latching: bool,
    pub tcp_nodelay: bool,
    queue_capacity: usize,
    throttle_ms: i64,
    caller_id: String,
    caller_api: String,
    spinner: Arc<Spinner>,
    spinner_client: ClientId,
    dgram_socket: Option<Arc<UdpSocket>>,
    peer_ids: PeerIdGen,
    state: Mutex<State>,
}

impl PublisherInner {
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn register(
        directory: &DirectoryClient,
        spinner: Arc<Spinner>,
        dgram_socket: Option<Arc<UdpSocket>>,
        topic: String,
        type_name: String,
        md5sum: String,
        latching: bool,
        tcp_nodelay: bool,
        queue_capacity: usize,
        throttle_ms: i64,
        caller_id: String,
        caller_api: String,
    ) -> Result<Arc<Self>, NodeError> {
        let spinner_client = spinner.add_client(queue_capacity, throttle_ms);

        let inner = Arc::new(Self {
            topic: topic.clone(),
            type_name: type_name.clone(),
            md5sum,
            latching,
            tcp_nodelay,
            queue_capacity,
            throttle_ms,
            caller_id: caller_id.clone(),
            caller_api: caller_api.clone(),
            spinner,
            spinner_client,
            dgram_socket,
            peer_ids: PeerIdGen::default(),
            state: Mutex::new(State {
                lifecycle: Lifecycle::Registering,
                refcount: 0,
                last_message: None,
                stream_peers: HashMap::new(),
                dgram_peers: HashMap::new(),
                message_id: 0,
            }),
        });

        directory.register_publisher(&caller_id, &topic, &type_name, &caller_api, None).await?;
        inner.state.lock().lifecycle = Lifecycle::Registered;
        log::info!("publisher {topic} ({type_name}) registered");
        Ok(inner)
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().lifecycle.is_shutdown()
    }

    pub fn incref(&self) {
        self.state.lock().refcount += 1;
    }

    /// Returns the refcount after decrementing.
    pub fn decref(&self) -> usize {
        let mut state = self.state.lock();
        state.refcount = state.refcount.saturating_sub(1);
        state.refcount
    }

    /// Number of queued-but-undrained messages and connected peer count, as
    /// reported through the slave API's `getBusInfo`.
    pub fn bus_info(&self) -> (usize, i64, usize) {
        let state = self.state.lock();
        (self.queue_capacity, self.throttle_ms, state.stream_peers.len() + state.dgram_peers.len())
    }

    /// Validates an inbound subscriber header, writes the publisher's own
    /// response header, and registers the stream for future publishes.
    /// Replays the latched message, if any, to this peer only.
    pub async fn handle_streaming_peer(self: &Arc<Self>, mut stream: TcpStream, peer_header: ConnectionHeader) -> Result<(), NodeError> {
        if self.is_shutdown() {
            return Err(NodeError::Shutdown);
        }

        peer_header.validate_subscriber().map_err(|e| NodeError::InvalidHeader(e.to_string()))?;
        if !peer_header.type_matches(&self.type_name) {
            return Err(NodeError::TypeMismatch { expected: self.type_name.clone(), actual: peer_header.get(header::TYPE).unwrap_or_default().to_string() });
        }
        if !peer_header.md5sum_matches(&self.md5sum) {
            return Err(NodeError::Md5Mismatch);
        }

        let response = self.connection_header();

        if self.tcp_nodelay {
            stream.set_nodelay(true)?;
        }

        stream.write_all(&framing::encode_message(&response.encode())).await?;

        if self.latching {
            let last_message = self.state.lock().last_message.clone();
            if let Some(message) = last_message {
                stream.write_all(&framing::encode_message(&message)).await?;
            }
        }

        let id = self.peer_ids.next();
        let (mut read, write) = stream.into_split();
        self.state.lock().stream_peers.insert(id, write);

        let inner = self.clone();
        tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut buf = [0u8; 64];
            loop {
                match read.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => continue,
                }
            }
            inner.state.lock().stream_peers.remove(&id);
        });

        log::debug!("publisher {} accepted a streaming peer", self.topic);
        Ok(())
    }

    /// Builds the response header this publisher sends to any subscriber,
    /// streaming or datagram: `callerid`/`topic`/`type`/`md5sum`/`latching`.
    pub fn connection_header(&self) -> ConnectionHeader {
        let mut response = ConnectionHeader::new();
        response
            .insert(header::CALLER_ID, &self.caller_id)
            .insert(header::TOPIC, &self.topic)
            .insert(header::TYPE, &self.type_name)
            .insert(header::MD5SUM, &self.md5sum)
            .insert(header::LATCHING, if self.latching { "1" } else { "0" });
        response
    }

    /// Registers a datagram subscriber by connection id; `dgram_size` is
    /// what the peer negotiated via `requestTopic`.
    pub fn add_datagram_peer(&self, connection_id: u32, addr: SocketAddr, dgram_size: usize) {
        self.state.lock().dgram_peers.insert(connection_id, DgramPeer { addr, dgram_size });
    }

    pub fn remove_datagram_peer(&self, connection_id: u32) {
        self.state.lock().dgram_peers.remove(&connection_id);
    }

    /// Publishes a serialized message. Latched last-message tracking
    /// happens immediately so a subscriber joining mid-backlog still gets
    /// the true latest value; the actual writes are throttled through the
    /// spinner.
    pub async fn publish_bytes(self: &Arc<Self>, payload: Bytes) -> Result<(), NodeError> {
        if self.is_shutdown() {
            return Err(NodeError::Shutdown);
        }

        if self.latching {
            self.state.lock().last_message = Some(payload.clone());
        }

        let inner = self.clone();
        let work: crate::spinner::SpinnerFuture = Box::pin(async move {
            inner.drain_one(payload).await;
        });
        self.spinner.ping(self.spinner_client, work).await;
        Ok(())
    }

    async fn drain_one(self: Arc<Self>, payload: Bytes) {
        log::debug!("publisher {} draining {} bytes", self.topic, payload.len());
        let framed = framing::encode_message(&payload);

        let peer_ids: Vec<u64> = { self.state.lock().stream_peers.keys().copied().collect() };
        for id in peer_ids {
            let taken = self.state.lock().stream_peers.remove(&id);
            if let Some(mut writer) = taken {
                if writer.write_all(&framed).await.is_ok() {
                    self.state.lock().stream_peers.insert(id, writer);
                }
            }
        }

        let (message_id, dgram_targets): (u8, Vec<(u32, SocketAddr, usize)>) = {
            let mut state = self.state.lock();
            let id = state.message_id;
            state.message_id = state.message_id.wrapping_add(1);
            (id, state.dgram_peers.iter().map(|(cid, peer)| (*cid, peer.addr, peer.dgram_size)).collect())
        };

        if let Some(socket) = &self.dgram_socket {
            for (connection_id, addr, dgram_size) in dgram_targets {
                for block in datagram::chunk_message(connection_id, message_id, dgram_size, &payload) {
                    let _ = socket.send_to(&block, addr).await;
                }
            }
        }

        log::trace!("publisher {} drained one message ({} bytes)", self.topic, payload.len());
    }

    /// Closes every peer socket exactly once and unregisters from the
    /// directory with `max_attempts = 1` (a best-effort notification; the
    /// endpoint is considered gone locally regardless of the outcome).
    pub async fn shutdown(&self, directory: &DirectoryClient) {
        let already_shutdown = {
            let mut state = self.state.lock();
            if state.lifecycle.is_shutdown() {
                true
            } else {
                state.lifecycle = Lifecycle::Shutdown;
                state.stream_peers.clear();
                state.dgram_peers.clear();
                false
            }
        };
        if already_shutdown {
            return;
        }

        self.spinner.disconnect(self.spinner_client);
        let _ = directory.unregister_publisher(&self.caller_id, &self.topic, &self.caller_api, Some(1)).await;
        log::info!("publisher {} shut down", self.topic);
    }
}

/// A message-typed handle over a publisher endpoint.
#[derive(Clone)]
pub struct Publisher<M: RosMessage> {
    pub(crate) inner: Arc<PublisherInner>,
    _handle: Option<Arc<crate::handle::RefHandle>>,
    _marker: PhantomData<M>,
}

impl<M: RosMessage> Publisher<M> {
    #[allow(clippy::too_many_arguments)]
    pub async fn register(
        directory: &DirectoryClient,
        spinner: Arc<Spinner>,
        dgram_socket: Option<Arc<UdpSocket>>,
        topic: String,
        latching: bool,
        tcp_nodelay: bool,
        queue_capacity: usize,
        throttle_ms: i64,
        caller_id: String,
        caller_api: String,
    ) -> Result<Self, NodeError> {
        let inner = PublisherInner::register(
            directory,
            spinner,
            dgram_socket,
            topic,
            M::message_type().to_string(),
            M::md5sum().to_string(),
            latching,
            tcp_nodelay,
            queue_capacity,
            throttle_ms,
            caller_id,
            caller_api,
        )
        .await?;
        Ok(Self { inner, _handle: None, _marker: PhantomData })
    }

    pub(crate) fn from_inner(inner: Arc<PublisherInner>) -> Self {
        Self { inner, _handle: None, _marker: PhantomData }
    }

    pub(crate) fn attach_handle(mut self, handle: crate::handle::RefHandle) -> Self {
        self._handle = Some(Arc::new(handle));
        self
    }

    pub async fn publish(&self, message: &M) -> Result<(), NodeError> {
        let mut buf = Vec::new();
        message.encode(&mut buf);
        self.inner.publish_bytes(Bytes::from(buf)).await
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::testing::Int8;

    #[tokio::test]
    async fn publish_before_any_peers_is_a_no_op_that_still_updates_latching() {
        let spinner = Arc::new(Spinner::new());
        let inner = Arc::new(PublisherInner {
            topic: "/t".into(),
            type_name: Int8::message_type().into(),
            md5sum: Int8::md5sum().into(),
            latching: true,
            tcp_nodelay: false,
            queue_capacity: 3,
            throttle_ms: 0,
            caller_id: "/node".into(),
            caller_api: "http://127.0.0.1:0/".into(),
            spinner_client: spinner.add_client(3, 0),
            spinner: spinner.clone(),
            dgram_socket: None,
            peer_ids: PeerIdGen::default(),
            state: Mutex::new(State {
                lifecycle: Lifecycle::Registered,
                refcount: 1,
                last_message: None,
                stream_peers: HashMap::new(),
                dgram_peers: HashMap::new(),
                message_id: 0,
            }),
        });

        let publisher = Publisher::<Int8>::from_inner(inner.clone());
        publisher.publish(&Int8(7)).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(inner.state.lock().last_message.as_deref(), Some(&[7u8][..]));
    }
}
