//! Subscriber endpoint (C8). Mirrors the publisher split: `SubscriberInner`
//! carries the network/lifecycle state and knows nothing about the
//! concrete message type; `Subscriber<M>` decodes delivered bytes into `M`
//! on the way out to the caller.

use crate::endpoint::{DgramSelf, Lifecycle, PeerIdGen};
use crate::error::NodeError;
use crate::message::RosMessage;
use crate::spinner::{ClientId, Spinner};
use bytes::Bytes;
use rpc::{DirectoryClient, PeerClient, TopicDescriptor};
use wire::{ConnectionHeader, Deframer, Frame, datagram::Reassembler, framing, header};
use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::broadcast;

/// Capacity of the post-drain delivery channel. Large relative to any
/// realistic spinner queue bound since it buffers messages the spinner has
/// already decided to deliver, waiting only on the caller's next `recv()`.
const DELIVERY_CHANNEL_CAPACITY: usize = 1024;

/// One delivered message: the raw bytes, their length, and the publisher
/// URI they came from.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub bytes: Bytes,
    pub byte_length: usize,
    pub origin_uri: String,
}

struct PendingPeer {
    #[allow(dead_code)]
    uri: String,
}

struct ValidatedPeer {
    uri: String,
    // Kept alive so the connection isn't torn down; subscribers don't write
    // after the handshake.
    #[allow(dead_code)]
    write: Option<OwnedWriteHalf>,
}

struct State {
    lifecycle: Lifecycle,
    refcount: usize,
    known_uris: HashSet<String>,
    pending: HashMap<u64, PendingPeer>,
    validated: HashMap<u64, ValidatedPeer>,
    reassembler: Reassembler,
    dgram_ids: HashMap<u64, u32>,
}

pub struct SubscriberInner {
    pub topic: String,
    pub type_name: String,
    pub md5sum: String,
    pub transports: Vec<&'static str>,
    pub dgram_size: u32,
    caller_id: String,
    caller_api: String,
    spinner: Arc<Spinner>,
    spinner_client: ClientId,
    dgram_self: Option<DgramSelf>,
    peer_ids: PeerIdGen,
    events: broadcast::Sender<Delivery>,
    state: Mutex<State>,
}

impl SubscriberInner {
    #[allow(clippy::too_many_arguments)]
    pub(crate) async fn register(
        directory: &DirectoryClient,
        spinner: Arc<Spinner>,
        dgram_self: Option<DgramSelf>,
        topic: String,
        type_name: String,
        md5sum: String,
        transports: Vec<&'static str>,
        dgram_size: u32,
        queue_capacity: usize,
        throttle_ms: i64,
        caller_id: String,
        caller_api: String,
    ) -> Result<Arc<Self>, NodeError> {
        let spinner_client = spinner.add_client(queue_capacity, throttle_ms);
        // The spinner already enforces the queue/throttle bound on *pending*
        // messages (§4.6); this channel is the post-drain handoff to the
        // user's `recv()` and must not re-impose that bound, or a message
        // the spinner already decided to deliver can still be lost before
        // the caller gets to read it.
        let (events, _) = broadcast::channel(DELIVERY_CHANNEL_CAPACITY);

        let inner = Arc::new(Self {
            topic: topic.clone(),
            type_name: type_name.clone(),
            md5sum,
            transports,
            dgram_size,
            caller_id: caller_id.clone(),
            caller_api: caller_api.clone(),
            spinner,
            spinner_client,
            dgram_self,
            peer_ids: PeerIdGen::default(),
            events,
            state: Mutex::new(State {
                lifecycle: Lifecycle::Registering,
                refcount: 0,
                known_uris: HashSet::new(),
                pending: HashMap::new(),
                validated: HashMap::new(),
                reassembler: Reassembler::new(),
                dgram_ids: HashMap::new(),
            }),
        });

        let publishers = directory.register_subscriber(&caller_id, &topic, &type_name, &caller_api, None).await?;
        inner.state.lock().lifecycle = Lifecycle::Registered;
        log::info!("subscriber {topic} ({type_name}) registered");

        if !publishers.is_empty() {
            inner.clone().handle_publisher_update(publishers, &PeerClient::new()).await;
        }

        Ok(inner)
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

    pub fn subscribe_events(&self) -> broadcast::Receiver<Delivery> {
        self.events.subscribe()
    }

    /// Connected peer count, as reported through the slave API's `getBusInfo`.
    pub fn connected_peer_count(&self) -> usize {
        self.state.lock().validated.len()
    }

    /// Diffs the publisher URI set: new URIs are requested, gone URIs are
    /// disconnected.
    pub async fn handle_publisher_update(self: Arc<Self>, uris: Vec<String>, peer_client: &PeerClient) {
        if self.is_shutdown() {
            return;
        }

        let (added, removed): (Vec<String>, Vec<String>) = {
            let mut state = self.state.lock();
            let new_set: HashSet<String> = uris.into_iter().collect();
            let added: Vec<String> = new_set.difference(&state.known_uris).cloned().collect();
            let removed: Vec<String> = state.known_uris.difference(&new_set).cloned().collect();
            state.known_uris = new_set;
            (added, removed)
        };

        for uri in removed {
            self.disconnect_uri(&uri);
        }

        for uri in added {
            let id = self.peer_ids.next();
            self.state.lock().pending.insert(id, PendingPeer { uri: uri.clone() });
            if let Err(error) = self.clone().request_topic(id, &uri, peer_client).await {
                log::warn!("subscriber {} failed to request topic from {uri}: {error}", self.topic);
                self.state.lock().pending.remove(&id);
            }
        }
    }

    async fn request_topic(self: Arc<Self>, id: u64, peer_uri: &str, peer_client: &PeerClient) -> Result<(), NodeError> {
        let dgram_request = self.dgram_self.as_ref().map(|d| (d.host.as_str(), d.port, self.dgram_size));

        let descriptor = peer_client.request_topic(peer_uri, &self.caller_id, &self.topic, &self.transports, dgram_request).await?;

        match descriptor {
            TopicDescriptor::Stream { host, port } => {
                let stream = TcpStream::connect((host.as_str(), port)).await?;
                self.accept_stream(id, peer_uri, stream).await
            }
            TopicDescriptor::Dgram { connection_id, header, .. } => {
                let response = ConnectionHeader::decode(&header).map_err(NodeError::from)?;
                if !response.type_matches(&self.type_name) {
                    return Err(NodeError::TypeMismatch {
                        expected: self.type_name.clone(),
                        actual: response.get(header::TYPE).unwrap_or_default().to_string(),
                    });
                }
                if !response.md5sum_matches(&self.md5sum) {
                    return Err(NodeError::Md5Mismatch);
                }

                let dgram_self = self.dgram_self.as_ref().ok_or(NodeError::PeerUnreachable)?;
                // The publisher, not us, assigned `connection_id` (§4.8); we
                // only ever register whatever id it handed back.
                dgram_self.register(connection_id, &self.topic);
                {
                    let mut state = self.state.lock();
                    state.pending.remove(&id);
                    state.dgram_ids.insert(id, connection_id);
                    state.validated.insert(id, ValidatedPeer { uri: peer_uri.to_string(), write: None });
                }
                log::debug!("subscriber {} accepted a datagram peer (connection {connection_id})", self.topic);
                Ok(())
            }
        }
    }

    async fn accept_stream(self: Arc<Self>, id: u64, peer_uri: &str, mut stream: TcpStream) -> Result<(), NodeError> {
        let mut request = ConnectionHeader::new();
        request
            .insert(header::CALLER_ID, &self.caller_id)
            .insert(header::TOPIC, &self.topic)
            .insert(header::TYPE, &self.type_name)
            .insert(header::MD5SUM, &self.md5sum);
        stream.write_all(&framing::encode_message(&request.encode())).await?;

        let mut deframer = Deframer::new();
        let mut buf = [0u8; 4096];
        // A publisher writes its response header and, for a latched topic,
        // the last message in the same flush; both can land in one read, so
        // any frames beyond the header found here must be replayed rather
        // than dropped.
        let (header_bytes, mut extra) = loop {
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Err(NodeError::PeerUnreachable);
            }
            deframer.push(&buf[..n]);
            let mut frames = deframer.poll().map_err(NodeError::from)?.into_iter();
            if let Some(Frame::Record(bytes)) = frames.next() {
                let rest: Vec<Bytes> = frames.filter_map(|f| match f { Frame::Record(b) => Some(b), _ => None }).collect();
                break (bytes, rest);
            }
        };

        let response = ConnectionHeader::decode(&header_bytes).map_err(NodeError::from)?;
        if !response.type_matches(&self.type_name) {
            return Err(NodeError::TypeMismatch {
                expected: self.type_name.clone(),
                actual: response.get(header::TYPE).unwrap_or_default().to_string(),
            });
        }
        if !response.md5sum_matches(&self.md5sum) {
            return Err(NodeError::Md5Mismatch);
        }

        {
            let mut state = self.state.lock();
            state.pending.remove(&id);
            let (read, write) = stream.into_split();
            state.validated.insert(id, ValidatedPeer { uri: peer_uri.to_string(), write: Some(write) });
            let mut leftover = deframer;
            let inner = self.clone();
            let origin_uri = peer_uri.to_string();
            tokio::spawn(async move {
                for bytes in extra.drain(..) {
                    inner.clone().dispatch(bytes, origin_uri.clone()).await;
                }
                inner.read_stream_peer(id, origin_uri, read, &mut leftover).await
            });
        }

        log::debug!("subscriber {} validated streaming peer {peer_uri}", self.topic);
        Ok(())
    }

    async fn read_stream_peer(self: Arc<Self>, id: u64, origin_uri: String, mut read: tokio::net::tcp::OwnedReadHalf, deframer: &mut Deframer) {
        let mut buf = [0u8; 4096];
        loop {
            for frame in deframer.poll().unwrap_or_default() {
                if let Frame::Record(bytes) = frame {
                    self.clone().dispatch(bytes, origin_uri.clone()).await;
                }
            }

            match read.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(n) => deframer.push(&buf[..n]),
            }
        }
        self.disconnect_id(id);
    }

    /// Feeds one decoded datagram packet into the reassembler; delivers the
    /// reassembled message once complete.
    pub async fn handle_message_chunk(self: &Arc<Self>, origin_uri: String, packet: wire::datagram::DatagramPacket) {
        let reassembled = { self.state.lock().reassembler.accept(packet) };
        if let Some(bytes) = reassembled {
            self.clone().dispatch(bytes, origin_uri).await;
        }
    }

    async fn dispatch(self: Arc<Self>, bytes: Bytes, origin_uri: String) {
        log::debug!("subscriber {} dispatch {} bytes", self.topic, bytes.len());
        let byte_length = bytes.len();
        let events = self.events.clone();
        let work: crate::spinner::SpinnerFuture = Box::pin(async move {
            let _ = events.send(Delivery { bytes, byte_length, origin_uri });
        });
        self.spinner.ping(self.spinner_client, work).await;
    }

    fn disconnect_uri(&self, uri: &str) {
        let ids: Vec<u64> = {
            let state = self.state.lock();
            state
                .pending
                .iter()
                .filter(|(_, p)| p.uri == uri)
                .map(|(id, _)| *id)
                .chain(state.validated.iter().filter(|(_, p)| p.uri == uri).map(|(id, _)| *id))
                .collect()
        };
        for id in ids {
            self.disconnect_id(id);
        }
    }

    fn disconnect_id(&self, id: u64) {
        let mut state = self.state.lock();
        state.pending.remove(&id);
        state.validated.remove(&id);
        if let Some(cid) = state.dgram_ids.remove(&id) {
            if let Some(d) = &self.dgram_self {
                d.release(cid);
            }
        }
    }

    pub async fn shutdown(&self, directory: &DirectoryClient) {
        let dgram_ids = {
            let mut state = self.state.lock();
            if state.lifecycle.is_shutdown() {
                return;
            }
            state.lifecycle = Lifecycle::Shutdown;
            state.pending.clear();
            state.validated.clear();
            state.dgram_ids.drain().map(|(_, cid)| cid).collect::<Vec<u32>>()
        };

        if let Some(d) = &self.dgram_self {
            for cid in dgram_ids {
                d.release(cid);
            }
        }
        self.spinner.disconnect(self.spinner_client);
        let _ = directory.unregister_subscriber(&self.caller_id, &self.topic, &self.caller_api, Some(1)).await;
        log::info!("subscriber {} shut down", self.topic);
    }
}

/// A message-typed handle over a subscriber endpoint.
pub struct Subscriber<M: RosMessage> {
    pub(crate) inner: Arc<SubscriberInner>,
    events: broadcast::Receiver<Delivery>,
    _handle: Option<crate::handle::RefHandle>,
    _marker: PhantomData<M>,
}

impl<M: RosMessage> Subscriber<M> {
    #[allow(clippy::too_many_arguments)]
    pub async fn register(
        directory: &DirectoryClient,
        spinner: Arc<Spinner>,
        dgram_self: Option<DgramSelf>,
        topic: String,
        transports: Vec<&'static str>,
        dgram_size: u32,
        queue_capacity: usize,
        throttle_ms: i64,
        caller_id: String,
        caller_api: String,
    ) -> Result<Self, NodeError> {
        let inner = SubscriberInner::register(
            directory,
            spinner,
            dgram_self,
            topic,
            M::message_type().to_string(),
            M::md5sum().to_string(),
            transports,
            dgram_size,
            queue_capacity,
            throttle_ms,
            caller_id,
            caller_api,
        )
        .await?;
        let events = inner.subscribe_events();
        Ok(Self { inner, events, _handle: None, _marker: PhantomData })
    }

    pub(crate) fn from_inner(inner: Arc<SubscriberInner>) -> Self {
        let events = inner.subscribe_events();
        Self { inner, events, _handle: None, _marker: PhantomData }
    }

    pub(crate) fn attach_handle(mut self, handle: crate::handle::RefHandle) -> Self {
        self._handle = Some(handle);
        self
    }

    /// Awaits the next delivered message, decoding it via the message
    /// type's external codec.
    pub async fn recv(&mut self) -> Result<(M, usize, String), NodeError> {
        loop {
            match self.events.recv().await {
                Ok(delivery) => {
                    let message = M::decode(&delivery.bytes).map_err(|e| NodeError::Serialization(e.to_string()))?;
                    return Ok((message, delivery.byte_length, delivery.origin_uri));
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(NodeError::Shutdown),
            }
        }
    }

    pub fn topic(&self) -> &str {
        &self.inner.topic
    }
}
