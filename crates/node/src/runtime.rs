//! Node runtime (C11). Owns the slave RPC server, the streaming acceptor,
//! the datagram socket, and the topic/service maps; `advertise`/
//! `subscribe`/`advertise_service`/`service_client` (C12's entry points)
//! dedup by resolved name and hand back a refcounted handle.
//!
//! Grounded on `turn-server/src/server/mod.rs`'s `run()` (bind, resolve
//! readiness, spawn workers, log before/after) and
//! `turn-server/src/server/tcp.rs`'s accept-loop-spawns-per-connection-task
//! shape.

use crate::endpoint::{DgramSelf, Lifecycle};
use crate::error::NodeError;
use crate::handle::{Kind, RefHandle};
use crate::message::{RosMessage, RosService};
use crate::name;
use crate::publisher::{Publisher, PublisherInner};
use crate::remap::RemapTable;
use crate::service_client::{ServiceClient, ServiceClientInner};
use crate::service_server::{Service, ServiceServer};
use crate::spinner::Spinner;
use crate::subscriber::{Subscriber, SubscriberInner};
use rpc::{DirectoryClient, Fault, PeerClient, RpcListener, Value};
use ahash::{HashMap, HashMapExt};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use parking_lot::Mutex;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::AtomicU32;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use wire::{ConnectionHeader, Frame, datagram, header};

pub struct RuntimeOptions {
    pub directory_uri: String,
    pub advertised_host: String,
    pub bind_ip: IpAddr,
    pub namespace: String,
    pub node_name: String,
    /// `None` waits forever for the directory to become reachable;
    /// `Some(Duration::ZERO)` fails immediately if it isn't already up.
    pub init_timeout: Option<Duration>,
    /// Raw `name:=value` invocation arguments (§6), parsed into a
    /// `RemapTable` during `start`. `__name`/`__ns`/`__ip`/`__hostname`/
    /// `__master` override the fields above; everything else becomes an
    /// ordered remap entry applied by `name::resolve`.
    pub remap_args: Vec<String>,
}

struct RuntimeState {
    lifecycle: Lifecycle,
    publishers: HashMap<String, Arc<PublisherInner>>,
    subscribers: HashMap<String, Arc<SubscriberInner>>,
    services: HashMap<String, Arc<ServiceServer>>,
    service_clients: HashMap<String, Arc<ServiceClientInner>>,
}

pub struct Runtime {
    pub caller_id: String,
    pub namespace: String,
    pub advertised_host: String,
    pub slave_port: u16,
    pub stream_port: u16,
    pub dgram_port: u16,
    remap: RemapTable,
    directory: DirectoryClient,
    spinner: Arc<Spinner>,
    peer_client: PeerClient,
    dgram_socket: Arc<UdpSocket>,
    /// Allocates connection ids for datagram peers requesting one of *our*
    /// published topics (§4.11: the publisher, not the subscriber, owns
    /// this id since it becomes the key into that publisher's peer map).
    dgram_connection_ids: Arc<AtomicU32>,
    dgram_registry: Arc<Mutex<HashMap<u32, String>>>,
    shutdown_tx: broadcast::Sender<()>,
    slave_task: Mutex<Option<JoinHandle<()>>>,
    stream_task: Mutex<Option<JoinHandle<()>>>,
    dgram_task: Mutex<Option<JoinHandle<()>>>,
    state: Mutex<RuntimeState>,
}

impl Runtime {
    /// Binds all three listeners, then blocks on directory reachability
    /// (bounded by `opts.init_timeout`). A directory that never answers
    /// within the bound triggers a shutdown event and rejects with
    /// `ShutdownDuringInit` instead of leaving a half-started node around.
    pub async fn start(opts: RuntimeOptions, shutdown_tx: broadcast::Sender<()>) -> Result<Arc<Self>, NodeError> {
        let remap = RemapTable::parse_args(&opts.remap_args);
        let namespace = remap.namespace.clone().unwrap_or(opts.namespace);
        let node_name = remap.node_name.clone().unwrap_or(opts.node_name);
        let advertised_host = remap.advertised_host.clone().unwrap_or(opts.advertised_host);
        let directory_uri = remap.directory_uri.clone().unwrap_or(opts.directory_uri);

        let slave_listener = RpcListener::bind(SocketAddr::new(opts.bind_ip, 0)).await?;
        let slave_port = slave_listener.local_addr()?.port();

        let stream_listener = TcpListener::bind(SocketAddr::new(opts.bind_ip, 0)).await?;
        let stream_port = stream_listener.local_addr()?.port();

        let dgram_socket = Arc::new(UdpSocket::bind(SocketAddr::new(opts.bind_ip, 0)).await?);
        let dgram_port = dgram_socket.local_addr()?.port();

        let directory = DirectoryClient::new(directory_uri.clone());
        let caller_id = node_name.clone();

        let reachable = match opts.init_timeout {
            Some(timeout) => tokio::time::timeout(timeout, directory.get_uri(&caller_id, None)).await.is_ok_and(|r| r.is_ok()),
            None => directory.get_uri(&caller_id, None).await.is_ok(),
        };

        if !reachable {
            log::warn!("node {caller_id} could not reach directory {directory_uri} during init");
            let _ = shutdown_tx.send(());
            return Err(NodeError::ShutdownDuringInit);
        }

        let runtime = Arc::new(Self {
            caller_id: caller_id.clone(),
            namespace,
            advertised_host,
            slave_port,
            stream_port,
            dgram_port,
            remap,
            directory,
            spinner: Arc::new(Spinner::new()),
            peer_client: PeerClient::new(),
            dgram_socket: dgram_socket.clone(),
            dgram_connection_ids: Arc::new(AtomicU32::new(0)),
            dgram_registry: Arc::new(Mutex::new(HashMap::new())),
            shutdown_tx,
            slave_task: Mutex::new(None),
            stream_task: Mutex::new(None),
            dgram_task: Mutex::new(None),
            state: Mutex::new(RuntimeState {
                lifecycle: Lifecycle::Registered,
                publishers: HashMap::new(),
                subscribers: HashMap::new(),
                services: HashMap::new(),
                service_clients: HashMap::new(),
            }),
        });

        log::info!("node {caller_id} up: slave={slave_port} stream={stream_port} dgram={dgram_port}");

        let slave_task = {
            let runtime = runtime.clone();
            slave_listener.serve(move |method, params| {
                let runtime = runtime.clone();
                async move { runtime.dispatch_slave_rpc(method, params).await }
            })
        };
        *runtime.slave_task.lock() = Some(slave_task);

        let stream_task = {
            let runtime = runtime.clone();
            tokio::spawn(async move { runtime.run_stream_acceptor(stream_listener).await })
        };
        *runtime.stream_task.lock() = Some(stream_task);

        let dgram_task = {
            let runtime = runtime.clone();
            let socket = dgram_socket;
            tokio::spawn(async move { runtime.run_dgram_reader(socket).await })
        };
        *runtime.dgram_task.lock() = Some(dgram_task);

        Ok(runtime)
    }

    pub fn is_shutdown(&self) -> bool {
        self.state.lock().lifecycle.is_shutdown()
    }

    fn caller_api(&self) -> String {
        format!("http://{}:{}/", self.advertised_host, self.slave_port)
    }

    fn service_api(&self) -> String {
        format!("rosrpc://{}:{}/", self.advertised_host, self.stream_port)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn advertise<M: RosMessage>(
        self: &Arc<Self>,
        topic: &str,
        latching: bool,
        tcp_nodelay: bool,
        queue_capacity: usize,
        throttle_ms: i64,
    ) -> Result<Publisher<M>, NodeError> {
        let topic = name::resolve(topic, &self.namespace, &self.caller_id, &self.remap)?;

        let existing = { self.state.lock().publishers.get(&topic).cloned() };
        let inner = match existing {
            Some(inner) => {
                inner.incref();
                inner
            }
            None => {
                let inner = PublisherInner::register(
                    &self.directory,
                    self.spinner.clone(),
                    Some(self.dgram_socket.clone()),
                    topic.clone(),
                    M::message_type().to_string(),
                    M::md5sum().to_string(),
                    latching,
                    tcp_nodelay,
                    queue_capacity,
                    throttle_ms,
                    self.caller_id.clone(),
                    self.caller_api(),
                )
                .await?;
                inner.incref();
                self.state.lock().publishers.insert(topic.clone(), inner.clone());
                inner
            }
        };

        let handle = RefHandle::new(Arc::downgrade(self), topic, Kind::Publisher);
        Ok(Publisher::from_inner(inner).attach_handle(handle))
    }

    pub async fn subscribe<M: RosMessage>(
        self: &Arc<Self>,
        topic: &str,
        transports: Vec<&'static str>,
        dgram_size: u32,
        queue_capacity: usize,
        throttle_ms: i64,
    ) -> Result<Subscriber<M>, NodeError> {
        let topic = name::resolve(topic, &self.namespace, &self.caller_id, &self.remap)?;

        let existing = { self.state.lock().subscribers.get(&topic).cloned() };
        let inner = match existing {
            Some(inner) => {
                inner.incref();
                inner
            }
            None => {
                let dgram_self = transports.contains(&"UDPROS").then(|| DgramSelf {
                    host: self.advertised_host.clone(),
                    port: self.dgram_port,
                    registry: self.dgram_registry.clone(),
                });
                let inner = SubscriberInner::register(
                    &self.directory,
                    self.spinner.clone(),
                    dgram_self,
                    topic.clone(),
                    M::message_type().to_string(),
                    M::md5sum().to_string(),
                    transports,
                    dgram_size,
                    queue_capacity,
                    throttle_ms,
                    self.caller_id.clone(),
                    self.caller_api(),
                )
                .await?;
                inner.incref();
                self.state.lock().subscribers.insert(topic.clone(), inner.clone());
                inner
            }
        };

        let handle = RefHandle::new(Arc::downgrade(self), topic, Kind::Subscriber);
        Ok(Subscriber::from_inner(inner).attach_handle(handle))
    }

    /// Registers the service if this is the first caller for `service` on
    /// this node; a second `advertise_service` for an already-registered
    /// name reuses the existing server and its original handler.
    pub async fn advertise_service<S, F, Fut>(self: &Arc<Self>, service: &str, handler: F) -> Result<Service<S>, NodeError>
    where
        S: RosService,
        F: Fn(S::Request) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<S::Response, String>> + Send + 'static,
    {
        let service_name = name::resolve(service, &self.namespace, &self.caller_id, &self.remap)?;

        let existing = { self.state.lock().services.get(&service_name).cloned() };
        let inner = match existing {
            Some(inner) => {
                inner.incref();
                inner
            }
            None => {
                let inner = ServiceServer::register::<S, F, Fut>(
                    &self.directory,
                    service_name.clone(),
                    self.caller_id.clone(),
                    self.caller_api(),
                    self.service_api(),
                    handler,
                )
                .await?;
                inner.incref();
                self.state.lock().services.insert(service_name.clone(), inner.clone());
                inner
            }
        };

        let handle = RefHandle::new(Arc::downgrade(self), service_name, Kind::Service);
        Ok(Service::from_inner(inner).attach_handle(handle))
    }

    pub async fn service_client<S: RosService>(
        self: &Arc<Self>,
        service: &str,
        persistent: bool,
        max_queue_length: i64,
    ) -> Result<ServiceClient<S>, NodeError> {
        let service_name = name::resolve(service, &self.namespace, &self.caller_id, &self.remap)?;

        let existing = { self.state.lock().service_clients.get(&service_name).cloned() };
        let inner = match existing {
            Some(inner) => {
                inner.incref();
                inner
            }
            None => {
                let inner = ServiceClientInner::new(
                    self.directory.clone(),
                    service_name.clone(),
                    S::md5sum().to_string(),
                    persistent,
                    max_queue_length,
                    self.caller_id.clone(),
                );
                inner.incref();
                self.state.lock().service_clients.insert(service_name.clone(), inner.clone());
                inner
            }
        };

        let handle = RefHandle::new(Arc::downgrade(self), service_name, Kind::ServiceClient);
        Ok(ServiceClient::from_inner(inner).attach_handle(handle))
    }

    /// Decrements the refcount for `key`'s endpoint and, once it reaches
    /// zero, shuts it down and removes it from the map. Called from
    /// `RefHandle::drop`, never directly by a caller.
    pub(crate) async fn release(&self, kind: Kind, key: &str) {
        match kind {
            Kind::Publisher => {
                let inner = { self.state.lock().publishers.get(key).cloned() };
                if let Some(inner) = inner {
                    if inner.decref() == 0 {
                        inner.shutdown(&self.directory).await;
                        self.state.lock().publishers.remove(key);
                    }
                }
            }
            Kind::Subscriber => {
                let inner = { self.state.lock().subscribers.get(key).cloned() };
                if let Some(inner) = inner {
                    if inner.decref() == 0 {
                        inner.shutdown(&self.directory).await;
                        self.state.lock().subscribers.remove(key);
                    }
                }
            }
            Kind::Service => {
                let inner = { self.state.lock().services.get(key).cloned() };
                if let Some(inner) = inner {
                    if inner.decref() == 0 {
                        inner.shutdown(&self.directory).await;
                        self.state.lock().services.remove(key);
                    }
                }
            }
            Kind::ServiceClient => {
                let inner = { self.state.lock().service_clients.get(key).cloned() };
                if let Some(inner) = inner {
                    if inner.decref() == 0 {
                        inner.shutdown().await;
                        self.state.lock().service_clients.remove(key);
                    }
                }
            }
        }
    }

    /// Emits a shutdown event, tears down every remaining endpoint
    /// (unregistering each with `max_attempts = 1`), then closes the three
    /// listeners after a short grace period. Idempotent.
    pub async fn shutdown(self: &Arc<Self>) {
        {
            let mut state = self.state.lock();
            if state.lifecycle.is_shutdown() {
                return;
            }
            state.lifecycle = Lifecycle::Shutdown;
        }
        let _ = self.shutdown_tx.send(());

        let (publishers, subscribers, services, service_clients) = {
            let mut state = self.state.lock();
            (
                std::mem::take(&mut state.publishers),
                std::mem::take(&mut state.subscribers),
                std::mem::take(&mut state.services),
                std::mem::take(&mut state.service_clients),
            )
        };

        for publisher in publishers.into_values() {
            publisher.shutdown(&self.directory).await;
        }
        for subscriber in subscribers.into_values() {
            subscriber.shutdown(&self.directory).await;
        }
        for service in services.into_values() {
            service.shutdown(&self.directory).await;
        }
        for client in service_clients.into_values() {
            client.shutdown().await;
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        if let Some(task) = self.slave_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.stream_task.lock().take() {
            task.abort();
        }
        if let Some(task) = self.dgram_task.lock().take() {
            task.abort();
        }

        log::info!("node {} shut down", self.caller_id);
    }

    async fn run_stream_acceptor(self: Arc<Self>, listener: TcpListener) {
        loop {
            let (stream, _addr) = match listener.accept().await {
                Ok(pair) => pair,
                Err(error) => {
                    log::warn!("stream accept error: {error}");
                    continue;
                }
            };
            let runtime = self.clone();
            tokio::spawn(async move { runtime.handle_stream_connection(stream).await });
        }
    }

    async fn handle_stream_connection(self: Arc<Self>, mut stream: TcpStream) {
        let mut deframer = wire::Deframer::new();
        let mut buf = [0u8; 4096];
        let header_bytes = loop {
            match stream.read(&mut buf).await {
                Ok(0) | Err(_) => return,
                Ok(n) => deframer.push(&buf[..n]),
            }
            if let Some(Frame::Record(bytes)) = deframer.poll().unwrap_or_default().into_iter().next() {
                break bytes;
            }
        };

        let peer_header = match ConnectionHeader::decode(&header_bytes) {
            Ok(h) => h,
            Err(error) => {
                log::warn!("malformed connection header: {error}");
                return;
            }
        };

        if let Some(topic) = peer_header.get(header::TOPIC).map(str::to_string) {
            let publisher = { self.state.lock().publishers.get(&topic).cloned() };
            match publisher {
                Some(publisher) => {
                    if let Err(error) = publisher.handle_streaming_peer(stream, peer_header).await {
                        log::warn!("publisher {topic} rejected a streaming peer: {error}");
                    }
                }
                None => log::warn!("streaming connection for unknown topic {topic}"),
            }
        } else if let Some(service) = peer_header.get(header::SERVICE).map(str::to_string) {
            let server = { self.state.lock().services.get(&service).cloned() };
            match server {
                Some(server) => {
                    if let Err(error) = server.handle_streaming_peer(stream, peer_header).await {
                        log::warn!("service {service} rejected a streaming peer: {error}");
                    }
                }
                None => log::warn!("streaming connection for unknown service {service}"),
            }
        } else {
            log::warn!("streaming connection header carries neither topic nor service");
        }
    }

    async fn run_dgram_reader(self: Arc<Self>, socket: Arc<UdpSocket>) {
        let mut buf = [0u8; 65536];
        loop {
            let (n, addr) = match socket.recv_from(&mut buf).await {
                Ok(pair) => pair,
                Err(error) => {
                    log::warn!("datagram recv error: {error}");
                    continue;
                }
            };

            let packet = match datagram::decode_packet(&buf[..n]) {
                Ok(packet) => packet,
                Err(_) => continue,
            };

            let topic = { self.dgram_registry.lock().get(&packet.header.connection_id).cloned() };
            let Some(topic) = topic else { continue };
            let subscriber = { self.state.lock().subscribers.get(&topic).cloned() };
            if let Some(subscriber) = subscriber {
                subscriber.handle_message_chunk(addr.to_string(), packet).await;
            }
        }
    }

    async fn dispatch_slave_rpc(self: Arc<Self>, method: String, params: Vec<Value>) -> Result<Value, Fault> {
        match method.as_str() {
            "requestTopic" => self.rpc_request_topic(params).await,
            "publisherUpdate" => self.rpc_publisher_update(params).await,
            "getPublications" => Ok(self.rpc_get_publications()),
            "getSubscriptions" => Ok(self.rpc_get_subscriptions()),
            "getPid" => Ok(ok_triple(Value::Int(std::process::id() as i32))),
            "getBusInfo" => Ok(ok_triple(self.rpc_get_bus_info())),
            "getBusStats" => {
                Ok(ok_triple(Value::Array(vec![Value::Array(vec![]), Value::Array(vec![]), Value::Array(vec![])])))
            }
            "getMasterUri" => Ok(ok_triple(Value::Str(self.directory.base_uri().to_string()))),
            "paramUpdate" => {
                log::debug!("paramUpdate received; this node does not cache parameter values locally");
                Ok(ok_triple(Value::Int(1)))
            }
            "shutdown" => {
                self.shutdown().await;
                Ok(ok_triple(Value::Int(1)))
            }
            other => Err(Fault { code: -1, message: format!("unknown method {other}") }),
        }
    }

    async fn rpc_request_topic(&self, mut params: Vec<Value>) -> Result<Value, Fault> {
        if params.len() != 3 {
            return Err(Fault { code: -1, message: "requestTopic expects 3 params".into() });
        }
        let protocols = params.pop().unwrap().into_array().ok_or_else(|| bad_params("protocols must be an array"))?;
        let topic = params.pop().unwrap().into_string().ok_or_else(|| bad_params("topic must be a string"))?;

        let Some(publisher) = ({ self.state.lock().publishers.get(&topic).cloned() }) else {
            return Ok(fail_triple(&format!("no such topic {topic}")));
        };

        for candidate in protocols {
            let Some(fields) = candidate.into_array() else { continue };
            let Some(name) = fields.first().cloned().and_then(Value::into_string) else { continue };

            if name == "TCPROS" {
                return Ok(ok_triple(Value::Array(vec![
                    Value::Str("TCPROS".into()),
                    Value::Str(self.advertised_host.clone()),
                    Value::Int(self.stream_port as i32),
                ])));
            }

            if name == "UDPROS" && fields.len() >= 4 {
                let host = fields.get(1).cloned().and_then(Value::into_string).ok_or_else(|| bad_params("bad UDPROS host"))?;
                let port = fields.get(2).cloned().and_then(Value::into_int).ok_or_else(|| bad_params("bad UDPROS port"))? as u16;
                let dgram_size =
                    fields.get(3).cloned().and_then(Value::into_int).ok_or_else(|| bad_params("bad UDPROS dgram_size"))? as usize;
                let ip: IpAddr = host.parse().map_err(|_| bad_params("bad UDPROS host address"))?;

                // The peer may propose a connection id of its own choosing (it
                // doesn't, per the current `PeerClient`, but older clients on
                // the wire might); we never trust it; two independent
                // subscriber nodes can each start counting from zero, and
                // since this publisher's `dgram_peers` map is keyed on the
                // id, reusing a peer-proposed value risks one subscriber
                // silently overwriting another's registration.
                let connection_id = self.dgram_connection_ids.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                let header = BASE64.encode(publisher.connection_header().encode());

                publisher.add_datagram_peer(connection_id, SocketAddr::new(ip, port), dgram_size);
                return Ok(ok_triple(Value::Array(vec![
                    Value::Str("UDPROS".into()),
                    Value::Str(self.advertised_host.clone()),
                    Value::Int(self.dgram_port as i32),
                    Value::Int(connection_id as i32),
                    Value::Int(dgram_size as i32),
                    Value::Str(header),
                ])));
            }
        }

        Ok(fail_triple("no supported protocol"))
    }

    async fn rpc_publisher_update(&self, mut params: Vec<Value>) -> Result<Value, Fault> {
        if params.len() != 3 {
            return Err(Fault { code: -1, message: "publisherUpdate expects 3 params".into() });
        }
        let uris = params
            .pop()
            .unwrap()
            .into_array()
            .ok_or_else(|| bad_params("publishers must be an array"))?
            .into_iter()
            .filter_map(Value::into_string)
            .collect::<Vec<_>>();
        let topic = params.pop().unwrap().into_string().ok_or_else(|| bad_params("topic must be a string"))?;

        let subscriber = { self.state.lock().subscribers.get(&topic).cloned() };
        if let Some(subscriber) = subscriber {
            subscriber.handle_publisher_update(uris, &self.peer_client).await;
        }

        Ok(ok_triple(Value::Int(1)))
    }

    fn rpc_get_publications(&self) -> Value {
        let items = self
            .state
            .lock()
            .publishers
            .values()
            .map(|p| Value::Array(vec![Value::Str(p.topic.clone()), Value::Str(p.type_name.clone())]))
            .collect();
        ok_triple(Value::Array(items))
    }

    /// One `[id, destination, direction, transport, topic, connected]` row
    /// per known topic, condensed: one row per topic rather than per peer
    /// connection, since the endpoints don't track individual connection
    /// ids for stream peers.
    fn rpc_get_bus_info(&self) -> Value {
        let state = self.state.lock();
        let mut rows = Vec::new();

        for publisher in state.publishers.values() {
            let (_, _, peers) = publisher.bus_info();
            rows.push(Value::Array(vec![
                Value::Str(publisher.topic.clone()),
                Value::Str(publisher.topic.clone()),
                Value::Str("out".into()),
                Value::Str("TCPROS".into()),
                Value::Str(publisher.topic.clone()),
                Value::Bool(peers > 0),
            ]));
        }

        for subscriber in state.subscribers.values() {
            rows.push(Value::Array(vec![
                Value::Str(subscriber.topic.clone()),
                Value::Str(subscriber.topic.clone()),
                Value::Str("in".into()),
                Value::Str("TCPROS".into()),
                Value::Str(subscriber.topic.clone()),
                Value::Bool(subscriber.connected_peer_count() > 0),
            ]));
        }

        Value::Array(rows)
    }

    fn rpc_get_subscriptions(&self) -> Value {
        let items = self
            .state
            .lock()
            .subscribers
            .values()
            .map(|s| Value::Array(vec![Value::Str(s.topic.clone()), Value::Str(s.type_name.clone())]))
            .collect();
        ok_triple(Value::Array(items))
    }
}

fn ok_triple(payload: Value) -> Value {
    Value::Array(vec![Value::Int(1), Value::Str(String::new()), payload])
}

fn fail_triple(message: &str) -> Value {
    Value::Array(vec![Value::Int(0), Value::Str(message.to_string()), Value::Str(String::new())])
}

fn bad_params(message: &str) -> Fault {
    Fault { code: -1, message: message.to_string() }
}
