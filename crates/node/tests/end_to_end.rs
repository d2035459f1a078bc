//! End-to-end scenarios driven against a real `Runtime` pair and an
//! in-process stub directory server, the same way `graphnode-rpc`'s own
//! fixtures stand in for a peer node.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use graphnode::error::NodeError;
use graphnode::message::testing::{AddTwoInts, AddTwoIntsRequest, Int8, Str};
use graphnode::runtime::{Runtime, RuntimeOptions};
use parking_lot::Mutex;
use rpc::{Fault, RpcListener, Value};
use tokio::sync::broadcast;

const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// A minimal directory server: tracks registered publisher/subscriber/service
/// slave URIs per name and pushes `publisherUpdate` to known subscribers
/// whenever a topic's publisher set changes, mirroring what a real ROS
/// master does.
struct StubDirectory {
    publishers: Mutex<HashMap<String, Vec<String>>>,
    subscribers: Mutex<HashMap<String, Vec<String>>>,
    services: Mutex<HashMap<String, String>>,
    unregister_publisher_calls: Mutex<HashMap<String, usize>>,
    http: reqwest::Client,
}

impl StubDirectory {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            publishers: Mutex::new(HashMap::new()),
            subscribers: Mutex::new(HashMap::new()),
            services: Mutex::new(HashMap::new()),
            unregister_publisher_calls: Mutex::new(HashMap::new()),
            http: reqwest::Client::new(),
        })
    }

    async fn start(self: &Arc<Self>) -> String {
        let listener = RpcListener::bind(SocketAddr::new(LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let this = self.clone();
        listener.serve(move |method, params| {
            let this = this.clone();
            async move { this.dispatch(method, params).await }
        });
        format!("http://{addr}/")
    }

    async fn dispatch(self: Arc<Self>, method: String, mut params: Vec<Value>) -> Result<Value, Fault> {
        match method.as_str() {
            "registerPublisher" => {
                let caller_api = params.pop().unwrap().into_string().unwrap();
                let topic = params.remove(1).into_string().unwrap();
                let subscriber_uris = {
                    let mut publishers = self.publishers.lock();
                    let list = publishers.entry(topic.clone()).or_default();
                    if !list.contains(&caller_api) {
                        list.push(caller_api.clone());
                    }
                    self.subscribers.lock().get(&topic).cloned().unwrap_or_default()
                };
                self.push_publisher_update(&topic, subscriber_uris).await;
                Ok(ok_triple(Value::Array(Vec::new())))
            }
            "unregisterPublisher" => {
                let caller_api = params.pop().unwrap().into_string().unwrap();
                let topic = params.remove(1).into_string().unwrap();
                let remaining = {
                    let mut publishers = self.publishers.lock();
                    if let Some(list) = publishers.get_mut(&topic) {
                        list.retain(|uri| uri != &caller_api);
                    }
                    *self.unregister_publisher_calls.lock().entry(topic.clone()).or_insert(0) += 1;
                    publishers.get(&topic).cloned().unwrap_or_default()
                };
                let subscriber_uris = self.subscribers.lock().get(&topic).cloned().unwrap_or_default();
                self.push_publisher_update(&topic, subscriber_uris).await;
                let _ = remaining;
                Ok(ok_triple(Value::Int(1)))
            }
            "registerSubscriber" => {
                let caller_api = params.pop().unwrap().into_string().unwrap();
                let topic = params.remove(1).into_string().unwrap();
                self.subscribers.lock().entry(topic.clone()).or_default().push(caller_api);
                let publisher_uris = self.publishers.lock().get(&topic).cloned().unwrap_or_default();
                Ok(ok_triple(Value::Array(publisher_uris.into_iter().map(Value::Str).collect())))
            }
            "unregisterSubscriber" => {
                let caller_api = params.pop().unwrap().into_string().unwrap();
                let topic = params.remove(1).into_string().unwrap();
                if let Some(list) = self.subscribers.lock().get_mut(&topic) {
                    list.retain(|uri| uri != &caller_api);
                }
                Ok(ok_triple(Value::Int(1)))
            }
            "registerService" => {
                let caller_api = params.pop().unwrap().into_string().unwrap();
                let service_api = params.pop().unwrap().into_string().unwrap();
                let service = params.pop().unwrap().into_string().unwrap();
                let _ = caller_api;
                self.services.lock().insert(service, service_api);
                Ok(ok_triple(Value::Int(1)))
            }
            "unregisterService" => {
                let service = params.remove(1).into_string().unwrap();
                self.services.lock().remove(&service);
                Ok(ok_triple(Value::Int(1)))
            }
            "lookupService" => {
                let service = params.pop().unwrap().into_string().unwrap();
                match self.services.lock().get(&service).cloned() {
                    Some(uri) => Ok(ok_triple(Value::Str(uri))),
                    None => Ok(fail_triple("no such service")),
                }
            }
            "getUri" => Ok(ok_triple(Value::Str("stub-directory".into()))),
            other => Err(Fault { code: -1, message: format!("stub directory: unhandled method {other}") }),
        }
    }

    async fn push_publisher_update(&self, topic: &str, subscriber_uris: Vec<String>) {
        let publisher_uris = self.publishers.lock().get(topic).cloned().unwrap_or_default();
        let body = rpc::value::encode_call(
            "publisherUpdate",
            &[Value::Str("stub-directory".into()), Value::Str(topic.to_string()), Value::Array(publisher_uris.into_iter().map(Value::Str).collect())],
        );
        for uri in subscriber_uris {
            let _ = self.http.post(&uri).body(body.clone()).send().await;
        }
    }
}

fn ok_triple(payload: Value) -> Value {
    Value::Array(vec![Value::Int(1), Value::Str(String::new()), payload])
}

fn fail_triple(message: &str) -> Value {
    Value::Array(vec![Value::Int(0), Value::Str(message.to_string()), Value::Str(String::new())])
}

async fn start_node(directory_uri: &str, node_name: &str) -> Arc<Runtime> {
    let (shutdown_tx, _) = broadcast::channel(1);
    let opts = RuntimeOptions {
        directory_uri: directory_uri.to_string(),
        advertised_host: "127.0.0.1".to_string(),
        bind_ip: LOCALHOST,
        namespace: "/".to_string(),
        node_name: node_name.to_string(),
        init_timeout: Some(Duration::from_secs(5)),
        remap_args: Vec::new(),
    };
    Runtime::start(opts, shutdown_tx).await.unwrap()
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

#[tokio::test]
async fn streaming_round_trip_delivers_values_in_order() {
    let directory = StubDirectory::new();
    let uri = directory.start().await;
    let talker = start_node(&uri, "/talker").await;
    let listener = start_node(&uri, "/listener").await;

    let publisher = talker.advertise::<Int8>("/t", false, true, 8, 0).await.unwrap();
    let mut subscriber = listener.subscribe::<Int8>("/t", vec!["TCPROS"], 0, 8, 0).await.unwrap();
    settle().await;

    for value in [1i8, 2, 3] {
        publisher.publish(&Int8(value)).await.unwrap();
    }

    let mut received = Vec::new();
    for _ in 0..3 {
        let (message, _, _) = tokio::time::timeout(Duration::from_secs(2), subscriber.recv()).await.unwrap().unwrap();
        received.push(message.0);
    }
    assert_eq!(received, vec![1, 2, 3]);
}

#[tokio::test]
async fn utf8_string_payload_round_trips_byte_equal() {
    let directory = StubDirectory::new();
    let uri = directory.start().await;
    let talker = start_node(&uri, "/talker").await;
    let listener = start_node(&uri, "/listener").await;

    let publisher = talker.advertise::<Str>("/chatter", false, true, 8, 0).await.unwrap();
    let mut subscriber = listener.subscribe::<Str>("/chatter", vec!["TCPROS"], 0, 8, 0).await.unwrap();
    settle().await;

    let text = "héllo wörld, \u{1F980}".to_string();
    publisher.publish(&Str(text.clone())).await.unwrap();

    let (message, _, _) = tokio::time::timeout(Duration::from_secs(2), subscriber.recv()).await.unwrap().unwrap();
    assert_eq!(message.0, text);
}

#[tokio::test]
async fn latching_delivers_exactly_one_message_to_a_late_subscriber() {
    let directory = StubDirectory::new();
    let uri = directory.start().await;
    let talker = start_node(&uri, "/talker").await;
    let listener = start_node(&uri, "/listener").await;

    let publisher = talker.advertise::<Int8>("/latched", true, true, 8, 0).await.unwrap();
    publisher.publish(&Int8(42)).await.unwrap();
    settle().await;

    let mut subscriber = listener.subscribe::<Int8>("/latched", vec!["TCPROS"], 0, 8, 0).await.unwrap();

    let (message, _, _) = tokio::time::timeout(Duration::from_secs(2), subscriber.recv()).await.unwrap().unwrap();
    assert_eq!(message.0, 42);

    let second = tokio::time::timeout(Duration::from_millis(300), subscriber.recv()).await;
    assert!(second.is_err(), "expected exactly one latched message, got a second delivery");
}

#[tokio::test]
async fn throttled_delivery_drops_to_roughly_half_rate() {
    let directory = StubDirectory::new();
    let uri = directory.start().await;
    let talker = start_node(&uri, "/talker").await;
    let listener = start_node(&uri, "/listener").await;

    let publisher = talker.advertise::<Int8>("/throttled", false, true, 1, 0).await.unwrap();
    let mut subscriber = listener.subscribe::<Int8>("/throttled", vec!["TCPROS"], 0, 1, 100).await.unwrap();
    settle().await;

    let values_sent: Vec<i8> = (1..=10).collect();
    for value in &values_sent {
        publisher.publish(&Int8(*value)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let mut received = Vec::new();
    while let Ok(Ok((message, _, _))) = tokio::time::timeout(Duration::from_millis(200), subscriber.recv()).await {
        received.push(message.0);
    }

    let expected_count = values_sent.len() / 2 + 1;
    assert_eq!(received.len(), expected_count);
    assert_eq!(*received.last().unwrap(), 10);
}

#[tokio::test]
async fn datagram_round_trip_delivers_values_in_order() {
    let directory = StubDirectory::new();
    let uri = directory.start().await;
    let talker = start_node(&uri, "/talker").await;
    let listener = start_node(&uri, "/listener").await;

    let publisher = talker.advertise::<Int8>("/d", false, true, 8, 0).await.unwrap();
    let mut subscriber = listener.subscribe::<Int8>("/d", vec!["UDPROS"], 512, 8, 0).await.unwrap();
    settle().await;

    for value in [1i8, 2, 3] {
        publisher.publish(&Int8(value)).await.unwrap();
    }

    let mut received = Vec::new();
    for _ in 0..3 {
        let (message, _, _) = tokio::time::timeout(Duration::from_secs(2), subscriber.recv()).await.unwrap().unwrap();
        received.push(message.0);
    }
    assert_eq!(received, vec![1, 2, 3]);
}

/// Two subscriber nodes each negotiate `UDPROS` against the same publisher.
/// Before the publisher allocated its own connection ids, two independent
/// subscriber-side counters both starting at zero would collide in the
/// publisher's peer map and the first subscriber would silently go dark;
/// this exercises that both keep receiving once the second one joins.
#[tokio::test]
async fn two_datagram_subscribers_on_different_nodes_do_not_collide() {
    let directory = StubDirectory::new();
    let uri = directory.start().await;
    let talker = start_node(&uri, "/talker").await;
    let first_listener = start_node(&uri, "/listener_one").await;
    let second_listener = start_node(&uri, "/listener_two").await;

    let publisher = talker.advertise::<Int8>("/d", false, true, 8, 0).await.unwrap();
    let mut first = first_listener.subscribe::<Int8>("/d", vec!["UDPROS"], 512, 8, 0).await.unwrap();
    settle().await;
    let mut second = second_listener.subscribe::<Int8>("/d", vec!["UDPROS"], 512, 8, 0).await.unwrap();
    settle().await;

    publisher.publish(&Int8(7)).await.unwrap();

    let (first_message, _, _) = tokio::time::timeout(Duration::from_secs(2), first.recv()).await.unwrap().unwrap();
    let (second_message, _, _) = tokio::time::timeout(Duration::from_secs(2), second.recv()).await.unwrap().unwrap();
    assert_eq!(first_message.0, 7);
    assert_eq!(second_message.0, 7);
}

#[tokio::test]
async fn service_call_returns_the_handler_response() {
    let directory = StubDirectory::new();
    let uri = directory.start().await;
    let server_node = start_node(&uri, "/adder").await;
    let client_node = start_node(&uri, "/caller").await;

    let _service = server_node
        .advertise_service::<AddTwoInts, _, _>("/add_two_ints", |request: AddTwoIntsRequest| async move {
            Ok(graphnode::message::testing::AddTwoIntsResponse { sum: request.a + request.b })
        })
        .await
        .unwrap();
    settle().await;

    let client = client_node.service_client::<AddTwoInts>("/add_two_ints", false, -1).await.unwrap();
    let response = client.call(&AddTwoIntsRequest { a: 2, b: 3 }).await.unwrap();
    assert_eq!(response.sum, 5);
}

#[tokio::test]
async fn failed_service_call_surfaces_service_failed() {
    let directory = StubDirectory::new();
    let uri = directory.start().await;
    let server_node = start_node(&uri, "/adder").await;
    let client_node = start_node(&uri, "/caller").await;

    let _service = server_node
        .advertise_service::<AddTwoInts, _, _>("/add_two_ints", |_request: AddTwoIntsRequest| async move {
            Err("refusing to add".to_string())
        })
        .await
        .unwrap();
    settle().await;

    let client = client_node.service_client::<AddTwoInts>("/add_two_ints", false, -1).await.unwrap();
    let error = client.call(&AddTwoIntsRequest { a: 2, b: 3 }).await.unwrap_err();
    assert!(matches!(error, NodeError::ServiceFailed { message } if message == "refusing to add"));
}

#[tokio::test]
async fn publisher_unregisters_only_after_the_last_handle_drops() {
    let directory = StubDirectory::new();
    let uri = directory.start().await;
    let talker = start_node(&uri, "/talker").await;

    let first = talker.advertise::<Int8>("/shared", false, true, 8, 0).await.unwrap();
    let second = talker.advertise::<Int8>("/shared", false, true, 8, 0).await.unwrap();
    settle().await;

    drop(first);
    settle().await;
    assert_eq!(directory.unregister_publisher_calls.lock().get("/shared").copied().unwrap_or(0), 0);

    drop(second);
    settle().await;
    assert_eq!(directory.unregister_publisher_calls.lock().get("/shared").copied().unwrap_or(0), 1);
}

#[tokio::test]
async fn init_against_an_unreachable_directory_shuts_down_immediately() {
    let (shutdown_tx, mut shutdown_rx) = broadcast::channel(1);
    let opts = RuntimeOptions {
        directory_uri: "http://127.0.0.1:1/".to_string(),
        advertised_host: "127.0.0.1".to_string(),
        bind_ip: LOCALHOST,
        namespace: "/".to_string(),
        node_name: "/unreachable".to_string(),
        init_timeout: Some(Duration::ZERO),
        remap_args: Vec::new(),
    };

    let result = Runtime::start(opts, shutdown_tx).await;
    assert!(matches!(result, Err(NodeError::ShutdownDuringInit)));
    tokio::time::timeout(Duration::from_secs(1), shutdown_rx.recv()).await.unwrap().unwrap();
}
