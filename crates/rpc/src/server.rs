//! A generic RPC listener shared by the node runtime's own slave API and by
//! test fixtures standing in for a directory server or a peer node. Bind
//! first to resolve a port, then hand the listener to `serve` once the rest
//! of the node is ready — mirrors the bind-then-spawn shape the teacher
//! uses for its UDP worker pool.

use crate::value::{Fault, Value, encode_fault, encode_response, parse_call};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub struct RpcListener {
    listener: TcpListener,
}

impl RpcListener {
    pub async fn bind(addr: SocketAddr) -> std::io::Result<Self> {
        Ok(Self { listener: TcpListener::bind(addr).await? })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Spawn a task serving XML-RPC-shaped calls over this listener.
    /// `handler` receives the method name and decoded parameters and
    /// returns the response value, or a `Fault` to report back to the
    /// caller.
    pub fn serve<F, Fut>(self, handler: F) -> JoinHandle<()>
    where
        F: Fn(String, Vec<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, Fault>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let app = axum::Router::new().route(
            "/",
            axum::routing::post(move |body: String| {
                let handler = handler.clone();
                async move {
                    match parse_call(&body) {
                        Ok((method, params)) => match handler(method, params).await {
                            Ok(value) => encode_response(&value),
                            Err(fault) => encode_fault(fault.code, &fault.message),
                        },
                        Err(fault) => encode_fault(fault.code, &fault.message),
                    }
                }
            }),
        );

        tokio::spawn(async move {
            if let Err(error) = axum::serve(self.listener, app).await {
                log::warn!("rpc listener stopped: {error}");
            }
        })
    }
}
