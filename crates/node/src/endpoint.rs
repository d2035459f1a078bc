//! Shared endpoint bookkeeping used by the publisher, subscriber, and
//! service endpoints (C7-C10): the three-state lifecycle and a monotonic
//! per-endpoint peer-id generator (streaming peers aren't addressable by
//! socket address alone once accepted, so each gets a small local id).

use ahash::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Registering,
    Registered,
    Shutdown,
}

impl Lifecycle {
    pub fn is_shutdown(self) -> bool {
        self == Lifecycle::Shutdown
    }
}

#[derive(Default)]
pub struct PeerIdGen(AtomicU64);

impl PeerIdGen {
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// A subscriber's own datagram listening identity, handed down by the node
/// runtime so a subscriber can negotiate `UDPROS` without holding a runtime
/// reference. `registry` maps connection id to topic name for the runtime's
/// inbound packet dispatch. The connection id itself is always assigned by
/// the remote publisher (§4.11); a subscriber only ever registers the id it
/// was handed back.
#[derive(Clone)]
pub struct DgramSelf {
    pub host: String,
    pub port: u16,
    pub registry: Arc<parking_lot::Mutex<HashMap<u32, String>>>,
}

impl DgramSelf {
    pub fn register(&self, id: u32, topic: &str) {
        self.registry.lock().insert(id, topic.to_string());
    }

    pub fn release(&self, id: u32) {
        self.registry.lock().remove(&id);
    }
}
